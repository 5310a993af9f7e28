//! Screenshot persistence. Every screenshot lands in a local
//! directory; with persistence on, a copy also goes under
//! `<store>/<run-prefix>/<name>`, the layout the reply channel hands
//! back to the caller.

use crate::error::AgentError;
use rand::RngExt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

const RUN_PREFIX_LEN: usize = 6;

/// Where screenshots for one run go. The prefix is a short random
/// token unique per run, so parallel runs never collide in the store.
pub struct ArtifactSink {
    local_dir: PathBuf,
    store_dir: Option<PathBuf>,
    prefix: String,
}

impl ArtifactSink {
    pub fn new(local_dir: impl Into<PathBuf>, store_dir: Option<PathBuf>) -> Self {
        Self {
            local_dir: local_dir.into(),
            store_dir,
            prefix: random_prefix(),
        }
    }

    /// The `<run-prefix>` part of store keys, reported on the reply channel.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Write a PNG as `screenshot-<epoch-millis>.png`, plus the store
    /// copy when persistence is configured.
    pub fn save_screenshot(&self, png: &[u8]) -> Result<PathBuf, AgentError> {
        let name = format!("screenshot-{}.png", epoch_millis());
        fs::create_dir_all(&self.local_dir)?;
        let local_path = self.local_dir.join(&name);
        fs::write(&local_path, png)?;
        info!("Screenshot saved to {}", local_path.display());

        if let Some(store) = &self.store_dir {
            let key_dir = store.join(&self.prefix);
            fs::create_dir_all(&key_dir)?;
            fs::copy(&local_path, key_dir.join(&name))?;
            info!("Screenshot saved to {}/{}/{}", store.display(), self.prefix, name);
        }
        Ok(local_path)
    }

    pub fn local_dir(&self) -> &Path {
        &self.local_dir
    }
}

fn epoch_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

fn random_prefix() -> String {
    let mut rng = rand::rng();
    (0..RUN_PREFIX_LEN)
        .map(|_| char::from(rng.sample(rand::distr::Alphanumeric)).to_ascii_lowercase())
        .collect()
}
