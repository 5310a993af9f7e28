//! Browser session ownership. A session is opened by the first
//! command in a chain and handed off, never copied; exactly one
//! command holds it at any time.

use crate::error::AgentError;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// One live Chrome instance plus the tab the test runs in.
pub struct BrowserSession {
    browser: Browser,
    pub tab: Arc<Tab>,
}

impl BrowserSession {
    /// Start Chrome. Failure here is fatal before the loop begins;
    /// there is nothing to tear down yet.
    pub fn launch(headless: bool) -> Result<Self, AgentError> {
        info!("Launching Chrome (headless: {headless})...");
        let options = LaunchOptions {
            headless,
            sandbox: false,
            window_size: Some((2560, 1440)),
            path: find_chrome(),
            args: vec![
                OsStr::new("--remote-allow-origins=*"),
                OsStr::new("--disable-dev-shm-usage"),
            ],
            // The oracle can take minutes per round; keep the browser alive.
            idle_browser_timeout: Duration::from_secs(600),
            ..Default::default()
        };

        let browser = Browser::new(options).map_err(|err| {
            AgentError::SessionStartup(format!(
                "could not start the browser; the Chrome binary may be missing or its \
                 version may not match: {err}"
            ))
        })?;
        let tab = browser
            .new_tab()
            .map_err(|err| AgentError::SessionStartup(err.to_string()))?;
        info!("Chrome ready.");
        Ok(Self { browser, tab })
    }

    pub fn navigate(&self, url: &str) -> Result<(), AgentError> {
        info!("Navigating to {url}");
        self.tab.navigate_to(url).map_err(AgentError::browser)?;
        Ok(())
    }

    /// Poll `document.readyState` until the page reports complete or
    /// the timeout elapses.
    pub fn wait_document_ready(&self, timeout: Duration) -> Result<(), AgentError> {
        let deadline = Instant::now() + timeout;
        loop {
            let ready = self
                .tab
                .evaluate("document.readyState", false)
                .map_err(AgentError::browser)?
                .value
                .and_then(|v| v.as_str().map(String::from))
                .unwrap_or_default();
            if ready == "complete" {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(AgentError::Browser(format!(
                    "page not ready after {}ms",
                    timeout.as_millis()
                )));
            }
            std::thread::sleep(READY_POLL_INTERVAL);
        }
    }

    pub fn page_source(&self) -> Result<String, AgentError> {
        self.tab.get_content().map_err(AgentError::browser)
    }

    pub fn screenshot_png(&self) -> Result<Vec<u8>, AgentError> {
        self.tab
            .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
            .map_err(AgentError::browser)
    }

    pub fn press_key(&self, key: &str) -> Result<(), AgentError> {
        self.tab.press_key(key).map_err(AgentError::browser)?;
        Ok(())
    }

    pub fn type_text(&self, text: &str) -> Result<(), AgentError> {
        self.tab.type_str(text).map_err(AgentError::browser)?;
        Ok(())
    }

    /// Neutral keystroke sequence used to advance focus when a round
    /// produced no resolvable click.
    pub fn press_tab_enter(&self) -> Result<(), AgentError> {
        self.press_key("Tab")?;
        self.press_key("Enter")
    }

    /// Close the tab and end the browser process. Called on every
    /// exit path from a command chain.
    pub fn shutdown(self) {
        if let Err(err) = self.tab.close(true) {
            debug!("tab already gone at shutdown: {err}");
        }
        drop(self.browser);
        info!("Browser session closed.");
    }
}

/// Probe the usual install locations; fall back to the library's own
/// discovery when nothing matches.
fn find_chrome() -> Option<PathBuf> {
    let candidates: &[&str] = if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    } else if cfg!(target_os = "macos") {
        &["/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"]
    } else {
        &[
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
        ]
    };

    for path in candidates {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }
    debug!("no Chrome binary at the usual locations, deferring to library discovery");
    None
}
