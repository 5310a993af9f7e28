use std::time::Duration;

/// Immutable parameters for one navigation command. Built once,
/// passed down explicitly; nothing here is globally mutable.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub url: String,
    /// Pause after every executed action batch.
    pub delay: Duration,
    /// Decision-round budget. The loop never runs more rounds than this.
    pub interactions: u32,
    /// Initial load pause and page-ready poll ceiling.
    pub load_wait: Duration,
    pub test_case: String,
    /// Assign generated ids to elements that lack one and write them
    /// back onto the live DOM.
    pub set_ids: bool,
    /// Copy screenshots into the artifact store as well as the local dir.
    pub persist_artifacts: bool,
    pub headless: bool,
}

impl RunConfig {
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::default()
    }

    /// Defaults used by the job intake path, artifact persistence on.
    pub fn default_persisted(url: &str, test_case: &str, set_ids: bool) -> Self {
        let defaults = RunConfigBuilder::default();
        RunConfig {
            url: url.to_string(),
            delay: defaults.delay,
            interactions: defaults.interactions,
            load_wait: defaults.load_wait,
            test_case: test_case.to_string(),
            set_ids,
            persist_artifacts: true,
            headless: true,
        }
    }

    /// Defaults for the challenge-solving command; challenges render
    /// for a human, so the browser runs headed.
    pub fn challenge(url: &str, prompt: &str) -> Self {
        let defaults = RunConfigBuilder::default();
        RunConfig {
            url: url.to_string(),
            delay: defaults.delay,
            interactions: defaults.interactions,
            load_wait: defaults.load_wait,
            test_case: prompt.to_string(),
            set_ids: false,
            persist_artifacts: false,
            headless: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunConfigBuilder {
    url: Option<String>,
    delay: Duration,
    interactions: u32,
    load_wait: Duration,
    test_case: String,
    set_ids: bool,
    persist_artifacts: bool,
    headless: bool,
}

impl Default for RunConfigBuilder {
    fn default() -> Self {
        Self {
            url: None,
            delay: Duration::from_millis(300),
            interactions: 100,
            load_wait: Duration::from_millis(5000),
            test_case: String::new(),
            set_ids: false,
            persist_artifacts: false,
            headless: true,
        }
    }
}

impl RunConfigBuilder {
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn interactions(mut self, interactions: u32) -> Self {
        self.interactions = interactions;
        self
    }

    pub fn load_wait(mut self, load_wait: Duration) -> Self {
        self.load_wait = load_wait;
        self
    }

    pub fn test_case(mut self, test_case: impl Into<String>) -> Self {
        self.test_case = test_case.into();
        self
    }

    pub fn set_ids(mut self, set_ids: bool) -> Self {
        self.set_ids = set_ids;
        self
    }

    pub fn persist_artifacts(mut self, persist: bool) -> Self {
        self.persist_artifacts = persist;
        self
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn build(self) -> Result<RunConfig, &'static str> {
        let url = self.url.ok_or("url is required")?;
        Ok(RunConfig {
            url,
            delay: self.delay,
            interactions: self.interactions,
            load_wait: self.load_wait,
            test_case: self.test_case,
            set_ids: self.set_ids,
            persist_artifacts: self.persist_artifacts,
            headless: self.headless,
        })
    }
}
