use async_channel::Sender;

use crate::{error::ConfigError, executor::ExecutorEvent};

pub const MAX_CONCURRENCY_ENV: &str = "MINIEXEC_MAX_CONCURRENCY";

#[derive(Debug, Clone, Default)]
pub struct ExecutorConfig {
    /// Upper bound on tasks running at once. `None` runs everything at once.
    pub max_concurrency: Option<usize>,
    /// Where lifecycle events go, if anywhere.
    pub events: Option<Sender<ExecutorEvent>>,
}

impl ExecutorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// A limit of 0 means unbounded.
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = (limit > 0).then_some(limit);
        self
    }

    pub fn with_events(mut self, sender: Sender<ExecutorEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Reads `MINIEXEC_MAX_CONCURRENCY`. Unset, empty or `0` means unbounded.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(raw) = lookup(MAX_CONCURRENCY_ENV) {
            let raw = raw.trim();
            if !raw.is_empty() {
                let limit = raw.parse::<usize>().map_err(|e| ConfigError::InvalidValue {
                    key: MAX_CONCURRENCY_ENV,
                    value: raw.to_string(),
                    reason: e.to_string(),
                })?;
                config = config.with_max_concurrency(limit);
            }
        }
        Ok(config)
    }
}
