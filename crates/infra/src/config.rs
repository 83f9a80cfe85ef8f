//! Tracker configuration.

use std::str::FromStr;

const ENV_WORKER_PREFIX: &str = "REQWATCH_WORKER_PREFIX";
const ENV_CHANNEL_CAPACITY: &str = "REQWATCH_CHANNEL_CAPACITY";
const ENV_JOIN_ON_STOP: &str = "REQWATCH_JOIN_ON_STOP";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Subscription tracker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Prefix for worker thread names (`<prefix>-<job id>`)
    pub worker_name_prefix: String,
    /// Capacity of each worker's request channel (0 = rendezvous)
    pub request_channel_capacity: usize,
    /// Whether `stop` waits for worker threads to exit
    pub join_workers_on_stop: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            worker_name_prefix: "reqwatch-sub".to_string(),
            request_channel_capacity: 0,
            join_workers_on_stop: true,
        }
    }
}

impl TrackerConfig {
    /// Load from the environment, falling back to defaults for unset keys.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary key lookup (tests inject a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(prefix) = lookup(ENV_WORKER_PREFIX) {
            let prefix = prefix.trim();
            if prefix.is_empty() {
                return Err(ConfigError::Invalid {
                    key: ENV_WORKER_PREFIX,
                    value: prefix.to_string(),
                });
            }
            cfg.worker_name_prefix = prefix.to_string();
        }
        if let Some(raw) = lookup(ENV_CHANNEL_CAPACITY) {
            cfg.request_channel_capacity = parse(ENV_CHANNEL_CAPACITY, &raw)?;
        }
        if let Some(raw) = lookup(ENV_JOIN_ON_STOP) {
            cfg.join_workers_on_stop = parse(ENV_JOIN_ON_STOP, &raw)?;
        }

        Ok(cfg)
    }

    pub fn with_worker_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.worker_name_prefix = prefix.into();
        self
    }

    pub fn with_request_channel_capacity(mut self, capacity: usize) -> Self {
        self.request_channel_capacity = capacity;
        self
    }

    pub fn with_join_workers_on_stop(mut self, join: bool) -> Self {
        self.join_workers_on_stop = join;
        self
    }
}

fn parse<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = TrackerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, TrackerConfig::default());
    }

    #[test]
    fn reads_overrides() {
        let cfg = TrackerConfig::from_lookup(lookup(&[
            (ENV_WORKER_PREFIX, "irita"),
            (ENV_CHANNEL_CAPACITY, " 16 "),
            (ENV_JOIN_ON_STOP, "false"),
        ]))
        .unwrap();

        assert_eq!(cfg.worker_name_prefix, "irita");
        assert_eq!(cfg.request_channel_capacity, 16);
        assert!(!cfg.join_workers_on_stop);
    }

    #[test]
    fn rejects_bad_values() {
        let err = TrackerConfig::from_lookup(lookup(&[(ENV_CHANNEL_CAPACITY, "lots")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: ENV_CHANNEL_CAPACITY,
                value: "lots".to_string()
            }
        );
        assert!(TrackerConfig::from_lookup(lookup(&[(ENV_WORKER_PREFIX, " ")])).is_err());
    }
}
