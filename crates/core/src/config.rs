//! Ledger configuration.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};
use crate::policy::FixedWindowPolicy;

pub const ENV_EPOCH_LENGTH: &str = "LAPSE_EPOCH_LENGTH";
pub const ENV_WINDOW_EPOCHS: &str = "LAPSE_WINDOW_EPOCHS";
pub const ENV_EVICTION: &str = "LAPSE_EVICTION";

/// How expired entries are detached from an account's index on write.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionStrategy {
    /// Always relink the head and recount survivors.
    Lazy,
    /// Always unlink every expired node.
    Eager,
    /// Pick whichever of the two walks fewer nodes.
    #[default]
    Adaptive,
}

impl FromStr for EvictionStrategy {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lazy" => Ok(Self::Lazy),
            "eager" => Ok(Self::Eager),
            "adaptive" => Ok(Self::Adaptive),
            other => Err(LedgerError::config(format!(
                "unknown eviction strategy '{other}' (expected lazy, eager or adaptive)"
            ))),
        }
    }
}

/// Parameters of the validity window plus eviction tuning.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Pointer units per epoch.
    pub epoch_length: u64,
    /// Number of epochs a deposit stays spendable.
    pub window_epochs: u64,
    pub eviction: EvictionStrategy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            epoch_length: 100,
            window_epochs: 4,
            eviction: EvictionStrategy::Adaptive,
        }
    }
}

impl LedgerConfig {
    /// Load from `LAPSE_*` environment variables, falling back to defaults.
    pub fn from_env() -> LedgerResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary key lookup (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> LedgerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let epoch_length = read_or(&lookup, ENV_EPOCH_LENGTH, defaults.epoch_length)?;
        let window_epochs = read_or(&lookup, ENV_WINDOW_EPOCHS, defaults.window_epochs)?;
        let eviction = read_or(&lookup, ENV_EVICTION, defaults.eviction)?;

        let config = Self {
            epoch_length,
            window_epochs,
            eviction,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> LedgerResult<()> {
        FixedWindowPolicy::new(self.epoch_length, self.window_epochs).map(|_| ())
    }

    /// Build the fixed-size window policy these parameters describe.
    pub fn policy(&self) -> LedgerResult<FixedWindowPolicy> {
        FixedWindowPolicy::new(self.epoch_length, self.window_epochs)
    }
}

fn read_or<F, T>(lookup: &F, key: &str, default: T) -> LedgerResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + core::fmt::Debug,
    T::Err: core::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| LedgerError::config(format!("{key}: {e}"))),
        None => {
            tracing::warn!("{key} not set; using default {default:?}");
            Ok(default)
        }
    }
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
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config = LedgerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, LedgerConfig::default());
    }

    #[test]
    fn reads_every_key() {
        let config = LedgerConfig::from_lookup(lookup(&[
            (ENV_EPOCH_LENGTH, "7"),
            (ENV_WINDOW_EPOCHS, " 3 "),
            (ENV_EVICTION, "Eager"),
        ]))
        .unwrap();
        assert_eq!(config.epoch_length, 7);
        assert_eq!(config.window_epochs, 3);
        assert_eq!(config.eviction, EvictionStrategy::Eager);
    }

    #[test]
    fn malformed_values_are_config_errors() {
        let err = LedgerConfig::from_lookup(lookup(&[(ENV_EPOCH_LENGTH, "ten")])).unwrap_err();
        assert!(matches!(err, LedgerError::Config(msg) if msg.contains(ENV_EPOCH_LENGTH)));

        let err = LedgerConfig::from_lookup(lookup(&[(ENV_EVICTION, "sometimes")])).unwrap_err();
        assert!(matches!(err, LedgerError::Config(_)));

        let err = LedgerConfig::from_lookup(lookup(&[(ENV_WINDOW_EPOCHS, "0")])).unwrap_err();
        assert!(matches!(err, LedgerError::Config(_)));
    }

    #[test]
    fn deserializes_partial_json() {
        let config: LedgerConfig =
            serde_json::from_str(r#"{ "epoch_length": 12, "eviction": "lazy" }"#).unwrap();
        assert_eq!(config.epoch_length, 12);
        assert_eq!(config.window_epochs, 4);
        assert_eq!(config.eviction, EvictionStrategy::Lazy);
        assert_eq!(config.policy().unwrap().window_epochs(), 4);
    }
}
