//! Per-runner configuration: defaults, environment overrides and config files.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::cache::{CacheOptions, Retention};

pub const ENV_VERIFY: &str = "FASTPATH_VERIFY";
pub const ENV_RETENTION: &str = "FASTPATH_RETENTION";
pub const ENV_FAILURE_POLICY: &str = "FASTPATH_FAILURE_POLICY";
pub const ENV_BUILD_TIMEOUT_MS: &str = "FASTPATH_BUILD_TIMEOUT_MS";
pub const ENV_RETRY_FAILED: &str = "FASTPATH_RETRY_FAILED";
pub const ENV_MAX_FAILED: &str = "FASTPATH_MAX_FAILED";

/// What a runner does when no specialization is available for a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Run the original routine with the full argument list.
    #[default]
    FallbackToOriginal,
    /// Run the newest generation ever published, falling back to the original
    /// when there is none. Only sound when older specializations stay valid
    /// for new stable inputs.
    ServeLastGood,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text.trim().to_ascii_lowercase().as_str() {
            "fallback" | "fallback_to_original" | "original" => Ok(FailurePolicy::FallbackToOriginal),
            "last_good" | "serve_last_good" => Ok(FailurePolicy::ServeLastGood),
            _ => Err(format!("unknown failure policy `{text}`")),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailurePolicy::FallbackToOriginal => "fallback_to_original",
            FailurePolicy::ServeLastGood => "serve_last_good",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Also run the original routine on every call and compare results.
    pub verify: bool,
    pub retention: Retention,
    pub failure_policy: FailurePolicy,
    /// Upper bound on waiting for another caller's build.
    pub build_timeout_ms: Option<u64>,
    pub retry_failed: bool,
    pub max_failed_entries: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        let cache = CacheOptions::default();
        Self {
            verify: false,
            retention: cache.retention,
            failure_policy: FailurePolicy::default(),
            build_timeout_ms: None,
            retry_failed: cache.retry_failed,
            max_failed_entries: cache.max_failed_entries,
        }
    }
}

impl RunnerConfig {
    /// Defaults overridden by `FASTPATH_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`RunnerConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        config.apply_overrides(lookup);
        config
    }

    /// Apply `FASTPATH_*` overrides on top of this configuration. Values that
    /// do not parse are ignored with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(verify) = parse_var(&lookup, ENV_VERIFY, parse_flag) {
            self.verify = verify;
        }
        if let Some(retention) = parse_var(&lookup, ENV_RETENTION, |text| text.parse().ok()) {
            self.retention = retention;
        }
        if let Some(policy) = parse_var(&lookup, ENV_FAILURE_POLICY, |text| text.parse().ok()) {
            self.failure_policy = policy;
        }
        if let Some(timeout) = parse_var(&lookup, ENV_BUILD_TIMEOUT_MS, |text| text.trim().parse().ok()) {
            self.build_timeout_ms = Some(timeout);
        }
        if let Some(retry) = parse_var(&lookup, ENV_RETRY_FAILED, parse_flag) {
            self.retry_failed = retry;
        }
        if let Some(max) = parse_var(&lookup, ENV_MAX_FAILED, |text| text.trim().parse().ok()) {
            self.max_failed_entries = max;
        }
    }

    /// Load a YAML or JSON file (TOML with the `toml-config` feature), chosen
    /// by extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runner config {}", path.display()))?;
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let config = match extension.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&text)
                .with_context(|| format!("invalid YAML in {}", path.display()))?,
            "json" => serde_json::from_str(&text)
                .with_context(|| format!("invalid JSON in {}", path.display()))?,
            #[cfg(feature = "toml-config")]
            "toml" => toml::from_str(&text).with_context(|| format!("invalid TOML in {}", path.display()))?,
            other => bail!(
                "unsupported config format `{other}` for {}",
                path.display()
            ),
        };
        Ok(config)
    }

    pub fn build_timeout(&self) -> Option<Duration> {
        self.build_timeout_ms.map(Duration::from_millis)
    }

    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            retention: self.retention,
            build_timeout: self.build_timeout(),
            retry_failed: self.retry_failed,
            max_failed_entries: self.max_failed_entries,
        }
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let raw = lookup(key)?;
    let parsed = parse(&raw);
    if parsed.is_none() {
        tracing::warn!(variable = key, value = %raw, "ignoring unparsable setting");
    }
    parsed
}

fn parse_flag(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn overrides_come_from_the_environment() {
        let config = RunnerConfig::from_lookup(lookup(&[
            (ENV_VERIFY, "yes"),
            (ENV_RETENTION, "recent:4"),
            (ENV_FAILURE_POLICY, "serve_last_good"),
            (ENV_BUILD_TIMEOUT_MS, "250"),
            (ENV_MAX_FAILED, "2"),
        ]));
        assert!(config.verify);
        assert_eq!(config.retention, Retention::MostRecent(4));
        assert_eq!(config.failure_policy, FailurePolicy::ServeLastGood);
        assert_eq!(config.build_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.max_failed_entries, 2);
        assert!(!config.retry_failed);
    }

    #[test]
    fn unparsable_values_keep_defaults() {
        let config = RunnerConfig::from_lookup(lookup(&[(ENV_VERIFY, "maybe"), (ENV_RETENTION, "forever")]));
        assert_eq!(config, RunnerConfig::default());
    }
}
