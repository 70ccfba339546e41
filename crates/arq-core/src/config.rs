//! Configuration: per-component sections loaded from
//! `~/.config/arq/config.toml`, with a default file written on first run.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::feedback::FeedbackPolicy;
use crate::queue::SchedulerConfig;
use crate::retry::RetryPolicy;

/// Retry policy parameters (`[retry]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Double the delay on each retry; constant delay when false.
    pub exponential_backoff: bool,
    /// Backoff ceiling, in milliseconds.
    pub max_delay_ms: u64,
    /// Upper bound on random jitter, in milliseconds. Zero disables it.
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            exponential_backoff: true,
            max_delay_ms: 30_000,
            jitter_ms: 300,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            exponential: self.exponential_backoff,
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: Duration::from_millis(self.jitter_ms),
        }
    }
}

/// Response cache parameters (`[cache]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL applied when the caller does not pass one, in milliseconds.
    pub default_ttl_ms: u64,
    /// Expired-entry sweep period, in milliseconds.
    pub sweep_interval_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: 5 * 60 * 1000,
            sweep_interval_ms: 60_000,
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

/// Scheduler parameters (`[queue]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub max_concurrent: usize,
    pub default_timeout_ms: u64,
    pub merge_window_ms: u64,
    pub enable_merging: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 6,
            default_timeout_ms: 30_000,
            merge_window_ms: 50,
            enable_merging: true,
        }
    }
}

impl QueueConfig {
    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_concurrent: self.max_concurrent,
            default_timeout: Duration::from_millis(self.default_timeout_ms),
            merge_window: Duration::from_millis(self.merge_window_ms),
            enable_merging: self.enable_merging,
        }
    }
}

/// Network monitor parameters (`[monitor]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Lightweight probe target; any endpoint with a cheap HEAD works.
    pub ping_url: String,
    pub ping_timeout_ms: u64,
    pub ping_frequency_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            ping_url: "https://www.google.com/generate_204".to_string(),
            ping_timeout_ms: 3000,
            ping_frequency_ms: 30_000,
        }
    }
}

impl MonitorConfig {
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn ping_frequency(&self) -> Duration {
        Duration::from_millis(self.ping_frequency_ms)
    }
}

/// Offline replay pacing (`[offline]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
    pub batch_size: usize,
    pub batch_pause_ms: u64,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            batch_size: 3,
            batch_pause_ms: 300,
        }
    }
}

impl OfflineConfig {
    pub fn pacing(&self) -> crate::offline::OfflineConfig {
        crate::offline::OfflineConfig {
            batch_size: self.batch_size.max(1),
            batch_pause: Duration::from_millis(self.batch_pause_ms),
        }
    }
}

/// Feedback side effects (`[feedback]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub notify_user: bool,
    pub update_global_error: bool,
    pub report_errors: bool,
    /// Telemetry endpoint; reporting stays off without one.
    pub report_endpoint: Option<String>,
    pub log_details: bool,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            notify_user: true,
            update_global_error: false,
            report_errors: false,
            report_endpoint: None,
            log_details: true,
        }
    }
}

impl FeedbackConfig {
    pub fn policy(&self) -> FeedbackPolicy {
        FeedbackPolicy {
            notify_user: self.notify_user,
            update_global_error: self.update_global_error,
            report_errors: self.report_errors && self.report_endpoint.is_some(),
            log_details: self.log_details,
        }
    }
}

/// Payload-level failure detection (`[business]` section).
///
/// Backends following the `{ code, message, data }` envelope convention
/// mark failures with a non-success `code` even on HTTP 2xx. The success
/// set is configuration, not a wire contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessConfig {
    pub enabled: bool,
    pub success_codes: Vec<i64>,
}

impl Default for BusinessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            success_codes: vec![0, 200],
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArqConfig {
    pub retry: RetryConfig,
    pub cache: CacheConfig,
    pub queue: QueueConfig,
    pub monitor: MonitorConfig,
    pub offline: OfflineConfig,
    pub feedback: FeedbackConfig,
    pub business: BusinessConfig,
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("arq")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<ArqConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = ArqConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: ArqConfig = toml::from_str(&data)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = ArqConfig::default();
        assert_eq!(cfg.retry.max_retries, 3);
        assert_eq!(cfg.retry.base_delay_ms, 1000);
        assert_eq!(cfg.cache.default_ttl_ms, 300_000);
        assert_eq!(cfg.queue.max_concurrent, 6);
        assert_eq!(cfg.queue.merge_window_ms, 50);
        assert_eq!(cfg.offline.batch_size, 3);
        assert!(cfg.business.enabled);
        assert_eq!(cfg.business.success_codes, vec![0, 200]);
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = ArqConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: ArqConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.retry.max_retries, cfg.retry.max_retries);
        assert_eq!(parsed.queue.max_concurrent, cfg.queue.max_concurrent);
        assert_eq!(parsed.monitor.ping_url, cfg.monitor.ping_url);
    }

    #[test]
    fn partial_sections_fall_back_to_defaults() {
        let toml = r#"
            [retry]
            max_retries = 5

            [queue]
            max_concurrent = 2
        "#;
        let cfg: ArqConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.retry.max_retries, 5);
        assert_eq!(cfg.retry.base_delay_ms, 1000);
        assert_eq!(cfg.queue.max_concurrent, 2);
        assert!(cfg.queue.enable_merging);
        assert_eq!(cfg.cache.default_ttl_ms, 300_000);
    }

    #[test]
    fn retry_section_converts_to_policy() {
        let toml = r#"
            [retry]
            max_retries = 2
            base_delay_ms = 250
            exponential_backoff = false
            max_delay_ms = 4000
            jitter_ms = 0
        "#;
        let cfg: ArqConfig = toml::from_str(toml).unwrap();
        let policy = cfg.retry.policy();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
        assert!(!policy.exponential);
        assert_eq!(policy.jitter, Duration::ZERO);
    }

    #[test]
    fn feedback_reporting_requires_an_endpoint() {
        let cfg = FeedbackConfig {
            report_errors: true,
            report_endpoint: None,
            ..FeedbackConfig::default()
        };
        assert!(!cfg.policy().report_errors);

        let cfg = FeedbackConfig {
            report_errors: true,
            report_endpoint: Some("https://telemetry.example.com/errors".into()),
            ..FeedbackConfig::default()
        };
        assert!(cfg.policy().report_errors);
    }
}
