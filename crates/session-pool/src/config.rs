//! Pool tuning knobs
//!
//! All scheduling and cooldown thresholds in one place, loadable from a
//! TOML file with serde defaults. Every field has a default matching the
//! pool's documented behavior, so an empty file is a valid configuration.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Pool configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// Simultaneous operations allowed per session
    #[serde(default = "default_concurrency")]
    pub per_session_concurrency: usize,
    /// Consecutive errors before a session enters cooldown
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,
    /// Base cooldown window in seconds
    #[serde(default = "default_base_cooldown")]
    pub base_cooldown_secs: u64,
    /// Rate-limit waits above this many seconds trigger cooldown
    #[serde(default = "default_flood_wait_threshold")]
    pub flood_wait_threshold_secs: u64,
    /// Multiplier applied to a reported rate-limit wait when computing
    /// its cooldown window
    #[serde(default = "default_flood_wait_multiplier")]
    pub flood_wait_multiplier: f64,
    /// How long a non-blocking scan waits for a permit before moving to
    /// the next candidate. A latency/fairness trade-off, not a
    /// correctness requirement.
    #[serde(default = "default_permit_probe")]
    pub permit_probe_millis: u64,
    /// Bound on the liveness health probe
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    /// Interval between background liveness sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_concurrency() -> usize {
    3
}

fn default_error_threshold() -> u32 {
    5
}

fn default_base_cooldown() -> u64 {
    300
}

fn default_flood_wait_threshold() -> u64 {
    10
}

fn default_flood_wait_multiplier() -> f64 {
    1.5
}

fn default_permit_probe() -> u64 {
    50
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_sweep_interval() -> u64 {
    60
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            per_session_concurrency: default_concurrency(),
            error_threshold: default_error_threshold(),
            base_cooldown_secs: default_base_cooldown(),
            flood_wait_threshold_secs: default_flood_wait_threshold(),
            flood_wait_multiplier: default_flood_wait_multiplier(),
            permit_probe_millis: default_permit_probe(),
            probe_timeout_secs: default_probe_timeout(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl PoolConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;
        let config: PoolConfig = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("parsing {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would disable the pool outright.
    pub fn validate(&self) -> Result<()> {
        if self.per_session_concurrency == 0 {
            return Err(Error::Config(
                "per_session_concurrency must be greater than 0".into(),
            ));
        }
        if self.error_threshold == 0 {
            return Err(Error::Config("error_threshold must be greater than 0".into()));
        }
        if self.base_cooldown_secs == 0 {
            return Err(Error::Config(
                "base_cooldown_secs must be greater than 0".into(),
            ));
        }
        if self.flood_wait_multiplier < 1.0 {
            return Err(Error::Config(
                "flood_wait_multiplier must be at least 1.0".into(),
            ));
        }
        Ok(())
    }

    /// Base cooldown window.
    pub fn base_cooldown(&self) -> Duration {
        Duration::from_secs(self.base_cooldown_secs)
    }

    /// Permit probe window for the non-blocking scan.
    pub fn permit_probe(&self) -> Duration {
        Duration::from_millis(self.permit_probe_millis)
    }

    /// Health probe bound.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Background sweep interval.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Cooldown window for a reported rate-limit wait.
    ///
    /// The remote service told us exactly how long to back off, so the
    /// window is the scaled wait itself — it overwrites whatever window is
    /// in effect and may be shorter than the base error cooldown.
    /// The wait arrives from the remote service, so an absurd value must
    /// not panic: if the scaled product overflows `Duration`, fall back to
    /// the unscaled wait, which always fits.
    pub fn flood_wait_cooldown(&self, wait_secs: u64) -> Duration {
        Duration::try_from_secs_f64(wait_secs as f64 * self.flood_wait_multiplier)
            .unwrap_or_else(|_| Duration::from_secs(wait_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_documented_values() {
        let config = PoolConfig::default();
        assert_eq!(config.per_session_concurrency, 3);
        assert_eq!(config.error_threshold, 5);
        assert_eq!(config.base_cooldown_secs, 300);
        assert_eq!(config.flood_wait_threshold_secs, 10);
        assert_eq!(config.flood_wait_multiplier, 1.5);
        assert_eq!(config.permit_probe_millis, 50);
        config.validate().unwrap();
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let config: PoolConfig = toml::from_str("").unwrap();
        assert_eq!(config.per_session_concurrency, 3);
        assert_eq!(config.base_cooldown_secs, 300);
    }

    #[test]
    fn load_partial_toml_overlays_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.toml");
        std::fs::write(
            &path,
            "per_session_concurrency = 8\nbase_cooldown_secs = 60\n",
        )
        .unwrap();

        let config = PoolConfig::load(&path).unwrap();
        assert_eq!(config.per_session_concurrency, 8);
        assert_eq!(config.base_cooldown_secs, 60);
        assert_eq!(config.error_threshold, 5);
    }

    #[test]
    fn load_missing_file_errors() {
        let result = PoolConfig::load(Path::new("/nonexistent/pool.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn zero_concurrency_rejected() {
        let config = PoolConfig {
            per_session_concurrency: 0,
            ..PoolConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_error_threshold_rejected() {
        let config = PoolConfig {
            error_threshold: 0,
            ..PoolConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn sub_unit_multiplier_rejected() {
        let config = PoolConfig {
            flood_wait_multiplier: 0.5,
            ..PoolConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn flood_wait_cooldown_is_scaled_wait_not_base() {
        let config = PoolConfig {
            base_cooldown_secs: 300,
            ..PoolConfig::default()
        };
        // 20s wait scales to 30s. The explicit rate-limit signal wins even
        // when shorter than the base error cooldown.
        assert_eq!(config.flood_wait_cooldown(20), Duration::from_secs(30));
        assert_eq!(config.flood_wait_cooldown(400), Duration::from_secs(600));
    }

    #[test]
    fn flood_wait_cooldown_survives_absurd_waits() {
        let config = PoolConfig::default();
        // The scaled product overflows Duration; the unscaled wait is
        // returned instead of panicking
        assert_eq!(
            config.flood_wait_cooldown(u64::MAX),
            Duration::from_secs(u64::MAX)
        );
    }
}
