//! Runtime configuration for the tracking and session core.
//!
//! Every knob has a production default; environment variables override
//! them so deployments (and tests) can tune cadences without a rebuild.
//! The accuracy gate and outlier thresholds are tuning defaults, not
//! physical constants.

use std::env;
use std::time::Duration;

/// Core configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Liveness ---
    /// Seconds without any signal before a participant counts as inactive.
    pub inactivity_threshold_secs: u64,
    /// Extra grace on top of the inactivity threshold before the stale-session
    /// sweep force-ends a session.
    pub stale_session_grace_secs: u64,

    // --- GPS filtering ---
    /// Samples with horizontal accuracy beyond this many meters are dropped.
    pub accuracy_ceiling_m: f64,
    /// Single-step distance deltas beyond this are discarded as GPS glitches.
    pub distance_outlier_m: f64,
    /// Minimum displacement between accepted fixes.
    pub min_displacement_m: f64,

    // --- Remote write cadences ---
    /// Interval between batched buffer flushes.
    pub flush_interval_secs: u64,
    /// Maximum buffered points written per flush firing.
    pub max_flush_batch: usize,
    /// Interval between realtime position pings (map display).
    pub position_ping_interval_secs: u64,
    /// Interval between full route-document autosaves.
    pub route_autosave_interval_secs: u64,

    // --- Battery saver ---
    /// When set, widens the displacement filter and the flush interval.
    pub battery_saver: bool,
    pub battery_min_displacement_m: f64,
    pub battery_flush_interval_secs: u64,

    // --- Remote I/O ---
    /// Deadline applied to awaited remote operations.
    pub remote_timeout_secs: u64,
    /// TTL of the short-lived list-query cache.
    pub list_cache_ttl_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            inactivity_threshold_secs: 60,
            stale_session_grace_secs: 300,
            accuracy_ceiling_m: 50.0,
            distance_outlier_m: 100.0,
            min_displacement_m: 5.0,
            flush_interval_secs: 30,
            max_flush_batch: 10,
            position_ping_interval_secs: 15,
            route_autosave_interval_secs: 180,
            battery_saver: false,
            battery_min_displacement_m: 25.0,
            battery_flush_interval_secs: 90,
            remote_timeout_secs: 10,
            list_cache_ttl_secs: 3,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let mut config = Self::default();

        config.inactivity_threshold_secs =
            env_u64("SQUADRUN_INACTIVITY_THRESHOLD_SECS", config.inactivity_threshold_secs)?;
        config.stale_session_grace_secs =
            env_u64("SQUADRUN_STALE_GRACE_SECS", config.stale_session_grace_secs)?;
        config.accuracy_ceiling_m = env_f64("SQUADRUN_ACCURACY_CEILING_M", config.accuracy_ceiling_m)?;
        config.distance_outlier_m = env_f64("SQUADRUN_DISTANCE_OUTLIER_M", config.distance_outlier_m)?;
        config.min_displacement_m = env_f64("SQUADRUN_MIN_DISPLACEMENT_M", config.min_displacement_m)?;
        config.flush_interval_secs = env_u64("SQUADRUN_FLUSH_INTERVAL_SECS", config.flush_interval_secs)?;
        config.max_flush_batch = env_u64("SQUADRUN_MAX_FLUSH_BATCH", config.max_flush_batch as u64)? as usize;
        config.position_ping_interval_secs =
            env_u64("SQUADRUN_POSITION_PING_SECS", config.position_ping_interval_secs)?;
        config.route_autosave_interval_secs =
            env_u64("SQUADRUN_ROUTE_AUTOSAVE_SECS", config.route_autosave_interval_secs)?;
        config.battery_saver = env::var("SQUADRUN_BATTERY_SAVER")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(config.battery_saver);
        config.remote_timeout_secs = env_u64("SQUADRUN_REMOTE_TIMEOUT_SECS", config.remote_timeout_secs)?;
        config.list_cache_ttl_secs = env_u64("SQUADRUN_LIST_CACHE_TTL_SECS", config.list_cache_ttl_secs)?;

        if config.max_flush_batch == 0 {
            return Err(ConfigError::Invalid("SQUADRUN_MAX_FLUSH_BATCH must be > 0"));
        }
        if config.accuracy_ceiling_m <= 0.0 {
            return Err(ConfigError::Invalid("SQUADRUN_ACCURACY_CEILING_M must be > 0"));
        }

        Ok(config)
    }

    /// Displacement filter after applying battery-saver widening.
    pub fn effective_min_displacement_m(&self) -> f64 {
        if self.battery_saver {
            self.battery_min_displacement_m
        } else {
            self.min_displacement_m
        }
    }

    /// Flush interval after applying battery-saver widening.
    pub fn effective_flush_interval(&self) -> Duration {
        let secs = if self.battery_saver {
            self.battery_flush_interval_secs
        } else {
            self.flush_interval_secs
        };
        Duration::from_secs(secs)
    }

    pub fn position_ping_interval(&self) -> Duration {
        Duration::from_secs(self.position_ping_interval_secs)
    }

    pub fn route_autosave_interval(&self) -> Duration {
        Duration::from_secs(self.route_autosave_interval_secs)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    pub fn inactivity_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.inactivity_threshold_secs as i64)
    }

    pub fn list_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.list_cache_ttl_secs)
    }
}

fn env_u64(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(v) => v.parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

fn env_f64(key: &'static str, default: f64) -> Result<f64, ConfigError> {
    match env::var(key) {
        Ok(v) => v.parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.inactivity_threshold_secs, 60);
        assert_eq!(config.accuracy_ceiling_m, 50.0);
        assert_eq!(config.distance_outlier_m, 100.0);
        assert_eq!(config.max_flush_batch, 10);
        assert_eq!(config.flush_interval_secs, 30);
    }

    #[test]
    fn test_battery_saver_widens_cadences() {
        let mut config = Config::default();
        assert_eq!(config.effective_min_displacement_m(), 5.0);
        assert_eq!(config.effective_flush_interval(), Duration::from_secs(30));

        config.battery_saver = true;
        assert_eq!(config.effective_min_displacement_m(), 25.0);
        assert_eq!(config.effective_flush_interval(), Duration::from_secs(90));
    }
}
