//! Configuration System using Figment
//!
//! Configuration is layered, later layers winning:
//! 1. Built-in defaults
//! 2. A TOML file (`config/rowing_daq.toml` unless a path is given)
//! 3. Environment variables prefixed with `ROWING_DAQ_`, nested with `__`
//!
//! # Example
//! ```no_run
//! use rowing_daq::config::Config;
//!
//! let config = Config::load()?;
//! println!("Application: {}", config.application.name);
//! # Ok::<(), rowing_daq::error::RowError>(())
//! ```

use crate::error::{AppResult, RowError};
use crate::metrics::power::DEFAULT_WATTS_CONSTANT;
use crate::session::{MAX_SAMPLES, SUMMARY_POINTS};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/rowing_daq.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "ROWING_DAQ_";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application settings
    pub application: ApplicationConfig,
    /// Session recording
    pub session: SessionConfig,
    /// Demo generator
    pub demo: DemoConfig,
    /// Pace to power conversion
    pub power: PowerConfig,
    /// Live link handling
    pub link: LinkConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "Rowing DAQ".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

/// Session recording configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Samples kept in the live buffer
    pub max_samples: usize,
    /// Samples kept in a session summary
    pub summary_points: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_samples: MAX_SAMPLES,
            summary_points: SUMMARY_POINTS,
        }
    }
}

/// Demo generator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Tick period in milliseconds
    pub period_ms: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self { period_ms: 1000 }
    }
}

/// Power model configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerConfig {
    /// Constant `C` in `watts = C / (pace / 500)^3`
    pub watts_constant: f64,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            watts_constant: DEFAULT_WATTS_CONSTANT,
        }
    }
}

/// Live link configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Bound of the source event queue
    pub event_capacity: usize,
    /// Connect attempt timeout in milliseconds
    pub connect_timeout_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            event_capacity: 64,
            connect_timeout_ms: 15_000,
        }
    }
}

impl Config {
    /// Load from the default file location and environment.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    /// Example override: `ROWING_DAQ_APPLICATION__LOG_LEVEL=debug`
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file path and environment, then validate.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: Self = Self::figment(path.as_ref()).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// The layered provider chain, exposed for callers adding their own layers.
    #[must_use]
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        if !LOG_LEVELS.contains(&self.application.log_level.as_str()) {
            return Err(RowError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                LOG_LEVELS.join(", ")
            )));
        }

        if !LOG_FORMATS.contains(&self.application.log_format.as_str()) {
            return Err(RowError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                LOG_FORMATS.join(", ")
            )));
        }

        if self.session.max_samples == 0 {
            return Err(RowError::Configuration(
                "session.max_samples must be at least 1".to_string(),
            ));
        }

        if self.session.summary_points == 0 {
            return Err(RowError::Configuration(
                "session.summary_points must be at least 1".to_string(),
            ));
        }

        if self.demo.period_ms == 0 {
            return Err(RowError::Configuration(
                "demo.period_ms must be at least 1".to_string(),
            ));
        }

        let constant = self.power.watts_constant;
        if !constant.is_finite() || constant <= 0.0 {
            return Err(RowError::Configuration(format!(
                "Invalid power.watts_constant {constant}. Must be a positive number"
            )));
        }

        if self.link.event_capacity == 0 {
            return Err(RowError::Configuration(
                "link.event_capacity must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session.max_samples, 300);
        assert_eq!(config.session.summary_points, 240);
        assert_eq!(config.power.watts_constant, 2.8);
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[application]
log_level = "debug"

[power]
watts_constant = 3.1
"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.application.log_level, "debug");
        assert_eq!(config.application.log_format, "pretty");
        assert_eq!(config.power.watts_constant, 3.1);
        assert_eq!(config.link.event_capacity, 64);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("rowing.toml", "[demo]\nperiod_ms = 500\n")?;
            jail.set_env("ROWING_DAQ_DEMO__PERIOD_MS", "250");

            let config: Config = Config::figment(Path::new("rowing.toml")).extract()?;
            assert_eq!(config.demo.period_ms, 250);
            Ok(())
        });
    }

    #[test]
    fn rejects_bad_values() {
        let mut config = Config::default();
        config.application.log_level = "verbose".to_string();
        assert!(matches!(config.validate(), Err(RowError::Configuration(_))));

        let mut config = Config::default();
        config.application.log_format = "xml".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.power.watts_constant = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.power.watts_constant = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.session.max_samples = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.link.event_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[session]\nmax_samples = \"many\"").unwrap();
        let err = Config::load_from(file.path()).unwrap_err();
        assert!(matches!(err, RowError::Config(_)));
    }
}
