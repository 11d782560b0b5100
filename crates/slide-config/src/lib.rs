//! Multi-tier TOML configuration for Slide.
//!
//! Reads tracker settings from multiple sources with precedence:
//! CLI overrides > env vars > config file > defaults

pub mod error;

pub use error::ConfigError;

use serde::{Deserialize, Serialize};
use slide_core::TrackerConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Overrides the config directory (default `~/.slide`).
pub const ENV_CONFIG_DIR: &str = "SLIDE_CONFIG_DIR";
pub const ENV_JANITOR_INTERVAL_MS: &str = "SLIDE_JANITOR_INTERVAL_MS";
pub const ENV_INACTIVITY_TIMEOUT_MS: &str = "SLIDE_INACTIVITY_TIMEOUT_MS";
pub const ENV_MAX_LIFETIME_MS: &str = "SLIDE_MAX_LIFETIME_MS";
pub const ENV_ABANDON_AFTER_MS: &str = "SLIDE_ABANDON_AFTER_MS";

/// Resolved configuration.
#[derive(Debug, Clone)]
pub struct SlideConfig {
    pub tracker: TrackerConfig,
    pub config_dir: PathBuf,
}

/// Settings that can be read from a TOML config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub tracker: TrackerSettings,
}

/// `[tracker]` section of the config file. All values are milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackerSettings {
    pub janitor_interval_ms: Option<u64>,
    pub inactivity_timeout_ms: Option<u64>,
    pub max_lifetime_ms: Option<u64>,
    /// Unset keeps retired sessions until their last event ends.
    pub abandon_after_ms: Option<u64>,
}

/// CLI overrides that take highest precedence.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    /// Read this file instead of `<config dir>/config.toml`.
    pub config_file: Option<PathBuf>,
    pub janitor_interval_ms: Option<u64>,
    pub inactivity_timeout_ms: Option<u64>,
    pub max_lifetime_ms: Option<u64>,
    pub abandon_after_ms: Option<u64>,
}

impl SlideConfig {
    /// Load configuration from all sources, applying precedence rules.
    ///
    /// Precedence (highest to lowest):
    /// 1. CLI flags
    /// 2. Environment variables
    /// 3. Config file (`--config`, or ~/.slide/config.toml)
    /// 4. Defaults
    ///
    /// An explicitly named config file must exist and parse; problems with
    /// the default file are logged and ignored.
    pub fn load(overrides: CliOverrides) -> Result<Self, ConfigError> {
        let config_dir = config_dir();
        let settings = match &overrides.config_file {
            Some(path) => read_settings_file(path)?,
            None => load_settings_file(&config_dir.join("config.toml")),
        };
        let tracker = resolve(&overrides, |key| std::env::var(key).ok(), &settings)?;
        Ok(SlideConfig {
            tracker,
            config_dir,
        })
    }
}

/// Merge overrides, environment (looked up through `env`) and file settings
/// into a tracker configuration.
pub fn resolve<E>(
    overrides: &CliOverrides,
    env: E,
    settings: &SettingsFile,
) -> Result<TrackerConfig, ConfigError>
where
    E: Fn(&str) -> Option<String>,
{
    let defaults = TrackerConfig::default();
    let file = &settings.tracker;

    let janitor_interval = overrides
        .janitor_interval_ms
        .or(env_millis(&env, ENV_JANITOR_INTERVAL_MS)?)
        .or(file.janitor_interval_ms)
        .map(|ms| positive_millis("janitor_interval_ms", ms))
        .transpose()?
        .unwrap_or(defaults.janitor_interval);

    let inactivity_timeout = overrides
        .inactivity_timeout_ms
        .or(env_millis(&env, ENV_INACTIVITY_TIMEOUT_MS)?)
        .or(file.inactivity_timeout_ms)
        .map(|ms| positive_millis("inactivity_timeout_ms", ms))
        .transpose()?
        .unwrap_or(defaults.inactivity_timeout);

    let max_lifetime = overrides
        .max_lifetime_ms
        .or(env_millis(&env, ENV_MAX_LIFETIME_MS)?)
        .or(file.max_lifetime_ms)
        .map(|ms| positive_millis("max_lifetime_ms", ms))
        .transpose()?;

    let abandon_after = overrides
        .abandon_after_ms
        .or(env_millis(&env, ENV_ABANDON_AFTER_MS)?)
        .or(file.abandon_after_ms)
        .map(|ms| positive_millis("abandon_after_ms", ms))
        .transpose()?;

    Ok(TrackerConfig {
        janitor_interval,
        inactivity_timeout,
        max_lifetime,
        abandon_after,
    })
}

/// Get the Slide config directory path (~/.slide/).
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        return PathBuf::from(dir);
    }
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".slide")
}

/// Read and parse a TOML settings file.
pub fn read_settings_file(path: &Path) -> Result<SettingsFile, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Load a settings file, returning defaults if it is missing or invalid.
fn load_settings_file(path: &Path) -> SettingsFile {
    if !path.exists() {
        return SettingsFile::default();
    }
    read_settings_file(path).unwrap_or_else(|e| {
        tracing::warn!("Ignoring {}: {}", path.display(), e);
        SettingsFile::default()
    })
}

fn env_millis<E>(env: &E, key: &str) -> Result<Option<u64>, ConfigError>
where
    E: Fn(&str) -> Option<String>,
{
    let Some(raw) = env(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<u64>()
        .map(Some)
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{raw}' is not a number of milliseconds: {e}"),
        })
}

fn positive_millis(key: &str, ms: u64) -> Result<Duration, ConfigError> {
    if ms == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".into(),
        });
    }
    Ok(Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_default_settings() {
        let settings = SettingsFile::default();
        assert!(settings.tracker.janitor_interval_ms.is_none());
        assert!(settings.tracker.max_lifetime_ms.is_none());
        assert!(settings.tracker.abandon_after_ms.is_none());

        let config = resolve(&CliOverrides::default(), no_env, &settings).unwrap();
        assert_eq!(config, TrackerConfig::default());
    }

    #[test]
    fn test_settings_toml_parse() {
        let toml_str = r#"
[tracker]
janitor_interval_ms = 2000
inactivity_timeout_ms = 5000
max_lifetime_ms = 60000
"#;
        let settings: SettingsFile = toml::from_str(toml_str).unwrap();
        assert_eq!(settings.tracker.janitor_interval_ms, Some(2000));
        assert_eq!(settings.tracker.inactivity_timeout_ms, Some(5000));
        assert_eq!(settings.tracker.max_lifetime_ms, Some(60000));

        let config = resolve(&CliOverrides::default(), no_env, &settings).unwrap();
        assert_eq!(config.janitor_interval, Duration::from_secs(2));
        assert_eq!(config.inactivity_timeout, Duration::from_secs(5));
        assert_eq!(config.max_lifetime, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_missing_tracker_section_defaults() {
        let settings: SettingsFile = toml::from_str("").unwrap();
        assert!(settings.tracker.inactivity_timeout_ms.is_none());
    }

    #[test]
    fn test_precedence_cli_over_env_over_file() {
        let settings: SettingsFile = toml::from_str(
            r#"
[tracker]
janitor_interval_ms = 1000
inactivity_timeout_ms = 1000
max_lifetime_ms = 1000
"#,
        )
        .unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_INACTIVITY_TIMEOUT_MS, "2000"),
            (ENV_MAX_LIFETIME_MS, "2000"),
        ]);
        let overrides = CliOverrides {
            max_lifetime_ms: Some(3000),
            ..Default::default()
        };

        let config = resolve(
            &overrides,
            |key| env.get(key).map(|v| v.to_string()),
            &settings,
        )
        .unwrap();
        assert_eq!(config.janitor_interval, Duration::from_millis(1000));
        assert_eq!(config.inactivity_timeout, Duration::from_millis(2000));
        assert_eq!(config.max_lifetime, Some(Duration::from_millis(3000)));
    }

    #[test]
    fn test_abandon_after_is_opt_in() {
        let settings: SettingsFile =
            toml::from_str("[tracker]\nabandon_after_ms = 60000\n").unwrap();
        let config = resolve(&CliOverrides::default(), no_env, &settings).unwrap();
        assert_eq!(config.abandon_after, Some(Duration::from_secs(60)));

        let config = resolve(&CliOverrides::default(), no_env, &SettingsFile::default()).unwrap();
        assert!(config.abandon_after.is_none());
    }

    #[test]
    fn test_zero_duration_rejected() {
        let overrides = CliOverrides {
            inactivity_timeout_ms: Some(0),
            ..Default::default()
        };
        let err = resolve(&overrides, no_env, &SettingsFile::default()).unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "inactivity_timeout_ms")
        );
    }

    #[test]
    fn test_non_numeric_env_rejected() {
        let err = resolve(
            &CliOverrides::default(),
            |key| (key == ENV_JANITOR_INTERVAL_MS).then(|| "soon".to_string()),
            &SettingsFile::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains(ENV_JANITOR_INTERVAL_MS));
    }

    #[test]
    fn test_read_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[tracker]\nmax_lifetime_ms = 250\n").unwrap();

        let settings = read_settings_file(&path).unwrap();
        assert_eq!(settings.tracker.max_lifetime_ms, Some(250));
    }

    #[test]
    fn test_explicit_file_errors_surface() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            read_settings_file(&missing),
            Err(ConfigError::Io(_))
        ));

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[tracker\n").unwrap();
        assert!(matches!(
            read_settings_file(&broken),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_default_file_problems_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        assert!(
            load_settings_file(&dir.path().join("absent.toml"))
                .tracker
                .janitor_interval_ms
                .is_none()
        );

        let broken = dir.path().join("config.toml");
        std::fs::write(&broken, "tracker = 3").unwrap();
        assert!(load_settings_file(&broken).tracker.max_lifetime_ms.is_none());
    }
}
