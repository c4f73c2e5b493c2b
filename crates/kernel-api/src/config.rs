//! Configuration loading: defaults, then an optional JSON file, then environment overrides.

use std::fs;
use std::path::{Path, PathBuf};

use contracts::{SimulationConfig, Thresholds, SCHEMA_VERSION_V1};
use thiserror::Error;
use tracing::debug;

pub const ENV_SEED: &str = "CROWDWATCH_SEED";
pub const ENV_FRONTEND_URL: &str = "FRONTEND_URL";
pub const ENV_WEATHER_KEY: &str = "OPENWEATHER_API_KEY";
pub const ENV_INSIGHTS_KEY: &str = "GEMINI_API_KEY";
/// Empty disables the live bus feed.
pub const ENV_BUS_FEED_URL: &str = "CROWDWATCH_BUS_FEED_URL";

/// Longest producer interval accepted; one day.
pub const MAX_INTERVAL_SECS: u64 = 86_400;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },
    #[error("unsupported schema_version {0}")]
    SchemaVersion(String),
    #[error("threshold {field} = {value} is outside {min}..={max}")]
    ThresholdRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
    #[error("density warning threshold {warning} must be below critical threshold {critical}")]
    ThresholdOrder { warning: u32, critical: u32 },
    #[error("producer interval {0} must be at least one second")]
    ZeroInterval(&'static str),
    #[error("producer interval {name} = {secs}s exceeds {max}s")]
    IntervalTooLong {
        name: &'static str,
        secs: u64,
        max: u64,
    },
}

pub fn load(path: Option<&Path>) -> Result<SimulationConfig, ConfigError> {
    load_with(path, |key| std::env::var(key).ok())
}

/// Same as [`load`] with an injectable environment lookup.
pub fn load_with<F>(path: Option<&Path>, env: F) -> Result<SimulationConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => read_file(path)?,
        None => SimulationConfig::default(),
    };
    apply_env(&mut config, env)?;
    validate(&config)?;
    Ok(config)
}

fn read_file(path: &Path) -> Result<SimulationConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "config.file_loaded");
    Ok(config)
}

fn apply_env<F>(config: &mut SimulationConfig, env: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| env(key).map(|value| value.trim().to_string()).filter(|v| !v.is_empty());

    if let Some(raw) = non_empty(ENV_SEED) {
        config.seed = raw.parse().map_err(|_| ConfigError::InvalidEnv {
            key: ENV_SEED,
            value: raw.clone(),
        })?;
    }
    if let Some(origin) = non_empty(ENV_FRONTEND_URL) {
        config.frontend_origin = origin;
    }
    if let Some(key) = non_empty(ENV_WEATHER_KEY) {
        config.weather.api_key = Some(key);
    }
    if let Some(key) = non_empty(ENV_INSIGHTS_KEY) {
        config.insights_api_key = Some(key);
    }
    if let Some(raw) = env(ENV_BUS_FEED_URL) {
        let trimmed = raw.trim();
        config.bus_feed.url = (!trimmed.is_empty()).then(|| trimmed.to_string());
    }
    Ok(())
}

pub fn validate(config: &SimulationConfig) -> Result<(), ConfigError> {
    if config.schema_version != SCHEMA_VERSION_V1 {
        return Err(ConfigError::SchemaVersion(config.schema_version.clone()));
    }
    let thresholds = config.thresholds;
    for (field, value, (min, max)) in [
        ("density_warning", thresholds.density_warning, Thresholds::WARNING_RANGE),
        ("density_critical", thresholds.density_critical, Thresholds::CRITICAL_RANGE),
        ("metro_flow", thresholds.metro_flow, Thresholds::METRO_RANGE),
    ] {
        if !(min..=max).contains(&value) {
            return Err(ConfigError::ThresholdRange {
                field,
                value,
                min,
                max,
            });
        }
    }
    if thresholds.density_warning >= thresholds.density_critical {
        return Err(ConfigError::ThresholdOrder {
            warning: thresholds.density_warning,
            critical: thresholds.density_critical,
        });
    }

    let intervals = config.intervals;
    for (name, secs) in [
        ("density_secs", intervals.density_secs),
        ("metro_secs", intervals.metro_secs),
        ("bus_secs", intervals.bus_secs),
        ("weather_secs", intervals.weather_secs),
        ("responders_secs", intervals.responders_secs),
        ("heartbeat_secs", intervals.heartbeat_secs),
    ] {
        if secs == 0 {
            return Err(ConfigError::ZeroInterval(name));
        }
        if secs > MAX_INTERVAL_SECS {
            return Err(ConfigError::IntervalTooLong {
                name,
                secs,
                max: MAX_INTERVAL_SECS,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_file_or_env() {
        let config = load_with(None, env_from(&[])).expect("defaults load");
        assert_eq!(config, SimulationConfig::default());
    }

    #[test]
    fn env_overrides_take_effect() {
        let config = load_with(
            None,
            env_from(&[
                (ENV_SEED, " 42 "),
                (ENV_FRONTEND_URL, "https://dash.example"),
                (ENV_WEATHER_KEY, "abc"),
                (ENV_INSIGHTS_KEY, ""),
                (ENV_BUS_FEED_URL, ""),
            ]),
        )
        .expect("env config");
        assert_eq!(config.seed, 42);
        assert_eq!(config.frontend_origin, "https://dash.example");
        assert_eq!(config.weather.api_key.as_deref(), Some("abc"));
        assert_eq!(config.insights_api_key, None);
        assert_eq!(config.bus_feed.url, None);
    }

    #[test]
    fn bad_seed_is_rejected() {
        let err = load_with(None, env_from(&[(ENV_SEED, "many")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { key: ENV_SEED, .. }));
    }

    #[test]
    fn file_values_sit_between_defaults_and_env() {
        let dir = std::env::temp_dir().join(format!("crowdwatch-config-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("config.json");
        fs::write(
            &path,
            r#"{"seed":"9","thresholds":{"density_warning":120,"density_critical":180},"intervals":{"density_secs":5}}"#,
        )
        .expect("write config");

        let config = load_with(Some(&path), env_from(&[(ENV_SEED, "10")])).expect("file config");
        assert_eq!(config.seed, 10);
        assert_eq!(config.thresholds.density_warning, 120);
        assert_eq!(config.thresholds.metro_flow, 80);
        assert_eq!(config.intervals.density_secs, 5);
        assert_eq!(config.intervals.metro_secs, 60);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn inverted_thresholds_fail_validation() {
        let mut config = SimulationConfig::default();
        config.thresholds.density_warning = 250;
        assert!(matches!(
            validate(&config),
            Err(ConfigError::ThresholdOrder { warning: 250, critical: 200 })
        ));
    }

    #[test]
    fn thresholds_outside_operating_range_fail_validation() {
        let mut config = SimulationConfig::default();
        config.thresholds.density_critical = u32::MAX;
        assert!(matches!(
            validate(&config),
            Err(ConfigError::ThresholdRange { field: "density_critical", .. })
        ));

        let mut config = SimulationConfig::default();
        config.thresholds.metro_flow = 5;
        assert!(matches!(
            validate(&config),
            Err(ConfigError::ThresholdRange { field: "metro_flow", value: 5, .. })
        ));
    }

    #[test]
    fn oversized_intervals_fail_validation() {
        let mut config = SimulationConfig::default();
        config.intervals.weather_secs = u64::MAX;
        assert!(matches!(
            validate(&config),
            Err(ConfigError::IntervalTooLong { name: "weather_secs", .. })
        ));

        config.intervals.weather_secs = MAX_INTERVAL_SECS;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_with(Some(Path::new("/nonexistent/crowdwatch.json")), env_from(&[]))
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/crowdwatch.json"));
    }
}
