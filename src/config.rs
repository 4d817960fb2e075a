use crate::dcc::{DccProfile, ProfileKind, ProfileSection, create_profile};
use crate::engine::EngineConfig;
use crate::sim::SimulationConfig;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::Level;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_NODE_COUNT: u32 = 10;
pub const DEFAULT_STEP_MS: u64 = 100;
pub const DEFAULT_BEACON_BYTES: u32 = 400;
pub const DEFAULT_PREAMBLE_US: u64 = 40;
pub const DEFAULT_BURST_MS: u64 = 2;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    #[serde(default)]
    pub engine: Option<EngineSection>,
    pub profile: ProfileSection,
    #[serde(default)]
    pub simulation: Option<SimulationSection>,
    #[serde(default)]
    pub server: Option<ServerSection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

/// Engine timing in milliseconds. Missing windows fall back to the profile's own.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct EngineSection {
    pub sampling_period_ms: Option<u64>,
    pub decision_period_ms: Option<u64>,
    pub time_up_ms: Option<u64>,
    pub time_down_ms: Option<u64>,
    /// Base jitter seed; node `n` uses `seed + n`.
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SimulationSection {
    pub nodes: Option<u32>,
    /// Stop after this much simulated time (default: run until shutdown)
    pub duration_secs: Option<u64>,
    /// Simulated time advanced per publish step
    pub step_ms: Option<u64>,
    /// Simulated seconds per wall-clock second; 0 runs unpaced
    pub speedup: Option<f64>,
    pub beacon_bytes: Option<u32>,
    pub preamble_us: Option<u64>,
    /// Extra busy fraction injected as random bursts, in `[0, 1)`
    pub background_load: Option<f64>,
    pub background_burst_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Port to listen on (default: 8080)
    pub port: Option<u16>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid profile params: {0}")]
    Params(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    Ok(config)
}

impl Config {
    pub fn profile_kind(&self) -> ProfileKind {
        self.profile.kind
    }

    pub fn dcc_profile(&self) -> Result<DccProfile, ConfigError> {
        create_profile(&self.profile)
    }

    pub fn engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let defaults = EngineConfig::for_profile(self.profile.kind);
        let section = self.engine.clone().unwrap_or_default();
        let millis = |value: Option<u64>, fallback: Duration| {
            value.map(Duration::from_millis).unwrap_or(fallback)
        };
        let config = EngineConfig {
            sampling_period: millis(section.sampling_period_ms, defaults.sampling_period),
            decision_period: millis(section.decision_period_ms, defaults.decision_period),
            time_up: millis(section.time_up_ms, defaults.time_up),
            time_down: millis(section.time_down_ms, defaults.time_down),
            seed: section.seed.unwrap_or(defaults.seed),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn simulation_config(&self) -> Result<SimulationConfig, ConfigError> {
        let section = self.simulation.clone().unwrap_or_default();
        let nodes = section.nodes.unwrap_or(DEFAULT_NODE_COUNT);
        if nodes == 0 {
            return Err(ConfigError::Invalid(
                "simulation.nodes must be at least 1".to_string(),
            ));
        }
        let background_load = section.background_load.unwrap_or(0.0);
        if !(0.0..1.0).contains(&background_load) {
            return Err(ConfigError::Invalid(format!(
                "simulation.background_load must be in [0, 1), got {background_load}"
            )));
        }
        let background_burst =
            Duration::from_millis(section.background_burst_ms.unwrap_or(DEFAULT_BURST_MS));
        if background_load > 0.0 && background_burst.is_zero() {
            return Err(ConfigError::Invalid(
                "simulation.background_burst_ms must be positive".to_string(),
            ));
        }
        let beacon_bytes = section.beacon_bytes.unwrap_or(DEFAULT_BEACON_BYTES);
        if beacon_bytes == 0 {
            return Err(ConfigError::Invalid(
                "simulation.beacon_bytes must be positive".to_string(),
            ));
        }

        Ok(SimulationConfig {
            nodes,
            beacon_bits: u64::from(beacon_bytes) * 8,
            preamble: Duration::from_micros(section.preamble_us.unwrap_or(DEFAULT_PREAMBLE_US)),
            background_load,
            background_burst,
            seed: self.engine.as_ref().and_then(|e| e.seed).unwrap_or(0),
        })
    }

    /// Simulated time advanced between two published snapshots (default: 100 ms)
    pub fn step(&self) -> Duration {
        let ms = self
            .simulation
            .as_ref()
            .and_then(|s| s.step_ms)
            .filter(|ms| *ms > 0)
            .unwrap_or(DEFAULT_STEP_MS);
        Duration::from_millis(ms)
    }

    /// Simulated seconds per wall-clock second (default: 1.0, real time)
    pub fn speedup(&self) -> f64 {
        self.simulation
            .as_ref()
            .and_then(|s| s.speedup)
            .filter(|speedup| speedup.is_finite() && *speedup >= 0.0)
            .unwrap_or(1.0)
    }

    pub fn duration(&self) -> Option<Duration> {
        self.simulation
            .as_ref()
            .and_then(|s| s.duration_secs)
            .map(Duration::from_secs)
    }

    pub fn log_level(&self) -> Result<Level, ConfigError> {
        Level::from_str(self.logging.level.trim()).map_err(|_| {
            ConfigError::Invalid(format!("unknown log level {:?}", self.logging.level))
        })
    }

    /// Returns the server port (default: 8080)
    pub fn server_port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn write_temp(
        label: &str,
        contents: &str,
    ) -> Result<std::path::PathBuf, Box<dyn std::error::Error>> {
        let unique = SystemTime::now().duration_since(UNIX_EPOCH)?.as_nanos();
        let path = std::env::temp_dir().join(format!("dcc-config-{label}-{unique}.toml"));
        fs::write(&path, contents)?;
        Ok(path)
    }

    const MINIMAL: &str = r#"
[app]
name = "dcc-beaconing"

[logging]
level = "info"

[profile]
kind = "beacon_rate_3"
"#;

    #[test]
    fn default_config_builds_engine_and_profile() -> Result<(), Box<dyn std::error::Error>> {
        let config = load_default()?;
        let profile = config.dcc_profile()?;
        config.engine_config()?;
        config.simulation_config()?;
        config.log_level()?;
        assert_eq!(profile.kind(), config.profile_kind());
        Ok(())
    }

    #[test]
    fn missing_sections_fall_back_to_profile_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let path = write_temp("minimal", MINIMAL)?;
        let result = load_from_path(&path);
        let _ = fs::remove_file(&path);
        let config = result?;

        let engine = config.engine_config()?;
        assert_eq!(engine, EngineConfig::for_profile(ProfileKind::BeaconRate3));
        assert_eq!(config.server_port(), DEFAULT_SERVER_PORT);
        assert_eq!(config.step(), Duration::from_millis(DEFAULT_STEP_MS));
        assert_eq!(config.duration(), None);
        assert_eq!(config.simulation_config()?.nodes, DEFAULT_NODE_COUNT);
        Ok(())
    }

    #[test]
    fn engine_and_params_overrides_apply() -> Result<(), Box<dyn std::error::Error>> {
        let contents = r#"
[app]
name = "dcc-beaconing"

[logging]
level = "debug"

[engine]
sampling_period_ms = 500
decision_period_ms = 1000
time_down_ms = 2000
seed = 9

[profile]
kind = "tx_power"

[profile.params]
levels_mw = [200, 100, 50]
thresholds = [0.25, 0.5]
"#;
        let path = write_temp("overrides", contents)?;
        let result = load_from_path(&path);
        let _ = fs::remove_file(&path);
        let config = result?;

        let engine = config.engine_config()?;
        assert_eq!(engine.sampling_period, Duration::from_millis(500));
        assert_eq!(engine.time_up, Duration::from_secs(1));
        assert_eq!(engine.time_down, Duration::from_secs(2));
        assert_eq!(engine.seed, 9);
        assert_eq!(config.dcc_profile()?.thresholds(), &[0.25, 0.5]);
        assert_eq!(config.log_level()?, Level::DEBUG);
        Ok(())
    }

    #[test]
    fn fractional_window_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let contents = format!("{MINIMAL}\n[engine]\ntime_down_ms = 4500\n");
        let path = write_temp("fractional", &contents)?;
        let result = load_from_path(&path);
        let _ = fs::remove_file(&path);
        let config = result?;

        assert!(matches!(config.engine_config(), Err(ConfigError::Invalid(_))));
        Ok(())
    }

    #[test]
    fn unknown_profile_kind_returns_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let contents = MINIMAL.replace("beacon_rate_3", "beacon_rate_7");
        let path = write_temp("unknown-kind", &contents)?;
        let result = load_from_path(&path);
        let _ = fs::remove_file(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
        Ok(())
    }

    #[test]
    fn background_load_must_stay_below_one() -> Result<(), Box<dyn std::error::Error>> {
        let contents = format!("{MINIMAL}\n[simulation]\nbackground_load = 1.0\n");
        let path = write_temp("background", &contents)?;
        let result = load_from_path(&path);
        let _ = fs::remove_file(&path);
        let config = result?;

        assert!(matches!(
            config.simulation_config(),
            Err(ConfigError::Invalid(_))
        ));
        Ok(())
    }

    #[test]
    fn unknown_log_level_is_invalid() -> Result<(), Box<dyn std::error::Error>> {
        let contents = MINIMAL.replace("\"info\"", "\"chatty\"");
        let path = write_temp("log-level", &contents)?;
        let result = load_from_path(&path);
        let _ = fs::remove_file(&path);
        let config = result?;

        assert!(matches!(config.log_level(), Err(ConfigError::Invalid(_))));
        Ok(())
    }

    #[test]
    fn missing_config_file_returns_read_error() {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!("dcc-config-missing-{unique}.toml"));

        let result = load_from_path(&path);

        assert!(matches!(result, Err(ConfigError::Read(_))));
    }

    #[test]
    fn invalid_toml_returns_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let path = write_temp("invalid", "not = [valid")?;
        let result = load_from_path(&path);
        let _ = fs::remove_file(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
        Ok(())
    }
}
