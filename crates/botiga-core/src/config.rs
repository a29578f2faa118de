use crate::errors::ConfigError;
use crate::model::BenchConfig;
use std::path::Path;

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;

pub fn load_config(path: &Path) -> Result<BenchConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read config {}: {}", path.display(), e)))?;
    let cfg: BenchConfig = serde_yaml::from_str(&raw)
        .map_err(|e| ConfigError(format!("failed to parse YAML: {}", e)))?;
    if cfg.version != SUPPORTED_CONFIG_VERSION {
        return Err(ConfigError(format!(
            "unsupported config version {} (supported: {})",
            cfg.version, SUPPORTED_CONFIG_VERSION
        )));
    }
    if cfg.models.is_empty() {
        return Err(ConfigError("config has no models".into()));
    }
    if cfg.goals.is_empty() {
        return Err(ConfigError("config has no goals".into()));
    }
    if cfg.max_turns == 0 {
        return Err(ConfigError("max_turns must be at least 1".into()));
    }
    if cfg.judge_endpoint().is_none() {
        return Err(ConfigError(format!(
            "judge model '{}' is not listed under models",
            cfg.judge.model
        )));
    }
    if cfg.simulation_endpoints().is_empty() {
        return Err(ConfigError(
            "config has no simulation models (only the judge)".into(),
        ));
    }
    Ok(cfg)
}

pub fn write_sample_config(path: &Path) -> Result<(), ConfigError> {
    std::fs::write(path, include_str!("../../../botiga.yaml"))
        .map_err(|e| ConfigError(format!("failed to write sample config: {}", e)))?;
    Ok(())
}
