use std::path::Path;

use super::schema::CONFIG_SCHEMA;
use super::types::EngineConfig;
use crate::errors::BlindsightError;
use tracing::warn;

pub async fn parse_config(path: &Path) -> Result<EngineConfig, BlindsightError> {
    if !path.exists() {
        return Err(BlindsightError::Config(format!("Config file not found: {}", path.display())));
    }

    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() > 1_048_576 {
        return Err(BlindsightError::Config("Config file exceeds 1MB limit".into()));
    }

    let content = tokio::fs::read_to_string(path).await?;
    parse_config_str(&content)
}

pub fn parse_config_str(content: &str) -> Result<EngineConfig, BlindsightError> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(content)?;
    if yaml.is_null() {
        return Ok(EngineConfig::default());
    }

    validate_schema(&yaml)?;

    let config: EngineConfig = serde_yaml::from_value(yaml)?;
    validate_conflicts(&config)?;
    Ok(config)
}

/// Validate config against the JSON schema for structural correctness.
fn validate_schema(yaml: &serde_yaml::Value) -> Result<(), BlindsightError> {
    let json_str = serde_json::to_string(yaml)
        .map_err(|e| BlindsightError::Config(format!("Config conversion error: {}", e)))?;
    let json_value: serde_json::Value = serde_json::from_str(&json_str)
        .map_err(|e| BlindsightError::Config(format!("Config conversion error: {}", e)))?;

    let compiled = jsonschema::JSONSchema::compile(&CONFIG_SCHEMA)
        .map_err(|e| BlindsightError::Config(format!("Schema compilation error: {}", e)))?;

    if let Err(errors) = compiled.validate(&json_value) {
        // Advisory: typed parsing and conflict checks below are authoritative.
        for e in errors {
            warn!(validation_error = %e, path = %e.instance_path, "Config schema warning");
        }
    }

    Ok(())
}

/// Detect semantic conflicts in a fully merged configuration.
pub fn validate_conflicts(config: &EngineConfig) -> Result<(), BlindsightError> {
    if !(1..=3).contains(&config.level) {
        return Err(BlindsightError::Config(format!("level must be 1-3, got {}", config.level)));
    }
    if config.techniques.is_empty() {
        return Err(BlindsightError::Config("at least one technique must be enabled".into()));
    }
    if config.timeout <= config.timesec {
        return Err(BlindsightError::Config(format!(
            "timeout ({}s) must exceed timesec ({}s) or every delayed response would time out",
            config.timeout, config.timesec
        )));
    }
    if let Some(stop) = config.stop {
        if config.start >= stop {
            return Err(BlindsightError::Config(format!(
                "start ({}) must be lower than stop ({})",
                config.start, stop
            )));
        }
    }
    for (name, value) in [
        ("dynamicity_threshold", config.dynamicity_threshold),
        ("similarity_threshold", config.similarity_threshold),
        ("time_safety_factor", config.time_safety_factor),
    ] {
        if !(value > 0.0 && value <= 1.0) {
            return Err(BlindsightError::Config(format!("{} must be in (0, 1], got {}", name, value)));
        }
    }
    if config.threads == 0 {
        return Err(BlindsightError::Config("threads must be at least 1".into()));
    }
    if config.confirmation_pairs < 2 {
        return Err(BlindsightError::Config("confirmation_pairs must be at least 2".into()));
    }
    if let Some(code) = config.code {
        if !(100..=599).contains(&code) {
            return Err(BlindsightError::Config(format!("code {} is not an HTTP status", code)));
        }
    }
    if config.charset.ordinals().is_empty() {
        return Err(BlindsightError::Config("charset cannot be empty".into()));
    }
    if config.delay < 0.0 {
        return Err(BlindsightError::Config("delay cannot be negative".into()));
    }
    if config.string.is_some() && config.not_string.is_some() {
        warn!("Both string and not_string supplied; string takes precedence");
    }

    Ok(())
}
