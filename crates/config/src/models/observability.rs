use crate::validation::{ConfigValidator, ValidationUtils};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// pretty 或 json
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl ConfigValidator for ObservabilityConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(crate::ConfigError::Validation(format!(
                "Invalid log level: {}. Valid options: {:?}",
                self.log_level, valid_levels
            )));
        }

        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.log_format.as_str()) {
            return Err(crate::ConfigError::Validation(format!(
                "Invalid log format: {}. Valid options: {:?}",
                self.log_format, valid_formats
            )));
        }

        Ok(())
    }
}

/// 崩溃恢复快照配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub enabled: bool,
    pub path: String,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: ".orchestrator/snapshot.json".to_string(),
        }
    }
}

impl ConfigValidator for SnapshotConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        if self.enabled {
            ValidationUtils::validate_not_empty(&self.path, "snapshot.path")?;
        }
        Ok(())
    }
}
