use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    execution::{RetryConfig, SchedulerConfig},
    observability::{ObservabilityConfig, SnapshotConfig},
    providers::{AnalysisConfig, FileAccessConfig},
};
use crate::validation::ConfigValidator;

/// 默认配置文件查找路径
pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["config/orchestrator.toml", "orchestrator.toml"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub retry: RetryConfig,
    pub analysis: AnalysisConfig,
    pub files: FileAccessConfig,
    pub snapshot: SnapshotConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 加载配置：配置文件 + ORCHESTRATOR_ 前缀的环境变量
    ///
    /// 显式指定的路径必须存在；未指定时依次尝试默认路径，都不存在则使用内置默认值。
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else if let Some(path) = DEFAULT_CONFIG_PATHS
            .iter()
            .find(|path| Path::new(path).exists())
        {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("ORCHESTRATOR")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        self.scheduler.validate()?;
        self.retry.validate()?;
        self.analysis.validate()?;
        self.files.validate()?;
        self.snapshot.validate()?;
        self.observability.validate()?;
        Ok(())
    }
}
