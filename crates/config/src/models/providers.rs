use crate::validation::{ConfigValidator, ValidationUtils};
use serde::{Deserialize, Serialize};

/// 外部分析服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub endpoint: String,
    /// 保存API密钥的环境变量名
    pub api_key_env: String,
    pub model: Option<String>,
    /// 单次调用的超时时间（秒）
    pub timeout_seconds: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8787/v1/analyze".to_string(),
            api_key_env: "ORCHESTRATOR_API_KEY".to_string(),
            model: None,
            timeout_seconds: 120,
        }
    }
}

impl ConfigValidator for AnalysisConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_url(&self.endpoint, "analysis.endpoint")?;
        ValidationUtils::validate_not_empty(&self.api_key_env, "analysis.api_key_env")?;
        ValidationUtils::validate_timeout_seconds(self.timeout_seconds, "analysis.timeout_seconds")?;
        if let Some(model) = &self.model {
            ValidationUtils::validate_not_empty(model, "analysis.model")?;
        }
        Ok(())
    }
}

/// 待分析文件的访问限制
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileAccessConfig {
    /// 允许读取的根目录，所有路径都必须位于其下
    pub root: String,
    pub max_file_bytes: u64,
    /// 允许的扩展名（不含点），为空表示不限制
    pub allowed_extensions: Vec<String>,
}

impl Default for FileAccessConfig {
    fn default() -> Self {
        Self {
            root: ".".to_string(),
            max_file_bytes: 512 * 1024,
            allowed_extensions: [
                "rs", "py", "js", "ts", "tsx", "go", "java", "kt", "c", "h", "cpp", "hpp", "cs",
                "rb", "php", "swift", "md", "toml", "yaml", "yml", "json", "sql", "sh",
            ]
            .iter()
            .map(|ext| ext.to_string())
            .collect(),
        }
    }
}

impl ConfigValidator for FileAccessConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_not_empty(&self.root, "files.root")?;

        if self.max_file_bytes == 0 {
            return Err(crate::ConfigError::Validation(
                "files.max_file_bytes must be greater than 0".to_string(),
            ));
        }

        for ext in &self.allowed_extensions {
            ValidationUtils::validate_not_empty(ext, "files.allowed_extensions")?;
            if ext.starts_with('.') {
                return Err(crate::ConfigError::Validation(format!(
                    "files.allowed_extensions entry '{ext}' must not start with '.'"
                )));
            }
        }

        Ok(())
    }
}
