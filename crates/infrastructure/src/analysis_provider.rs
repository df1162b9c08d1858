//! 基于HTTP的分析服务客户端
//!
//! 请求体携带文件内容、代理标识与输出结构说明；响应可以是 `{"output": "..."}`，
//! 也可以直接是原始文本。HTTP状态码与传输错误被归类为瞬时或永久失败。

use std::time::Duration;

use async_trait::async_trait;
use orchestrator_config::AnalysisConfig;
use orchestrator_core::{AnalysisProvider, AnalysisRequest};
use orchestrator_errors::{CallFailureKind, OrchestratorError, OrchestratorResult};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct AnalyzeRequestBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    agent: &'a str,
    file_path: &'a str,
    content: &'a str,
    /// 期望的输出结构，每行一个字段
    output_schema: String,
    instructions: String,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponseBody {
    output: String,
}

pub struct HttpAnalysisProvider {
    client: reqwest::Client,
    endpoint: String,
    model: Option<String>,
    api_key: Option<String>,
}

impl HttpAnalysisProvider {
    pub fn new(endpoint: impl Into<String>, model: Option<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model,
            api_key,
        }
    }

    /// API密钥从配置指定的环境变量读取
    pub fn from_config(config: &AnalysisConfig) -> Self {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        if api_key.is_none() {
            warn!("环境变量 {} 未设置，分析请求将不带认证信息", config.api_key_env);
        }
        Self::new(config.endpoint.clone(), config.model.clone(), api_key)
    }

    fn instructions(request: &AnalysisRequest) -> String {
        format!(
            "Analyze the file `{}` as the `{}` agent. Respond with a single JSON object \
             matching the output schema; put the long-form narrative in `{}`.",
            request.file_path, request.agent.key, request.agent.schema.narrative_field
        )
    }
}

/// 非成功状态码对应的失败类型
pub fn classify_status(status: StatusCode) -> Option<CallFailureKind> {
    if status.is_success() {
        return None;
    }
    Some(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CallFailureKind::Auth,
        StatusCode::TOO_MANY_REQUESTS => CallFailureKind::RateLimit,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => CallFailureKind::Timeout,
        s if s.is_server_error() => CallFailureKind::Network,
        _ => CallFailureKind::InvalidRequest,
    })
}

fn classify_transport(err: &reqwest::Error) -> CallFailureKind {
    if err.is_timeout() {
        CallFailureKind::Timeout
    } else if err.is_builder() {
        CallFailureKind::InvalidRequest
    } else {
        CallFailureKind::Network
    }
}

#[async_trait]
impl AnalysisProvider for HttpAnalysisProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn invoke(
        &self,
        request: &AnalysisRequest,
        timeout: Duration,
    ) -> OrchestratorResult<String> {
        let body = AnalyzeRequestBody {
            model: self.model.as_deref(),
            agent: &request.agent.key,
            file_path: &request.file_path,
            content: &request.content,
            output_schema: request.agent.schema.describe(),
            instructions: Self::instructions(request),
        };

        let mut builder = self.client.post(&self.endpoint).timeout(timeout).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            OrchestratorError::call_failure(classify_transport(&e), format!("请求发送失败: {e}"))
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            OrchestratorError::call_failure(classify_transport(&e), format!("读取响应失败: {e}"))
        })?;

        if let Some(kind) = classify_status(status) {
            let snippet: String = text.chars().take(200).collect();
            return Err(OrchestratorError::call_failure(
                kind,
                format!("HTTP {status}: {snippet}"),
            ));
        }

        debug!(
            job_id = %request.job_id,
            file = %request.file_path,
            agent = %request.agent.key,
            bytes = text.len(),
            "分析服务返回"
        );
        Ok(match serde_json::from_str::<AnalyzeResponseBody>(&text) {
            Ok(body) => body.output,
            Err(_) => text,
        })
    }
}
