//! 测试数据构建器

use std::time::Duration;

use orchestrator_core::{AgentKind, Job, RetryPolicy, WorkItem};
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// 指定代理的一份合法输出
pub fn valid_output(kind: AgentKind) -> String {
    AnalysisOutputBuilder::new(kind).build()
}

/// 构造分析服务的原始输出，可删除或覆盖字段以制造结构错误
pub struct AnalysisOutputBuilder {
    fields: Map<String, Value>,
    fenced: bool,
}

impl AnalysisOutputBuilder {
    pub fn new(kind: AgentKind) -> Self {
        let value = match kind {
            AgentKind::Security => json!({
                "risk_level": "medium",
                "findings": ["unchecked input passed to shell"],
                "analysis": "The file builds a shell command from user input."
            }),
            AgentKind::CodeQuality => json!({
                "maintainability": "good",
                "score": 78,
                "issues": ["long function"],
                "analysis": "Readable overall with one oversized function."
            }),
            AgentKind::Documentation => json!({
                "coverage": "partial",
                "missing_items": ["pub fn run"],
                "analysis": "Public entry points lack doc comments."
            }),
            AgentKind::Performance => json!({
                "complexity": "moderate",
                "hotspots": ["nested loop over records"],
                "analysis": "A quadratic scan dominates runtime."
            }),
        };
        let fields = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            fields,
            fenced: false,
        }
    }

    pub fn without(mut self, field: &str) -> Self {
        self.fields.remove(field);
        self
    }

    pub fn with(mut self, field: &str, value: Value) -> Self {
        self.fields.insert(field.to_string(), value);
        self
    }

    /// 包在 ```json 代码块中
    pub fn fenced(mut self) -> Self {
        self.fenced = true;
        self
    }

    pub fn build(self) -> String {
        let body = Value::Object(self.fields).to_string();
        if self.fenced {
            format!("```json\n{body}\n```")
        } else {
            body
        }
    }
}

/// 不等待、无抖动的重试策略
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl RetryPolicyBuilder {
    pub fn new() -> Self {
        Self {
            policy: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                backoff_multiplier: 2.0,
                max_delay: Duration::from_millis(10),
                jitter_factor: 0.0,
                schema_retries: 1,
            },
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.policy.max_attempts = max_attempts;
        self
    }

    pub fn with_schema_retries(mut self, schema_retries: u32) -> Self {
        self.policy.schema_retries = schema_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.policy.base_delay = base_delay;
        self.policy.max_delay = self.policy.max_delay.max(base_delay);
        self
    }

    pub fn build(self) -> RetryPolicy {
        self.policy
    }
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 直接构造作业记录，跳过提交校验
pub struct JobBuilder {
    files: Vec<String>,
    agents: Vec<String>,
}

impl JobBuilder {
    pub fn new() -> Self {
        Self {
            files: vec!["src/main.rs".to_string()],
            agents: vec![AgentKind::Security.key().to_string()],
        }
    }

    pub fn with_files(mut self, files: &[&str]) -> Self {
        self.files = files.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_agents(mut self, agents: &[&str]) -> Self {
        self.agents = agents.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn build(self) -> Job {
        let id = Uuid::new_v4();
        let mut items = Vec::with_capacity(self.files.len() * self.agents.len());
        for file in &self.files {
            for agent in &self.agents {
                items.push(WorkItem::new(id, items.len(), file.clone(), agent.clone()));
            }
        }
        Job::new(id, self.files, self.agents, items)
    }
}

impl Default for JobBuilder {
    fn default() -> Self {
        Self::new()
    }
}
