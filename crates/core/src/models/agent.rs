use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 所有代理输出都必须包含的长篇叙述字段
pub const NARRATIVE_FIELD: &str = "analysis";

/// 默认单文件输入上限
pub const DEFAULT_MAX_INPUT_BYTES: usize = 256 * 1024;

/// 输出字段的类型
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "allowed", rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Integer,
    Number,
    Boolean,
    TextList,
    /// 枚举值，保存规范写法
    Choice(Vec<String>),
}

impl FieldType {
    fn choice(values: &[&str]) -> Self {
        FieldType::Choice(values.iter().map(|v| v.to_string()).collect())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            FieldType::Text => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::TextList => "string[]",
            FieldType::Choice(_) => "enum",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    pub description: String,
}

impl FieldSpec {
    pub fn required(name: &str, field_type: FieldType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            required: true,
            description: description.to_string(),
        }
    }

    pub fn optional(name: &str, field_type: FieldType, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, field_type, description)
        }
    }
}

/// 代理期望的输出结构
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSchema {
    pub fields: Vec<FieldSpec>,
    pub narrative_field: String,
}

impl AgentSchema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self {
            fields,
            narrative_field: NARRATIVE_FIELD.to_string(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// 生成给分析服务的结构说明，每行一个字段
    pub fn describe(&self) -> String {
        let mut lines: Vec<String> = self
            .fields
            .iter()
            .map(|f| {
                let allowed = match &f.field_type {
                    FieldType::Choice(values) => format!(" one of [{}]", values.join(", ")),
                    _ => String::new(),
                };
                format!(
                    "- {} ({}{}, {}): {}",
                    f.name,
                    f.field_type.type_name(),
                    allowed,
                    if f.required { "required" } else { "optional" },
                    f.description
                )
            })
            .collect();
        lines.push(format!(
            "- {} (string, required): long-form narrative of the analysis",
            self.narrative_field
        ));
        lines.join("\n")
    }
}

/// 内置代理种类，封闭集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Security,
    CodeQuality,
    Documentation,
    Performance,
}

impl AgentKind {
    pub fn all() -> [AgentKind; 4] {
        [
            AgentKind::Security,
            AgentKind::CodeQuality,
            AgentKind::Documentation,
            AgentKind::Performance,
        ]
    }

    pub fn key(&self) -> &'static str {
        match self {
            AgentKind::Security => "security",
            AgentKind::CodeQuality => "code_quality",
            AgentKind::Documentation => "documentation",
            AgentKind::Performance => "performance",
        }
    }

    pub fn schema(&self) -> AgentSchema {
        match self {
            AgentKind::Security => AgentSchema::new(vec![
                FieldSpec::required(
                    "risk_level",
                    FieldType::choice(&["none", "low", "medium", "high", "critical"]),
                    "overall security risk of the file",
                ),
                FieldSpec::required("findings", FieldType::TextList, "individual security findings"),
                FieldSpec::optional("cwe_ids", FieldType::TextList, "related CWE identifiers"),
            ]),
            AgentKind::CodeQuality => AgentSchema::new(vec![
                FieldSpec::required(
                    "maintainability",
                    FieldType::choice(&["poor", "fair", "good", "excellent"]),
                    "maintainability rating",
                ),
                FieldSpec::required("score", FieldType::Integer, "quality score from 0 to 100"),
                FieldSpec::required("issues", FieldType::TextList, "concrete quality issues"),
            ]),
            AgentKind::Documentation => AgentSchema::new(vec![
                FieldSpec::required(
                    "coverage",
                    FieldType::choice(&["missing", "partial", "complete"]),
                    "documentation coverage",
                ),
                FieldSpec::required(
                    "missing_items",
                    FieldType::TextList,
                    "public items lacking documentation",
                ),
            ]),
            AgentKind::Performance => AgentSchema::new(vec![
                FieldSpec::required(
                    "complexity",
                    FieldType::choice(&["low", "moderate", "high"]),
                    "algorithmic complexity estimate",
                ),
                FieldSpec::required("hotspots", FieldType::TextList, "likely performance hotspots"),
                FieldSpec::optional("uses_io", FieldType::Boolean, "whether the file performs I/O"),
                FieldSpec::optional("estimated_speedup", FieldType::Number, "possible speedup factor"),
            ]),
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            AgentKind::Security => "安全审查",
            AgentKind::CodeQuality => "代码质量",
            AgentKind::Documentation => "文档完整性",
            AgentKind::Performance => "性能分析",
        }
    }
}

/// 调用约束
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationConstraints {
    /// 文件内容超过该字节数时不调用分析服务
    pub max_input_bytes: usize,
    /// 覆盖全局的单次调用超时
    pub timeout: Option<Duration>,
}

impl Default for InvocationConstraints {
    fn default() -> Self {
        Self {
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub key: String,
    pub kind: AgentKind,
    pub schema: AgentSchema,
    pub constraints: InvocationConstraints,
}

impl AgentDescriptor {
    pub fn builtin(kind: AgentKind) -> Self {
        Self {
            key: kind.key().to_string(),
            kind,
            schema: kind.schema(),
            constraints: InvocationConstraints::default(),
        }
    }

    pub fn with_constraints(mut self, constraints: InvocationConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// 本代理的有效调用超时
    pub fn effective_timeout(&self, default_timeout: Duration) -> Duration {
        self.constraints.timeout.unwrap_or(default_timeout)
    }
}

/// 可用代理目录
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    agents: Vec<AgentDescriptor>,
}

impl AgentRegistry {
    pub fn new(agents: Vec<AgentDescriptor>) -> Self {
        Self { agents }
    }

    pub fn builtin() -> Self {
        Self::new(
            AgentKind::all()
                .into_iter()
                .map(AgentDescriptor::builtin)
                .collect(),
        )
    }

    pub fn get(&self, key: &str) -> Option<&AgentDescriptor> {
        self.agents.iter().find(|a| a.key == key)
    }

    pub fn keys(&self) -> Vec<&str> {
        self.agents.iter().map(|a| a.key.as_str()).collect()
    }

    pub fn descriptors(&self) -> &[AgentDescriptor] {
        &self.agents
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
