use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 通过结构校验后的规范化报告，创建后不可修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    agent_key: String,
    fields: BTreeMap<String, Value>,
    narrative_field: String,
    narrative: String,
}

impl AnalysisReport {
    pub fn new(
        agent_key: impl Into<String>,
        fields: BTreeMap<String, Value>,
        narrative_field: impl Into<String>,
        narrative: impl Into<String>,
    ) -> Self {
        Self {
            agent_key: agent_key.into(),
            fields,
            narrative_field: narrative_field.into(),
            narrative: narrative.into(),
        }
    }

    pub fn agent_key(&self) -> &str {
        &self.agent_key
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn narrative(&self) -> &str {
        &self.narrative
    }

    /// 还原成与分析服务输出同形的JSON对象
    pub fn to_value(&self) -> Value {
        let mut object: serde_json::Map<String, Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        object.insert(
            self.narrative_field.clone(),
            Value::String(self.narrative.clone()),
        );
        Value::Object(object)
    }
}
