//! 分析输出的结构校验
//!
//! 只校验结构，不判断内容是否正确。通过校验的输出被规范化为 [`AnalysisReport`]：
//! 未声明的字段被丢弃，枚举值统一为规范写法。

use std::collections::BTreeMap;

use orchestrator_core::{AgentDescriptor, AnalysisReport, FieldSpec, FieldType};
use orchestrator_errors::{OrchestratorError, OrchestratorResult};
use serde_json::Value;

const FENCE: &str = "```";
const JSON_FENCE: &str = "```json";

pub struct ResultValidator;

impl ResultValidator {
    /// 解析原始输出并按代理的输出结构校验
    pub fn validate(raw: &str, agent: &AgentDescriptor) -> OrchestratorResult<AnalysisReport> {
        let value = Self::parse(raw)
            .map_err(|violation| OrchestratorError::schema_error(&agent.key, vec![violation]))?;
        Self::validate_value(&value, agent)
    }

    /// 对已解析的JSON做校验，同一输入总是得到相同的报告
    pub fn validate_value(
        value: &Value,
        agent: &AgentDescriptor,
    ) -> OrchestratorResult<AnalysisReport> {
        let Some(object) = value.as_object() else {
            return Err(OrchestratorError::schema_error(
                &agent.key,
                vec![format!("输出必须是JSON对象，实际为 {}", json_type_name(value))],
            ));
        };

        let mut violations = Vec::new();
        let mut fields = BTreeMap::new();

        for spec in &agent.schema.fields {
            match object.get(&spec.name) {
                None | Some(Value::Null) => {
                    if spec.required {
                        violations.push(format!("缺少必需字段 `{}`", spec.name));
                    }
                }
                Some(value) => match check_field(spec, value) {
                    Ok(normalized) => {
                        fields.insert(spec.name.clone(), normalized);
                    }
                    Err(violation) => violations.push(violation),
                },
            }
        }

        let narrative_field = &agent.schema.narrative_field;
        let narrative = match object.get(narrative_field) {
            Some(Value::String(text)) if !text.trim().is_empty() => Some(text.clone()),
            Some(Value::String(_)) => {
                violations.push(format!("叙述字段 `{narrative_field}` 不能为空"));
                None
            }
            None | Some(Value::Null) => {
                violations.push(format!("缺少必需字段 `{narrative_field}`"));
                None
            }
            Some(other) => {
                violations.push(format!(
                    "字段 `{narrative_field}` 类型错误: 期望 string，实际为 {}",
                    json_type_name(other)
                ));
                None
            }
        };

        match narrative {
            Some(narrative) if violations.is_empty() => Ok(AnalysisReport::new(
                agent.key.clone(),
                fields,
                narrative_field.clone(),
                narrative,
            )),
            _ => Err(OrchestratorError::schema_error(&agent.key, violations)),
        }
    }

    fn parse(raw: &str) -> Result<Value, String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err("输出为空".to_string());
        }
        let body = extract_fenced_block(trimmed)?.unwrap_or(trimmed);
        serde_json::from_str(body).map_err(|e| format!("输出不是合法的JSON: {e}"))
    }
}

/// 提取唯一的 ```json 代码块，没有代码块时返回 None
fn extract_fenced_block(text: &str) -> Result<Option<&str>, String> {
    let Some(start) = text.find(JSON_FENCE) else {
        return Ok(None);
    };
    let after_open = &text[start + JSON_FENCE.len()..];
    let Some(end) = after_open.find(FENCE) else {
        return Err("```json 代码块没有闭合".to_string());
    };
    if after_open[end + FENCE.len()..].contains(JSON_FENCE) {
        return Err("输出包含多个 ```json 代码块".to_string());
    }
    Ok(Some(after_open[..end].trim()))
}

fn check_field(spec: &FieldSpec, value: &Value) -> Result<Value, String> {
    match (&spec.field_type, value) {
        (FieldType::Text, Value::String(_)) | (FieldType::Boolean, Value::Bool(_)) => {
            Ok(value.clone())
        }
        (FieldType::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(value.clone()),
        (FieldType::Number, Value::Number(_)) => Ok(value.clone()),
        (FieldType::TextList, Value::Array(items)) => {
            match items.iter().position(|item| !item.is_string()) {
                Some(position) => Err(format!(
                    "字段 `{}` 的第 {} 个元素必须是字符串",
                    spec.name,
                    position + 1
                )),
                None => Ok(value.clone()),
            }
        }
        (FieldType::Choice(allowed), Value::String(text)) => allowed
            .iter()
            .find(|candidate| candidate.eq_ignore_ascii_case(text.trim()))
            .map(|canonical| Value::String(canonical.clone()))
            .ok_or_else(|| {
                format!(
                    "字段 `{}` 的值 `{}` 不在允许范围 [{}] 内",
                    spec.name,
                    text,
                    allowed.join(", ")
                )
            }),
        (field_type, other) => Err(format!(
            "字段 `{}` 类型错误: 期望 {}，实际为 {}",
            spec.name,
            field_type.type_name(),
            json_type_name(other)
        )),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
