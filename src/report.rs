//! 命令行输出渲染

use std::fmt::Write as _;

use anyhow::{Context, Result};
use orchestrator_core::{AgentDescriptor, ItemOutcome, ItemResult, JobSnapshot, JobSummary};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(anyhow::anyhow!("不支持的输出格式: {other}")),
        }
    }
}

/// 作业结束后的汇总
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job: JobSummary,
    pub results: Vec<ItemResult>,
}

pub fn render_report(report: &JobReport, format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return serde_json::to_string_pretty(report).context("序列化作业结果失败");
    }

    let mut out = String::new();
    let job = &report.job;
    writeln!(out, "作业 {} 状态: {}", job.id, job.status)?;
    writeln!(
        out,
        "共 {} 项: 成功 {} / 失败 {} / 取消 {}",
        job.progress.total, job.progress.succeeded, job.progress.failed, job.progress.cancelled
    )?;

    for result in &report.results {
        write!(
            out,
            "\n#{} {} [{}] 尝试 {} 次: ",
            result.index, result.file_path, result.agent_key, result.attempt_count
        )?;
        match &result.outcome {
            ItemOutcome::Succeeded { report } => {
                writeln!(out, "成功")?;
                for (name, value) in report.fields() {
                    writeln!(out, "  {name}: {value}")?;
                }
                writeln!(out, "  ---")?;
                for line in report.narrative().lines() {
                    writeln!(out, "  {line}")?;
                }
            }
            ItemOutcome::Failed { error } => {
                let category = serde_json::to_value(error.category)?;
                writeln!(
                    out,
                    "失败 ({})",
                    category.as_str().unwrap_or("internal")
                )?;
                writeln!(out, "  {}", error.message)?;
            }
            ItemOutcome::Cancelled => writeln!(out, "已取消")?,
            ItemOutcome::Pending => writeln!(out, "未开始")?,
            ItemOutcome::Running { .. } => writeln!(out, "执行中")?,
        }
    }
    Ok(out)
}

#[derive(Serialize)]
struct AgentListing<'a> {
    key: &'a str,
    name: &'a str,
    max_input_bytes: usize,
    output_schema: String,
}

pub fn render_agents(agents: &[AgentDescriptor], format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        let listing: Vec<AgentListing<'_>> = agents
            .iter()
            .map(|agent| AgentListing {
                key: &agent.key,
                name: agent.kind.display_name(),
                max_input_bytes: agent.constraints.max_input_bytes,
                output_schema: agent.schema.describe(),
            })
            .collect();
        return serde_json::to_string_pretty(&listing).context("序列化代理列表失败");
    }

    let mut out = String::new();
    for agent in agents {
        writeln!(out, "{} ({})", agent.key, agent.kind.display_name())?;
        writeln!(out, "{}", agent.schema.describe())?;
        writeln!(out)?;
    }
    Ok(out)
}

pub fn render_snapshots(snapshots: &[JobSnapshot], format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return serde_json::to_string_pretty(snapshots).context("序列化快照失败");
    }
    if snapshots.is_empty() {
        return Ok("没有已保存的作业快照\n".to_string());
    }

    let mut out = String::new();
    for snapshot in snapshots {
        writeln!(
            out,
            "{} {} {}/{} ({:.1}%) 更新于 {}",
            snapshot.job_id,
            snapshot.status,
            snapshot.progress.finished(),
            snapshot.progress.total,
            snapshot.progress.percent_complete,
            snapshot.updated_at.to_rfc3339()
        )?;
        for item in snapshot.items.iter().filter(|item| !item.is_terminal()) {
            writeln!(out, "  未完成: {}", item.item_ref())?;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_core::{AgentRegistry, ItemError};
    use orchestrator_errors::ErrorCategory;
    use orchestrator_testing_utils::JobBuilder;

    fn failed_result() -> ItemResult {
        ItemResult {
            index: 1,
            file_path: "src/missing.rs".to_string(),
            agent_key: "security".to_string(),
            attempt_count: 0,
            outcome: ItemOutcome::Failed {
                error: ItemError {
                    category: ErrorCategory::FileAccess,
                    message: "not found".to_string(),
                },
            },
        }
    }

    #[test]
    fn test_text_report_lists_every_item() {
        let job = JobBuilder::new().with_files(&["src/lib.rs"]).build();
        let report = JobReport {
            job: job.summary(),
            results: vec![failed_result()],
        };
        let text = render_report(&report, OutputFormat::Text).unwrap();
        assert!(text.contains(&job.id.to_string()));
        assert!(text.contains("#1 src/missing.rs [security]"));
        assert!(text.contains("失败 (file_access)"));
    }

    #[test]
    fn test_json_report_is_parseable() {
        let job = JobBuilder::new().build();
        let report = JobReport {
            job: job.summary(),
            results: vec![failed_result()],
        };
        let json = render_report(&report, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["results"][0]["outcome"], "failed");
        assert_eq!(value["results"][0]["error"]["category"], "file_access");
    }

    #[test]
    fn test_agent_listing_includes_schema() {
        let registry = AgentRegistry::builtin();
        let text = render_agents(registry.descriptors(), OutputFormat::Text).unwrap();
        assert!(text.contains("security"));
        assert!(text.contains("risk_level"));
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!(OutputFormat::parse("json").unwrap(), OutputFormat::Json);
        assert!(OutputFormat::parse("yaml").is_err());
    }
}
