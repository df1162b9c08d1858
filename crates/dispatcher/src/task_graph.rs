use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use orchestrator_core::{AgentDescriptor, AgentRegistry, Job, WorkItem};
use orchestrator_errors::{OrchestratorError, OrchestratorResult};
use uuid::Uuid;

/// 展开后的作业：作业记录加上本次用到的代理描述
pub struct TaskGraph {
    pub job: Job,
    pub agents: Arc<HashMap<String, AgentDescriptor>>,
}

/// 把批量请求展开为工作项，每个 (文件, 代理) 组合恰好一个
pub struct TaskGraphBuilder<'a> {
    registry: &'a AgentRegistry,
}

impl<'a> TaskGraphBuilder<'a> {
    pub fn new(registry: &'a AgentRegistry) -> Self {
        Self { registry }
    }

    /// 校验失败时不会创建任何作业或工作项
    pub fn build(&self, files: &[String], agents: &[String]) -> OrchestratorResult<TaskGraph> {
        let files = Self::normalize_files(files)?;
        let descriptors = self.resolve_agents(agents)?;

        let id = Uuid::new_v4();
        let mut items = Vec::with_capacity(files.len() * descriptors.len());
        for file in &files {
            for agent in &descriptors {
                items.push(WorkItem::new(id, items.len(), file.clone(), agent.key.clone()));
            }
        }

        let agent_keys = descriptors.iter().map(|a| a.key.clone()).collect();
        let agents = descriptors
            .into_iter()
            .map(|descriptor| (descriptor.key.clone(), descriptor))
            .collect();

        Ok(TaskGraph {
            job: Job::new(id, files, agent_keys, items),
            agents: Arc::new(agents),
        })
    }

    /// 去重并保留首次出现的顺序
    fn normalize_files(files: &[String]) -> OrchestratorResult<Vec<String>> {
        if files.is_empty() {
            return Err(OrchestratorError::validation_error("文件列表不能为空"));
        }
        if let Some(position) = files.iter().position(|f| f.trim().is_empty()) {
            return Err(OrchestratorError::validation_error(format!(
                "第 {} 个文件路径为空",
                position + 1
            )));
        }

        let mut seen = HashSet::new();
        Ok(files
            .iter()
            .filter(|f| seen.insert(f.as_str()))
            .cloned()
            .collect())
    }

    fn resolve_agents(&self, agents: &[String]) -> OrchestratorResult<Vec<AgentDescriptor>> {
        if agents.is_empty() {
            return Err(OrchestratorError::validation_error("代理列表不能为空"));
        }

        let unknown: Vec<&str> = agents
            .iter()
            .map(String::as_str)
            .filter(|key| self.registry.get(key).is_none())
            .collect();
        if !unknown.is_empty() {
            return Err(OrchestratorError::validation_error(format!(
                "未知的分析代理: {}（可用: {}）",
                unknown.join(", "),
                self.registry.keys().join(", ")
            )));
        }

        let mut seen = HashSet::new();
        if let Some(duplicate) = agents.iter().find(|key| !seen.insert(key.as_str())) {
            return Err(OrchestratorError::validation_error(format!(
                "分析代理重复: {duplicate}"
            )));
        }

        Ok(agents
            .iter()
            .filter_map(|key| self.registry.get(key).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_items_are_files_outer_agents_inner() {
        let registry = AgentRegistry::builtin();
        let graph = TaskGraphBuilder::new(&registry)
            .build(
                &strings(&["a.rs", "b.rs"]),
                &strings(&["security", "code_quality", "performance"]),
            )
            .unwrap();

        let pairs: Vec<(usize, &str, &str)> = graph
            .job
            .items
            .iter()
            .map(|i| (i.index, i.file_path.as_str(), i.agent_key.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (0, "a.rs", "security"),
                (1, "a.rs", "code_quality"),
                (2, "a.rs", "performance"),
                (3, "b.rs", "security"),
                (4, "b.rs", "code_quality"),
                (5, "b.rs", "performance"),
            ]
        );
        assert_eq!(graph.job.progress.total, 6);
        assert_eq!(graph.agents.len(), 3);
        assert!(graph.job.items.iter().all(|i| i.job_id == graph.job.id));
    }

    #[test]
    fn test_duplicate_files_keep_first_occurrence() {
        let registry = AgentRegistry::builtin();
        let graph = TaskGraphBuilder::new(&registry)
            .build(&strings(&["b.rs", "a.rs", "b.rs"]), &strings(&["security"]))
            .unwrap();
        assert_eq!(graph.job.files, strings(&["b.rs", "a.rs"]));
        assert_eq!(graph.job.items.len(), 2);
    }

    #[test]
    fn test_rejected_requests() {
        let registry = AgentRegistry::builtin();
        let builder = TaskGraphBuilder::new(&registry);
        let cases = [
            (strings(&[]), strings(&["security"])),
            (strings(&["a.rs"]), strings(&[])),
            (strings(&["a.rs", "  "]), strings(&["security"])),
            (strings(&["a.rs"]), strings(&["security", "astrology"])),
            (strings(&["a.rs"]), strings(&["security", "security"])),
        ];
        for (files, agents) in cases {
            let result = builder.build(&files, &agents);
            assert!(
                matches!(result, Err(OrchestratorError::Validation(_))),
                "files={files:?} agents={agents:?}"
            );
        }
    }
}
