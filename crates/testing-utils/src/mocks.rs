//! 能力接口的内存实现
//!
//! 分析服务按 (文件, 代理) 预置响应脚本，未预置时返回该代理的合法输出。
//! 可选的闸门让测试精确控制同时在途的调用数量。

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use orchestrator_core::{
    AnalysisProvider, AnalysisRequest, FileAccess, JobSnapshot, SnapshotStore,
};
use orchestrator_errors::{
    CallFailureKind, FileAccessFailureKind, OrchestratorError, OrchestratorResult,
};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::builders::valid_output;

/// 单次调用的预置响应
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// 返回原始文本
    Output(String),
    /// 该代理的合法输出
    Valid,
    Fail(CallFailureKind),
    /// 永不返回，用于触发调用超时
    Hang,
    /// 等待一段时间后再给出响应
    Delayed(Duration, Box<ScriptedResponse>),
}

type ItemKey = (String, String);

#[derive(Clone, Default)]
pub struct ScriptedAnalysisProvider {
    scripts: Arc<Mutex<HashMap<ItemKey, VecDeque<ScriptedResponse>>>>,
    calls: Arc<Mutex<HashMap<ItemKey, u32>>>,
    total_calls: Arc<AtomicUsize>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedAnalysisProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// 所有调用都阻塞在闸门上，直到 [`release`](Self::release)
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    /// 为某个工作项预置响应序列，按调用顺序依次消费
    pub fn script(&self, file: &str, agent: &str, responses: Vec<ScriptedResponse>) -> &Self {
        self.scripts
            .lock()
            .unwrap()
            .insert((file.to_string(), agent.to_string()), responses.into());
        self
    }

    /// 放行 `count` 个阻塞中的或后续的调用
    pub fn release(&self, count: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(count);
        }
    }

    pub fn calls_for(&self, file: &str, agent: &str) -> u32 {
        self.calls
            .lock()
            .unwrap()
            .get(&(file.to_string(), agent.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// 已开始的调用总数，包括仍阻塞在闸门上的调用
    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    fn next_response(&self, key: &ItemKey) -> ScriptedResponse {
        self.scripts
            .lock()
            .unwrap()
            .get_mut(key)
            .and_then(VecDeque::pop_front)
            .unwrap_or(ScriptedResponse::Valid)
    }
}

async fn respond(response: ScriptedResponse, request: &AnalysisRequest) -> OrchestratorResult<String> {
    let mut response = response;
    loop {
        match response {
            ScriptedResponse::Output(raw) => return Ok(raw),
            ScriptedResponse::Valid => return Ok(valid_output(request.agent.kind)),
            ScriptedResponse::Fail(kind) => {
                return Err(OrchestratorError::call_failure(
                    kind,
                    format!("scripted {kind} failure"),
                ))
            }
            ScriptedResponse::Hang => std::future::pending::<()>().await,
            ScriptedResponse::Delayed(delay, next) => {
                tokio::time::sleep(delay).await;
                response = *next;
            }
        }
    }
}

#[async_trait]
impl AnalysisProvider for ScriptedAnalysisProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn invoke(
        &self,
        request: &AnalysisRequest,
        _timeout: Duration,
    ) -> OrchestratorResult<String> {
        let key = (request.file_path.clone(), request.agent.key.clone());
        *self.calls.lock().unwrap().entry(key.clone()).or_insert(0) += 1;
        self.total_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| OrchestratorError::Internal(e.to_string()))?
                .forget();
        }

        let response = self.next_response(&key);
        respond(response, request).await
    }
}

/// 内存文件系统
#[derive(Clone, Default)]
pub struct MockFileAccess {
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    failures: Arc<Mutex<HashMap<String, FileAccessFailureKind>>>,
    reads: Arc<AtomicUsize>,
}

impl MockFileAccess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.as_bytes().to_vec());
        self
    }

    pub fn with_bytes(self, path: &str, content: &[u8]) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_vec());
        self
    }

    pub fn with_failure(self, path: &str, kind: FileAccessFailureKind) -> Self {
        self.failures.lock().unwrap().insert(path.to_string(), kind);
        self
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileAccess for MockFileAccess {
    async fn read(&self, path: &str) -> OrchestratorResult<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(kind) = self.failures.lock().unwrap().get(path).copied() {
            return Err(OrchestratorError::file_access(path, kind, "scripted failure"));
        }
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| {
                OrchestratorError::file_access(path, FileAccessFailureKind::NotFound, "no such file")
            })
    }
}

/// 内存快照存储，与文件实现一样跳过过期版本
#[derive(Clone, Default)]
pub struct MemorySnapshotStore {
    snapshots: Arc<Mutex<HashMap<Uuid, JobSnapshot>>>,
    saves: Arc<AtomicUsize>,
    fail_writes: bool,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每次写入都失败的存储
    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn get(&self, job_id: Uuid) -> Option<JobSnapshot> {
        self.snapshots.lock().unwrap().get(&job_id).cloned()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(&self, snapshot: &JobSnapshot) -> OrchestratorResult<()> {
        if self.fail_writes {
            return Err(OrchestratorError::Io("snapshot store unavailable".to_string()));
        }
        let mut snapshots = self.snapshots.lock().unwrap();
        let stale = snapshots
            .get(&snapshot.job_id)
            .is_some_and(|existing| existing.version() > snapshot.version());
        if !stale {
            snapshots.insert(snapshot.job_id, snapshot.clone());
            self.saves.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn load(&self, job_id: Uuid) -> OrchestratorResult<Option<JobSnapshot>> {
        Ok(self.get(job_id))
    }

    async fn load_all(&self) -> OrchestratorResult<HashMap<Uuid, JobSnapshot>> {
        Ok(self.snapshots.lock().unwrap().clone())
    }
}
