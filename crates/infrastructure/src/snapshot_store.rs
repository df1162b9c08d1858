use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use orchestrator_core::{JobSnapshot, SnapshotStore};
use orchestrator_errors::OrchestratorResult;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// 以单个JSON文件保存所有作业的快照
///
/// 写入先落到临时文件再重命名，进程崩溃时不会留下半个文件。
/// 版本低于已保存快照的写入会被跳过。
pub struct JsonFileSnapshotStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> OrchestratorResult<HashMap<Uuid, JobSnapshot>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice(&bytes) {
            Ok(snapshots) => Ok(snapshots),
            Err(e) => {
                warn!(path = %self.path.display(), "快照文件损坏，将重新开始记录: {}", e);
                Ok(HashMap::new())
            }
        }
    }

    async fn write_all(&self, snapshots: &HashMap<Uuid, JobSnapshot>) -> OrchestratorResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(snapshots)?;
        tokio::fs::write(&tmp_path, content).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for JsonFileSnapshotStore {
    async fn save(&self, snapshot: &JobSnapshot) -> OrchestratorResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut snapshots = self.read_all().await?;

        if let Some(existing) = snapshots.get(&snapshot.job_id) {
            if existing.version() > snapshot.version() {
                debug!(
                    job_id = %snapshot.job_id,
                    existing = existing.version(),
                    incoming = snapshot.version(),
                    "跳过过期快照"
                );
                return Ok(());
            }
        }

        snapshots.insert(snapshot.job_id, snapshot.clone());
        self.write_all(&snapshots).await
    }

    async fn load(&self, job_id: Uuid) -> OrchestratorResult<Option<JobSnapshot>> {
        Ok(self.read_all().await?.remove(&job_id))
    }

    async fn load_all(&self) -> OrchestratorResult<HashMap<Uuid, JobSnapshot>> {
        self.read_all().await
    }
}
