use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use orchestrator_config::FileAccessConfig;
use orchestrator_core::FileAccess;
use orchestrator_errors::{FileAccessFailureKind, OrchestratorError, OrchestratorResult};
use tracing::debug;

/// 限定在根目录内的本地文件读取
#[derive(Debug, Clone)]
pub struct LocalFileAccess {
    root: PathBuf,
    max_file_bytes: u64,
    allowed_extensions: Vec<String>,
}

impl LocalFileAccess {
    pub fn new(config: &FileAccessConfig) -> OrchestratorResult<Self> {
        let root = std::fs::canonicalize(&config.root).map_err(|e| {
            OrchestratorError::config_error(format!("无法解析文件根目录 {}: {e}", config.root))
        })?;
        Ok(Self {
            root,
            max_file_bytes: config.max_file_bytes,
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|ext| ext.to_ascii_lowercase())
                .collect(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn check_extension(&self, path: &str) -> OrchestratorResult<()> {
        if self.allowed_extensions.is_empty() {
            return Ok(());
        }
        let extension = Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if self.allowed_extensions.contains(&extension) {
            Ok(())
        } else {
            Err(OrchestratorError::file_access(
                path,
                FileAccessFailureKind::DisallowedExtension,
                format!("不允许的扩展名 `{extension}`"),
            ))
        }
    }

    async fn resolve(&self, path: &str) -> OrchestratorResult<PathBuf> {
        let candidate = Path::new(path);
        let candidate = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        };

        let resolved = tokio::fs::canonicalize(&candidate).await.map_err(|e| {
            let kind = match e.kind() {
                ErrorKind::NotFound => FileAccessFailureKind::NotFound,
                _ => FileAccessFailureKind::Unreadable,
            };
            OrchestratorError::file_access(path, kind, e.to_string())
        })?;

        if !resolved.starts_with(&self.root) {
            return Err(OrchestratorError::file_access(
                path,
                FileAccessFailureKind::PathEscapesRoot,
                format!("路径不在 {} 之下", self.root.display()),
            ));
        }
        Ok(resolved)
    }
}

#[async_trait]
impl FileAccess for LocalFileAccess {
    async fn read(&self, path: &str) -> OrchestratorResult<Vec<u8>> {
        self.check_extension(path)?;
        let resolved = self.resolve(path).await?;

        let unreadable = |e: std::io::Error| {
            OrchestratorError::file_access(path, FileAccessFailureKind::Unreadable, e.to_string())
        };
        let metadata = tokio::fs::metadata(&resolved).await.map_err(unreadable)?;
        if !metadata.is_file() {
            return Err(OrchestratorError::file_access(
                path,
                FileAccessFailureKind::Unreadable,
                "不是普通文件",
            ));
        }
        if metadata.len() > self.max_file_bytes {
            return Err(OrchestratorError::file_access(
                path,
                FileAccessFailureKind::TooLarge,
                format!("{} 字节超过上限 {} 字节", metadata.len(), self.max_file_bytes),
            ));
        }

        let bytes = tokio::fs::read(&resolved).await.map_err(unreadable)?;
        debug!(path = %resolved.display(), bytes = bytes.len(), "读取文件");
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, LocalFileAccess) {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "pub fn answer() -> u8 { 42 }").unwrap();
        std::fs::write(dir.path().join("big.rs"), "x".repeat(64)).unwrap();
        std::fs::write(dir.path().join("tool.exe"), "MZ").unwrap();

        let config = FileAccessConfig {
            root: dir.path().to_string_lossy().into_owned(),
            max_file_bytes: 32,
            allowed_extensions: vec!["RS".to_string()],
        };
        let access = LocalFileAccess::new(&config).unwrap();
        (dir, access)
    }

    fn kind_of(err: OrchestratorError) -> FileAccessFailureKind {
        match err {
            OrchestratorError::FileAccess { kind, .. } => kind,
            other => panic!("expected file access error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reads_file_under_root() {
        let (_dir, access) = setup();
        let bytes = access.read("src/lib.rs").await.unwrap();
        assert_eq!(bytes, b"pub fn answer() -> u8 { 42 }");
    }

    #[tokio::test]
    async fn test_failure_kinds() {
        let (dir, access) = setup();
        assert_eq!(
            kind_of(access.read("src/missing.rs").await.unwrap_err()),
            FileAccessFailureKind::NotFound
        );
        assert_eq!(
            kind_of(access.read("big.rs").await.unwrap_err()),
            FileAccessFailureKind::TooLarge
        );
        assert_eq!(
            kind_of(access.read("tool.exe").await.unwrap_err()),
            FileAccessFailureKind::DisallowedExtension
        );

        let outside = TempDir::new().unwrap();
        let escaped = outside.path().join("secret.rs");
        std::fs::write(&escaped, "fn secret() {}").unwrap();
        assert_eq!(
            kind_of(access.read(&escaped.to_string_lossy()).await.unwrap_err()),
            FileAccessFailureKind::PathEscapesRoot
        );

        let relative_escape = format!(
            "../{}/secret.rs",
            outside.path().file_name().unwrap().to_string_lossy()
        );
        let relative = access.read(&relative_escape).await.unwrap_err();
        // 两个临时目录可能不在同一父目录下
        assert!(matches!(
            kind_of(relative),
            FileAccessFailureKind::PathEscapesRoot | FileAccessFailureKind::NotFound
        ));
        drop(dir);
    }

    #[test]
    fn test_missing_root_is_config_error() {
        let config = FileAccessConfig {
            root: "/definitely/not/a/real/root".to_string(),
            ..FileAccessConfig::default()
        };
        assert!(matches!(
            LocalFileAccess::new(&config),
            Err(OrchestratorError::Configuration(_))
        ));
    }
}
