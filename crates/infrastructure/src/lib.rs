//! 能力接口的生产实现：本地文件读取、HTTP分析服务与JSON快照存储

pub mod analysis_provider;
pub mod file_access;
pub mod snapshot_store;

pub use analysis_provider::HttpAnalysisProvider;
pub use file_access::LocalFileAccess;
pub use snapshot_store::JsonFileSnapshotStore;
