//! # Orchestrator Testing Utils
//!
//! 各 crate 共享的测试工具：分析服务、文件访问与快照存储的内存实现，
//! 测试数据构建器，以及异步等待等辅助函数。
//!
//! ```toml
//! [dev-dependencies]
//! orchestrator-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
