//! 工作项执行：结构校验、带退避的重试以及单项执行流程

pub mod item_runner;
pub mod retry_executor;
pub mod validator;

pub use item_runner::ItemRunner;
pub use retry_executor::RetryExecutor;
pub use validator::ResultValidator;
