pub mod app_config;
pub mod execution;
pub mod observability;
pub mod providers;

pub use app_config::*;
pub use execution::*;
pub use observability::*;
pub use providers::*;
