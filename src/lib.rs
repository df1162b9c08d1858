//! 批量文件分析任务编排引擎
//!
//! 将一组文件与一组分析代理展开为工作项，并发调用分析服务，
//! 校验返回结果，并提供进度、日志、取消与快照查询。

pub mod app;
pub mod report;
pub mod shutdown;

pub use app::Application;
pub use report::{JobReport, OutputFormat};
