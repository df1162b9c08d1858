//! 作业编排：请求展开、并发调度、作业注册表与控制接口

pub mod controller;
pub mod job_store;
pub mod scheduler;
pub mod task_graph;

pub use controller::*;
pub use job_store::{JobHandle, JobStore};
pub use scheduler::WorkerPool;
pub use task_graph::{TaskGraph, TaskGraphBuilder};
