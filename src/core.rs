//! # Core Module / 核心模块
//!
//! This module contains the core functionality of megatest:
//! the job model, matrix planning, provisioning, execution and the worker pool.
//!
//! 此模块包含 megatest 的核心功能：
//! 任务模型、矩阵计划、环境准备、执行和工作者池。

pub mod config;
pub mod coordinator;
pub mod error;
pub mod execution;
pub mod models;
pub mod planner;
pub mod pool;
pub mod provision;

// Re-exports
pub use config::MegatestConfig;
pub use coordinator::run_matrix;
pub use models::{JobDescriptor, JobOutcome, RunSummary};
