//! # Megatest Library / Megatest 库
//!
//! This library provides the core functionality for `megatest`, a parallel
//! build-and-test matrix runner. Every cell of the matrix (interpreter version,
//! unicode width, library version) gets its own private directory tree, its own
//! interpreter build and its own test run, all drained from one shared queue by
//! a fixed pool of workers.
//!
//! 此库为 `megatest` 提供核心功能，这是一个并行的构建与测试矩阵运行器。
//! 矩阵中的每个单元（解释器版本、Unicode 宽度、库版本）都有自己独立的目录树、
//! 解释器构建和测试运行，由固定数量的工作者从一个共享队列中取出执行。
//!
//! ## Modules / 模块
//!
//! - `core` - Job model, matrix generation, provisioning, execution and the worker pool
//! - `infra` - Process running and file system operations
//! - `reporting` - Console progress, summaries and HTML reports
//! - `cli` - Command-line interface and commands
//!
//! - `core` - 任务模型、矩阵生成、环境准备、执行和工作者池
//! - `infra` - 进程执行和文件系统操作
//! - `reporting` - 控制台进度、摘要和 HTML 报告
//! - `cli` - 命令行接口和命令

pub mod cli;
pub mod core;
pub mod infra;
pub mod reporting;

// Re-export commonly used items
pub use core::config;
pub use core::models;

/// Initializes the application's internationalization (i18n) based on the system locale.
///
/// It attempts to match the full locale (e.g., "zh-CN"), then just the language
/// code (e.g., "en"), and finally falls back to "en".
pub fn init() {
    let locale = sys_locale::get_locale().unwrap_or_else(|| "en".to_string());
    rust_i18n::set_locale(&resolve_locale(&locale));
}

/// Maps an arbitrary locale string onto one of the bundled translations.
/// 将任意区域设置字符串映射到内置的翻译之一。
pub fn resolve_locale(locale: &str) -> String {
    let available_locales = rust_i18n::available_locales!();

    if available_locales.contains(&locale) {
        return locale.to_string();
    }
    locale
        .split('-')
        .next()
        .filter(|lang_code| available_locales.contains(lang_code))
        .unwrap_or("en")
        .to_string()
}

// Initialize i18n
rust_i18n::i18n!("locales", fallback = "en");
