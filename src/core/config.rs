//! # Configuration Module / 配置模块
//!
//! The run configuration, loaded from an optional `Megatest.toml` and then
//! overridden by command-line flags. Every key has a default, so a missing file
//! is the same as an empty one.
//!
//! 运行配置，从可选的 `Megatest.toml` 加载，然后被命令行参数覆盖。
//! 每个键都有默认值，因此缺失的文件等同于空文件。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::error::ConfigError;
use crate::core::models::SYSTEM_VERSION;
use crate::core::{planner, provision};

/// Default configuration file name / 默认配置文件名
pub const CONFIG_FILE_NAME: &str = "Megatest.toml";

/// Library version name that selects the bleeding-edge source tree.
pub const FOSSIL_VERSION: &str = "fossil";

/// Upper bound for the derived default concurrency.
pub const MAX_DEFAULT_CONCURRENCY: usize = 8;

pub const DEFAULT_INTERPRETER_VERSIONS: &[&str] = &[
    "3.4.1", "3.3.5", "3.2.5", "3.1.5", "2.7.7", "2.6.9", "2.5.6", "2.4.6", "2.3.7", "system",
];

pub const DEFAULT_LIB_VERSIONS: &[&str] = &["3.8.5"];

pub const DEFAULT_WIDTHS: &[u8] = &[2, 4];

/// What a worker does with a job error that is neither a build nor a test failure
/// (for example an unwritable log file).
///
/// 工作者如何处理既不是构建失败也不是测试失败的任务错误（例如日志文件不可写）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnexpectedErrorPolicy {
    /// Record the job as failed and keep going / 记录任务失败并继续
    #[default]
    Record,
    /// Stop the worker and fail the run once the queue drains / 停止该工作者，并在队列排空后使运行失败
    Abort,
}

/// A group of input files copied from the project into every job's workdir.
/// 从项目复制到每个任务工作目录的一组输入文件。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct InputSet {
    /// Directory relative to the project root / 相对于项目根目录的目录
    pub source: String,
    /// Directory relative to the job workdir / 相对于任务工作目录的目录
    pub dest: String,
    /// File extensions to copy, without the dot / 要复制的文件扩展名（不含点）
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Exact file names to copy / 要复制的确切文件名
    #[serde(default)]
    pub files: Vec<String>,
}

impl InputSet {
    pub fn new(source: &str, dest: &str, extensions: &[&str], files: &[&str]) -> Self {
        Self {
            source: source.to_string(),
            dest: dest.to_string(),
            extensions: extensions.iter().map(|s| s.to_string()).collect(),
            files: files.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn matches(&self, file_name: &str) -> bool {
        if self.files.iter().any(|f| f == file_name) {
            return true;
        }
        Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e == ext))
    }
}

/// The whole run configuration.
/// 完整的运行配置。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MegatestConfig {
    /// UI language, e.g. "en" or "zh-CN" / 界面语言
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub interpreter_versions: Vec<String>,
    pub widths: Vec<u8>,
    pub lib_versions: Vec<String>,
    /// Also test the bleeding-edge library tree / 同时测试最新开发版本的库
    pub include_fossil: bool,
    /// Worker count; derived from the CPU count when unset / 工作者数量；未设置时根据 CPU 数量推导
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    pub work_root: String,
    pub results_root: String,
    pub system_interpreter: String,
    /// Interpreter versions at or above this (lexically) have no width option.
    pub width_cutoff: String,
    pub download_base_url: String,
    /// Command that writes the URL given as its last argument to stdout.
    pub downloader: String,
    /// Extra library directory for legacy builds; detected when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_lib_dir: Option<String>,
    /// Value of the test-prefix variable handed to the test suite.
    pub test_prefix: String,
    pub on_unexpected_error: UnexpectedErrorPolicy,
    /// Build artifacts removed from the project before a run.
    pub stale_artifacts: Vec<String>,
    pub inputs: Vec<InputSet>,
}

impl Default for MegatestConfig {
    fn default() -> Self {
        Self {
            language: None,
            interpreter_versions: to_strings(DEFAULT_INTERPRETER_VERSIONS),
            widths: DEFAULT_WIDTHS.to_vec(),
            lib_versions: to_strings(DEFAULT_LIB_VERSIONS),
            include_fossil: false,
            concurrency: None,
            work_root: "work".to_string(),
            results_root: "megatestresults".to_string(),
            system_interpreter: "/usr/bin/python".to_string(),
            width_cutoff: "3.3".to_string(),
            download_base_url: "https://www.python.org/ftp/python".to_string(),
            downloader: "wget -q -O -".to_string(),
            extra_lib_dir: None,
            test_prefix: String::new(),
            on_unexpected_error: UnexpectedErrorPolicy::Record,
            stale_artifacts: vec!["apsw.so".to_string(), "src/shell.c".to_string()],
            inputs: vec![
                InputSet::new(".", ".", &["py"], &["checksums"]),
                InputSet::new("tools", "tools", &["py"], &[]),
                InputSet::new("src", "src", &["c", "h"], &[]),
            ],
        }
    }
}

impl MegatestConfig {
    /// Library versions including the optional bleeding-edge entry.
    pub fn effective_lib_versions(&self) -> Vec<String> {
        let mut versions: Vec<String> = self
            .lib_versions
            .iter()
            .filter(|v| !v.is_empty())
            .cloned()
            .collect();
        if self.include_fossil && !versions.iter().any(|v| v == FOSSIL_VERSION) {
            versions.push(FOSSIL_VERSION.to_string());
        }
        versions
    }

    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.unwrap_or_else(default_concurrency)
    }

    /// Rejects configurations that cannot produce a meaningful run.
    /// 拒绝无法产生有意义运行的配置。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interpreter_versions.iter().all(|v| v.is_empty()) {
            return Err(ConfigError::NoInterpreterVersions);
        }
        if self.effective_lib_versions().is_empty() {
            return Err(ConfigError::NoLibVersions);
        }
        if self.widths.is_empty() {
            return Err(ConfigError::NoWidths);
        }
        if self.widths.contains(&0) {
            return Err(ConfigError::ReservedWidth);
        }
        if self.effective_concurrency() == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        let lib_versions = self.effective_lib_versions();
        for value in self.interpreter_versions.iter().chain(&lib_versions) {
            if !value.is_empty() {
                planner::check_axis_value(value)?;
            }
        }
        for version in self.interpreter_versions.iter().filter(|v| !v.is_empty()) {
            if version != SYSTEM_VERSION
                && provision::archive_source(&self.download_base_url, version).is_err()
            {
                return Err(ConfigError::InvalidVersion(version.clone()));
            }
        }
        Ok(())
    }

    /// Expands `~` and environment variables and anchors relative paths at `base`.
    pub fn resolve_path(base: &Path, raw: &str) -> Result<PathBuf> {
        let expanded = shellexpand::full(raw)
            .with_context(|| format!("Failed to expand path: {raw}"))?;
        let path = PathBuf::from(expanded.as_ref());
        Ok(if path.is_absolute() {
            path
        } else {
            base.join(path)
        })
    }
}

/// `min(2 × CPUs, 8)`, never below one.
pub fn default_concurrency() -> usize {
    (num_cpus::get() * 2).clamp(1, MAX_DEFAULT_CONCURRENCY)
}

/// Loads a configuration file.
/// 加载配置文件。
pub fn load_config(path: &Path) -> Result<MegatestConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

pub fn parse_config(content: &str) -> Result<MegatestConfig> {
    Ok(toml::from_str(content)?)
}

/// Splits a comma-separated command-line list, dropping empty items.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses a comma-separated list of unicode widths.
pub fn parse_widths(raw: &str) -> Result<Vec<u8>> {
    parse_list(raw)
        .iter()
        .map(|item| {
            item.parse::<u8>()
                .with_context(|| format!("Invalid unicode width: {item}"))
        })
        .collect()
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
