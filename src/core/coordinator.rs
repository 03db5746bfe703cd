//! # Run Coordinator Module / 运行协调模块
//!
//! Orchestrates a whole run: reset the on-disk state, build and prepare the
//! matrix, start the worker pool, wait for it to drain and hand back the
//! aggregated outcomes. There is no retry and no cancellation path once the
//! pool starts.
//!
//! 编排整个运行：重置磁盘状态、构建并准备矩阵、启动工作者池、等待其排空并返回汇总结果。
//! 工作者池启动后没有重试，也没有取消路径。

use anyhow::{Result, bail};
use chrono::Local;
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::config::MegatestConfig;
use crate::core::error::ConfigError;
use crate::core::execution::JobExecutor;
use crate::core::models::RunSummary;
use crate::core::planner::{self, MatrixAxes};
use crate::core::pool;
use crate::core::provision::{self, ProvisionSettings};
use crate::infra::command::CommandRunner;
use crate::infra::{fs, t};
use crate::reporting::console;

/// The two top-level directories of a run, both absolute.
/// 一次运行的两个顶层目录，均为绝对路径。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    pub work_root: PathBuf,
    pub results_root: PathBuf,
}

/// Wipes and recreates the work and results roots and removes stale build
/// artifacts from the project. Destroys all state of any previous run.
///
/// A root or artifact equal to or containing the project, or two roots that
/// are equal or nested, fail with [`ConfigError::UnsafeRoot`] before anything
/// is deleted.
///
/// 清空并重新创建工作目录和结果目录，并从项目中删除过期的构建产物。会销毁之前运行的所有状态。
/// 若某个根目录等于或包含项目目录，或两个根目录相同或互相嵌套，则在删除任何内容之前报错。
pub fn reset_layout(project_root: &Path, config: &MegatestConfig) -> Result<RunLayout> {
    let project = fs::normalize_path(project_root)?;
    let results_root =
        fs::normalize_path(&MegatestConfig::resolve_path(project_root, &config.results_root)?)?;
    let work_root =
        fs::normalize_path(&MegatestConfig::resolve_path(project_root, &config.work_root)?)?;
    check_root(&project, &work_root)?;
    check_root(&project, &results_root)?;
    if fs::paths_overlap(&work_root, &results_root) {
        return Err(ConfigError::UnsafeRoot(results_root).into());
    }

    let mut artifacts = Vec::with_capacity(config.stale_artifacts.len());
    for artifact in &config.stale_artifacts {
        let path =
            fs::normalize_path(&MegatestConfig::resolve_path(project_root, artifact)?)?;
        check_root(&project, &path)?;
        artifacts.push(path);
    }
    for artifact in &artifacts {
        fs::remove_if_exists(artifact)?;
    }

    Ok(RunLayout {
        work_root: fs::reset_dir(&work_root)?,
        results_root: fs::reset_dir(&results_root)?,
    })
}

/// A directory that gets deleted must not be the project or one of its ancestors.
fn check_root(project: &Path, root: &Path) -> Result<(), ConfigError> {
    if project.starts_with(root) {
        Err(ConfigError::UnsafeRoot(root.to_path_buf()))
    } else {
        Ok(())
    }
}

async fn provision_settings(
    project_root: &Path,
    config: &MegatestConfig,
) -> Result<ProvisionSettings> {
    let extra_lib_dir = match &config.extra_lib_dir {
        Some(dir) => dir.clone(),
        None => provision::detect_multiarch_lib_dir().await,
    };
    // A bare program name is looked up on PATH by the shell.
    let system_interpreter = if config.system_interpreter.contains('/') {
        MegatestConfig::resolve_path(project_root, &config.system_interpreter)?
    } else {
        PathBuf::from(&config.system_interpreter)
    };
    Ok(ProvisionSettings {
        system_interpreter,
        download_base_url: config.download_base_url.clone(),
        downloader: config.downloader.clone(),
        extra_lib_dir,
    })
}

/// Runs the full matrix described by `config` with `runner` executing every
/// external command.
///
/// # Errors
/// Configuration errors and setup failures abort before any job starts.
/// Per-job failures never surface here; they are part of the returned summary.
/// Under the `abort` policy an unexpected job error fails the run after the
/// queue has drained.
pub async fn run_matrix<R: CommandRunner>(
    project_root: &Path,
    config: &MegatestConfig,
    runner: Arc<R>,
) -> Result<RunSummary> {
    config.validate()?;
    let concurrency = config.effective_concurrency();
    let started_at = Local::now();

    println!("{}", t!("run.starting").bold());
    println!("{}", t!("run.removing_old_work"));
    let layout = reset_layout(project_root, config)?;
    println!("{}", t!("run.reset_done"));

    let axes = MatrixAxes::from_config(config);
    let jobs = planner::plan_matrix(&axes, &layout.work_root, &layout.results_root)?;
    for job in &jobs {
        console::print_job_planned(job);
        planner::prepare_job(job, project_root, &config.inputs)?;
    }

    let settings = provision_settings(project_root, config).await?;
    let executor = Arc::new(JobExecutor::new(runner, settings, config.test_prefix.clone()));

    println!(
        "{}",
        t!("run.all_started", concurrency = concurrency).cyan()
    );
    let report = pool::run_pool(executor, jobs, concurrency, config.on_unexpected_error).await?;
    println!("\n{}", t!("run.finished").bold());

    let fatal: Vec<_> = report
        .workers
        .iter()
        .filter_map(|w| w.fatal_error.as_deref())
        .collect();
    if !fatal.is_empty() {
        bail!(
            "{}: {}",
            t!("run.aborted_unexpected"),
            fatal.join("; ")
        );
    }

    Ok(RunSummary {
        outcomes: report.outcomes,
        concurrency,
        started_at,
        finished_at: Local::now(),
    })
}
