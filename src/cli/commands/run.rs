//! # Run Command Module / 运行命令模块
//!
//! This module implements the `run` command: it loads the configuration,
//! applies command-line overrides, runs the whole matrix and reports.
//!
//! 此模块实现了 `run` 命令：加载配置、应用命令行覆盖、运行整个矩阵并输出报告。

use anyhow::{Context, Result, bail};
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::{
    core::{
        config::{self, CONFIG_FILE_NAME, MegatestConfig},
        coordinator,
    },
    infra::{command::ShellRunner, fs, t},
    reporting::{generate_html_report, print_summary},
};

/// Arguments of the `run` subcommand.
/// `run` 子命令的参数。
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    /// Explicit config file; must exist when given.
    pub config: Option<PathBuf>,
    pub project_dir: PathBuf,
    /// Comma-separated interpreter versions.
    pub pyvers: Option<String>,
    /// Comma-separated unicode widths.
    pub ucs: Option<String>,
    /// Comma-separated library versions.
    pub sqlitevers: Option<String>,
    pub fossil: bool,
    pub tasks: Option<usize>,
    pub html: Option<PathBuf>,
}

/// Executes the run command with the provided arguments.
///
/// # Arguments
/// * `args` - Parsed command-line arguments
/// * `language_pinned` - Whether `--lang` was given; if not, the config may pick the language
///
/// # Returns
/// `Ok(())` only when every job passed.
pub async fn execute(args: RunArgs, language_pinned: bool) -> Result<()> {
    let project_root = fs::absolute_path(&args.project_dir)
        .with_context(|| t!("run.project_dir_invalid", path = args.project_dir.display()).to_string())?;
    if !fs::is_directory(&project_root) {
        bail!(t!("run.project_dir_invalid", path = project_root.display()).to_string());
    }

    let mut config = load_effective_config(args.config.as_deref(), &project_root)?;
    apply_overrides(&mut config, &args)?;
    if !language_pinned {
        if let Some(language) = &config.language {
            rust_i18n::set_locale(&crate::resolve_locale(language));
        }
    }

    println!(
        "{}",
        t!("run.project_root", path = project_root.display())
    );

    let summary = coordinator::run_matrix(&project_root, &config, Arc::new(ShellRunner)).await?;
    print_summary(&summary);

    if let Some(report_path) = &args.html {
        println!(
            "\n{}",
            t!("run.html_report", path = report_path.display())
        );
        if let Err(e) = generate_html_report(&summary, report_path) {
            eprintln!("{} {:#}", t!("run.html_report_failed").red(), e);
        }
    }

    if !summary.all_passed() {
        bail!(t!("run.jobs_failed", failed = summary.failed(), total = summary.total()).to_string());
    }
    Ok(())
}

/// Picks the configuration: an explicit file, then `Megatest.toml` in the
/// project, then built-in defaults.
///
/// 选择配置：显式指定的文件，然后是项目中的 `Megatest.toml`，最后是内置默认值。
pub fn load_effective_config(explicit: Option<&Path>, project_root: &Path) -> Result<MegatestConfig> {
    if let Some(path) = explicit {
        if !path.exists() {
            bail!(t!("run.config_not_found", path = path.display()).to_string());
        }
        return config::load_config(path);
    }
    let implicit = project_root.join(CONFIG_FILE_NAME);
    if implicit.exists() {
        println!("{}", t!("run.loading_config", path = implicit.display()));
        config::load_config(&implicit)
    } else {
        Ok(MegatestConfig::default())
    }
}

/// Command-line axes replace the configured ones entirely.
pub fn apply_overrides(config: &mut MegatestConfig, args: &RunArgs) -> Result<()> {
    if let Some(raw) = &args.pyvers {
        config.interpreter_versions = config::parse_list(raw);
    }
    if let Some(raw) = &args.ucs {
        config.widths = config::parse_widths(raw)?;
    }
    if let Some(raw) = &args.sqlitevers {
        config.lib_versions = config::parse_list(raw);
    }
    if args.fossil {
        config.include_fossil = true;
    }
    if let Some(tasks) = args.tasks {
        config.concurrency = Some(tasks);
    }
    Ok(())
}
