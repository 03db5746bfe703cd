//! # Init Command Module / 初始化命令模块
//!
//! Writes a `Megatest.toml` either from the defaults or from answers given to
//! a short interactive wizard.
//!
//! 根据默认值或简短交互式向导的回答写入 `Megatest.toml`。

use anyhow::{Context, Result};
use colored::*;
use dialoguer::{Confirm, Input, theme::ColorfulTheme};
use std::{fs, path::Path};

use crate::core::config::{self, MegatestConfig};
use crate::infra::t;

/// Executes the init command.
///
/// # Arguments
/// * `output` - Path for the new configuration file
/// * `non_interactive` - Write the defaults without prompting
/// * `force` - Overwrite an existing file without asking
/// * `language` - Language recorded in the new file
pub fn execute(output: &Path, non_interactive: bool, force: bool, language: &str) -> Result<()> {
    let theme = ColorfulTheme::default();

    if output.exists() && !force {
        let overwrite = !non_interactive
            && Confirm::with_theme(&theme)
                .with_prompt(t!("init.overwrite_prompt", path = output.display()).to_string())
                .default(false)
                .interact()?;
        if !overwrite {
            println!("{}", t!("init.file_exists", path = output.display()).yellow());
            println!("{}", t!("init.use_force"));
            return Ok(());
        }
    }

    let mut config = MegatestConfig {
        language: Some(language.to_string()),
        ..MegatestConfig::default()
    };
    if !non_interactive {
        println!("\n{}", t!("init.welcome").bold().cyan());
        prompt_for_axes(&theme, &mut config)?;
    }

    write_config(&config, output)?;
    println!("{}", t!("init.success", path = output.display()).green());
    println!("{}", t!("init.next_steps"));
    Ok(())
}

/// Asks for the three matrix axes and the worker count.
fn prompt_for_axes(theme: &ColorfulTheme, config: &mut MegatestConfig) -> Result<()> {
    let pyvers: String = Input::with_theme(theme)
        .with_prompt(t!("init.prompt_pyvers").to_string())
        .default(config.interpreter_versions.join(","))
        .interact_text()?;
    config.interpreter_versions = config::parse_list(&pyvers);

    let widths: String = Input::with_theme(theme)
        .with_prompt(t!("init.prompt_ucs").to_string())
        .default(
            config
                .widths
                .iter()
                .map(u8::to_string)
                .collect::<Vec<_>>()
                .join(","),
        )
        .validate_with(|input: &String| config::parse_widths(input).map(|_| ()).map_err(|e| e.to_string()))
        .interact_text()?;
    config.widths = config::parse_widths(&widths)?;

    let sqlitevers: String = Input::with_theme(theme)
        .with_prompt(t!("init.prompt_sqlitevers").to_string())
        .default(config.lib_versions.join(","))
        .interact_text()?;
    config.lib_versions = config::parse_list(&sqlitevers);

    config.include_fossil = Confirm::with_theme(theme)
        .with_prompt(t!("init.prompt_fossil").to_string())
        .default(false)
        .interact()?;

    let tasks: usize = Input::with_theme(theme)
        .with_prompt(t!("init.prompt_tasks").to_string())
        .default(config::default_concurrency())
        .validate_with(|n: &usize| if *n > 0 { Ok(()) } else { Err("must be at least 1") })
        .interact_text()?;
    config.concurrency = Some(tasks);
    Ok(())
}

/// Serializes `config` to `output`, creating parent directories as needed.
pub fn write_config(config: &MegatestConfig, output: &Path) -> Result<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| {
            t!("init.create_parent_dir_failed", path = parent.display()).to_string()
        })?;
    }
    let body = toml::to_string_pretty(config).context("Failed to serialize configuration")?;
    fs::write(output, body)
        .with_context(|| t!("init.write_failed", path = output.display()).to_string())
}
