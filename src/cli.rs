//! # CLI Module / 命令行模块
//!
//! Builds the clap command tree and dispatches to the `run` and `init` commands.
//!
//! 构建 clap 命令树并分派到 `run` 和 `init` 命令。

use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::{env, path::PathBuf};

use crate::config::CONFIG_FILE_NAME;
use crate::infra::t;

pub mod commands;

/// Pre-parses the command line arguments to find the language setting.
/// This allows i18n to be initialized before the full CLI is built.
/// It looks for a `--lang <VALUE>` argument.
fn pre_parse_language() -> Option<String> {
    let args: Vec<String> = env::args().collect();
    args.iter()
        .position(|arg| arg == "--lang")
        .and_then(|pos| args.get(pos + 1))
        .cloned()
}

fn build_cli(locale: &str) -> Command {
    Command::new("megatest")
        .version(env!("CARGO_PKG_VERSION"))
        .about(t!("cli.about", locale = locale).to_string())
        .arg_required_else_help(true)
        .arg(
            Arg::new("lang")
                .long("lang")
                .help(t!("cli.lang", locale = locale).to_string())
                .value_name("LANGUAGE")
                .global(true)
                .action(ArgAction::Set),
        )
        .subcommand(
            Command::new("run")
                .about(t!("cli.run_about", locale = locale).to_string())
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .help(t!("cli.arg_config", locale = locale).to_string())
                        .value_name("CONFIG")
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("project-dir")
                        .long("project-dir")
                        .help(t!("cli.arg_project_dir", locale = locale).to_string())
                        .value_name("PROJECT_DIR")
                        .default_value(".")
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("pyvers")
                        .long("pyvers")
                        .help(t!("cli.arg_pyvers", locale = locale).to_string())
                        .value_name("VERSIONS")
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("ucs")
                        .long("ucs")
                        .help(t!("cli.arg_ucs", locale = locale).to_string())
                        .value_name("WIDTHS")
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("sqlitevers")
                        .long("sqlitevers")
                        .help(t!("cli.arg_sqlitevers", locale = locale).to_string())
                        .value_name("VERSIONS")
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("fossil")
                        .long("fossil")
                        .help(t!("cli.arg_fossil", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("tasks")
                        .short('j')
                        .long("tasks")
                        .help(t!("cli.arg_tasks", locale = locale).to_string())
                        .value_name("TASKS")
                        .value_parser(clap::value_parser!(usize))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("html")
                        .long("html")
                        .help(t!("cli.arg_html", locale = locale).to_string())
                        .value_name("HTML")
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                ),
        )
        .subcommand(
            Command::new("init")
                .about(t!("cli.init_about", locale = locale).to_string())
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .help(t!("cli.arg_output", locale = locale).to_string())
                        .value_name("OUTPUT")
                        .default_value(CONFIG_FILE_NAME)
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("non-interactive")
                        .long("non-interactive")
                        .help(t!("cli.arg_non_interactive", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("force")
                        .long("force")
                        .help(t!("cli.arg_force", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                ),
        )
}

fn run_args(matches: &ArgMatches) -> commands::run::RunArgs {
    commands::run::RunArgs {
        config: matches.get_one::<PathBuf>("config").cloned(),
        project_dir: matches
            .get_one::<PathBuf>("project-dir")
            .cloned()
            .unwrap_or_else(|| PathBuf::from(".")),
        pyvers: matches.get_one::<String>("pyvers").cloned(),
        ucs: matches.get_one::<String>("ucs").cloned(),
        sqlitevers: matches.get_one::<String>("sqlitevers").cloned(),
        fossil: matches.get_flag("fossil"),
        tasks: matches.get_one::<usize>("tasks").copied(),
        html: matches.get_one::<PathBuf>("html").cloned(),
    }
}

/// Parses the command line and runs the selected command.
pub async fn run() -> Result<()> {
    // Language must be known before the help texts are built.
    let explicit_language = pre_parse_language();
    match &explicit_language {
        Some(lang) => rust_i18n::set_locale(&crate::resolve_locale(lang)),
        None => crate::init(),
    }
    let locale = rust_i18n::locale().to_string();

    let matches = build_cli(&locale).get_matches();

    match matches.subcommand() {
        Some(("run", run_matches)) => {
            let args = run_args(run_matches);
            commands::run::execute(args, explicit_language.is_some()).await?;
        }
        Some(("init", init_matches)) => {
            let output = init_matches
                .get_one::<PathBuf>("output")
                .cloned()
                .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
            let non_interactive = init_matches.get_flag("non-interactive");
            let force = init_matches.get_flag("force");
            commands::init::execute(&output, non_interactive, force, &locale)?;
        }
        _ => {
            // Clap has already printed help.
        }
    }
    Ok(())
}
