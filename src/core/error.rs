//! # Error Types / 错误类型
//!
//! Typed errors for the per-job pipeline. Process and provisioning failures are
//! caught at job granularity and turned into a failed outcome; configuration
//! errors abort the whole run before any job starts.
//!
//! 单个任务流水线的类型化错误。进程和环境准备失败在任务粒度被捕获并转换为失败结果；
//! 配置错误会在任何任务开始前中止整个运行。

use serde::Serialize;
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// How a child process ended.
/// 子进程的结束方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Termination {
    /// Normal exit with the given status code / 以给定状态码正常退出
    Exited(i32),
    /// Killed by the given signal number / 被给定信号终止
    Signaled(i32),
}

impl Termination {
    pub fn is_success(&self) -> bool {
        matches!(self, Termination::Exited(0))
    }
}

impl From<ExitStatus> for Termination {
    fn from(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Termination::Exited(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Termination::Signaled(signal);
            }
        }
        Termination::Exited(-1)
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Exited(code) => write!(f, "exited with code {code}"),
            Termination::Signaled(signal) => write!(f, "failed with signal {signal}"),
        }
    }
}

/// Failure of a single external command.
/// 单个外部命令的失败。
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The command ran but did not exit with status 0.
    #[error("{termination}: {command}")]
    Failed {
        command: String,
        termination: Termination,
    },
    /// The shell could not be started or waited on.
    #[error("failed to run `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    /// The log file for the command could not be opened or written.
    #[error("failed to write log file {}", path.display())]
    Log {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ProcessError {
    pub fn termination(&self) -> Option<Termination> {
        match self {
            ProcessError::Failed { termination, .. } => Some(*termination),
            _ => None,
        }
    }

    /// Anything other than a command exiting badly is an environment problem.
    pub fn is_unexpected(&self) -> bool {
        !matches!(self, ProcessError::Failed { .. })
    }
}

/// The named stages of building an interpreter.
/// 构建解释器的各个阶段。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProvisionStep {
    Fetch,
    Patch,
    Configure,
    Compile,
    Install,
    Clean,
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProvisionStep::Fetch => "fetch",
            ProvisionStep::Patch => "patch",
            ProvisionStep::Configure => "configure",
            ProvisionStep::Compile => "compile",
            ProvisionStep::Install => "install",
            ProvisionStep::Clean => "clean",
        };
        f.write_str(name)
    }
}

/// Failure to produce a ready-to-use interpreter for a job.
/// 无法为任务准备可用解释器时的错误。
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("{step} step failed, see {}", log.display())]
    Step {
        step: ProvisionStep,
        log: PathBuf,
        #[source]
        source: ProcessError,
    },
    #[error("cannot derive a download location for interpreter version `{0}`")]
    InvalidVersion(String),
    #[error("failed to patch {}", path.display())]
    Patch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ProvisionError {
    pub fn step(&self) -> Option<ProvisionStep> {
        match self {
            ProvisionError::Step { step, .. } => Some(*step),
            ProvisionError::InvalidVersion(_) => Some(ProvisionStep::Fetch),
            ProvisionError::Patch { .. } => Some(ProvisionStep::Patch),
        }
    }

    pub fn is_unexpected(&self) -> bool {
        match self {
            ProvisionError::Step { source, .. } => source.is_unexpected(),
            ProvisionError::InvalidVersion(_) => false,
            ProvisionError::Patch { .. } => true,
        }
    }
}

/// Invalid or contradictory matrix configuration. Always fatal to the run.
/// 无效或矛盾的矩阵配置。总是导致整个运行失败。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no interpreter versions configured")]
    NoInterpreterVersions,
    #[error("no library versions configured")]
    NoLibVersions,
    #[error("no unicode widths configured")]
    NoWidths,
    #[error("unicode width 0 is reserved for \"not applicable\"")]
    ReservedWidth,
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,
    #[error("cannot derive a download location for interpreter version `{0}`")]
    InvalidVersion(String),
    /// The value would not survive as one component of a job directory name.
    #[error("`{0}` cannot be used in a job directory name (no path separators, `..`, `-ucs` or `-sq`)")]
    InvalidAxisValue(String),
    #[error("jobs {first} and {second} would share the directory `{name}`")]
    NameCollision {
        name: String,
        first: String,
        second: String,
    },
    /// Resetting this root would delete the project or the other root.
    #[error("refusing to reset {}: it contains the project or overlaps another run directory", .0.display())]
    UnsafeRoot(PathBuf),
}

/// Why a single job failed.
/// 单个任务失败的原因。
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    #[error("test run failed, see {}", log.display())]
    Test {
        log: PathBuf,
        #[source]
        source: ProcessError,
    },
}

impl JobError {
    pub fn is_unexpected(&self) -> bool {
        match self {
            JobError::Provision(e) => e.is_unexpected(),
            JobError::Test { source, .. } => source.is_unexpected(),
        }
    }
}

/// Renders an error and all of its sources on one line, `outer: inner: root`.
pub fn error_chain(error: &dyn StdError) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
