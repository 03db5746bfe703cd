//! # Data Models Module / 数据模型模块
//!
//! This module defines the data structures that flow through a matrix run:
//! the immutable job descriptor, the environment a job provisions for itself,
//! and the terminal outcome the coordinator aggregates.
//!
//! 此模块定义了在矩阵运行中流转的数据结构：不可变的任务描述、任务自行准备的环境，
//! 以及由协调器汇总的最终结果。

use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use crate::core::error::{JobError, ProvisionError, ProvisionStep, Termination, error_chain};

/// Interpreter version meaning "use the pre-installed interpreter".
/// 表示"使用系统预装解释器"的解释器版本。
pub const SYSTEM_VERSION: &str = "system";

/// Width value meaning "the interpreter build has no width option".
/// 表示"解释器构建没有宽度选项"的宽度值。
pub const WIDTH_NOT_APPLICABLE: u8 = 0;

/// Log file receiving the fetch/configure/compile/install output.
pub const BUILD_LOG: &str = "pybuild.txt";

/// Log file receiving the test suite output.
pub const TEST_LOG: &str = "buildruntests.txt";

/// One cell of the test matrix plus its private directories.
/// Created once by the planner, consumed exactly once by one worker.
///
/// 测试矩阵中的一个单元及其私有目录。
/// 由计划器创建一次，由一个工作者恰好消费一次。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct JobDescriptor {
    /// Absolute working directory, unique per job / 绝对工作目录，每个任务唯一
    pub workdir: PathBuf,
    /// Absolute log directory, unique per job / 绝对日志目录，每个任务唯一
    pub logdir: PathBuf,
    /// Interpreter version, or `"system"` / 解释器版本，或 `"system"`
    pub interpreter_version: String,
    /// Unicode width in bytes, `0` when not applicable / Unicode 宽度（字节），不适用时为 `0`
    pub width: u8,
    /// Library version to fetch and test against / 要获取并测试的库版本
    pub lib_version: String,
}

impl JobDescriptor {
    /// Deterministic directory name derived from the matrix triple.
    pub fn name(&self) -> String {
        job_name(&self.interpreter_version, self.width, &self.lib_version)
    }

    pub fn is_system(&self) -> bool {
        self.interpreter_version == SYSTEM_VERSION
    }

    pub fn build_log(&self) -> PathBuf {
        self.logdir.join(BUILD_LOG)
    }

    pub fn test_log(&self) -> PathBuf {
        self.logdir.join(TEST_LOG)
    }
}

impl fmt::Display for JobDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "python={} ucs={} sqlite={} workdir={} logdir={}",
            self.interpreter_version,
            self.width,
            self.lib_version,
            self.workdir.display(),
            self.logdir.display()
        )
    }
}

/// Directory name for a (version, width, library version) triple.
/// Distinct triples always map to distinct names.
pub fn job_name(interpreter_version: &str, width: u8, lib_version: &str) -> String {
    format!("py{interpreter_version}-ucs{width}-sq{lib_version}")
}

/// An interpreter ready to run the test suite. Owned by the job that built it.
/// 可以运行测试套件的解释器。归构建它的任务所有。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedEnv {
    pub interpreter: PathBuf,
    /// `None` for a system interpreter / 系统解释器为 `None`
    pub library_path: Option<PathBuf>,
}

impl ProvisionedEnv {
    pub fn system(interpreter: PathBuf) -> Self {
        Self {
            interpreter,
            library_path: None,
        }
    }
}

/// Why a job was classified as failed. Only the log location is surfaced on
/// the console; the detail lives in the job's own log files.
///
/// 任务被判定为失败的原因。控制台上只显示日志位置；详细信息保存在任务自己的日志文件中。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FailureCause {
    Provisioning {
        step: Option<ProvisionStep>,
        log: PathBuf,
    },
    Test {
        termination: Option<Termination>,
        log: PathBuf,
    },
    /// An environment problem outside the expected build/test failures.
    Unexpected { message: String },
}

impl FailureCause {
    pub fn from_error(job: &JobDescriptor, error: &JobError) -> Self {
        if error.is_unexpected() {
            return FailureCause::Unexpected {
                message: error_chain(error),
            };
        }
        match error {
            JobError::Provision(e) => FailureCause::Provisioning {
                step: e.step(),
                log: match e {
                    ProvisionError::Step { log, .. } => log.clone(),
                    _ => job.build_log(),
                },
            },
            JobError::Test { log, source } => FailureCause::Test {
                termination: source.termination(),
                log: log.clone(),
            },
        }
    }

    /// Log file holding the detail, if there is one.
    pub fn log(&self) -> Option<&PathBuf> {
        match self {
            FailureCause::Provisioning { log, .. } | FailureCause::Test { log, .. } => Some(log),
            FailureCause::Unexpected { .. } => None,
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Provisioning { step: Some(step), .. } => {
                write!(f, "interpreter build failed at {step}")
            }
            FailureCause::Provisioning { step: None, .. } => f.write_str("interpreter build failed"),
            FailureCause::Test {
                termination: Some(termination),
                ..
            } => write!(f, "tests {termination}"),
            FailureCause::Test { termination: None, .. } => f.write_str("tests failed"),
            FailureCause::Unexpected { message } => write!(f, "unexpected error: {message}"),
        }
    }
}

/// Terminal state of one job.
/// 单个任务的最终状态。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum JobOutcome {
    Success(JobDescriptor),
    Failure {
        job: JobDescriptor,
        cause: FailureCause,
    },
}

impl JobOutcome {
    pub fn failure(job: JobDescriptor, error: &JobError) -> Self {
        let cause = FailureCause::from_error(&job, error);
        JobOutcome::Failure { job, cause }
    }

    pub fn job(&self) -> &JobDescriptor {
        match self {
            JobOutcome::Success(job) | JobOutcome::Failure { job, .. } => job,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success(_))
    }
}

/// Everything known about a finished run.
/// 已完成运行的全部信息。
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub outcomes: Vec<JobOutcome>,
    pub concurrency: usize,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.passed()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&JobDescriptor, &FailureCause)> {
        self.outcomes.iter().filter_map(|o| match o {
            JobOutcome::Failure { job, cause } => Some((job, cause)),
            JobOutcome::Success(_) => None,
        })
    }

    pub fn all_passed(&self) -> bool {
        self.failed() == 0
    }
}
