//! # Job Execution Module / 任务执行模块
//!
//! Carries one job end to end: provision its interpreter, then build and run
//! the test suite inside the job's workdir with that interpreter. The outcome
//! is classified as success or failure; root-cause detail goes only to the
//! job's own log files.
//!
//! 端到端执行单个任务：准备解释器，然后在任务工作目录中使用该解释器构建并运行测试套件。
//! 结果被分类为成功或失败；根本原因的详细信息只写入任务自己的日志文件。

use std::sync::Arc;

use crate::core::error::{JobError, error_chain};
use crate::core::models::{JobDescriptor, JobOutcome, ProvisionedEnv};
use crate::core::provision::{ProvisionSettings, Provisioner};
use crate::infra::command::{CommandRunner, ShellCommand, append_log, shell_quote};

/// Environment variable that redirects the test suite's scratch files.
/// It is always set explicitly on the test process so the caller's
/// environment never leaks into a run.
pub const TEST_PREFIX_VAR: &str = "APSWTESTPREFIX";

/// Builds the test command for a provisioned job: fetch the library version,
/// build the test helper extension, build the project in place and run the
/// suite verbosely.
///
/// 为已准备好环境的任务构建测试命令：获取库版本、构建测试辅助扩展、就地构建项目并详细运行测试套件。
pub fn test_command(job: &JobDescriptor, env: &ProvisionedEnv, test_prefix: &str) -> ShellCommand {
    let script = format!(
        "{} setup.py fetch --version={} --all build_test_extension build_ext --inplace --force --enable-all-extensions test -v",
        shell_quote(&env.interpreter.to_string_lossy()),
        shell_quote(&job.lib_version),
    );
    let library_path = env
        .library_path
        .as_ref()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();

    ShellCommand::new(script, job.test_log())
        .current_dir(&job.workdir)
        .env("LD_LIBRARY_PATH", library_path)
        .env(TEST_PREFIX_VAR, test_prefix)
}

/// Runs jobs. Shared by all workers; holds no per-job state.
/// 执行任务。由所有工作者共享；不持有任何单个任务的状态。
pub struct JobExecutor<R> {
    runner: Arc<R>,
    provisioner: Provisioner<R>,
    test_prefix: String,
}

impl<R: CommandRunner> JobExecutor<R> {
    pub fn new(runner: Arc<R>, settings: ProvisionSettings, test_prefix: impl Into<String>) -> Self {
        Self {
            provisioner: Provisioner::new(Arc::clone(&runner), settings),
            runner,
            test_prefix: test_prefix.into(),
        }
    }

    /// Provisions and tests one job. A provisioning failure short-circuits
    /// before the test command runs.
    pub async fn execute(&self, job: &JobDescriptor) -> Result<(), JobError> {
        let env = match self.provisioner.provision(job).await {
            Ok(env) => env,
            Err(e) => {
                let error = JobError::from(e);
                record_error(job, &error).await;
                return Err(error);
            }
        };

        let command = test_command(job, &env, &self.test_prefix);
        if let Err(source) = self.runner.run(&command).await {
            let error = JobError::Test {
                log: job.test_log(),
                source,
            };
            record_error(job, &error).await;
            return Err(error);
        }
        Ok(())
    }

    /// Executes a job and classifies the result.
    pub async fn run_job(&self, job: JobDescriptor) -> (JobOutcome, Option<JobError>) {
        match self.execute(&job).await {
            Ok(()) => (JobOutcome::Success(job), None),
            Err(e) => (JobOutcome::failure(job, &e), Some(e)),
        }
    }
}

/// Appends the error chain to the log of the phase that failed. Best effort:
/// the log itself may be what failed.
async fn record_error(job: &JobDescriptor, error: &JobError) {
    let log = match error {
        JobError::Provision(_) => job.build_log(),
        JobError::Test { .. } => job.test_log(),
    };
    let _ = append_log(&log, &format!("megatest: {}\n", error_chain(error))).await;
}
