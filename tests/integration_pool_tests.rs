//! # Worker Pool Integration Tests / 工作者池集成测试
//!
//! Drives the queue, workers and executor together with a recording runner.
//!
//! 使用记录型运行器同时驱动队列、工作者和执行器。

mod common;

use std::collections::HashSet;
use std::fs;
use std::sync::Arc;

use common::StubRunner;
use megatest::config::{MegatestConfig, UnexpectedErrorPolicy};
use megatest::core::coordinator::{reset_layout, run_matrix};
use megatest::core::error::{ConfigError, ProcessError};
use megatest::core::execution::{JobExecutor, TEST_PREFIX_VAR, test_command};
use megatest::core::pool::{JobQueue, QueueItem, WorkerState, dispatch, run_pool};
use megatest::infra::command::{CommandRunner, ShellCommand};
use megatest::models::{FailureCause, JobDescriptor, JobOutcome, ProvisionedEnv};

fn jobs(root: &std::path::Path, count: usize) -> Vec<JobDescriptor> {
    (0..count)
        .map(|i| common::sample_job(root, "system", 0, &format!("3.8.{i}")))
        .collect()
}

fn executor(runner: Arc<StubRunner>) -> Arc<JobExecutor<StubRunner>> {
    Arc::new(JobExecutor::new(runner, common::test_settings(), "/tmp/prefix"))
}

#[tokio::test]
async fn test_sentinels_follow_jobs() {
    let project = common::setup_test_project();
    let queue = JobQueue::new();
    let pushed = dispatch(&queue, jobs(project.path(), 3), 2).unwrap();
    assert_eq!(pushed, 2);

    for _ in 0..3 {
        assert!(matches!(queue.pop().await, Some(QueueItem::Job(_))));
    }
    assert_eq!(queue.pop().await, Some(QueueItem::Stop));
    assert_eq!(queue.pop().await, Some(QueueItem::Stop));
}

#[tokio::test]
async fn test_every_job_runs_exactly_once() {
    let project = common::setup_test_project();
    let runner = Arc::new(StubRunner::succeeding());
    let report = run_pool(
        executor(Arc::clone(&runner)),
        jobs(project.path(), 7),
        3,
        UnexpectedErrorPolicy::Record,
    )
    .await
    .unwrap();

    assert_eq!(report.outcomes.len(), 7);
    assert!(report.outcomes.iter().all(JobOutcome::is_success));
    let names: HashSet<_> = report.outcomes.iter().map(|o| o.job().name()).collect();
    assert_eq!(names.len(), 7);

    assert_eq!(report.sentinels_pushed, 3);
    assert_eq!(report.workers.len(), 3);
    for worker in &report.workers {
        assert_eq!(worker.state, WorkerState::Stopped);
        assert_eq!(worker.sentinels_seen, 1);
        assert!(worker.fatal_error.is_none());
    }
    let executed: usize = report.workers.iter().map(|w| w.jobs_executed).sum();
    assert_eq!(executed, 7);
    assert_eq!(runner.commands().len(), 7);
}

#[tokio::test]
async fn test_more_workers_than_jobs() {
    let project = common::setup_test_project();
    let runner = Arc::new(StubRunner::succeeding());
    let report = run_pool(
        executor(runner),
        jobs(project.path(), 1),
        4,
        UnexpectedErrorPolicy::Record,
    )
    .await
    .unwrap();

    assert_eq!(report.outcomes.len(), 1);
    assert!(report.workers.iter().all(|w| w.sentinels_seen == 1));
}

#[tokio::test]
async fn test_empty_queue_stops_all_workers() {
    let runner = Arc::new(StubRunner::succeeding());
    let report = run_pool(executor(runner), Vec::new(), 2, UnexpectedErrorPolicy::Record)
        .await
        .unwrap();
    assert!(report.outcomes.is_empty());
    assert!(report.workers.iter().all(|w| w.state == WorkerState::Stopped));
}

#[tokio::test]
async fn test_one_failure_does_not_stop_others() {
    let project = common::setup_test_project();
    let runner = Arc::new(StubRunner::failing_when(|c| c.script.contains("--version=3.8.1")));
    let report = run_pool(
        executor(runner),
        jobs(project.path(), 4),
        2,
        UnexpectedErrorPolicy::Record,
    )
    .await
    .unwrap();

    let failed: Vec<_> = report.outcomes.iter().filter(|o| !o.is_success()).collect();
    assert_eq!(report.outcomes.len(), 4);
    assert_eq!(failed.len(), 1);
    match failed[0] {
        JobOutcome::Failure { job, cause } => {
            assert_eq!(job.lib_version, "3.8.1");
            assert!(matches!(cause, FailureCause::Test { .. }));
            let log = fs::read_to_string(job.test_log()).unwrap();
            assert!(log.contains("megatest: test run failed"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn test_provisioning_failure_skips_tests() {
    let project = common::setup_test_project();
    let job = common::sample_job(project.path(), "2.7.7", 2, "3.8.5");
    let runner = Arc::new(StubRunner::failing_when(|c| c.script.ends_with("&& make")));

    let (outcome, error) = executor(Arc::clone(&runner)).run_job(job).await;
    assert!(error.is_some());
    match outcome {
        JobOutcome::Failure {
            cause: FailureCause::Provisioning { step, .. },
            ..
        } => assert_eq!(step.map(|s| s.to_string()).as_deref(), Some("compile")),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(!runner.scripts().iter().any(|s| s.contains("setup.py fetch")));
}

/// Fails every command with an error that is not a build or test failure.
struct BrokenRunner;

impl CommandRunner for BrokenRunner {
    async fn run(&self, command: &ShellCommand) -> Result<(), ProcessError> {
        Err(ProcessError::Spawn {
            command: command.script.clone(),
            source: std::io::Error::other("no shell"),
        })
    }
}

#[tokio::test]
async fn test_unexpected_errors_are_recorded_by_default() {
    let project = common::setup_test_project();
    let executor = Arc::new(JobExecutor::new(
        Arc::new(BrokenRunner),
        common::test_settings(),
        "",
    ));
    let report = run_pool(executor, jobs(project.path(), 2), 2, UnexpectedErrorPolicy::Record)
        .await
        .unwrap();

    assert_eq!(report.outcomes.len(), 2);
    assert!(report.outcomes.iter().all(|o| matches!(
        o,
        JobOutcome::Failure {
            cause: FailureCause::Unexpected { .. },
            ..
        }
    )));
    assert!(report.workers.iter().all(|w| w.fatal_error.is_none()));
}

#[tokio::test]
async fn test_unexpected_errors_stop_worker_under_abort() {
    let project = common::setup_test_project();
    let executor = Arc::new(JobExecutor::new(
        Arc::new(BrokenRunner),
        common::test_settings(),
        "",
    ));
    let report = run_pool(executor, jobs(project.path(), 3), 1, UnexpectedErrorPolicy::Abort)
        .await
        .unwrap();

    assert_eq!(report.outcomes.len(), 1);
    let worker = &report.workers[0];
    assert_eq!(worker.state, WorkerState::Stopped);
    assert_eq!(worker.sentinels_seen, 0);
    assert!(worker.fatal_error.as_deref().unwrap().contains("no shell"));
}

#[test]
fn test_test_command_sets_environment_explicitly() {
    let project = common::setup_test_project();
    let job = common::sample_job(project.path(), "2.7.7", 4, "3.8.5");
    let env = ProvisionedEnv {
        interpreter: job.workdir.join("pyinst/bin/python"),
        library_path: Some(job.workdir.join("pyinst/lib")),
    };

    let command = test_command(&job, &env, "/tmp/x");
    assert!(command.script.contains("setup.py fetch --version=3.8.5 --all"));
    assert!(command.script.contains("build_ext --inplace --force --enable-all-extensions test -v"));
    assert_eq!(command.cwd.as_deref(), Some(job.workdir.as_path()));
    assert_eq!(command.log, job.test_log());
    assert!(command.env.contains(&(TEST_PREFIX_VAR.to_string(), "/tmp/x".to_string())));
    assert!(command.env.contains(&(
        "LD_LIBRARY_PATH".to_string(),
        job.workdir.join("pyinst/lib").to_string_lossy().into_owned()
    )));
}

#[test]
fn test_reset_layout_is_idempotent() {
    let project = common::setup_test_project();
    let config = MegatestConfig::default();

    let first = reset_layout(project.path(), &config).unwrap();
    fs::write(first.work_root.join("leftover"), "x").unwrap();
    let second = reset_layout(project.path(), &config).unwrap();

    assert_eq!(first, second);
    assert_eq!(fs::read_dir(&second.work_root).unwrap().count(), 0);
    assert_eq!(fs::read_dir(&second.results_root).unwrap().count(), 0);
    assert!(!project.path().join("apsw.so").exists());
    assert!(!project.path().join("src/shell.c").exists());
}

#[tokio::test]
async fn test_run_matrix_end_to_end_with_stub() {
    let project = common::setup_test_project();
    let config = MegatestConfig {
        interpreter_versions: vec!["system".to_string(), "2.7.7".to_string()],
        widths: vec![2, 4],
        lib_versions: vec!["3.8.5".to_string()],
        concurrency: Some(2),
        extra_lib_dir: Some("/usr/lib".to_string()),
        ..MegatestConfig::default()
    };
    let runner = Arc::new(StubRunner::failing_when(|c| {
        c.script.contains("--enable-unicode=ucs2") && c.script.contains("./configure")
    }));

    let summary = run_matrix(project.path(), &config, Arc::clone(&runner))
        .await
        .unwrap();

    assert_eq!(summary.total(), 3);
    assert_eq!(summary.passed() + summary.failed(), summary.total());
    assert_eq!(summary.failed(), 1);
    assert!(!summary.all_passed());
    let (failed_job, _) = summary.failures().next().unwrap();
    assert_eq!(failed_job.width, 2);

    for outcome in &summary.outcomes {
        let job = outcome.job();
        assert!(job.workdir.join("setup.py").is_file());
        assert!(job.logdir.is_dir());
    }
}

#[tokio::test]
async fn test_run_matrix_rejects_bad_config_before_any_job() {
    let project = common::setup_test_project();
    let config = MegatestConfig {
        interpreter_versions: vec![],
        ..MegatestConfig::default()
    };
    let runner = Arc::new(StubRunner::succeeding());

    assert!(run_matrix(project.path(), &config, Arc::clone(&runner)).await.is_err());
    assert!(runner.commands().is_empty());
    assert!(!project.path().join("work").exists());
}

#[tokio::test]
async fn test_run_matrix_fails_under_abort_policy() {
    let project = common::setup_test_project();
    let config = MegatestConfig {
        interpreter_versions: vec!["system".to_string()],
        lib_versions: vec!["3.8.5".to_string(), "3.8.4".to_string()],
        concurrency: Some(1),
        extra_lib_dir: Some("/usr/lib".to_string()),
        on_unexpected_error: UnexpectedErrorPolicy::Abort,
        ..MegatestConfig::default()
    };

    let err = run_matrix(project.path(), &config, Arc::new(BrokenRunner))
        .await
        .unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("Run aborted after an unexpected error"), "{message}");
    assert!(message.contains("no shell"), "{message}");
}

#[tokio::test]
async fn test_run_matrix_records_unexpected_errors_by_default() {
    let project = common::setup_test_project();
    let config = MegatestConfig {
        interpreter_versions: vec!["system".to_string()],
        lib_versions: vec!["3.8.5".to_string(), "3.8.4".to_string()],
        concurrency: Some(1),
        extra_lib_dir: Some("/usr/lib".to_string()),
        ..MegatestConfig::default()
    };

    let summary = run_matrix(project.path(), &config, Arc::new(BrokenRunner))
        .await
        .unwrap();
    assert_eq!(summary.total(), 2);
    assert_eq!(summary.failed(), 2);
}

fn unsafe_root(err: anyhow::Error) -> bool {
    matches!(err.downcast_ref::<ConfigError>(), Some(ConfigError::UnsafeRoot(_)))
}

#[test]
fn test_reset_refuses_project_as_root() {
    let project = common::setup_test_project();
    for root in [".", "..", project.path().to_str().unwrap(), "work/.."] {
        let config = MegatestConfig {
            work_root: root.to_string(),
            ..MegatestConfig::default()
        };
        let err = reset_layout(project.path(), &config).unwrap_err();
        assert!(unsafe_root(err), "{root} should be refused");

        let config = MegatestConfig {
            results_root: root.to_string(),
            ..MegatestConfig::default()
        };
        let err = reset_layout(project.path(), &config).unwrap_err();
        assert!(unsafe_root(err), "{root} should be refused");
    }
    assert!(project.path().join("setup.py").is_file());
    assert!(project.path().join("apsw.so").is_file());
}

#[test]
fn test_reset_refuses_overlapping_roots() {
    let project = common::setup_test_project();
    for (work, results) in [("out", "out"), ("out", "out/results"), ("out/work", "out")] {
        let config = MegatestConfig {
            work_root: work.to_string(),
            results_root: results.to_string(),
            ..MegatestConfig::default()
        };
        let err = reset_layout(project.path(), &config).unwrap_err();
        assert!(unsafe_root(err), "{work} / {results} should be refused");
    }
    assert!(project.path().join("setup.py").is_file());
}

#[test]
fn test_reset_refuses_project_as_stale_artifact() {
    let project = common::setup_test_project();
    let config = MegatestConfig {
        stale_artifacts: vec!["apsw.so".to_string(), ".".to_string()],
        ..MegatestConfig::default()
    };
    let err = reset_layout(project.path(), &config).unwrap_err();
    assert!(unsafe_root(err));
    assert!(project.path().join("apsw.so").is_file());
}

#[test]
fn test_reset_accepts_sibling_roots_outside_project() {
    let project = common::setup_test_project();
    let scratch = tempfile::tempdir().unwrap();
    let config = MegatestConfig {
        work_root: scratch.path().join("work").to_string_lossy().into_owned(),
        results_root: scratch.path().join("results").to_string_lossy().into_owned(),
        ..MegatestConfig::default()
    };
    let layout = reset_layout(project.path(), &config).unwrap();
    assert!(layout.work_root.is_dir());
    assert!(layout.results_root.is_dir());
    assert!(project.path().join("setup.py").is_file());
}
