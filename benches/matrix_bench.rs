use criterion::{Criterion, criterion_group, criterion_main};
use megatest::config::UnexpectedErrorPolicy;
use megatest::core::error::ProcessError;
use megatest::core::execution::JobExecutor;
use megatest::core::planner::{MatrixAxes, plan_matrix};
use megatest::core::pool::run_pool;
use megatest::core::provision::ProvisionSettings;
use megatest::infra::command::{CommandRunner, ShellCommand};
use std::hint::black_box;
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Runtime;

/// Accepts every command without running it.
struct NoopRunner;

impl CommandRunner for NoopRunner {
    async fn run(&self, _command: &ShellCommand) -> Result<(), ProcessError> {
        Ok(())
    }
}

fn axes() -> MatrixAxes {
    MatrixAxes {
        interpreter_versions: ["3.4.1", "3.3.5", "3.2.5", "3.1.5", "2.7.7", "2.6.9", "2.5.6", "2.4.6", "2.3.7", "system"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        widths: vec![2, 4],
        lib_versions: ["3.8.5", "3.8.4", "3.8.3", "fossil"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        width_cutoff: "3.3".to_string(),
    }
}

fn bench_plan_matrix(c: &mut Criterion) {
    let axes = axes();
    c.bench_function("plan_matrix", |b| {
        b.iter(|| plan_matrix(black_box(&axes), Path::new("/w"), Path::new("/r")));
    });
}

fn bench_pool_drain(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let jobs = plan_matrix(&axes(), &dir.path().join("w"), &dir.path().join("r")).unwrap();
    let settings = ProvisionSettings {
        system_interpreter: "/usr/bin/python".into(),
        download_base_url: "https://www.python.org/ftp/python".to_string(),
        downloader: "wget -q -O -".to_string(),
        extra_lib_dir: "/usr/lib".to_string(),
    };
    let executor = Arc::new(JobExecutor::new(Arc::new(NoopRunner), settings, ""));

    c.bench_function("pool_drain", |b| {
        b.to_async(&rt).iter(|| async {
            let _ = run_pool(
                Arc::clone(&executor),
                jobs.clone(),
                8,
                UnexpectedErrorPolicy::Record,
            )
            .await;
        });
    });
}

criterion_group!(benches, bench_plan_matrix, bench_pool_drain);
criterion_main!(benches);
