//! # Console Reporting Module / 控制台报告模块
//!
//! Progress and summary output on stdout. Workers write here concurrently, so
//! progress is kept to one marker or one line per job.
//!
//! 标准输出上的进度和摘要输出。工作者会并发写入，因此每个任务的进度只输出一个标记或一行。

use colored::*;
use std::io::Write;

use crate::core::models::{JobDescriptor, JobOutcome, RunSummary};
use crate::infra::t;

/// Prints the matrix cell a job was planned for.
pub fn print_job_planned(job: &JobDescriptor) {
    println!(
        "{}",
        t!(
            "run.job_planned",
            python = &job.interpreter_version,
            ucs = job.width,
            sqlite = &job.lib_version
        )
    );
}

/// Prints `.` for a success, or a `FAILED` line with the reason and the job.
/// Details stay in the job's logs.
///
/// 成功时打印 `.`，失败时打印一行包含原因和任务的 `FAILED`。详细信息保留在任务日志中。
pub fn report_outcome(outcome: &JobOutcome) {
    match outcome {
        JobOutcome::Success(_) => {
            let mut stdout = std::io::stdout().lock();
            let _ = write!(stdout, "{}", ".".green());
            let _ = stdout.flush();
        }
        JobOutcome::Failure { job, cause } => {
            println!("\n{} {}: {}", "FAILED".red().bold(), cause, job);
        }
    }
}

/// Prints the totals and, for every failure, where to look.
///
/// # Output Format / 输出格式
/// ```text
/// --- Run Summary ---
///   Jobs: 12  Passed: 11  Failed: 1  (4 workers, 312.4s)
///   - FAILED py2.4.6-ucs4-sq3.8.5 | interpreter build failed at compile | /.../megatestresults/py2.4.6-ucs4-sq3.8.5
/// ```
pub fn print_summary(summary: &RunSummary) {
    println!("\n{}", t!("summary.banner").bold());

    let elapsed = (summary.finished_at - summary.started_at)
        .to_std()
        .map(|d| format!("{:.1}s", d.as_secs_f64()))
        .unwrap_or_else(|_| "N/A".to_string());
    println!(
        "  {}",
        t!(
            "summary.totals",
            total = summary.total(),
            passed = summary.passed().to_string().green(),
            failed = summary.failed().to_string().red(),
            workers = summary.concurrency,
            elapsed = elapsed
        )
    );

    for (job, cause) in summary.failures() {
        println!(
            "  - {} {:<28} | {} | {}",
            "FAILED".red(),
            job.name().cyan(),
            cause,
            job.logdir.display()
        );
    }

    if summary.all_passed() {
        println!("\n{}", t!("summary.all_passed").green().bold());
    } else {
        println!("\n{}", t!("summary.see_logs").yellow());
    }
}
