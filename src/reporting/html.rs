//! # HTML Reporting Module / HTML 报告模块
//!
//! Renders a static HTML page with the run totals and one row per job.
//!
//! 渲染一个包含运行统计和每个任务一行的静态 HTML 页面。

use anyhow::{Context, Result};
use maud::{DOCTYPE, Markup, PreEscaped, html};
use std::fs;
use std::path::Path;

use crate::core::models::{JobOutcome, RunSummary};
use crate::infra::t;

/// Embedded CSS styles for HTML reports / HTML 报告的嵌入式 CSS 样式
const HTML_STYLE: &str = r#"
body { font-family: sans-serif; margin: 2em; color: #222; }
.summary-container { display: flex; gap: 2em; margin-bottom: 1.5em; }
.summary-item .count { font-size: 1.8em; font-weight: bold; display: block; }
.passed-text { color: #1a7f37; }
.failed-text { color: #cf222e; }
table { border-collapse: collapse; width: 100%; }
th, td { border-bottom: 1px solid #ddd; padding: 0.4em 0.6em; text-align: left; }
.status-passed { color: #1a7f37; font-weight: bold; }
.status-failed { color: #cf222e; font-weight: bold; }
code { font-size: 0.9em; }
"#;

/// Renders the report markup.
/// 渲染报告的标记。
pub fn render_html_report(summary: &RunSummary) -> Markup {
    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                title { (t!("html_report.title")) }
                style { (PreEscaped(HTML_STYLE)) }
            }
            body {
                h1 { (t!("html_report.title")) }
                p {
                    (t!("html_report.generated", at = summary.finished_at.format("%Y-%m-%d %H:%M:%S")))
                }
                div.summary-container {
                    div.summary-item {
                        span.count { (summary.total()) }
                        span.label { (t!("html_report.total")) }
                    }
                    div.summary-item {
                        span.count.passed-text { (summary.passed()) }
                        span.label { (t!("html_report.passed")) }
                    }
                    div.summary-item {
                        span.count.failed-text { (summary.failed()) }
                        span.label { (t!("html_report.failed")) }
                    }
                }
                table {
                    thead {
                        tr {
                            th { "Python" }
                            th { "UCS" }
                            th { "SQLite" }
                            th { (t!("html_report.status")) }
                            th { (t!("html_report.logs")) }
                        }
                    }
                    tbody {
                        @for outcome in &summary.outcomes {
                            @let job = outcome.job();
                            tr {
                                td { (job.interpreter_version) }
                                td { (job.width) }
                                td { (job.lib_version) }
                                @match outcome {
                                    JobOutcome::Success(_) => {
                                        td.status-passed { (t!("html_report.status_passed")) }
                                    }
                                    JobOutcome::Failure { cause, .. } => {
                                        td.status-failed { (cause) }
                                    }
                                }
                                td { code { (job.logdir.display()) } }
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Writes the report to `output_path`.
pub fn generate_html_report(summary: &RunSummary, output_path: &Path) -> Result<()> {
    let markup = render_html_report(summary);
    fs::write(output_path, markup.into_string())
        .with_context(|| format!("Failed to write HTML report: {}", output_path.display()))
}
