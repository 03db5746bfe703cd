//! # Reporting Module / 报告模块
//!
//! Console progress and summaries, plus an optional HTML report.
//!
//! 控制台进度和摘要，以及可选的 HTML 报告。

pub mod console;
pub mod html;

// Re-export common reporting functions
pub use console::{print_summary, report_outcome};
pub use html::generate_html_report;
