//! # Matrix Planner Module / 矩阵计划模块
//!
//! Expands the configured axes into job descriptors and prepares each job's
//! private directory tree before it is enqueued.
//!
//! 将配置的各个轴展开为任务描述，并在任务入队前准备每个任务的私有目录树。

use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use crate::core::config::{InputSet, MegatestConfig};
use crate::core::error::ConfigError;
use crate::core::models::{JobDescriptor, SYSTEM_VERSION, WIDTH_NOT_APPLICABLE, job_name};
use crate::infra::fs::copy_input_set;

/// The three axes of the matrix plus the width cutoff.
/// 矩阵的三个轴以及宽度分界版本。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixAxes {
    pub interpreter_versions: Vec<String>,
    pub widths: Vec<u8>,
    pub lib_versions: Vec<String>,
    pub width_cutoff: String,
}

impl MatrixAxes {
    pub fn from_config(config: &MegatestConfig) -> Self {
        Self {
            interpreter_versions: config.interpreter_versions.clone(),
            widths: config.widths.clone(),
            lib_versions: config.effective_lib_versions(),
            width_cutoff: config.width_cutoff.clone(),
        }
    }
}

/// Whether the width axis exists for an interpreter version.
///
/// The comparison is lexical on purpose: versions are compared the way they are
/// written, so `"3.10"` sorts below `"3.3"`.
///
/// 宽度轴是否适用于某个解释器版本。比较按字典序进行，因此 `"3.10"` 排在 `"3.3"` 之前。
pub fn width_applies(interpreter_version: &str, cutoff: &str) -> bool {
    interpreter_version != SYSTEM_VERSION && interpreter_version < cutoff
}

/// The widths that survive the axis filter for one interpreter version,
/// in request order and without duplicates.
///
/// Where the axis does not apply, any requested width yields the single
/// width-less job, so `--ucs 4` alone still tests `system` and 3.3+.
pub fn effective_widths(interpreter_version: &str, requested: &[u8], cutoff: &str) -> Vec<u8> {
    if requested.is_empty() {
        return Vec::new();
    }
    if !width_applies(interpreter_version, cutoff) {
        return vec![WIDTH_NOT_APPLICABLE];
    }
    let mut seen = HashSet::new();
    requested.iter().copied().filter(|w| seen.insert(*w)).collect()
}

/// Rejects an axis value that cannot be one component of a job directory
/// name: path separators and `..` would leave the root, and the `-ucs`/`-sq`
/// separators would let two triples render to the same name.
pub fn check_axis_value(value: &str) -> Result<(), ConfigError> {
    let unsafe_value = value.contains(['/', '\\'])
        || value == "."
        || value.contains("..")
        || value.contains("-ucs")
        || value.contains("-sq");
    if unsafe_value {
        Err(ConfigError::InvalidAxisValue(value.to_string()))
    } else {
        Ok(())
    }
}

/// Builds one descriptor per valid (version, effective width, library version)
/// triple. Duplicate triples collapse; two distinct triples that would share a
/// directory are a configuration error.
///
/// 为每个有效的（版本、有效宽度、库版本）三元组构建一个任务描述。
/// 重复的三元组会被合并；两个不同的三元组若共享同一目录则视为配置错误。
pub fn plan_matrix(
    axes: &MatrixAxes,
    work_root: &Path,
    results_root: &Path,
) -> Result<Vec<JobDescriptor>, ConfigError> {
    let versions: Vec<&String> = axes
        .interpreter_versions
        .iter()
        .filter(|v| !v.is_empty())
        .collect();
    let lib_versions: Vec<&String> = axes.lib_versions.iter().filter(|v| !v.is_empty()).collect();

    if versions.is_empty() {
        return Err(ConfigError::NoInterpreterVersions);
    }
    if lib_versions.is_empty() {
        return Err(ConfigError::NoLibVersions);
    }
    if axes.widths.is_empty() {
        return Err(ConfigError::NoWidths);
    }
    if axes.widths.contains(&WIDTH_NOT_APPLICABLE) {
        return Err(ConfigError::ReservedWidth);
    }
    for value in versions.iter().chain(&lib_versions) {
        check_axis_value(value)?;
    }

    let mut triples = HashSet::new();
    let mut names: HashMap<String, (&str, u8, &str)> = HashMap::new();
    let mut jobs = Vec::new();
    for version in versions {
        for width in effective_widths(version, &axes.widths, &axes.width_cutoff) {
            for lib_version in &lib_versions {
                let triple = (version.as_str(), width, lib_version.as_str());
                if !triples.insert(triple) {
                    continue;
                }
                let name = job_name(version, width, lib_version);
                if let Some(&(v, w, l)) = names.get(&name) {
                    return Err(ConfigError::NameCollision {
                        first: format!("({v}, {w}, {l})"),
                        second: format!("({version}, {width}, {lib_version})"),
                        name,
                    });
                }
                names.insert(name.clone(), triple);
                jobs.push(JobDescriptor {
                    workdir: work_root.join(&name),
                    logdir: results_root.join(&name),
                    interpreter_version: version.to_string(),
                    width,
                    lib_version: lib_version.to_string(),
                });
            }
        }
    }
    Ok(jobs)
}

/// Creates the job's workdir and logdir and copies the input files into the
/// workdir. Must complete before the job is enqueued.
///
/// 创建任务的工作目录和日志目录，并将输入文件复制到工作目录。必须在任务入队前完成。
pub fn prepare_job(job: &JobDescriptor, project_root: &Path, inputs: &[InputSet]) -> Result<()> {
    for dir in [&job.workdir, &job.logdir] {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }
    for set in inputs {
        copy_input_set(project_root, set, &job.workdir)
            .with_context(|| format!("Failed to prepare job {}", job.name()))?;
    }
    Ok(())
}
