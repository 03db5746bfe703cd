//! # File System Operations Module / 文件系统操作模块
//!
//! Destructive reset of the run directories, removal of stale artifacts and
//! copying of job input files.
//!
//! 运行目录的破坏性重置、过期产物的删除以及任务输入文件的复制。

use anyhow::{Context, Result, bail};
use fs_extra::dir::CopyOptions;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use crate::core::config::InputSet;

/// Wipes `path` and recreates it empty, returning its canonical form.
/// Running it twice in a row leaves the same empty directory.
///
/// 清空 `path` 并将其重新创建为空目录，返回其规范路径。
/// 连续运行两次会得到相同的空目录。
pub fn reset_dir(path: &Path) -> Result<PathBuf> {
    match fs::remove_dir_all(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to remove directory: {}", path.display()));
        }
    }
    fs::create_dir_all(path)
        .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    absolute_path(path)
}

/// Deletes a file or directory if it exists.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to remove: {}", path.display())),
    }
}

/// Copies the files selected by `set` from `project_root` into `workdir`.
///
/// # Returns
/// The number of files copied.
pub fn copy_input_set(project_root: &Path, set: &InputSet, workdir: &Path) -> Result<usize> {
    let source = project_root.join(&set.source);
    if !is_directory(&source) {
        bail!("Input directory does not exist: {}", source.display());
    }
    let dest = workdir.join(&set.dest);
    fs::create_dir_all(&dest)
        .with_context(|| format!("Failed to create directory: {}", dest.display()))?;

    let mut files = Vec::new();
    for entry in fs::read_dir(&source)
        .with_context(|| format!("Failed to read directory: {}", source.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if entry.file_name().to_str().is_some_and(|name| set.matches(name)) {
            files.push(entry.path());
        }
    }
    files.sort();

    if !files.is_empty() {
        let mut options = CopyOptions::new();
        options.overwrite = true;
        fs_extra::copy_items(files.as_slice(), &dest, &options).with_context(|| {
            format!(
                "Failed to copy inputs from {} to {}",
                source.display(),
                dest.display()
            )
        })?;
    }
    Ok(files.len())
}

/// Checks if a path exists and is a directory.
pub fn is_directory(path: &Path) -> bool {
    path.exists() && path.is_dir()
}

/// Gets the absolute path from a potentially relative path.
pub fn absolute_path(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path).with_context(|| format!("Failed to resolve path: {}", path.display()))
}

/// Absolute form of a path that may not exist yet: `.` and `..` are resolved
/// lexically and the longest existing prefix is canonicalized, so symlinks and
/// relative spellings of the same directory compare equal.
///
/// 可能尚不存在的路径的绝对形式：按词法解析 `.` 和 `..`，并规范化最长的已存在前缀。
pub fn normalize_path(path: &Path) -> Result<PathBuf> {
    let base = if path.is_absolute() {
        PathBuf::new()
    } else {
        std::env::current_dir().context("Failed to read current directory")?
    };
    let mut lexical = base;
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                lexical.pop();
            }
            other => lexical.push(other.as_os_str()),
        }
    }

    let mut missing = Vec::new();
    let mut existing = lexical.as_path();
    loop {
        if let Ok(canonical) = fs::canonicalize(existing) {
            return Ok(missing
                .iter()
                .rev()
                .fold(canonical, |acc: PathBuf, part| acc.join(part)));
        }
        match (existing.file_name(), existing.parent()) {
            (Some(name), Some(parent)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return Ok(lexical),
        }
    }
}

/// Whether `a` and `b` are the same directory or one lies inside the other.
/// Both must already be normalized.
pub fn paths_overlap(a: &Path, b: &Path) -> bool {
    a.starts_with(b) || b.starts_with(a)
}
