//! # Command Execution Module / 命令执行模块
//!
//! Runs shell command lines as child processes, streams their combined
//! stdout/stderr into a per-job log file, and classifies the exit.
//!
//! 以子进程方式运行 shell 命令行，将其合并的 stdout/stderr 流式写入每个任务的日志文件，
//! 并对退出状态进行分类。

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;

use crate::core::error::{ProcessError, Termination};

/// A shell command line bound to a working directory and a log file.
/// 绑定到工作目录和日志文件的 shell 命令行。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    /// Script passed to `sh -c` / 传递给 `sh -c` 的脚本
    pub script: String,
    pub cwd: Option<PathBuf>,
    /// Extra environment for the child only / 仅对子进程生效的额外环境变量
    pub env: Vec<(String, String)>,
    /// Log file the output is appended to / 输出追加写入的日志文件
    pub log: PathBuf,
}

impl ShellCommand {
    pub fn new(script: impl Into<String>, log: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
            cwd: None,
            env: Vec::new(),
            log: log.into(),
        }
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Executes a command to completion. Success means a normal exit with status 0.
///
/// The seam the job executor and provisioner run every external step through;
/// tests substitute a recording stub.
///
/// 执行命令直至完成。成功意味着以状态码 0 正常退出。
pub trait CommandRunner: Send + Sync + 'static {
    fn run(&self, command: &ShellCommand) -> impl Future<Output = Result<(), ProcessError>> + Send;
}

/// Runs commands through `sh -c`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    async fn run(&self, command: &ShellCommand) -> Result<(), ProcessError> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&command.script).kill_on_drop(true);
        if let Some(dir) = &command.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &command.env {
            cmd.env(key, value);
        }

        let status = spawn_and_log(cmd, &command.script, &command.log).await?;
        check_status(&command.script, status)
    }
}

/// Maps an exit status onto the success/failure contract.
/// 将退出状态映射为成功/失败约定。
pub fn check_status(command: &str, status: ExitStatus) -> Result<(), ProcessError> {
    let termination = Termination::from(status);
    if termination.is_success() {
        Ok(())
    } else {
        Err(ProcessError::Failed {
            command: command.to_string(),
            termination,
        })
    }
}

/// Quotes a value for interpolation into a shell script.
pub fn shell_quote(value: &str) -> String {
    shlex::try_quote(value)
        .map(|quoted| quoted.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

/// Appends a line of text to a job log, creating the file if needed.
pub async fn append_log(path: &Path, text: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path).await?;
    file.write_all(text.as_bytes()).await?;
    file.flush().await
}

/// Spawns a command and appends its stdout and stderr to `log` as they arrive.
/// Both streams are read concurrently and written line by line through one
/// shared file handle, so lines from the two streams never tear.
///
/// # Returns
/// The `ExitStatus` of the child once both streams are drained.
///
/// 派生一个命令，并将其 stdout 和 stderr 在到达时追加到 `log`。
/// 两个流被并发读取，并通过一个共享文件句柄逐行写入，因此两个流的行不会被撕裂。
pub async fn spawn_and_log(
    mut cmd: Command,
    script: &str,
    log: &Path,
) -> Result<ExitStatus, ProcessError> {
    let log_error = |source| ProcessError::Log {
        path: log.to_path_buf(),
        source,
    };
    let spawn_error = |source| ProcessError::Spawn {
        command: script.to_string(),
        source,
    };

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log)
        .await
        .map_err(log_error)?;
    file.write_all(format!("$ {script}\n").as_bytes())
        .await
        .map_err(log_error)?;

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(spawn_error)?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| spawn_error(std::io::Error::other("stdout was not captured")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| spawn_error(std::io::Error::other("stderr was not captured")))?;

    let file = Arc::new(Mutex::new(file));
    let stdout_handle = tokio::spawn(copy_lines(stdout, Arc::clone(&file)));
    let stderr_handle = tokio::spawn(copy_lines(stderr, Arc::clone(&file)));

    let status = child.wait().await.map_err(spawn_error)?;

    // Both readers must finish before the log is complete.
    for handle in [stdout_handle, stderr_handle] {
        match handle.await {
            Ok(result) => result.map_err(log_error)?,
            Err(e) => return Err(log_error(std::io::Error::other(e))),
        }
    }
    file.lock().await.flush().await.map_err(log_error)?;

    Ok(status)
}

/// Copies raw lines from a child stream into the shared log.
async fn copy_lines<R>(stream: R, file: Arc<Mutex<File>>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Ok(());
        }
        file.lock().await.write_all(&line).await?;
    }
}
