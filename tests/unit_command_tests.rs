//! # Command Module Unit Tests / Command 模块单元测试
//!
//! Runs real `sh` processes through `ShellRunner` and checks exit
//! classification and log capture.
//!
//! 通过 `ShellRunner` 运行真实的 `sh` 进程，检查退出分类和日志捕获。

use std::fs;
use tempfile::tempdir;

use megatest::core::error::{ProcessError, Termination};
use megatest::infra::command::{CommandRunner, ShellCommand, ShellRunner, append_log, shell_quote};

#[tokio::test]
async fn test_success_appends_output_to_log() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("out.txt");
    fs::write(&log, "previous\n").unwrap();

    let command = ShellCommand::new("echo hello; echo oops >&2", &log);
    ShellRunner.run(&command).await.unwrap();

    let content = fs::read_to_string(&log).unwrap();
    assert!(content.starts_with("previous\n"));
    assert!(content.contains("$ echo hello; echo oops >&2\n"));
    assert!(content.contains("hello\n"));
    assert!(content.contains("oops\n"));
}

#[tokio::test]
async fn test_nonzero_exit_is_failure() {
    let dir = tempdir().unwrap();
    let command = ShellCommand::new("exit 3", dir.path().join("log.txt"));

    let err = ShellRunner.run(&command).await.unwrap_err();
    assert_eq!(err.termination(), Some(Termination::Exited(3)));
    assert!(!err.is_unexpected());
}

#[cfg(unix)]
#[tokio::test]
async fn test_signal_is_failure() {
    let dir = tempdir().unwrap();
    let command = ShellCommand::new("kill -9 $$", dir.path().join("log.txt"));

    let err = ShellRunner.run(&command).await.unwrap_err();
    assert_eq!(err.termination(), Some(Termination::Signaled(9)));
    assert!(err.to_string().contains("signal 9"));
}

#[tokio::test]
async fn test_cwd_and_env_are_applied() {
    let dir = tempdir().unwrap();
    let sub = dir.path().join("sub");
    fs::create_dir_all(&sub).unwrap();
    let log = dir.path().join("log.txt");

    let command = ShellCommand::new("pwd; echo value=$MEGATEST_VALUE", &log)
        .current_dir(&sub)
        .env("MEGATEST_VALUE", "42");
    ShellRunner.run(&command).await.unwrap();

    let content = fs::read_to_string(&log).unwrap();
    assert!(content.contains("sub\n"));
    assert!(content.contains("value=42\n"));
}

#[tokio::test]
async fn test_unwritable_log_is_unexpected() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("missing").join("log.txt");

    let err = ShellRunner
        .run(&ShellCommand::new("true", &log))
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::Log { .. }));
    assert!(err.is_unexpected());
}

#[tokio::test]
async fn test_missing_working_directory_is_unexpected() {
    let dir = tempdir().unwrap();
    let command = ShellCommand::new("true", dir.path().join("log.txt"))
        .current_dir(dir.path().join("nowhere"));

    let err = ShellRunner.run(&command).await.unwrap_err();
    assert!(matches!(err, ProcessError::Spawn { .. }));
}

#[tokio::test]
async fn test_append_log_creates_file() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("new.txt");
    append_log(&log, "one\n").await.unwrap();
    append_log(&log, "two\n").await.unwrap();
    assert_eq!(fs::read_to_string(&log).unwrap(), "one\ntwo\n");
}

#[test]
fn test_shell_quote() {
    assert_eq!(shell_quote("3.8.5"), "3.8.5");
    let quoted = shell_quote("/path with space/python");
    assert_ne!(quoted, "/path with space/python");
    assert_eq!(
        shlex::split(&quoted),
        Some(vec!["/path with space/python".to_string()])
    );
}
