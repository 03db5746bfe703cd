// Shared test helpers for integration tests
#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::Mutex;
use tempfile::{TempDir, tempdir};

use megatest::core::error::{ProcessError, Termination};
use megatest::core::provision::ProvisionSettings;
use megatest::infra::command::{CommandRunner, ShellCommand};
use megatest::models::JobDescriptor;

type FailWhen = Box<dyn Fn(&ShellCommand) -> bool + Send + Sync>;

/// Records every command instead of running it. Commands matching the
/// predicate fail with exit code 1.
pub struct StubRunner {
    commands: Mutex<Vec<ShellCommand>>,
    fail_when: FailWhen,
}

impl StubRunner {
    pub fn succeeding() -> Self {
        Self::failing_when(|_| false)
    }

    pub fn failing_when(predicate: impl Fn(&ShellCommand) -> bool + Send + Sync + 'static) -> Self {
        Self {
            commands: Mutex::new(Vec::new()),
            fail_when: Box::new(predicate),
        }
    }

    pub fn commands(&self) -> Vec<ShellCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.commands().into_iter().map(|c| c.script).collect()
    }
}

impl CommandRunner for StubRunner {
    async fn run(&self, command: &ShellCommand) -> Result<(), ProcessError> {
        self.commands.lock().unwrap().push(command.clone());
        if (self.fail_when)(command) {
            Err(ProcessError::Failed {
                command: command.script.clone(),
                termination: Termination::Exited(1),
            })
        } else {
            Ok(())
        }
    }
}

/// Builds a small project tree with every kind of input file plus files that
/// must not be copied.
pub fn setup_test_project() -> TempDir {
    let temp_dir = tempdir().expect("Failed to create temporary directory");
    let root = temp_dir.path();
    fs::create_dir_all(root.join("tools")).unwrap();
    fs::create_dir_all(root.join("src")).unwrap();

    fs::write(root.join("setup.py"), "print('setup')\n").unwrap();
    fs::write(root.join("tests.py"), "print('tests')\n").unwrap();
    fs::write(root.join("checksums"), "abc 123\n").unwrap();
    fs::write(root.join("README.txt"), "not an input\n").unwrap();
    fs::write(root.join("apsw.so"), "stale\n").unwrap();
    fs::write(root.join("tools").join("speedtest.py"), "pass\n").unwrap();
    fs::write(root.join("tools").join("notes.md"), "not an input\n").unwrap();
    fs::write(root.join("src").join("apsw.c"), "int x;\n").unwrap();
    fs::write(root.join("src").join("apsw.h"), "#pragma once\n").unwrap();
    fs::write(root.join("src").join("shell.c"), "stale\n").unwrap();

    temp_dir
}

/// A job rooted under `root` with its directories already created.
pub fn sample_job(root: &Path, version: &str, width: u8, lib: &str) -> JobDescriptor {
    let name = megatest::models::job_name(version, width, lib);
    let job = JobDescriptor {
        workdir: root.join("work").join(&name),
        logdir: root.join("results").join(&name),
        interpreter_version: version.to_string(),
        width,
        lib_version: lib.to_string(),
    };
    fs::create_dir_all(&job.workdir).unwrap();
    fs::create_dir_all(&job.logdir).unwrap();
    job
}

pub fn test_settings() -> ProvisionSettings {
    ProvisionSettings {
        system_interpreter: "/usr/bin/python".into(),
        download_base_url: "https://www.python.org/ftp/python".to_string(),
        downloader: "wget -q -O -".to_string(),
        extra_lib_dir: "/usr/lib/x86_64-linux-gnu".to_string(),
    }
}
