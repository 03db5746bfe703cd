//! # Environment Provisioning Module / 环境准备模块
//!
//! Produces an interpreter for a job: either the pre-installed system one, or a
//! specific release fetched, configured, compiled and installed into the job's
//! private prefix. Every external step goes through a [`CommandRunner`] and
//! appends its output to the job's build log.
//!
//! 为任务准备解释器：要么是系统预装的解释器，要么是获取、配置、编译并安装到任务私有前缀中的特定版本。
//! 每个外部步骤都通过 [`CommandRunner`] 执行，并将输出追加到任务的构建日志中。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::error::{ProvisionError, ProvisionStep};
use crate::core::models::{JobDescriptor, ProvisionedEnv, WIDTH_NOT_APPLICABLE};
use crate::infra::command::{CommandRunner, ShellCommand, append_log, shell_quote};

/// Install prefix inside each job's workdir / 每个任务工作目录中的安装前缀
pub const INSTALL_DIR: &str = "pyinst";

/// Versions at or after these points within their own series ship as `.tar.xz`.
const XZ_SWITCH_POINTS: &[&str] = &["2.7.7", "2.6.9"];

/// Every release from this series on ships as `.tar.xz`.
const XZ_SERIES: &str = "3.3";

/// Releases lexically above this one ship as `.tar.bz2`, older ones as `.tgz`.
const BZ2_AFTER: &str = "2.3.0";

/// Line in `setup.py` whose list of library directories gets the extra entry.
const LIBRARY_DIRS_ANCHOR: &str = "lib_dirs = self.compiler.library_dirs + [";

/// Compression of a release archive.
/// 发布归档的压缩格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Gzip,
    Bzip2,
    Xz,
}

impl ArchiveFormat {
    /// The flag `tar x` needs for this compression.
    pub fn tar_flag(&self) -> char {
        match self {
            ArchiveFormat::Gzip => 'z',
            ArchiveFormat::Bzip2 => 'j',
            ArchiveFormat::Xz => 'J',
        }
    }
}

/// Where and how to download one interpreter release.
/// 下载某个解释器版本的位置和方式。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSource {
    pub url: String,
    pub format: ArchiveFormat,
    /// Version as it appears in the unpacked directory name.
    pub source_version: String,
}

/// Strips a pre-release marker (`a`, `b`, `rc`) to get the release directory.
/// `"3.4.0rc1"` becomes `"3.4.0"`.
pub fn release_directory(version: &str) -> &str {
    for marker in ["a", "b", "rc"] {
        if let Some(pos) = version.find(marker) {
            return &version[..pos];
        }
    }
    version
}

fn numeric_parts(version: &str) -> Option<Vec<u32>> {
    let parts = version
        .split('.')
        .map(|p| p.parse::<u32>().ok())
        .collect::<Option<Vec<_>>>()?;
    (!parts.is_empty()).then_some(parts)
}

/// Derives the download URL and compression for an interpreter version.
///
/// The pre-release marker is dropped from the directory component but kept in
/// the file name. Compression follows the release history: `.tgz` up to 2.3,
/// `.tar.bz2` afterwards, `.tar.xz` from 3.3 on and from the 2.6.9 / 2.7.7
/// releases within their own series.
///
/// 根据解释器版本推导下载 URL 和压缩格式。目录部分去掉预发布标记，文件名中保留。
pub fn archive_source(base_url: &str, version: &str) -> Result<ArchiveSource, ProvisionError> {
    let invalid = || ProvisionError::InvalidVersion(version.to_string());
    let base_url = base_url.trim_end_matches('/');
    let directory = release_directory(version);
    let parts = numeric_parts(directory).ok_or_else(invalid)?;

    if version == BZ2_AFTER {
        let short = "2.3";
        return Ok(ArchiveSource {
            url: format!("{base_url}/{short}/Python-{short}.tgz"),
            format: ArchiveFormat::Gzip,
            source_version: short.to_string(),
        });
    }

    if version <= BZ2_AFTER {
        return Ok(ArchiveSource {
            url: format!("{base_url}/{directory}/Python-{version}.tgz"),
            format: ArchiveFormat::Gzip,
            source_version: version.to_string(),
        });
    }

    let mut format = ArchiveFormat::Bzip2;
    if version >= XZ_SERIES {
        format = ArchiveFormat::Xz;
    }
    for switch in XZ_SWITCH_POINTS {
        let Some(switch) = numeric_parts(switch) else {
            continue;
        };
        let same_series = parts.iter().take(2).eq(switch.iter().take(2));
        if same_series && parts >= switch {
            format = ArchiveFormat::Xz;
            break;
        }
    }
    let extension = match format {
        ArchiveFormat::Bzip2 => "bz2",
        _ => "xz",
    };

    Ok(ArchiveSource {
        url: format!("{base_url}/{directory}/Python-{version}.tar.{extension}"),
        format,
        source_version: version.to_string(),
    })
}

/// Legacy releases whose `setup.py` cannot find multiarch library directories.
pub fn needs_library_dir_patch(source_version: &str) -> bool {
    source_version.starts_with("2.3") || source_version.starts_with("2.4")
}

/// Inserts `lib_dir` at the front of the library directory list in a
/// `setup.py` source. Returns the new source and how many lines changed.
///
/// 在 `setup.py` 源码的库目录列表开头插入 `lib_dir`。返回新源码和修改的行数。
pub fn insert_library_dir(source: &str, lib_dir: &str) -> (String, usize) {
    let mut patched = String::with_capacity(source.len() + 64);
    let mut changed = 0;
    for line in source.split_inclusive('\n') {
        match line.find('[') {
            Some(bracket) if line.trim_start().starts_with(LIBRARY_DIRS_ANCHOR) => {
                patched.push_str(&line[..=bracket]);
                patched.push_str(&format!(" '{lib_dir}', "));
                patched.push_str(&line[bracket + 1..]);
                changed += 1;
            }
            _ => patched.push_str(line),
        }
    }
    (patched, changed)
}

/// Path of the installed interpreter binary. Releases from 3.1 on install as `python3`.
pub fn interpreter_path(workdir: &Path, source_version: &str) -> PathBuf {
    let binary = if source_version >= "3.1" {
        "python3"
    } else {
        "python"
    };
    workdir.join(INSTALL_DIR).join("bin").join(binary)
}

/// Extra `configure` arguments needed by the oldest supported release.
pub fn legacy_configure_flags(source_version: &str) -> &'static str {
    if source_version.starts_with("2.3") {
        "BASECFLAGS=-U_FORTIFY_SOURCE"
    } else {
        ""
    }
}

/// The install target; the 3.0 series needs `fullinstall`.
pub fn install_target(source_version: &str) -> &'static str {
    if source_version.starts_with("3.0") {
        "fullinstall"
    } else {
        "install"
    }
}

/// Looks up `/usr/lib/<multiarch>` through `dpkg-architecture`, falling back
/// to `/usr/lib` when the tool is unavailable.
pub async fn detect_multiarch_lib_dir() -> String {
    let output = tokio::process::Command::new("dpkg-architecture")
        .arg("-qDEB_HOST_MULTIARCH")
        .output()
        .await;
    match output {
        Ok(output) if output.status.success() => {
            let triple = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if triple.is_empty() {
                "/usr/lib".to_string()
            } else {
                format!("/usr/lib/{triple}")
            }
        }
        _ => "/usr/lib".to_string(),
    }
}

/// Settings shared by every provisioning run.
/// 所有环境准备共享的设置。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionSettings {
    pub system_interpreter: PathBuf,
    pub download_base_url: String,
    pub downloader: String,
    pub extra_lib_dir: String,
}

/// Builds interpreters into job-private prefixes.
/// 将解释器构建到任务私有前缀中。
pub struct Provisioner<R> {
    runner: Arc<R>,
    settings: ProvisionSettings,
}

impl<R: CommandRunner> Provisioner<R> {
    pub fn new(runner: Arc<R>, settings: ProvisionSettings) -> Self {
        Self { runner, settings }
    }

    pub fn settings(&self) -> &ProvisionSettings {
        &self.settings
    }

    /// Returns a ready interpreter and library path for `job`.
    ///
    /// The system interpreter is returned immediately. Anything else is fetched,
    /// patched when it is a legacy release, configured, compiled, installed and
    /// cleaned inside the job's workdir. The first failing step aborts this job.
    pub async fn provision(&self, job: &JobDescriptor) -> Result<ProvisionedEnv, ProvisionError> {
        if job.is_system() {
            return Ok(ProvisionedEnv::system(self.settings.system_interpreter.clone()));
        }

        let source = archive_source(&self.settings.download_base_url, &job.interpreter_version)?;
        let version = source.source_version.as_str();

        self.run_step(job, ProvisionStep::Fetch, self.fetch_script(&source))
            .await?;

        if needs_library_dir_patch(version) {
            self.patch_setup(job, version).await?;
        }

        let source_dir = format!("?ython-{}", shell_quote(version));
        let prefix = job.workdir.join(INSTALL_DIR);
        let mut configure = format!(
            "cd {source_dir} && ./configure {} --disable-ipv6",
            legacy_configure_flags(version)
        );
        if job.width != WIDTH_NOT_APPLICABLE {
            configure.push_str(&format!(" --enable-unicode=ucs{}", job.width));
        }
        configure.push_str(&format!(
            " --prefix={}",
            shell_quote(&prefix.to_string_lossy())
        ));

        self.run_step(job, ProvisionStep::Configure, configure).await?;
        self.run_step(job, ProvisionStep::Compile, format!("cd {source_dir} && make"))
            .await?;
        self.run_step(
            job,
            ProvisionStep::Install,
            format!("cd {source_dir} && make {}", install_target(version)),
        )
        .await?;

        // Disk usage only; a failed clean leaves a usable install behind.
        let clean = self.build_command(job, format!("cd {source_dir} && make clean"));
        if let Err(e) = self.runner.run(&clean).await {
            if e.is_unexpected() {
                return Err(ProvisionError::Step {
                    step: ProvisionStep::Clean,
                    log: job.build_log(),
                    source: e,
                });
            }
            let _ = append_log(&job.build_log(), &format!("warning: clean step {e}\n")).await;
        }

        Ok(ProvisionedEnv {
            interpreter: interpreter_path(&job.workdir, version),
            library_path: Some(prefix.join("lib")),
        })
    }

    fn fetch_script(&self, source: &ArchiveSource) -> String {
        let url = shell_quote(&source.url);
        format!(
            "mkdir -p {INSTALL_DIR} && echo Getting {url} && {} {url} | tar xf{} -",
            self.settings.downloader,
            source.format.tar_flag()
        )
    }

    fn build_command(&self, job: &JobDescriptor, script: String) -> ShellCommand {
        ShellCommand::new(script, job.build_log())
            .current_dir(&job.workdir)
            .env("LDFLAGS", format!("-L{}", self.settings.extra_lib_dir))
    }

    async fn run_step(
        &self,
        job: &JobDescriptor,
        step: ProvisionStep,
        script: String,
    ) -> Result<(), ProvisionError> {
        let command = self.build_command(job, script);
        self.runner
            .run(&command)
            .await
            .map_err(|source| ProvisionError::Step {
                step,
                log: job.build_log(),
                source,
            })
    }

    async fn patch_setup(&self, job: &JobDescriptor, version: &str) -> Result<(), ProvisionError> {
        let path = job.workdir.join(format!("Python-{version}")).join("setup.py");
        let patch_error = |source| ProvisionError::Patch {
            path: path.clone(),
            source,
        };
        let current = tokio::fs::read_to_string(&path).await.map_err(patch_error)?;
        let (patched, _) = insert_library_dir(&current, &self.settings.extra_lib_dir);
        tokio::fs::write(&path, patched).await.map_err(patch_error)
    }
}
