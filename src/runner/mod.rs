//! 调用外部识别程序 `slice_localize`。
//!
//! 每次调用在临时目录中使用独立的输入/输出文件，无论成功失败都会删除。

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose};
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::Config;
use crate::utils::truncate_text;

// 日志中保留的标准输出字符数
const MAX_LOGGED_STDOUT_CHARS: usize = 4096;

mod assets;
mod params;

use assets::TempAssets;
pub use params::{ProcessParameters, build_arguments, command_line};

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to launch {tool}: {source}")]
    LaunchFailure {
        tool: String,
        #[source]
        source: io::Error,
    },
    #[error("external tool exited with code {exit_code}")]
    ProcessFailure { exit_code: i32, stderr: String },
    #[error("external tool did not produce an output file")]
    OutputMissing { stderr: String },
    #[error("external tool timed out after {after:?}")]
    Timeout { after: Duration },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl RunnerError {
    /// 外部程序的错误输出，启动失败等情况下没有
    pub fn stderr(&self) -> Option<&str> {
        match self {
            RunnerError::ProcessFailure { stderr, .. } | RunnerError::OutputMissing { stderr } => {
                Some(stderr)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessRunner {
    tool_path: PathBuf,
    leading_args: Vec<OsString>,
    working_dir: Option<PathBuf>,
    scratch_dir: PathBuf,
    timeout: Option<Duration>,
}

struct Captured {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

impl ProcessRunner {
    pub fn new(tool_path: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>) -> Self {
        let tool_path = tool_path.into();
        // 带目录的相对路径先转成绝对路径，避免切换工作目录后解析到别处
        let tool_path = if has_parent(&tool_path) {
            std::path::absolute(&tool_path).unwrap_or(tool_path)
        } else {
            tool_path
        };

        Self {
            tool_path,
            leading_args: Vec::new(),
            working_dir: None,
            scratch_dir: scratch_dir.into(),
            timeout: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let runner = Self::new(&config.tool_path, &config.scratch_dir)
            .with_leading_args(config.tool_args.iter().map(OsString::from))
            .with_timeout(config.process_timeout());
        match &config.tool_dir {
            Some(dir) => runner.with_working_dir(dir),
            None => runner,
        }
    }

    /// 放在参数最前面的固定参数，例如解释器要执行的脚本
    pub fn with_leading_args(mut self, args: impl IntoIterator<Item = OsString>) -> Self {
        self.leading_args = args.into_iter().collect();
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// 工作目录：优先使用配置的目录，否则使用程序所在目录，都没有时继承当前目录
    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir
            .as_deref()
            .or_else(|| self.tool_path.parent().filter(|p| !p.as_os_str().is_empty()))
    }

    /// 处理一张图片，返回 base64 编码的结果图片
    pub async fn process_image(
        &self,
        input: &[u8],
        params: &ProcessParameters,
    ) -> Result<String, RunnerError> {
        let invocation = Uuid::new_v4().simple().to_string();
        fs::create_dir_all(&self.scratch_dir).await?;

        // assets 被 drop 时删除临时文件，覆盖所有返回路径
        let assets = TempAssets::new(&self.scratch_dir, &invocation);
        fs::write(&assets.input, input).await?;

        let mut args = self.leading_args.clone();
        args.extend(build_arguments(params, &assets.input, &assets.output));
        let command = command_line(&self.tool_path, &args);

        tracing::info!(invocation = %invocation, "Executing command: {}", command);
        let captured = self.execute(&args).await?;

        if !captured.status.success() {
            let exit_code = captured.status.code().unwrap_or(-1);
            tracing::error!(
                invocation = %invocation,
                exit_code,
                "{} failed with exit code {}. Error: {}",
                command,
                exit_code,
                captured.stderr
            );
            return Err(RunnerError::ProcessFailure {
                exit_code,
                stderr: captured.stderr,
            });
        }

        tracing::info!(
            invocation = %invocation,
            "{} stdout:\n{}",
            command,
            truncate_text(&captured.stdout, MAX_LOGGED_STDOUT_CHARS)
        );

        if !fs::try_exists(&assets.output).await? {
            tracing::warn!(invocation = %invocation, "Output file missing: {}", assets.output.display());
            return Err(RunnerError::OutputMissing {
                stderr: captured.stderr,
            });
        }

        let output = fs::read(&assets.output).await?;
        Ok(general_purpose::STANDARD.encode(output))
    }

    async fn execute(&self, args: &[OsString]) -> Result<Captured, RunnerError> {
        let mut cmd = Command::new(&self.tool_path);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = self.working_dir() {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| RunnerError::LaunchFailure {
            tool: self.tool_path.display().to_string(),
            source,
        })?;

        // 等待进程的同时读取两个管道，否则输出写满管道缓冲区后会互相等待
        let mut stdout_reader = drain(child.stdout.take());
        let mut stderr_reader = drain(child.stderr.take());

        // 超时覆盖进程退出和管道读完两步：遗留的子进程可能继续占用管道
        let collect = async {
            let status = child.wait().await?;
            let (stdout, stderr) = tokio::join!(&mut stdout_reader, &mut stderr_reader);
            let stdout = stdout.map_err(io::Error::other)??;
            let stderr = stderr.map_err(io::Error::other)??;
            Ok::<_, io::Error>(Captured {
                status,
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
            })
        };

        let collected = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, collect).await.ok(),
            None => Some(collect.await),
        };

        match collected {
            Some(captured) => Ok(captured?),
            None => {
                let after = self.timeout.unwrap_or_default();
                if let Err(e) = child.kill().await {
                    // 进程本身可能已退出，只是管道仍被占用
                    tracing::debug!("Failed to kill timed out process: {}", e);
                }
                stdout_reader.abort();
                stderr_reader.abort();
                tracing::error!("{} timed out after {:?}", self.tool_path.display(), after);
                Err(RunnerError::Timeout { after })
            }
        }
    }
}

fn drain<R>(pipe: Option<R>) -> JoinHandle<io::Result<Vec<u8>>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf).await?;
        }
        Ok(buf)
    })
}

fn has_parent(path: &Path) -> bool {
    path.parent().is_some_and(|p| !p.as_os_str().is_empty())
}
