//! External media engines.
//!
//! The pipeline never touches audio itself. Decomposition, mixing and
//! remote extraction are delegated to external programs behind the narrow
//! traits below, so orchestration can run against fakes in tests.

pub mod ffmpeg;
pub mod spleeter;
pub mod ytdlp;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, error};

pub use ffmpeg::FfmpegMixer;
pub use spleeter::SpleeterSeparator;
pub use ytdlp::YtDlpExtractor;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with status {code:?}: {output}")]
    Failed {
        program: String,
        code: Option<i32>,
        output: String,
    },
}

/// Splits one audio file into stems under `output_dir/<basename>/<stem>.<ext>`.
#[async_trait]
pub trait Separator: Send + Sync {
    async fn separate(&self, input: &Path, output_dir: &Path) -> Result<(), CommandError>;
}

/// Sums `inputs` through `filter_graph` into a single encoded `output`.
#[async_trait]
pub trait Mixer: Send + Sync {
    async fn mix(&self, inputs: &[PathBuf], filter_graph: &str, output: &Path) -> Result<(), CommandError>;
}

/// One remote extraction attempt.
#[derive(Debug, Clone)]
pub struct ExtractRequest<'a> {
    pub url: &'a str,
    pub output_template: &'a Path,
    pub identity: &'a str,
    pub headers: &'a [(&'a str, &'a str)],
    /// Lower and upper bound of the pause the extractor inserts between its own requests.
    pub pacing: (Duration, Duration),
}

#[async_trait]
pub trait AudioExtractor: Send + Sync {
    async fn extract_audio(&self, request: &ExtractRequest<'_>) -> Result<(), CommandError>;

    async fn fetch_title(&self, url: &str, identity: &str) -> Result<String, CommandError>;
}

/// Injected clock for retry pauses.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

pub(crate) struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// Runs `command` to completion, capturing both streams.
///
/// A non-zero exit is logged with the full output and returned as
/// [`CommandError::Failed`].
pub(crate) async fn run_command(program: &str, mut command: Command) -> Result<CommandOutput, CommandError> {
    debug!(?command, "Running {}", program);

    let output = command
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| CommandError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let result = CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };

    if output.status.success() {
        Ok(result)
    } else {
        let combined = result.combined();
        error!(status = ?output.status, output = %combined, "{} failed", program);
        Err(CommandError::Failed {
            program: program.to_string(),
            code: output.status.code(),
            output: combined,
        })
    }
}
