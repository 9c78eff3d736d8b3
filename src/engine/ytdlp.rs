use async_trait::async_trait;
use tokio::process::Command;

use super::{run_command, AudioExtractor, CommandError, ExtractRequest};

/// Remote audio extraction through `yt-dlp`.
#[derive(Debug, Clone)]
pub struct YtDlpExtractor {
    program: String,
    audio_format: String,
    audio_quality: String,
}

impl YtDlpExtractor {
    pub fn new(program: impl Into<String>, audio_format: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            audio_format: audio_format.into(),
            audio_quality: "192K".to_string(),
        }
    }

    fn extract_command(&self, request: &ExtractRequest<'_>) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--extract-audio")
            .arg("--audio-format")
            .arg(&self.audio_format)
            .arg("--audio-quality")
            .arg(&self.audio_quality)
            .arg("--output")
            .arg(request.output_template)
            .arg("--no-playlist")
            .arg("--user-agent")
            .arg(request.identity);
        for (name, value) in request.headers {
            cmd.arg("--add-header").arg(format!("{name}:{value}"));
        }
        let (min, max) = request.pacing;
        cmd.arg("--sleep-interval")
            .arg(min.as_secs().to_string())
            .arg("--max-sleep-interval")
            .arg(max.as_secs().to_string())
            .arg("--verbose")
            .arg("--")
            .arg(request.url);
        cmd
    }

    fn title_command(&self, url: &str, identity: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["--get-title", "--no-playlist", "--user-agent", identity, "--", url]);
        cmd
    }
}

impl Default for YtDlpExtractor {
    fn default() -> Self {
        Self::new("yt-dlp", "mp3")
    }
}

#[async_trait]
impl AudioExtractor for YtDlpExtractor {
    async fn extract_audio(&self, request: &ExtractRequest<'_>) -> Result<(), CommandError> {
        run_command(&self.program, self.extract_command(request)).await?;
        Ok(())
    }

    async fn fetch_title(&self, url: &str, identity: &str) -> Result<String, CommandError> {
        let output = run_command(&self.program, self.title_command(url, identity)).await?;
        Ok(output.stdout.trim().to_string())
    }
}
