use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_derive::{Deserialize, Serialize};
use tokio::process::Command;

use super::{run_command, CommandError, Mixer};

/// Output encoding used for every mix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeSettings {
    pub codec: String,
    /// VBR quality, 0 is best.
    pub quality: u8,
    pub sample_rate: u32,
    pub channels: u8,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            codec: "libmp3lame".to_string(),
            quality: 0,
            sample_rate: 44_100,
            channels: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FfmpegMixer {
    program: String,
    encode: EncodeSettings,
}

impl FfmpegMixer {
    pub fn new(program: impl Into<String>, encode: EncodeSettings) -> Self {
        Self {
            program: program.into(),
            encode,
        }
    }

    fn command(&self, inputs: &[PathBuf], filter_graph: &str, output: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        for input in inputs {
            cmd.arg("-i").arg(input);
        }
        cmd.arg("-filter_complex")
            .arg(filter_graph)
            .arg("-c:a")
            .arg(&self.encode.codec)
            .arg("-q:a")
            .arg(self.encode.quality.to_string())
            .arg("-ar")
            .arg(self.encode.sample_rate.to_string())
            .arg("-ac")
            .arg(self.encode.channels.to_string())
            .arg("-y")
            .arg(output);
        cmd
    }
}

impl Default for FfmpegMixer {
    fn default() -> Self {
        Self::new("ffmpeg", EncodeSettings::default())
    }
}

#[async_trait]
impl Mixer for FfmpegMixer {
    async fn mix(&self, inputs: &[PathBuf], filter_graph: &str, output: &Path) -> Result<(), CommandError> {
        run_command(&self.program, self.command(inputs, filter_graph, output)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_mix_invocation() {
        let mixer = FfmpegMixer::default();
        let inputs = vec![PathBuf::from("a.wav"), PathBuf::from("b.wav")];
        let cmd = mixer.command(&inputs, "[0:a][1:a]amix=inputs=2", Path::new("out.mp3"));
        let args: Vec<_> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            [
                "-i", "a.wav", "-i", "b.wav",
                "-filter_complex", "[0:a][1:a]amix=inputs=2",
                "-c:a", "libmp3lame", "-q:a", "0", "-ar", "44100", "-ac", "2",
                "-y", "out.mp3",
            ]
        );
    }
}
