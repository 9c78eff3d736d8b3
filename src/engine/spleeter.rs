use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use super::{run_command, CommandError, Separator};

pub const DEFAULT_MODEL: &str = "spleeter:5stems-16kHz";

/// Runs `spleeter separate`, which writes `<output_dir>/<input stem>/<stem>.wav`.
#[derive(Debug, Clone)]
pub struct SpleeterSeparator {
    program: String,
    model: String,
}

impl SpleeterSeparator {
    pub fn new(program: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            model: model.into(),
        }
    }

    fn command(&self, input: &Path, output_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("separate")
            .arg("-p")
            .arg(&self.model)
            .arg("-o")
            .arg(output_dir)
            .arg(input);
        cmd
    }
}

impl Default for SpleeterSeparator {
    fn default() -> Self {
        Self::new("spleeter", DEFAULT_MODEL)
    }
}

#[async_trait]
impl Separator for SpleeterSeparator {
    async fn separate(&self, input: &Path, output_dir: &Path) -> Result<(), CommandError> {
        run_command(&self.program, self.command(input, output_dir)).await?;
        Ok(())
    }
}
