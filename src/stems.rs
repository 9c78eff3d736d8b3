use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_derive::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::engine::{Mixer, Separator};
use crate::error::JobError;
use crate::workspace::{self, Workspace};

const STEMS_DIR: &str = "stems";

/// Which stems the separator produces and which one gets left out of the mix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StemSet {
    pub stems: Vec<String>,
    #[serde(rename = "stem_extension")]
    pub extension: String,
    #[serde(rename = "excluded_stem")]
    pub excluded: String,
}

impl Default for StemSet {
    fn default() -> Self {
        Self {
            stems: ["vocals", "drums", "bass", "piano", "other"]
                .map(String::from)
                .to_vec(),
            extension: "wav".to_string(),
            excluded: "drums".to_string(),
        }
    }
}

impl StemSet {
    pub fn validate(&self) -> Result<(), String> {
        if self.stems.is_empty() {
            return Err("stem set is empty".to_string());
        }
        if !self.stems.contains(&self.excluded) {
            return Err(format!("excluded stem {:?} is not in the stem set", self.excluded));
        }
        if self.stems.len() < 2 {
            return Err("nothing would be left to mix".to_string());
        }
        Ok(())
    }

    /// Stems that go into the mix, in stem-set order.
    pub fn kept(&self) -> impl Iterator<Item = &str> {
        self.stems
            .iter()
            .filter(move |s| **s != self.excluded)
            .map(String::as_str)
    }

    /// Paths the separator is expected to write for `input` under `out_dir`.
    pub fn kept_paths(&self, input: &Path, out_dir: &Path) -> Vec<PathBuf> {
        let base = input
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_default();
        let dir = out_dir.join(base);
        self.kept()
            .map(|stem| dir.join(format!("{stem}.{}", self.extension)))
            .collect()
    }
}

/// Equal-weight sum of `inputs` streams, no normalization, longest input wins.
pub fn filter_graph(inputs: usize) -> String {
    let labels: String = (0..inputs).map(|i| format!("[{i}:a]")).collect();
    let weights = vec!["1"; inputs].join(" ");
    format!("{labels}amix=inputs={inputs}:duration=longest:normalize=0:weights={weights}")
}

/// Decomposes a track and remixes everything but the excluded stem.
pub struct StemStage {
    separator: Arc<dyn Separator>,
    mixer: Arc<dyn Mixer>,
    stems: StemSet,
}

impl StemStage {
    pub fn new(separator: Arc<dyn Separator>, mixer: Arc<dyn Mixer>, stems: StemSet) -> Result<Self, JobError> {
        stems.validate().map_err(JobError::Validation)?;
        Ok(Self {
            separator,
            mixer,
            stems,
        })
    }

    pub fn stems(&self) -> &StemSet {
        &self.stems
    }

    /// Writes the remix of `input` to `output`, or fails with `output` absent.
    pub async fn run(&self, input: &Path, output: &Path, workspace: &Workspace) -> Result<(), JobError> {
        let out_dir = workspace.join(STEMS_DIR);

        info!(input = %input.display(), "Separating stems");
        self.separator
            .separate(input, &out_dir)
            .await
            .map_err(|e| JobError::Processing(format!("stem separation failed: {e}")))?;

        let inputs = self.stems.kept_paths(input, &out_dir);
        info!(excluded = %self.stems.excluded, stems = inputs.len(), "Mixing remaining stems");

        if let Err(e) = self
            .mixer
            .mix(&inputs, &filter_graph(inputs.len()), output)
            .await
        {
            warn!(output = %output.display(), "Mixing failed, discarding output");
            workspace::discard(output).await;
            return Err(JobError::Processing(format!("audio mixing failed: {e}")));
        }

        let written = tokio::fs::metadata(output).await.map(|m| m.len()).unwrap_or(0);
        if written == 0 {
            warn!(output = %output.display(), "Mixer produced no audio, discarding output");
            workspace::discard(output).await;
            return Err(JobError::Processing("audio mixing produced an empty file".to_string()));
        }

        Ok(())
    }
}
