use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use directories::ProjectDirs;
use serde_derive::{Deserialize, Serialize};

use crate::engine::ffmpeg::EncodeSettings;
use crate::engine::spleeter;
use crate::stems::StemSet;

pub fn project_dirs() -> anyhow::Result<ProjectDirs> {
    ProjectDirs::from("org", "drumless", "drumless").ok_or(anyhow!("Failed to get project dirs"))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub engines: EngineConfig,
    pub processing: ProcessingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub uploads_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub database: PathBuf,
}

impl StorageConfig {
    pub fn under(root: &Path) -> Self {
        Self {
            uploads_dir: root.join("uploads"),
            processed_dir: root.join("processed"),
            scratch_dir: root.join("temp"),
            database: root.join("data").join("songs.db"),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        match project_dirs() {
            Ok(dirs) => Self::under(dirs.data_dir()),
            Err(_) => Self::under(Path::new(".")),
        }
    }
}

/// Program names of the external engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub separator: String,
    pub separator_model: String,
    pub mixer: String,
    pub extractor: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            separator: "spleeter".to_string(),
            separator_model: spleeter::DEFAULT_MODEL.to_string(),
            mixer: "ffmpeg".to_string(),
            extractor: "yt-dlp".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Required extension of uploads, also used for every stored artifact.
    pub audio_extension: String,
    #[serde(flatten)]
    pub stems: StemSet,
    #[serde(flatten)]
    pub encode: EncodeSettings,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            audio_extension: "mp3".to_string(),
            stems: StemSet::default(),
            encode: EncodeSettings::default(),
        }
    }
}

impl Config {
    pub fn default_path() -> anyhow::Result<PathBuf> {
        Ok(project_dirs()?.config_dir().join("config.toml"))
    }

    /// Reads `path`, or the default location when `path` is `None`.
    /// A missing default file yields the defaults; an explicit path must exist.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Config> {
        let config = match path {
            Some(path) => Self::read(path)?,
            None => {
                let path = Self::default_path()?;
                if path.exists() {
                    Self::read(&path)?
                } else {
                    Config::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Config> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> anyhow::Result<Config> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Failed to parse config {}", path.display()))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.processing.audio_extension.trim().is_empty() {
            bail!("processing.audio_extension must not be empty");
        }
        self.processing
            .stems
            .validate()
            .map_err(|e| anyhow!("invalid stem configuration: {e}"))?;
        Ok(())
    }
}
