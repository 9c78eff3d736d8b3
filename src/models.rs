use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use uuid::Uuid;

pub const MAX_NAME_LEN: usize = 100;
pub const FALLBACK_NAME: &str = "Untitled track";

/// A committed job: both artifacts exist on disk and the record is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(rename = "original")]
    pub original_path: PathBuf,
    #[serde(rename = "processed")]
    pub processed_path: PathBuf,
    pub created_at: DateTime<Utc>,
}

/// Where the audio for a job comes from.
pub enum JobSource {
    /// Bytes the caller already holds, with the filename it claimed.
    Upload {
        filename: String,
        body: Box<dyn AsyncRead + Send + Unpin>,
    },
    Remote { url: String },
}

impl JobSource {
    pub fn upload(filename: impl Into<String>, body: impl AsyncRead + Send + Unpin + 'static) -> Self {
        JobSource::Upload {
            filename: filename.into(),
            body: Box::new(body),
        }
    }

    pub fn remote(url: impl Into<String>) -> Self {
        JobSource::Remote { url: url.into() }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            JobSource::Upload { .. } => "upload",
            JobSource::Remote { .. } => "remote",
        }
    }
}

/// Strips path separators and bounds the length of a user-visible name.
pub fn sanitize_name(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| if c == '/' || c == '\\' { '-' } else { c })
        .take(MAX_NAME_LEN)
        .collect();
    cleaned.trim().to_string()
}

/// Display name for an uploaded file: its final component, extension removed.
pub fn name_from_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let stem = Path::new(base)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(base);
    let name = sanitize_name(stem);
    if name.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        name
    }
}
