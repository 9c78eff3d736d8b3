//! Turns a job source into exactly one local audio file.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use tokio::fs;
use tokio::io::AsyncRead;
use tracing::{info, warn};

use crate::engine::{AudioExtractor, CommandError, ExtractRequest, Sleeper};
use crate::error::{AcquisitionFailure, JobError};
use crate::models::{name_from_filename, sanitize_name, FALLBACK_NAME};
use crate::workspace::{self, Workspace};

pub const MAX_ATTEMPTS: u32 = 3;

/// Pause bounds handed to the extractor so it never hits the remote in a tight loop.
pub const PACING: (Duration, Duration) = (Duration::from_secs(1), Duration::from_secs(5));

const DOWNLOAD_DIR: &str = "download";
const DOWNLOAD_TEMPLATE: &str = "source.%(ext)s";

pub const USER_AGENTS: [&str; 8] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
];

const HEADERS: [(&str, &str); 6] = [
    ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"),
    ("Accept-Language", "en-US,en;q=0.5"),
    ("Accept-Encoding", "gzip, deflate, br"),
    ("DNT", "1"),
    ("Connection", "keep-alive"),
    ("Upgrade-Insecure-Requests", "1"),
];

/// The local file a job will process, plus the name it will be shown under.
#[derive(Debug, Clone, PartialEq)]
pub struct Acquired {
    pub path: PathBuf,
    pub display_name: String,
}

/// Pause before the attempt following `attempt`: `attempt²` seconds plus jitter.
pub fn backoff_delay(attempt: u32, jitter: Duration) -> Duration {
    Duration::from_secs(u64::from(attempt * attempt)) + jitter
}

fn random_jitter() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(0..1000))
}

fn random_identity() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

pub struct Resolver {
    extractor: Arc<dyn AudioExtractor>,
    sleeper: Arc<dyn Sleeper>,
    audio_extension: String,
}

impl Resolver {
    pub fn new(
        extractor: Arc<dyn AudioExtractor>,
        sleeper: Arc<dyn Sleeper>,
        audio_extension: impl Into<String>,
    ) -> Self {
        Self {
            extractor,
            sleeper,
            audio_extension: audio_extension.into(),
        }
    }

    pub fn audio_extension(&self) -> &str {
        &self.audio_extension
    }

    /// Rejects an upload whose claimed name lacks the audio extension.
    /// Never touches the filesystem.
    pub fn validate_upload(&self, filename: &str) -> Result<(), JobError> {
        let suffix = format!(".{}", self.audio_extension.to_lowercase());
        if filename.to_lowercase().ends_with(&suffix) {
            Ok(())
        } else {
            Err(JobError::Validation(format!(
                "Only {} files are supported",
                self.audio_extension.to_uppercase()
            )))
        }
    }

    /// Rejects a remote locator the extractor could mistake for one of its own options.
    pub fn validate_url(&self, url: &str) -> Result<(), JobError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(JobError::Validation("A URL is required".to_string()));
        }
        if url.starts_with('-') {
            return Err(JobError::Validation(format!("Not a URL: {url}")));
        }
        Ok(())
    }

    /// Writes an already validated upload into the workspace.
    pub async fn stage_upload<R>(
        &self,
        filename: &str,
        body: R,
        workspace: &Workspace,
    ) -> Result<Acquired, JobError>
    where
        R: AsyncRead + Unpin,
    {
        let path = workspace.join(format!("upload.{}", self.audio_extension));
        let written = workspace::write_durably(body, &path)
            .await
            .map_err(|e| JobError::acquisition(AcquisitionFailure::LocalStorage, e.to_string()))?;
        if written == 0 {
            workspace::discard(&path).await;
            return Err(JobError::Validation("Uploaded file is empty".to_string()));
        }
        info!(bytes = written, "Staged upload");

        Ok(Acquired {
            path,
            display_name: name_from_filename(filename),
        })
    }

    /// Downloads `url` into the workspace and looks up its title alongside.
    ///
    /// A failed title lookup only changes the display name. A failed
    /// download returns at once and drops a lookup still in flight.
    pub async fn fetch_remote(&self, url: &str, workspace: &Workspace) -> Result<Acquired, JobError> {
        self.validate_url(url)?;
        let dir = workspace.join(DOWNLOAD_DIR);

        let download = self.download(url, &dir);
        let title = self.lookup_title(url);
        tokio::pin!(download, title);

        let mut looked_up = None;
        let path = loop {
            tokio::select! {
                result = &mut download => break result?,
                name = &mut title, if looked_up.is_none() => looked_up = Some(name),
            }
        };
        let display_name = match looked_up {
            Some(name) => name,
            None => title.await,
        };

        Ok(Acquired { path, display_name })
    }

    async fn lookup_title(&self, url: &str) -> String {
        match self.extractor.fetch_title(url, random_identity()).await {
            Ok(title) => {
                let name = sanitize_name(&title);
                if name.is_empty() {
                    FALLBACK_NAME.to_string()
                } else {
                    name
                }
            }
            Err(e) => {
                warn!("Title lookup failed, using placeholder: {}", e);
                FALLBACK_NAME.to_string()
            }
        }
    }

    /// Bounded retry loop around the extractor. Leaves exactly one file in
    /// `dir` on success and an empty `dir` on failure.
    async fn download(&self, url: &str, dir: &Path) -> Result<PathBuf, JobError> {
        fs::create_dir_all(dir)
            .await
            .map_err(|e| JobError::acquisition(AcquisitionFailure::LocalStorage, e.to_string()))?;
        let template = dir.join(DOWNLOAD_TEMPLATE);
        let mut last_error: Option<CommandError> = None;

        for attempt in 1..=MAX_ATTEMPTS {
            info!(attempt, max = MAX_ATTEMPTS, url, "Download attempt");
            let request = ExtractRequest {
                url,
                output_template: &template,
                identity: random_identity(),
                headers: &HEADERS,
                pacing: PACING,
            };

            match self.extractor.extract_audio(&request).await {
                Ok(()) => {
                    info!(attempt, "Download succeeded");
                    return single_file(dir).await;
                }
                Err(e) => {
                    warn!(attempt, "Download attempt failed: {}", e);
                    last_error = Some(e);
                }
            }

            clear_dir(dir).await;
            if attempt < MAX_ATTEMPTS {
                let pause = backoff_delay(attempt, random_jitter());
                info!(?pause, "Waiting before retry");
                self.sleeper.sleep(pause).await;
            }
        }

        let raw = last_error.map(|e| e.to_string()).unwrap_or_default();
        let category = AcquisitionFailure::classify(&raw);
        warn!(%category, "All {} download attempts failed: {}", MAX_ATTEMPTS, raw);
        Err(JobError::acquisition(
            category,
            format!("all {MAX_ATTEMPTS} attempts failed, last error: {raw}"),
        ))
    }
}

/// The only file in `dir`. Zero or several files is an ambiguous result.
async fn single_file(dir: &Path) -> Result<PathBuf, JobError> {
    let files = list_files(dir)
        .await
        .map_err(|e| JobError::acquisition(AcquisitionFailure::LocalStorage, e.to_string()))?;

    match <[PathBuf; 1]>::try_from(files) {
        Ok([file]) => {
            let len = fs::metadata(&file)
                .await
                .map_err(|e| JobError::acquisition(AcquisitionFailure::LocalStorage, e.to_string()))?
                .len();
            if len == 0 {
                clear_dir(dir).await;
                return Err(JobError::acquisition(
                    AcquisitionFailure::Ambiguous,
                    "downloaded file is empty",
                ));
            }
            Ok(file)
        }
        Err(files) => {
            clear_dir(dir).await;
            Err(JobError::acquisition(
                AcquisitionFailure::Ambiguous,
                format!("expected one downloaded file, found {}", files.len()),
            ))
        }
    }
}

async fn list_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    Ok(files)
}

/// Drops leftovers (`.part` files, stray fragments) from a failed attempt.
async fn clear_dir(dir: &Path) {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(_) => return,
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let result = match entry.file_type().await {
            Ok(t) if t.is_dir() => fs::remove_dir_all(&path).await,
            _ => fs::remove_file(&path).await,
        };
        if let Err(e) = result {
            warn!(path = %path.display(), "Failed to clear download leftover: {}", e);
        }
    }
}
