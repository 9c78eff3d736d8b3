#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use uuid::Uuid;

use drumless::acquire::Resolver;
use drumless::db::{MemoryStore, MetadataStore, StoreError};
use drumless::engine::{AudioExtractor, CommandError, ExtractRequest, Mixer, Separator, Sleeper};
use drumless::models::Job;
use drumless::pipeline::{Layout, Pipeline};
use drumless::stems::{StemSet, StemStage};
use drumless::workspace::Workspaces;

fn failed(program: &str, output: &str) -> CommandError {
    CommandError::Failed {
        program: program.to_string(),
        code: Some(1),
        output: output.to_string(),
    }
}

#[derive(Default)]
pub struct RecordingSleeper {
    pub pauses: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.pauses.lock().unwrap().push(duration);
    }
}

pub struct FakeExtractor {
    pub failures: u32,
    pub title: Option<String>,
    pub attempts: AtomicU32,
}

impl FakeExtractor {
    pub fn new(failures: u32, title: Option<&str>) -> Self {
        Self {
            failures,
            title: title.map(str::to_string),
            attempts: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl AudioExtractor for FakeExtractor {
    async fn extract_audio(&self, request: &ExtractRequest<'_>) -> Result<(), CommandError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let dir = request.output_template.parent().unwrap();
        if attempt <= self.failures {
            std::fs::write(dir.join("source.mp3.part"), b"half").unwrap();
            return Err(failed("yt-dlp", "ERROR: HTTP Error 404: Not Found"));
        }
        std::fs::write(dir.join("source.mp3"), b"remote audio").unwrap();
        Ok(())
    }

    async fn fetch_title(&self, _url: &str, _identity: &str) -> Result<String, CommandError> {
        self.title
            .clone()
            .ok_or_else(|| failed("yt-dlp", "ERROR: Sign in to confirm your age"))
    }
}

/// Writes `<output_dir>/<input stem>/<stem>.wav` for each configured stem.
pub struct FakeSeparator {
    pub stems: Vec<String>,
    pub fail: bool,
    pub silent: bool,
}

impl FakeSeparator {
    pub fn writing(stems: &[&str]) -> Self {
        Self {
            stems: stems.iter().map(|s| s.to_string()).collect(),
            fail: false,
            silent: false,
        }
    }

    /// Writes every stem file, but with no audio in it.
    pub fn silent(stems: &[&str]) -> Self {
        Self {
            silent: true,
            ..Self::writing(stems)
        }
    }

    pub fn failing() -> Self {
        Self {
            stems: Vec::new(),
            fail: true,
            silent: false,
        }
    }
}

#[async_trait]
impl Separator for FakeSeparator {
    async fn separate(&self, input: &Path, output_dir: &Path) -> Result<(), CommandError> {
        if self.fail {
            return Err(failed("spleeter", "Segmentation fault"));
        }
        let dir = output_dir.join(input.file_stem().unwrap());
        std::fs::create_dir_all(&dir).unwrap();
        for stem in &self.stems {
            let contents = if self.silent { &[][..] } else { stem.as_bytes() };
            std::fs::write(dir.join(format!("{stem}.wav")), contents).unwrap();
        }
        Ok(())
    }
}

/// Concatenates its inputs into the output; fails when an input is missing.
#[derive(Default)]
pub struct RecordingMixer {
    pub calls: Mutex<Vec<Vec<PathBuf>>>,
}

#[async_trait]
impl Mixer for RecordingMixer {
    async fn mix(&self, inputs: &[PathBuf], _filter_graph: &str, output: &Path) -> Result<(), CommandError> {
        self.calls.lock().unwrap().push(inputs.to_vec());
        let mut data = Vec::new();
        for input in inputs {
            let bytes = std::fs::read(input)
                .map_err(|e| failed("ffmpeg", &format!("{}: {e}", input.display())))?;
            data.extend(bytes);
        }
        std::fs::write(output, data).unwrap();
        Ok(())
    }
}

/// Accepts reads but refuses every save.
#[derive(Default)]
pub struct FailingStore {
    inner: MemoryStore,
}

#[async_trait]
impl MetadataStore for FailingStore {
    async fn save(&self, _job: &Job) -> Result<(), StoreError> {
        Err(StoreError::Backend("database is locked".to_string()))
    }

    async fn get(&self, id: Uuid) -> Result<Job, StoreError> {
        self.inner.get(id).await
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.delete(id).await
    }

    async fn rename(&self, id: Uuid, name: &str) -> Result<Job, StoreError> {
        self.inner.rename(id, name).await
    }

    async fn list_all(&self) -> Result<Vec<Job>, StoreError> {
        self.inner.list_all().await
    }
}

pub struct Harness {
    pub tmp: TempDir,
    pub sleeper: Arc<RecordingSleeper>,
    pub extractor: Arc<FakeExtractor>,
    pub mixer: Arc<RecordingMixer>,
    pub store: Arc<dyn MetadataStore>,
    pub pipeline: Pipeline,
}

impl Harness {
    pub fn new(
        extractor: FakeExtractor,
        separator: FakeSeparator,
        stems: StemSet,
        store: Arc<dyn MetadataStore>,
    ) -> Self {
        let tmp = TempDir::new().unwrap();
        let sleeper = Arc::new(RecordingSleeper::default());
        let extractor = Arc::new(extractor);
        let mixer = Arc::new(RecordingMixer::default());

        let resolver = Resolver::new(extractor.clone(), sleeper.clone(), "mp3");
        let stage = StemStage::new(Arc::new(separator), mixer.clone(), stems).unwrap();
        let layout = Layout {
            uploads_dir: tmp.path().join("uploads"),
            processed_dir: tmp.path().join("processed"),
        };
        let pipeline = Pipeline::new(
            resolver,
            stage,
            Workspaces::new(tmp.path().join("temp")),
            layout,
            store.clone(),
        );

        Self {
            tmp,
            sleeper,
            extractor,
            mixer,
            store,
            pipeline,
        }
    }

    pub fn scratch(&self) -> PathBuf {
        self.tmp.path().join("temp")
    }

    pub fn uploads(&self) -> PathBuf {
        self.tmp.path().join("uploads")
    }

    pub fn processed(&self) -> PathBuf {
        self.tmp.path().join("processed")
    }
}

/// Regular files anywhere under `dir`; a missing dir counts as empty.
pub fn count_files(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .map(|e| e.unwrap().path())
        .map(|p| if p.is_dir() { count_files(&p) } else { 1 })
        .sum()
}

pub fn entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

pub fn four_stems() -> StemSet {
    StemSet {
        stems: ["vocals", "drums", "bass", "other"].map(String::from).to_vec(),
        ..StemSet::default()
    }
}
