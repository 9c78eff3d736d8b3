pub mod acquire;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod library;
pub mod models;
pub mod pipeline;
pub mod stems;
pub mod telemetry;
pub mod workspace;

use std::sync::Arc;

use crate::acquire::Resolver;
use crate::config::Config;
use crate::db::MetadataStore;
use crate::engine::{FfmpegMixer, SpleeterSeparator, TokioSleeper, YtDlpExtractor};
use crate::error::JobError;
use crate::pipeline::{Layout, Pipeline};
use crate::stems::StemStage;
use crate::workspace::Workspaces;

/// Wires the process-backed engines from `config` into a pipeline.
pub fn build_pipeline(config: &Config, store: Arc<dyn MetadataStore>) -> Result<Pipeline, JobError> {
    let engines = &config.engines;
    let processing = &config.processing;

    let resolver = Resolver::new(
        Arc::new(YtDlpExtractor::new(&engines.extractor, &processing.audio_extension)),
        Arc::new(TokioSleeper),
        &processing.audio_extension,
    );
    let stage = StemStage::new(
        Arc::new(SpleeterSeparator::new(&engines.separator, &engines.separator_model)),
        Arc::new(FfmpegMixer::new(&engines.mixer, processing.encode.clone())),
        processing.stems.clone(),
    )?;
    let layout = Layout {
        uploads_dir: config.storage.uploads_dir.clone(),
        processed_dir: config.storage.processed_dir.clone(),
    };

    Ok(Pipeline::new(
        resolver,
        stage,
        Workspaces::new(&config.storage.scratch_dir),
        layout,
        store,
    ))
}
