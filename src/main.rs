use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use drumless::config::Config;
use drumless::db::SqliteStore;
use drumless::library::{Library, Variant};
use drumless::models::JobSource;
use drumless::workspace::Workspaces;
use drumless::{build_pipeline, telemetry};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file, defaults to the per-user config location
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Job record database, overrides the config file
    #[arg(long, global = true, env = "DB_PATH")]
    database: Option<PathBuf>,
    #[arg(short, long, global = true, default_value = "false")]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Process a local audio file
    Upload { file: PathBuf },
    /// Download a remote track and process it
    Fetch { url: String },
    /// List processed tracks, newest first
    List {},
    Show { id: Uuid },
    Rename { id: Uuid, name: String },
    /// Delete a track's record and both of its files
    Delete { id: Uuid },
    /// Copy a track's processed (or original) file into a directory
    Export {
        id: Uuid,
        #[arg(default_value = ".")]
        dest: PathBuf,
        #[arg(long, default_value = "false")]
        original: bool,
    },
    /// Remove leftovers from the scratch directory
    Sweep {},
    Version {},
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.verbose);

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.storage.database = database;
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run(cli.command, config))
}

async fn run(command: Commands, config: Config) -> Result<()> {
    match command {
        Commands::Version {} => print_json(&serde_json::json!({
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        })),
        Commands::Sweep {} => {
            Workspaces::new(&config.storage.scratch_dir).sweep().await?;
            Ok(())
        }
        Commands::Upload { file } => {
            let filename = file
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or(anyhow!("Not a file: {}", file.display()))?
                .to_string();
            let body = tokio::fs::File::open(&file)
                .await
                .with_context(|| format!("Failed to open {}", file.display()))?;
            process(&config, JobSource::upload(filename, body)).await
        }
        Commands::Fetch { url } => process(&config, JobSource::remote(url)).await,
        command => manage(command, &config).await,
    }
}

async fn process(config: &Config, source: JobSource) -> Result<()> {
    prepare_dirs(config).await?;
    Workspaces::new(&config.storage.scratch_dir).sweep().await?;

    let store = Arc::new(SqliteStore::open(&config.storage.database)?);
    let pipeline = build_pipeline(config, store).map_err(|e| anyhow!(e.user_message()))?;

    match pipeline.run(source).await {
        Ok(job) => {
            info!(id = %job.id, "Done");
            print_json(&job)
        }
        Err(e) => Err(anyhow!(e.user_message())),
    }
}

async fn manage(command: Commands, config: &Config) -> Result<()> {
    let store = Arc::new(SqliteStore::open(&config.storage.database)?);
    let library = Library::new(store, config.processing.stems.excluded.clone());

    match command {
        Commands::List {} => print_json(&library.list().await?),
        Commands::Show { id } => print_json(&library.show(id).await?),
        Commands::Rename { id, name } => print_json(&library.rename(id, &name).await?),
        Commands::Delete { id } => {
            library.delete(id).await?;
            print_json(&serde_json::json!({ "message": "Song deleted successfully" }))
        }
        Commands::Export { id, dest, original } => {
            let variant = if original { Variant::Original } else { Variant::Processed };
            let path = library.export(id, variant, &dest).await?;
            println!("{}", path.display());
            Ok(())
        }
        other => Err(anyhow!("Unexpected command {:?}", other)),
    }
}

async fn prepare_dirs(config: &Config) -> Result<()> {
    let storage = &config.storage;
    for dir in [&storage.uploads_dir, &storage.processed_dir, &storage.scratch_dir] {
        create_dir(dir).await?;
    }
    Ok(())
}

async fn create_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
