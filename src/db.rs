//! Job record store.
//!
//! The pipeline only ever calls [`MetadataStore::save`]; the remaining
//! operations back the record management commands.

pub mod commands;
pub mod memory;

use std::path::Path;

use async_trait::async_trait;
use rusqlite::Connection;
use thiserror::Error;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::Job;

use commands::{do_delete, do_get, do_list, do_rename, do_save};

pub use memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("job {0} not found")]
    NotFound(Uuid),
    #[error("store error: {0}")]
    Backend(String),
    #[error("store is closed")]
    Closed,
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn save(&self, job: &Job) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Job, StoreError>;

    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;

    /// Last writer wins. Returns the record as stored after the update.
    async fn rename(&self, id: Uuid, name: &str) -> Result<Job, StoreError>;

    /// Every record, newest first.
    async fn list_all(&self) -> Result<Vec<Job>, StoreError>;
}

pub enum SQLiteCommand {
    Save {
        job: Job,
        reply: oneshot::Sender<Result<(), StoreError>>,
    },
    Get {
        id: Uuid,
        reply: oneshot::Sender<Result<Job, StoreError>>,
    },
    Delete {
        id: Uuid,
        reply: oneshot::Sender<Result<(), StoreError>>,
    },
    Rename {
        id: Uuid,
        name: String,
        reply: oneshot::Sender<Result<Job, StoreError>>,
    },
    ListAll {
        reply: oneshot::Sender<Result<Vec<Job>, StoreError>>,
    },
}

/// Owns the connection; serves commands until every sender is gone.
pub fn loop_db(mut conn: Connection, mut rx: Receiver<SQLiteCommand>) {
    while let Some(cmd) = rx.blocking_recv() {
        let delivered = match cmd {
            SQLiteCommand::Save { job, reply } => reply.send(do_save(&mut conn, &job)).is_ok(),
            SQLiteCommand::Get { id, reply } => reply.send(do_get(&mut conn, id)).is_ok(),
            SQLiteCommand::Delete { id, reply } => reply.send(do_delete(&mut conn, id)).is_ok(),
            SQLiteCommand::Rename { id, name, reply } => {
                reply.send(do_rename(&mut conn, id, &name)).is_ok()
            }
            SQLiteCommand::ListAll { reply } => reply.send(do_list(&mut conn)).is_ok(),
        };
        if !delivered {
            warn!("Failed to send reply to store command");
        }
    }
    debug!("Store loop exited");
}

pub fn init(path: &Path) -> Result<Connection, StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::Backend(e.to_string()))?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch(include_str!("./init.sql"))?;

    Ok(conn)
}

/// SQLite-backed store. Queries run on a dedicated thread that owns the
/// connection; this handle only passes messages.
#[derive(Clone)]
pub struct SqliteStore {
    tx: Sender<SQLiteCommand>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = init(path)?;
        let (tx, rx) = mpsc::channel(256);
        std::thread::spawn(move || loop_db(conn, rx));
        debug!(path = %path.display(), "Opened job store");
        Ok(Self { tx })
    }

    async fn request<T, F>(&self, make: F) -> Result<T, StoreError>
    where
        F: FnOnce(oneshot::Sender<Result<T, StoreError>>) -> SQLiteCommand + Send,
        T: Send,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| StoreError::Closed)?;
        reply_rx.await.map_err(|_| StoreError::Closed)?
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn save(&self, job: &Job) -> Result<(), StoreError> {
        let job = job.clone();
        self.request(|reply| SQLiteCommand::Save { job, reply }).await
    }

    async fn get(&self, id: Uuid) -> Result<Job, StoreError> {
        self.request(|reply| SQLiteCommand::Get { id, reply }).await
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.request(|reply| SQLiteCommand::Delete { id, reply }).await
    }

    async fn rename(&self, id: Uuid, name: &str) -> Result<Job, StoreError> {
        let name = name.to_string();
        self.request(|reply| SQLiteCommand::Rename { id, name, reply }).await
    }

    async fn list_all(&self) -> Result<Vec<Job>, StoreError> {
        self.request(|reply| SQLiteCommand::ListAll { reply }).await
    }
}
