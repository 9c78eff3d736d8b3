use std::path::PathBuf;

use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::StoreError;
use crate::models::Job;

const COLUMNS: &str = "id, name, original_path, processed_path, created_at";

impl Job {
    pub fn from_row(r: &Row) -> Result<Self, rusqlite::Error> {
        let id: String = r.get(0)?;
        Ok(Self {
            id: Uuid::parse_str(&id)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?,
            display_name: r.get(1)?,
            original_path: PathBuf::from(r.get::<_, String>(2)?),
            processed_path: PathBuf::from(r.get::<_, String>(3)?),
            created_at: r.get(4)?,
        })
    }
}

fn path_str(path: &std::path::Path) -> Result<&str, StoreError> {
    path.to_str()
        .ok_or_else(|| StoreError::Backend(format!("path is not valid UTF-8: {}", path.display())))
}

pub fn do_save(conn: &mut Connection, job: &Job) -> Result<(), StoreError> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO songs (id, name, original_path, processed_path, created_at) VALUES (?, ?, ?, ?, ?)",
    )?;
    stmt.execute(params![
        job.id.to_string(),
        job.display_name,
        path_str(&job.original_path)?,
        path_str(&job.processed_path)?,
        job.created_at,
    ])?;
    Ok(())
}

pub fn do_get(conn: &mut Connection, id: Uuid) -> Result<Job, StoreError> {
    let mut stmt = conn.prepare_cached(&format!("SELECT {COLUMNS} FROM songs WHERE id = ?"))?;
    stmt.query_row([id.to_string()], Job::from_row)
        .optional()?
        .ok_or(StoreError::NotFound(id))
}

pub fn do_list(conn: &mut Connection) -> Result<Vec<Job>, StoreError> {
    let mut stmt = conn.prepare_cached(&format!("SELECT {COLUMNS} FROM songs ORDER BY created_at DESC"))?;
    let jobs = stmt
        .query_map([], Job::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(jobs)
}

pub fn do_delete(conn: &mut Connection, id: Uuid) -> Result<(), StoreError> {
    let mut stmt = conn.prepare_cached("DELETE FROM songs WHERE id = ?")?;
    match stmt.execute([id.to_string()])? {
        0 => Err(StoreError::NotFound(id)),
        _ => Ok(()),
    }
}

/// Updates and re-reads inside one transaction, so the returned record is
/// what the store holds, not a locally patched copy.
pub fn do_rename(conn: &mut Connection, id: Uuid, name: &str) -> Result<Job, StoreError> {
    let tx = conn.transaction()?;
    let updated = tx.execute("UPDATE songs SET name = ? WHERE id = ?", params![name, id.to_string()])?;
    if updated == 0 {
        return Err(StoreError::NotFound(id));
    }
    let job = tx.query_row(
        &format!("SELECT {COLUMNS} FROM songs WHERE id = ?"),
        [id.to_string()],
        Job::from_row,
    )?;
    tx.commit()?;
    Ok(job)
}
