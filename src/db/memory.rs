use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use super::{MetadataStore, StoreError};
use crate::models::Job;

/// Process-local store, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    jobs: Mutex<HashMap<Uuid, Job>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn jobs(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, Job>>, StoreError> {
        self.jobs
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn save(&self, job: &Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs()?;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::Backend(format!("duplicate id {}", job.id)));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Job, StoreError> {
        self.jobs()?.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.jobs()?
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }

    async fn rename(&self, id: Uuid, name: &str) -> Result<Job, StoreError> {
        let mut jobs = self.jobs()?;
        let job = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        job.display_name = name.to_string();
        Ok(job.clone())
    }

    async fn list_all(&self) -> Result<Vec<Job>, StoreError> {
        let mut all: Vec<Job> = self.jobs()?.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }
}
