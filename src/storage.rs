use crate::domain::{IngestJob, JobStatus, StorageStats, StoredRecord};
use crate::error::{DataForgeError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

/// Storage trait for persisting records and ingest jobs
#[async_trait]
pub trait Storage: Send + Sync {
    // Record operations
    async fn create_record(&self, record: &mut StoredRecord) -> Result<()>;
    async fn get_record(&self, id: Uuid) -> Result<Option<StoredRecord>>;
    /// Page is 1-based. Returns the page of records plus the total count
    /// matching the filter.
    async fn list_records(
        &self,
        page: u64,
        page_size: u64,
        valid_only: bool,
    ) -> Result<(Vec<StoredRecord>, u64)>;
    async fn delete_record(&self, id: Uuid) -> Result<bool>;

    // Job operations
    async fn create_job(&self, job: &mut IngestJob) -> Result<()>;
    async fn update_job(&self, job: &IngestJob) -> Result<()>;
    async fn get_job(&self, id: Uuid) -> Result<Option<IngestJob>>;
    /// Most recent jobs first.
    async fn list_jobs(&self, limit: u64) -> Result<Vec<IngestJob>>;

    // Aggregates
    async fn stats(&self) -> Result<StorageStats>;
}

/// In-memory storage implementation for development/testing
pub struct InMemoryStorage {
    records: Arc<Mutex<HashMap<Uuid, StoredRecord>>>,
    jobs: Arc<Mutex<HashMap<Uuid, IngestJob>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn create_record(&self, record: &mut StoredRecord) -> Result<()> {
        let id = Uuid::new_v4();
        record.id = Some(id);

        let mut records = self.records.lock().unwrap();
        records.insert(id, record.clone());

        debug!("Created record with id {}", id);
        Ok(())
    }

    async fn get_record(&self, id: Uuid) -> Result<Option<StoredRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records.get(&id).cloned())
    }

    async fn list_records(
        &self,
        page: u64,
        page_size: u64,
        valid_only: bool,
    ) -> Result<(Vec<StoredRecord>, u64)> {
        let records = self.records.lock().unwrap();
        let mut filtered: Vec<StoredRecord> = records
            .values()
            .filter(|r| !valid_only || r.is_valid)
            .cloned()
            .collect();

        // Stable ordering: oldest first, id as tiebreaker
        filtered.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));

        let total = filtered.len() as u64;
        // Page and page_size come straight from the query string; keep the
        // arithmetic saturating so an absurd page yields an empty page.
        let offset = page.saturating_sub(1).saturating_mul(page_size) as usize;
        let page_records: Vec<StoredRecord> = filtered
            .into_iter()
            .skip(offset)
            .take(page_size as usize)
            .collect();

        Ok((page_records, total))
    }

    async fn delete_record(&self, id: Uuid) -> Result<bool> {
        let mut records = self.records.lock().unwrap();
        let removed = records.remove(&id).is_some();
        if removed {
            debug!("Deleted record {}", id);
        }
        Ok(removed)
    }

    async fn create_job(&self, job: &mut IngestJob) -> Result<()> {
        let id = Uuid::new_v4();
        job.id = Some(id);

        let mut jobs = self.jobs.lock().unwrap();
        jobs.insert(id, job.clone());

        debug!("Created ingest job {} for {}", id, job.filename);
        Ok(())
    }

    async fn update_job(&self, job: &IngestJob) -> Result<()> {
        let job_id = job.id.ok_or_else(|| DataForgeError::Storage {
            message: "Cannot update job without ID".to_string(),
        })?;

        let mut jobs = self.jobs.lock().unwrap();
        jobs.insert(job_id, job.clone());

        debug!("Updated ingest job {}", job_id);
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<IngestJob>> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs.get(&id).cloned())
    }

    async fn list_jobs(&self, limit: u64) -> Result<Vec<IngestJob>> {
        let jobs = self.jobs.lock().unwrap();
        let mut all: Vec<IngestJob> = jobs.values().cloned().collect();
        all.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        all.truncate(limit as usize);
        Ok(all)
    }

    async fn stats(&self) -> Result<StorageStats> {
        let records = self.records.lock().unwrap();
        let jobs = self.jobs.lock().unwrap();

        let total_records = records.len() as u64;
        let valid_records = records.values().filter(|r| r.is_valid).count() as u64;
        let total_jobs = jobs.len() as u64;
        let completed_jobs = jobs
            .values()
            .filter(|j| j.status == JobStatus::Completed)
            .count() as u64;
        let failed_jobs = jobs
            .values()
            .filter(|j| j.status == JobStatus::Failed)
            .count() as u64;

        Ok(StorageStats {
            total_records,
            valid_records,
            invalid_records: total_records - valid_records,
            total_jobs,
            completed_jobs,
            failed_jobs,
        })
    }
}
