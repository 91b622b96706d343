use crate::domain::{IngestJob, JobStatus, StorageStats, StoredRecord};
use crate::error::{DataForgeError, Result};
use crate::storage::Storage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// SQLite-backed storage. A single connection guarded by a mutex is plenty
/// for this service's write volume.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open (or create) the database at the given path and apply migrations.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        info!("Opening SQLite database at {}", path.display());
        let conn = Connection::open(path)?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.migrate()?;
        Ok(storage)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.migrate()?;
        Ok(storage)
    }

    fn migrate(&self) -> Result<()> {
        let migration_sql = include_str!("../migrations/001_create_records_and_jobs.sql");
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(migration_sql)?;
        debug!("Database migrations applied");
        Ok(())
    }
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| DataForgeError::Storage {
        message: format!("Invalid UUID in database: {e}"),
    })
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DataForgeError::Storage {
            message: format!("Invalid timestamp in database: {e}"),
        })
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<(String, String, bool, Option<String>, Option<String>, String)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn build_record(
    (id, data, is_valid, validation_errors, source_file, created_at): (
        String,
        String,
        bool,
        Option<String>,
        Option<String>,
        String,
    ),
) -> Result<StoredRecord> {
    Ok(StoredRecord {
        id: Some(parse_uuid(&id)?),
        values: serde_json::from_str(&data)?,
        is_valid,
        validation_errors,
        source_file,
        created_at: parse_timestamp(&created_at)?,
    })
}

type JobColumns = (
    String,
    String,
    String,
    i64,
    i64,
    i64,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
);

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<JobColumns> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
    ))
}

fn build_job(columns: JobColumns) -> Result<IngestJob> {
    let (id, filename, status, total, valid, invalid, error_message, started, completed, created) =
        columns;
    let status = JobStatus::parse(&status).ok_or_else(|| DataForgeError::Storage {
        message: format!("Unknown job status in database: {status}"),
    })?;
    Ok(IngestJob {
        id: Some(parse_uuid(&id)?),
        filename,
        status,
        total_rows: total as u64,
        valid_rows: valid as u64,
        invalid_rows: invalid as u64,
        error_message,
        started_at: started.as_deref().map(parse_timestamp).transpose()?,
        completed_at: completed.as_deref().map(parse_timestamp).transpose()?,
        created_at: parse_timestamp(&created)?,
    })
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create_record(&self, record: &mut StoredRecord) -> Result<()> {
        let id = Uuid::new_v4();
        record.id = Some(id);

        let data = serde_json::to_string(&record.values)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO records (id, data, is_valid, validation_errors, source_file, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id.to_string(),
                data,
                record.is_valid,
                record.validation_errors,
                record.source_file,
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn get_record(&self, id: Uuid) -> Result<Option<StoredRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, data, is_valid, validation_errors, source_file, created_at
             FROM records WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(build_record(record_from_row(row)?)?)),
            None => Ok(None),
        }
    }

    async fn list_records(
        &self,
        page: u64,
        page_size: u64,
        valid_only: bool,
    ) -> Result<(Vec<StoredRecord>, u64)> {
        // Saturate rather than overflow on caller-supplied page numbers, and
        // cap at i64::MAX so the OFFSET never goes negative through the cast.
        let offset = page
            .saturating_sub(1)
            .saturating_mul(page_size)
            .min(i64::MAX as u64);
        let conn = self.conn.lock().unwrap();

        let total: u64 = if valid_only {
            conn.query_row("SELECT COUNT(*) FROM records WHERE is_valid = 1", [], |r| {
                r.get(0)
            })?
        } else {
            conn.query_row("SELECT COUNT(*) FROM records", [], |r| r.get(0))?
        };

        let sql = if valid_only {
            "SELECT id, data, is_valid, validation_errors, source_file, created_at
             FROM records WHERE is_valid = 1
             ORDER BY created_at, id LIMIT ?1 OFFSET ?2"
        } else {
            "SELECT id, data, is_valid, validation_errors, source_file, created_at
             FROM records
             ORDER BY created_at, id LIMIT ?1 OFFSET ?2"
        };

        let limit = page_size.min(i64::MAX as u64);
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(params![limit as i64, offset as i64])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(build_record(record_from_row(row)?)?);
        }

        Ok((records, total))
    }

    async fn delete_record(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            "DELETE FROM records WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }

    async fn create_job(&self, job: &mut IngestJob) -> Result<()> {
        let id = Uuid::new_v4();
        job.id = Some(id);

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO ingest_jobs (id, filename, status, total_rows, valid_rows, invalid_rows,
                                      error_message, started_at, completed_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                id.to_string(),
                job.filename,
                job.status.as_str(),
                job.total_rows as i64,
                job.valid_rows as i64,
                job.invalid_rows as i64,
                job.error_message,
                job.started_at.map(|t| t.to_rfc3339()),
                job.completed_at.map(|t| t.to_rfc3339()),
                job.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn update_job(&self, job: &IngestJob) -> Result<()> {
        let job_id = job.id.ok_or_else(|| DataForgeError::Storage {
            message: "Cannot update job without ID".to_string(),
        })?;

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE ingest_jobs
             SET status = ?2, total_rows = ?3, valid_rows = ?4, invalid_rows = ?5,
                 error_message = ?6, started_at = ?7, completed_at = ?8
             WHERE id = ?1",
            params![
                job_id.to_string(),
                job.status.as_str(),
                job.total_rows as i64,
                job.valid_rows as i64,
                job.invalid_rows as i64,
                job.error_message,
                job.started_at.map(|t| t.to_rfc3339()),
                job.completed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<IngestJob>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, filename, status, total_rows, valid_rows, invalid_rows,
                    error_message, started_at, completed_at, created_at
             FROM ingest_jobs WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(build_job(job_from_row(row)?)?)),
            None => Ok(None),
        }
    }

    async fn list_jobs(&self, limit: u64) -> Result<Vec<IngestJob>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, filename, status, total_rows, valid_rows, invalid_rows,
                    error_message, started_at, completed_at, created_at
             FROM ingest_jobs ORDER BY created_at DESC, id DESC LIMIT ?1",
        )?;
        let mut rows = stmt.query(params![limit as i64])?;
        let mut jobs = Vec::new();
        while let Some(row) = rows.next()? {
            jobs.push(build_job(job_from_row(row)?)?);
        }
        Ok(jobs)
    }

    async fn stats(&self) -> Result<StorageStats> {
        let conn = self.conn.lock().unwrap();
        let total_records: u64 =
            conn.query_row("SELECT COUNT(*) FROM records", [], |r| r.get(0))?;
        let valid_records: u64 =
            conn.query_row("SELECT COUNT(*) FROM records WHERE is_valid = 1", [], |r| {
                r.get(0)
            })?;
        let total_jobs: u64 =
            conn.query_row("SELECT COUNT(*) FROM ingest_jobs", [], |r| r.get(0))?;
        let completed_jobs: u64 = conn.query_row(
            "SELECT COUNT(*) FROM ingest_jobs WHERE status = 'completed'",
            [],
            |r| r.get(0),
        )?;
        let failed_jobs: u64 = conn.query_row(
            "SELECT COUNT(*) FROM ingest_jobs WHERE status = 'failed'",
            [],
            |r| r.get(0),
        )?;

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
