use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persisted row outcome. Valid rows carry their normalized values; invalid
/// rows carry the raw values plus the joined validation error messages, so an
/// upload reports partial success instead of aborting on the first bad row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: Option<Uuid>,
    /// Column name -> value, as JSON. Dates serialize as "YYYY-MM-DD" strings,
    /// amounts as numbers, everything else as strings.
    pub values: serde_json::Value,
    pub is_valid: bool,
    pub validation_errors: Option<String>,
    pub source_file: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle states of an ingest job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// Tracks one ingestion run of a single file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestJob {
    pub id: Option<Uuid>,
    pub filename: String,
    pub status: JobStatus,
    pub total_rows: u64,
    pub valid_rows: u64,
    pub invalid_rows: u64,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl IngestJob {
    /// Create a job in the `processing` state for a freshly uploaded file.
    pub fn started(filename: &str) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            filename: filename.to_string(),
            status: JobStatus::Processing,
            total_rows: 0,
            valid_rows: 0,
            invalid_rows: 0,
            error_message: None,
            started_at: Some(now),
            completed_at: None,
            created_at: now,
        }
    }

    pub fn complete(&mut self, total: u64, valid: u64, invalid: u64) {
        self.status = JobStatus::Completed;
        self.total_rows = total;
        self.valid_rows = valid;
        self.invalid_rows = invalid;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, message: String) {
        self.status = JobStatus::Failed;
        self.error_message = Some(message);
        self.completed_at = Some(Utc::now());
    }
}

/// Aggregate counts across records and jobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageStats {
    pub total_records: u64,
    pub valid_records: u64,
    pub invalid_records: u64,
    pub total_jobs: u64,
    pub completed_jobs: u64,
    pub failed_jobs: u64,
}
