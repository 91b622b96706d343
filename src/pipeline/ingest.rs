use crate::domain::{IngestJob, StoredRecord};
use crate::error::Result;
use crate::pipeline::process::{process, RawRow, ValidationError};
use crate::pipeline::rules::RuleSet;
use crate::storage::Storage;
use chrono::Utc;
use csv::ReaderBuilder;
use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Basic metadata about an ingested file.
#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub filename: String,
    pub size_bytes: u64,
    pub row_count: usize,
    pub column_count: usize,
}

/// Per-column summary used by the CLI's verbose output.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub empty_count: usize,
    pub sample_values: Vec<String>,
}

/// Summary of one ingestion run, returned to the CLI and the upload endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub job_id: Option<Uuid>,
    pub filename: String,
    pub total_rows: u64,
    pub valid_rows: u64,
    pub invalid_rows: u64,
    /// Every failed check across the file, in row order then rule order.
    pub errors: Vec<ValidationError>,
}

/// Read a CSV byte stream into RawRows, preserving header order.
///
/// Header parsing, delimiter/quoting handling and field trimming live here;
/// the row pipeline itself only ever sees decoded RawRows.
pub fn read_rows<R: Read>(reader: R) -> Result<(Vec<String>, Vec<RawRow>)> {
    let mut csv_reader = ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let headers: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    for (index, result) in csv_reader.records().enumerate() {
        let record = result?;
        let fields = headers
            .iter()
            .cloned()
            .zip(record.iter().map(str::to_string))
            .collect();
        rows.push(RawRow::new(index, fields));
    }

    Ok((headers, rows))
}

pub fn read_rows_from_path<P: AsRef<Path>>(path: P) -> Result<(Vec<String>, Vec<RawRow>)> {
    let file = File::open(path.as_ref())?;
    read_rows(file)
}

pub fn file_info<P: AsRef<Path>>(
    path: P,
    headers: &[String],
    rows: &[RawRow],
) -> Result<FileInfo> {
    let path = path.as_ref();
    let metadata = std::fs::metadata(path)?;
    Ok(FileInfo {
        filename: path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        size_bytes: metadata.len(),
        row_count: rows.len(),
        column_count: headers.len(),
    })
}

/// Summarize each column: how many values are empty, plus a few samples.
pub fn column_info(headers: &[String], rows: &[RawRow]) -> Vec<ColumnInfo> {
    headers
        .iter()
        .map(|name| {
            let mut empty_count = 0;
            let mut sample_values = Vec::new();
            for row in rows {
                match row.get(name) {
                    Some(value) if !value.is_empty() => {
                        if sample_values.len() < 3 {
                            sample_values.push(value.to_string());
                        }
                    }
                    _ => empty_count += 1,
                }
            }
            ColumnInfo {
                name: name.clone(),
                empty_count,
                sample_values,
            }
        })
        .collect()
}

/// Run every row through the pipeline and persist the outcomes.
///
/// Partial success by design: invalid rows are stored flagged with their
/// error messages rather than aborting the file, and the report carries the
/// complete error list for the caller to surface.
#[instrument(skip(reader, rules, storage))]
pub async fn ingest_reader<R: Read>(
    reader: R,
    filename: &str,
    rules: &RuleSet,
    storage: Arc<dyn Storage>,
) -> Result<IngestReport> {
    let mut job = IngestJob::started(filename);
    storage.create_job(&mut job).await?;

    match store_rows(reader, filename, rules, &storage).await {
        Ok((total, valid, invalid, errors)) => {
            job.complete(total, valid, invalid);
            storage.update_job(&job).await?;
            info!(
                "Ingested {} rows from {} ({} valid, {} invalid)",
                total, filename, valid, invalid
            );
            Ok(IngestReport {
                job_id: job.id,
                filename: filename.to_string(),
                total_rows: total,
                valid_rows: valid,
                invalid_rows: invalid,
                errors,
            })
        }
        Err(e) => {
            job.fail(e.to_string());
            storage.update_job(&job).await?;
            Err(e)
        }
    }
}

pub async fn ingest_file<P: AsRef<Path>>(
    path: P,
    rules: &RuleSet,
    storage: Arc<dyn Storage>,
) -> Result<IngestReport> {
    let path = path.as_ref();
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    let file = File::open(path)?;
    ingest_reader(file, &filename, rules, storage).await
}

async fn store_rows<R: Read>(
    reader: R,
    filename: &str,
    rules: &RuleSet,
    storage: &Arc<dyn Storage>,
) -> Result<(u64, u64, u64, Vec<ValidationError>)> {
    let (_headers, rows) = read_rows(reader)?;

    let mut valid = 0u64;
    let mut invalid = 0u64;
    let mut all_errors = Vec::new();

    for row in &rows {
        let mut record = match process(row, rules) {
            Ok(normalized) => {
                valid += 1;
                StoredRecord {
                    id: None,
                    values: normalized.to_json(),
                    is_valid: true,
                    validation_errors: None,
                    source_file: Some(filename.to_string()),
                    created_at: Utc::now(),
                }
            }
            Err(errors) => {
                invalid += 1;
                debug!("Row {} failed {} checks", row.index(), errors.len());
                let messages: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
                let record = StoredRecord {
                    id: None,
                    values: raw_values_json(row),
                    is_valid: false,
                    validation_errors: Some(messages.join("; ")),
                    source_file: Some(filename.to_string()),
                    created_at: Utc::now(),
                };
                all_errors.extend(errors);
                record
            }
        };
        storage.create_record(&mut record).await?;
    }

    Ok((rows.len() as u64, valid, invalid, all_errors))
}

fn raw_values_json(row: &RawRow) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = row
        .iter()
        .map(|(name, value)| (name.to_string(), serde_json::Value::String(value.to_string())))
        .collect();
    serde_json::Value::Object(map)
}
