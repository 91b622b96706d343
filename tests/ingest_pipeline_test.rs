use anyhow::Result;
use std::io::Write;
use std::sync::Arc;

use dataforge::config::RuleConfig;
use dataforge::db::SqliteStorage;
use dataforge::pipeline::ingest::ingest_file;
use dataforge::pipeline::RuleSet;
use dataforge::storage::Storage;

fn default_rules() -> RuleSet {
    let configs = vec![
        RuleConfig {
            column: "email".to_string(),
            kind: "email".to_string(),
            format: None,
        },
        RuleConfig {
            column: "amount".to_string(),
            kind: "amount".to_string(),
            format: None,
        },
        RuleConfig {
            column: "date".to_string(),
            kind: "date".to_string(),
            format: Some("%Y-%m-%d".to_string()),
        },
    ];
    RuleSet::compile(&configs).unwrap()
}

#[tokio::test]
async fn test_csv_file_ingested_end_to_end() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let csv_path = dir.path().join("customers.csv");
    let mut file = std::fs::File::create(&csv_path)?;
    writeln!(file, "name,email,amount,date")?;
    writeln!(file, "Ada,ada@example.com,10.00,2024-01-15")?;
    writeln!(file, "Bob,bob-at-example,20.00,2024-01-16")?;
    writeln!(file, "Cleo,cleo@example.org,not-a-number,2024-02-30")?;
    drop(file);

    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::open_in_memory()?);
    let rules = default_rules();

    let report = ingest_file(&csv_path, &rules, storage.clone()).await?;

    assert_eq!(report.filename, "customers.csv");
    assert_eq!(report.total_rows, 3);
    assert_eq!(report.valid_rows, 1);
    assert_eq!(report.invalid_rows, 2);
    // Bob fails email; Cleo fails amount and date.
    assert_eq!(report.errors.len(), 3);

    // All rows are stored; only Ada's is valid.
    let (records, total) = storage.list_records(1, 50, false).await?;
    assert_eq!(total, 3);
    let valid: Vec<_> = records.iter().filter(|r| r.is_valid).collect();
    assert_eq!(valid.len(), 1);
    assert_eq!(valid[0].values["email"], "ada@example.com");
    assert_eq!(valid[0].values["amount"], 10.0);
    assert_eq!(valid[0].values["date"], "2024-01-15");
    // Unruled columns pass through untouched.
    assert_eq!(valid[0].values["name"], "Ada");

    // Invalid rows keep their raw values and the joined error messages.
    let invalid: Vec<_> = records.iter().filter(|r| !r.is_valid).collect();
    assert_eq!(invalid.len(), 2);
    assert!(invalid.iter().all(|r| r.validation_errors.is_some()));

    // The job reflects the run.
    let job = storage.get_job(report.job_id.unwrap()).await?.unwrap();
    assert_eq!(job.total_rows, 3);
    assert_eq!(job.valid_rows, 1);
    assert_eq!(job.invalid_rows, 2);

    Ok(())
}

#[tokio::test]
async fn test_reingest_is_reported_per_run() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let csv_path = dir.path().join("orders.csv");
    std::fs::write(&csv_path, "amount\n1.50\n2.50\n")?;

    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::open_in_memory()?);
    let rules = RuleSet::compile(&[RuleConfig {
        column: "amount".to_string(),
        kind: "amount".to_string(),
        format: None,
    }])
    .unwrap();

    let first = ingest_file(&csv_path, &rules, storage.clone()).await?;
    let second = ingest_file(&csv_path, &rules, storage.clone()).await?;

    // Each run is its own job with identical per-run counts.
    assert_ne!(first.job_id, second.job_id);
    assert_eq!(first.valid_rows, second.valid_rows);

    let stats = storage.stats().await?;
    assert_eq!(stats.total_records, 4);
    assert_eq!(stats.total_jobs, 2);

    Ok(())
}
