//! Append-only outcome ledger
//!
//! One JSON object per line. Records are only ever appended, so running
//! twice against the same file leaves the union of both runs. Each append is
//! synced before `record` returns: an outcome the caller was told about is
//! on disk.

use chrono::{DateTime, Utc};
use outreach_core::{InteractionOutcome, OutcomeStatus, OutreachError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// One ledger line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    /// Run that produced the record
    pub run_id: String,
    pub url: String,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Present for sends only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed: Option<bool>,
}

impl LedgerRecord {
    pub fn from_outcome(run_id: &str, outcome: &InteractionOutcome) -> Self {
        Self {
            run_id: run_id.to_string(),
            url: outcome.target_url.clone(),
            name: outcome.target_name.clone(),
            timestamp: outcome.timestamp,
            status: outcome.status,
            error: outcome.error_text(),
            confirmed: outcome.confirmed,
        }
    }
}

/// Fresh identifier for a run, e.g. `run-1a2b3c4d`
pub fn new_run_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("run-{}", &id[..8])
}

/// Durable per-target record shared across runs
#[derive(Debug, Clone)]
pub struct OutcomeLedger {
    path: PathBuf,
    run_id: String,
}

impl OutcomeLedger {
    /// Open (creating if needed) the ledger at `path` for a new run
    pub async fn open(path: impl Into<PathBuf>, run_id: impl Into<String>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    OutreachError::Ledger(format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
        }

        // Fail now rather than after the first send
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| OutreachError::Ledger(format!("cannot open {}: {}", path.display(), e)))?;

        Ok(Self {
            path,
            run_id: run_id.into(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Append one outcome and sync it to disk
    pub async fn record(&self, outcome: &InteractionOutcome) -> Result<()> {
        let record = LedgerRecord::from_outcome(&self.run_id, outcome);
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.write_error(e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| self.write_error(e))?;
        file.sync_data().await.map_err(|e| self.write_error(e))?;

        debug!("Recorded {} for {} in {:?}", record.status, record.url, self.path);
        Ok(())
    }

    /// Every record from every run, oldest first
    pub async fn load_all(&self) -> Result<Vec<LedgerRecord>> {
        load_records(&self.path).await
    }

    /// Urls with at least one `Sent` record
    pub async fn sent_urls(&self) -> Result<HashSet<String>> {
        Ok(self
            .load_all()
            .await?
            .into_iter()
            .filter(|r| r.status == OutcomeStatus::Sent)
            .map(|r| r.url)
            .collect())
    }

    fn write_error(&self, e: std::io::Error) -> OutreachError {
        OutreachError::Ledger(format!("cannot append to {}: {}", self.path.display(), e))
    }
}

/// Read a ledger file without opening it for a run
pub async fn load_records(path: &Path) -> Result<Vec<LedgerRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path)
        .await
        .map_err(|e| OutreachError::Ledger(format!("cannot read {}: {}", path.display(), e)))?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| {
            serde_json::from_str(line).map_err(|e| {
                OutreachError::Ledger(format!(
                    "{} line {} is malformed: {}",
                    path.display(),
                    number + 1,
                    e
                ))
            })
        })
        .collect()
}
