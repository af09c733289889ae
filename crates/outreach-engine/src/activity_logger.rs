//! Human-readable run log
//!
//! Appends a markdown section per run: start, one line per target, and the
//! final summary or fatal reason. Every write is fail-open; the ledger, not
//! this file, is the record of what happened.

use chrono::Utc;
use outreach_core::fail_open::fail_open;
use outreach_core::{FatalReason, InteractionOutcome, OutcomeStatus, Result, RunSummary};
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

/// Activity logger for outreach runs
#[derive(Debug, Clone)]
pub struct ActivityLogger {
    output_path: PathBuf,
}

impl ActivityLogger {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
        }
    }

    /// Log the start of a run
    pub async fn log_run_start(&self, run_id: &str, max_messages: usize) {
        fail_open("activity_logger::log_run_start", || async {
            let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
            let content = format!(
                "## Run {}\n**Started**: {}\n**Send cap**: {}\n\n",
                run_id, timestamp, max_messages
            );
            self.append(&content).await
        })
        .await;
    }

    /// Log one target's outcome
    pub async fn log_outcome(&self, outcome: &InteractionOutcome) {
        fail_open("activity_logger::log_outcome", || async {
            let time = outcome.timestamp.format("%H:%M:%S");
            let who = if outcome.target_name.is_empty() {
                outcome.target_url.clone()
            } else {
                format!("{} ({})", outcome.target_name, outcome.target_url)
            };

            let line = match outcome.status {
                OutcomeStatus::Sent if outcome.is_unconfirmed() => {
                    format!("- {} SENT (unconfirmed) {}\n", time, who)
                }
                OutcomeStatus::Sent => format!("- {} SENT {}\n", time, who),
                _ => format!(
                    "- {} {} {}: {}\n",
                    time,
                    outcome.status.to_string().to_uppercase(),
                    who,
                    outcome.error_text().unwrap_or_default()
                ),
            };
            self.append(&line).await
        })
        .await;
    }

    /// Log the reason a run was aborted
    pub async fn log_fatal(&self, reason: &FatalReason, summary: &RunSummary) {
        fail_open("activity_logger::log_fatal", || async {
            let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
            let content = format!(
                "\n**ABORTED** at {}: {}\n**Before abort**: {}\n\n---\n\n",
                timestamp, reason, summary
            );
            self.append(&content).await
        })
        .await;
    }

    /// Log the end of a run that processed its queue or hit its cap
    pub async fn log_run_complete(&self, summary: &RunSummary, stop_reason: &str, ledger: &Path) {
        fail_open("activity_logger::log_run_complete", || async {
            let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
            let content = format!(
                "\n**Completed**: {}\n**Result**: {}\n**Stop reason**: {}\n**Ledger**: {}\n\n---\n\n",
                timestamp,
                summary,
                stop_reason,
                ledger.display()
            );
            self.append(&content).await
        })
        .await;
    }

    async fn append(&self, content: &str) -> Result<()> {
        if let Some(parent) = self.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.output_path)
            .await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
