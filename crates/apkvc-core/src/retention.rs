//! Retention sweeper
//!
//! Deletes artifacts whose `created_at` is older than the retention window.
//! One bad record never stops a sweep; only a missing storage root does.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Months, Utc};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use apkvc_schema::ArtifactRecord;

use crate::catalog::{Catalog, CatalogError};
use crate::config::{MAX_SWEEP_INTERVAL_SECS, RetentionConfig};

#[derive(Error, Debug)]
pub enum RetentionError {
    #[error("Storage root {} does not exist", .0.display())]
    StorageRootMissing(PathBuf),

    #[error("Could not enumerate artifacts: {0}")]
    Catalog(#[from] CatalogError),
}

/// Failure to purge one artifact.
#[derive(Error, Debug)]
#[error("artifact {id} ({stored_file_name}): {reason}")]
pub struct RetentionSweepItemError {
    pub id: i64,
    pub stored_file_name: String,
    pub reason: String,
}

impl RetentionSweepItemError {
    fn new(record: &ArtifactRecord, reason: impl ToString) -> Self {
        Self {
            id: record.id,
            stored_file_name: record.stored_file_name.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Outcome of one sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Records enumerated.
    pub examined: usize,
    /// Expired records whose file and record were removed.
    pub deleted: usize,
    /// Expired records left alone because their file was already gone.
    pub skipped_missing_file: usize,
    pub failures: Vec<RetentionSweepItemError>,
}

/// Retention policy bound to a catalog and storage root.
#[derive(Debug, Clone)]
pub struct Retention {
    catalog: Arc<dyn Catalog>,
    storage_root: PathBuf,
    window_months: u32,
}

impl Retention {
    pub fn new(catalog: Arc<dyn Catalog>, storage_root: PathBuf, window_months: u32) -> Self {
        Self {
            catalog,
            storage_root,
            window_months,
        }
    }

    /// Records created strictly before this instant are expired.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_months(Months::new(self.window_months))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Purge expired artifacts, deleting each file and then its record.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, RetentionError> {
        if !tokio::fs::try_exists(&self.storage_root).await.unwrap_or(false) {
            return Err(RetentionError::StorageRootMissing(self.storage_root.clone()));
        }

        let cutoff = self.cutoff(now);
        let records = self.catalog.all().await?;
        let mut report = SweepReport {
            examined: records.len(),
            ..SweepReport::default()
        };

        for record in records.iter().filter(|r| r.created_at < cutoff) {
            let path = record.file_path();
            match tokio::fs::try_exists(&path).await {
                Ok(true) => {}
                Ok(false) => {
                    report.skipped_missing_file += 1;
                    continue;
                }
                Err(e) => {
                    record_failure(&mut report, record, e);
                    continue;
                }
            }

            if let Err(e) = tokio::fs::remove_file(&path).await {
                record_failure(&mut report, record, e);
                continue;
            }
            if let Err(e) = self.catalog.delete(record.id).await {
                record_failure(&mut report, record, e);
                continue;
            }

            tracing::info!(
                "Purged {} (id {}, created {})",
                record.stored_file_name,
                record.id,
                record.created_at
            );
            report.deleted += 1;
        }

        tracing::debug!(
            "Retention sweep: {} examined, {} deleted, {} missing files, {} failures",
            report.examined,
            report.deleted,
            report.skipped_missing_file,
            report.failures.len()
        );
        Ok(report)
    }
}

fn record_failure(report: &mut SweepReport, record: &ArtifactRecord, reason: impl ToString) {
    let err = RetentionSweepItemError::new(record, reason);
    tracing::warn!("Retention sweep skipped {}", err);
    report.failures.push(err);
}

/// Background task running [`Retention::sweep`] on a fixed interval.
#[derive(Debug)]
pub struct RetentionSweeper {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl RetentionSweeper {
    /// Start sweeping every `config.interval_secs` until `token` is cancelled.
    ///
    /// The first sweep runs one full interval after start unless
    /// `config.run_on_start` is set. Missed ticks are skipped.
    pub fn spawn(retention: Retention, config: &RetentionConfig, token: CancellationToken) -> Self {
        let period = Duration::from_secs(config.interval_secs.clamp(1, MAX_SWEEP_INTERVAL_SECS));
        let now = Instant::now();
        let start = if config.run_on_start {
            now
        } else {
            now.checked_add(period).unwrap_or(now)
        };

        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    () = task_token.cancelled() => break,
                    _ = ticker.tick() => {
                        match retention.sweep(Utc::now()).await {
                            Ok(report) if report.deleted > 0 || !report.failures.is_empty() => {
                                tracing::info!(
                                    "Retention sweep deleted {} artifacts ({} failures)",
                                    report.deleted,
                                    report.failures.len()
                                );
                            }
                            Ok(_) => {}
                            Err(e) => tracing::error!("Retention sweep failed: {}", e),
                        }
                    }
                }
            }
            tracing::debug!("retention sweeper stopped");
        });

        Self { token, handle }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancel and wait for the task to finish its current sweep.
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            tracing::warn!("Retention sweeper task failed: {}", e);
        }
    }
}
