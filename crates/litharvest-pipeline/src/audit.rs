use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use litharvest_core::CanonicalRecord;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::cache::CacheStats;
use crate::error::{PipelineError, Result};
use crate::strategies::AttemptResult;

/// Category of one strategy execution, as it lands in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    TransientFailure,
    PermanentSkip,
    InvalidContent,
}

impl AttemptOutcome {
    pub(crate) fn of(result: &AttemptResult) -> Self {
        match result {
            AttemptResult::Success { .. } => Self::Success,
            AttemptResult::NotFound => Self::PermanentSkip,
            AttemptResult::TransientError {
                retryable: true, ..
            } => Self::TransientFailure,
            AttemptResult::TransientError {
                retryable: false, ..
            } => Self::PermanentSkip,
            AttemptResult::InvalidContent { .. } => Self::InvalidContent,
        }
    }
}

/// One strategy execution for one record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadAttempt {
    pub record_id: String,
    pub strategy: String,
    pub outcome: AttemptOutcome,
    /// HTTP status or error class, when there is one to report.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
}

impl DownloadAttempt {
    pub fn new(
        record_id: impl Into<String>,
        strategy: impl Into<String>,
        outcome: AttemptOutcome,
    ) -> Self {
        Self {
            record_id: record_id.into(),
            strategy: strategy.into(),
            outcome,
            detail: None,
            at: Utc::now(),
            artifact: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_artifact(mut self, path: impl Into<PathBuf>) -> Self {
        self.artifact = Some(path.into());
        self
    }
}

/// Terminal acquisition state of one record, with its full attempt trail.
/// `Acquired` with no attempts means a valid artifact was already on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DownloadOutcome {
    Acquired {
        path: PathBuf,
        attempts: Vec<DownloadAttempt>,
    },
    Exhausted {
        attempts: Vec<DownloadAttempt>,
    },
    Failed {
        reason: String,
        attempts: Vec<DownloadAttempt>,
    },
    Interrupted {
        attempts: Vec<DownloadAttempt>,
    },
}

impl DownloadOutcome {
    pub fn attempts(&self) -> &[DownloadAttempt] {
        match self {
            Self::Acquired { attempts, .. }
            | Self::Exhausted { attempts }
            | Self::Failed { attempts, .. }
            | Self::Interrupted { attempts } => attempts,
        }
    }
}

/// Acquisition verdict for one canonical record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    pub title: String,
    pub outcome: DownloadOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backfilled_doi: Option<String>,
}

// ─── AuditLog ─────────────────────────────────────────────────────────────────

/// Append-only JSONL attempt log shared by all workers.
pub struct AuditLog {
    file: Mutex<tokio::fs::File>,
}

impl AuditLog {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// One JSON object per line, flushed immediately; a crash loses at most
    /// the attempt being written.
    pub async fn append(&self, attempt: &DownloadAttempt) -> Result<()> {
        let mut line =
            serde_json::to_string(attempt).map_err(|e| PipelineError::Parse(e.to_string()))?;
        line.push('\n');
        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

// ─── RunReport ────────────────────────────────────────────────────────────────

/// Aggregate view over one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub records_in: u64,
    pub canonical_records: u64,
    pub clusters_merged: u64,
    pub review_flagged: u64,
    pub dois_backfilled: u64,
    pub acquired: u64,
    pub skipped_existing: u64,
    pub exhausted: u64,
    pub failed: u64,
    pub interrupted: u64,
    pub by_strategy: BTreeMap<String, u64>,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub results: Vec<AcquisitionResult>,
}

impl RunReport {
    pub fn compute(
        canonical: &[CanonicalRecord],
        results: Vec<AcquisitionResult>,
        cache: CacheStats,
    ) -> Self {
        let mut report = Self {
            run_id: Uuid::now_v7(),
            records_in: canonical
                .iter()
                .map(|r| u64::from(r.merged_from_count))
                .sum(),
            canonical_records: canonical.len() as u64,
            clusters_merged: canonical
                .iter()
                .filter(|r| r.merged_from_count > 1)
                .count() as u64,
            review_flagged: canonical.iter().filter(|r| r.needs_review).count() as u64,
            dois_backfilled: 0,
            acquired: 0,
            skipped_existing: 0,
            exhausted: 0,
            failed: 0,
            interrupted: 0,
            by_strategy: BTreeMap::new(),
            cache_hits: cache.hits,
            cache_misses: cache.misses,
            results: Vec::new(),
        };
        for result in &results {
            if result.backfilled_doi.is_some() {
                report.dois_backfilled += 1;
            }
            match &result.outcome {
                DownloadOutcome::Acquired { attempts, .. } => {
                    if let Some(winner) = attempts.last() {
                        report.acquired += 1;
                        *report.by_strategy.entry(winner.strategy.clone()).or_insert(0) += 1;
                    } else {
                        report.skipped_existing += 1;
                    }
                }
                DownloadOutcome::Exhausted { .. } => report.exhausted += 1,
                DownloadOutcome::Failed { .. } => report.failed += 1,
                DownloadOutcome::Interrupted { .. } => report.interrupted += 1,
            }
        }
        report.results = results;
        report
    }

    /// Human-readable run summary.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let line = "=".repeat(62);
        let _ = writeln!(out, "{line}");
        let _ = writeln!(out, "Run {}", self.run_id);
        let _ = writeln!(out, "{line}");
        let _ = writeln!(out, "Records in:          {}", self.records_in);
        let _ = writeln!(
            out,
            "Canonical records:   {} ({} merged from duplicates)",
            self.canonical_records, self.clusters_merged
        );
        let _ = writeln!(out, "Flagged for review:  {}", self.review_flagged);
        if self.dois_backfilled > 0 {
            let _ = writeln!(out, "DOIs backfilled:     {}", self.dois_backfilled);
        }
        let attempted = self.acquired + self.exhausted + self.failed + self.interrupted;
        let pct = if attempted == 0 {
            0.0
        } else {
            self.acquired as f64 * 100.0 / attempted as f64
        };
        let _ = writeln!(
            out,
            "Acquired:            {} of {attempted} attempted ({pct:.1}%)",
            self.acquired
        );
        let _ = writeln!(out, "Already on disk:     {}", self.skipped_existing);
        let _ = writeln!(out, "Exhausted:           {}", self.exhausted);
        let _ = writeln!(out, "Failed:              {}", self.failed);
        if self.interrupted > 0 {
            let _ = writeln!(out, "Interrupted:         {}", self.interrupted);
        }
        if !self.by_strategy.is_empty() {
            let _ = writeln!(out, "Downloads by method:");
            for (strategy, count) in &self.by_strategy {
                let _ = writeln!(out, "  {strategy:<14} {count}");
            }
        }
        let _ = writeln!(
            out,
            "Cache:               {} hits, {} misses",
            self.cache_hits, self.cache_misses
        );
        let _ = writeln!(out, "{line}");
        out
    }
}
