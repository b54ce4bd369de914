use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use litharvest_core::{CanonicalRecord, RawRecord};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::audit::{
    AcquisitionResult, AttemptOutcome, AuditLog, DownloadAttempt, DownloadOutcome, RunReport,
};
use crate::cache::{self, ResponseCache};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::fetch;
use crate::http::RateLimitedClient;
use crate::identifiers::ArxivId;
use crate::merge::MergePolicy;
use crate::resolve::IdentityResolver;
use crate::store::{ArtifactStore, record_identity};
use crate::strategies::crossref::CrossrefLookup;
use crate::strategies::{AttemptResult, Strategy, default_chain};

/// Asks a running acquisition to wind down. Records whose chain has not
/// started yet finish as `Interrupted`; the attempt in flight completes.
#[derive(Clone)]
pub struct StopHandle {
    inner: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        let _ = self.inner.send_replace(true);
    }
}

/// The whole pipeline behind one handle: dedupe raw records into canonical
/// ones, then walk each through the strategy chain until a PDF lands on
/// disk or the chain runs out.
pub struct Acquirer {
    config: PipelineConfig,
    resolver: IdentityResolver,
    policy: MergePolicy,
    strategies: Vec<Box<dyn Strategy>>,
    lookup: Option<CrossrefLookup>,
    store: ArtifactStore,
    cache: Arc<ResponseCache>,
    stop: Arc<watch::Sender<bool>>,
}

impl Acquirer {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let client = Arc::new(RateLimitedClient::new(
            Duration::from_millis(config.min_request_interval_ms),
            &user_agent_for(&config),
        ));
        let cache_dir = config.cache_dir.clone().unwrap_or_else(cache::default_dir);
        let cache = Arc::new(ResponseCache::open(
            cache_dir,
            Duration::from_secs(config.cache_ttl_secs),
        )?);
        let strategies = default_chain(&config, client.clone(), cache.clone());
        let lookup = config
            .backfill_dois
            .then(|| CrossrefLookup::new(client, config.polite_email.clone()));
        Self::assemble(config, strategies, lookup, cache)
    }

    #[cfg(test)]
    pub(crate) fn with_strategies(
        config: PipelineConfig,
        strategies: Vec<Box<dyn Strategy>>,
        lookup: Option<CrossrefLookup>,
    ) -> Result<Self> {
        let cache_dir = config.cache_dir.clone().unwrap_or_else(cache::default_dir);
        let cache = Arc::new(ResponseCache::open(
            cache_dir,
            Duration::from_secs(config.cache_ttl_secs),
        )?);
        Self::assemble(config, strategies, lookup, cache)
    }

    fn assemble(
        config: PipelineConfig,
        strategies: Vec<Box<dyn Strategy>>,
        lookup: Option<CrossrefLookup>,
        cache: Arc<ResponseCache>,
    ) -> Result<Self> {
        let store = ArtifactStore::open(config.output_dir.clone())?;
        let (stop, _) = watch::channel(false);
        Ok(Self {
            resolver: IdentityResolver::new(),
            policy: MergePolicy::new(&config.merge),
            strategies,
            lookup,
            store,
            cache,
            stop: Arc::new(stop),
            config,
        })
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            inner: self.stop.clone(),
        }
    }

    /// Collapses raw records into one canonical record per publication.
    pub fn dedupe(&self, records: Vec<RawRecord>) -> Vec<CanonicalRecord> {
        let raw = records.len();
        let canonical: Vec<CanonicalRecord> = self
            .resolver
            .resolve(records)
            .into_iter()
            .filter_map(|cluster| self.policy.merge_cluster(cluster))
            .collect();
        info!(raw, canonical = canonical.len(), "deduplicated records");
        canonical
    }

    /// Dedupe then acquire, in one call.
    pub async fn run(&self, records: Vec<RawRecord>) -> Result<RunReport> {
        let canonical = self.dedupe(records);
        self.acquire(canonical).await
    }

    /// Runs the strategy chain for every record, `max_workers` at a time.
    pub async fn acquire(&self, mut records: Vec<CanonicalRecord>) -> Result<RunReport> {
        let audit_path = self
            .config
            .audit_log
            .clone()
            .unwrap_or_else(|| self.config.output_dir.join("audit.jsonl"));
        let audit = AuditLog::open(&audit_path).await?;

        // A stop request only covers the run it was issued during.
        let _ = self.stop.send_replace(false);

        let mut backfilled: Vec<Option<String>> = vec![None; records.len()];
        if let Some(lookup) = &self.lookup {
            for (idx, record) in records.iter_mut().enumerate() {
                // An arXiv id already gives the chain a route; no lookup needed.
                if record.doi.is_some()
                    || ArxivId::for_record(record).is_some()
                    || record.title.trim().is_empty()
                {
                    continue;
                }
                match lookup.doi_for_title(&record.title).await {
                    Ok(Some((doi, score))) if score >= self.config.backfill_min_score => {
                        debug!(doi = %doi.normalized, score, title = %record.title, "backfilled DOI");
                        record.doi = Some(doi.normalized.clone());
                        backfilled[idx] = Some(doi.normalized);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, title = %record.title, "DOI backfill lookup failed");
                    }
                }
            }
        }

        let mut indexed: Vec<(usize, AcquisitionResult)> =
            stream::iter(records.iter().enumerate().map(|(idx, record)| {
                let backfilled_doi = backfilled[idx].clone();
                let stop = self.stop.subscribe();
                let audit = &audit;
                async move {
                    let outcome = self.process(record, stop, audit).await;
                    let result = AcquisitionResult {
                        identity: record_identity(record),
                        title: record.title.clone(),
                        outcome,
                        backfilled_doi,
                    };
                    (idx, result)
                }
            }))
            .buffer_unordered(self.config.max_workers.max(1))
            .collect()
            .await;

        // Workers finish out of order; reports read in input order.
        indexed.sort_by_key(|(idx, _)| *idx);
        let results: Vec<AcquisitionResult> = indexed.into_iter().map(|(_, r)| r).collect();

        let report = RunReport::compute(&records, results, self.cache.stats());
        info!(
            acquired = report.acquired,
            skipped = report.skipped_existing,
            exhausted = report.exhausted,
            failed = report.failed,
            "acquisition run finished"
        );
        Ok(report)
    }

    async fn process(
        &self,
        record: &CanonicalRecord,
        stop: watch::Receiver<bool>,
        audit: &AuditLog,
    ) -> DownloadOutcome {
        let Some(identity) = record_identity(record) else {
            return DownloadOutcome::Failed {
                reason: "record has no usable identity".to_string(),
                attempts: Vec::new(),
            };
        };

        if let Some(path) = self.store.existing(&identity) {
            debug!(identity, "artifact already on disk");
            return DownloadOutcome::Acquired {
                path,
                attempts: Vec::new(),
            };
        }

        self.run_chain(record, &identity, stop, audit).await
    }

    /// One record against the whole chain. Retries stay inside a strategy;
    /// everything else falls through to the next one.
    async fn run_chain(
        &self,
        record: &CanonicalRecord,
        identity: &str,
        stop: watch::Receiver<bool>,
        audit: &AuditLog,
    ) -> DownloadOutcome {
        let mut attempts = Vec::new();

        for strategy in &self.strategies {
            if !strategy.applicable(record) {
                continue;
            }

            let mut retry = 0u32;
            loop {
                if *stop.borrow() {
                    return DownloadOutcome::Interrupted { attempts };
                }

                let result = strategy.attempt(record).await;
                let mut attempt =
                    DownloadAttempt::new(identity, strategy.name(), AttemptOutcome::of(&result));

                match result {
                    AttemptResult::Success {
                        bytes,
                        content_type,
                    } => {
                        if let Err(reason) =
                            fetch::validate_payload(&bytes, content_type.as_deref())
                        {
                            debug!(identity, strategy = strategy.name(), reason, "payload rejected");
                            attempt.outcome = AttemptOutcome::InvalidContent;
                            record_attempt(audit, &mut attempts, attempt.with_detail(reason)).await;
                            break;
                        }
                        match self.store.persist(identity, &bytes).await {
                            Ok(path) => {
                                info!(identity, strategy = strategy.name(), "acquired");
                                let attempt = attempt.with_artifact(path.clone());
                                record_attempt(audit, &mut attempts, attempt).await;
                                return DownloadOutcome::Acquired { path, attempts };
                            }
                            Err(e) => {
                                let reason = format!("could not persist artifact: {e}");
                                record_attempt(
                                    audit,
                                    &mut attempts,
                                    attempt.with_detail(reason.clone()),
                                )
                                .await;
                                return DownloadOutcome::Failed { reason, attempts };
                            }
                        }
                    }
                    AttemptResult::NotFound => {
                        record_attempt(audit, &mut attempts, attempt).await;
                        break;
                    }
                    AttemptResult::TransientError { retryable, detail } => {
                        debug!(identity, strategy = strategy.name(), detail, "attempt failed");
                        record_attempt(audit, &mut attempts, attempt.with_detail(detail)).await;
                        if !retryable || retry >= self.config.max_retries {
                            break;
                        }
                        let delay = 2u64
                            .saturating_pow(retry)
                            .min(self.config.backoff_cap_secs);
                        tokio::time::sleep(Duration::from_secs(delay)).await;
                        retry += 1;
                    }
                    AttemptResult::InvalidContent { reason } => {
                        record_attempt(audit, &mut attempts, attempt.with_detail(reason)).await;
                        break;
                    }
                }
            }
        }

        DownloadOutcome::Exhausted { attempts }
    }
}

fn user_agent_for(config: &PipelineConfig) -> String {
    let base = concat!("litharvest/", env!("CARGO_PKG_VERSION"));
    match &config.polite_email {
        Some(email) => format!("{base} (mailto:{email})"),
        None => base.to_string(),
    }
}

/// The trail is the source of truth; a failed log write costs the line, not
/// the record.
async fn record_attempt(
    audit: &AuditLog,
    attempts: &mut Vec<DownloadAttempt>,
    attempt: DownloadAttempt,
) {
    if let Err(e) = audit.append(&attempt).await {
        warn!(error = %e, "audit append failed");
    }
    attempts.push(attempt);
}
