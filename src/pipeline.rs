//! One watch run: render every source, extract its listings, reconcile them
//! against the snapshot and persist the result.
//!
//! Sources are fetched with bounded parallelism but reconciled one at a time,
//! in configuration order, against a working copy of the snapshot. A source
//! that fails to render or parse is logged and left out of the run; only
//! loading or persisting the snapshot fails the run as a whole. Change events
//! are handed to the notifier once the snapshot is safely on disk.
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::extract::{extract_items, ExtractError};
use crate::fingerprint::fingerprint;
use crate::model::{ChangeEvent, NormalizedItem};
use crate::notify::Notifier;
use crate::reconcile::reconcile;
use crate::render::{RenderError, Renderer};
use crate::snapshot::{SnapshotStore, StoreError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("a run is already in progress")]
    AlreadyRunning,
    #[error("failed to load snapshot: {0}")]
    Load(#[source] StoreError),
    #[error("failed to persist snapshot: {0}")]
    Persist(#[source] StoreError),
}

/// Why a single source was left out of a run.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
}

#[derive(Debug)]
pub struct SourceFailure {
    pub url: String,
    pub source_hash: String,
    pub error: SourceError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub source_hash: String,
    pub event: ChangeEvent,
}

#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub sources_ok: usize,
    pub failures: Vec<SourceFailure>,
    pub changes: Vec<Change>,
    /// Records in the snapshot after the run.
    pub records: usize,
}

impl RunReport {
    pub fn new_items(&self) -> usize {
        self.changes
            .iter()
            .filter(|c| matches!(c.event, ChangeEvent::NewItem { .. }))
            .count()
    }

    pub fn price_changes(&self) -> usize {
        self.changes.len() - self.new_items()
    }
}

pub struct Pipeline {
    renderer: Arc<dyn Renderer>,
    notifier: Arc<dyn Notifier>,
    store: SnapshotStore,
    concurrency: usize,
    in_flight: Mutex<()>,
}

impl Pipeline {
    pub fn new(renderer: Arc<dyn Renderer>, notifier: Arc<dyn Notifier>, store: SnapshotStore) -> Self {
        Self {
            renderer,
            notifier,
            store,
            concurrency: 1,
            in_flight: Mutex::new(()),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Run the pipeline once over `urls`. At most one run is in flight per
    /// pipeline; a second caller gets `PipelineError::AlreadyRunning`.
    pub async fn run_once(&self, urls: &[String]) -> Result<RunReport, PipelineError> {
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| PipelineError::AlreadyRunning)?;
        let run_id = Uuid::new_v4();
        self.run(run_id, urls)
            .instrument(info_span!("run", %run_id))
            .await
    }

    async fn run(&self, run_id: Uuid, urls: &[String]) -> Result<RunReport, PipelineError> {
        info!(sources = urls.len(), "run started");
        let mut working = self.store.load().await.map_err(PipelineError::Load)?;
        let mut report = RunReport {
            run_id,
            sources_ok: 0,
            failures: Vec::new(),
            changes: Vec::new(),
            records: 0,
        };

        let mut fetched = stream::iter(urls)
            .map(|url| self.fetch_source(url))
            .buffered(self.concurrency);
        while let Some((url, source_hash, outcome)) = fetched.next().await {
            match outcome {
                Ok(items) => {
                    let events = reconcile(&mut working, &source_hash, &items, Utc::now());
                    info!(
                        %source_hash,
                        items = items.len(),
                        events = events.len(),
                        "source reconciled"
                    );
                    report.sources_ok += 1;
                    report.changes.extend(events.into_iter().map(|event| Change {
                        source_hash: source_hash.clone(),
                        event,
                    }));
                }
                Err(error) => {
                    warn!(%url, %source_hash, %error, "skipping source");
                    report.failures.push(SourceFailure {
                        url: url.to_string(),
                        source_hash,
                        error,
                    });
                }
            }
        }

        self.store
            .persist(&working)
            .await
            .map_err(PipelineError::Persist)?;
        report.records = working.len();

        for change in &report.changes {
            self.notifier.notify(&change.source_hash, &change.event).await;
        }
        info!(
            ok = report.sources_ok,
            failed = report.failures.len(),
            new = report.new_items(),
            changed = report.price_changes(),
            records = report.records,
            "run complete"
        );
        Ok(report)
    }

    async fn fetch_source<'a>(
        &self,
        url: &'a str,
    ) -> (&'a str, String, Result<Vec<NormalizedItem>, SourceError>) {
        let source_hash = fingerprint(url);
        let outcome = self.render_and_extract(url).await;
        (url, source_hash, outcome)
    }

    async fn render_and_extract(&self, url: &str) -> Result<Vec<NormalizedItem>, SourceError> {
        let markup = self.renderer.render(url).await?;
        Ok(extract_items(&markup)?)
    }

    /// Run on a fixed cadence until `shutdown` resolves. Ticks that fall due
    /// while a run is still going are skipped rather than queued. A run still
    /// going at shutdown is dropped and the snapshot file keeps its previous
    /// content.
    /// Returns the number of runs that succeeded; failed runs are logged and
    /// not counted.
    pub async fn watch<F>(&self, urls: &[String], interval: Duration, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut succeeded = 0;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = &mut shutdown => break,
            }
            tokio::select! {
                res = self.run_once(urls) => match res {
                    Ok(_) => succeeded += 1,
                    Err(err) => error!(%err, "run failed"),
                },
                _ = &mut shutdown => {
                    warn!("shutdown during run; snapshot left untouched");
                    break;
                }
            }
        }
        succeeded
    }
}
