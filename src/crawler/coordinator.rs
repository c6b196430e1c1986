//! Pipeline coordinator - main harvest orchestration logic
//!
//! This module wires the pipeline together:
//! - Loading the checkpoint and computing the backlog
//! - Running `batch_size` worker tasks over a shared queue
//! - Collecting results in one place: record sink, statistics, checkpoint
//! - Periodic and final checkpoint flushes
//! - Graceful shutdown on cancellation
//!
//! Results flow from workers to a single collector over a bounded channel.
//! The collector is the only writer of records and the only caller of
//! `flush`, so for every URL the record is written before the URL enters the
//! completed set, and the completed set only grows.

use crate::config::{validate, Config};
use crate::crawler::limiter::RateLimiter;
use crate::crawler::worker::Worker;
use crate::crawler::FetchResult;
use crate::input::dedupe_urls;
use crate::output::{log_progress, HarvestSummary, RunStatus, Stats, StatsAggregator};
use crate::state::WorkItem;
use crate::storage::{open_record_store, ArticleRecord, CheckpointStore, RecordSink, StorageResult};
use crate::HarvestError;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Consecutive failed checkpoint flushes tolerated before the run is stopped
pub const MAX_CONSECUTIVE_FLUSH_FAILURES: u32 = 3;

type SharedQueue = Arc<Mutex<VecDeque<WorkItem>>>;

/// A terminal result on its way to the collector
struct Completion {
    item: WorkItem,
    result: FetchResult,
}

/// What the collector saw over the run
#[derive(Debug, Default)]
struct CollectOutcome {
    fatal: Option<HarvestError>,
    flush_failures: u32,
}

/// Main pipeline coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    resume: bool,
    store: Arc<CheckpointStore>,
    sink: Arc<dyn RecordSink>,
    cancel: CancellationToken,
    config_hash: Option<String>,
}

impl Coordinator {
    /// Creates a coordinator writing records to the configured SQLite database
    ///
    /// # Arguments
    ///
    /// * `config` - The pipeline configuration
    /// * `resume` - Whether to continue from the checkpoint
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(HarvestError)` - Invalid configuration or unusable output locations
    pub fn new(config: Config, resume: bool) -> crate::Result<Self> {
        Self::with_config_hash(config, resume, None)
    }

    /// Like `new`, tagging checkpoints with the hash of the config file
    pub fn with_config_hash(
        config: Config,
        resume: bool,
        config_hash: Option<String>,
    ) -> crate::Result<Self> {
        validate(&config)?;
        let sink = open_record_store(Path::new(&config.output.database_path))?;
        Self::with_sink(config, resume, config_hash, Arc::new(sink))
    }

    /// Creates a coordinator writing records to `sink`
    pub fn with_sink(
        config: Config,
        resume: bool,
        config_hash: Option<String>,
        sink: Arc<dyn RecordSink>,
    ) -> crate::Result<Self> {
        validate(&config)?;
        let store = CheckpointStore::open(Path::new(&config.output.checkpoint_path), config_hash.clone())?;

        Ok(Self {
            config: Arc::new(config),
            resume,
            store: Arc::new(store),
            sink,
            cancel: CancellationToken::new(),
            config_hash,
        })
    }

    /// Token that stops the run when cancelled
    ///
    /// After cancellation no new attempt starts, in-flight attempts finish,
    /// the final checkpoint is written and `run` returns.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Replaces the run's cancellation token with `token`
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Runs the pipeline over `urls`
    ///
    /// URLs already in the checkpoint's completed set are skipped. Returns the
    /// run summary; statistics include any resumed run.
    pub async fn run(&self, urls: Vec<String>) -> crate::Result<HarvestSummary> {
        let urls = dedupe_urls(urls);

        let initial_stats = if self.resume {
            self.store.load().stats
        } else {
            tracing::info!("Fresh run requested, ignoring any existing checkpoint");
            Stats::default()
        };

        let backlog: VecDeque<WorkItem> = urls
            .iter()
            .filter(|url| !self.store.is_completed(url))
            .map(WorkItem::new)
            .collect();
        let backlog_len = backlog.len();

        tracing::info!(
            "{} input URLs, {} already complete, {} to fetch with {} workers",
            urls.len(),
            urls.len() - backlog_len,
            backlog_len,
            self.config.pipeline.batch_size
        );

        let stats = StatsAggregator::new(initial_stats);
        let queue: SharedQueue = Arc::new(Mutex::new(backlog));
        let limiter = Arc::new(RateLimiter::new(self.config.pipeline.rate_limit()));
        let worker = Arc::new(Worker::new(&self.config, limiter, self.cancel.clone())?);

        let worker_count = self.config.pipeline.batch_size as usize;
        let (tx, rx) = mpsc::channel(worker_count.max(1) * 2);

        let handles: Vec<_> = (0..worker_count)
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    Arc::clone(&worker),
                    Arc::clone(&queue),
                    tx.clone(),
                    self.cancel.clone(),
                ))
            })
            .collect();
        drop(tx);

        let mut outcome = self.collect(rx, &stats, urls.len()).await;

        let mut join_error = None;
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!("Worker task failed: {}", e);
                join_error.get_or_insert(e);
            }
        }

        // Exactly one final flush, after every worker has stopped
        let final_flush = self.flush(&stats).await;
        if let Err(e) = &final_flush {
            tracing::error!("Final checkpoint flush failed: {}", e);
            outcome.flush_failures += 1;
        }

        let status = if outcome.fatal.is_some() || final_flush.is_err() || join_error.is_some() {
            RunStatus::Failed
        } else if self.cancel.is_cancelled() {
            RunStatus::Interrupted
        } else {
            RunStatus::Completed
        };

        let summary = HarvestSummary {
            stats: stats.snapshot(),
            status,
            input_urls: urls.len(),
            backlog: backlog_len,
            completed_urls: urls.iter().filter(|url| self.store.is_completed(url)).count(),
            flush_failures: outcome.flush_failures,
            config_hash: self.config_hash.clone(),
        };

        tracing::info!(
            "Run {}: {} of {} URLs complete ({} remaining)",
            status.as_str(),
            summary.completed_urls,
            summary.input_urls,
            summary.remaining()
        );

        if let Some(fatal) = outcome.fatal {
            return Err(fatal);
        }
        if let Err(e) = final_flush {
            return Err(HarvestError::Checkpoint(format!("final flush failed: {}", e)));
        }
        if let Some(e) = join_error {
            return Err(e.into());
        }

        Ok(summary)
    }

    /// Consumes results until every worker has hung up
    async fn collect(
        &self,
        mut rx: mpsc::Receiver<Completion>,
        stats: &StatsAggregator,
        total: usize,
    ) -> CollectOutcome {
        let frequency = self.config.pipeline.checkpoint_frequency.max(1) as usize;
        let mut outcome = CollectOutcome::default();
        let mut since_flush = 0usize;
        let mut consecutive_failures = 0u32;

        let period = self.config.pipeline.progress_interval();
        let mut progress = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        progress.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                completion = rx.recv() => {
                    let Some(Completion { item, result }) = completion else {
                        break;
                    };

                    if !self.accept(&item, &result, stats, &mut outcome) {
                        continue;
                    }

                    since_flush += 1;
                    if since_flush < frequency {
                        continue;
                    }
                    since_flush = 0;

                    match self.flush(stats).await {
                        Ok(()) => consecutive_failures = 0,
                        Err(e) => {
                            outcome.flush_failures += 1;
                            consecutive_failures += 1;
                            tracing::error!(
                                "Checkpoint flush failed ({} in a row): {}",
                                consecutive_failures,
                                e
                            );
                            if consecutive_failures >= MAX_CONSECUTIVE_FLUSH_FAILURES
                                && outcome.fatal.is_none()
                            {
                                outcome.fatal = Some(HarvestError::Checkpoint(format!(
                                    "{} consecutive flush failures, last: {}",
                                    consecutive_failures, e
                                )));
                                self.cancel.cancel();
                            }
                        }
                    }
                }
                _ = progress.tick() => log_progress(&stats.snapshot(), total),
            }
        }

        outcome
    }

    /// Writes the record, then counts the result and marks the URL complete
    ///
    /// Returns false if the record could not be written; the URL then stays
    /// incomplete and the run is cancelled.
    fn accept(
        &self,
        item: &WorkItem,
        result: &FetchResult,
        stats: &StatsAggregator,
        outcome: &mut CollectOutcome,
    ) -> bool {
        let record = ArticleRecord::from_result(&item.url, result, item.attempts());
        if let Err(e) = self.sink.write_record(&record) {
            tracing::error!("Failed to write record for {}: {}", item.url, e);
            if outcome.fatal.is_none() {
                outcome.fatal = Some(e.into());
                self.cancel.cancel();
            }
            return false;
        }

        if self.store.record(&item.url, result) {
            stats.update(result, item.attempts());
        }
        true
    }

    async fn flush(&self, stats: &StatsAggregator) -> StorageResult<()> {
        let saved_at = self.store.flush(&stats.snapshot()).await?;
        stats.mark_checkpoint(saved_at);
        Ok(())
    }
}

/// Pulls items off the shared queue until it is empty or the run is cancelled
async fn worker_loop(
    id: usize,
    worker: Arc<Worker>,
    queue: SharedQueue,
    tx: mpsc::Sender<Completion>,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            tracing::debug!("Worker {} stopping: cancelled", id);
            break;
        }

        let next = queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
        let Some(mut item) = next else {
            tracing::debug!("Worker {} stopping: queue drained", id);
            break;
        };

        match worker.process(&mut item).await {
            Ok(Some(result)) => {
                if tx.send(Completion { item, result }).await.is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => tracing::error!("Worker {} dropped {}: {}", id, item.url, e),
        }
    }
}

/// Runs a complete pipeline with a fresh coordinator
///
/// This is the main entry point. It will:
/// 1. Open the record store and checkpoint
/// 2. Skip URLs completed by earlier runs (when `resume` is set)
/// 3. Fetch the rest concurrently under the rate limit
/// 4. Flush the final checkpoint
///
/// # Arguments
///
/// * `urls` - The input URL list
/// * `config` - The pipeline configuration
/// * `resume` - Whether to continue from the checkpoint
///
/// # Returns
///
/// * `Ok(Stats)` - Final statistics
/// * `Err(HarvestError)` - The run failed
pub async fn run_pipeline(urls: Vec<String>, config: Config, resume: bool) -> crate::Result<Stats> {
    let coordinator = Coordinator::new(config, resume)?;
    let summary = coordinator.run(urls).await?;
    Ok(summary.stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{SqliteRecordSink, StorageError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(dir: &Path) -> Config {
        let mut config = Config::default();
        config.pipeline.rate_limit = 0.0;
        config.pipeline.backoff_base = 0.01;
        config.pipeline.backoff_max = 0.02;
        config.pipeline.min_content_length = 10;
        config.pipeline.batch_size = 3;
        config.output.database_path = dir.join("articles.db").display().to_string();
        config.output.checkpoint_path = dir.join("checkpoint.json").display().to_string();
        config.output.summary_path = dir.join("summary.md").display().to_string();
        config
    }

    async fn article_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><head><title>T</title></head><body><div id="mw-content-text"><p>Plenty of article text.</p></div></body></html>"#,
            ))
            .mount(&server)
            .await;
        server
    }

    /// Fails every write after the first `ok` ones
    struct FlakySink {
        ok: usize,
        writes: AtomicUsize,
    }

    impl RecordSink for FlakySink {
        fn write_record(&self, _record: &ArticleRecord) -> StorageResult<()> {
            if self.writes.fetch_add(1, Ordering::SeqCst) < self.ok {
                Ok(())
            } else {
                Err(StorageError::InvalidPath("disk full".to_string()))
            }
        }
    }

    #[tokio::test]
    async fn test_empty_input_completes() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = Coordinator::new(test_config(dir.path()), true).unwrap();

        let summary = coordinator.run(Vec::new()).await.unwrap();
        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.stats.attempted, 0);
        assert!(dir.path().join("checkpoint.json").exists());
    }

    #[tokio::test]
    async fn test_duplicate_input_urls_fetched_once() {
        let server = article_server().await;
        let dir = tempfile::tempdir().unwrap();
        let url = format!("{}/wiki/A", server.uri());

        let coordinator = Coordinator::new(test_config(dir.path()), true).unwrap();
        let summary = coordinator.run(vec![url.clone(), url.clone(), url]).await.unwrap();

        assert_eq!(summary.input_urls, 1);
        assert_eq!(summary.stats.attempted, 1);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sink_failure_stops_run_and_keeps_url_incomplete() {
        let server = article_server().await;
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.pipeline.batch_size = 1;

        let sink = Arc::new(FlakySink {
            ok: 1,
            writes: AtomicUsize::new(0),
        });
        let coordinator = Coordinator::with_sink(config, true, None, sink).unwrap();
        let urls: Vec<String> = (0..5).map(|i| format!("{}/wiki/{}", server.uri(), i)).collect();

        let result = coordinator.run(urls.clone()).await;
        assert!(matches!(result, Err(HarvestError::Storage(_))));

        let checkpoint = crate::storage::read_checkpoint(&dir.path().join("checkpoint.json"));
        assert!(checkpoint.completed.contains(&urls[0]));
        assert!(!checkpoint.completed.contains(&urls[1]));
        assert_eq!(checkpoint.stats.attempted, 1);
    }

    #[tokio::test]
    async fn test_fresh_run_ignores_checkpoint() {
        let server = article_server().await;
        let dir = tempfile::tempdir().unwrap();
        let urls = vec![format!("{}/wiki/A", server.uri())];

        let first = Coordinator::new(test_config(dir.path()), true).unwrap();
        first.run(urls.clone()).await.unwrap();

        let second = Coordinator::new(test_config(dir.path()), false).unwrap();
        let summary = second.run(urls).await.unwrap();

        assert_eq!(summary.backlog, 1);
        assert_eq!(summary.stats.attempted, 1);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_records_written_to_database() {
        let server = article_server().await;
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let db_path = dir.path().join("articles.db");
        let urls: Vec<String> = (0..4).map(|i| format!("{}/wiki/{}", server.uri(), i)).collect();

        run_pipeline(urls.clone(), config, true).await.unwrap();

        let sink = SqliteRecordSink::new(&db_path).unwrap();
        assert_eq!(sink.count_records().unwrap(), 4);
        let record = sink.get_record(&urls[2]).unwrap().unwrap();
        assert_eq!(record.content.as_deref(), Some("Plenty of article text."));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.pipeline.batch_size = 0;

        assert!(matches!(
            Coordinator::new(config, true),
            Err(HarvestError::Config(_))
        ));
    }

    #[test]
    fn test_unrepresentable_durations_rejected_before_running() {
        let dir = tempfile::tempdir().unwrap();

        let mut config = test_config(dir.path());
        config.pipeline.progress_interval = 1e-12;
        assert!(matches!(
            Coordinator::new(config, true),
            Err(HarvestError::Config(_))
        ));

        let mut config = test_config(dir.path());
        config.pipeline.timeout = 1e20;
        assert!(matches!(
            Coordinator::new(config, true),
            Err(HarvestError::Config(_))
        ));
    }
}
