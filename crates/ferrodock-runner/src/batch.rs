//! Bounded parallel batch runner.
//!
//! Every item runs exactly once (plus retries, when enabled) under a
//! semaphore sized to the worker budget. Outcomes are collected per item;
//! one item failing never cancels its siblings.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use ferrodock_common::error::{PipelineError, Result};

use crate::work::{validate_unique_outputs, WorkItem};

/// A stage's per-item work.
#[async_trait]
pub trait BatchJob: Send + Sync {
    /// Stage name for logs and reports.
    fn name(&self) -> &str;

    async fn run(&self, item: &WorkItem) -> Result<ItemSuccess>;
}

/// What a successful item produced.
#[derive(Debug, Default)]
pub struct ItemSuccess {
    pub produced: Vec<PathBuf>,
    /// Non-fatal problems (e.g. one of several artifacts missing)
    pub problems: Vec<PipelineError>,
}

impl ItemSuccess {
    pub fn produced(paths: Vec<PathBuf>) -> Self {
        Self {
            produced: paths,
            problems: Vec::new(),
        }
    }

    pub fn is_partial(&self) -> bool {
        !self.problems.is_empty()
    }
}

#[derive(Debug)]
pub struct ItemResult {
    pub item_id: String,
    pub success: ItemSuccess,
}

#[derive(Debug)]
pub struct ItemFailure {
    pub item_id: String,
    pub attempts: u32,
    pub error: PipelineError,
}

/// Attempts made and the final outcome of one item.
type Attempted = (u32, Result<ItemSuccess>);

/// Retry policy for `ToolInvocationFailed` errors.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before attempt `n + 1` is `backoff × n`
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }
}

/// Per-item outcomes of one batch, in input order.
#[derive(Debug)]
pub struct BatchReport {
    pub stage: String,
    pub workers: usize,
    pub total: usize,
    pub succeeded: Vec<ItemResult>,
    pub failed: Vec<ItemFailure>,
    /// Job invocations, retries included
    pub invocations: usize,
    pub elapsed: Duration,
}

impl BatchReport {
    fn empty(stage: &str, workers: usize) -> Self {
        Self {
            stage: stage.to_string(),
            workers,
            total: 0,
            succeeded: Vec::new(),
            failed: Vec::new(),
            invocations: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// No failures and no partial successes.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.succeeded.iter().all(|r| !r.success.is_partial())
    }

    /// Non-empty batch in which nothing succeeded.
    pub fn all_failed(&self) -> bool {
        self.total > 0 && self.succeeded.is_empty()
    }

    pub fn partial_count(&self) -> usize {
        self.succeeded.iter().filter(|r| r.success.is_partial()).count()
    }

    pub fn failures_by_kind(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for failure in &self.failed {
            *counts.entry(failure.error.kind()).or_insert(0) += 1;
        }
        counts
    }

    pub fn produced(&self) -> impl Iterator<Item = &PathBuf> {
        self.succeeded.iter().flat_map(|r| r.success.produced.iter())
    }

    /// Fold per-position outcomes into the report, in input order. A slot
    /// left empty belongs to a task that died without reporting.
    fn record(&mut self, ids: Vec<String>, slots: Vec<Option<Attempted>>) {
        for (item_id, slot) in ids.into_iter().zip(slots) {
            let (attempts, outcome) = slot.unwrap_or_else(|| {
                (0, Err(PipelineError::Other(anyhow::anyhow!("worker task aborted"))))
            });
            match outcome {
                Ok(success) => {
                    for problem in &success.problems {
                        warn!("{}: {} partially succeeded: {}", self.stage, item_id, problem);
                    }
                    self.succeeded.push(ItemResult { item_id, success });
                }
                Err(error) => {
                    warn!(
                        "{}: {} failed after {} attempt(s): {}",
                        self.stage, item_id, attempts, error
                    );
                    self.failed.push(ItemFailure { item_id, attempts, error });
                }
            }
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {}/{} succeeded ({} partial), {} failed, {} invocations on {} workers in {:.1}s",
            self.stage,
            self.succeeded.len(),
            self.total,
            self.partial_count(),
            self.failed.len(),
            self.invocations,
            self.workers,
            self.elapsed.as_secs_f64()
        )
    }
}

/// Runs a [`BatchJob`] over a set of items with at most `workers` in flight.
#[derive(Debug, Clone)]
pub struct BatchRunner {
    workers: usize,
    retry: RetryPolicy,
}

impl BatchRunner {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            retry: RetryPolicy::none(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `job` once per item. Only an output collision between items is an
    /// error; everything else lands in the report.
    pub async fn run<J>(&self, items: Vec<WorkItem>, job: Arc<J>) -> Result<BatchReport>
    where
        J: BatchJob + 'static,
    {
        validate_unique_outputs(&items)?;

        let stage = job.name().to_string();
        let mut report = BatchReport::empty(&stage, self.workers);
        report.total = items.len();
        if items.is_empty() {
            warn!("{}: no work items", stage);
            return Ok(report);
        }

        info!("{}: dispatching {} items on {} workers", stage, items.len(), self.workers);
        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let invocations = Arc::new(AtomicUsize::new(0));
        let mut tasks = JoinSet::new();

        let ids: Vec<String> = items.iter().map(|item| item.id.clone()).collect();
        for (position, item) in items.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let invocations = Arc::clone(&invocations);
            let job = Arc::clone(&job);
            let retry = self.retry.clone();

            tasks.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => run_with_retry(job.as_ref(), &item, &retry, &invocations).await,
                    Err(_) => (0, Err(PipelineError::Other(anyhow::anyhow!("worker pool closed")))),
                };
                (position, outcome)
            });
        }

        let mut slots: Vec<Option<Attempted>> = ids.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((position, outcome)) => {
                    if let Some(slot) = slots.get_mut(position) {
                        *slot = Some(outcome);
                    }
                }
                Err(e) => error!("{}: worker task aborted: {}", stage, e),
            }
        }
        report.record(ids, slots);

        report.invocations = invocations.load(Ordering::SeqCst);
        report.elapsed = start.elapsed();
        info!("{}", report.summary());
        Ok(report)
    }
}

async fn run_with_retry<J: BatchJob + ?Sized>(
    job: &J,
    item: &WorkItem,
    retry: &RetryPolicy,
    invocations: &AtomicUsize,
) -> Attempted {
    let mut attempt = 1;
    loop {
        invocations.fetch_add(1, Ordering::SeqCst);
        let outcome = AssertUnwindSafe(job.run(item))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                Err(PipelineError::Other(anyhow::anyhow!("job panicked on {}", item.id)))
            });

        match outcome {
            Err(e) if e.is_retryable() && attempt < retry.max_attempts => {
                let delay = retry.backoff * attempt;
                warn!(
                    "{}: attempt {}/{} on {} failed ({}), retrying in {:?}",
                    job.name(),
                    attempt,
                    retry.max_attempts,
                    item.id,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return (attempt, other),
        }
    }
}
