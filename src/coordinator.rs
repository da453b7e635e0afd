use crate::{
    aggregate::ResultAggregator,
    error::BatchError,
    item::{ItemOutcome, WorkItem},
    processor::{ItemProcessor, ProcessorFactory},
    progress::{ProgressState, ProgressStore},
    report::{FailedItem, RunStatistics},
    util::sha256_hex,
};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::any::Any;
use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub concurrency: usize,
    pub resume: bool,
    pub checkpoint_path: PathBuf,
    pub output_path: PathBuf,
    pub checkpoint_every: usize,
    pub flush_output_on_checkpoint: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: crate::util::default_concurrency(8),
            resume: false,
            checkpoint_path: PathBuf::from("processing_progress.json"),
            output_path: PathBuf::from("pdf_processing_results.csv"),
            checkpoint_every: 10,
            flush_output_on_checkpoint: true,
        }
    }
}

impl BatchOptions {
    pub fn from_config(cfg: &crate::config::Config) -> Self {
        Self {
            concurrency: cfg.effective_concurrency(),
            resume: cfg.batch.resume,
            checkpoint_path: PathBuf::from(&cfg.paths.checkpoint),
            output_path: PathBuf::from(&cfg.paths.output),
            checkpoint_every: cfg.batch.checkpoint_every,
            flush_output_on_checkpoint: cfg.output.flush_on_checkpoint,
        }
    }

    fn validate(&self) -> Result<(), BatchError> {
        if self.concurrency == 0 {
            return Err(BatchError::InvalidConfig("concurrency must be >= 1".into()));
        }
        if self.checkpoint_every == 0 {
            return Err(BatchError::InvalidConfig(
                "checkpoint_every must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

/// Cooperative interrupt: once requested, workers finish their current item
/// and take no further work.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true the first time it is called.
    pub fn request(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct Completion {
    item: WorkItem,
    outcome: ItemOutcome,
}

/// Counters and durable state owned by the collecting thread.
struct RunState {
    progress: ProgressState,
    results: ResultAggregator,
    pages: u64,
    processed: usize,
    since_checkpoint: usize,
}

pub struct BatchCoordinator<F: ProcessorFactory> {
    opts: BatchOptions,
    factory: F,
    stop: StopFlag,
}

impl<F: ProcessorFactory> BatchCoordinator<F> {
    pub fn new(opts: BatchOptions, factory: F) -> Self {
        Self {
            opts,
            factory,
            stop: StopFlag::new(),
        }
    }

    /// Share an externally owned flag, e.g. one tripped by a signal handler.
    pub fn with_stop_flag(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    pub fn run(&self, items: Vec<WorkItem>) -> Result<RunStatistics, BatchError> {
        self.opts.validate()?;
        let started = Instant::now();
        let store = ProgressStore::new(&self.opts.checkpoint_path);
        let digest = input_digest(&items);

        let (progress, results) = if self.opts.resume {
            let progress = store.load()?;
            if let Some(prev) = progress.input_digest.as_deref() {
                if prev != digest {
                    info!("checkpoint was written for a different input list");
                }
            }
            let mut results = ResultAggregator::load(&self.opts.output_path)?;
            // Rows of items the checkpoint never recorded as completed will
            // be produced again by this run.
            let completed: BTreeSet<&str> =
                progress.completed.iter().map(WorkItem::display_name).collect();
            let dropped = results.retain_sources(&completed);
            if dropped > 0 {
                info!("dropped {} output rows not covered by the checkpoint", dropped);
            }
            (progress, results)
        } else {
            (ProgressState::default(), ResultAggregator::new())
        };

        let before = items.len();
        let mut skipped_completed = 0;
        let mut skipped_failed = 0;
        let pending: Vec<WorkItem> = items
            .into_iter()
            .filter(|item| {
                if progress.completed.contains(item) {
                    skipped_completed += 1;
                    false
                } else if progress.failed.contains(item) {
                    skipped_failed += 1;
                    false
                } else {
                    true
                }
            })
            .collect();
        if self.opts.resume {
            info!(
                "resuming: {} completed, {} failed, {} remaining (of {})",
                skipped_completed,
                skipped_failed,
                pending.len(),
                before
            );
        }

        let mut state = RunState {
            progress,
            results,
            pages: 0,
            processed: 0,
            since_checkpoint: 0,
        };
        state.progress.input_digest = Some(digest);

        let workers = self.opts.concurrency.min(pending.len()).max(1);
        info!(
            "processing {} items with {} workers",
            pending.len(),
            workers
        );

        let (job_tx, job_rx) = unbounded::<WorkItem>();
        let dispatched = pending.len();
        for item in pending {
            // The receiver is alive in this scope, so send cannot fail.
            let _ = job_tx.send(item);
        }
        drop(job_tx);

        let spawn_err = thread::scope(|scope| {
            let (done_tx, done_rx) = unbounded::<Completion>();
            let mut spawn_err = None;
            for idx in 0..workers {
                let jobs = job_rx.clone();
                let done = done_tx.clone();
                let factory = &self.factory;
                let stop = &self.stop;
                let spawned = thread::Builder::new()
                    .name(format!("batch-worker-{idx}"))
                    .spawn_scoped(scope, move || worker_loop(factory, jobs, done, stop));
                if let Err(e) = spawned {
                    warn!("could not start worker {idx}: {e}");
                    self.stop.request();
                    spawn_err = Some(e);
                    break;
                }
            }
            drop(done_tx);

            for done in done_rx {
                self.apply(&mut state, done);
                if state.since_checkpoint >= self.opts.checkpoint_every {
                    self.checkpoint(&store, &mut state);
                }
            }
            spawn_err
        });

        let remaining = dispatched - state.processed;
        let interrupted = remaining > 0;
        if interrupted {
            warn!("stopped with {} items not started", remaining);
        }

        state.results.serialize(&self.opts.output_path)?;
        state.progress.touch();
        store.save(&state.progress)?;
        debug!("final checkpoint written to {}", store.path().display());

        if let Some(e) = spawn_err {
            return Err(BatchError::WorkerSpawn(e));
        }

        Ok(self.statistics(
            state,
            skipped_completed,
            skipped_failed,
            remaining,
            interrupted,
            started,
        ))
    }

    fn apply(&self, state: &mut RunState, done: Completion) {
        let Completion { item, outcome } = done;
        state.processed += 1;
        state.since_checkpoint += 1;

        match outcome {
            ItemOutcome::Success {
                pages,
                location,
                records,
            } => {
                if state.progress.record_completed(&item) {
                    state.pages += pages;
                    state.results.add(records);
                    info!(
                        "completed {} ({} pages) -> {}",
                        item.display_name(),
                        pages,
                        location
                    );
                } else {
                    debug!("duplicate outcome for {item} ignored");
                }
            }
            ItemOutcome::Failure { reason } => {
                if state.progress.record_failed(&item, &reason) {
                    warn!("failed {}: {}", item.display_name(), reason);
                } else {
                    debug!("duplicate outcome for {item} ignored");
                }
            }
        }
    }

    /// Cadence checkpoint. Failures are logged and retried at the next
    /// boundary.
    fn checkpoint(&self, store: &ProgressStore, state: &mut RunState) {
        state.since_checkpoint = 0;
        if self.opts.flush_output_on_checkpoint {
            if let Err(e) = state.results.serialize(&self.opts.output_path) {
                warn!("{e:#}; skipping checkpoint");
                return;
            }
        }
        state.progress.touch();
        match store.save(&state.progress) {
            Ok(()) => debug!(
                "checkpoint: {} completed, {} failed",
                state.progress.completed.len(),
                state.progress.failed.len()
            ),
            Err(e) => warn!("{e}; will retry at next checkpoint"),
        }
    }

    fn statistics(
        &self,
        state: RunState,
        skipped_completed: usize,
        skipped_failed: usize,
        remaining: usize,
        interrupted: bool,
        started: Instant,
    ) -> RunStatistics {
        let progress = &state.progress;
        let failures = progress
            .failed
            .iter()
            .map(|id| FailedItem {
                id: id.clone(),
                reason: progress
                    .reasons
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| "no reason recorded".to_string()),
            })
            .collect();

        RunStatistics {
            total: progress.terminal_count(),
            succeeded: progress.completed.len(),
            failed: progress.failed.len(),
            skipped_completed,
            skipped_failed,
            processed: state.processed,
            remaining,
            pages_processed: state.pages,
            records: state.results.len(),
            duration: started.elapsed(),
            interrupted,
            failures,
        }
    }
}

fn worker_loop<F: ProcessorFactory>(
    factory: &F,
    jobs: Receiver<WorkItem>,
    done: Sender<Completion>,
    stop: &StopFlag,
) {
    while !stop.is_requested() {
        let Ok(item) = jobs.recv() else {
            break;
        };
        let outcome = invoke(factory, &item);
        if done.send(Completion { item, outcome }).is_err() {
            break;
        }
    }
}

/// Run one item with a fresh processor, turning setup errors and panics into
/// failures.
fn invoke<F: ProcessorFactory>(factory: &F, item: &WorkItem) -> ItemOutcome {
    let attempt = panic::catch_unwind(AssertUnwindSafe(|| {
        factory.create().map(|mut p| p.process(item))
    }));
    match attempt {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(err)) => ItemOutcome::failure(format!("processor setup failed: {err:#}")),
        Err(payload) => {
            ItemOutcome::failure(format!("worker panicked: {}", panic_message(&*payload)))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// sha256 over the sorted, de-duplicated ids.
pub fn input_digest(items: &[WorkItem]) -> String {
    let unique: BTreeSet<&str> = items.iter().map(WorkItem::as_str).collect();
    let joined = unique.into_iter().collect::<Vec<_>>().join("\n");
    sha256_hex(joined.as_bytes())
}
