//! One-time conversion of legacy plaintext `.conf` files into sealed records.
//!
//! A pass lists the configuration directory, and for every legacy file reads
//! it exclusively, decodes it, saves it sealed (never overwriting an existing
//! sealed record) and only then removes the plaintext file. Passes are
//! serialized by a [`MigrationCoordinator`]. A legacy file still held by a
//! writer schedules a single delayed retry pass with a smaller contention
//! budget, so the retry chain always ends.

use std::{
    fs,
    future::Future,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use tokio::{
    sync::{oneshot, Mutex as AsyncMutex, Notify},
    task::JoinHandle,
};
use tracing::{debug, info, instrument, warn};
use tunnelconf_core::{ConfError, ConfigFormat, Sealer, WgQuickFormat};

use crate::{names::LEGACY_SUFFIX, record_io, store::ConfigStore};

/// Delay before the retry scheduled by a pass that still had `budget` left.
pub fn retry_delay(budget: u32) -> Duration {
    Duration::from_secs(1) / budget.saturating_mul(budget).max(1)
}

struct PendingRetry {
    cancel: oneshot::Sender<()>,
    done: Arc<AtomicBool>,
    _handle: JoinHandle<()>,
}

/// Marks its task done and wakes waiters when the task ends, however it ends.
struct DoneGuard {
    done: Arc<AtomicBool>,
    finished: Arc<Notify>,
}

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.done.store(true, Ordering::SeqCst);
        self.finished.notify_waiters();
    }
}

/// Holds at most one delayed task. Scheduling a new task cancels the previous
/// one if it has not fired yet; a task that already fired runs to completion.
#[derive(Default)]
pub struct RetryTimer {
    pending: Mutex<Option<PendingRetry>>,
    scheduled: AtomicUsize,
    finished: Arc<Notify>,
}

impl RetryTimer {
    /// Runs `task` after `delay` on the tokio runtime, replacing any pending task.
    pub fn schedule<F>(&self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (cancel, canceled) = oneshot::channel::<()>();
        let done = Arc::new(AtomicBool::new(false));
        let guard = DoneGuard {
            done: Arc::clone(&done),
            finished: Arc::clone(&self.finished),
        };
        let handle = tokio::spawn(async move {
            let _guard = guard;
            tokio::select! {
                _ = tokio::time::sleep(delay) => task.await,
                _ = canceled => debug!("pending retry canceled"),
            }
        });
        self.scheduled.fetch_add(1, Ordering::SeqCst);
        let pending = PendingRetry {
            cancel,
            done,
            _handle: handle,
        };
        if let Some(previous) = self.slot().replace(pending) {
            let _ = previous.cancel.send(());
        }
    }

    /// Cancels the pending task, if it has not fired yet.
    pub fn cancel(&self) {
        if let Some(previous) = self.slot().take() {
            let _ = previous.cancel.send(());
        }
    }

    /// Whether the most recently scheduled task is still waiting or running.
    pub fn is_pending(&self) -> bool {
        self.slot()
            .as_ref()
            .is_some_and(|pending| !pending.done.load(Ordering::SeqCst))
    }

    /// Resolves once the most recently scheduled task has ended, including any
    /// successor it scheduled while running.
    pub async fn wait_idle(&self) {
        loop {
            let finished = self.finished.notified();
            tokio::pin!(finished);
            finished.as_mut().enable();
            if !self.is_pending() {
                return;
            }
            finished.await;
        }
    }

    /// Number of tasks scheduled over the timer's lifetime.
    pub fn scheduled(&self) -> usize {
        self.scheduled.load(Ordering::SeqCst)
    }

    fn slot(&self) -> MutexGuard<'_, Option<PendingRetry>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Process-wide migration state: the lock serializing passes and the single
/// retry timer. Build one at startup and share it by `Arc`.
#[derive(Default)]
pub struct MigrationCoordinator {
    migrating: AsyncMutex<()>,
    retry: RetryTimer,
    passes: AtomicUsize,
}

impl MigrationCoordinator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn retry_timer(&self) -> &RetryTimer {
        &self.retry
    }

    /// Number of passes that have started (immediate and retried).
    pub fn passes(&self) -> usize {
        self.passes.load(Ordering::SeqCst)
    }

    /// Waits until no retry is waiting or running.
    pub async fn wait_for_retries(&self) {
        self.retry.wait_idle().await;
    }
}

/// Result of one candidate file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationOutcome {
    pub path: PathBuf,
    pub result: Result<(), ConfError>,
}

/// Per-candidate results of one pass, in listing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub outcomes: Vec<MigrationOutcome>,
    /// Set when the directory itself could not be listed.
    pub listing_error: Option<ConfError>,
}

impl MigrationReport {
    fn listing_failed(err: ConfError) -> Self {
        Self {
            outcomes: Vec::new(),
            listing_error: Some(err),
        }
    }

    pub fn migrated(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn errors(&self) -> Vec<&ConfError> {
        self.listing_error
            .iter()
            .chain(self.outcomes.iter().filter_map(|o| o.result.as_ref().err()))
            .collect()
    }
}

/// Converts legacy files in a store's directory. Cheap to clone.
pub struct MigrationEngine<S: Sealer, F: ConfigFormat = WgQuickFormat> {
    store: Arc<ConfigStore<S, F>>,
    coordinator: Arc<MigrationCoordinator>,
}

impl<S: Sealer, F: ConfigFormat> Clone for MigrationEngine<S, F> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            coordinator: Arc::clone(&self.coordinator),
        }
    }
}

impl<S, F> MigrationEngine<S, F>
where
    S: Sealer + 'static,
    F: ConfigFormat + 'static,
{
    pub fn new(store: Arc<ConfigStore<S, F>>, coordinator: Arc<MigrationCoordinator>) -> Self {
        Self { store, coordinator }
    }

    pub fn store(&self) -> &ConfigStore<S, F> {
        &self.store
    }

    pub fn coordinator(&self) -> &Arc<MigrationCoordinator> {
        &self.coordinator
    }

    /// Runs one migration pass. `budget` bounds how many more delayed retries
    /// contention on a locked legacy file may trigger.
    #[instrument(skip(self))]
    pub async fn migrate(&self, budget: u32) -> MigrationReport {
        let _migrating = self.coordinator.migrating.lock().await;
        self.coordinator.passes.fetch_add(1, Ordering::SeqCst);

        let dir = self.store.directory();
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                let err = ConfError::io(dir, err);
                warn!(error = %err, "cannot list configuration directory");
                return MigrationReport::listing_failed(err);
            }
        };
        let candidates = self.store.names().legacy_candidates(entries);

        let mut budget = budget;
        let mut outcomes = Vec::with_capacity(candidates.len());
        for path in candidates {
            let result = match record_io::read_exclusive(&path) {
                Ok(bytes) => self.convert(&path, &bytes).await,
                Err(err) => {
                    if err.is_sharing_violation() && budget > 0 {
                        self.schedule_retry(budget);
                        budget = 0;
                    }
                    Err(err)
                }
            };
            match &result {
                Ok(()) => info!(path = %path.display(), "migrated legacy configuration"),
                Err(err) => warn!(path = %path.display(), error = %err, "legacy configuration not migrated"),
            }
            outcomes.push(MigrationOutcome { path, result });
        }

        MigrationReport {
            outcomes,
            listing_error: None,
        }
    }

    async fn convert(&self, path: &Path, bytes: &[u8]) -> Result<(), ConfError> {
        let name = legacy_name(path);
        let config = self.store.format().decode(bytes, &name)?;
        self.store.save(&config, false).await?;
        record_io::remove(path)
    }

    fn schedule_retry(&self, budget: u32) {
        let delay = retry_delay(budget);
        debug!(?delay, next_budget = budget - 1, "scheduling migration retry");
        let engine = self.clone();
        self.coordinator.retry.schedule(delay, async move {
            let report = engine.migrate(budget - 1).await;
            info!(
                migrated = report.migrated(),
                failed = report.errors().len(),
                "migration retry finished"
            );
        });
    }
}

fn legacy_name(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match file_name.strip_suffix(LEGACY_SUFFIX) {
        Some(name) => name.to_string(),
        None => file_name,
    }
}
