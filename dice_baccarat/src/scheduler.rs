//! Cancellable one-shot timers with bounded retry.
//!
//! Each scheduled task is a tokio task sleeping until its due time. When the
//! callback fails it is retried with exponential backoff, up to
//! [`SchedulerConfig::max_retries`] times, after which the task is marked
//! failed and forgotten. Callbacks are expected to re-check their own
//! preconditions: the scheduler knows nothing about games beyond the id it
//! was given.

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt,
    future::Future,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use thiserror::Error;
use tokio::{
    task::JoinHandle,
    time::{Instant, sleep},
};

use crate::{game::RoundId, metrics};

/// Scheduled task identifier, unique per scheduler.
pub type TaskId = u64;

/// Callback run when a task fires. Called once per attempt.
pub type TaskCallback = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// What a scheduled task is for.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum TaskCategory {
    Countdown,
    AutoClose,
    AutoNext,
    Cleanup,
    Watchdog,
}

impl TaskCategory {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Countdown => "countdown",
            Self::AutoClose => "auto_close",
            Self::AutoNext => "auto_next",
            Self::Cleanup => "cleanup",
            Self::Watchdog => "watchdog",
        }
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskStatus {
    Waiting,
    Running,
    Retrying,
}

/// Snapshot of a scheduled task.
#[derive(Clone, Debug)]
pub struct ScheduledTask {
    pub id: TaskId,
    pub category: TaskCategory,
    pub game_id: RoundId,
    pub due_at: Instant,
    pub retries: u32,
    pub max_retries: u32,
    pub status: TaskStatus,
}

/// Scheduler errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Callback gave up after exhausting its retries
    #[error("task {id} ({category}) failed after {attempts} attempts: {source}")]
    Exhausted {
        id: TaskId,
        category: TaskCategory,
        attempts: u32,
        source: anyhow::Error,
    },
}

/// Scheduler tuning.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SchedulerConfig {
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    /// Backoff before the first retry. Doubles per retry.
    pub base_backoff: Duration,
    /// Upper bound on a single backoff.
    pub max_backoff: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

struct TaskEntry {
    info: ScheduledTask,
    handle: JoinHandle<()>,
}

struct Inner {
    tasks: Mutex<HashMap<TaskId, TaskEntry>>,
    next_id: AtomicU64,
    config: SchedulerConfig,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, TaskEntry>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update(&self, id: TaskId, status: TaskStatus, retries: u32, due_at: Option<Instant>) {
        if let Some(entry) = self.lock().get_mut(&id) {
            entry.info.status = status;
            entry.info.retries = retries;
            if let Some(due_at) = due_at {
                entry.info.due_at = due_at;
            }
        }
    }

    fn finish(&self, id: TaskId) {
        self.lock().remove(&id);
    }
}

/// Delayed callback registry. Cheap to clone; clones share their tasks.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                tasks: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                config,
            }),
        }
    }

    /// Run `callback` once after `delay`. Never suspends the caller.
    pub fn schedule(
        &self,
        category: TaskCategory,
        game_id: RoundId,
        delay: Duration,
        callback: TaskCallback,
    ) -> TaskId {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let max_retries = self.inner.config.max_retries;
        let due_at = Instant::now() + delay;

        // The map stays locked until the entry is inserted, so a task that
        // fires immediately cannot remove itself before it exists.
        let mut tasks = self.inner.lock();
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            if let Err(err) = run_with_retries(&inner, id, category, callback).await {
                log::error!("Scheduled {}", err);
                metrics::task_failed(category.as_str());
            }
            inner.finish(id);
        });

        tasks.insert(
            id,
            TaskEntry {
                info: ScheduledTask {
                    id,
                    category,
                    game_id,
                    due_at,
                    retries: 0,
                    max_retries,
                    status: TaskStatus::Waiting,
                },
                handle,
            },
        );

        id
    }

    /// Convenience wrapper boxing an async closure.
    pub fn schedule_fn<F, Fut>(
        &self,
        category: TaskCategory,
        game_id: RoundId,
        delay: Duration,
        f: F,
    ) -> TaskId
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let callback: TaskCallback = Arc::new(move || Box::pin(f()));
        self.schedule(category, game_id, delay, callback)
    }

    /// Cancel one task. Returns whether it was still scheduled.
    pub fn cancel(&self, id: TaskId) -> bool {
        match self.inner.lock().remove(&id) {
            Some(entry) => {
                entry.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every task matching the filters. `None` matches anything.
    ///
    /// Idempotent. Returns how many tasks were cancelled.
    pub fn cancel_all(&self, category: Option<TaskCategory>, game_id: Option<&RoundId>) -> usize {
        let mut tasks = self.inner.lock();
        let ids: Vec<TaskId> = tasks
            .values()
            .filter(|e| matches(&e.info, category, game_id))
            .map(|e| e.info.id)
            .collect();

        for id in &ids {
            if let Some(entry) = tasks.remove(id) {
                entry.handle.abort();
            }
        }
        ids.len()
    }

    /// Number of scheduled tasks matching the filters.
    #[must_use]
    pub fn pending(&self, category: Option<TaskCategory>, game_id: Option<&RoundId>) -> usize {
        self.inner
            .lock()
            .values()
            .filter(|e| matches(&e.info, category, game_id))
            .count()
    }

    /// Snapshot of every scheduled task, soonest first.
    #[must_use]
    pub fn tasks(&self) -> Vec<ScheduledTask> {
        let mut tasks: Vec<ScheduledTask> =
            self.inner.lock().values().map(|e| e.info.clone()).collect();
        tasks.sort_by_key(|t| (t.due_at, t.id));
        tasks
    }
}

fn matches(info: &ScheduledTask, category: Option<TaskCategory>, game_id: Option<&RoundId>) -> bool {
    category.is_none_or(|c| info.category == c) && game_id.is_none_or(|g| &info.game_id == g)
}

async fn run_with_retries(
    inner: &Inner,
    id: TaskId,
    category: TaskCategory,
    callback: TaskCallback,
) -> Result<(), SchedulerError> {
    let mut retries = 0;

    loop {
        inner.update(id, TaskStatus::Running, retries, None);
        match callback().await {
            Ok(()) => return Ok(()),
            Err(err) if retries < inner.config.max_retries => {
                retries += 1;
                let wait = inner.config.backoff(retries);
                log::warn!(
                    "Task {} ({}) failed: {:#}. Retry {}/{} in {:?}",
                    id,
                    category,
                    err,
                    retries,
                    inner.config.max_retries,
                    wait
                );
                inner.update(
                    id,
                    TaskStatus::Retrying,
                    retries,
                    Some(Instant::now() + wait),
                );
                sleep(wait).await;
            }
            Err(err) => {
                return Err(SchedulerError::Exhausted {
                    id,
                    category,
                    attempts: retries + 1,
                    source: err,
                });
            }
        }
    }
}
