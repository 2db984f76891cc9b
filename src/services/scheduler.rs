use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use tokio::{sync::oneshot, task::JoinHandle, time::sleep};
use tracing::debug;
use uuid::Uuid;

/// Kind of delayed work attached to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Remove a transient notice once its display window elapsed.
    ClearNotice(Uuid),
    /// Settle the divination vote of a round.
    CloseVote(u32),
    /// Close a round when its deadline passes.
    CloseRound(u32),
}

/// Identity of a scheduled task; scheduling the same key again replaces the pending task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskKey {
    /// Owning session.
    pub session_id: Uuid,
    /// What the task does.
    pub kind: TaskKind,
}

struct ScheduledTask {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Cancellable delayed tasks keyed by session.
#[derive(Clone, Default)]
pub struct TaskScheduler {
    inner: Arc<SchedulerInner>,
}

#[derive(Default)]
struct SchedulerInner {
    tasks: DashMap<TaskKey, ScheduledTask>,
    generation: AtomicU64,
}

impl TaskScheduler {
    /// Run `task` after `delay`, replacing any pending task with the same key.
    pub fn schedule<F>(&self, key: TaskKey, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        // Released once the entry is registered.
        let (start, started) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            if started.await.is_err() {
                return;
            }
            sleep(delay).await;
            inner
                .tasks
                .remove_if(&key, |_, scheduled| scheduled.generation == generation);
            task.await;
        });

        if let Some(previous) = self
            .inner
            .tasks
            .insert(key, ScheduledTask { generation, handle })
        {
            previous.handle.abort();
        }
        let _ = start.send(());
        debug!(session_id = %key.session_id, kind = ?key.kind, delay_ms = delay.as_millis() as u64, "task scheduled");
    }

    /// Cancel one pending task. Returns whether it was still pending.
    pub fn cancel(&self, key: &TaskKey) -> bool {
        match self.inner.tasks.remove(key) {
            Some((_, scheduled)) => {
                scheduled.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending task of a session.
    pub fn cancel_session(&self, session_id: Uuid) {
        self.inner.tasks.retain(|key, scheduled| {
            if key.session_id == session_id {
                scheduled.handle.abort();
                false
            } else {
                true
            }
        });
        debug!(session_id = %session_id, "session tasks cancelled");
    }

    /// Whether a task with `key` is waiting to run.
    pub fn is_pending(&self, key: &TaskKey) -> bool {
        self.inner.tasks.contains_key(key)
    }

    /// Kinds of the tasks waiting to run for a session.
    pub fn pending(&self, session_id: Uuid) -> Vec<TaskKind> {
        self.inner
            .tasks
            .iter()
            .filter(|entry| entry.key().session_id == session_id)
            .map(|entry| entry.key().kind)
            .collect()
    }
}
