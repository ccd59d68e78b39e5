//! The scheduler run loop.
//!
//! Each tick sorts both lanes by `(next_run asc, priority desc)`, starts
//! at most one due exclusive task (if none is in flight) and every due
//! parallel task. Completions clear `running`, stamp `last_run`, then
//! either reschedule (`next_run = last_run + interval`) or drop the task,
//! and persist the queues.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use scavbot_core_types::TaskId;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{SchedulerError, TaskError};
use crate::handler::TaskHandlerRegistry;
use crate::metrics;
use crate::model::{offset_by_millis, Lane, ScheduleRequest, ScheduledTask, Task};
use crate::queue::TaskQueue;
use crate::snapshot::{SchedulerSnapshot, SnapshotStore};

/// Default tick; tasks cannot be timed more finely than this.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Default)]
struct SchedulerState {
    exclusive: TaskQueue,
    parallel: TaskQueue,
    exclusive_busy: bool,
    task_id_counter: u64,
}

impl SchedulerState {
    fn queue_mut(&mut self, lane: Lane) -> &mut TaskQueue {
        match lane {
            Lane::Exclusive => &mut self.exclusive,
            Lane::Parallel => &mut self.parallel,
        }
    }

    fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            exclusive_queue: self.exclusive.to_vec(),
            parallel_queue: self.parallel.to_vec(),
            task_id_counter: self.task_id_counter,
        }
    }
}

struct Inner {
    state: Mutex<SchedulerState>,
    handlers: Arc<TaskHandlerRegistry>,
    store: Arc<dyn SnapshotStore>,
    clock: Arc<dyn Clock>,
    paused: AtomicBool,
    tick_interval: Duration,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

/// Cheap to clone; clones share the same queues.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(handlers: Arc<TaskHandlerRegistry>, store: Arc<dyn SnapshotStore>) -> Self {
        Self::with_clock(handlers, store, Arc::new(SystemClock), DEFAULT_TICK_INTERVAL)
    }

    pub fn with_clock(
        handlers: Arc<TaskHandlerRegistry>,
        store: Arc<dyn SnapshotStore>,
        clock: Arc<dyn Clock>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SchedulerState::default()),
                handlers,
                store,
                clock,
                paused: AtomicBool::new(false),
                tick_interval,
                ticker: Mutex::new(None),
            }),
        }
    }

    /// Load the persisted queues. Call once, before [`Scheduler::start`].
    ///
    /// A missing or unreadable snapshot leaves the queues empty. Restored
    /// tasks are never considered running; tasks whose interval cannot be
    /// applied are dropped.
    pub fn restore_from_storage(&self) -> usize {
        let snapshot = match self.inner.store.restore() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                debug!("no scheduler snapshot to restore");
                return 0;
            }
            Err(err) => {
                warn!(%err, "scheduler snapshot unreadable; starting empty");
                return 0;
            }
        };

        let now = self.inner.clock.now();
        let mut seen = HashSet::new();
        let mut max_sequence = 0;
        let mut accept = |tasks: Vec<Task>| -> Vec<Task> {
            tasks
                .into_iter()
                .filter(|task| seen.insert(task.id.clone()))
                .filter(|task| match task.interval_ms {
                    Some(ms) if !interval_fits(now, ms) => {
                        warn!(task_id = %task.id, interval_ms = ms, "restored task has an unusable interval; dropped");
                        false
                    }
                    _ => true,
                })
                .map(|mut task| {
                    task.running = false;
                    max_sequence = max_sequence.max(task.id.sequence().unwrap_or(0));
                    task
                })
                .collect()
        };
        let exclusive = accept(snapshot.exclusive_queue);
        let parallel = accept(snapshot.parallel_queue);

        let mut state = self.inner.state.lock();
        state.exclusive = TaskQueue::from_tasks(exclusive);
        state.parallel = TaskQueue::from_tasks(parallel);
        state.exclusive_busy = false;
        state.task_id_counter = snapshot.task_id_counter.max(max_sequence);
        let restored = state.exclusive.len() + state.parallel.len();
        info!(
            restored,
            task_id_counter = state.task_id_counter,
            "Scheduler state restored"
        );
        restored
    }

    pub fn schedule_task(&self, request: ScheduleRequest) -> Result<TaskId, SchedulerError> {
        let now = self.inner.clock.now();
        let interval_ms = match request.interval {
            Some(interval) => {
                let ms = u64::try_from(interval.as_millis())
                    .map_err(|_| SchedulerError::InvalidInterval)?;
                if !interval_fits(now, ms) {
                    return Err(SchedulerError::InvalidInterval);
                }
                Some(ms)
            }
            None => None,
        };

        let mut state = self.inner.state.lock();
        state.task_id_counter += 1;
        let id = TaskId::from_parts(now.timestamp_millis(), state.task_id_counter);
        let task = Task {
            id: id.clone(),
            action: request.action,
            last_run: None,
            next_run: request.run_at.unwrap_or(now),
            running: false,
            priority: request.priority,
            interval_ms,
        };
        info!(
            task_id = %id,
            kind = %task.action.kind,
            lane = %request.lane,
            priority = task.priority,
            interval_ms = ?task.interval_ms,
            "Task scheduled"
        );
        state.queue_mut(request.lane).push(task);
        self.inner.persist(&state);
        metrics::record_scheduled();
        Ok(id)
    }

    /// Remove `id` from whichever lane holds it. A run already in flight
    /// is not interrupted.
    pub fn remove_by_id(&self, id: &TaskId) -> bool {
        self.remove_by_predicate(|task| &task.id == id) > 0
    }

    pub fn remove_by_predicate<F>(&self, mut predicate: F) -> usize
    where
        F: FnMut(&Task) -> bool,
    {
        let mut state = self.inner.state.lock();
        let removed = state.exclusive.remove_where(&mut predicate)
            + state.parallel.remove_where(&mut predicate);
        self.inner.persist(&state);
        if removed > 0 {
            metrics::record_removed(removed);
            info!(removed, "Tasks removed");
        }
        removed
    }

    pub fn pause(&self) {
        if !self.inner.paused.swap(true, Ordering::SeqCst) {
            info!("Scheduler paused");
        }
    }

    pub fn resume(&self) {
        if self.inner.paused.swap(false, Ordering::SeqCst) {
            info!("Scheduler resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    /// Spawn the periodic run loop. Idempotent.
    pub fn start(&self) {
        let mut ticker = self.inner.ticker.lock();
        if ticker.is_some() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let period = self.inner.tick_interval;
        *ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                inner.tick();
            }
        }));
        info!(tick_ms = period.as_millis() as u64, "Scheduler started");
    }

    /// Cancel the run loop. Idempotent; tasks already running finish.
    pub fn stop(&self) {
        if let Some(handle) = self.inner.ticker.lock().take() {
            handle.abort();
            info!("Scheduler stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.ticker.lock().is_some()
    }

    /// One dispatch pass. Returns handles for the runs it started.
    pub fn tick(&self) -> Vec<JoinHandle<()>> {
        self.inner.tick()
    }

    /// Both lanes, exclusive first, in current queue order.
    pub fn tasks(&self) -> Vec<ScheduledTask> {
        let state = self.inner.state.lock();
        let exclusive = state.exclusive.iter().map(|task| ScheduledTask {
            lane: Lane::Exclusive,
            task: task.clone(),
        });
        let parallel = state.parallel.iter().map(|task| ScheduledTask {
            lane: Lane::Parallel,
            task: task.clone(),
        });
        exclusive.chain(parallel).collect()
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        self.inner.state.lock().snapshot()
    }
}

impl Inner {
    fn tick(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        if self.paused.load(Ordering::SeqCst) {
            debug!("tick skipped; scheduler paused");
            return Vec::new();
        }
        let now = self.clock.now();
        let mut launches = Vec::new();
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            state.exclusive.sort_for_dispatch();
            state.parallel.sort_for_dispatch();

            if !state.exclusive_busy {
                if let Some(task) = state.exclusive.first_due_mut(now) {
                    task.running = true;
                    state.exclusive_busy = true;
                    launches.push((Lane::Exclusive, task.clone()));
                }
            }
            for task in state.parallel.due_mut(now) {
                task.running = true;
                launches.push((Lane::Parallel, task.clone()));
            }
        }

        launches
            .into_iter()
            .map(|(lane, task)| {
                let inner = Arc::clone(self);
                tokio::spawn(async move { inner.run_task(lane, task).await })
            })
            .collect()
    }

    async fn run_task(self: Arc<Self>, lane: Lane, task: Task) {
        metrics::record_started();
        info!(task_id = %task.id, kind = %task.action.kind, %lane, "Task started");

        let outcome = match self.handlers.get(&task.action.kind) {
            Some(handler) => AssertUnwindSafe(handler.run(&task))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(TaskError::Panicked(panic_message(panic.as_ref())))),
            None => Err(TaskError::UnknownKind(task.action.kind.clone())),
        };

        match &outcome {
            Ok(()) => {
                metrics::record_completed();
                info!(task_id = %task.id, %lane, "Task completed");
            }
            Err(err) => {
                metrics::record_failed();
                warn!(task_id = %task.id, %lane, %err, "Task failed");
            }
        }
        self.finish(lane, &task.id);
    }

    fn finish(&self, lane: Lane, id: &TaskId) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        if lane == Lane::Exclusive {
            state.exclusive_busy = false;
        }
        let queue = state.queue_mut(lane);
        let recurring = match queue.get_mut(id) {
            Some(task) => {
                task.running = false;
                task.last_run = Some(now);
                match task.interval_ms.map(|ms| offset_by_millis(now, ms)) {
                    Some(Some(next_run)) => {
                        task.next_run = next_run;
                        debug!(task_id = %id, next_run = %task.next_run, "task rescheduled");
                        true
                    }
                    Some(None) => {
                        warn!(task_id = %id, "next run out of time range; task retired");
                        false
                    }
                    None => false,
                }
            }
            // Removed while it ran.
            None => true,
        };
        if !recurring {
            queue.remove(id);
            debug!(task_id = %id, "one-shot task retired");
        }
        self.persist(&state);
    }

    fn persist(&self, state: &SchedulerState) {
        if let Err(err) = self.store.persist(&state.snapshot()) {
            warn!(%err, "scheduler snapshot not persisted");
        }
    }
}

fn interval_fits(now: chrono::DateTime<chrono::Utc>, interval_ms: u64) -> bool {
    interval_ms > 0 && offset_by_millis(now, interval_ms).is_some()
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::handler::handler_fn;
    use crate::model::TaskAction;
    use crate::snapshot::KvSnapshotStore;
    use scavbot_state_center::InMemoryKvStore;
    use serde_json::Value;

    fn scheduler_with(handlers: TaskHandlerRegistry) -> (Scheduler, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(KvSnapshotStore::new(InMemoryKvStore::new()));
        let scheduler =
            Scheduler::with_clock(Arc::new(handlers), store, clock.clone(), DEFAULT_TICK_INTERVAL);
        (scheduler, clock)
    }

    async fn drain(handles: Vec<JoinHandle<()>>) {
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn unknown_kind_counts_as_a_run() {
        let (scheduler, _clock) = scheduler_with(TaskHandlerRegistry::new());
        scheduler
            .schedule_task(ScheduleRequest::parallel(TaskAction::new("missing", Value::Null)))
            .unwrap();

        drain(scheduler.tick()).await;
        assert!(scheduler.tasks().is_empty());
    }

    #[tokio::test]
    async fn panicking_task_is_contained_and_rescheduled() {
        let handlers = TaskHandlerRegistry::new();
        handlers.register(
            "explode",
            handler_fn(|_task| async {
                if true {
                    panic!("boom");
                }
                Ok(())
            }),
        );
        let (scheduler, clock) = scheduler_with(handlers);
        scheduler
            .schedule_task(
                ScheduleRequest::exclusive(TaskAction::new("explode", Value::Null))
                    .every(Duration::from_secs(60)),
            )
            .unwrap();

        drain(scheduler.tick()).await;

        let tasks = scheduler.tasks();
        assert_eq!(tasks.len(), 1);
        let task = &tasks[0].task;
        assert!(!task.running);
        assert_eq!(task.last_run, Some(clock.now()));

        // The exclusive lane is free again.
        clock.advance(Duration::from_secs(60));
        assert_eq!(scheduler.tick().len(), 1);
    }

    #[tokio::test]
    async fn zero_interval_is_rejected() {
        let (scheduler, _clock) = scheduler_with(TaskHandlerRegistry::new());
        let err = scheduler
            .schedule_task(
                ScheduleRequest::parallel(TaskAction::new("noop", Value::Null))
                    .every(Duration::ZERO),
            )
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidInterval));
    }

    #[tokio::test]
    async fn interval_beyond_time_range_is_rejected() {
        let (scheduler, _clock) = scheduler_with(TaskHandlerRegistry::new());
        for interval in [Duration::from_millis(10_000_000_000_000_000), Duration::MAX] {
            let err = scheduler
                .schedule_task(
                    ScheduleRequest::exclusive(TaskAction::new("noop", Value::Null))
                        .every(interval),
                )
                .unwrap_err();
            assert!(matches!(err, SchedulerError::InvalidInterval));
        }
        assert!(scheduler.tasks().is_empty());
    }

    #[tokio::test]
    async fn recurring_task_whose_next_run_overflows_is_retired() {
        let handlers = TaskHandlerRegistry::new();
        let runs = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = runs.clone();
        handlers.register(
            "count",
            handler_fn(move |_task| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        );
        let (scheduler, clock) = scheduler_with(handlers);
        clock.set(chrono::DateTime::<chrono::Utc>::MAX_UTC - chrono::Duration::days(2));
        scheduler
            .schedule_task(
                ScheduleRequest::exclusive(TaskAction::new("count", Value::Null))
                    .every(Duration::from_secs(24 * 3600)),
            )
            .unwrap();

        let handles = scheduler.tick();
        clock.advance(Duration::from_secs(36 * 3600));
        drain(handles).await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(scheduler.tasks().is_empty());
        for _ in 0..3 {
            clock.advance(Duration::from_secs(1));
            assert!(scheduler.tick().is_empty());
        }
        assert!(scheduler.snapshot().exclusive_queue.is_empty());
    }

    #[tokio::test]
    async fn restore_drops_tasks_with_unusable_intervals() {
        let kv = InMemoryKvStore::new();
        let store = Arc::new(KvSnapshotStore::new(kv));
        let clock = Arc::new(ManualClock::default());
        let task = |seq: u64, interval_ms: Option<u64>| Task {
            id: TaskId::from_parts(clock.now().timestamp_millis(), seq),
            action: TaskAction::new("noop", Value::Null),
            last_run: None,
            next_run: clock.now(),
            running: false,
            priority: 0,
            interval_ms,
        };
        store
            .persist(&SchedulerSnapshot {
                exclusive_queue: vec![task(1, Some(u64::MAX)), task(2, Some(60_000))],
                parallel_queue: vec![task(3, Some(0)), task(4, None)],
                task_id_counter: 4,
            })
            .unwrap();

        let scheduler = Scheduler::with_clock(
            Arc::new(TaskHandlerRegistry::new()),
            store,
            clock.clone(),
            DEFAULT_TICK_INTERVAL,
        );
        assert_eq!(scheduler.restore_from_storage(), 2);
        let ids: Vec<_> = scheduler
            .tasks()
            .into_iter()
            .map(|entry| entry.task.id.sequence())
            .collect();
        assert_eq!(ids, vec![Some(2), Some(4)]);
    }

    #[tokio::test]
    async fn ids_embed_creation_time_and_sequence() {
        let (scheduler, clock) = scheduler_with(TaskHandlerRegistry::new());
        let a = scheduler
            .schedule_task(ScheduleRequest::parallel(TaskAction::new("noop", Value::Null)))
            .unwrap();
        let b = scheduler
            .schedule_task(ScheduleRequest::exclusive(TaskAction::new("noop", Value::Null)))
            .unwrap();

        assert_eq!(a, TaskId::from_parts(clock.now().timestamp_millis(), 1));
        assert_eq!(b.sequence(), Some(2));
        assert_eq!(scheduler.snapshot().task_id_counter, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_ticks_until_stopped() {
        let handlers = TaskHandlerRegistry::new();
        let runs = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = runs.clone();
        handlers.register(
            "count",
            handler_fn(move |_task| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        );
        let store = Arc::new(KvSnapshotStore::new(InMemoryKvStore::new()));
        let scheduler = Scheduler::new(Arc::new(handlers), store);
        scheduler
            .schedule_task(
                ScheduleRequest::parallel(TaskAction::new("count", Value::Null))
                    .every(Duration::from_secs(1)),
            )
            .unwrap();

        scheduler.start();
        scheduler.start();
        assert!(scheduler.is_running());
        tokio::time::sleep(Duration::from_millis(2500)).await;
        scheduler.stop();
        scheduler.stop();
        assert!(!scheduler.is_running());
        assert!(runs.load(Ordering::SeqCst) >= 1);
    }
}
