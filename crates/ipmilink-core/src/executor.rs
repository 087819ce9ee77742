// ── Per-connection task executor ──
//
// One tokio task per connection owns the provider and drains a FIFO
// channel. Producers only ever push onto the channel; every device
// exchange for the connection happens inside the worker. Each accepted
// task gets its callback exactly once, with the failure status if the
// work failed or the worker shut down first.

use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::address::Address;
use crate::error::CoreError;
use crate::model::{AlarmStatus, Entity, Severity};
use crate::provider::Provider;

/// Completion callback. Receives the task's entity with results and
/// `SEVR`/`STAT` filled in.
pub type Callback = Box<dyn FnOnce(Entity) + Send + 'static>;

// ── Task ────────────────────────────────────────────────────────────

pub struct Task {
    pub address: Address,
    pub entity: Entity,
    on_complete: Callback,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("address", &self.address)
            .field("entity", &self.entity)
            .finish_non_exhaustive()
    }
}

impl Task {
    pub fn new(
        address: Address,
        entity: Entity,
        on_complete: impl FnOnce(Entity) + Send + 'static,
    ) -> Self {
        Self {
            address,
            entity,
            on_complete: Box::new(on_complete),
        }
    }

    fn fail(self) {
        let Self {
            mut entity,
            on_complete,
            ..
        } = self;
        entity.set_status(Severity::Invalid, AlarmStatus::Comm);
        on_complete(entity);
    }
}

// ── Executor ────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct TaskExecutor {
    connection: String,
    tx: mpsc::UnboundedSender<Task>,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TaskExecutor {
    /// Start the worker on the current tokio runtime.
    pub fn spawn<P>(connection: impl Into<String>, provider: P, idle_interval: Duration) -> Self
    where
        P: Provider + 'static,
    {
        let connection = connection.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(worker(
            connection.clone(),
            provider,
            rx,
            cancel.clone(),
            idle_interval,
        ));
        Self {
            connection,
            tx,
            cancel,
            handle: Mutex::new(Some(handle)),
        }
    }

    pub fn connection(&self) -> &str {
        &self.connection
    }

    /// Queue a task. Returns `false`, without calling the callback, if
    /// the worker has stopped.
    pub fn schedule(&self, task: Task) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.tx.send(task).is_ok()
    }

    /// Schedule and wait for the completed entity.
    pub async fn execute(&self, address: Address, entity: Entity) -> Result<Entity, CoreError> {
        let (done_tx, done_rx) = oneshot::channel();
        let task = Task::new(address, entity, move |entity| {
            let _ = done_tx.send(entity);
        });
        if !self.schedule(task) {
            return Err(self.stopped());
        }
        done_rx.await.map_err(|_| self.stopped())
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && !self.tx.is_closed()
    }

    /// Stop the worker and wait for it. Tasks still queued complete with
    /// the failure status.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(connection = %self.connection, error = %e, "worker ended abnormally");
            }
        }
    }

    fn stopped(&self) -> CoreError {
        CoreError::Internal(format!("worker for '{}' has stopped", self.connection))
    }
}

impl Drop for TaskExecutor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Worker ──────────────────────────────────────────────────────────

async fn worker<P: Provider>(
    connection: String,
    mut provider: P,
    mut rx: mpsc::UnboundedReceiver<Task>,
    cancel: CancellationToken,
    idle_interval: Duration,
) {
    debug!(connection = %connection, "worker started");

    loop {
        if cancel.is_cancelled() {
            break;
        }
        provider.process().await;

        let task = match rx.try_recv() {
            Ok(task) => task,
            Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    next = rx.recv() => match next {
                        Some(task) => task,
                        None => break,
                    },
                    () = tokio::time::sleep(idle_interval) => continue,
                }
            }
        };
        run(&mut provider, task).await;
    }

    rx.close();
    let mut abandoned = 0_usize;
    while let Ok(task) = rx.try_recv() {
        task.fail();
        abandoned += 1;
    }
    info!(connection = %connection, abandoned, "worker stopped");
}

/// Execute one task and hand the result to its callback.
async fn run<P: Provider + ?Sized>(provider: &mut P, task: Task) {
    let Task {
        address,
        mut entity,
        on_complete,
    } = task;

    let outcome = match &address {
        Address::Sensor(_) | Address::Led(_) => provider
            .entity_value(&address)
            .await
            .map(|value| entity.merge(value)),
        Address::VendorCommand(command) => {
            provider.dispatch_vendor_command(command, &entity).await
        }
    };

    match outcome {
        Ok(()) => entity.set_status(Severity::NoAlarm, AlarmStatus::NoAlarm),
        Err(e) => {
            warn!(address = %address, error = %e, "task failed");
            entity.set_status(Severity::Invalid, AlarmStatus::Comm);
        }
    }
    on_complete(entity);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::address::VendorCommandAddress;
    use crate::model::fields;

    /// Answers every read with an incrementing `VAL`; fails addresses on
    /// connection "bad".
    #[derive(Default)]
    struct Counter {
        reads: i64,
        commands: Arc<AtomicUsize>,
        processed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Provider for Counter {
        async fn entity_value(&mut self, address: &Address) -> Result<Entity, CoreError> {
            if address.connection_id() == "bad" {
                return Err(CoreError::protocol("boom"));
            }
            self.reads += 1;
            Ok(Entity::new().with(fields::VAL, self.reads))
        }

        async fn dispatch_vendor_command(
            &mut self,
            _address: &VendorCommandAddress,
            _entity: &Entity,
        ) -> Result<(), CoreError> {
            self.commands.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn process(&mut self) {
            self.processed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn sensor(conn: &str) -> Address {
        Address::parse(&format!("{conn} SENSOR 1:1 'T'")).unwrap()
    }

    #[tokio::test]
    async fn success_merges_value_and_clears_status() {
        let executor = TaskExecutor::spawn("c", Counter::default(), Duration::from_millis(5));
        let entity = Entity::new().with("DESC", "kept").with(fields::SEVR, 3_i64);
        let done = executor.execute(sensor("c"), entity).await.unwrap();

        assert_eq!(done.int(fields::VAL), Some(1));
        assert_eq!(done.string("DESC"), Some("kept"));
        assert_eq!(done.int(fields::SEVR), Some(0));
        assert_eq!(done.int(fields::STAT), Some(0));
        executor.shutdown().await;
    }

    #[tokio::test]
    async fn failure_sets_invalid_comm_and_keeps_prior_value() {
        let executor = TaskExecutor::spawn("bad", Counter::default(), Duration::from_millis(5));
        let entity = Entity::new().with(fields::VAL, 7.5);
        let done = executor.execute(sensor("bad"), entity).await.unwrap();

        assert_eq!(done.double(fields::VAL), Some(7.5));
        assert_eq!(done.int(fields::SEVR), Some(3));
        assert_eq!(done.int(fields::STAT), Some(9));
        executor.shutdown().await;
    }

    #[tokio::test]
    async fn vendor_commands_merge_nothing() {
        let commands = Arc::new(AtomicUsize::new(0));
        let provider = Counter {
            commands: Arc::clone(&commands),
            ..Counter::default()
        };
        let executor = TaskExecutor::spawn("c", provider, Duration::from_millis(5));
        let cmd = Address::parse("c OEM_CMD vt reboot").unwrap();
        let done = executor
            .execute(cmd, Entity::new().with(fields::VAL, 1_i64))
            .await
            .unwrap();

        assert_eq!(commands.load(Ordering::SeqCst), 1);
        assert_eq!(done.int(fields::VAL), Some(1));
        executor.shutdown().await;
    }

    #[tokio::test]
    async fn callbacks_fire_in_schedule_order() {
        let executor = TaskExecutor::spawn("c", Counter::default(), Duration::from_millis(5));
        let (tx, mut rx) = mpsc::unbounded_channel();
        for name in ["T1", "T2", "T3"] {
            let tx = tx.clone();
            let task = Task::new(sensor("c"), Entity::new(), move |entity| {
                let _ = tx.send((name, entity.int(fields::VAL)));
            });
            assert!(executor.schedule(task));
        }
        drop(tx);

        let mut seen = Vec::new();
        while let Some(item) = rx.recv().await {
            seen.push(item);
        }
        assert_eq!(
            seen,
            [("T1", Some(1)), ("T2", Some(2)), ("T3", Some(3))]
        );
        executor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn idle_worker_keeps_running_maintenance() {
        let processed = Arc::new(AtomicUsize::new(0));
        let provider = Counter {
            processed: Arc::clone(&processed),
            ..Counter::default()
        };
        let executor = TaskExecutor::spawn("c", provider, Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(1050)).await;
        let runs = processed.load(Ordering::SeqCst);
        assert!((10..=12).contains(&runs), "maintenance ran {runs} times");
        executor.shutdown().await;
    }

    #[tokio::test]
    async fn schedule_fails_after_shutdown() {
        let executor = TaskExecutor::spawn("c", Counter::default(), Duration::from_millis(5));
        executor.shutdown().await;

        let called = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&called);
        let task = Task::new(sensor("c"), Entity::new(), move |_| {
            flag.fetch_add(1, Ordering::SeqCst);
        });
        assert!(!executor.schedule(task));
        assert!(!executor.is_running());
        assert_eq!(called.load(Ordering::SeqCst), 0);
        assert!(executor.execute(sensor("c"), Entity::new()).await.is_err());
    }

    #[test]
    fn abandoned_tasks_get_the_failure_status() {
        let (tx, rx) = std::sync::mpsc::channel();
        Task::new(sensor("c"), Entity::new(), move |entity| {
            tx.send(entity).unwrap();
        })
        .fail();
        let entity = rx.recv().unwrap();
        assert_eq!(entity.int(fields::SEVR), Some(3));
        assert_eq!(entity.int(fields::STAT), Some(9));
    }
}
