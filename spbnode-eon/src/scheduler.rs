//! Periodic task primitive used to drive the metrics publisher.

use std::time::Duration;

use futures::future::BoxFuture;
use tokio::{
    select,
    sync::watch,
    time::{interval_at, Instant, MissedTickBehavior},
};

/// The future produced by one invocation of a periodic task
pub type TickFuture = BoxFuture<'static, ()>;

/// A periodic task body. Called once per tick, each returned future is run to completion before the next tick.
pub type PeriodicTask = Box<dyn FnMut() -> TickFuture + Send>;

/// Runs a task periodically until cancelled.
pub trait Scheduler: Send + Sync {
    /// Schedule `task` every `period`, starting one period from now.
    fn schedule(&self, period: Duration, task: PeriodicTask) -> TaskHandle;
}

pub type DynScheduler = dyn Scheduler + Send + Sync;

/// Handle to a scheduled task.
///
/// [TaskHandle::cancel] prevents any further invocation but does not abort
/// one already in progress. Dropping the handle cancels the task.
#[derive(Debug)]
pub struct TaskHandle {
    cancel: watch::Sender<bool>,
}

impl TaskHandle {
    /// Create a handle and the receiver a scheduler implementation watches for cancellation
    pub fn new_pair() -> (Self, watch::Receiver<bool>) {
        let (cancel, rx) = watch::channel(false);
        (Self { cancel }, rx)
    }

    /// Cancel the task. Idempotent.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

/// [Scheduler] backed by a tokio task and interval.
///
/// A tick that runs longer than the period delays the following ticks rather than
/// skipping them.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule(&self, period: Duration, mut task: PeriodicTask) -> TaskHandle {
        let (handle, mut cancelled) = TaskHandle::new_pair();
        tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                select! {
                    biased;
                    res = cancelled.changed() => {
                        // sender dropped or cancel requested
                        if res.is_err() || *cancelled.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        if *cancelled.borrow() {
                            break;
                        }
                        task().await;
                    }
                }
            }
        });
        handle
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use futures::FutureExt;

    use super::*;

    fn counting_task(counter: Arc<AtomicUsize>) -> PeriodicTask {
        Box::new(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_every_period_after_first_delay() {
        let counter = Arc::new(AtomicUsize::new(0));
        let handle =
            TokioScheduler.schedule(Duration::from_millis(100), counting_task(counter.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_future_ticks() {
        let counter = Arc::new(AtomicUsize::new(0));
        let handle =
            TokioScheduler.schedule(Duration::from_millis(100), counting_task(counter.clone()));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        handle.cancel();
        handle.cancel();
        assert!(handle.is_cancelled());
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_cancels() {
        let counter = Arc::new(AtomicUsize::new(0));
        let handle =
            TokioScheduler.schedule(Duration::from_millis(100), counting_task(counter.clone()));
        drop(handle);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_tick_completes_after_cancel() {
        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        let (s, f) = (started.clone(), finished.clone());
        let handle = TokioScheduler.schedule(
            Duration::from_millis(100),
            Box::new(move || {
                let (s, f) = (s.clone(), f.clone());
                async move {
                    s.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    f.fetch_add(1, Ordering::SeqCst);
                }
                .boxed()
            }),
        );
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
        handle.cancel();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }
}
