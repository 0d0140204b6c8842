use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::Worker;

/// Drive `worker` until `shutdown` becomes `true` (or its sender is dropped).
///
/// After a cycle that completed work the next cycle starts immediately; after
/// an idle or failed cycle the driver waits `pause`, waking early on shutdown.
/// The signal is only checked between cycles, so a cycle in progress always
/// runs to its end.
pub async fn work(worker: Arc<dyn Worker>, pause: Duration, mut shutdown: watch::Receiver<bool>) {
    let name = worker.name().to_string();
    info!(worker = %name, "worker started");

    loop {
        if *shutdown.borrow_and_update() || shutdown.has_changed().is_err() {
            break;
        }

        let idle = match worker.run_once().await {
            Ok(true) => false,
            Ok(false) => {
                debug!(worker = %name, "no work done, sleeping");
                true
            }
            Err(e) => {
                error!(worker = %name, error = %e, work_done = e.work_done(), "worker cycle failed");
                true
            }
        };

        if idle {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = sleep(pause) => {}
            }
        }
    }

    info!(worker = %name, "stop signal received, worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkerError;
    use async_trait::async_trait;
    use herald_store::StoreError;
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[derive(Clone, Copy)]
    enum Outcome {
        Work,
        Idle,
        Fail,
    }

    /// Records when each cycle ran and raises shutdown after `stop_after`
    /// cycles, either by sending `true` or by dropping the sender.
    struct Scripted {
        outcome: Outcome,
        stop_after: usize,
        drop_sender: bool,
        stop: Mutex<Option<watch::Sender<bool>>>,
        cycles: Mutex<Vec<Instant>>,
    }

    impl Scripted {
        fn new(outcome: Outcome, stop_after: usize) -> (Arc<Self>, watch::Receiver<bool>) {
            Self::build(outcome, stop_after, false)
        }

        fn dropping(outcome: Outcome, stop_after: usize) -> (Arc<Self>, watch::Receiver<bool>) {
            Self::build(outcome, stop_after, true)
        }

        fn build(
            outcome: Outcome,
            stop_after: usize,
            drop_sender: bool,
        ) -> (Arc<Self>, watch::Receiver<bool>) {
            let (stop, rx) = watch::channel(false);
            let worker = Arc::new(Self {
                outcome,
                stop_after,
                drop_sender,
                stop: Mutex::new(Some(stop)),
                cycles: Mutex::new(Vec::new()),
            });
            (worker, rx)
        }

        fn cycles(&self) -> Vec<Instant> {
            self.cycles.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Worker for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn run_once(&self) -> Result<bool, WorkerError> {
            let count = {
                let mut cycles = self.cycles.lock().unwrap();
                cycles.push(Instant::now());
                cycles.len()
            };
            if count >= self.stop_after {
                let mut stop = self.stop.lock().unwrap();
                if self.drop_sender {
                    stop.take();
                } else if let Some(tx) = stop.as_ref() {
                    let _ = tx.send(true);
                }
            }
            match self.outcome {
                Outcome::Work => Ok(true),
                Outcome::Idle => Ok(false),
                Outcome::Fail => Err(WorkerError::Claim(StoreError::Poisoned)),
            }
        }
    }

    fn gaps(cycles: &[Instant]) -> Vec<Duration> {
        cycles.windows(2).map(|w| w[1] - w[0]).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn loops_immediately_while_work_is_done() {
        let (worker, rx) = Scripted::new(Outcome::Work, 5);
        work(worker.clone(), Duration::from_secs(5), rx).await;

        let cycles = worker.cycles();
        assert_eq!(cycles.len(), 5);
        assert!(gaps(&cycles).iter().all(|g| g.is_zero()));
    }

    #[tokio::test(start_paused = true)]
    async fn busy_worker_exits_when_sender_is_dropped() {
        let (worker, rx) = Scripted::dropping(Outcome::Work, 4);
        work(worker.clone(), Duration::from_secs(5), rx).await;
        assert_eq!(worker.cycles().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_worker_exits_when_sender_is_dropped() {
        let (worker, rx) = Scripted::dropping(Outcome::Idle, 2);
        let started = Instant::now();
        work(worker.clone(), Duration::from_secs(3600), rx).await;
        assert_eq!(worker.cycles().len(), 2);
        assert!(started.elapsed() < Duration::from_secs(2 * 3600));
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_after_an_idle_cycle() {
        let (worker, rx) = Scripted::new(Outcome::Idle, 3);
        work(worker.clone(), Duration::from_secs(5), rx).await;

        let cycles = worker.cycles();
        assert_eq!(cycles.len(), 3);
        assert!(gaps(&cycles).iter().all(|g| *g >= Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_after_a_failed_cycle() {
        let (worker, rx) = Scripted::new(Outcome::Fail, 2);
        work(worker.clone(), Duration::from_secs(5), rx).await;

        let cycles = worker.cycles();
        assert_eq!(cycles.len(), 2);
        assert!(gaps(&cycles)[0] >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_the_idle_sleep() {
        let (worker, _unused) = Scripted::new(Outcome::Idle, usize::MAX);
        let (tx, rx) = watch::channel(false);
        let started = Instant::now();
        let handle = tokio::spawn(work(worker.clone(), Duration::from_secs(3600), rx));

        sleep(Duration::from_secs(1)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(3600));
        assert_eq!(worker.cycles().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn already_stopped_runs_no_cycle() {
        let (worker, _unused) = Scripted::new(Outcome::Work, usize::MAX);
        let (tx, rx) = watch::channel(true);
        work(worker.clone(), Duration::from_secs(5), rx).await;
        drop(tx);
        assert!(worker.cycles().is_empty());
    }
}
