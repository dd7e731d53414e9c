//! Two periodic triggers, each on its own interval.
//!
//! A tick never waits for the previous tick's work: each one runs the job on
//! the blocking pool and logs the returned status. A job that errors or
//! panics is logged and the trigger keeps firing.

use crate::error::PipelineResult;
use crate::pipeline::Pipeline;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    pub dispatch_every: Duration,
    pub predict_every: Duration,
}

impl Scheduler {
    pub fn new(dispatch_every: Duration, predict_every: Duration) -> Self {
        Self {
            dispatch_every,
            predict_every,
        }
    }

    /// Drive `DispatchTick` and `PredictionTick` until `shutdown` flips to true
    /// (or its sender is dropped).
    pub async fn run_pipeline(self, pipeline: Pipeline, shutdown: watch::Receiver<bool>) {
        let dispatcher = Arc::clone(&pipeline.dispatcher);
        let updater = Arc::clone(&pipeline.updater);
        self.run(
            move || dispatcher.tick(),
            move || updater.tick(),
            shutdown,
        )
        .await;
    }

    /// Generic form of [`run_pipeline`](Self::run_pipeline) over any two jobs.
    pub async fn run<D, P, DS, PS>(self, dispatch: D, predict: P, shutdown: watch::Receiver<bool>)
    where
        D: Fn() -> PipelineResult<DS> + Send + Sync + 'static,
        P: Fn() -> PipelineResult<PS> + Send + Sync + 'static,
        DS: Display + Send + 'static,
        PS: Display + Send + 'static,
    {
        let d = spawn_trigger("dispatch", self.dispatch_every, shutdown.clone(), Arc::new(dispatch));
        let p = spawn_trigger("prediction", self.predict_every, shutdown, Arc::new(predict));
        for handle in [d, p] {
            if let Err(e) = handle.await {
                error!(error = %e, "Trigger loop terminated abnormally");
            }
        }
    }
}

fn spawn_trigger<F, S>(
    name: &'static str,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
    job: Arc<F>,
) -> JoinHandle<()>
where
    F: Fn() -> PipelineResult<S> + Send + Sync + 'static,
    S: Display + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(trigger = name, every_secs = every.as_secs_f64(), "Trigger started");
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let job = Arc::clone(&job);
                    tokio::spawn(async move {
                        match tokio::task::spawn_blocking(move || job()).await {
                            Ok(Ok(status)) => info!(trigger = name, %status, "Tick finished"),
                            Ok(Err(e)) => warn!(trigger = name, error = %e, "Tick failed"),
                            Err(e) => error!(trigger = name, error = %e, "Tick panicked"),
                        }
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!(trigger = name, "Trigger stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn both_triggers_fire_and_survive_failures() {
        let dispatched = Arc::new(AtomicUsize::new(0));
        let predicted = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(false);

        let d = Arc::clone(&dispatched);
        let p = Arc::clone(&predicted);
        let sched = Scheduler::new(Duration::from_millis(10), Duration::from_millis(15));
        let run = tokio::spawn(sched.run(
            move || -> PipelineResult<&'static str> {
                d.fetch_add(1, Ordering::SeqCst);
                Err(PipelineError::Model("boom".into()))
            },
            move || -> PipelineResult<&'static str> {
                if p.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("first prediction tick panics");
                }
                Ok("ok")
            },
            rx,
        ));

        tokio::time::sleep(Duration::from_millis(120)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .expect("scheduler stops on shutdown")
            .unwrap();

        assert!(dispatched.load(Ordering::SeqCst) >= 3);
        assert!(predicted.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn slow_job_does_not_delay_next_tick() {
        let started = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(false);

        let s = Arc::clone(&started);
        let sched = Scheduler::new(Duration::from_millis(20), Duration::from_secs(3600));
        let run = tokio::spawn(sched.run(
            move || -> PipelineResult<&'static str> {
                s.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(300));
                Ok("slow")
            },
            || -> PipelineResult<&'static str> { Ok("idle") },
            rx,
        ));

        // Well inside one job's duration: inline ticks would have started only one.
        tokio::time::sleep(Duration::from_millis(150)).await;
        let overlapping = started.load(Ordering::SeqCst);
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .expect("scheduler stops on shutdown")
            .unwrap();

        assert!(overlapping >= 3, "only {overlapping} ticks started");
    }

    #[tokio::test]
    async fn dropping_sender_stops_triggers() {
        let (tx, rx) = watch::channel(false);
        let sched = Scheduler::new(Duration::from_millis(5), Duration::from_millis(5));
        let run = tokio::spawn(sched.run(
            || -> PipelineResult<u8> { Ok(0) },
            || -> PipelineResult<u8> { Ok(0) },
            rx,
        ));
        drop(tx);
        tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .expect("scheduler stops when sender is dropped")
            .unwrap();
    }
}
