//! Job lifecycle: run once, observe, pause, resume and stop.
//!
//! A [`JobExecutor`] moves through `Idle -> Running -> {Completed, Failed,
//! Stopped}`. Pausing is orthogonal to that state: the job body polls
//! [`JobContext::checkpoint`] between units of work and waits there while the
//! job is paused, or unwinds with [`MigratorError::Stopped`] once a stop was
//! requested.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use migrator_core::MigratorError;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl JobState {
    pub fn is_finished(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Stopped)
    }
}

/// Point-in-time copy of a job's status.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSnapshot {
    pub state: JobState,
    pub paused: bool,
    /// Rendered error chain of a failed job
    pub failure: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct StatusInner {
    state: JobState,
    paused: bool,
    stop_requested: bool,
    failure: Option<String>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

/// Shared status of one job.
#[derive(Debug)]
pub struct JobStatus {
    inner: Mutex<StatusInner>,
    wake: watch::Sender<()>,
}

impl JobStatus {
    fn new() -> Self {
        let (wake, _) = watch::channel(());
        Self {
            inner: Mutex::new(StatusInner {
                state: JobState::Idle,
                paused: false,
                stop_requested: false,
                failure: None,
                started_at: None,
                ended_at: None,
            }),
            wake,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatusInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn notify(&self) {
        self.wake.send_replace(());
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let inner = self.lock();
        JobSnapshot {
            state: inner.state,
            paused: inner.paused,
            failure: inner.failure.clone(),
            started_at: inner.started_at,
            ended_at: inner.ended_at,
        }
    }

    pub fn state(&self) -> JobState {
        self.lock().state
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }
}

/// Observer of job start and end. Called synchronously on the executing task.
pub trait JobListener: Send + Sync {
    fn on_start(&self, _status: &JobSnapshot) {}

    fn on_end(&self, _status: &JobSnapshot) {}
}

/// Handle given to the job body.
#[derive(Debug, Clone)]
pub struct JobContext {
    status: Arc<JobStatus>,
}

impl JobContext {
    /// Wait while the job is paused; fail with [`MigratorError::Stopped`]
    /// once a stop was requested.
    pub async fn checkpoint(&self) -> Result<(), MigratorError> {
        loop {
            // Subscribe before reading the flags so a resume in between is not missed
            let mut wake = self.status.wake.subscribe();
            {
                let inner = self.status.lock();
                if inner.stop_requested {
                    return Err(MigratorError::Stopped);
                }
                if !inner.paused {
                    return Ok(());
                }
            }
            if wake.changed().await.is_err() {
                return Ok(());
            }
        }
    }

    pub fn is_stop_requested(&self) -> bool {
        self.status.lock().stop_requested
    }
}

/// Runs a job body at most once and records its outcome.
pub struct JobExecutor {
    status: Arc<JobStatus>,
    listeners: Vec<Arc<dyn JobListener>>,
}

impl Default for JobExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl JobExecutor {
    pub fn new() -> Self {
        Self {
            status: Arc::new(JobStatus::new()),
            listeners: Vec::new(),
        }
    }

    pub fn add_listener(&mut self, listener: Arc<dyn JobListener>) {
        self.listeners.push(listener);
    }

    pub fn status(&self) -> &Arc<JobStatus> {
        &self.status
    }

    pub fn context(&self) -> JobContext {
        JobContext {
            status: self.status.clone(),
        }
    }

    pub fn pause(&self) {
        self.status.lock().paused = true;
        self.status.notify();
    }

    pub fn resume(&self) {
        self.status.lock().paused = false;
        self.status.notify();
    }

    pub fn stop(&self) {
        self.status.lock().stop_requested = true;
        self.status.notify();
    }

    /// Run `job` if the executor is idle.
    ///
    /// Returns false without running anything when the job already ran, is
    /// running or was stopped before it started. Failures of the body are
    /// recorded in the status, never returned.
    pub async fn execute<F, Fut>(&self, job: F) -> bool
    where
        F: FnOnce(JobContext) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let started = {
            let mut inner = self.status.lock();
            if inner.state != JobState::Idle || inner.stop_requested {
                return false;
            }
            inner.state = JobState::Running;
            inner.started_at = Some(Utc::now());
            drop(inner);
            self.status.snapshot()
        };
        for listener in &self.listeners {
            listener.on_start(&started);
        }

        let ctx = self.context();
        let body = async move { job(ctx).await };
        let result = match AssertUnwindSafe(body).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(anyhow::anyhow!("Job panicked: {}", panic_message(&*payload))),
        };

        let ended = {
            let mut inner = self.status.lock();
            inner.state = match &result {
                Ok(()) => JobState::Completed,
                Err(e) if is_stopped(e) => JobState::Stopped,
                Err(e) => {
                    inner.failure = Some(format!("{e:#}"));
                    JobState::Failed
                }
            };
            inner.ended_at = Some(Utc::now());
            drop(inner);
            self.status.snapshot()
        };
        match ended.state {
            JobState::Failed => warn!(
                "Job failed: {}",
                ended.failure.as_deref().unwrap_or_default()
            ),
            state => info!("Job finished: {:?}", state),
        }
        for listener in &self.listeners {
            listener.on_end(&ended);
        }
        true
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic payload")
}

fn is_stopped(error: &anyhow::Error) -> bool {
    error
        .chain()
        .any(|cause| matches!(cause.downcast_ref::<MigratorError>(), Some(MigratorError::Stopped)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl JobListener for Recorder {
        fn on_start(&self, status: &JobSnapshot) {
            self.events.lock().unwrap().push(format!("start {:?}", status.state));
        }

        fn on_end(&self, status: &JobSnapshot) {
            self.events.lock().unwrap().push(format!("end {:?}", status.state));
        }
    }

    async fn count_steps(ctx: JobContext, steps: &AtomicUsize) -> anyhow::Result<()> {
        for _ in 0..3 {
            ctx.checkpoint().await?;
            steps.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_execute_runs_once() {
        let executor = JobExecutor::new();
        let counter = AtomicUsize::new(0);
        let runs = &counter;
        let body = move |_ctx: JobContext| async move {
            runs.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(())
        };
        let (a, b) = tokio::join!(executor.execute(body), executor.execute(body));
        assert!(a ^ b);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(executor.status().state(), JobState::Completed);
        assert!(!executor.execute(body).await);
    }

    #[tokio::test]
    async fn test_failure_is_captured() {
        let executor = JobExecutor::new();
        let executed = executor
            .execute(|_ctx| async { Err(anyhow::anyhow!("disk full").context("writing chunk")) })
            .await;
        assert!(executed);
        let status = executor.status().snapshot();
        assert_eq!(status.state, JobState::Failed);
        assert_eq!(status.failure.as_deref(), Some("writing chunk: disk full"));
        assert!(status.ended_at.is_some());
    }

    fn explode(reason: &str) -> anyhow::Result<()> {
        panic!("{reason}")
    }

    #[tokio::test]
    async fn test_panic_is_captured_as_failure() {
        let mut executor = JobExecutor::new();
        let recorder = Arc::new(Recorder::default());
        executor.add_listener(recorder.clone());
        let executed = executor
            .execute(|_ctx| async { explode("worker exploded") })
            .await;
        assert!(executed);
        let status = executor.status().snapshot();
        assert_eq!(status.state, JobState::Failed);
        assert_eq!(status.failure.as_deref(), Some("Job panicked: worker exploded"));
        assert!(status.ended_at.is_some());
        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec!["start Running".to_string(), "end Failed".to_string()]
        );
    }

    #[test]
    fn test_panic_message_payloads() {
        let literal: Box<dyn Any + Send> = Box::new("static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let other: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(&*literal), "static");
        assert_eq!(panic_message(&*owned), "owned");
        assert_eq!(panic_message(&*other), "unknown panic payload");
    }

    #[tokio::test]
    async fn test_listeners_fire_once_in_order() {
        let mut executor = JobExecutor::new();
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        executor.add_listener(first.clone());
        executor.add_listener(second.clone());
        executor.execute(|_ctx| async { Ok(()) }).await;
        executor.execute(|_ctx| async { Ok(()) }).await;
        for recorder in [first, second] {
            assert_eq!(
                *recorder.events.lock().unwrap(),
                vec!["start Running".to_string(), "end Completed".to_string()]
            );
        }
    }

    #[tokio::test]
    async fn test_pause_and_resume_match_unpaused_run() {
        let plain = JobExecutor::new();
        let plain_steps = AtomicUsize::new(0);
        plain.execute(|ctx| count_steps(ctx, &plain_steps)).await;

        let paused = JobExecutor::new();
        let paused_steps = AtomicUsize::new(0);
        paused.pause();
        let (executed, ()) = tokio::join!(paused.execute(|ctx| count_steps(ctx, &paused_steps)), async {
            for _ in 0..5 {
                tokio::task::yield_now().await;
            }
            assert_eq!(paused_steps.load(Ordering::SeqCst), 0);
            assert_eq!(paused.status().state(), JobState::Running);
            paused.resume();
        });
        assert!(executed);
        assert_eq!(paused_steps.load(Ordering::SeqCst), 3);

        let (a, b) = (plain.status().snapshot(), paused.status().snapshot());
        assert_eq!((a.state, a.paused, a.failure), (b.state, b.paused, b.failure));
    }

    #[tokio::test]
    async fn test_stop_while_paused_unwinds_as_stopped() {
        let executor = JobExecutor::new();
        let steps = AtomicUsize::new(0);
        executor.pause();
        let (executed, ()) = tokio::join!(executor.execute(|ctx| count_steps(ctx, &steps)), async {
            tokio::task::yield_now().await;
            executor.stop();
        });
        assert!(executed);
        assert_eq!(steps.load(Ordering::SeqCst), 0);
        let status = executor.status().snapshot();
        assert_eq!(status.state, JobState::Stopped);
        assert!(status.failure.is_none());
    }

    #[tokio::test]
    async fn test_stopped_before_start_does_not_run() {
        let executor = JobExecutor::new();
        executor.stop();
        assert!(!executor.execute(|_ctx| async { Ok(()) }).await);
        assert_eq!(executor.status().state(), JobState::Idle);
    }
}
