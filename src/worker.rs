use super::{
    errors::{JobError, PoolError},
    model::Job,
    queue::WorkQueue,
    result::{Outcome, PoolResult},
};
use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::Span;


/// Completed/failed job counters shared by all workers of one pool
#[derive(Debug, Default)]
pub struct JobCounters {
    completed: AtomicUsize,
    failed: AtomicUsize,
}

impl JobCounters {
    #[inline]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Built but `start` not called yet
    Created,
    Running,
    Stopped,
}


/// One background thread running the job loop.
///
/// Construction is two-phase: [`Worker::new`] only builds state,
/// [`Worker::start`] spawns the thread.
pub struct Worker {
    id: usize,
    thread_name: String,
    cancel_token: CancellationToken,
    span: Span,
    runner: Option<WorkerLoop>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn new
    (
        id: usize,
        request_queue: WorkQueue<Job>,
        result_queue: WorkQueue<Outcome>,
        poll_timeout: Duration,
        parent_span: &Span,
    ) -> Self {
        let cancel_token = CancellationToken::new();
        let span = tracing::info_span!(parent: parent_span, "worker", worker_id = id);
        let runner = WorkerLoop {
            request_queue,
            result_queue,
            poll_timeout,
            cancel_token: cancel_token.clone(),
            counters: Arc::new(JobCounters::default()),
            span: span.clone(),
        };
        Self {
            id,
            thread_name: format!("worker-{}", id),
            cancel_token,
            span,
            runner: Some(runner),
            handle: None,
        }
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub(crate) fn with_counters(mut self, counters: Arc<JobCounters>) -> Self {
        if let Some(runner) = self.runner.as_mut() {
            runner.counters = counters;
        }
        self
    }

    pub fn start(&mut self) -> PoolResult<()> {
        let runner = self.runner.take().ok_or(PoolError::AlreadyStarted(self.id))?;
        let handle = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || runner.run())
            .map_err(|e| PoolError::Spawn(e.to_string()))?;
        self.handle = Some(handle);
        Ok(())
    }

    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Asks the loop to stop at its next check. Never waits and never
    /// interrupts a job that is already executing.
    pub fn dismiss(&self) {
        self.cancel_token.cancel();
        tracing::debug!(parent: &self.span, "worker asked to dismiss");
    }

    #[inline]
    pub fn is_dismissed(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    pub fn is_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn state(&self) -> WorkerState {
        match &self.handle {
            None => WorkerState::Created,
            Some(h) if h.is_finished() => WorkerState::Stopped,
            Some(_) => WorkerState::Running,
        }
    }

    /// Blocks until the thread has terminated
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!(parent: &self.span, "worker thread panicked outside of a job");
            }
        }
    }
}


struct WorkerLoop {
    request_queue: WorkQueue<Job>,
    result_queue: WorkQueue<Outcome>,
    poll_timeout: Duration,
    cancel_token: CancellationToken,
    counters: Arc<JobCounters>,
    span: Span,
}

impl WorkerLoop {
    fn run(self) {
        let _entered = self.span.enter();
        tracing::info!("worker started");

        loop {
            if self.cancel_token.is_cancelled() {
                tracing::info!("worker dismissed");
                break;
            }

            let job = match self.request_queue.get_timeout(self.poll_timeout) {
                Ok(Some(job)) => job,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(error = %e, "request queue unavailable, worker exiting");
                    break;
                }
            };

            // dismissed while waiting: hand the job back untouched
            if self.cancel_token.is_cancelled() {
                let job_id = job.id().clone();
                if let Err(e) = self.request_queue.put(job) {
                    tracing::error!(%job_id, error = %e, "failed to requeue job");
                } else {
                    tracing::debug!(%job_id, "worker dismissed, job requeued");
                }
                break;
            }

            let outcome = self.execute(job);
            if let Err(e) = self.result_queue.put(outcome) {
                tracing::error!(error = %e, "result queue unavailable, worker exiting");
                break;
            }
        }
    }

    fn execute(&self, job: Job) -> Outcome {
        tracing::debug!(job_id = %job.id(), "executing job");

        let result = panic::catch_unwind(AssertUnwindSafe(|| job.call()))
            .unwrap_or_else(|payload| Err(JobError::from_panic(payload)));

        match &result {
            Ok(_) => {
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(job_id = %job.id(), error = %e, "job failed");
            }
        }

        let outcome = Outcome::new(job, result);
        if let Some(hook) = outcome.job().hook_for(outcome.status()).cloned() {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| hook(&outcome))) {
                let err = JobError::from_panic(payload);
                tracing::warn!(job_id = %outcome.job().id(), error = %err, "completion hook panicked");
            }
        }
        outcome
    }
}
