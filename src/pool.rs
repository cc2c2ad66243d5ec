use super::{
    errors::PoolError,
    model::{Job, PoolMetrics},
    queue::WorkQueue,
    result::{Outcome, PoolResult},
    worker::{JobCounters, Worker},
};
use parking_lot::ReentrantMutex;
use std::{
    cell::RefCell,
    sync::{Arc, Weak},
    thread,
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::Span;


/// Pool configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub num_workers: usize,
    /// `0` = unbounded
    pub request_capacity: usize,
    /// `0` = unbounded
    pub result_capacity: usize,
    /// How long a worker waits on the request queue before re-checking dismissal
    pub poll_timeout: Duration,
    pub thread_name_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_workers: num_cpus::get(),
            request_capacity: 0,
            result_capacity: 0,
            poll_timeout: Duration::from_secs(5),
            thread_name_prefix: "workpool".to_string(),
        }
    }
}

impl Config {
    pub fn cpu_bound() -> Self {
        let num_cpus = num_cpus::get();
        Self {
            num_workers: num_cpus,
            request_capacity: num_cpus * 10,
            ..Default::default()
        }
    }

    pub fn io_bound() -> Self {
        Self {
            num_workers: num_cpus::get() * 2,
            poll_timeout: Duration::from_secs(1),
            ..Default::default()
        }
    }

    pub fn with_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    pub fn with_request_capacity(mut self, capacity: usize) -> Self {
        self.request_capacity = capacity;
        self
    }

    pub fn with_result_capacity(mut self, capacity: usize) -> Self {
        self.result_capacity = capacity;
        self
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    pub fn validate(&self) -> PoolResult<()> {
        if self.poll_timeout.is_zero() {
            return Err(PoolError::InvalidConfig("poll_timeout must be greater than zero".into()));
        }
        if self.thread_name_prefix.is_empty() {
            return Err(PoolError::InvalidConfig("thread_name_prefix must not be empty".into()));
        }
        Ok(())
    }
}


#[derive(Default)]
struct Membership {
    active: Vec<Worker>,
    /// dismissed, possibly still running
    retiring: Vec<Worker>,
    next_id: usize,
}


/// Pool of background workers fed through a request queue.
///
/// Jobs are submitted by putting them on [`ThreadPool::request_queue`] and
/// outcomes are read back from [`ThreadPool::result_queue`]. Every operation
/// that changes the set of workers runs under one reentrant lock owned by
/// this instance; the queues are never guarded by it.
pub struct ThreadPool {
    config: Config,
    request_queue: WorkQueue<Job>,
    result_queue: WorkQueue<Outcome>,
    members: ReentrantMutex<RefCell<Membership>>,
    counters: Arc<JobCounters>,
    span: Span,
}

impl ThreadPool {
    pub fn new(config: Config) -> PoolResult<Self> {
        Self::with_span(config, tracing::info_span!("pool"))
    }

    /// `span` is the logging sink of this pool; every worker logs into a child of it
    pub fn with_span(config: Config, span: Span) -> PoolResult<Self> {
        config.validate()?;
        Ok(Self {
            request_queue: WorkQueue::new(config.request_capacity),
            result_queue: WorkQueue::new(config.result_capacity),
            members: ReentrantMutex::new(RefCell::new(Membership::default())),
            counters: Arc::new(JobCounters::default()),
            span,
            config,
        })
    }

    /// Spawns `config.num_workers` workers
    pub fn start(&self) -> PoolResult<()> {
        self.create_workers(self.config.num_workers)?;
        tracing::info!(parent: &self.span, workers = self.config.num_workers, "thread pool started");
        Ok(())
    }

    pub fn create_workers(&self, num_workers: usize) -> PoolResult<()> {
        let guard = self.members.lock();
        for _ in 0..num_workers {
            let id = {
                let mut members = guard.borrow_mut();
                members.next_id += 1;
                members.next_id
            };
            let mut worker = Worker::new(
                id,
                self.request_queue.clone(),
                self.result_queue.clone(),
                self.config.poll_timeout,
                &self.span,
            )
            .with_thread_name(format!("{}-{}", self.config.thread_name_prefix, id))
            .with_counters(Arc::clone(&self.counters));

            worker.start()?;
            guard.borrow_mut().active.push(worker);
        }
        Ok(())
    }

    pub fn add_workers(&self, num_workers: usize) -> PoolResult<()> {
        let _guard = self.members.lock();
        self.create_workers(num_workers)?;
        tracing::info!(parent: &self.span, added = num_workers, total = self.worker_size(), "workers added");
        Ok(())
    }

    /// Dismisses up to `num_workers` of the most recently added workers.
    /// Returns immediately; the dismissed threads may still be running.
    pub fn dismiss_workers(&self, num_workers: usize) -> usize {
        let guard = self.members.lock();
        let mut members = guard.borrow_mut();

        let count = num_workers.min(members.active.len());
        for _ in 0..count {
            if let Some(worker) = members.active.pop() {
                worker.dismiss();
                members.retiring.push(worker);
            }
        }
        tracing::info!(parent: &self.span, dismissed = count, remaining = members.active.len(), "workers dismissed");
        count
    }

    /// Blocks until every dismissed worker has terminated
    pub fn join_all_dismissed_workers(&self) {
        let guard = self.members.lock();
        let retiring = std::mem::take(&mut guard.borrow_mut().retiring);
        let joined = retiring.len();
        for worker in retiring {
            worker.join();
        }
        tracing::info!(parent: &self.span, joined, "dismissed workers joined");
    }

    /// Drops already terminated workers from the retiring list without blocking.
    /// Returns how many were removed.
    pub fn clean_joined_workers(&self) -> usize {
        let guard = self.members.lock();
        let finished: Vec<Worker> = {
            let mut members = guard.borrow_mut();
            let (finished, running): (Vec<Worker>, Vec<Worker>) = std::mem::take(&mut members.retiring)
                .into_iter()
                .partition(|w| !w.is_alive());
            members.retiring = running;
            finished
        };

        let cleaned = finished.len();
        // already terminated, so joining does not block
        finished.into_iter().for_each(Worker::join);
        tracing::info!(
            parent: &self.span,
            cleaned,
            still_running = guard.borrow().retiring.len(),
            "cleaned dismissed workers"
        );
        cleaned
    }

    /// Number of active (not dismissed) workers
    pub fn worker_size(&self) -> usize {
        let guard = self.members.lock();
        let size = guard.borrow().active.len();
        size
    }

    pub fn is_pool_alive(&self) -> bool {
        self.worker_size() > 0
    }

    /// Dismisses every active worker and waits for all dismissed workers to finish
    pub fn stop(&self) {
        {
            let _guard = self.members.lock();
            self.dismiss_workers(self.worker_size());
        }
        self.join_all_dismissed_workers();
        tracing::info!(parent: &self.span, "thread pool stopped");
    }

    /// [`ThreadPool::stop`] on the blocking pool of the current tokio runtime
    pub async fn stop_async(self: &Arc<Self>) -> PoolResult<()> {
        let pool = Arc::clone(self);
        tokio::task::spawn_blocking(move || pool.stop())
            .await
            .map_err(|e| PoolError::JoinFailed(e.to_string()))
    }

    #[inline]
    pub fn req_queue_size(&self) -> usize {
        self.request_queue.len()
    }

    #[inline]
    pub fn res_queue_size(&self) -> usize {
        self.result_queue.len()
    }

    #[inline]
    pub fn request_queue(&self) -> &WorkQueue<Job> {
        &self.request_queue
    }

    #[inline]
    pub fn result_queue(&self) -> &WorkQueue<Outcome> {
        &self.result_queue
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metrics(&self) -> PoolMetrics {
        let (active_workers, retiring_workers) = {
            let guard = self.members.lock();
            let members = guard.borrow();
            (members.active.len(), members.retiring.len())
        };
        PoolMetrics {
            active_workers,
            retiring_workers,
            queued_requests: self.request_queue.len(),
            queued_results: self.result_queue.len(),
            completed_jobs: self.counters.completed(),
            failed_jobs: self.counters.failed(),
        }
    }

    /// Calls `callback` with fresh metrics every `interval` until the returned
    /// token is cancelled or the pool is dropped.
    pub fn start_monitoring<F>(self: &Arc<Self>, interval: Duration, callback: F) -> PoolResult<CancellationToken>
    where
        F: Fn(PoolMetrics) + Send + 'static,
    {
        let pool: Weak<Self> = Arc::downgrade(self);
        let token = CancellationToken::new();
        let token_clone = token.clone();

        thread::Builder::new()
            .name(format!("{}-monitor", self.config.thread_name_prefix))
            .spawn(move || loop {
                thread::sleep(interval);
                if token_clone.is_cancelled() {
                    break;
                }
                match pool.upgrade() {
                    Some(pool) => callback(pool.metrics()),
                    None => break,
                }
            })
            .map_err(|e| PoolError::Spawn(e.to_string()))?;

        Ok(token)
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        let members = self.members.get_mut().get_mut();
        let remaining = members.active.len();
        for worker in members.active.drain(..) {
            worker.dismiss();
        }
        if remaining > 0 {
            tracing::info!(parent: &self.span, remaining, "thread pool dropped, remaining workers dismissed");
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn small_config() -> Config {
        Config::default()
            .with_workers(2)
            .with_poll_timeout(Duration::from_millis(10))
    }

    #[test]
    fn rejects_invalid_config() {
        let err = ThreadPool::new(small_config().with_poll_timeout(Duration::ZERO)).err();
        assert!(matches!(err, Some(PoolError::InvalidConfig(_))));

        let err = ThreadPool::new(small_config().with_thread_name_prefix("")).err();
        assert!(matches!(err, Some(PoolError::InvalidConfig(_))));
    }

    #[test]
    fn no_workers_before_start() {
        let pool = ThreadPool::new(small_config()).unwrap();
        assert_eq!(pool.worker_size(), 0);
        assert!(!pool.is_pool_alive());

        pool.start().unwrap();
        assert_eq!(pool.worker_size(), 2);
        pool.stop();
    }

    #[test]
    fn dismiss_more_than_active_is_capped() {
        let pool = ThreadPool::new(small_config()).unwrap();
        pool.start().unwrap();
        assert_eq!(pool.dismiss_workers(10), 2);
        assert_eq!(pool.worker_size(), 0);
        assert_eq!(pool.metrics().retiring_workers, 2);

        pool.join_all_dismissed_workers();
        assert_eq!(pool.metrics().retiring_workers, 0);
    }

    #[test]
    fn clean_removes_finished_workers() {
        let pool = ThreadPool::new(small_config()).unwrap();
        pool.start().unwrap();
        pool.dismiss_workers(1);

        // give the dismissed worker time to notice
        thread::sleep(Duration::from_millis(100));
        assert_eq!(pool.clean_joined_workers(), 1);
        assert_eq!(pool.metrics().retiring_workers, 0);
        assert_eq!(pool.worker_size(), 1);
        pool.stop();
    }

    #[test]
    fn clean_keeps_running_workers() {
        let pool = ThreadPool::new(small_config().with_workers(1)).unwrap();
        pool.start().unwrap();

        let running = Arc::new(AtomicBool::new(false));
        let running_clone = running.clone();
        pool.request_queue()
            .put(Job::from_fn(move |_, _| {
                running_clone.store(true, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(300));
                Ok(json!("done"))
            }))
            .unwrap();

        let start = std::time::Instant::now();
        while !running.load(Ordering::SeqCst) && start.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(pool.dismiss_workers(1), 1);
        assert_eq!(pool.clean_joined_workers(), 0);
        assert_eq!(pool.metrics().retiring_workers, 1);

        pool.join_all_dismissed_workers();
        assert_eq!(pool.metrics().retiring_workers, 0);
        let outcome = pool.result_queue().try_get().expect("in-flight job must finish");
        assert_eq!(outcome.return_value(), Some(&json!("done")));
    }

    #[test]
    fn thread_names_use_prefix() {
        let pool = ThreadPool::new(small_config().with_workers(1).with_thread_name_prefix("unit")).unwrap();
        pool.start().unwrap();
        pool.request_queue()
            .put(Job::from_fn(|_, _| {
                Ok(thread::current().name().unwrap_or_default().into())
            }))
            .unwrap();
        let outcome = pool.result_queue().get().unwrap();
        assert_eq!(outcome.return_value().and_then(|v| v.as_str()), Some("unit-1"));
        pool.stop();
    }
}
