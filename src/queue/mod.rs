//! A named, durable job queue with retries, exponential backoff,
//! interval/cron-scheduled recurring jobs, and per-job-name worker pools
//! bounded by concurrency and a rate limit.

mod rate_limiter;
mod schedule;

pub use rate_limiter::RateLimit;
pub use schedule::Schedule;

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use rate_limiter::RateLimiter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(pub Uuid);

impl JobId {
    fn generate() -> Self {
        JobId(Uuid::new_v4())
    }
}

/// Error a job handler returns on failure. Kept as a plain string — the
/// queue only needs to know *that* a job failed to apply the retry
/// policy, the handler's own logging carries the detail.
pub type JobError = String;

pub type JobHandler = Arc<dyn Fn(serde_json::Value, u32) -> BoxFuture<'static, std::result::Result<(), JobError>> + Send + Sync>;

#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    /// Higher runs first within a name's queue. There are no cross-job
    /// ordering guarantees at all; within a name, FIFO is best-effort
    /// too, and retries reinject at the tail.
    pub priority: i32,
    pub delay: Option<Duration>,
    pub schedule: Option<Schedule>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueueStats {
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub delayed: usize,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, name: &str, payload: serde_json::Value, options: JobOptions) -> Result<JobId>;

    fn register_worker(&self, name: &str, handler: JobHandler, concurrency: usize, rate_limit: RateLimit);

    async fn stats(&self) -> QueueStats;

    async fn shutdown(&self, drain_timeout: Duration);
}

#[derive(Clone)]
struct Job {
    id: JobId,
    name: String,
    payload: serde_json::Value,
    attempt: u32,
    max_attempts: u32,
    priority: i32,
}

const MAX_ATTEMPTS_DEFAULT: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_secs(2);
const COMPLETED_CAPACITY: usize = 100;
const FAILED_CAPACITY: usize = 500;

struct NameQueue {
    jobs: VecDeque<Job>,
    notify: Arc<Notify>,
}

struct Inner {
    queues: Mutex<HashMap<String, NameQueue>>,
    waiting: AtomicUsize,
    delayed: AtomicUsize,
    active: AtomicUsize,
    completed: Mutex<VecDeque<JobId>>,
    failed: Mutex<VecDeque<JobId>>,
    completed_count: AtomicUsize,
    failed_count: AtomicUsize,
    accepting: AtomicBool,
}

/// Reference implementation backed by Tokio tasks instead of a durable
/// external broker. One `tokio::spawn`ed worker loop per concurrency
/// slot per registered name, woken by a per-name `Notify` instead of
/// busy-polling.
pub struct InMemoryJobQueue {
    inner: Arc<Inner>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        InMemoryJobQueue {
            inner: Arc::new(Inner {
                queues: Mutex::new(HashMap::new()),
                waiting: AtomicUsize::new(0),
                delayed: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                completed: Mutex::new(VecDeque::new()),
                failed: Mutex::new(VecDeque::new()),
                completed_count: AtomicUsize::new(0),
                failed_count: AtomicUsize::new(0),
                accepting: AtomicBool::new(true),
            }),
        }
    }

    async fn push(inner: &Arc<Inner>, job: Job) {
        let mut queues = inner.queues.lock().await;
        let entry = queues.entry(job.name.clone()).or_insert_with(|| NameQueue { jobs: VecDeque::new(), notify: Arc::new(Notify::new()) });

        let pos = entry.jobs.iter().position(|j| j.priority < job.priority).unwrap_or(entry.jobs.len());
        entry.jobs.insert(pos, job);
        inner.waiting.fetch_add(1, Ordering::SeqCst);
        entry.notify.notify_one();
    }

    fn spawn_delayed_push(inner: Arc<Inner>, job: Job, delay: Duration) {
        inner.delayed.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.delayed.fetch_sub(1, Ordering::SeqCst);
            InMemoryJobQueue::push(&inner, job).await;
        });
    }

    async fn notify_for(inner: &Arc<Inner>, name: &str) -> Arc<Notify> {
        let mut queues = inner.queues.lock().await;
        queues.entry(name.to_string()).or_insert_with(|| NameQueue { jobs: VecDeque::new(), notify: Arc::new(Notify::new()) }).notify.clone()
    }

    async fn pop(inner: &Arc<Inner>, name: &str) -> Option<Job> {
        let mut queues = inner.queues.lock().await;
        let entry = queues.get_mut(name)?;
        let job = entry.jobs.pop_front();
        if job.is_some() {
            inner.waiting.fetch_sub(1, Ordering::SeqCst);
        }
        job
    }

    fn worker_loop(inner: Arc<Inner>, name: String, handler: JobHandler, limiter: Arc<RateLimiter>) -> impl std::future::Future<Output = ()> {
        async move {
            loop {
                if !inner.accepting.load(Ordering::SeqCst) && Self::queue_is_empty(&inner, &name).await {
                    return;
                }

                let job = match Self::pop(&inner, &name).await {
                    Some(job) => job,
                    None => {
                        let notify = Self::notify_for(&inner, &name).await;
                        notify.notified().await;
                        continue;
                    }
                };

                limiter.acquire().await;
                inner.active.fetch_add(1, Ordering::SeqCst);
                let attempt = job.attempt;
                let result = handler(job.payload.clone(), attempt).await;
                inner.active.fetch_sub(1, Ordering::SeqCst);

                match result {
                    Ok(()) => {
                        log::debug!("job completed name={} id={:?} attempt={}", name, job.id.0, attempt);
                        Self::record(&inner.completed, &inner.completed_count, COMPLETED_CAPACITY, job.id).await;
                    }
                    Err(e) if attempt < job.max_attempts => {
                        let backoff = BACKOFF_BASE * 2u32.pow(attempt.saturating_sub(1));
                        log::warn!("job failed name={} id={:?} attempt={} retrying in {:?}: {}", name, job.id.0, attempt, backoff, e);
                        let mut retry = job.clone();
                        retry.attempt += 1;
                        Self::spawn_delayed_push(inner.clone(), retry, backoff);
                    }
                    Err(e) => {
                        log::error!("job exhausted retries name={} id={:?} attempt={}: {}", name, job.id.0, attempt, e);
                        Self::record(&inner.failed, &inner.failed_count, FAILED_CAPACITY, job.id).await;
                    }
                }
            }
        }
    }

    async fn queue_is_empty(inner: &Arc<Inner>, name: &str) -> bool {
        let queues = inner.queues.lock().await;
        queues.get(name).map(|q| q.jobs.is_empty()).unwrap_or(true)
    }

    async fn record(ring: &Mutex<VecDeque<JobId>>, counter: &AtomicUsize, capacity: usize, id: JobId) {
        counter.fetch_add(1, Ordering::SeqCst);
        let mut ring = ring.lock().await;
        ring.push_back(id);
        while ring.len() > capacity {
            ring.pop_front();
        }
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, name: &str, payload: serde_json::Value, options: JobOptions) -> Result<JobId> {
        if !self.inner.accepting.load(Ordering::SeqCst) {
            return Err(CoreError::Internal("job queue is shutting down".to_string()));
        }

        if let Some(schedule) = options.schedule {
            let interval = schedule.interval();
            let inner = self.inner.clone();
            let name = name.to_string();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.tick().await; // first tick fires immediately; skip it, we only want recurring ticks
                loop {
                    ticker.tick().await;
                    let job = Job {
                        id: JobId::generate(),
                        name: name.clone(),
                        payload: payload.clone(),
                        attempt: 1,
                        max_attempts: MAX_ATTEMPTS_DEFAULT,
                        priority: 0,
                    };
                    InMemoryJobQueue::push(&inner, job).await;
                }
            });
            return Ok(JobId::generate());
        }

        let job = Job { id: JobId::generate(), name: name.to_string(), payload, attempt: 1, max_attempts: MAX_ATTEMPTS_DEFAULT, priority: options.priority };
        let id = job.id;

        match options.delay {
            Some(delay) if delay > Duration::ZERO => Self::spawn_delayed_push(self.inner.clone(), job, delay),
            _ => Self::push(&self.inner, job).await,
        }

        Ok(id)
    }

    fn register_worker(&self, name: &str, handler: JobHandler, concurrency: usize, rate_limit: RateLimit) {
        let limiter = Arc::new(RateLimiter::new(rate_limit));
        for _ in 0..concurrency {
            tokio::spawn(Self::worker_loop(self.inner.clone(), name.to_string(), handler.clone(), limiter.clone()));
        }
    }

    async fn stats(&self) -> QueueStats {
        QueueStats {
            waiting: self.inner.waiting.load(Ordering::SeqCst),
            active: self.inner.active.load(Ordering::SeqCst),
            completed: self.inner.completed_count.load(Ordering::SeqCst),
            failed: self.inner.failed_count.load(Ordering::SeqCst),
            delayed: self.inner.delayed.load(Ordering::SeqCst),
        }
    }

    async fn shutdown(&self, drain_timeout: Duration) {
        self.inner.accepting.store(false, Ordering::SeqCst);
        log::info!("job queue shutting down, draining active jobs (timeout {:?})", drain_timeout);

        let deadline = tokio::time::Instant::now() + drain_timeout;
        while self.inner.active.load(Ordering::SeqCst) > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        // wake any idle worker loops so they observe `accepting == false` and exit.
        let queues = self.inner.queues.lock().await;
        for queue in queues.values() {
            queue.notify.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn a_job_runs_exactly_once_on_success() {
        let queue = InMemoryJobQueue::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        queue.register_worker(
            "test:job",
            Arc::new(move |_payload, _attempt| {
                let calls = calls_clone.clone();
                Box::pin(async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
            1,
            RateLimit { max: 50, window: Duration::from_millis(1000) },
        );

        queue.enqueue("test:job", serde_json::json!({"x": 1}), JobOptions::default()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = queue.stats().await;
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn a_failing_job_retries_with_backoff_then_gives_up() {
        let queue = InMemoryJobQueue::new();
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        queue.register_worker(
            "test:always-fails",
            Arc::new(move |_payload, _attempt| {
                let attempts = attempts_clone.clone();
                Box::pin(async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err("boom".to_string())
                })
            }),
            1,
            RateLimit { max: 50, window: Duration::from_millis(1000) },
        );

        queue.enqueue("test:always-fails", serde_json::json!({}), JobOptions::default()).await.unwrap();

        // base backoff is 2s doubling; waiting the full schedule would make
        // this test slow, so we only assert the first attempt happened and
        // a retry got scheduled (delayed count increments).
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        let stats = queue.stats().await;
        assert_eq!(stats.delayed, 1);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn worker_only_picks_up_jobs_with_its_own_name() {
        let queue = InMemoryJobQueue::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        queue.register_worker(
            "name:a",
            Arc::new(move |_payload, _attempt| {
                let calls = calls_clone.clone();
                Box::pin(async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
            1,
            RateLimit { max: 50, window: Duration::from_millis(1000) },
        );

        queue.enqueue("name:b", serde_json::json!({}), JobOptions::default()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
