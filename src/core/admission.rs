//! Request admission queue.
//!
//! Every call to the external API goes through one [`AdmissionQueue`]. The
//! queue admits work strictly in FIFO order, never dispatches more than
//! `max_requests_per_window` calls inside one fixed window, paces successive
//! dispatches by `request_delay_ms`, and retries throttled or transient
//! failures with exponential backoff.
//!
//! A single drain task owns dispatching. It is started on demand by the first
//! enqueue on an idle queue and exits once the queue is empty, so the window
//! counters are only ever advanced from one place. Each drain task holds the
//! worker lock for its whole lifetime: a loop started after
//! [`AdmissionQueue::clear_queue`] waits until the superseded one has settled
//! its in-flight request.
//!
//! ```rust,ignore
//! let queue = AdmissionQueue::new(config.admission.clone(), TokioSpawner::current());
//! let data = queue
//!     .enqueue(move || {
//!         let source = Arc::clone(&source);
//!         async move { source.probe().await }
//!     })
//!     .await?;
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AdmissionConfig;
use crate::core::backoff::BackoffPolicy;
use crate::core::error::{AdmissionError, ApiError};
use crate::core::rate_limit::RateLimitHeaders;
use crate::core::window::RateWindow;
use crate::util::clock::now_secs;

/// Abstraction for spawning the drain loop on a runtime.
pub trait Spawn {
    /// Spawn a detached future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Successful response from the external API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse<T> {
    /// Decoded response body.
    pub data: T,
    /// Rate-limit metadata attached to the response, if present.
    pub rate_limit: Option<RateLimitHeaders>,
}

impl<T> ApiResponse<T> {
    /// Response without rate-limit metadata.
    pub const fn new(data: T) -> Self {
        Self {
            data,
            rate_limit: None,
        }
    }

    /// Attach rate-limit metadata.
    #[must_use]
    pub const fn with_rate_limit(mut self, rate_limit: RateLimitHeaders) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }
}

/// Result of one invocation, with the success value kept by the job itself.
type AttemptOutcome = Result<Option<RateLimitHeaders>, ApiError>;

/// Type-erased unit of work so requests with different result types share a
/// single FIFO.
trait ErasedJob: Send {
    fn invoke(&mut self) -> Pin<Box<dyn Future<Output = AttemptOutcome> + Send>>;
    fn settle(self: Box<Self>, outcome: Result<(), AdmissionError>);
}

struct TypedJob<T, F> {
    invoke: F,
    slot: Arc<Mutex<Option<T>>>,
    reply: oneshot::Sender<Result<T, AdmissionError>>,
}

impl<T, F, Fut> ErasedJob for TypedJob<T, F>
where
    T: Send + 'static,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<ApiResponse<T>, ApiError>> + Send + 'static,
{
    fn invoke(&mut self) -> Pin<Box<dyn Future<Output = AttemptOutcome> + Send>> {
        let call = (self.invoke)();
        let slot = Arc::clone(&self.slot);
        Box::pin(async move {
            let response = call.await?;
            *slot.lock() = Some(response.data);
            Ok(response.rate_limit)
        })
    }

    fn settle(self: Box<Self>, outcome: Result<(), AdmissionError>) {
        let result = outcome.and_then(|()| self.slot.lock().take().ok_or(AdmissionError::Closed));
        // receiver may have been dropped; nothing to do then
        let _ = self.reply.send(result);
    }
}

/// A unit of work owned by the queue from enqueue until settlement.
pub struct QueuedRequest {
    /// Request identifier.
    pub id: Uuid,
    /// Retries performed so far.
    pub attempt: u32,
    /// When the request entered the queue.
    pub enqueued_at: Instant,
    job: Box<dyn ErasedJob>,
}

impl std::fmt::Debug for QueuedRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedRequest")
            .field("id", &self.id)
            .field("attempt", &self.attempt)
            .field("enqueued_at", &self.enqueued_at)
            .finish_non_exhaustive()
    }
}

/// Future settled once the request succeeds, fails permanently, exhausts its
/// retries, or is cancelled.
#[derive(Debug)]
pub struct AdmissionHandle<T> {
    id: Uuid,
    rx: oneshot::Receiver<Result<T, AdmissionError>>,
}

impl<T> AdmissionHandle<T> {
    /// Identifier of the queued request.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }
}

impl<T> Future for AdmissionHandle<T> {
    type Output = Result<T, AdmissionError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(AdmissionError::Closed)))
    }
}

/// Cumulative queue counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Invocations sent upstream, retries included.
    pub dispatched: u64,
    /// Retries scheduled after a retryable failure.
    pub retries: u64,
    /// Requests settled successfully.
    pub succeeded: u64,
    /// Requests settled with an error.
    pub failed: u64,
    /// Requests rejected by [`AdmissionQueue::clear_queue`].
    pub cancelled: u64,
}

/// Read-only snapshot returned by [`AdmissionQueue::status`].
#[derive(Debug, Clone)]
pub struct QueueStatus {
    /// Requests waiting for admission.
    pub queue_length: usize,
    /// Requests admitted in the current window.
    pub request_count: u32,
    /// Window capacity.
    pub max_requests: u32,
    /// Start of the current window.
    pub window_start: Instant,
    /// Whether the drain loop is running.
    pub is_processing: bool,
    /// Cumulative counters.
    pub stats: QueueStats,
}

#[derive(Debug, Default)]
struct QueueCounters {
    dispatched: AtomicU64,
    retries: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

impl QueueCounters {
    fn snapshot(&self) -> QueueStats {
        QueueStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

struct Shared {
    config: AdmissionConfig,
    backoff: BackoffPolicy,
    pending: Mutex<VecDeque<QueuedRequest>>,
    /// Only the drain loop replaces or advances the window.
    window: Mutex<RateWindow>,
    processing: AtomicBool,
    /// Bumped by `clear_queue` so a superseded drain loop stops popping.
    generation: AtomicU64,
    /// Held by the live drain loop; at most one dispatches at a time.
    worker: AsyncMutex<()>,
    slow_next: AtomicBool,
    counters: QueueCounters,
}

/// Rate-limited FIFO gatekeeper for external API calls.
///
/// Cloning yields another handle to the same queue and window.
pub struct AdmissionQueue<S> {
    shared: Arc<Shared>,
    spawner: S,
}

impl<S: Clone> Clone for AdmissionQueue<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            spawner: self.spawner.clone(),
        }
    }
}

impl<S> AdmissionQueue<S>
where
    S: Spawn,
{
    /// Create a queue. The first window opens now.
    pub fn new(config: AdmissionConfig, spawner: S) -> Self {
        let window = RateWindow::open(
            Instant::now(),
            config.max_requests_per_window,
            Duration::from_millis(config.window_duration_ms),
        );
        info!(
            max_requests = config.max_requests_per_window,
            window_ms = config.window_duration_ms,
            delay_ms = config.request_delay_ms,
            max_retries = config.max_retries,
            "admission queue initialized"
        );
        Self {
            shared: Arc::new(Shared {
                backoff: BackoffPolicy::from_config(&config),
                config,
                pending: Mutex::new(VecDeque::new()),
                window: Mutex::new(window),
                processing: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                worker: AsyncMutex::new(()),
                slow_next: AtomicBool::new(false),
                counters: QueueCounters::default(),
            }),
            spawner,
        }
    }

    /// Queue a unit of work.
    ///
    /// `invoke` is called once per attempt, so it must produce a fresh future
    /// each time. The returned handle settles with the success value or the
    /// final error.
    pub fn enqueue<T, F, Fut>(&self, invoke: F) -> AdmissionHandle<T>
    where
        T: Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<ApiResponse<T>, ApiError>> + Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        let id = Uuid::new_v4();
        let request = QueuedRequest {
            id,
            attempt: 0,
            enqueued_at: Instant::now(),
            job: Box::new(TypedJob {
                invoke,
                slot: Arc::new(Mutex::new(None)),
                reply,
            }),
        };

        let depth = {
            let mut pending = self.shared.pending.lock();
            pending.push_back(request);
            pending.len()
        };
        debug!(request_id = %id, depth, "request enqueued");

        self.ensure_draining();
        AdmissionHandle { id, rx }
    }

    /// Snapshot of queue and window state. No side effects.
    #[must_use]
    pub fn status(&self) -> QueueStatus {
        let queue_length = self.shared.pending.lock().len();
        let window = *self.shared.window.lock();
        QueueStatus {
            queue_length,
            request_count: window.request_count,
            max_requests: window.limit,
            window_start: window.window_start,
            is_processing: self.shared.processing.load(Ordering::Acquire),
            stats: self.shared.counters.snapshot(),
        }
    }

    /// Reject every pending request with [`AdmissionError::Cancelled`] and
    /// reset processing state. An in-flight call is not aborted, and the next
    /// drain loop does not dispatch until it has settled.
    ///
    /// Returns the number of requests cancelled.
    pub fn clear_queue(&self) -> usize {
        let drained: Vec<QueuedRequest> = {
            let mut pending = self.shared.pending.lock();
            self.shared.generation.fetch_add(1, Ordering::AcqRel);
            self.shared.processing.store(false, Ordering::Release);
            pending.drain(..).collect()
        };

        let count = drained.len();
        for request in drained {
            request.job.settle(Err(AdmissionError::Cancelled));
        }
        self.shared
            .counters
            .cancelled
            .fetch_add(count as u64, Ordering::Relaxed);
        warn!(cancelled = count, "admission queue cleared");
        count
    }

    fn ensure_draining(&self) {
        if self.shared.processing.swap(true, Ordering::AcqRel) {
            return;
        }
        let generation = self.shared.generation.load(Ordering::Acquire);
        debug!(generation, "starting admission drain loop");
        self.spawner.spawn(drain(Arc::clone(&self.shared), generation));
    }
}

async fn drain(shared: Arc<Shared>, generation: u64) {
    let _worker = shared.worker.lock().await;
    loop {
        if !shared.has_pending(generation) {
            return;
        }

        // None means the queue was cleared while waiting for a slot
        let Some(request) = shared.admit_next(generation).await else {
            continue;
        };

        shared.dispatch(request).await;
        shared.pace().await;
    }
}

impl Shared {
    /// Returns false, and releases the processing flag, once there is nothing
    /// left for this drain loop to do.
    fn has_pending(&self, generation: u64) -> bool {
        let pending = self.pending.lock();
        if self.generation.load(Ordering::Acquire) != generation {
            debug!(generation, "drain loop superseded");
            return false;
        }
        if pending.is_empty() {
            self.processing.store(false, Ordering::Release);
            debug!("admission queue drained");
            return false;
        }
        true
    }

    fn pop_next(&self, generation: u64) -> Option<QueuedRequest> {
        let mut pending = self.pending.lock();
        if self.generation.load(Ordering::Acquire) != generation {
            return None;
        }
        pending.pop_front()
    }

    /// Wait for a free slot, then pop the head of the queue and count it
    /// against the window under the same lock.
    async fn admit_next(&self, generation: u64) -> Option<QueuedRequest> {
        loop {
            let wait = {
                let mut window = self.window.lock();
                let now = Instant::now();
                roll_if_expired(&mut window, now);
                if window.has_capacity() {
                    let request = self.pop_next(generation)?;
                    let counted = window.record_dispatch();
                    debug_assert!(counted, "slot checked under the same guard");
                    return Some(request);
                }
                window.remaining(now)
            };
            debug!(wait_ms = wait.as_millis(), "rate window full, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// Wait for a free slot and count a retry against it.
    async fn admit_retry(&self) {
        loop {
            let wait = {
                let mut window = self.window.lock();
                let now = Instant::now();
                roll_if_expired(&mut window, now);
                if window.record_dispatch() {
                    return;
                }
                window.remaining(now)
            };
            debug!(wait_ms = wait.as_millis(), "rate window full, delaying retry");
            tokio::time::sleep(wait).await;
        }
    }

    /// Run one request through the backoff wrapper and settle it.
    async fn dispatch(&self, mut request: QueuedRequest) {
        loop {
            self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
            let outcome = request.job.invoke().await;

            let rate_limit = match &outcome {
                Ok(headers) => *headers,
                Err(err) => err.rate_limit(),
            };
            if let Some(headers) = rate_limit {
                self.observe_rate_limit(&headers);
            }

            let error = match outcome {
                Ok(_) => {
                    self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        request_id = %request.id,
                        attempt = request.attempt,
                        waited_ms = request.enqueued_at.elapsed().as_millis(),
                        "request succeeded"
                    );
                    request.job.settle(Ok(()));
                    return;
                }
                Err(err) => err,
            };

            if !self.backoff.should_retry(request.attempt, &error) {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    request_id = %request.id,
                    attempts = request.attempt + 1,
                    retryable = error.is_retryable(),
                    error = %error,
                    "request failed"
                );
                let attempts = request.attempt + 1;
                request.job.settle(Err(AdmissionError::Api {
                    attempts,
                    source: error,
                }));
                return;
            }

            let delay = self.backoff.delay_for_error(request.attempt, &error);
            self.counters.retries.fetch_add(1, Ordering::Relaxed);
            warn!(
                request_id = %request.id,
                attempt = request.attempt,
                delay_ms = delay.as_millis(),
                error = %error,
                "retryable upstream failure, backing off"
            );
            tokio::time::sleep(delay).await;
            request.attempt += 1;

            // retries spend window slots like any other call
            self.admit_retry().await;
        }
    }

    fn observe_rate_limit(&self, headers: &RateLimitHeaders) {
        if headers.is_low(self.config.low_quota_ratio) {
            debug!(
                limit = headers.limit,
                remaining = headers.remaining,
                resets_in_secs = headers.seconds_until_reset(now_secs()),
                "upstream quota low, slowing next dispatch"
            );
            self.slow_next.store(true, Ordering::Release);
        }
    }

    /// Inter-request pacing plus any proactive slowdown.
    async fn pace(&self) {
        let base = Duration::from_millis(self.config.request_delay_ms);
        let delay = if self.slow_next.swap(false, Ordering::AcqRel) {
            base + base * 2
        } else {
            base
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

fn roll_if_expired(window: &mut RateWindow, now: Instant) {
    if window.is_expired(now) {
        *window = window.rolled(now);
        debug!("rate window rolled over");
    }
}
