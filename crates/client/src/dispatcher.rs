//! Concurrency-limited FIFO request dispatcher.
//!
//! [`RequestDispatcher`] keeps at most `max_concurrent` units of work in
//! flight and spaces consecutive dispatch starts at least `min_delay`
//! apart, however many callers enqueue at once. It is a pure scheduling
//! layer: outcomes pass through unchanged and nothing is retried here
//! (see [`crate::retry`]).
//!
//! Construct one per backend and clone the handle into every caller; all
//! clones share the same queue and counters.

use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Default number of requests allowed in flight at once.
pub const DEFAULT_MAX_CONCURRENT: usize = 2;

/// Default minimum spacing between two dispatch starts.
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(400);

/// Tunable limits for the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Upper bound on concurrently executing work (values below 1 act as 1).
    pub max_concurrent: usize,
    /// Minimum gap between consecutive dispatch starts.
    pub min_delay: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            min_delay: DEFAULT_MIN_DELAY,
        }
    }
}

/// Point-in-time view of the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatcherStatus {
    /// Work waiting for a slot.
    pub queued: usize,
    /// Work dispatched and not yet settled.
    pub in_flight: usize,
    pub max_concurrent: usize,
}

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A deferred unit of work. The job settles the caller's oneshot itself,
/// so the envelope only needs to be driven to completion.
struct Envelope {
    job: Job,
    enqueued_at: Instant,
}

struct State {
    queue: VecDeque<Envelope>,
    in_flight: usize,
    /// Start instant reserved by the most recent dispatch.
    last_dispatch: Option<Instant>,
}

struct Shared {
    config: DispatcherConfig,
    state: Mutex<State>,
}

/// Shared handle to a FIFO dispatcher. Cheap to clone.
#[derive(Clone)]
pub struct RequestDispatcher {
    shared: Arc<Shared>,
}

impl RequestDispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    in_flight: 0,
                    last_dispatch: None,
                }),
            }),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.shared.config
    }

    /// Queue `work` and return a future for its outcome.
    ///
    /// The work is queued immediately, in call order, whether or not the
    /// returned future is polled. Once dispatched it runs to completion on
    /// the Tokio runtime even if the returned future is dropped. The
    /// returned future yields exactly what `work()` produced; a panic in
    /// the work is resumed in the awaiting caller.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Panics
    ///
    /// The returned future panics if the runtime shuts down while the work
    /// is still queued or running, since no outcome will ever arrive.
    pub fn enqueue<F, Fut, T>(&self, work: F) -> impl Future<Output = T> + Send + 'static
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let outcome = AssertUnwindSafe(async move { work().await })
                .catch_unwind()
                .await;
            // The caller may have discarded its future; the outcome is then unused.
            let _ = tx.send(outcome);
        });

        let queued = {
            let mut state = self.lock();
            state.queue.push_back(Envelope {
                job,
                enqueued_at: Instant::now(),
            });
            state.queue.len()
        };
        tracing::debug!(queued, "Request enqueued");

        self.drain();

        async move {
            match rx
                .await
                .expect("dispatched work dropped without settling (runtime shutting down)")
            {
                Ok(value) => value,
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
    }

    /// Snapshot of queue depth and in-flight count.
    pub fn status(&self) -> DispatcherStatus {
        let state = self.lock();
        DispatcherStatus {
            queued: state.queue.len(),
            in_flight: state.in_flight,
            max_concurrent: self.max_concurrent(),
        }
    }

    // ---- private helpers ----

    fn max_concurrent(&self) -> usize {
        self.shared.config.max_concurrent.max(1)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Dispatch queued work until the slots are full or the queue is empty.
    ///
    /// Each pop reserves its start instant under the lock, no earlier than
    /// `min_delay` after the previous reservation, so slots freed together
    /// still start staggered.
    fn drain(&self) {
        loop {
            let (envelope, start_at, in_flight) = {
                let mut state = self.lock();
                if state.in_flight >= self.max_concurrent() {
                    return;
                }
                let Some(envelope) = state.queue.pop_front() else {
                    return;
                };
                state.in_flight += 1;

                let now = Instant::now();
                let start_at = match state.last_dispatch {
                    Some(last) => (last + self.shared.config.min_delay).max(now),
                    None => now,
                };
                state.last_dispatch = Some(start_at);
                (envelope, start_at, state.in_flight)
            };

            tracing::debug!(
                in_flight,
                waited_ms = envelope.enqueued_at.elapsed().as_millis() as u64,
                pacing_ms = start_at.saturating_duration_since(Instant::now()).as_millis() as u64,
                "Dispatching request",
            );

            let dispatcher = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep_until(start_at).await;
                envelope.job.await;
                dispatcher.settle();
            });
        }
    }

    /// Release a slot and let the backlog cascade into it.
    fn settle(&self) {
        {
            let mut state = self.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        self.drain();
    }
}

impl Default for RequestDispatcher {
    fn default() -> Self {
        Self::new(DispatcherConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn dispatcher(max_concurrent: usize, min_delay_ms: u64) -> RequestDispatcher {
        RequestDispatcher::new(DispatcherConfig {
            max_concurrent,
            min_delay: Duration::from_millis(min_delay_ms),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_concurrency_limit() {
        let dispatcher = dispatcher(2, 400);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let futures: Vec<_> = (0..7)
            .map(|_| {
                let current = Arc::clone(&current);
                let peak = Arc::clone(&peak);
                dispatcher.enqueue(move || async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        futures::future::join_all(futures).await;

        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(dispatcher.status().in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_starts_are_spaced_by_min_delay() {
        let dispatcher = dispatcher(2, 400);
        let starts = Arc::new(Mutex::new(Vec::new()));

        let futures: Vec<_> = (0..6)
            .map(|i| {
                let starts = Arc::clone(&starts);
                dispatcher.enqueue(move || async move {
                    starts.lock().unwrap().push(Instant::now());
                    // Short work so slots free up faster than the pacing delay.
                    tokio::time::sleep(Duration::from_millis(50 * (i % 2))).await;
                })
            })
            .collect();
        futures::future::join_all(futures).await;

        let mut starts = starts.lock().unwrap().clone();
        starts.sort();
        assert_eq!(starts.len(), 6);
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(400));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn idle_queue_dispatches_without_pacing() {
        let dispatcher = dispatcher(2, 400);
        dispatcher.enqueue(|| async {}).await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        let before = Instant::now();
        dispatcher.enqueue(|| async {}).await;
        assert!(Instant::now() - before < Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn outcomes_pass_through_unchanged() {
        let dispatcher = dispatcher(2, 400);
        let ok = dispatcher.enqueue(|| async { Ok::<_, String>(42) });
        let err = dispatcher.enqueue(|| async { Err::<u32, _>("boom".to_string()) });

        assert_eq!(ok.await, Ok(42));
        assert_eq!(err.await, Err("boom".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn dispatches_in_enqueue_order() {
        let dispatcher = dispatcher(1, 10);
        let order = Arc::new(Mutex::new(Vec::new()));

        let futures: Vec<_> = (0..5)
            .map(|i| {
                let order = Arc::clone(&order);
                dispatcher.enqueue(move || async move {
                    order.lock().unwrap().push(i);
                })
            })
            .collect();
        futures::future::join_all(futures).await;

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn status_reports_queue_and_in_flight() {
        let dispatcher = dispatcher(2, 400);
        let pending: Vec<_> = (0..3)
            .map(|_| {
                dispatcher.enqueue(|| async {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                })
            })
            .collect();

        assert_eq!(
            dispatcher.status(),
            DispatcherStatus {
                queued: 1,
                in_flight: 2,
                max_concurrent: 2,
            }
        );

        futures::future::join_all(pending).await;
        assert_eq!(dispatcher.status().queued, 0);
        assert_eq!(dispatcher.status().in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn discarded_future_still_runs_to_completion() {
        let dispatcher = dispatcher(2, 400);
        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);

        drop(dispatcher.enqueue(move || async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            flag.store(true, Ordering::SeqCst);
        }));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(done.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    #[should_panic(expected = "work exploded")]
    async fn panic_in_work_resumes_in_caller() {
        let dispatcher = dispatcher(2, 400);
        dispatcher
            .enqueue(|| async { panic!("work exploded") })
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn slot_is_released_after_panicking_work() {
        let dispatcher = dispatcher(1, 0);
        let panicked = dispatcher.enqueue(|| async { panic!("first") });
        let handle = tokio::spawn(panicked);
        assert!(handle.await.is_err());

        assert_eq!(dispatcher.enqueue(|| async { 7 }).await, 7);
    }
}
