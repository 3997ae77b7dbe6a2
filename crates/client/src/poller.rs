//! Periodic history polling while runs are active.
//!
//! [`PollController::start`] spawns a background task that ticks on a
//! fixed interval using `tokio::time::interval`. Each tick hands the
//! current run list to [`RunController::poll_active_runs`], which only
//! touches the network while some run is still queued or processing.
//! Refreshed lists are published on a `watch` channel and the differences
//! are broadcast as [`RunEvent`]s.
//!
//! [`PollHandle::stop`] cancels future ticks only; a request already
//! handed to the dispatcher still runs to completion.

use std::collections::HashMap;
use std::time::Duration;

use qpadm_core::run::{AnalysisRun, RunStatus};
use qpadm_core::types::DbId;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::backend::AnalysisBackend;
use crate::events::RunEvent;
use crate::lifecycle::{HistoryRefresh, RunController};

/// Default cadence between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Broadcast channel capacity for run events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Starts poll loops.
pub struct PollController;

/// Handle to a running poll loop.
pub struct PollHandle {
    runs: watch::Receiver<Vec<AnalysisRun>>,
    event_tx: broadcast::Sender<RunEvent>,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

impl PollController {
    /// Start polling with `initial` as the current run list.
    ///
    /// The first poll happens one `interval` after start. A zero interval
    /// falls back to [`DEFAULT_POLL_INTERVAL`].
    pub fn start<B: AnalysisBackend + 'static>(
        controller: RunController<B>,
        initial: Vec<AnalysisRun>,
        interval: Duration,
    ) -> PollHandle {
        let interval = if interval.is_zero() {
            tracing::warn!(
                default_secs = DEFAULT_POLL_INTERVAL.as_secs(),
                "Zero poll interval, using default",
            );
            DEFAULT_POLL_INTERVAL
        } else {
            interval
        };
        let (runs_tx, runs_rx) = watch::channel(initial);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_poll_loop(
            controller,
            runs_tx,
            event_tx.clone(),
            cancel.clone(),
            interval,
        ));

        PollHandle {
            runs: runs_rx,
            event_tx,
            cancel,
            task,
        }
    }
}

impl PollHandle {
    /// Subscribe to run events from this loop.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.event_tx.subscribe()
    }

    /// The most recent run list.
    pub fn latest(&self) -> Vec<AnalysisRun> {
        self.runs.borrow().clone()
    }

    /// A receiver that is notified whenever the run list is replaced.
    pub fn watch(&self) -> watch::Receiver<Vec<AnalysisRun>> {
        self.runs.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop ticking and wait for the loop to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Poll task ended abnormally");
        }
    }
}

/// Tick until cancelled, refreshing the list whenever a run is active.
async fn run_poll_loop<B: AnalysisBackend + 'static>(
    controller: RunController<B>,
    runs_tx: watch::Sender<Vec<AnalysisRun>>,
    event_tx: broadcast::Sender<RunEvent>,
    cancel: CancellationToken,
    interval: Duration,
) {
    tracing::info!(interval_secs = interval.as_secs_f64(), "Run poller started");

    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Run poller stopping");
                break;
            }
            _ = ticker.tick() => {
                let current = runs_tx.borrow().clone();
                match controller.poll_active_runs(&current).await {
                    Ok(None) => {}
                    Ok(Some(refresh)) => {
                        let events = diff_events(&current, &refresh);
                        // Publish the list before any event so a subscriber
                        // reacting to an event already sees it in `latest()`.
                        runs_tx.send_replace(refresh.runs);
                        for event in events {
                            // Zero subscribers is fine.
                            let _ = event_tx.send(event);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Run history poll failed");
                        let _ = event_tx.send(RunEvent::RefreshFailed {
                            error: e.to_string(),
                        });
                    }
                }
            }
        }
    }
}

/// Events describing how `refresh` differs from `previous`.
fn diff_events(previous: &[AnalysisRun], refresh: &HistoryRefresh) -> Vec<RunEvent> {
    let mut events = Vec::new();

    if let Some(message) = &refresh.format_error {
        events.push(RunEvent::HistoryFormatError {
            message: message.clone(),
        });
    }

    let before: HashMap<DbId, RunStatus> = previous.iter().map(|r| (r.id, r.status)).collect();
    for run in &refresh.runs {
        let Some(&from) = before.get(&run.id) else {
            continue;
        };
        if from == run.status {
            continue;
        }
        events.push(RunEvent::RunStatusChanged {
            run_id: run.id,
            from,
            to: run.status,
        });
        if run.is_terminal() {
            tracing::info!(run_id = run.id, status = %run.status, "Run finished");
            events.push(RunEvent::RunFinished {
                run_id: run.id,
                status: run.status,
            });
        }
    }

    events.push(RunEvent::HistoryRefreshed {
        count: refresh.runs.len(),
    });
    events
}
