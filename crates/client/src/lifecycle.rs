//! Analysis run lifecycle controller.
//!
//! [`RunController`] sits between a validated [`AnalysisRequest`] and the
//! backend. Every call goes through the shared [`RequestDispatcher`];
//! reads are additionally wrapped in [`retry_with_backoff`]. The run state
//! machine is owned by the backend, so the controller only observes it:
//! it never transitions a run locally.
//!
//! The controller keeps no state of its own beyond its handles and can be
//! dropped and recreated freely.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use qpadm_core::analysis::AnalysisRequest;
use qpadm_core::catalog::PopulationCatalog;
use qpadm_core::error::CoreError;
use qpadm_core::population::DatasetType;
use qpadm_core::run::{has_active_runs, normalize_history, AnalysisRun};
use qpadm_core::types::DbId;
use qpadm_core::usage::UsageStatus;

use crate::api::ApiError;
use crate::backend::AnalysisBackend;
use crate::dispatcher::RequestDispatcher;
use crate::retry::{retry_with_backoff, RetryConfig};

/// Errors surfaced by the lifecycle controller.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The request was rejected client-side; nothing was sent.
    #[error(transparent)]
    Validation(#[from] CoreError),

    /// The backend refused the run because today's quota is spent.
    #[error("Daily run limit reached: {0}")]
    QuotaExhausted(String),

    /// A network or backend failure.
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Result of a history refresh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryRefresh {
    /// The user's runs; empty when the body had an unexpected shape.
    pub runs: Vec<AnalysisRun>,
    /// Set when the history body could not be normalised.
    pub format_error: Option<String>,
}

/// Mediates between requests and server-side runs.
pub struct RunController<B> {
    backend: Arc<B>,
    dispatcher: RequestDispatcher,
    retry: RetryConfig,
}

impl<B> Clone for RunController<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            dispatcher: self.dispatcher.clone(),
            retry: self.retry.clone(),
        }
    }
}

impl<B: AnalysisBackend + 'static> RunController<B> {
    pub fn new(backend: Arc<B>, dispatcher: RequestDispatcher, retry: RetryConfig) -> Self {
        Self {
            backend,
            dispatcher,
            retry,
        }
    }

    pub fn dispatcher(&self) -> &RequestDispatcher {
        &self.dispatcher
    }

    /// Validate and submit a request.
    ///
    /// Validation failures return [`RunError::Validation`] without any
    /// network call. Submission is a single dispatched attempt: creating a
    /// run is not idempotent, so it bypasses the retry layer. The returned
    /// run may already be `queued` with queue placement.
    pub async fn submit(&self, request: &AnalysisRequest) -> Result<AnalysisRun, RunError> {
        request.validate()?;

        let backend = Arc::clone(&self.backend);
        let body = request.clone();
        let run = self
            .dispatcher
            .enqueue(move || async move { backend.submit_run(&body).await })
            .await
            .map_err(|e| {
                if e.is_quota_exhausted() {
                    RunError::QuotaExhausted(e.message())
                } else {
                    RunError::Api(e)
                }
            })?;

        tracing::info!(
            run_id = run.id,
            status = %run.status,
            queue_position = run.queue_info.as_ref().map(|q| q.position),
            runs_remaining_today = run.runs_remaining_today,
            "qpAdm run submitted",
        );
        Ok(run)
    }

    /// Fetch the user's full run history.
    ///
    /// Accepts a bare list or a `{"results": [...]}` envelope. Any other
    /// shape yields an empty list with `format_error` set instead of an
    /// error.
    pub async fn refresh_history(&self) -> Result<HistoryRefresh, RunError> {
        let body = self
            .dispatched_read(|backend| async move { backend.fetch_history().await })
            .await?;

        match normalize_history(body) {
            Ok(runs) => {
                tracing::debug!(count = runs.len(), "Run history refreshed");
                Ok(HistoryRefresh {
                    runs,
                    format_error: None,
                })
            }
            Err(e) => {
                tracing::warn!(error = %e, "Run history has an unexpected shape");
                Ok(HistoryRefresh {
                    runs: Vec::new(),
                    format_error: Some(e.to_string()),
                })
            }
        }
    }

    /// Refresh the history only if some run in `current` is still active.
    ///
    /// Returns `Ok(None)` without touching the network when every run is
    /// terminal (or the list is empty).
    pub async fn poll_active_runs(
        &self,
        current: &[AnalysisRun],
    ) -> Result<Option<HistoryRefresh>, RunError> {
        if !has_active_runs(current) {
            tracing::trace!(runs = current.len(), "No active runs, skipping poll");
            return Ok(None);
        }
        self.refresh_history().await.map(Some)
    }

    /// Fetch a single run by id.
    pub async fn fetch_run(&self, run_id: DbId) -> Result<AnalysisRun, RunError> {
        Ok(self
            .dispatched_read(move |backend| async move { backend.fetch_run(run_id).await })
            .await?)
    }

    /// Fetch today's quota usage.
    pub async fn usage(&self) -> Result<UsageStatus, RunError> {
        Ok(self
            .dispatched_read(|backend| async move { backend.fetch_usage().await })
            .await?)
    }

    /// Fail with [`RunError::QuotaExhausted`] when the backend says no more
    /// runs are allowed today. Returns the fetched status otherwise.
    pub async fn ensure_can_run(&self) -> Result<UsageStatus, RunError> {
        let usage = self.usage().await?;
        if !usage.can_run {
            return Err(RunError::QuotaExhausted(usage.summary()));
        }
        Ok(usage)
    }

    /// Fetch the population catalogue for a dataset panel.
    pub async fn catalog(&self, dataset: DatasetType) -> Result<PopulationCatalog, RunError> {
        Ok(self
            .dispatched_read(move |backend| async move { backend.fetch_catalog(dataset).await })
            .await?)
    }

    /// Re-fetch one run every `interval` until it is terminal.
    ///
    /// Returns the terminal run. A failed run is returned as `Ok`: it is a
    /// valid outcome, not a client error.
    pub async fn wait_for_completion(
        &self,
        run_id: DbId,
        interval: Duration,
    ) -> Result<AnalysisRun, RunError> {
        let mut last_status = None;
        loop {
            let run = self.fetch_run(run_id).await?;
            if last_status != Some(run.status) {
                tracing::info!(
                    run_id,
                    status = %run.status,
                    queue = ?run.queue_info.as_ref().map(|q| q.summary()),
                    "Run status",
                );
                last_status = Some(run.status);
            }
            if run.is_terminal() {
                return Ok(run);
            }
            tokio::time::sleep(interval).await;
        }
    }

    // ---- private helpers ----

    /// Run a read through the dispatcher, retrying per `self.retry`.
    async fn dispatched_read<T, F, Fut>(&self, op: F) -> Result<T, ApiError>
    where
        F: Fn(Arc<B>) -> Fut,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
        T: Send + 'static,
    {
        retry_with_backoff(&self.retry, || {
            let work = op(Arc::clone(&self.backend));
            self.dispatcher.enqueue(move || work)
        })
        .await
    }
}
