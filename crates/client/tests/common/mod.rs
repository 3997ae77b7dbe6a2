#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use qpadm_client::api::ApiError;
use qpadm_client::backend::AnalysisBackend;
use qpadm_client::dispatcher::{DispatcherConfig, RequestDispatcher};
use qpadm_client::lifecycle::RunController;
use qpadm_client::retry::RetryConfig;
use qpadm_core::analysis::{AnalysisRequest, Target};
use qpadm_core::catalog::PopulationCatalog;
use qpadm_core::population::DatasetType;
use qpadm_core::run::{AnalysisRun, QueueInfo, RunStatus};
use qpadm_core::types::DbId;
use qpadm_core::usage::UsageStatus;

/// In-memory stand-in for the qpAdm service.
///
/// Counts every call and can be scripted with failures, a history body,
/// a sequence of run snapshots, and artificial latency.
pub struct FakeBackend {
    pub submit_calls: AtomicUsize,
    pub history_calls: AtomicUsize,
    pub run_calls: AtomicUsize,
    pub usage_calls: AtomicUsize,
    pub catalog_calls: AtomicUsize,
    /// Calls currently inside the fake, and the highest value seen.
    pub active: AtomicUsize,
    pub peak_active: AtomicUsize,
    latency: Mutex<Duration>,
    submit_failure: Mutex<Option<(u16, String)>>,
    history_body: Mutex<serde_json::Value>,
    history_failures: Mutex<VecDeque<(u16, String)>>,
    run_snapshots: Mutex<VecDeque<AnalysisRun>>,
    usage: Mutex<UsageStatus>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            submit_calls: AtomicUsize::new(0),
            history_calls: AtomicUsize::new(0),
            run_calls: AtomicUsize::new(0),
            usage_calls: AtomicUsize::new(0),
            catalog_calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak_active: AtomicUsize::new(0),
            latency: Mutex::new(Duration::ZERO),
            submit_failure: Mutex::new(None),
            history_body: Mutex::new(serde_json::json!([])),
            history_failures: Mutex::new(VecDeque::new()),
            run_snapshots: Mutex::new(VecDeque::new()),
            usage: Mutex::new(usage(true)),
        }
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn fail_submit(&self, status: u16, message: &str) {
        *self.submit_failure.lock().unwrap() = Some((status, message.to_string()));
    }

    pub fn set_history(&self, body: serde_json::Value) {
        *self.history_body.lock().unwrap() = body;
    }

    pub fn set_history_runs(&self, runs: &[AnalysisRun]) {
        self.set_history(serde_json::to_value(runs).unwrap());
    }

    /// Fail the next history fetches, one scripted error per call.
    pub fn fail_history(&self, status: u16, message: &str, times: usize) {
        let mut failures = self.history_failures.lock().unwrap();
        for _ in 0..times {
            failures.push_back((status, message.to_string()));
        }
    }

    /// Snapshots returned by successive `fetch_run` calls; the last one repeats.
    pub fn set_run_snapshots(&self, runs: Vec<AnalysisRun>) {
        *self.run_snapshots.lock().unwrap() = runs.into();
    }

    pub fn set_usage(&self, status: UsageStatus) {
        *self.usage.lock().unwrap() = status;
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    async fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active.fetch_max(now, Ordering::SeqCst);
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AnalysisBackend for FakeBackend {
    async fn submit_run(&self, request: &AnalysisRequest) -> Result<AnalysisRun, ApiError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await;
        self.leave();

        if let Some((status, message)) = self.submit_failure.lock().unwrap().clone() {
            return Err(ApiError::Api { status, message });
        }

        let mut run = sample_run(100, RunStatus::Queued);
        run.target_population = request.target.population().map(str::to_string);
        run.dna_file_id = match request.target {
            Target::DnaFile(id) => Some(id),
            Target::Population(_) => None,
        };
        run.source_populations = request.source_populations.clone();
        run.right_populations = request.right_populations.clone();
        run.dataset_type = request.dataset_type;
        run.queue_info = Some(QueueInfo {
            position: 2,
            tasks_ahead: 1,
            is_processing: true,
            estimated_wait_minutes: 3.0,
        });
        Ok(run)
    }

    async fn fetch_run(&self, run_id: DbId) -> Result<AnalysisRun, ApiError> {
        self.run_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await;
        self.leave();

        let mut snapshots = self.run_snapshots.lock().unwrap();
        let run = if snapshots.len() > 1 {
            snapshots.pop_front()
        } else {
            snapshots.front().cloned()
        };
        run.filter(|r| r.id == run_id).ok_or(ApiError::Api {
            status: 404,
            message: "Not found.".to_string(),
        })
    }

    async fn fetch_history(&self) -> Result<serde_json::Value, ApiError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await;
        self.leave();

        if let Some((status, message)) = self.history_failures.lock().unwrap().pop_front() {
            return Err(ApiError::Api { status, message });
        }
        Ok(self.history_body.lock().unwrap().clone())
    }

    async fn fetch_usage(&self) -> Result<UsageStatus, ApiError> {
        self.usage_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.usage.lock().unwrap().clone())
    }

    async fn fetch_catalog(&self, dataset: DatasetType) -> Result<PopulationCatalog, ApiError> {
        self.catalog_calls.fetch_add(1, Ordering::SeqCst);
        let populations = match dataset {
            DatasetType::Panel1240k => vec!["Mbuti.DG", "Estonia_BA.SG", "Russia_Andronovo.SG"],
            DatasetType::HumanOrigins => vec!["Mbuti.DG", "Han", "French"],
        };
        Ok(PopulationCatalog {
            populations: populations.into_iter().map(str::to_string).collect(),
            ..Default::default()
        })
    }
}

/// Controller over `backend` with the default dispatcher and retry settings.
pub fn controller(backend: &Arc<FakeBackend>) -> RunController<FakeBackend> {
    RunController::new(
        Arc::clone(backend),
        RequestDispatcher::new(DispatcherConfig::default()),
        RetryConfig::default(),
    )
}

pub fn conqueror_request() -> AnalysisRequest {
    AnalysisRequest::new(
        Target::Population("Hungary_Conqueror_Elite.SG".into()),
        ["Estonia_BA.SG", "Russia_Andronovo.SG"],
        ["Mbuti.DG", "A.SG", "B.SG", "C.SG", "D.SG"],
        DatasetType::Panel1240k,
    )
}

pub fn sample_run(id: DbId, status: RunStatus) -> AnalysisRun {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "user": 1,
        "target_population": "Hungary_Conqueror_Elite.SG",
        "source_populations": ["Estonia_BA.SG", "Russia_Andronovo.SG"],
        "right_populations": ["Mbuti.DG", "A.SG", "B.SG", "C.SG", "D.SG"],
        "dataset_type": "1240k",
        "status": status,
        "created_at": "2024-03-01T12:00:00Z",
        "runs_remaining_today": 3
    }))
    .unwrap()
}

pub fn usage(can_run: bool) -> UsageStatus {
    UsageStatus {
        runs_used_today: if can_run { 2 } else { 5 },
        runs_remaining_today: if can_run { 3 } else { 0 },
        daily_limit: 5,
        can_run,
        next_reset: None,
    }
}
