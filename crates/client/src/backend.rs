//! Backend seam used by the lifecycle controller.
//!
//! [`HttpBackend`](crate::api::HttpBackend) is the production
//! implementation; tests substitute an in-memory fake.

use async_trait::async_trait;
use qpadm_core::analysis::AnalysisRequest;
use qpadm_core::catalog::PopulationCatalog;
use qpadm_core::population::DatasetType;
use qpadm_core::run::AnalysisRun;
use qpadm_core::types::DbId;
use qpadm_core::usage::UsageStatus;

use crate::api::ApiError;

/// Remote operations of the qpAdm service.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Create a run. The returned run may already be `queued`.
    async fn submit_run(&self, request: &AnalysisRequest) -> Result<AnalysisRun, ApiError>;

    async fn fetch_run(&self, run_id: DbId) -> Result<AnalysisRun, ApiError>;

    /// Raw history body. Its shape varies (bare list or pagination
    /// envelope) and is normalised by the caller.
    async fn fetch_history(&self) -> Result<serde_json::Value, ApiError>;

    async fn fetch_usage(&self) -> Result<UsageStatus, ApiError>;

    async fn fetch_catalog(&self, dataset: DatasetType) -> Result<PopulationCatalog, ApiError>;
}
