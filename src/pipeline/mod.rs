//! The search pipeline: `Received → Fused → Searched → Scored → Reranked → Completed`.
//!
//! The total latency budget is checked after `Fused`, `Searched` and `Scored`. What
//! happens when it runs out is set by [`TimeoutPolicy`].

pub mod budget;
mod orchestrator;
pub mod request;
pub mod response;
mod stage;

pub use budget::{Clock, LatencyBudget, ManualClock, StageBudgets, StageTiming, SystemClock};
pub use orchestrator::{
    PipelineSettings, SearchPipeline, DEFAULT_BUDGET_MS, DEFAULT_CANDIDATE_MULTIPLIER,
};
pub use request::{Filters, QueryContext, RawQuery};
pub use response::{ComponentScores, Degraded, RankedProduct, SearchResponse, Timings};
pub use stage::Stage;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// Return best-effort results from the last completed stage, flagged as degraded.
    #[default]
    Degrade,
    /// Fail the request with `Timeout`.
    Fail,
}
