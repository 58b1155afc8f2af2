use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Pipeline states, in execution order. `Error` is terminal and reachable from any stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    Fused,
    Searched,
    Scored,
    Reranked,
    Completed,
    Error,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Fused => "fused",
            Stage::Searched => "searched",
            Stage::Scored => "scored",
            Stage::Reranked => "reranked",
            Stage::Completed => "completed",
            Stage::Error => "error",
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
