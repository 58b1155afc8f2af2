//! Request latency accounting.
//!
//! The budget reads its clock at start, once per [`LatencyBudget::mark`] and once per
//! [`LatencyBudget::remaining_now`], and nowhere else, so a [`ManualClock`] makes timeout
//! behavior fully scripted in tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::Stage;

/// Monotonic time source.
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;
}

#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Test clock. Every read returns the current time and then advances it by `step`.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_nanos: AtomicU64,
    step_nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_step(step: Duration) -> Self {
        let clock = Self::new();
        clock.set_step(step);
        clock
    }

    pub fn set_step(&self, step: Duration) {
        self.step_nanos.store(step.as_nanos() as u64, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now_nanos.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        let step = self.step_nanos.load(Ordering::SeqCst);
        Duration::from_nanos(self.now_nanos.fetch_add(step, Ordering::SeqCst))
    }
}

/// Advisory per-stage budgets in milliseconds. Exceeding one only logs a warning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageBudgets {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fused_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub searched_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scored_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reranked_ms: Option<u64>,
}

impl StageBudgets {
    pub fn get(&self, stage: Stage) -> Option<Duration> {
        let ms = match stage {
            Stage::Fused => self.fused_ms,
            Stage::Searched => self.searched_ms,
            Stage::Scored => self.scored_ms,
            Stage::Reranked => self.reranked_ms,
            Stage::Received | Stage::Completed | Stage::Error => None,
        };
        ms.map(Duration::from_millis)
    }
}

/// Time spent in one stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StageTiming {
    pub stage: Stage,
    pub ms: f64,
}

pub struct LatencyBudget {
    clock: Arc<dyn Clock>,
    total: Duration,
    stages: StageBudgets,
    started: Duration,
    last: Duration,
    state: Stage,
    timings: Vec<StageTiming>,
}

impl LatencyBudget {
    pub fn start(clock: Arc<dyn Clock>, total: Duration, stages: StageBudgets) -> Self {
        let started = clock.now();
        Self {
            clock,
            total,
            stages,
            started,
            last: started,
            state: Stage::Received,
            timings: Vec::with_capacity(4),
        }
    }

    /// Record that `stage` completed now.
    pub fn mark(&mut self, stage: Stage) {
        let now = self.clock.now();
        let spent = now.saturating_sub(self.last);
        self.last = now;
        self.state = stage;
        log::debug!("pipeline: stage={} ms={:.2}", stage, as_ms(spent));

        if let Some(limit) = self.stages.get(stage) {
            if spent > limit {
                log::warn!(
                    "pipeline: stage={} exceeded its budget ({:.2}ms > {}ms)",
                    stage,
                    as_ms(spent),
                    limit.as_millis()
                );
            }
        }

        self.timings.push(StageTiming {
            stage,
            ms: as_ms(spent),
        });
    }

    /// Elapsed time as of the last mark.
    pub fn elapsed(&self) -> Duration {
        self.last.saturating_sub(self.started)
    }

    pub fn exceeded(&self) -> bool {
        self.elapsed() > self.total
    }

    /// Budget left as of the last mark.
    pub fn remaining(&self) -> Duration {
        self.total.saturating_sub(self.elapsed())
    }

    /// Budget left right now. Reads the clock without recording a stage.
    pub fn remaining_now(&self) -> Duration {
        let elapsed = self.clock.now().saturating_sub(self.started);
        self.total.saturating_sub(elapsed)
    }

    /// The last stage reached.
    pub fn state(&self) -> Stage {
        self.state
    }

    pub fn complete(&mut self) {
        self.state = Stage::Completed;
    }

    pub fn fail(&mut self) {
        self.state = Stage::Error;
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn timings(&self) -> &[StageTiming] {
        &self.timings
    }

    pub fn into_timings(self) -> Vec<StageTiming> {
        self.timings
    }
}

pub fn as_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
