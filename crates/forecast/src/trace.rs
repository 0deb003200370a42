//! Ordered record of every adjustment applied while allocating and
//! estimating. Explanations are rendered from this record, never from the
//! computation itself.

use campaign_core::{BudgetTier, Metric};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum TraceStep {
    IndustrySplit {
        industry: String,
        fell_back: bool,
    },
    GoalWeight {
        goal: String,
        platform: String,
        multiplier: f64,
    },
    /// Weight of a goal inside the multi-goal average.
    GoalBlend {
        goal: String,
        weight: f64,
    },
    BudgetTier {
        tier: BudgetTier,
        platform: String,
        multiplier: f64,
    },
    SeasonAllocation {
        season: String,
        platform: String,
        multiplier: f64,
    },
    DiscouragePenalty {
        platform: String,
        multiplier: f64,
    },
    PlatformsRestricted {
        platforms: Vec<String>,
    },
    PlatformAdded {
        platform: String,
        min_platforms: usize,
    },
    PlatformDropped {
        platform: String,
        max_platforms: usize,
    },
    Normalized {
        platform: String,
        weight: f64,
    },
    RoundingResidual {
        platform: String,
        residual_minor: i64,
    },
    BenchmarkSource {
        platform: String,
        fell_back: bool,
    },
    SeasonRates {
        season: String,
        cpm: f64,
        ctr: f64,
        cvr: f64,
    },
    DeviceMix {
        devices: Vec<String>,
        ctr_mod: f64,
        cvr_mod: f64,
    },
    ConversionValue {
        value: f64,
    },
    Clamped {
        platform: String,
        metric: Metric,
        from: f64,
        to: f64,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentTrace {
    steps: Vec<TraceStep>,
}

impl AdjustmentTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: TraceStep) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[TraceStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TraceStep> {
        self.steps.iter()
    }
}
