//! Record types for the reference tables.

use campaign_core::{BudgetTier, Compatibility, ConfidenceTier, FunnelStage, Metric};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Inclusive `[min, max]` range. Deserializes from a two-element array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateRange {
    pub min: f64,
    pub max: f64,
}

impl RateRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// How far `value` lies outside the range, as a percentage of the bound
    /// it crossed. Zero when inside.
    pub fn deviation_percent(&self, value: f64) -> f64 {
        if value < self.min && self.min > 0.0 {
            (self.min - value) / self.min * 100.0
        } else if value > self.max && self.max > 0.0 {
            (value - self.max) / self.max * 100.0
        } else {
            0.0
        }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

// ─── Platforms ──────────────────────────────────────────────────────────────

/// Operational metadata. Informational only; never feeds the arithmetic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub display_name: String,
    pub optimal_budget: RateRange,
    #[serde(default)]
    pub peak_hours: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkMetric {
    pub value: f64,
    pub confidence: ConfidenceTier,
    pub range: RateRange,
}

/// Reference rates for one platform. CTR and CVR are in percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkEntry {
    pub cpm: BenchmarkMetric,
    pub cpc: BenchmarkMetric,
    pub ctr: BenchmarkMetric,
    pub cvr: BenchmarkMetric,
    pub roas: BenchmarkMetric,
    pub cac: BenchmarkMetric,
}

impl BenchmarkEntry {
    pub fn metric(&self, metric: Metric) -> Option<&BenchmarkMetric> {
        match metric {
            Metric::Cpm => Some(&self.cpm),
            Metric::Cpc => Some(&self.cpc),
            Metric::Ctr => Some(&self.ctr),
            Metric::Cvr => Some(&self.cvr),
            Metric::Roas => Some(&self.roas),
            Metric::Cac => Some(&self.cac),
            Metric::Impressions | Metric::Clicks | Metric::Conversions => None,
        }
    }

    fn metrics(&self) -> [(&'static str, &BenchmarkMetric); 6] {
        [
            ("cpm", &self.cpm),
            ("cpc", &self.cpc),
            ("ctr", &self.ctr),
            ("cvr", &self.cvr),
            ("roas", &self.roas),
            ("cac", &self.cac),
        ]
    }

    pub(crate) fn check(&self) -> Result<(), String> {
        for (name, m) in self.metrics() {
            if !(m.value > 0.0) {
                return Err(format!("{name} must be positive, got {}", m.value));
            }
            if m.range.min > m.range.max {
                return Err(format!("{name} range is inverted"));
            }
        }
        Ok(())
    }
}

// ─── Industries ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Industry {
    pub min_platforms: usize,
    pub max_platforms: usize,
    #[serde(default)]
    pub optimal: Vec<String>,
    #[serde(default)]
    pub allowed: Vec<String>,
    #[serde(default)]
    pub discouraged: Vec<String>,
    /// Average revenue attributed to one conversion, used only for ROAS.
    pub value_per_conversion: f64,
}

impl Industry {
    pub fn compatibility(&self, platform: &str) -> Compatibility {
        if self.optimal.iter().any(|p| p == platform) {
            Compatibility::Optimal
        } else if self.allowed.iter().any(|p| p == platform) {
            Compatibility::Allowed
        } else if self.discouraged.iter().any(|p| p == platform) {
            Compatibility::Discouraged
        } else {
            Compatibility::Disallowed
        }
    }

    pub fn recommended_platforms(&self) -> &[String] {
        &self.optimal
    }

    /// Optimal platforms first, then allowed ones.
    pub fn allow_list(&self) -> impl Iterator<Item = &String> {
        self.optimal.iter().chain(self.allowed.iter())
    }
}

// ─── Goals and modifiers ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub funnel_focus: FunnelStage,
    /// platform -> multiplier. Missing platforms are neutral.
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
}

impl Goal {
    pub fn weight(&self, platform: &str) -> f64 {
        self.weights.get(platform).copied().unwrap_or(1.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetTierEntry {
    pub tier: BudgetTier,
    /// Inclusive lower bound of the bucket.
    pub min_budget: f64,
    #[serde(default)]
    pub goal_multipliers: BTreeMap<String, f64>,
    #[serde(default)]
    pub platform_multipliers: BTreeMap<String, f64>,
}

fn neutral() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Season {
    #[serde(default)]
    pub goal_multipliers: BTreeMap<String, f64>,
    #[serde(default)]
    pub platform_multipliers: BTreeMap<String, f64>,
    #[serde(default = "neutral")]
    pub cpm_modifier: f64,
    #[serde(default = "neutral")]
    pub ctr_modifier: f64,
    #[serde(default = "neutral")]
    pub cvr_modifier: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceModifier {
    #[serde(default = "neutral")]
    pub ctr_mod: f64,
    #[serde(default = "neutral")]
    pub cvr_mod: f64,
}

/// Known-good rate ranges for an (industry, goal) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpectedRange {
    pub industry: String,
    pub goal: String,
    pub ranges: BTreeMap<Metric, RateRange>,
}

// ─── Recommendation rules ───────────────────────────────────────────────────

/// Boolean condition over a request and its allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Predicate {
    IndustryIs { industry: String },
    BudgetBelow { amount: f64 },
    BudgetAtLeast { amount: f64 },
    BudgetTierIs { tier: BudgetTier },
    HasGoal { goal: String },
    GoalCountAbove { count: usize },
    PlatformSelected { platform: String },
    AllocatedTo { platform: String },
    MaxShareAbove { share: f64 },
    SeasonIs { season: String },
    DeviceShareAbove { device: String, share: f64 },
    All { predicates: Vec<Predicate> },
    Any { predicates: Vec<Predicate> },
    Not { predicate: Box<Predicate> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRule {
    pub id: String,
    pub when: Predicate,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_deserializes_from_array() {
        let r: RateRange = serde_json::from_str("[0.8, 1.5]").unwrap();
        assert_eq!(r, RateRange::new(0.8, 1.5));
        assert!(r.contains(1.0));
        assert!(!r.contains(1.6));
    }

    #[test]
    fn test_deviation_percent() {
        let r = RateRange::new(0.8, 1.5);
        assert_eq!(r.deviation_percent(1.0), 0.0);
        assert!((r.deviation_percent(0.4) - 50.0).abs() < 1e-9);
        assert!((r.deviation_percent(1.8) - 20.0).abs() < 1e-9);
        assert_eq!(r.clamp(0.4), 0.8);
    }

    #[test]
    fn test_compatibility_lookup() {
        let industry = Industry {
            min_platforms: 1,
            max_platforms: 3,
            optimal: vec!["Meta".into()],
            allowed: vec!["X".into()],
            discouraged: vec!["TikTok".into()],
            value_per_conversion: 100.0,
        };
        assert_eq!(industry.compatibility("Meta"), Compatibility::Optimal);
        assert_eq!(industry.compatibility("X"), Compatibility::Allowed);
        assert_eq!(industry.compatibility("TikTok"), Compatibility::Discouraged);
        assert_eq!(industry.compatibility("LinkedIn"), Compatibility::Disallowed);
        assert_eq!(industry.allow_list().count(), 2);
    }

    #[test]
    fn test_predicate_tagging() {
        let json = r#"{"type":"not","predicate":{"type":"has_goal","goal":"Sales"}}"#;
        let p: Predicate = serde_json::from_str(json).unwrap();
        assert_eq!(
            p,
            Predicate::Not {
                predicate: Box::new(Predicate::HasGoal {
                    goal: "Sales".into()
                })
            }
        );
    }
}
