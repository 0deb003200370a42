use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The neutral device key used when a request carries no device mix.
pub const DEVICE_ALL: &str = "all";

/// A single forecast request. Constructed once per call and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignInput {
    pub industry: String,
    /// Total budget in currency units.
    pub budget: f64,
    pub goals: Vec<String>,
    #[serde(default)]
    pub selected_platforms: Option<Vec<String>>,
    #[serde(default)]
    pub season: Option<String>,
    /// device -> share of traffic. Shares need not sum to 1; they are
    /// normalized when modifiers are blended.
    #[serde(default)]
    pub device_mix: Option<BTreeMap<String, f64>>,
}

impl CampaignInput {
    pub fn new(industry: impl Into<String>, budget: f64, goals: Vec<String>) -> Self {
        Self {
            industry: industry.into(),
            budget,
            goals,
            selected_platforms: None,
            season: None,
            device_mix: None,
        }
    }

    pub fn with_platforms(mut self, platforms: Vec<String>) -> Self {
        self.selected_platforms = Some(platforms);
        self
    }

    pub fn with_season(mut self, season: impl Into<String>) -> Self {
        self.season = Some(season.into());
        self
    }

    pub fn with_device_mix(mut self, mix: BTreeMap<String, f64>) -> Self {
        self.device_mix = Some(mix);
        self
    }

    pub fn has_goal(&self, goal: &str) -> bool {
        self.goals.iter().any(|g| g == goal)
    }

    pub fn selects(&self, platform: &str) -> bool {
        self.selected_platforms
            .as_ref()
            .is_some_and(|ps| ps.iter().any(|p| p == platform))
    }

    /// Share of `device` in the mix, normalized. `None` without a mix.
    pub fn device_share(&self, device: &str) -> Option<f64> {
        let mix = self.device_mix.as_ref()?;
        let total: f64 = mix.values().sum();
        if total <= 0.0 {
            return None;
        }
        Some(mix.get(device).copied().unwrap_or(0.0) / total)
    }
}

/// Budget bucket derived from the total budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetTier {
    Low,
    Medium,
    High,
    Enterprise,
}

impl BudgetTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for BudgetTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reliability label attached to a benchmark value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

/// How suitable a platform is for an industry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compatibility {
    Optimal,
    Allowed,
    Discouraged,
    Disallowed,
}

impl Compatibility {
    /// Optimal and allowed platforms form the industry's allow list.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Optimal | Self::Allowed)
    }
}

impl fmt::Display for Compatibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Optimal => "optimal",
            Self::Allowed => "allowed",
            Self::Discouraged => "discouraged",
            Self::Disallowed => "disallowed",
        })
    }
}

/// Named phase of the customer journey a goal focuses on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunnelStage {
    Awareness,
    Engagement,
    Conversion,
    Retention,
    GrowthLoop,
}

/// Estimated output fields. Used as keys for confidence, explanations and
/// sanity findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Impressions,
    Clicks,
    Ctr,
    Conversions,
    Cvr,
    Roas,
    Cac,
    Cpm,
    Cpc,
}

impl Metric {
    pub const ALL: [Metric; 9] = [
        Metric::Impressions,
        Metric::Clicks,
        Metric::Ctr,
        Metric::Conversions,
        Metric::Cvr,
        Metric::Roas,
        Metric::Cac,
        Metric::Cpm,
        Metric::Cpc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Impressions => "impressions",
            Self::Clicks => "clicks",
            Self::Ctr => "ctr",
            Self::Conversions => "conversions",
            Self::Cvr => "cvr",
            Self::Roas => "roas",
            Self::Cac => "cac",
            Self::Cpm => "cpm",
            Self::Cpc => "cpc",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Language used for rendered explanations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locale {
    #[default]
    En,
    Ar,
}
