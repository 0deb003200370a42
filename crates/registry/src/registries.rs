//! The immutable reference tables consumed by the forecasting engine.
//!
//! A `Registries` value is built once (from the embedded tables or a JSON
//! file), checked with [`Registries::validate`], and then shared read-only.

use crate::error::{RegistryError, RegistryResult};
use crate::model::{
    BenchmarkEntry, BudgetTierEntry, DeviceModifier, ExpectedRange, Goal, Industry, PlatformInfo,
    RecommendationRule, Season,
};
use campaign_core::types::DEVICE_ALL;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Key of the fallback row in the split and benchmark tables.
pub const DEFAULT_KEY: &str = "default";

const BUILTIN_JSON: &str = include_str!("../data/builtin.json");

/// Split shares must sum to 1 within this tolerance.
const SPLIT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registries {
    pub platforms: BTreeMap<String, PlatformInfo>,
    pub industries: BTreeMap<String, Industry>,
    /// industry -> platform -> share. Always has a `default` row.
    pub platform_splits: BTreeMap<String, BTreeMap<String, f64>>,
    /// industry -> platform -> benchmark. Always has a `default` row.
    pub benchmarks: BTreeMap<String, BTreeMap<String, BenchmarkEntry>>,
    pub goals: BTreeMap<String, Goal>,
    pub budget_tiers: Vec<BudgetTierEntry>,
    #[serde(default)]
    pub seasons: BTreeMap<String, Season>,
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceModifier>,
    #[serde(default)]
    pub expected_ranges: Vec<ExpectedRange>,
    #[serde(default)]
    pub recommendations: Vec<RecommendationRule>,
}

/// Benchmark lookup result. `fell_back` is set when the industry had no
/// entry for the platform and the `default` row was used.
#[derive(Debug, Clone, Copy)]
pub struct BenchmarkLookup<'a> {
    pub entry: &'a BenchmarkEntry,
    pub fell_back: bool,
}

impl Registries {
    /// The production tables embedded in the binary.
    pub fn builtin() -> RegistryResult<Self> {
        Self::from_json_str(BUILTIN_JSON)
    }

    pub fn from_json_str(json: &str) -> RegistryResult<Self> {
        let mut registries: Registries = serde_json::from_str(json)?;
        registries.budget_tiers.sort_by(|a, b| a.min_budget.total_cmp(&b.min_budget));
        registries.validate()?;
        debug!(
            industries = registries.industries.len(),
            platforms = registries.platforms.len(),
            goals = registries.goals.len(),
            "Registries parsed"
        );
        Ok(registries)
    }

    pub fn from_path(path: impl AsRef<Path>) -> RegistryResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let registries = Self::from_json_str(&json)?;
        info!(path = %path.display(), "Registries loaded from file");
        Ok(registries)
    }

    /// Structural checks every table must pass before a forecast runs.
    pub fn validate(&self) -> RegistryResult<()> {
        if self.platforms.is_empty() {
            return Err(RegistryError::invalid("platform universe is empty"));
        }
        if self.budget_tiers.is_empty() {
            return Err(RegistryError::invalid("at least one budget tier is required"));
        }
        if !self.platform_splits.contains_key(DEFAULT_KEY) {
            return Err(RegistryError::invalid("platform_splits has no `default` row"));
        }

        for (industry, split) in &self.platform_splits {
            let total: f64 = split.values().sum();
            if (total - 1.0).abs() > SPLIT_TOLERANCE {
                return Err(RegistryError::invalid(format!(
                    "split for `{industry}` sums to {total}, expected 1.0"
                )));
            }
            for (platform, share) in split {
                self.require_platform(platform, &format!("split `{industry}`"))?;
                if !(0.0..=1.0).contains(share) {
                    return Err(RegistryError::invalid(format!(
                        "split `{industry}` share for `{platform}` is outside [0, 1]"
                    )));
                }
            }
        }

        let defaults = self
            .benchmarks
            .get(DEFAULT_KEY)
            .ok_or_else(|| RegistryError::invalid("benchmarks has no `default` row"))?;
        for platform in self.platforms.keys() {
            if !defaults.contains_key(platform) {
                return Err(RegistryError::invalid(format!(
                    "no default benchmark for platform `{platform}`"
                )));
            }
        }
        for (industry, rows) in &self.benchmarks {
            for (platform, entry) in rows {
                self.require_platform(platform, &format!("benchmarks `{industry}`"))?;
                entry.check().map_err(|e| {
                    RegistryError::invalid(format!("benchmark `{industry}`/`{platform}`: {e}"))
                })?;
            }
        }

        for (key, industry) in &self.industries {
            if industry.min_platforms == 0 || industry.min_platforms > industry.max_platforms {
                return Err(RegistryError::invalid(format!(
                    "industry `{key}` has invalid platform bounds {}..{}",
                    industry.min_platforms, industry.max_platforms
                )));
            }
            for platform in industry
                .optimal
                .iter()
                .chain(&industry.allowed)
                .chain(&industry.discouraged)
            {
                self.require_platform(platform, &format!("industry `{key}`"))?;
            }
            if industry.allow_list().count() < industry.min_platforms {
                return Err(RegistryError::invalid(format!(
                    "industry `{key}` allows fewer platforms than its minimum"
                )));
            }
            if !(industry.value_per_conversion > 0.0) {
                return Err(RegistryError::invalid(format!(
                    "industry `{key}` needs a positive value_per_conversion"
                )));
            }
        }

        for (key, goal) in &self.goals {
            for (platform, weight) in &goal.weights {
                self.require_platform(platform, &format!("goal `{key}`"))?;
                if *weight < 0.0 {
                    return Err(RegistryError::invalid(format!(
                        "goal `{key}` has a negative weight for `{platform}`"
                    )));
                }
            }
        }

        for range in &self.expected_ranges {
            for (metric, r) in &range.ranges {
                if r.min > r.max {
                    return Err(RegistryError::invalid(format!(
                        "expected range {metric} for `{}`/`{}` is inverted",
                        range.industry, range.goal
                    )));
                }
            }
        }

        Ok(())
    }

    fn require_platform(&self, platform: &str, context: &str) -> RegistryResult<()> {
        if self.platforms.contains_key(platform) {
            Ok(())
        } else {
            Err(RegistryError::invalid(format!(
                "{context} references unknown platform `{platform}`"
            )))
        }
    }

    // ─── Lookups ────────────────────────────────────────────────────────────

    pub fn industry(&self, key: &str) -> Option<&Industry> {
        self.industries.get(key)
    }

    pub fn is_supported_platform(&self, platform: &str) -> bool {
        self.platforms.contains_key(platform)
    }

    pub fn platform(&self, key: &str) -> Option<&PlatformInfo> {
        self.platforms.get(key)
    }

    pub fn goal(&self, key: &str) -> Option<&Goal> {
        self.goals.get(key)
    }

    pub fn season(&self, key: &str) -> Option<&Season> {
        self.seasons.get(key)
    }

    /// Unknown devices resolve to `None`; the `all` device is neutral even
    /// when the table omits it.
    pub fn device(&self, key: &str) -> Option<DeviceModifier> {
        match self.devices.get(key) {
            Some(m) => Some(*m),
            None if key == DEVICE_ALL => Some(DeviceModifier {
                ctr_mod: 1.0,
                cvr_mod: 1.0,
            }),
            None => None,
        }
    }

    /// The industry's split row, or the `default` row. The flag reports
    /// whether the fallback was taken.
    pub fn split_for(&self, industry: &str) -> Option<(&BTreeMap<String, f64>, bool)> {
        if let Some(split) = self.platform_splits.get(industry) {
            return Some((split, false));
        }
        self.platform_splits.get(DEFAULT_KEY).map(|split| (split, true))
    }

    /// Share a platform has in the `default` split (zero if absent).
    pub fn default_share(&self, platform: &str) -> f64 {
        self.platform_splits
            .get(DEFAULT_KEY)
            .and_then(|s| s.get(platform))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn benchmark(&self, industry: &str, platform: &str) -> Option<BenchmarkLookup<'_>> {
        if let Some(entry) = self.benchmarks.get(industry).and_then(|r| r.get(platform)) {
            return Some(BenchmarkLookup {
                entry,
                fell_back: false,
            });
        }
        self.benchmarks
            .get(DEFAULT_KEY)
            .and_then(|r| r.get(platform))
            .map(|entry| BenchmarkLookup {
                entry,
                fell_back: true,
            })
    }

    /// The bucket with the highest lower bound not above `budget`. Budgets
    /// below every bound land in the first bucket.
    pub fn budget_tier(&self, budget: f64) -> Option<&BudgetTierEntry> {
        self.budget_tiers
            .iter()
            .rev()
            .find(|t| budget >= t.min_budget)
            .or_else(|| self.budget_tiers.first())
    }

    pub fn expected_range(&self, industry: &str, goal: &str) -> Option<&ExpectedRange> {
        self.expected_ranges
            .iter()
            .find(|r| r.industry == industry && r.goal == goal)
    }
}
