//! Input validation against the registries. Problems are returned as data;
//! validation never fails.

use campaign_core::{CampaignInput, Compatibility, ForecastConfig};
use campaign_registry::Registries;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationCode {
    UnknownIndustry,
    InvalidBudget,
    BudgetTooLow,
    NoGoalSelected,
    UnknownGoal,
    UnsupportedPlatform,
    NoAllowedPlatform,
    UnknownSeason,
    UnknownDevice,
    InvalidDeviceMix,
    // Non-fatal
    DiscouragedPlatform,
    OutsideAllowList,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub code: ValidationCode,
    pub message: String,
}

impl ValidationIssue {
    fn new(code: ValidationCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub(crate) fn unknown_industry(industry: &str) -> Self {
        Self::new(
            ValidationCode::UnknownIndustry,
            format!("Unknown industry `{industry}`"),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn into_result(self) -> Result<Vec<ValidationIssue>, ValidationErrors> {
        if self.is_valid {
            Ok(self.warnings)
        } else {
            Err(ValidationErrors(self.errors))
        }
    }
}

/// The error list of a rejected input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationErrors(pub Vec<ValidationIssue>);

impl ValidationErrors {
    pub fn issues(&self) -> &[ValidationIssue] {
        &self.0
    }

    pub fn has(&self, code: ValidationCode) -> bool {
        self.0.iter().any(|i| i.code == code)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self.0.iter().map(|i| i.message.as_str()).collect();
        f.write_str(&messages.join("; "))
    }
}

pub struct Validator<'a> {
    registries: &'a Registries,
    config: &'a ForecastConfig,
}

impl<'a> Validator<'a> {
    pub fn new(registries: &'a Registries, config: &'a ForecastConfig) -> Self {
        Self { registries, config }
    }

    pub fn validate(&self, input: &CampaignInput) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let industry = self.registries.industry(&input.industry);
        if industry.is_none() {
            errors.push(ValidationIssue::unknown_industry(&input.industry));
        }

        let scale = self.config.minor_unit_scale();
        if !input.budget.is_finite() || input.budget < 0.0 {
            errors.push(ValidationIssue::new(
                ValidationCode::InvalidBudget,
                format!("Budget must be a non-negative number, got {}", input.budget),
            ));
        } else if input.budget * scale >= i64::MAX as f64 {
            errors.push(ValidationIssue::new(
                ValidationCode::InvalidBudget,
                format!("Budget {} exceeds the largest supported amount", input.budget),
            ));
        } else if (input.budget * scale).round() / scale != input.budget {
            errors.push(ValidationIssue::new(
                ValidationCode::InvalidBudget,
                format!(
                    "Budget {} has more than {} decimal place(s)",
                    input.budget, self.config.currency_decimals
                ),
            ));
        } else if input.budget < self.config.min_budget {
            errors.push(ValidationIssue::new(
                ValidationCode::BudgetTooLow,
                format!(
                    "Budget {} is below the minimum of {}",
                    input.budget, self.config.min_budget
                ),
            ));
        }

        if input.goals.is_empty() {
            errors.push(ValidationIssue::new(
                ValidationCode::NoGoalSelected,
                "At least one campaign goal must be selected",
            ));
        } else {
            let unknown: Vec<&str> = input
                .goals
                .iter()
                .filter(|g| self.registries.goal(g).is_none())
                .map(String::as_str)
                .collect();
            if !unknown.is_empty() {
                errors.push(ValidationIssue::new(
                    ValidationCode::UnknownGoal,
                    format!("Unknown goal(s): {}", unknown.join(", ")),
                ));
            }
        }

        if let Some(selected) = input.selected_platforms.as_ref().filter(|s| !s.is_empty()) {
            let (known, unknown): (Vec<&String>, Vec<&String>) = selected
                .iter()
                .partition(|p| self.registries.is_supported_platform(p));
            if !unknown.is_empty() {
                let names: Vec<&str> = unknown.iter().map(|p| p.as_str()).collect();
                errors.push(ValidationIssue::new(
                    ValidationCode::UnsupportedPlatform,
                    format!("Unsupported platform(s): {}", names.join(", ")),
                ));
            }

            if let Some(industry) = industry.filter(|_| !known.is_empty()) {
                let mut any_allowed = false;
                for platform in &known {
                    match industry.compatibility(platform) {
                        Compatibility::Optimal | Compatibility::Allowed => any_allowed = true,
                        Compatibility::Discouraged => warnings.push(ValidationIssue::new(
                            ValidationCode::DiscouragedPlatform,
                            format!(
                                "{platform} is discouraged for {} and will be down-weighted",
                                input.industry
                            ),
                        )),
                        Compatibility::Disallowed => warnings.push(ValidationIssue::new(
                            ValidationCode::OutsideAllowList,
                            format!(
                                "{platform} is not on the {} allow list",
                                input.industry
                            ),
                        )),
                    }
                }
                if !any_allowed {
                    errors.push(ValidationIssue::new(
                        ValidationCode::NoAllowedPlatform,
                        format!(
                            "None of the selected platforms is allowed for {}",
                            input.industry
                        ),
                    ));
                }
            }
        }

        if let Some(season) = &input.season {
            if self.registries.season(season).is_none() {
                errors.push(ValidationIssue::new(
                    ValidationCode::UnknownSeason,
                    format!("Unknown season `{season}`"),
                ));
            }
        }

        if let Some(mix) = &input.device_mix {
            let unknown: Vec<&str> = mix
                .keys()
                .filter(|d| self.registries.device(d).is_none())
                .map(String::as_str)
                .collect();
            if !unknown.is_empty() {
                errors.push(ValidationIssue::new(
                    ValidationCode::UnknownDevice,
                    format!("Unknown device(s): {}", unknown.join(", ")),
                ));
            }
            let shares_ok = mix.values().all(|s| s.is_finite() && *s >= 0.0);
            let total: f64 = mix.values().sum();
            if !mix.is_empty() && (!shares_ok || total <= 0.0) {
                errors.push(ValidationIssue::new(
                    ValidationCode::InvalidDeviceMix,
                    "Device shares must be non-negative with a positive total",
                ));
            }
        }

        ValidationReport {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    const ECOMMERCE: &str = "تجارة إلكترونية";

    fn check(input: &CampaignInput) -> ValidationReport {
        let reg = Registries::builtin().unwrap();
        let cfg = ForecastConfig::default();
        Validator::new(&reg, &cfg).validate(input)
    }

    fn codes(report: &ValidationReport) -> Vec<ValidationCode> {
        report.errors.iter().map(|e| e.code).collect()
    }

    #[test]
    fn test_valid_input() {
        let input = CampaignInput::new(ECOMMERCE, 20_000.0, vec!["Sales".into()])
            .with_platforms(vec!["Meta".into(), "TikTok".into()])
            .with_season("Ramadan");
        let report = check(&input);
        assert!(report.is_valid, "{:?}", report.errors);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_three_errors_for_low_budget_no_goal_unknown_platform() {
        let input = CampaignInput::new(ECOMMERCE, 500.0, vec![])
            .with_platforms(vec!["UnknownPlatform".into()]);
        let report = check(&input);
        assert!(!report.is_valid);
        assert_eq!(
            codes(&report),
            vec![
                ValidationCode::BudgetTooLow,
                ValidationCode::NoGoalSelected,
                ValidationCode::UnsupportedPlatform,
            ]
        );
    }

    #[test]
    fn test_unknown_industry_is_an_error_not_a_default() {
        let input = CampaignInput::new("Space Tourism", 20_000.0, vec!["Sales".into()]);
        let report = check(&input);
        assert_eq!(codes(&report), vec![ValidationCode::UnknownIndustry]);
    }

    #[test]
    fn test_minimum_budget_is_inclusive() {
        let input = CampaignInput::new(ECOMMERCE, 1_000.0, vec!["Sales".into()]);
        assert!(check(&input).is_valid);
        let input = CampaignInput::new(ECOMMERCE, 999.99, vec!["Sales".into()]);
        assert_eq!(codes(&check(&input)), vec![ValidationCode::BudgetTooLow]);
    }

    #[test]
    fn test_nan_budget() {
        let input = CampaignInput::new(ECOMMERCE, f64::NAN, vec!["Sales".into()]);
        assert_eq!(codes(&check(&input)), vec![ValidationCode::InvalidBudget]);
    }

    #[test]
    fn test_budget_finer_than_minor_unit() {
        let input = CampaignInput::new(ECOMMERCE, 1_234.567, vec!["Sales".into()]);
        let report = check(&input);
        assert_eq!(codes(&report), vec![ValidationCode::InvalidBudget]);
        assert!(report.errors[0].message.contains("decimal"));

        let input = CampaignInput::new(ECOMMERCE, 1_234.57, vec!["Sales".into()]);
        assert!(check(&input).is_valid);

        let reg = Registries::builtin().unwrap();
        let cfg = ForecastConfig {
            currency_decimals: 0,
            ..ForecastConfig::default()
        };
        let input = CampaignInput::new(ECOMMERCE, 1_500.5, vec!["Sales".into()]);
        let report = Validator::new(&reg, &cfg).validate(&input);
        assert_eq!(codes(&report), vec![ValidationCode::InvalidBudget]);
    }

    #[test]
    fn test_budget_beyond_minor_unit_range() {
        let input = CampaignInput::new(ECOMMERCE, 1e17, vec!["Sales".into()]);
        let report = check(&input);
        assert_eq!(codes(&report), vec![ValidationCode::InvalidBudget]);
        assert!(report.errors[0].message.contains("largest"));

        let input = CampaignInput::new(ECOMMERCE, 1e15, vec!["Sales".into()]);
        assert!(check(&input).is_valid);
    }

    #[test]
    fn test_unknown_goal_and_season() {
        let input = CampaignInput::new(ECOMMERCE, 20_000.0, vec!["Sales".into(), "Fame".into()])
            .with_season("Winter Olympics");
        let report = check(&input);
        assert_eq!(
            codes(&report),
            vec![ValidationCode::UnknownGoal, ValidationCode::UnknownSeason]
        );
        assert!(report.errors[0].message.contains("Fame"));
    }

    #[test]
    fn test_discouraged_selection_is_a_warning() {
        let input = CampaignInput::new(ECOMMERCE, 20_000.0, vec!["Sales".into()])
            .with_platforms(vec!["Meta".into(), "LinkedIn".into()]);
        let report = check(&input);
        assert!(report.is_valid);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].code, ValidationCode::DiscouragedPlatform);
    }

    #[test]
    fn test_selection_must_touch_allow_list() {
        // LinkedIn is discouraged for e-commerce, nothing else selected.
        let input = CampaignInput::new(ECOMMERCE, 20_000.0, vec!["Sales".into()])
            .with_platforms(vec!["LinkedIn".into()]);
        let report = check(&input);
        assert_eq!(codes(&report), vec![ValidationCode::NoAllowedPlatform]);
    }

    #[test]
    fn test_device_mix_checks() {
        let mut mix = BTreeMap::new();
        mix.insert("mobile".to_string(), 0.0);
        mix.insert("hologram".to_string(), 0.0);
        let input =
            CampaignInput::new(ECOMMERCE, 20_000.0, vec!["Sales".into()]).with_device_mix(mix);
        assert_eq!(
            codes(&check(&input)),
            vec![ValidationCode::UnknownDevice, ValidationCode::InvalidDeviceMix]
        );
    }

    #[test]
    fn test_into_result() {
        let input = CampaignInput::new(ECOMMERCE, 10.0, vec!["Sales".into()]);
        let err = check(&input).into_result().unwrap_err();
        assert!(err.has(ValidationCode::BudgetTooLow));
        assert!(err.to_string().contains("below the minimum"));
    }
}
