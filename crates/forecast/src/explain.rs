//! Per-field justification text rendered from the adjustment trace.
//!
//! The generator never recomputes anything. It folds the trace into a
//! summary of which adjustments were applied and fills a fixed template per
//! field with those sources and the final numbers.

use crate::allocation::AllocationResult;
use crate::kpi::KpiEstimate;
use crate::trace::{AdjustmentTrace, TraceStep};
use campaign_core::format::{format_count, format_currency, format_percentage};
use campaign_core::{ForecastConfig, Locale, Metric};
use std::collections::BTreeMap;

/// Field name (`allocation` or a metric name) -> justification.
pub type Explanations = BTreeMap<String, String>;

pub const ALLOCATION_KEY: &str = "allocation";

#[derive(Debug, Default)]
struct TraceSummary {
    industry: String,
    split_fell_back: bool,
    goals: Vec<(String, f64)>,
    allocation_season: Option<String>,
    discouraged: Vec<(String, f64)>,
    added: Vec<String>,
    dropped: Vec<String>,
    residual: Option<(String, i64)>,
    default_benchmarks: Vec<String>,
    season_rates: Option<(String, f64, f64, f64)>,
    devices: Vec<String>,
    device_ctr: f64,
    device_cvr: f64,
    conversion_value: f64,
    clamped: Vec<(String, Metric, f64, f64)>,
}

impl TraceSummary {
    fn from_trace(trace: &AdjustmentTrace) -> Self {
        let mut s = Self {
            device_ctr: 1.0,
            device_cvr: 1.0,
            ..Default::default()
        };
        for step in trace.iter() {
            match step {
                TraceStep::IndustrySplit {
                    industry,
                    fell_back,
                } => {
                    s.industry = industry.clone();
                    s.split_fell_back = *fell_back;
                }
                TraceStep::GoalBlend { goal, weight } => s.goals.push((goal.clone(), *weight)),
                TraceStep::SeasonAllocation { season, .. } => {
                    s.allocation_season = Some(season.clone())
                }
                TraceStep::DiscouragePenalty {
                    platform,
                    multiplier,
                } => s.discouraged.push((platform.clone(), *multiplier)),
                TraceStep::PlatformAdded { platform, .. } => s.added.push(platform.clone()),
                TraceStep::PlatformDropped { platform, .. } => s.dropped.push(platform.clone()),
                TraceStep::RoundingResidual {
                    platform,
                    residual_minor,
                } => s.residual = Some((platform.clone(), *residual_minor)),
                TraceStep::BenchmarkSource {
                    platform,
                    fell_back: true,
                } => s.default_benchmarks.push(platform.clone()),
                TraceStep::SeasonRates {
                    season,
                    cpm,
                    ctr,
                    cvr,
                } => s.season_rates = Some((season.clone(), *cpm, *ctr, *cvr)),
                TraceStep::DeviceMix {
                    devices,
                    ctr_mod,
                    cvr_mod,
                } => {
                    s.devices = devices.clone();
                    s.device_ctr = *ctr_mod;
                    s.device_cvr = *cvr_mod;
                }
                TraceStep::ConversionValue { value } => s.conversion_value = *value,
                TraceStep::Clamped {
                    platform,
                    metric,
                    from,
                    to,
                } => s.clamped.push((platform.clone(), *metric, *from, *to)),
                TraceStep::GoalWeight { .. }
                | TraceStep::BudgetTier { .. }
                | TraceStep::PlatformsRestricted { .. }
                | TraceStep::Normalized { .. }
                | TraceStep::BenchmarkSource { .. } => {}
            }
        }
        s
    }

    fn clamped_for(&self, metric: Metric) -> impl Iterator<Item = &(String, Metric, f64, f64)> {
        self.clamped.iter().filter(move |c| c.1 == metric)
    }
}

pub struct ExplainabilityGenerator<'a> {
    locale: Locale,
    decimals: u32,
    currency: &'a str,
}

impl<'a> ExplainabilityGenerator<'a> {
    pub fn new(config: &'a ForecastConfig) -> Self {
        Self {
            locale: config.locale,
            decimals: config.currency_decimals,
            currency: &config.currency_code,
        }
    }

    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    pub fn explain(
        &self,
        trace: &AdjustmentTrace,
        allocation: &AllocationResult,
        estimate: &KpiEstimate,
    ) -> Explanations {
        let s = TraceSummary::from_trace(trace);
        let mut out = Explanations::new();
        out.insert(ALLOCATION_KEY.to_string(), self.allocation(&s, allocation));
        for metric in Metric::ALL {
            out.insert(metric.as_str().to_string(), self.metric(&s, metric, estimate));
        }
        out
    }

    fn money(&self, amount: f64) -> String {
        format_currency(amount, self.decimals, self.currency)
    }

    fn allocation(&self, s: &TraceSummary, allocation: &AllocationResult) -> String {
        let goals = s
            .goals
            .iter()
            .map(|(g, w)| {
                if (w - 1.0).abs() < 1e-9 {
                    g.clone()
                } else {
                    format!("{g} (×{w:.2})")
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        let largest = allocation.platforms.first();

        let mut parts = Vec::new();
        match self.locale {
            Locale::En => {
                parts.push(format!(
                    "{} split across {} platform(s) starting from the {} split{}, weighted for {} at the {} budget tier{}.",
                    self.money(allocation.budget),
                    allocation.platforms.len(),
                    if s.split_fell_back { "default" } else { s.industry.as_str() },
                    if s.split_fell_back { " (no industry row)" } else { "" },
                    goals,
                    allocation.budget_tier,
                    s.allocation_season
                        .as_ref()
                        .map(|season| format!(" with {season} seasonal weights"))
                        .unwrap_or_default(),
                ));
                for (platform, m) in &s.discouraged {
                    parts.push(format!("{platform} reduced ×{m:.2} as discouraged for this industry."));
                }
                if !s.added.is_empty() {
                    parts.push(format!("Added to meet the platform minimum: {}.", s.added.join(", ")));
                }
                if !s.dropped.is_empty() {
                    parts.push(format!("Dropped to respect the platform maximum: {}.", s.dropped.join(", ")));
                }
                if let Some(p) = largest {
                    parts.push(format!(
                        "Largest share: {} at {}.",
                        p.platform,
                        format_percentage(p.share * 100.0, 1)
                    ));
                }
                if let Some((platform, minor)) = &s.residual {
                    parts.push(format!(
                        "A rounding residual of {minor} minor unit(s) was assigned to {platform}."
                    ));
                }
            }
            Locale::Ar => {
                parts.push(format!(
                    "تم توزيع {} على {} منصة انطلاقاً من توزيع {}{}، مع أوزان الأهداف: {} ضمن شريحة الميزانية {}{}.",
                    self.money(allocation.budget),
                    allocation.platforms.len(),
                    if s.split_fell_back { "الافتراضي" } else { s.industry.as_str() },
                    if s.split_fell_back { " (لا يوجد توزيع خاص بالقطاع)" } else { "" },
                    goals,
                    allocation.budget_tier,
                    s.allocation_season
                        .as_ref()
                        .map(|season| format!(" وأوزان موسم {season}"))
                        .unwrap_or_default(),
                ));
                for (platform, m) in &s.discouraged {
                    parts.push(format!("خُفّض وزن {platform} بمعامل ×{m:.2} لأنها غير مفضلة لهذا القطاع."));
                }
                if !s.added.is_empty() {
                    parts.push(format!("أضيفت لتحقيق الحد الأدنى للمنصات: {}.", s.added.join("، ")));
                }
                if !s.dropped.is_empty() {
                    parts.push(format!("استُبعدت للالتزام بالحد الأقصى للمنصات: {}.", s.dropped.join("، ")));
                }
                if let Some(p) = largest {
                    parts.push(format!(
                        "أكبر حصة: {} بنسبة {}.",
                        p.platform,
                        format_percentage(p.share * 100.0, 1)
                    ));
                }
                if let Some((platform, minor)) = &s.residual {
                    parts.push(format!("أضيف فرق التقريب ({minor} وحدة صغرى) إلى {platform}."));
                }
            }
        }
        parts.join(" ")
    }

    fn metric(&self, s: &TraceSummary, metric: Metric, estimate: &KpiEstimate) -> String {
        let t = &estimate.totals;
        let ar = self.locale == Locale::Ar;
        let season = s.season_rates.as_ref();

        let mut text = match metric {
            Metric::Impressions => {
                let sources = self.benchmark_sources(s, estimate.platforms.len());
                if ar {
                    format!(
                        "{} ظهور بتكلفة فعلية لكل ألف ظهور قدرها {}. {}",
                        format_count(t.impressions),
                        self.money(t.cpm),
                        sources
                    )
                } else {
                    format!(
                        "{} impressions at an effective CPM of {}. {}",
                        format_count(t.impressions),
                        self.money(t.cpm),
                        sources
                    )
                }
            }
            Metric::Cpm => {
                let note = season
                    .map(|(name, cpm, _, _)| {
                        if ar {
                            format!(" تشمل معامل موسم {name} ×{cpm:.2}.")
                        } else {
                            format!(", including the {name} cost modifier ×{cpm:.2}.")
                        }
                    })
                    .unwrap_or_else(|| ".".to_string());
                if ar {
                    format!(
                        "التكلفة لكل ألف ظهور {} = الإنفاق ÷ مرات الظهور × 1000{}",
                        self.money(t.cpm),
                        note
                    )
                } else {
                    format!(
                        "Effective CPM {} = spend / impressions × 1000{}",
                        self.money(t.cpm),
                        note
                    )
                }
            }
            Metric::Clicks => {
                if ar {
                    format!(
                        "{} نقرة = مرات الظهور × معدل النقر {}.",
                        format_count(t.clicks),
                        format_percentage(t.ctr, 2)
                    )
                } else {
                    format!(
                        "{} clicks = impressions × CTR {}.",
                        format_count(t.clicks),
                        format_percentage(t.ctr, 2)
                    )
                }
            }
            Metric::Ctr => self.rate_sentence(
                s,
                "CTR",
                "معدل النقر",
                t.ctr,
                season.map(|(name, _, ctr, _)| (name.as_str(), *ctr)),
                s.device_ctr,
            ),
            Metric::Conversions => {
                if ar {
                    format!(
                        "{} تحويل = النقرات × معدل التحويل {}.",
                        format_count(t.conversions),
                        format_percentage(t.cvr, 2)
                    )
                } else {
                    format!(
                        "{} conversions = clicks × CVR {}.",
                        format_count(t.conversions),
                        format_percentage(t.cvr, 2)
                    )
                }
            }
            Metric::Cvr => self.rate_sentence(
                s,
                "CVR",
                "معدل التحويل",
                t.cvr,
                season.map(|(name, _, _, cvr)| (name.as_str(), *cvr)),
                s.device_cvr,
            ),
            Metric::Roas => {
                if ar {
                    format!(
                        "العائد على الإنفاق الإعلاني {:.2}x = الإيرادات {} ÷ الإنفاق {}، بقيمة {} لكل تحويل.",
                        t.roas,
                        self.money(t.revenue),
                        self.money(t.spend),
                        self.money(s.conversion_value)
                    )
                } else {
                    format!(
                        "ROAS {:.2}x = revenue {} / spend {}, valuing each conversion at {}.",
                        t.roas,
                        self.money(t.revenue),
                        self.money(t.spend),
                        self.money(s.conversion_value)
                    )
                }
            }
            Metric::Cac => match (t.cac, ar) {
                (Some(cac), false) => format!(
                    "CAC {} = spend / {} conversions.",
                    self.money(cac),
                    format_count(t.conversions)
                ),
                (Some(cac), true) => format!(
                    "تكلفة الاستحواذ {} = الإنفاق ÷ {} تحويل.",
                    self.money(cac),
                    format_count(t.conversions)
                ),
                (None, false) => "CAC is undefined: no conversions are expected.".to_string(),
                (None, true) => "تكلفة الاستحواذ غير معرّفة: لا يُتوقع أي تحويل.".to_string(),
            },
            Metric::Cpc => match (t.cpc, ar) {
                (Some(cpc), false) => format!("CPC {} = spend / clicks.", self.money(cpc)),
                (Some(cpc), true) => format!("تكلفة النقرة {} = الإنفاق ÷ النقرات.", self.money(cpc)),
                (None, false) => "CPC is undefined: no clicks are expected.".to_string(),
                (None, true) => "تكلفة النقرة غير معرّفة: لا يُتوقع أي نقرات.".to_string(),
            },
        };

        for (platform, m, from, to) in s.clamped_for(metric) {
            if ar {
                text.push_str(&format!(
                    " تم تقييد {} لمنصة {platform} من {from:.2} إلى {to:.2}.",
                    m.as_str().to_uppercase()
                ));
            } else {
                text.push_str(&format!(
                    " {platform} {} clamped from {from:.2} to {to:.2}.",
                    m.as_str().to_uppercase()
                ));
            }
        }
        text
    }

    fn rate_sentence(
        &self,
        s: &TraceSummary,
        label_en: &str,
        label_ar: &str,
        value: f64,
        season: Option<(&str, f64)>,
        device: f64,
    ) -> String {
        let devices = s.devices.join(", ");
        match self.locale {
            Locale::En => {
                let mut text = format!(
                    "Blended {label_en} {} from platform benchmarks",
                    format_percentage(value, 2)
                );
                if let Some((name, m)) = season {
                    text.push_str(&format!(", {name} modifier ×{m:.2}"));
                }
                text.push_str(&format!(", device mix ({devices}) ×{device:.2}."));
                text
            }
            Locale::Ar => {
                let mut text = format!(
                    "{label_ar} المرجّح {} مستند إلى معايير المنصات",
                    format_percentage(value, 2)
                );
                if let Some((name, m)) = season {
                    text.push_str(&format!("، معامل موسم {name} ×{m:.2}"));
                }
                text.push_str(&format!("، مزيج الأجهزة ({devices}) ×{device:.2}."));
                text
            }
        }
    }

    fn benchmark_sources(&self, s: &TraceSummary, platforms: usize) -> String {
        let own = platforms.saturating_sub(s.default_benchmarks.len());
        match (self.locale, s.default_benchmarks.is_empty()) {
            (Locale::En, true) => format!("All {own} benchmark(s) come from the {} table.", s.industry),
            (Locale::En, false) => format!(
                "{own} benchmark(s) from the {} table, default benchmarks for {}.",
                s.industry,
                s.default_benchmarks.join(", ")
            ),
            (Locale::Ar, true) => format!("جميع المعايير ({own}) من جدول {}.", s.industry),
            (Locale::Ar, false) => format!(
                "{own} من المعايير من جدول {}، ومعايير افتراضية لـ {}.",
                s.industry,
                s.default_benchmarks.join("، ")
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::AllocationEngine;
    use crate::kpi::{KpiEstimator, RateOverrides};
    use campaign_core::CampaignInput;
    use campaign_registry::Registries;

    fn render(input: &CampaignInput, locale: Locale, overrides: &RateOverrides) -> Explanations {
        let reg = Registries::builtin().unwrap();
        let cfg = ForecastConfig::default();
        let mut trace = AdjustmentTrace::new();
        let allocation = AllocationEngine::new(&reg, &cfg)
            .allocate(input, &mut trace)
            .unwrap();
        let (estimate, _) = KpiEstimator::new(&reg)
            .estimate(input, &allocation, overrides, &mut trace)
            .unwrap();
        ExplainabilityGenerator::new(&cfg)
            .with_locale(locale)
            .explain(&trace, &allocation, &estimate)
    }

    fn sample() -> CampaignInput {
        CampaignInput::new("تجارة إلكترونية", 100_000.0, vec!["Sales".into(), "Traffic".into()])
            .with_platforms(vec!["Meta".into(), "Google Search".into(), "LinkedIn".into()])
            .with_season("White Friday")
    }

    #[test]
    fn test_one_explanation_per_field() {
        let out = render(&sample(), Locale::En, &RateOverrides::new());
        assert_eq!(out.len(), Metric::ALL.len() + 1);
        assert!(out.contains_key(ALLOCATION_KEY));
        for metric in Metric::ALL {
            assert!(!out[metric.as_str()].is_empty());
        }
    }

    #[test]
    fn test_sources_are_named() {
        let out = render(&sample(), Locale::En, &RateOverrides::new());
        let allocation = &out[ALLOCATION_KEY];
        assert!(allocation.contains("Sales"));
        assert!(allocation.contains("White Friday"));
        assert!(allocation.contains("LinkedIn reduced ×0.50"));
        assert!(out["ctr"].contains("White Friday modifier ×1.15"));
        assert!(out["impressions"].contains("default benchmarks for LinkedIn"));
        assert!(out["roas"].contains("SAR 250.00"));
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let a = render(&sample(), Locale::Ar, &RateOverrides::new());
        let b = render(&sample(), Locale::Ar, &RateOverrides::new());
        assert_eq!(a, b);
        assert_ne!(a, render(&sample(), Locale::En, &RateOverrides::new()));
    }

    #[test]
    fn test_clamp_is_explained() {
        let input = CampaignInput::new("عقارات", 20_000.0, vec!["Awareness".into()])
            .with_platforms(vec!["Meta".into(), "Snapchat".into()]);
        let mut overrides = RateOverrides::new();
        overrides.insert("Snapchat", Metric::Ctr, 0.8);
        let out = render(&input, Locale::En, &overrides);
        assert!(out["ctr"].contains("Snapchat CTR clamped from 0.45 to 0.80"));
        assert!(!out["cvr"].contains("clamped"));
    }
}
