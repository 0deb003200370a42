use serde::{Deserialize, Serialize};

/// Non-fatal condition surfaced in a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastWarning {
    pub kind: WarningKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    SplitFallback,
    DiscouragedPlatform,
    OutsideAllowList,
    PlatformAdded,
    PlatformDropped,
    BenchmarkMissing,
    BelowOptimalBudget,
    Sanity,
    SanityClamped,
}

impl ForecastWarning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            platform: None,
            message: message.into(),
        }
    }

    pub fn for_platform(kind: WarningKind, platform: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            platform: Some(platform.to_string()),
            message: message.into(),
        }
    }
}
