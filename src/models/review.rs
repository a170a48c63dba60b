use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// User profile as carried in job payloads. Zone-out lists are the
/// previous week's snapshot; everything else is free-form context that is
/// forwarded to the classification engine verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserGoals {
    #[serde(default)]
    pub content_zone_outs: Vec<String>,
    #[serde(default)]
    pub behavior_zone_outs: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One day of aggregated usage, computed client-side.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DailySummary {
    #[garde(length(min = 1, max = 32))]
    pub date: String,
    #[garde(range(min = 0.0))]
    pub total_minutes: f64,
    #[garde(range(min = 0.0))]
    pub aligned_minutes: f64,
    #[garde(range(min = 0.0))]
    pub drifting_minutes: f64,
}

/// A zone-out event detected during the week.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ZoneOutEvent {
    #[garde(length(min = 1, max = 100))]
    pub pattern: String,
    /// "content" or "behavior".
    #[garde(length(min = 1, max = 20))]
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ReviewPeriod {
    #[garde(skip)]
    pub start: Option<String>,
    #[garde(skip)]
    pub end: Option<String>,
    #[garde(skip)]
    pub days_active: Option<u32>,
}

/// Inline payload of a review job. No artifacts are involved.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReviewData {
    #[garde(skip)]
    pub user_goals: UserGoals,
    #[garde(length(min = 1, max = 31), dive)]
    pub daily_summaries: Vec<DailySummary>,
    #[garde(dive)]
    #[serde(default)]
    pub zone_out_events: Vec<ZoneOutEvent>,
    #[garde(dive)]
    #[serde(default)]
    pub review_period: ReviewPeriod,
    /// Previous week's aligned percentage; anchors the trend direction.
    #[garde(range(min = 0.0, max = 100.0))]
    #[serde(default)]
    pub previous_aligned_pct: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklySummary {
    pub total_active_minutes: f64,
    pub days_active: u32,
    pub aligned_pct: f64,
    pub drifting_pct: f64,
    /// An unrecognized trend label from the engine degrades to stable
    /// instead of rejecting the whole report; the validator then recomputes
    /// the trend from the aligned-pct delta anyway.
    #[serde(deserialize_with = "lenient_trend")]
    pub trend: Trend,
    #[serde(default)]
    pub trend_detail: String,
}

fn lenient_trend<'de, D>(deserializer: D) -> Result<Trend, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use std::str::FromStr;
    let label = String::deserialize(deserializer)?;
    Ok(Trend::from_str(&label).unwrap_or(Trend::Stable))
}

/// Week-over-week zone-out snapshot diff. `resolved`, `emerging` and
/// `persistent` must satisfy the set relations against the previous lists
/// and this week's observed events; `validation::correct_zone_out_profile`
/// rebuilds any membership the engine got wrong.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ZoneOutProfile {
    #[serde(default)]
    pub content_zone_outs: Vec<String>,
    #[serde(default)]
    pub behavior_zone_outs: Vec<String>,
    #[serde(default)]
    pub emerging: Vec<String>,
    #[serde(default)]
    pub persistent: Vec<String>,
    #[serde(default)]
    pub resolved: Vec<String>,
}

/// Full weekly review report persisted as the job result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewReport {
    pub weekly_summary: WeeklySummary,
    pub zone_out_profile: ZoneOutProfile,
    #[serde(default)]
    pub observations: Vec<String>,
    pub feedback: String,
}
