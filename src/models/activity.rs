use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Aligned vs drifting classification for a single capture.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Category {
    Aligned,
    Drifting,
}

/// One classified screen capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    /// Capture number as uploaded by the client (e.g. "001").
    pub capture: String,
    pub app: String,
    pub app_name: String,
    pub category: Category,
    pub description: String,
    /// Set when the capture matched one of the user's flagged zone-out
    /// patterns; omitted otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_out_match: Option<String>,
}

/// A point in the session where the category flipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    pub at_capture: String,
    pub from: Category,
    pub to: Category,
    pub trigger: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Streaks {
    pub longest_aligned: u32,
    pub longest_drifting: u32,
    /// Category of the final capture in the session.
    pub ended_on: Category,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    pub total_captures: u32,
    pub aligned_captures: u32,
    pub drifting_captures: u32,
    pub aligned_pct: f64,
    pub drifting_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatedScore {
    pub aligned_pct: f64,
    pub drifting_pct: f64,
}

/// Full activity analysis report as returned by the classification engine
/// and persisted as the job result. The engine's copy is an untrusted
/// proposal until `validation::check_activity_report` passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityReport {
    pub activities: Vec<ActivityEntry>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
    pub streaks: Streaks,
    pub session_summary: SessionSummary,
    pub updated_score: UpdatedScore,
    pub feedback: String,
    /// Captures dropped during pairing (screenshot without accessibility
    /// snapshot or vice versa). Recorded, never a hard failure on its own.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub excluded_captures: u32,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}
