use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Status of an analysis job. Transitions are forward-only and enforced
/// with conditional updates in `db::queries`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Enqueued,
    Processing,
    Complete,
    Failed,
}

impl JobStatus {
    /// Complete and failed are terminal; a redelivered task that observes
    /// either must ack without side effects.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }
}

/// The three fixed processing shapes sharing the dispatch/worker skeleton.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Pipeline {
    Activity,
    Bookmark,
    Review,
}

/// One unit of requested analysis work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub pipeline: Pipeline,
    pub status: JobStatus,
    /// User goals plus artifact prefix (activity/bookmark) or inline review
    /// data (review).
    pub payload: serde_json::Value,
    /// Object-store prefix owning this job's artifacts. None for review jobs.
    pub artifact_prefix: Option<String>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub attempt_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_round_trips_through_strings() {
        for s in ["pending", "enqueued", "processing", "complete", "failed"] {
            let status = JobStatus::from_str(s).unwrap();
            assert_eq!(status.to_string(), s);
        }
    }

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::Complete.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Enqueued.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }
}
