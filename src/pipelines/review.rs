use std::time::Duration;

use serde::Deserialize;

use crate::app_state::AppState;
use crate::models::job::Job;
use crate::models::review::{ReviewData, ReviewReport};
use crate::pipelines::{ask_for_json, prompts, ProcessingError};
use crate::services::engine::PromptPart;
use crate::services::validation;

/// Payload of a review job: everything is inline, no artifacts exist.
#[derive(Debug, Deserialize)]
pub struct ReviewPayload {
    pub review_data: ReviewData,
}

fn pretty<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

/// Assemble the text-only prompt from the aggregated weekly data.
fn build_prompt(data: &ReviewData) -> String {
    format!(
        "{}\n## Review Period\n{}\n\n## User Goals\n{}\n\n## Daily Usage Summaries\n{}\n\n## Zone-Out Events This Week\n{}\n",
        prompts::REVIEW_PROMPT,
        pretty(&data.review_period),
        pretty(&data.user_goals),
        pretty(&data.daily_summaries),
        pretty(&data.zone_out_events),
    )
}

pub async fn process(state: &AppState, job: &Job) -> Result<serde_json::Value, ProcessingError> {
    let payload: ReviewPayload = serde_json::from_value(job.payload.clone())
        .map_err(|e| ProcessingError::InvalidPayload(e.to_string()))?;
    let data = &payload.review_data;
    let timeout = Duration::from_secs(state.config.review_timeout_secs);

    tracing::info!(
        job_id = %job.id,
        days = data.daily_summaries.len(),
        zone_out_events = data.zone_out_events.len(),
        "Building review prompt"
    );

    let prompt = build_prompt(data);
    let mut report: ReviewReport =
        ask_for_json(&state.engine, vec![PromptPart::Text(prompt)], timeout).await?;

    // The engine's arithmetic, zone-out categorization and trend label are
    // proposals; the corrector rebuilds whatever the raw input contradicts.
    let before = report.zone_out_profile.clone();
    validation::correct_review_report(
        &mut report,
        &data.user_goals,
        &data.daily_summaries,
        &data.zone_out_events,
        data.previous_aligned_pct,
        state.config.pct_tolerance,
        state.config.trend_tolerance,
    );
    if report.zone_out_profile != before {
        tracing::info!(job_id = %job.id, "Zone-out profile corrected");
    }

    serde_json::to_value(&report).map_err(|e| ProcessingError::ModelOutputInvalid(e.to_string()))
}
