use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::app_state::AppState;
use crate::models::activity::ActivityReport;
use crate::models::job::Job;
use crate::pipelines::{ask_for_json, prompts, ProcessingError};
use crate::services::engine::PromptPart;
use crate::services::validation;

/// Payload of an activity job: free-form user profile forwarded to the
/// engine (goals, target split, current score, zone-out flags).
#[derive(Debug, Default, Deserialize)]
pub struct ActivityPayload {
    #[serde(default)]
    pub user_goals: Option<serde_json::Value>,
}

/// A screenshot paired with its accessibility snapshot by capture number.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturePair {
    pub capture: String,
    pub image_key: String,
    pub meta_key: String,
}

/// Outcome of sorting a job's artifact listing into capture pairs.
#[derive(Debug, Default)]
pub struct PairedArtifacts {
    pub pairs: Vec<CapturePair>,
    /// Captures that had only a screenshot or only a snapshot.
    pub excluded: u32,
    pub session_log_key: Option<String>,
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

fn basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

fn mime_for(key: &str) -> &'static str {
    match key.rsplit('.').next().unwrap_or_default() {
        "png" => "image/png",
        "webp" => "image/webp",
        _ => "image/jpeg",
    }
}

/// Pair screenshots (`NNN.png`) with accessibility snapshots
/// (`NNN_meta.txt`) by shared capture number. Unpaired captures are
/// excluded and counted; the caller decides whether zero pairs is fatal.
pub fn pair_captures(keys: &[String]) -> PairedArtifacts {
    let mut images: BTreeMap<&str, &String> = BTreeMap::new();
    let mut metas: BTreeMap<&str, &String> = BTreeMap::new();
    let mut session_log_key = None;

    for key in keys {
        let name = basename(key);
        if name == "session.log" {
            session_log_key = Some(key.clone());
        } else if let Some(capture) = name.strip_suffix("_meta.txt") {
            metas.insert(capture, key);
        } else if let Some((capture, ext)) = name.rsplit_once('.') {
            if IMAGE_EXTENSIONS.contains(&ext) {
                images.insert(capture, key);
            }
        }
    }

    let pairs: Vec<CapturePair> = images
        .iter()
        .filter_map(|(capture, image_key)| {
            metas.get(capture).map(|meta_key| CapturePair {
                capture: capture.to_string(),
                image_key: (*image_key).clone(),
                meta_key: (*meta_key).clone(),
            })
        })
        .collect();

    let total_captures = images
        .keys()
        .chain(metas.keys())
        .collect::<std::collections::BTreeSet<_>>()
        .len();
    let excluded = (total_captures - pairs.len()) as u32;

    PairedArtifacts {
        pairs,
        excluded,
        session_log_key,
    }
}

fn user_context(payload: &ActivityPayload) -> String {
    match &payload.user_goals {
        Some(goals) => {
            let mut context = format!(
                "\n## User profile data\n{}",
                serde_json::to_string_pretty(goals).unwrap_or_default()
            );
            if let Some(flags) = goals.get("content_zone_outs").and_then(|v| v.as_array()) {
                let names: Vec<&str> = flags.iter().filter_map(|f| f.as_str()).collect();
                if !names.is_empty() {
                    context.push_str(&format!(
                        "\n\n## Content zone-outs\nThe user has flagged these content \
                         patterns as zone-outs they want to catch: {}. If a capture's \
                         content matches one, include \"zone_out_match\" with the flag \
                         name in that capture's activity entry.",
                        names.join(", ")
                    ));
                }
            }
            context
        }
        None => "\n## User profile data\nNo user profile provided. Classify activities \
                 using general goal-aligned vs drifting criteria."
            .to_string(),
    }
}

pub async fn process(state: &AppState, job: &Job) -> Result<serde_json::Value, ProcessingError> {
    let payload: ActivityPayload = serde_json::from_value(job.payload.clone())
        .map_err(|e| ProcessingError::InvalidPayload(e.to_string()))?;
    let prefix = job
        .artifact_prefix
        .as_deref()
        .ok_or_else(|| ProcessingError::InvalidPayload("missing artifact_prefix".to_string()))?;
    let timeout = Duration::from_secs(state.config.activity_timeout_secs);

    let keys = state.storage.list(prefix).await?;
    let paired = pair_captures(&keys);
    tracing::info!(
        job_id = %job.id,
        pairs = paired.pairs.len(),
        excluded = paired.excluded,
        session_log = paired.session_log_key.is_some(),
        "Artifact listing paired"
    );

    if paired.pairs.is_empty() {
        return Err(ProcessingError::ResourceMissing(format!(
            "no usable screenshot/snapshot pairs under {prefix}"
        )));
    }

    let session_log = match &paired.session_log_key {
        Some(key) => {
            let bytes = state.storage.download(key).await?;
            Some(String::from_utf8_lossy(&bytes).into_owned())
        }
        None => None,
    };

    let context = user_context(&payload);
    let batches: Vec<&[CapturePair]> = paired.pairs.chunks(state.config.batch_size).collect();
    let total_batches = batches.len();
    let mut batch_reports = Vec::with_capacity(total_batches);

    for (batch_idx, batch) in batches.iter().enumerate() {
        let mut parts = vec![
            PromptPart::Text(prompts::ACTIVITY_PROMPT.to_string()),
            PromptPart::Text(context.clone()),
        ];

        for (i, pair) in batch.iter().enumerate() {
            let image = state.storage.download(&pair.image_key).await?;
            let meta = state.storage.download(&pair.meta_key).await?;
            let global_idx = batch_idx * state.config.batch_size + i + 1;
            parts.push(PromptPart::Text(format!(
                "\n--- Screen capture {global_idx} ({}) ---",
                pair.capture
            )));
            parts.push(PromptPart::Image {
                mime_type: mime_for(&pair.image_key).to_string(),
                data: image,
            });
            parts.push(PromptPart::Text(format!(
                "UI elements on this screen:\n{}",
                String::from_utf8_lossy(&meta)
            )));
        }

        if batch_idx == 0 {
            if let Some(log) = &session_log {
                parts.push(PromptPart::Text(format!(
                    "\n--- Session activity log ---\n{log}"
                )));
            }
        }

        tracing::debug!(
            job_id = %job.id,
            batch = batch_idx + 1,
            total_batches,
            captures = batch.len(),
            "Calling classification engine"
        );
        let text = state.engine.generate(&parts, timeout).await?;
        batch_reports.push(text);
    }

    let report_text = if total_batches == 1 {
        batch_reports.pop().unwrap_or_default()
    } else {
        let mut merge_input = prompts::MERGE_PROMPT.to_string();
        for (i, report) in batch_reports.iter().enumerate() {
            merge_input.push_str(&format!("\n=== BATCH {} ===\n{report}\n", i + 1));
        }
        state
            .engine
            .generate(&[PromptPart::Text(merge_input)], timeout)
            .await?
    };

    let mut report: ActivityReport = match crate::services::engine::parse_json_response(&report_text)
    {
        Ok(report) => report,
        Err(e) => {
            tracing::warn!(job_id = %job.id, error = %e, "Report was not valid JSON, re-asking");
            let correction = format!(
                "Your previous response could not be parsed as the required JSON ({e}). \
                 Return ONLY the corrected JSON.\n\nPrevious response:\n{report_text}"
            );
            ask_for_json(&state.engine, vec![PromptPart::Text(correction)], timeout).await?
        }
    };

    let violations = validation::check_activity_report(&report, state.config.pct_tolerance);
    if !violations.is_empty() {
        tracing::warn!(
            job_id = %job.id,
            violations = violations.len(),
            "Report violates invariants, re-asking once"
        );
        report = reask_or_recompute(state, &report, &violations, timeout).await?;
    }

    report.excluded_captures = paired.excluded;
    serde_json::to_value(&report).map_err(|e| ProcessingError::ModelOutputInvalid(e.to_string()))
}

/// One corrective re-ask describing the violations; if the second attempt
/// is still inconsistent, fall back to the deterministic recomputation. An
/// internally inconsistent summary is never persisted.
async fn reask_or_recompute(
    state: &AppState,
    report: &ActivityReport,
    violations: &[String],
    timeout: Duration,
) -> Result<ActivityReport, ProcessingError> {
    let correction = format!(
        "Your previous activity report violates these consistency rules:\n- {}\n\n\
         Here is the report:\n{}\n\n\
         Fix the report so every rule holds. Do not change the per-capture \
         classifications in \"activities\"; recompute the derived fields from \
         them. Return ONLY valid JSON.",
        violations.join("\n- "),
        serde_json::to_string(report).unwrap_or_default()
    );

    match ask_for_json::<ActivityReport>(
        &state.engine,
        vec![PromptPart::Text(correction)],
        timeout,
    )
    .await
    {
        Ok(retry) if validation::check_activity_report(&retry, state.config.pct_tolerance).is_empty() => {
            Ok(retry)
        }
        Ok(_) => {
            tracing::warn!("Re-asked report still inconsistent, recomputing locally");
            Ok(validation::recompute_activity_report(report))
        }
        Err(e) if e.is_transient() => Err(e),
        Err(e) => {
            tracing::warn!(error = %e, "Re-ask failed, recomputing locally");
            Ok(validation::recompute_activity_report(report))
        }
    }
}
