use std::time::Duration;

use crate::app_state::AppState;
use crate::models::bookmark::{BookmarkExtraction, BookmarkResult, ResolutionMethod};
use crate::models::job::Job;
use crate::pipelines::{ask_for_json, prompts, ProcessingError};
use crate::services::engine::PromptPart;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// The one screenshot and optional accessibility snapshot of a bookmark job.
fn find_artifacts(keys: &[String]) -> (Option<&String>, Option<&String>) {
    let mut image = None;
    let mut meta = None;
    for key in keys {
        let name = key.rsplit('/').next().unwrap_or(key);
        if name.ends_with("_meta.txt") {
            meta = Some(key);
        } else if name
            .rsplit('.')
            .next()
            .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext))
        {
            image = Some(key);
        }
    }
    (image, meta)
}

fn mime_for(key: &str) -> &'static str {
    match key.rsplit('.').next().unwrap_or_default() {
        "png" => "image/png",
        "webp" => "image/webp",
        _ => "image/jpeg",
    }
}

pub async fn process(state: &AppState, job: &Job) -> Result<serde_json::Value, ProcessingError> {
    let prefix = job
        .artifact_prefix
        .as_deref()
        .ok_or_else(|| ProcessingError::InvalidPayload("missing artifact_prefix".to_string()))?;
    let timeout = Duration::from_secs(state.config.bookmark_timeout_secs);

    let keys = state.storage.list(prefix).await?;
    let (image_key, meta_key) = find_artifacts(&keys);
    let image_key = image_key.ok_or_else(|| {
        ProcessingError::ResourceMissing(format!("no screenshot under {prefix}"))
    })?;

    let image = state.storage.download(image_key).await?;
    let mut parts = vec![
        PromptPart::Text(prompts::BOOKMARK_PROMPT.to_string()),
        PromptPart::Image {
            mime_type: mime_for(image_key).to_string(),
            data: image,
        },
    ];
    if let Some(meta_key) = meta_key {
        let meta = state.storage.download(meta_key).await?;
        parts.push(PromptPart::Text(format!(
            "\nUI elements on this screen:\n{}",
            String::from_utf8_lossy(&meta)
        )));
    }

    let extraction: BookmarkExtraction = ask_for_json(&state.engine, parts, timeout).await?;
    tracing::info!(
        job_id = %job.id,
        platform = extraction.platform.as_deref().unwrap_or("unknown"),
        has_url = extraction.url.is_some(),
        has_id = extraction.video_id.is_some(),
        "Extraction complete"
    );

    // Exhausting every tier is a degraded success, never a job failure:
    // the extracted fields are still worth more to the client than an error.
    let resolution = state.resolver.resolve(&extraction).await;
    if resolution.method == ResolutionMethod::Failed {
        tracing::warn!(job_id = %job.id, "All resolution tiers failed, persisting degraded result");
    } else {
        tracing::info!(
            job_id = %job.id,
            method = %resolution.method,
            confidence = %resolution.confidence,
            "URL resolved"
        );
    }

    let result = BookmarkResult::from_parts(extraction, resolution);
    serde_json::to_value(&result).map_err(|e| ProcessingError::ModelOutputInvalid(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_screenshot_and_snapshot() {
        let keys = vec![
            "jobs/abc/shot.png".to_string(),
            "jobs/abc/shot_meta.txt".to_string(),
        ];
        let (image, meta) = find_artifacts(&keys);
        assert_eq!(image.map(String::as_str), Some("jobs/abc/shot.png"));
        assert_eq!(meta.map(String::as_str), Some("jobs/abc/shot_meta.txt"));
    }

    #[test]
    fn snapshot_is_optional() {
        let keys = vec!["jobs/abc/shot.webp".to_string()];
        let (image, meta) = find_artifacts(&keys);
        assert!(image.is_some());
        assert!(meta.is_none());
    }

    #[test]
    fn missing_screenshot_is_detected() {
        let keys = vec!["jobs/abc/shot_meta.txt".to_string()];
        let (image, _) = find_artifacts(&keys);
        assert!(image.is_none());
    }
}
