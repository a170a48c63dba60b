//! The three pipeline handlers sharing the worker skeleton. Each handler
//! consumes one job and either returns the result to persist or a
//! `ProcessingError`; the skeleton in `bin/worker.rs` owns status
//! transitions, artifact cleanup and acking.

pub mod activity;
pub mod bookmark;
pub mod prompts;
pub mod review;

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::app_state::AppState;
use crate::models::job::{Job, Pipeline};
use crate::services::engine::{self, EngineError, GeminiClient, PromptPart};
use crate::services::storage::StorageError;

/// Run the pipeline handler for a job and return the result payload.
pub async fn process(state: &AppState, job: &Job) -> Result<serde_json::Value, ProcessingError> {
    match job.pipeline {
        Pipeline::Activity => activity::process(state, job).await,
        Pipeline::Bookmark => bookmark::process(state, job).await,
        Pipeline::Review => review::process(state, job).await,
    }
}

/// Send a prompt and parse the reply as JSON, with one corrective re-ask
/// when the reply does not parse. Transport failures bubble as engine
/// errors (transient); a second unparseable reply is permanent.
pub(crate) async fn ask_for_json<T: DeserializeOwned>(
    client: &GeminiClient,
    parts: Vec<PromptPart>,
    timeout: Duration,
) -> Result<T, ProcessingError> {
    let text = client.generate(&parts, timeout).await?;
    let parse_error = match engine::parse_json_response::<T>(&text) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    tracing::warn!(error = %parse_error, "Model reply was not valid JSON, re-asking");
    let correction = format!(
        "Your previous response could not be parsed as the required JSON \
         ({parse_error}). Return ONLY the corrected JSON, with no markdown \
         fences and no text outside the JSON.\n\nPrevious response:\n{text}"
    );
    let retry_text = client
        .generate(&[PromptPart::Text(correction)], timeout)
        .await?;
    engine::parse_json_response::<T>(&retry_text)
        .map_err(|e| ProcessingError::ModelOutputInvalid(format!("unparseable after re-ask: {e}")))
}

/// Failure taxonomy of one processing attempt. Transient errors are nacked
/// and retried by queue redelivery; everything else terminates the job.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("Artifact store error: {0}")]
    Storage(#[from] StorageError),

    #[error("Job store error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Classification engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Model output invalid: {0}")]
    ModelOutputInvalid(String),

    #[error("No usable input: {0}")]
    ResourceMissing(String),

    #[error("Malformed job payload: {0}")]
    InvalidPayload(String),
}

impl ProcessingError {
    pub fn is_transient(&self) -> bool {
        match self {
            ProcessingError::Storage(_) | ProcessingError::Db(_) => true,
            ProcessingError::Engine(e) => GeminiClient::is_transient(e),
            ProcessingError::ModelOutputInvalid(_)
            | ProcessingError::ResourceMissing(_)
            | ProcessingError::InvalidPayload(_) => false,
        }
    }
}
