use std::time::Duration;

use base64::Engine as _;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

/// One part of a multimodal prompt, in presentation order.
pub enum PromptPart {
    Text(String),
    Image { mime_type: String, data: Vec<u8> },
}

/// Client for the Gemini generateContent REST API.
pub struct GeminiClient {
    http: Client,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    /// Send a prompt and return the raw response text. Images are sent
    /// inline as base64 parts.
    pub async fn generate(
        &self,
        parts: &[PromptPart],
        timeout: Duration,
    ) -> Result<String, EngineError> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model
        );

        let body_parts: Vec<serde_json::Value> = parts
            .iter()
            .map(|part| match part {
                PromptPart::Text(text) => json!({ "text": text }),
                PromptPart::Image { mime_type, data } => json!({
                    "inline_data": {
                        "mime_type": mime_type,
                        "data": base64::engine::general_purpose::STANDARD.encode(data),
                    }
                }),
            })
            .collect();

        let request_body = json!({
            "contents": [{ "parts": body_parts }]
        });

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body)
            .timeout(timeout)
            .send()
            .await
            .map_err(EngineError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Api { status, body });
        }

        let parsed: GenerateResponse = response.json().await.map_err(EngineError::Http)?;
        let text: String = parsed
            .candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(EngineError::EmptyResponse);
        }

        Ok(text)
    }

    /// Rate limits and upstream outages retry via queue redelivery; bad
    /// requests, auth failures and malformed-request errors do not.
    pub fn is_transient(error: &EngineError) -> bool {
        match error {
            EngineError::Http(e) => e.is_timeout() || e.is_connect(),
            EngineError::Api { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            EngineError::EmptyResponse | EngineError::Parse(_) => false,
        }
    }
}

/// Strip markdown code fences the model sometimes wraps around JSON.
pub fn strip_code_fences(text: &str) -> &str {
    let mut cleaned = text.trim();
    if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }
    cleaned.trim()
}

/// Parse a model response as JSON after fence stripping.
pub fn parse_json_response<T: DeserializeOwned>(text: &str) -> Result<T, EngineError> {
    serde_json::from_str(strip_code_fences(text)).map_err(EngineError::Parse)
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gemini API error ({status}): {body}")]
    Api { status: StatusCode, body: String },

    #[error("Gemini returned no candidates")]
    EmptyResponse,

    #[error("Failed to parse model response as JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_fences() {
        let fenced = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(fenced), "{\"a\": 1}");
    }

    #[test]
    fn strips_bare_fences() {
        let fenced = "```\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(fenced), "{\"a\": 1}");
    }

    #[test]
    fn leaves_plain_json_alone() {
        assert_eq!(strip_code_fences("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    fn api_error(status: StatusCode) -> EngineError {
        EngineError::Api {
            status,
            body: String::new(),
        }
    }

    #[test]
    fn rate_limits_and_outages_are_transient() {
        assert!(GeminiClient::is_transient(&api_error(
            StatusCode::TOO_MANY_REQUESTS
        )));
        assert!(GeminiClient::is_transient(&api_error(StatusCode::BAD_GATEWAY)));
        assert!(GeminiClient::is_transient(&api_error(
            StatusCode::INTERNAL_SERVER_ERROR
        )));
    }

    #[test]
    fn client_errors_and_bad_output_are_permanent() {
        assert!(!GeminiClient::is_transient(&api_error(StatusCode::BAD_REQUEST)));
        assert!(!GeminiClient::is_transient(&api_error(
            StatusCode::UNAUTHORIZED
        )));
        assert!(!GeminiClient::is_transient(&EngineError::EmptyResponse));
        let parse = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        assert!(!GeminiClient::is_transient(&EngineError::Parse(parse)));
    }

    #[test]
    fn parses_fenced_response() {
        #[derive(serde::Deserialize)]
        struct Out {
            a: i32,
        }
        let out: Out = parse_json_response("```json\n{\"a\": 7}\n```").unwrap();
        assert_eq!(out.a, 7);
    }
}
