use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Fields extracted from a bookmark screenshot by the classification engine.
/// All fields are nullable; the resolver works with whatever survived.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookmarkExtraction {
    pub platform: Option<String>,
    pub title: Option<String>,
    pub channel: Option<String>,
    pub handle: Option<String>,
    pub video_id: Option<String>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub content_type: Option<String>,
}

/// Which fallback strategy produced the bookmark's URL.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResolutionMethod {
    DirectUrl,
    DirectId,
    ApiSearch,
    ConstructedSearch,
    ConstructedProfile,
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Outcome of the tiered URL resolution chain.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub url: Option<String>,
    pub confidence: Confidence,
    pub method: ResolutionMethod,
    /// Secondary search URL for platforms where the primary link is a
    /// profile (Instagram).
    pub search_url: Option<String>,
}

/// Client-visible bookmark result persisted on the job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookmarkResult {
    pub platform: Option<String>,
    pub title: Option<String>,
    pub channel: Option<String>,
    pub handle: Option<String>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub content_type: Option<String>,
    pub confidence: Confidence,
    pub resolution_method: ResolutionMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_url: Option<String>,
}

impl BookmarkResult {
    /// Best-effort result: extracted fields plus the resolution outcome.
    /// Used for every method including `failed` (degraded success).
    pub fn from_parts(extraction: BookmarkExtraction, resolution: Resolution) -> Self {
        Self {
            platform: extraction.platform,
            title: extraction.title,
            channel: extraction.channel,
            handle: extraction.handle,
            url: resolution.url,
            description: extraction.description,
            content_type: extraction.content_type,
            confidence: resolution.confidence,
            resolution_method: resolution.method,
            search_url: resolution.search_url,
        }
    }
}
