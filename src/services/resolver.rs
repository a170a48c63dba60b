use reqwest::{Client, Url};
use serde::Deserialize;
use strsim::jaro_winkler;

use crate::models::bookmark::{BookmarkExtraction, Confidence, Resolution, ResolutionMethod};

/// Search hits below this title similarity downgrade confidence to low.
const LOW_SIMILARITY_THRESHOLD: f64 = 0.5;

/// Resolves extracted bookmark fields to a canonical URL using a tiered
/// fallback chain. Only YouTube has an API lookup; X and Instagram fall
/// back to deterministically constructed search/profile URLs.
pub struct Resolver {
    http: Client,
    youtube_api_key: Option<String>,
}

/// One result from the YouTube Data API search endpoint.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub video_id: String,
    pub title: String,
    pub channel: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    id: SearchItemId,
    snippet: SearchSnippet,
}

#[derive(Deserialize)]
struct SearchItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct SearchSnippet {
    title: String,
    #[serde(rename = "channelTitle")]
    channel_title: String,
}

impl Resolver {
    pub fn new(youtube_api_key: Option<String>) -> Self {
        Self {
            http: Client::new(),
            youtube_api_key,
        }
    }

    /// Resolve a URL for the extraction. Never errors: exhausting every
    /// tier yields `ResolutionMethod::Failed`, which the bookmark pipeline
    /// persists as a degraded success.
    pub async fn resolve(&self, extraction: &BookmarkExtraction) -> Resolution {
        let platform = extraction
            .platform
            .as_deref()
            .unwrap_or_default()
            .to_lowercase();

        // Tier 0: the engine saw a full URL on screen, any platform.
        if let Some(url) = extraction.url.as_deref() {
            if is_well_formed_url(url) {
                return Resolution {
                    url: Some(url.to_string()),
                    confidence: Confidence::High,
                    method: ResolutionMethod::DirectUrl,
                    search_url: None,
                };
            }
        }

        match platform.as_str() {
            "youtube" => self.resolve_youtube(extraction).await,
            "x" | "twitter" => resolve_x(extraction),
            "instagram" => resolve_instagram(extraction),
            _ => failed(),
        }
    }

    async fn resolve_youtube(&self, extraction: &BookmarkExtraction) -> Resolution {
        // Tier 1: a platform id is enough to construct the canonical URL.
        if let Some(video_id) = extraction.video_id.as_deref().filter(|id| !id.is_empty()) {
            return Resolution {
                url: Some(format!("https://www.youtube.com/watch?v={video_id}")),
                confidence: Confidence::High,
                method: ResolutionMethod::DirectId,
                search_url: None,
            };
        }

        // Tier 2: API search by title (+ channel when extracted).
        if let (Some(title), Some(api_key)) =
            (extraction.title.as_deref(), self.youtube_api_key.as_deref())
        {
            let query = match extraction.channel.as_deref() {
                Some(channel) => format!("{title} {channel}"),
                None => title.to_string(),
            };
            let mut confidence = if extraction.channel.is_some() {
                Confidence::High
            } else {
                Confidence::Medium
            };

            match self.youtube_search(&query, api_key).await {
                Ok(hits) => {
                    let best = hits.iter().max_by(|a, b| {
                        title_similarity(&a.title, title)
                            .total_cmp(&title_similarity(&b.title, title))
                    });
                    if let Some(best) = best {
                        if title_similarity(&best.title, title) < LOW_SIMILARITY_THRESHOLD {
                            confidence = Confidence::Low;
                        }
                        return Resolution {
                            url: Some(format!("https://www.youtube.com/watch?v={}", best.video_id)),
                            confidence,
                            method: ResolutionMethod::ApiSearch,
                            search_url: None,
                        };
                    }
                    tracing::debug!(query = %query, "YouTube search returned no hits");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "YouTube search failed, falling through");
                }
            }
        }

        // Tier 3: constructed results-page search from whatever text we have.
        if let Some(title) = extraction.title.as_deref() {
            let query = match extraction.channel.as_deref() {
                Some(channel) => format!("{title} {channel}"),
                None => title.to_string(),
            };
            if let Some(url) = build_url("https://www.youtube.com/results", &[("search_query", &query)]) {
                return Resolution {
                    url: Some(url),
                    confidence: Confidence::Low,
                    method: ResolutionMethod::ConstructedSearch,
                    search_url: None,
                };
            }
        }

        failed()
    }

    /// Query the YouTube Data API v3 search endpoint.
    pub async fn youtube_search(
        &self,
        query: &str,
        api_key: &str,
    ) -> Result<Vec<SearchHit>, ResolverError> {
        let response = self
            .http
            .get("https://www.googleapis.com/youtube/v3/search")
            .query(&[
                ("part", "snippet"),
                ("q", query),
                ("type", "video"),
                ("maxResults", "3"),
                ("key", api_key),
            ])
            .send()
            .await
            .map_err(ResolverError::Http)?
            .error_for_status()
            .map_err(ResolverError::Http)?;

        let parsed: SearchResponse = response.json().await.map_err(ResolverError::Http)?;

        Ok(parsed
            .items
            .into_iter()
            .filter_map(|item| {
                item.id.video_id.map(|video_id| SearchHit {
                    video_id,
                    title: item.snippet.title,
                    channel: item.snippet.channel_title,
                })
            })
            .collect())
    }
}

fn resolve_x(extraction: &BookmarkExtraction) -> Resolution {
    let handle = extraction
        .handle
        .as_deref()
        .map(|h| h.trim_start_matches('@'))
        .filter(|h| !h.is_empty());

    if let (Some(handle), Some(title)) = (handle, extraction.title.as_deref()) {
        // Search for the post: author plus the first few words of its text.
        let words: Vec<&str> = title.split_whitespace().take(8).collect();
        let query = format!("from:{handle} {}", words.join(" "));
        if let Some(url) = build_url("https://x.com/search", &[("q", &query), ("f", "top")]) {
            return Resolution {
                url: Some(url),
                confidence: Confidence::Medium,
                method: ResolutionMethod::ConstructedSearch,
                search_url: None,
            };
        }
    }

    if let Some(handle) = handle {
        return Resolution {
            url: Some(format!("https://x.com/{handle}")),
            confidence: Confidence::Low,
            method: ResolutionMethod::ConstructedProfile,
            search_url: None,
        };
    }

    failed()
}

fn resolve_instagram(extraction: &BookmarkExtraction) -> Resolution {
    // Instagram uses usernames, not @handles; the engine often puts the
    // username in `channel`.
    let username = extraction
        .handle
        .as_deref()
        .map(|h| h.trim_start_matches('@'))
        .filter(|h| !h.is_empty())
        .or(extraction.channel.as_deref());

    let Some(username) = username else {
        return failed();
    };
    // Accessibility text drags in possessives and trailing labels.
    let username = username
        .trim()
        .split('\'')
        .next()
        .unwrap_or_default()
        .split_whitespace()
        .next()
        .unwrap_or_default();
    if username.is_empty() {
        return failed();
    }

    let profile_url = format!("https://www.instagram.com/{username}/");
    let caption = extraction
        .title
        .as_deref()
        .or(extraction.description.as_deref())
        .unwrap_or_default();

    if !caption.is_empty() {
        let words: Vec<&str> = caption.split_whitespace().take(6).collect();
        let query = format!("{username} {}", words.join(" "));
        let search_url = build_url(
            "https://www.instagram.com/explore/search/keyword/",
            &[("q", &query)],
        );
        return Resolution {
            url: Some(profile_url),
            confidence: Confidence::Medium,
            method: ResolutionMethod::ConstructedProfile,
            search_url,
        };
    }

    Resolution {
        url: Some(profile_url),
        confidence: Confidence::Low,
        method: ResolutionMethod::ConstructedProfile,
        search_url: None,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

fn failed() -> Resolution {
    Resolution {
        url: None,
        confidence: Confidence::Low,
        method: ResolutionMethod::Failed,
        search_url: None,
    }
}

fn build_url(base: &str, params: &[(&str, &str)]) -> Option<String> {
    Url::parse_with_params(base, params)
        .ok()
        .map(|u| u.to_string())
}

/// A URL the engine read off the screen is trusted only when it looks like
/// a real absolute URL; everything else falls through to the next tier.
fn is_well_formed_url(url: &str) -> bool {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return false;
    }
    Url::parse(url)
        .map(|u| u.host_str().is_some_and(|h| h.contains('.')))
        .unwrap_or(false)
}

fn title_similarity(a: &str, b: &str) -> f64 {
    jaro_winkler(&a.to_lowercase(), &b.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver_without_api_key() -> Resolver {
        Resolver::new(None)
    }

    #[tokio::test]
    async fn well_formed_url_wins_outright() {
        let extraction = BookmarkExtraction {
            platform: Some("youtube".into()),
            url: Some("https://youtu.be/dQw4w9WgXcQ".into()),
            video_id: Some("dQw4w9WgXcQ".into()),
            ..Default::default()
        };
        let resolution = resolver_without_api_key().resolve(&extraction).await;
        assert_eq!(resolution.method, ResolutionMethod::DirectUrl);
        assert_eq!(resolution.confidence, Confidence::High);
    }

    #[tokio::test]
    async fn malformed_url_with_valid_id_resolves_direct_id() {
        let extraction = BookmarkExtraction {
            platform: Some("youtube".into()),
            url: Some("youtube watch page".into()),
            video_id: Some("dQw4w9WgXcQ".into()),
            title: Some("Some video".into()),
            ..Default::default()
        };
        let resolution = resolver_without_api_key().resolve(&extraction).await;
        assert_eq!(resolution.method, ResolutionMethod::DirectId);
        assert_eq!(
            resolution.url.as_deref(),
            Some("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
        );
    }

    #[tokio::test]
    async fn youtube_without_id_or_key_constructs_search() {
        let extraction = BookmarkExtraction {
            platform: Some("youtube".into()),
            title: Some("Rust borrow checker explained".into()),
            channel: Some("Jon Gjengset".into()),
            ..Default::default()
        };
        let resolution = resolver_without_api_key().resolve(&extraction).await;
        assert_eq!(resolution.method, ResolutionMethod::ConstructedSearch);
        let url = resolution.url.unwrap();
        assert!(url.starts_with("https://www.youtube.com/results?search_query="));
        assert!(url.contains("Rust"));
    }

    #[tokio::test]
    async fn x_post_builds_from_search() {
        let extraction = BookmarkExtraction {
            platform: Some("x".into()),
            handle: Some("@rustlang".into()),
            title: Some("Announcing Rust 1.80 with new stabilized APIs and more".into()),
            ..Default::default()
        };
        let resolution = resolver_without_api_key().resolve(&extraction).await;
        assert_eq!(resolution.method, ResolutionMethod::ConstructedSearch);
        let url = resolution.url.unwrap();
        assert!(url.starts_with("https://x.com/search?q="));
        assert!(url.contains("from%3Arustlang"));
        // Only the first 8 words of the post text go into the query.
        assert!(!url.contains("more"));
    }

    #[tokio::test]
    async fn x_handle_only_falls_back_to_profile() {
        let extraction = BookmarkExtraction {
            platform: Some("x".into()),
            handle: Some("@rustlang".into()),
            ..Default::default()
        };
        let resolution = resolver_without_api_key().resolve(&extraction).await;
        assert_eq!(resolution.method, ResolutionMethod::ConstructedProfile);
        assert_eq!(resolution.url.as_deref(), Some("https://x.com/rustlang"));
    }

    #[tokio::test]
    async fn instagram_username_is_cleaned() {
        let extraction = BookmarkExtraction {
            platform: Some("instagram".into()),
            channel: Some("natgeo's reel".into()),
            title: Some("Lions at dawn in the Serengeti".into()),
            ..Default::default()
        };
        let resolution = resolver_without_api_key().resolve(&extraction).await;
        assert_eq!(resolution.method, ResolutionMethod::ConstructedProfile);
        assert_eq!(
            resolution.url.as_deref(),
            Some("https://www.instagram.com/natgeo/")
        );
        assert!(resolution.search_url.is_some());
    }

    #[tokio::test]
    async fn nothing_usable_fails() {
        let extraction = BookmarkExtraction {
            platform: Some("other".into()),
            ..Default::default()
        };
        let resolution = resolver_without_api_key().resolve(&extraction).await;
        assert_eq!(resolution.method, ResolutionMethod::Failed);
        assert!(resolution.url.is_none());
    }

    #[test]
    fn url_well_formedness() {
        assert!(is_well_formed_url("https://example.com/a"));
        assert!(is_well_formed_url("http://youtu.be/abc"));
        assert!(!is_well_formed_url("example.com/a"));
        assert!(!is_well_formed_url("https://no-dot-host"));
        assert!(!is_well_formed_url("watch it on youtube"));
    }
}
