use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for the task queue
    pub redis_url: String,

    /// Gemini API key
    pub gemini_api_key: String,

    /// Gemini model identifier
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,

    /// YouTube Data API v3 key. Optional; without it the resolver skips
    /// the api_search tier.
    #[serde(default)]
    pub youtube_api_key: Option<String>,

    /// Artifact bucket name (S3-compatible)
    pub artifact_bucket: String,

    /// Artifact store access key ID
    pub artifact_access_key: String,

    /// Artifact store secret access key
    pub artifact_secret_key: String,

    /// Artifact store endpoint URL
    pub artifact_endpoint: String,

    /// Max screenshots per classification call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Dispatcher enqueue retries before the job is marked failed
    #[serde(default = "default_dispatch_max_retries")]
    pub dispatch_max_retries: u32,

    /// Processing attempts before a transient failure is dead-lettered
    #[serde(default = "default_worker_max_attempts")]
    pub worker_max_attempts: i32,

    /// Worker poll interval when the queue is empty, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Model-call timeout for the activity pipeline, in seconds
    #[serde(default = "default_activity_timeout")]
    pub activity_timeout_secs: u64,

    /// Model-call timeout for the bookmark pipeline, in seconds
    #[serde(default = "default_short_timeout")]
    pub bookmark_timeout_secs: u64,

    /// Model-call timeout for the review pipeline, in seconds
    #[serde(default = "default_short_timeout")]
    pub review_timeout_secs: u64,

    /// Allowed drift between model percentages and recomputed ones
    #[serde(default = "default_pct_tolerance")]
    pub pct_tolerance: f64,

    /// Aligned-pct delta below which the trend counts as stable
    #[serde(default = "default_trend_tolerance")]
    pub trend_tolerance: f64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_batch_size() -> usize {
    15
}

fn default_dispatch_max_retries() -> u32 {
    3
}

fn default_worker_max_attempts() -> i32 {
    3
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_activity_timeout() -> u64 {
    540
}

fn default_short_timeout() -> u64 {
    120
}

fn default_pct_tolerance() -> f64 {
    1.0
}

fn default_trend_tolerance() -> f64 {
    1.0
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}
