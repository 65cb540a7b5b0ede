use crate::config::RateLimitConfig;
use crate::content::store::ContentStore;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Ciphertext store backed by the SQLite connection
    pub store: ContentStore,
    /// Largest accepted `encryptedData` string, in bytes
    pub max_payload_bytes: usize,
    /// Per-IP limiter for allocate/create; `None` disables it
    pub rate_limit: Option<RateLimitConfig>,
}
