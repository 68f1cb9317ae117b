use serde::Serialize;
use utoipa::ToSchema;

/// Simple health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status, always "ok" for a running process.
    pub status: String,
    /// Number of matches currently being driven.
    pub live_matches: usize,
}

impl HealthResponse {
    /// Create a health response indicating the system is operational.
    pub fn ok(live_matches: usize) -> Self {
        Self {
            status: "ok".to_string(),
            live_matches,
        }
    }
}
