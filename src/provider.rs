//! Error kinds shared by every provider family.
//!
//! Transcribers, LLM clients, speakers and wake detectors all report
//! failures as a [`ProviderError`].  The variants are deliberately coarse:
//! the orchestrator only needs to know *what kind* of failure happened to
//! pick the right fallback (abort the cycle, apologise, or try the next
//! speaker in the chain).

use thiserror::Error;

// ---------------------------------------------------------------------------
// ProviderError
// ---------------------------------------------------------------------------

/// Failure reported by a provider backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Transport failure: connection refused, DNS, timeout, 5xx.
    #[error("network error: {0}")]
    Network(String),

    /// The credential was missing, rejected or expired (401/403).
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Rate limit or quota exhausted (429).
    #[error("quota exceeded: {0}")]
    Quota(String),

    /// The provider rejected the input (bad model name, empty audio, 4xx).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The backend is not installed or cannot be started locally
    /// (missing model file, missing binary).
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    /// Classify a non-success HTTP status into a provider error kind.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let detail = if body.is_empty() {
            status.to_string()
        } else {
            format!("{status}: {}", truncate(body, 200))
        };

        match status.as_u16() {
            401 | 403 => ProviderError::Auth(detail),
            429 => ProviderError::Quota(detail),
            400..=499 => ProviderError::InvalidInput(detail),
            _ => ProviderError::Network(detail),
        }
    }

    /// Short, stable label used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Network(_) => "network",
            ProviderError::Auth(_) => "auth",
            ProviderError::Quota(_) => "quota",
            ProviderError::InvalidInput(_) => "invalid-input",
            ProviderError::Unavailable(_) => "unavailable",
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => ProviderError::from_status(status, ""),
            None if e.is_decode() => ProviderError::InvalidInput(e.to_string()),
            None => ProviderError::Network(e.to_string()),
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn unauthorized_and_forbidden_map_to_auth() {
        assert!(matches!(
            ProviderError::from_status(StatusCode::UNAUTHORIZED, ""),
            ProviderError::Auth(_)
        ));
        assert!(matches!(
            ProviderError::from_status(StatusCode::FORBIDDEN, "nope"),
            ProviderError::Auth(_)
        ));
    }

    #[test]
    fn too_many_requests_maps_to_quota() {
        let err = ProviderError::from_status(StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert_eq!(err.kind(), "quota");
        assert!(err.to_string().contains("slow down"));
    }

    #[test]
    fn other_client_errors_map_to_invalid_input() {
        assert!(matches!(
            ProviderError::from_status(StatusCode::NOT_FOUND, "model not found"),
            ProviderError::InvalidInput(_)
        ));
    }

    #[test]
    fn server_errors_map_to_network() {
        assert!(matches!(
            ProviderError::from_status(StatusCode::BAD_GATEWAY, ""),
            ProviderError::Network(_)
        ));
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(1_000);
        let err = ProviderError::from_status(StatusCode::BAD_REQUEST, &body);
        assert!(err.to_string().len() < 300);
    }
}
