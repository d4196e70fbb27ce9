//! Shared error type and credential handling for the remote collaborators.
//!
//! Transcription, completion and synthesis backends all fail in the same
//! handful of ways.  [`ProviderError`] carries a machine-readable
//! [`ProviderErrorKind`] so the orchestrator can report *what* went wrong
//! without knowing which vendor was on the other end of the wire.
//!
//! | Kind        | Typical cause                           |
//! |-------------|-----------------------------------------|
//! | `Auth`      | HTTP 401 / 403, missing API key         |
//! | `RateLimit` | HTTP 429                                |
//! | `BadInput`  | other HTTP 4xx, unsupported audio       |
//! | `Server`    | HTTP 5xx, empty or unparseable response |
//! | `Network`   | connection refused, DNS, reset          |
//! | `Timeout`   | request exceeded its deadline           |
//! | `Config`    | client could not be constructed         |

use std::fmt;

use thiserror::Error;

// ---------------------------------------------------------------------------
// ProviderErrorKind
// ---------------------------------------------------------------------------

/// Category of a provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    Auth,
    RateLimit,
    BadInput,
    Server,
    Network,
    Timeout,
    Config,
}

impl ProviderErrorKind {
    /// Map an HTTP status code onto a category.
    ///
    /// ```
    /// use voice_chat::provider::ProviderErrorKind;
    ///
    /// assert_eq!(ProviderErrorKind::from_status(401), ProviderErrorKind::Auth);
    /// assert_eq!(ProviderErrorKind::from_status(429), ProviderErrorKind::RateLimit);
    /// assert_eq!(ProviderErrorKind::from_status(422), ProviderErrorKind::BadInput);
    /// assert_eq!(ProviderErrorKind::from_status(503), ProviderErrorKind::Server);
    /// ```
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Auth,
            429 => Self::RateLimit,
            400..=499 => Self::BadInput,
            _ => Self::Server,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::RateLimit => "rate-limit",
            Self::BadInput => "bad-input",
            Self::Server => "server-error",
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Config => "config",
        }
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// ProviderError
// ---------------------------------------------------------------------------

/// A failed call to a transcription, completion or synthesis provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind} error: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Build an error from a non-success HTTP response status and body.
    pub fn from_status(status: u16, body: &str) -> Self {
        let body = body.trim();
        let message = if body.is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {body}")
        };
        Self::new(ProviderErrorKind::from_status(status), message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Server, message)
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            ProviderErrorKind::Timeout
        } else if let Some(status) = e.status() {
            ProviderErrorKind::from_status(status.as_u16())
        } else if e.is_decode() || e.is_body() {
            ProviderErrorKind::Server
        } else if e.is_builder() {
            ProviderErrorKind::Config
        } else {
            ProviderErrorKind::Network
        };
        Self::new(kind, e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Resolve an API key: an explicit non-empty key wins, otherwise the named
/// environment variable is read.  Returns `None` when neither yields a value,
/// which is fine for local providers that need no authentication.
pub fn resolve_api_key(explicit: Option<&str>, env_var: Option<&str>) -> Option<String> {
    if let Some(key) = explicit.map(str::trim).filter(|k| !k.is_empty()) {
        return Some(key.to_string());
    }
    env_var
        .and_then(|name| std::env::var(name).ok())
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
}

/// Build a `reqwest::Client` with a per-request timeout.
pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ProviderError::new(ProviderErrorKind::Config, e.to_string()))
}

/// Turn a non-success response into a [`ProviderError`], passing successes
/// through untouched.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::from_status(status.as_u16(), &body))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_covers_categories() {
        assert_eq!(ProviderErrorKind::from_status(403), ProviderErrorKind::Auth);
        assert_eq!(ProviderErrorKind::from_status(400), ProviderErrorKind::BadInput);
        assert_eq!(ProviderErrorKind::from_status(500), ProviderErrorKind::Server);
        assert_eq!(ProviderErrorKind::from_status(302), ProviderErrorKind::Server);
    }

    #[test]
    fn error_display_includes_kind() {
        let err = ProviderError::from_status(429, "slow down");
        assert_eq!(err.kind, ProviderErrorKind::RateLimit);
        assert_eq!(err.to_string(), "rate-limit error: HTTP 429: slow down");
    }

    #[test]
    fn empty_body_is_omitted() {
        let err = ProviderError::from_status(502, "  ");
        assert_eq!(err.message, "HTTP 502");
    }

    #[test]
    fn explicit_key_wins_over_env() {
        std::env::set_var("VOICE_CHAT_TEST_KEY_A", "from-env");
        let key = resolve_api_key(Some("explicit"), Some("VOICE_CHAT_TEST_KEY_A"));
        assert_eq!(key.as_deref(), Some("explicit"));
    }

    #[test]
    fn empty_explicit_key_falls_back_to_env() {
        std::env::set_var("VOICE_CHAT_TEST_KEY_B", "from-env");
        let key = resolve_api_key(Some(""), Some("VOICE_CHAT_TEST_KEY_B"));
        assert_eq!(key.as_deref(), Some("from-env"));
    }

    #[test]
    fn missing_key_is_none() {
        assert!(resolve_api_key(None, Some("VOICE_CHAT_TEST_KEY_UNSET")).is_none());
        assert!(resolve_api_key(None, None).is_none());
    }

    #[test]
    fn client_builds() {
        assert!(http_client(5).is_ok());
    }
}
