//! Assistants API error types.

use thiserror::Error;

/// Format an API error for display, extracting message from JSON if present.
///
/// Handles common patterns:
/// - `"HTTP 404: {"error": {"message": "No assistant found"}}"` → extracts message
/// - `"HTTP 429: {"error": {"message": "Rate limit"}}"` → extracts message
/// - Plain text errors → returns as-is
#[must_use]
pub fn format_api_error(error: &str) -> String {
    if let Some(json_start) = error.find('{') {
        let json_str = &error[json_start..];

        if let Ok(json) = serde_json::from_str::<serde_json::Value>(json_str)
            && let Some(msg) = extract_error_message(&json)
        {
            let prefix = error[..json_start].trim();
            if prefix.is_empty() {
                return msg;
            }
            return format!("{prefix} {msg}");
        }
    }

    error.to_string()
}

/// Extract user-friendly message from JSON error response.
fn extract_error_message(json: &serde_json::Value) -> Option<String> {
    // {"error": {"message": "...", "code": "..."}}
    // {"error": "..."}
    // {"message": "..."}
    if let Some(error_obj) = json.get("error") {
        if let Some(msg) = error_obj.get("message").and_then(|v| v.as_str()) {
            let mut result = msg.to_string();
            if let Some(code) = error_obj.get("code").and_then(|v| v.as_str()) {
                result = format!("{result} (code: {code})");
            } else if let Some(kind) = error_obj.get("type").and_then(|v| v.as_str()) {
                result = format!("{result} (type: {kind})");
            }
            return Some(result);
        }

        if let Some(msg) = error_obj.as_str() {
            return Some(msg.to_string());
        }
    }

    json.get("message")
        .and_then(|v| v.as_str())
        .map(ToString::to_string)
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Missing API key. Set {env_var} or configure api_key in config.toml")]
    MissingApiKey { env_var: &'static str },

    #[error("API error: {0}")]
    Api(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rate limited, retry after {retry_after:?}s")]
    RateLimited { retry_after: Option<u64> },

    #[error("Failed to parse response: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Human-readable form with any JSON error body reduced to its message.
    #[must_use]
    pub fn display_message(&self) -> String {
        format_api_error(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_openai_error() {
        let error = r#"HTTP 429: {"error":{"message":"Rate limit exceeded","type":"rate_limit_error","code":"rate_limit_exceeded"}}"#;
        assert_eq!(
            format_api_error(error),
            "HTTP 429: Rate limit exceeded (code: rate_limit_exceeded)"
        );
    }

    #[test]
    fn test_format_error_with_type_only() {
        let error = r#"HTTP 404: {"error":{"message":"No assistant found with id 'asst_x'.","type":"invalid_request_error","code":null}}"#;
        assert_eq!(
            format_api_error(error),
            "HTTP 404: No assistant found with id 'asst_x'. (type: invalid_request_error)"
        );
    }

    #[test]
    fn test_format_simple_error() {
        assert_eq!(
            format_api_error(r#"{"error":"Invalid API key"}"#),
            "Invalid API key"
        );
    }

    #[test]
    fn test_format_top_level_message() {
        assert_eq!(
            format_api_error(r#"{"message":"Something went wrong"}"#),
            "Something went wrong"
        );
    }

    #[test]
    fn test_format_plain_text() {
        assert_eq!(format_api_error("Connection refused"), "Connection refused");
    }

    #[test]
    fn test_format_unparseable_json() {
        let error = "HTTP 500: {invalid json}";
        assert_eq!(format_api_error(error), "HTTP 500: {invalid json}");
    }

    #[test]
    fn test_display_message_wraps_api_error() {
        let err = Error::Api(r#"HTTP 400: {"error":{"message":"bad thread"}}"#.into());
        assert_eq!(err.display_message(), "API error: HTTP 400: bad thread");
    }
}
