// WikiVoice - Wiki Voice Line Downloader for Desktop
// Copyright (C) 2025 WikiVoice Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Error types for WikiVoice
//!
//! Errors are grouped by domain (wiki API, download, file, general) and are
//! defined with thiserror. The split that matters operationally:
//!
//! - `Blocked` is a WAF/HTML response where JSON was expected. It is never
//!   retried by the protocol layer itself; the session-level search loop
//!   retries it a few times with a randomized delay.
//! - Throttle responses (429/503/403) are retried inside the HTTP adapter
//!   and only surface here once the retry budget is exhausted.
//! - `Cancelled` is expected control flow, not a fault. Callers must not log
//!   it with an error prefix.

use thiserror::Error;

/// Result type alias using our WikiVoiceError type
pub type Result<T> = std::result::Result<T, WikiVoiceError>;

/// Main error type for WikiVoice
#[derive(Error, Debug)]
pub enum WikiVoiceError {
    // ===== Wiki API Errors =====

    /// Generic API request failure (transport error, or non-2xx after the
    /// adapter's throttle retries ran out)
    #[error("API request failed: {message}")]
    ApiRequestFailed {
        message: String,
        /// HTTP status code if a response was received
        status_code: Option<u16>,
        /// Endpoint or URL that failed
        endpoint: Option<String>,
    },

    /// API returned a body that could not be decoded as the expected JSON
    #[error("Invalid API response: {message}")]
    InvalidApiResponse {
        message: String,
        /// Response body snippet for debugging
        response_body: Option<String>,
    },

    /// The response body was HTML where JSON was expected (WAF block)
    #[error("Request blocked by intermediary (HTML response): {endpoint}")]
    Blocked { endpoint: String },

    /// Network connectivity error
    #[error("Network error: {message}")]
    NetworkError {
        message: String,
        /// Whether this error might be transient
        is_transient: bool,
    },

    // ===== Download Errors =====

    /// Generic download failure for a single file
    #[error("Download failed: {0}")]
    DownloadFailed(String),

    /// Server returned an unexpected status code for a file download
    #[error("Server responded with unexpected status code: {status_code}")]
    UnexpectedStatusCode { status_code: u16, url: String },

    /// Invalid download URL format or protocol
    #[error("Invalid download URL: {0}")]
    InvalidDownloadUrl(String),

    // ===== File/Storage Errors =====

    /// Save directory could not be created or is not writable
    #[error("Save directory unavailable: {0}")]
    SaveDirUnavailable(String),

    /// Invalid file path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    // ===== General Errors =====

    /// Operation was cancelled by the user or superseded by a newer job
    #[error("Operation cancelled")]
    Cancelled,

    /// Generic input validation error
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error that should not normally occur
    #[error("Internal error: {0}")]
    InternalError(String),

    // ===== External Library Errors =====

    /// HTTP client error from reqwest
    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// Helper methods for creating common errors
impl WikiVoiceError {
    /// Create an ApiRequestFailed error
    pub fn api_failed<S: Into<String>>(
        message: S,
        status_code: Option<u16>,
        endpoint: Option<String>,
    ) -> Self {
        WikiVoiceError::ApiRequestFailed {
            message: message.into(),
            status_code,
            endpoint,
        }
    }

    /// Create a NetworkError
    pub fn network_error<S: Into<String>>(message: S, is_transient: bool) -> Self {
        WikiVoiceError::NetworkError {
            message: message.into(),
            is_transient,
        }
    }

    /// Create an InvalidInput error with a message
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        WikiVoiceError::InvalidInput(message.into())
    }

    /// Create an InternalError with a message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        WikiVoiceError::InternalError(message.into())
    }

    /// Check if error is a cancellation signal
    ///
    /// Cancellation is expected control flow: it stops the enclosing job but
    /// is not reported through the `[error]` log channel.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WikiVoiceError::Cancelled)
    }

    /// Check if error is a WAF block (HTML instead of JSON)
    pub fn is_blocked(&self) -> bool {
        matches!(self, WikiVoiceError::Blocked { .. })
    }

    /// Check if error might succeed on retry
    ///
    /// Returns `true` for transient network errors, 5xx responses and the
    /// throttle statuses the adapter retries on.
    pub fn is_retryable(&self) -> bool {
        match self {
            WikiVoiceError::NetworkError { is_transient, .. } => *is_transient,
            WikiVoiceError::ApiRequestFailed {
                status_code: Some(code),
                ..
            } => matches!(code, 429 | 503 | 403) || (500..=599).contains(code),
            WikiVoiceError::ReqwestError(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Get user-friendly error message suitable for the log pane
    pub fn user_message(&self) -> String {
        match self {
            WikiVoiceError::Blocked { .. } => {
                "The wiki rejected the request (anti-bot page). Waiting and retrying usually helps."
                    .to_string()
            }
            WikiVoiceError::SaveDirUnavailable(dir) => {
                format!("Cannot write to the save directory '{}'. Pick another folder.", dir)
            }
            WikiVoiceError::NetworkError { message, .. } => {
                format!("Network problem: {}. Check the connection and try again.", message)
            }
            _ => self.to_string(),
        }
    }
}
