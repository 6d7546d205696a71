//! Error types.
//!
//! [`ConfigError`] covers startup problems and is fatal. [`ChatError`]
//! covers a single exchange with the assistant endpoint; it is shown
//! inline in the transcript and never ends the session.

use reqwest::StatusCode;
use thiserror::Error;

/// Fatal configuration problems, reported before the UI starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "no assistant endpoint configured; set `endpoint` in {path}, \
         export BANTER_API_URL, or pass --endpoint"
    )]
    MissingEndpoint { path: String },

    #[error("could not read config file {path}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config file {path}")]
    Invalid {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid endpoint URL `{url}`: {detail}")]
    BadEndpoint { url: String, detail: String },
}

/// A single failed exchange with the assistant endpoint.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The request never produced a response, or the connection dropped
    /// mid-body. Includes timeouts.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("endpoint returned {status}{}", body_suffix(.body))]
    BadStatus { status: StatusCode, body: String },

    /// A 200 response whose body does not match the reply contract.
    #[error("malformed response: {0}")]
    MalformedBody(String),
}

impl ChatError {
    pub fn bad_status(status: StatusCode, body: impl Into<String>) -> Self {
        Self::BadStatus {
            status,
            body: body.into(),
        }
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::MalformedBody(detail.into())
    }
}

fn body_suffix(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        const LIMIT: usize = 200;
        let shown: String = trimmed.chars().take(LIMIT).collect();
        if trimmed.chars().count() > LIMIT {
            format!(": {shown}…")
        } else {
            format!(": {shown}")
        }
    }
}
