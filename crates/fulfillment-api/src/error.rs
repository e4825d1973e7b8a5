use reqwest::{Method, StatusCode};

use crate::config::ConfigError;
use crate::parser::{self, ParsedError};

/// Errors surfaced by the API client
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Required configuration is missing; raised while building the client.
    #[error("{0}")]
    InvalidConfiguration(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(
        "You are missing a credential necessary to retrieve an access token: {0}. \
         Please check your configuration or environmental variables."
    )]
    MissingCredential(&'static str),
    /// The token request itself failed.
    #[error("Requesting an access token has failed: {0}")]
    UnauthorizedMerchant(String),
    /// No response was received from the endpoint.
    #[error("Error connecting to endpoint: {0:#}")]
    ConnectionFailure(#[source] anyhow::Error),
    #[error(transparent)]
    RequestFailure(#[from] RequestFailure),
    #[error("The request was unauthorized and could not be fixed by refreshing access token.")]
    UnrecoverableAuthFailure(#[source] RequestFailure),
    #[error("Missing request method: {0:?}")]
    MissingMethod(String),
    #[error("Failed to encode request body: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ApiError {
    /// Status code of the failed response, if one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RequestFailure(failure) | Self::UnrecoverableAuthFailure(failure) => {
                Some(failure.status)
            }
            _ => None,
        }
    }

    /// The failed response, if one was received
    pub fn failure(&self) -> Option<&RequestFailure> {
        match self {
            Self::RequestFailure(failure) | Self::UnrecoverableAuthFailure(failure) => {
                Some(failure)
            }
            _ => None,
        }
    }
}

/// A non-2xx response from the API
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Request failed with status code {status}")]
pub struct RequestFailure {
    pub status: u16,
    pub body: String,
    /// Transport-level description, used when the body cannot be decoded
    pub message: String,
}

impl RequestFailure {
    pub fn new(method: &Method, url: &str, status: u16, body: impl Into<String>) -> Self {
        let reason = StatusCode::from_u16(status)
            .ok()
            .and_then(|code| code.canonical_reason())
            .unwrap_or("Unknown");
        let class = if (400..500).contains(&status) {
            "Client error"
        } else if status >= 500 {
            "Server error"
        } else {
            "Unexpected response"
        };

        Self {
            status,
            body: body.into(),
            message: format!("{class}: `{method} {url}` resulted in a `{status} {reason}` response"),
        }
    }

    /// Decodes the response body
    pub fn parsed(&self) -> ParsedError {
        parser::parse_error(self)
    }

    /// Vendor-specific `error_code` from the response body
    pub fn error_code(&self) -> Option<String> {
        parser::get_error_code(self)
    }
}
