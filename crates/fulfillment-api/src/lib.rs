//! Client for the Fulfillment REST API
//!
//! [`ApiClient`] wraps each call with OAuth2 password-grant authentication:
//! when the API rejects the access token the client requests a new one,
//! optionally persists it, and retries the call once.

mod client;
pub mod config;
mod error;
pub mod executor;
pub mod http;
pub mod log;
pub mod parser;
pub mod retry;
pub mod store;

pub use client::{ApiClient, ApiClientBuilder};
pub use config::{ApiConfiguration, ConfigError, ConfigSource, Configuration};
pub use error::{ApiError, RequestFailure};
pub use executor::{Attempt, Executed, RequestExecutor, Verb};
pub use http::{HttpClient, HttpRequest, HttpResponse, ReqwestClient};
pub use log::{BufferLogger, FileLogger, Logger, TracingLogger};
pub use parser::ParsedError;
pub use retry::AuthRetryPolicy;
pub use store::{FileTokenStore, StoreError, TokenStore};
