//! Single-shot request execution
//!
//! [`RequestExecutor`] performs exactly one HTTP call per invocation and
//! translates the outcome into [`ApiError`]. It never retries; the
//! refresh-and-retry protocol lives in [`crate::ApiClient`].

use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::ApiConfiguration;
use crate::error::{ApiError, RequestFailure};
use crate::http::{HttpClient, HttpRequest, HttpResponse};
use crate::log::LogHandle;
use crate::parser;

/// Configuration shared between the client and its executor
pub type SharedConfig = Arc<RwLock<Box<dyn ApiConfiguration>>>;

const ACCESS_TOKEN_PATH: &str = "oauth/access_token";

/// HTTP verbs accepted by the API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Verb {
    pub fn method(self) -> Method {
        match self {
            Self::Get => Method::GET,
            Self::Post => Method::POST,
            Self::Put => Method::PUT,
            Self::Patch => Method::PATCH,
            Self::Delete => Method::DELETE,
        }
    }
}

impl FromStr for Verb {
    type Err = ApiError;

    fn from_str(method: &str) -> Result<Self, Self::Err> {
        match method.to_ascii_lowercase().as_str() {
            "get" => Ok(Self::Get),
            "post" => Ok(Self::Post),
            "put" => Ok(Self::Put),
            "patch" => Ok(Self::Patch),
            "delete" => Ok(Self::Delete),
            _ => Err(ApiError::MissingMethod(method.to_string())),
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method().as_str())
    }
}

/// A successful call: the raw response and its decoded body
#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    pub response: HttpResponse,
    pub result: Value,
}

/// One call and the access token it was sent with
#[derive(Debug)]
pub struct Attempt {
    pub token: Option<String>,
    pub outcome: Result<Executed, ApiError>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// Issues individual calls against the auth server and the API
pub struct RequestExecutor<H: HttpClient> {
    http: H,
    config: SharedConfig,
    log: LogHandle,
}

impl<H: HttpClient> RequestExecutor<H> {
    pub fn new(http: H, config: SharedConfig, log: LogHandle) -> Self {
        Self { http, config, log }
    }

    /// Exchanges the configured credentials for a new access token
    ///
    /// The token is returned as-is; assigning and persisting it is up to the caller.
    pub async fn request_access_token(&self) -> Result<String, ApiError> {
        let (url, fields) = {
            let config = self.config.read().await;
            let fields = match password_grant_fields(config.as_ref()) {
                Ok(fields) => fields,
                Err(e) => {
                    self.log.error(e.to_string());
                    return Err(e);
                }
            };
            (join_url(config.auth_endpoint(), ACCESS_TOKEN_PATH), fields)
        };

        self.log.info("Requesting new access token...");
        self.log.out(format!("URL: {url}"));

        let request = HttpRequest::new(Method::POST, url.as_str()).multipart(fields);
        let response = match self.http.send(request).await {
            Ok(response) => response,
            Err(e) => {
                self.log.error("Requesting access token has failed.");
                self.log.error(format!("Error: {e:#}"));
                return Err(ApiError::UnauthorizedMerchant(format!("{e:#}")));
            }
        };

        if !response.is_success() {
            let failure = RequestFailure::new(&Method::POST, &url, response.status, response.body);
            self.log.error("Requesting access token has failed.");
            self.print_error(&failure);
            return Err(ApiError::UnauthorizedMerchant(failure.message));
        }

        match response.json::<TokenResponse>() {
            Ok(TokenResponse {
                access_token: Some(token),
            }) if !token.is_empty() => {
                self.log.info("Got new access token!");
                Ok(token)
            }
            _ => {
                self.log
                    .error("Requesting access token has failed: response did not contain an access token.");
                Err(ApiError::UnauthorizedMerchant(
                    "response did not contain an access token".to_string(),
                ))
            }
        }
    }

    /// Calls `{endpoint}/{url}` once with the current access token
    pub async fn make_request(
        &self,
        verb: Verb,
        url: &str,
        body: Option<&Value>,
        query: &[(String, String)],
    ) -> Result<Executed, ApiError> {
        self.attempt(verb, url, body, query).await.outcome
    }

    /// Like [`make_request`](Self::make_request), also reporting the token the call carried
    pub async fn attempt(
        &self,
        verb: Verb,
        url: &str,
        body: Option<&Value>,
        query: &[(String, String)],
    ) -> Attempt {
        let (endpoint, token) = {
            let config = self.config.read().await;
            (
                config
                    .endpoint()
                    .filter(|endpoint| !endpoint.is_empty())
                    .map(|endpoint| join_url(endpoint, url)),
                config.access_token().map(str::to_string),
            )
        };

        let outcome = match endpoint {
            Some(full_url) => self.send(verb, &full_url, token.as_deref(), body, query).await,
            None => {
                let err = ApiError::InvalidConfiguration("Must provide an endpoint".to_string());
                self.log.error(err.to_string());
                Err(err)
            }
        };

        Attempt { token, outcome }
    }

    async fn send(
        &self,
        verb: Verb,
        full_url: &str,
        token: Option<&str>,
        body: Option<&Value>,
        query: &[(String, String)],
    ) -> Result<Executed, ApiError> {
        let mut request = HttpRequest::new(verb.method(), full_url).query(query).json(body);
        if let Some(token) = token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        self.log.out(format!("URL: {}", request.full_url()));

        let response = match self.http.send(request).await {
            Ok(response) => response,
            Err(e) => {
                self.log.error(format!("Error connecting to endpoint: {e:#}"));
                return Err(ApiError::ConnectionFailure(e));
            }
        };

        if !response.is_success() {
            let failure = RequestFailure::new(&verb.method(), full_url, response.status, response.body);
            self.log
                .error(format!("Request failed with status code {}", failure.status));
            self.print_error(&failure);
            return Err(ApiError::RequestFailure(failure));
        }

        self.log.info("Request successful.");
        let result = decode_body(&response.body);

        Ok(Executed { response, result })
    }

    fn print_error(&self, failure: &RequestFailure) {
        for line in parser::describe(failure) {
            self.log.error(line);
        }
    }
}

/// Multipart fields for the password grant, after checking every credential is set
fn password_grant_fields(config: &dyn ApiConfiguration) -> Result<Vec<(String, String)>, ApiError> {
    let required = |name: &'static str, value: Option<&str>| {
        value
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .ok_or(ApiError::MissingCredential(name))
    };

    let username = required("username", config.username())?;
    let password = required("password", config.password())?;
    let client_id = required("clientId", config.client_id())?;
    let client_secret = required("clientSecret", config.client_secret())?;

    let mut fields = vec![
        ("client_id".to_string(), client_id),
        ("client_secret".to_string(), client_secret),
        ("username".to_string(), username),
        ("password".to_string(), password),
        ("grant_type".to_string(), "password".to_string()),
    ];
    if let Some(scope) = config.scope().filter(|scope| !scope.is_empty()) {
        fields.push(("scope".to_string(), scope.to_string()));
    }

    Ok(fields)
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Empty bodies decode to `null`, non-JSON text is kept as a string
fn decode_body(body: &str) -> Value {
    if body.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
}
