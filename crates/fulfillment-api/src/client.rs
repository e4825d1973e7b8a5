use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::config::{ApiConfiguration, ConfigSource, Configuration};
use crate::error::ApiError;
use crate::executor::{Attempt, Executed, RequestExecutor, SharedConfig, Verb};
use crate::http::{HttpClient, HttpResponse, ReqwestClient};
use crate::log::{FileLogger, LogHandle, Logger, TracingLogger};
use crate::retry::AuthRetryPolicy;
use crate::store::{default_storage_root, storage_path, FileTokenStore, StoreError, TokenStore};

const FALLBACK_STORAGE_ROOT: &str = "storage";
const LOG_DIR: &str = "logs";

/// Fulfillment API client
///
/// Every verb goes through one retry routine: when a call fails with an
/// authentication signature the client fetches a new access token and
/// repeats the call once. Generic over the HTTP client implementation for
/// testability.
pub struct ApiClient<H: HttpClient = ReqwestClient> {
    config: SharedConfig,
    executor: RequestExecutor<H>,
    store: Arc<dyn TokenStore>,
    log: LogHandle,
    policy: AuthRetryPolicy,
    refresh_lock: Mutex<()>,
    last_response: RwLock<Option<HttpResponse>>,
}

impl ApiClient<ReqwestClient> {
    /// Builds a client with the default transport, logger and token store
    pub async fn new(source: impl Into<ConfigSource>) -> Result<Self, ApiError> {
        Self::builder().config(source).build().await
    }

    pub fn builder() -> ApiClientBuilder<ReqwestClient> {
        ApiClientBuilder::new()
    }
}

impl<H: HttpClient> ApiClient<H> {
    pub async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<Value, ApiError> {
        self.try_request(Verb::Get, url, None, &owned_query(query))
            .await
    }

    pub async fn post<B>(&self, url: &str, body: &B, query: &[(&str, &str)]) -> Result<Value, ApiError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let body = serde_json::to_value(body)?;
        self.try_request(Verb::Post, url, Some(&body), &owned_query(query))
            .await
    }

    pub async fn put<B>(&self, url: &str, body: &B, query: &[(&str, &str)]) -> Result<Value, ApiError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let body = serde_json::to_value(body)?;
        self.try_request(Verb::Put, url, Some(&body), &owned_query(query))
            .await
    }

    pub async fn patch<B>(&self, url: &str, body: &B, query: &[(&str, &str)]) -> Result<Value, ApiError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let body = serde_json::to_value(body)?;
        self.try_request(Verb::Patch, url, Some(&body), &owned_query(query))
            .await
    }

    pub async fn delete(&self, url: &str, query: &[(&str, &str)]) -> Result<Value, ApiError> {
        self.try_request(Verb::Delete, url, None, &owned_query(query))
            .await
    }

    /// Issues a call with a method given by name (`"get"`, `"POST"`, ...)
    ///
    /// Unknown methods fail with [`ApiError::MissingMethod`] before any I/O.
    pub async fn request(
        &self,
        method: &str,
        url: &str,
        body: Option<&Value>,
        query: &[(&str, &str)],
    ) -> Result<Value, ApiError> {
        let verb = match method.parse::<Verb>() {
            Ok(verb) => verb,
            Err(e) => {
                self.log.error(e.to_string());
                return Err(e);
            }
        };

        self.try_request(verb, url, body, &owned_query(query)).await
    }

    /// Fetches a new access token, assigns it and persists it when token storage is on
    pub async fn refresh_access_token(&self) -> Result<String, ApiError> {
        let _guard = self.refresh_lock.lock().await;
        self.acquire_and_store().await
    }

    /// Response of the most recent successful call
    ///
    /// Cleared at the start of every call, so a failed call leaves `None`.
    pub async fn last_response(&self) -> Option<HttpResponse> {
        self.last_response.read().await.clone()
    }

    /// Snapshot of the current configuration
    pub async fn config(&self) -> Configuration {
        Configuration::from_contract(self.config.read().await.as_ref())
    }

    pub async fn access_token(&self) -> Option<String> {
        self.config.read().await.access_token().map(str::to_string)
    }

    /// Runs one logical call, refreshing the token and retrying at most once
    async fn try_request(
        &self,
        verb: Verb,
        url: &str,
        body: Option<&Value>,
        query: &[(String, String)],
    ) -> Result<Value, ApiError> {
        *self.last_response.write().await = None;

        let mut first_attempt = true;
        loop {
            let Attempt {
                token: sent_with,
                outcome,
            } = self.executor.attempt(verb, url, body, query).await;

            match outcome {
                Ok(Executed { response, result }) => {
                    *self.last_response.write().await = Some(response);
                    return Ok(result);
                }
                Err(ApiError::RequestFailure(failure)) if self.policy.matches(&failure) => {
                    if !first_attempt {
                        let err = ApiError::UnrecoverableAuthFailure(failure);
                        self.log.error(err.to_string());
                        return Err(err);
                    }

                    self.log
                        .info("Possibly expired token, trying to refresh token...");
                    self.refresh_after_failure(sent_with.as_deref()).await?;
                    self.log.info("Retrying request...");
                    first_attempt = false;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Replaces the token a failed call was sent with
    ///
    /// Skips the token request when another caller already replaced it.
    async fn refresh_after_failure(&self, stale: Option<&str>) -> Result<(), ApiError> {
        let _guard = self.refresh_lock.lock().await;

        if self.access_token().await.as_deref() != stale {
            self.log.info("Access token was already refreshed.");
            return Ok(());
        }

        self.acquire_and_store().await.map(|_| ())
    }

    /// Caller must hold `refresh_lock`
    async fn acquire_and_store(&self) -> Result<String, ApiError> {
        let token = self.executor.request_access_token().await?;

        let store_token = {
            let mut config = self.config.write().await;
            config.set_access_token(Some(token.clone()));
            config.should_store_token()
        };

        if store_token {
            if let Err(e) = self.store.save(&token).await {
                self.log
                    .error(format!("Failed to store access token: {e:#}"));
            }
        }

        Ok(token)
    }
}

/// Builder for [`ApiClient`]
pub struct ApiClientBuilder<H: HttpClient = ReqwestClient> {
    source: ConfigSource,
    http: H,
    logger: Option<Arc<dyn Logger>>,
    log_to_storage: bool,
    storage_root: Option<PathBuf>,
    store: Option<Arc<dyn TokenStore>>,
    policy: AuthRetryPolicy,
}

impl ApiClientBuilder<ReqwestClient> {
    pub fn new() -> Self {
        Self {
            source: ConfigSource::default(),
            http: ReqwestClient::new(),
            logger: None,
            log_to_storage: false,
            storage_root: None,
            store: None,
            policy: AuthRetryPolicy::default(),
        }
    }
}

impl Default for ApiClientBuilder<ReqwestClient> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: HttpClient> ApiClientBuilder<H> {
    /// Where the configuration comes from; defaults to the process environment
    pub fn config(mut self, source: impl Into<ConfigSource>) -> Self {
        self.source = source.into();
        self
    }

    /// Replaces the HTTP transport
    pub fn http_client<H2: HttpClient>(self, http: H2) -> ApiClientBuilder<H2> {
        ApiClientBuilder {
            source: self.source,
            http,
            logger: self.logger,
            log_to_storage: self.log_to_storage,
            storage_root: self.storage_root,
            store: self.store,
            policy: self.policy,
        }
    }

    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Writes logs to `{storage root}/logs/Log--YYYY-MM-DD.log` unless a logger is set
    pub fn log_to_storage(mut self) -> Self {
        self.log_to_storage = true;
        self
    }

    /// Directory holding the token file and logs
    pub fn storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage_root = Some(root.into());
        self
    }

    /// Replaces the file-backed token store
    pub fn token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Which failures trigger a token refresh
    pub fn retry_policy(mut self, policy: AuthRetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Resolves the configuration, loads a stored token and validates the result
    pub async fn build(self) -> Result<ApiClient<H>, ApiError> {
        let mut config = self.source.resolve()?;

        let root = self
            .storage_root
            .or_else(default_storage_root)
            .unwrap_or_else(|| PathBuf::from(FALLBACK_STORAGE_ROOT));

        let sink: Arc<dyn Logger> = match self.logger {
            Some(logger) => logger,
            None if self.log_to_storage => match FileLogger::new(&storage_path(&root, LOG_DIR)) {
                Ok(logger) => Arc::new(logger),
                Err(e) => {
                    tracing::warn!("Failed to open log file, logging to tracing: {}", e);
                    Arc::new(TracingLogger)
                }
            },
            None => Arc::new(TracingLogger),
        };
        let log = LogHandle::new(sink, config.log_prefix());

        let store: Arc<dyn TokenStore> = match self.store {
            Some(store) => store,
            None => Arc::new(FileTokenStore::new(&root, config.storage_token_filename())),
        };

        if config.should_store_token() && config.access_token().is_none() {
            match store.load().await {
                Ok(token) => {
                    config.set_access_token(Some(token));
                    log.info("Got token from storage.");
                }
                Err(StoreError::NoToken) => {}
                Err(e) => log.error(format!("Failed to read stored access token: {e}")),
            }
        }

        if let Err(e) = validate(config.as_ref()) {
            log.error(e.to_string());
            return Err(e);
        }

        let config: SharedConfig = Arc::new(RwLock::new(config));
        let executor = RequestExecutor::new(self.http, Arc::clone(&config), log.clone());

        Ok(ApiClient {
            config,
            executor,
            store,
            log,
            policy: self.policy,
            refresh_lock: Mutex::new(()),
            last_response: RwLock::new(None),
        })
    }
}

/// Checks endpoint, then credentials (when there is no token), then scope
fn validate(config: &dyn ApiConfiguration) -> Result<(), ApiError> {
    let present = |value: Option<&str>| value.is_some_and(|value| !value.is_empty());

    if !present(config.endpoint()) {
        return Err(ApiError::InvalidConfiguration(
            "Must provide an endpoint".to_string(),
        ));
    }

    if present(config.access_token()) {
        return Ok(());
    }

    let credentials = [
        ("username", config.username()),
        ("password", config.password()),
        ("clientId", config.client_id()),
        ("clientSecret", config.client_secret()),
    ];
    if let Some((name, _)) = credentials.iter().find(|(_, value)| !present(*value)) {
        return Err(ApiError::InvalidConfiguration(format!(
            "Must provide {name} when no access token is set"
        )));
    }

    if !present(config.scope()) {
        return Err(ApiError::InvalidConfiguration(
            "Must provide scopes".to_string(),
        ));
    }

    Ok(())
}

fn owned_query(query: &[(&str, &str)]) -> Vec<(String, String)> {
    query
        .iter()
        .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
        .collect()
}
