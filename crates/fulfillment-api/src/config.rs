use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_AUTH_ENDPOINT: &str = "https://auth.fulfillment.com";
const ENV_FILE: &str = ".env";
const TOKEN_FILE: &str = "access_token.txt";

/// Environment variable names read by [`Configuration::from_env`]
pub mod keys {
    pub const USERNAME: &str = "USERNAME";
    pub const PASSWORD: &str = "PASSWORD";
    pub const CLIENT_ID: &str = "CLIENT_ID";
    pub const CLIENT_SECRET: &str = "CLIENT_SECRET";
    pub const ACCESS_TOKEN: &str = "ACCESS_TOKEN";
    pub const API_ENDPOINT: &str = "API_ENDPOINT";
    pub const AUTH_ENDPOINT: &str = "AUTH_ENDPOINT";
    pub const SCOPE: &str = "SCOPE";
    pub const STORE_TOKEN: &str = "STORE_TOKEN";
    pub const LOGGER_PREFIX: &str = "LOGGER_PREFIX";
    pub const STORAGE_TOKEN_PREFIX: &str = "STORAGE_TOKEN_PREFIX";
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("The provided directory location does not exist at {}", .0.display())]
    DirectoryNotFound(PathBuf),
    #[error("Failed to read environment file {}: {source}", path.display())]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
    #[error("Invalid configuration map: {0}")]
    InvalidMap(#[from] serde_json::Error),
}

/// Settings the client needs to reach and authenticate against the API
///
/// Only the access token changes after construction.
pub trait ApiConfiguration: Send + Sync {
    fn username(&self) -> Option<&str>;
    fn password(&self) -> Option<&str>;
    fn client_id(&self) -> Option<&str>;
    fn client_secret(&self) -> Option<&str>;
    fn scope(&self) -> Option<&str>;
    fn access_token(&self) -> Option<&str>;
    fn set_access_token(&mut self, token: Option<String>);
    /// Base URL of the API
    fn endpoint(&self) -> Option<&str>;
    /// Base URL of the OAuth server
    fn auth_endpoint(&self) -> &str;
    fn should_store_token(&self) -> bool;
    fn logger_prefix(&self) -> Option<&str>;
    fn storage_token_prefix(&self) -> Option<&str>;

    /// `"[prefix] "`, or empty when no prefix is set
    fn log_prefix(&self) -> String {
        match self.logger_prefix().filter(|prefix| !prefix.is_empty()) {
            Some(prefix) => format!("[{prefix}] "),
            None => String::new(),
        }
    }

    /// Name of the persisted token file, `{prefix-}access_token.txt`
    fn storage_token_filename(&self) -> String {
        match self.storage_token_prefix().filter(|prefix| !prefix.is_empty()) {
            Some(prefix) => format!("{prefix}-{TOKEN_FILE}"),
            None => TOKEN_FILE.to_string(),
        }
    }
}

/// Default [`ApiConfiguration`] implementation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default, alias = "endPoint")]
    pub endpoint: Option<String>,
    #[serde(default = "default_auth_endpoint")]
    pub auth_endpoint: String,
    #[serde(default = "default_store_token")]
    pub store_token: bool,
    #[serde(default)]
    pub logger_prefix: Option<String>,
    #[serde(default)]
    pub storage_token_prefix: Option<String>,
}

fn default_auth_endpoint() -> String {
    DEFAULT_AUTH_ENDPOINT.to_string()
}

fn default_store_token() -> bool {
    true
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            client_id: None,
            client_secret: None,
            scope: None,
            access_token: None,
            endpoint: None,
            auth_endpoint: default_auth_endpoint(),
            store_token: default_store_token(),
            logger_prefix: None,
            storage_token_prefix: None,
        }
    }
}

impl Configuration {
    /// Assembles a configuration from a key lookup; empty values count as absent
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.is_empty());

        Self {
            username: get(keys::USERNAME),
            password: get(keys::PASSWORD),
            client_id: get(keys::CLIENT_ID),
            client_secret: get(keys::CLIENT_SECRET),
            scope: get(keys::SCOPE),
            access_token: get(keys::ACCESS_TOKEN),
            endpoint: get(keys::API_ENDPOINT),
            auth_endpoint: get(keys::AUTH_ENDPOINT).unwrap_or_else(default_auth_endpoint),
            store_token: get(keys::STORE_TOKEN)
                .and_then(|value| parse_flag(&value))
                .unwrap_or_else(default_store_token),
            logger_prefix: get(keys::LOGGER_PREFIX),
            storage_token_prefix: get(keys::STORAGE_TOKEN_PREFIX),
        }
    }

    /// Reads the ambient process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads `.env` from `dir`, with ambient variables taking precedence
    ///
    /// The process environment is left untouched.
    pub fn from_dir(dir: &Path) -> Result<Self, ConfigError> {
        if !dir.is_dir() {
            return Err(ConfigError::DirectoryNotFound(dir.to_path_buf()));
        }

        let path = dir.join(ENV_FILE);
        let file_values = if path.is_file() {
            read_env_file(&path)?
        } else {
            tracing::debug!("No {} in {}, using process environment", ENV_FILE, dir.display());
            HashMap::new()
        };

        Ok(Self::from_lookup(|key| {
            std::env::var(key)
                .ok()
                .filter(|value| !value.is_empty())
                .or_else(|| file_values.get(key).cloned())
        }))
    }

    /// Builds from a JSON object using the camelCase field names
    pub fn from_map(map: serde_json::Value) -> Result<Self, ConfigError> {
        Ok(serde_json::from_value::<Self>(map)?.normalized())
    }

    /// Copies the values of any [`ApiConfiguration`]
    pub fn from_contract(config: &dyn ApiConfiguration) -> Self {
        let owned = |value: Option<&str>| value.map(str::to_string);

        Self {
            username: owned(config.username()),
            password: owned(config.password()),
            client_id: owned(config.client_id()),
            client_secret: owned(config.client_secret()),
            scope: owned(config.scope()),
            access_token: owned(config.access_token()),
            endpoint: owned(config.endpoint()),
            auth_endpoint: config.auth_endpoint().to_string(),
            store_token: config.should_store_token(),
            logger_prefix: owned(config.logger_prefix()),
            storage_token_prefix: owned(config.storage_token_prefix()),
        }
    }

    /// Turns empty strings into `None`
    pub fn normalized(mut self) -> Self {
        for field in [
            &mut self.username,
            &mut self.password,
            &mut self.client_id,
            &mut self.client_secret,
            &mut self.scope,
            &mut self.access_token,
            &mut self.endpoint,
            &mut self.logger_prefix,
            &mut self.storage_token_prefix,
        ] {
            if field.as_deref() == Some("") {
                *field = None;
            }
        }
        if self.auth_endpoint.is_empty() {
            self.auth_endpoint = default_auth_endpoint();
        }
        self
    }

    pub fn set_store_token(&mut self, store: bool) {
        self.store_token = store;
    }

    pub fn set_logger_prefix(&mut self, prefix: Option<String>) {
        self.logger_prefix = prefix;
    }

    pub fn set_storage_token_prefix(&mut self, prefix: Option<String>) {
        self.storage_token_prefix = prefix;
    }
}

impl ApiConfiguration for Configuration {
    fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    fn client_secret(&self) -> Option<&str> {
        self.client_secret.as_deref()
    }

    fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    fn set_access_token(&mut self, token: Option<String>) {
        self.access_token = token.filter(|token| !token.is_empty());
    }

    fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    fn auth_endpoint(&self) -> &str {
        &self.auth_endpoint
    }

    fn should_store_token(&self) -> bool {
        self.store_token
    }

    fn logger_prefix(&self) -> Option<&str> {
        self.logger_prefix.as_deref()
    }

    fn storage_token_prefix(&self) -> Option<&str> {
        self.storage_token_prefix.as_deref()
    }
}

/// Where the client's configuration comes from
#[derive(Default)]
pub enum ConfigSource {
    /// A pre-built configuration, used as-is
    Instance(Box<dyn ApiConfiguration>),
    /// A JSON object with camelCase keys (`clientId`, `storeToken`, ...)
    Map(serde_json::Value),
    /// A directory containing a `.env` file
    Directory(PathBuf),
    /// The process environment
    #[default]
    Environment,
}

impl From<Configuration> for ConfigSource {
    fn from(config: Configuration) -> Self {
        Self::Instance(Box::new(config))
    }
}

impl From<Box<dyn ApiConfiguration>> for ConfigSource {
    fn from(config: Box<dyn ApiConfiguration>) -> Self {
        Self::Instance(config)
    }
}

impl From<PathBuf> for ConfigSource {
    fn from(dir: PathBuf) -> Self {
        Self::Directory(dir)
    }
}

impl From<&Path> for ConfigSource {
    fn from(dir: &Path) -> Self {
        Self::Directory(dir.to_path_buf())
    }
}

impl From<serde_json::Value> for ConfigSource {
    fn from(map: serde_json::Value) -> Self {
        Self::Map(map)
    }
}

impl ConfigSource {
    /// Produces the configuration this source describes
    pub fn resolve(self) -> Result<Box<dyn ApiConfiguration>, ConfigError> {
        Ok(match self {
            Self::Instance(config) => config,
            Self::Map(map) => Box::new(Configuration::from_map(map)?),
            Self::Directory(dir) => Box::new(Configuration::from_dir(&dir)?),
            Self::Environment => Box::new(Configuration::from_env()),
        })
    }
}

fn read_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let to_error = |source| ConfigError::EnvFile {
        path: path.to_path_buf(),
        source,
    };

    dotenvy::from_path_iter(path)
        .map_err(to_error)?
        .collect::<Result<HashMap<_, _>, _>>()
        .map_err(to_error)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
