#![allow(dead_code)]

use std::sync::Arc;

use fulfillment_api::{ApiClient, BufferLogger, Configuration, FileTokenStore, ReqwestClient};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN_PATH: &str = "/oauth/access_token";

/// A client wired to a mock server, with a private storage root
pub struct TestClient {
    pub client: ApiClient<ReqwestClient>,
    pub logs: Arc<BufferLogger>,
    pub storage: TempDir,
}

/// Credentials plus a token, both endpoints pointing at `server`
pub fn config(server: &MockServer) -> Configuration {
    Configuration {
        username: Some("merchant".to_string()),
        password: Some("hunter2".to_string()),
        client_id: Some("client".to_string()),
        client_secret: Some("secret".to_string()),
        scope: Some("oms".to_string()),
        access_token: Some("stale".to_string()),
        endpoint: Some(server.uri()),
        auth_endpoint: server.uri(),
        ..Configuration::default()
    }
}

pub async fn client(config: Configuration) -> TestClient {
    let storage = tempfile::tempdir().expect("temp dir should be created");
    client_in(config, storage).await
}

pub async fn client_in(config: Configuration, storage: TempDir) -> TestClient {
    let logs = Arc::new(BufferLogger::new());
    let client = ApiClient::builder()
        .config(config)
        .storage_root(storage.path())
        .logger(logs.clone())
        .build()
        .await
        .expect("client should build");

    TestClient {
        client,
        logs,
        storage,
    }
}

/// Store that reads and writes the token file the client would use by default
pub fn token_file(storage: &TempDir, config: &Configuration) -> FileTokenStore {
    use fulfillment_api::ApiConfiguration;

    FileTokenStore::new(storage.path(), config.storage_token_filename())
}

/// Answers password-grant requests with `token`
pub async fn mount_token(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("name=\"grant_type\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": token,
            "token_type": "bearer",
            "expires_in": 3600
        })))
        .mount(server)
        .await;
}

/// Requests the server received on `route`
pub async fn hits(server: &MockServer, route: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == route)
        .count()
}
