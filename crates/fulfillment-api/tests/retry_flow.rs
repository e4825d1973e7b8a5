mod common;

use common::{client, config, hits, mount_token, TOKEN_PATH};
use fulfillment_api::ApiError;
use serde_json::json;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn expired_token_is_refreshed_and_call_retried_once() {
    let server = MockServer::start().await;
    mount_token(&server, "fresh").await;

    Mock::given(method("GET"))
        .and(path("/orders"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "invalid_token" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .and(header("authorization", "Bearer fresh"))
        .and(query_param("status", "open"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 1 }])))
        .expect(1)
        .mount(&server)
        .await;

    let test = client(config(&server)).await;
    let result = test.client.get("orders", &[("status", "open")]).await.unwrap();

    assert_eq!(result, json!([{ "id": 1 }]));
    assert_eq!(hits(&server, "/orders").await, 2);
    assert_eq!(hits(&server, TOKEN_PATH).await, 1);
    assert_eq!(test.client.access_token().await.as_deref(), Some("fresh"));
    assert_eq!(test.client.last_response().await.map(|r| r.status), Some(200));
}

#[tokio::test]
async fn token_request_carries_password_grant_fields() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(wiremock::matchers::body_string_contains("merchant"))
        .and(wiremock::matchers::body_string_contains("oms"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "fresh" })))
        .expect(1)
        .mount(&server)
        .await;

    let test = client(config(&server)).await;
    let token = test.client.refresh_access_token().await.unwrap();

    assert_eq!(token, "fresh");
    assert!(test.logs.contains("Got new access token!"));
    assert!(!test.logs.contains("hunter2"));
}

#[tokio::test]
async fn persistent_unauthorized_gives_up_after_one_retry() {
    let server = MockServer::start().await;
    mount_token(&server, "fresh").await;

    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let test = client(config(&server)).await;
    let err = test.client.get("orders", &[]).await.unwrap_err();

    assert!(matches!(err, ApiError::UnrecoverableAuthFailure(_)));
    assert_eq!(err.status(), Some(401));
    assert_eq!(hits(&server, TOKEN_PATH).await, 1);
}

#[tokio::test]
async fn vendor_error_code_is_treated_like_unauthorized() {
    let server = MockServer::start().await;
    mount_token(&server, "fresh").await;

    Mock::given(method("GET"))
        .and(path("/inventory"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({ "error_code": 1100 })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/inventory"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
        .mount(&server)
        .await;

    let test = client(config(&server)).await;
    let result = test.client.get("inventory", &[]).await.unwrap();

    assert_eq!(result, json!({ "items": [] }));
    assert_eq!(hits(&server, TOKEN_PATH).await, 1);
}

#[tokio::test]
async fn server_errors_are_not_retried() {
    let server = MockServer::start().await;
    mount_token(&server, "fresh").await;

    Mock::given(method("POST"))
        .and(path("/orders"))
        .and(body_json(json!({ "sku": "A-1", "quantity": 2 })))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream unavailable"))
        .expect(1)
        .mount(&server)
        .await;

    let test = client(config(&server)).await;
    let err = test
        .client
        .post("orders", &json!({ "sku": "A-1", "quantity": 2 }), &[])
        .await
        .unwrap_err();

    let failure = err.failure().expect("response should be attached");
    assert_eq!(failure.status, 500);
    assert!(failure.message.starts_with("Server error"));
    assert_eq!(hits(&server, TOKEN_PATH).await, 0);
    assert!(test.logs.contains("Request failed with status code 500"));
}

#[tokio::test]
async fn rejected_credentials_surface_as_unauthorized_merchant() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_credentials",
            "error_description": "The user credentials were incorrect."
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let test = client(config(&server)).await;
    let err = test.client.get("orders", &[]).await.unwrap_err();

    assert!(matches!(err, ApiError::UnauthorizedMerchant(_)));
    assert!(test
        .logs
        .contains("Description: The user credentials were incorrect."));
}

#[tokio::test]
async fn unreachable_endpoint_is_a_connection_failure() {
    let server = MockServer::start().await;
    mount_token(&server, "fresh").await;

    let mut config = config(&server);
    config.endpoint = Some("http://127.0.0.1:1".to_string());

    let test = client(config).await;
    let err = test.client.get("orders", &[]).await.unwrap_err();

    assert!(matches!(err, ApiError::ConnectionFailure(_)));
    assert_eq!(hits(&server, TOKEN_PATH).await, 0);
    assert!(test.logs.contains("Error connecting to endpoint"));
}

#[tokio::test]
async fn empty_success_body_decodes_to_null() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/orders/7"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let test = client(config(&server)).await;
    let result = test.client.delete("orders/7", &[]).await.unwrap();

    assert!(result.is_null());
}

/// Serves a 200 whose body stops short of its Content-Length, then hangs up
fn truncated_server(partial: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let mut request = [0u8; 8192];
            let _ = stream.read(&mut request);

            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 200\r\n\r\n{partial}"
            );
            let _ = stream.write_all(response.as_bytes());
            let _ = stream.shutdown(Shutdown::Both);
        }
    });

    format!("http://{addr}")
}

#[tokio::test]
async fn truncated_success_body_is_a_connection_failure() {
    let server = MockServer::start().await;
    mount_token(&server, "fresh").await;

    let mut config = config(&server);
    config.endpoint = Some(truncated_server(r#"{"id":"#));

    let test = client(config).await;
    let err = test.client.get("orders", &[]).await.unwrap_err();

    assert!(matches!(err, ApiError::ConnectionFailure(_)), "got {err:?}");
    assert_eq!(test.client.last_response().await, None);
    assert_eq!(hits(&server, TOKEN_PATH).await, 0);
    assert!(!test.logs.contains("Request successful."));
}

#[tokio::test]
async fn truncated_token_response_is_unauthorized_merchant() {
    let server = MockServer::start().await;

    let mut config = config(&server);
    config.auth_endpoint = truncated_server(r#"{"access_token":"fre"#);

    let test = client(config).await;
    let err = test.client.refresh_access_token().await.unwrap_err();

    assert!(matches!(err, ApiError::UnauthorizedMerchant(_)), "got {err:?}");
    assert!(!test.logs.contains("did not contain an access token"));
    assert_eq!(test.client.access_token().await.as_deref(), Some("stale"));
}
