//! Integration tests for the authenticated API client: token handling,
//! the single 401 refresh-retry, rate limiting and error mapping.

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use syncbridge::api_client::ApiClient;
use syncbridge::config::ServiceConfig;
use syncbridge::error::EngineError;
use syncbridge::services::ServiceId;

#[path = "test_utils/mod.rs"]
mod test_utils;

use test_utils::{TestEngine, build_engine, override_service, seed_tokens, test_config};

async fn engine_against(mock: &MockServer, service: ServiceId) -> TestEngine {
    let mut config = test_config();
    override_service(
        &mut config,
        service,
        ServiceConfig {
            api_base: Some(mock.uri()),
            auth_base: Some(mock.uri()),
            ..ServiceConfig::default()
        },
    );
    build_engine(config).await.unwrap()
}

fn client_for(engine: &TestEngine, service: ServiceId) -> ApiClient {
    ApiClient::new(
        service,
        engine.tokens.clone(),
        engine.rate_limiter.clone(),
        engine.config.clone(),
    )
    .unwrap()
}

#[tokio::test]
async fn get_attaches_bearer_token() {
    let mock = MockServer::start().await;
    let engine = engine_against(&mock, ServiceId::Books).await;
    seed_tokens(&engine, ServiceId::Books, "books-token", Some("refresh"), 3600)
        .await
        .unwrap();

    Mock::given(method("GET"))
        .and(path("/items/55"))
        .and(header("authorization", "Bearer books-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "55", "name": "Bolt"})))
        .expect(1)
        .mount(&mock)
        .await;

    let client = client_for(&engine, ServiceId::Books);
    let response = client.get("items/55").await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.data["name"], json!("Bolt"));
}

#[tokio::test]
async fn a_401_triggers_one_refresh_and_retry() {
    let mock = MockServer::start().await;
    let engine = engine_against(&mock, ServiceId::Crm).await;
    seed_tokens(&engine, ServiceId::Crm, "stale-token", Some("refresh-1"), 3600)
        .await
        .unwrap();

    Mock::given(method("GET"))
        .and(path("/deals/9"))
        .and(header("authorization", "Bearer stale-token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "expired"})))
        .expect(1)
        .mount(&mock)
        .await;

    Mock::given(method("POST"))
        .and(path("/oauth/v2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh-token",
            "refresh_token": "refresh-2",
            "expires_in": 3600,
        })))
        .expect(1)
        .mount(&mock)
        .await;

    Mock::given(method("GET"))
        .and(path("/deals/9"))
        .and(header("authorization", "Bearer fresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "9"})))
        .expect(1)
        .mount(&mock)
        .await;

    let client = client_for(&engine, ServiceId::Crm);
    let response = client.get("deals/9").await.unwrap();
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn a_second_401_is_terminal() {
    let mock = MockServer::start().await;
    let engine = engine_against(&mock, ServiceId::Crm).await;
    seed_tokens(&engine, ServiceId::Crm, "stale-token", Some("refresh-1"), 3600)
        .await
        .unwrap();

    Mock::given(method("GET"))
        .and(path("/deals/9"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "still no"})))
        .expect(2)
        .mount(&mock)
        .await;

    Mock::given(method("POST"))
        .and(path("/oauth/v2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh-token",
            "expires_in": 3600,
        })))
        .mount(&mock)
        .await;

    let client = client_for(&engine, ServiceId::Crm);
    let err = client.get("deals/9").await.unwrap_err();
    match err {
        EngineError::RemoteApi { status, message, .. } => {
            assert_eq!(status, 401);
            assert_eq!(message, "still no");
        }
        other => panic!("expected RemoteApi, got {other:?}"),
    }
}

#[tokio::test]
async fn failed_refresh_surfaces_not_authenticated() {
    let mock = MockServer::start().await;
    let engine = engine_against(&mock, ServiceId::Fsm).await;
    seed_tokens(&engine, ServiceId::Fsm, "stale-token", Some("refresh-1"), 3600)
        .await
        .unwrap();

    Mock::given(method("GET"))
        .and(path("/work-orders/3"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({})))
        .mount(&mock)
        .await;

    Mock::given(method("POST"))
        .and(path("/oauth/v2/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
        .mount(&mock)
        .await;

    let client = client_for(&engine, ServiceId::Fsm);
    let err = client.get("work-orders/3").await.unwrap_err();
    assert!(matches!(err, EngineError::NotAuthenticated(ServiceId::Fsm)));
}

#[tokio::test]
async fn near_expiry_token_is_refreshed_before_use() {
    let mock = MockServer::start().await;
    let engine = engine_against(&mock, ServiceId::People).await;
    // 60s left is inside the 300s expiry buffer.
    seed_tokens(&engine, ServiceId::People, "short-lived", Some("refresh-1"), 60)
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/oauth/v2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "long-lived",
            "expires_in": 3600,
        })))
        .expect(1)
        .mount(&mock)
        .await;

    let token = engine
        .tokens
        .get_access_token(ServiceId::People)
        .await
        .unwrap();
    assert_eq!(token, "long-lived");
}

#[tokio::test]
async fn unauthenticated_service_is_rejected_without_a_request() {
    let mock = MockServer::start().await;
    let engine = engine_against(&mock, ServiceId::Desk).await;

    let client = client_for(&engine, ServiceId::Desk);
    let err = client.get("tickets/1").await.unwrap_err();
    assert!(matches!(err, EngineError::NotAuthenticated(ServiceId::Desk)));
    assert!(mock.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn rate_limit_blocks_before_dispatch() {
    let mock = MockServer::start().await;
    let mut config = test_config();
    override_service(
        &mut config,
        ServiceId::Quoting,
        ServiceConfig {
            api_base: Some(mock.uri()),
            auth_base: Some(mock.uri()),
            rate_limit_per_minute: Some(1),
            ..ServiceConfig::default()
        },
    );
    let engine = build_engine(config).await.unwrap();
    seed_tokens(&engine, ServiceId::Quoting, "quote-token", None, 3600)
        .await
        .unwrap();

    Mock::given(method("GET"))
        .and(path("/quotes/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "1"})))
        .expect(1)
        .mount(&mock)
        .await;

    let client = client_for(&engine, ServiceId::Quoting);
    client.get("quotes/1").await.unwrap();

    let err = client.get("quotes/1").await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::RateLimitExceeded {
            service: ServiceId::Quoting
        }
    ));
}

#[tokio::test]
async fn refresh_retry_respects_the_rate_limit() {
    let mock = MockServer::start().await;
    let mut config = test_config();
    override_service(
        &mut config,
        ServiceId::Quoting,
        ServiceConfig {
            api_base: Some(mock.uri()),
            auth_base: Some(mock.uri()),
            rate_limit_per_minute: Some(1),
            ..ServiceConfig::default()
        },
    );
    let engine = build_engine(config).await.unwrap();
    seed_tokens(&engine, ServiceId::Quoting, "stale-token", Some("refresh-1"), 3600)
        .await
        .unwrap();

    // The first request burns the whole window, so the post-refresh
    // retry must be blocked before it reaches the wire.
    Mock::given(method("GET"))
        .and(path("/quotes/7"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "expired"})))
        .expect(1)
        .mount(&mock)
        .await;

    Mock::given(method("POST"))
        .and(path("/oauth/v2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh-token",
            "expires_in": 3600,
        })))
        .expect(1)
        .mount(&mock)
        .await;

    let client = client_for(&engine, ServiceId::Quoting);
    let err = client.get("quotes/7").await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::RateLimitExceeded {
            service: ServiceId::Quoting
        }
    ));
}

#[tokio::test]
async fn remote_error_body_is_mapped_to_a_message() {
    let mock = MockServer::start().await;
    let engine = engine_against(&mock, ServiceId::Books).await;
    seed_tokens(&engine, ServiceId::Books, "books-token", None, 3600)
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "error": {"message": "sku already exists", "code": 4090}
        })))
        .mount(&mock)
        .await;

    let client = client_for(&engine, ServiceId::Books);
    let err = client.post("items", json!({"sku": "B-1"})).await.unwrap_err();
    match err {
        EngineError::RemoteApi { status, message, .. } => {
            assert_eq!(status, 422);
            assert_eq!(message, "sku already exists");
        }
        other => panic!("expected RemoteApi, got {other:?}"),
    }
}

#[tokio::test]
async fn exchange_code_stores_the_initial_token_pair() {
    let mock = MockServer::start().await;
    let engine = engine_against(&mock, ServiceId::Crm).await;
    engine
        .credentials
        .upsert_client(ServiceId::Crm, "client-id", "client-secret")
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/oauth/v2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "initial-access",
            "refresh_token": "initial-refresh",
            "expires_in": 3600,
        })))
        .expect(1)
        .mount(&mock)
        .await;

    assert!(!engine.tokens.is_authenticated(ServiceId::Crm).await.unwrap());
    engine
        .tokens
        .exchange_code(ServiceId::Crm, "auth-code-123")
        .await
        .unwrap();
    assert!(engine.tokens.is_authenticated(ServiceId::Crm).await.unwrap());

    let token = engine.tokens.get_access_token(ServiceId::Crm).await.unwrap();
    assert_eq!(token, "initial-access");
}

#[tokio::test]
async fn revoke_forgets_tokens_but_keeps_the_client() {
    let mock = MockServer::start().await;
    let engine = engine_against(&mock, ServiceId::Desk).await;
    seed_tokens(&engine, ServiceId::Desk, "desk-token", Some("refresh"), 3600)
        .await
        .unwrap();

    engine.tokens.revoke(ServiceId::Desk).await.unwrap();
    assert!(!engine.tokens.is_authenticated(ServiceId::Desk).await.unwrap());

    let credential = engine
        .credentials
        .find(ServiceId::Desk)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(credential.client_id, "test-client-id");
    assert!(credential.access_token_ciphertext.is_none());
}
