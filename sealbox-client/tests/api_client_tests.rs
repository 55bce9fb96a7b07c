use sealbox_client::{ApiClient, ClientConfig, ClientError, DEVICE_NAME_HEADER};
use uuid::Uuid;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const USER_ID: &str = "0192f1a0-0000-7000-8000-000000000001";
const DEVICE_ID: &str = "0192f1a0-0000-7000-8000-000000000002";

fn client(server: &MockServer) -> ApiClient {
    ApiClient::new(ClientConfig::new(server.uri(), "laptop")).unwrap()
}

fn auth_response(access: &str, refresh: &str) -> serde_json::Value {
    serde_json::json!({
        "access_token": access,
        "refresh_token": refresh,
        "expires_in": 900,
        "refresh_expires_in": 2592000,
        "user": {
            "id": USER_ID,
            "name": "Alice",
            "email": "alice@example.com",
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        }
    })
}

fn device_response(name: &str, status: &str) -> serde_json::Value {
    serde_json::json!({
        "id": DEVICE_ID,
        "user_id": USER_ID,
        "device_name": name,
        "public_key": "cGstbGFwdG9w",
        "key_format": "x25519-raw",
        "key_fingerprint": "abc123",
        "status": status,
        "created_at": "2025-01-01T00:00:00Z",
        "updated_at": "2025-01-01T00:00:00Z"
    })
}

// --- Auth state ---

#[tokio::test]
async fn not_authenticated_initially() {
    let server = MockServer::start().await;
    let client = client(&server);
    assert!(!client.is_authenticated().await);
}

#[tokio::test]
async fn set_tokens_makes_authenticated() {
    let server = MockServer::start().await;
    let client = client(&server);
    client
        .set_tokens("at".into(), "rt".into(), Uuid::parse_str(USER_ID).unwrap())
        .await;
    assert!(client.is_authenticated().await);
    assert_eq!(client.user_id().await, Some(Uuid::parse_str(USER_ID).unwrap()));
}

#[tokio::test]
async fn login_success_sends_device_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(header(DEVICE_NAME_HEADER, "laptop"))
        .respond_with(ResponseTemplate::new(200).set_body_json(auth_response("at-1", "rt-1")))
        .mount(&server)
        .await;

    let client = client(&server);
    let tokens = client.login("alice@example.com", "password").await.unwrap();
    assert_eq!(tokens.access_token, "at-1");
    assert_eq!(tokens.user.email, "alice@example.com");
    assert!(client.is_authenticated().await);
}

#[tokio::test]
async fn login_bad_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(serde_json::json!({"error": "unauthorized: invalid email or password"})),
        )
        .mount(&server)
        .await;

    let client = client(&server);
    let err = client.login("alice@example.com", "wrong").await.unwrap_err();
    assert!(matches!(err, ClientError::AuthFailed(_)));
    assert!(!client.is_authenticated().await);
}

// --- Refresh ---

#[tokio::test]
async fn refresh_rotates_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(auth_response("at-2", "rt-2")))
        .mount(&server)
        .await;

    let client = client(&server);
    client
        .set_tokens("at-1".into(), "rt-1".into(), Uuid::parse_str(USER_ID).unwrap())
        .await;

    let access = client.refresh_access_token().await.unwrap();
    assert_eq!(access, "at-2");
}

#[tokio::test]
async fn concurrent_refreshes_make_one_http_call() {
    let server = MockServer::start().await;
    // The server rotates refresh tokens; a second refresh with the old
    // token would fail. Expect exactly one request.
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(auth_response("at-2", "rt-2")))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    client
        .set_tokens("at-1".into(), "rt-1".into(), Uuid::parse_str(USER_ID).unwrap())
        .await;

    let (a, b, c) = futures::join!(
        client.refresh_access_token(),
        client.refresh_access_token(),
        client.refresh_access_token(),
    );
    assert_eq!(a.unwrap(), "at-2");
    assert_eq!(b.unwrap(), "at-2");
    assert_eq!(c.unwrap(), "at-2");
}

#[tokio::test]
async fn refresh_expired_session_clears_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(serde_json::json!({"error": "unauthorized: refresh token expired"})),
        )
        .mount(&server)
        .await;

    let client = client(&server);
    client
        .set_tokens("at-1".into(), "rt-1".into(), Uuid::parse_str(USER_ID).unwrap())
        .await;

    let err = client.refresh_access_token().await.unwrap_err();
    assert!(matches!(err, ClientError::AuthFailed(_)));
    assert!(!client.is_authenticated().await);
}

#[tokio::test]
async fn refresh_detects_device_revocation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(ResponseTemplate::new(401).set_body_json(
            serde_json::json!({"error": "unauthorized: DEVICE_REVOKED: this device's access has been revoked"}),
        ))
        .mount(&server)
        .await;

    let client = client(&server);
    client
        .set_tokens("at-1".into(), "rt-1".into(), Uuid::parse_str(USER_ID).unwrap())
        .await;

    let err = client.refresh_access_token().await.unwrap_err();
    assert!(matches!(err, ClientError::DeviceRevoked(_)));
    assert!(!client.is_authenticated().await);
}

#[tokio::test]
async fn expired_access_token_is_refreshed_and_retried() {
    let server = MockServer::start().await;

    // First list call is rejected; after a refresh the retry succeeds.
    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .and(header("authorization", "Bearer at-stale"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(auth_response("at-fresh", "rt-2")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .and(header("authorization", "Bearer at-fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "devices": [device_response("laptop", "active")]
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    client
        .set_tokens(
            "at-stale".into(),
            "rt-1".into(),
            Uuid::parse_str(USER_ID).unwrap(),
        )
        .await;

    let devices = client.list_devices().await.unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].device_name, "laptop");
}

// --- Devices & envelopes ---

#[tokio::test]
async fn register_device_roundtrip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/devices"))
        .respond_with(ResponseTemplate::new(201).set_body_json(device_response("laptop", "active")))
        .mount(&server)
        .await;

    let client = client(&server);
    client
        .set_tokens("at".into(), "rt".into(), Uuid::parse_str(USER_ID).unwrap())
        .await;

    let device = client
        .register_device(&sealbox_types::RegisterDeviceRequest {
            device_name: "laptop".into(),
            public_key: "cGstbGFwdG9w".into(),
            key_format: "x25519-raw".into(),
            fingerprint: "abc123".into(),
        })
        .await
        .unwrap();
    assert_eq!(device.status, sealbox_types::DeviceStatus::Active);
}

#[tokio::test]
async fn get_envelope_deserializes_metadata() {
    let server = MockServer::start().await;
    let device_id = Uuid::parse_str(DEVICE_ID).unwrap();
    Mock::given(method("GET"))
        .and(path(format!("/api/envelopes/{device_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "0192f1a0-0000-7000-8000-000000000003",
            "user_id": USER_ID,
            "device_id": DEVICE_ID,
            "ciphertext": "c2VhbGVk",
            "metadata": {
                "algorithm": "x25519-xsalsa20-poly1305",
                "hash": "sha-256",
                "tag_bits": 128
            },
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    client
        .set_tokens("at".into(), "rt".into(), Uuid::parse_str(USER_ID).unwrap())
        .await;

    let envelope = client.get_envelope(device_id).await.unwrap();
    assert_eq!(envelope.ciphertext, "c2VhbGVk");
    assert_eq!(envelope.metadata.algorithm, "x25519-xsalsa20-poly1305");
    assert_eq!(envelope.metadata.iv, None);
}

#[tokio::test]
async fn missing_envelope_surfaces_api_error() {
    let server = MockServer::start().await;
    let device_id = Uuid::parse_str(DEVICE_ID).unwrap();
    Mock::given(method("GET"))
        .and(path(format!("/api/envelopes/{device_id}")))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "error": "not found: no MDK envelope for this device"
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    client
        .set_tokens("at".into(), "rt".into(), Uuid::parse_str(USER_ID).unwrap())
        .await;

    let err = client.get_envelope(device_id).await.unwrap_err();
    match err {
        ClientError::Api(msg) => assert!(msg.contains("404")),
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn unauthenticated_calls_fail_without_touching_the_network() {
    let server = MockServer::start().await;
    let client = client(&server);
    let err = client.list_devices().await.unwrap_err();
    assert!(matches!(err, ClientError::AuthRequired));
}
