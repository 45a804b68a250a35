//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that builds the real router over an
//! in-memory order store and mock provider, object store and broadcaster,
//! so the HTTP surface can be exercised without external services.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use bracketeer_core::auth::JwtAuthenticator;
use bracketeer_core::testing::{MockBroadcaster, MockObjectStore, MockProvider};
use bracketeer_core::{
    load_config_from_str, Authenticator, NoneAuthenticator, Orchestrator, OrderStatus, OrderStore,
    SqliteOrderStore,
};

/// Re-export fixtures for test convenience
pub use bracketeer_core::testing::fixtures;

pub const WEBHOOK_TOKEN: &str = "hook-secret";
pub const JWT_SECRET: &str = "jwt-secret";

const MULTIPART_BOUNDARY: &str = "bracketeer-test-boundary";

pub const TEST_CONFIG: &str = r#"
[auth]
method = "none"

[server]
host = "127.0.0.1"
port = 8080
base_url = "https://bracketeer.test"

[provider]
base_url = "https://provider.test"
api_key = "provider-key"
webhook_token = "hook-secret"

[storage]
url = "https://storage.test"
bucket = "photos"
service_key = "service-key"

[broadcast]
url = "https://realtime.test"
api_key = "realtime-key"
"#;

/// Test fixture for API testing with mock dependencies.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_create_order() {
///     let fixture = TestFixture::new();
///
///     let response = fixture.post("/api/v1/orders", json!({ "name": "Kitchen" })).await;
///
///     assert_status!(response, StatusCode::OK);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock enhancement provider - orders, brackets, images
    pub provider: Arc<MockProvider>,
    /// Mock object store - stored artifacts
    pub objects: Arc<MockObjectStore>,
    /// Mock broadcaster - published events
    pub broadcaster: Arc<MockBroadcaster>,
    /// Order store shared with the router
    pub store: Arc<SqliteOrderStore>,
    /// Bearer token sent with every user request, if any
    token: Option<String>,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Fixture with authentication disabled.
    pub fn new() -> Self {
        Self::build(Arc::new(NoneAuthenticator::new()), None)
    }

    /// Fixture with JWT authentication; requests are signed as `user_id`.
    pub fn with_jwt_user(user_id: Uuid) -> Self {
        Self::build(
            Arc::new(JwtAuthenticator::new(JWT_SECRET)),
            Some(jwt_token(JWT_SECRET, user_id)),
        )
    }

    fn build(authenticator: Arc<dyn Authenticator>, token: Option<String>) -> Self {
        let provider = Arc::new(MockProvider::new());
        let objects = Arc::new(MockObjectStore::new());
        let broadcaster = Arc::new(MockBroadcaster::new());
        let store = Arc::new(SqliteOrderStore::in_memory().expect("Failed to open store"));

        let config = load_config_from_str(TEST_CONFIG).expect("Failed to parse test config");
        let orchestrator = Orchestrator::new(
            fixtures::fast_config(),
            provider.clone(),
            objects.clone(),
            store.clone(),
            broadcaster.clone(),
        );

        let state = Arc::new(bracketeer_server::state::AppState::new(
            config,
            authenticator,
            orchestrator,
        ));
        let router = bracketeer_server::api::create_router(state);

        Self {
            router,
            provider,
            objects,
            broadcaster,
            store,
            token,
        }
    }

    /// A second client against the same server, signed as another user.
    pub fn as_user(&self, user_id: Uuid) -> Self {
        Self {
            router: self.router.clone(),
            provider: self.provider.clone(),
            objects: self.objects.clone(),
            broadcaster: self.broadcaster.clone(),
            store: self.store.clone(),
            token: Some(jwt_token(JWT_SECRET, user_id)),
        }
    }

    /// The same server without credentials.
    pub fn anonymous(&self) -> Self {
        Self {
            router: self.router.clone(),
            provider: self.provider.clone(),
            objects: self.objects.clone(),
            broadcaster: self.broadcaster.clone(),
            store: self.store.clone(),
            token: None,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Upload files as multipart parts, with an optional `groups` field.
    pub async fn upload(
        &self,
        order_id: &str,
        filenames: &[&str],
        groups: Option<&str>,
    ) -> TestResponse {
        let body = multipart_body(filenames, groups);
        let mut builder = Request::builder()
            .method("POST")
            .uri(format!("/api/v1/orders/{}/upload", order_id))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", MULTIPART_BOUNDARY),
            );
        if let Some(token) = &self.token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(builder.body(Body::from(body)).unwrap()).await
    }

    /// Deliver a provider webhook with an explicit Authorization header.
    pub async fn webhook_with_auth(&self, body: &str, authorization: Option<&str>) -> TestResponse {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/v1/webhooks/enhancer")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    /// Deliver a provider webhook carrying the configured token.
    pub async fn webhook(&self, body: Value) -> TestResponse {
        self.webhook_with_auth(
            &body.to_string(),
            Some(&format!("Bearer {}", WEBHOOK_TOKEN)),
        )
        .await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = &self.token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    /// Fetch a raw text body (for the metrics endpoint).
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).to_string())
    }

    /// Wait until background webhook work has moved the order to `status`.
    pub async fn wait_for_status(&self, order_id: &str, status: OrderStatus) -> bool {
        let id = Uuid::parse_str(order_id).expect("order id must be a UUID");
        for _ in 0..200 {
            if let Ok(Some(order)) = self.store.get_order_by_id_no_user(id) {
                if order.status == status {
                    return true;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    /// Create an order and return its id.
    pub async fn create_order(&self, name: &str) -> String {
        let response = self
            .post("/api/v1/orders", serde_json::json!({ "name": name }))
            .await;
        assert_eq!(response.status, StatusCode::OK, "create failed: {}", response.body);
        response.body["id"]
            .as_str()
            .expect("order id missing")
            .to_string()
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);
        if let Some(token) = &self.token {
            request_builder =
                request_builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Sign a one-hour HS256 token for `user_id`.
pub fn jwt_token(secret: &str, user_id: Uuid) -> String {
    let exp = chrono::Utc::now().timestamp() + 3600;
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &serde_json::json!({ "sub": user_id.to_string(), "exp": exp }),
        &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("Failed to sign token")
}

/// Build a multipart body with one `files` part per filename.
pub fn multipart_body(filenames: &[&str], groups: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    for filename in filenames {
        body.extend_from_slice(format!("--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"files\"; filename=\"{}\"\r\n",
                filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
        body.extend_from_slice(&fixtures::jpeg_bytes(128));
        body.extend_from_slice(b"\r\n");
    }
    if let Some(groups) = groups {
        body.extend_from_slice(format!("--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"groups\"\r\n\r\n");
        body.extend_from_slice(groups.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());
    body
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}

/// Helper to assert a JSON path equals expected value.
#[macro_export]
macro_rules! assert_json_path {
    ($json:expr, $path:expr, $expected:expr) => {
        let actual = &$json[$path];
        assert_eq!(
            actual, &$expected,
            "Path '{}' expected {:?}, got {:?}",
            $path, $expected, actual
        );
    };
}
