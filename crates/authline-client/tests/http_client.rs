//! `HttpAuthClient` against a real HTTP server on a loopback port.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use authline_client::{AuthApi, AuthEndpoints, AuthError, HttpAuthClient, NewAccount};
use authline_store::TokenPair;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};

/// Bodies the fake server received, in order.
type Received = Arc<Mutex<Vec<Value>>>;

// -- Fake auth server --------------------------------------------------------

async fn obtain(
    State(received): State<Received>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    received.lock().unwrap().push(body.clone());
    if body["password"] == "correct-pw" {
        (StatusCode::OK, Json(json!({"access": "a1", "refresh": "r1"})))
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "No active account found with the given credentials"})),
        )
    }
}

async fn refresh(
    State(received): State<Received>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    received.lock().unwrap().push(body.clone());
    match body["refresh"].as_str() {
        Some("r1") => (StatusCode::OK, Json(json!({"access": "a2"}))),
        Some("rotating") => (StatusCode::OK, Json(json!({"access": "a3", "refresh": "r3"}))),
        Some("boom") => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": "database down"})),
        ),
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Token is invalid or expired"})),
        ),
    }
}

async fn create_user(
    State(received): State<Received>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    received.lock().unwrap().push(body.clone());
    if body["username"] == "taken" {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"username": ["A user with that username already exists."]})),
        )
    } else {
        (StatusCode::CREATED, Json(json!({"username": body["username"]})))
    }
}

async fn slow() -> StatusCode {
    tokio::time::sleep(Duration::from_secs(5)).await;
    StatusCode::OK
}

async fn spawn_server() -> (HttpAuthClient, Received) {
    let received = Received::default();
    let app = Router::new()
        .route("/auth/token/obtain/", post(obtain))
        .route("/auth/token/refresh/", post(refresh))
        .route("/auth/user/create/", post(create_user))
        .route("/slow/", post(slow))
        .with_state(Arc::clone(&received));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = HttpAuthClient::new(
        AuthEndpoints::with_base_url(format!("http://{addr}")),
        Duration::from_secs(5),
    )
    .unwrap();
    (client, received)
}

// =========================================================================
// obtain
// =========================================================================

#[tokio::test]
async fn test_obtain_correct_password_returns_pair() {
    let (client, received) = spawn_server().await;

    let pair = client.obtain("alice", "correct-pw").await.unwrap();

    assert_eq!(pair, TokenPair::new("a1", "r1"));
    assert_eq!(
        received.lock().unwrap()[0],
        json!({"username": "alice", "password": "correct-pw"})
    );
}

#[tokio::test]
async fn test_obtain_wrong_password_returns_invalid_credentials() {
    let (client, _) = spawn_server().await;

    let err = client.obtain("alice", "wrong-pw").await.unwrap_err();

    let AuthError::InvalidCredentials(fields) = err else {
        panic!("expected InvalidCredentials, got {err:?}");
    };
    assert_eq!(
        fields.detail(),
        Some("No active account found with the given credentials")
    );
}

// =========================================================================
// refresh
// =========================================================================

#[tokio::test]
async fn test_refresh_static_token_keeps_refresh() {
    let (client, received) = spawn_server().await;

    let pair = client.refresh("r1").await.unwrap();

    assert_eq!(pair, TokenPair::new("a2", "r1"));
    assert_eq!(received.lock().unwrap()[0], json!({"refresh": "r1"}));
}

#[tokio::test]
async fn test_refresh_rotating_token_replaces_refresh() {
    let (client, _) = spawn_server().await;
    let pair = client.refresh("rotating").await.unwrap();
    assert_eq!(pair, TokenPair::new("a3", "r3"));
}

#[tokio::test]
async fn test_refresh_rejected_is_refresh_expired() {
    let (client, _) = spawn_server().await;
    assert_eq!(client.refresh("stale").await, Err(AuthError::RefreshExpired));
}

#[tokio::test]
async fn test_refresh_500_is_server_error() {
    let (client, _) = spawn_server().await;
    assert_eq!(
        client.refresh("boom").await,
        Err(AuthError::Server {
            status: 500,
            message: "database down".into()
        })
    );
}

// =========================================================================
// register
// =========================================================================

#[tokio::test]
async fn test_register_new_user_succeeds_and_sends_email() {
    let (client, received) = spawn_server().await;

    client
        .register(&NewAccount::new("bob", "pw-123456", "bob@example.com"))
        .await
        .unwrap();

    assert_eq!(
        received.lock().unwrap()[0],
        json!({"username": "bob", "password": "pw-123456", "email": "bob@example.com"})
    );
}

#[tokio::test]
async fn test_register_taken_username_returns_field_errors() {
    let (client, _) = spawn_server().await;

    let err = client
        .register(&NewAccount::new("taken", "pw", "t@example.com"))
        .await
        .unwrap_err();

    let AuthError::InvalidCredentials(fields) = err else {
        panic!("expected InvalidCredentials, got {err:?}");
    };
    assert_eq!(
        fields.get("username"),
        ["A user with that username already exists."]
    );
}

// =========================================================================
// transport failures
// =========================================================================

#[tokio::test]
async fn test_obtain_unreachable_server_is_network_error() {
    // Bind then drop to get a port nobody is listening on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let client = HttpAuthClient::new(
        AuthEndpoints::with_base_url(format!("http://{addr}")),
        Duration::from_secs(2),
    )
    .unwrap();

    let err = client.obtain("alice", "pw").await.unwrap_err();

    assert!(matches!(err, AuthError::Network(_)), "got {err:?}");
}

#[tokio::test]
async fn test_obtain_slow_server_times_out_as_network_error() {
    let (client, _) = spawn_server().await;
    let mut endpoints = client.endpoints().clone();
    endpoints.obtain_path = "/slow/".into();
    let impatient = HttpAuthClient::new(endpoints, Duration::from_millis(200)).unwrap();

    let err = impatient.obtain("alice", "pw").await.unwrap_err();

    assert!(matches!(err, AuthError::Network(_)), "got {err:?}");
}
