//! API Integration Tests
//!
//! Every test drives the full router against the in-memory credential store.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use vigil_api::testing::{TestApp, TEST_PASSWORD};
use vigil_core::{AppConfig, CredentialStore, Role, SessionCheckPolicy, StoreFault};

/// Credential attached to a test request
enum Auth<'a> {
    None,
    Bearer(&'a str),
    ApiKey(&'a str),
}

/// Helper to create a test request
fn create_json_request(method: &str, uri: &str, auth: Auth<'_>, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");

    let builder = match auth {
        Auth::None => builder,
        Auth::Bearer(token) => builder.header(header::AUTHORIZATION, format!("Bearer {token}")),
        Auth::ApiKey(key) => builder.header("X-API-Key", key),
    };

    match body {
        Some(json_body) => builder
            .body(Body::from(serde_json::to_string(&json_body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &TestApp, request: Request<Body>) -> Response {
    app.router().oneshot(request).await.unwrap()
}

/// Send a request and decode the JSON body
async fn call(
    app: &TestApp,
    method: &str,
    uri: &str,
    auth: Auth<'_>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let response = send(app, create_json_request(method, uri, auth, body)).await;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn error(message: &str) -> Value {
    json!({ "error": message })
}

// =============================================================================
// Health Check Tests
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new().await;

    let (status, json) = call(&app, "GET", "/health", Auth::None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_readiness_follows_store() {
    let app = TestApp::new().await;

    let (status, json) = call(&app, "GET", "/ready", Auth::None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ready"], true);
    assert_eq!(json["checks"]["credential_store"], true);

    app.store.inject_fault(StoreFault::Ping).await;
    let (status, json) = call(&app, "GET", "/ready", Auth::None, None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["ready"], false);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = TestApp::new().await;
    call(&app, "GET", "/health", Auth::None, None).await;

    let response = send(
        &app,
        Request::builder().uri("/metrics").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("vigil_http_requests_total"));
}

#[tokio::test]
async fn test_openapi_document() {
    let app = TestApp::new().await;

    let (status, json) = call(&app, "GET", "/api-docs/openapi.json", Auth::None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["paths"]["/api/sessions"].is_object());
    assert!(json["components"]["securitySchemes"]["api_key"].is_object());
}

#[tokio::test]
async fn test_responses_are_never_cached() {
    let app = TestApp::new().await;

    let response = send(
        &app,
        create_json_request(
            "POST",
            "/api/auth/login",
            Auth::None,
            Some(json!({"username": "bob", "password": TEST_PASSWORD})),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
}

// =============================================================================
// Login / Logout
// =============================================================================

#[tokio::test]
async fn test_login_logout_revokes_token() {
    let app = TestApp::new().await;

    let (status, login) = call(
        &app,
        "POST",
        "/api/auth/login",
        Auth::None,
        Some(json!({"username": "bob", "password": TEST_PASSWORD})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(login["token_type"], "Bearer");
    assert_eq!(login["user"]["username"], "bob");
    assert!(login["user"].get("password_hash").is_none());
    let token = login["token"].as_str().unwrap().to_string();

    let (status, me) = call(&app, "GET", "/api/auth/me", Auth::Bearer(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"], app.bob.id);

    let (status, _) = call(&app, "POST", "/api/auth/logout", Auth::Bearer(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = call(&app, "GET", "/api/auth/me", Auth::Bearer(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json, error("Session has been revoked"));
}

#[tokio::test]
async fn test_login_failures() {
    let app = TestApp::new().await;

    let (status, json) = call(
        &app,
        "POST",
        "/api/auth/login",
        Auth::None,
        Some(json!({"username": "bob", "password": "wrong password"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json, error("Invalid username or password"));

    let (status, json) = call(
        &app,
        "POST",
        "/api/auth/login",
        Auth::None,
        Some(json!({"username": "nobody", "password": TEST_PASSWORD})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json, error("Invalid username or password"));

    let (status, json) = call(
        &app,
        "POST",
        "/api/auth/login",
        Auth::None,
        Some(json!({"username": "bob"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json, error("username and password are required"));

    app.state.audit.flush().await;
    let (admin_token, _) = app.login(&app.admin).await;
    let (_, page) = call(
        &app,
        "GET",
        "/api/audit?action=login_failed",
        Auth::Bearer(&admin_token),
        None,
    )
    .await;
    assert_eq!(page["total"], 2);
    assert_eq!(page["rows"][0]["level"], "warn");
}

#[tokio::test]
async fn test_missing_and_malformed_credentials() {
    let app = TestApp::new().await;

    let (status, json) = call(&app, "GET", "/api/auth/me", Auth::None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json, error("Authentication required"));

    let (status, json) = call(&app, "GET", "/api/auth/me", Auth::Bearer("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json, error("Invalid or expired token"));

    let (status, json) = call(&app, "GET", "/api/auth/me", Auth::ApiKey("vgl_unknown"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json, error("Invalid API key"));
}

// =============================================================================
// Sessions
// =============================================================================

#[tokio::test]
async fn test_session_revocation_is_idempotent() {
    let app = TestApp::new().await;
    let (admin_token, _) = app.login(&app.admin).await;
    let (bob_token, bob_session) = app.login(&app.bob).await;
    app.login(&app.carol).await;

    let uri = format!("/api/sessions/{bob_session}");
    let (status, json) = call(&app, "DELETE", &uri, Auth::Bearer(&admin_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"success": true}));

    let (status, json) = call(&app, "DELETE", &uri, Auth::Bearer(&admin_token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json, error("Session not found or already revoked"));

    let (status, json) = call(&app, "GET", "/api/auth/me", Auth::Bearer(&bob_token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json, error("Session has been revoked"));

    // admin and carol remain; the emergency sweep includes the caller
    let (status, json) = call(&app, "DELETE", "/api/sessions", Auth::Bearer(&admin_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"success": true, "revoked": 2}));

    let (status, _) = call(&app, "GET", "/api/sessions", Auth::Bearer(&admin_token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_revoke_user_sessions() {
    let app = TestApp::new().await;
    let (admin_token, _) = app.login(&app.admin).await;
    let (bob_first, _) = app.login(&app.bob).await;
    let (bob_second, _) = app.login(&app.bob).await;
    let (carol_token, _) = app.login(&app.carol).await;

    let uri = format!("/api/sessions/user/{}", app.bob.id);
    let (status, json) = call(&app, "GET", &uri, Auth::Bearer(&admin_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 2);

    let (status, json) = call(&app, "DELETE", &uri, Auth::Bearer(&admin_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"success": true, "revoked": 2}));

    for token in [&bob_first, &bob_second] {
        let (status, _) = call(&app, "GET", "/api/auth/me", Auth::Bearer(token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, _) = call(&app, "GET", "/api/auth/me", Auth::Bearer(&carol_token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, json) = call(&app, "DELETE", &uri, Auth::Bearer(&admin_token), None).await;
    assert_eq!(json["revoked"], 0);

    app.state.audit.flush().await;
    let (_, page) = call(
        &app,
        "GET",
        "/api/audit?action=USER_SESSIONS",
        Auth::Bearer(&admin_token),
        None,
    )
    .await;
    assert_eq!(page["total"], 2);
}

#[tokio::test]
async fn test_my_sessions_lists_only_own() {
    let app = TestApp::new().await;
    app.login(&app.admin).await;
    let (bob_token, bob_session) = app.login(&app.bob).await;

    let (status, json) = call(&app, "GET", "/api/sessions/me", Auth::Bearer(&bob_token), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 1);
    assert_eq!(json["sessions"][0]["id"], bob_session.to_string());
}

#[tokio::test]
async fn test_malformed_session_id() {
    let app = TestApp::new().await;
    let (admin_token, _) = app.login(&app.admin).await;

    let (status, json) = call(
        &app,
        "DELETE",
        "/api/sessions/not-a-uuid",
        Auth::Bearer(&admin_token),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().starts_with("Invalid path parameter"));
}

#[tokio::test]
async fn test_session_check_fails_open_by_default() {
    let app = TestApp::new().await;
    let (bob_token, _) = app.login(&app.bob).await;

    app.store.inject_fault(StoreFault::SessionLookup).await;
    let (status, json) = call(&app, "GET", "/api/auth/me", Auth::Bearer(&bob_token), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["username"], "bob");
}

#[tokio::test]
async fn test_session_check_can_fail_closed() {
    let mut config = AppConfig::default();
    config.auth.session_check = SessionCheckPolicy::FailClosed;
    let app = TestApp::with_config(config).await;
    let (bob_token, _) = app.login(&app.bob).await;

    app.store.inject_fault(StoreFault::SessionLookup).await;
    let (status, json) = call(&app, "GET", "/api/auth/me", Auth::Bearer(&bob_token), None).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json, error("Session check unavailable"));
}

// =============================================================================
// API Keys
// =============================================================================

#[tokio::test]
async fn test_api_key_plaintext_returned_once() {
    let app = TestApp::new().await;
    let (bob_token, _) = app.login(&app.bob).await;

    let (status, issued) = call(
        &app,
        "POST",
        "/api/api-keys",
        Auth::Bearer(&bob_token),
        Some(json!({"name": "ci"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let key = issued["key"].as_str().unwrap().to_string();
    assert!(key.starts_with("vgl_"));
    assert_eq!(issued["scope"], "read:all");
    assert!(key.starts_with(issued["key_prefix"].as_str().unwrap()));

    let (status, listed) = call(&app, "GET", "/api/api-keys/mine", Auth::Bearer(&bob_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["total"], 1);
    assert!(listed["keys"][0].get("key").is_none());
    assert!(!listed.to_string().contains(&key));

    let (status, me) = call(&app, "GET", "/api/auth/me", Auth::ApiKey(&key), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "bob");
}

#[tokio::test]
async fn test_revoked_api_key_is_rejected() {
    let app = TestApp::new().await;
    let (bob_token, _) = app.login(&app.bob).await;
    let (admin_token, _) = app.login(&app.admin).await;

    let (_, issued) = call(
        &app,
        "POST",
        "/api/api-keys",
        Auth::Bearer(&bob_token),
        Some(json!({"name": "deploy", "scope": "write:deploy"})),
    )
    .await;
    let key = issued["key"].as_str().unwrap().to_string();
    let uri = format!("/api/api-keys/{}", issued["id"]);

    let (status, _) = call(&app, "DELETE", &uri, Auth::Bearer(&admin_token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = call(&app, "DELETE", &uri, Auth::Bearer(&admin_token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json, error("API key not found or already revoked"));

    let (status, json) = call(&app, "GET", "/api/auth/me", Auth::ApiKey(&key), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json, error("Invalid API key"));
}

#[tokio::test]
async fn test_api_key_of_suspended_owner_is_forbidden() {
    let app = TestApp::new().await;
    let (bob_token, _) = app.login(&app.bob).await;
    let (admin_token, _) = app.login(&app.admin).await;

    let (_, issued) = call(
        &app,
        "POST",
        "/api/api-keys",
        Auth::Bearer(&bob_token),
        Some(json!({"name": "ci"})),
    )
    .await;
    let key = issued["key"].as_str().unwrap().to_string();

    let (status, _) = call(
        &app,
        "PUT",
        &format!("/api/users/{}", app.bob.id),
        Auth::Bearer(&admin_token),
        Some(json!({"status": "suspended"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = call(&app, "GET", "/api/auth/me", Auth::ApiKey(&key), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json, error("Account suspended"));

    // rejected calls are not counted as usage
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let key_id = issued["id"].as_i64().unwrap();
    let record = app.store.find_api_key(key_id).await.unwrap().unwrap();
    assert_eq!(record.total_calls, 0);
}

#[tokio::test]
async fn test_api_key_issuance_requires_api_access() {
    let app = TestApp::new().await;
    let (carol_token, _) = app.login(&app.carol).await;

    let (status, json) = call(
        &app,
        "POST",
        "/api/api-keys",
        Auth::Bearer(&carol_token),
        Some(json!({"name": "mine"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json, error("API key issuance is not permitted for this account"));

    let (status, json) = call(
        &app,
        "POST",
        "/api/api-keys",
        Auth::Bearer(&carol_token),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json, error("name is required"));
}

#[tokio::test]
async fn test_only_owner_or_admin_revokes_key() {
    let app = TestApp::new().await;
    let (bob_token, _) = app.login(&app.bob).await;
    let (carol_token, _) = app.login(&app.carol).await;

    let (_, issued) = call(
        &app,
        "POST",
        "/api/api-keys",
        Auth::Bearer(&bob_token),
        Some(json!({"name": "ci"})),
    )
    .await;
    let uri = format!("/api/api-keys/{}", issued["id"]);

    let (status, _) = call(&app, "DELETE", &uri, Auth::Bearer(&carol_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&app, "DELETE", &uri, Auth::Bearer(&bob_token), None).await;
    assert_eq!(status, StatusCode::OK);
}

// =============================================================================
// Guards
// =============================================================================

#[tokio::test]
async fn test_role_and_screen_guards() {
    let app = TestApp::new().await;
    let (bob_token, _) = app.login(&app.bob).await;
    let (carol_token, _) = app.login(&app.carol).await;

    let (status, json) = call(&app, "GET", "/api/sessions", Auth::Bearer(&bob_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json, error("Insufficient permissions"));

    let (status, json) = call(&app, "GET", "/api/audit", Auth::Bearer(&bob_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json, error("Insufficient permissions"));

    let (status, json) = call(&app, "GET", "/api/users", Auth::Bearer(&carol_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json, error("Access denied"));

    let (status, _) = call(&app, "GET", "/api/sessions/me", Auth::Bearer(&carol_token), None).await;
    assert_eq!(status, StatusCode::OK);
}

// =============================================================================
// Users
// =============================================================================

#[tokio::test]
async fn test_create_user_validation() {
    let app = TestApp::new().await;
    let (admin_token, _) = app.login(&app.admin).await;

    let (status, json) = call(
        &app,
        "POST",
        "/api/users",
        Auth::Bearer(&admin_token),
        Some(json!({
            "username": "dave",
            "email": "dave@example.com",
            "password": "short",
            "name": "Dave",
            "role": "analyst"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json, error("Password must be at least 8 characters"));

    let (status, json) = call(
        &app,
        "POST",
        "/api/users",
        Auth::Bearer(&admin_token),
        Some(json!({
            "username": "bob",
            "email": "another-bob@example.com",
            "password": "long enough",
            "name": "Bob Two",
            "role": "analyst"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json, error("Username already exists"));

    let (status, json) = call(
        &app,
        "POST",
        "/api/users",
        Auth::Bearer(&admin_token),
        Some(json!({
            "username": "erin",
            "email": "erin@example.com",
            "password": "long enough",
            "name": "Erin",
            "role": "root"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json, error("Invalid role: root"));
}

#[tokio::test]
async fn test_user_creation_survives_audit_outage() {
    let app = TestApp::new().await;
    let (admin_token, _) = app.login(&app.admin).await;
    app.store.inject_fault(StoreFault::AuditWrite).await;

    let (status, json) = call(
        &app,
        "POST",
        "/api/users",
        Auth::Bearer(&admin_token),
        Some(json!({
            "username": "dave",
            "email": "dave@example.com",
            "password": "long enough",
            "name": "Dave",
            "role": "analyst"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["username"], "dave");
    assert_eq!(json["access_level"], "read");
    assert!(json.get("password_hash").is_none());
}

#[tokio::test]
async fn test_user_listing_has_activity_fields() {
    let app = TestApp::new().await;
    let (admin_token, _) = app.login(&app.admin).await;

    let (status, json) = call(
        &app,
        "GET",
        &format!("/api/users/{}", app.carol.id),
        Auth::Bearer(&admin_token),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["username"], "carol");
    assert_eq!(json["login_activity"].as_array().unwrap().len(), 28);
    assert_eq!(json["failed_logins"], 0);
    assert_eq!(json["active_sessions"], 0);
    // never logged in
    assert_eq!(json["risk_score"], 20);
}

#[tokio::test]
async fn test_protected_admin_cannot_be_deleted() {
    let app = TestApp::new().await;
    let (admin_token, _) = app.login(&app.admin).await;

    let (status, json) = call(&app, "DELETE", "/api/users/1", Auth::Bearer(&admin_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json, error("The system administrator cannot be deleted"));

    let (status, json) = call(&app, "DELETE", "/api/users/999", Auth::Bearer(&admin_token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json, error("User not found"));
}

#[tokio::test]
async fn test_bulk_delete_skips_protected_admin() {
    let app = TestApp::new().await;
    for name in ["u4", "u5", "u6", "u7", "u8", "u9"] {
        app.seed_user(name, Role::Viewer, false).await;
    }
    let (admin_token, _) = app.login(&app.admin).await;

    let (status, json) = call(
        &app,
        "POST",
        "/api/users/bulk-delete",
        Auth::Bearer(&admin_token),
        Some(json!({"ids": [1, 7, 9]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"success": true, "deleted": [7, 9], "skipped": [1]}));

    let (status, json) = call(
        &app,
        "POST",
        "/api/users/bulk-delete",
        Auth::Bearer(&admin_token),
        Some(json!({"ids": []})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json, error("ids must be a non-empty array of user ids"));

    for body in [json!({}), json!({"ids": ["7"]}), json!({"ids": 7})] {
        let (status, json) = call(
            &app,
            "POST",
            "/api/users/bulk-delete",
            Auth::Bearer(&admin_token),
            Some(body),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json, error("ids must be a non-empty array of user ids"));
    }

    let (_, listed) = call(&app, "GET", "/api/users", Auth::Bearer(&admin_token), None).await;
    assert_eq!(listed["total"], 7);
}

#[tokio::test]
async fn test_reset_password_allows_new_login() {
    let app = TestApp::new().await;
    let (admin_token, _) = app.login(&app.admin).await;

    let (status, _) = call(
        &app,
        "POST",
        &format!("/api/users/{}/reset-password", app.carol.id),
        Auth::Bearer(&admin_token),
        Some(json!({"password": "brand new secret"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(
        &app,
        "POST",
        "/api/auth/login",
        Auth::None,
        Some(json!({"username": "carol", "password": "brand new secret"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_login_heatmap_access() {
    let app = TestApp::new().await;

    let (_, login) = call(
        &app,
        "POST",
        "/api/auth/login",
        Auth::None,
        Some(json!({"username": "bob", "password": TEST_PASSWORD})),
    )
    .await;
    let bob_token = login["token"].as_str().unwrap().to_string();
    let (carol_token, _) = app.login(&app.carol).await;
    let uri = format!("/api/users/{}/heatmap", app.bob.id);

    let (status, json) = call(&app, "GET", &uri, Auth::Bearer(&bob_token), None).await;
    assert_eq!(status, StatusCode::OK);
    let days = json["days"].as_array().unwrap();
    assert_eq!(days.len(), 28);
    assert_eq!(days[27], 1);

    let (status, json) = call(&app, "GET", &uri, Auth::Bearer(&carol_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json, error("Access denied"));
}

// =============================================================================
// Audit
// =============================================================================

#[tokio::test]
async fn test_audit_filters_and_level_validation() {
    let app = TestApp::new().await;
    let (admin_token, _) = app.login(&app.admin).await;
    let (_, bob_session) = app.login(&app.bob).await;

    call(
        &app,
        "DELETE",
        &format!("/api/sessions/{bob_session}"),
        Auth::Bearer(&admin_token),
        None,
    )
    .await;
    app.state.audit.flush().await;

    let (status, page) = call(
        &app,
        "GET",
        "/api/audit?level=warn&username=ADM&limit=10",
        Auth::Bearer(&admin_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    assert_eq!(page["limit"], 10);
    assert_eq!(page["rows"][0]["action"], "SESSION_REVOKED");
    assert_eq!(page["rows"][0]["resource_id"], bob_session.to_string());

    let (status, json) = call(
        &app,
        "GET",
        "/api/audit?level=loud",
        Auth::Bearer(&admin_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json, error("Invalid level: loud"));
}
