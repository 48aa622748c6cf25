//! End-to-end tests for the REST API.
//! Binds the server to a random local port and drives it with reqwest.

use blinkd::{auth, config::ServerConfig, rest, storage::Storage, AppContext};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

/// Start a server on a random port.  Returns the API base URL; the TempDir
/// keeps the data directory alive for the duration of the test.
async fn spawn_server() -> (String, TempDir) {
    let dir = TempDir::new().unwrap();
    let config = Arc::new(ServerConfig::new(None, None, Some(dir.path().to_path_buf())));
    let storage = Arc::new(Storage::new(dir.path()).await.unwrap());
    let token_secret = auth::get_or_create_secret(dir.path()).unwrap();

    let ctx = Arc::new(AppContext {
        config,
        storage,
        token_secret,
        started_at: std::time::Instant::now(),
    });

    let router = rest::build_router(ctx);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (format!("http://{addr}/api/v1"), dir)
}

async fn register(client: &reqwest::Client, base: &str, email: &str, pw: &str) -> reqwest::Response {
    client
        .post(format!("{base}/register"))
        .json(&json!({ "email": email, "password": pw }))
        .send()
        .await
        .unwrap()
}

/// Register + login, returning the access token.
async fn login(client: &reqwest::Client, base: &str, email: &str, pw: &str) -> String {
    assert_eq!(register(client, base, email, pw).await.status(), 201);
    let resp = client
        .post(format!("{base}/login"))
        .json(&json!({ "email": email, "password": pw }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_reports_ok() {
    let (base, _dir) = spawn_server().await;
    let resp = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["db_ok"], true);
}

#[tokio::test]
async fn register_rejects_missing_fields_and_duplicates() {
    let (base, _dir) = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/register"))
        .json(&json!({ "email": "a@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Email and password are required");

    assert_eq!(register(&client, &base, "a@example.com", "pw").await.status(), 201);

    let resp = register(&client, &base, "a@example.com", "other").await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Email already exists");
}

#[tokio::test]
async fn login_failure_does_not_reveal_which_part_was_wrong() {
    let (base, _dir) = spawn_server().await;
    let client = reqwest::Client::new();
    assert_eq!(register(&client, &base, "a@example.com", "right").await.status(), 201);

    let wrong_password = client
        .post(format!("{base}/login"))
        .json(&json!({ "email": "a@example.com", "password": "wrong" }))
        .send()
        .await
        .unwrap();
    let unknown_email = client
        .post(format!("{base}/login"))
        .json(&json!({ "email": "nobody@example.com", "password": "right" }))
        .send()
        .await
        .unwrap();

    assert_eq!(wrong_password.status(), 401);
    assert_eq!(unknown_email.status(), 401);
    let a: Value = wrong_password.json().await.unwrap();
    let b: Value = unknown_email.json().await.unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn endpoints_require_authentication() {
    let (base, _dir) = spawn_server().await;
    let client = reqwest::Client::new();

    for (method, path) in [
        ("post", "/sessions/start"),
        ("post", "/sessions/end"),
        ("get", "/statistics"),
        ("get", "/summary"),
    ] {
        let req = match method {
            "post" => client.post(format!("{base}{path}")),
            _ => client.get(format!("{base}{path}")),
        };
        let resp = req.send().await.unwrap();
        assert_eq!(resp.status(), 401, "{method} {path}");
    }

    // A forged token is as good as none.
    let resp = client
        .get(format!("{base}/summary"))
        .bearer_auth("user:-:9999999999:deadbeef")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn session_lifecycle_and_stale_token_rejection() {
    let (base, _dir) = spawn_server().await;
    let client = reqwest::Client::new();
    let login_token = login(&client, &base, "u@example.com", "pw").await;

    // Recording without ever starting a session fails.
    let resp = client
        .post(format!("{base}/statistics"))
        .bearer_auth(&login_token)
        .json(&json!({ "blink_rate": 14.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Not authenticated or no active session");

    // Start a session; the response carries a session-bearing token.
    let resp = client
        .post(format!("{base}/sessions/start"))
        .bearer_auth(&login_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    assert!(body["session_id"].is_string());
    let session_token = body["token"].as_str().unwrap().to_string();

    // Recording with the session token succeeds.
    let resp = client
        .post(format!("{base}/statistics"))
        .bearer_auth(&session_token)
        .json(&json!({ "blink_rate": 14.0, "avg_distance": 48.5, "staring_incidents": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // End the session.
    let resp = client
        .post(format!("{base}/sessions/end"))
        .bearer_auth(&session_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // The old session token still verifies, but its session is closed:
    // further writes are rejected until a new start.
    let resp = client
        .post(format!("{base}/statistics"))
        .bearer_auth(&session_token)
        .json(&json!({ "blink_rate": 9.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Not authenticated or no active session");

    // Ending again with the stale token is a no-op success (double-submit).
    let resp = client
        .post(format!("{base}/sessions/end"))
        .bearer_auth(&session_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn statistics_and_summary_round_trip() {
    let (base, _dir) = spawn_server().await;
    let client = reqwest::Client::new();
    let login_token = login(&client, &base, "u@example.com", "pw").await;

    let resp = client
        .post(format!("{base}/sessions/start"))
        .bearer_auth(&login_token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let session_token = body["token"].as_str().unwrap().to_string();

    for (blink, staring) in [(10.0, 2), (20.0, 3)] {
        let resp = client
            .post(format!("{base}/statistics"))
            .bearer_auth(&session_token)
            .json(&json!({ "blink_rate": blink, "staring_incidents": staring }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }
    client
        .post(format!("{base}/sessions/end"))
        .bearer_auth(&session_token)
        .send()
        .await
        .unwrap();

    // Entries come back oldest-first; entries from "now" are inside even a
    // one-day window.
    let resp = client
        .get(format!("{base}/statistics?days=1"))
        .bearer_auth(&login_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let entries = body["statistics"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["blink_rate"], 10.0);
    assert_eq!(entries[1]["blink_rate"], 20.0);
    assert!(entries[0]["avg_distance"].is_null());

    let resp = client
        .get(format!("{base}/summary"))
        .bearer_auth(&login_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["avg_blink_rate"], 15.0);
    assert_eq!(body["total_staring_incidents"], 5);
    assert_eq!(body["session_count"], 1);
    assert!(body["avg_distance"].is_null());
}

#[tokio::test]
async fn days_parameter_is_lenient() {
    let (base, _dir) = spawn_server().await;
    let client = reqwest::Client::new();
    let login_token = login(&client, &base, "u@example.com", "pw").await;

    let resp = client
        .post(format!("{base}/sessions/start"))
        .bearer_auth(&login_token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let session_token = body["token"].as_str().unwrap().to_string();
    client
        .post(format!("{base}/statistics"))
        .bearer_auth(&session_token)
        .json(&json!({ "blink_rate": 14.0 }))
        .send()
        .await
        .unwrap();

    // Non-numeric days falls back to the 30-day default rather than 400.
    let resp = client
        .get(format!("{base}/statistics?days=abc"))
        .bearer_auth(&login_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["statistics"].as_array().unwrap().len(), 1);

    // An absurdly wide window is served, not a crashed request task.
    let resp = client
        .get(format!("{base}/statistics?days=100000000"))
        .bearer_auth(&login_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["statistics"].as_array().unwrap().len(), 1);
}
