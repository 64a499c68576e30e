use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use proxywarden::api::{router, AppState};
use proxywarden::engine::{EngineConfig, EngineSupervisor};
use proxywarden::models::{
    headers_from_pairs, NewEntry, RequestRecord, ResponseRecord, StatusValue,
};
use proxywarden::replay::Repeater;
use proxywarden::settings::{Settings, SettingsController, SharedSettings};
use proxywarden::storage::HistoryStore;

/// Wire up a full application state against a throwaway engine binary.
fn test_state(dir: &TempDir, bin: &str) -> AppState {
    let hook = dir.path().join("hook.py");
    std::fs::write(&hook, "# capture hook\n").unwrap();
    let config = EngineConfig {
        bin: bin.to_string(),
        listen_host: "127.0.0.1".to_string(),
        session_dir: dir.path().join("session"),
        hook_path: hook,
    };

    let store = Arc::new(HistoryStore::new(config.history_file()));
    let shared = SharedSettings::new(Settings::default());
    let supervisor = Arc::new(EngineSupervisor::new(config, shared.clone()));
    let settings = Arc::new(SettingsController::new(shared, supervisor.clone()));
    let repeater = Arc::new(Repeater::new(store.clone()));

    AppState::new(store, settings, supervisor, repeater)
}

fn sample_entry(url: &str) -> NewEntry {
    let request = RequestRecord {
        method: "GET".to_string(),
        url: url.to_string(),
        headers: headers_from_pairs([("Host", "example.com")]),
        content: None,
        timestamp: "2024-03-20T10:00:00+00:00".to_string(),
    };
    let response = ResponseRecord {
        status_code: StatusValue::Code(200),
        headers: headers_from_pairs([("Content-Type", "text/plain")]),
        content: Some("ok".to_string()),
    };
    NewEntry::new(request, response, Some(2))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, payload: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_responds_ok() {
    let dir = TempDir::new().unwrap();
    let app = router(test_state(&dir, "true"));

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn logs_listing_starts_empty() {
    let dir = TempDir::new().unwrap();
    let app = router(test_state(&dir, "true"));

    let response = app.oneshot(get("/api/proxy/logs")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["data"], json!([]));
}

#[tokio::test]
async fn logs_listing_returns_display_shaped_entries() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir, "true");
    state
        .store
        .append(sample_entry("http://example.com/page"))
        .await
        .unwrap();
    let app = router(state);

    let response = app.oneshot(get("/api/proxy/logs")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let entry = &json["data"][0];
    assert_eq!(entry["id"], 1);
    assert_eq!(entry["method"], "GET");
    assert_eq!(entry["url"], "http://example.com/page");
    assert_eq!(entry["status"], 200);
    assert_eq!(entry["request"]["method"], "GET");
    assert_eq!(entry["response"]["content"], "ok");
}

#[tokio::test]
async fn delete_removes_one_entry_and_tolerates_unknown_ids() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir, "true");
    state
        .store
        .append(sample_entry("http://example.com/a"))
        .await
        .unwrap();
    state
        .store
        .append(sample_entry("http://example.com/b"))
        .await
        .unwrap();
    let app = router(state.clone());

    let request = Request::builder()
        .method("DELETE")
        .uri("/api/proxy/logs/1")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let entries = state.store.load_all().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, 2);

    // Unknown ids are a no-op, not an error.
    let request = Request::builder()
        .method("DELETE")
        .uri("/api/proxy/logs/99")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn settings_update_applies_sparse_patches() {
    let dir = TempDir::new().unwrap();
    let app = router(test_state(&dir, "true"));

    let response = app.clone().oneshot(get("/api/settings")).await.unwrap();
    let json = body_json(response).await;
    assert_eq!(json["proxy_port"], 8080);
    assert_eq!(json["debug_level"], "DEBUG");

    // debug_level is not an engine field, so no restart happens and the
    // broken engine binary never matters.
    let response = app
        .clone()
        .oneshot(post_json("/api/settings", json!({"debug_level": "ERROR"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["debug_level"], "ERROR");
    assert_eq!(json["proxy_port"], 8080);

    let response = app.oneshot(get("/api/settings")).await.unwrap();
    let json = body_json(response).await;
    assert_eq!(json["debug_level"], "ERROR");
}

#[tokio::test]
async fn settings_update_rejects_unknown_fields() {
    let dir = TempDir::new().unwrap();
    let app = router(test_state(&dir, "true"));

    let response = app
        .oneshot(post_json("/api/settings", json!({"bogus_field": 1})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn failed_engine_restart_reverts_the_settings_update() {
    let dir = TempDir::new().unwrap();
    let app = router(test_state(&dir, "proxywarden-nonexistent-engine"));

    let response = app
        .clone()
        .oneshot(post_json("/api/settings", json!({"proxy_port": 9090})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["code"], "settings_error");

    // The port change was rolled back.
    let response = app.oneshot(get("/api/settings")).await.unwrap();
    let json = body_json(response).await;
    assert_eq!(json["proxy_port"], 8080);
}

#[tokio::test]
async fn session_export_import_round_trips() {
    let source_dir = TempDir::new().unwrap();
    let source = test_state(&source_dir, "true");
    source
        .store
        .append(sample_entry("http://example.com/a"))
        .await
        .unwrap();
    source
        .store
        .append(sample_entry("http://example.com/b"))
        .await
        .unwrap();
    let original = source.store.load_all().await.unwrap();

    let response = router(source)
        .oneshot(post_json("/api/session/export", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let export = body_json(response).await;
    assert_eq!(export["logs"].as_array().unwrap().len(), 2);
    assert!(export["timestamp"].is_string());

    let target_dir = TempDir::new().unwrap();
    let target = test_state(&target_dir, "true");
    let response = router(target.clone())
        .oneshot(post_json("/api/session/import", export))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["message"], "Session imported successfully");

    assert_eq!(target.store.load_all().await.unwrap(), original);
}

#[tokio::test]
async fn session_import_rejects_malformed_entries_wholesale() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir, "true");
    state
        .store
        .append(sample_entry("http://example.com/keep"))
        .await
        .unwrap();
    let app = router(state.clone());

    let payload = json!({
        "logs": [
            {"id": 1, "timestamp": "2024-03-20T10:00:00+00:00"}
        ]
    });
    let response = app
        .oneshot(post_json("/api/session/import", payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "invalid_session");

    // The existing history was left alone.
    let entries = state.store.load_all().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].request.url, "http://example.com/keep");
}

#[tokio::test]
async fn repeater_rejects_requests_without_a_url() {
    let dir = TempDir::new().unwrap();
    let app = router(test_state(&dir, "true"));

    let response = app
        .oneshot(post_json(
            "/api/repeater/send",
            json!({"method": "GET", "url": ""}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "replay_error");
}

#[cfg(unix)]
mod with_fake_engine {
    use super::*;

    /// A fake engine that records each launch, then idles like the real one.
    fn counting_engine(dir: &TempDir) -> (String, std::path::PathBuf) {
        use std::os::unix::fs::PermissionsExt;

        let counter = dir.path().join("starts.txt");
        let script = dir.path().join("fake-engine");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\necho started >> {}\nexec sleep 30\n",
                counter.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        (script.display().to_string(), counter)
    }

    fn starts(counter: &std::path::Path) -> usize {
        std::fs::read_to_string(counter)
            .map(|contents| contents.lines().count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn clear_empties_history_and_restarts_the_engine_once() {
        let dir = TempDir::new().unwrap();
        let (bin, counter) = counting_engine(&dir);
        let state = test_state(&dir, &bin);
        for n in 0..10 {
            state
                .store
                .append(sample_entry(&format!("http://example.com/{n}")))
                .await
                .unwrap();
        }
        let app = router(state.clone());

        let response = app
            .oneshot(post_json("/api/proxy/clear", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["message"], "Proxy logs cleared");

        assert_eq!(state.store.load_all().await.unwrap(), vec![]);
        assert_eq!(starts(&counter), 1);

        state.supervisor.stop().await.unwrap();
    }
}
