//! Route configuration for the logscope API.

use std::sync::Arc;

use axum::routing::{get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::handlers::{health_check, search_entries};
use crate::state::ServerState;
use crate::websocket::live_upgrade;

/// Create the API router.
pub fn create_router(state: Arc<ServerState>) -> Router {
    let cors = build_cors_layer(state.config());

    Router::new()
        .route("/health", get(health_check))
        .route("/entries/search", get(search_entries))
        .route("/entries/live", get(live_upgrade))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    if config.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::make_test_state;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use chrono::{TimeZone, Utc};
    use http_body_util::BodyExt;
    use logscope_core::{Level, LogEntry, LogIndex};
    use tower::ServiceExt;

    fn make_test_app() -> (Router, Arc<LogIndex>) {
        let (state, index) = make_test_state(ServerConfig::default());
        (create_router(state), index)
    }

    fn seed(index: &LogIndex, n: i64) {
        for i in 0..n {
            let ts = Utc.timestamp_opt(1_700_000_000 + i, 0).unwrap();
            let level = if i % 2 == 0 { Level::Info } else { Level::Error };
            index
                .add(
                    &LogEntry::new(format!("request {i}"))
                        .with_timestamp(ts)
                        .with_level(level)
                        .with_field("n", i),
                )
                .unwrap();
        }
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (app, index) = make_test_app();
        seed(&index, 3);

        let (status, json) = get_json(app, "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["entries"], 3);
    }

    #[tokio::test]
    async fn test_search_endpoint_defaults() {
        let (app, index) = make_test_app();
        seed(&index, 20);

        let (status, json) = get_json(app, "/entries/search").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["count"], 20);
        let entries = json["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 15);
        assert_eq!(entries[0]["message"], "request 19");
        assert!(entries[0]["$id"].is_string());
        assert_eq!(entries[0]["fields"][0]["key"], "n");
        assert_eq!(entries[0]["fields"][0]["value"], "19");
    }

    #[tokio::test]
    async fn test_search_endpoint_with_params() {
        let (app, index) = make_test_app();
        seed(&index, 10);

        let uri = "/entries/search?since=2023-11-14T22:13:22Z&until=2023-11-14T22:13:27Z&q=level:error&pageSize=100";
        let (status, json) = get_json(app, uri).await;

        assert_eq!(status, StatusCode::OK);
        // Seconds 2..=7 hold entries 2..=7, of which 3, 5 and 7 are errors.
        assert_eq!(json["count"], 3);
        let messages: Vec<_> = json["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["message"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(messages, ["request 7", "request 5", "request 3"]);
    }

    #[tokio::test]
    async fn test_search_endpoint_bad_since() {
        let (app, _) = make_test_app();

        let (status, json) = get_json(app, "/entries/search?since=yesterday").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "invalid_request");
    }

    #[tokio::test]
    async fn test_search_endpoint_bad_page_size() {
        let (app, _) = make_test_app();

        let (status, _) = get_json(app, "/entries/search?pageSize=lots").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_search_endpoint_bad_query() {
        let (app, _) = make_test_app();

        let (status, json) = get_json(app, "/entries/search?q=nosuchfield:x").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "invalid_query");
    }

    #[tokio::test]
    async fn test_live_requires_upgrade() {
        let (app, _) = make_test_app();

        let request = Request::builder()
            .uri("/entries/live")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin_by_default() {
        let (app, _) = make_test_app();

        let request = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "http://example.com")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
    }

    #[tokio::test]
    async fn test_not_found() {
        let (app, _) = make_test_app();

        let request = Request::builder()
            .uri("/nonexistent")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
