//! HTTP request handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use logscope_core::{SearchRequest, SearchResponse};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;

/// Query parameters of `GET /entries/search`.
///
/// Values are taken as text so malformed input yields a JSON error body.
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    /// Inclusive lower bound, RFC 3339.
    pub since: Option<String>,
    /// Inclusive upper bound, RFC 3339.
    pub until: Option<String>,
    /// Query string.
    pub q: Option<String>,
    /// Requested page size.
    #[serde(rename = "pageSize")]
    pub page_size: Option<String>,
}

impl SearchParams {
    /// Validates the parameters into a search request.
    pub fn into_request(self) -> ServerResult<SearchRequest> {
        Ok(SearchRequest {
            since: parse_instant("since", self.since.as_deref())?,
            until: parse_instant("until", self.until.as_deref())?,
            query: self.q.unwrap_or_default(),
            page_size: parse_page_size(self.page_size.as_deref())?,
        })
    }
}

fn parse_instant(name: &str, value: Option<&str>) -> ServerResult<Option<DateTime<Utc>>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| ServerError::InvalidRequest(format!("invalid {name} {raw:?}: {e}"))),
    }
}

fn parse_page_size(value: Option<&str>) -> ServerResult<i64> {
    match value.map(str::trim) {
        None | Some("") => Ok(0),
        Some(raw) => raw
            .parse()
            .map_err(|e| ServerError::InvalidRequest(format!("invalid pageSize {raw:?}: {e}"))),
    }
}

/// Handle GET /entries/search - one page of matching entries.
pub async fn search_entries(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<SearchParams>,
) -> ServerResult<Json<SearchResponse>> {
    let request = params.into_request()?;
    let searcher = state.searcher();

    let response = tokio::task::spawn_blocking(move || searcher.search(&request))
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))??;

    debug!(
        count = response.count,
        returned = response.entries.len(),
        elapsed_us = response.duration.as_micros(),
        "Served search"
    );
    Ok(Json(response))
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status message.
    pub status: String,
    /// Number of searchable entries.
    pub entries: u64,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
}

/// Handle GET /health - health check endpoint.
pub async fn health_check(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        entries: state.searcher().entries_count(),
        uptime_secs: state.uptime_secs(),
    })
}
