//! Route table
//!
//! Transport-independent request handling: a method, path and raw query go
//! in, a status, content type and body come out. The hyper glue in the
//! parent module only converts to and from wire types.

use std::borrow::Cow;

use bytes::Bytes;
use hyper::{Method, StatusCode};
use serde::Serialize;
use tracing::{error, warn};

use crate::domain::ports::EntityId;
use crate::engine::LeaderboardEngine;
use crate::error::{Error, Result};

const JSON: &str = "application/json";
const TEXT: &str = "text/plain; charset=utf-8";

/// A response ready to put on the wire.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub content_type: String,
    pub body: Bytes,
}

impl ApiResponse {
    fn text(status: StatusCode, body: &'static str) -> Self {
        Self {
            status,
            content_type: TEXT.to_string(),
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    fn json<T: Serialize>(status: StatusCode, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self {
                status,
                content_type: JSON.to_string(),
                body: Bytes::from(body),
            },
            Err(e) => {
                error!(error = %e, "Failed to encode response body");
                Self::text(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        }
    }

    fn error(e: &Error) -> Self {
        let status = status_for(e);
        if status.is_server_error() {
            warn!(error = %e, status = status.as_u16(), "Request failed");
        }

        let message = if e.is_user_facing() {
            Cow::Owned(e.to_string())
        } else {
            Cow::Borrowed("leaderboard request failed")
        };

        Self::json(
            status,
            &ErrorBody {
                error: message,
                retryable: e.is_retryable(),
            },
        )
    }

    /// Body as UTF-8, for tests and logs
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: Cow<'a, str>,
    retryable: bool,
}

/// HTTP status for an engine error.
pub fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::RebuildInProgress => StatusCode::CONFLICT,
        Error::CacheUnavailable(_) | Error::ScoreStore(_) | Error::DerivedCounts { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Route one request.
pub async fn handle(
    engine: &LeaderboardEngine,
    method: &Method,
    path: &str,
    query: Option<&str>,
) -> ApiResponse {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match (method, segments.as_slice()) {
        (&Method::GET, ["leaderboard"]) => respond(get_page(engine, query).await),
        (&Method::POST, ["leaderboard", "update", raw_id]) => {
            respond(update(engine, raw_id).await)
        }
        (&Method::POST, ["leaderboard", "rebuild"]) => respond(engine.rebuild().await),
        (&Method::GET, ["leaderboard", "stats"]) => {
            ApiResponse::json(StatusCode::OK, &engine.stats())
        }
        (&Method::GET, ["healthz"]) | (&Method::GET, ["livez"]) => {
            ApiResponse::text(StatusCode::OK, "ok")
        }
        (&Method::GET, ["readyz"]) => {
            if engine.is_ready().await {
                ApiResponse::text(StatusCode::OK, "ok")
            } else {
                ApiResponse::text(StatusCode::SERVICE_UNAVAILABLE, "not ready")
            }
        }
        (&Method::GET, ["metrics"]) => match engine.metrics().encode() {
            Ok((content_type, body)) => ApiResponse {
                status: StatusCode::OK,
                content_type,
                body: Bytes::from(body),
            },
            Err(e) => ApiResponse::error(&e),
        },
        (_, ["leaderboard"])
        | (_, ["leaderboard", "update", _])
        | (_, ["leaderboard", "rebuild"])
        | (_, ["leaderboard", "stats"]) => {
            ApiResponse::text(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
        }
        _ => ApiResponse::text(StatusCode::NOT_FOUND, "not found"),
    }
}

fn respond<T: Serialize>(result: Result<T>) -> ApiResponse {
    match result {
        Ok(value) => ApiResponse::json(StatusCode::OK, &value),
        Err(e) => ApiResponse::error(&e),
    }
}

async fn get_page(
    engine: &LeaderboardEngine,
    query: Option<&str>,
) -> Result<crate::engine::PageResponse> {
    let page = query_param(query, "page")?;
    let limit = query_param(query, "limit")?;
    let query = engine.page_query(page, limit)?;
    engine.get_page(query.page(), query.limit()).await
}

async fn update(
    engine: &LeaderboardEngine,
    raw_id: &str,
) -> Result<crate::engine::UpdateSummary> {
    let decoded = urlencoding::decode(raw_id)
        .map_err(|_| Error::Validation("entity id is not valid UTF-8".into()))?;
    let entity_id = EntityId::parse(&decoded)?;
    engine.update(&entity_id).await
}

/// First value of `name` in a raw query string, as a number.
fn query_param(query: Option<&str>, name: &str) -> Result<Option<u64>> {
    let Some(query) = query else {
        return Ok(None);
    };

    for pair in query.split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if key != name {
            continue;
        }

        let value = urlencoding::decode(value)
            .map_err(|_| Error::Validation(format!("{} is not valid UTF-8", name)))?;
        return value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| Error::Validation(format!("{} must be a positive integer", name)));
    }

    Ok(None)
}
