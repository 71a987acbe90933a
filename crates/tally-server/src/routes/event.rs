use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::Utc;

use tally_core::event::Hit;

use crate::{
    error::AppError,
    pipeline::{self, ClientHints},
    state::AppState,
};

/// `POST /api/event/hit`: record a load, unload or custom hit.
///
/// The tracker sends beacons as `text/plain` to avoid a CORS preflight, so
/// the body is read raw and decoded here rather than through `Json`.
///
/// Stored, updated and discarded hits all answer `204 No Content`.
#[tracing::instrument(skip(state, headers, body))]
pub async fn hit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let hit: Hit = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("invalid hit body: {e}")))?;

    let hints = ClientHints {
        user_agent: header_str(&headers, header::USER_AGENT)
            .unwrap_or_default()
            .to_string(),
        accept_language: header_str(&headers, header::ACCEPT_LANGUAGE).map(str::to_string),
    };

    state.pipeline.process(hit, &hints).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/event/ping`: uniqueness probe.
///
/// The browser caches the response and replays its `Last-Modified` value as
/// `If-Modified-Since`; the body tells the tracker whether today's visit is
/// the first one.
#[tracing::instrument(skip(headers))]
pub async fn ping(headers: HeaderMap) -> Result<impl IntoResponse, AppError> {
    let if_modified_since = match headers.get(header::IF_MODIFIED_SINCE) {
        Some(value) => Some(value.to_str().map_err(|_| {
            AppError::BadRequest("If-Modified-Since is not valid ASCII".to_string())
        })?),
        None => None,
    };

    let outcome = pipeline::ping(if_modified_since, Utc::now())?;
    Ok((
        StatusCode::OK,
        [
            (header::LAST_MODIFIED, outcome.last_modified.clone()),
            (header::CACHE_CONTROL, "no-cache".to_string()),
            (header::CONTENT_TYPE, "text/plain".to_string()),
        ],
        outcome.body(),
    ))
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
