use std::sync::Arc;

use axum::{
    http::HeaderValue,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{admission, routes, state::AppState};

/// Construct the Axum [`Router`] with all routes and middleware attached.
///
/// The two event routes sit behind the admission gate (IP filter, then rate
/// limiter). Layers, innermost first:
///
/// 1. `CompressionLayer`: gzip for clients that accept it.
/// 2. `TraceLayer`: structured request/response logging via `tracing`.
/// 3. `CorsLayer`: the tracker runs on third-party sites, so CORS is open
///    unless `TALLY_CORS_ORIGINS` narrows it.
pub fn build_app(state: Arc<AppState>) -> Router {
    let events = Router::new()
        .route("/api/event/hit", post(routes::event::hit))
        .route("/api/event/ping", get(routes::event::ping))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            admission::admit,
        ));

    Router::new()
        .route("/health", get(routes::health::health))
        .route("/api/website/{hostname}/{report}", get(routes::stats::report))
        .merge(events)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(allowed)
    }
}
