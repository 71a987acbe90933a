use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde_json::json;

use tally_core::analytics::{
    AnalyticsBackend, Dimension, FilterCondition, FilterOp, Interval, StatsFilter,
};

use crate::{error::AppError, state::AppState};

/// Query keys that are report options rather than filters.
const REPORT_OPTIONS: [&str; 3] = ["interval", "grouped", "property"];

/// `GET /api/website/{hostname}/{report}`: run one aggregation report.
///
/// Filters use `field[op]=value`, e.g. `pathname[starts_with]=/blog`.
/// `start` and `end` are RFC 3339 timestamps; `limit` and `offset` paginate.
#[tracing::instrument(skip(state, params))]
pub async fn report(
    State(state): State<Arc<AppState>>,
    Path((hostname, report)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let hostname = hostname.to_ascii_lowercase();
    if !state.pipeline.is_registered(&hostname).await? {
        return Err(AppError::NotFound("Website not found".to_string()));
    }

    let filter = parse_filter(&hostname, &params)?;
    let db = state.db.as_ref();

    let data = match report.as_str() {
        "summary" => json!(db.summary(&filter).await?),
        "intervals" => {
            let interval = match params.get("interval") {
                Some(raw) => raw
                    .parse::<Interval>()
                    .map_err(|e| AppError::BadRequest(e.to_string()))?,
                None => Interval::Day,
            };
            json!(db.intervals(&filter, interval).await?)
        }
        "pages" => json!(db.pages(&filter).await?),
        "referrers" => {
            let grouped = params
                .get("grouped")
                .map(|v| matches!(v.as_str(), "true" | "1"))
                .unwrap_or(false);
            json!(db.referrers(&filter, grouped).await?)
        }
        "time" => json!(db.time(&filter).await?),
        "properties" => {
            let property = params.get("property").map(String::as_str).filter(|p| !p.is_empty());
            json!(db.properties(&filter, property).await?)
        }
        other => match Dimension::from_report_name(other) {
            Some(dimension) => json!(db.dimension(&filter, dimension).await?),
            None => return Err(AppError::NotFound(format!("Unknown report: {other}"))),
        },
    };

    Ok(Json(json!({ "data": data })))
}

/// Build a [`StatsFilter`] from raw query parameters.
pub fn parse_filter(hostname: &str, params: &HashMap<String, String>) -> Result<StatsFilter, AppError> {
    let mut filter = StatsFilter::for_hostname(hostname);

    for (key, value) in params {
        match key.as_str() {
            "start" => filter.period_start = Some(parse_timestamp(key, value)?),
            "end" => filter.period_end = Some(parse_timestamp(key, value)?),
            "limit" => filter.limit = Some(parse_count(key, value)?),
            "offset" => filter.offset = Some(parse_count(key, value)?),
            k if REPORT_OPTIONS.contains(&k) => {}
            _ => {
                let (field, op) = split_filter_key(key)
                    .ok_or_else(|| AppError::BadRequest(format!("unknown parameter: {key}")))?;
                let condition = Some(FilterCondition::new(op, value));
                let slot = match field {
                    "pathname" => &mut filter.pathname,
                    "referrer" => &mut filter.referrer,
                    "utm_source" => &mut filter.utm_source,
                    "utm_medium" => &mut filter.utm_medium,
                    "utm_campaign" => &mut filter.utm_campaign,
                    "browser" => &mut filter.browser,
                    "os" => &mut filter.os,
                    "device" => &mut filter.device,
                    "country" => &mut filter.country,
                    "language" => &mut filter.language,
                    "prop_name" => &mut filter.property_name,
                    "prop_value" => &mut filter.property_value,
                    other => {
                        return Err(AppError::BadRequest(format!("unknown filter field: {other}")))
                    }
                };
                *slot = condition;
            }
        }
    }

    if let (Some(start), Some(end)) = (filter.period_start, filter.period_end) {
        if start > end {
            return Err(AppError::BadRequest("start must not be after end".to_string()));
        }
    }

    Ok(filter)
}

/// `pathname[eq]` → `("pathname", FilterOp::Eq)`.
fn split_filter_key(key: &str) -> Option<(&str, FilterOp)> {
    let (field, rest) = key.split_once('[')?;
    let op = rest.strip_suffix(']')?.parse().ok()?;
    Some((field, op))
}

fn parse_timestamp(key: &str, value: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| AppError::BadRequest(format!("{key} must be an RFC 3339 timestamp: {e}")))
}

fn parse_count(key: &str, value: &str) -> Result<i64, AppError> {
    value
        .parse::<i64>()
        .ok()
        .filter(|n| *n >= 0)
        .ok_or_else(|| AppError::BadRequest(format!("{key} must be a non-negative integer")))
}
