use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Custom properties as sent by the tracker: flat key → scalar JSON value.
pub type PropertyMap = BTreeMap<String, serde_json::Value>;

/// The body the tracker sends to `POST /api/event/hit`.
///
/// Field names are the tracker's single-letter wire keys; the `e` field selects
/// the variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "e", rename_all = "lowercase")]
pub enum Hit {
    Load(LoadHit),
    Unload(UnloadHit),
    Custom(CustomHit),
}

impl Hit {
    pub fn kind(&self) -> &'static str {
        match self {
            Hit::Load(_) => "load",
            Hit::Unload(_) => "unload",
            Hit::Custom(_) => "custom",
        }
    }
}

/// First beacon of a page view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadHit {
    #[serde(rename = "b")]
    pub beacon_id: String,
    #[serde(rename = "u")]
    pub url: String,
    #[serde(rename = "r", default)]
    pub referrer: Option<String>,
    /// First visit to the site today, computed by the tracker from the ping probe.
    #[serde(rename = "p", default)]
    pub is_unique_user: bool,
    /// First visit to this page today.
    #[serde(rename = "q", default)]
    pub is_unique_page: bool,
    /// IANA timezone reported by the browser, used for country detection.
    #[serde(rename = "t", default)]
    pub timezone: Option<String>,
    #[serde(rename = "d", default)]
    pub properties: Option<PropertyMap>,
}

/// Sent once when the page is hidden or unloaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnloadHit {
    #[serde(rename = "b")]
    pub beacon_id: String,
    #[serde(rename = "m")]
    pub duration_ms: i64,
}

/// Out-of-band property report, e.g. a tagged click.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomHit {
    /// Group name; the tracker always sends the page hostname.
    #[serde(rename = "g")]
    pub group: String,
    #[serde(rename = "d", default)]
    pub properties: PropertyMap,
    #[serde(rename = "b", default)]
    pub beacon_id: Option<String>,
}

/// The enriched, stored version of a page load; mirrors the `views` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageViewHit {
    pub bid: String,
    pub hostname: String,
    /// Never empty; `/` for the root.
    pub pathname: String,
    pub is_unique_user: bool,
    pub is_unique_page: bool,
    pub referrer_host: String,
    pub referrer_group: String,
    pub country: String,
    pub language_base: String,
    pub language_dialect: String,
    pub ua_browser: String,
    pub ua_os: String,
    pub ua_device_type: String,
    pub utm_source: String,
    pub utm_medium: String,
    pub utm_campaign: String,
    pub date_created: DateTime<Utc>,
}

/// Duration applied to an existing view on unload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageViewDuration {
    pub bid: String,
    pub duration_ms: i64,
}

/// One custom property key/value pair; mirrors the `events` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomEventHit {
    /// Shared by every property reported in the same call.
    pub batch_id: String,
    /// Beacon id of the page view the properties belong to, if any.
    pub bid: Option<String>,
    pub group_name: String,
    pub name: String,
    pub value: String,
    pub date_created: DateTime<Utc>,
}

impl CustomEventHit {
    /// Expand a property map into one row per key, all sharing `batch_id`.
    ///
    /// Fails on the first value that is not a string, number or boolean.
    pub fn from_properties(
        batch_id: &str,
        group_name: &str,
        bid: Option<&str>,
        properties: &PropertyMap,
        date_created: DateTime<Utc>,
    ) -> Result<Vec<CustomEventHit>, CoreError> {
        properties
            .iter()
            .map(|(name, value)| {
                Ok(CustomEventHit {
                    batch_id: batch_id.to_string(),
                    bid: bid.map(str::to_string),
                    group_name: group_name.to_string(),
                    name: name.clone(),
                    value: property_value_to_string(name, value)?,
                    date_created,
                })
            })
            .collect()
    }
}

fn property_value_to_string(name: &str, value: &serde_json::Value) -> Result<String, CoreError> {
    match value {
        serde_json::Value::String(s) => Ok(s.clone()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Bool(b) => Ok(b.to_string()),
        _ => Err(CoreError::InvalidPropertyValue(name.to_string())),
    }
}
