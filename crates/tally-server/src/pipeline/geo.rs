//! Country lookup from the browser-reported IANA timezone.
//!
//! Addresses are never geolocated; the timezone is coarse enough to give a
//! country without pinning down where a visitor is.

use std::collections::HashMap;

use chrono_tz::Tz;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

const TIMEZONES_PRESET: &str = include_str!("../../presets/timezones.csv");

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("unknown timezone: {0}")]
    InvalidTimezone(String),

    #[error("no country mapped for timezone {0}")]
    Unmapped(String),

    #[error("invalid timezone preset: {0}")]
    Preset(#[from] csv::Error),
}

pub trait GeoLocator: Send + Sync + 'static {
    fn country_for_timezone(&self, timezone: &str) -> Result<String, GeoError>;
}

#[derive(Debug, Deserialize)]
struct TimezoneRow {
    timezone: String,
    country: String,
}

/// Embedded timezone to country-name table.
#[derive(Debug, Default)]
pub struct TimezoneTable {
    countries: HashMap<String, String>,
}

impl TimezoneTable {
    pub fn with_presets() -> Result<Self, GeoError> {
        Self::from_csv(TIMEZONES_PRESET)
    }

    /// `csv` has a `timezone,code,country` header.
    pub fn from_csv(csv: &str) -> Result<Self, GeoError> {
        let mut reader = csv::Reader::from_reader(csv.as_bytes());
        let mut countries = HashMap::new();
        for row in reader.deserialize::<TimezoneRow>() {
            let row = row?;
            countries.insert(row.timezone.trim().to_string(), row.country);
        }
        debug!(count = countries.len(), "Loaded timezone presets");
        Ok(Self { countries })
    }
}

impl GeoLocator for TimezoneTable {
    fn country_for_timezone(&self, timezone: &str) -> Result<String, GeoError> {
        let tz: Tz = timezone
            .trim()
            .parse()
            .map_err(|_| GeoError::InvalidTimezone(timezone.to_string()))?;
        self.countries
            .get(tz.name())
            .cloned()
            .ok_or_else(|| GeoError::Unmapped(tz.name().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_timezones_map_to_countries() {
        let table = TimezoneTable::with_presets().expect("preset parses");
        assert_eq!(
            table.country_for_timezone("Europe/London").expect("mapped"),
            "United Kingdom"
        );
        assert_eq!(
            table.country_for_timezone("America/Chicago").expect("mapped"),
            "United States"
        );
        // Legacy aliases are still reported by older browsers.
        assert_eq!(table.country_for_timezone("Asia/Calcutta").expect("mapped"), "India");
    }

    #[test]
    fn bogus_timezone_is_rejected() {
        let table = TimezoneTable::with_presets().expect("preset parses");
        assert!(matches!(
            table.country_for_timezone("Mars/Olympus_Mons"),
            Err(GeoError::InvalidTimezone(_))
        ));
    }

    #[test]
    fn valid_but_unlisted_timezone_is_unmapped() {
        let table = TimezoneTable::from_csv("timezone,code,country\nEurope/Paris,FR,France\n")
            .expect("csv parses");
        assert!(matches!(
            table.country_for_timezone("Europe/Berlin"),
            Err(GeoError::Unmapped(_))
        ));
    }
}
