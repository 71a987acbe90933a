//! Referrer normalisation.
//!
//! A referrer URL becomes a bare host plus an optional canonical group such
//! as `Google` for every `google.*` search domain. Self-referrals and IP
//! literals collapse to "no referrer"; hosts on the spam list are flagged so
//! the caller can drop the hit.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::{Host, Url};

const REFERRERS_PRESET: &str = include_str!("../presets/referrers.csv");
const SPAMMERS_PRESET: &str = include_str!("../presets/spammers.txt");

#[derive(Debug, Error)]
pub enum ReferrerError {
    #[error("invalid referrer url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("invalid referrer preset: {0}")]
    Preset(#[from] csv::Error),
}

/// Outcome of classifying one referrer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Referrer {
    /// Empty when there is no attributable referrer.
    pub host: String,
    pub group: String,
    pub is_spam: bool,
}

#[derive(Debug, Deserialize)]
struct GroupRow {
    host: String,
    group: String,
}

#[derive(Debug, Default)]
pub struct ReferrerClassifier {
    groups: HashMap<String, String>,
    /// Keyed by the label in front of the public suffix, from `label.*` rows.
    wildcard_groups: HashMap<String, String>,
    spammers: HashSet<String>,
}

impl ReferrerClassifier {
    pub fn with_presets() -> Result<Self, ReferrerError> {
        Self::from_lists(REFERRERS_PRESET, SPAMMERS_PRESET)
    }

    /// `groups_csv` has a `host,group` header; a host of `name.*` matches
    /// `name` under any public suffix. `spammers` is one host per line.
    pub fn from_lists(groups_csv: &str, spammers: &str) -> Result<Self, ReferrerError> {
        let mut classifier = ReferrerClassifier::default();

        let mut reader = csv::Reader::from_reader(groups_csv.as_bytes());
        for row in reader.deserialize::<GroupRow>() {
            let row = row?;
            let host = row.host.trim().to_ascii_lowercase();
            if let Some(label) = host.strip_suffix(".*") {
                classifier.wildcard_groups.insert(label.to_string(), row.group);
            } else {
                classifier.groups.insert(host, row.group);
            }
        }

        classifier.spammers = spammers
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_ascii_lowercase)
            .collect();

        debug!(
            groups = classifier.groups.len() + classifier.wildcard_groups.len(),
            spammers = classifier.spammers.len(),
            "Loaded referrer presets"
        );
        Ok(classifier)
    }

    /// Classify `referrer` as seen on a page of `hostname`.
    pub fn parse(&self, referrer: &str, hostname: &str) -> Result<Referrer, ReferrerError> {
        if referrer.is_empty() {
            return Ok(Referrer::default());
        }

        let url = match Url::parse(referrer) {
            Ok(url) => url,
            // Scheme-less input carries no host to attribute.
            Err(url::ParseError::RelativeUrlWithoutBase) => return Ok(Referrer::default()),
            Err(e) => return Err(e.into()),
        };

        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_ascii_lowercase(),
            Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) | None => return Ok(Referrer::default()),
        };

        if host == hostname || is_ip_address(&host) {
            return Ok(Referrer::default());
        }

        if self.is_spam(&host) {
            return Ok(Referrer {
                host,
                group: String::new(),
                is_spam: true,
            });
        }

        let group = self.group_for(&host).unwrap_or_default();
        Ok(Referrer {
            host,
            group,
            is_spam: false,
        })
    }

    /// True for a listed host or any subdomain of one.
    pub fn is_spam(&self, host: &str) -> bool {
        parent_domains(host).any(|candidate| self.spammers.contains(candidate))
    }

    fn group_for(&self, host: &str) -> Option<String> {
        if let Some(group) = self.groups.get(host) {
            return Some(group.clone());
        }
        let bare = host.strip_prefix("www.").unwrap_or(host);
        if let Some(group) = self.groups.get(bare) {
            return Some(group.clone());
        }

        let registrable = psl::domain_str(bare)?;
        if let Some(group) = self.groups.get(registrable) {
            return Some(group.clone());
        }

        let suffix = psl::suffix_str(registrable)?;
        let label = registrable
            .strip_suffix(suffix)
            .map(|s| s.trim_end_matches('.'))?;
        self.wildcard_groups.get(label).cloned()
    }
}

/// `a.b.c` yields `a.b.c`, `b.c`, `c`.
fn parent_domains(host: &str) -> impl Iterator<Item = &str> {
    std::iter::successors(Some(host), |h| h.split_once('.').map(|(_, rest)| rest))
}

/// Cheap pre-check before a full parse: an IP literal starts with a digit or
/// contains a colon.
fn is_ip_address(host: &str) -> bool {
    let maybe_ip = host.starts_with(|c: char| c.is_ascii_digit()) || host.contains(':');
    maybe_ip
        && host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .is_ok()
}
