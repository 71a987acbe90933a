//! Classification and enrichment of inbound hits.
//!
//! Admission (IP reputation and rate limiting) has already happened by the
//! time a hit reaches [`EventPipeline::process`]. Everything here runs before
//! the single storage write at the end of each branch, so a request that is
//! dropped mid-flight never persists a partial record.

pub mod geo;
pub mod language;
pub mod useragent;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

use tally_core::event::{CustomEventHit, CustomHit, Hit, LoadHit, PageViewDuration, PageViewHit, UnloadHit};
use tally_core::store::EventStore;
use tally_core::{CoreError, ReferrerClassifier};
use tally_metadata::WebsiteRegistry;

use self::geo::GeoLocator;
use self::language::parse_accept_language;
use self::useragent::UserAgentParser;

/// Stored in place of any attribute that could not be resolved.
pub const UNKNOWN: &str = "Unknown";

/// Unresolved user-agent fields plus an unusable `Accept-Language` header.
/// Reaching this many marks the client as an undeclared bot.
pub const UNKNOWN_SIGNAL_THRESHOLD: u32 = 2;

/// `Last-Modified` / `If-Modified-Since` format.
pub const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("storage failure: {0}")]
    Storage(#[source] anyhow::Error),
}

impl From<CoreError> for PipelineError {
    fn from(e: CoreError) -> Self {
        PipelineError::Validation(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    Bot,
    UnknownAgent,
    SpamReferrer,
}

impl DiscardReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DiscardReason::Bot => "bot",
            DiscardReason::UnknownAgent => "unknown_agent",
            DiscardReason::SpamReferrer => "spam_referrer",
        }
    }
}

/// A successful hit either changed the store or was deliberately ignored.
/// Callers answer both the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitOutcome {
    Stored,
    Updated,
    Discarded(DiscardReason),
}

/// Request headers the pipeline classifies on.
#[derive(Debug, Clone, Default)]
pub struct ClientHints {
    pub user_agent: String,
    pub accept_language: Option<String>,
}

pub struct EventPipeline {
    store: Arc<dyn EventStore>,
    registry: Arc<dyn WebsiteRegistry>,
    referrers: ReferrerClassifier,
    user_agents: Arc<dyn UserAgentParser>,
    geo: Arc<dyn GeoLocator>,
    /// Registered hostnames seen so far. Misses always go to the registry so
    /// a site registered at runtime is picked up on its first hit.
    known_hostnames: RwLock<HashSet<String>>,
}

impl EventPipeline {
    pub fn new(
        store: Arc<dyn EventStore>,
        registry: Arc<dyn WebsiteRegistry>,
        referrers: ReferrerClassifier,
        user_agents: Arc<dyn UserAgentParser>,
        geo: Arc<dyn GeoLocator>,
    ) -> Self {
        Self {
            store,
            registry,
            referrers,
            user_agents,
            geo,
            known_hostnames: RwLock::new(HashSet::new()),
        }
    }

    #[tracing::instrument(skip_all, fields(kind = hit.kind()))]
    pub async fn process(&self, hit: Hit, hints: &ClientHints) -> Result<HitOutcome, PipelineError> {
        let outcome = match hit {
            Hit::Load(load) => self.load(load, hints, Utc::now()).await?,
            Hit::Unload(unload) => self.unload(unload).await?,
            Hit::Custom(custom) => self.custom(custom, Utc::now()).await?,
        };
        if let HitOutcome::Discarded(reason) = outcome {
            debug!(reason = reason.as_str(), "Hit discarded");
        }
        Ok(outcome)
    }

    /// Cache first, then the registry. Only positive answers are cached.
    pub async fn is_registered(&self, hostname: &str) -> Result<bool, PipelineError> {
        {
            let known = self.known_hostnames.read().await;
            if known.contains(hostname) {
                return Ok(true);
            }
        }

        let registered = self
            .registry
            .is_registered_hostname(hostname)
            .await
            .map_err(PipelineError::Storage)?;
        if registered {
            self.known_hostnames.write().await.insert(hostname.to_string());
        }
        Ok(registered)
    }

    async fn require_registered(&self, hostname: &str) -> Result<(), PipelineError> {
        if self.is_registered(hostname).await? {
            Ok(())
        } else {
            Err(PipelineError::NotFound(format!("unknown website: {hostname}")))
        }
    }

    async fn load(
        &self,
        hit: LoadHit,
        hints: &ClientHints,
        now: DateTime<Utc>,
    ) -> Result<HitOutcome, PipelineError> {
        if hit.beacon_id.trim().is_empty() {
            return Err(PipelineError::Validation("beacon id is required".to_string()));
        }

        let url = Url::parse(&hit.url).map_err(CoreError::from)?;
        let hostname = url
            .host_str()
            .filter(|h| !h.is_empty())
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| PipelineError::Validation(format!("page url has no host: {}", hit.url)))?;

        self.require_registered(&hostname).await?;
        let pathname = normalize_pathname(url.path());

        let agent = self.user_agents.parse(&hints.user_agent);
        if agent.is_bot {
            return Ok(HitOutcome::Discarded(DiscardReason::Bot));
        }
        let mut unknown_signals = agent.unresolved_fields();

        let language = match parse_accept_language(hints.accept_language.as_deref()) {
            Ok(language) => Some(language),
            Err(e) => {
                debug!(error = %e, "Accept-Language not usable");
                unknown_signals += 1;
                None
            }
        };

        if unknown_signals >= UNKNOWN_SIGNAL_THRESHOLD {
            return Ok(HitOutcome::Discarded(DiscardReason::UnknownAgent));
        }

        let country = match hit.timezone.as_deref().filter(|tz| !tz.is_empty()) {
            Some(tz) => self.geo.country_for_timezone(tz).unwrap_or_else(|e| {
                debug!(timezone = tz, error = %e, "No country for timezone");
                UNKNOWN.to_string()
            }),
            None => UNKNOWN.to_string(),
        };

        let referrer = self
            .referrers
            .parse(hit.referrer.as_deref().unwrap_or_default(), &hostname)
            .map_err(|e| PipelineError::Validation(e.to_string()))?;
        if referrer.is_spam {
            return Ok(HitOutcome::Discarded(DiscardReason::SpamReferrer));
        }

        let properties = match hit.properties.as_ref().filter(|p| !p.is_empty()) {
            Some(props) => CustomEventHit::from_properties(
                &new_batch_id(),
                &hostname,
                Some(&hit.beacon_id),
                props,
                now,
            )?,
            None => Vec::new(),
        };

        let (language_base, language_dialect) = match language {
            Some(l) => (l.base, l.dialect),
            None => (UNKNOWN.to_string(), UNKNOWN.to_string()),
        };
        let unknown = || UNKNOWN.to_string();

        let view = PageViewHit {
            bid: hit.beacon_id,
            hostname,
            pathname,
            is_unique_user: hit.is_unique_user,
            is_unique_page: hit.is_unique_page,
            referrer_host: referrer.host,
            referrer_group: referrer.group,
            country,
            language_base,
            language_dialect,
            ua_browser: agent.browser.unwrap_or_else(unknown),
            ua_os: agent.os.unwrap_or_else(unknown),
            ua_device_type: agent.device.map(|d| d.as_str().to_string()).unwrap_or_else(unknown),
            utm_source: query_param(&url, "utm_source"),
            utm_medium: query_param(&url, "utm_medium"),
            utm_campaign: query_param(&url, "utm_campaign"),
            date_created: now,
        };

        self.store
            .append_page_view(&view, &properties)
            .await
            .map_err(PipelineError::Storage)?;
        debug!(
            bid = %view.bid,
            hostname = %view.hostname,
            pathname = %view.pathname,
            properties = properties.len(),
            "Stored page view"
        );
        Ok(HitOutcome::Stored)
    }

    async fn unload(&self, hit: UnloadHit) -> Result<HitOutcome, PipelineError> {
        if hit.beacon_id.trim().is_empty() {
            return Err(PipelineError::Validation("beacon id is required".to_string()));
        }
        if hit.duration_ms < 0 {
            return Err(PipelineError::Validation(format!(
                "duration must not be negative: {}",
                hit.duration_ms
            )));
        }

        let update = PageViewDuration {
            bid: hit.beacon_id,
            duration_ms: hit.duration_ms,
        };
        self.store
            .update_duration(&update)
            .await
            .map_err(PipelineError::Storage)?;
        Ok(HitOutcome::Updated)
    }

    async fn custom(&self, hit: CustomHit, now: DateTime<Utc>) -> Result<HitOutcome, PipelineError> {
        if hit.properties.is_empty() {
            return Err(PipelineError::Validation(
                "custom event needs at least one property".to_string(),
            ));
        }
        let group = hit.group.trim().to_ascii_lowercase();
        if group.is_empty() {
            return Err(PipelineError::Validation("group is required".to_string()));
        }

        self.require_registered(&group).await?;

        let bid = hit.beacon_id.as_deref().filter(|b| !b.is_empty());
        let events = CustomEventHit::from_properties(&new_batch_id(), &group, bid, &hit.properties, now)?;
        self.store
            .append_custom_events(&events)
            .await
            .map_err(PipelineError::Storage)?;
        Ok(HitOutcome::Stored)
    }
}

fn new_batch_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Trailing slashes are dropped except for the root; an empty path is the root.
pub fn normalize_pathname(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

fn query_param(url: &Url, name: &str) -> String {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default()
}

/// Answer to a uniqueness probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingOutcome {
    pub is_unique: bool,
    pub last_modified: String,
}

impl PingOutcome {
    /// `0` for a first visit today, `1` otherwise.
    pub fn body(&self) -> &'static str {
        if self.is_unique {
            "0"
        } else {
            "1"
        }
    }
}

/// Decide whether the client has already been seen today from the
/// `If-Modified-Since` value its cache sent back. Never touches storage.
pub fn ping(if_modified_since: Option<&str>, now: DateTime<Utc>) -> Result<PingOutcome, PipelineError> {
    let start_of_day = now.date_naive().and_time(NaiveTime::MIN).and_utc();
    let first_visit = PingOutcome {
        is_unique: true,
        last_modified: start_of_day.format(HTTP_DATE_FORMAT).to_string(),
    };

    let Some(raw) = if_modified_since.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(first_visit);
    };

    let seen = DateTime::parse_from_rfc2822(raw)
        .map_err(|e| PipelineError::Validation(format!("invalid If-Modified-Since header: {e}")))?
        .with_timezone(&Utc);

    if seen < start_of_day {
        Ok(first_visit)
    } else {
        // Repeat visits get a stamp one second past the one sent.
        Ok(PingOutcome {
            is_unique: false,
            last_modified: (seen + TimeDelta::seconds(1))
                .format(HTTP_DATE_FORMAT)
                .to_string(),
        })
    }
}
