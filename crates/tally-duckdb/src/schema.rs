/// DuckDB schema.
///
/// Executed once at open time via `Connection::execute_batch`. Every
/// statement uses `IF NOT EXISTS` so it is safe to re-run on each startup.
///
/// Timestamps are UTC wall-clock `TIMESTAMP` values without an offset; query
/// parameters are bound as strings and cast with `CAST(? AS TIMESTAMP)`.
pub const SCHEMA_SQL: &str = r#"
-- ===========================================
-- WEBSITES
-- ===========================================
CREATE TABLE IF NOT EXISTS websites (
    hostname        VARCHAR PRIMARY KEY,
    name            VARCHAR NOT NULL,
    created_at      TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

-- ===========================================
-- VIEWS (one row per page load)
-- ===========================================
-- bid links the load beacon to its unload beacon and custom properties.
-- duration_ms stays NULL until the unload beacon arrives.
CREATE TABLE IF NOT EXISTS views (
    bid               VARCHAR NOT NULL,
    hostname          VARCHAR NOT NULL,
    pathname          VARCHAR NOT NULL,
    is_unique_user    BOOLEAN NOT NULL,
    is_unique_page    BOOLEAN NOT NULL,
    referrer_host     VARCHAR NOT NULL DEFAULT '',
    referrer_group    VARCHAR NOT NULL DEFAULT '',
    country           VARCHAR NOT NULL DEFAULT 'Unknown',
    language_base     VARCHAR NOT NULL DEFAULT 'Unknown',
    language_dialect  VARCHAR NOT NULL DEFAULT 'Unknown',
    ua_browser        VARCHAR NOT NULL DEFAULT 'Unknown',
    ua_os             VARCHAR NOT NULL DEFAULT 'Unknown',
    ua_device_type    VARCHAR NOT NULL DEFAULT 'Unknown',
    utm_source        VARCHAR NOT NULL DEFAULT '',
    utm_medium        VARCHAR NOT NULL DEFAULT '',
    utm_campaign      VARCHAR NOT NULL DEFAULT '',
    duration_ms       BIGINT,
    date_created      TIMESTAMP NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_views_bid           ON views(bid);
CREATE INDEX IF NOT EXISTS idx_views_hostname_date ON views(hostname, date_created);

-- ===========================================
-- EVENTS (one row per custom property)
-- ===========================================
-- batch_id groups properties reported in the same call.
-- bid is NULL for properties not tied to a page view.
CREATE TABLE IF NOT EXISTS events (
    batch_id        VARCHAR NOT NULL,
    bid             VARCHAR,
    group_name      VARCHAR NOT NULL,
    name            VARCHAR NOT NULL,
    value           VARCHAR NOT NULL,
    date_created    TIMESTAMP NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_events_bid        ON events(bid);
CREATE INDEX IF NOT EXISTS idx_events_group_date ON events(group_name, date_created);
"#;
