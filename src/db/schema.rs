//! SQL DDL for initializing the database schema.
//! SQLite-first design; can be adapted for other RDBMS.

/// SQLite schema includes:
/// - `artists` table (tenants; optional chosen calendar id)
/// - `oauth_credentials` table (at most one row per artist, CAS-guarded by `generation`)
/// - `services` table (catalogue with base price in minor currency units)
/// - `service_overrides` table (one (artist_id, service_id) per row)
pub const SQLITE_INIT: &str = r"
-- ---------------------------------------------------------------------------
-- Artists
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS artists (
    id INTEGER PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    linked_calendar_id TEXT NULL,
    -- High-water mark for oauth_credentials.generation, survives unlink and relink.
    credential_generation INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL, -- RFC3339
    updated_at TEXT NOT NULL -- RFC3339
);

-- ---------------------------------------------------------------------------
-- OAuth credentials (one row per artist)
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS oauth_credentials (
    artist_id INTEGER PRIMARY KEY NOT NULL REFERENCES artists(id) ON DELETE CASCADE,
    access_token TEXT NOT NULL,
    refresh_token TEXT NULL,
    expiry TEXT NOT NULL, -- RFC3339
    scope TEXT NOT NULL,
    generation INTEGER NOT NULL,
    created_at TEXT NOT NULL, -- RFC3339
    updated_at TEXT NOT NULL -- RFC3339
);

-- ---------------------------------------------------------------------------
-- Services
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS services (
    id INTEGER PRIMARY KEY NOT NULL,
    title TEXT NOT NULL,
    slug TEXT NOT NULL UNIQUE,
    base_price INTEGER NULL CHECK (base_price IS NULL OR typeof(base_price) = 'integer'),
    duration_minutes INTEGER NULL CHECK (duration_minutes IS NULL OR typeof(duration_minutes) = 'integer'),
    buffer_before_minutes INTEGER NULL CHECK (buffer_before_minutes IS NULL OR typeof(buffer_before_minutes) = 'integer'),
    buffer_after_minutes INTEGER NULL CHECK (buffer_after_minutes IS NULL OR typeof(buffer_after_minutes) = 'integer'),
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL, -- RFC3339
    updated_at TEXT NOT NULL -- RFC3339
);

CREATE INDEX IF NOT EXISTS idx_services_active ON services(active);

-- ---------------------------------------------------------------------------
-- Per-artist service overrides (one (artist_id, service_id) per row)
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS service_overrides (
    id INTEGER PRIMARY KEY NOT NULL,
    artist_id INTEGER NOT NULL REFERENCES artists(id) ON DELETE CASCADE,
    service_id INTEGER NOT NULL REFERENCES services(id) ON DELETE CASCADE,
    price INTEGER NULL CHECK (price IS NULL OR typeof(price) = 'integer'),
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL, -- RFC3339
    updated_at TEXT NOT NULL, -- RFC3339
    UNIQUE(artist_id, service_id)
);
";
