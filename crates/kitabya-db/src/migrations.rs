use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                subject         TEXT UNIQUE,
                email           TEXT NOT NULL UNIQUE,
                name            TEXT NOT NULL,
                photo_url       TEXT,
                location        TEXT,
                date_of_birth   TEXT,
                is_admin        INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE TABLE listings (
                id                  TEXT PRIMARY KEY,
                owner_id            TEXT NOT NULL REFERENCES users(id),
                title               TEXT NOT NULL,
                price               REAL NOT NULL CHECK (price >= 0),
                condition           TEXT NOT NULL,
                listing_type        TEXT NOT NULL,
                language            TEXT NOT NULL,
                description         TEXT NOT NULL,
                title_search        TEXT NOT NULL,
                description_search  TEXT NOT NULL,
                category_id         TEXT,
                sub_category_id     TEXT,
                location_address    TEXT NOT NULL,
                location_latitude   REAL,
                location_longitude  REAL,
                images              TEXT NOT NULL DEFAULT '[]',
                view_count          INTEGER NOT NULL DEFAULT 0 CHECK (view_count >= 0),
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL
            );

            CREATE INDEX idx_listings_owner ON listings(owner_id, created_at);
            CREATE INDEX idx_listings_created ON listings(created_at);
            CREATE INDEX idx_listings_views ON listings(view_count);

            CREATE TABLE recent_searches (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                listing_id  TEXT NOT NULL REFERENCES listings(id) ON DELETE CASCADE,
                searched_at TEXT NOT NULL,
                UNIQUE(user_id, listing_id)
            );

            CREATE INDEX idx_recent_searches_user ON recent_searches(user_id, searched_at);
            CREATE INDEX idx_recent_searches_age ON recent_searches(searched_at);

            CREATE TABLE reports (
                id              TEXT PRIMARY KEY,
                listing_id      TEXT NOT NULL REFERENCES listings(id) ON DELETE CASCADE,
                reporter_id     TEXT NOT NULL REFERENCES users(id),
                reason          TEXT NOT NULL
                    CHECK (reason IN ('inappropriate', 'spam', 'fake', 'offensive', 'other')),
                description     TEXT NOT NULL,
                status          TEXT NOT NULL DEFAULT 'pending'
                    CHECK (status IN ('pending', 'reviewed', 'resolved')),
                admin_comment   TEXT,
                reviewed_by     TEXT,
                reviewed_at     TEXT,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL,
                UNIQUE(listing_id, reporter_id)
            );

            CREATE INDEX idx_reports_listing ON reports(listing_id, created_at);

            CREATE TABLE broadcasts (
                id          TEXT PRIMARY KEY,
                title       TEXT NOT NULL,
                body        TEXT NOT NULL,
                data        TEXT NOT NULL DEFAULT '{}',
                sent_by     TEXT NOT NULL,
                message_id  TEXT,
                status      TEXT NOT NULL CHECK (status IN ('sent', 'failed')),
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_broadcasts_created ON broadcasts(created_at);

            CREATE TABLE questionnaires (
                id              TEXT PRIMARY KEY,
                user_id         TEXT NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
                profession      TEXT NOT NULL,
                books_interest  TEXT NOT NULL DEFAULT '[]',
                age_range       TEXT NOT NULL
                    CHECK (age_range IN ('13-17', '18-24', '25-34', '35-44', '45-54', '55+')),
                city            TEXT NOT NULL,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
