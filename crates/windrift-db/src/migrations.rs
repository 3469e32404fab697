use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS notes (
            id              TEXT PRIMARY KEY,
            sender_id       TEXT NOT NULL,
            content         TEXT NOT NULL,
            is_anonymous    INTEGER NOT NULL DEFAULT 0,
            origin_lat      REAL NOT NULL,
            origin_lon      REAL NOT NULL,
            current_lat     REAL NOT NULL,
            current_lon     REAL NOT NULL,
            journey_path    TEXT NOT NULL,
            status          TEXT NOT NULL DEFAULT 'active',
            created_at      TEXT NOT NULL,
            expires_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_notes_status
            ON notes(status);

        CREATE TABLE IF NOT EXISTS users (
            id                  TEXT PRIMARY KEY,
            display_name        TEXT,
            home_zip_code       TEXT,
            uses_live_location  INTEGER NOT NULL DEFAULT 0,
            current_lat         REAL,
            current_lon         REAL,
            push_token          TEXT
        );

        CREATE TABLE IF NOT EXISTS encounters (
            id              TEXT PRIMARY KEY,
            note_id         TEXT NOT NULL REFERENCES notes(id),
            user_id         TEXT NOT NULL REFERENCES users(id),
            distance_miles  REAL NOT NULL,
            was_tapped      INTEGER NOT NULL DEFAULT 0,
            encountered_at  TEXT NOT NULL,
            UNIQUE(note_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_encounters_note
            ON encounters(note_id);

        CREATE TABLE IF NOT EXISTS zip_codes (
            zip_code      TEXT PRIMARY KEY,
            city          TEXT NOT NULL,
            state_code    TEXT NOT NULL,
            lat           REAL NOT NULL,
            lon           REAL NOT NULL,
            population    INTEGER NOT NULL DEFAULT 0,
            is_inhabited  INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_zip_codes_position
            ON zip_codes(lat, lon);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
