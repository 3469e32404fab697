use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use crate::Database;
use windrift_types::{Coordinate, Encounter, Note, NoteStatus, User, Waypoint, ZipCode};

/// Raw note row — journey path and ids still in their stored text form.
struct NoteRow {
    id: String,
    sender_id: String,
    content: String,
    is_anonymous: bool,
    origin_lat: f64,
    origin_lon: f64,
    current_lat: f64,
    current_lon: f64,
    journey_path: String,
    status: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl NoteRow {
    fn into_note(self) -> Result<Note> {
        let journey_path: Vec<Waypoint> = serde_json::from_str(&self.journey_path)
            .with_context(|| format!("corrupt journey path for note {}", self.id))?;

        Ok(Note {
            id: self.id.parse()?,
            sender_id: self.sender_id.parse()?,
            content: self.content,
            is_anonymous: self.is_anonymous,
            origin: Coordinate::new(self.origin_lat, self.origin_lon),
            current: Coordinate::new(self.current_lat, self.current_lon),
            journey_path,
            status: self
                .status
                .parse::<NoteStatus>()
                .map_err(|e| anyhow::anyhow!(e))?,
            created_at: self.created_at,
            expires_at: self.expires_at,
        })
    }
}

const NOTE_COLUMNS: &str = "id, sender_id, content, is_anonymous, origin_lat, origin_lon, \
     current_lat, current_lon, journey_path, status, created_at, expires_at";

fn map_note_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NoteRow> {
    Ok(NoteRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        content: row.get(2)?,
        is_anonymous: row.get(3)?,
        origin_lat: row.get(4)?,
        origin_lon: row.get(5)?,
        current_lat: row.get(6)?,
        current_lon: row.get(7)?,
        journey_path: row.get(8)?,
        status: row.get(9)?,
        created_at: row.get(10)?,
        expires_at: row.get(11)?,
    })
}

impl Database {
    // -- Notes --

    pub fn insert_note(&self, note: &Note) -> Result<()> {
        let journey = serde_json::to_string(&note.journey_path)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notes (id, sender_id, content, is_anonymous, origin_lat, origin_lon,
                                    current_lat, current_lon, journey_path, status, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                rusqlite::params![
                    note.id.to_string(),
                    note.sender_id.to_string(),
                    note.content,
                    note.is_anonymous,
                    note.origin.lat,
                    note.origin.lon,
                    note.current.lat,
                    note.current.lon,
                    journey,
                    note.status.as_str(),
                    note.created_at,
                    note.expires_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_note(&self, id: Uuid) -> Result<Option<Note>> {
        let row = self.with_conn(|conn| {
            let sql = format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?1");
            let row = conn
                .query_row(&sql, [id.to_string()], map_note_row)
                .optional()?;
            Ok(row)
        })?;

        row.map(NoteRow::into_note).transpose()
    }

    /// Every note still in simulation. This is the tick-fatal read: callers
    /// abort the whole tick if it fails.
    pub fn active_notes(&self) -> Result<Vec<Note>> {
        let rows = self.with_conn(|conn| {
            let sql = format!("SELECT {NOTE_COLUMNS} FROM notes WHERE status = 'active'");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], map_note_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        rows.into_iter().map(NoteRow::into_note).collect()
    }

    /// Writes one note's drift outcome: position, journey path, and status.
    pub fn persist_drift(&self, note: &Note) -> Result<()> {
        let journey = serde_json::to_string(&note.journey_path)?;
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE notes
                 SET current_lat = ?2, current_lon = ?3, journey_path = ?4, status = ?5
                 WHERE id = ?1",
                rusqlite::params![
                    note.id.to_string(),
                    note.current.lat,
                    note.current.lon,
                    journey,
                    note.status.as_str(),
                ],
            )?;
            Ok(())
        })
    }

    // -- Users --

    pub fn insert_user(&self, user: &User) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, display_name, home_zip_code, uses_live_location,
                                    current_lat, current_lon, push_token)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    user.id.to_string(),
                    user.display_name,
                    user.home_zip_code,
                    user.uses_live_location,
                    user.current.map(|c| c.lat),
                    user.current.map(|c| c.lon),
                    user.push_token,
                ],
            )?;
            Ok(())
        })
    }

    /// Users whose location can be resolved at all: a live coordinate, or a
    /// home ZIP the detector can geocode.
    pub fn users_with_location(&self) -> Result<Vec<User>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, display_name, home_zip_code, uses_live_location,
                        current_lat, current_lon, push_token
                 FROM users
                 WHERE (uses_live_location = 1 AND current_lat IS NOT NULL AND current_lon IS NOT NULL)
                    OR home_zip_code IS NOT NULL",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    let lat: Option<f64> = row.get(4)?;
                    let lon: Option<f64> = row.get(5)?;
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, bool>(3)?,
                        lat.zip(lon),
                        row.get::<_, Option<String>>(6)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        rows.into_iter()
            .map(|(id, display_name, home_zip_code, uses_live_location, coords, push_token)| {
                Ok(User {
                    id: id.parse()?,
                    display_name,
                    home_zip_code,
                    uses_live_location,
                    current: coords.map(|(lat, lon)| Coordinate::new(lat, lon)),
                    push_token,
                })
            })
            .collect()
    }

    // -- ZIP codes --

    pub fn insert_zip_code(&self, zip: &ZipCode) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO zip_codes
                     (zip_code, city, state_code, lat, lon, population, is_inhabited)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    zip.zip_code,
                    zip.city,
                    zip.state_code,
                    zip.lat,
                    zip.lon,
                    zip.population,
                    zip.is_inhabited,
                ],
            )?;
            Ok(())
        })
    }

    pub fn zip_coordinate(&self, zip_code: &str) -> Result<Option<Coordinate>> {
        self.with_conn(|conn| {
            let coord = conn
                .query_row(
                    "SELECT lat, lon FROM zip_codes WHERE zip_code = ?1",
                    [zip_code],
                    |row| Ok(Coordinate::new(row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            Ok(coord)
        })
    }

    /// True if any inhabited ZIP lies within `radius_miles` of `coord`.
    ///
    /// A degree bounding box narrows the candidates in SQL; the exact
    /// great-circle check runs on the survivors.
    pub fn any_inhabited_within(&self, coord: Coordinate, radius_miles: f64) -> Result<bool> {
        // One degree of latitude is ~69 miles; longitude shrinks with cos(lat).
        let lat_pad = radius_miles / 69.0;
        let lon_pad = radius_miles / (69.0 * coord.lat.to_radians().cos().abs().max(0.01));

        let candidates = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT lat, lon FROM zip_codes
                 WHERE is_inhabited = 1
                   AND lat BETWEEN ?1 AND ?2
                   AND lon BETWEEN ?3 AND ?4",
            )?;
            let rows = stmt
                .query_map(
                    rusqlite::params![
                        coord.lat - lat_pad,
                        coord.lat + lat_pad,
                        coord.lon - lon_pad,
                        coord.lon + lon_pad,
                    ],
                    |row| Ok(Coordinate::new(row.get(0)?, row.get(1)?)),
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        Ok(candidates
            .iter()
            .any(|zip| zip.is_within_radius(&coord, radius_miles)))
    }

    // -- Encounters --

    /// Inserts the encounter unless the (note, user) pair already has one.
    /// Returns true when a row was actually written; a conflict is a benign
    /// no-op, not an error.
    pub fn insert_encounter_if_absent(&self, encounter: &Encounter) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO encounters
                     (id, note_id, user_id, distance_miles, was_tapped, encountered_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    encounter.id.to_string(),
                    encounter.note_id.to_string(),
                    encounter.user_id.to_string(),
                    encounter.distance_miles,
                    encounter.was_tapped,
                    encounter.encountered_at,
                ],
            )?;
            Ok(inserted > 0)
        })
    }

    pub fn get_encounter(&self, note_id: Uuid, user_id: Uuid) -> Result<Option<Encounter>> {
        let row = self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, note_id, user_id, distance_miles, was_tapped, encountered_at
                     FROM encounters WHERE note_id = ?1 AND user_id = ?2",
                    [note_id.to_string(), user_id.to_string()],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, f64>(3)?,
                            row.get::<_, bool>(4)?,
                            row.get::<_, DateTime<Utc>>(5)?,
                        ))
                    },
                )
                .optional()?;
            Ok(row)
        })?;

        row.map(|(id, note_id, user_id, distance_miles, was_tapped, encountered_at)| {
            Ok(Encounter {
                id: id.parse()?,
                note_id: note_id.parse()?,
                user_id: user_id.parse()?,
                distance_miles,
                was_tapped,
                encountered_at,
            })
        })
        .transpose()
    }

    /// Total encounter rows for a note, used by callers reporting discovery
    /// stats.
    pub fn encounter_count(&self, note_id: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM encounters WHERE note_id = ?1",
                [note_id.to_string()],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }
}
