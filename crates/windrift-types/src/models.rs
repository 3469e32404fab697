use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::Coordinate;

/// How long a note stays afloat before an external sweeper expires it.
const NOTE_LIFETIME_HOURS: i64 = 72;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteStatus {
    Active,
    Caught,
    Expired,
    Dissolved,
}

impl NoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteStatus::Active => "active",
            NoteStatus::Caught => "caught",
            NoteStatus::Expired => "expired",
            NoteStatus::Dissolved => "dissolved",
        }
    }
}

impl std::str::FromStr for NoteStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(NoteStatus::Active),
            "caught" => Ok(NoteStatus::Caught),
            "expired" => Ok(NoteStatus::Expired),
            "dissolved" => Ok(NoteStatus::Dissolved),
            other => Err(format!("unknown note status: {other}")),
        }
    }
}

/// One recorded stop on a note's journey. The wind fields are None only for
/// the origin waypoint, which is written before any drift has happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub lat: f64,
    pub lon: f64,
    pub timestamp: DateTime<Utc>,
    pub wind_speed: Option<f64>,
    pub wind_bearing: Option<f64>,
}

impl Waypoint {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lon)
    }
}

/// A drifting note.
///
/// Invariants: `journey_path` is never empty, its first entry is the origin,
/// and `current` always equals the last entry. Status is monotonic — once a
/// note leaves `Active` it never returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub is_anonymous: bool,
    pub origin: Coordinate,
    pub current: Coordinate,
    pub journey_path: Vec<Waypoint>,
    pub status: NoteStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Note {
    /// Creates a freshly launched note at `origin`, with the origin itself as
    /// the first waypoint.
    pub fn launch(content: String, is_anonymous: bool, sender_id: Uuid, origin: Coordinate) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            sender_id,
            content,
            is_anonymous,
            origin,
            current: origin,
            journey_path: vec![Waypoint {
                lat: origin.lat,
                lon: origin.lon,
                timestamp: now,
                wind_speed: None,
                wind_bearing: None,
            }],
            status: NoteStatus::Active,
            created_at: now,
            expires_at: now + Duration::hours(NOTE_LIFETIME_HOURS),
        }
    }

    /// Moves the note to `position`, appending the matching waypoint so the
    /// current-equals-last-waypoint invariant holds.
    pub fn advance(&mut self, position: Coordinate, at: DateTime<Utc>, wind: &WindVector) {
        self.journey_path.push(Waypoint {
            lat: position.lat,
            lon: position.lon,
            timestamp: at,
            wind_speed: Some(wind.speed_mph),
            wind_bearing: Some(wind.bearing_degrees),
        });
        self.current = position;
    }

    /// Total miles travelled, summed over consecutive journey segments.
    pub fn total_distance_miles(&self) -> f64 {
        self.journey_path
            .windows(2)
            .map(|pair| pair[0].coordinate().haversine_miles(&pair[1].coordinate()))
            .sum()
    }
}

/// A wind vector as consumed by the drift formula. Bearing is degrees
/// clockwise from north and is the direction the note travels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindVector {
    pub speed_mph: f64,
    pub bearing_degrees: f64,
}

/// A 1-degree grid bucket. All notes inside one cell share a single wind
/// fetch per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridCell {
    pub lat: i32,
    pub lon: i32,
}

impl GridCell {
    /// Buckets a coordinate by rounding each axis to the nearest degree.
    pub fn containing(coord: &Coordinate) -> Self {
        Self {
            lat: coord.lat.round() as i32,
            lon: coord.lon.round() as i32,
        }
    }

    /// The representative point the wind is fetched for.
    pub fn center(&self) -> Coordinate {
        Coordinate::new(self.lat as f64, self.lon as f64)
    }
}

impl std::fmt::Display for GridCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.lat, self.lon)
    }
}

/// A cached wind reading for one grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindSample {
    pub cell: GridCell,
    pub wind: WindVector,
    pub expires_at: DateTime<Utc>,
}

impl WindSample {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// An insert-once record that a note came within discovery range of a user.
/// Unique per (note_id, user_id); only `was_tapped` is ever updated, by the
/// external catch action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Encounter {
    pub id: Uuid,
    pub note_id: Uuid,
    pub user_id: Uuid,
    pub distance_miles: f64,
    pub was_tapped: bool,
    pub encountered_at: DateTime<Utc>,
}

impl Encounter {
    pub fn new(note_id: Uuid, user_id: Uuid, distance_miles: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            note_id,
            user_id,
            distance_miles,
            was_tapped: false,
            encountered_at: Utc::now(),
        }
    }
}

/// A potential recipient. Read-only to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub display_name: Option<String>,
    pub home_zip_code: Option<String>,
    pub uses_live_location: bool,
    pub current: Option<Coordinate>,
    pub push_token: Option<String>,
}

impl User {
    /// The live coordinate, if the user shares one. Users without this fall
    /// back to their home ZIP, which needs a directory lookup.
    pub fn live_location(&self) -> Option<Coordinate> {
        if self.uses_live_location { self.current } else { None }
    }
}

/// One row of the inhabited-area dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZipCode {
    pub zip_code: String,
    pub city: String,
    pub state_code: String,
    pub lat: f64,
    pub lon: f64,
    pub population: i64,
    pub is_inhabited: bool,
}

/// What one engine tick reports back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickSummary {
    pub processed: usize,
    pub updated: usize,
    pub dissolved: usize,
}
