/// Integration tests: full engine ticks against an in-memory store, with
/// scripted wind and habitability collaborators.
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use uuid::Uuid;

use windrift_db::Database;
use windrift_engine::config::EngineConfig;
use windrift_engine::encounter::Notifier;
use windrift_engine::engine::Engine;
use windrift_engine::habitability::{HabitabilityOracle, ZipHabitability};
use windrift_engine::wind::{WindError, WindSource};
use windrift_types::{Coordinate, GridCell, Note, NoteStatus, User, WindVector, ZipCode};

// ── Scripted collaborators ──────────────────────────────────────────────

struct FixedWind(WindVector);

impl WindSource for FixedWind {
    async fn fetch(&self, _coord: Coordinate) -> Result<WindVector, WindError> {
        Ok(self.0)
    }
}

/// Fails for one grid cell, answers for every other.
struct CellFailingWind {
    failing: GridCell,
    wind: WindVector,
}

impl WindSource for CellFailingWind {
    async fn fetch(&self, coord: Coordinate) -> Result<WindVector, WindError> {
        if GridCell::containing(&coord) == self.failing {
            Err(WindError::MissingWind)
        } else {
            Ok(self.wind)
        }
    }
}

/// Parks every fetch until the test releases the gate.
struct GatedWind {
    gate: Arc<tokio::sync::Notify>,
    wind: WindVector,
}

impl WindSource for GatedWind {
    async fn fetch(&self, _coord: Coordinate) -> Result<WindVector, WindError> {
        self.gate.notified().await;
        Ok(self.wind)
    }
}

struct FixedHabitability(bool);

impl HabitabilityOracle for FixedHabitability {
    fn is_inhabited(&self, _coord: Coordinate, _radius_miles: f64) -> anyhow::Result<bool> {
        Ok(self.0)
    }
}

struct BrokenHabitability;

impl HabitabilityOracle for BrokenHabitability {
    fn is_inhabited(&self, _coord: Coordinate, _radius_miles: f64) -> anyhow::Result<bool> {
        anyhow::bail!("oracle unreachable")
    }
}

struct CountingNotifier(AtomicUsize);

impl Notifier for CountingNotifier {
    fn notify(&self, _token: &str, _note: &Note, _distance_miles: f64) -> anyhow::Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _token: &str, _note: &Note, _distance_miles: f64) -> anyhow::Result<()> {
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────

const NYC: Coordinate = Coordinate {
    lat: 40.7128,
    lon: -74.0060,
};

fn hourly_config() -> EngineConfig {
    EngineConfig {
        elapsed_hours: 1.0,
        ..EngineConfig::default()
    }
}

fn east_wind_10mph() -> WindVector {
    WindVector {
        speed_mph: 10.0,
        bearing_degrees: 90.0,
    }
}

fn seed_nyc_zip(db: &Database) {
    db.insert_zip_code(&ZipCode {
        zip_code: "10001".into(),
        city: "New York".into(),
        state_code: "NY".into(),
        lat: 40.7484,
        lon: -73.9967,
        population: 21102,
        is_inhabited: true,
    })
    .unwrap();
}

fn launch_note(db: &Database, origin: Coordinate) -> Note {
    let note = Note::launch("out on the wind".into(), false, Uuid::new_v4(), origin);
    db.insert_note(&note).unwrap();
    note
}

// ── Tests ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn eastward_drift_end_to_end() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    seed_nyc_zip(&db);
    let note = launch_note(&db, NYC);

    let engine = Engine::new(
        db.clone(),
        FixedWind(east_wind_10mph()),
        ZipHabitability::new(db.clone()),
        NullNotifier,
        hourly_config(),
    );

    let summary = engine.tick().await.unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.dissolved, 0);

    let moved = db.get_note(note.id).unwrap().unwrap();
    assert_eq!(moved.status, NoteStatus::Active);
    assert_eq!(moved.journey_path.len(), 2);
    assert!(moved.current.lon > NYC.lon, "note should have drifted east");
    assert!((moved.current.lat - NYC.lat).abs() < 0.01);

    // 10 mph at the 0.15 drift factor for one hour is 1.5 miles
    let distance = NYC.haversine_miles(&moved.current);
    assert!((distance - 1.5).abs() < 0.1, "moved {distance} miles");
    assert!((moved.total_distance_miles() - distance).abs() < 1e-6);

    let last = moved.journey_path.last().unwrap();
    assert_eq!(last.wind_speed, Some(10.0));
    assert_eq!(last.wind_bearing, Some(90.0));
}

#[tokio::test]
async fn uninhabited_candidate_dissolves_in_place() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let note = launch_note(&db, NYC);

    let engine = Engine::new(
        db.clone(),
        FixedWind(east_wind_10mph()),
        FixedHabitability(false),
        NullNotifier,
        hourly_config(),
    );

    let summary = engine.tick().await.unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.updated, 0);
    assert_eq!(summary.dissolved, 1);

    // The note dies where it last was, never at the unreachable candidate
    let gone = db.get_note(note.id).unwrap().unwrap();
    assert_eq!(gone.status, NoteStatus::Dissolved);
    assert_eq!(gone.current, NYC);
    assert_eq!(gone.journey_path.len(), 1);

    // A dissolved note is out of the simulation entirely
    assert!(db.active_notes().unwrap().is_empty());
}

#[tokio::test]
async fn habitability_errors_fail_open() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let note = launch_note(&db, NYC);

    let engine = Engine::new(
        db.clone(),
        FixedWind(east_wind_10mph()),
        BrokenHabitability,
        NullNotifier,
        hourly_config(),
    );

    let summary = engine.tick().await.unwrap();
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.dissolved, 0);

    let moved = db.get_note(note.id).unwrap().unwrap();
    assert_eq!(moved.status, NoteStatus::Active);
    assert_eq!(moved.journey_path.len(), 2);
}

#[tokio::test]
async fn wind_failure_only_grounds_its_own_cell() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let plains = Coordinate::new(35.0, -100.0);
    let east_coast_note = launch_note(&db, NYC);
    let plains_note = launch_note(&db, plains);

    let engine = Engine::new(
        db.clone(),
        CellFailingWind {
            failing: GridCell::containing(&plains),
            wind: east_wind_10mph(),
        },
        FixedHabitability(true),
        NullNotifier,
        hourly_config(),
    );

    let summary = engine.tick().await.unwrap();
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.updated, 1);

    let moved = db.get_note(east_coast_note.id).unwrap().unwrap();
    assert_eq!(moved.journey_path.len(), 2);

    // The grounded note is untouched and still active for the next tick
    let grounded = db.get_note(plains_note.id).unwrap().unwrap();
    assert_eq!(grounded.status, NoteStatus::Active);
    assert_eq!(grounded.current, plains);
    assert_eq!(grounded.journey_path.len(), 1);
}

#[tokio::test]
async fn repeated_ticks_record_one_encounter_per_pair() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let note = launch_note(&db, NYC);

    let user = User {
        id: Uuid::new_v4(),
        display_name: Some("catcher".into()),
        home_zip_code: None,
        uses_live_location: true,
        current: Some(Coordinate::new(40.75, -73.99)),
        push_token: Some("push-token-abc".into()),
    };
    db.insert_user(&user).unwrap();

    let notifier = Arc::new(CountingNotifier(AtomicUsize::new(0)));

    struct SharedNotifier(Arc<CountingNotifier>);
    impl Notifier for SharedNotifier {
        fn notify(&self, token: &str, note: &Note, distance_miles: f64) -> anyhow::Result<()> {
            self.0.notify(token, note, distance_miles)
        }
    }

    let engine = Engine::new(
        db.clone(),
        FixedWind(WindVector {
            speed_mph: 2.0,
            bearing_degrees: 90.0,
        }),
        FixedHabitability(true),
        SharedNotifier(notifier.clone()),
        hourly_config(),
    );

    engine.tick().await.unwrap();
    engine.tick().await.unwrap();

    assert_eq!(db.encounter_count(note.id).unwrap(), 1);
    let stored = db.get_encounter(note.id, user.id).unwrap().unwrap();
    assert!(stored.distance_miles <= 10.0);
    assert_eq!(notifier.0.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn overlapping_tick_exits_with_empty_summary() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    launch_note(&db, NYC);

    let gate = Arc::new(tokio::sync::Notify::new());
    let engine = Arc::new(Engine::new(
        db.clone(),
        GatedWind {
            gate: gate.clone(),
            wind: east_wind_10mph(),
        },
        FixedHabitability(true),
        NullNotifier,
        hourly_config(),
    ));

    // First tick parks inside the wind fetch, holding the guard
    let first = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.tick().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Second invocation must bail out immediately, without error
    let second = engine.tick().await.unwrap();
    assert_eq!(second, Default::default());

    gate.notify_one();
    let first = first.await.unwrap().unwrap();
    assert_eq!(first.updated, 1);
}

#[tokio::test]
async fn empty_active_set_never_touches_the_wind_source() {
    struct PanickingWind;
    impl WindSource for PanickingWind {
        async fn fetch(&self, _coord: Coordinate) -> Result<WindVector, WindError> {
            panic!("wind source should not be consulted with no active notes");
        }
    }

    let db = Arc::new(Database::open_in_memory().unwrap());
    let engine = Engine::new(
        db,
        PanickingWind,
        FixedHabitability(true),
        NullNotifier,
        hourly_config(),
    );

    let summary = engine.tick().await.unwrap();
    assert_eq!(summary, Default::default());
}
