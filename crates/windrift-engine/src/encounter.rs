use tracing::{debug, info, warn};

use windrift_db::Database;
use windrift_types::{Coordinate, Encounter, Note, User};

/// Fire-and-forget notification dispatch. Failures never fail the tick;
/// the encounter row is already persisted when this is called.
pub trait Notifier: Send + Sync {
    fn notify(&self, token: &str, note: &Note, distance_miles: f64) -> anyhow::Result<()>;
}

/// Logs the dispatch instead of talking to a push gateway. The real
/// transport lives outside this engine.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, token: &str, note: &Note, distance_miles: f64) -> anyhow::Result<()> {
        info!(
            "Push to {}: note {} is {:.1} miles away",
            token, note.id, distance_miles
        );
        Ok(())
    }
}

/// Runs the note/user proximity pass and records new encounters.
///
/// For every pair where the user is not the sender and has a resolvable
/// location, a note within `discovery_radius_miles` produces at most one
/// Encounter — the (note, user) pair is the idempotency key, so re-running
/// the pass over the same inputs inserts nothing new. Returns the number of
/// fresh encounters.
pub fn detect_encounters<N: Notifier>(
    db: &Database,
    notifier: &N,
    notes: &[Note],
    users: &[User],
    discovery_radius_miles: f64,
) -> usize {
    // Geocode each user once, not once per note
    let located: Vec<(&User, Coordinate)> = users
        .iter()
        .filter_map(|user| resolve_location(db, user).map(|coord| (user, coord)))
        .collect();

    let mut fresh = 0;

    for note in notes {
        for (user, location) in &located {
            if user.id == note.sender_id {
                continue;
            }

            let distance = note.current.haversine_miles(location);
            if distance > discovery_radius_miles {
                continue;
            }

            let encounter = Encounter::new(note.id, user.id, distance);
            match db.insert_encounter_if_absent(&encounter) {
                Ok(true) => {
                    fresh += 1;
                    debug!(
                        "Note {} encountered user {} at {:.1} miles",
                        note.id, user.id, distance
                    );
                    if let Some(token) = &user.push_token {
                        if let Err(e) = notifier.notify(token, note, distance) {
                            warn!("Notification dispatch failed for user {}: {}", user.id, e);
                        }
                    }
                }
                Ok(false) => {} // pair already recorded
                Err(e) => {
                    warn!(
                        "Encounter insert failed for note {} / user {}: {}",
                        note.id, user.id, e
                    );
                }
            }
        }
    }

    fresh
}

fn resolve_location(db: &Database, user: &User) -> Option<Coordinate> {
    if let Some(coord) = user.live_location() {
        return Some(coord);
    }

    let zip = user.home_zip_code.as_deref()?;
    match db.zip_coordinate(zip) {
        Ok(coord) => coord,
        Err(e) => {
            warn!("ZIP geocode failed for {}: {}", zip, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use uuid::Uuid;
    use windrift_types::ZipCode;

    struct RecordingNotifier {
        sent: Mutex<Vec<String>>,
    }

    impl RecordingNotifier {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
            }
        }

        fn count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, token: &str, _note: &Note, _distance_miles: f64) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(token.to_string());
            Ok(())
        }
    }

    fn note_at(coord: Coordinate) -> Note {
        Note::launch("drifting by".into(), false, Uuid::new_v4(), coord)
    }

    fn user_at(coord: Coordinate, push_token: Option<&str>) -> User {
        User {
            id: Uuid::new_v4(),
            display_name: None,
            home_zip_code: None,
            uses_live_location: true,
            current: Some(coord),
            push_token: push_token.map(String::from),
        }
    }

    #[test]
    fn rerunning_the_pass_creates_one_encounter_per_pair() {
        let db = Database::open_in_memory().unwrap();
        let notifier = RecordingNotifier::new();

        let note = note_at(Coordinate::new(40.7128, -74.0060));
        let user = user_at(Coordinate::new(40.75, -73.99), Some("token-1"));
        db.insert_note(&note).unwrap();
        db.insert_user(&user).unwrap();

        let notes = vec![note.clone()];
        let users = vec![user.clone()];

        let first = detect_encounters(&db, &notifier, &notes, &users, 10.0);
        let second = detect_encounters(&db, &notifier, &notes, &users, 10.0);

        assert_eq!(first, 1);
        assert_eq!(second, 0);
        assert_eq!(db.encounter_count(note.id).unwrap(), 1);
        // Only the fresh insert notified
        assert_eq!(notifier.count(), 1);
    }

    #[test]
    fn sender_never_encounters_their_own_note() {
        let db = Database::open_in_memory().unwrap();
        let notifier = RecordingNotifier::new();

        let note = note_at(Coordinate::new(40.7128, -74.0060));
        let mut sender = user_at(Coordinate::new(40.7128, -74.0060), Some("token-2"));
        sender.id = note.sender_id;
        db.insert_note(&note).unwrap();
        db.insert_user(&sender).unwrap();

        let fresh = detect_encounters(&db, &notifier, &[note.clone()], &[sender], 10.0);

        assert_eq!(fresh, 0);
        assert_eq!(db.encounter_count(note.id).unwrap(), 0);
    }

    #[test]
    fn out_of_range_users_are_skipped() {
        let db = Database::open_in_memory().unwrap();
        let notifier = RecordingNotifier::new();

        let note = note_at(Coordinate::new(40.7128, -74.0060));
        let boston = user_at(Coordinate::new(42.3601, -71.0589), Some("token-3"));
        db.insert_note(&note).unwrap();
        db.insert_user(&boston).unwrap();

        let fresh = detect_encounters(&db, &notifier, &[note.clone()], &[boston], 10.0);

        assert_eq!(fresh, 0);
        assert_eq!(notifier.count(), 0);
    }

    #[test]
    fn home_zip_resolves_when_no_live_location() {
        let db = Database::open_in_memory().unwrap();
        let notifier = RecordingNotifier::new();

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

        let note = note_at(Coordinate::new(40.7128, -74.0060));
        let user = User {
            id: Uuid::new_v4(),
            display_name: None,
            home_zip_code: Some("10001".into()),
            uses_live_location: false,
            current: None,
            push_token: None,
        };
        db.insert_note(&note).unwrap();
        db.insert_user(&user).unwrap();

        let fresh = detect_encounters(&db, &notifier, &[note.clone()], &[user.clone()], 10.0);

        assert_eq!(fresh, 1);
        let stored = db.get_encounter(note.id, user.id).unwrap().unwrap();
        assert!(stored.distance_miles < 10.0);
        assert!(!stored.was_tapped);
    }
}
