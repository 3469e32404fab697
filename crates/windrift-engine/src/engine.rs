use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::cache::WindCache;
use crate::config::EngineConfig;
use crate::drift::drift;
use crate::encounter::{Notifier, detect_encounters};
use crate::habitability::HabitabilityOracle;
use crate::wind::WindSource;
use windrift_db::Database;
use windrift_types::{GridCell, Note, NoteStatus, TickSummary, WindVector};

/// The drift engine. One `tick` advances every active note, dissolves the
/// unreachable ones, and records encounters; everything it talks to comes
/// in through the constructor.
pub struct Engine<W, H, N> {
    db: Arc<Database>,
    wind: W,
    habitability: H,
    notifier: N,
    cache: WindCache,
    config: EngineConfig,
    tick_running: AtomicBool,
}

/// Releases the overlap guard even when the tick future is dropped at an
/// await point (deadline timeout, process shutdown).
struct TickPermit<'a>(&'a AtomicBool);

impl<'a> TickPermit<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
            .then_some(Self(flag))
    }
}

impl Drop for TickPermit<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<W, H, N> Engine<W, H, N>
where
    W: WindSource,
    H: HabitabilityOracle,
    N: Notifier,
{
    pub fn new(db: Arc<Database>, wind: W, habitability: H, notifier: N, config: EngineConfig) -> Self {
        let ttl = chrono::Duration::from_std(config.wind_cache_ttl)
            .unwrap_or_else(|_| chrono::Duration::minutes(30));
        Self {
            db,
            wind,
            habitability,
            notifier,
            cache: WindCache::new(ttl),
            config,
            tick_running: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs one full update cycle and reports what happened.
    ///
    /// The only fatal failure is being unable to load the active notes at
    /// all. Wind, habitability, persistence, and notification failures are
    /// isolated to their cell, note, or user pair; affected units are simply
    /// skipped and converge again on the next tick. An overlapping
    /// invocation exits immediately with an empty summary.
    pub async fn tick(&self) -> anyhow::Result<TickSummary> {
        let Some(_permit) = TickPermit::acquire(&self.tick_running) else {
            debug!("Tick already in progress, skipping");
            return Ok(TickSummary::default());
        };

        let notes = self.db.active_notes().context("cannot load active notes")?;
        if notes.is_empty() {
            debug!("No active notes");
            return Ok(TickSummary::default());
        }

        let processed = notes.len();
        info!("Processing {} active notes", processed);

        let winds = self.resolve_winds(&notes).await;

        let now = Utc::now();
        let mut updated_notes: Vec<Note> = Vec::new();
        let mut dissolved = 0usize;

        for mut note in notes {
            let cell = GridCell::containing(&note.current);
            // Wind fetch failed for this cell: the note sits still this tick
            let Some(wind) = winds.get(&cell).copied() else {
                continue;
            };

            let candidate = drift(note.current, &wind, self.config.elapsed_hours, self.config.drift_factor);

            let inhabited = match self
                .habitability
                .is_inhabited(candidate, self.config.habitability_radius_miles)
            {
                Ok(inhabited) => inhabited,
                Err(e) => {
                    // Fail open: a delayed dissolve beats a wrong one
                    warn!("Habitability check failed at {}: {}", candidate, e);
                    true
                }
            };

            if inhabited {
                note.advance(candidate, now, &wind);
                match self.db.persist_drift(&note) {
                    Ok(()) => updated_notes.push(note),
                    Err(e) => {
                        warn!("Failed to persist note {}: {} (retried next tick)", note.id, e);
                    }
                }
            } else {
                // The last recorded position stays: the note never "exists"
                // outside reachable space
                note.status = NoteStatus::Dissolved;
                match self.db.persist_drift(&note) {
                    Ok(()) => {
                        info!("Note {} dissolved at {}", note.id, note.current);
                        dissolved += 1;
                    }
                    Err(e) => {
                        warn!("Failed to dissolve note {}: {} (retried next tick)", note.id, e);
                    }
                }
            }
        }

        match self.db.users_with_location() {
            Ok(users) => {
                let fresh = detect_encounters(
                    &self.db,
                    &self.notifier,
                    &updated_notes,
                    &users,
                    self.config.discovery_radius_miles,
                );
                if fresh > 0 {
                    info!("Recorded {} new encounters", fresh);
                }
            }
            Err(e) => warn!("Could not load users for encounter detection: {}", e),
        }

        Ok(TickSummary {
            processed,
            updated: updated_notes.len(),
            dissolved,
        })
    }

    /// One wind vector per distinct occupied grid cell, cache-or-fetch. A
    /// failed cell is logged and left out of the map so its notes skip this
    /// tick without touching the others.
    async fn resolve_winds(&self, notes: &[Note]) -> HashMap<GridCell, WindVector> {
        let cells: HashSet<GridCell> = notes
            .iter()
            .map(|note| GridCell::containing(&note.current))
            .collect();

        let mut winds = HashMap::with_capacity(cells.len());
        for cell in cells {
            match self
                .cache
                .sample(cell, &self.wind, self.config.wind_timeout)
                .await
            {
                Ok(wind) => {
                    winds.insert(cell, wind);
                }
                Err(e) => warn!("Wind fetch failed for cell {}: {}", cell, e),
            }
        }
        winds
    }
}
