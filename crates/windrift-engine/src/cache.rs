use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::wind::{WindError, WindSource};
use windrift_types::{GridCell, WindSample, WindVector};

/// In-process wind cache keyed by 1-degree grid cell.
///
/// The only state that survives across ticks. Entries are independent: a
/// stale or missing cell never affects its neighbours, and re-creating an
/// entry is idempotent.
pub struct WindCache {
    entries: Mutex<HashMap<GridCell, WindSample>>,
    ttl: Duration,
}

impl WindCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Returns the cached vector for `cell` if present and unexpired.
    pub fn get(&self, cell: GridCell, now: DateTime<Utc>) -> Option<WindVector> {
        let entries = self.entries.lock().ok()?;
        entries
            .get(&cell)
            .filter(|sample| !sample.is_expired(now))
            .map(|sample| sample.wind)
    }

    pub fn put(&self, cell: GridCell, wind: WindVector, now: DateTime<Utc>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                cell,
                WindSample {
                    cell,
                    wind,
                    expires_at: now + self.ttl,
                },
            );
        }
    }

    /// Cache-or-fetch for one cell: an unexpired cached sample wins; otherwise the
    /// source is asked for the cell's center, bounded by `timeout`, and the
    /// result is stored for the TTL.
    pub async fn sample<W: WindSource>(
        &self,
        cell: GridCell,
        source: &W,
        timeout: std::time::Duration,
    ) -> Result<WindVector, WindError> {
        if let Some(wind) = self.get(cell, Utc::now()) {
            return Ok(wind);
        }

        let wind = tokio::time::timeout(timeout, source.fetch(cell.center()))
            .await
            .map_err(|_| WindError::Timeout)??;

        self.put(cell, wind, Utc::now());
        Ok(wind)
    }
}
