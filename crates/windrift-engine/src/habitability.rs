use std::sync::Arc;

use windrift_db::Database;
use windrift_types::Coordinate;

/// "Is anyone living within `radius_miles` of this point?"
///
/// Read-only oracle. Callers treat an Err as inhabited: a delayed dissolve
/// is recoverable, a wrong one is not.
pub trait HabitabilityOracle: Send + Sync {
    fn is_inhabited(&self, coord: Coordinate, radius_miles: f64) -> anyhow::Result<bool>;
}

/// Answers from the ZIP-code dataset: inhabited iff any inhabited ZIP
/// centroid lies within the radius.
pub struct ZipHabitability {
    db: Arc<Database>,
}

impl ZipHabitability {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl HabitabilityOracle for ZipHabitability {
    fn is_inhabited(&self, coord: Coordinate, radius_miles: f64) -> anyhow::Result<bool> {
        self.db.any_inhabited_within(coord, radius_miles)
    }
}
