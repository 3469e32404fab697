pub mod cache;
pub mod config;
pub mod drift;
pub mod encounter;
pub mod engine;
pub mod habitability;
pub mod wind;

pub use cache::WindCache;
pub use config::EngineConfig;
pub use drift::{DRIFT_FACTOR, drift};
pub use encounter::{LogNotifier, Notifier, detect_encounters};
pub use engine::Engine;
pub use habitability::{HabitabilityOracle, ZipHabitability};
pub use wind::{OpenWeatherMap, WindError, WindSource};
