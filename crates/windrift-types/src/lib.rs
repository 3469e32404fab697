pub mod geo;
pub mod models;

pub use geo::Coordinate;
pub use models::{
    Encounter, GridCell, Note, NoteStatus, TickSummary, User, Waypoint, WindSample, WindVector,
    ZipCode,
};
