//! Draw and bracket engine for badminton tournaments: round-robin groups,
//! seeded single-elimination brackets and the transition between them.

pub mod config;
pub mod db;
pub mod draw_error;
pub mod engine;
pub mod models;
pub mod service;
pub mod store;
pub mod telemetry;

pub use draw_error::{DrawError, ErrorResponse};
pub use engine::AdvancementResult;
pub use models::{Draw, DrawFormat, DrawKey, Match, MatchStatus, Participant, Slot, StandingEntry};
pub use service::{DrawEvent, DrawService};
pub use store::{DrawStore, InMemoryDrawStore, PgDrawStore};
