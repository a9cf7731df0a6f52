//! Persistence of Draw aggregates and their normalized match rows.

use async_trait::async_trait;
use uuid::Uuid;

use crate::draw_error::DrawError;
use crate::models::draw::{Draw, DrawKey};
use crate::models::match_model::{Match, SlotWrite};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryDrawStore;
pub use postgres::PgDrawStore;

/// Storage contract of the draw engine.
///
/// Multi-row operations are all-or-nothing. Slot writes update a single
/// field of a single row and never overwrite a different occupant, so two
/// children finishing together cannot clobber each other's slot.
#[async_trait]
pub trait DrawStore: Send + Sync {
    async fn load_draw(&self, key: DrawKey) -> Result<Option<Draw>, DrawError>;

    /// Replace the aggregate and every one of its match rows.
    async fn save_draw(&self, draw: &Draw) -> Result<(), DrawError>;

    /// Remove the aggregate and its matches. Returns whether anything existed.
    async fn delete_draw(&self, key: DrawKey) -> Result<bool, DrawError>;

    async fn find_draw_key(&self, match_id: Uuid) -> Result<Option<DrawKey>, DrawError>;

    /// Persist status, timestamps, winner and score of one match. Players are untouched.
    async fn update_match_state(&self, key: DrawKey, m: &Match) -> Result<(), DrawError>;

    /// Persist a completion and its parent slot write together.
    async fn apply_completion(
        &self,
        key: DrawKey,
        completed: &Match,
        parent_write: Option<&SlotWrite>,
    ) -> Result<(), DrawError>;

    /// Fill one empty slot.
    async fn assign_slot(&self, key: DrawKey, write: &SlotWrite) -> Result<(), DrawError>;

    async fn list_draw_keys(&self) -> Result<Vec<DrawKey>, DrawError>;
}
