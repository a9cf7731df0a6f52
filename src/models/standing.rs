use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-participant aggregate of a group. Always recomputed from the group's
/// matches, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandingEntry {
    pub participant_id: Uuid,
    pub display_name: String,
    pub seed: u32,
    /// 1-based position after sorting.
    pub rank: u32,
    pub played: u32,
    pub wins: u32,
    pub losses: u32,
    pub points: u32,
}

impl StandingEntry {
    pub fn new(participant_id: Uuid, display_name: impl Into<String>, seed: u32) -> Self {
        Self {
            participant_id,
            display_name: display_name.into(),
            seed,
            rank: 0,
            played: 0,
            wins: 0,
            losses: 0,
            points: 0,
        }
    }
}
