use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::match_model::{MatchStage, Slot};

/// Notifications published by `DrawService` after each persisted mutation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DrawEvent {
    /// Group fixtures or a knockout bracket were (re)built
    DrawSeeded {
        tournament_id: Uuid,
        category_id: Uuid,
        stage: MatchStage,
        matches: usize,
    },
    MatchStarted {
        match_id: Uuid,
        started_at: DateTime<Utc>,
    },
    MatchCompleted {
        match_id: Uuid,
        winner_id: Uuid,
        completed_at: DateTime<Utc>,
    },
    /// A winner moved into a slot of the next round
    PlayerAdvanced {
        from_match_id: Uuid,
        to_match_id: Uuid,
        slot: Slot,
        participant_id: Uuid,
        ready: bool,
    },
    /// A participant was placed by hand into an open first-round slot
    SlotAssigned {
        match_id: Uuid,
        slot: Slot,
        participant_id: Uuid,
    },
    DrawRestarted {
        tournament_id: Uuid,
        category_id: Uuid,
    },
    DrawReset {
        tournament_id: Uuid,
        category_id: Uuid,
    },
}
