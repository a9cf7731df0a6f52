use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStage {
    Group,
    Knockout,
}

impl std::fmt::Display for MatchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchStage::Group => write!(f, "GROUP"),
            MatchStage::Knockout => write!(f, "KNOCKOUT"),
        }
    }
}

/// Match lifecycle. "Ready to play" is not a status: it is derived from
/// both slots being filled while the match is still `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Pending,
    InProgress,
    Completed,
}

impl MatchStatus {
    pub fn can_transition_to(&self, to: &MatchStatus) -> bool {
        matches!(
            (self, to),
            (MatchStatus::Pending, MatchStatus::InProgress)
                | (MatchStatus::Pending, MatchStatus::Completed)
                | (MatchStatus::InProgress, MatchStatus::Completed)
        )
    }

    pub fn valid_next_states(&self) -> Vec<MatchStatus> {
        match self {
            MatchStatus::Pending => vec![MatchStatus::InProgress, MatchStatus::Completed],
            MatchStatus::InProgress => vec![MatchStatus::Completed],
            // Only an explicit restart or reset leaves this state
            MatchStatus::Completed => vec![],
        }
    }

    /// True once play on the match has begun or finished.
    pub fn is_started(&self) -> bool {
        !matches!(self, MatchStatus::Pending)
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchStatus::Pending => write!(f, "PENDING"),
            MatchStatus::InProgress => write!(f, "IN_PROGRESS"),
            MatchStatus::Completed => write!(f, "COMPLETED"),
        }
    }
}

/// One of the two player positions of a match. On a child match it names the
/// position of the parent that the child's winner occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Player1,
    Player2,
}

impl Slot {
    /// Slot in the parent for the child at zero-based index `index` of its round.
    pub fn for_child_index(index: usize) -> Self {
        if index % 2 == 0 {
            Slot::Player1
        } else {
            Slot::Player2
        }
    }

    pub fn other(&self) -> Self {
        match self {
            Slot::Player1 => Slot::Player2,
            Slot::Player2 => Slot::Player1,
        }
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Slot::Player1 => write!(f, "player1"),
            Slot::Player2 => write!(f, "player2"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub id: Uuid,
    pub stage: MatchStage,
    /// Owning group for `Group` stage matches.
    pub group_id: Option<Uuid>,
    /// Knockout: distance to the final (1 = final). Group: round-robin round.
    pub round: u32,
    /// 1-based position within the round.
    pub match_number: u32,
    pub player1_id: Option<Uuid>,
    pub player2_id: Option<Uuid>,
    pub parent_match_id: Option<Uuid>,
    pub winner_slot: Option<Slot>,
    pub status: MatchStatus,
    pub winner_id: Option<Uuid>,
    /// First-round knockout match with one seeding gap.
    pub bye: bool,
    pub score_summary: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Match {
    pub fn new_knockout(round: u32, match_number: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            stage: MatchStage::Knockout,
            group_id: None,
            round,
            match_number,
            player1_id: None,
            player2_id: None,
            parent_match_id: None,
            winner_slot: None,
            status: MatchStatus::Pending,
            winner_id: None,
            bye: false,
            score_summary: None,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn new_group(
        group_id: Uuid,
        round: u32,
        match_number: u32,
        player1_id: Uuid,
        player2_id: Uuid,
    ) -> Self {
        Self {
            stage: MatchStage::Group,
            group_id: Some(group_id),
            player1_id: Some(player1_id),
            player2_id: Some(player2_id),
            ..Self::new_knockout(round, match_number)
        }
    }

    pub fn player(&self, slot: Slot) -> Option<Uuid> {
        match slot {
            Slot::Player1 => self.player1_id,
            Slot::Player2 => self.player2_id,
        }
    }

    pub fn set_player(&mut self, slot: Slot, participant_id: Option<Uuid>) {
        match slot {
            Slot::Player1 => self.player1_id = participant_id,
            Slot::Player2 => self.player2_id = participant_id,
        }
    }

    pub fn has_player(&self, participant_id: Uuid) -> bool {
        self.player1_id == Some(participant_id) || self.player2_id == Some(participant_id)
    }

    pub fn is_knockout(&self) -> bool {
        self.stage == MatchStage::Knockout
    }

    /// Both slots filled and not yet played.
    pub fn is_ready(&self) -> bool {
        self.status == MatchStatus::Pending && self.player1_id.is_some() && self.player2_id.is_some()
    }

    /// The assigned player who did not win, if the match is decided and had two players.
    pub fn loser_id(&self) -> Option<Uuid> {
        let winner = self.winner_id?;
        match (self.player1_id, self.player2_id) {
            (Some(p1), Some(p2)) if p1 == winner => Some(p2),
            (Some(p1), Some(p2)) if p2 == winner => Some(p1),
            _ => None,
        }
    }

    /// The only present player of a bye match.
    pub fn bye_player(&self) -> Option<Uuid> {
        if !self.bye {
            return None;
        }
        match (self.player1_id, self.player2_id) {
            (Some(p), None) | (None, Some(p)) => Some(p),
            _ => None,
        }
    }

    /// Drop the outcome and return to `Pending`. Players are untouched.
    pub fn clear_result(&mut self) {
        self.status = MatchStatus::Pending;
        self.winner_id = None;
        self.score_summary = None;
        self.started_at = None;
        self.completed_at = None;
    }
}

/// Result reported by the live-scoring component.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MatchResultReport {
    pub match_id: Uuid,
    pub winner_id: Uuid,
    #[validate(length(max = 255))]
    pub score_summary: Option<String>,
}

/// Single-field write of a participant into one slot of one match row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotWrite {
    pub match_id: Uuid,
    pub slot: Slot,
    pub participant_id: Uuid,
}
