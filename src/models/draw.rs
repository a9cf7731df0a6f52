use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;
use validator::Validate;

use crate::engine::{match_graph, round_names, standings};
use crate::models::match_model::{Match, MatchStage, MatchStatus, Slot};
use crate::models::participant::Participant;
use crate::models::standing::StandingEntry;

/// Identifies the single Draw of one tournament category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DrawKey {
    pub tournament_id: Uuid,
    pub category_id: Uuid,
}

impl DrawKey {
    pub fn new(tournament_id: Uuid, category_id: Uuid) -> Self {
        Self {
            tournament_id,
            category_id,
        }
    }
}

impl std::fmt::Display for DrawKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.tournament_id, self.category_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DrawFormat {
    Knockout,
    RoundRobin,
    RoundRobinKnockout,
}

impl DrawFormat {
    pub fn has_groups(&self) -> bool {
        matches!(self, DrawFormat::RoundRobin | DrawFormat::RoundRobinKnockout)
    }

    pub fn has_knockout(&self) -> bool {
        matches!(self, DrawFormat::Knockout | DrawFormat::RoundRobinKnockout)
    }
}

impl std::fmt::Display for DrawFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DrawFormat::Knockout => write!(f, "KNOCKOUT"),
            DrawFormat::RoundRobin => write!(f, "ROUND_ROBIN"),
            DrawFormat::RoundRobinKnockout => write!(f, "ROUND_ROBIN_KNOCKOUT"),
        }
    }
}

/// How group qualifiers are ordered into knockout seeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum QualifierPairing {
    /// Group by group, each group's qualifiers in rank order.
    #[default]
    Concatenate,
    /// Rank by rank across groups: every group winner, then every runner-up, ...
    CrossGroup,
}

impl std::fmt::Display for QualifierPairing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QualifierPairing::Concatenate => write!(f, "concatenate"),
            QualifierPairing::CrossGroup => write!(f, "cross_group"),
        }
    }
}

impl std::str::FromStr for QualifierPairing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "concatenate" => Ok(QualifierPairing::Concatenate),
            "cross_group" | "cross-group" => Ok(QualifierPairing::CrossGroup),
            other => Err(format!("unknown qualifier pairing '{}'", other)),
        }
    }
}

/// Round-robin group. Empty slots are placeholders awaiting assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub slots: Vec<Option<Participant>>,
}

impl Group {
    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.slots.iter().flatten()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewGroup {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(nested)]
    pub participants: Vec<Participant>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewGroupStage {
    pub format: DrawFormat,
    /// Falls back to the configured default when absent.
    #[validate(range(min = 1))]
    pub advance_from_group: Option<u32>,
    pub qualifier_pairing: Option<QualifierPairing>,
    #[validate(length(min = 1), nested)]
    pub groups: Vec<NewGroup>,
}

/// Persisted aggregate for one category. `matches` are the normalized rows and
/// the only source of truth; round and group views are projected from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draw {
    pub tournament_id: Uuid,
    pub category_id: Uuid,
    pub format: DrawFormat,
    pub advance_from_group: u32,
    pub qualifier_pairing: QualifierPairing,
    pub participants: Vec<Participant>,
    pub groups: Vec<Group>,
    pub matches: Vec<Match>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Draw {
    pub fn new(key: DrawKey, format: DrawFormat, now: DateTime<Utc>) -> Self {
        Self {
            tournament_id: key.tournament_id,
            category_id: key.category_id,
            format,
            advance_from_group: 0,
            qualifier_pairing: QualifierPairing::default(),
            participants: Vec::new(),
            groups: Vec::new(),
            matches: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> DrawKey {
        DrawKey::new(self.tournament_id, self.category_id)
    }

    pub fn group(&self, group_id: Uuid) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == group_id)
    }

    pub fn find_match(&self, match_id: Uuid) -> Option<&Match> {
        self.matches.iter().find(|m| m.id == match_id)
    }

    pub fn participant(&self, participant_id: Uuid) -> Option<&Participant> {
        self.participants
            .iter()
            .chain(self.groups.iter().flat_map(|g| g.participants()))
            .find(|p| p.id == participant_id)
    }

    pub fn group_matches(&self, group_id: Uuid) -> impl Iterator<Item = &Match> {
        self.matches
            .iter()
            .filter(move |m| m.stage == MatchStage::Group && m.group_id == Some(group_id))
    }

    pub fn knockout_matches(&self) -> impl Iterator<Item = &Match> {
        self.matches.iter().filter(|m| m.is_knockout())
    }

    /// Number of knockout rounds, 0 when no bracket exists.
    pub fn num_rounds(&self) -> u32 {
        self.knockout_matches().map(|m| m.round).max().unwrap_or(0)
    }

    pub fn bracket_size(&self) -> u32 {
        match self.num_rounds() {
            0 => 0,
            rounds => 1 << rounds,
        }
    }

    pub fn pending_group_matches(&self) -> usize {
        self.matches
            .iter()
            .filter(|m| m.stage == MatchStage::Group && m.status != MatchStatus::Completed)
            .count()
    }

    pub fn started_group_matches(&self) -> usize {
        self.matches
            .iter()
            .filter(|m| m.stage == MatchStage::Group && m.status.is_started())
            .count()
    }

    /// Knockout matches where play began. Byes decided at seeding do not count.
    pub fn started_knockout_matches(&self) -> usize {
        self.knockout_matches()
            .filter(|m| !m.bye && m.status.is_started())
            .count()
    }

    /// Matches with both slots filled that are still pending, group stage first,
    /// then knockout from the earliest round outward.
    pub fn playable_matches(&self) -> Vec<&Match> {
        let mut playable: Vec<&Match> = self.matches.iter().filter(|m| m.is_ready()).collect();
        playable.sort_by_key(|m| {
            (
                m.stage == MatchStage::Knockout,
                std::cmp::Reverse(if m.is_knockout() { m.round } else { 0 }),
                if m.is_knockout() { 0 } else { m.round },
                m.match_number,
            )
        });
        playable
    }

    pub fn group_view(&self, group_id: Uuid) -> Option<GroupView> {
        let group = self.group(group_id)?;
        let mut matches: Vec<Match> = self.group_matches(group_id).cloned().collect();
        matches.sort_by_key(|m| (m.round, m.match_number));
        let standings = standings::compute_standings(&group.slots, &matches);

        Some(GroupView {
            id: group.id,
            name: group.name.clone(),
            matches,
            standings,
        })
    }

    /// Bracket tree regenerated from the match rows, first round to final.
    pub fn knockout_rounds(&self) -> Vec<RoundView> {
        let num_rounds = self.num_rounds();
        match_graph::into_rounds(&self.matches)
            .into_iter()
            .zip(1..num_rounds + 1)
            .rev()
            .map(|(matches, round)| RoundView {
                round,
                name: round_names::round_name(round, num_rounds)
                    .unwrap_or_else(|| format!("Round {}", round)),
                matches: matches
                    .iter()
                    .map(|m| self.match_view(m, round == num_rounds))
                    .collect(),
            })
            .collect()
    }

    fn match_view(&self, m: &Match, first_round: bool) -> MatchView {
        let slot_view = |slot: Slot| {
            let position = (m.match_number - 1) * 2 + if slot == Slot::Player1 { 1 } else { 2 };
            let participant_id = m.player(slot);
            let label = match participant_id {
                Some(id) => self
                    .participant(id)
                    .map(|p| p.display_name.clone())
                    .unwrap_or_else(|| id.to_string()),
                None if first_round && m.bye => "BYE".to_string(),
                None if first_round => format!("Slot {}", position),
                None => "TBD".to_string(),
            };
            SlotView {
                participant_id,
                label,
            }
        };

        MatchView {
            id: m.id,
            match_number: m.match_number,
            player1: slot_view(Slot::Player1),
            player2: slot_view(Slot::Player2),
            status: m.status,
            winner_id: m.winner_id,
            parent_match_id: m.parent_match_id,
            winner_slot: m.winner_slot,
        }
    }

    /// Ids of every participant already placed in the first knockout round.
    pub fn first_round_participants(&self) -> HashSet<Uuid> {
        let first = self.num_rounds();
        self.knockout_matches()
            .filter(|m| m.round == first)
            .flat_map(|m| [m.player1_id, m.player2_id])
            .flatten()
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupView {
    pub id: Uuid,
    pub name: String,
    pub matches: Vec<Match>,
    pub standings: Vec<StandingEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundView {
    pub round: u32,
    pub name: String,
    pub matches: Vec<MatchView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchView {
    pub id: Uuid,
    pub match_number: u32,
    pub player1: SlotView,
    pub player2: SlotView,
    pub status: MatchStatus,
    pub winner_id: Option<Uuid>,
    pub parent_match_id: Option<Uuid>,
    pub winner_slot: Option<Slot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotView {
    pub participant_id: Option<Uuid>,
    pub label: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualifier_pairing_parsing() {
        assert_eq!(
            "concatenate".parse::<QualifierPairing>(),
            Ok(QualifierPairing::Concatenate)
        );
        assert_eq!(
            " Cross_Group ".parse::<QualifierPairing>(),
            Ok(QualifierPairing::CrossGroup)
        );
        assert!("snake".parse::<QualifierPairing>().is_err());
    }

    #[test]
    fn test_format_serialization() {
        assert_eq!(
            serde_json::to_string(&DrawFormat::RoundRobinKnockout).unwrap(),
            "\"ROUND_ROBIN_KNOCKOUT\""
        );
        assert!(DrawFormat::RoundRobinKnockout.has_groups());
        assert!(DrawFormat::RoundRobinKnockout.has_knockout());
        assert!(!DrawFormat::RoundRobin.has_knockout());
        assert!(!DrawFormat::Knockout.has_groups());
    }

    #[test]
    fn test_empty_draw_has_no_bracket() {
        let draw = Draw::new(
            DrawKey::new(Uuid::new_v4(), Uuid::new_v4()),
            DrawFormat::Knockout,
            Utc::now(),
        );
        assert_eq!(draw.num_rounds(), 0);
        assert_eq!(draw.bracket_size(), 0);
        assert!(draw.knockout_rounds().is_empty());
        assert!(draw.playable_matches().is_empty());
    }

    #[test]
    fn test_new_group_stage_validation() {
        let stage = NewGroupStage {
            format: DrawFormat::RoundRobin,
            advance_from_group: Some(0),
            qualifier_pairing: None,
            groups: vec![],
        };
        assert!(stage.validate().is_err());
    }
}
