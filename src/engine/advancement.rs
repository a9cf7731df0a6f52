//! Match completion and one-level winner advancement.
//!
//! A completed match writes its winner into exactly one slot of its parent and
//! touches nothing else. Higher rounds only move when their own match
//! completes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::draw_error::DrawError;
use crate::engine::match_graph;
use crate::models::match_model::{Match, MatchStatus, SlotWrite};

/// Outcome of a completion: the finished match and, unless it was the final,
/// the parent write it caused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancementResult {
    pub completed: Match,
    pub parent_write: Option<SlotWrite>,
    pub updated_parent: Option<Match>,
}

/// Record a reported result and advance the winner.
pub fn complete_match(
    matches: &mut [Match],
    match_id: Uuid,
    winner_id: Uuid,
    score_summary: Option<String>,
    now: DateTime<Utc>,
) -> Result<AdvancementResult, DrawError> {
    let index = position(matches, match_id)?;
    let m = &matches[index];

    if m.status == MatchStatus::Completed {
        return Err(DrawError::AlreadyCompleted(match_id));
    }
    if !m.has_player(winner_id) {
        return Err(DrawError::InvalidWinner {
            match_id,
            winner_id,
        });
    }
    if m.player1_id.is_none() || m.player2_id.is_none() {
        return Err(DrawError::MatchNotReady(match_id));
    }

    finish(matches, index, winner_id, score_summary, now)
}

/// Decide a bye match in favour of its only player.
pub fn advance_bye(
    matches: &mut [Match],
    match_id: Uuid,
    now: DateTime<Utc>,
) -> Result<AdvancementResult, DrawError> {
    let index = position(matches, match_id)?;
    let m = &matches[index];

    if m.status == MatchStatus::Completed {
        return Err(DrawError::AlreadyCompleted(match_id));
    }
    let winner_id = m.bye_player().ok_or_else(|| {
        DrawError::corrupt(format!("bye match {} does not hold exactly one player", match_id))
    })?;

    finish(matches, index, winner_id, None, now)
}

/// `PENDING -> IN_PROGRESS` for a match with both players assigned.
pub fn start_match(
    matches: &mut [Match],
    match_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Match, DrawError> {
    let index = position(matches, match_id)?;
    let m = &mut matches[index];

    if m.status == MatchStatus::Completed {
        return Err(DrawError::AlreadyCompleted(match_id));
    }
    if !m.status.can_transition_to(&MatchStatus::InProgress) {
        let allowed: Vec<String> = m
            .status
            .valid_next_states()
            .iter()
            .map(|s| s.to_string())
            .collect();
        return Err(DrawError::Validation(format!(
            "match {} cannot move from {} to {} (allowed: {})",
            match_id,
            m.status,
            MatchStatus::InProgress,
            allowed.join(", ")
        )));
    }
    if !m.is_ready() {
        return Err(DrawError::MatchNotReady(match_id));
    }

    m.status = MatchStatus::InProgress;
    m.started_at = Some(now);
    Ok(m.clone())
}

fn position(matches: &[Match], match_id: Uuid) -> Result<usize, DrawError> {
    matches
        .iter()
        .position(|m| m.id == match_id)
        .ok_or_else(|| DrawError::not_found(format!("match {}", match_id)))
}

fn finish(
    matches: &mut [Match],
    index: usize,
    winner_id: Uuid,
    score_summary: Option<String>,
    now: DateTime<Utc>,
) -> Result<AdvancementResult, DrawError> {
    // Resolve and check the parent before touching anything
    let parent = match_graph::resolve_parent(matches, &matches[index])?;
    if let Some((p, slot)) = parent {
        let target = &matches[p];
        if target.status == MatchStatus::Completed {
            return Err(DrawError::corrupt(format!(
                "parent {} of match {} is already completed",
                target.id, matches[index].id
            )));
        }
        if let Some(occupant) = target.player(slot) {
            if occupant != winner_id {
                return Err(DrawError::corrupt(format!(
                    "{} of match {} already holds {}",
                    slot, target.id, occupant
                )));
            }
        }
    }

    let m = &mut matches[index];
    m.status = MatchStatus::Completed;
    m.winner_id = Some(winner_id);
    m.completed_at = Some(now);
    if score_summary.is_some() {
        m.score_summary = score_summary;
    }
    let completed = m.clone();

    let Some((p, slot)) = parent else {
        return Ok(AdvancementResult {
            completed,
            parent_write: None,
            updated_parent: None,
        });
    };

    let target = &mut matches[p];
    target.set_player(slot, Some(winner_id));

    Ok(AdvancementResult {
        completed,
        parent_write: Some(SlotWrite {
            match_id: target.id,
            slot,
            participant_id: winner_id,
        }),
        updated_parent: Some(target.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::seeder;
    use crate::models::match_model::Slot;
    use crate::models::participant::Participant;

    fn bracket(n: u32) -> (Vec<Participant>, Vec<Match>) {
        let players: Vec<Participant> = (1..=n)
            .map(|seed| Participant::new(Uuid::new_v4(), format!("P{}", seed), seed))
            .collect();
        let matches = seeder::build_bracket(&players, None, Utc::now()).unwrap();
        (players, matches)
    }

    fn find(matches: &[Match], round: u32, number: u32) -> Match {
        matches
            .iter()
            .find(|m| m.round == round && m.match_number == number)
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_semifinal_winner_lands_in_final_slot() {
        let (_, mut matches) = bracket(4);
        let semi = find(&matches, 2, 1);
        assert_eq!(semi.winner_slot, Some(Slot::Player1));
        let winner = semi.player1_id.unwrap();

        let result = complete_match(&mut matches, semi.id, winner, None, Utc::now()).unwrap();

        let final_match = find(&matches, 1, 1);
        assert_eq!(final_match.player1_id, Some(winner));
        assert!(final_match.player2_id.is_none());
        assert_eq!(final_match.status, MatchStatus::Pending);
        assert!(!final_match.is_ready());

        assert_eq!(result.completed.winner_id, Some(winner));
        assert_eq!(result.updated_parent.unwrap().id, final_match.id);
        assert_eq!(
            result.parent_write,
            Some(SlotWrite {
                match_id: final_match.id,
                slot: Slot::Player1,
                participant_id: winner,
            })
        );
    }

    #[test]
    fn test_only_the_parent_is_mutated() {
        let (_, mut matches) = bracket(8);
        for m in matches.clone().iter().filter(|m| m.round == 3) {
            let before = matches.clone();
            let winner = m.player2_id.unwrap();
            complete_match(&mut matches, m.id, winner, None, Utc::now()).unwrap();

            let parent_id = m.parent_match_id.unwrap();
            for (old, new) in before.iter().zip(matches.iter()) {
                if new.id == m.id {
                    assert_eq!(new.status, MatchStatus::Completed);
                } else if new.id == parent_id {
                    assert_eq!(new.player(m.winner_slot.unwrap()), Some(winner));
                    assert_eq!(new.player(m.winner_slot.unwrap().other()), old.player(m.winner_slot.unwrap().other()));
                } else {
                    assert_eq!(old, new);
                }
            }
        }
    }

    #[test]
    fn test_double_completion_is_rejected_without_side_effects() {
        let (_, mut matches) = bracket(4);
        let semi = find(&matches, 2, 2);
        let winner = semi.player1_id.unwrap();
        complete_match(&mut matches, semi.id, winner, None, Utc::now()).unwrap();
        let after_first = matches.clone();

        let err = complete_match(&mut matches, semi.id, semi.player2_id.unwrap(), None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, DrawError::AlreadyCompleted(id) if id == semi.id));
        assert_eq!(matches, after_first);
    }

    #[test]
    fn test_winner_must_be_a_player() {
        let (_, mut matches) = bracket(2);
        let final_match = find(&matches, 1, 1);
        let err = complete_match(&mut matches, final_match.id, Uuid::new_v4(), None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, DrawError::InvalidWinner { .. }));
        assert_eq!(find(&matches, 1, 1).status, MatchStatus::Pending);
    }

    #[test]
    fn test_incomplete_match_cannot_be_decided() {
        let (_, mut matches) = bracket(4);
        let semi = find(&matches, 2, 1);
        let winner = semi.player1_id.unwrap();
        complete_match(&mut matches, semi.id, winner, None, Utc::now()).unwrap();

        let final_match = find(&matches, 1, 1);
        let err = complete_match(&mut matches, final_match.id, winner, None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, DrawError::MatchNotReady(_)));
    }

    #[test]
    fn test_outsider_on_half_filled_match_is_an_invalid_winner() {
        let (_, mut matches) = bracket(4);
        let semi = find(&matches, 2, 1);
        complete_match(&mut matches, semi.id, semi.player1_id.unwrap(), None, Utc::now()).unwrap();

        let final_match = find(&matches, 1, 1);
        let outsider = Uuid::new_v4();
        let err = complete_match(&mut matches, final_match.id, outsider, None, Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            DrawError::InvalidWinner { match_id, winner_id }
                if match_id == final_match.id && winner_id == outsider
        ));
        assert_eq!(find(&matches, 1, 1), final_match);
    }

    #[test]
    fn test_final_has_no_parent_write() {
        let (players, mut matches) = bracket(2);
        let final_match = find(&matches, 1, 1);
        let result = complete_match(
            &mut matches,
            final_match.id,
            players[1].id,
            Some("21-12 21-16".to_string()),
            Utc::now(),
        )
        .unwrap();
        assert!(result.parent_write.is_none());
        assert!(result.updated_parent.is_none());
        assert_eq!(result.completed.score_summary.as_deref(), Some("21-12 21-16"));
    }

    #[test]
    fn test_missing_parent_is_reported_as_corruption() {
        let (_, mut matches) = bracket(4);
        let semi = find(&matches, 2, 1);
        let index = matches.iter().position(|m| m.id == semi.id).unwrap();
        matches[index].parent_match_id = None;
        let snapshot = matches.clone();

        let err = complete_match(&mut matches, semi.id, semi.player1_id.unwrap(), None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, DrawError::CorruptBracket(_)));
        assert_eq!(matches, snapshot);
    }

    #[test]
    fn test_occupied_parent_slot_is_not_overwritten() {
        let (_, mut matches) = bracket(4);
        let semi = find(&matches, 2, 1);
        let final_index = matches.iter().position(|m| m.round == 1).unwrap();
        matches[final_index].player1_id = Some(Uuid::new_v4());

        let err = complete_match(&mut matches, semi.id, semi.player1_id.unwrap(), None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, DrawError::CorruptBracket(_)));
        assert_eq!(find(&matches, 2, 1).status, MatchStatus::Pending);
    }

    #[test]
    fn test_start_match() {
        let (_, mut matches) = bracket(4);
        let semi = find(&matches, 2, 1);
        let started = start_match(&mut matches, semi.id, Utc::now()).unwrap();
        assert_eq!(started.status, MatchStatus::InProgress);
        assert!(started.started_at.is_some());
        assert!(start_match(&mut matches, semi.id, Utc::now()).is_err());

        let final_match = find(&matches, 1, 1);
        assert!(matches!(
            start_match(&mut matches, final_match.id, Utc::now()),
            Err(DrawError::MatchNotReady(_))
        ));

        complete_match(&mut matches, semi.id, semi.player1_id.unwrap(), None, Utc::now()).unwrap();
        assert!(matches!(
            start_match(&mut matches, semi.id, Utc::now()),
            Err(DrawError::AlreadyCompleted(_))
        ));
    }
}
