//! Parent/child wiring of knockout matches and the structural checks that
//! guard it.
//!
//! Child `i` (zero-based) of round `r` feeds match `i / 2` of round `r - 1`,
//! taking `player1` when `i` is even and `player2` when it is odd. The final
//! (round 1) has no parent.

use std::collections::HashMap;

use uuid::Uuid;

use crate::draw_error::DrawError;
use crate::models::match_model::{Match, MatchStatus, Slot};

/// Assign `parent_match_id` / `winner_slot` on every match.
///
/// `rounds[0]` is the final, `rounds[k]` is round `k + 1`; each round must be
/// sorted by match number. Running this on an already linked structure yields
/// the same links.
pub fn link_rounds(rounds: &mut [Vec<Match>]) -> Result<(), DrawError> {
    for k in 0..rounds.len() {
        if k == 0 {
            if rounds[0].len() != 1 {
                return Err(DrawError::InvalidBracketSize(format!(
                    "final round must hold exactly one match, found {}",
                    rounds[0].len()
                )));
            }
            let last = &mut rounds[0][0];
            last.parent_match_id = None;
            last.winner_slot = None;
            continue;
        }

        let (inner, outer) = rounds.split_at_mut(k);
        let parents = &inner[k - 1];
        let children = &mut outer[0];
        if children.len() != parents.len() * 2 {
            return Err(DrawError::InvalidBracketSize(format!(
                "round {} holds {} matches, expected {}",
                k + 1,
                children.len(),
                parents.len() * 2
            )));
        }

        for (i, child) in children.iter_mut().enumerate() {
            child.parent_match_id = Some(parents[i / 2].id);
            child.winner_slot = Some(Slot::for_child_index(i));
        }
    }

    Ok(())
}

/// Group knockout matches by round, final first, each round by match number.
pub fn into_rounds(matches: &[Match]) -> Vec<Vec<Match>> {
    let num_rounds = matches
        .iter()
        .filter(|m| m.is_knockout())
        .map(|m| m.round)
        .max()
        .unwrap_or(0);

    (1..=num_rounds)
        .map(|round| {
            let mut in_round: Vec<Match> = matches
                .iter()
                .filter(|m| m.is_knockout() && m.round == round)
                .cloned()
                .collect();
            in_round.sort_by_key(|m| m.match_number);
            in_round
        })
        .collect()
}

/// Locate the parent a completed child writes into.
///
/// Returns `None` for the final and for group matches. Any missing or
/// inconsistent link is reported as corruption.
pub fn resolve_parent(matches: &[Match], child: &Match) -> Result<Option<(usize, Slot)>, DrawError> {
    if !child.is_knockout() {
        if child.parent_match_id.is_some() {
            return Err(DrawError::corrupt(format!(
                "group match {} is linked to a knockout parent",
                child.id
            )));
        }
        return Ok(None);
    }

    if child.round == 1 {
        if child.parent_match_id.is_some() || child.winner_slot.is_some() {
            return Err(DrawError::corrupt(format!(
                "final {} carries a parent link",
                child.id
            )));
        }
        return Ok(None);
    }

    let parent_id = child.parent_match_id.ok_or_else(|| {
        DrawError::corrupt(format!(
            "match {} in round {} has no parent",
            child.id, child.round
        ))
    })?;
    let slot = child.winner_slot.ok_or_else(|| {
        DrawError::corrupt(format!("match {} has a parent but no winner slot", child.id))
    })?;
    let position = matches
        .iter()
        .position(|m| m.id == parent_id)
        .ok_or_else(|| {
            DrawError::corrupt(format!(
                "parent {} of match {} does not exist",
                parent_id, child.id
            ))
        })?;

    let parent = &matches[position];
    if !parent.is_knockout() || parent.round + 1 != child.round {
        return Err(DrawError::corrupt(format!(
            "match {} in round {} points to match {} in round {}",
            child.id, child.round, parent.id, parent.round
        )));
    }

    let siblings_in_slot = matches
        .iter()
        .filter(|m| m.parent_match_id == Some(parent_id) && m.winner_slot == Some(slot))
        .count();
    if siblings_in_slot != 1 {
        return Err(DrawError::corrupt(format!(
            "{} matches feed {} of match {}",
            siblings_in_slot, slot, parent_id
        )));
    }

    Ok(Some((position, slot)))
}

/// Full structural check of a draw's matches.
pub fn validate(matches: &[Match]) -> Result<(), DrawError> {
    for m in matches {
        check_outcome(m)?;
    }

    let knockout: Vec<&Match> = matches.iter().filter(|m| m.is_knockout()).collect();
    if knockout.is_empty() {
        return Ok(());
    }

    let by_id: HashMap<Uuid, &Match> = knockout.iter().map(|m| (m.id, *m)).collect();
    if by_id.len() != knockout.len() {
        return Err(DrawError::corrupt("duplicate knockout match ids"));
    }

    let num_rounds = knockout.iter().map(|m| m.round).max().unwrap_or(0);
    for round in 1..=num_rounds {
        let expected = 1u32 << (round - 1);
        let mut numbers: Vec<u32> = knockout
            .iter()
            .filter(|m| m.round == round)
            .map(|m| m.match_number)
            .collect();
        numbers.sort_unstable();
        if numbers != (1..=expected).collect::<Vec<u32>>() {
            return Err(DrawError::corrupt(format!(
                "round {} has match numbers {:?}, expected 1..={}",
                round, numbers, expected
            )));
        }
    }
    if knockout.iter().any(|m| m.round == 0) {
        return Err(DrawError::corrupt("knockout match with round 0"));
    }

    let mut fed_slots: HashMap<(Uuid, Slot), Uuid> = HashMap::new();
    for m in &knockout {
        if m.round == 1 {
            if m.parent_match_id.is_some() || m.winner_slot.is_some() {
                return Err(DrawError::corrupt(format!("final {} carries a parent link", m.id)));
            }
            continue;
        }

        let (parent_id, slot) = match (m.parent_match_id, m.winner_slot) {
            (Some(parent_id), Some(slot)) => (parent_id, slot),
            (None, _) => {
                return Err(DrawError::corrupt(format!(
                    "match {} in round {} has no parent",
                    m.id, m.round
                )))
            }
            (Some(_), None) => {
                return Err(DrawError::corrupt(format!(
                    "match {} has a parent but no winner slot",
                    m.id
                )))
            }
        };

        let parent = by_id.get(&parent_id).ok_or_else(|| {
            DrawError::corrupt(format!("parent {} of match {} does not exist", parent_id, m.id))
        })?;
        if parent.round + 1 != m.round {
            return Err(DrawError::corrupt(format!(
                "match {} in round {} points to round {}",
                m.id, m.round, parent.round
            )));
        }

        let child_index = (m.match_number - 1) as usize;
        if parent.match_number != m.match_number.div_ceil(2)
            || slot != Slot::for_child_index(child_index)
        {
            return Err(DrawError::corrupt(format!(
                "match {} of round {} is wired to {} of match {}",
                m.match_number, m.round, slot, parent.match_number
            )));
        }

        if let Some(sibling) = fed_slots.insert((parent_id, slot), m.id) {
            return Err(DrawError::corrupt(format!(
                "matches {} and {} both feed {} of match {}",
                sibling, m.id, slot, parent_id
            )));
        }
    }

    Ok(())
}

fn check_outcome(m: &Match) -> Result<(), DrawError> {
    let completed = m.status == MatchStatus::Completed;
    match m.winner_id {
        Some(winner) if !m.has_player(winner) => Err(DrawError::corrupt(format!(
            "winner {} of match {} is not one of its players",
            winner, m.id
        ))),
        Some(_) if !completed => Err(DrawError::corrupt(format!(
            "match {} has a winner but status {}",
            m.id, m.status
        ))),
        None if completed => Err(DrawError::corrupt(format!(
            "match {} is completed without a winner",
            m.id
        ))),
        _ => Ok(()),
    }
}

/// JSON dump of the match graph for diagnostics.
pub fn graph_dump(matches: &[Match]) -> String {
    serde_json::to_string(matches).unwrap_or_else(|e| format!("<unserializable graph: {}>", e))
}
