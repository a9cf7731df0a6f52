//! Single-elimination bracket construction.
//!
//! Seeds are placed in the standard order (1 meets the highest seed number,
//! seeds 1 and 2 can only meet in the final). Seed numbers without a
//! participant become byes and their opponents are advanced immediately.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::draw_error::DrawError;
use crate::engine::{advancement, match_graph};
use crate::models::match_model::{Match, MatchStatus, Slot, SlotWrite};
use crate::models::participant::Participant;

/// Smallest power of two holding `participants` entrants, never below 2.
pub fn bracket_size_for(participants: usize) -> u32 {
    (participants.max(2) as u32).next_power_of_two()
}

/// Seed numbers in bracket position order, e.g. `[1, 8, 4, 5, 2, 7, 3, 6]` for 8.
pub fn seed_order(bracket_size: u32) -> Vec<u32> {
    let mut order = vec![1u32];
    while (order.len() as u32) < bracket_size {
        let mirror = order.len() as u32 * 2 + 1;
        order = order.iter().flat_map(|&seed| [seed, mirror - seed]).collect();
    }
    order
}

/// Build and link every knockout round, then auto-advance byes.
///
/// With fewer than two participants the empty positions stay open for manual
/// assignment instead of becoming byes.
pub fn build_bracket(
    participants: &[Participant],
    slot_count: Option<u32>,
    now: DateTime<Utc>,
) -> Result<Vec<Match>, DrawError> {
    let bracket_size = resolve_bracket_size(participants.len(), slot_count)?;
    let by_seed = index_by_seed(participants, bracket_size)?;
    let num_rounds = bracket_size.trailing_zeros();
    let seeded = participants.len() >= 2;

    let mut rounds: Vec<Vec<Match>> = (1..=num_rounds)
        .map(|round| {
            let count = 1u32 << (round - 1);
            (1..=count).map(|n| Match::new_knockout(round, n)).collect()
        })
        .collect();

    let order = seed_order(bracket_size);
    let first_round = &mut rounds[num_rounds as usize - 1];
    for (i, m) in first_round.iter_mut().enumerate() {
        let (top, bottom) = (order[2 * i], order[2 * i + 1]);
        m.player1_id = by_seed.get(&top).copied();
        m.player2_id = by_seed.get(&bottom).copied();

        if seeded {
            match (m.player1_id, m.player2_id) {
                (None, None) => {
                    return Err(DrawError::InvalidBracketSize(format!(
                        "seeds {} and {} are both missing, first-round match {} would be empty",
                        top, bottom, m.match_number
                    )))
                }
                (Some(_), None) | (None, Some(_)) => m.bye = true,
                _ => {}
            }
        }
    }

    match_graph::link_rounds(&mut rounds)?;

    let mut matches: Vec<Match> = rounds.into_iter().rev().flatten().collect();
    advance_byes(&mut matches, now)?;

    debug!(
        bracket_size,
        num_rounds,
        participants = participants.len(),
        byes = matches.iter().filter(|m| m.bye).count(),
        "Built knockout bracket"
    );

    Ok(matches)
}

fn resolve_bracket_size(participants: usize, slot_count: Option<u32>) -> Result<u32, DrawError> {
    let required = bracket_size_for(participants);
    match slot_count {
        None => Ok(required),
        Some(slots) if slots < 2 || !slots.is_power_of_two() => Err(
            DrawError::InvalidBracketSize(format!("slot count {} is not a power of two >= 2", slots)),
        ),
        Some(slots) if slots < required => Err(DrawError::InvalidBracketSize(format!(
            "slot count {} cannot hold {} participants",
            slots, participants
        ))),
        Some(slots) => Ok(slots),
    }
}

fn index_by_seed(
    participants: &[Participant],
    bracket_size: u32,
) -> Result<HashMap<u32, Uuid>, DrawError> {
    let mut by_seed = HashMap::with_capacity(participants.len());
    let mut ids = HashSet::with_capacity(participants.len());

    for p in participants {
        if !ids.insert(p.id) {
            return Err(DrawError::Validation(format!(
                "participant {} is listed more than once",
                p.id
            )));
        }
        if p.seed == 0 || p.seed > bracket_size {
            return Err(DrawError::InvalidBracketSize(format!(
                "seed {} of {} is outside 1..={}",
                p.seed, p.display_name, bracket_size
            )));
        }
        if by_seed.insert(p.seed, p.id).is_some() {
            return Err(DrawError::InvalidBracketSize(format!(
                "seed {} is assigned more than once",
                p.seed
            )));
        }
    }

    Ok(by_seed)
}

/// Complete every pending bye match in favour of its only player.
pub fn advance_byes(matches: &mut [Match], now: DateTime<Utc>) -> Result<usize, DrawError> {
    let byes: Vec<Uuid> = matches
        .iter()
        .filter(|m| m.bye && m.status == MatchStatus::Pending)
        .map(|m| m.id)
        .collect();

    for id in &byes {
        advancement::advance_bye(matches, *id, now)?;
    }

    Ok(byes.len())
}

/// Clear every knockout result while keeping first-round players. Later
/// rounds lose their players, then byes are re-advanced with the completion
/// time they were first decided at. Group matches are not touched.
pub fn restart_bracket(matches: &mut [Match], now: DateTime<Utc>) -> Result<(), DrawError> {
    let first_round = first_knockout_round(matches);
    let decided_byes: HashMap<Uuid, DateTime<Utc>> = matches
        .iter()
        .filter(|m| m.bye)
        .filter_map(|m| m.completed_at.map(|at| (m.id, at)))
        .collect();

    for m in matches.iter_mut().filter(|m| m.is_knockout()) {
        m.clear_result();
        if m.round != first_round {
            m.player1_id = None;
            m.player2_id = None;
        }
    }

    advance_byes(matches, now)?;
    for m in matches.iter_mut() {
        if let Some(at) = decided_byes.get(&m.id) {
            m.completed_at = Some(*at);
        }
    }
    Ok(())
}

/// Turn every first-round match holding a single player into a bye and
/// advance it. Used once manual assignment is finished.
pub fn close_open_slots(matches: &mut [Match], now: DateTime<Utc>) -> Result<usize, DrawError> {
    let first_round = first_knockout_round(matches);
    let open: Vec<&Match> = matches
        .iter()
        .filter(|m| m.is_knockout() && m.round == first_round && m.status == MatchStatus::Pending)
        .filter(|m| !m.bye)
        .collect();

    if let Some(empty) = open
        .iter()
        .find(|m| m.player1_id.is_none() && m.player2_id.is_none())
    {
        return Err(DrawError::SlotUnavailable(format!(
            "first-round match {} has no players and cannot become a bye",
            empty.match_number
        )));
    }

    let closing: HashSet<Uuid> = open
        .iter()
        .filter(|m| m.player1_id.is_some() != m.player2_id.is_some())
        .map(|m| m.id)
        .collect();
    for m in matches.iter_mut().filter(|m| closing.contains(&m.id)) {
        m.bye = true;
    }

    advance_byes(matches, now)
}

fn first_knockout_round(matches: &[Match]) -> u32 {
    matches
        .iter()
        .filter(|m| m.is_knockout())
        .map(|m| m.round)
        .max()
        .unwrap_or(0)
}

/// Place a participant into an open first-round slot.
pub fn assign_slot(
    matches: &mut [Match],
    match_id: Uuid,
    slot: Slot,
    participant_id: Uuid,
) -> Result<SlotWrite, DrawError> {
    let first_round = first_knockout_round(matches);

    let index = matches
        .iter()
        .position(|m| m.id == match_id)
        .ok_or_else(|| DrawError::not_found(format!("match {}", match_id)))?;

    let target = &matches[index];
    if !target.is_knockout() || target.round != first_round {
        return Err(DrawError::SlotUnavailable(format!(
            "match {} is not a first-round knockout match",
            match_id
        )));
    }
    if target.status != MatchStatus::Pending || target.bye {
        return Err(DrawError::SlotUnavailable(format!(
            "match {} is {} and cannot take new players",
            match_id,
            if target.bye { "a bye".to_string() } else { target.status.to_string() }
        )));
    }
    if let Some(existing) = target.player(slot) {
        return Err(DrawError::SlotUnavailable(format!(
            "{} of match {} is already held by {}",
            slot, match_id, existing
        )));
    }
    if matches
        .iter()
        .any(|m| m.is_knockout() && m.round == first_round && m.has_player(participant_id))
    {
        return Err(DrawError::SlotUnavailable(format!(
            "participant {} is already placed in the first round",
            participant_id
        )));
    }

    matches[index].set_player(slot, Some(participant_id));
    Ok(SlotWrite {
        match_id,
        slot,
        participant_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(n: u32) -> Vec<Participant> {
        (1..=n)
            .map(|seed| Participant::new(Uuid::new_v4(), format!("Player {}", seed), seed))
            .collect()
    }

    fn first_round(matches: &[Match]) -> Vec<&Match> {
        let rounds = matches.iter().map(|m| m.round).max().unwrap();
        let mut first: Vec<&Match> = matches.iter().filter(|m| m.round == rounds).collect();
        first.sort_by_key(|m| m.match_number);
        first
    }

    #[test]
    fn test_bracket_size_rounding() {
        assert_eq!(bracket_size_for(0), 2);
        assert_eq!(bracket_size_for(1), 2);
        assert_eq!(bracket_size_for(2), 2);
        assert_eq!(bracket_size_for(3), 4);
        assert_eq!(bracket_size_for(5), 8);
        assert_eq!(bracket_size_for(16), 16);
        assert_eq!(bracket_size_for(17), 32);
    }

    #[test]
    fn test_seed_order() {
        assert_eq!(seed_order(2), vec![1, 2]);
        assert_eq!(seed_order(4), vec![1, 4, 2, 3]);
        assert_eq!(seed_order(8), vec![1, 8, 4, 5, 2, 7, 3, 6]);

        let order = seed_order(16);
        let top_half = &order[..8];
        assert!(top_half.contains(&1));
        assert!(!top_half.contains(&2));
    }

    #[test]
    fn test_bracket_shape_for_every_size() {
        let now = Utc::now();
        for n in 0..=40u32 {
            let matches = build_bracket(&seeded(n), None, now).unwrap();
            let size = bracket_size_for(n as usize);
            let num_rounds = size.trailing_zeros();

            assert_eq!(matches.len() as u32, size - 1, "n = {}", n);
            assert_eq!(matches.iter().filter(|m| m.round == 1).count(), 1);
            for round in 1..=num_rounds {
                let count = matches.iter().filter(|m| m.round == round).count() as u32;
                assert_eq!(count, 1u32 << (round - 1), "n = {}, round = {}", n, round);
            }
            assert!(match_graph::validate(&matches).is_ok(), "n = {}", n);
        }
    }

    #[test]
    fn test_five_players_get_three_byes() {
        let players = seeded(5);
        let matches = build_bracket(&players, None, Utc::now()).unwrap();
        assert_eq!(matches.len(), 7);

        let first = first_round(&matches);
        assert_eq!(first.len(), 4);
        let with_gap = first
            .iter()
            .filter(|m| m.player1_id.is_none() || m.player2_id.is_none())
            .count();
        assert_eq!(with_gap, 3);
        assert!(first.iter().filter(|m| m.bye).all(|m| m.status == MatchStatus::Completed));

        // seed 1 vs (bye 8), 4 vs 5, 2 vs (bye 7), 3 vs (bye 6)
        assert_eq!(first[0].player1_id, Some(players[0].id));
        assert_eq!(first[1].player1_id, Some(players[3].id));
        assert_eq!(first[1].player2_id, Some(players[4].id));
        assert!(first[1].is_ready());

        let semis: Vec<&Match> = matches.iter().filter(|m| m.round == 2).collect();
        let advanced: HashSet<Uuid> = semis
            .iter()
            .flat_map(|m| [m.player1_id, m.player2_id])
            .flatten()
            .collect();
        assert_eq!(advanced.len(), 3);
        assert!(advanced.contains(&players[0].id));
        assert!(advanced.contains(&players[1].id));
        assert!(advanced.contains(&players[2].id));
    }

    #[test]
    fn test_small_rosters_leave_open_slots() {
        let matches = build_bracket(&[], None, Utc::now()).unwrap();
        assert_eq!(matches.len(), 1);
        assert!(matches[0].player1_id.is_none() && matches[0].player2_id.is_none());

        let solo = seeded(1);
        let matches = build_bracket(&solo, None, Utc::now()).unwrap();
        assert_eq!(matches[0].player1_id, Some(solo[0].id));
        assert!(!matches[0].bye);
        assert_eq!(matches[0].status, MatchStatus::Pending);
    }

    #[test]
    fn test_manual_mode_bracket_has_no_byes() {
        let matches = build_bracket(&[], Some(8), Utc::now()).unwrap();
        assert_eq!(matches.len(), 7);
        assert!(matches.iter().all(|m| !m.bye && m.status == MatchStatus::Pending));
        assert!(matches.iter().all(|m| m.player1_id.is_none() && m.player2_id.is_none()));
    }

    #[test]
    fn test_inconsistent_sizes_are_rejected() {
        let now = Utc::now();
        assert!(matches!(
            build_bracket(&seeded(3), Some(6), now),
            Err(DrawError::InvalidBracketSize(_))
        ));
        assert!(matches!(
            build_bracket(&seeded(5), Some(4), now),
            Err(DrawError::InvalidBracketSize(_))
        ));
        // seeds 4 and 5 both absent in an 8 bracket
        assert!(matches!(
            build_bracket(&seeded(2), Some(8), now),
            Err(DrawError::InvalidBracketSize(_))
        ));

        let mut duplicate_seed = seeded(3);
        duplicate_seed[2].seed = 1;
        assert!(matches!(
            build_bracket(&duplicate_seed, None, now),
            Err(DrawError::InvalidBracketSize(_))
        ));

        let mut out_of_range = seeded(3);
        out_of_range[2].seed = 9;
        assert!(matches!(
            build_bracket(&out_of_range, None, now),
            Err(DrawError::InvalidBracketSize(_))
        ));
    }

    #[test]
    fn test_seed_gap_becomes_bye() {
        let players: Vec<Participant> = [1, 2, 5, 6]
            .iter()
            .map(|&seed| Participant::new(Uuid::new_v4(), format!("Seed {}", seed), seed))
            .collect();

        // 1 v (8), (4) v 5, 2 v (7), (3) v 6
        let matches = build_bracket(&players, Some(8), Utc::now()).unwrap();
        let first = first_round(&matches);
        assert!(first.iter().all(|m| m.bye && m.status == MatchStatus::Completed));
        assert_eq!(first[1].winner_id, Some(players[2].id));
        assert_eq!(first[3].winner_id, Some(players[3].id));

        let semis: Vec<&Match> = matches.iter().filter(|m| m.round == 2).collect();
        assert!(semis.iter().all(|m| m.is_ready()));
    }

    #[test]
    fn test_restart_keeps_first_round_and_replays_byes() {
        let players = seeded(6);
        let mut matches = build_bracket(&players, None, Utc::now()).unwrap();
        let before: Vec<(Uuid, Option<Uuid>, Option<Uuid>)> = first_round(&matches)
            .iter()
            .map(|m| (m.id, m.player1_id, m.player2_id))
            .collect();

        let playable = matches.iter().find(|m| m.is_ready()).unwrap().clone();
        advancement::complete_match(
            &mut matches,
            playable.id,
            playable.player1_id.unwrap(),
            None,
            Utc::now(),
        )
        .unwrap();

        restart_bracket(&mut matches, Utc::now()).unwrap();
        let after: Vec<(Uuid, Option<Uuid>, Option<Uuid>)> = first_round(&matches)
            .iter()
            .map(|m| (m.id, m.player1_id, m.player2_id))
            .collect();
        assert_eq!(before, after);

        let ready = matches.iter().find(|m| m.id == playable.id).unwrap();
        assert_eq!(ready.status, MatchStatus::Pending);
        assert!(ready.winner_id.is_none());

        let parent_id = ready.parent_match_id.unwrap();
        let parent = matches.iter().find(|m| m.id == parent_id).unwrap();
        assert!(parent.player(ready.winner_slot.unwrap()).is_none());
        assert!(match_graph::validate(&matches).is_ok());
    }

    #[test]
    fn test_restart_leaves_group_matches_and_bye_times_alone() {
        let seeded_at = Utc::now() - chrono::Duration::minutes(30);
        let mut matches = build_bracket(&seeded(5), None, seeded_at).unwrap();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut group_match = Match::new_group(Uuid::new_v4(), 1, 1, a, b);
        group_match.status = MatchStatus::Completed;
        group_match.winner_id = Some(a);
        group_match.completed_at = Some(seeded_at);
        matches.push(group_match.clone());
        let before = matches.clone();

        restart_bracket(&mut matches, Utc::now()).unwrap();
        assert_eq!(matches, before);

        restart_bracket(&mut matches, Utc::now()).unwrap();
        assert_eq!(matches, before);
        assert!(matches.iter().any(|m| m.bye && m.completed_at == Some(seeded_at)));
    }

    #[test]
    fn test_close_open_slots_turns_lone_players_into_byes() {
        let mut matches = build_bracket(&[], Some(4), Utc::now()).unwrap();
        let first: Vec<Uuid> = first_round(&matches).iter().map(|m| m.id).collect();
        let players: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        assign_slot(&mut matches, first[0], Slot::Player1, players[0]).unwrap();
        assign_slot(&mut matches, first[0], Slot::Player2, players[1]).unwrap();
        assign_slot(&mut matches, first[1], Slot::Player2, players[2]).unwrap();

        let closed = close_open_slots(&mut matches, Utc::now()).unwrap();
        assert_eq!(closed, 1);

        let lone = matches.iter().find(|m| m.id == first[1]).unwrap();
        assert!(lone.bye);
        assert_eq!(lone.status, MatchStatus::Completed);
        assert_eq!(lone.winner_id, Some(players[2]));

        let final_match = matches.iter().find(|m| m.round == 1).unwrap();
        assert_eq!(final_match.player2_id, Some(players[2]));
        assert!(!matches.iter().find(|m| m.id == first[0]).unwrap().bye);
        assert!(match_graph::validate(&matches).is_ok());

        assert_eq!(close_open_slots(&mut matches, Utc::now()).unwrap(), 0);
    }

    #[test]
    fn test_close_open_slots_rejects_empty_matches() {
        let mut matches = build_bracket(&[], Some(4), Utc::now()).unwrap();
        let first: Vec<Uuid> = first_round(&matches).iter().map(|m| m.id).collect();
        assign_slot(&mut matches, first[0], Slot::Player1, Uuid::new_v4()).unwrap();
        let before = matches.clone();

        assert!(matches!(
            close_open_slots(&mut matches, Utc::now()),
            Err(DrawError::SlotUnavailable(_))
        ));
        assert_eq!(matches, before);
    }

    #[test]
    fn test_assign_slot_rules() {
        let mut matches = build_bracket(&[], Some(4), Utc::now()).unwrap();
        let first: Vec<Uuid> = first_round(&matches).iter().map(|m| m.id).collect();
        let final_id = matches.iter().find(|m| m.round == 1).unwrap().id;
        let player = Uuid::new_v4();

        let write = assign_slot(&mut matches, first[0], Slot::Player2, player).unwrap();
        assert_eq!(write.slot, Slot::Player2);
        assert_eq!(
            matches.iter().find(|m| m.id == first[0]).unwrap().player2_id,
            Some(player)
        );

        assert!(matches!(
            assign_slot(&mut matches, first[0], Slot::Player2, Uuid::new_v4()),
            Err(DrawError::SlotUnavailable(_))
        ));
        assert!(matches!(
            assign_slot(&mut matches, first[1], Slot::Player1, player),
            Err(DrawError::SlotUnavailable(_))
        ));
        assert!(matches!(
            assign_slot(&mut matches, final_id, Slot::Player1, Uuid::new_v4()),
            Err(DrawError::SlotUnavailable(_))
        ));
        assert!(matches!(
            assign_slot(&mut matches, Uuid::new_v4(), Slot::Player1, Uuid::new_v4()),
            Err(DrawError::NotFound(_))
        ));
    }
}
