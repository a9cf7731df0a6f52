//! Round-robin standings derived from completed group matches.

use std::cmp::Reverse;
use std::collections::HashMap;

use tracing::warn;
use uuid::Uuid;

use crate::models::match_model::{Match, MatchStatus};
use crate::models::participant::Participant;
use crate::models::standing::StandingEntry;

pub const POINTS_PER_WIN: u32 = 2;

/// Rank a group from its matches.
///
/// Empty slots are skipped. Only completed matches with a winner and two
/// assigned players count. Ordering is points desc, wins desc, losses asc;
/// remaining ties keep seed order.
pub fn compute_standings(slots: &[Option<Participant>], matches: &[Match]) -> Vec<StandingEntry> {
    let mut participants: Vec<&Participant> = slots.iter().flatten().collect();
    participants.sort_by_key(|p| p.seed);

    let mut entries: Vec<StandingEntry> = participants
        .iter()
        .map(|p| StandingEntry::new(p.id, p.display_name.clone(), p.seed))
        .collect();
    let index: HashMap<Uuid, usize> = entries
        .iter()
        .enumerate()
        .map(|(i, e)| (e.participant_id, i))
        .collect();

    for m in matches {
        if m.status != MatchStatus::Completed {
            continue;
        }
        let (Some(winner), Some(loser)) = (m.winner_id, m.loser_id()) else {
            continue;
        };
        let (Some(&w), Some(&l)) = (index.get(&winner), index.get(&loser)) else {
            warn!(
                match_id = %m.id,
                winner_id = %winner,
                loser_id = %loser,
                "Ignoring match result for participant outside the group"
            );
            continue;
        };

        let winner_entry = &mut entries[w];
        winner_entry.played += 1;
        winner_entry.wins += 1;
        winner_entry.points += POINTS_PER_WIN;

        let loser_entry = &mut entries[l];
        loser_entry.played += 1;
        loser_entry.losses += 1;
    }

    entries.sort_by_key(|e| (Reverse(e.points), Reverse(e.wins), e.losses));
    for (position, entry) in entries.iter_mut().enumerate() {
        entry.rank = position as u32 + 1;
    }

    entries
}

/// Top `count` entries of already-sorted standings.
pub fn qualifiers(standings: &[StandingEntry], count: u32) -> &[StandingEntry] {
    let take = (count as usize).min(standings.len());
    &standings[..take]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(names: &[&str]) -> Vec<Option<Participant>> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| Some(Participant::new(Uuid::new_v4(), *name, i as u32 + 1)))
            .collect()
    }

    fn played(p1: &Participant, p2: &Participant, winner: &Participant) -> Match {
        let mut m = Match::new_group(Uuid::new_v4(), 1, 1, p1.id, p2.id);
        m.status = MatchStatus::Completed;
        m.winner_id = Some(winner.id);
        m
    }

    fn ids(slots: &[Option<Participant>]) -> Vec<Participant> {
        slots.iter().flatten().cloned().collect()
    }

    #[test]
    fn test_wins_award_two_points() {
        let slots = roster(&["A", "B", "C"]);
        let p = ids(&slots);
        let matches = vec![
            played(&p[0], &p[1], &p[1]),
            played(&p[0], &p[2], &p[2]),
            played(&p[1], &p[2], &p[1]),
        ];

        let standings = compute_standings(&slots, &matches);
        assert_eq!(standings[0].display_name, "B");
        assert_eq!(standings[0].wins, 2);
        assert_eq!(standings[0].points, 4);
        assert_eq!(standings[0].rank, 1);
        assert_eq!(standings[1].display_name, "C");
        assert_eq!(standings[2].display_name, "A");
        assert_eq!(standings[2].losses, 2);
        assert_eq!(standings[2].points, 0);
    }

    #[test]
    fn test_points_and_wins_sum_to_completed_matches() {
        let slots = roster(&["A", "B", "C", "D"]);
        let p = ids(&slots);
        let mut matches = vec![
            played(&p[0], &p[1], &p[0]),
            played(&p[2], &p[3], &p[3]),
            played(&p[0], &p[2], &p[2]),
            played(&p[1], &p[3], &p[1]),
        ];
        matches.push(Match::new_group(Uuid::new_v4(), 3, 1, p[0].id, p[3].id));

        let standings = compute_standings(&slots, &matches);
        let wins: u32 = standings.iter().map(|e| e.wins).sum();
        let losses: u32 = standings.iter().map(|e| e.losses).sum();
        let points: u32 = standings.iter().map(|e| e.points).sum();
        assert_eq!(wins, 4);
        assert_eq!(losses, 4);
        assert_eq!(points, 2 * 4);
    }

    #[test]
    fn test_ties_keep_seed_order() {
        let slots = roster(&["A", "B", "C", "D"]);
        let p = ids(&slots);
        let matches = vec![played(&p[2], &p[3], &p[2]), played(&p[0], &p[1], &p[0])];

        let standings = compute_standings(&slots, &matches);
        let order: Vec<&str> = standings.iter().map(|e| e.display_name.as_str()).collect();
        assert_eq!(order, vec!["A", "C", "B", "D"]);
    }

    #[test]
    fn test_empty_slots_and_outsiders_are_ignored() {
        let mut slots = roster(&["A", "B"]);
        slots.push(None);
        let p = ids(&slots);
        let outsider = Participant::new(Uuid::new_v4(), "Z", 9);

        let mut bye = Match::new_group(Uuid::new_v4(), 1, 2, p[0].id, p[1].id);
        bye.player2_id = None;
        bye.status = MatchStatus::Completed;
        bye.winner_id = Some(p[0].id);

        let matches = vec![played(&p[0], &outsider, &outsider), bye];
        let standings = compute_standings(&slots, &matches);
        assert_eq!(standings.len(), 2);
        assert!(standings.iter().all(|e| e.played == 0));
    }

    #[test]
    fn test_qualifiers_clamps_to_group_size() {
        let slots = roster(&["A", "B"]);
        let standings = compute_standings(&slots, &[]);
        assert_eq!(qualifiers(&standings, 1).len(), 1);
        assert_eq!(qualifiers(&standings, 5).len(), 2);
    }
}
