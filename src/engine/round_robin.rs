//! Group fixtures via the circle method.

use uuid::Uuid;

use crate::models::draw::Group;
use crate::models::match_model::Match;

/// Every pairing of the group's participants exactly once, spread over
/// `n - 1` rounds (`n` rounded up to even). In odd groups one participant
/// rests each round; no match row is created for the rest.
pub fn generate_fixtures(group: &Group) -> Vec<Match> {
    let mut seeded: Vec<_> = group.participants().collect();
    seeded.sort_by_key(|p| p.seed);

    let mut ring: Vec<Option<Uuid>> = seeded.iter().map(|p| Some(p.id)).collect();
    if ring.len() < 2 {
        return Vec::new();
    }
    if ring.len() % 2 == 1 {
        ring.push(None);
    }

    let n = ring.len();
    let mut fixtures = Vec::with_capacity(n * (n - 1) / 2);
    for round in 1..n as u32 {
        let mut match_number = 0;
        for i in 0..n / 2 {
            if let (Some(home), Some(away)) = (ring[i], ring[n - 1 - i]) {
                match_number += 1;
                fixtures.push(Match::new_group(group.id, round, match_number, home, away));
            }
        }
        ring[1..].rotate_right(1);
    }

    fixtures
}
