/// Display name of knockout `round` (1 = final) in a bracket of `num_rounds`.
/// `None` when the round does not exist.
pub fn round_name(round: u32, num_rounds: u32) -> Option<String> {
    if round == 0 || round > num_rounds {
        return None;
    }

    let name = match round {
        1 => "Final".to_string(),
        2 => "Semifinals".to_string(),
        3 => "Quarterfinals".to_string(),
        r => format!("Round of {}", 1u64 << r),
    };
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_names() {
        assert_eq!(round_name(1, 1).as_deref(), Some("Final"));
        assert_eq!(round_name(2, 3).as_deref(), Some("Semifinals"));
        assert_eq!(round_name(3, 3).as_deref(), Some("Quarterfinals"));
        assert_eq!(round_name(4, 5).as_deref(), Some("Round of 16"));
        assert_eq!(round_name(6, 6).as_deref(), Some("Round of 64"));
    }

    #[test]
    fn test_out_of_range_rounds() {
        assert_eq!(round_name(0, 3), None);
        assert_eq!(round_name(4, 3), None);
    }
}
