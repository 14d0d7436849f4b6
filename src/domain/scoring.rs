// Round score arithmetic.

/// Points available before hint penalties and time decay.
pub const BASE_POINTS: f64 = 1500.0;

/// Penalty for the first, second and third hint revealed in a round.
pub const HINT_PENALTIES: [f64; 3] = [150.0, 300.0, 750.0];

/// Sum of per-slot penalties for the hints used.
pub fn hint_penalty(hints_used: usize) -> f64 {
    HINT_PENALTIES.iter().take(hints_used).sum()
}

/// Score for one round; decays linearly to zero as the round clock runs out.
pub fn round_score(hints_used: usize, time_left: f64, round_duration: u64) -> f64 {
    if round_duration == 0 {
        return 0.0;
    }
    let base = (BASE_POINTS - hint_penalty(hints_used)).max(0.0);
    let fraction = (time_left / round_duration as f64).clamp(0.0, 1.0);
    base * fraction
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn when_no_hints_and_full_time_then_full_points() {
        assert_eq!(round_score(0, 25.0, 25), 1500.0);
    }

    #[test]
    fn when_one_hint_and_half_time_then_half_of_reduced_base() {
        assert_eq!(round_score(1, 12.5, 25), 675.0);
    }

    #[test]
    fn when_time_left_is_zero_then_score_is_zero() {
        assert_eq!(round_score(3, 0.0, 25), 0.0);
        assert_eq!(round_score(0, 0.0, 25), 0.0);
    }

    #[test]
    fn when_more_hints_are_used_then_penalty_strictly_grows() {
        assert_eq!(hint_penalty(0), 0.0);
        assert_eq!(hint_penalty(1), 150.0);
        assert_eq!(hint_penalty(2), 450.0);
        assert_eq!(hint_penalty(3), 1200.0);
    }

    #[test]
    fn when_hint_count_exceeds_quota_then_penalty_is_capped() {
        assert_eq!(hint_penalty(7), 1200.0);
    }

    #[test]
    fn when_reported_time_exceeds_duration_then_fraction_is_capped() {
        assert_eq!(round_score(0, 40.0, 25), 1500.0);
    }
}
