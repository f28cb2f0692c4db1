//! Bonus schedule: full bonus, then linear decay to zero at `end_time`.

use crate::params::SaleParameters;
use crate::Timestamp;

/// Bonus multiplier for a bid created at `now`.
///
/// - `now < end_full_bonus_time`: `starting_bonus`
/// - `end_full_bonus_time <= now < end_time`: linear decay
/// - `now >= end_time`: `0`
///
/// The decay branch is only reachable when `end_full_bonus_time < end_time`, so its
/// denominator is never zero.
pub fn bonus_at(params: &SaleParameters, now: Timestamp) -> f64 {
    let full_end = params.end_full_bonus_time();
    let end = params.end_time();
    if now < full_end {
        params.starting_bonus()
    } else if now < end {
        let remaining = (end.millis() - now.millis()) as f64;
        let span = (end.millis() - full_end.millis()) as f64;
        params.starting_bonus() * remaining / span
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn params() -> SaleParameters {
        SaleParameters::new(
            Timestamp(1_000),
            Timestamp(5_000),
            Timestamp(8_000),
            Timestamp(11_000),
            2.0,
            1_000_000.0,
        )
        .unwrap()
    }

    #[test]
    fn full_bonus_then_decay_then_zero() {
        let p = params();
        assert_eq!(bonus_at(&p, Timestamp(0)), 2.0);
        assert_eq!(bonus_at(&p, Timestamp(4_999)), 2.0);
        assert_eq!(bonus_at(&p, Timestamp(5_000)), 2.0);
        assert_eq!(bonus_at(&p, Timestamp(8_000)), 1.0);
        assert_eq!(bonus_at(&p, Timestamp(11_000)), 0.0);
        assert_eq!(bonus_at(&p, Timestamp(99_000)), 0.0);
    }

    #[test]
    fn zero_length_decay_is_a_step() {
        let p = SaleParameters::new(
            Timestamp(0),
            Timestamp(10),
            Timestamp(10),
            Timestamp(10),
            0.5,
            1.0,
        )
        .unwrap();
        assert_eq!(bonus_at(&p, Timestamp(9)), 0.5);
        assert_eq!(bonus_at(&p, Timestamp(10)), 0.0);
    }

    #[test]
    fn decay_is_continuous_at_both_ends() {
        let p = params();
        let just_after = bonus_at(&p, Timestamp(5_001));
        assert!((2.0 - just_after) < 1e-3);
        let just_before_end = bonus_at(&p, Timestamp(10_999));
        assert!(just_before_end > 0.0 && just_before_end < 1e-3);
    }

    proptest! {
        #[test]
        fn bonus_is_non_increasing(t1 in 0i64..12_000i64, t2 in 0i64..12_000i64) {
            let p = params();
            let (a, b) = if t1 <= t2 { (t1, t2) } else { (t2, t1) };
            prop_assert!(bonus_at(&p, Timestamp(b)) <= bonus_at(&p, Timestamp(a)));
        }

        #[test]
        fn bonus_is_bounded(t in i64::MIN / 4..i64::MAX / 4) {
            let p = params();
            let b = bonus_at(&p, Timestamp(t));
            prop_assert!(b.is_finite());
            prop_assert!((0.0..=p.starting_bonus()).contains(&b));
        }
    }
}
