//! Withdrawal lock-in and bonus penalty.

use serde::{Deserialize, Serialize};

use crate::ledger::Bid;
use crate::params::SaleParameters;
use crate::{BidId, IicoError, Result, Timestamp};

/// Fraction of the frozen bonus forfeited by a withdrawal once lock-in has begun.
pub const WITHDRAWAL_BONUS_PENALTY_DIVISOR: f64 = 3.0;

/// Preview of a withdrawal (data only; the ledger applies it).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalQuote {
    pub bid_id: BidId,
    /// Contribution that stays in the sale after withdrawal.
    pub locked_in: f64,
    /// Contribution returned to the contributor: `contrib - locked_in`.
    pub released: f64,
    /// Bonus the bid keeps after withdrawal.
    pub new_bonus: f64,
}

/// Locked-in portion of `bid.contrib` at `now`.
///
/// Defined for every `now`:
/// - `now < end_full_bonus_time`: `0`
/// - `end_full_bonus_time <= now < withdrawal_lock_time`: grows linearly to `contrib`
/// - `now >= withdrawal_lock_time`: `contrib`
pub fn locked_in_amount(params: &SaleParameters, bid: &Bid, now: Timestamp) -> f64 {
    let full_end = params.end_full_bonus_time();
    let lock = params.withdrawal_lock_time();
    if now < full_end {
        0.0
    } else if now < lock {
        let remaining = (lock.millis() - now.millis()) as f64;
        let span = (lock.millis() - full_end.millis()) as f64;
        bid.contrib * (1.0 - remaining / span)
    } else {
        bid.contrib
    }
}

/// Bonus kept after a withdrawal at `now`.
///
/// Before `end_full_bonus_time` the whole contribution is released and the bonus is left
/// as is; afterwards one third of the frozen bonus is forfeited.
pub fn bonus_after_withdrawal(params: &SaleParameters, bid: &Bid, now: Timestamp) -> f64 {
    if now < params.end_full_bonus_time() {
        bid.bonus
    } else {
        bid.bonus - bid.bonus / WITHDRAWAL_BONUS_PENALTY_DIVISOR
    }
}

/// Quotes a withdrawal of `bid` at `now`.
///
/// Fails with `OutOfWindow` unless `start_time <= now < withdrawal_lock_time`. Lifecycle
/// flags (`withdrawn`, `redeemed`) are the ledger's concern.
pub fn withdrawal(params: &SaleParameters, bid: &Bid, now: Timestamp) -> Result<WithdrawalQuote> {
    if !params.accepts_withdrawals_at(now) {
        return Err(IicoError::OutOfWindow {
            operation: "withdrawal",
            now,
        });
    }
    let locked_in = locked_in_amount(params, bid, now);
    Ok(WithdrawalQuote {
        bid_id: bid.id,
        locked_in,
        released: bid.contrib - locked_in,
        new_bonus: bonus_after_withdrawal(params, bid, now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ContributorId;
    use proptest::prelude::*;

    fn params() -> SaleParameters {
        SaleParameters::new(
            Timestamp(0),
            Timestamp(1_000),
            Timestamp(3_000),
            Timestamp(4_000),
            0.3,
            1_000.0,
        )
        .unwrap()
    }

    fn bid(contrib: f64, bonus: f64) -> Bid {
        Bid {
            id: BidId(7),
            contributor: ContributorId::from("alice"),
            contrib,
            max_valuation: 10_000.0,
            bonus,
            withdrawn: false,
            redeemed: false,
        }
    }

    #[test]
    fn nothing_locked_during_full_bonus() {
        let q = withdrawal(&params(), &bid(90.0, 0.3), Timestamp(999)).unwrap();
        assert_eq!(q.locked_in, 0.0);
        assert_eq!(q.released, 90.0);
        assert_eq!(q.new_bonus, 0.3);
    }

    #[test]
    fn half_locked_mid_span_with_penalty() {
        let q = withdrawal(&params(), &bid(90.0, 0.3), Timestamp(2_000)).unwrap();
        assert_eq!(q.locked_in, 45.0);
        assert_eq!(q.released, 45.0);
        assert!((q.new_bonus - 0.2).abs() < 1e-12);
    }

    #[test]
    fn fully_locked_at_lock_time() {
        let p = params();
        let b = bid(90.0, 0.3);
        assert_eq!(locked_in_amount(&p, &b, p.withdrawal_lock_time()), 90.0);
        assert!(matches!(
            withdrawal(&p, &b, p.withdrawal_lock_time()),
            Err(IicoError::OutOfWindow { .. })
        ));
    }

    #[test]
    fn withdrawal_before_start_is_rejected() {
        let p = SaleParameters::new(
            Timestamp(100),
            Timestamp(200),
            Timestamp(300),
            Timestamp(400),
            0.3,
            1.0,
        )
        .unwrap();
        assert!(withdrawal(&p, &bid(1.0, 0.3), Timestamp(99)).is_err());
    }

    #[test]
    fn zero_length_lock_span_does_not_divide_by_zero() {
        let p = SaleParameters::new(
            Timestamp(0),
            Timestamp(1_000),
            Timestamp(1_000),
            Timestamp(2_000),
            0.3,
            1.0,
        )
        .unwrap();
        let b = bid(10.0, 0.3);
        assert_eq!(locked_in_amount(&p, &b, Timestamp(999)), 0.0);
        assert_eq!(locked_in_amount(&p, &b, Timestamp(1_000)), 10.0);
    }

    proptest! {
        #[test]
        fn locked_in_is_bounded_and_monotone(
            contrib in 0.0f64..1e12,
            t1 in -1_000i64..5_000i64,
            t2 in -1_000i64..5_000i64,
        ) {
            let p = params();
            let b = bid(contrib, 0.3);
            let (a, c) = if t1 <= t2 { (t1, t2) } else { (t2, t1) };
            let la = locked_in_amount(&p, &b, Timestamp(a));
            let lc = locked_in_amount(&p, &b, Timestamp(c));
            prop_assert!(la >= 0.0 && lc <= contrib);
            prop_assert!(la <= lc);
        }
    }
}
