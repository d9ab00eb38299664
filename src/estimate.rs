//! Withdrawal date projection.
//!
//! A node can withdraw once it holds [`WITHDRAW_THRESHOLD`] ETCPOW tokens. Earnings
//! are modelled as a flat daily rate, so the projection is a straight line from
//! the current balance to the threshold.

use chrono::{DateTime, Duration, TimeZone};

/// Token balance at which a node becomes eligible to withdraw.
pub const WITHDRAW_THRESHOLD: f64 = 100.0;

/// Result of projecting a balance forward to the withdrawal threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct WithdrawEstimate<Tz: TimeZone> {
    /// Tokens still missing until the threshold. Negative once the threshold is passed.
    pub remaining: f64,
    /// Projected time the threshold is reached.
    ///
    /// `None` when the daily rate is zero, negative or not a number, since no
    /// finite date exists.
    pub eta: Option<DateTime<Tz>>,
}

/// Projects `tokens` forward at `daily_rate` tokens per day, starting at `now`
/// (usually `Local::now()`).
///
/// The function does not look at the branch the caller is in: a balance at or
/// above the threshold yields a non-positive `remaining` and an `eta` at or
/// before `now`. Callers route such balances to the withdraw-ready path instead.
pub fn estimate<Tz: TimeZone>(tokens: f64, daily_rate: f64, now: DateTime<Tz>) -> WithdrawEstimate<Tz> {
    let remaining = WITHDRAW_THRESHOLD - tokens;

    let eta = if daily_rate.is_finite() && daily_rate > 0.0 {
        let days = remaining / daily_rate;
        let millis = (days * 86_400_000.0).round() as i64;
        Duration::try_milliseconds(millis).and_then(|offset| now.clone().checked_add_signed(offset))
    } else {
        log::warn!("Cannot project withdraw date daily_rate={}", daily_rate);
        None
    };

    WithdrawEstimate { remaining, eta }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    #[test]
    fn projects_remaining_tokens_linearly() {
        let now = fixed_now();
        let est = estimate(92.0, 8.2, now);

        assert_eq!(est.remaining, 8.0);
        let expected_ms = (8.0 / 8.2 * 86_400_000.0_f64).round() as i64;
        assert_eq!(est.eta, Some(now + Duration::milliseconds(expected_ms)));
        assert_eq!(
            crate::utils::format_datetime(&est.eta.unwrap()),
            "11:24AM, 10-20-26"
        );
    }

    #[test]
    fn threshold_balance_has_nothing_remaining() {
        let now = fixed_now();
        let est = estimate(100.0, 8.2, now);
        assert_eq!(est.remaining, 0.0);
        assert_eq!(est.eta, Some(now));
    }

    #[test]
    fn past_threshold_projects_into_the_past() {
        let now = fixed_now();
        let est = estimate(110.0, 5.0, now);
        assert_eq!(est.remaining, -10.0);
        assert_eq!(est.eta, Some(now - Duration::days(2)));
    }

    #[test]
    fn non_positive_rate_has_no_eta() {
        let now = fixed_now();
        assert_eq!(estimate(50.0, 0.0, now).eta, None);
        assert_eq!(estimate(50.0, -1.0, now).eta, None);
        assert_eq!(estimate(50.0, f64::NAN, now).eta, None);
        assert_eq!(estimate(50.0, 0.0, now).remaining, 50.0);
    }
}
