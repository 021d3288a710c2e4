//! Payroll aggregation: approved-timesheet minutes per member, priced with
//! the member's pay rate (membership override, else position default).

use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashMap;
use uuid::Uuid;

use super::billing::{hours_from_minutes, BillingError};

/// Pay rates in effect for one payroll run
#[derive(Debug, Default)]
pub struct PayRates {
    rates: HashMap<Uuid, Decimal>,
}

impl PayRates {
    pub fn set(&mut self, user_id: Uuid, rate: Decimal) {
        self.rates.insert(user_id, rate);
    }

    pub fn get(&self, user_id: Uuid) -> Option<Decimal> {
        self.rates.get(&user_id).copied()
    }
}

/// One member's pay line before persistence
#[derive(Debug, Clone, PartialEq)]
pub struct PayrollLine {
    pub user_id: Uuid,
    pub minutes: i64,
    pub pay_rate: Decimal,
    pub amount: Decimal,
}

/// Price each member's approved minutes. Members without a configured rate
/// fail the whole run rather than silently paying zero.
pub fn build_payroll_lines(
    minutes_by_user: &[(Uuid, i64)],
    rates: &PayRates,
) -> Result<Vec<PayrollLine>, BillingError> {
    let mut lines = Vec::with_capacity(minutes_by_user.len());

    for &(user_id, minutes) in minutes_by_user {
        if minutes <= 0 {
            continue;
        }
        let pay_rate = rates.get(user_id).ok_or(BillingError::MissingRate { user_id })?;
        let hours = hours_from_minutes(minutes);
        let amount = (hours * pay_rate)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        lines.push(PayrollLine { user_id, minutes, pay_rate, amount });
    }

    Ok(lines)
}

pub fn batch_total(lines: &[PayrollLine]) -> Decimal {
    lines.iter().map(|l| l.amount).sum()
}

/// True when the candidate period shares at least one day with any existing
/// batch period. Entries inside two batches would be paid twice.
pub fn overlaps_existing(
    existing: &[(chrono::NaiveDate, chrono::NaiveDate)],
    start: chrono::NaiveDate,
    end: chrono::NaiveDate,
) -> bool {
    existing.iter().any(|&(s, e)| s <= end && start <= e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn lines_price_minutes_per_member() {
        let alice = Uuid::from_u128(1);
        let bob = Uuid::from_u128(2);

        let mut rates = PayRates::default();
        rates.set(alice, dec("50"));
        rates.set(bob, dec("42.50"));

        let lines =
            build_payroll_lines(&[(alice, 480), (bob, 90)], &rates).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].amount, dec("400.00")); // 8h * 50
        assert_eq!(lines[1].amount, dec("63.75")); // 1.5h * 42.50

        assert_eq!(batch_total(&lines), dec("463.75"));
    }

    #[test]
    fn missing_rate_fails_the_run() {
        let ghost = Uuid::from_u128(9);
        let result = build_payroll_lines(&[(ghost, 60)], &PayRates::default());
        assert!(matches!(result, Err(BillingError::MissingRate { user_id }) if user_id == ghost));
    }

    #[test]
    fn adjacent_periods_do_not_overlap_but_shared_days_do() {
        let date = |s: &str| chrono::NaiveDate::from_str(s).unwrap();
        let existing = vec![(date("2025-06-01"), date("2025-06-15"))];

        assert!(!overlaps_existing(&existing, date("2025-06-16"), date("2025-06-30")));
        assert!(!overlaps_existing(&existing, date("2025-05-01"), date("2025-05-31")));

        // Sharing even one day pays those entries twice
        assert!(overlaps_existing(&existing, date("2025-06-15"), date("2025-06-30")));
        assert!(overlaps_existing(&existing, date("2025-06-05"), date("2025-06-10")));
        assert!(overlaps_existing(&existing, date("2025-05-20"), date("2025-06-20")));
        assert!(overlaps_existing(&existing, date("2025-05-01"), date("2025-07-01")));

        assert!(!overlaps_existing(&[], date("2025-06-01"), date("2025-06-15")));
    }

    #[test]
    fn zero_minute_members_are_skipped() {
        let alice = Uuid::from_u128(1);
        let mut rates = PayRates::default();
        rates.set(alice, dec("50"));

        let lines = build_payroll_lines(&[(alice, 0)], &rates).unwrap();
        assert!(lines.is_empty());
        assert_eq!(batch_total(&lines), Decimal::ZERO);
    }
}
