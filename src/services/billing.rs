//! Invoice generation and payment reconciliation arithmetic.
//!
//! Everything here is pure: the handlers load the records, these functions
//! group, price and sum them, and the handlers write the results back inside
//! a transaction. Money is `rust_decimal::Decimal` rounded half-up to 2dp.

use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use uuid::Uuid;

use crate::models::invoice::InvoiceStatus;
use crate::models::time_entry::TimeEntry;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("no billable time entries in the period")]
    NothingToBill,

    #[error("billing period is empty or inverted")]
    EmptyPeriod,

    #[error("payment exceeds amount due ({due})")]
    Overpayment { due: Decimal },

    #[error("{0}")]
    InvalidState(String),

    #[error("no pay rate configured for user {user_id}")]
    MissingRate { user_id: Uuid },
}

fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Minutes to decimal hours at 2dp: 90 minutes -> 1.50
pub fn hours_from_minutes(minutes: i64) -> Decimal {
    round_money(Decimal::from(minutes) / Decimal::from(60))
}

/// Billing rates in effect for one invoice run. Resolution order:
/// per-project member override, then the project's default hourly rate.
#[derive(Debug, Default)]
pub struct RateBook {
    project_rates: HashMap<Uuid, Decimal>,
    member_overrides: HashMap<(Uuid, Uuid), Decimal>,
}

impl RateBook {
    pub fn set_project_rate(&mut self, project_id: Uuid, rate: Decimal) {
        self.project_rates.insert(project_id, rate);
    }

    pub fn set_member_rate(&mut self, project_id: Uuid, user_id: Uuid, rate: Decimal) {
        self.member_overrides.insert((project_id, user_id), rate);
    }

    pub fn rate_for(&self, project_id: Uuid, user_id: Uuid) -> Decimal {
        self.member_overrides
            .get(&(project_id, user_id))
            .or_else(|| self.project_rates.get(&project_id))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }
}

/// Display names used to label line items
#[derive(Debug, Default)]
pub struct NameIndex {
    pub projects: HashMap<Uuid, String>,
    pub members: HashMap<Uuid, String>,
}

impl NameIndex {
    fn project(&self, id: Uuid) -> &str {
        self.projects.get(&id).map(String::as_str).unwrap_or("Project")
    }

    fn member(&self, id: Uuid) -> &str {
        self.members.get(&id).map(String::as_str).unwrap_or("Member")
    }
}

/// An invoice line item before persistence
#[derive(Debug, Clone, PartialEq)]
pub struct LineItemDraft {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub description: String,
    pub hours: Decimal,
    pub unit_rate: Decimal,
    pub amount: Decimal,
}

/// Group billable entries by (project, member), price each group with the
/// rate book and produce one line item per group. Ordering is deterministic
/// (by project then member UUID) so invoice layouts are stable.
pub fn build_line_items(
    entries: &[TimeEntry],
    rates: &RateBook,
    names: &NameIndex,
) -> Result<Vec<LineItemDraft>, BillingError> {
    let mut minutes_by_group: BTreeMap<(Uuid, Uuid), i64> = BTreeMap::new();
    for entry in entries {
        if !entry.billable || entry.invoice_id.is_some() {
            continue;
        }
        *minutes_by_group.entry((entry.project_id, entry.user_id)).or_insert(0) +=
            entry.minutes as i64;
    }

    if minutes_by_group.is_empty() {
        return Err(BillingError::NothingToBill);
    }

    let items = minutes_by_group
        .into_iter()
        .map(|((project_id, user_id), minutes)| {
            let hours = hours_from_minutes(minutes);
            let unit_rate = rates.rate_for(project_id, user_id);
            let amount = round_money(hours * unit_rate);
            LineItemDraft {
                project_id,
                user_id,
                description: format!(
                    "{}: {} ({} h)",
                    names.project(project_id),
                    names.member(user_id),
                    hours
                ),
                hours,
                unit_rate,
                amount,
            }
        })
        .collect();

    Ok(items)
}

/// Invoice-level totals computed from line items
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceTotals {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
}

/// subtotal -> discount -> tax, each rounded to 2dp:
///   discount = subtotal * discount% / 100
///   tax      = (subtotal - discount) * tax% / 100
///   total    = subtotal - discount + tax
pub fn compute_totals(
    items: &[LineItemDraft],
    discount_percent: Decimal,
    tax_percent: Decimal,
) -> InvoiceTotals {
    let subtotal: Decimal = items.iter().map(|i| i.amount).sum();
    let hundred = Decimal::from(100);

    let discount_amount = round_money(subtotal * discount_percent / hundred);
    let taxable = subtotal - discount_amount;
    let tax_amount = round_money(taxable * tax_percent / hundred);
    let total = subtotal - discount_amount + tax_amount;

    InvoiceTotals { subtotal, discount_amount, tax_amount, total }
}

/// Derive invoice status from the paid amount. `amount_paid` is only ever
/// mutated by payment create/delete, so status is always recomputable.
pub fn status_for_paid_amount(total: Decimal, amount_paid: Decimal) -> InvoiceStatus {
    if amount_paid <= Decimal::ZERO {
        InvoiceStatus::Sent
    } else if amount_paid < total {
        InvoiceStatus::PartiallyPaid
    } else {
        InvoiceStatus::Paid
    }
}

/// Validate a payment against the invoice state, returning the new paid
/// amount and derived status
pub fn apply_payment(
    status: InvoiceStatus,
    total: Decimal,
    amount_paid: Decimal,
    payment: Decimal,
) -> Result<(Decimal, InvoiceStatus), BillingError> {
    if !status.accepts_payments() {
        return Err(BillingError::InvalidState(format!(
            "Invoice in state '{:?}' does not accept payments",
            status
        )));
    }
    if payment <= Decimal::ZERO {
        return Err(BillingError::InvalidState("Payment amount must be positive".into()));
    }

    let due = total - amount_paid;
    if payment > due {
        return Err(BillingError::Overpayment { due });
    }

    let new_paid = amount_paid + payment;
    Ok((new_paid, status_for_paid_amount(total, new_paid)))
}

/// Reverse a deleted payment. Paid and partially-paid invoices fall back to
/// the status their remaining paid amount implies.
pub fn revert_payment(
    status: InvoiceStatus,
    total: Decimal,
    amount_paid: Decimal,
    payment: Decimal,
) -> Result<(Decimal, InvoiceStatus), BillingError> {
    if matches!(status, InvoiceStatus::Void | InvoiceStatus::Draft) {
        return Err(BillingError::InvalidState(format!(
            "Invoice in state '{:?}' has no payments to reverse",
            status
        )));
    }

    let new_paid = (amount_paid - payment).max(Decimal::ZERO);
    Ok((new_paid, status_for_paid_amount(total, new_paid)))
}

/// Sequential per-tenant invoice number, e.g. "INV-00042"
pub fn format_invoice_number(prefix: &str, sequence: i64) -> String {
    format!("{}{:05}", prefix, sequence)
}

/// Next sequence given the numbers already issued for the tenant. The
/// high-water mark comes from the trailing digits of each number, not from a
/// row count: deleting an old draft must never reopen its number.
pub fn next_invoice_sequence<'a>(numbers: impl IntoIterator<Item = &'a str>) -> i64 {
    numbers
        .into_iter()
        .filter_map(|number| {
            let start = number
                .rfind(|c: char| !c.is_ascii_digit())
                .map(|i| i + number[i..].chars().next().map_or(1, char::len_utf8))
                .unwrap_or(0);
            number[start..].parse::<i64>().ok()
        })
        .max()
        .unwrap_or(0)
        + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn uid(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    fn entry(project: Uuid, user: Uuid, minutes: i32, billable: bool) -> TimeEntry {
        let now = Utc::now();
        TimeEntry {
            id: Uuid::new_v4(),
            tenant_id: uid(1),
            project_id: project,
            task_id: None,
            user_id: user,
            work_date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
            minutes,
            billable,
            notes: None,
            invoice_id: None,
            timesheet_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn minutes_convert_to_decimal_hours() {
        assert_eq!(hours_from_minutes(60), dec("1"));
        assert_eq!(hours_from_minutes(90), dec("1.50"));
        assert_eq!(hours_from_minutes(100), dec("1.67"));
        assert_eq!(hours_from_minutes(0), dec("0"));
    }

    #[test]
    fn line_items_group_by_project_and_member() {
        let (p1, p2) = (uid(10), uid(11));
        let (alice, bob) = (uid(20), uid(21));

        let mut rates = RateBook::default();
        rates.set_project_rate(p1, dec("100"));
        rates.set_project_rate(p2, dec("80"));
        rates.set_member_rate(p1, bob, dec("120"));

        let entries = vec![
            entry(p1, alice, 60, true),
            entry(p1, alice, 30, true),
            entry(p1, bob, 120, true),
            entry(p2, alice, 45, true),
            entry(p1, alice, 600, false), // non-billable, skipped
        ];

        let items = build_line_items(&entries, &rates, &NameIndex::default()).unwrap();
        assert_eq!(items.len(), 3);

        let p1_alice = items.iter().find(|i| i.project_id == p1 && i.user_id == alice).unwrap();
        assert_eq!(p1_alice.hours, dec("1.50"));
        assert_eq!(p1_alice.unit_rate, dec("100"));
        assert_eq!(p1_alice.amount, dec("150.00"));

        // Member override beats project default
        let p1_bob = items.iter().find(|i| i.project_id == p1 && i.user_id == bob).unwrap();
        assert_eq!(p1_bob.unit_rate, dec("120"));
        assert_eq!(p1_bob.amount, dec("240.00"));

        let p2_alice = items.iter().find(|i| i.project_id == p2 && i.user_id == alice).unwrap();
        assert_eq!(p2_alice.amount, dec("60.00"));
    }

    #[test]
    fn only_unbilled_billable_entries_count() {
        let p = uid(10);
        let u = uid(20);
        let mut billed = entry(p, u, 60, true);
        billed.invoice_id = Some(uid(99));

        let result = build_line_items(
            &[billed, entry(p, u, 60, false)],
            &RateBook::default(),
            &NameIndex::default(),
        );
        assert!(matches!(result, Err(BillingError::NothingToBill)));
    }

    #[test]
    fn totals_apply_discount_then_tax() {
        let items = vec![LineItemDraft {
            project_id: uid(1),
            user_id: uid(2),
            description: String::new(),
            hours: dec("10"),
            unit_rate: dec("100"),
            amount: dec("1000.00"),
        }];

        let totals = compute_totals(&items, dec("10"), dec("20"));
        assert_eq!(totals.subtotal, dec("1000.00"));
        assert_eq!(totals.discount_amount, dec("100.00"));
        // Tax applies to the discounted base
        assert_eq!(totals.tax_amount, dec("180.00"));
        assert_eq!(totals.total, dec("1080.00"));
    }

    #[test]
    fn totals_round_half_up() {
        let items = vec![LineItemDraft {
            project_id: uid(1),
            user_id: uid(2),
            description: String::new(),
            hours: dec("1"),
            unit_rate: dec("33.33"),
            amount: dec("33.33"),
        }];

        let totals = compute_totals(&items, dec("7.5"), dec("19"));
        assert_eq!(totals.discount_amount, dec("2.50")); // 2.49975 rounds up
        assert_eq!(totals.tax_amount, dec("5.86")); // 5.85777 rounds up
        assert_eq!(totals.total, dec("36.69"));
    }

    #[test]
    fn payments_walk_the_status_ladder() {
        let total = dec("1000");

        let (paid, status) =
            apply_payment(InvoiceStatus::Sent, total, Decimal::ZERO, dec("400")).unwrap();
        assert_eq!(paid, dec("400"));
        assert_eq!(status, InvoiceStatus::PartiallyPaid);

        let (paid, status) =
            apply_payment(InvoiceStatus::PartiallyPaid, total, paid, dec("600")).unwrap();
        assert_eq!(paid, dec("1000"));
        assert_eq!(status, InvoiceStatus::Paid);
    }

    #[test]
    fn overpayment_and_bad_states_rejected() {
        let total = dec("100");
        assert!(matches!(
            apply_payment(InvoiceStatus::Sent, total, dec("80"), dec("30")),
            Err(BillingError::Overpayment { .. })
        ));
        assert!(apply_payment(InvoiceStatus::Draft, total, Decimal::ZERO, dec("10")).is_err());
        assert!(apply_payment(InvoiceStatus::Void, total, Decimal::ZERO, dec("10")).is_err());
        assert!(apply_payment(InvoiceStatus::Sent, total, Decimal::ZERO, dec("0")).is_err());
    }

    #[test]
    fn deleting_payments_steps_status_back() {
        let total = dec("1000");

        let (paid, status) =
            revert_payment(InvoiceStatus::Paid, total, dec("1000"), dec("600")).unwrap();
        assert_eq!(paid, dec("400"));
        assert_eq!(status, InvoiceStatus::PartiallyPaid);

        let (paid, status) =
            revert_payment(InvoiceStatus::PartiallyPaid, total, paid, dec("400")).unwrap();
        assert_eq!(paid, Decimal::ZERO);
        assert_eq!(status, InvoiceStatus::Sent);
    }

    #[test]
    fn invoice_numbers_are_zero_padded() {
        assert_eq!(format_invoice_number("INV-", 1), "INV-00001");
        assert_eq!(format_invoice_number("INV-", 42), "INV-00042");
        assert_eq!(format_invoice_number("INV-", 123456), "INV-123456");
    }

    #[test]
    fn sequence_follows_the_highest_issued_number() {
        assert_eq!(next_invoice_sequence([]), 1);
        assert_eq!(next_invoice_sequence(["INV-00001", "INV-00002"]), 3);
        assert_eq!(next_invoice_sequence(["INV-00009", "INV-00010"]), 11);
        // numbers with no trailing digits contribute nothing
        assert_eq!(next_invoice_sequence(["LEGACY", "INV-00004"]), 5);
    }

    #[test]
    fn deleted_drafts_never_free_their_numbers() {
        let issued = ["INV-00001", "INV-00002"];
        assert_eq!(next_invoice_sequence(issued), 3);
        // INV-00001 deleted: the high-water mark is unchanged
        assert_eq!(next_invoice_sequence(["INV-00002"]), 3);
    }
}
