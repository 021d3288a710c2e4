//! End-to-end billing arithmetic: time entries through line items, totals,
//! and the payment reconciliation ladder, the way the invoice and payment
//! handlers drive it.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

use crewhq_api::models::invoice::InvoiceStatus;
use crewhq_api::models::time_entry::TimeEntry;
use crewhq_api::services::billing::{
    apply_payment, build_line_items, compute_totals, format_invoice_number, revert_payment,
    NameIndex, RateBook,
};

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn entry(project: Uuid, user: Uuid, day: u32, minutes: i32) -> TimeEntry {
    let now = Utc::now();
    TimeEntry {
        id: Uuid::new_v4(),
        tenant_id: Uuid::from_u128(1),
        project_id: project,
        task_id: None,
        user_id: user,
        work_date: NaiveDate::from_ymd_opt(2025, 6, day).unwrap(),
        minutes,
        billable: true,
        notes: None,
        invoice_id: None,
        timesheet_id: None,
        created_at: now,
        updated_at: now,
    }
}

#[test]
fn invoice_lifecycle_from_entries_to_settled() {
    let project = Uuid::from_u128(10);
    let alice = Uuid::from_u128(20);
    let bob = Uuid::from_u128(21);

    let mut rates = RateBook::default();
    rates.set_project_rate(project, dec("90"));
    rates.set_member_rate(project, bob, dec("110"));

    let mut names = NameIndex::default();
    names.projects.insert(project, "Website Redesign".into());
    names.members.insert(alice, "Alice".into());
    names.members.insert(bob, "Bob".into());

    // A month of work: alice 10h, bob 6h30
    let entries = vec![
        entry(project, alice, 2, 240),
        entry(project, alice, 3, 360),
        entry(project, bob, 2, 180),
        entry(project, bob, 9, 210),
    ];

    let items = build_line_items(&entries, &rates, &names).unwrap();
    assert_eq!(items.len(), 2);

    let alice_item = items.iter().find(|i| i.user_id == alice).unwrap();
    assert_eq!(alice_item.amount, dec("900.00"));
    assert!(alice_item.description.contains("Website Redesign"));
    assert!(alice_item.description.contains("Alice"));

    let bob_item = items.iter().find(|i| i.user_id == bob).unwrap();
    assert_eq!(bob_item.hours, dec("6.50"));
    assert_eq!(bob_item.amount, dec("715.00"));

    // 5% discount, 21% VAT
    let totals = compute_totals(&items, dec("5"), dec("21"));
    assert_eq!(totals.subtotal, dec("1615.00"));
    assert_eq!(totals.discount_amount, dec("80.75"));
    assert_eq!(totals.tax_amount, dec("322.19"));
    assert_eq!(totals.total, dec("1856.44"));

    // Two partial payments settle the invoice
    let (paid, status) =
        apply_payment(InvoiceStatus::Sent, totals.total, Decimal::ZERO, dec("1000")).unwrap();
    assert_eq!(status, InvoiceStatus::PartiallyPaid);

    let (paid, status) =
        apply_payment(InvoiceStatus::PartiallyPaid, totals.total, paid, dec("856.44")).unwrap();
    assert_eq!(paid, totals.total);
    assert_eq!(status, InvoiceStatus::Paid);

    // Settled invoices accept nothing further
    assert!(apply_payment(InvoiceStatus::Paid, totals.total, paid, dec("1")).is_err());

    // Deleting the second payment reopens the balance
    let (paid, status) =
        revert_payment(InvoiceStatus::Paid, totals.total, paid, dec("856.44")).unwrap();
    assert_eq!(paid, dec("1000"));
    assert_eq!(status, InvoiceStatus::PartiallyPaid);
}

#[test]
fn regenerating_skips_already_invoiced_entries() {
    let project = Uuid::from_u128(10);
    let alice = Uuid::from_u128(20);

    let mut rates = RateBook::default();
    rates.set_project_rate(project, dec("100"));

    let mut billed = entry(project, alice, 2, 600);
    billed.invoice_id = Some(Uuid::from_u128(99));
    let fresh = entry(project, alice, 16, 120);

    let items = build_line_items(&[billed, fresh], &rates, &NameIndex::default()).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].amount, dec("200.00"));
}

#[test]
fn invoice_numbers_sort_lexicographically() {
    let numbers: Vec<String> =
        (1..=12).map(|n| format_invoice_number("INV-", n * 9)).collect();
    let mut sorted = numbers.clone();
    sorted.sort();
    assert_eq!(numbers, sorted);
}
