//! Basic reconciliation example: payments and credit notes against one invoice

use chrono::NaiveDate;
use reconciliation_core::utils::MemoryStorage;
use reconciliation_core::{
    Invoice, InvoiceParams, InvoiceStatus, Money, PaymentMethod, Reconciliation,
    ReconciliationStorage,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🧾 Reconciliation Core - Basic Example\n");

    // Seed an invoice the way an external billing workflow would
    let mut storage = MemoryStorage::new();
    let mut invoice = Invoice::new(InvoiceParams {
        id: "inv-1001".to_string(),
        tenant_id: "tenant-1".to_string(),
        number: "FV-2024-0001".to_string(),
        customer_name: "Skřivánek s.r.o.".to_string(),
        order_reference: Some("ORD-2024-55".to_string()),
        currency: "CZK".to_string(),
        subtotal: Money::from_minor(100_000),
        tax: Money::from_minor(21_000),
        issue_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        due_date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
    })?;
    invoice.status = InvoiceStatus::Sent;
    storage.save_invoice(&invoice).await?;
    println!(
        "  ✓ Invoice {} for {} {} (due {})",
        invoice.number, invoice.total, invoice.currency, invoice.due_date
    );

    let mut engine = Reconciliation::new(storage);

    // 1. A partial payment arrives
    let (invoice, payment) = engine
        .record_partial_payment(
            "inv-1001",
            Money::from_minor(50_000),
            PaymentMethod::BankTransfer,
            Some("first installment"),
            Some("ext-pay-001"),
        )
        .await?;
    println!(
        "  ✓ Payment {} of {}: remaining {}, status {:?}",
        payment.id, payment.amount, invoice.amount_remaining, invoice.status
    );

    // 2. Part of the order is returned; raise and apply a credit note
    let note = engine
        .create_credit_note("inv-1001", Money::from_minor(12_100), "returned item")
        .await?;
    println!(
        "  ✓ Credit note {} drafted ({} net + {} tax)",
        note.id, note.subtotal, note.tax
    );
    let note = engine.issue_credit_note(&note.id).await?;
    let (note, invoice) = engine.apply_credit_note(&note.id).await?;
    println!(
        "  ✓ Credit note applied at {:?}: remaining {}, status {:?}",
        note.applied_at, invoice.amount_remaining, invoice.status
    );

    // 3. The rest arrives and the invoice settles
    let (invoice, _) = engine
        .record_partial_payment(
            "inv-1001",
            invoice.amount_remaining,
            PaymentMethod::BankTransfer,
            Some("final installment"),
            Some("ext-pay-002"),
        )
        .await?;
    println!(
        "\n💰 Settled: paid {} of {}, status {:?}, paid on {:?}",
        invoice.amount_paid, invoice.total, invoice.status, invoice.paid_date
    );

    Ok(())
}
