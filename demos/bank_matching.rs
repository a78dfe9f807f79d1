//! Bank-transaction matching example: suggest, inspect, confirm

use chrono::NaiveDate;
use reconciliation_core::utils::MemoryStorage;
use reconciliation_core::{
    BankTransaction, Invoice, InvoiceParams, InvoiceStatus, Money, Reconciliation,
    ReconciliationStorage,
};

async fn seed_invoice(
    storage: &mut MemoryStorage,
    id: &str,
    number: &str,
    customer: &str,
    total_minor: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut invoice = Invoice::new(InvoiceParams {
        id: id.to_string(),
        tenant_id: "tenant-1".to_string(),
        number: number.to_string(),
        customer_name: customer.to_string(),
        order_reference: None,
        currency: "CZK".to_string(),
        subtotal: Money::from_minor(total_minor),
        tax: Money::zero(),
        issue_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        due_date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
    })?;
    invoice.status = InvoiceStatus::Sent;
    storage.save_invoice(&invoice).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🏦 Reconciliation Core - Bank Matching Example\n");

    let mut storage = MemoryStorage::new();
    seed_invoice(&mut storage, "inv-1", "FV-2024-0001", "Nováková a synové", 121_000).await?;
    seed_invoice(&mut storage, "inv-2", "FV-2024-0002", "Beta Works", 121_000).await?;
    seed_invoice(&mut storage, "inv-3", "FV-2024-0003", "Gamma Trade", 55_000).await?;

    // An unattributed incoming transaction from the bank feed
    storage
        .save_bank_transaction(&BankTransaction {
            id: "tx-900".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, 16).unwrap(),
            amount: Money::from_minor(121_000),
            currency: "CZK".to_string(),
            counterparty_name: Some("NOVAKOVA A SYNOVE".to_string()),
            counterparty_account: Some("19-2000145399/0800".to_string()),
            description: Some("uhrada faktury FV-2024-0001".to_string()),
            variable_symbol: Some("2024001".to_string()),
            matched_invoice_id: None,
        })
        .await?;

    let mut engine = Reconciliation::new(storage);

    let suggestions = engine.suggest_matches("tx-900", "tenant-1").await?;
    println!("  Suggestions for tx-900, best first:");
    for suggestion in &suggestions {
        println!(
            "    {:<8} confidence {:.3} ({:?}): {}",
            suggestion.invoice_id,
            suggestion.confidence,
            suggestion.confidence_level(),
            suggestion.reason
        );
    }

    // An operator confirms the top suggestion
    let top = &suggestions[0];
    let outcome = engine.confirm_match("tx-900", &top.invoice_id).await?;
    println!(
        "\n  ✓ Matched tx-900 to {}: payment {} recorded, invoice status {:?}",
        outcome.invoice.number, outcome.payment.amount, outcome.invoice.status
    );

    Ok(())
}
