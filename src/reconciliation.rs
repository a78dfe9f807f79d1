//! Facade wiring the managers over a shared storage backend

use crate::credit::CreditNoteManager;
use crate::ledger::{InvoiceLedger, LedgerEntryKind};
use crate::matching::{MatchApplier, MatchOutcome, MatcherConfig, TransactionMatcher};
use crate::money::Money;
use crate::payment::PaymentRecorder;
use crate::traits::{ReconciliationStorage, TaxSplitPolicy};
use crate::types::*;

/// Orchestrator combining the invoice ledger, credit notes, payment
/// recording, and bank-transaction matching over one storage backend.
pub struct Reconciliation<S: ReconciliationStorage> {
    ledger: InvoiceLedger<S>,
    credit_notes: CreditNoteManager<S>,
    payments: PaymentRecorder<S>,
    applier: MatchApplier<S>,
    matcher: TransactionMatcher,
    storage: S,
}

impl<S: ReconciliationStorage + Clone> Reconciliation<S> {
    /// Create a reconciliation engine with default matching policy and tax
    /// split.
    pub fn new(storage: S) -> Self {
        Self::with_matcher_config(storage, MatcherConfig::default())
    }

    /// Create an engine with a custom matching policy.
    pub fn with_matcher_config(storage: S, config: MatcherConfig) -> Self {
        Self {
            ledger: InvoiceLedger::new(storage.clone()),
            credit_notes: CreditNoteManager::new(storage.clone()),
            payments: PaymentRecorder::new(storage.clone()),
            applier: MatchApplier::new(storage.clone()),
            matcher: TransactionMatcher::new(config),
            storage,
        }
    }

    /// Replace the credit-note tax split policy.
    pub fn with_tax_split(mut self, policy: Box<dyn TaxSplitPolicy>) -> Self {
        self.credit_notes = CreditNoteManager::with_tax_split(self.storage.clone(), policy);
        self
    }

    // Ledger operations

    /// Get an invoice by ID
    pub async fn get_invoice(&self, invoice_id: &str) -> ReconcileResult<Option<Invoice>> {
        self.storage.get_invoice(invoice_id).await
    }

    /// Apply a bare balance delta to an invoice
    pub async fn apply_delta(
        &mut self,
        invoice_id: &str,
        delta: Money,
        kind: LedgerEntryKind,
    ) -> ReconcileResult<Invoice> {
        self.ledger.apply_delta(invoice_id, delta, kind).await
    }

    // Payment operations

    /// Record a payment against an invoice
    pub async fn record_partial_payment(
        &mut self,
        invoice_id: &str,
        amount: Money,
        method: PaymentMethod,
        notes: Option<&str>,
        idempotency_key: Option<&str>,
    ) -> ReconcileResult<(Invoice, Payment)> {
        self.payments
            .record_partial_payment(invoice_id, amount, method, notes, idempotency_key)
            .await
    }

    // Credit note operations

    /// Create a draft credit note
    pub async fn create_credit_note(
        &mut self,
        invoice_id: &str,
        amount: Money,
        reason: &str,
    ) -> ReconcileResult<CreditNote> {
        self.credit_notes.create(invoice_id, amount, reason).await
    }

    /// Issue a draft credit note
    pub async fn issue_credit_note(&mut self, credit_note_id: &str) -> ReconcileResult<CreditNote> {
        self.credit_notes.issue(credit_note_id).await
    }

    /// Apply an issued credit note to its invoice
    pub async fn apply_credit_note(
        &mut self,
        credit_note_id: &str,
    ) -> ReconcileResult<(CreditNote, Invoice)> {
        self.credit_notes.apply(credit_note_id).await
    }

    // Matching operations

    /// Rank a tenant's open invoices against an unmatched bank transaction
    pub async fn suggest_matches(
        &self,
        transaction_id: &str,
        tenant_id: &str,
    ) -> ReconcileResult<Vec<MatchSuggestion>> {
        let transaction = self
            .storage
            .get_bank_transaction(transaction_id)
            .await?
            .ok_or_else(|| ReconcileError::TransactionNotFound(transaction_id.to_string()))?;
        if transaction.is_matched() {
            return Err(ReconcileError::AlreadyMatched(transaction.id));
        }
        let candidates = self.storage.list_open_invoices(tenant_id).await?;
        Ok(self.matcher.suggest(&transaction, &candidates))
    }

    /// Commit an operator-confirmed match
    pub async fn confirm_match(
        &mut self,
        transaction_id: &str,
        invoice_id: &str,
    ) -> ReconcileResult<MatchOutcome> {
        self.applier.confirm_match(transaction_id, invoice_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::memory_storage::MemoryStorage;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn suggest_then_confirm_settles_the_invoice() {
        let mut storage = MemoryStorage::new();
        let mut invoice = Invoice::new(InvoiceParams {
            id: "inv1".to_string(),
            tenant_id: "t1".to_string(),
            number: "FV-2024-0001".to_string(),
            customer_name: "Acme s.r.o.".to_string(),
            order_reference: None,
            currency: "CZK".to_string(),
            subtotal: Money::from_minor(1000),
            tax: Money::zero(),
            issue_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
        }).unwrap();
        invoice.status = InvoiceStatus::Sent;
        storage.save_invoice(&invoice).await.unwrap();
        storage
            .save_bank_transaction(&BankTransaction {
                id: "tx1".to_string(),
                date: NaiveDate::from_ymd_opt(2024, 3, 16).unwrap(),
                amount: Money::from_minor(1000),
                currency: "CZK".to_string(),
                counterparty_name: Some("ACME".to_string()),
                counterparty_account: None,
                description: None,
                variable_symbol: Some("2024001".to_string()),
                matched_invoice_id: None,
            })
            .await
            .unwrap();

        let mut engine = Reconciliation::new(storage);
        let suggestions = engine.suggest_matches("tx1", "t1").await.unwrap();
        assert_eq!(suggestions[0].invoice_id, "inv1");
        assert!(suggestions[0].confidence >= 0.9);

        let outcome = engine.confirm_match("tx1", "inv1").await.unwrap();
        assert_eq!(outcome.invoice.status, InvoiceStatus::Paid);

        let err = engine.suggest_matches("tx1", "t1").await.unwrap_err();
        assert!(matches!(err, ReconcileError::AlreadyMatched(_)));
    }
}
