//! In-memory storage implementation for testing and development
//!
//! Reference semantics for a transactional backend: every `commit_*` unit
//! takes the write lock once, performs the invoice version check, and
//! applies all of its writes inside it, so a unit is observed either in
//! full or not at all.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::traits::ReconciliationStorage;
use crate::types::*;

#[derive(Debug, Default)]
struct Inner {
    invoices: HashMap<String, Invoice>,
    credit_notes: HashMap<String, CreditNote>,
    payments: HashMap<String, Payment>,
    payments_by_key: HashMap<String, String>,
    transactions: HashMap<String, BankTransaction>,
}

impl Inner {
    /// Version check shared by all commit units. Callers pass the invoice
    /// with its version already bumped past `expected_version`.
    fn check_version(&self, invoice: &Invoice, expected_version: u64) -> ReconcileResult<()> {
        let stored = self
            .invoices
            .get(&invoice.id)
            .ok_or_else(|| ReconcileError::InvoiceNotFound(invoice.id.clone()))?;
        if stored.version != expected_version {
            return Err(ReconcileError::VersionConflict {
                id: invoice.id.clone(),
                expected: expected_version,
            });
        }
        Ok(())
    }

    /// Unique-key constraint shared by the payment-writing commit units.
    fn check_idempotency_key(&self, payment: &Payment) -> ReconcileResult<()> {
        if let Some(key) = &payment.idempotency_key {
            if self.payments_by_key.contains_key(key) {
                return Err(ReconcileError::DuplicateIdempotencyKey(key.clone()));
            }
        }
        Ok(())
    }

    fn insert_payment(&mut self, payment: &Payment) {
        if let Some(key) = &payment.idempotency_key {
            self.payments_by_key.insert(key.clone(), payment.id.clone());
        }
        self.payments.insert(payment.id.clone(), payment.clone());
    }
}

/// In-memory storage for tests and development.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap();
        *inner = Inner::default();
    }

    /// Number of recorded payments (useful for idempotency assertions)
    pub fn payment_count(&self) -> usize {
        self.inner.read().unwrap().payments.len()
    }
}

#[async_trait]
impl ReconciliationStorage for MemoryStorage {
    async fn get_invoice(&self, invoice_id: &str) -> ReconcileResult<Option<Invoice>> {
        Ok(self.inner.read().unwrap().invoices.get(invoice_id).cloned())
    }

    async fn list_open_invoices(&self, tenant_id: &str) -> ReconcileResult<Vec<Invoice>> {
        let inner = self.inner.read().unwrap();
        let mut open: Vec<Invoice> = inner
            .invoices
            .values()
            .filter(|invoice| invoice.tenant_id == tenant_id && invoice.is_open())
            .cloned()
            .collect();
        open.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(open)
    }

    async fn save_invoice(&mut self, invoice: &Invoice) -> ReconcileResult<()> {
        self.inner
            .write()
            .unwrap()
            .invoices
            .insert(invoice.id.clone(), invoice.clone());
        Ok(())
    }

    async fn commit_invoice(
        &mut self,
        invoice: &Invoice,
        expected_version: u64,
    ) -> ReconcileResult<()> {
        let mut inner = self.inner.write().unwrap();
        inner.check_version(invoice, expected_version)?;
        inner.invoices.insert(invoice.id.clone(), invoice.clone());
        Ok(())
    }

    async fn get_credit_note(&self, credit_note_id: &str) -> ReconcileResult<Option<CreditNote>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .credit_notes
            .get(credit_note_id)
            .cloned())
    }

    async fn list_invoice_credit_notes(
        &self,
        invoice_id: &str,
    ) -> ReconcileResult<Vec<CreditNote>> {
        let inner = self.inner.read().unwrap();
        let mut notes: Vec<CreditNote> = inner
            .credit_notes
            .values()
            .filter(|note| note.invoice_id == invoice_id)
            .cloned()
            .collect();
        notes.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(notes)
    }

    async fn save_credit_note(&mut self, credit_note: &CreditNote) -> ReconcileResult<()> {
        self.inner
            .write()
            .unwrap()
            .credit_notes
            .insert(credit_note.id.clone(), credit_note.clone());
        Ok(())
    }

    async fn update_credit_note(&mut self, credit_note: &CreditNote) -> ReconcileResult<()> {
        let mut inner = self.inner.write().unwrap();
        if !inner.credit_notes.contains_key(&credit_note.id) {
            return Err(ReconcileError::CreditNoteNotFound(credit_note.id.clone()));
        }
        inner
            .credit_notes
            .insert(credit_note.id.clone(), credit_note.clone());
        Ok(())
    }

    async fn get_payment(&self, payment_id: &str) -> ReconcileResult<Option<Payment>> {
        Ok(self.inner.read().unwrap().payments.get(payment_id).cloned())
    }

    async fn find_payment_by_idempotency_key(
        &self,
        key: &str,
    ) -> ReconcileResult<Option<Payment>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .payments_by_key
            .get(key)
            .and_then(|id| inner.payments.get(id))
            .cloned())
    }

    async fn get_bank_transaction(
        &self,
        transaction_id: &str,
    ) -> ReconcileResult<Option<BankTransaction>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .transactions
            .get(transaction_id)
            .cloned())
    }

    async fn save_bank_transaction(
        &mut self,
        transaction: &BankTransaction,
    ) -> ReconcileResult<()> {
        self.inner
            .write()
            .unwrap()
            .transactions
            .insert(transaction.id.clone(), transaction.clone());
        Ok(())
    }

    async fn commit_payment_application(
        &mut self,
        invoice: &Invoice,
        expected_version: u64,
        payment: &Payment,
    ) -> ReconcileResult<()> {
        let mut inner = self.inner.write().unwrap();
        inner.check_idempotency_key(payment)?;
        inner.check_version(invoice, expected_version)?;
        inner.invoices.insert(invoice.id.clone(), invoice.clone());
        inner.insert_payment(payment);
        Ok(())
    }

    async fn commit_credit_application(
        &mut self,
        invoice: &Invoice,
        expected_version: u64,
        credit_note: &CreditNote,
    ) -> ReconcileResult<()> {
        let mut inner = self.inner.write().unwrap();
        inner.check_version(invoice, expected_version)?;
        if !inner.credit_notes.contains_key(&credit_note.id) {
            return Err(ReconcileError::CreditNoteNotFound(credit_note.id.clone()));
        }
        inner.invoices.insert(invoice.id.clone(), invoice.clone());
        inner
            .credit_notes
            .insert(credit_note.id.clone(), credit_note.clone());
        Ok(())
    }

    async fn commit_match_application(
        &mut self,
        invoice: &Invoice,
        expected_version: u64,
        payment: &Payment,
        transaction: &BankTransaction,
    ) -> ReconcileResult<()> {
        let mut inner = self.inner.write().unwrap();
        let stored = inner
            .transactions
            .get(&transaction.id)
            .ok_or_else(|| ReconcileError::TransactionNotFound(transaction.id.clone()))?;
        if stored.is_matched() {
            return Err(ReconcileError::AlreadyMatched(transaction.id.clone()));
        }
        inner.check_idempotency_key(payment)?;
        inner.check_version(invoice, expected_version)?;
        inner.invoices.insert(invoice.id.clone(), invoice.clone());
        inner.insert_payment(payment);
        inner
            .transactions
            .insert(transaction.id.clone(), transaction.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use chrono::NaiveDate;

    fn invoice(id: &str, version: u64) -> Invoice {
        let mut invoice = Invoice::new(InvoiceParams {
            id: id.to_string(),
            tenant_id: "t1".to_string(),
            number: "FV-2024-0001".to_string(),
            customer_name: "Acme".to_string(),
            order_reference: None,
            currency: "CZK".to_string(),
            subtotal: Money::from_minor(1000),
            tax: Money::zero(),
            issue_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        }).unwrap();
        invoice.status = InvoiceStatus::Sent;
        invoice.version = version;
        invoice
    }

    #[tokio::test]
    async fn commit_rejects_stale_version() {
        let mut storage = MemoryStorage::new();
        storage.save_invoice(&invoice("inv1", 0)).await.unwrap();

        let updated = invoice("inv1", 1);
        storage.commit_invoice(&updated, 0).await.unwrap();

        // A writer that still saw version 0 must lose
        let stale = invoice("inv1", 1);
        let err = storage.commit_invoice(&stale, 0).await.unwrap_err();
        assert!(matches!(err, ReconcileError::VersionConflict { .. }));
    }

    #[tokio::test]
    async fn failed_match_commit_leaves_all_records_unchanged() {
        let mut storage = MemoryStorage::new();
        storage.save_invoice(&invoice("inv1", 5)).await.unwrap();
        let txn = BankTransaction {
            id: "tx1".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            amount: Money::from_minor(1000),
            currency: "CZK".to_string(),
            counterparty_name: None,
            counterparty_account: None,
            description: None,
            variable_symbol: None,
            matched_invoice_id: None,
        };
        storage.save_bank_transaction(&txn).await.unwrap();

        let mut updated = invoice("inv1", 6);
        updated.amount_paid = Money::from_minor(1000);
        updated.amount_remaining = Money::zero();
        let mut marked = txn.clone();
        marked.matched_invoice_id = Some("inv1".to_string());
        let payment = Payment {
            id: "pay1".to_string(),
            invoice_id: "inv1".to_string(),
            amount: Money::from_minor(1000),
            currency: "CZK".to_string(),
            method: PaymentMethod::BankReconciliation,
            status: PaymentStatus::Completed,
            completed_at: chrono::Utc::now().naive_utc(),
            notes: None,
            idempotency_key: None,
            metadata: HashMap::new(),
        };

        // Wrong expected version: the whole unit must be rejected
        let err = storage
            .commit_match_application(&updated, 0, &payment, &marked)
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::VersionConflict { .. }));

        assert_eq!(storage.payment_count(), 0);
        let stored_txn = storage.get_bank_transaction("tx1").await.unwrap().unwrap();
        assert!(!stored_txn.is_matched());
        let stored_invoice = storage.get_invoice("inv1").await.unwrap().unwrap();
        assert_eq!(stored_invoice.amount_paid, Money::zero());
    }

    #[tokio::test]
    async fn commit_rejects_duplicate_idempotency_key() {
        let mut storage = MemoryStorage::new();
        storage.save_invoice(&invoice("inv1", 0)).await.unwrap();
        let payment = Payment {
            id: "pay1".to_string(),
            invoice_id: "inv1".to_string(),
            amount: Money::from_minor(100),
            currency: "CZK".to_string(),
            method: PaymentMethod::BankTransfer,
            status: PaymentStatus::Completed,
            completed_at: chrono::Utc::now().naive_utc(),
            notes: None,
            idempotency_key: Some("evt-1".to_string()),
            metadata: HashMap::new(),
        };
        storage
            .commit_payment_application(&invoice("inv1", 1), 0, &payment)
            .await
            .unwrap();

        // A second writer with the same key and a fresh version must still
        // lose the whole unit
        let mut duplicate = payment.clone();
        duplicate.id = "pay2".to_string();
        let err = storage
            .commit_payment_application(&invoice("inv1", 2), 1, &duplicate)
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::DuplicateIdempotencyKey(_)));
        assert_eq!(storage.payment_count(), 1);
        let stored = storage.get_invoice("inv1").await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn idempotency_key_lookup_round_trips() {
        let mut storage = MemoryStorage::new();
        storage.save_invoice(&invoice("inv1", 0)).await.unwrap();
        let payment = Payment {
            id: "pay1".to_string(),
            invoice_id: "inv1".to_string(),
            amount: Money::from_minor(100),
            currency: "CZK".to_string(),
            method: PaymentMethod::Cash,
            status: PaymentStatus::Completed,
            completed_at: chrono::Utc::now().naive_utc(),
            notes: None,
            idempotency_key: Some("key-1".to_string()),
            metadata: HashMap::new(),
        };
        let updated = invoice("inv1", 1);
        storage
            .commit_payment_application(&updated, 0, &payment)
            .await
            .unwrap();

        let found = storage
            .find_payment_by_idempotency_key("key-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "pay1");
        assert!(storage
            .find_payment_by_idempotency_key("other")
            .await
            .unwrap()
            .is_none());
    }
}
