//! Payment recording against the invoice ledger

use chrono::Utc;
use std::collections::HashMap;
use uuid::Uuid;

use crate::ledger::{apply_delta, LedgerEntryKind, MAX_COMMIT_RETRIES};
use crate::money::Money;
use crate::traits::ReconciliationStorage;
use crate::types::*;
use crate::utils::validation::{validate_id, validate_positive_amount};

/// Records partial and full payments, pairing the ledger mutation with an
/// immutable [`Payment`] record in one atomic commit.
pub struct PaymentRecorder<S: ReconciliationStorage> {
    storage: S,
}

impl<S: ReconciliationStorage> PaymentRecorder<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    async fn get_invoice_required(&self, invoice_id: &str) -> ReconcileResult<Invoice> {
        self.storage
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| ReconcileError::InvoiceNotFound(invoice_id.to_string()))
    }

    /// Record a payment of `amount` against an invoice.
    ///
    /// Fails with [`ReconcileError::ExceedsRemainingBalance`] when the
    /// amount is more than what is owed; the check and the write happen
    /// under the invoice's version guard, so two racing payments can never
    /// both pass on a stale balance. A repeated call with an already
    /// processed `idempotency_key` returns the prior payment and the
    /// current invoice without mutating anything.
    pub async fn record_partial_payment(
        &mut self,
        invoice_id: &str,
        amount: Money,
        method: PaymentMethod,
        notes: Option<&str>,
        idempotency_key: Option<&str>,
    ) -> ReconcileResult<(Invoice, Payment)> {
        validate_id(invoice_id, "invoice")?;
        validate_positive_amount(amount)?;

        let mut attempts = 0;
        loop {
            // Checked on every attempt: a duplicate request can land its
            // commit between this lookup and ours, so the commit unit's
            // unique-key constraint is the actual guarantee and this lookup
            // is the fast path.
            if let Some(key) = idempotency_key {
                if let Some(prior) = self.storage.find_payment_by_idempotency_key(key).await? {
                    let invoice = self.get_invoice_required(&prior.invoice_id).await?;
                    tracing::debug!(
                        payment_id = %prior.id,
                        idempotency_key = key,
                        "returning previously recorded payment"
                    );
                    return Ok((invoice, prior));
                }
            }

            let mut invoice = self.get_invoice_required(invoice_id).await?;
            let expected = invoice.version;

            apply_delta(
                &mut invoice,
                amount,
                LedgerEntryKind::Payment,
                Utc::now().date_naive(),
            )
            .map_err(|err| match err {
                ReconcileError::InsufficientRemainingBalance {
                    requested,
                    remaining,
                } => ReconcileError::ExceedsRemainingBalance {
                    requested,
                    remaining,
                },
                other => other,
            })?;
            invoice.version = expected + 1;

            let payment = Payment {
                id: Uuid::new_v4().to_string(),
                invoice_id: invoice.id.clone(),
                amount,
                currency: invoice.currency.clone(),
                method,
                status: PaymentStatus::Completed,
                completed_at: Utc::now().naive_utc(),
                notes: notes.map(str::to_string),
                idempotency_key: idempotency_key.map(str::to_string),
                metadata: HashMap::new(),
            };

            match self
                .storage
                .commit_payment_application(&invoice, expected, &payment)
                .await
            {
                Ok(()) => {
                    tracing::info!(
                        payment_id = %payment.id,
                        invoice_id = %invoice.id,
                        amount = %amount,
                        remaining = %invoice.amount_remaining,
                        status = ?invoice.status,
                        "recorded payment"
                    );
                    return Ok((invoice, payment));
                }
                Err(ReconcileError::VersionConflict { .. }) if attempts + 1 < MAX_COMMIT_RETRIES => {
                    attempts += 1;
                    tracing::debug!(invoice_id, attempts, "payment commit conflicted, retrying");
                }
                Err(ReconcileError::DuplicateIdempotencyKey(key)) => {
                    // A duplicate request won the race after our lookup;
                    // surface its result as ours.
                    let prior = self
                        .storage
                        .find_payment_by_idempotency_key(&key)
                        .await?
                        .ok_or(ReconcileError::DuplicateIdempotencyKey(key))?;
                    let invoice = self.get_invoice_required(&prior.invoice_id).await?;
                    tracing::debug!(
                        payment_id = %prior.id,
                        "duplicate idempotency key lost the commit race, returning prior payment"
                    );
                    return Ok((invoice, prior));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::memory_storage::MemoryStorage;
    use chrono::NaiveDate;

    async fn seed_invoice(storage: &mut MemoryStorage, id: &str, total_minor: i64) {
        let mut invoice = Invoice::new(InvoiceParams {
            id: id.to_string(),
            tenant_id: "t1".to_string(),
            number: format!("FV-2024-{id}"),
            customer_name: "Acme s.r.o.".to_string(),
            order_reference: None,
            currency: "CZK".to_string(),
            subtotal: Money::from_minor(total_minor),
            tax: Money::zero(),
            issue_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        }).unwrap();
        invoice.status = InvoiceStatus::Sent;
        storage.save_invoice(&invoice).await.unwrap();
    }

    #[tokio::test]
    async fn partial_then_full_payment() {
        let mut storage = MemoryStorage::new();
        seed_invoice(&mut storage, "inv1", 1000).await;
        let mut recorder = PaymentRecorder::new(storage);

        let (invoice, payment) = recorder
            .record_partial_payment("inv1", Money::from_minor(400), PaymentMethod::BankTransfer, None, None)
            .await
            .unwrap();
        assert_eq!(invoice.amount_paid, Money::from_minor(400));
        assert_eq!(invoice.amount_remaining, Money::from_minor(600));
        assert_eq!(invoice.status, InvoiceStatus::Partial);
        assert_eq!(payment.amount, Money::from_minor(400));
        assert_eq!(payment.status, PaymentStatus::Completed);

        let (invoice, _) = recorder
            .record_partial_payment("inv1", Money::from_minor(600), PaymentMethod::BankTransfer, None, None)
            .await
            .unwrap();
        assert_eq!(invoice.amount_paid, Money::from_minor(1000));
        assert_eq!(invoice.amount_remaining, Money::zero());
        assert_eq!(invoice.status, InvoiceStatus::Paid);
    }

    #[tokio::test]
    async fn overpayment_is_rejected() {
        let mut storage = MemoryStorage::new();
        seed_invoice(&mut storage, "inv1", 1000).await;
        let mut recorder = PaymentRecorder::new(storage);

        let err = recorder
            .record_partial_payment("inv1", Money::from_minor(1500), PaymentMethod::Card, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::ExceedsRemainingBalance { .. }));
    }

    #[tokio::test]
    async fn same_idempotency_key_records_one_payment() {
        let mut storage = MemoryStorage::new();
        seed_invoice(&mut storage, "inv1", 1000).await;
        let mut recorder = PaymentRecorder::new(storage.clone());

        let (_, first) = recorder
            .record_partial_payment(
                "inv1",
                Money::from_minor(400),
                PaymentMethod::BankTransfer,
                None,
                Some("ext-pay-1"),
            )
            .await
            .unwrap();
        let (invoice, second) = recorder
            .record_partial_payment(
                "inv1",
                Money::from_minor(400),
                PaymentMethod::BankTransfer,
                None,
                Some("ext-pay-1"),
            )
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        // One balance reduction, not two
        assert_eq!(invoice.amount_remaining, Money::from_minor(600));
        assert_eq!(storage.payment_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_payments_cannot_overdraw() {
        let mut storage = MemoryStorage::new();
        seed_invoice(&mut storage, "inv1", 100).await;

        let mut a = PaymentRecorder::new(storage.clone());
        let mut b = PaymentRecorder::new(storage.clone());
        let task_a = tokio::spawn(async move {
            a.record_partial_payment("inv1", Money::from_minor(60), PaymentMethod::Card, None, None)
                .await
        });
        let task_b = tokio::spawn(async move {
            b.record_partial_payment("inv1", Money::from_minor(60), PaymentMethod::Card, None, None)
                .await
        });

        let results = [task_a.await.unwrap(), task_b.await.unwrap()];
        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1, "exactly one of two racing payments may land");
        assert!(results.iter().any(|r| matches!(
            r,
            Err(ReconcileError::ExceedsRemainingBalance { .. })
        )));

        let invoice = storage.get_invoice("inv1").await.unwrap().unwrap();
        assert_eq!(invoice.amount_remaining, Money::from_minor(40));
        assert_eq!(
            invoice.amount_paid.checked_add(invoice.amount_remaining),
            Some(invoice.total)
        );
    }
}
