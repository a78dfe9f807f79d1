//! # Reconciliation Core
//!
//! A financial reconciliation library keeping an invoice's paid/owed state
//! consistent while money arrives through three independent channels:
//! direct partial payments, credit notes, and bank-statement transactions
//! matched to open invoices.
//!
//! ## Features
//!
//! - **Invoice ledger**: a state machine guaranteeing `amount_paid +
//!   amount_remaining == total` through every mutation
//! - **Credit notes**: bounded reversals with a draft/issued/applied
//!   lifecycle, capped at the invoice's original total
//! - **Payment recording**: atomic, idempotent partial/full payments
//! - **Transaction matching**: ranked, explainable match suggestions from
//!   amount, date, payment-reference, name, and free-text signals
//! - **Storage abstraction**: database-agnostic design with trait-based
//!   storage and optimistic concurrency
//!
//! ## Quick Start
//!
//! ```rust
//! use reconciliation_core::utils::MemoryStorage;
//! use reconciliation_core::{Money, PaymentMethod, Reconciliation};
//!
//! # async fn demo() -> Result<(), reconciliation_core::ReconcileError> {
//! let storage = MemoryStorage::new();
//! let mut engine = Reconciliation::new(storage);
//! // Seed invoices through your storage backend, then:
//! // engine.record_partial_payment("inv1", Money::from_minor(40_000),
//! //     PaymentMethod::BankTransfer, None, Some("ext-pay-1")).await?;
//! # Ok(())
//! # }
//! ```

pub mod credit;
pub mod ledger;
pub mod matching;
pub mod money;
pub mod payment;
pub mod reconciliation;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use credit::CreditNoteManager;
pub use ledger::{InvoiceLedger, LedgerEntryKind};
pub use matching::{MatchApplier, MatchOutcome, MatcherConfig, TransactionMatcher};
pub use money::Money;
pub use payment::PaymentRecorder;
pub use reconciliation::Reconciliation;
pub use traits::*;
pub use types::*;
