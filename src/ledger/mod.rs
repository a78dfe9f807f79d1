//! Invoice ledger: the authoritative paid/owed state machine

pub mod invoice;

pub use invoice::{apply_delta, InvoiceLedger, LedgerEntryKind, MAX_COMMIT_RETRIES};
