//! Bank-transaction matching: scoring and operator-confirmed application

pub mod apply;
pub mod score;

pub use apply::{MatchApplier, MatchOutcome};
pub use score::TransactionMatcher;

use crate::money::Money;

/// Tunable matching policy. The factor weights shape the composite
/// confidence; the ordering contract (amount + variable symbol outranks
/// neither) holds for any weights where `amount` and `vs` dominate.
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// Tolerance for the amount comparison, in minor units. Covers bank
    /// rounding of the smallest currency unit.
    pub amount_epsilon: Money,
    /// Days after which date proximity decays to zero.
    pub date_window_days: i64,
    /// Weight of an exact amount match.
    pub amount_weight: f64,
    /// Weight of a variable-symbol match.
    pub vs_weight: f64,
    /// Weight of date proximity.
    pub date_weight: f64,
    /// Weight of counterparty/customer name overlap.
    pub name_weight: f64,
    /// Weight of description/metadata text similarity.
    pub text_weight: f64,
    /// Suggestions below this confidence are dropped as noise.
    pub min_confidence: f64,
    /// Result size cap.
    pub max_suggestions: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            amount_epsilon: Money::from_minor(1),
            date_window_days: 60,
            amount_weight: 0.75,
            vs_weight: 0.85,
            date_weight: 0.2,
            name_weight: 0.15,
            text_weight: 0.1,
            min_confidence: 0.05,
            max_suggestions: 10,
        }
    }
}
