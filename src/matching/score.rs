//! Match factor computation and composite confidence scoring
//!
//! Pure and read-only: scoring an unattributed bank transaction against a
//! set of candidate invoices has no side effects and is safe to run
//! repeatedly and concurrently against a stale snapshot. The final
//! application re-validates the balance atomically.

use chrono::NaiveDate;

use crate::matching::MatcherConfig;
use crate::types::{BankTransaction, Invoice, MatchFactors, MatchSuggestion};

/// Scores candidate invoices for an incoming bank transaction and produces
/// ranked, explainable suggestions.
pub struct TransactionMatcher {
    config: MatcherConfig,
}

impl Default for TransactionMatcher {
    fn default() -> Self {
        Self::new(MatcherConfig::default())
    }
}

impl TransactionMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    /// Rank open candidate invoices for a transaction, best first.
    ///
    /// Closed candidates (cancelled, fully paid) and foreign-currency
    /// candidates are skipped; results below the configured noise floor are
    /// dropped and the list is capped at `max_suggestions`.
    pub fn suggest(
        &self,
        transaction: &BankTransaction,
        candidates: &[Invoice],
    ) -> Vec<MatchSuggestion> {
        let mut suggestions: Vec<MatchSuggestion> = candidates
            .iter()
            .filter(|invoice| invoice.is_open() && invoice.currency == transaction.currency)
            .map(|invoice| self.score_candidate(transaction, invoice))
            .filter(|s| s.confidence >= self.config.min_confidence)
            .collect();

        suggestions.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.invoice_id.cmp(&b.invoice_id))
        });
        suggestions.truncate(self.config.max_suggestions);
        suggestions
    }

    /// Compute the per-signal factors and composite confidence for one
    /// candidate.
    pub fn score_candidate(
        &self,
        transaction: &BankTransaction,
        invoice: &Invoice,
    ) -> MatchSuggestion {
        let factors = MatchFactors {
            amount_match: transaction.amount.abs_diff(invoice.amount_remaining)
                <= self.config.amount_epsilon,
            date_proximity: self.date_proximity(transaction.date, invoice),
            vs_match: variable_symbol_matches(
                transaction.variable_symbol.as_deref(),
                &invoice.number,
            ),
            name_match: name_similarity(
                transaction.counterparty_name.as_deref(),
                &invoice.customer_name,
            ),
            text_similarity: text_similarity(transaction.description.as_deref(), invoice),
        };

        MatchSuggestion {
            invoice_id: invoice.id.clone(),
            confidence: self.composite_confidence(&factors),
            reason: describe_factors(&factors),
            factors,
        }
    }

    /// Noisy-OR combination of the weighted factors: each firing signal
    /// independently removes a share of the residual doubt. Amount and
    /// variable symbol dominate; date, name, and text similarity act as
    /// tie-breakers among candidates that already satisfy one of them.
    fn composite_confidence(&self, factors: &MatchFactors) -> f64 {
        let c = &self.config;
        let signals = [
            (c.amount_weight, if factors.amount_match { 1.0 } else { 0.0 }),
            (c.vs_weight, if factors.vs_match { 1.0 } else { 0.0 }),
            (c.date_weight, factors.date_proximity),
            (c.name_weight, factors.name_match),
            (c.text_weight, factors.text_similarity),
        ];
        let residual: f64 = signals
            .iter()
            .map(|(weight, value)| 1.0 - weight * value.clamp(0.0, 1.0))
            .product();
        (1.0 - residual).clamp(0.0, 1.0)
    }

    /// Highest at or shortly after the due/issue date, linearly decaying to
    /// zero over the configured window. A transaction dated *before* its
    /// reference decays at double rate, since settlements land at or after
    /// the dates printed on the invoice.
    fn date_proximity(&self, transaction_date: NaiveDate, invoice: &Invoice) -> f64 {
        let window = self.config.date_window_days.max(1) as f64;
        [invoice.due_date, invoice.issue_date]
            .into_iter()
            .map(|reference| {
                let days = (transaction_date - reference).num_days();
                let distance = if days >= 0 { days as f64 } else { -days as f64 * 2.0 };
                (1.0 - distance / window).clamp(0.0, 1.0)
            })
            .fold(0.0, f64::max)
    }
}

/// Derive the deterministic payment reference for an invoice number.
///
/// Digit groups are concatenated: the first group verbatim, later groups
/// numerically with the final sequence padded to three digits, so
/// `FV-2024-0001` derives `2024001`.
pub fn derive_variable_symbol(invoice_number: &str) -> Option<String> {
    let groups = digit_groups(invoice_number);
    let (first, rest) = groups.split_first()?;
    let mut symbol = first.clone();
    for (i, group) in rest.iter().enumerate() {
        let n: u64 = group.parse().ok()?;
        if i == rest.len() - 1 {
            symbol.push_str(&format!("{n:03}"));
        } else {
            symbol.push_str(&n.to_string());
        }
    }
    Some(symbol)
}

fn variable_symbol_matches(variable_symbol: Option<&str>, invoice_number: &str) -> bool {
    let Some(vs) = variable_symbol else {
        return false;
    };
    let vs: String = vs.chars().filter(char::is_ascii_digit).collect();
    if vs.is_empty() {
        return false;
    }

    let raw: String = invoice_number
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    if !raw.is_empty()
        && (vs == raw || vs.trim_start_matches('0') == raw.trim_start_matches('0'))
    {
        return true;
    }
    derive_variable_symbol(invoice_number).is_some_and(|derived| derived == vs)
}

fn digit_groups(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_ascii_digit())
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect()
}

/// Token-set Jaccard overlap between normalized names. Case- and
/// diacritic-insensitive; short legal-form fragments ("s.r.o.", "a.s.")
/// fall out of tokenization.
fn name_similarity(counterparty: Option<&str>, customer_name: &str) -> f64 {
    let Some(counterparty) = counterparty else {
        return 0.0;
    };
    let a = tokens(counterparty);
    let b = tokens(customer_name);
    jaccard(&a, &b)
}

/// Overlap between the free-text description and the invoice's metadata
/// (number, customer name, order reference). A description containing the
/// invoice number verbatim scores 1.0; otherwise tokens overlap with a
/// fuzzy edit-distance fallback for typos.
fn text_similarity(description: Option<&str>, invoice: &Invoice) -> f64 {
    let Some(description) = description else {
        return 0.0;
    };

    let description_digits: String = description.chars().filter(char::is_ascii_digit).collect();
    let number_digits: String = invoice
        .number
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    if !number_digits.is_empty() && description_digits.contains(&number_digits) {
        return 1.0;
    }

    let mut metadata = tokens(&invoice.number);
    metadata.extend(tokens(&invoice.customer_name));
    if let Some(reference) = &invoice.order_reference {
        metadata.extend(tokens(reference));
    }
    metadata.sort();
    metadata.dedup();

    let description_tokens = tokens(description);
    if description_tokens.is_empty() || metadata.is_empty() {
        return 0.0;
    }

    let shared = metadata
        .iter()
        .filter(|m| {
            description_tokens
                .iter()
                .any(|d| d == *m || levenshtein_similarity(d, m) >= 0.8)
        })
        .count();
    shared as f64 / metadata.len().min(description_tokens.len()) as f64
}

const LEGAL_SUFFIXES: [&str; 6] = ["sro", "spol", "ltd", "llc", "inc", "gmbh"];

fn tokens(text: &str) -> Vec<String> {
    let mut out: Vec<String> = normalize(text)
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| t.len() >= 2 && !LEGAL_SUFFIXES.contains(t))
        .map(str::to_string)
        .collect();
    out.sort();
    out.dedup();
    out
}

/// Lowercase and fold the Latin diacritics common in counterparty names.
fn normalize(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ä' | 'å' | 'ă' | 'ą' => 'a',
            'č' | 'ç' | 'ć' => 'c',
            'ď' => 'd',
            'é' | 'è' | 'ê' | 'ë' | 'ě' | 'ę' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ľ' | 'ĺ' | 'ł' => 'l',
            'ň' | 'ñ' | 'ń' => 'n',
            'ó' | 'ò' | 'ô' | 'ö' | 'ő' => 'o',
            'ř' => 'r',
            'š' | 'ś' | 'ş' => 's',
            'ť' => 't',
            'ú' | 'ù' | 'û' | 'ü' | 'ů' | 'ű' => 'u',
            'ý' | 'ÿ' => 'y',
            'ž' | 'ź' | 'ż' => 'z',
            other => other,
        })
        .collect()
}

fn jaccard(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.iter().filter(|t| b.contains(t)).count();
    let union = a.len() + b.len() - shared;
    shared as f64 / union as f64
}

/// Normalized Levenshtein similarity in [0, 1].
fn levenshtein_similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b_chars.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut previous_diagonal = row[0];
        row[0] = i + 1;
        for (j, &cb) in b_chars.iter().enumerate() {
            let substitution = previous_diagonal + usize::from(ca != cb);
            previous_diagonal = row[j + 1];
            row[j + 1] = substitution.min(row[j] + 1).min(previous_diagonal + 1);
        }
    }
    row[b_chars.len()]
}

fn describe_factors(factors: &MatchFactors) -> String {
    let mut phrases: Vec<&str> = Vec::new();
    if factors.amount_match && factors.vs_match {
        phrases.push("Amount and variable symbol match");
    } else if factors.amount_match {
        phrases.push("Amount matches remaining balance");
    } else if factors.vs_match {
        phrases.push("Variable symbol matches");
    }
    if factors.name_match >= 0.5 {
        phrases.push("counterparty name matches customer");
    }
    if factors.text_similarity >= 0.5 {
        phrases.push("description mentions invoice details");
    }
    if factors.date_proximity >= 0.5 {
        phrases.push("payment date near invoice dates");
    }
    if phrases.is_empty() {
        return "Weak signals only".to_string();
    }
    phrases.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::types::{ConfidenceLevel, InvoiceParams, InvoiceStatus};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn candidate(id: &str, number: &str, remaining_minor: i64) -> Invoice {
        let mut invoice = Invoice::new(InvoiceParams {
            id: id.to_string(),
            tenant_id: "t1".to_string(),
            number: number.to_string(),
            customer_name: "Nováková a synové".to_string(),
            order_reference: Some("ORD-77".to_string()),
            currency: "CZK".to_string(),
            subtotal: Money::from_minor(remaining_minor),
            tax: Money::zero(),
            issue_date: date(2024, 3, 1),
            due_date: date(2024, 3, 15),
        }).unwrap();
        invoice.status = InvoiceStatus::Sent;
        invoice
    }

    fn transaction(amount_minor: i64, vs: Option<&str>) -> BankTransaction {
        BankTransaction {
            id: "tx1".to_string(),
            date: date(2024, 3, 16),
            amount: Money::from_minor(amount_minor),
            currency: "CZK".to_string(),
            counterparty_name: Some("NOVAKOVA A SYNOVE".to_string()),
            counterparty_account: Some("123456789/0100".to_string()),
            description: Some("uhrada faktury FV-2024-0001".to_string()),
            variable_symbol: vs.map(str::to_string),
            matched_invoice_id: None,
        }
    }

    #[test]
    fn derives_variable_symbol_from_invoice_number() {
        assert_eq!(
            derive_variable_symbol("FV-2024-0001"),
            Some("2024001".to_string())
        );
        assert_eq!(
            derive_variable_symbol("FV-2024-0123"),
            Some("2024123".to_string())
        );
        assert_eq!(derive_variable_symbol("INV42"), Some("42".to_string()));
        assert_eq!(derive_variable_symbol("no digits"), None);
    }

    #[test]
    fn amount_and_vs_match_scores_high_confidence() {
        let matcher = TransactionMatcher::default();
        let invoice = candidate("inv1", "FV-2024-0001", 1000);
        let txn = transaction(1000, Some("2024001"));

        let suggestion = matcher.score_candidate(&txn, &invoice);
        assert!(suggestion.factors.amount_match);
        assert!(suggestion.factors.vs_match);
        assert!(suggestion.confidence >= 0.9);
        assert_eq!(suggestion.confidence_level(), ConfidenceLevel::High);
        assert!(suggestion.reason.contains("Amount and variable symbol match"));
    }

    #[test]
    fn either_dominant_factor_alone_reaches_medium() {
        let matcher = TransactionMatcher::new(MatcherConfig {
            // isolate the dominant factors
            date_weight: 0.0,
            name_weight: 0.0,
            text_weight: 0.0,
            ..MatcherConfig::default()
        });
        let invoice = candidate("inv1", "FV-2024-0001", 1000);

        let amount_only = matcher.score_candidate(&transaction(1000, None), &invoice);
        assert!(amount_only.factors.amount_match && !amount_only.factors.vs_match);
        assert!(amount_only.confidence >= 0.7);

        let vs_only = matcher.score_candidate(&transaction(555, Some("2024001")), &invoice);
        assert!(vs_only.factors.vs_match && !vs_only.factors.amount_match);
        assert!(vs_only.confidence >= 0.7);
    }

    #[test]
    fn both_dominant_factors_outrank_neither_regardless_of_order() {
        let matcher = TransactionMatcher::default();
        let strong = candidate("inv-a", "FV-2024-0001", 1000);
        let weak = candidate("inv-b", "FV-2024-0900", 555_00);
        let txn = transaction(1000, Some("2024001"));

        for candidates in [vec![strong.clone(), weak.clone()], vec![weak, strong]] {
            let suggestions = matcher.suggest(&txn, &candidates);
            assert_eq!(suggestions[0].invoice_id, "inv-a");
            assert!(suggestions[0].confidence > suggestions.get(1).map_or(0.0, |s| s.confidence));
        }
    }

    #[test]
    fn amount_epsilon_tolerates_smallest_unit() {
        let matcher = TransactionMatcher::default();
        let invoice = candidate("inv1", "FV-2024-0001", 1000);
        let suggestion = matcher.score_candidate(&transaction(1001, None), &invoice);
        assert!(suggestion.factors.amount_match);
        let suggestion = matcher.score_candidate(&transaction(1002, None), &invoice);
        assert!(!suggestion.factors.amount_match);
    }

    #[test]
    fn name_match_is_case_and_diacritic_insensitive() {
        let invoice = candidate("inv1", "FV-2024-0001", 1000);
        let txn = transaction(10, None);
        let matcher = TransactionMatcher::default();
        let suggestion = matcher.score_candidate(&txn, &invoice);
        // "NOVAKOVA A SYNOVE" vs "Nováková a synové"
        assert!(suggestion.factors.name_match > 0.99);
    }

    #[test]
    fn description_containing_invoice_number_scores_full_text_similarity() {
        let matcher = TransactionMatcher::default();
        let invoice = candidate("inv1", "FV-2024-0001", 1000);
        let suggestion = matcher.score_candidate(&transaction(10, None), &invoice);
        assert_eq!(suggestion.factors.text_similarity, 1.0);
    }

    #[test]
    fn date_proximity_decays_and_penalizes_early_payments() {
        let matcher = TransactionMatcher::default();
        let invoice = candidate("inv1", "FV-2024-0001", 1000);

        let mut txn = transaction(10, None);
        txn.date = date(2024, 3, 15);
        let on_due = matcher.score_candidate(&txn, &invoice).factors.date_proximity;
        assert_eq!(on_due, 1.0);

        txn.date = date(2024, 4, 14); // 30 days after due
        let late = matcher.score_candidate(&txn, &invoice).factors.date_proximity;
        assert!(late < 1.0 && late > 0.0);

        txn.date = date(2024, 6, 1); // far outside the window
        let gone = matcher.score_candidate(&txn, &invoice).factors.date_proximity;
        assert_eq!(gone, 0.0);
    }

    #[test]
    fn closed_and_foreign_currency_candidates_are_skipped() {
        let matcher = TransactionMatcher::default();
        let mut paid = candidate("inv-paid", "FV-2024-0001", 1000);
        paid.status = InvoiceStatus::Paid;
        paid.amount_remaining = Money::zero();
        let mut cancelled = candidate("inv-cancelled", "FV-2024-0002", 1000);
        cancelled.cancel();
        let mut foreign = candidate("inv-eur", "FV-2024-0003", 1000);
        foreign.currency = "EUR".to_string();

        let suggestions = matcher.suggest(&transaction(1000, None), &[paid, cancelled, foreign]);
        assert!(suggestions.is_empty());
    }

    #[test]
    fn result_size_is_capped() {
        let matcher = TransactionMatcher::default();
        let candidates: Vec<Invoice> = (0..25)
            .map(|i| candidate(&format!("inv{i:02}"), &format!("FV-2024-{i:04}"), 1000))
            .collect();
        let suggestions = matcher.suggest(&transaction(1000, None), &candidates);
        assert_eq!(suggestions.len(), 10);
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", "abc"), 0);
        assert!(levenshtein_similarity("faktura", "fakture") > 0.8);
    }
}
