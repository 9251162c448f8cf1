//! Subscription Batching
//!
//! Domain types for turning an inbound symbol list into bounded upstream
//! subscribe calls.
//!
//! # Design
//!
//! The upstream subscribe call carries a comma-joined symbol parameter with a
//! payload-size limit, so a symbol list of arbitrary length is split into
//! contiguous batches of at most [`BATCH_SIZE`] symbols. Batches are issued
//! one after another on the shared feed session, in input order.

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Constants
// =============================================================================

/// Maximum number of symbols sent in one upstream subscribe call.
pub const BATCH_SIZE: usize = 50;

// =============================================================================
// Symbol
// =============================================================================

/// An opaque ticker identifier (e.g. `AAPL`, `EUR/USD`, `BTC/USD`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Create a symbol from a token. Surrounding whitespace is trimmed.
    ///
    /// Returns `None` for an empty token.
    #[must_use]
    pub fn new(token: &str) -> Option<Self> {
        let token = token.trim();
        if token.is_empty() {
            None
        } else {
            Some(Self(token.to_string()))
        }
    }

    /// Get the ticker string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extract symbols from an inbound command payload.
    ///
    /// - Arrays yield one symbol per string item (non-strings are skipped).
    /// - Strings are split on `,`.
    /// - Any other shape yields no symbols.
    #[must_use]
    pub fn from_payload(payload: &Value) -> Vec<Self> {
        match payload {
            Value::Array(items) => items
                .iter()
                .filter_map(Value::as_str)
                .flat_map(|s| s.split(','))
                .filter_map(Self::new)
                .collect(),
            Value::String(s) => s.split(',').filter_map(Self::new).collect(),
            _ => Vec::new(),
        }
    }

    /// Parse a comma separated symbol list.
    #[must_use]
    pub fn parse_list(list: &str) -> Vec<Self> {
        list.split(',').filter_map(Self::new).collect()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Subscription Batch
// =============================================================================

/// An ordered, non-empty group of at most [`BATCH_SIZE`] symbols sent in a
/// single subscribe call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionBatch {
    symbols: Vec<Symbol>,
}

impl SubscriptionBatch {
    /// Create a batch.
    ///
    /// Returns `None` if `symbols` is empty or longer than [`BATCH_SIZE`].
    #[must_use]
    pub fn new(symbols: Vec<Symbol>) -> Option<Self> {
        if symbols.is_empty() || symbols.len() > BATCH_SIZE {
            None
        } else {
            Some(Self { symbols })
        }
    }

    /// Symbols in this batch, in input order.
    #[must_use]
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Number of symbols in this batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Always `false`; batches are never empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Comma-joined symbol parameter for the upstream subscribe call.
    #[must_use]
    pub fn to_param(&self) -> String {
        self.symbols
            .iter()
            .map(Symbol::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

// =============================================================================
// Batch Report
// =============================================================================

/// A batch the upstream client rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    /// Zero-based position of the batch within the request.
    pub index: usize,
    /// Number of symbols in the failed batch.
    pub size: usize,
    /// Error reported by the upstream client.
    pub reason: String,
}

/// Outcome of dispatching one symbol list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Number of subscribe calls issued.
    pub batches: usize,
    /// Number of symbols covered by all issued calls.
    pub symbols: usize,
    /// Calls that returned an error. Remaining batches are still issued.
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    /// Check if every batch was accepted.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

// =============================================================================
// Symbol Batcher
// =============================================================================

/// Splits symbol lists into [`SubscriptionBatch`]es and issues one subscribe
/// call per batch, strictly in sequence.
///
/// # Example
///
/// ```rust
/// use quote_feed_agent::domain::subscription::{Symbol, SymbolBatcher};
///
/// let symbols: Vec<Symbol> = (0..120)
///     .filter_map(|i| Symbol::new(&format!("S{i}")))
///     .collect();
///
/// let sizes: Vec<usize> = SymbolBatcher::new()
///     .batches(&symbols)
///     .map(|b| b.len())
///     .collect();
/// assert_eq!(sizes, vec![50, 50, 20]);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SymbolBatcher;

impl SymbolBatcher {
    /// Create a batcher using [`BATCH_SIZE`].
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Partition `symbols` into contiguous batches, preserving order.
    ///
    /// An empty input yields no batches.
    pub fn batches<'a>(
        &self,
        symbols: &'a [Symbol],
    ) -> impl Iterator<Item = SubscriptionBatch> + 'a {
        symbols
            .chunks(BATCH_SIZE)
            .map(|chunk| SubscriptionBatch {
                symbols: chunk.to_vec(),
            })
    }

    /// Number of batches `len` symbols produce.
    #[must_use]
    pub const fn batch_count(len: usize) -> usize {
        len.div_ceil(BATCH_SIZE)
    }

    /// Issue `subscribe_one` once per batch, awaiting each call before
    /// starting the next.
    ///
    /// A failed batch is recorded in the report and the remaining batches
    /// are still issued.
    pub async fn dispatch<F, Fut, E>(&self, symbols: &[Symbol], mut subscribe_one: F) -> BatchReport
    where
        F: FnMut(SubscriptionBatch) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: fmt::Display,
    {
        let mut report = BatchReport::default();

        for (index, batch) in self.batches(symbols).enumerate() {
            let size = batch.len();
            report.batches += 1;
            report.symbols += size;

            if let Err(e) = subscribe_one(batch).await {
                report.failures.push(BatchFailure {
                    index,
                    size,
                    reason: e.to_string(),
                });
            }
        }

        report
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn symbols(n: usize) -> Vec<Symbol> {
        (0..n).filter_map(|i| Symbol::new(&format!("SYM{i}"))).collect()
    }

    #[test]
    fn symbol_trims_and_rejects_empty() {
        assert_eq!(Symbol::new("  AAPL ").unwrap().as_str(), "AAPL");
        assert!(Symbol::new("").is_none());
        assert!(Symbol::new("   ").is_none());
    }

    #[test]
    fn from_payload_array_of_strings() {
        let parsed = Symbol::from_payload(&json!(["AAPL", "MSFT", "EUR/USD"]));
        let names: Vec<_> = parsed.iter().map(Symbol::as_str).collect();
        assert_eq!(names, vec!["AAPL", "MSFT", "EUR/USD"]);
    }

    #[test]
    fn from_payload_skips_non_strings() {
        let parsed = Symbol::from_payload(&json!(["AAPL", 42, null, {"s": "X"}, "TSLA"]));
        let names: Vec<_> = parsed.iter().map(Symbol::as_str).collect();
        assert_eq!(names, vec!["AAPL", "TSLA"]);
    }

    #[test]
    fn from_payload_comma_string() {
        let parsed = Symbol::from_payload(&json!("AAPL, MSFT,,GOOG"));
        let names: Vec<_> = parsed.iter().map(Symbol::as_str).collect();
        assert_eq!(names, vec!["AAPL", "MSFT", "GOOG"]);
    }

    #[test]
    fn from_payload_malformed_is_empty() {
        assert!(Symbol::from_payload(&json!(17)).is_empty());
        assert!(Symbol::from_payload(&json!({"symbols": ["AAPL"]})).is_empty());
        assert!(Symbol::from_payload(&Value::Null).is_empty());
    }

    #[test]
    fn batch_rejects_empty_and_oversized() {
        assert!(SubscriptionBatch::new(vec![]).is_none());
        assert!(SubscriptionBatch::new(symbols(BATCH_SIZE + 1)).is_none());
        assert!(SubscriptionBatch::new(symbols(BATCH_SIZE)).is_some());
    }

    #[test]
    fn batch_param_is_comma_joined() {
        let batch = SubscriptionBatch::new(Symbol::parse_list("AAPL,MSFT,TSLA")).unwrap();
        assert_eq!(batch.to_param(), "AAPL,MSFT,TSLA");
    }

    #[test]
    fn batches_of_120_are_50_50_20() {
        let input = symbols(120);
        let sizes: Vec<_> = SymbolBatcher::new()
            .batches(&input)
            .map(|b| b.len())
            .collect();
        assert_eq!(sizes, vec![50, 50, 20]);
    }

    #[test]
    fn empty_input_yields_no_batches() {
        assert_eq!(SymbolBatcher::new().batches(&[]).count(), 0);
        assert_eq!(SymbolBatcher::batch_count(0), 0);
    }

    #[test]
    fn exact_multiple_has_no_partial_batch() {
        let input = symbols(100);
        let sizes: Vec<_> = SymbolBatcher::new()
            .batches(&input)
            .map(|b| b.len())
            .collect();
        assert_eq!(sizes, vec![50, 50]);
    }

    #[tokio::test]
    async fn dispatch_issues_batches_in_order() {
        let input = symbols(75);
        let mut seen = Vec::new();

        let report = SymbolBatcher::new()
            .dispatch(&input, |batch| {
                seen.push(batch.to_param());
                async { Ok::<(), String>(()) }
            })
            .await;

        assert_eq!(report.batches, 2);
        assert_eq!(report.symbols, 75);
        assert!(report.is_success());
        assert!(seen[0].starts_with("SYM0,SYM1,"));
        assert!(seen[1].starts_with("SYM50,"));
    }

    #[tokio::test]
    async fn dispatch_continues_after_failed_batch() {
        let input = symbols(120);
        let mut call = 0;

        let report = SymbolBatcher::new()
            .dispatch(&input, |_batch| {
                call += 1;
                let fail = call == 2;
                async move {
                    if fail {
                        Err("rejected".to_string())
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert_eq!(call, 3);
        assert_eq!(report.batches, 3);
        assert_eq!(
            report.failures,
            vec![BatchFailure {
                index: 1,
                size: 50,
                reason: "rejected".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn dispatch_empty_input_makes_no_calls() {
        let mut calls = 0;
        let report = SymbolBatcher::new()
            .dispatch(&[], |_batch| {
                calls += 1;
                async { Ok::<(), String>(()) }
            })
            .await;

        assert_eq!(calls, 0);
        assert_eq!(report, BatchReport::default());
    }
}
