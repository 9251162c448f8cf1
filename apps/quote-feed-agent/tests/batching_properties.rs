//! Subscription Batching Property Tests
//!
//! Checks the batch partition against arbitrary symbol lists.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use proptest::prelude::*;
use serde_json::Value;

use quote_feed_agent::{BATCH_SIZE, Symbol, SymbolBatcher};

fn symbol_list(max: usize) -> impl Strategy<Value = Vec<Symbol>> {
    prop::collection::vec("[A-Z]{1,5}(/[A-Z]{3})?", 0..max)
        .prop_map(|names| names.iter().filter_map(|n| Symbol::new(n)).collect())
}

proptest! {
    #[test]
    fn batch_count_is_ceiling(symbols in symbol_list(400)) {
        let batches: Vec<_> = SymbolBatcher::new().batches(&symbols).collect();

        prop_assert_eq!(batches.len(), symbols.len().div_ceil(BATCH_SIZE));
        prop_assert_eq!(batches.len(), SymbolBatcher::batch_count(symbols.len()));
    }

    #[test]
    fn only_last_batch_may_be_partial(symbols in symbol_list(400)) {
        let batches: Vec<_> = SymbolBatcher::new().batches(&symbols).collect();

        for (i, batch) in batches.iter().enumerate() {
            prop_assert!(!batch.is_empty());
            if i + 1 < batches.len() {
                prop_assert_eq!(batch.len(), BATCH_SIZE);
            } else {
                prop_assert!(batch.len() <= BATCH_SIZE);
            }
        }
    }

    #[test]
    fn concatenated_batches_preserve_input(symbols in symbol_list(400)) {
        let rebuilt: Vec<Symbol> = SymbolBatcher::new()
            .batches(&symbols)
            .flat_map(|b| b.symbols().to_vec())
            .collect();

        prop_assert_eq!(rebuilt, symbols);
    }

    #[test]
    fn comma_payload_matches_array_payload(symbols in symbol_list(60)) {
        let names: Vec<&str> = symbols.iter().map(Symbol::as_str).collect();
        let from_string = Symbol::from_payload(&Value::String(names.join(",")));
        let from_array = Symbol::from_payload(&serde_json::json!(names));

        prop_assert_eq!(&from_string, &symbols);
        prop_assert_eq!(from_array, symbols);
    }
}
