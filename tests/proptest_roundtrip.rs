//! Property-based tests for the reader and printer, and for a few core builtins.
//!
//! Tests the following properties:
//! - Readable printing followed by reading yields an equal value
//! - Integer arithmetic matches Rust's checked arithmetic
//! - `cons`, `first`, `rest` and `count` agree with each other

#![expect(clippy::unwrap_used)] // test code OK

mod common;

use common::{Value, eval_str, new_env, read_str, rep_str, val};
use malxp::ast::{MapKey, ValueMap};
use malxp::printer::pr_str;
use proptest::prelude::*;

// =============================================================================
// Strategies
// =============================================================================

fn arb_symbol_name() -> impl Strategy<Value = String> {
    "[a-z*+!?<>=][a-z0-9*+!?<>=-]{0,8}"
        .prop_filter("reserved literal", |s| !matches!(s.as_str(), "nil" | "true" | "false"))
}

fn arb_keyword_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,8}"
}

/// Strings mixing plain text with characters the printer has to escape
fn arb_string() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 \"\\\\\n;()\\[\\]{}~@^'`]{0,12}"
}

fn arb_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Nil),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        (-1e6f64..1e6f64).prop_map(Value::Float),
        arb_string().prop_map(Value::String),
        arb_keyword_name().prop_map(Value::Keyword),
        arb_symbol_name().prop_map(Value::Symbol),
    ]
}

fn arb_key() -> impl Strategy<Value = MapKey> {
    prop_oneof![
        arb_string().prop_map(MapKey::String),
        arb_keyword_name().prop_map(MapKey::Keyword),
        arb_symbol_name().prop_map(MapKey::Symbol),
    ]
}

fn arb_value() -> impl Strategy<Value = Value> {
    arb_leaf().prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::list),
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::vector),
            prop::collection::vec((arb_key(), inner), 0..4)
                .prop_map(|pairs| Value::Map(pairs.into_iter().collect::<ValueMap>())),
        ]
    })
}

// =============================================================================
// Reader / printer
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Anything printed readably reads back as an equal value
    #[test]
    fn readable_print_reads_back(value in arb_value()) {
        let text = pr_str(&value, true);
        let reread = read_str(&text).unwrap();
        prop_assert_eq!(reread, value, "printed as {}", text);
    }

    /// Printing is stable across a read/print cycle
    #[test]
    fn print_is_a_fixed_point(value in arb_value()) {
        let text = pr_str(&value, true);
        let again = pr_str(&read_str(&text).unwrap(), true);
        prop_assert_eq!(
            read_str(&again).unwrap(),
            read_str(&text).unwrap()
        );
    }

    /// Evaluating a quoted value returns it unchanged
    #[test]
    fn quote_returns_the_form(value in arb_value()) {
        let source = format!("(quote {})", pr_str(&value, true));
        prop_assert_eq!(eval_str(&source).unwrap(), value);
    }
}

// =============================================================================
// Builtins
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Integer addition either matches checked_add or reports overflow
    #[test]
    fn integer_addition(a in any::<i64>(), b in any::<i64>()) {
        let result = eval_str(&format!("(+ {a} {b})"));
        match a.checked_add(b) {
            Some(sum) => prop_assert_eq!(result.unwrap(), val(sum)),
            None => prop_assert!(result.is_err()),
        }
    }

    /// Subtraction and multiplication on small integers are exact
    #[test]
    fn small_integer_arithmetic(a in -1_000_000i64..1_000_000, b in -1_000_000i64..1_000_000) {
        prop_assert_eq!(eval_str(&format!("(- {a} {b})")).unwrap(), val(a - b));
        prop_assert_eq!(eval_str(&format!("(* {a} {b})")).unwrap(), val(a * b));
        prop_assert_eq!(
            eval_str(&format!("(< {a} {b})")).unwrap(),
            val(a < b)
        );
    }

    /// cons grows a sequence by one and first/rest take it apart again
    #[test]
    fn cons_first_rest(head in any::<i64>(), tail in prop::collection::vec(any::<i64>(), 0..8)) {
        let env = new_env();
        let items = tail.iter().map(i64::to_string).collect::<Vec<_>>().join(" ");
        let consed = format!("(cons {head} [{items}])");

        prop_assert_eq!(rep_str(&format!("(first {consed})"), &env), head.to_string());
        prop_assert_eq!(
            rep_str(&format!("(count {consed})"), &env),
            (tail.len() + 1).to_string()
        );
        prop_assert_eq!(rep_str(&format!("(rest {consed})"), &env), format!("({items})"));
    }
}
