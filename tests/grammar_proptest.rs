//! Property-based tests
//!
//! Checks the universal parse-tree invariants over generated inputs: span
//! integrity, child ordering and contiguity, zero-width lookaheads,
//! single-child choices, determinism, and the rule-text round trip.

use std::rc::Rc;

use once_cell::sync::Lazy;
use peg_engine::{new_grammar, Grammar, Node};
use proptest::prelude::*;

static PAIRS_GRAMMAR: Lazy<Grammar> = Lazy::new(|| {
    new_grammar(
        "pairs = pair (\",\" ws pair)*\n\
         pair = key \"=\" value\n\
         key = ~\"[a-z]+\"\n\
         value = ~\"[a-z0-9]*\"\n\
         ws = \" \"*\n",
    )
    .expect("pairs grammar compiles")
});

/// Walk a tree checking every universal invariant against the input text.
fn check_invariants(node: &Rc<Node>, input: &str) {
    let runes: Vec<char> = input.chars().collect();
    assert!(node.start() <= node.end());
    assert!(node.end() <= runes.len());
    let expected: String = runes[node.start()..node.end()].iter().collect();
    assert_eq!(node.text(), expected, "span text mismatch");

    match node.expression().kind_name() {
        "Sequence" => {
            // Children tile the parent's span exactly.
            if let Some(first) = node.children().first() {
                assert_eq!(first.start(), node.start());
            }
            if let Some(last) = node.children().last() {
                assert_eq!(last.end(), node.end());
            }
            for pair in node.children().windows(2) {
                assert_eq!(pair[0].end(), pair[1].start());
            }
        }
        "OneOf" => {
            assert_eq!(node.children().len(), 1);
            let child = &node.children()[0];
            assert_eq!((child.start(), child.end()), (node.start(), node.end()));
        }
        "Lookahead" | "Not" => {
            assert_eq!(node.start(), node.end());
        }
        "Quantifier" => {
            for pair in node.children().windows(2) {
                assert_eq!(pair[0].end(), pair[1].start());
            }
        }
        _ => {}
    }

    for child in node.children() {
        check_invariants(child, input);
    }
}

/// Structural equality across grammars: same rule names, spans, text and
/// shape, ignoring expression identity.
fn same_shape(a: &Rc<Node>, b: &Rc<Node>) -> bool {
    a.expression().name() == b.expression().name()
        && a.text() == b.text()
        && a.start() == b.start()
        && a.end() == b.end()
        && a.children().len() == b.children().len()
        && a.children()
            .iter()
            .zip(b.children().iter())
            .all(|(x, y)| same_shape(x, y))
}

fn pair_strategy() -> impl Strategy<Value = String> {
    ("[a-z]{1,8}", "[a-z0-9]{0,8}").prop_map(|(key, value)| format!("{key}={value}"))
}

fn pairs_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(pair_strategy(), 1..6).prop_map(|pairs| pairs.join(", "))
}

proptest! {
    #[test]
    fn generated_pairs_parse_and_hold_invariants(input in pairs_strategy()) {
        let tree = PAIRS_GRAMMAR.parse(&input).unwrap();
        prop_assert_eq!(tree.end(), input.chars().count());
        check_invariants(&tree, &input);
    }

    #[test]
    fn parsing_never_panics_on_arbitrary_input(input in ".{0,40}") {
        match PAIRS_GRAMMAR.parse(&input) {
            Ok(tree) => check_invariants(&tree, &input),
            Err(_) => {}
        }
    }

    #[test]
    fn parsing_is_deterministic(input in pairs_strategy()) {
        let first = PAIRS_GRAMMAR.parse(&input).unwrap();
        let second = PAIRS_GRAMMAR.parse(&input).unwrap();
        // Same grammar, same input: structurally identical trees.
        prop_assert!(first == second);
    }

    #[test]
    fn rules_text_round_trips(input in pairs_strategy()) {
        let regenerated = new_grammar(&PAIRS_GRAMMAR.rules_text()).unwrap();
        let original_tree = PAIRS_GRAMMAR.parse(&input).unwrap();
        let regenerated_tree = regenerated.parse(&input).unwrap();
        prop_assert!(same_shape(&original_tree, &regenerated_tree));
    }
}

#[test]
fn test_unicode_input_invariants() {
    let grammar = new_grammar("words = (~\"[^ ]+\" \" \"?)+\n").unwrap();
    let input = "héllo wörld 你好 0\u{fe0f}\u{20e3}";
    let tree = grammar.parse(input).unwrap();
    check_invariants(&tree, input);
    assert_eq!(tree.end(), input.chars().count());
}
