//! # peg-engine
//!
//! A packrat PEG (Parsing Expression Grammar) engine. A grammar written as
//! text is compiled into an executable expression tree, and that tree parses
//! input strings into a concrete syntax tree of nodes.
//!
//! The pipeline is: grammar text -> meta-grammar parse -> rule lowering ->
//! reference resolution -> [`Grammar`]. Input text -> [`Grammar::parse`] ->
//! parse tree -> caller's [`NodeVisitor`] -> semantic value.
//!
//! File Layout
//!
//! Everything lives under `src/peg`, one concern per file: the rune cursor
//! utilities, the parse node, the expression evaluator with its memo cache,
//! the grammar object, the hand-built bootstrap grammar, the rule-lowering
//! walker, the string-literal evaluator, the reference resolver, the visitor
//! multiplexer, and the error types.
//!
//! # Example
//!
//! ```
//! use peg_engine::new_grammar;
//!
//! let grammar = new_grammar(r#"greeting = "hello" " " "world""#).unwrap();
//! let tree = grammar.parse("hello world").unwrap();
//! assert_eq!(tree.text(), "hello world");
//! ```

pub mod peg;

pub use peg::bootstrap::meta_grammar;
pub use peg::error::{CompileError, ParseError, VisitError};
pub use peg::expression::{parse_with_expression, ExprId, Expression, ExpressionBuilder};
pub use peg::grammar::{new_grammar, new_grammar_with_options, Grammar, ParseOptions};
pub use peg::node::{dump_tree, Node};
pub use peg::visitor::{default_visit, NodeVisitor, VisitValue};
