//! The compiled grammar object
//!
//! A [`Grammar`] is a named rule map plus a designated default rule (the
//! first rule in source order). It is constructed once by the compiler,
//! read-only afterwards, and safe to share across threads; every parse
//! call allocates its own memo cache.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::peg::bootstrap::meta_grammar;
use crate::peg::error::{CompileError, ParseError};
use crate::peg::expression::{self, parse_with_expression, ExprArena, ExprId, Expression};
use crate::peg::lowering;
use crate::peg::node::Node;

/// Per-call parse configuration.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Emit diagnostic traces while parsing and lowering. Tracing never
    /// alters parse semantics.
    pub debug: bool,
    /// Hard bound on evaluator recursion depth; exceeding it aborts the
    /// parse with [`ParseError::RecursionLimit`].
    pub recursion_limit: usize,
}

pub const DEFAULT_RECURSION_LIMIT: usize = 10_000;

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            debug: false,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }
}

impl ParseOptions {
    pub fn with_debug(debug: bool) -> ParseOptions {
        ParseOptions {
            debug,
            ..ParseOptions::default()
        }
    }
}

/// A compiled, immutable grammar: rule map, source order, default rule.
#[derive(Debug)]
pub struct Grammar {
    arena: Arc<ExprArena>,
    rules: HashMap<String, ExprId>,
    rule_order: Vec<String>,
    default_rule: ExprId,
}

impl Grammar {
    pub(crate) fn new(
        arena: Arc<ExprArena>,
        rules: HashMap<String, ExprId>,
        rule_order: Vec<String>,
        default_rule: ExprId,
    ) -> Grammar {
        Grammar {
            arena,
            rules,
            rule_order,
            default_rule,
        }
    }

    fn expression(&self, id: ExprId) -> Expression {
        Expression::from_arena(Arc::clone(&self.arena), id)
    }

    /// Parse `text` with the default rule, requiring the whole input to be
    /// consumed.
    pub fn parse(&self, text: &str) -> Result<Rc<Node>, ParseError> {
        self.parse_with_options(text, &ParseOptions::default())
    }

    pub fn parse_with_options(
        &self,
        text: &str,
        options: &ParseOptions,
    ) -> Result<Rc<Node>, ParseError> {
        if options.debug {
            eprintln!(
                "[grammar] parsing {} runes with default rule {:?}",
                crate::peg::text::rune_count(text),
                self.arena.name_of(self.default_rule),
            );
        }
        parse_with_expression(&self.expression(self.default_rule), text, options)
    }

    /// Parse `text` starting at the named rule instead of the default.
    pub fn parse_with_rule(&self, rule_name: &str, text: &str) -> Result<Rc<Node>, ParseError> {
        self.parse_with_rule_options(rule_name, text, &ParseOptions::default())
    }

    pub fn parse_with_rule_options(
        &self,
        rule_name: &str,
        text: &str,
        options: &ParseOptions,
    ) -> Result<Rc<Node>, ParseError> {
        let id = self.rules.get(rule_name).ok_or_else(|| ParseError::UnknownRule {
            name: rule_name.to_string(),
        })?;
        parse_with_expression(&self.expression(*id), text, options)
    }

    /// Look up a rule by name.
    pub fn rule(&self, rule_name: &str) -> Option<Expression> {
        self.rules.get(rule_name).map(|id| self.expression(*id))
    }

    /// The expression behind the first rule in source order.
    pub fn default_rule(&self) -> Expression {
        self.expression(self.default_rule)
    }

    /// Rule names in source order.
    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.rule_order.iter().map(String::as_str)
    }

    /// The grammar rendered back to rule syntax, one rule per line in
    /// source order. Re-compiling the output yields an equivalent grammar.
    pub fn rules_text(&self) -> String {
        let mut out = String::new();
        for name in &self.rule_order {
            let id = self.rules[name];
            out.push_str(name);
            out.push_str(" = ");
            out.push_str(&expression::rule_rhs(&self.arena, id));
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Grammar #rules={} default_rule={:?}>",
            self.rules.len(),
            self.arena.name_of(self.default_rule),
        )
    }
}

/// Compile a grammar from rule syntax.
///
/// The source is parsed with the canonical meta-grammar, lowered into an
/// expression arena, and run through the reference resolver. The first
/// rule becomes the default rule.
pub fn new_grammar(source: &str) -> Result<Grammar, CompileError> {
    new_grammar_with_options(source, &ParseOptions::default())
}

/// [`new_grammar`] with explicit options; `debug` traces the lowering.
pub fn new_grammar_with_options(
    source: &str,
    options: &ParseOptions,
) -> Result<Grammar, CompileError> {
    let tree = meta_grammar()
        .parse_with_options(source, options)
        .map_err(CompileError::Parse)?;
    let visitor = lowering::rule_visitor(options.debug, &[])?;
    let value = visitor.visit(&tree).map_err(CompileError::from_visit)?;
    lowering::into_grammar(value)
}
