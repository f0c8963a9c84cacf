//! Rule-tree lowering
//!
//! Converts a parsed grammar tree into expression objects. The walker is a
//! [`NodeVisitor`] with one handler per meta-grammar production; handlers
//! build into a shared arena, and the root `rules` handler assembles the
//! rule map, unions in any custom rules, runs the reference resolver and
//! produces the [`Grammar`].
//!
//! Productions without a handler keep the stock default behavior: a list
//! of visited children, or the node itself when childless. Several
//! handlers depend on that (`quantifier` symbols and `label`s arrive as
//! plain nodes).

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::peg::error::{CompileError, VisitError};
use crate::peg::expression::{ExprArena, ExprId};
use crate::peg::grammar::Grammar;
use crate::peg::literal::eval_string_literal;
use crate::peg::node::Node;
use crate::peg::resolve::resolve_rules;
use crate::peg::visitor::{NodeVisitor, VisitValue};

/// A rule built directly into the target arena, overriding any same-named
/// rule from the grammar source.
pub(crate) type CustomRule = fn(&mut ExprArena) -> Result<ExprId, CompileError>;

struct LoweringCx {
    arena: RefCell<ExprArena>,
    custom_rules: Vec<(String, ExprId)>,
    debug: bool,
}

impl LoweringCx {
    fn trace(&self, args: fmt::Arguments<'_>) {
        if self.debug {
            eprintln!("[rule visitor] {args}");
        }
    }
}

fn expect_children(node: &Rc<Node>, count: usize) -> Result<(), VisitError> {
    if node.children().len() == count {
        Ok(())
    } else {
        Err(VisitError::new(format!(
            "{node} should have {count} children, got {}",
            node.children().len()
        )))
    }
}

fn as_expression(value: VisitValue, context: &str) -> Result<ExprId, VisitError> {
    value
        .downcast::<ExprId>()
        .map(|id| *id)
        .map_err(|_| VisitError::new(format!("{context}: expected an expression")))
}

fn as_node(value: VisitValue, context: &str) -> Result<Rc<Node>, VisitError> {
    value
        .downcast::<Rc<Node>>()
        .map(|node| *node)
        .map_err(|_| VisitError::new(format!("{context}: expected a parse node")))
}

fn as_expression_list(value: VisitValue, context: &str) -> Result<Vec<ExprId>, VisitError> {
    let values = value
        .downcast::<Vec<VisitValue>>()
        .map_err(|_| VisitError::new(format!("{context}: expected a list of expressions")))?;
    values
        .into_iter()
        .map(|value| as_expression(value, context))
        .collect()
}

/// Unwrap the `rules` handler's product.
pub(crate) fn into_grammar(value: VisitValue) -> Result<Grammar, CompileError> {
    value
        .downcast::<Grammar>()
        .map(|grammar| *grammar)
        .map_err(|_| CompileError::Lowering("expected a grammar from the rules handler".to_string()))
}

static RANGE_QUANTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{(\d*)(?:,(\d*))?\}$").expect("range quantifier pattern"));

/// `{m}`, `{m,}`, `{,n}` or `{m,n}` into (min, max).
fn parse_range_quantifier(symbol: &str) -> Option<(usize, Option<usize>)> {
    let captures = RANGE_QUANTIFIER.captures(symbol)?;
    let min_text = captures.get(1).map_or("", |m| m.as_str());
    match captures.get(2) {
        // {m}: exactly m repetitions.
        None => {
            let exact = min_text.parse().ok()?;
            Some((exact, Some(exact)))
        }
        Some(max_match) => {
            let min = if min_text.is_empty() {
                0
            } else {
                min_text.parse().ok()?
            };
            let max = if max_match.as_str().is_empty() {
                None
            } else {
                Some(max_match.as_str().parse().ok()?)
            };
            Some((min, max))
        }
    }
}

/// Build the visitor that lowers a grammar parse tree, with handlers for
/// each meta-grammar production.
pub(crate) fn rule_visitor(
    debug: bool,
    custom_rules: &[CustomRule],
) -> Result<NodeVisitor, CompileError> {
    let mut arena = ExprArena::new();
    let mut custom = Vec::with_capacity(custom_rules.len());
    for build in custom_rules {
        let id = build(&mut arena)?;
        custom.push((arena.name_of(id).to_string(), id));
    }
    let cx = Rc::new(LoweringCx {
        arena: RefCell::new(arena),
        custom_rules: custom,
        debug,
    });

    fn lift(context: &'static str) -> impl Fn(&Rc<Node>, Vec<VisitValue>) -> Result<VisitValue, VisitError>
    {
        move |node, children| {
            if children.is_empty() {
                return Err(VisitError::new(format!(
                    "{context}: {node} should have at least one child"
                )));
            }
            Ok(children.into_iter().next().expect("non-empty children"))
        }
    }

    let visitor = NodeVisitor::new()
        .on("expression", lift("expression"))
        .on("term", lift("term"))
        .on("atom", lift("atom"))
        .on("parenthesized", |node, children| {
            expect_children(node, 5)?;
            let inner = children.into_iter().nth(2).expect("five children");
            let expression = as_expression(inner, "parenthesized")?;
            Ok(Box::new(expression) as VisitValue)
        })
        .on("quantifier", |node, children| {
            expect_children(node, 2)?;
            let symbol = children.into_iter().next().expect("two children");
            let symbol = as_node(symbol, "quantifier")?;
            Ok(Box::new(symbol) as VisitValue)
        })
        .on("quantified", {
            let cx = Rc::clone(&cx);
            move |node, children| {
                expect_children(node, 2)?;
                let mut values = children.into_iter();
                let atom = as_expression(values.next().expect("two children"), "quantified")?;
                let symbol = as_node(values.next().expect("two children"), "quantified")?;
                let mut arena = cx.arena.borrow_mut();
                let id = match symbol.text() {
                    "?" => arena.quantifier("", atom, 0, Some(1)),
                    "*" => arena.quantifier("", atom, 0, None),
                    "+" => arena.quantifier("", atom, 1, None),
                    other => {
                        let (min, max) = parse_range_quantifier(other).ok_or_else(|| {
                            VisitError::new(format!("quantified: unsupported quantifier {other:?}"))
                        })?;
                        arena.quantifier("", atom, min, max)
                    }
                };
                Ok(Box::new(id) as VisitValue)
            }
        })
        .on("lookahead_term", {
            let cx = Rc::clone(&cx);
            move |node, children| {
                expect_children(node, 3)?;
                let term = children.into_iter().nth(1).expect("three children");
                let term = as_expression(term, "lookahead_term")?;
                let id = cx.arena.borrow_mut().lookahead("", term, false);
                Ok(Box::new(id) as VisitValue)
            }
        })
        .on("not_term", {
            let cx = Rc::clone(&cx);
            move |node, children| {
                expect_children(node, 3)?;
                let term = children.into_iter().nth(1).expect("three children");
                let term = as_expression(term, "not_term")?;
                let id = cx.arena.borrow_mut().lookahead("", term, true);
                Ok(Box::new(id) as VisitValue)
            }
        })
        .on("rule", {
            let cx = Rc::clone(&cx);
            move |node, children| {
                expect_children(node, 3)?;
                let mut values = children.into_iter();
                let label = as_node(values.next().expect("three children"), "rule")?;
                let _equals = values.next();
                let expression = as_expression(values.next().expect("three children"), "rule")?;
                cx.trace(format_args!("setting rule name {:?}", label.text()));
                cx.arena.borrow_mut().set_name(expression, label.text());
                Ok(Box::new(expression) as VisitValue)
            }
        })
        .on("sequence", {
            let cx = Rc::clone(&cx);
            move |node, children| {
                expect_children(node, 2)?;
                let mut values = children.into_iter();
                let first = as_expression(values.next().expect("two children"), "sequence")?;
                let rest = as_expression_list(values.next().expect("two children"), "sequence")?;
                let mut members = vec![first];
                members.extend(rest);
                let id = cx.arena.borrow_mut().sequence("", members);
                Ok(Box::new(id) as VisitValue)
            }
        })
        .on("ored", {
            let cx = Rc::clone(&cx);
            move |node, children| {
                expect_children(node, 2)?;
                let mut values = children.into_iter();
                let first = as_expression(values.next().expect("two children"), "ored")?;
                let rest = as_expression_list(values.next().expect("two children"), "ored")?;
                let mut members = vec![first];
                members.extend(rest);
                let id = cx.arena.borrow_mut().one_of("", members);
                Ok(Box::new(id) as VisitValue)
            }
        })
        .on("or_term", |node, children| {
            expect_children(node, 3)?;
            Ok(children.into_iter().nth(2).expect("three children"))
        })
        .on("label", |node, children| {
            expect_children(node, 3)?;
            let name = children.into_iter().next().expect("three children");
            let name = as_node(name, "label")?;
            Ok(Box::new(name) as VisitValue)
        })
        .on("reference", {
            let cx = Rc::clone(&cx);
            move |node, children| {
                expect_children(node, 2)?;
                let label = children.into_iter().next().expect("two children");
                let label = as_node(label, "reference")?;
                let id = cx.arena.borrow_mut().lazy_reference(label.text());
                Ok(Box::new(id) as VisitValue)
            }
        })
        .on("regex", {
            let cx = Rc::clone(&cx);
            move |node, children| {
                expect_children(node, 4)?;
                let mut values = children.into_iter();
                let _tilde = values.next();
                let pattern = as_expression(values.next().expect("four children"), "regex")?;
                let flags = as_node(values.next().expect("four children"), "regex")?;
                let mut arena = cx.arena.borrow_mut();
                let pattern = arena
                    .literal_value(pattern)
                    .ok_or_else(|| VisitError::new("regex: expected a literal pattern"))?
                    .to_string();
                let flags = flags.text().to_lowercase();
                cx.trace(format_args!("regex pattern {pattern:?}, flags {flags:?}"));
                let id = arena.regex("", &pattern, &flags).map_err(VisitError::from)?;
                Ok(Box::new(id) as VisitValue)
            }
        })
        .on("spaceless_literal", {
            let cx = Rc::clone(&cx);
            move |node, _children| {
                let value = eval_string_literal(node.text()).map_err(|err| {
                    VisitError::new(format!("spaceless literal {:?}: {err}", node.text()))
                })?;
                let id = cx.arena.borrow_mut().literal("", &value);
                Ok(Box::new(id) as VisitValue)
            }
        })
        .on("literal", |node, children| {
            expect_children(node, 2)?;
            let inner = children.into_iter().next().expect("two children");
            let expression = as_expression(inner, "literal")?;
            Ok(Box::new(expression) as VisitValue)
        })
        .on("rules", {
            let cx = Rc::clone(&cx);
            move |node, children| {
                expect_children(node, 2)?;
                let rule_values = children.into_iter().nth(1).expect("two children");
                if node.children()[1].children().is_empty() {
                    return Err(VisitError::new("grammar defines no rules"));
                }
                let rule_ids = as_expression_list(rule_values, "rules")?;

                let mut arena = cx.arena.replace(ExprArena::new());
                let mut rules: HashMap<String, ExprId> = HashMap::new();
                let mut order: Vec<String> = Vec::new();
                for &id in &rule_ids {
                    let name = arena.name_of(id).to_string();
                    if !rules.contains_key(&name) {
                        order.push(name.clone());
                    }
                    rules.insert(name, id);
                }
                for (name, id) in &cx.custom_rules {
                    if !rules.contains_key(name) {
                        order.push(name.clone());
                    }
                    rules.insert(name.clone(), *id);
                }
                resolve_rules(&mut arena, &mut rules, &order).map_err(VisitError::from)?;

                let default_name = arena.name_of(rule_ids[0]).to_string();
                let default_rule = rules[&default_name];
                cx.trace(format_args!(
                    "loaded {} rules, default rule {default_name:?}",
                    rules.len()
                ));
                let grammar = Grammar::new(Arc::new(arena), rules, order, default_rule);
                Ok(Box::new(grammar) as VisitValue)
            }
        });

    Ok(visitor)
}
