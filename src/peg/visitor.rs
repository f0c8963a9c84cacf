//! Visitor multiplexer
//!
//! A [`NodeVisitor`] maps rule names to handlers and walks a parse tree
//! bottom-up: children are visited in source order first, their results
//! collected into a list, then the handler registered for the node's rule
//! name runs (or the default handler when none is registered).
//!
//! Handlers return heterogeneous values, so results travel as boxed
//! any-values; each handler downcasts what it receives and reports a
//! [`VisitError`] when a value has the wrong shape (that is a handler
//! wired to the wrong rule, not bad input).

use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

use crate::peg::error::VisitError;
use crate::peg::node::Node;

/// The value type flowing through a visit: any handler result.
pub type VisitValue = Box<dyn Any>;

type Handler = Box<dyn Fn(&Rc<Node>, Vec<VisitValue>) -> Result<VisitValue, VisitError>>;

/// Per-rule handler registry with bottom-up dispatch.
///
/// ```
/// use peg_engine::{new_grammar, NodeVisitor, VisitValue};
///
/// let grammar = new_grammar(r#"digits = ~"[0-9]+""#).unwrap();
/// let tree = grammar.parse("42").unwrap();
/// let visitor = NodeVisitor::new().on("digits", |node, _children| {
///     let value: i64 = node.text().parse().unwrap();
///     Ok(Box::new(value) as VisitValue)
/// });
/// let value = visitor.visit(&tree).unwrap();
/// assert_eq!(*value.downcast::<i64>().unwrap(), 42);
/// ```
pub struct NodeVisitor {
    handlers: HashMap<String, Handler>,
    default_handler: Handler,
}

impl NodeVisitor {
    pub fn new() -> NodeVisitor {
        NodeVisitor {
            handlers: HashMap::new(),
            default_handler: Box::new(default_visit),
        }
    }

    /// Register `handler` for nodes whose expression is named `rule_name`.
    ///
    /// # Panics
    ///
    /// Panics when the rule already has a handler; a duplicate registration
    /// is a programmer bug.
    pub fn on<F>(mut self, rule_name: &str, handler: F) -> NodeVisitor
    where
        F: Fn(&Rc<Node>, Vec<VisitValue>) -> Result<VisitValue, VisitError> + 'static,
    {
        if self.handlers.contains_key(rule_name) {
            panic!("duplicate visitor registered for rule {rule_name:?}");
        }
        self.handlers.insert(rule_name.to_string(), Box::new(handler));
        self
    }

    /// Replace the handler used for rules without a registration.
    pub fn with_default<F>(mut self, handler: F) -> NodeVisitor
    where
        F: Fn(&Rc<Node>, Vec<VisitValue>) -> Result<VisitValue, VisitError> + 'static,
    {
        self.default_handler = Box::new(handler);
        self
    }

    /// Visit `node` bottom-up and return the root handler's value.
    pub fn visit(&self, node: &Rc<Node>) -> Result<VisitValue, VisitError> {
        let mut children = Vec::with_capacity(node.children().len());
        for child in node.children() {
            children.push(self.visit(child)?);
        }
        let handler = self
            .handlers
            .get(node.expression().name())
            .unwrap_or(&self.default_handler);
        handler(node, children)
    }
}

impl Default for NodeVisitor {
    fn default() -> Self {
        NodeVisitor::new()
    }
}

/// The stock default handler: the list of visited children when there are
/// any, the node itself otherwise.
pub fn default_visit(node: &Rc<Node>, children: Vec<VisitValue>) -> Result<VisitValue, VisitError> {
    if !children.is_empty() {
        Ok(Box::new(children))
    } else {
        Ok(Box::new(Rc::clone(node)))
    }
}
