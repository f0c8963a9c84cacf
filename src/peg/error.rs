//! Errors and diagnostics
//!
//! Match-flow failures and grammar-compile failures are separate types:
//! [`ParseError`] covers everything a `parse` call can report, and
//! [`CompileError`] everything `new_grammar` can report. [`VisitError`] is
//! the failure type of visitor handlers; the lowering walker funnels it
//! into [`CompileError`].
//!
//! All line/column rendering is 1-based and computed over runes; snippets
//! are up to 20 runes from the failure position.

use std::fmt;

use crate::peg::expression::Expression;
use crate::peg::text;

const SNIPPET_RUNES: usize = 20;

/// A failure while matching input text against a compiled expression.
#[derive(Debug, Clone)]
pub enum ParseError {
    /// The rule did not match the input at all.
    ParseFailed {
        text: String,
        position: usize,
        expression: Expression,
    },
    /// The rule matched, but input remained past the matched span.
    IncompleteParse {
        text: String,
        position: usize,
        expression: Expression,
    },
    /// An expression re-entered itself at the same position without
    /// consuming input. The grammar needs a non-left-recursive rewrite.
    LeftRecursion { rule: String, position: usize },
    /// A lazy reference survived into evaluation; the grammar was not
    /// compiled through the reference resolver.
    UnresolvedReference { name: String },
    /// `parse_with_rule` was given a name the grammar does not define.
    UnknownRule { name: String },
    /// The evaluator exceeded [`ParseOptions::recursion_limit`].
    ///
    /// [`ParseOptions::recursion_limit`]: crate::peg::grammar::ParseOptions
    RecursionLimit { position: usize },
}

/// The rule name in quotes, or the expression's display form when it has
/// no name.
fn rule_label(expression: &Expression) -> String {
    let name = expression.name();
    if name.is_empty() {
        expression.to_string()
    } else {
        format!("{name:?}")
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::ParseFailed {
                text,
                position,
                expression,
            } => {
                let (line, column) = text::line_and_column(text, *position);
                write!(
                    f,
                    "rule {} didn't match at {:?} (line {}, column {})",
                    rule_label(expression),
                    text::snippet(text, *position, SNIPPET_RUNES),
                    line,
                    column,
                )
            }
            ParseError::IncompleteParse {
                text,
                position,
                expression,
            } => {
                let (line, column) = text::line_and_column(text, *position);
                write!(
                    f,
                    "rule {} matched in its entirety, but it didn't consume all the text. \
                     The non-matching portion of the text begins with {:?} (line {}, column {})",
                    rule_label(expression),
                    text::snippet(text, *position, SNIPPET_RUNES),
                    line,
                    column,
                )
            }
            ParseError::LeftRecursion { rule, position } => {
                write!(
                    f,
                    "left recursion detected in rule {rule:?} at position {position}"
                )
            }
            ParseError::UnresolvedReference { name } => {
                write!(f, "lazy reference {name:?} is not resolved")
            }
            ParseError::UnknownRule { name } => write!(f, "no such rule {name:?}"),
            ParseError::RecursionLimit { position } => {
                write!(f, "recursion limit exceeded at position {position}")
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// A failure while compiling a grammar from text.
#[derive(Debug)]
pub enum CompileError {
    /// The meta-grammar did not accept the grammar source.
    Parse(ParseError),
    /// A rule refers to a name the grammar never defines.
    UnresolvedReference { name: String },
    /// A chain of references closes back on itself.
    CircularReference { name: String },
    /// A regex expression carries an unsupported flag.
    InvalidFlag { flag: char },
    /// A regex expression failed to compile.
    Regex {
        pattern: String,
        error: regex::Error,
    },
    /// A lowering handler received a value it cannot use; this indicates a
    /// malformed grammar tree, not bad parse input.
    Lowering(String),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Parse(err) => write!(f, "parse grammar: {err}"),
            CompileError::UnresolvedReference { name } => {
                write!(f, "lazy reference {name:?} is not resolved")
            }
            CompileError::CircularReference { name } => {
                write!(f, "circular reference detected for {name:?}")
            }
            CompileError::InvalidFlag { flag } => {
                write!(f, "regex flags: flag {flag:?} is not supported")
            }
            CompileError::Regex { pattern, error } => {
                write!(f, "invalid regex {pattern:?}: {error}")
            }
            CompileError::Lowering(message) => write!(f, "lower grammar: {message}"),
        }
    }
}

impl std::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CompileError::Parse(err) => Some(err),
            CompileError::Regex { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<ParseError> for CompileError {
    fn from(err: ParseError) -> Self {
        CompileError::Parse(err)
    }
}

impl CompileError {
    /// Unwrap a visitor failure back into a compile error.
    pub(crate) fn from_visit(err: VisitError) -> Self {
        match err {
            VisitError::Handler(message) => CompileError::Lowering(message),
            VisitError::Compile(inner) => *inner,
        }
    }
}

/// A failure raised by a visitor handler.
#[derive(Debug)]
pub enum VisitError {
    /// The handler received a value shape it cannot use, or a caller's
    /// handler reported its own failure.
    Handler(String),
    /// Grammar compilation failed inside a lowering handler.
    Compile(Box<CompileError>),
}

impl VisitError {
    pub fn new(message: impl Into<String>) -> Self {
        VisitError::Handler(message.into())
    }
}

impl fmt::Display for VisitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisitError::Handler(message) => write!(f, "{message}"),
            VisitError::Compile(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for VisitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VisitError::Compile(err) => Some(err.as_ref()),
            VisitError::Handler(_) => None,
        }
    }
}

impl From<CompileError> for VisitError {
    fn from(err: CompileError) -> Self {
        VisitError::Compile(Box::new(err))
    }
}
