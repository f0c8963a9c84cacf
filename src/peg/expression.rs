//! Expression tree and evaluator
//!
//! Expressions are stored in a flat arena and reference each other by
//! index, which is what lets a resolved grammar be genuinely cyclic
//! (mutually recursive rules) while staying immutable and shareable. The
//! public [`Expression`] handle pairs the shared arena with one index.
//!
//! Matching goes through a single driver that owns the packrat cache
//! protocol: look up `(expression, position)`, plant an in-progress
//! sentinel, run the variant's raw matcher, store the outcome. A cache hit
//! on the sentinel is the left-recursion signal. Caching both matches and
//! soft misses makes parsing linear in input length times grammar size.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use regex::Regex;

use crate::peg::error::{CompileError, ParseError};
use crate::peg::grammar::ParseOptions;
use crate::peg::node::Node;
use crate::peg::text;

/// Index of an expression inside its arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ExprId(pub(crate) usize);

/// The seven expression variants.
#[derive(Debug)]
pub(crate) enum ExprKind {
    Literal {
        value: String,
        rune_count: usize,
    },
    Regex {
        re: Regex,
        source: String,
        flags: String,
    },
    Sequence {
        members: Vec<ExprId>,
    },
    OneOf {
        members: Vec<ExprId>,
    },
    Lookahead {
        member: ExprId,
        negative: bool,
    },
    Quantifier {
        member: ExprId,
        min: usize,
        /// `None` means unbounded.
        max: Option<usize>,
    },
    LazyReference {
        target: String,
    },
}

#[derive(Debug)]
pub(crate) struct ExprData {
    pub(crate) name: String,
    pub(crate) kind: ExprKind,
}

/// Flat storage for one compilation's expressions.
///
/// Mutable only while a grammar is being built; frozen behind an `Arc`
/// afterwards. The arena index doubles as the expression's identity for
/// the match cache: within one arena an index always denotes the same
/// expression, so identical indices are interchangeable for caching.
#[derive(Debug, Default)]
pub(crate) struct ExprArena {
    exprs: Vec<ExprData>,
}

impl ExprArena {
    pub(crate) fn new() -> ExprArena {
        ExprArena::default()
    }

    fn alloc(&mut self, name: &str, kind: ExprKind) -> ExprId {
        let id = ExprId(self.exprs.len());
        self.exprs.push(ExprData {
            name: name.to_string(),
            kind,
        });
        id
    }

    pub(crate) fn get(&self, id: ExprId) -> &ExprData {
        &self.exprs[id.0]
    }

    pub(crate) fn name_of(&self, id: ExprId) -> &str {
        &self.exprs[id.0].name
    }

    /// The literal's decoded value, when `id` is a literal.
    pub(crate) fn literal_value(&self, id: ExprId) -> Option<&str> {
        match &self.get(id).kind {
            ExprKind::Literal { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Name mutation is confined to compilation: the rule-lowering walker
    /// attaches rule labels here, before the arena is frozen.
    pub(crate) fn set_name(&mut self, id: ExprId, name: &str) {
        self.exprs[id.0].name = name.to_string();
    }

    pub(crate) fn literal(&mut self, name: &str, value: &str) -> ExprId {
        let rune_count = text::rune_count(value);
        self.alloc(
            name,
            ExprKind::Literal {
                value: value.to_string(),
                rune_count,
            },
        )
    }

    /// Compile `pattern` anchored at the cursor, with grammar-level flags.
    ///
    /// Flags `i`, `m`, `s`, `x` become inline regex flags; `u` is the
    /// engine default and `a` has no engine equivalent, so both are
    /// accepted and ignored; `l` is rejected.
    pub(crate) fn regex(
        &mut self,
        name: &str,
        pattern: &str,
        flags: &str,
    ) -> Result<ExprId, CompileError> {
        let flags = flags.to_lowercase();
        let mut inline = String::new();
        for flag in flags.chars() {
            match flag {
                'i' | 'm' | 's' | 'x' => {
                    if !inline.contains(flag) {
                        inline.push(flag);
                    }
                }
                'u' | 'a' => {}
                other => return Err(CompileError::InvalidFlag { flag: other }),
            }
        }
        let anchored = if inline.is_empty() {
            format!("^(?:{pattern})")
        } else {
            format!("(?{inline})^(?:{pattern})")
        };
        let re = Regex::new(&anchored).map_err(|error| CompileError::Regex {
            pattern: pattern.to_string(),
            error,
        })?;
        Ok(self.alloc(
            name,
            ExprKind::Regex {
                re,
                source: pattern.to_string(),
                flags,
            },
        ))
    }

    pub(crate) fn sequence(&mut self, name: &str, members: Vec<ExprId>) -> ExprId {
        self.alloc(name, ExprKind::Sequence { members })
    }

    pub(crate) fn one_of(&mut self, name: &str, members: Vec<ExprId>) -> ExprId {
        self.alloc(name, ExprKind::OneOf { members })
    }

    pub(crate) fn lookahead(&mut self, name: &str, member: ExprId, negative: bool) -> ExprId {
        self.alloc(name, ExprKind::Lookahead { member, negative })
    }

    pub(crate) fn quantifier(
        &mut self,
        name: &str,
        member: ExprId,
        min: usize,
        max: Option<usize>,
    ) -> ExprId {
        self.alloc(name, ExprKind::Quantifier { member, min, max })
    }

    pub(crate) fn lazy_reference(&mut self, target: &str) -> ExprId {
        self.alloc(
            "lazy_reference",
            ExprKind::LazyReference {
                target: target.to_string(),
            },
        )
    }

    /// Replace a composite's member list. Used by the resolver to rewrite
    /// child ids in place, and once by the bootstrap grammar, where `term`
    /// and `not_term` refer to each other.
    pub(crate) fn set_members(&mut self, id: ExprId, new_members: Vec<ExprId>) {
        match &mut self.exprs[id.0].kind {
            ExprKind::Sequence { members } | ExprKind::OneOf { members } => *members = new_members,
            other => panic!("set_members on non-composite expression {other:?}"),
        }
    }

    /// Replace a single-member wrapper's member.
    pub(crate) fn set_member(&mut self, id: ExprId, new_member: ExprId) {
        match &mut self.exprs[id.0].kind {
            ExprKind::Lookahead { member, .. } | ExprKind::Quantifier { member, .. } => {
                *member = new_member
            }
            other => panic!("set_member on non-wrapper expression {other:?}"),
        }
    }

    fn kind_name(&self, id: ExprId) -> &'static str {
        match self.get(id).kind {
            ExprKind::Literal { .. } => "Literal",
            ExprKind::Regex { .. } => "Regex",
            ExprKind::Sequence { .. } => "Sequence",
            ExprKind::OneOf { .. } => "OneOf",
            ExprKind::Lookahead { negative: false, .. } => "Lookahead",
            ExprKind::Lookahead { negative: true, .. } => "Not",
            ExprKind::Quantifier { .. } => "Quantifier",
            ExprKind::LazyReference { .. } => "LazyReference",
        }
    }
}

// --- PEG-syntax rendering -------------------------------------------------

/// `name = rhs` when the expression is named, bare rhs otherwise.
pub(crate) fn as_rule(arena: &ExprArena, id: ExprId) -> String {
    let name = arena.name_of(id);
    let rhs = rule_rhs(arena, id);
    if name.is_empty() {
        rhs
    } else {
        format!("{name} = {rhs}")
    }
}

/// The right-hand-side form of an expression in PEG syntax.
pub(crate) fn rule_rhs(arena: &ExprArena, id: ExprId) -> String {
    match &arena.get(id).kind {
        ExprKind::Literal { value, .. } => format!("{value:?}"),
        ExprKind::Regex { source, flags, .. } => {
            // Raw-literal form: the decoder keeps backslashes verbatim, and
            // the regex engine treats an escaped quote as a plain quote, so
            // this re-parses to an equivalent pattern.
            format!("~r\"{}\"{}", source.replace('"', "\\\""), flags)
        }
        ExprKind::Sequence { members } => format!("({})", join_members(arena, members, " ")),
        ExprKind::OneOf { members } => format!("({})", join_members(arena, members, " / ")),
        ExprKind::Lookahead { member, negative } => {
            let prefix = if *negative { "!" } else { "&" };
            format!("({}{})", prefix, member_form(arena, *member))
        }
        ExprKind::Quantifier { member, min, max } => {
            let suffix = match (min, max) {
                (0, Some(1)) => "?".to_string(),
                (0, None) => "*".to_string(),
                (1, None) => "+".to_string(),
                (min, None) => format!("{{{min},}}"),
                (0, Some(max)) => format!("{{,{max}}}"),
                (min, Some(max)) => format!("{{{min},{max}}}"),
            };
            format!("{}{}", member_form(arena, *member), suffix)
        }
        ExprKind::LazyReference { target } => format!("<LazyReference to {target}>"),
    }
}

/// A member renders as its rule name when it has one, or its full form.
fn member_form(arena: &ExprArena, id: ExprId) -> String {
    let name = arena.name_of(id);
    if name.is_empty() {
        rule_rhs(arena, id)
    } else {
        name.to_string()
    }
}

fn join_members(arena: &ExprArena, members: &[ExprId], separator: &str) -> String {
    members
        .iter()
        .map(|&member| member_form(arena, member))
        .collect::<Vec<_>>()
        .join(separator)
}

// --- Matching -------------------------------------------------------------

/// Outcome of matching one expression at one position.
///
/// `NoMatch` is a soft failure recovered by the nearest alternative
/// consumer; `Failed` aborts the whole parse.
pub(crate) enum MatchOutcome {
    Matched(Rc<Node>),
    NoMatch,
    Failed(ParseError),
}

enum Slot {
    InProgress,
    NoMatch,
    Match(Rc<Node>),
}

/// Per-parse state: the input, its rune length, and the memo cache. Lives
/// only for the duration of one match call on the root expression.
pub(crate) struct MatchState<'a> {
    text: &'a str,
    text_runes: usize,
    options: &'a ParseOptions,
    cache: HashMap<(ExprId, usize), Slot>,
}

impl<'a> MatchState<'a> {
    pub(crate) fn new(text: &'a str, options: &'a ParseOptions) -> MatchState<'a> {
        MatchState {
            text,
            text_runes: text::rune_count(text),
            options,
            cache: HashMap::new(),
        }
    }
}

fn handle(arena: &Arc<ExprArena>, id: ExprId) -> Expression {
    Expression {
        arena: Arc::clone(arena),
        id,
    }
}

/// The memoizing driver. All recursion between expressions funnels through
/// here, so the cache protocol lives in exactly one place.
pub(crate) fn match_with_cache(
    arena: &Arc<ExprArena>,
    id: ExprId,
    pos: usize,
    state: &mut MatchState<'_>,
    depth: usize,
) -> MatchOutcome {
    if depth > state.options.recursion_limit {
        return MatchOutcome::Failed(ParseError::RecursionLimit { position: pos });
    }

    match state.cache.get(&(id, pos)) {
        Some(Slot::InProgress) => {
            return MatchOutcome::Failed(ParseError::LeftRecursion {
                rule: rule_or_form(arena, id),
                position: pos,
            })
        }
        Some(Slot::NoMatch) => return MatchOutcome::NoMatch,
        Some(Slot::Match(node)) => return MatchOutcome::Matched(Rc::clone(node)),
        None => {}
    }

    state.cache.insert((id, pos), Slot::InProgress);
    let outcome = uncached_match(arena, id, pos, state, depth);
    match &outcome {
        // A hard failure aborts the parse; the sentinel is left behind.
        MatchOutcome::Failed(_) => {}
        MatchOutcome::NoMatch => {
            state.cache.insert((id, pos), Slot::NoMatch);
        }
        MatchOutcome::Matched(node) => {
            state.cache.insert((id, pos), Slot::Match(Rc::clone(node)));
        }
    }
    outcome
}

fn rule_or_form(arena: &ExprArena, id: ExprId) -> String {
    let name = arena.name_of(id);
    if name.is_empty() {
        rule_rhs(arena, id)
    } else {
        name.to_string()
    }
}

fn uncached_match(
    arena: &Arc<ExprArena>,
    id: ExprId,
    pos: usize,
    state: &mut MatchState<'_>,
    depth: usize,
) -> MatchOutcome {
    match &arena.get(id).kind {
        ExprKind::Literal { value, rune_count } => {
            if state.text_runes < pos + rune_count {
                return MatchOutcome::NoMatch;
            }
            if text::rune_slice(state.text, pos, pos + rune_count) != value {
                return MatchOutcome::NoMatch;
            }
            MatchOutcome::Matched(Rc::new(Node::new_leaf(
                handle(arena, id),
                state.text,
                pos,
                pos + rune_count,
            )))
        }

        ExprKind::Regex { re, .. } => {
            let rest = text::rune_slice_from(state.text, pos);
            match re.find(rest) {
                // The pattern is anchored, but the anchor check keeps
                // multi-line `^` from matching past the cursor.
                Some(found) if found.start() == 0 => {
                    let matched = found.as_str();
                    let end = pos + text::rune_count(matched);
                    MatchOutcome::Matched(Rc::new(Node::new_regex(
                        handle(arena, id),
                        state.text,
                        pos,
                        end,
                        matched.to_string(),
                    )))
                }
                _ => MatchOutcome::NoMatch,
            }
        }

        ExprKind::Sequence { members } => {
            let mut cursor = pos;
            let mut children = Vec::with_capacity(members.len());
            for &member in members {
                match match_with_cache(arena, member, cursor, state, depth + 1) {
                    MatchOutcome::Failed(err) => return MatchOutcome::Failed(err),
                    MatchOutcome::NoMatch => return MatchOutcome::NoMatch,
                    MatchOutcome::Matched(node) => {
                        cursor += node.end() - node.start();
                        children.push(node);
                    }
                }
            }
            MatchOutcome::Matched(Rc::new(Node::new_branch(
                handle(arena, id),
                state.text,
                pos,
                cursor,
                children,
            )))
        }

        ExprKind::OneOf { members } => {
            for &member in members {
                match match_with_cache(arena, member, pos, state, depth + 1) {
                    MatchOutcome::Failed(err) => return MatchOutcome::Failed(err),
                    MatchOutcome::NoMatch => continue,
                    MatchOutcome::Matched(node) => {
                        let end = node.end();
                        return MatchOutcome::Matched(Rc::new(Node::new_branch(
                            handle(arena, id),
                            state.text,
                            pos,
                            end,
                            vec![node],
                        )));
                    }
                }
            }
            MatchOutcome::NoMatch
        }

        ExprKind::Lookahead { member, negative } => {
            let hit = match match_with_cache(arena, *member, pos, state, depth + 1) {
                MatchOutcome::Failed(err) => return MatchOutcome::Failed(err),
                MatchOutcome::Matched(_) => true,
                MatchOutcome::NoMatch => false,
            };
            if hit != *negative {
                MatchOutcome::Matched(Rc::new(Node::new_leaf(
                    handle(arena, id),
                    state.text,
                    pos,
                    pos,
                )))
            } else {
                MatchOutcome::NoMatch
            }
        }

        ExprKind::Quantifier { member, min, max } => {
            let mut cursor = pos;
            let mut children = Vec::new();
            while cursor < state.text_runes && max.map_or(true, |max| children.len() < max) {
                match match_with_cache(arena, *member, cursor, state, depth + 1) {
                    MatchOutcome::Failed(err) => return MatchOutcome::Failed(err),
                    MatchOutcome::NoMatch => break,
                    MatchOutcome::Matched(node) => {
                        let matched_len = node.end() - node.start();
                        children.push(node);
                        // A zero-length match would loop forever; once the
                        // minimum is met there is nothing left to gain.
                        if matched_len == 0 && children.len() >= *min {
                            break;
                        }
                        cursor += matched_len;
                    }
                }
            }
            if children.len() < *min {
                return MatchOutcome::NoMatch;
            }
            MatchOutcome::Matched(Rc::new(Node::new_branch(
                handle(arena, id),
                state.text,
                pos,
                cursor,
                children,
            )))
        }

        ExprKind::LazyReference { target } => MatchOutcome::Failed(ParseError::UnresolvedReference {
            name: target.clone(),
        }),
    }
}

// --- Public handle --------------------------------------------------------

/// A shareable handle to one expression of a compiled grammar.
#[derive(Clone)]
pub struct Expression {
    arena: Arc<ExprArena>,
    id: ExprId,
}

impl Expression {
    pub(crate) fn from_arena(arena: Arc<ExprArena>, id: ExprId) -> Expression {
        Expression { arena, id }
    }

    /// The rule name, empty for anonymous expressions.
    pub fn name(&self) -> &str {
        self.arena.name_of(self.id)
    }

    /// The variant name, for diagnostics: `"Literal"`, `"Regex"`,
    /// `"Sequence"`, `"OneOf"`, `"Lookahead"`, `"Not"`, `"Quantifier"`
    /// or `"LazyReference"`.
    pub fn kind_name(&self) -> &'static str {
        self.arena.kind_name(self.id)
    }

    /// The expression in PEG syntax, `name = rhs` when named.
    pub fn as_rule(&self) -> String {
        as_rule(&self.arena, self.id)
    }

    /// Match this expression against `text` from position zero, without
    /// requiring the whole input to be consumed.
    pub fn match_text(&self, text: &str, options: &ParseOptions) -> Result<Rc<Node>, ParseError> {
        let mut state = MatchState::new(text, options);
        match match_with_cache(&self.arena, self.id, 0, &mut state, 0) {
            MatchOutcome::Matched(node) => Ok(node),
            MatchOutcome::Failed(err) => Err(err),
            MatchOutcome::NoMatch => Err(ParseError::ParseFailed {
                text: text.to_string(),
                position: 0,
                expression: self.clone(),
            }),
        }
    }
}

impl PartialEq for Expression {
    fn eq(&self, other: &Expression) -> bool {
        Arc::ptr_eq(&self.arena, &other.arena) && self.id == other.id
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{} {}>",
            self.arena.kind_name(self.id),
            as_rule(&self.arena, self.id)
        )
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Match `expression` against `text` and require the whole input to be
/// consumed; trailing input is a [`ParseError::IncompleteParse`].
pub fn parse_with_expression(
    expression: &Expression,
    text: &str,
    options: &ParseOptions,
) -> Result<Rc<Node>, ParseError> {
    let node = expression.match_text(text, options)?;
    if node.end() < text::rune_count(text) {
        return Err(ParseError::IncompleteParse {
            text: text.to_string(),
            position: node.end(),
            expression: expression.clone(),
        });
    }
    Ok(node)
}

// --- Programmatic construction --------------------------------------------

/// Builds expressions for a grammar assembled in code rather than parsed
/// from text. All expressions created by one builder share an arena; wrap
/// up with [`ExpressionBuilder::build`].
///
/// ```
/// use peg_engine::{parse_with_expression, ExpressionBuilder, ParseOptions};
///
/// let mut builder = ExpressionBuilder::new();
/// let a = builder.literal("a");
/// let b = builder.literal("b");
/// let ab = builder.sequence("ab", vec![a, b]);
/// let expr = builder.build(ab);
/// let node = parse_with_expression(&expr, "ab", &ParseOptions::default()).unwrap();
/// assert_eq!(node.children().len(), 2);
/// ```
#[derive(Default)]
pub struct ExpressionBuilder {
    arena: ExprArena,
}

impl ExpressionBuilder {
    pub fn new() -> ExpressionBuilder {
        ExpressionBuilder::default()
    }

    /// An anonymous exact-text match.
    pub fn literal(&mut self, value: &str) -> ExprId {
        self.arena.literal("", value)
    }

    /// A named exact-text match.
    pub fn literal_named(&mut self, name: &str, value: &str) -> ExprId {
        self.arena.literal(name, value)
    }

    /// An anchored regex match; `flags` uses the grammar-level flag letters
    /// (`i`, `m`, `s`, `u`, `x`, `a`).
    pub fn regex(&mut self, name: &str, pattern: &str, flags: &str) -> Result<ExprId, CompileError> {
        self.arena.regex(name, pattern, flags)
    }

    /// Ordered concatenation.
    pub fn sequence(&mut self, name: &str, members: Vec<ExprId>) -> ExprId {
        self.arena.sequence(name, members)
    }

    /// Ordered choice; the first matching alternative wins.
    pub fn one_of(&mut self, name: &str, members: Vec<ExprId>) -> ExprId {
        self.arena.one_of(name, members)
    }

    /// Positive zero-width assertion (`&member`).
    pub fn lookahead(&mut self, member: ExprId) -> ExprId {
        self.arena.lookahead("", member, false)
    }

    /// Negative zero-width assertion (`!member`).
    pub fn not_(&mut self, member: ExprId) -> ExprId {
        self.arena.lookahead("", member, true)
    }

    pub fn zero_or_more(&mut self, name: &str, member: ExprId) -> ExprId {
        self.arena.quantifier(name, member, 0, None)
    }

    pub fn one_or_more(&mut self, name: &str, member: ExprId) -> ExprId {
        self.arena.quantifier(name, member, 1, None)
    }

    pub fn optional(&mut self, name: &str, member: ExprId) -> ExprId {
        self.arena.quantifier(name, member, 0, Some(1))
    }

    /// General repetition; `max` of `None` means unbounded.
    pub fn quantifier(&mut self, name: &str, member: ExprId, min: usize, max: Option<usize>) -> ExprId {
        self.arena.quantifier(name, member, min, max)
    }

    /// A placeholder resolved against a rule map during grammar
    /// compilation. Matching an unresolved reference is a hard failure.
    pub fn lazy_reference(&mut self, target: &str) -> ExprId {
        self.arena.lazy_reference(target)
    }

    pub(crate) fn arena_mut(&mut self) -> &mut ExprArena {
        &mut self.arena
    }

    /// Freeze the arena and return a handle to `root`.
    pub fn build(self, root: ExprId) -> Expression {
        Expression {
            arena: Arc::new(self.arena),
            id: root,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ParseOptions {
        ParseOptions::default()
    }

    #[test]
    fn test_literal_match() {
        let mut builder = ExpressionBuilder::new();
        let id = builder.literal_named("greeting", "hello");
        let expr = builder.build(id);
        let node = expr.match_text("hello", &options()).unwrap();
        assert_eq!((node.start(), node.end()), (0, 5));
        assert_eq!(node.text(), "hello");
    }

    #[test]
    fn test_literal_no_match_is_parse_failed() {
        let mut builder = ExpressionBuilder::new();
        let id = builder.literal_named("greeting", "hello");
        let expr = builder.build(id);
        let err = expr.match_text("help", &options()).unwrap_err();
        assert!(matches!(err, ParseError::ParseFailed { position: 0, .. }));
    }

    #[test]
    fn test_literal_counts_runes_not_bytes() {
        let mut builder = ExpressionBuilder::new();
        let id = builder.literal("你好");
        let expr = builder.build(id);
        let node = expr.match_text("你好世界", &options()).unwrap();
        assert_eq!((node.start(), node.end()), (0, 2));
    }

    #[test]
    fn test_sequence_children_are_contiguous() {
        let mut builder = ExpressionBuilder::new();
        let heigh = builder.literal("heigh");
        let ho = builder.literal("ho");
        let dwarf = builder.sequence("dwarf", vec![heigh, ho]);
        let expr = builder.build(dwarf);
        let node = expr.match_text("heighho", &options()).unwrap();
        assert_eq!((node.start(), node.end()), (0, 7));
        assert_eq!(node.children().len(), 2);
        assert_eq!(node.children()[0].end(), node.children()[1].start());
    }

    #[test]
    fn test_sequence_discards_partial_match() {
        let mut builder = ExpressionBuilder::new();
        let a = builder.literal("a");
        let b = builder.literal("b");
        let seq = builder.sequence("", vec![a, b]);
        let expr = builder.build(seq);
        assert!(expr.match_text("ac", &options()).is_err());
    }

    #[test]
    fn test_one_of_takes_first_alternative() {
        let mut builder = ExpressionBuilder::new();
        let ab = builder.literal("ab");
        let abc = builder.literal("abc");
        let choice = builder.one_of("x", vec![ab, abc]);
        let expr = builder.build(choice);
        let node = expr.match_text("abc", &options()).unwrap();
        // Ordered choice, not longest match: "ab" wins.
        assert_eq!(node.end(), 2);
        assert_eq!(node.children().len(), 1);
        assert_eq!(node.children()[0].text(), "ab");
    }

    #[test]
    fn test_lookahead_is_zero_width() {
        let mut builder = ExpressionBuilder::new();
        let b = builder.literal("b");
        let ahead = builder.lookahead(b);
        let expr = builder.build(ahead);
        let node = expr.match_text("b", &options()).unwrap();
        assert_eq!((node.start(), node.end()), (0, 0));
    }

    #[test]
    fn test_negative_lookahead() {
        let mut builder = ExpressionBuilder::new();
        let b = builder.literal("b");
        let not_b = builder.not_(b);
        let expr = builder.build(not_b);
        assert!(expr.match_text("a", &options()).is_ok());
        assert!(expr.match_text("b", &options()).is_err());
    }

    #[test]
    fn test_quantifier_repeats_and_stops_on_no_match() {
        let mut builder = ExpressionBuilder::new();
        let a = builder.literal("a");
        let many = builder.one_or_more("as", a);
        let expr = builder.build(many);
        let node = expr.match_text("aaab", &options()).unwrap();
        assert_eq!(node.end(), 3);
        assert_eq!(node.children().len(), 3);
    }

    #[test]
    fn test_quantifier_below_minimum_is_no_match() {
        let mut builder = ExpressionBuilder::new();
        let a = builder.literal("a");
        let three = builder.quantifier("", a, 3, Some(5));
        let expr = builder.build(three);
        assert!(expr.match_text("aa", &options()).is_err());
    }

    #[test]
    fn test_quantifier_respects_maximum() {
        let mut builder = ExpressionBuilder::new();
        let a = builder.literal("a");
        let upto = builder.quantifier("two", a, 0, Some(2));
        let tail = builder.literal("a");
        let whole = builder.sequence("", vec![upto, tail]);
        let expr = builder.build(whole);
        // The quantifier stops at two repetitions, leaving the third "a"
        // for the rest of the sequence.
        let node = expr.match_text("aaa", &options()).unwrap();
        assert_eq!(node.children()[0].children().len(), 2);
        assert_eq!(node.end(), 3);
    }

    #[test]
    fn test_quantifier_breaks_on_zero_width_member() {
        let mut builder = ExpressionBuilder::new();
        let a = builder.literal("a");
        let ahead = builder.lookahead(a);
        let many = builder.zero_or_more("peeks", ahead);
        let expr = builder.build(many);
        // The zero-width member matches once; the loop must stop instead
        // of spinning, leaving the "a" unconsumed.
        let node = expr.match_text("a", &options()).unwrap();
        assert_eq!((node.start(), node.end()), (0, 0));
        assert_eq!(node.children().len(), 1);
    }

    #[test]
    fn test_left_recursion_detected() {
        let mut builder = ExpressionBuilder::new();
        let placeholder = builder.literal("never");
        let choice = builder.one_of("loop", vec![placeholder]);
        builder.arena_mut().set_members(choice, vec![choice]);
        let expr = builder.build(choice);
        let err = expr.match_text("anything", &options()).unwrap_err();
        assert!(matches!(err, ParseError::LeftRecursion { position: 0, .. }));
    }

    #[test]
    fn test_unresolved_reference_is_hard_failure() {
        let mut builder = ExpressionBuilder::new();
        let missing = builder.lazy_reference("ghost");
        let a = builder.literal("a");
        let choice = builder.one_of("x", vec![missing, a]);
        let expr = builder.build(choice);
        // Hard failures are not recovered by the choice.
        let err = expr.match_text("a", &options()).unwrap_err();
        assert!(matches!(err, ParseError::UnresolvedReference { name } if name == "ghost"));
    }

    #[test]
    fn test_regex_match_is_anchored() {
        let mut builder = ExpressionBuilder::new();
        let digits = builder.regex("digits", r"[0-9]+", "").unwrap();
        let expr = builder.build(digits);
        let node = expr.match_text("123ab", &options()).unwrap();
        assert_eq!(node.end(), 3);
        assert_eq!(node.regex_match(), Some("123"));
        assert!(expr.match_text("ab123", &options()).is_err());
    }

    #[test]
    fn test_regex_flags() {
        let mut builder = ExpressionBuilder::new();
        let word = builder.regex("word", "abc", "i").unwrap();
        let expr = builder.build(word);
        assert!(expr.match_text("ABC", &options()).is_ok());
    }

    #[test]
    fn test_regex_rejects_locale_flag() {
        let mut builder = ExpressionBuilder::new();
        let err = builder.regex("", "abc", "l").unwrap_err();
        assert!(matches!(err, CompileError::InvalidFlag { flag: 'l' }));
    }

    #[test]
    fn test_memoized_and_unmemoized_results_agree() {
        // The same sub-expression is reached along two choice paths; the
        // second reach is a cache hit and must produce the same node.
        let mut builder = ExpressionBuilder::new();
        let a = builder.literal("a");
        let b = builder.literal("b");
        let ab = builder.sequence("", vec![a, b]);
        let ac = {
            let c = builder.literal("c");
            builder.sequence("", vec![a, c])
        };
        let choice = builder.one_of("x", vec![ab, ac]);
        let expr = builder.build(choice);
        let node = expr.match_text("ac", &options()).unwrap();
        assert_eq!(node.children()[0].children()[0].text(), "a");
    }

    #[test]
    fn test_as_rule_forms() {
        let mut builder = ExpressionBuilder::new();
        let a = builder.literal("a");
        let b = builder.literal("b");
        let seq = builder.sequence("pair", vec![a, b]);
        let opt = builder.optional("", seq);
        let expr = builder.build(opt);
        assert_eq!(expr.as_rule(), "pair?");

        let mut builder = ExpressionBuilder::new();
        let x = builder.literal("x");
        let y = builder.literal("y");
        let choice = builder.one_of("either", vec![x, y]);
        let expr = builder.build(choice);
        assert_eq!(expr.as_rule(), "either = (\"x\" / \"y\")");
    }

    #[test]
    fn test_as_rule_quantifier_ranges() {
        let mut builder = ExpressionBuilder::new();
        let a = builder.literal("a");
        let q = builder.quantifier("", a, 2, Some(4));
        let expr = builder.build(q);
        assert_eq!(expr.as_rule(), "\"a\"{2,4}");

        let mut builder = ExpressionBuilder::new();
        let a = builder.literal("a");
        let q = builder.quantifier("", a, 2, None);
        let expr = builder.build(q);
        assert_eq!(expr.as_rule(), "\"a\"{2,}");
    }

    #[test]
    fn test_incomplete_parse_via_parse_with_expression() {
        let mut builder = ExpressionBuilder::new();
        let id = builder.literal_named("greeting", "hello");
        let expr = builder.build(id);
        let err = parse_with_expression(&expr, "hellox", &options()).unwrap_err();
        assert!(matches!(err, ParseError::IncompleteParse { position: 5, .. }));
    }
}
