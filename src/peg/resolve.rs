//! Reference resolution
//!
//! Second compilation pass: every lazy reference in every rule is replaced
//! by the rule-map entry it names, in place, so the finished expression
//! graph carries no placeholders. Chains of references (`a = b`, `b = c`)
//! are chased to their end; a chain that closes on itself is a circular-
//! reference error, and a name with no rule is an unresolved-reference
//! error.
//!
//! Resolution walks each rule's own tree exactly once and never descends
//! into a chased target. Cross-rule links only exist as lazy references
//! before this pass runs, so the walk terminates even though the resolved
//! graph is genuinely cyclic for mutually recursive grammars.

use std::collections::{HashMap, HashSet};

use crate::peg::error::CompileError;
use crate::peg::expression::{ExprArena, ExprId, ExprKind};

/// Resolve every rule in `order` against the rule map, updating map
/// entries whose top-level expression was itself a reference.
pub(crate) fn resolve_rules(
    arena: &mut ExprArena,
    rules: &mut HashMap<String, ExprId>,
    order: &[String],
) -> Result<(), CompileError> {
    for name in order {
        let id = rules[name];
        let resolved = resolve_expression(arena, id, rules)?;
        rules.insert(name.clone(), resolved);
    }
    Ok(())
}

/// Resolve one expression tree in place, returning the id that should
/// stand in for it (different from `id` only when `id` is a reference).
fn resolve_expression(
    arena: &mut ExprArena,
    id: ExprId,
    rules: &HashMap<String, ExprId>,
) -> Result<ExprId, CompileError> {
    match &arena.get(id).kind {
        ExprKind::LazyReference { target } => {
            let target = target.clone();
            chase_reference(arena, &target, rules)
        }
        ExprKind::Sequence { members } | ExprKind::OneOf { members } => {
            let members = members.clone();
            let mut resolved = Vec::with_capacity(members.len());
            for member in members {
                resolved.push(resolve_expression(arena, member, rules)?);
            }
            arena.set_members(id, resolved);
            Ok(id)
        }
        ExprKind::Lookahead { member, .. } | ExprKind::Quantifier { member, .. } => {
            let member = *member;
            let resolved = resolve_expression(arena, member, rules)?;
            arena.set_member(id, resolved);
            Ok(id)
        }
        ExprKind::Literal { .. } | ExprKind::Regex { .. } => Ok(id),
    }
}

/// Follow a chain of references to its first non-reference target.
fn chase_reference(
    arena: &ExprArena,
    start: &str,
    rules: &HashMap<String, ExprId>,
) -> Result<ExprId, CompileError> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut target = start.to_string();
    loop {
        if !seen.insert(target.clone()) {
            return Err(CompileError::CircularReference {
                name: start.to_string(),
            });
        }
        let next = *rules
            .get(&target)
            .ok_or_else(|| CompileError::UnresolvedReference {
                name: start.to_string(),
            })?;
        match &arena.get(next).kind {
            ExprKind::LazyReference { target: onward } => target = onward.clone(),
            _ => return Ok(next),
        }
    }
}
