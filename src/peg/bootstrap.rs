//! Bootstrap and canonical meta-grammar
//!
//! Grammar compilation pulls itself up in two stages. A hand-built seed
//! expression tree knows just enough of the rule syntax (`?`/`*`/`+`
//! quantifiers, plain references, regex and quoted literals) to parse
//! [`META_GRAMMAR_TEXT`], the full rule syntax written in itself. Lowering
//! that parse yields the bootstrap grammar, which re-parses the same text;
//! lowering again yields the canonical grammar used for every user grammar
//! thereafter.
//!
//! The canonical grammar is a process-wide singleton, built on first use.
//! Failure to build it is a bug in the seed, not a runtime condition, so
//! it panics.

use once_cell::sync::Lazy;

use crate::peg::error::CompileError;
use crate::peg::expression::{parse_with_expression, ExprArena, ExprId, Expression, ExpressionBuilder};
use crate::peg::grammar::{Grammar, ParseOptions};
use crate::peg::lowering::{into_grammar, rule_visitor, CustomRule};

/// The rule syntax, written in itself.
pub(crate) const META_GRAMMAR_TEXT: &str = r####"
# Ignored things (represented by _) are typically hung off the end of the
# leafmost kinds of nodes. Literals like "/" count as leaves.

rules = _ rule*
rule = label equals expression
equals = "=" _
literal = spaceless_literal _
spaceless_literal = ~r'r?"[^"\\]*(?:\\.[^"\\]*)*"'is / ~r"r?'[^'\\]*(?:\\.[^'\\]*)*'"is

expression = ored / sequence / term
or_term = "/" _ term
ored = term or_term+
sequence = term term+
not_term = "!" term _
lookahead_term = "&" term _
term = not_term / lookahead_term / quantified / atom
quantified = atom quantifier
atom = reference / literal / regex / parenthesized
regex = "~" spaceless_literal ~"[ilmsuxa]*"i _
parenthesized = "(" _ expression ")" _
quantifier = ~r"[*+?]|\{\d*,\d+\}|\{\d+,\d*\}|\{\d+\}" _
reference = label !equals

# A subsequent equals sign is the only thing that distinguishes a label
# (which begins a new rule) from a reference (which is just a pointer to a
# rule defined somewhere else). A label is never glued straight onto a
# quote; that keeps r"..." parsing as a raw literal instead of a reference.
label = ~"[a-zA-Z_][a-zA-Z_0-9]*" !~"[\"']" _

_ = meaninglessness*
meaninglessness = ~r"\s+" / comment
comment = ~r"#[^\r\n]*"
"####;

/// The programmatic `spaceless_literal`, installed as a custom rule so the
/// bootstrap stages and the canonical grammar share one definition.
pub(crate) fn spaceless_literal_rule(arena: &mut ExprArena) -> Result<ExprId, CompileError> {
    let double_quoted = arena.regex("", r#"r?"[^"\\]*(?:\\.[^"\\]*)*""#, "si")?;
    let single_quoted = arena.regex("", r#"r?'[^'\\]*(?:\\.[^'\\]*)*'"#, "si")?;
    Ok(arena.one_of("spaceless_literal", vec![double_quoted, single_quoted]))
}

const SPACELESS_LITERAL: &[CustomRule] = &[spaceless_literal_rule];

/// Hand-build the seed expression tree that parses the meta-grammar text.
pub(crate) fn seed_expression() -> Result<Expression, CompileError> {
    let mut b = ExpressionBuilder::new();

    let comment = b.regex("comment", "#[^\r\n]*", "")?;
    let whitespace = b.regex("", r"\s+", "")?;
    let meaninglessness = b.one_of("meaninglessness", vec![whitespace, comment]);
    let underscore = b.zero_or_more("_", meaninglessness);

    let equals_sign = b.literal("=");
    let equals = b.sequence("equals", vec![equals_sign, underscore]);

    let label_word = b.regex("", "[a-zA-Z_][a-zA-Z0-9_]*", "")?;
    let quote = b.regex("", "[\"']", "")?;
    let no_quote = b.not_(quote);
    let label = b.sequence("label", vec![label_word, no_quote, underscore]);

    let no_equals = b.not_(equals);
    let reference = b.sequence("reference", vec![label, no_equals]);

    let quantifier_symbol = b.regex("", r"[*+?]", "")?;
    let quantifier = b.sequence("quantifier", vec![quantifier_symbol, underscore]);

    let double_quoted = b.regex("", r#"r?"[^"\\]*(?:\\.[^"\\]*)*""#, "si")?;
    let single_quoted = b.regex("", r#"r?'[^'\\]*(?:\\.[^'\\]*)*'"#, "si")?;
    let spaceless_literal = b.one_of("spaceless_literal", vec![double_quoted, single_quoted]);
    let literal = b.sequence("literal", vec![spaceless_literal, underscore]);

    let tilde = b.literal("~");
    let regex_flags = b.regex("", "[ilmsuxa]*", "i")?;
    let regex = b.sequence("regex", vec![tilde, literal, regex_flags, underscore]);

    let atom = b.one_of("atom", vec![reference, literal, regex]);
    let quantified = b.sequence("quantified", vec![atom, quantifier]);

    // term and not_term are mutually recursive; patch term afterwards.
    let term = b.one_of("term", vec![quantified, atom]);
    let bang = b.literal("!");
    let not_term = b.sequence("not_term", vec![bang, term, underscore]);
    b.arena_mut().set_members(term, vec![not_term, quantified, atom]);

    let more_terms = b.one_or_more("", term);
    let sequence = b.sequence("sequence", vec![term, more_terms]);

    let slash = b.literal("/");
    let or_term = b.sequence("or_term", vec![slash, underscore, term]);
    let more_or_terms = b.one_or_more("", or_term);
    let ored = b.sequence("ored", vec![term, more_or_terms]);

    let expression = b.one_of("expression", vec![ored, sequence, term]);
    let rule = b.sequence("rule", vec![label, equals, expression]);
    let more_rules = b.one_or_more("", rule);
    let rules = b.sequence("rules", vec![underscore, more_rules]);

    Ok(b.build(rules))
}

fn build_meta_grammar() -> Result<Grammar, CompileError> {
    let options = ParseOptions::default();

    // Stage one: the seed parses the meta-grammar text.
    let seed = seed_expression()?;
    let tree = parse_with_expression(&seed, META_GRAMMAR_TEXT, &options)?;
    let visitor = rule_visitor(false, SPACELESS_LITERAL)?;
    let bootstrap = into_grammar(visitor.visit(&tree).map_err(CompileError::from_visit)?)?;

    // Stage two: the bootstrap grammar re-parses its own definition.
    let tree = bootstrap.parse_with_options(META_GRAMMAR_TEXT, &options)?;
    let visitor = rule_visitor(false, SPACELESS_LITERAL)?;
    into_grammar(visitor.visit(&tree).map_err(CompileError::from_visit)?)
}

static META_GRAMMAR: Lazy<Grammar> = Lazy::new(|| {
    build_meta_grammar()
        .unwrap_or_else(|err| panic!("canonical grammar construction failed: {err}"))
});

/// The canonical meta-grammar: parses rule syntax into grammar trees.
/// Built once on first use and shared for the life of the process.
pub fn meta_grammar() -> &'static Grammar {
    &META_GRAMMAR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_parses_the_meta_grammar_text() {
        let seed = seed_expression().unwrap();
        let tree = parse_with_expression(&seed, META_GRAMMAR_TEXT, &ParseOptions::default());
        assert!(tree.is_ok(), "seed failed: {}", tree.unwrap_err());
    }

    #[test]
    fn test_meta_grammar_builds() {
        let grammar = meta_grammar();
        assert_eq!(grammar.default_rule().name(), "rules");
        assert!(grammar.rule("expression").is_some());
        assert!(grammar.rule("spaceless_literal").is_some());
    }

    #[test]
    fn test_meta_grammar_parses_its_own_text() {
        let tree = meta_grammar().parse(META_GRAMMAR_TEXT).unwrap();
        assert_eq!(tree.expression().name(), "rules");
    }

    #[test]
    fn test_stage_results_agree() {
        // The canonical grammar and a third lowering round produce
        // grammars that parse identically.
        let tree = meta_grammar().parse(META_GRAMMAR_TEXT).unwrap();
        let visitor = rule_visitor(false, SPACELESS_LITERAL).unwrap();
        let third = into_grammar(visitor.visit(&tree).unwrap()).unwrap();

        let sample = "greeting = \"hi\" \" \"? \"there\"\n";
        let canonical = crate::peg::grammar::new_grammar(sample).unwrap();
        let from_third = {
            let tree = third.parse(sample).unwrap();
            let visitor = rule_visitor(false, &[]).unwrap();
            into_grammar(visitor.visit(&tree).unwrap()).unwrap()
        };
        let left = canonical.parse("hi there").unwrap();
        let right = from_third.parse("hi there").unwrap();
        assert_eq!(left.end(), right.end());
        assert_eq!(left.children().len(), right.children().len());
    }

    #[test]
    fn test_raw_literal_not_parsed_as_reference() {
        // The label rule refuses to end right before a quote, so r"..."
        // lowers as a raw literal rather than a reference to `r`.
        let grammar = crate::peg::grammar::new_grammar("x = r\"a.b\"\n").unwrap();
        assert!(grammar.parse("a.b").is_ok());
        // Raw literal: the dot is literal text, not a regex wildcard.
        assert!(grammar.parse("axb").is_err());
    }
}
