//! String-literal evaluator
//!
//! A small sub-parser, itself built from expression primitives, that
//! decodes the quoted literals appearing in grammar source: `"…"`, `'…'`
//! and their raw forms `r"…"`, `r'…'`. The grammar permits escaped
//! characters inside the quotes; decoding strips the delimiters, resolves
//! the simple backslash escapes for normal literals, and leaves raw
//! literals untouched (which is what makes `r"\d+"` usable as a regex
//! body).

use once_cell::sync::Lazy;

use crate::peg::error::ParseError;
use crate::peg::expression::{parse_with_expression, Expression, ExpressionBuilder};
use crate::peg::grammar::ParseOptions;

static STRING_VALUE: Lazy<Expression> = Lazy::new(|| {
    build_string_value().unwrap_or_else(|err| panic!("string literal grammar failed to build: {err}"))
});

fn build_string_value() -> Result<Expression, crate::peg::error::CompileError> {
    let mut b = ExpressionBuilder::new();

    let double_quoted_chars = b.regex("", r#"[^"\\]*(?:\\.[^"\\]*)*"#, "s")?;
    let single_quoted_chars = b.regex("", r"[^'\\]*(?:\\.[^'\\]*)*", "s")?;
    let double_quote = b.literal("\"");
    let single_quote = b.literal("'");

    let double_quoted = b.sequence(
        "double_quoted",
        vec![double_quote, double_quoted_chars, double_quote],
    );
    let single_quoted = b.sequence(
        "single_quoted",
        vec![single_quote, single_quoted_chars, single_quote],
    );

    let lower_r = b.literal("r");
    let upper_r = b.literal("R");
    let raw_prefix = b.one_of("", vec![lower_r, upper_r]);

    let raw_double_quoted = b.sequence(
        "raw_string_double_quoted",
        vec![raw_prefix, double_quote, double_quoted_chars, double_quote],
    );
    let raw_single_quoted = b.sequence(
        "raw_string_single_quoted",
        vec![raw_prefix, single_quote, single_quoted_chars, single_quote],
    );

    let string_value = b.one_of(
        "string_value",
        vec![
            double_quoted,
            single_quoted,
            raw_double_quoted,
            raw_single_quoted,
        ],
    );
    Ok(b.build(string_value))
}

/// Decode a quoted grammar literal into the text it matches.
pub(crate) fn eval_string_literal(input: &str) -> Result<String, ParseError> {
    let tree = parse_with_expression(&STRING_VALUE, input, &ParseOptions::default())?;
    // string_value is a choice: one child, the winning variant.
    let variant = &tree.children()[0];
    let (chars_index, raw) = match variant.expression().name() {
        "double_quoted" | "single_quoted" => (1, false),
        _ => (2, true),
    };
    let inner = variant.children()[chars_index].text();
    if raw {
        Ok(inner.to_string())
    } else {
        Ok(unescape(inner))
    }
}

/// Resolve the delimiter and whitespace escapes; anything else is kept as
/// written, backslash included.
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
