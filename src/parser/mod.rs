//! Page parser, built on [pest](https://pest.rs/).
//!
//! The grammar is defined in `page.pest`. This module converts pest's
//! parse tree into the typed AST defined in [`crate::ast`], applying
//! operator precedence with pest's Pratt parser.
//!
//! Use [`parse`] to convert page source into a [`Page`], or
//! [`parse_expr`] for a single expression.

use std::sync::LazyLock;

use pest::Parser;
use pest::iterators::Pair;
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest_derive::Parser;

use crate::ast::expr::*;
use crate::ast::page::*;
use crate::ast::span::{Span, Spanned};
use crate::error::ParseError;

#[derive(Parser)]
#[grammar = "parser/page.pest"]
struct PageParser;

/// Loosest first: `|>` and `?>` share a level below `<>`.
static PRATT: LazyLock<PrattParser<Rule>> = LazyLock::new(|| {
    PrattParser::new()
        .op(Op::infix(Rule::pipe, Assoc::Left) | Op::infix(Rule::coalesce, Assoc::Left))
        .op(Op::infix(Rule::concat, Assoc::Left))
});

/// Deepest expression tree the parser will build. Parsing, compiling and
/// evaluating all walk the tree recursively, so this bounds their stack use.
pub const MAX_NESTING_DEPTH: usize = 256;

type BuildResult<T> = Result<T, Vec<ParseError>>;

/// Parse page source into a [`Page`] AST.
///
/// Returns a list of [`ParseError`]s if the source contains invalid syntax.
/// Errors from separate items (such as two unknown directives) are all
/// reported.
pub fn parse(source: &str) -> Result<Page, Vec<ParseError>> {
    let pairs = PageParser::parse(Rule::page, source)
        .map_err(|e| vec![convert_pest_error(e, source)])?;

    let mut items = Vec::new();
    let mut errors = Vec::new();

    for pair in pairs {
        if pair.as_rule() != Rule::page {
            continue;
        }
        for inner in pair.into_inner() {
            if inner.as_rule() == Rule::EOI {
                break;
            }
            match build_item(inner) {
                Ok(item) => items.push(item),
                Err(mut errs) => errors.append(&mut errs),
            }
        }
    }

    if errors.is_empty() {
        Ok(Page { items })
    } else {
        Err(errors)
    }
}

/// Parse a single expression (no top-level directives).
pub fn parse_expr(source: &str) -> Result<Expr, Vec<ParseError>> {
    let mut pairs = PageParser::parse(Rule::expr_only, source)
        .map_err(|e| vec![convert_pest_error(e, source)])?;
    let expr_only = pairs.next().unwrap();
    let expr = expr_only.into_inner().next().unwrap();
    build_expr(expr, 1)
}

fn convert_pest_error(e: pest::error::Error<Rule>, source: &str) -> ParseError {
    let span = match &e.location {
        pest::error::InputLocation::Pos(p) => Span::new(*p, *p + 1),
        pest::error::InputLocation::Span((s, e)) => Span::new(*s, *e),
    };
    let at_end = span.start >= source.trim_end().len();
    let e = e.renamed_rules(rule_display_name);
    let mut err = ParseError::new(span, format!("unexpected token: {}", e.variant.message()));
    if at_end {
        err = err.with_hint("the source ended before this construct was closed");
    }
    err
}

fn rule_display_name(rule: &Rule) -> String {
    match rule {
        Rule::EOI => "end of input",
        Rule::expr | Rule::root_expr => "an expression",
        Rule::quoted_string => "a quoted string",
        Rule::integer => "an integer",
        Rule::identifier => "an identifier",
        Rule::implicit => "`$`",
        Rule::construct => "a `;Variant(...)` construct",
        Rule::paren => "`(`",
        Rule::call => "a macro call",
        Rule::concat => "`<>`",
        Rule::pipe => "`|>`",
        Rule::coalesce => "`?>`",
        Rule::length_op => "`.|`",
        Rule::index_op => "`.N`",
        Rule::slice_op => "`~ lo..<hi`",
        Rule::field_init => "a `;field = expr` initializer",
        Rule::trailing_comma => "`,`",
        Rule::method_block => "`@Method`",
        Rule::def_block => "`@Def`",
        Rule::unknown_directive => "a directive",
        other => return format!("{other:?}"),
    }
    .to_string()
}

fn pair_span(pair: &Pair<Rule>) -> Span {
    let s = pair.as_span();
    Span::new(s.start(), s.end())
}

// -- Item building -------------------------------------------------------

fn build_item(pair: Pair<Rule>) -> BuildResult<Item> {
    let span = pair_span(&pair);

    match pair.as_rule() {
        Rule::root_expr => {
            let expr = build_expr(pair.into_inner().next().unwrap(), 1)?;
            Ok(Spanned::new(ItemKind::Root(expr), span))
        }
        Rule::method_block => Ok(Spanned::new(ItemKind::Method(build_block(pair)?), span)),
        Rule::def_block => Ok(Spanned::new(ItemKind::Def(build_block(pair)?), span)),
        Rule::unknown_directive => {
            let name_pair = pair.into_inner().next().unwrap();
            let name = name_pair.as_str();
            let err = match name {
                "Method" | "Def" => ParseError::new(
                    span,
                    format!("malformed `@{name}` directive"),
                )
                .with_hint(format!("write `@{name} \"name\" {{ <expr> }}`")),
                _ => ParseError::new(pair_span(&name_pair), format!("unknown directive `@{name}`"))
                    .with_hint("the known directives are `@Method` and `@Def`"),
            };
            Err(vec![err])
        }
        rule => Err(vec![ParseError::new(
            span,
            format!("unexpected rule at top level: {rule:?}"),
        )]),
    }
}

fn build_block(pair: Pair<Rule>) -> BuildResult<Block> {
    let mut inner = pair.into_inner();
    let name_pair = inner.next().unwrap();
    let name = Spanned::new(extract_string_content(&name_pair)?, pair_span(&name_pair));
    let body = build_expr(inner.next().unwrap(), 1)?;
    Ok(Block { name, body })
}

// -- Expression building -------------------------------------------------

// Every builder takes the tree depth of the node it produces. A chain of
// `n` infix operators is at most `n` levels tall, so operands are built at
// `depth + n` before the Pratt parser combines them.

fn check_depth(depth: usize, span: Span) -> BuildResult<()> {
    if depth > MAX_NESTING_DEPTH {
        return Err(vec![
            ParseError::new(
                span,
                format!("expression nests deeper than {MAX_NESTING_DEPTH} levels"),
            )
            .with_hint("split long `<>` or `|>` chains across macros"),
        ]);
    }
    Ok(())
}

fn build_expr(pair: Pair<Rule>, depth: usize) -> BuildResult<Expr> {
    let infix_count = pair
        .clone()
        .into_inner()
        .filter(|p| matches!(p.as_rule(), Rule::concat | Rule::pipe | Rule::coalesce))
        .count();
    let operand_depth = depth + infix_count;
    check_depth(operand_depth, pair_span(&pair))?;

    PRATT
        .map_primary(|operand| build_operand(operand, operand_depth))
        .map_infix(|left, op, right| {
            let (left, right) = match (left, right) {
                (Ok(l), Ok(r)) => (l, r),
                (Err(mut a), Err(mut b)) => {
                    a.append(&mut b);
                    return Err(a);
                }
                (Err(e), _) | (_, Err(e)) => return Err(e),
            };
            let op = match op.as_rule() {
                Rule::concat => BinOp::Concat,
                Rule::pipe => BinOp::Pipe,
                Rule::coalesce => BinOp::Coalesce,
                rule => unreachable!("unknown infix rule: {rule:?}"),
            };
            let span = left.span.merge(right.span);
            Ok(Spanned::new(
                ExprKind::BinaryOp {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
                span,
            ))
        })
        .parse(pair.into_inner())
}

fn build_operand(pair: Pair<Rule>, depth: usize) -> BuildResult<Expr> {
    let span = pair_span(&pair);
    check_depth(depth, span)?;

    match pair.as_rule() {
        Rule::call => {
            let mut inner = pair.into_inner();
            let name = inner.next().unwrap().as_str().to_string();
            let arg = build_operand(inner.next().unwrap(), depth + 1)?;
            Ok(Spanned::new(
                ExprKind::Call(MacroCall {
                    name,
                    arg: Box::new(arg),
                }),
                span,
            ))
        }
        Rule::postfix_expr => build_postfix(pair, depth),
        rule => Err(vec![ParseError::new(
            span,
            format!("unexpected rule in operand position: {rule:?}"),
        )]),
    }
}

/// `postfix_expr` and `bound` share the same shape: a primary followed by
/// postfix operators applied left to right.
fn build_postfix(pair: Pair<Rule>, depth: usize) -> BuildResult<Expr> {
    // The primary sits below one node per postfix operator.
    let postfix_count = pair.clone().into_inner().count().saturating_sub(1);
    let primary_depth = depth + postfix_count;
    check_depth(primary_depth, pair_span(&pair))?;
    let mut inner = pair.into_inner();
    let mut expr = build_primary(inner.next().unwrap(), primary_depth)?;

    for op in inner {
        let span = Span::new(expr.span.start, op.as_span().end());
        let kind = match op.as_rule() {
            Rule::length_op => ExprKind::Length(Box::new(expr)),
            Rule::index_op => {
                let index_pair = op.into_inner().next().unwrap();
                let index = match index_pair.as_rule() {
                    Rule::integer => Spanned::new(
                        ExprKind::Literal(index_pair.as_str().to_string()),
                        pair_span(&index_pair),
                    ),
                    _ => build_expr(index_pair, primary_depth + 1)?,
                };
                ExprKind::Index {
                    base: Box::new(expr),
                    index: Box::new(index),
                }
            }
            Rule::slice_op => {
                let mut bounds = op.into_inner();
                let lo = build_postfix(bounds.next().unwrap(), primary_depth + 1)?;
                let hi = build_postfix(bounds.next().unwrap(), primary_depth + 1)?;
                ExprKind::Slice {
                    base: Box::new(expr),
                    lo: Box::new(lo),
                    hi: Box::new(hi),
                }
            }
            rule => unreachable!("unknown postfix rule: {rule:?}"),
        };
        expr = Spanned::new(kind, span);
    }

    Ok(expr)
}

fn build_primary(pair: Pair<Rule>, depth: usize) -> BuildResult<Expr> {
    let span = pair_span(&pair);

    match pair.as_rule() {
        Rule::implicit => Ok(Spanned::new(ExprKind::Implicit, span)),
        Rule::quoted_string => {
            let s = extract_string_content(&pair)?;
            Ok(Spanned::new(ExprKind::Literal(s), span))
        }
        Rule::integer => Ok(Spanned::new(
            ExprKind::Literal(pair.as_str().to_string()),
            span,
        )),
        Rule::construct => build_construct(pair, depth),
        Rule::paren => {
            let mut elements = Vec::new();
            let mut trailing_comma = false;
            for inner in pair.into_inner() {
                match inner.as_rule() {
                    Rule::expr => elements.push(build_expr(inner, depth + 1)?),
                    Rule::trailing_comma => trailing_comma = true,
                    _ => {}
                }
            }
            if elements.len() == 1 && !trailing_comma {
                // Plain grouping keeps the inner node; only the span widens.
                let mut grouped = elements.pop().unwrap();
                grouped.span = span;
                Ok(grouped)
            } else {
                Ok(Spanned::new(ExprKind::List(elements), span))
            }
        }
        rule => Err(vec![ParseError::new(
            span,
            format!("unexpected rule in primary position: {rule:?}"),
        )]),
    }
}

fn build_construct(pair: Pair<Rule>, depth: usize) -> BuildResult<Expr> {
    let span = pair_span(&pair);
    let mut inner = pair.into_inner();

    let path = inner.next().unwrap();
    let mut segments: Vec<Spanned<String>> = path
        .into_inner()
        .map(|p| Spanned::new(p.as_str().to_string(), pair_span(&p)))
        .collect();
    let variant = segments.pop().unwrap();
    let qualifier = segments.pop().map(|s| s.node);

    let mut fields = Vec::new();
    let mut errors = Vec::new();
    for field_pair in inner {
        let mut field_inner = field_pair.into_inner();
        let name_pair = field_inner.next().unwrap();
        let name = Spanned::new(name_pair.as_str().to_string(), pair_span(&name_pair));
        match build_expr(field_inner.next().unwrap(), depth + 1) {
            Ok(value) => fields.push(FieldInit { name, value }),
            Err(mut errs) => errors.append(&mut errs),
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(Spanned::new(
        ExprKind::Construct(Construct {
            variant,
            qualifier,
            fields,
        }),
        span,
    ))
}

// -- Helpers -------------------------------------------------------------

fn extract_string_content(pair: &Pair<Rule>) -> BuildResult<String> {
    // quoted_string = ${ "\"" ~ string_inner ~ "\"" }
    let inner = pair.clone().into_inner().next();
    let (raw, offset) = match &inner {
        Some(p) => (p.as_str(), p.as_span().start()),
        None => ("", pair.as_span().start()),
    };

    let mut result = String::with_capacity(raw.len());
    let mut chars = raw.char_indices();
    while let Some((i, ch)) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }
        match chars.next() {
            Some((_, 'n')) => result.push('\n'),
            Some((_, 't')) => result.push('\t'),
            Some((_, 'r')) => result.push('\r'),
            Some((_, '"')) => result.push('"'),
            Some((_, '\\')) => result.push('\\'),
            Some((j, c)) => {
                let start = offset + i;
                return Err(vec![
                    ParseError::new(
                        Span::new(start, offset + j + c.len_utf8()),
                        format!("unknown escape sequence `\\{c}`"),
                    )
                    .with_hint("supported escapes are \\n \\t \\r \\\" and \\\\"),
                ]);
            }
            None => result.push('\\'),
        }
    }
    Ok(result)
}
