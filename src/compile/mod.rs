//! Load-time compilation of a parsed [`Page`].
//!
//! Compilation registers every `@Def` in the [`MacroRegistry`], fills the
//! [`DispatchTable`] from the root expression and `@Method` overrides, and
//! then checks every expression for problems that can be found without
//! evaluating anything: calls to names that are neither macros nor
//! builtins, and constructs naming unknown variants or fields.
//!
//! All problems are collected, so a page author sees every error at once.

use std::collections::HashSet;

use crate::ast::expr::*;
use crate::ast::node::Variant;
use crate::ast::page::{ItemKind, Page};
use crate::dispatch::DispatchTable;
use crate::error::{CompileError, CompileErrorKind};
use crate::registry::MacroRegistry;

/// Compile `page` on top of `registry` (which may already hold host
/// builtins).
pub fn compile(
    page: &Page,
    mut registry: MacroRegistry,
) -> Result<(MacroRegistry, DispatchTable), Vec<CompileError>> {
    let mut errors = Vec::new();
    let mut dispatch = DispatchTable::new();

    // Macros first, so bodies can call macros declared later in the page.
    for block in page.defs() {
        if let Err(e) = registry.register(&block.name.node, block.body.clone(), block.name.span) {
            errors.push(e);
        }
    }

    for item in &page.items {
        let result = match &item.node {
            ItemKind::Root(expr) => dispatch.set_root(expr.clone(), item.span),
            ItemKind::Method(block) => {
                dispatch.insert_method(&block.name.node, block.body.clone(), block.name.span)
            }
            ItemKind::Def(_) => Ok(()),
        };
        if let Err(e) = result {
            errors.push(e);
        }
    }

    for item in &page.items {
        let body = match &item.node {
            ItemKind::Root(expr) => expr,
            ItemKind::Method(block) | ItemKind::Def(block) => &block.body,
        };
        validate_expr(body, &registry, &mut errors);
    }

    if errors.is_empty() {
        Ok((registry, dispatch))
    } else {
        Err(errors)
    }
}

/// Check one expression tree against the registry and the render-tree
/// variant set, appending any problems to `errors`.
pub fn validate_expr(expr: &Expr, registry: &MacroRegistry, errors: &mut Vec<CompileError>) {
    match &expr.node {
        ExprKind::Literal(_) | ExprKind::Implicit => {}
        ExprKind::List(items) => {
            for item in items {
                validate_expr(item, registry, errors);
            }
        }
        ExprKind::Index { base, index } => {
            validate_expr(base, registry, errors);
            validate_expr(index, registry, errors);
        }
        ExprKind::Length(base) => validate_expr(base, registry, errors),
        ExprKind::Slice { base, lo, hi } => {
            validate_expr(base, registry, errors);
            validate_expr(lo, registry, errors);
            validate_expr(hi, registry, errors);
        }
        ExprKind::BinaryOp { left, right, .. } => {
            validate_expr(left, registry, errors);
            validate_expr(right, registry, errors);
        }
        ExprKind::Call(call) => {
            if !registry.contains(&call.name) {
                errors.push(CompileError::new(
                    CompileErrorKind::UnknownMacro,
                    expr.span,
                    format!("unknown macro: {}", call.name),
                ));
            }
            validate_expr(&call.arg, registry, errors);
        }
        ExprKind::Construct(construct) => {
            validate_construct(construct, errors);
            for field in &construct.fields {
                validate_expr(&field.value, registry, errors);
            }
        }
    }
}

fn validate_construct(construct: &Construct, errors: &mut Vec<CompileError>) {
    let Some(variant) = Variant::resolve(construct.qualifier.as_deref(), &construct.variant.node)
    else {
        errors.push(CompileError::new(
            CompileErrorKind::UnknownVariant,
            construct.variant.span,
            format!(
                "unknown variant `{}`, expected `Node::Element` or `Node::Text`",
                construct.path()
            ),
        ));
        return;
    };

    let mut seen = HashSet::new();
    for field in &construct.fields {
        let name = field.name.node.as_str();
        if !variant.has_field(name) {
            errors.push(CompileError::new(
                CompileErrorKind::UnknownField,
                field.name.span,
                format!(
                    "unknown field `{name}` for `{}`, expected one of: {}",
                    variant.name(),
                    variant.fields().join(", ")
                ),
            ));
        } else if !seen.insert(name) {
            errors.push(CompileError::new(
                CompileErrorKind::DuplicateField,
                field.name.span,
                format!("field `{name}` is given more than once"),
            ));
        }
    }
}
