//! Expression evaluation engine.
//!
//! The evaluator walks an [`Expr`] under an [`Env`] and produces a
//! [`Value`]. Evaluation is pure: it reads the compiled registry, allocates
//! fresh values, and never mutates shared state, so any number of requests
//! can evaluate against the same compiled page at once.
//!
//! Operator semantics:
//!
//! - `a <> b` concatenates lists; a string or node operand counts as a
//!   one-element list. An `Empty` operand is a type mismatch.
//! - `a |> b` evaluates `b` with `$` bound to the value of `a`.
//! - `a ?> b` is `a` unless `a` is `Empty`, in which case it is `b`. `b` is
//!   not evaluated when `a` is present.
//! - name`arg evaluates `arg` in the caller's environment, then the macro
//!   body in a fresh environment whose `$` is that value.

use log::trace;

use crate::ast::expr::*;
use crate::ast::node::{Node, Variant};
use crate::ast::span::Span;
use crate::ast::value::Value;
use crate::error::{EvalError, EvalErrorKind};
use crate::registry::Callable;

mod context;

pub use context::Env;

/// Macro call nesting allowed by [`EvalOptions::default`].
pub const DEFAULT_MAX_CALL_DEPTH: usize = 128;

/// Expression nesting, summed across macro calls, allowed by
/// [`EvalOptions::default`].
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 384;

/// Evaluate an expression and return its [`Value`].
///
/// ```rust
/// use pagelang::{parse_expr, evaluate, Env, MacroRegistry, Value};
///
/// let expr = parse_expr(r#"$ ?> "fallback""#).unwrap();
/// let registry = MacroRegistry::new();
///
/// let result = evaluate(&expr, Env::root(&registry)).unwrap();
/// assert_eq!(result, Value::from("fallback"));
///
/// let present = Value::from("given");
/// let result = evaluate(&expr, Env::new(&registry, &present)).unwrap();
/// assert_eq!(result, Value::from("given"));
/// ```
pub fn evaluate(expr: &Expr, env: Env<'_>) -> Result<Value, EvalError> {
    evaluate_with_options(expr, env, EvalOptions::default())
}

/// Evaluate an expression with custom resource limits.
///
/// ```rust
/// use pagelang::{parse_expr, evaluate_with_options, Env, EvalOptions, MacroRegistry};
///
/// let expr = parse_expr(r#"("a", "b") <> ("c",)"#).unwrap();
/// let registry = MacroRegistry::new();
///
/// let opts = EvalOptions::new().max_node_evaluations(2);
/// assert!(evaluate_with_options(&expr, Env::root(&registry), opts).is_err());
/// ```
pub fn evaluate_with_options(
    expr: &Expr,
    env: Env<'_>,
    options: EvalOptions,
) -> Result<Value, EvalError> {
    let mut evaluator = Evaluator::new(options);
    evaluator.eval_expr(expr, env)
}

/// Evaluate a page body and require that it produces a render-tree node.
pub fn render_node(expr: &Expr, env: Env<'_>, options: EvalOptions) -> Result<Node, EvalError> {
    let value = evaluate_with_options(expr, env, options)?;
    let type_name = value.type_name();
    value.into_node().ok_or_else(|| {
        EvalError::new(
            EvalErrorKind::TypeMismatch,
            format!("page body must produce a renderable node, got {type_name}"),
        )
        .with_span(expr.span)
    })
}

// ── Evaluation options ──────────────────────────────────────────────────

/// Resource limits for a single evaluation.
///
/// Create with [`EvalOptions::new()`] and chain builder methods:
///
/// ```rust
/// use pagelang::EvalOptions;
///
/// let opts = EvalOptions::new()
///     .max_call_depth(32)
///     .max_node_evaluations(10_000);
/// ```
#[derive(Debug, Clone)]
pub struct EvalOptions {
    /// Maximum nesting of macro calls before the evaluator returns a
    /// [`RecursionLimit`](EvalErrorKind::RecursionLimit) error. `None`
    /// means unlimited, which lets a self-recursive macro overflow the
    /// stack.
    pub max_call_depth: Option<usize>,

    /// Maximum number of expression nodes being evaluated at once, counting
    /// through macro bodies, before the evaluator returns a
    /// [`ResourceLimit`](EvalErrorKind::ResourceLimit) error. Every level
    /// holds native stack until it returns. `None` means unlimited.
    pub max_nesting_depth: Option<usize>,

    /// Maximum number of expression nodes evaluated before the evaluator
    /// returns a [`ResourceLimit`](EvalErrorKind::ResourceLimit) error.
    /// `None` means unlimited.
    pub max_node_evaluations: Option<u64>,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            max_call_depth: Some(DEFAULT_MAX_CALL_DEPTH),
            max_nesting_depth: Some(DEFAULT_MAX_NESTING_DEPTH),
            max_node_evaluations: None,
        }
    }
}

impl EvalOptions {
    /// Defaults: call depth capped at [`DEFAULT_MAX_CALL_DEPTH`], nesting
    /// capped at [`DEFAULT_MAX_NESTING_DEPTH`], no node budget.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_call_depth(mut self, limit: usize) -> Self {
        self.max_call_depth = Some(limit);
        self
    }

    pub fn max_nesting_depth(mut self, limit: usize) -> Self {
        self.max_nesting_depth = Some(limit);
        self
    }

    pub fn max_node_evaluations(mut self, limit: u64) -> Self {
        self.max_node_evaluations = Some(limit);
        self
    }
}

// ── Evaluator ───────────────────────────────────────────────────────────

/// Per-request evaluation state. Only counters live here; `$` travels in
/// the [`Env`] argument.
struct Evaluator {
    options: EvalOptions,
    node_count: u64,
    call_depth: usize,
    nesting: usize,
}

impl Evaluator {
    fn new(options: EvalOptions) -> Self {
        Self {
            options,
            node_count: 0,
            call_depth: 0,
            nesting: 0,
        }
    }

    /// Check the node budget and nesting depth. Called once per expression
    /// node, before descending into it.
    fn check_limits(&mut self, span: Span) -> Result<(), EvalError> {
        self.node_count += 1;

        if let Some(max) = self.options.max_nesting_depth
            && self.nesting >= max
        {
            return Err(EvalError::new(
                EvalErrorKind::ResourceLimit,
                format!("expressions nested deeper than {max} levels"),
            )
            .with_span(span));
        }

        if let Some(max) = self.options.max_node_evaluations
            && self.node_count > max
        {
            return Err(EvalError::new(
                EvalErrorKind::ResourceLimit,
                format!("evaluation exceeded maximum of {max} node evaluations"),
            )
            .with_span(span));
        }

        Ok(())
    }

    fn eval_expr(&mut self, expr: &Expr, env: Env<'_>) -> Result<Value, EvalError> {
        self.check_limits(expr.span)?;
        self.nesting += 1;
        let result = self.eval_node(expr, env);
        self.nesting -= 1;
        result
    }

    fn eval_node(&mut self, expr: &Expr, env: Env<'_>) -> Result<Value, EvalError> {
        let span = expr.span;

        match &expr.node {
            ExprKind::Literal(s) => Ok(Value::Str(s.clone())),

            ExprKind::Implicit => Ok(env.implicit().clone()),

            ExprKind::List(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for elem in elements {
                    values.push(self.eval_expr(elem, env)?);
                }
                Ok(Value::List(values))
            }

            ExprKind::Index { base, index } => {
                let items = self.eval_list(base, env)?;
                let i = self.eval_index(index, env)?;
                usize::try_from(i)
                    .ok()
                    .and_then(|i| items.get(i).cloned())
                    .ok_or_else(|| EvalError::index_out_of_range(i, items.len()).with_span(span))
            }

            ExprKind::Length(base) => {
                let items = self.eval_list(base, env)?;
                Ok(Value::from(items.len()))
            }

            ExprKind::Slice { base, lo, hi } => {
                let items = self.eval_list(base, env)?;
                let lo = self.eval_index(lo, env)?;
                let hi = self.eval_index(hi, env)?;
                slice(items, lo, hi).map_err(|e| e.with_span(span))
            }

            ExprKind::BinaryOp { left, op, right } => match op {
                BinOp::Concat => {
                    let left = self.eval_expr(left, env)?;
                    let right = self.eval_expr(right, env)?;
                    concat(left, right).map_err(|e| e.with_span(span))
                }
                BinOp::Pipe => {
                    let value = self.eval_expr(left, env)?;
                    self.eval_expr(right, env.rebind(&value))
                }
                BinOp::Coalesce => {
                    let value = self.eval_expr(left, env)?;
                    if value.is_absent() {
                        self.eval_expr(right, env)
                    } else {
                        Ok(value)
                    }
                }
            },

            ExprKind::Call(call) => self.eval_call(call, span, env),

            ExprKind::Construct(construct) => self.eval_construct(construct, span, env),
        }
    }

    fn eval_list(&mut self, expr: &Expr, env: Env<'_>) -> Result<Vec<Value>, EvalError> {
        let value = self.eval_expr(expr, env)?;
        let type_name = value.type_name();
        value
            .into_list()
            .ok_or_else(|| EvalError::type_mismatch("list", type_name).with_span(expr.span))
    }

    fn eval_index(&mut self, expr: &Expr, env: Env<'_>) -> Result<i64, EvalError> {
        let value = self.eval_expr(expr, env)?;
        if let Some(i) = value.as_index() {
            return Ok(i);
        }
        let err = match value.as_str() {
            // Well formed but too large for any list.
            Some(digits) if is_integer_literal(digits) => EvalError::new(
                EvalErrorKind::IndexOutOfRange,
                format!("index {digits} out of range for any list"),
            ),
            _ => EvalError::type_mismatch("integer index", value.type_name()),
        };
        Err(err.with_span(expr.span))
    }

    fn eval_call(
        &mut self,
        call: &MacroCall,
        span: Span,
        env: Env<'_>,
    ) -> Result<Value, EvalError> {
        // The argument belongs to the caller: evaluate it before resolving.
        let arg = self.eval_expr(&call.arg, env)?;
        let callable = env
            .registry()
            .resolve(&call.name)
            .map_err(|e| e.with_span(span))?;

        match callable {
            Callable::Macro(def) => {
                if let Some(max) = self.options.max_call_depth
                    && self.call_depth >= max
                {
                    return Err(EvalError::new(
                        EvalErrorKind::RecursionLimit,
                        format!("macro calls nested deeper than {max} levels (in `{}`)", def.name),
                    )
                    .with_span(span));
                }

                trace!("calling macro `{}` with {arg}", def.name);
                self.call_depth += 1;
                let result = self.eval_expr(&def.body, env.rebind(&arg));
                self.call_depth -= 1;
                result
            }
            Callable::Builtin(builtin) => {
                let sig = builtin.signature();
                if !sig.param.matches(&arg) {
                    return Err(EvalError::builtin_argument(
                        &sig.name,
                        sig.param.name(),
                        arg.type_name(),
                    )
                    .with_span(call.arg.span));
                }
                trace!("calling builtin `{}` with {arg}", sig.name);
                builtin.call(arg).map_err(|e| e.or_span(span))
            }
        }
    }

    fn eval_construct(
        &mut self,
        construct: &Construct,
        span: Span,
        env: Env<'_>,
    ) -> Result<Value, EvalError> {
        let variant = Variant::resolve(construct.qualifier.as_deref(), &construct.variant.node)
            .ok_or_else(|| {
                EvalError::new(
                    EvalErrorKind::UnknownVariant,
                    format!("unknown variant `{}`", construct.path()),
                )
                .with_span(construct.variant.span)
            })?;

        let mut fields = FieldValues::default();
        for field in &construct.fields {
            let name = field.name.node.as_str();
            if !variant.has_field(name) {
                return Err(EvalError::new(
                    EvalErrorKind::UnknownField,
                    format!("unknown field `{name}` for `{}`", variant.name()),
                )
                .with_span(field.name.span));
            }
            if fields.contains(name) {
                return Err(EvalError::new(
                    EvalErrorKind::TypeMismatch,
                    format!("field `{name}` is given more than once"),
                )
                .with_span(field.name.span));
            }
            let value = self.eval_expr(&field.value, env)?;
            fields.push(name, value, field.value.span);
        }

        let node = match variant {
            Variant::Element => {
                let tag = fields.take_str(variant, "tag", span)?;
                let children = fields.take_nodes(variant, "children", span)?;
                Node::Element { tag, children }
            }
            Variant::Text => {
                let value = fields.take_str(variant, "value", span)?;
                Node::Text { value }
            }
        };

        Ok(Value::Node(node))
    }
}

// ── Construct field handling ────────────────────────────────────────────

#[derive(Default)]
struct FieldValues<'s> {
    entries: Vec<(&'s str, Value, Span)>,
}

impl<'s> FieldValues<'s> {
    fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _, _)| *n == name)
    }

    fn push(&mut self, name: &'s str, value: Value, span: Span) {
        self.entries.push((name, value, span));
    }

    /// Remove a required field. A missing field is a type mismatch
    /// pointing at the whole construct.
    fn take(
        &mut self,
        variant: Variant,
        name: &str,
        construct_span: Span,
    ) -> Result<(Value, Span), EvalError> {
        match self.entries.iter().position(|(n, _, _)| *n == name) {
            Some(pos) => {
                let (_, value, span) = self.entries.swap_remove(pos);
                Ok((value, span))
            }
            None => Err(EvalError::new(
                EvalErrorKind::TypeMismatch,
                format!(
                    "missing field `{name}` in `{}::{}`",
                    Variant::QUALIFIER,
                    variant.name()
                ),
            )
            .with_span(construct_span)),
        }
    }

    fn take_str(
        &mut self,
        variant: Variant,
        name: &str,
        construct_span: Span,
    ) -> Result<String, EvalError> {
        let (value, span) = self.take(variant, name, construct_span)?;
        match value {
            Value::Str(s) => Ok(s),
            other => Err(EvalError::type_mismatch(
                &format!("string for field `{name}`"),
                other.type_name(),
            )
            .with_span(span)),
        }
    }

    fn take_nodes(
        &mut self,
        variant: Variant,
        name: &str,
        construct_span: Span,
    ) -> Result<Vec<Node>, EvalError> {
        let (value, span) = self.take(variant, name, construct_span)?;
        let items = match value {
            Value::List(items) => items,
            other => {
                return Err(EvalError::type_mismatch(
                    &format!("list of nodes for field `{name}`"),
                    other.type_name(),
                )
                .with_span(span));
            }
        };

        items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Node(node) => Ok(node),
                other => Err(EvalError::type_mismatch(
                    &format!("node at position {i} of field `{name}`"),
                    other.type_name(),
                )
                .with_span(span)),
            })
            .collect()
    }
}

// ── Pure list operations ────────────────────────────────────────────────

fn concat(left: Value, right: Value) -> Result<Value, EvalError> {
    let mut items = concat_operand(left)?;
    items.extend(concat_operand(right)?);
    Ok(Value::List(items))
}

fn concat_operand(value: Value) -> Result<Vec<Value>, EvalError> {
    match value {
        Value::List(items) => Ok(items),
        Value::Str(_) | Value::Node(_) => Ok(vec![value]),
        Value::Empty => Err(EvalError::type_mismatch(
            "list, string, or node operand for `<>`",
            "empty",
        )),
    }
}

fn slice(mut items: Vec<Value>, lo: i64, hi: i64) -> Result<Value, EvalError> {
    let len = items.len();
    let range = usize::try_from(lo)
        .ok()
        .zip(usize::try_from(hi).ok())
        .filter(|(l, h)| l <= h && *h <= len);

    match range {
        Some((l, h)) => {
            items.truncate(h);
            items.drain(..l);
            Ok(Value::List(items))
        }
        None => Err(EvalError::slice_out_of_range(lo, hi, len)),
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::span::Span;
    use crate::parser;
    use crate::registry::{ClosureBuiltin, MacroRegistry, ValueType};

    fn registry_with(defs: &[(&str, &str)]) -> MacroRegistry {
        let mut registry = MacroRegistry::with_standard_builtins();
        for (name, body) in defs {
            let body = parser::parse_expr(body).expect("parse failed");
            registry.register(*name, body, Span::default()).unwrap();
        }
        registry
    }

    fn eval_in(registry: &MacroRegistry, source: &str, implicit: &Value) -> Result<Value, EvalError> {
        let expr = parser::parse_expr(source).expect("parse failed");
        evaluate(&expr, Env::new(registry, implicit))
    }

    fn eval_simple(source: &str) -> Result<Value, EvalError> {
        eval_in(&registry_with(&[]), source, &Value::Empty)
    }

    fn abc() -> Value {
        vec!["a", "b", "c"].into()
    }

    #[test]
    fn test_literal_and_implicit() {
        assert_eq!(eval_simple(r#""hi""#).unwrap(), Value::from("hi"));
        assert_eq!(eval_simple("$").unwrap(), Value::Empty);
        let registry = registry_with(&[]);
        assert_eq!(eval_in(&registry, "$", &abc()).unwrap(), abc());
    }

    #[test]
    fn test_index() {
        let registry = registry_with(&[]);
        assert_eq!(eval_in(&registry, "$.0", &abc()).unwrap(), Value::from("a"));
        assert_eq!(eval_in(&registry, "$.2", &abc()).unwrap(), Value::from("c"));
        assert_eq!(eval_in(&registry, "$.($.|)", &abc()).unwrap_err().kind, EvalErrorKind::IndexOutOfRange);
    }

    #[test]
    fn test_index_out_of_range() {
        let registry = registry_with(&[]);
        let err = eval_in(&registry, "$.3", &abc()).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::IndexOutOfRange);
        assert_eq!(err.message, "index 3 out of range for list of length 3");

        let err = eval_in(&registry, "$.(-1)", &abc()).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::IndexOutOfRange);
    }

    #[test]
    fn test_index_too_large_for_i64_is_out_of_range() {
        let registry = registry_with(&[]);
        let list = Value::from(vec!["a"]);
        for source in [
            "$.99999999999999999999",
            "$.(-99999999999999999999)",
            "$ ~ 0..<99999999999999999999",
        ] {
            let err = eval_in(&registry, source, &list).unwrap_err();
            assert_eq!(err.kind, EvalErrorKind::IndexOutOfRange, "{source}");
        }
    }

    #[test]
    fn test_index_requires_list_and_integer() {
        let err = eval_simple(r#""abc".0"#).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::TypeMismatch);
        assert_eq!(err.span, Some(Span::new(0, 5)));

        let err = eval_simple(r#"("a", "b").("x")"#).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::TypeMismatch);
        assert!(err.message.contains("integer index"));
    }

    #[test]
    fn test_length() {
        let registry = registry_with(&[]);
        assert_eq!(eval_in(&registry, "$.|", &abc()).unwrap(), Value::from("3"));
        assert_eq!(eval_simple("().|").unwrap(), Value::from("0"));
        assert_eq!(eval_simple("$.|").unwrap_err().kind, EvalErrorKind::TypeMismatch);
    }

    #[test]
    fn test_slice() {
        let registry = registry_with(&[]);
        assert_eq!(eval_in(&registry, "$ ~ 0..<$.|", &abc()).unwrap(), abc());
        assert_eq!(
            eval_in(&registry, "$ ~ 1..<$.|", &abc()).unwrap(),
            Value::from(vec!["b", "c"])
        );
        assert_eq!(eval_in(&registry, "$ ~ 2..<2", &abc()).unwrap(), Value::List(vec![]));
    }

    #[test]
    fn test_slice_out_of_range() {
        let registry = registry_with(&[]);
        for source in ["$ ~ 2..<1", "$ ~ 0..<4", "$ ~ -1..<2"] {
            let err = eval_in(&registry, source, &abc()).unwrap_err();
            assert_eq!(err.kind, EvalErrorKind::IndexOutOfRange, "{source}");
        }
    }

    #[test]
    fn test_concat() {
        assert_eq!(
            eval_simple(r#"("a", "b") <> ("c",)"#).unwrap(),
            abc()
        );
        assert_eq!(eval_simple(r#""a" <> ("b", "c")"#).unwrap(), abc());
        assert_eq!(eval_simple(r#""a" <> "b" <> "c""#).unwrap(), abc());
        assert_eq!(eval_simple(r#"() <> ()"#).unwrap(), Value::List(vec![]));
    }

    #[test]
    fn test_concat_keeps_nested_lists() {
        let result = eval_simple(r#"(("a", "b"),) <> "c""#).unwrap();
        assert_eq!(
            result,
            Value::List(vec![Value::from(vec!["a", "b"]), Value::from("c")])
        );
    }

    #[test]
    fn test_concat_empty_is_mismatch() {
        let err = eval_simple(r#"$ <> "a""#).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::TypeMismatch);
        assert_eq!(err.span, Some(Span::new(0, 8)));
    }

    #[test]
    fn test_pipe_rebinds_implicit() {
        assert_eq!(eval_simple(r#""a" |> $ <> "b""#).unwrap(), Value::from(vec!["a", "b"]));
        assert_eq!(eval_simple(r#"("a", "b") |> $.1"#).unwrap(), Value::from("b"));
    }

    #[test]
    fn test_coalesce() {
        let registry = registry_with(&[]);
        assert_eq!(eval_simple(r#"$ ?> "default""#).unwrap(), Value::from("default"));
        assert_eq!(
            eval_in(&registry, r#"$ ?> "default""#, &Value::from("given")).unwrap(),
            Value::from("given")
        );
    }

    #[test]
    fn test_coalesce_short_circuits() {
        // The right side would fail three different ways if evaluated.
        let registry = registry_with(&[]);
        for right in [r#"missing`"x""#, "$.99", r#";Node::Element(;tag = "p")"#] {
            let source = format!(r#""present" ?> {right}"#);
            assert_eq!(
                eval_in(&registry, &source, &Value::Empty).unwrap(),
                Value::from("present"),
                "{source}"
            );
        }
    }

    #[test]
    fn test_coalesce_then_pipe_yields_literal() {
        let registry = registry_with(&[]);
        for implicit in [Value::Empty, Value::from("From GET"), abc()] {
            assert_eq!(
                eval_in(&registry, r#"$ ?> $ |> "Hello, Web!""#, &implicit).unwrap(),
                Value::from("Hello, Web!")
            );
        }
    }

    #[test]
    fn test_macro_sees_only_its_argument() {
        let registry = registry_with(&[("echo", "$"), ("wrap", r#"echo`"inner""#)]);
        assert_eq!(
            eval_in(&registry, r#""outer" |> echo`"arg""#, &Value::Empty).unwrap(),
            Value::from("arg")
        );
        // `wrap` is called with "outer" but echo only ever sees "inner".
        assert_eq!(
            eval_in(&registry, r#"wrap`"outer""#, &Value::from("caller")).unwrap(),
            Value::from("inner")
        );
        // Passing `$` explicitly is the only way to hand the caller's value in.
        assert_eq!(
            eval_in(&registry, "echo`$", &Value::from("caller")).unwrap(),
            Value::from("caller")
        );
    }

    #[test]
    fn test_same_body_different_arguments() {
        let registry = registry_with(&[("first", "$ <> \"!\""), ("second", "$ <> \"!\"")]);
        let a = eval_in(&registry, r#"first`"a""#, &Value::from("ctx-1")).unwrap();
        let b = eval_in(&registry, r#"second`"b""#, &Value::from("ctx-2")).unwrap();
        assert_eq!(a, Value::from(vec!["a", "!"]));
        assert_eq!(b, Value::from(vec!["b", "!"]));
    }

    #[test]
    fn test_unknown_macro_at_evaluation() {
        let err = eval_simple(r#"nope`"x""#).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::UnknownMacro);
        assert_eq!(err.span, Some(Span::new(0, 8)));
    }

    #[test]
    fn test_argument_error_surfaces_before_lookup() {
        let err = eval_simple(r#"nope`$.0"#).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::TypeMismatch);
    }

    #[test]
    fn test_recursion_limit() {
        let registry = registry_with(&[("forever", "forever`$")]);
        let expr = parser::parse_expr(r#"forever`"x""#).unwrap();
        let opts = EvalOptions::new().max_call_depth(16);
        let err = evaluate_with_options(&expr, Env::root(&registry), opts).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::RecursionLimit);
        assert!(err.message.contains("16"));
    }

    #[test]
    fn test_call_depth_sufficient() {
        let registry = registry_with(&[("a", "b`$"), ("b", "c`$"), ("c", "$")]);
        let expr = parser::parse_expr(r#"a`"deep""#).unwrap();
        let opts = EvalOptions::new().max_call_depth(3);
        let result = evaluate_with_options(&expr, Env::root(&registry), opts).unwrap();
        assert_eq!(result, Value::from("deep"));
    }

    #[test]
    fn test_nesting_limit_counts_through_macro_bodies() {
        // Each call to `grow` adds a chain of four concatenations on top of
        // the caller's nesting, with the recursive call innermost.
        let registry = registry_with(&[("grow", r#"grow`$ <> "a" <> "b" <> "c" <> "d""#)]);
        let expr = parser::parse_expr(r#"grow`"x""#).unwrap();
        let opts = EvalOptions::new().max_nesting_depth(40);
        let err = evaluate_with_options(&expr, Env::root(&registry), opts).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::ResourceLimit);
        assert!(err.message.contains("nested deeper than 40"));
    }

    #[test]
    fn test_nesting_limit_leaves_shallow_expressions_alone() {
        let registry = registry_with(&[]);
        let expr = parser::parse_expr(r#"("a" <> "b") |> $.0"#).unwrap();
        let opts = EvalOptions::new().max_nesting_depth(4);
        let result = evaluate_with_options(&expr, Env::root(&registry), opts).unwrap();
        assert_eq!(result, Value::from("a"));

        let opts = EvalOptions::new().max_nesting_depth(2);
        let err = evaluate_with_options(&expr, Env::root(&registry), opts).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::ResourceLimit);
    }

    #[test]
    fn test_node_evaluation_limit() {
        let registry = registry_with(&[]);
        let expr = parser::parse_expr(r#"("a", "b", "c", "d")"#).unwrap();
        let opts = EvalOptions::new().max_node_evaluations(3);
        let err = evaluate_with_options(&expr, Env::root(&registry), opts).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::ResourceLimit);
        assert!(err.message.contains("node evaluations"));

        let opts = EvalOptions::new().max_node_evaluations(5);
        assert!(evaluate_with_options(&expr, Env::root(&registry), opts).is_ok());
    }

    #[test]
    fn test_builtin_signature_checked() {
        let mut registry = registry_with(&[]);
        registry.register_builtin(
            ClosureBuiltin::new("shout", |arg| match arg {
                Value::Str(s) => Ok(Value::Str(format!("{s}!"))),
                _ => unreachable!("signature guarantees a string"),
            })
            .accepting(ValueType::Str),
        );
        assert_eq!(
            eval_in(&registry, r#"shout`"hey""#, &Value::Empty).unwrap(),
            Value::from("hey!")
        );
        let err = eval_in(&registry, r#"shout`("a",)"#, &Value::Empty).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::TypeMismatch);
        assert_eq!(err.message, "builtin `shout` expected string, got list");
    }

    #[test]
    fn test_builtin_error_gets_call_span() {
        let mut registry = registry_with(&[]);
        registry.register_builtin(ClosureBuiltin::new("fail", |_| {
            Err(EvalError::builtin_error("fail", "always"))
        }));
        let err = eval_in(&registry, r#"fail`"x""#, &Value::Empty).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::BuiltinError);
        assert_eq!(err.span, Some(Span::new(0, 8)));
    }

    #[test]
    fn test_standard_builtins() {
        assert_eq!(eval_simple(r#"join`("a" <> "b")"#).unwrap(), Value::from("ab"));
        assert_eq!(eval_simple(r#"upper`"web""#).unwrap(), Value::from("WEB"));
        assert_eq!(
            eval_simple(r#"text`"x""#).unwrap(),
            Value::Node(Node::text("x"))
        );
    }

    #[test]
    fn test_construct_element() {
        let result = eval_simple(
            r#";Node::Element(;children = (;Node::Text(;value = "hi"),), ;tag = "p")"#,
        )
        .unwrap();
        assert_eq!(
            result,
            Value::Node(Node::element("p", vec![Node::text("hi")]))
        );
    }

    #[test]
    fn test_construct_missing_children() {
        let err = eval_simple(r#";Node::Element(;tag = "p")"#).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::TypeMismatch);
        assert_eq!(err.message, "missing field `children` in `Node::Element`");
        assert_eq!(err.span, Some(Span::new(0, 26)));
    }

    #[test]
    fn test_construct_does_not_coerce_children() {
        let err = eval_simple(r#";Node::Element(;tag = "p", ;children = ("hi",))"#).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::TypeMismatch);
        assert!(err.message.contains("node at position 0"));

        // A single node is not a list either.
        let err = eval_simple(r#";Node::Element(;tag = "p", ;children = ;Text(;value = "x"))"#)
            .unwrap_err();
        assert!(err.message.contains("list of nodes"));

        // Explicit coercion through `text` works.
        assert!(eval_simple(r#";Node::Element(;tag = "p", ;children = text`("hi",))"#).is_ok());
    }

    #[test]
    fn test_construct_field_types() {
        let err = eval_simple(r#";Node::Element(;tag = ("p",), ;children = ())"#).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::TypeMismatch);
        assert!(err.message.contains("field `tag`"));

        let err = eval_simple(r#";Node::Text(;value = $)"#).unwrap_err();
        assert_eq!(err.message, "expected string for field `value`, got empty");
    }

    #[test]
    fn test_construct_unknown_variant_and_field_at_evaluation() {
        let err = eval_simple(r#";Node::Comment(;value = "x")"#).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::UnknownVariant);

        let err = eval_simple(r#";Node::Text(;value = "x", ;lang = "en")"#).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::UnknownField);
    }

    #[test]
    fn test_render_node_requires_node() {
        let registry = registry_with(&[]);
        let expr = parser::parse_expr(r#""just text""#).unwrap();
        let err = render_node(&expr, Env::root(&registry), EvalOptions::default()).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::TypeMismatch);
        assert!(err.message.starts_with("page body must produce a renderable node"));
    }
}
