//! # pagelang
//!
//! A small declarative language for describing web pages. A page source
//! holds a root expression, per-method overrides, and reusable macros:
//!
//! ```text
//! make_page`"From Root"
//!
//! @Method "GET"  { make_page`"From GET" }
//!
//! @Def "make_page" {
//!     ;Node::Element(;tag = "body", ;children = (;Node::Text(;value = $),))
//! }
//! ```
//!
//! Loading a page parses it and compiles it into a [`MacroRegistry`] and a
//! [`DispatchTable`]. Answering a request picks the expression for the
//! request method and evaluates it into a render tree of [`Node`]s.
//!
//! The crate stops at the render tree. Serving HTTP, serializing HTML, and
//! logger installation are left to the host.
//!
//! ## Quick start
//!
//! ```rust
//! use pagelang::{render, Node};
//!
//! let page = r#"
//!     ;Node::Element(;tag = "h1", ;children = (;Node::Text(;value = "Hi"),))
//! "#;
//! let tree = render(page, "GET").unwrap();
//! assert_eq!(tree, Node::element("h1", vec![Node::text("Hi")]));
//! ```
//!
//! ## Compiled pages
//!
//! For repeated requests, compile once with [`CompiledPage::compile`] and
//! call [`CompiledPage::evaluate`] per request. A compiled page is
//! read-only and can be shared across threads.
//!
//! ```rust
//! use pagelang::{CompiledPage, Node};
//!
//! let page = CompiledPage::compile(r#"
//!     greet`"root"
//!     @Method "POST" { greet`"post" }
//!     @Def "greet" { ;Node::Text(;value = $) }
//! "#).unwrap();
//!
//! assert_eq!(page.evaluate("POST").unwrap(), Node::text("post"));
//! assert_eq!(page.evaluate("GET").unwrap(), Node::text("root"));
//! assert_eq!(page.methods(), vec!["POST"]);
//! ```
//!
//! ## Host builtins
//!
//! Builtins are called like macros. Register them on a [`MacroRegistry`]
//! and compile against it with [`CompiledPage::compile_with`]:
//!
//! ```rust
//! use pagelang::{ClosureBuiltin, CompiledPage, MacroRegistry, Node, Value, ValueType};
//!
//! let mut registry = MacroRegistry::with_standard_builtins();
//! registry.register_builtin(
//!     ClosureBuiltin::new("exclaim", |arg| match arg {
//!         Value::Str(s) => Ok(Value::Str(format!("{s}!"))),
//!         other => Ok(other),
//!     })
//!     .accepting(ValueType::Str),
//! );
//!
//! let page = CompiledPage::compile_with(
//!     r#";Node::Text(;value = exclaim`"hello")"#,
//!     registry,
//! ).unwrap();
//! assert_eq!(page.evaluate("GET").unwrap(), Node::text("hello!"));
//! ```

// Lets `#[builtin]` expansions inside this crate name `pagelang::...`.
extern crate self as pagelang;

pub mod ast;
pub mod compile;
pub mod dispatch;
pub mod error;
pub mod eval;
mod parser;
pub mod registry;

use std::fmt;

use log::{info, warn};

pub use ast::node::{Node, Variant};
pub use ast::page::Page;
pub use ast::span::{Span, Spanned};
pub use ast::value::Value;
pub use dispatch::DispatchTable;
pub use error::{CompileError, CompileErrorKind, EvalError, EvalErrorKind, ParseError};
pub use eval::{
    DEFAULT_MAX_CALL_DEPTH, DEFAULT_MAX_NESTING_DEPTH, Env, EvalOptions, evaluate,
    evaluate_with_options,
};
pub use parser::{MAX_NESTING_DEPTH, parse, parse_expr};
pub use registry::{Builtin, BuiltinSignature, ClosureBuiltin, MacroRegistry, ValueType};

/// Parse, compile, and answer one request in a single step.
///
/// For repeated requests against the same source, prefer [`CompiledPage`]
/// to avoid recompiling.
pub fn render(source: &str, method: &str) -> Result<Node, RenderError> {
    let page = CompiledPage::compile(source)?;
    page.evaluate(method).map_err(RenderError::Eval)
}

// ── Errors ──────────────────────────────────────────────────────────────

/// Why a page source could not be loaded. Either variant means the page is
/// unusable; no partial dispatch table is produced.
#[derive(Debug)]
pub enum LoadError {
    /// One or more syntax errors.
    Parse(Vec<ParseError>),
    /// The page parsed but failed compilation.
    Compile(Vec<CompileError>),
}

impl LoadError {
    /// Render every error against the page source.
    pub fn format_with_source(&self, source: &str, entry_name: Option<&str>) -> String {
        let rendered: Vec<String> = match self {
            LoadError::Parse(errors) => errors
                .iter()
                .map(|e| e.format_with_source(source, entry_name))
                .collect(),
            LoadError::Compile(errors) => errors
                .iter()
                .map(|e| e.format_with_source(source, entry_name))
                .collect(),
        };
        rendered.join("\n\n")
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Parse(errors) => {
                for e in errors {
                    writeln!(f, "{e}")?;
                }
                Ok(())
            }
            LoadError::Compile(errors) => {
                for e in errors {
                    writeln!(f, "{e}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for LoadError {}

/// Combined error type returned by [`render`].
#[derive(Debug)]
pub enum RenderError {
    Load(LoadError),
    Eval(EvalError),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Load(e) => write!(f, "{e}"),
            RenderError::Eval(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Load(e) => Some(e),
            RenderError::Eval(e) => Some(e),
        }
    }
}

impl From<LoadError> for RenderError {
    fn from(e: LoadError) -> Self {
        RenderError::Load(e)
    }
}

// ── Compiled pages ──────────────────────────────────────────────────────

/// A loaded page: its AST, the macro registry, and the dispatch table.
///
/// Immutable after construction. Every request evaluates against the same
/// shared instance with its own per-request state.
#[derive(Debug)]
pub struct CompiledPage {
    page: Page,
    registry: MacroRegistry,
    dispatch: DispatchTable,
}

impl CompiledPage {
    /// Load a page with the standard builtins available.
    pub fn compile(source: &str) -> Result<Self, LoadError> {
        Self::compile_with(source, MacroRegistry::with_standard_builtins())
    }

    /// Load a page on top of a host-prepared registry. Page macros are added
    /// to it; a macro may not reuse a builtin's name.
    pub fn compile_with(source: &str, registry: MacroRegistry) -> Result<Self, LoadError> {
        let page = parser::parse(source).map_err(LoadError::Parse)?;
        let (registry, dispatch) = compile::compile(&page, registry).map_err(LoadError::Compile)?;

        if dispatch.is_empty() {
            warn!("page has no root expression and no method overrides; every request will fail");
        }
        info!(
            "compiled page: {} macro(s), {} method override(s), root {}",
            registry.macro_count(),
            dispatch.methods().len(),
            if dispatch.root().is_some() { "present" } else { "absent" },
        );

        Ok(Self {
            page,
            registry,
            dispatch,
        })
    }

    /// Answer a request for `method` with default limits.
    pub fn evaluate(&self, method: &str) -> Result<Node, EvalError> {
        self.evaluate_with_options(method, EvalOptions::default())
    }

    /// Answer a request for `method` with custom limits.
    pub fn evaluate_with_options(
        &self,
        method: &str,
        options: EvalOptions,
    ) -> Result<Node, EvalError> {
        let body = self.dispatch.dispatch(method)?;
        eval::render_node(body, Env::root(&self.registry), options)
    }

    pub fn registry(&self) -> &MacroRegistry {
        &self.registry
    }

    pub fn dispatch_table(&self) -> &DispatchTable {
        &self.dispatch
    }

    /// Methods with an explicit override, sorted.
    pub fn methods(&self) -> Vec<&str> {
        self.dispatch.methods()
    }

    /// The parsed page, for inspection or tooling.
    pub fn ast(&self) -> &Page {
        &self.page
    }
}

/// A parsed expression that can be evaluated repeatedly with different
/// values bound to `$`.
///
/// Unlike a page body, a standalone expression is not checked for unknown
/// macros up front; those surface when evaluated.
///
/// ```rust
/// use pagelang::{CompiledExpr, MacroRegistry, Value};
///
/// let expr = CompiledExpr::compile("$.0 ?> \"none\"").unwrap();
/// let registry = MacroRegistry::new();
///
/// let list = Value::from(vec!["first"]);
/// assert_eq!(expr.evaluate(&registry, &list).unwrap(), Value::from("first"));
/// ```
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    expr: ast::Expr,
}

impl CompiledExpr {
    pub fn compile(source: &str) -> Result<Self, Vec<ParseError>> {
        let expr = parse_expr(source)?;
        Ok(Self { expr })
    }

    /// Evaluate with `$` bound to `implicit`.
    pub fn evaluate(&self, registry: &MacroRegistry, implicit: &Value) -> Result<Value, EvalError> {
        evaluate(&self.expr, Env::new(registry, implicit))
    }

    pub fn ast(&self) -> &ast::Expr {
        &self.expr
    }
}
