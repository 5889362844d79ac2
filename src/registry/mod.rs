//! Macro and builtin registration for pagelang.
//!
//! The [`MacroRegistry`] maps call names to the things a `name`arg`
//! expression can invoke:
//!
//! - **Macros** declared in page source with `@Def "name" { ... }`. These
//!   are registered once when the page is compiled.
//! - **Builtins** supplied by the host. Use [`ClosureBuiltin`] for simple
//!   cases, implement [`Builtin`] directly, or generate an implementation
//!   from a plain function with the `#[builtin]` macro from
//!   `pagelang_macros`.
//!
//! After compilation the registry is read-only, so a compiled page can be
//! shared across threads and evaluated concurrently.

use std::collections::HashMap;
use std::fmt;

use log::debug;

use crate::ast::expr::Expr;
use crate::ast::span::Span;
use crate::ast::value::Value;
use crate::error::{CompileError, EvalError};

mod builtins;

pub use builtins::{JoinBuiltin, LowerBuiltin, TextBuiltin, UpperBuiltin};

// ── Trait definitions ───────────────────────────────────────────────────

/// A host-supplied callable, invoked via `name`arg` like a macro.
///
/// Builtins receive the already-evaluated argument. They must be pure:
/// the same argument always yields the same result.
pub trait Builtin: Send + Sync {
    fn call(&self, arg: Value) -> Result<Value, EvalError>;

    /// Declare this builtin's name and the argument type it accepts.
    fn signature(&self) -> BuiltinSignature;
}

#[derive(Debug, Clone)]
pub struct BuiltinSignature {
    pub name: String,
    pub param: ValueType,
}

/// Type tag used in signatures for runtime validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Str,
    List,
    Node,
    /// Accepts any value, including `Empty`.
    Any,
}

impl ValueType {
    /// Check whether a runtime [`Value`] matches this type expectation.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ValueType::Any => true,
            ValueType::Str => matches!(value, Value::Str(_)),
            ValueType::List => matches!(value, Value::List(_)),
            ValueType::Node => matches!(value, Value::Node(_)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Str => "string",
            ValueType::List => "list",
            ValueType::Node => "node",
            ValueType::Any => "any value",
        }
    }
}

// ── Macro definitions ───────────────────────────────────────────────────

/// A compiled `@Def` block. Its body sees exactly one binding: `$`, bound
/// to the call argument.
#[derive(Debug, Clone)]
pub struct MacroDef {
    pub name: String,
    pub body: Expr,
    /// Where the macro's name was declared.
    pub span: Span,
}

/// What a call name resolved to.
#[derive(Clone, Copy)]
pub enum Callable<'a> {
    Macro(&'a MacroDef),
    Builtin(&'a dyn Builtin),
}

// ── Registry ────────────────────────────────────────────────────────────

/// Stores page macros and host builtins for use during evaluation.
///
/// ```rust
/// use pagelang::{ClosureBuiltin, MacroRegistry, Value};
///
/// let mut registry = MacroRegistry::new();
/// registry.register_builtin(ClosureBuiltin::new("shout", |arg| match arg {
///     Value::Str(s) => Ok(Value::Str(format!("{s}!"))),
///     other => Ok(other),
/// }));
/// assert!(registry.contains("shout"));
/// ```
pub struct MacroRegistry {
    macros: HashMap<String, MacroDef>,
    builtins: HashMap<String, Box<dyn Builtin>>,
}

impl MacroRegistry {
    /// An empty registry: no macros, no builtins.
    pub fn new() -> Self {
        Self {
            macros: HashMap::new(),
            builtins: HashMap::new(),
        }
    }

    /// A registry preloaded with `text`, `join`, `upper`, and `lower`.
    pub fn with_standard_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_builtin(TextBuiltin);
        registry.register_builtin(JoinBuiltin);
        registry.register_builtin(UpperBuiltin);
        registry.register_builtin(LowerBuiltin);
        registry
    }

    /// Register a builtin. If a builtin with the same name already exists,
    /// it is replaced.
    pub fn register_builtin(&mut self, builtin: impl Builtin + 'static) {
        let sig = builtin.signature();
        self.builtins.insert(sig.name, Box::new(builtin));
    }

    /// Register a page macro. Fails with `DuplicateMacro` if the name is
    /// already taken by a macro or a builtin.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        body: Expr,
        span: Span,
    ) -> Result<(), CompileError> {
        let name = name.into();
        if self.contains(&name) {
            return Err(CompileError::duplicate_macro(&name, span));
        }
        debug!("registering macro `{name}`");
        self.macros
            .insert(name.clone(), MacroDef { name, body, span });
        Ok(())
    }

    /// Look up a call name. Page macros are checked before builtins.
    pub fn resolve(&self, name: &str) -> Result<Callable<'_>, EvalError> {
        if let Some(def) = self.macros.get(name) {
            return Ok(Callable::Macro(def));
        }
        match self.builtins.get(name) {
            Some(builtin) => Ok(Callable::Builtin(builtin.as_ref())),
            None => Err(EvalError::unknown_macro(name)),
        }
    }

    pub fn get_macro(&self, name: &str) -> Option<&MacroDef> {
        self.macros.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.macros.contains_key(name) || self.builtins.contains_key(name)
    }

    /// Names of page macros, sorted.
    pub fn macro_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.macros.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Names of registered builtins, sorted.
    pub fn builtin_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.builtins.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn macro_count(&self) -> usize {
        self.macros.len()
    }
}

impl Default for MacroRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MacroRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MacroRegistry")
            .field("macros", &self.macro_names())
            .field("builtins", &self.builtin_names())
            .finish()
    }
}

// ── Closure-based convenience wrapper ───────────────────────────────────

/// A [`Builtin`] implementation backed by a closure.
///
/// The closure accepts any value; it is responsible for rejecting
/// arguments it cannot handle.
///
/// ```rust
/// use pagelang::{ClosureBuiltin, Value};
///
/// let echo = ClosureBuiltin::new("echo", |arg| Ok(arg));
/// ```
pub struct ClosureBuiltin<F>
where
    F: Fn(Value) -> Result<Value, EvalError> + Send + Sync,
{
    sig: BuiltinSignature,
    func: F,
}

impl<F> ClosureBuiltin<F>
where
    F: Fn(Value) -> Result<Value, EvalError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            sig: BuiltinSignature {
                name: name.into(),
                param: ValueType::Any,
            },
            func,
        }
    }

    /// Restrict the accepted argument type. The evaluator checks it before
    /// the closure runs.
    pub fn accepting(mut self, param: ValueType) -> Self {
        self.sig.param = param;
        self
    }
}

impl<F> Builtin for ClosureBuiltin<F>
where
    F: Fn(Value) -> Result<Value, EvalError> + Send + Sync,
{
    fn call(&self, arg: Value) -> Result<Value, EvalError> {
        (self.func)(arg)
    }

    fn signature(&self) -> BuiltinSignature {
        self.sig.clone()
    }
}
