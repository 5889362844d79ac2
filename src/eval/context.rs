use crate::ast::value::Value;
use crate::registry::MacroRegistry;

static ABSENT: Value = Value::Empty;

/// The environment an expression is evaluated in: the current value of
/// `$` and the registry that call names resolve against.
///
/// An `Env` is a pair of borrows and is freely copied. Only pipes and
/// macro calls produce a new one, each with `$` rebound. Nothing else
/// from the caller is visible inside a macro body.
///
/// ```rust
/// use pagelang::{Env, MacroRegistry, Value};
///
/// let registry = MacroRegistry::new();
/// let env = Env::root(&registry);
/// assert_eq!(env.implicit(), &Value::Empty);
///
/// let arg = Value::from("From GET");
/// assert_eq!(env.rebind(&arg).implicit(), &arg);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Env<'a> {
    implicit: &'a Value,
    registry: &'a MacroRegistry,
}

impl<'a> Env<'a> {
    pub fn new(registry: &'a MacroRegistry, implicit: &'a Value) -> Self {
        Self { implicit, registry }
    }

    /// The environment root and method expressions start in: `$` is
    /// `Empty`.
    pub fn root(registry: &'a MacroRegistry) -> Self {
        Self::new(registry, &ABSENT)
    }

    pub fn implicit(&self) -> &'a Value {
        self.implicit
    }

    pub fn registry(&self) -> &'a MacroRegistry {
        self.registry
    }

    /// Same registry, `$` bound to `value`.
    pub fn rebind<'b>(&self, value: &'b Value) -> Env<'b>
    where
        'a: 'b,
    {
        Env {
            implicit: value,
            registry: self.registry,
        }
    }
}
