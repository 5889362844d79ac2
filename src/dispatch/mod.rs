//! Method dispatch: choosing which expression answers a request.
//!
//! A [`DispatchTable`] holds at most one root expression and at most one
//! override per method name. Method names match exactly, including case;
//! the transport layer is expected to pass the request method through
//! unmodified.

use std::collections::HashMap;

use log::debug;

use crate::ast::expr::Expr;
use crate::ast::span::Span;
use crate::error::{CompileError, EvalError};

#[derive(Debug, Clone, Default)]
pub struct DispatchTable {
    root: Option<Expr>,
    methods: HashMap<String, MethodEntry>,
}

#[derive(Debug, Clone)]
struct MethodEntry {
    body: Expr,
    span: Span,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the root expression. A second root is a `DuplicateRoot`
    /// error; `span` should point at the offending item.
    pub fn set_root(&mut self, body: Expr, span: Span) -> Result<(), CompileError> {
        if self.root.is_some() {
            return Err(CompileError::duplicate_root(span));
        }
        self.root = Some(body);
        Ok(())
    }

    /// Install the override for `method`. Fails with `DuplicateMethod` if
    /// that exact method name already has one.
    pub fn insert_method(
        &mut self,
        method: impl Into<String>,
        body: Expr,
        span: Span,
    ) -> Result<(), CompileError> {
        let method = method.into();
        if self.methods.contains_key(&method) {
            return Err(CompileError::duplicate_method(&method, span));
        }
        debug!("registering response for method \"{method}\"");
        self.methods.insert(method, MethodEntry { body, span });
        Ok(())
    }

    /// The expression that answers `method`: its override if declared,
    /// otherwise the root expression.
    pub fn dispatch(&self, method: &str) -> Result<&Expr, EvalError> {
        if let Some(entry) = self.methods.get(method) {
            return Ok(&entry.body);
        }
        match &self.root {
            Some(root) => {
                debug!("no override for method \"{method}\", using root expression");
                Ok(root)
            }
            None => Err(EvalError::no_default_response(method)),
        }
    }

    pub fn root(&self) -> Option<&Expr> {
        self.root.as_ref()
    }

    pub fn has_method(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    /// Where the override for `method` was declared.
    pub fn method_span(&self, method: &str) -> Option<Span> {
        self.methods.get(method).map(|entry| entry.span)
    }

    /// Declared method names, sorted.
    pub fn methods(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none() && self.methods.is_empty()
    }
}
