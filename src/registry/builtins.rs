//! The standard builtins installed by
//! [`MacroRegistry::with_standard_builtins`](super::MacroRegistry::with_standard_builtins).

use pagelang_macros::builtin;

use crate::ast::node::Node;
use crate::ast::value::Value;
use crate::error::EvalError;

/// Coerce strings to text nodes. Construct expressions never do this on
/// their own; a page opts in by wrapping children in `text`.
#[builtin(name = "text")]
pub fn text(value: Value) -> Result<Value, EvalError> {
    match value {
        Value::List(items) => items
            .into_iter()
            .map(|item| to_text_node(item).map(Value::Node))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        other => to_text_node(other).map(Value::Node),
    }
}

fn to_text_node(value: Value) -> Result<Node, EvalError> {
    match value {
        Value::Str(s) => Ok(Node::text(s)),
        Value::Node(n) => Ok(n),
        other => Err(EvalError::type_mismatch(
            "string or node",
            other.type_name(),
        )),
    }
}

#[builtin(name = "join")]
pub fn join(items: Vec<Value>) -> Result<Value, EvalError> {
    let mut out = String::new();
    for item in &items {
        match item {
            Value::Str(s) => out.push_str(s),
            other => {
                return Err(EvalError::type_mismatch(
                    "list of strings",
                    &format!("list containing {}", other.type_name()),
                ));
            }
        }
    }
    Ok(Value::Str(out))
}

#[builtin(name = "upper")]
pub fn upper(text: String) -> Result<Value, EvalError> {
    Ok(Value::Str(text.to_uppercase()))
}

#[builtin(name = "lower")]
pub fn lower(text: String) -> Result<Value, EvalError> {
    Ok(Value::Str(text.to_lowercase()))
}
