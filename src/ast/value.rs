use std::fmt;

use super::node::Node;

/// The set of runtime value types.
///
/// Values are immutable and compared structurally. `Empty` marks the absence
/// of a value: it is what `$` holds at the start of a root or method
/// expression, and what `?>` tests for.
///
/// Conversion from common Rust types is provided via `From` impls:
///
/// ```rust
/// use pagelang::{Node, Value};
///
/// let s: Value = "hello".into();
/// let l: Value = vec!["a", "b"].into();
/// let n: Value = Node::text("hi").into();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Value {
    Str(String),
    List(Vec<Value>),
    Node(Node),
    #[default]
    Empty,
}

impl Value {
    /// Type name for diagnostic messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Node(_) => "node",
            Value::Empty => "empty",
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Empty)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_list(self) -> Option<Vec<Value>> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn into_node(self) -> Option<Node> {
        match self {
            Value::Node(n) => Some(n),
            _ => None,
        }
    }

    /// Interpret a string value as an integer index operand. Integer
    /// literals and `.|` results are strings of decimal digits.
    pub fn as_index(&self) -> Option<i64> {
        self.as_str().and_then(|s| s.parse().ok())
    }
}

/// Compact debug-style rendering for log lines and error messages. This is
/// not markup; serializing a render tree is the host's job.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s:?}"),
            Value::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Value::Node(Node::Element { tag, children }) => {
                write!(f, "<{tag}> with {} children", children.len())
            }
            Value::Node(Node::Text { value }) => write!(f, "text {value:?}"),
            Value::Empty => write!(f, "empty"),
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Str(n.to_string())
    }
}

impl From<Node> for Value {
    fn from(n: Node) -> Self {
        Value::Node(n)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Empty)
    }
}
