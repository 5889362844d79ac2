use std::fmt;

use super::span::Spanned;

pub type Expr = Spanned<ExprKind>;

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// String literal: "hello". Integer literals (`0`, `-1`) are kept as
    /// their digit string.
    Literal(String),

    /// The current pipeline value: `$`
    Implicit,

    /// List literal: `()`, `(a,)`, `(a, b)`
    List(Vec<Expr>),

    /// Element access: `base.0`, `base.(expr)`
    Index { base: Box<Expr>, index: Box<Expr> },

    /// Element count: `base.|`
    Length(Box<Expr>),

    /// Half-open sub-list: `base ~ lo..<hi`
    Slice {
        base: Box<Expr>,
        lo: Box<Expr>,
        hi: Box<Expr>,
    },

    /// Infix operation: `a <> b`, `a |> b`, `a ?> b`
    BinaryOp {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },

    /// Macro or builtin call: name`arg
    Call(MacroCall),

    /// Tagged render-tree construction: `;Node::Element(;tag = "p", ;children = ())`
    Construct(Construct),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacroCall {
    pub name: String,
    pub arg: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Construct {
    /// Variant name as written, without the optional `Node::` prefix.
    pub variant: Spanned<String>,
    /// `Some("Node")` when written as `;Node::Variant`. Any other prefix
    /// names no known variant.
    pub qualifier: Option<String>,
    pub fields: Vec<FieldInit>,
}

impl Construct {
    pub fn field(&self, name: &str) -> Option<&FieldInit> {
        self.fields.iter().find(|f| f.name.node == name)
    }

    /// The variant path exactly as it appeared in source.
    pub fn path(&self) -> String {
        match &self.qualifier {
            Some(q) => format!("{q}::{}", self.variant.node),
            None => self.variant.node.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldInit {
    pub name: Spanned<String>,
    pub value: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `<>`
    Concat,
    /// `|>`
    Pipe,
    /// `?>`
    Coalesce,
}

impl BinOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Concat => "<>",
            BinOp::Pipe => "|>",
            BinOp::Coalesce => "?>",
        }
    }
}

/// Renders the expression back into source syntax, fully parenthesizing
/// infix operations. Used in diagnostics and debug logging.
impl fmt::Display for ExprKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprKind::Literal(s) => {
                if is_integer_literal(s) {
                    write!(f, "{s}")
                } else {
                    write!(f, "{s:?}")
                }
            }
            ExprKind::Implicit => write!(f, "$"),
            ExprKind::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item.node)?;
                }
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            ExprKind::Index { base, index } => match &index.node {
                ExprKind::Literal(s) if is_integer_literal(s) && !s.starts_with('-') => {
                    write!(f, "{}.{s}", base.node)
                }
                other => write!(f, "{}.({other})", base.node),
            },
            ExprKind::Length(base) => write!(f, "{}.|", base.node),
            ExprKind::Slice { base, lo, hi } => {
                write!(f, "{} ~ {}..<{}", base.node, lo.node, hi.node)
            }
            ExprKind::BinaryOp { left, op, right } => {
                write!(f, "({} {} {})", left.node, op.symbol(), right.node)
            }
            ExprKind::Call(call) => write!(f, "{}`{}", call.name, call.arg.node),
            ExprKind::Construct(c) => {
                write!(f, ";{}(", c.path())?;
                for (i, field) in c.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, ";{} = {}", field.name.node, field.value.node)?;
                }
                write!(f, ")")
            }
        }
    }
}

pub(crate) fn is_integer_literal(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}
