use super::expr::Expr;
use super::span::Spanned;

/// A parsed page source: the top-level items in declaration order.
///
/// Parsing does not check uniqueness of roots, methods, or macro names.
/// That happens when the page is compiled into a
/// [`CompiledPage`](crate::CompiledPage).
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<Item>,
}

pub type Item = Spanned<ItemKind>;

#[derive(Debug, Clone)]
pub enum ItemKind {
    /// A bare expression: the response for any method without an override.
    Root(Expr),

    /// `@Method "GET" { ... }`
    Method(Block),

    /// `@Def "name" { ... }`
    Def(Block),
}

/// A named `{ ... }` body, shared by method overrides and macro definitions.
#[derive(Debug, Clone)]
pub struct Block {
    pub name: Spanned<String>,
    pub body: Expr,
}

impl Page {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn roots(&self) -> impl Iterator<Item = &Expr> {
        self.items.iter().filter_map(|item| match &item.node {
            ItemKind::Root(expr) => Some(expr),
            _ => None,
        })
    }

    pub fn methods(&self) -> impl Iterator<Item = &Block> {
        self.items.iter().filter_map(|item| match &item.node {
            ItemKind::Method(block) => Some(block),
            _ => None,
        })
    }

    pub fn defs(&self) -> impl Iterator<Item = &Block> {
        self.items.iter().filter_map(|item| match &item.node {
            ItemKind::Def(block) => Some(block),
            _ => None,
        })
    }
}
