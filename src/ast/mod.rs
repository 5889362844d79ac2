//! Abstract syntax tree and runtime data types for pagelang.
//!
//! - **Page layer** ([`page`]): the top-level items of one source unit
//!   (root expression, `@Method` overrides, `@Def` macros).
//! - **Expression layer** ([`expr`]): the side-effect-free expressions that
//!   make up every item body.
//! - **Runtime layer** ([`value`], [`node`]): what expressions evaluate to,
//!   including the render tree a page ultimately produces.

pub mod expr;
pub mod node;
pub mod page;
pub mod span;
pub mod value;

// Convenience re-exports
pub use expr::*;
pub use node::{Node, Variant};
pub use page::*;
pub use span::{Span, Spanned};
pub use value::Value;
