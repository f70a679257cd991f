//! AST for STELA modules.
//!
//! Every node category is a tagged enum rather than a class hierarchy, and
//! every node records the [`Span`] it was parsed from. The tree is generic
//! over an `info` parameter: the parser produces `Module<()>`, the semantic
//! analyzer rebuilds it as `Module<TypeInfo>` with every expression carrying
//! its resolved [`crate::semantic::ExprType`] and identifiers, calls and
//! lambdas carrying resolved back references.

mod declaration;
mod expression;
mod statement;
mod types;

pub use declaration::*;
pub use expression::*;
pub use statement::*;
pub use types::*;

use crate::lexer::Span;

/// One parsed source file.
#[derive(Debug, Clone)]
pub struct Module<T> {
    pub name: String,
    pub name_position: Span,
    pub imports: Vec<(String, Span)>,
    pub decls: Vec<Declaration<T>>,
}

impl<T> Module<T> {
    pub fn imports(&self) -> impl Iterator<Item = &str> {
        self.imports.iter().map(|(name, _)| name.as_str())
    }
}
