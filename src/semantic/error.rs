use std::{error::Error, fmt::Display};

use crate::lexer::Span;

use super::types::Type;

/// Fatal semantic diagnostics. Unused-symbol findings are warnings and go
/// straight to the sink instead.
#[derive(Debug, Clone, PartialEq)]
pub enum SemanticError {
    UndefinedSymbol {
        name: String,
        position: Span,
    },
    UndefinedType {
        name: String,
        position: Span,
    },
    NotAType {
        name: String,
        position: Span,
    },
    Redefinition {
        name: String,
        previous: Span,
        position: Span,
    },
    DuplicateField {
        name: String,
        position: Span,
    },
    TypeMismatch {
        expected: Type,
        actual: Type,
        position: Span,
    },
    NoMatchingOverload {
        name: String,
        position: Span,
    },
    AmbiguousOverload {
        name: String,
        position: Span,
    },
    AmbiguousImport {
        name: String,
        position: Span,
    },
    NotCallable {
        position: Span,
    },
    NotAFunction {
        name: String,
        position: Span,
    },
    MustCallBuiltin {
        name: String,
        position: Span,
    },
    CannotAddressExtern {
        name: String,
        position: Span,
    },
    InvalidOperator {
        oper: String,
        ty: Type,
        position: Span,
    },
    InvalidComparison {
        ty: Type,
        position: Span,
    },
    InvalidCast {
        from: Type,
        to: Type,
        position: Span,
    },
    InvalidConstruction {
        ty: Type,
        position: Span,
    },
    CannotAccessField {
        member: String,
        ty: Type,
        position: Span,
    },
    NotSubscriptable {
        ty: Type,
        position: Span,
    },
    InvalidSubscriptIndex {
        ty: Type,
        position: Span,
    },
    NotAnLvalue {
        position: Span,
    },
    ImmutableAssign {
        position: Span,
    },
    BreakOutsideFlow {
        position: Span,
    },
    ContinueOutsideFlow {
        position: Span,
    },
    MissingReturn {
        name: String,
        position: Span,
    },
    CaseNotTerminated {
        position: Span,
    },
    MultipleDefaults {
        position: Span,
    },
    CannotDeduceType {
        name: String,
        position: Span,
    },
    CollidingFieldFunc {
        name: String,
        position: Span,
    },
    BuiltinArgument {
        name: String,
        message: String,
        position: Span,
    },
    NotAValue {
        name: String,
        position: Span,
    },
    NoMatchingCallObject {
        position: Span,
    },
    NumberOutOfRange {
        literal: String,
        ty: Type,
        position: Span,
    },
}

impl SemanticError {
    pub fn span(&self) -> Span {
        use SemanticError::*;
        match self {
            UndefinedSymbol { position, .. }
            | UndefinedType { position, .. }
            | NotAType { position, .. }
            | Redefinition { position, .. }
            | DuplicateField { position, .. }
            | TypeMismatch { position, .. }
            | NoMatchingOverload { position, .. }
            | AmbiguousOverload { position, .. }
            | AmbiguousImport { position, .. }
            | NotCallable { position }
            | NotAFunction { position, .. }
            | MustCallBuiltin { position, .. }
            | CannotAddressExtern { position, .. }
            | InvalidOperator { position, .. }
            | InvalidComparison { position, .. }
            | InvalidCast { position, .. }
            | InvalidConstruction { position, .. }
            | CannotAccessField { position, .. }
            | NotSubscriptable { position, .. }
            | InvalidSubscriptIndex { position, .. }
            | NotAnLvalue { position }
            | ImmutableAssign { position }
            | BreakOutsideFlow { position }
            | ContinueOutsideFlow { position }
            | MissingReturn { position, .. }
            | CaseNotTerminated { position }
            | MultipleDefaults { position }
            | CannotDeduceType { position, .. }
            | CollidingFieldFunc { position, .. }
            | BuiltinArgument { position, .. }
            | NotAValue { position, .. }
            | NoMatchingCallObject { position }
            | NumberOutOfRange { position, .. } => position.clone(),
        }
    }

    pub fn message(&self) -> String {
        use SemanticError::*;
        match self {
            UndefinedSymbol { name, .. } => format!("Use of undefined symbol \"{name}\""),
            UndefinedType { name, .. } => format!("Expected type name but found \"{name}\""),
            NotAType { name, .. } => format!("The name \"{name}\" does not refer to a type"),
            Redefinition { name, previous, .. } => format!(
                "Redefinition of symbol \"{name}\" previously declared at {}:{}",
                previous.start.0 + 1,
                previous.start.1 + 1
            ),
            DuplicateField { name, .. } => format!("Duplicate field \"{name}\" in struct"),
            TypeMismatch { expected, actual, .. } => {
                format!("Expected type {expected:?} but got {actual:?}")
            }
            NoMatchingOverload { name, .. } => {
                format!("No matching call to function \"{name}\"")
            }
            AmbiguousOverload { name, .. } => {
                format!("Ambiguous reference to overloaded function \"{name}\"")
            }
            AmbiguousImport { name, .. } => {
                format!("\"{name}\" is defined by more than one imported module")
            }
            NotCallable { .. } => "Calling an expression but it is not a function object".into(),
            NotAFunction { name, .. } => format!("Calling \"{name}\" but it is not a function"),
            MustCallBuiltin { name, .. } => {
                format!("Reference to builtin function \"{name}\" must be called")
            }
            CannotAddressExtern { name, .. } => {
                format!("Cannot take the address of external function \"{name}\"")
            }
            InvalidOperator { oper, ty, .. } => {
                format!("Operator {oper} cannot be applied to {ty:?}")
            }
            InvalidComparison { ty, .. } => format!("Values of type {ty:?} cannot be compared"),
            InvalidCast { from, to, .. } => format!("Cannot cast {from:?} to {to:?}"),
            InvalidConstruction { ty, .. } => {
                format!("Cannot construct {ty:?} from an initializer list")
            }
            CannotAccessField { member, ty, .. } => {
                format!("No field \"{member}\" on {ty:?}")
            }
            NotSubscriptable { ty, .. } => format!("Cannot subscript {ty:?}"),
            InvalidSubscriptIndex { ty, .. } => {
                format!("Subscript index must be sint or uint, found {ty:?}")
            }
            NotAnLvalue { .. } => "Expression is not assignable".into(),
            ImmutableAssign { .. } => "Cannot assign to an immutable value".into(),
            BreakOutsideFlow { .. } => "break must be inside a loop or switch".into(),
            ContinueOutsideFlow { .. } => "continue must be inside a loop or switch".into(),
            MissingReturn { name, .. } => {
                format!("Function \"{name}\" does not return on every path")
            }
            CaseNotTerminated { .. } => {
                "Switch case must end with break, continue, return or terminate".into()
            }
            MultipleDefaults { .. } => "Multiple default cases found in switch".into(),
            CannotDeduceType { name, .. } => {
                format!("Cannot deduce a type for \"{name}\"")
            }
            CollidingFieldFunc { name, .. } => {
                format!("Colliding function and field \"{name}\"")
            }
            BuiltinArgument { name, message, .. } => {
                format!("No matching call to builtin function \"{name}\": {message}")
            }
            NotAValue { name, .. } => {
                format!("Expected variable or function but found \"{name}\"")
            }
            NoMatchingCallObject { .. } => "No matching call to function object".into(),
            NumberOutOfRange { literal, ty, .. } => {
                format!("Number literal {literal} does not fit in {ty:?}")
            }
        }
    }
}

impl Display for SemanticError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.span().to_string(self.message()).as_str())
    }
}

impl Error for SemanticError {}

pub type SemResult<T> = Result<T, SemanticError>;
