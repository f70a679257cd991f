use crate::lexer::Span;
use crate::semantic::ObjectId;

use super::{Call, Expression, TypeAliasDecl, VarDecl};

/// Compound assignment operator, `a ⊕= b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum AssignOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitOr,
    BitXor,
    BitAnd,
    BitShl,
    BitShr,
}

#[derive(Debug, Clone)]
pub enum Statement<T> {
    Block(Block<T>),
    If(If<T>),
    Switch(Switch<T>),
    Return(Return<T>),
    While(While<T>),
    For(For<T>),
    Break(Span),
    Continue(Span),
    Terminate(Span),
    Asgn(Asgn<T>),
    Var(VarDecl<T>),
    Type(TypeAliasDecl),
    Empty(Span),
}

#[derive(Debug, Clone)]
pub struct Block<T> {
    pub stats: Vec<Statement<T>>,
    pub position: Span,
}

#[derive(Debug, Clone)]
pub struct If<T> {
    pub cond: Expression<T>,
    pub body: Box<Statement<T>>,
    pub else_body: Option<Box<Statement<T>>>,
    pub position: Span,
}

/// `switch (expr) { case (expr) stat ... default stat }`. `continue` in a
/// case falls through to the next case, `break` leaves the switch, and every
/// case must end in one of break/continue/return/terminate.
#[derive(Debug, Clone)]
pub struct Switch<T> {
    pub expr: Expression<T>,
    pub cases: Vec<SwitchCase<T>>,
    pub always_returns: bool,
    pub position: Span,
}

#[derive(Debug, Clone)]
pub struct SwitchCase<T> {
    /// `None` for the `default` case.
    pub expr: Option<Expression<T>>,
    pub body: Box<Statement<T>>,
    pub position: Span,
}

#[derive(Debug, Clone)]
pub struct Return<T> {
    pub expr: Option<Expression<T>>,
    pub position: Span,
}

#[derive(Debug, Clone)]
pub struct While<T> {
    pub cond: Expression<T>,
    pub body: Box<Statement<T>>,
    pub position: Span,
}

#[derive(Debug, Clone)]
pub struct For<T> {
    pub init: Option<Box<Asgn<T>>>,
    pub cond: Expression<T>,
    pub incr: Option<Box<Asgn<T>>>,
    pub body: Box<Statement<T>>,
    pub position: Span,
}

/// Assignment forms; a sub-category of statements.
#[derive(Debug, Clone)]
pub enum Asgn<T> {
    /// `a = b`
    Assign {
        dst: Expression<T>,
        src: Expression<T>,
        position: Span,
    },
    /// `a ⊕= b`
    Compound {
        dst: Expression<T>,
        oper: AssignOp,
        src: Expression<T>,
        position: Span,
    },
    /// `a++` / `a--`
    IncrDecr {
        expr: Expression<T>,
        incr: bool,
        position: Span,
    },
    /// `name := expr`, introducing a new local
    DeclAssign {
        name: String,
        expr: Expression<T>,
        object: Option<ObjectId>,
        position: Span,
    },
    /// a bare call used as a statement
    Call(Call<T>),
}

impl<T> Asgn<T> {
    pub fn position(&self) -> Span {
        match self {
            Asgn::Assign { position, .. }
            | Asgn::Compound { position, .. }
            | Asgn::IncrDecr { position, .. }
            | Asgn::DeclAssign { position, .. } => position.clone(),
            Asgn::Call(call) => call.position.clone(),
        }
    }
}
