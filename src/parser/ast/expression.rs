use crate::lexer::Span;
use crate::semantic::{CallTarget, Capture, Definition};

use super::{Block, Param, TypeName};

/// Binary operator. Equality and order apply to any comparable type, the
/// rest only to builtin categories (see `semantic::builtins`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum BinOp {
    BoolOr,
    BoolAnd,
    BitOr,
    BitXor,
    BitAnd,
    BitShl,
    BitShr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum UnOp {
    Neg,
    BoolNot,
    BitNot,
}

#[derive(Debug, Clone)]
pub enum Expression<T> {
    Binary(Binary<T>),
    Unary(Unary<T>),
    Call(Call<T>),
    Member(Member<T>),
    Subscript(Subscript<T>),
    Id(Id<T>),
    Ternary(Ternary<T>),
    Make(Make<T>),
    Literal(Literal<T>),
}

impl<T> Expression<T> {
    pub fn position(&self) -> Span {
        match self {
            Expression::Binary(node) => node.position.clone(),
            Expression::Unary(node) => node.position.clone(),
            Expression::Call(node) => node.position.clone(),
            Expression::Member(node) => node.position.clone(),
            Expression::Subscript(node) => node.position.clone(),
            Expression::Id(node) => node.position.clone(),
            Expression::Ternary(node) => node.position.clone(),
            Expression::Make(node) => node.position.clone(),
            Expression::Literal(node) => node.position(),
        }
    }

    pub fn info(&self) -> &T {
        match self {
            Expression::Binary(node) => &node.info,
            Expression::Unary(node) => &node.info,
            Expression::Call(node) => &node.info,
            Expression::Member(node) => &node.info,
            Expression::Subscript(node) => &node.info,
            Expression::Id(node) => &node.info,
            Expression::Ternary(node) => &node.info,
            Expression::Make(node) => &node.info,
            Expression::Literal(node) => node.info(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Binary<T> {
    pub lhs: Box<Expression<T>>,
    pub oper: BinOp,
    pub rhs: Box<Expression<T>>,
    pub position: Span,
    pub info: T,
}

#[derive(Debug, Clone)]
pub struct Unary<T> {
    pub oper: UnOp,
    pub expr: Box<Expression<T>>,
    pub position: Span,
    pub info: T,
}

/// A call expression. `target` is resolved during analysis: a user function,
/// a builtin, or an indirect call through a function-typed value.
#[derive(Debug, Clone)]
pub struct Call<T> {
    pub callee: Box<Expression<T>>,
    pub args: Vec<Expression<T>>,
    pub target: Option<CallTarget>,
    pub position: Span,
    pub info: T,
}

/// Member access `object.name`. `index` is the resolved field index.
#[derive(Debug, Clone)]
pub struct Member<T> {
    pub object: Box<Expression<T>>,
    pub member: String,
    pub index: Option<u32>,
    pub position: Span,
    pub info: T,
}

#[derive(Debug, Clone)]
pub struct Subscript<T> {
    pub object: Box<Expression<T>>,
    pub index: Box<Expression<T>>,
    pub position: Span,
    pub info: T,
}

/// Identifier reference. `definition` is filled in by name resolution;
/// `capture_index` is set when the identifier refers to a captured variable
/// inside a closure.
#[derive(Debug, Clone)]
pub struct Id<T> {
    pub name: String,
    pub definition: Option<Definition>,
    pub capture_index: Option<u32>,
    pub position: Span,
    pub info: T,
}

#[derive(Debug, Clone)]
pub struct Ternary<T> {
    pub cond: Box<Expression<T>>,
    pub troo: Box<Expression<T>>,
    pub fols: Box<Expression<T>>,
    pub position: Span,
    pub info: T,
}

/// `make T expr` — cast between builtins or construction of an aggregate.
#[derive(Debug, Clone)]
pub struct Make<T> {
    pub ty: TypeName,
    pub expr: Box<Expression<T>>,
    pub cast: bool,
    pub position: Span,
    pub info: T,
}

#[derive(Debug, Clone)]
pub enum Literal<T> {
    String(StringLit<T>),
    Char(CharLit<T>),
    Number(NumberLit<T>),
    Bool(BoolLit<T>),
    Array(ArrayLit<T>),
    InitList(InitList<T>),
    Lambda(Lambda<T>),
}

impl<T> Literal<T> {
    pub fn position(&self) -> Span {
        match self {
            Literal::String(node) => node.position.clone(),
            Literal::Char(node) => node.position.clone(),
            Literal::Number(node) => node.position.clone(),
            Literal::Bool(node) => node.position.clone(),
            Literal::Array(node) => node.position.clone(),
            Literal::InitList(node) => node.position.clone(),
            Literal::Lambda(node) => node.position.clone(),
        }
    }

    pub fn info(&self) -> &T {
        match self {
            Literal::String(node) => &node.info,
            Literal::Char(node) => &node.info,
            Literal::Number(node) => &node.info,
            Literal::Bool(node) => &node.info,
            Literal::Array(node) => &node.info,
            Literal::InitList(node) => &node.info,
            Literal::Lambda(node) => &node.info,
        }
    }
}

/// String literal; `value` has escapes processed, type is `[char]`.
#[derive(Debug, Clone)]
pub struct StringLit<T> {
    pub value: String,
    pub position: Span,
    pub info: T,
}

#[derive(Debug, Clone)]
pub struct CharLit<T> {
    pub value: u8,
    pub position: Span,
    pub info: T,
}

/// Numeric literal, kept as parsed. The semantic pass interprets it against
/// the expected context type.
#[derive(Debug, Clone, PartialEq)]
pub enum NumberValue {
    /// No suffix, no decimal point: adapts to the context type.
    Int(i64),
    /// `u` suffix.
    Uint(u64),
    /// Decimal point or exponent.
    Real(f64),
}

#[derive(Debug, Clone)]
pub struct NumberLit<T> {
    pub literal: String,
    pub value: NumberValue,
    pub position: Span,
    pub info: T,
}

#[derive(Debug, Clone)]
pub struct BoolLit<T> {
    pub value: bool,
    pub position: Span,
    pub info: T,
}

#[derive(Debug, Clone)]
pub struct ArrayLit<T> {
    pub exprs: Vec<Expression<T>>,
    pub position: Span,
    pub info: T,
}

/// Brace initializer list; only valid as the operand of `make`.
#[derive(Debug, Clone)]
pub struct InitList<T> {
    pub exprs: Vec<Expression<T>>,
    pub position: Span,
    pub info: T,
}

/// Lambda literal `func (params) [-> ret] { body }`. Captures are recorded
/// by the analyzer in evaluation order; `lambda_id` is unique within a
/// compilation and names the generated implementation function.
#[derive(Debug, Clone)]
pub struct Lambda<T> {
    pub params: Vec<Param>,
    pub ret: Option<TypeName>,
    pub body: Block<T>,
    pub captures: Vec<Capture>,
    pub lambda_id: usize,
    pub position: Span,
    pub info: T,
}
