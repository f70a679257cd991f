//! Resolved symbols. Symbols are owned by the scope they are declared in
//! and shared into the AST through [`SymbolRef`] handles.

use std::{cell::RefCell, rc::Rc};

use crate::lexer::Span;

use super::types::{ExprType, Type};

pub type SymbolRef = Rc<RefCell<Symbol>>;

/// Identity of an object (variable, parameter or local) across analysis and
/// code generation. Ids are unique within one compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub usize);

#[derive(Debug)]
pub struct Symbol {
    pub name: String,
    pub module: String,
    pub position: Span,
    /// Cleared symbols produce unused-symbol warnings when their scope ends.
    pub referenced: bool,
    pub kind: SymbolKind,
}

#[derive(Debug)]
pub enum SymbolKind {
    Object(ObjectSymbol),
    Func(FuncSymbol),
    Lambda(LambdaSymbol),
    TypeAlias(AliasSymbol),
    BuiltinFunc(BuiltinFunc),
}

#[derive(Debug)]
pub struct ObjectSymbol {
    pub id: ObjectId,
    pub etype: ExprType,
    pub is_param: bool,
}

#[derive(Debug)]
pub struct FuncSymbol {
    pub receiver: Option<ExprType>,
    pub params: Vec<ExprType>,
    pub ret: Type,
    pub external: bool,
    /// Name of the generated function. External functions keep their source
    /// name so the host can look them up.
    pub mangled: String,
}

impl FuncSymbol {
    pub fn func_type(&self) -> Type {
        use crate::parser::ast::ParamRef;
        use super::types::Binding;
        Type::Func {
            params: self
                .params
                .iter()
                .map(|p| {
                    let mode = if p.binding == Binding::Reference {
                        ParamRef::Ref
                    } else {
                        ParamRef::Val
                    };
                    (mode, p.ty.clone())
                })
                .collect(),
            ret: Box::new(self.ret.clone()),
        }
    }
}

/// An anonymous function symbol owning the closure's capture list.
#[derive(Debug, Default)]
pub struct LambdaSymbol {
    pub lambda_id: usize,
    pub captures: Vec<Capture>,
}

/// One capture slot. `parent_index` is set when the captured object is
/// itself a capture of the enclosing closure; code generation then copies
/// the slot out of the parent environment instead of reading the source
/// object.
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    pub ty: Type,
    pub object: ObjectId,
    pub parent_index: Option<u32>,
}

#[derive(Debug)]
pub struct AliasSymbol {
    pub strong: bool,
    pub ty: Type,
}

/// The builtin generic functions; the only parametric operations in the
/// language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinFunc {
    Capacity,
    Size,
    Data,
    PushBack,
    Append,
    PopBack,
    Resize,
    Reserve,
}

impl BuiltinFunc {
    pub fn name(self) -> &'static str {
        match self {
            BuiltinFunc::Capacity => "capacity",
            BuiltinFunc::Size => "size",
            BuiltinFunc::Data => "data",
            BuiltinFunc::PushBack => "push_back",
            BuiltinFunc::Append => "append",
            BuiltinFunc::PopBack => "pop_back",
            BuiltinFunc::Resize => "resize",
            BuiltinFunc::Reserve => "reserve",
        }
    }
}

/// What an identifier resolved to.
#[derive(Debug, Clone)]
pub enum Definition {
    Object(ObjectId),
    Func(SymbolRef),
}

/// What a call expression resolved to.
#[derive(Debug, Clone)]
pub enum CallTarget {
    Func(SymbolRef),
    Builtin(BuiltinFunc),
    /// Call through a function-typed value.
    Indirect,
}

pub fn make_symbol(
    name: impl ToString,
    module: impl ToString,
    position: Span,
    kind: SymbolKind,
) -> SymbolRef {
    Rc::new(RefCell::new(Symbol {
        name: name.to_string(),
        module: module.to_string(),
        position,
        referenced: false,
        kind,
    }))
}
