//! The builtin environment: primitive type aliases, the builtin generic
//! array functions, and the operator category rules.

use std::rc::Rc;

use crate::lexer::Span;
use crate::parser::ast::{BinOp, UnOp, AssignOp};

use super::error::{SemResult, SemanticError};
use super::scope::{Scope, ScopeKind, ScopeRef};
use super::symbols::{make_symbol, AliasSymbol, BuiltinFunc, SymbolKind};
use super::types::{callable, Binding, ExprType, Mutability, Type, UserType};

/// Host-registered additions to the builtin namespace.
#[derive(Default)]
pub struct BuiltinEnv {
    pub user_types: Vec<Rc<UserType>>,
}

impl BuiltinEnv {
    pub fn register_user_type(&mut self, user: UserType) {
        self.user_types.push(Rc::new(user));
    }
}

/// Builds the process-wide builtin namespace that every module scope
/// chains to. Builtin type names are weak aliases; user types are strong.
pub fn make_builtin_scope(env: &BuiltinEnv) -> ScopeRef {
    let scope = Scope::new(ScopeKind::Ns, "$builtin", None);
    {
        let mut s = scope.borrow_mut();
        let mut insert_type = |name: &str, ty: Type| {
            let symbol = make_symbol(
                name,
                "$builtin",
                Span::default(),
                SymbolKind::TypeAlias(AliasSymbol { strong: false, ty }),
            );
            symbol.borrow_mut().referenced = true;
            s.table.entry(name.to_string()).or_default().push(symbol);
        };
        insert_type("opaq", Type::Opaq);
        insert_type("bool", Type::Bool);
        insert_type("byte", Type::Byte);
        insert_type("char", Type::Char);
        insert_type("real", Type::Real);
        insert_type("sint", Type::Sint);
        insert_type("uint", Type::Uint);
        for user in &env.user_types {
            insert_type(user.name.as_str(), Type::User(user.clone()));
        }

        let mut insert_func = |builtin: BuiltinFunc| {
            let symbol = make_symbol(
                builtin.name(),
                "$builtin",
                Span::default(),
                SymbolKind::BuiltinFunc(builtin),
            );
            symbol.borrow_mut().referenced = true;
            s.table
                .entry(builtin.name().to_string())
                .or_default()
                .push(symbol);
        };
        insert_func(BuiltinFunc::Capacity);
        insert_func(BuiltinFunc::Size);
        insert_func(BuiltinFunc::Data);
        insert_func(BuiltinFunc::PushBack);
        insert_func(BuiltinFunc::Append);
        insert_func(BuiltinFunc::PopBack);
        insert_func(BuiltinFunc::Resize);
        insert_func(BuiltinFunc::Reserve);
    }
    scope
}

pub fn bin_op_name(op: BinOp) -> &'static str {
    match op {
        BinOp::BoolOr => "||",
        BinOp::BoolAnd => "&&",
        BinOp::BitOr => "|",
        BinOp::BitXor => "^",
        BinOp::BitAnd => "&",
        BinOp::BitShl => "<<",
        BinOp::BitShr => ">>",
        BinOp::Eq => "==",
        BinOp::Ne => "!=",
        BinOp::Lt => "<",
        BinOp::Le => "<=",
        BinOp::Gt => ">",
        BinOp::Ge => ">=",
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Mod => "%",
    }
}

pub fn is_bool_op(op: BinOp) -> bool {
    matches!(op, BinOp::BoolOr | BinOp::BoolAnd)
}

pub fn is_bitwise_op(op: BinOp) -> bool {
    matches!(
        op,
        BinOp::BitOr | BinOp::BitXor | BinOp::BitAnd | BinOp::BitShl | BinOp::BitShr
    )
}

pub fn is_equal_op(op: BinOp) -> bool {
    matches!(op, BinOp::Eq | BinOp::Ne)
}

pub fn is_order_op(op: BinOp) -> bool {
    matches!(op, BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge)
}

pub fn is_comparison_op(op: BinOp) -> bool {
    is_equal_op(op) || is_order_op(op)
}

pub fn is_arith_op(op: BinOp) -> bool {
    matches!(op, BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod)
}

/// Non-comparison operators apply to builtin categories only.
pub fn valid_bin_op(op: BinOp, ty: &Type) -> bool {
    let concrete = ty.concrete();
    if is_bool_op(op) {
        matches!(concrete, Type::Bool)
    } else if is_bitwise_op(op) {
        concrete.is_bitwise()
    } else if is_arith_op(op) {
        concrete.is_arithmetic()
    } else {
        false
    }
}

pub fn valid_un_op(op: UnOp, ty: &Type) -> bool {
    let concrete = ty.concrete();
    match op {
        UnOp::Neg => concrete.is_arithmetic(),
        UnOp::BoolNot => matches!(concrete, Type::Bool),
        UnOp::BitNot => concrete.is_bitwise(),
    }
}

pub fn valid_assign_op(op: AssignOp, ty: &Type) -> bool {
    let concrete = ty.concrete();
    match op {
        AssignOp::Add | AssignOp::Sub | AssignOp::Mul | AssignOp::Div | AssignOp::Mod => {
            concrete.is_arithmetic()
        }
        AssignOp::BitOr | AssignOp::BitXor | AssignOp::BitAnd | AssignOp::BitShl
        | AssignOp::BitShr => concrete.is_bitwise(),
    }
}

pub fn assign_op_name(op: AssignOp) -> &'static str {
    match op {
        AssignOp::Add => "+=",
        AssignOp::Sub => "-=",
        AssignOp::Mul => "*=",
        AssignOp::Div => "/=",
        AssignOp::Mod => "%=",
        AssignOp::BitOr => "|=",
        AssignOp::BitXor => "^=",
        AssignOp::BitAnd => "&=",
        AssignOp::BitShl => "<<=",
        AssignOp::BitShr => ">>=",
    }
}

/// Equality and ordering apply recursively: builtins except void compare
/// bitwise, arrays compare their elements, functions compare as pointers,
/// structs compare field-wise.
pub fn valid_comparison(ty: &Type, position: &Span) -> SemResult<()> {
    let concrete = ty.concrete();
    match concrete {
        Type::Void => Err(SemanticError::InvalidComparison {
            ty: ty.clone(),
            position: position.clone(),
        }),
        Type::Array(elem) => valid_comparison(elem, position),
        Type::Struct { fields } => {
            for field in fields {
                valid_comparison(&field.ty, position)?;
            }
            Ok(())
        }
        Type::User(user) => {
            if user.eq == super::types::USER_OP_NONE || user.lt == super::types::USER_OP_NONE {
                Err(SemanticError::InvalidComparison {
                    ty: ty.clone(),
                    position: position.clone(),
                })
            } else {
                Ok(())
            }
        }
        _ => Ok(()),
    }
}

/// `make T e` casts between any two non-void, non-opaq builtins.
pub fn valid_cast(dst: &Type, src: &Type) -> bool {
    let dst = dst.concrete();
    let src = src.concrete();
    dst.is_builtin()
        && src.is_builtin()
        && !matches!(dst, Type::Void | Type::Opaq)
        && !matches!(src, Type::Void | Type::Opaq)
}

pub fn valid_subscript_index(ty: &Type) -> bool {
    matches!(ty.concrete(), Type::Sint | Type::Uint)
}

fn expect_array(
    builtin: BuiltinFunc,
    arg: &ExprType,
    position: &Span,
) -> SemResult<Type> {
    match arg.ty.concrete() {
        Type::Array(elem) => Ok((**elem).clone()),
        other => Err(SemanticError::BuiltinArgument {
            name: builtin.name().to_string(),
            message: format!("expected [T] but got {other:?}"),
            position: position.clone(),
        }),
    }
}

fn expect_mut_ref(builtin: BuiltinFunc, arg: &ExprType, position: &Span) -> SemResult<()> {
    let var_ref = ExprType {
        ty: arg.ty.clone(),
        mutability: Mutability::Var,
        binding: Binding::Reference,
    };
    if callable(&var_ref, arg) {
        Ok(())
    } else {
        Err(SemanticError::BuiltinArgument {
            name: builtin.name().to_string(),
            message: "first argument must be a mutable array".to_string(),
            position: position.clone(),
        })
    }
}

fn expect_arg_count(
    builtin: BuiltinFunc,
    args: &[ExprType],
    count: usize,
    position: &Span,
) -> SemResult<()> {
    if args.len() == count {
        Ok(())
    } else {
        Err(SemanticError::BuiltinArgument {
            name: builtin.name().to_string(),
            message: format!("expected {count} arguments, found {}", args.len()),
            position: position.clone(),
        })
    }
}

fn expect_type(
    builtin: BuiltinFunc,
    arg: &ExprType,
    expected: &Type,
    position: &Span,
) -> SemResult<()> {
    if &arg.ty == expected {
        Ok(())
    } else {
        Err(SemanticError::BuiltinArgument {
            name: builtin.name().to_string(),
            message: format!("expected {expected:?} but got {:?}", arg.ty),
            position: position.clone(),
        })
    }
}

/// Type checks a builtin call and returns its result type. The element type
/// a builtin needs for argument checking is taken from the first argument.
pub fn check_builtin_call(
    builtin: BuiltinFunc,
    args: &[ExprType],
    position: &Span,
) -> SemResult<Type> {
    use BuiltinFunc::*;
    match builtin {
        Capacity | Size => {
            expect_arg_count(builtin, args, 1, position)?;
            expect_array(builtin, &args[0], position)?;
            Ok(Type::Uint)
        }
        Data => {
            expect_arg_count(builtin, args, 1, position)?;
            expect_array(builtin, &args[0], position)?;
            Ok(Type::Opaq)
        }
        PushBack => {
            expect_arg_count(builtin, args, 2, position)?;
            let elem = expect_array(builtin, &args[0], position)?;
            expect_mut_ref(builtin, &args[0], position)?;
            expect_type(builtin, &args[1], &elem, position)?;
            Ok(Type::Void)
        }
        Append => {
            expect_arg_count(builtin, args, 2, position)?;
            expect_array(builtin, &args[0], position)?;
            expect_mut_ref(builtin, &args[0], position)?;
            expect_type(builtin, &args[1], &args[0].ty, position)?;
            Ok(Type::Void)
        }
        PopBack => {
            expect_arg_count(builtin, args, 1, position)?;
            expect_array(builtin, &args[0], position)?;
            expect_mut_ref(builtin, &args[0], position)?;
            Ok(Type::Void)
        }
        Resize | Reserve => {
            expect_arg_count(builtin, args, 2, position)?;
            expect_array(builtin, &args[0], position)?;
            expect_mut_ref(builtin, &args[0], position)?;
            expect_type(builtin, &args[1], &Type::Uint, position)?;
            Ok(Type::Void)
        }
    }
}

/// The element type a builtin call needs for code generation.
pub fn builtin_elem_type(args: &[ExprType]) -> Option<Type> {
    match args.first().map(|a| a.ty.concrete()) {
        Some(Type::Array(elem)) => Some((**elem).clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_categories() {
        assert!(valid_bin_op(BinOp::Add, &Type::Sint));
        assert!(valid_bin_op(BinOp::Add, &Type::Char));
        assert!(!valid_bin_op(BinOp::Add, &Type::Bool));
        assert!(valid_bin_op(BinOp::BitXor, &Type::Byte));
        assert!(valid_bin_op(BinOp::BitShl, &Type::Uint));
        assert!(!valid_bin_op(BinOp::BitOr, &Type::Sint));
        assert!(valid_bin_op(BinOp::BoolAnd, &Type::Bool));
        assert!(!valid_bin_op(BinOp::BoolOr, &Type::Uint));
    }

    #[test]
    fn test_strong_alias_inherits_category() {
        let dir = Type::Strong {
            name: "Dir".into(),
            module: "main".into(),
            underlying: Box::new(Type::Sint),
        };
        assert!(valid_bin_op(BinOp::Add, &dir));
        assert!(valid_un_op(UnOp::Neg, &dir));
    }

    #[test]
    fn test_cast_rules() {
        assert!(valid_cast(&Type::Sint, &Type::Real));
        assert!(valid_cast(&Type::Bool, &Type::Uint));
        assert!(!valid_cast(&Type::Opaq, &Type::Sint));
        assert!(!valid_cast(&Type::Sint, &Type::Void));
        assert!(!valid_cast(&Type::Array(Box::new(Type::Sint)), &Type::Sint));
    }

    #[test]
    fn test_size_signature() {
        let arr = ExprType::let_val(Type::Array(Box::new(Type::Real)));
        let ret = check_builtin_call(BuiltinFunc::Size, &[arr], &Span::default())
            .expect("size should accept [real]");
        assert_eq!(ret, Type::Uint);

        let not_arr = ExprType::let_val(Type::Sint);
        assert!(check_builtin_call(BuiltinFunc::Size, &[not_arr], &Span::default()).is_err());
    }

    #[test]
    fn test_push_back_requires_mutable_array() {
        let arr_ty = Type::Array(Box::new(Type::Sint));
        let immutable = ExprType::let_val(arr_ty.clone());
        let elem = ExprType::let_val(Type::Sint);
        assert!(check_builtin_call(
            BuiltinFunc::PushBack,
            &[immutable, elem.clone()],
            &Span::default()
        )
        .is_err());

        let mutable = ExprType::var_val(arr_ty);
        assert!(check_builtin_call(
            BuiltinFunc::PushBack,
            &[mutable, elem],
            &Span::default()
        )
        .is_ok());
    }
}
