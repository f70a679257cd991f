//! Expression typing, overload selection and closure capture analysis.
//!
//! Expressions are typed bottom-up. A call expression dispatches four ways
//! on its callee: qualified calls (`obj.name(args)`) promote the object to a
//! receiver, free calls search by name with no receiver, builtin calls use
//! builtin-specific rules, and function-typed values are called indirectly.

use crate::lexer::Span;
use crate::parser::ast::*;

use super::builtins::{
    bin_op_name, check_builtin_call, is_comparison_op, valid_bin_op, valid_cast,
    valid_comparison, valid_subscript_index, valid_un_op,
};
use super::error::{SemResult, SemanticError};
use super::scope::{find_nearest, find_symbol, ScopeKind, ScopeRef};
use super::symbols::{
    make_symbol, Capture, CallTarget, Definition, LambdaSymbol, ObjectSymbol, SymbolKind,
    SymbolRef,
};
use super::types::{callable, Binding, ExprType, Field, Type};
use super::{resolve_type, Ctx, TypeInfo};

pub(crate) fn etype<'e>(expr: &'e Expression<TypeInfo>) -> &'e ExprType {
    &expr.info().etype
}

fn info(etype: ExprType) -> TypeInfo {
    TypeInfo { etype }
}

/// Structural lvalue check: identifiers naming objects, members of lvalues
/// and subscripts of lvalues.
pub(crate) fn is_lvalue(expr: &Expression<TypeInfo>) -> bool {
    match expr {
        Expression::Id(id) => matches!(id.definition, Some(Definition::Object(_))),
        Expression::Member(mem) => is_lvalue(&mem.object),
        Expression::Subscript(sub) => is_lvalue(&sub.object),
        _ => false,
    }
}

pub(crate) fn check_expr(
    ctx: &mut Ctx,
    expr: Expression<()>,
    expected: Option<&Type>,
) -> SemResult<Expression<TypeInfo>> {
    match expr {
        Expression::Binary(node) => check_binary(ctx, node, expected),
        Expression::Unary(node) => check_unary(ctx, node, expected),
        Expression::Call(node) => check_call(ctx, node, expected),
        Expression::Member(node) => check_member(ctx, node),
        Expression::Subscript(node) => check_subscript(ctx, node),
        Expression::Id(node) => check_id(ctx, node, expected),
        Expression::Ternary(node) => check_ternary(ctx, node, expected),
        Expression::Make(node) => check_make(ctx, node),
        Expression::Literal(node) => check_literal(ctx, node, expected),
    }
}

fn check_binary(
    ctx: &mut Ctx,
    node: Binary<()>,
    expected: Option<&Type>,
) -> SemResult<Expression<TypeInfo>> {
    let Binary {
        lhs,
        oper,
        rhs,
        position,
        ..
    } = node;
    // comparisons do not propagate an outer context; everything else may
    let lhs_expected = if is_comparison_op(oper) { None } else { expected };
    let lhs = check_expr(ctx, *lhs, lhs_expected)?;
    let lhs_ty = etype(&lhs).ty.clone();
    // the right operand adapts to the left so `a != 0` works for any a
    let rhs = check_expr(ctx, *rhs, Some(&lhs_ty))?;
    let rhs_ty = &etype(&rhs).ty;

    if &lhs_ty != rhs_ty {
        return Err(SemanticError::TypeMismatch {
            expected: lhs_ty,
            actual: rhs_ty.clone(),
            position,
        });
    }

    let result = if is_comparison_op(oper) {
        valid_comparison(&lhs_ty, &position)?;
        Type::Bool
    } else {
        if !valid_bin_op(oper, &lhs_ty) {
            return Err(SemanticError::InvalidOperator {
                oper: bin_op_name(oper).to_string(),
                ty: lhs_ty,
                position,
            });
        }
        lhs_ty
    };

    Ok(Expression::Binary(Binary {
        lhs: Box::new(lhs),
        oper,
        rhs: Box::new(rhs),
        position,
        info: info(ExprType::let_val(result)),
    }))
}

fn check_unary(
    ctx: &mut Ctx,
    node: Unary<()>,
    expected: Option<&Type>,
) -> SemResult<Expression<TypeInfo>> {
    let Unary {
        oper,
        expr,
        position,
        ..
    } = node;
    let expr = check_expr(ctx, *expr, expected)?;
    let ty = etype(&expr).ty.clone();
    if !valid_un_op(oper, &ty) {
        let name = match oper {
            UnOp::Neg => "-",
            UnOp::BoolNot => "!",
            UnOp::BitNot => "~",
        };
        return Err(SemanticError::InvalidOperator {
            oper: name.to_string(),
            ty,
            position,
        });
    }
    Ok(Expression::Unary(Unary {
        oper,
        expr: Box::new(expr),
        position,
        info: info(ExprType::let_val(ty)),
    }))
}

fn check_ternary(
    ctx: &mut Ctx,
    node: Ternary<()>,
    expected: Option<&Type>,
) -> SemResult<Expression<TypeInfo>> {
    let Ternary {
        cond,
        troo,
        fols,
        position,
        ..
    } = node;
    let cond = check_expr(ctx, *cond, Some(&Type::Bool))?;
    expect_bool(&cond)?;
    let troo = check_expr(ctx, *troo, expected)?;
    let troo_ty = etype(&troo).ty.clone();
    let fols = check_expr(ctx, *fols, Some(&troo_ty))?;
    if etype(&fols).ty != troo_ty {
        return Err(SemanticError::TypeMismatch {
            expected: troo_ty,
            actual: etype(&fols).ty.clone(),
            position,
        });
    }
    let mutability = etype(&troo).mutability.min(etype(&fols).mutability);
    Ok(Expression::Ternary(Ternary {
        cond: Box::new(cond),
        troo: Box::new(troo),
        fols: Box::new(fols),
        position,
        info: info(ExprType {
            ty: troo_ty,
            mutability,
            binding: Binding::Value,
        }),
    }))
}

pub(crate) fn expect_bool(expr: &Expression<TypeInfo>) -> SemResult<()> {
    let ty = &etype(expr).ty;
    if ty.concrete() == &Type::Bool {
        Ok(())
    } else {
        Err(SemanticError::TypeMismatch {
            expected: Type::Bool,
            actual: ty.clone(),
            position: expr.position(),
        })
    }
}

fn check_member(ctx: &mut Ctx, node: Member<()>) -> SemResult<Expression<TypeInfo>> {
    let Member {
        object,
        member,
        position,
        ..
    } = node;
    let object = check_expr(ctx, *object, None)?;
    let object_etype = etype(&object).clone();
    let (index, field_ty) = lookup_field(&object_etype.ty, &member, &position)?;
    Ok(Expression::Member(Member {
        object: Box::new(object),
        member,
        index: Some(index),
        position,
        info: info(ExprType {
            ty: field_ty,
            mutability: object_etype.mutability,
            binding: object_etype.binding,
        }),
    }))
}

fn lookup_field(ty: &Type, member: &str, position: &Span) -> SemResult<(u32, Type)> {
    let cannot = || SemanticError::CannotAccessField {
        member: member.to_string(),
        ty: ty.clone(),
        position: position.clone(),
    };
    match ty.concrete() {
        Type::Struct { fields } => fields
            .iter()
            .enumerate()
            .find(|(_, field)| field.name == member)
            .map(|(i, field)| (i as u32, field.ty.clone()))
            .ok_or_else(cannot),
        Type::User(user) => user
            .fields
            .iter()
            .enumerate()
            .find(|(_, (name, _, _))| name == member)
            .map(|(i, (_, field_ty, _))| (i as u32, field_ty.clone()))
            .ok_or_else(cannot),
        _ => Err(cannot()),
    }
}

fn check_subscript(ctx: &mut Ctx, node: Subscript<()>) -> SemResult<Expression<TypeInfo>> {
    let Subscript {
        object,
        index,
        position,
        ..
    } = node;
    let object = check_expr(ctx, *object, None)?;
    let object_etype = etype(&object).clone();
    let Type::Array(elem) = object_etype.ty.concrete().clone() else {
        return Err(SemanticError::NotSubscriptable {
            ty: object_etype.ty,
            position,
        });
    };
    let index = check_expr(ctx, *index, None)?;
    if !valid_subscript_index(&etype(&index).ty) {
        return Err(SemanticError::InvalidSubscriptIndex {
            ty: etype(&index).ty.clone(),
            position,
        });
    }
    Ok(Expression::Subscript(Subscript {
        object: Box::new(object),
        index: Box::new(index),
        position,
        info: info(ExprType {
            ty: *elem,
            mutability: object_etype.mutability,
            binding: object_etype.binding,
        }),
    }))
}

//------------------------------ Identifiers -----------------------------------

fn check_id(
    ctx: &mut Ctx,
    node: Id<()>,
    expected: Option<&Type>,
) -> SemResult<Expression<TypeInfo>> {
    let Id {
        name, position, ..
    } = node;
    let current = ctx.scopes.cur();
    let Some((symbol, scope)) = find_symbol(&current, &name, &position)? else {
        return Err(SemanticError::UndefinedSymbol { name, position });
    };

    let kind_result = {
        let mut borrowed = symbol.borrow_mut();
        borrowed.referenced = true;
        match &borrowed.kind {
            SymbolKind::Object(object) => {
                Ok((object.id, object.etype.clone()))
            }
            SymbolKind::Func(_) => Err(None),
            SymbolKind::BuiltinFunc(_) => Err(Some(SemanticError::MustCallBuiltin {
                name: name.clone(),
                position: position.clone(),
            })),
            _ => Err(Some(SemanticError::NotAValue {
                name: name.clone(),
                position: position.clone(),
            })),
        }
    };

    match kind_result {
        Ok((object_id, object_etype)) => {
            let capture_index =
                lambda_capture(object_id, &object_etype.ty, &scope, &current);
            let etype = if capture_index.is_some() {
                ExprType::var_val(object_etype.ty.clone())
            } else {
                object_etype
            };
            Ok(Expression::Id(Id {
                name,
                definition: Some(Definition::Object(object_id)),
                capture_index,
                position,
                info: info(etype),
            }))
        }
        Err(Some(err)) => Err(err),
        // a function used as a value
        Err(None) => function_reference(&name, &scope, expected, position),
    }
}

/// Resolves a reference to a function used as a value rather than called.
/// Overloaded names need an expected type to disambiguate, and external
/// functions have no address on the closure ABI.
fn function_reference(
    name: &str,
    scope: &ScopeRef,
    expected: Option<&Type>,
    position: Span,
) -> SemResult<Expression<TypeInfo>> {
    let candidates = scope
        .borrow()
        .table
        .get(name)
        .cloned()
        .unwrap_or_default();
    let pick = |symbol: &SymbolRef| -> SemResult<Expression<TypeInfo>> {
        let borrowed = symbol.borrow();
        let SymbolKind::Func(func) = &borrowed.kind else {
            return Err(SemanticError::NotAFunction {
                name: name.to_string(),
                position: position.clone(),
            });
        };
        if func.external {
            return Err(SemanticError::CannotAddressExtern {
                name: name.to_string(),
                position: position.clone(),
            });
        }
        let func_type = func.func_type();
        drop(borrowed);
        Ok(Expression::Id(Id {
            name: name.to_string(),
            definition: Some(Definition::Func(symbol.clone())),
            capture_index: None,
            position: position.clone(),
            info: info(ExprType::let_val(func_type)),
        }))
    };

    if candidates.len() == 1 {
        let picked = pick(&candidates[0])?;
        if let Some(expected) = expected {
            if matches!(expected, Type::Func { .. }) && &etype(&picked).ty != expected {
                return Err(SemanticError::NoMatchingOverload {
                    name: name.to_string(),
                    position,
                });
            }
        }
        return Ok(picked);
    }

    let Some(expected) = expected else {
        return Err(SemanticError::AmbiguousOverload {
            name: name.to_string(),
            position,
        });
    };
    for candidate in &candidates {
        let matches = {
            let borrowed = candidate.borrow();
            matches!(&borrowed.kind, SymbolKind::Func(func) if &func.func_type() == expected)
        };
        if matches {
            return pick(candidate);
        }
    }
    Err(SemanticError::NoMatchingOverload {
        name: name.to_string(),
        position,
    })
}

//--------------------------- Closure capture ----------------------------------

/// Records a capture for every closure boundary between the identifier and
/// the object it refers to, reusing slots for already-captured objects and
/// linking transitive captures to the parent closure's slot.
fn lambda_capture(
    object: super::symbols::ObjectId,
    ty: &Type,
    object_scope: &ScopeRef,
    current: &ScopeRef,
) -> Option<u32> {
    if object_scope.borrow().kind == ScopeKind::Ns {
        // globals are reachable directly
        return None;
    }
    let closure = find_nearest(ScopeKind::Closure, current)?;
    if let Some(object_closure) = find_nearest(ScopeKind::Closure, object_scope) {
        if std::rc::Rc::ptr_eq(&object_closure, &closure) {
            // the object lives inside this closure
            return None;
        }
    }

    let owner = closure.borrow().owner.clone().expect("closure scope without owner");

    // reuse an existing slot
    {
        let borrowed = owner.borrow();
        let SymbolKind::Lambda(lambda) = &borrowed.kind else {
            unreachable!("closure scope owned by a non-lambda");
        };
        for (index, capture) in lambda.captures.iter().enumerate() {
            if capture.object == object {
                return Some(index as u32);
            }
        }
    }

    let closure_parent = closure.borrow().parent.clone();
    let parent_closure = closure_parent
        .as_ref()
        .and_then(|parent| find_nearest(ScopeKind::Closure, parent));

    let parent_index = match (&closure_parent, &parent_closure) {
        (Some(parent), Some(parent_closure)) => {
            match lambda_capture(object, ty, object_scope, parent) {
                Some(_) => {
                    // the parent captured the object; link to its slot
                    let parent_owner = parent_closure
                        .borrow()
                        .owner
                        .clone()
                        .expect("closure scope without owner");
                    let borrowed = parent_owner.borrow();
                    let SymbolKind::Lambda(parent_lambda) = &borrowed.kind else {
                        unreachable!("closure scope owned by a non-lambda");
                    };
                    parent_lambda
                        .captures
                        .iter()
                        .position(|capture| capture.object == object)
                        .map(|index| index as u32)
                }
                None => None,
            }
        }
        _ => None,
    };

    let mut borrowed = owner.borrow_mut();
    let SymbolKind::Lambda(lambda) = &mut borrowed.kind else {
        unreachable!("closure scope owned by a non-lambda");
    };
    let index = lambda.captures.len() as u32;
    lambda.captures.push(Capture {
        ty: ty.clone(),
        object,
        parent_index,
    });
    Some(index)
}

//-------------------------------- Calls ---------------------------------------

fn check_args(ctx: &mut Ctx, args: Vec<Expression<()>>) -> SemResult<Vec<Expression<TypeInfo>>> {
    args.into_iter()
        .map(|arg| check_expr(ctx, arg, None))
        .collect()
}

fn arg_etypes(args: &[Expression<TypeInfo>]) -> Vec<ExprType> {
    args.iter().map(|arg| etype(arg).clone()).collect()
}

/// Searches the scope chain for the first function overload whose receiver
/// and parameters accept the call. Resolution stops at the first scope that
/// defines the name at all.
fn resolve_overload(
    ctx: &Ctx,
    name: &str,
    receiver: Option<&ExprType>,
    args: &[ExprType],
    position: &Span,
) -> SemResult<Option<SymbolRef>> {
    let mut current = Some(ctx.scopes.cur());
    while let Some(scope) = current {
        let own: Vec<SymbolRef> = scope
            .borrow()
            .table
            .get(name)
            .cloned()
            .unwrap_or_default();
        if !own.is_empty() {
            return match_candidates(name, &own, receiver, args, position).map(Some);
        }
        if scope.borrow().kind == ScopeKind::Ns {
            let mut imported: Vec<(String, SymbolRef)> = vec![];
            for import in scope.borrow().imports.iter() {
                if let Some(found) = import.borrow().table.get(name) {
                    for sym in found {
                        imported.push((import.borrow().module.clone(), sym.clone()));
                    }
                }
            }
            if !imported.is_empty() {
                let compatible: Vec<&(String, SymbolRef)> = imported
                    .iter()
                    .filter(|(_, sym)| candidate_matches(sym, receiver, args))
                    .collect();
                let modules: std::collections::HashSet<&str> =
                    compatible.iter().map(|(m, _)| m.as_str()).collect();
                return match compatible.len() {
                    0 => Err(SemanticError::NoMatchingOverload {
                        name: name.to_string(),
                        position: position.clone(),
                    }),
                    1 => Ok(Some(compatible[0].1.clone())),
                    _ if modules.len() > 1 => Err(SemanticError::AmbiguousOverload {
                        name: name.to_string(),
                        position: position.clone(),
                    }),
                    _ => Ok(Some(compatible[0].1.clone())),
                };
            }
        }
        current = super::scope::parent_scope(&scope);
    }
    Ok(None)
}

fn candidate_matches(symbol: &SymbolRef, receiver: Option<&ExprType>, args: &[ExprType]) -> bool {
    let borrowed = symbol.borrow();
    let SymbolKind::Func(func) = &borrowed.kind else {
        return false;
    };
    let receiver_ok = match (&func.receiver, receiver) {
        (None, None) => true,
        (Some(param), Some(arg)) => callable(param, arg),
        _ => false,
    };
    receiver_ok
        && func.params.len() == args.len()
        && func
            .params
            .iter()
            .zip(args.iter())
            .all(|(param, arg)| callable(param, arg))
}

fn match_candidates(
    name: &str,
    candidates: &[SymbolRef],
    receiver: Option<&ExprType>,
    args: &[ExprType],
    position: &Span,
) -> SemResult<SymbolRef> {
    let mut saw_func = false;
    for candidate in candidates {
        if matches!(&candidate.borrow().kind, SymbolKind::Func(_)) {
            saw_func = true;
        }
        if candidate_matches(candidate, receiver, args) {
            candidate.borrow_mut().referenced = true;
            return Ok(candidate.clone());
        }
    }
    if saw_func {
        Err(SemanticError::NoMatchingOverload {
            name: name.to_string(),
            position: position.clone(),
        })
    } else {
        Err(SemanticError::NotAFunction {
            name: name.to_string(),
            position: position.clone(),
        })
    }
}

fn func_ret(symbol: &SymbolRef) -> Type {
    let borrowed = symbol.borrow();
    match &borrowed.kind {
        SymbolKind::Func(func) => func.ret.clone(),
        _ => unreachable!("call target is not a function"),
    }
}

/// Checks an indirect call through a function-typed value.
fn check_indirect(
    callee: Expression<TypeInfo>,
    args: Vec<Expression<TypeInfo>>,
    position: Span,
) -> SemResult<Expression<TypeInfo>> {
    let Type::Func { params, ret } = etype(&callee).ty.concrete().clone() else {
        return Err(SemanticError::NotCallable { position });
    };
    let arg_types = arg_etypes(&args);
    if params.len() != arg_types.len() {
        return Err(SemanticError::NoMatchingCallObject { position });
    }
    for ((mode, ty), arg) in params.iter().zip(arg_types.iter()) {
        let param = ExprType::param(*mode, ty.clone());
        if !callable(&param, arg) {
            return Err(SemanticError::NoMatchingCallObject { position });
        }
    }
    Ok(Expression::Call(Call {
        callee: Box::new(callee),
        args,
        target: Some(CallTarget::Indirect),
        position,
        info: info(ExprType::let_val(*ret)),
    }))
}

fn check_call(
    ctx: &mut Ctx,
    node: Call<()>,
    _expected: Option<&Type>,
) -> SemResult<Expression<TypeInfo>> {
    let Call {
        callee,
        args,
        position,
        ..
    } = node;

    match *callee {
        // qualified call: obj.name(args)
        Expression::Member(mem) => {
            let Member {
                object,
                member,
                position: mem_position,
                ..
            } = mem;
            let object = check_expr(ctx, *object, None)?;
            let receiver = etype(&object).clone();
            let args = check_args(ctx, args)?;
            let arg_types = arg_etypes(&args);

            match resolve_overload(ctx, &member, Some(&receiver), &arg_types, &position)? {
                Some(symbol) => {
                    let ret = func_ret(&symbol);
                    Ok(Expression::Call(Call {
                        callee: Box::new(object),
                        args,
                        target: Some(CallTarget::Func(symbol)),
                        position,
                        info: info(ExprType::let_val(ret)),
                    }))
                }
                None => {
                    // no such function; a function-typed field still works
                    let (index, field_ty) = lookup_field(&receiver.ty, &member, &mem_position)
                        .map_err(|_| SemanticError::UndefinedSymbol {
                            name: member.clone(),
                            position: mem_position.clone(),
                        })?;
                    let callee = Expression::Member(Member {
                        object: Box::new(object),
                        member,
                        index: Some(index),
                        position: mem_position,
                        info: info(ExprType {
                            ty: field_ty,
                            mutability: receiver.mutability,
                            binding: receiver.binding,
                        }),
                    });
                    check_indirect(callee, args, position)
                }
            }
        }
        // free call, builtin call or call of a function-typed object
        Expression::Id(id) => {
            let current = ctx.scopes.cur();
            let Some((symbol, _)) = find_symbol(&current, &id.name, &id.position)? else {
                return Err(SemanticError::UndefinedSymbol {
                    name: id.name,
                    position: id.position,
                });
            };
            let is_func = matches!(&symbol.borrow().kind, SymbolKind::Func(_));
            let builtin = match &symbol.borrow().kind {
                SymbolKind::BuiltinFunc(builtin) => Some(*builtin),
                _ => None,
            };

            if let Some(builtin) = builtin {
                symbol.borrow_mut().referenced = true;
                let args = check_args(ctx, args)?;
                let arg_types = arg_etypes(&args);
                let ret = check_builtin_call(builtin, &arg_types, &position)?;
                let callee = Expression::Id(Id {
                    name: id.name,
                    definition: None,
                    capture_index: None,
                    position: id.position,
                    info: info(ExprType::let_val(Type::Void)),
                });
                return Ok(Expression::Call(Call {
                    callee: Box::new(callee),
                    args,
                    target: Some(CallTarget::Builtin(builtin)),
                    position,
                    info: info(ExprType::let_val(ret)),
                }));
            }

            if is_func {
                let args = check_args(ctx, args)?;
                let arg_types = arg_etypes(&args);
                match resolve_overload(ctx, &id.name, None, &arg_types, &position)? {
                    Some(symbol) => {
                        let ret = func_ret(&symbol);
                        let callee = Expression::Id(Id {
                            name: id.name,
                            definition: Some(Definition::Func(symbol.clone())),
                            capture_index: None,
                            position: id.position,
                            info: info(ExprType::let_val(Type::Void)),
                        });
                        return Ok(Expression::Call(Call {
                            callee: Box::new(callee),
                            args,
                            target: Some(CallTarget::Func(symbol)),
                            position,
                            info: info(ExprType::let_val(ret)),
                        }));
                    }
                    None => {
                        return Err(SemanticError::UndefinedSymbol {
                            name: id.name,
                            position: id.position,
                        })
                    }
                }
            }

            // an object holding a function value
            let callee = check_id(ctx, id, None)?;
            let args = check_args(ctx, args)?;
            check_indirect(callee, args, position)
        }
        // any other callee must be a function-typed expression
        other => {
            let callee = check_expr(ctx, other, None)?;
            let args = check_args(ctx, args)?;
            check_indirect(callee, args, position)
        }
    }
}

//------------------------------- Literals -------------------------------------

fn number_type(
    value: &NumberValue,
    literal: &str,
    expected: Option<&Type>,
    position: &Span,
) -> SemResult<Type> {
    let out_of_range = |ty: &Type| SemanticError::NumberOutOfRange {
        literal: literal.to_string(),
        ty: ty.clone(),
        position: position.clone(),
    };
    match value {
        NumberValue::Real(_) => match expected {
            Some(ty) if ty.concrete() == &Type::Real => Ok(ty.clone()),
            _ => Ok(Type::Real),
        },
        NumberValue::Uint(v) => {
            if *v > u32::MAX as u64 {
                return Err(out_of_range(&Type::Uint));
            }
            match expected {
                Some(ty) if ty.concrete() == &Type::Uint => Ok(ty.clone()),
                _ => Ok(Type::Uint),
            }
        }
        NumberValue::Int(v) => {
            let fits = |lo: i64, hi: i64| *v >= lo && *v <= hi;
            if let Some(ty) = expected {
                let ok = match ty.concrete() {
                    Type::Byte => fits(0, u8::MAX as i64),
                    Type::Char => fits(i8::MIN as i64, i8::MAX as i64),
                    Type::Sint => fits(i32::MIN as i64, i32::MAX as i64),
                    Type::Uint => fits(0, u32::MAX as i64),
                    Type::Real => true,
                    _ => false,
                };
                if ok {
                    return Ok(ty.clone());
                }
            }
            if fits(i32::MIN as i64, i32::MAX as i64) {
                Ok(Type::Sint)
            } else {
                Err(out_of_range(&Type::Sint))
            }
        }
    }
}

fn check_literal(
    ctx: &mut Ctx,
    node: Literal<()>,
    expected: Option<&Type>,
) -> SemResult<Expression<TypeInfo>> {
    match node {
        Literal::String(lit) => {
            let ty = Type::Array(Box::new(Type::Char));
            Ok(Expression::Literal(Literal::String(StringLit {
                value: lit.value,
                position: lit.position,
                info: info(ExprType::let_val(ty)),
            })))
        }
        Literal::Char(lit) => Ok(Expression::Literal(Literal::Char(CharLit {
            value: lit.value,
            position: lit.position,
            info: info(ExprType::let_val(Type::Char)),
        }))),
        Literal::Bool(lit) => Ok(Expression::Literal(Literal::Bool(BoolLit {
            value: lit.value,
            position: lit.position,
            info: info(ExprType::let_val(Type::Bool)),
        }))),
        Literal::Number(lit) => {
            let ty = number_type(&lit.value, &lit.literal, expected, &lit.position)?;
            Ok(Expression::Literal(Literal::Number(NumberLit {
                literal: lit.literal,
                value: lit.value,
                position: lit.position,
                info: info(ExprType::let_val(ty)),
            })))
        }
        Literal::Array(lit) => check_array_literal(ctx, lit, expected),
        Literal::InitList(lit) => Err(SemanticError::InvalidConstruction {
            ty: Type::Void,
            position: lit.position,
        }),
        Literal::Lambda(lit) => check_lambda(ctx, lit),
    }
}

fn check_array_literal(
    ctx: &mut Ctx,
    lit: ArrayLit<()>,
    expected: Option<&Type>,
) -> SemResult<Expression<TypeInfo>> {
    let ArrayLit {
        exprs, position, ..
    } = lit;
    let expected_elem = match expected.map(Type::concrete) {
        Some(Type::Array(elem)) => Some((**elem).clone()),
        _ => None,
    };
    if exprs.is_empty() {
        let Some(elem) = expected_elem else {
            return Err(SemanticError::CannotDeduceType {
                name: "[]".to_string(),
                position,
            });
        };
        return Ok(Expression::Literal(Literal::Array(ArrayLit {
            exprs: vec![],
            position,
            info: info(ExprType::let_val(Type::Array(Box::new(elem)))),
        })));
    }

    let mut checked = vec![];
    let mut elem_ty = expected_elem;
    for expr in exprs {
        let typed = check_expr(ctx, expr, elem_ty.as_ref())?;
        match &elem_ty {
            None => elem_ty = Some(etype(&typed).ty.clone()),
            Some(elem) => {
                if &etype(&typed).ty != elem {
                    return Err(SemanticError::TypeMismatch {
                        expected: elem.clone(),
                        actual: etype(&typed).ty.clone(),
                        position: typed.position(),
                    });
                }
            }
        }
        checked.push(typed);
    }
    let elem = elem_ty.expect("non-empty array literal without element type");
    Ok(Expression::Literal(Literal::Array(ArrayLit {
        exprs: checked,
        position,
        info: info(ExprType::let_val(Type::Array(Box::new(elem)))),
    })))
}

fn check_lambda(ctx: &mut Ctx, lit: Lambda<()>) -> SemResult<Expression<TypeInfo>> {
    let Lambda {
        params,
        ret,
        body,
        position,
        ..
    } = lit;

    let mut param_types = vec![];
    for param in &params {
        param_types.push((param.ref_mode, resolve_type(ctx, &param.ty)?));
    }
    let ret_ty = match &ret {
        Some(ty) => resolve_type(ctx, ty)?,
        None => Type::Void,
    };

    let lambda_id = ctx.fresh_lambda();
    let owner = make_symbol(
        format!("lambda.{lambda_id}"),
        &ctx.module,
        position.clone(),
        SymbolKind::Lambda(LambdaSymbol {
            lambda_id,
            captures: vec![],
        }),
    );
    ctx.scopes.enter_closure(owner.clone());

    let mut typed_params = vec![];
    for (param, (mode, ty)) in params.into_iter().zip(param_types.iter()) {
        let object_id = ctx.fresh_object();
        let symbol = make_symbol(
            &param.name,
            &ctx.module,
            param.position.clone(),
            SymbolKind::Object(ObjectSymbol {
                id: object_id,
                etype: ExprType::param(*mode, ty.clone()),
                is_param: true,
            }),
        );
        symbol.borrow_mut().referenced = true;
        ctx.scopes.insert(&param.name, symbol)?;
        typed_params.push(Param {
            object: Some(object_id),
            ..param
        });
    }

    ctx.ret_types.push(ret_ty.clone());
    let body = super::stat::check_block(ctx, body)?;
    ctx.ret_types.pop();

    if ret_ty != Type::Void && !super::stat::block_always_returns(&body) {
        ctx.scopes.leave();
        return Err(SemanticError::MissingReturn {
            name: format!("lambda.{lambda_id}"),
            position,
        });
    }

    ctx.scopes.leave();

    let captures = {
        let borrowed = owner.borrow();
        let SymbolKind::Lambda(lambda) = &borrowed.kind else {
            unreachable!("lambda symbol changed kind");
        };
        lambda.captures.clone()
    };

    let func_ty = Type::Func {
        params: param_types,
        ret: Box::new(ret_ty),
    };
    Ok(Expression::Literal(Literal::Lambda(Lambda {
        params: typed_params,
        ret,
        body,
        captures,
        lambda_id,
        position,
        info: info(ExprType::let_val(func_ty)),
    })))
}

//--------------------------------- Make ---------------------------------------

fn check_make(ctx: &mut Ctx, node: Make<()>) -> SemResult<Expression<TypeInfo>> {
    let Make {
        ty,
        expr,
        position,
        ..
    } = node;
    let target = resolve_type(ctx, &ty)?;

    // an initializer list constructs the target directly
    if let Expression::Literal(Literal::InitList(list)) = *expr {
        let typed = check_init_list(ctx, list, &target)?;
        return Ok(Expression::Make(Make {
            ty,
            expr: Box::new(typed),
            cast: false,
            position,
            info: info(ExprType::let_val(target)),
        }));
    }

    let operand = check_expr(ctx, *expr, Some(&target))?;
    let operand_ty = etype(&operand).ty.clone();

    let cast = if operand_ty == target {
        false
    } else if operand_ty.concrete() == target.concrete() {
        // strong alias rebind in either direction
        false
    } else if valid_cast(&target, &operand_ty) {
        true
    } else if bool_convertible(&target, &operand_ty) {
        // function and user values convert to bool through their
        // bool-conversion operation
        true
    } else {
        return Err(SemanticError::InvalidCast {
            from: operand_ty,
            to: target,
            position,
        });
    };

    Ok(Expression::Make(Make {
        ty,
        expr: Box::new(operand),
        cast,
        position,
        info: info(ExprType::let_val(target)),
    }))
}

fn bool_convertible(target: &Type, operand: &Type) -> bool {
    if target.concrete() != &Type::Bool {
        return false;
    }
    match operand.concrete() {
        Type::Func { .. } => true,
        Type::User(user) => user.bool_conv != super::types::USER_OP_NONE,
        _ => false,
    }
}

fn check_init_list(
    ctx: &mut Ctx,
    list: InitList<()>,
    target: &Type,
) -> SemResult<Expression<TypeInfo>> {
    let InitList {
        exprs, position, ..
    } = list;

    if exprs.is_empty() {
        // `make T {}` default-constructs any type
        return Ok(Expression::Literal(Literal::InitList(InitList {
            exprs: vec![],
            position,
            info: info(ExprType::let_val(target.clone())),
        })));
    }

    let Type::Struct { fields } = target.concrete().clone() else {
        return Err(SemanticError::InvalidConstruction {
            ty: target.clone(),
            position,
        });
    };
    if fields.len() != exprs.len() {
        return Err(SemanticError::InvalidConstruction {
            ty: target.clone(),
            position,
        });
    }
    let mut checked = vec![];
    for (expr, Field { ty, .. }) in exprs.into_iter().zip(fields.iter()) {
        let typed = check_expr(ctx, expr, Some(ty))?;
        if &etype(&typed).ty != ty {
            return Err(SemanticError::TypeMismatch {
                expected: ty.clone(),
                actual: etype(&typed).ty.clone(),
                position: typed.position(),
            });
        }
        checked.push(typed);
    }
    Ok(Expression::Literal(Literal::InitList(InitList {
        exprs: checked,
        position,
        info: info(ExprType::let_val(target.clone())),
    })))
}
