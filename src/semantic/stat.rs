//! Statement and declaration checking: the shallow signature pass, function
//! bodies, control-flow validation and the always-returns analysis.

use crate::lexer::Span;
use crate::parser::ast::*;

use super::builtins::{assign_op_name, valid_assign_op};
use super::error::{SemResult, SemanticError};
use super::expr::{check_expr, etype, expect_bool, is_lvalue};
use super::scope::ScopeKind;
use super::symbols::{
    make_symbol, AliasSymbol, FuncSymbol, ObjectSymbol, SymbolKind, SymbolRef,
};
use super::types::{ExprType, Mutability, Type};
use super::{resolve_type, Ctx, TypeInfo};

//------------------------------ Declarations ----------------------------------

/// Inserts module-level signatures before any body is checked: type aliases
/// first, then function symbols, so functions can call forward.
pub(crate) fn shallow_check(
    ctx: &mut Ctx,
    decls: &[Declaration<()>],
) -> SemResult<Vec<Option<SymbolRef>>> {
    for decl in decls {
        if let Declaration::Type(alias) = decl {
            insert_type_alias(ctx, alias)?;
        }
    }

    let mut func_symbols = vec![None; decls.len()];
    let mut overload_counts: std::collections::HashMap<String, usize> = Default::default();
    for (index, decl) in decls.iter().enumerate() {
        let Declaration::Func(func) = decl else {
            continue;
        };
        let receiver = match &func.receiver {
            Some(param) => {
                let ty = resolve_type(ctx, &param.ty)?;
                check_receiver_collision(&ty, &func.name, &func.position)?;
                Some(ExprType::param(param.ref_mode, ty))
            }
            None => None,
        };
        let mut params = vec![];
        for param in &func.params {
            params.push(ExprType::param(param.ref_mode, resolve_type(ctx, &param.ty)?));
        }
        let ret = match &func.ret {
            Some(ty) => resolve_type(ctx, ty)?,
            None => Type::Void,
        };
        let mangled = if func.external {
            func.name.clone()
        } else {
            let count = overload_counts.entry(func.name.clone()).or_insert(0);
            let mangled = format!("{}.{}.{}", ctx.module, func.name, count);
            *count += 1;
            mangled
        };
        let symbol = make_symbol(
            &func.name,
            &ctx.module,
            func.position.clone(),
            SymbolKind::Func(FuncSymbol {
                receiver,
                params,
                ret,
                external: func.external,
                mangled,
            }),
        );
        if func.external {
            symbol.borrow_mut().referenced = true;
        }
        ctx.scopes.insert_func(&func.name, symbol.clone())?;
        func_symbols[index] = Some(symbol);
    }
    Ok(func_symbols)
}

/// A member-style function must not shadow a field of its receiver.
fn check_receiver_collision(receiver: &Type, name: &str, position: &Span) -> SemResult<()> {
    if let Type::Struct { fields } = receiver.concrete() {
        if fields.iter().any(|field| field.name == name) {
            return Err(SemanticError::CollidingFieldFunc {
                name: name.to_string(),
                position: position.clone(),
            });
        }
    }
    Ok(())
}

fn insert_type_alias(ctx: &mut Ctx, alias: &TypeAliasDecl) -> SemResult<()> {
    let underlying = resolve_type(ctx, &alias.ty)?;
    let ty = if alias.strong {
        Type::Strong {
            name: alias.name.clone(),
            module: ctx.module.clone(),
            underlying: Box::new(underlying),
        }
    } else {
        underlying
    };
    let symbol = make_symbol(
        &alias.name,
        &ctx.module,
        alias.position.clone(),
        SymbolKind::TypeAlias(AliasSymbol {
            strong: alias.strong,
            ty,
        }),
    );
    ctx.scopes.insert(&alias.name, symbol)
}

pub(crate) fn check_func(
    ctx: &mut Ctx,
    func: FuncDecl<()>,
    symbol: SymbolRef,
) -> SemResult<FuncDecl<TypeInfo>> {
    let FuncDecl {
        receiver,
        name,
        params,
        ret,
        body,
        external,
        position,
        ..
    } = func;

    let (receiver_etype, param_etypes, ret_ty) = {
        let borrowed = symbol.borrow();
        let SymbolKind::Func(f) = &borrowed.kind else {
            unreachable!("function declaration without function symbol");
        };
        (f.receiver.clone(), f.params.clone(), f.ret.clone())
    };

    ctx.scopes.enter(ScopeKind::Func);

    let receiver = match (receiver, receiver_etype) {
        (Some(param), Some(etype)) => Some(insert_param(ctx, param, etype)?),
        _ => None,
    };
    let mut typed_params = vec![];
    for (param, etype) in params.into_iter().zip(param_etypes.into_iter()) {
        typed_params.push(insert_param(ctx, param, etype)?);
    }

    ctx.ret_types.push(ret_ty.clone());
    let body = check_block(ctx, body)?;
    ctx.ret_types.pop();

    warn_unused_locals(ctx);
    ctx.scopes.leave();

    if ret_ty != Type::Void && !block_always_returns(&body) {
        return Err(SemanticError::MissingReturn { name, position });
    }

    Ok(FuncDecl {
        receiver,
        name,
        params: typed_params,
        ret,
        body,
        external,
        symbol: Some(symbol),
        position,
    })
}

fn insert_param(ctx: &mut Ctx, param: Param, etype: ExprType) -> SemResult<Param> {
    let object_id = ctx.fresh_object();
    let symbol = make_symbol(
        &param.name,
        &ctx.module,
        param.position.clone(),
        SymbolKind::Object(ObjectSymbol {
            id: object_id,
            etype,
            is_param: true,
        }),
    );
    symbol.borrow_mut().referenced = true;
    ctx.scopes.insert(&param.name, symbol)?;
    Ok(Param {
        object: Some(object_id),
        ..param
    })
}

/// Local and global var/let declarations share this path; the type comes
/// from the annotation, the initializer, or both (which must agree).
pub(crate) fn check_var_decl(ctx: &mut Ctx, var: VarDecl<()>) -> SemResult<VarDecl<TypeInfo>> {
    let VarDecl {
        mutable,
        name,
        ty,
        expr,
        external,
        position,
        ..
    } = var;

    let annotated = match &ty {
        Some(ty) => Some(resolve_type(ctx, ty)?),
        None => None,
    };
    let expr = match expr {
        Some(expr) => Some(check_expr(ctx, expr, annotated.as_ref())?),
        None => None,
    };

    let object_ty = match (&annotated, &expr) {
        (Some(annotated), Some(expr)) => {
            if &etype(expr).ty != annotated {
                return Err(SemanticError::TypeMismatch {
                    expected: annotated.clone(),
                    actual: etype(expr).ty.clone(),
                    position: expr.position(),
                });
            }
            annotated.clone()
        }
        (Some(annotated), None) => annotated.clone(),
        (None, Some(expr)) => {
            let ty = etype(expr).ty.clone();
            if ty == Type::Void {
                return Err(SemanticError::CannotDeduceType { name, position });
            }
            ty
        }
        (None, None) => {
            return Err(SemanticError::CannotDeduceType { name, position });
        }
    };

    let object_id = ctx.fresh_object();
    let etype = if mutable {
        ExprType::var_val(object_ty.clone())
    } else {
        ExprType::let_val(object_ty.clone())
    };
    let symbol = make_symbol(
        &name,
        &ctx.module,
        position.clone(),
        SymbolKind::Object(ObjectSymbol {
            id: object_id,
            etype,
            is_param: false,
        }),
    );
    if external {
        symbol.borrow_mut().referenced = true;
    }
    ctx.scopes.insert(&name, symbol)?;

    Ok(VarDecl {
        mutable,
        name,
        ty,
        expr,
        external,
        object: Some(object_id),
        resolved_ty: Some(object_ty),
        position,
    })
}

//------------------------------- Statements -----------------------------------

pub(crate) fn check_block(ctx: &mut Ctx, block: Block<()>) -> SemResult<Block<TypeInfo>> {
    let Block { stats, position } = block;
    let mut checked = vec![];
    for stat in stats {
        checked.push(check_stat(ctx, stat)?);
    }
    Ok(Block {
        stats: checked,
        position,
    })
}

fn check_scoped_block(ctx: &mut Ctx, block: Block<()>) -> SemResult<Block<TypeInfo>> {
    ctx.scopes.enter(ScopeKind::Block);
    let result = check_block(ctx, block);
    warn_unused_locals(ctx);
    ctx.scopes.leave();
    result
}

fn check_scoped_stat(
    ctx: &mut Ctx,
    kind: ScopeKind,
    stat: Statement<()>,
) -> SemResult<Statement<TypeInfo>> {
    ctx.scopes.enter(kind);
    let result = check_stat(ctx, stat);
    warn_unused_locals(ctx);
    ctx.scopes.leave();
    result
}

fn in_flow_scope(ctx: &Ctx) -> bool {
    let mut current = Some(ctx.scopes.cur());
    while let Some(scope) = current {
        match scope.borrow().kind {
            ScopeKind::Flow => return true,
            ScopeKind::Func | ScopeKind::Closure | ScopeKind::Ns => return false,
            ScopeKind::Block => {}
        }
        let parent = scope.borrow().parent.clone();
        current = parent;
    }
    false
}

pub(crate) fn check_stat(ctx: &mut Ctx, stat: Statement<()>) -> SemResult<Statement<TypeInfo>> {
    match stat {
        Statement::Block(block) => Ok(Statement::Block(check_scoped_block(ctx, block)?)),
        Statement::If(fi) => {
            let If {
                cond,
                body,
                else_body,
                position,
            } = fi;
            ctx.scopes.enter(ScopeKind::Block);
            let cond = check_expr(ctx, cond, Some(&Type::Bool))?;
            expect_bool(&cond)?;
            let body = Box::new(check_stat(ctx, *body)?);
            let else_body = match else_body {
                Some(stat) => Some(Box::new(check_stat(ctx, *stat)?)),
                None => None,
            };
            warn_unused_locals(ctx);
            ctx.scopes.leave();
            Ok(Statement::If(If {
                cond,
                body,
                else_body,
                position,
            }))
        }
        Statement::Switch(swich) => check_switch(ctx, swich),
        Statement::Return(ret) => check_return(ctx, ret),
        Statement::While(wile) => {
            let While {
                cond,
                body,
                position,
            } = wile;
            ctx.scopes.enter(ScopeKind::Flow);
            let cond = check_expr(ctx, cond, Some(&Type::Bool))?;
            expect_bool(&cond)?;
            let body = Box::new(check_stat(ctx, *body)?);
            warn_unused_locals(ctx);
            ctx.scopes.leave();
            Ok(Statement::While(While {
                cond,
                body,
                position,
            }))
        }
        Statement::For(four) => {
            let For {
                init,
                cond,
                incr,
                body,
                position,
            } = four;
            ctx.scopes.enter(ScopeKind::Flow);
            let init = match init {
                Some(asgn) => Some(Box::new(check_asgn(ctx, *asgn)?)),
                None => None,
            };
            let cond = check_expr(ctx, cond, Some(&Type::Bool))?;
            expect_bool(&cond)?;
            let incr = match incr {
                Some(asgn) => Some(Box::new(check_asgn(ctx, *asgn)?)),
                None => None,
            };
            let body = Box::new(check_stat(ctx, *body)?);
            warn_unused_locals(ctx);
            ctx.scopes.leave();
            Ok(Statement::For(For {
                init,
                cond,
                incr,
                body,
                position,
            }))
        }
        Statement::Break(position) => {
            if !in_flow_scope(ctx) {
                return Err(SemanticError::BreakOutsideFlow { position });
            }
            Ok(Statement::Break(position))
        }
        Statement::Continue(position) => {
            if !in_flow_scope(ctx) {
                return Err(SemanticError::ContinueOutsideFlow { position });
            }
            Ok(Statement::Continue(position))
        }
        Statement::Terminate(position) => Ok(Statement::Terminate(position)),
        Statement::Asgn(asgn) => Ok(Statement::Asgn(check_asgn(ctx, asgn)?)),
        Statement::Var(var) => Ok(Statement::Var(check_var_decl(ctx, var)?)),
        Statement::Type(alias) => {
            insert_type_alias(ctx, &alias)?;
            Ok(Statement::Type(alias))
        }
        Statement::Empty(position) => Ok(Statement::Empty(position)),
    }
}

fn check_switch(ctx: &mut Ctx, swich: Switch<()>) -> SemResult<Statement<TypeInfo>> {
    let Switch {
        expr,
        cases,
        position,
        ..
    } = swich;
    let expr = check_expr(ctx, expr, None)?;
    let scrutinee_ty = etype(&expr).ty.clone();
    super::builtins::valid_comparison(&scrutinee_ty, &position)?;

    let mut found_default = false;
    let mut checked_cases = vec![];
    let mut all_return = true;
    for case in cases {
        let SwitchCase {
            expr: case_expr,
            body,
            position: case_position,
        } = case;
        let case_expr = match case_expr {
            Some(case_expr) => {
                let typed = check_expr(ctx, case_expr, Some(&scrutinee_ty))?;
                if etype(&typed).ty != scrutinee_ty {
                    return Err(SemanticError::TypeMismatch {
                        expected: scrutinee_ty.clone(),
                        actual: etype(&typed).ty.clone(),
                        position: typed.position(),
                    });
                }
                Some(typed)
            }
            None => {
                if found_default {
                    return Err(SemanticError::MultipleDefaults {
                        position: case_position,
                    });
                }
                found_default = true;
                None
            }
        };
        let body = check_scoped_stat(ctx, ScopeKind::Flow, *body)?;
        if !case_terminates(&body) {
            return Err(SemanticError::CaseNotTerminated {
                position: case_position,
            });
        }
        all_return &= always_returns(&body);
        checked_cases.push(SwitchCase {
            expr: case_expr,
            body: Box::new(body),
            position: case_position,
        });
    }

    let always_returns = found_default && !checked_cases.is_empty() && all_return;
    Ok(Statement::Switch(Switch {
        expr,
        cases: checked_cases,
        always_returns,
        position,
    }))
}

fn check_return(ctx: &mut Ctx, ret: Return<()>) -> SemResult<Statement<TypeInfo>> {
    let Return { expr, position } = ret;
    let ret_ty = ctx
        .ret_types
        .last()
        .cloned()
        .expect("return outside of a function");
    let expr = match expr {
        Some(expr) => {
            let typed = check_expr(ctx, expr, Some(&ret_ty))?;
            if etype(&typed).ty != ret_ty {
                return Err(SemanticError::TypeMismatch {
                    expected: ret_ty,
                    actual: etype(&typed).ty.clone(),
                    position: typed.position(),
                });
            }
            Some(typed)
        }
        None => {
            if ret_ty != Type::Void {
                return Err(SemanticError::TypeMismatch {
                    expected: ret_ty,
                    actual: Type::Void,
                    position: position.clone(),
                });
            }
            None
        }
    };
    Ok(Statement::Return(Return { expr, position }))
}

fn check_asgn(ctx: &mut Ctx, asgn: Asgn<()>) -> SemResult<Asgn<TypeInfo>> {
    match asgn {
        Asgn::Assign { dst, src, position } => {
            let dst = check_expr(ctx, dst, None)?;
            check_assignable(&dst, &position)?;
            let dst_ty = etype(&dst).ty.clone();
            let src = check_expr(ctx, src, Some(&dst_ty))?;
            if etype(&src).ty != dst_ty {
                return Err(SemanticError::TypeMismatch {
                    expected: dst_ty,
                    actual: etype(&src).ty.clone(),
                    position,
                });
            }
            Ok(Asgn::Assign { dst, src, position })
        }
        Asgn::Compound {
            dst,
            oper,
            src,
            position,
        } => {
            let dst = check_expr(ctx, dst, None)?;
            check_assignable(&dst, &position)?;
            let dst_ty = etype(&dst).ty.clone();
            if !valid_assign_op(oper, &dst_ty) {
                return Err(SemanticError::InvalidOperator {
                    oper: assign_op_name(oper).to_string(),
                    ty: dst_ty,
                    position,
                });
            }
            let src = check_expr(ctx, src, Some(&dst_ty))?;
            if etype(&src).ty != dst_ty {
                return Err(SemanticError::TypeMismatch {
                    expected: dst_ty,
                    actual: etype(&src).ty.clone(),
                    position,
                });
            }
            Ok(Asgn::Compound {
                dst,
                oper,
                src,
                position,
            })
        }
        Asgn::IncrDecr {
            expr,
            incr,
            position,
        } => {
            let expr = check_expr(ctx, expr, None)?;
            check_assignable(&expr, &position)?;
            let ty = etype(&expr).ty.clone();
            if !ty.concrete().is_arithmetic() {
                return Err(SemanticError::InvalidOperator {
                    oper: if incr { "++" } else { "--" }.to_string(),
                    ty,
                    position,
                });
            }
            Ok(Asgn::IncrDecr {
                expr,
                incr,
                position,
            })
        }
        Asgn::DeclAssign {
            name,
            expr,
            position,
            ..
        } => {
            let expr = check_expr(ctx, expr, None)?;
            let ty = etype(&expr).ty.clone();
            if ty == Type::Void {
                return Err(SemanticError::CannotDeduceType { name, position });
            }
            let object_id = ctx.fresh_object();
            let symbol = make_symbol(
                &name,
                &ctx.module,
                position.clone(),
                SymbolKind::Object(ObjectSymbol {
                    id: object_id,
                    etype: ExprType::var_val(ty),
                    is_param: false,
                }),
            );
            ctx.scopes.insert(&name, symbol)?;
            Ok(Asgn::DeclAssign {
                name,
                expr,
                object: Some(object_id),
                position,
            })
        }
        Asgn::Call(call) => {
            let checked = check_expr(ctx, Expression::Call(call), None)?;
            let Expression::Call(call) = checked else {
                unreachable!("call statement did not check to a call");
            };
            Ok(Asgn::Call(call))
        }
    }
}

fn check_assignable(dst: &Expression<TypeInfo>, position: &Span) -> SemResult<()> {
    if !is_lvalue(dst) {
        return Err(SemanticError::NotAnLvalue {
            position: position.clone(),
        });
    }
    if etype(dst).mutability != Mutability::Var {
        return Err(SemanticError::ImmutableAssign {
            position: position.clone(),
        });
    }
    Ok(())
}

//---------------------------- Flow analysis -----------------------------------

pub(crate) fn always_returns<T>(stat: &Statement<T>) -> bool {
    match stat {
        Statement::Return(_) | Statement::Terminate(_) => true,
        Statement::Block(block) => block.stats.iter().any(always_returns),
        Statement::If(fi) => match &fi.else_body {
            Some(else_body) => always_returns(&fi.body) && always_returns(else_body),
            None => false,
        },
        Statement::Switch(swich) => swich.always_returns,
        _ => false,
    }
}

pub(crate) fn block_always_returns<T>(block: &Block<T>) -> bool {
    block.stats.iter().any(always_returns)
}

/// A switch case must end in a control transfer; falling off the end of a
/// case is an error rather than implicit fallthrough.
fn case_terminates<T>(stat: &Statement<T>) -> bool {
    match stat {
        Statement::Break(_)
        | Statement::Continue(_)
        | Statement::Return(_)
        | Statement::Terminate(_) => true,
        Statement::Block(block) => block.stats.last().map_or(false, case_terminates),
        Statement::If(fi) => match &fi.else_body {
            Some(else_body) => case_terminates(&fi.body) && case_terminates(else_body),
            None => false,
        },
        Statement::Switch(swich) => swich.always_returns,
        _ => false,
    }
}

//----------------------------- Warnings ---------------------------------------

/// Emits unused-symbol warnings for the current scope before it is left.
pub(crate) fn warn_unused_locals(ctx: &mut Ctx) {
    let scope = ctx.scopes.cur();
    let borrowed = scope.borrow();
    for symbols in borrowed.table.values() {
        for symbol in symbols {
            let sym = symbol.borrow();
            if !sym.referenced {
                crate::diagnostics::report(
                    ctx.sink,
                    crate::diagnostics::Severity::Warning,
                    crate::diagnostics::Category::Semantic,
                    Some(&ctx.module),
                    Some(sym.position.clone()),
                    format!("Unused symbol \"{}\"", sym.name),
                );
            }
        }
    }
}
