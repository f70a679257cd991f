//! Statement lowering.
//!
//! Every edge that leaves a scope (fallthrough, break, continue, return)
//! runs the destructors of the objects the left frames own, in reverse
//! declaration order. Loops are the standard header/body/latch/exit block
//! shapes; switches dispatch through a chain of equality tests where
//! `continue` falls through to the next case body.

use inkwell::values::BasicValueEnum;

use crate::parser::ast::*;
use crate::semantic::{etype, Type, TypeInfo};

use super::compare::{eq_at, scalar_eq};
use super::expr::{
    assign_from, entry_alloca, gen_addr, gen_bool, gen_expr, gen_into, gen_value,
};
use super::lifetime::{call_panic, destroy};
use super::types::{lower_type, trivially_copyable};
use super::{CodegenContext, FnCtx, Frame, FrameKind};

/// Emits a function (or lambda) body into the current position and closes
/// the function with the implicit epilogue.
pub(crate) fn gen_body<'ctx>(cg: &CodegenContext<'ctx>, fcx: &mut FnCtx<'ctx>, body: &Block<TypeInfo>) {
    for stat in &body.stats {
        if cg.terminated() {
            return;
        }
        gen_stat(cg, fcx, stat);
    }
    if !cg.terminated() {
        destroy_frames(cg, fcx, fcx.frames.len());
        if fcx.ret_ty == Type::Void {
            cg.builder.build_return(None).unwrap();
        } else {
            // the analyzer proved every path returns
            cg.builder.build_unreachable().unwrap();
        }
    }
}

/// Destroys the owned objects of the top `count` frames without popping
/// them; used on control edges that leave those scopes.
fn destroy_frames<'ctx>(cg: &CodegenContext<'ctx>, fcx: &FnCtx<'ctx>, count: usize) {
    for frame in fcx.frames.iter().rev().take(count) {
        destroy_frame(cg, frame);
    }
}

fn destroy_frame<'ctx>(cg: &CodegenContext<'ctx>, frame: &Frame<'ctx>) {
    for (ty, addr) in frame.owned.iter().rev() {
        destroy(cg, ty, *addr);
    }
}

pub(crate) fn gen_stat<'ctx>(cg: &CodegenContext<'ctx>, fcx: &mut FnCtx<'ctx>, stat: &Statement<TypeInfo>) {
    match stat {
        Statement::Block(block) => {
            fcx.push(FrameKind::Block);
            for stat in &block.stats {
                if cg.terminated() {
                    break;
                }
                gen_stat(cg, fcx, stat);
            }
            if !cg.terminated() {
                destroy_frame(cg, fcx.frames.last().expect("missing block frame"));
            }
            fcx.pop();
        }
        Statement::If(fi) => gen_if(cg, fcx, fi),
        Statement::Switch(swich) => gen_switch(cg, fcx, swich),
        Statement::While(wile) => gen_while(cg, fcx, wile),
        Statement::For(four) => gen_for(cg, fcx, four),
        Statement::Return(ret) => gen_return(cg, fcx, ret),
        Statement::Break(_) => gen_break(cg, fcx),
        Statement::Continue(_) => gen_continue(cg, fcx),
        Statement::Terminate(_) => call_panic(cg, "Execution terminated"),
        Statement::Asgn(asgn) => gen_asgn(cg, fcx, asgn),
        Statement::Var(var) => gen_local_var(cg, fcx, var),
        Statement::Type(_) | Statement::Empty(_) => {}
    }
}

fn gen_if<'ctx>(cg: &CodegenContext<'ctx>, fcx: &mut FnCtx<'ctx>, fi: &If<TypeInfo>) {
    let then_block = cg.context.append_basic_block(fcx.function, "then");
    let else_block = cg.context.append_basic_block(fcx.function, "else");
    let merge_block = cg.context.append_basic_block(fcx.function, "merge");

    let cond = gen_bool(cg, fcx, &fi.cond);
    cg.builder
        .build_conditional_branch(cond, then_block, else_block)
        .unwrap();

    cg.builder.position_at_end(then_block);
    gen_stat(cg, fcx, &fi.body);
    if !cg.terminated() {
        cg.builder.build_unconditional_branch(merge_block).unwrap();
    }

    cg.builder.position_at_end(else_block);
    if let Some(else_body) = &fi.else_body {
        gen_stat(cg, fcx, else_body);
    }
    if !cg.terminated() {
        cg.builder.build_unconditional_branch(merge_block).unwrap();
    }

    cg.builder.position_at_end(merge_block);
}

fn gen_while<'ctx>(cg: &CodegenContext<'ctx>, fcx: &mut FnCtx<'ctx>, wile: &While<TypeInfo>) {
    let cond_block = cg.context.append_basic_block(fcx.function, "cond");
    let body_block = cg.context.append_basic_block(fcx.function, "body");
    let exit_block = cg.context.append_basic_block(fcx.function, "exit");

    cg.builder.build_unconditional_branch(cond_block).unwrap();

    cg.builder.position_at_end(cond_block);
    let cond = gen_bool(cg, fcx, &wile.cond);
    cg.builder
        .build_conditional_branch(cond, body_block, exit_block)
        .unwrap();

    cg.builder.position_at_end(body_block);
    fcx.push(FrameKind::Loop {
        break_to: exit_block,
        continue_to: cond_block,
    });
    gen_stat(cg, fcx, &wile.body);
    if !cg.terminated() {
        destroy_frame(cg, fcx.frames.last().expect("missing loop frame"));
        cg.builder.build_unconditional_branch(cond_block).unwrap();
    }
    fcx.pop();

    cg.builder.position_at_end(exit_block);
}

fn gen_for<'ctx>(cg: &CodegenContext<'ctx>, fcx: &mut FnCtx<'ctx>, four: &For<TypeInfo>) {
    let cond_block = cg.context.append_basic_block(fcx.function, "cond");
    let body_block = cg.context.append_basic_block(fcx.function, "body");
    let latch_block = cg.context.append_basic_block(fcx.function, "latch");
    let exit_block = cg.context.append_basic_block(fcx.function, "exit");

    // the init object lives for the whole loop
    fcx.push(FrameKind::Block);
    if let Some(init) = &four.init {
        gen_asgn(cg, fcx, init);
    }
    cg.builder.build_unconditional_branch(cond_block).unwrap();

    cg.builder.position_at_end(cond_block);
    let cond = gen_bool(cg, fcx, &four.cond);
    cg.builder
        .build_conditional_branch(cond, body_block, exit_block)
        .unwrap();

    cg.builder.position_at_end(body_block);
    fcx.push(FrameKind::Loop {
        break_to: exit_block,
        continue_to: latch_block,
    });
    gen_stat(cg, fcx, &four.body);
    if !cg.terminated() {
        destroy_frame(cg, fcx.frames.last().expect("missing loop frame"));
        cg.builder.build_unconditional_branch(latch_block).unwrap();
    }
    fcx.pop();

    cg.builder.position_at_end(latch_block);
    if let Some(incr) = &four.incr {
        gen_asgn(cg, fcx, incr);
    }
    cg.builder.build_unconditional_branch(cond_block).unwrap();

    cg.builder.position_at_end(exit_block);
    destroy_frame(cg, fcx.frames.last().expect("missing for frame"));
    fcx.pop();
}

fn gen_switch<'ctx>(cg: &CodegenContext<'ctx>, fcx: &mut FnCtx<'ctx>, swich: &Switch<TypeInfo>) {
    let scrutinee_ty = etype(&swich.expr).ty.clone();
    let scalar = trivially_copyable(&scrutinee_ty) && scrutinee_ty.concrete().is_builtin();
    let scrutinee_value: Option<BasicValueEnum> = if scalar {
        Some(gen_value(cg, fcx, &swich.expr))
    } else {
        None
    };
    let scrutinee_addr = if scalar {
        None
    } else {
        Some(gen_addr(cg, fcx, &swich.expr))
    };

    let body_blocks: Vec<_> = swich
        .cases
        .iter()
        .map(|_| cg.context.append_basic_block(fcx.function, "case"))
        .collect();
    let exit_block = cg.context.append_basic_block(fcx.function, "exit");

    let default_index = swich.cases.iter().position(|case| case.expr.is_none());
    let default_target = default_index
        .map(|index| body_blocks[index])
        .unwrap_or(exit_block);

    // the dispatch chain tests each labelled case in order
    let tests: Vec<usize> = (0..swich.cases.len())
        .filter(|&i| swich.cases[i].expr.is_some())
        .collect();
    for (pos, &case_index) in tests.iter().enumerate() {
        let case = &swich.cases[case_index];
        let case_expr = case.expr.as_ref().expect("labelled case without expression");
        let matches = if scalar {
            let case_value = gen_value(cg, fcx, case_expr);
            scalar_eq(
                cg,
                &scrutinee_ty,
                scrutinee_value.expect("missing scrutinee value"),
                case_value,
            )
        } else {
            let case_addr = gen_addr(cg, fcx, case_expr);
            eq_at(
                cg,
                &scrutinee_ty,
                scrutinee_addr.expect("missing scrutinee address"),
                case_addr,
            )
        };
        let next = if pos + 1 < tests.len() {
            cg.context.append_basic_block(fcx.function, "test")
        } else {
            default_target
        };
        cg.builder
            .build_conditional_branch(matches, body_blocks[case_index], next)
            .unwrap();
        if pos + 1 < tests.len() {
            cg.builder.position_at_end(next);
        }
    }
    if tests.is_empty() {
        cg.builder
            .build_unconditional_branch(default_target)
            .unwrap();
    }

    for (index, case) in swich.cases.iter().enumerate() {
        cg.builder.position_at_end(body_blocks[index]);
        // `continue` falls through to the following case body
        let next_case = body_blocks.get(index + 1).copied();
        fcx.push(FrameKind::Switch {
            break_to: exit_block,
            next_case,
        });
        gen_stat(cg, fcx, &case.body);
        if !cg.terminated() {
            // the analyzer requires terminated cases; this is unreachable
            destroy_frame(cg, fcx.frames.last().expect("missing switch frame"));
            cg.builder.build_unconditional_branch(exit_block).unwrap();
        }
        fcx.pop();
    }

    cg.builder.position_at_end(exit_block);
    if swich.always_returns {
        // no merge: every case returned
        cg.builder.build_unreachable().unwrap();
    }
}

fn gen_return<'ctx>(cg: &CodegenContext<'ctx>, fcx: &mut FnCtx<'ctx>, ret: &Return<TypeInfo>) {
    match &ret.expr {
        None => {
            destroy_frames(cg, fcx, fcx.frames.len());
            cg.builder.build_return(None).unwrap();
        }
        Some(expr) => {
            let ty = fcx.ret_ty.clone();
            if trivially_copyable(&ty) {
                let value = gen_value(cg, fcx, expr);
                destroy_frames(cg, fcx, fcx.frames.len());
                cg.builder.build_return(Some(&value)).unwrap();
            } else {
                // construct the return value before the scopes unwind; a
                // returned local is copied, a temporary is moved
                let slot = entry_alloca(cg, fcx, lower_type(cg, &ty), "ret_slot");
                gen_into(cg, fcx, expr, slot);
                destroy_frames(cg, fcx, fcx.frames.len());
                let value = cg
                    .builder
                    .build_load(lower_type(cg, &ty), slot, "ret_value")
                    .unwrap();
                cg.builder.build_return(Some(&value)).unwrap();
            }
        }
    }
}

fn gen_break<'ctx>(cg: &CodegenContext<'ctx>, fcx: &mut FnCtx<'ctx>) {
    let mut count = 0;
    for frame in fcx.frames.iter().rev() {
        count += 1;
        match &frame.kind {
            FrameKind::Loop { break_to, .. } | FrameKind::Switch { break_to, .. } => {
                destroy_frames(cg, fcx, count);
                cg.builder.build_unconditional_branch(*break_to).unwrap();
                return;
            }
            _ => {}
        }
    }
    unreachable!("break outside of a loop or switch survived analysis");
}

fn gen_continue<'ctx>(cg: &CodegenContext<'ctx>, fcx: &mut FnCtx<'ctx>) {
    let mut count = 0;
    for frame in fcx.frames.iter().rev() {
        count += 1;
        match &frame.kind {
            FrameKind::Loop { continue_to, .. } => {
                destroy_frames(cg, fcx, count);
                cg.builder.build_unconditional_branch(*continue_to).unwrap();
                return;
            }
            FrameKind::Switch {
                break_to,
                next_case,
            } => {
                destroy_frames(cg, fcx, count);
                let target = (*next_case).unwrap_or(*break_to);
                cg.builder.build_unconditional_branch(target).unwrap();
                return;
            }
            _ => {}
        }
    }
    unreachable!("continue outside of a loop or switch survived analysis");
}

fn gen_asgn<'ctx>(cg: &CodegenContext<'ctx>, fcx: &mut FnCtx<'ctx>, asgn: &Asgn<TypeInfo>) {
    match asgn {
        Asgn::Assign { dst, src, .. } => {
            let ty = etype(dst).ty.clone();
            let dst_addr = gen_addr(cg, fcx, dst);
            let src_gen = gen_expr(cg, fcx, src).expect("void expression assigned");
            assign_from(cg, &ty, dst_addr, src_gen);
        }
        Asgn::Compound { dst, oper, src, .. } => gen_compound(cg, fcx, dst, *oper, src),
        Asgn::IncrDecr { expr, incr, .. } => gen_incr_decr(cg, fcx, expr, *incr),
        Asgn::DeclAssign { expr, object, name, .. } => {
            let ty = etype(expr).ty.clone();
            let slot = entry_alloca(cg, fcx, lower_type(cg, &ty), name);
            gen_into(cg, fcx, expr, slot);
            cg.bind_object(object.expect("unresolved declaration"), slot);
            if !trivially_copyable(&ty) {
                fcx.own(ty, slot);
            }
        }
        Asgn::Call(call) => {
            let _ = super::expr::gen_call(cg, fcx, call);
        }
    }
}

fn gen_compound<'ctx>(
    cg: &CodegenContext<'ctx>,
    fcx: &mut FnCtx<'ctx>,
    dst: &Expression<TypeInfo>,
    oper: AssignOp,
    src: &Expression<TypeInfo>,
) {
    let ty = etype(dst).ty.concrete().clone();
    let dst_addr = gen_addr(cg, fcx, dst);
    let lowered = lower_type(cg, &ty);
    let current = cg.builder.build_load(lowered, dst_addr, "current").unwrap();
    let operand = gen_value(cg, fcx, src);

    let updated: BasicValueEnum = if ty == Type::Real {
        let lhs = current.into_float_value();
        let rhs = operand.into_float_value();
        match oper {
            AssignOp::Add => cg.builder.build_float_add(lhs, rhs, "sum").unwrap().into(),
            AssignOp::Sub => cg.builder.build_float_sub(lhs, rhs, "diff").unwrap().into(),
            AssignOp::Mul => cg.builder.build_float_mul(lhs, rhs, "prod").unwrap().into(),
            AssignOp::Div => cg.builder.build_float_div(lhs, rhs, "quot").unwrap().into(),
            AssignOp::Mod => cg.builder.build_float_rem(lhs, rhs, "rem").unwrap().into(),
            _ => unreachable!("float compound operator {oper:?}"),
        }
    } else {
        let signed = ty.is_signed();
        let lhs = current.into_int_value();
        let rhs = operand.into_int_value();
        match oper {
            AssignOp::Add => cg.builder.build_int_add(lhs, rhs, "sum").unwrap().into(),
            AssignOp::Sub => cg.builder.build_int_sub(lhs, rhs, "diff").unwrap().into(),
            AssignOp::Mul => cg.builder.build_int_mul(lhs, rhs, "prod").unwrap().into(),
            AssignOp::Div if signed => cg
                .builder
                .build_int_signed_div(lhs, rhs, "quot")
                .unwrap()
                .into(),
            AssignOp::Div => cg
                .builder
                .build_int_unsigned_div(lhs, rhs, "quot")
                .unwrap()
                .into(),
            AssignOp::Mod if signed => cg
                .builder
                .build_int_signed_rem(lhs, rhs, "rem")
                .unwrap()
                .into(),
            AssignOp::Mod => cg
                .builder
                .build_int_unsigned_rem(lhs, rhs, "rem")
                .unwrap()
                .into(),
            AssignOp::BitOr => cg.builder.build_or(lhs, rhs, "or").unwrap().into(),
            AssignOp::BitXor => cg.builder.build_xor(lhs, rhs, "xor").unwrap().into(),
            AssignOp::BitAnd => cg.builder.build_and(lhs, rhs, "and").unwrap().into(),
            AssignOp::BitShl => cg.builder.build_left_shift(lhs, rhs, "shl").unwrap().into(),
            AssignOp::BitShr => cg
                .builder
                .build_right_shift(lhs, rhs, false, "shr")
                .unwrap()
                .into(),
        }
    };
    cg.builder.build_store(dst_addr, updated).unwrap();
}

fn gen_incr_decr<'ctx>(
    cg: &CodegenContext<'ctx>,
    fcx: &mut FnCtx<'ctx>,
    expr: &Expression<TypeInfo>,
    incr: bool,
) {
    let ty = etype(expr).ty.concrete().clone();
    let addr = gen_addr(cg, fcx, expr);
    let lowered = lower_type(cg, &ty);
    let current = cg.builder.build_load(lowered, addr, "current").unwrap();
    let updated: BasicValueEnum = if ty == Type::Real {
        let one = cg.context.f32_type().const_float(1.0);
        if incr {
            cg.builder
                .build_float_add(current.into_float_value(), one, "next")
                .unwrap()
                .into()
        } else {
            cg.builder
                .build_float_sub(current.into_float_value(), one, "next")
                .unwrap()
                .into()
        }
    } else {
        let int = current.into_int_value();
        let one = int.get_type().const_int(1, false);
        if incr {
            cg.builder.build_int_add(int, one, "next").unwrap().into()
        } else {
            cg.builder.build_int_sub(int, one, "next").unwrap().into()
        }
    };
    cg.builder.build_store(addr, updated).unwrap();
}

pub(crate) fn gen_local_var<'ctx>(
    cg: &CodegenContext<'ctx>,
    fcx: &mut FnCtx<'ctx>,
    var: &VarDecl<TypeInfo>,
) {
    let object = var.object.expect("unresolved local declaration");
    let ty = var
        .resolved_ty
        .clone()
        .expect("local declaration without a resolved type");
    let slot = entry_alloca(cg, fcx, lower_type(cg, &ty), &var.name);
    match &var.expr {
        Some(expr) => gen_into(cg, fcx, expr, slot),
        None => super::lifetime::def_construct(cg, &ty, slot),
    }
    cg.bind_object(object, slot);
    if !trivially_copyable(&ty) {
        fcx.own(ty, slot);
    }
}
