//! Expression lowering.
//!
//! Three modes: value mode produces an SSA value, address mode a pointer to
//! a location, discard mode only the side effects. Value categories drive
//! construct-vs-assign and copy-vs-move: named objects are lvalues,
//! materialized temporaries are xvalues registered with the current frame so
//! they are destroyed when the scope ends (moved-from temporaries destroy as
//! no-ops), and scalar results are prvalues.

use inkwell::{
    types::{BasicType, BasicTypeEnum},
    values::{BasicMetadataValueEnum, BasicValueEnum, FunctionValue, IntValue, PointerValue},
    AddressSpace, IntPredicate,
};

use crate::parser::ast::*;
use crate::semantic::{
    etype, BuiltinFunc, CallTarget, Definition, FuncSymbol, SymbolKind, Type, TypeInfo,
};

use super::compare::{bool_at, eq_at, lt_at, scalar_eq, scalar_lt};
use super::lifetime::{
    self, call_value, call_void, copy_assign, copy_construct, elem_gep, instance, move_assign,
    move_construct,
};
use super::types::{
    closure_data_type, closure_value_type, lower_type, trivially_copyable, ARRAY_IDX_CAP,
    ARRAY_IDX_DAT, ARRAY_IDX_LEN, CLOSURE_DATA_CAPTURE_BASE,
};
use super::{CodegenContext, FnCtx, Inst};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ValueCat {
    LValue,
    XValue,
    PRValue,
}

/// A lowered expression: for glvalues `val` is a pointer to the object, for
/// prvalues it is the value itself.
#[derive(Debug, Clone, Copy)]
pub(crate) struct GenExpr<'ctx> {
    pub val: BasicValueEnum<'ctx>,
    pub cat: ValueCat,
}

impl<'ctx> GenExpr<'ctx> {
    fn lvalue(ptr: PointerValue<'ctx>) -> GenExpr<'ctx> {
        GenExpr {
            val: ptr.into(),
            cat: ValueCat::LValue,
        }
    }

    fn xvalue(ptr: PointerValue<'ctx>) -> GenExpr<'ctx> {
        GenExpr {
            val: ptr.into(),
            cat: ValueCat::XValue,
        }
    }

    fn prvalue(val: BasicValueEnum<'ctx>) -> GenExpr<'ctx> {
        GenExpr {
            val,
            cat: ValueCat::PRValue,
        }
    }

    pub fn ptr(&self) -> PointerValue<'ctx> {
        match self.cat {
            ValueCat::PRValue => unreachable!("prvalue has no address"),
            _ => self.val.into_pointer_value(),
        }
    }
}

/// Allocas live in the entry block so that loops do not grow the stack.
pub(crate) fn entry_alloca<'ctx>(
    cg: &CodegenContext<'ctx>,
    fcx: &FnCtx<'ctx>,
    ty: BasicTypeEnum<'ctx>,
    name: &str,
) -> PointerValue<'ctx> {
    let builder = cg.context.create_builder();
    let entry = fcx
        .function
        .get_first_basic_block()
        .expect("function without an entry block");
    match entry.get_first_instruction() {
        Some(first) => builder.position_before(&first),
        None => builder.position_at_end(entry),
    }
    builder.build_alloca(ty, name).unwrap()
}

/// Constructs `dst` from a lowered source following the value category:
/// trivial types store, lvalues copy-construct, expiring values move.
pub(crate) fn construct_from<'ctx>(
    cg: &CodegenContext<'ctx>,
    ty: &Type,
    dst: PointerValue<'ctx>,
    src: GenExpr<'ctx>,
) {
    if trivially_copyable(ty) {
        let value = match src.cat {
            ValueCat::PRValue => src.val,
            _ => cg
                .builder
                .build_load(lower_type(cg, ty), src.ptr(), "tmp")
                .unwrap(),
        };
        cg.builder.build_store(dst, value).unwrap();
        return;
    }
    match src.cat {
        ValueCat::LValue => copy_construct(cg, ty, dst, src.ptr()),
        ValueCat::XValue => move_construct(cg, ty, dst, src.ptr()),
        ValueCat::PRValue => unreachable!("aggregate prvalues are materialized"),
    }
}

/// Assigns an already-initialized destination.
pub(crate) fn assign_from<'ctx>(
    cg: &CodegenContext<'ctx>,
    ty: &Type,
    dst: PointerValue<'ctx>,
    src: GenExpr<'ctx>,
) {
    if trivially_copyable(ty) {
        let value = match src.cat {
            ValueCat::PRValue => src.val,
            _ => cg
                .builder
                .build_load(lower_type(cg, ty), src.ptr(), "tmp")
                .unwrap(),
        };
        cg.builder.build_store(dst, value).unwrap();
        return;
    }
    match src.cat {
        ValueCat::LValue => copy_assign(cg, ty, dst, src.ptr()),
        ValueCat::XValue => move_assign(cg, ty, dst, src.ptr()),
        ValueCat::PRValue => unreachable!("aggregate prvalues are materialized"),
    }
}

//------------------------------- Entry points ---------------------------------

/// Lowers an expression in its natural mode. `None` only for void calls.
pub(crate) fn gen_expr<'ctx>(
    cg: &CodegenContext<'ctx>,
    fcx: &mut FnCtx<'ctx>,
    expr: &Expression<TypeInfo>,
) -> Option<GenExpr<'ctx>> {
    match expr {
        Expression::Id(id) => Some(gen_id(cg, fcx, id)),
        Expression::Literal(lit) => gen_literal(cg, fcx, lit),
        Expression::Binary(bin) => Some(gen_binary(cg, fcx, bin)),
        Expression::Unary(un) => Some(gen_unary(cg, fcx, un)),
        Expression::Member(mem) => Some(gen_member(cg, fcx, mem)),
        Expression::Subscript(sub) => Some(gen_subscript(cg, fcx, sub)),
        Expression::Ternary(tern) => gen_ternary(cg, fcx, tern),
        Expression::Make(make) => Some(gen_make(cg, fcx, make)),
        Expression::Call(call) => gen_call(cg, fcx, call),
    }
}

/// Value mode: the SSA value of the expression.
pub(crate) fn gen_value<'ctx>(
    cg: &CodegenContext<'ctx>,
    fcx: &mut FnCtx<'ctx>,
    expr: &Expression<TypeInfo>,
) -> BasicValueEnum<'ctx> {
    let ty = &etype(expr).ty;
    let lowered = lower_type(cg, ty);
    let gen = gen_expr(cg, fcx, expr).expect("void expression used as a value");
    match gen.cat {
        ValueCat::PRValue => gen.val,
        _ => cg.builder.build_load(lowered, gen.ptr(), "value").unwrap(),
    }
}

/// Address mode: a pointer to the expression's object, materializing
/// scalar temporaries as needed.
pub(crate) fn gen_addr<'ctx>(
    cg: &CodegenContext<'ctx>,
    fcx: &mut FnCtx<'ctx>,
    expr: &Expression<TypeInfo>,
) -> PointerValue<'ctx> {
    let gen = gen_expr(cg, fcx, expr).expect("void expression used as a location");
    match gen.cat {
        ValueCat::PRValue => {
            let ty = &etype(expr).ty;
            let slot = entry_alloca(cg, fcx, lower_type(cg, ty), "scalar_tmp");
            cg.builder.build_store(slot, gen.val).unwrap();
            slot
        }
        _ => gen.ptr(),
    }
}

/// Discard mode: evaluate for side effects; temporaries die with the scope.
pub(crate) fn gen_discard<'ctx>(
    cg: &CodegenContext<'ctx>,
    fcx: &mut FnCtx<'ctx>,
    expr: &Expression<TypeInfo>,
) {
    let _ = gen_expr(cg, fcx, expr);
}

/// Condition helper: an i1 from a bool-typed expression.
pub(crate) fn gen_bool<'ctx>(
    cg: &CodegenContext<'ctx>,
    fcx: &mut FnCtx<'ctx>,
    expr: &Expression<TypeInfo>,
) -> IntValue<'ctx> {
    let value = gen_value(cg, fcx, expr).into_int_value();
    cg.builder
        .build_int_compare(IntPredicate::NE, value, cg.context.i8_type().const_zero(), "cond")
        .unwrap()
}

fn i1_to_bool<'ctx>(cg: &CodegenContext<'ctx>, flag: IntValue<'ctx>) -> BasicValueEnum<'ctx> {
    cg.builder
        .build_int_z_extend(flag, cg.context.i8_type(), "bool")
        .unwrap()
        .into()
}

/// Constructs the expression directly into `dst`, avoiding a temporary for
/// the forms that can build in place.
pub(crate) fn gen_into<'ctx>(
    cg: &CodegenContext<'ctx>,
    fcx: &mut FnCtx<'ctx>,
    expr: &Expression<TypeInfo>,
    dst: PointerValue<'ctx>,
) {
    let ty = etype(expr).ty.clone();
    match expr {
        Expression::Literal(Literal::Array(lit)) => build_array_literal(cg, fcx, lit, dst),
        Expression::Literal(Literal::String(lit)) => build_string_literal(cg, lit, dst),
        Expression::Literal(Literal::Lambda(lit)) => build_lambda(cg, fcx, lit, dst),
        Expression::Literal(Literal::InitList(lit)) => build_init_list(cg, fcx, lit, &ty, dst),
        Expression::Ternary(tern) => {
            if gen_ternary_into(cg, fcx, tern, dst).is_none() {
                unreachable!("void ternary constructed into a location")
            }
        }
        Expression::Make(make) if !make.cast => {
            gen_into(cg, fcx, &make.expr, dst);
        }
        _ => {
            let src = gen_expr(cg, fcx, expr).expect("void expression used as an initializer");
            construct_from(cg, &ty, dst, src);
        }
    }
}

//------------------------------- Identifiers ----------------------------------

fn gen_id<'ctx>(
    cg: &CodegenContext<'ctx>,
    fcx: &mut FnCtx<'ctx>,
    id: &Id<TypeInfo>,
) -> GenExpr<'ctx> {
    match id
        .definition
        .as_ref()
        .expect("unresolved identifier survived analysis")
    {
        Definition::Object(object) => {
            if let Some(index) = id.capture_index {
                let capture_tys: Vec<Type> =
                    fcx.captures.iter().map(|c| c.ty.clone()).collect();
                let data_ty = closure_data_type(cg, &capture_tys);
                let env = fcx.env_ptr.expect("captured variable outside a lambda");
                let slot = cg
                    .builder
                    .build_struct_gep(data_ty, env, CLOSURE_DATA_CAPTURE_BASE + index, "capture")
                    .unwrap();
                GenExpr::lvalue(slot)
            } else {
                GenExpr::lvalue(cg.object_addr(*object))
            }
        }
        Definition::Func(symbol) => {
            // wrap the function in a dataless closure value
            let mangled = {
                let borrowed = symbol.borrow();
                let SymbolKind::Func(func) = &borrowed.kind else {
                    unreachable!("function reference without function symbol");
                };
                func.mangled.clone()
            };
            let target = cg
                .module
                .get_function(&mangled)
                .expect("referenced function not declared");
            let slot = entry_alloca(cg, fcx, closure_value_type(cg).into(), "fn_value");
            let value_ty = closure_value_type(cg);
            let fn_slot = cg
                .builder
                .build_struct_gep(value_ty, slot, 0, "fn_slot")
                .unwrap();
            let data_slot = cg
                .builder
                .build_struct_gep(value_ty, slot, 1, "data_slot")
                .unwrap();
            cg.builder
                .build_store(fn_slot, target.as_global_value().as_pointer_value())
                .unwrap();
            cg.builder
                .build_store(
                    data_slot,
                    cg.context.ptr_type(AddressSpace::default()).const_null(),
                )
                .unwrap();
            GenExpr::xvalue(slot)
        }
    }
}

//-------------------------------- Literals ------------------------------------

fn gen_literal<'ctx>(
    cg: &CodegenContext<'ctx>,
    fcx: &mut FnCtx<'ctx>,
    lit: &Literal<TypeInfo>,
) -> Option<GenExpr<'ctx>> {
    match lit {
        Literal::Number(num) => Some(GenExpr::prvalue(number_const(cg, num))),
        Literal::Bool(node) => Some(GenExpr::prvalue(
            cg.context
                .i8_type()
                .const_int(node.value as u64, false)
                .into(),
        )),
        Literal::Char(node) => Some(GenExpr::prvalue(
            cg.context
                .i8_type()
                .const_int(node.value as u64, false)
                .into(),
        )),
        Literal::String(node) => {
            let ty = Type::Array(Box::new(Type::Char));
            let slot = entry_alloca(cg, fcx, lower_type(cg, &ty), "string");
            build_string_literal(cg, node, slot);
            fcx.own(ty, slot);
            Some(GenExpr::xvalue(slot))
        }
        Literal::Array(node) => {
            let ty = etype_of_lit(lit);
            let slot = entry_alloca(cg, fcx, lower_type(cg, &ty), "array");
            build_array_literal(cg, fcx, node, slot);
            fcx.own(ty, slot);
            Some(GenExpr::xvalue(slot))
        }
        Literal::Lambda(node) => {
            let ty = etype_of_lit(lit);
            let slot = entry_alloca(cg, fcx, lower_type(cg, &ty), "closure");
            build_lambda(cg, fcx, node, slot);
            fcx.own(ty, slot);
            Some(GenExpr::xvalue(slot))
        }
        Literal::InitList(node) => {
            let ty = etype_of_lit(lit);
            let slot = entry_alloca(cg, fcx, lower_type(cg, &ty), "aggregate");
            build_init_list(cg, fcx, node, &ty, slot);
            if !trivially_copyable(&ty) {
                fcx.own(ty, slot);
            }
            Some(GenExpr::xvalue(slot))
        }
    }
}

fn etype_of_lit(lit: &Literal<TypeInfo>) -> Type {
    lit.info().etype.ty.clone()
}

fn number_const<'ctx>(cg: &CodegenContext<'ctx>, num: &NumberLit<TypeInfo>) -> BasicValueEnum<'ctx> {
    let ty = num.info.etype.ty.concrete();
    match (&num.value, ty) {
        (NumberValue::Real(v), _) => cg.context.f32_type().const_float(*v).into(),
        (NumberValue::Int(v), Type::Real) => cg.context.f32_type().const_float(*v as f64).into(),
        (NumberValue::Int(v), Type::Byte | Type::Char) => {
            cg.context.i8_type().const_int(*v as u64 & 0xff, false).into()
        }
        (NumberValue::Int(v), _) => cg
            .context
            .i32_type()
            .const_int(*v as u32 as u64, false)
            .into(),
        (NumberValue::Uint(v), _) => cg.context.i32_type().const_int(*v, false).into(),
    }
}

fn build_string_literal<'ctx>(
    cg: &CodegenContext<'ctx>,
    lit: &StringLit<TypeInfo>,
    dst: PointerValue<'ctx>,
) {
    let char_array = Type::Array(Box::new(Type::Char));
    let len = cg
        .context
        .i32_type()
        .const_int(lit.value.len() as u64, false);
    let len_ctor = instance(cg, Inst::ArrLenCtor, &char_array);
    let dat = call_value(cg, len_ctor, &[dst.into(), len.into()], "dat").into_pointer_value();
    if !lit.value.is_empty() {
        let text = cg
            .builder
            .build_global_string_ptr(&lit.value, "str")
            .unwrap()
            .as_pointer_value();
        let bytes = cg
            .context
            .i64_type()
            .const_int(lit.value.len() as u64, false);
        cg.builder.build_memcpy(dat, 1, text, 1, bytes).unwrap();
    }
}

fn build_array_literal<'ctx>(
    cg: &CodegenContext<'ctx>,
    fcx: &mut FnCtx<'ctx>,
    lit: &ArrayLit<TypeInfo>,
    dst: PointerValue<'ctx>,
) {
    let ty = lit.info.etype.ty.clone();
    let Type::Array(elem) = ty.concrete().clone() else {
        unreachable!("array literal of non-array type");
    };
    let len = cg
        .context
        .i32_type()
        .const_int(lit.exprs.len() as u64, false);
    let len_ctor = instance(cg, Inst::ArrLenCtor, ty.concrete());
    let dat = call_value(cg, len_ctor, &[dst.into(), len.into()], "dat").into_pointer_value();
    for (index, expr) in lit.exprs.iter().enumerate() {
        let index = cg.context.i32_type().const_int(index as u64, false);
        let slot = elem_gep(cg, &elem, dat, index);
        gen_into(cg, fcx, expr, slot);
    }
}

fn build_init_list<'ctx>(
    cg: &CodegenContext<'ctx>,
    fcx: &mut FnCtx<'ctx>,
    lit: &InitList<TypeInfo>,
    ty: &Type,
    dst: PointerValue<'ctx>,
) {
    if lit.exprs.is_empty() {
        lifetime::def_construct(cg, ty, dst);
        return;
    }
    let Type::Struct { fields } = ty.concrete() else {
        unreachable!("non-empty initializer list for {ty:?}");
    };
    let lowered = lower_type(cg, ty).into_struct_type();
    for (index, (expr, field)) in lit.exprs.iter().zip(fields.iter()).enumerate() {
        let slot = cg
            .builder
            .build_struct_gep(lowered, dst, index as u32, &field.name)
            .unwrap();
        gen_into(cg, fcx, expr, slot);
    }
}

//-------------------------------- Operators -----------------------------------

fn gen_binary<'ctx>(
    cg: &CodegenContext<'ctx>,
    fcx: &mut FnCtx<'ctx>,
    bin: &Binary<TypeInfo>,
) -> GenExpr<'ctx> {
    use crate::parser::ast::BinOp::*;

    match bin.oper {
        BoolAnd | BoolOr => return gen_short_circuit(cg, fcx, bin),
        Eq | Ne | Lt | Le | Gt | Ge => return gen_comparison(cg, fcx, bin),
        _ => {}
    }

    let ty = etype(&bin.lhs).ty.concrete().clone();
    let lhs = gen_value(cg, fcx, &bin.lhs);
    let rhs = gen_value(cg, fcx, &bin.rhs);

    let result: BasicValueEnum = if ty == Type::Real {
        let lhs = lhs.into_float_value();
        let rhs = rhs.into_float_value();
        match bin.oper {
            Add => cg.builder.build_float_add(lhs, rhs, "sum").unwrap().into(),
            Sub => cg.builder.build_float_sub(lhs, rhs, "diff").unwrap().into(),
            Mul => cg.builder.build_float_mul(lhs, rhs, "prod").unwrap().into(),
            Div => cg.builder.build_float_div(lhs, rhs, "quot").unwrap().into(),
            Mod => cg.builder.build_float_rem(lhs, rhs, "rem").unwrap().into(),
            _ => unreachable!("float operator {:?}", bin.oper),
        }
    } else {
        let signed = ty.is_signed();
        let lhs = lhs.into_int_value();
        let rhs = rhs.into_int_value();
        match bin.oper {
            Add => cg.builder.build_int_add(lhs, rhs, "sum").unwrap().into(),
            Sub => cg.builder.build_int_sub(lhs, rhs, "diff").unwrap().into(),
            Mul => cg.builder.build_int_mul(lhs, rhs, "prod").unwrap().into(),
            Div if signed => cg
                .builder
                .build_int_signed_div(lhs, rhs, "quot")
                .unwrap()
                .into(),
            Div => cg
                .builder
                .build_int_unsigned_div(lhs, rhs, "quot")
                .unwrap()
                .into(),
            Mod if signed => cg
                .builder
                .build_int_signed_rem(lhs, rhs, "rem")
                .unwrap()
                .into(),
            Mod => cg
                .builder
                .build_int_unsigned_rem(lhs, rhs, "rem")
                .unwrap()
                .into(),
            BitOr => cg.builder.build_or(lhs, rhs, "or").unwrap().into(),
            BitXor => cg.builder.build_xor(lhs, rhs, "xor").unwrap().into(),
            BitAnd => cg.builder.build_and(lhs, rhs, "and").unwrap().into(),
            BitShl => cg
                .builder
                .build_left_shift(lhs, rhs, "shl")
                .unwrap()
                .into(),
            BitShr => cg
                .builder
                .build_right_shift(lhs, rhs, false, "shr")
                .unwrap()
                .into(),
            _ => unreachable!("integer operator {:?}", bin.oper),
        }
    };
    GenExpr::prvalue(result)
}

fn gen_short_circuit<'ctx>(
    cg: &CodegenContext<'ctx>,
    fcx: &mut FnCtx<'ctx>,
    bin: &Binary<TypeInfo>,
) -> GenExpr<'ctx> {
    let is_and = bin.oper == BinOp::BoolAnd;
    let rhs_block = cg.context.append_basic_block(fcx.function, "rhs");
    let merge_block = cg.context.append_basic_block(fcx.function, "merge");

    let lhs = gen_bool(cg, fcx, &bin.lhs);
    let lhs_end = cg.builder.get_insert_block().unwrap();
    if is_and {
        cg.builder
            .build_conditional_branch(lhs, rhs_block, merge_block)
            .unwrap();
    } else {
        cg.builder
            .build_conditional_branch(lhs, merge_block, rhs_block)
            .unwrap();
    }

    cg.builder.position_at_end(rhs_block);
    let rhs = gen_bool(cg, fcx, &bin.rhs);
    let rhs_end = cg.builder.get_insert_block().unwrap();
    cg.builder.build_unconditional_branch(merge_block).unwrap();

    cg.builder.position_at_end(merge_block);
    let phi = cg.builder.build_phi(cg.context.bool_type(), "sc").unwrap();
    let short_value = cg
        .context
        .bool_type()
        .const_int(if is_and { 0 } else { 1 }, false);
    phi.add_incoming(&[(&short_value, lhs_end), (&rhs, rhs_end)]);
    GenExpr::prvalue(i1_to_bool(cg, phi.as_basic_value().into_int_value()))
}

fn gen_comparison<'ctx>(
    cg: &CodegenContext<'ctx>,
    fcx: &mut FnCtx<'ctx>,
    bin: &Binary<TypeInfo>,
) -> GenExpr<'ctx> {
    use crate::parser::ast::BinOp::*;
    let ty = etype(&bin.lhs).ty.clone();

    let flag = if trivially_copyable(&ty) && ty.concrete().is_builtin() {
        let lhs = gen_value(cg, fcx, &bin.lhs);
        let rhs = gen_value(cg, fcx, &bin.rhs);
        match bin.oper {
            Eq => scalar_eq(cg, &ty, lhs, rhs),
            Ne => negate(cg, scalar_eq(cg, &ty, lhs, rhs)),
            Lt => scalar_lt(cg, &ty, lhs, rhs),
            Gt => scalar_lt(cg, &ty, rhs, lhs),
            Le => negate(cg, scalar_lt(cg, &ty, rhs, lhs)),
            Ge => negate(cg, scalar_lt(cg, &ty, lhs, rhs)),
            _ => unreachable!("comparison operator {:?}", bin.oper),
        }
    } else {
        let lhs = gen_addr(cg, fcx, &bin.lhs);
        let rhs = gen_addr(cg, fcx, &bin.rhs);
        match bin.oper {
            Eq => eq_at(cg, &ty, lhs, rhs),
            Ne => negate(cg, eq_at(cg, &ty, lhs, rhs)),
            Lt => lt_at(cg, &ty, lhs, rhs),
            Gt => lt_at(cg, &ty, rhs, lhs),
            Le => negate(cg, lt_at(cg, &ty, rhs, lhs)),
            Ge => negate(cg, lt_at(cg, &ty, lhs, rhs)),
            _ => unreachable!("comparison operator {:?}", bin.oper),
        }
    };
    GenExpr::prvalue(i1_to_bool(cg, flag))
}

fn negate<'ctx>(cg: &CodegenContext<'ctx>, flag: IntValue<'ctx>) -> IntValue<'ctx> {
    cg.builder
        .build_xor(flag, cg.context.bool_type().const_int(1, false), "not")
        .unwrap()
}

fn gen_unary<'ctx>(
    cg: &CodegenContext<'ctx>,
    fcx: &mut FnCtx<'ctx>,
    un: &Unary<TypeInfo>,
) -> GenExpr<'ctx> {
    let ty = etype(&un.expr).ty.concrete().clone();
    let value = gen_value(cg, fcx, &un.expr);
    let result: BasicValueEnum = match un.oper {
        UnOp::Neg => {
            if ty == Type::Real {
                cg.builder
                    .build_float_neg(value.into_float_value(), "neg")
                    .unwrap()
                    .into()
            } else {
                cg.builder
                    .build_int_neg(value.into_int_value(), "neg")
                    .unwrap()
                    .into()
            }
        }
        UnOp::BoolNot => {
            // bool values are always 0 or 1
            cg.builder
                .build_xor(
                    value.into_int_value(),
                    cg.context.i8_type().const_int(1, false),
                    "not",
                )
                .unwrap()
                .into()
        }
        UnOp::BitNot => cg
            .builder
            .build_not(value.into_int_value(), "flip")
            .unwrap()
            .into(),
    };
    GenExpr::prvalue(result)
}

//----------------------------- Member & subscript -----------------------------

fn gen_member<'ctx>(
    cg: &CodegenContext<'ctx>,
    fcx: &mut FnCtx<'ctx>,
    mem: &Member<TypeInfo>,
) -> GenExpr<'ctx> {
    let object_ty = etype(&mem.object).ty.clone();
    let object = gen_expr(cg, fcx, &mem.object).expect("void object in member access");
    // trivial struct results come back as scalar aggregates; spill them
    let (object_ptr, object_cat) = match object.cat {
        ValueCat::PRValue => {
            let slot = entry_alloca(cg, fcx, lower_type(cg, &object_ty), "member_tmp");
            cg.builder.build_store(slot, object.val).unwrap();
            (slot, ValueCat::XValue)
        }
        _ => (object.ptr(), object.cat),
    };
    let index = mem.index.expect("unresolved member survived analysis");

    let field_ptr = match object_ty.concrete() {
        Type::Struct { .. } => {
            let lowered = lower_type(cg, &object_ty).into_struct_type();
            cg.builder
                .build_struct_gep(lowered, object_ptr, index, &mem.member)
                .unwrap()
        }
        Type::User(user) => {
            let (_, _, offset) = &user.fields[index as usize];
            let offset = cg.context.i64_type().const_int(*offset as u64, false);
            unsafe {
                cg.builder
                    .build_in_bounds_gep(cg.context.i8_type(), object_ptr, &[offset], &mem.member)
                    .unwrap()
            }
        }
        other => unreachable!("member access on {other:?}"),
    };
    GenExpr {
        val: field_ptr.into(),
        cat: object_cat,
    }
}

fn gen_subscript<'ctx>(
    cg: &CodegenContext<'ctx>,
    fcx: &mut FnCtx<'ctx>,
    sub: &Subscript<TypeInfo>,
) -> GenExpr<'ctx> {
    let array_ty = etype(&sub.object).ty.concrete().clone();
    let handle_addr = gen_addr(cg, fcx, &sub.object);
    let index = gen_value(cg, fcx, &sub.index).into_int_value();
    let signed = etype(&sub.index).ty.concrete().is_signed();
    let idx_fn = instance(
        cg,
        if signed { Inst::ArrIdxS } else { Inst::ArrIdxU },
        &array_ty,
    );
    let elem_ptr = call_value(cg, idx_fn, &[handle_addr.into(), index.into()], "elem_ptr")
        .into_pointer_value();
    GenExpr::lvalue(elem_ptr)
}

//--------------------------------- Ternary ------------------------------------

fn gen_ternary<'ctx>(
    cg: &CodegenContext<'ctx>,
    fcx: &mut FnCtx<'ctx>,
    tern: &Ternary<TypeInfo>,
) -> Option<GenExpr<'ctx>> {
    let ty = tern.info.etype.ty.clone();
    if ty == Type::Void {
        let slot = None;
        return gen_ternary_arms(cg, fcx, tern, slot).map(GenExpr::xvalue);
    }
    let slot = entry_alloca(cg, fcx, lower_type(cg, &ty), "ternary");
    gen_ternary_into(cg, fcx, tern, slot);
    if !trivially_copyable(&ty) {
        fcx.own(ty, slot);
    }
    Some(GenExpr::xvalue(slot))
}

fn gen_ternary_into<'ctx>(
    cg: &CodegenContext<'ctx>,
    fcx: &mut FnCtx<'ctx>,
    tern: &Ternary<TypeInfo>,
    dst: PointerValue<'ctx>,
) -> Option<()> {
    gen_ternary_arms(cg, fcx, tern, Some(dst)).map(|_| ())
}

/// Both arms construct into the same destination (or are discarded when
/// there is none).
fn gen_ternary_arms<'ctx>(
    cg: &CodegenContext<'ctx>,
    fcx: &mut FnCtx<'ctx>,
    tern: &Ternary<TypeInfo>,
    dst: Option<PointerValue<'ctx>>,
) -> Option<PointerValue<'ctx>> {
    let then_block = cg.context.append_basic_block(fcx.function, "then");
    let else_block = cg.context.append_basic_block(fcx.function, "else");
    let merge_block = cg.context.append_basic_block(fcx.function, "merge");

    let cond = gen_bool(cg, fcx, &tern.cond);
    cg.builder
        .build_conditional_branch(cond, then_block, else_block)
        .unwrap();

    cg.builder.position_at_end(then_block);
    match dst {
        Some(dst) => gen_into(cg, fcx, &tern.troo, dst),
        None => gen_discard(cg, fcx, &tern.troo),
    }
    cg.builder.build_unconditional_branch(merge_block).unwrap();

    cg.builder.position_at_end(else_block);
    match dst {
        Some(dst) => gen_into(cg, fcx, &tern.fols, dst),
        None => gen_discard(cg, fcx, &tern.fols),
    }
    cg.builder.build_unconditional_branch(merge_block).unwrap();

    cg.builder.position_at_end(merge_block);
    dst
}

//---------------------------------- Make --------------------------------------

fn gen_make<'ctx>(
    cg: &CodegenContext<'ctx>,
    fcx: &mut FnCtx<'ctx>,
    make: &Make<TypeInfo>,
) -> GenExpr<'ctx> {
    let target = make.info.etype.ty.clone();
    if make.cast {
        return GenExpr::prvalue(gen_cast(cg, fcx, make, &target));
    }
    let slot = entry_alloca(cg, fcx, lower_type(cg, &target), "make");
    gen_into(cg, fcx, &make.expr, slot);
    if !trivially_copyable(&target) {
        fcx.own(target, slot);
    }
    GenExpr::xvalue(slot)
}

fn gen_cast<'ctx>(
    cg: &CodegenContext<'ctx>,
    fcx: &mut FnCtx<'ctx>,
    make: &Make<TypeInfo>,
    target: &Type,
) -> BasicValueEnum<'ctx> {
    let from = etype(&make.expr).ty.concrete().clone();
    let to = target.concrete().clone();

    // function and user values convert to bool through their conversion op
    if to == Type::Bool && matches!(from, Type::Func { .. } | Type::User(_)) {
        let addr = gen_addr(cg, fcx, &make.expr);
        return i1_to_bool(cg, bool_at(cg, &from, addr));
    }

    let value = gen_value(cg, fcx, &make.expr);
    if from == to {
        return value;
    }

    match (&from, &to) {
        (Type::Real, Type::Real) => value,
        (Type::Real, _) => {
            let int_ty = lower_type(cg, &to).into_int_type();
            if to.is_signed() {
                cg.builder
                    .build_float_to_signed_int(value.into_float_value(), int_ty, "cast")
                    .unwrap()
                    .into()
            } else {
                cg.builder
                    .build_float_to_unsigned_int(value.into_float_value(), int_ty, "cast")
                    .unwrap()
                    .into()
            }
        }
        (_, Type::Real) => {
            let float_ty = cg.context.f32_type();
            if from.is_signed() {
                cg.builder
                    .build_signed_int_to_float(value.into_int_value(), float_ty, "cast")
                    .unwrap()
                    .into()
            } else {
                cg.builder
                    .build_unsigned_int_to_float(value.into_int_value(), float_ty, "cast")
                    .unwrap()
                    .into()
            }
        }
        (_, Type::Bool) => {
            let int = value.into_int_value();
            let zero = int.get_type().const_zero();
            let flag = cg
                .builder
                .build_int_compare(IntPredicate::NE, int, zero, "truthy")
                .unwrap();
            i1_to_bool(cg, flag)
        }
        _ => {
            let int = value.into_int_value();
            let to_ty = lower_type(cg, &to).into_int_type();
            let from_bits = int.get_type().get_bit_width();
            let to_bits = to_ty.get_bit_width();
            if from_bits == to_bits {
                value
            } else if from_bits > to_bits {
                cg.builder
                    .build_int_truncate(int, to_ty, "cast")
                    .unwrap()
                    .into()
            } else if from.is_signed() {
                cg.builder
                    .build_int_s_extend(int, to_ty, "cast")
                    .unwrap()
                    .into()
            } else {
                cg.builder
                    .build_int_z_extend(int, to_ty, "cast")
                    .unwrap()
                    .into()
            }
        }
    }
}

//--------------------------------- Lambdas ------------------------------------

/// Builds the closure value for a lambda literal: generates the
/// implementation function, allocates and populates the environment when
/// there are captures, and stores the two-word function object into `dst`.
fn build_lambda<'ctx>(
    cg: &CodegenContext<'ctx>,
    fcx: &mut FnCtx<'ctx>,
    lambda: &Lambda<TypeInfo>,
    dst: PointerValue<'ctx>,
) {
    let Type::Func { params, ret } = lambda.info.etype.ty.concrete().clone() else {
        unreachable!("lambda literal without function type");
    };

    let impl_fn = build_lambda_impl(cg, lambda, &params, &ret);

    // environment
    let data: PointerValue = if lambda.captures.is_empty() {
        cg.context.ptr_type(AddressSpace::default()).const_null()
    } else {
        let capture_tys: Vec<Type> = lambda.captures.iter().map(|c| c.ty.clone()).collect();
        let data_ty = closure_data_type(cg, &capture_tys);
        let malloc = instance(cg, Inst::Alloc, &Type::Void);
        let data = call_value(
            cg,
            malloc,
            &[data_ty.size_of().expect("unsized environment").into()],
            "env",
        )
        .into_pointer_value();

        let ref_slot = cg
            .builder
            .build_struct_gep(data_ty, data, 0, "ref_slot")
            .unwrap();
        cg.builder
            .build_store(ref_slot, cg.context.i64_type().const_int(1, false))
            .unwrap();

        // virtual destructor for this capture layout
        let layout = Type::Struct {
            fields: lambda
                .captures
                .iter()
                .enumerate()
                .map(|(i, c)| crate::semantic::Field {
                    name: format!("c{i}"),
                    ty: c.ty.clone(),
                })
                .collect(),
        };
        let data_dtor = instance(cg, Inst::CloDataDtor, &layout);
        let dtor_slot = cg
            .builder
            .build_struct_gep(data_ty, data, 1, "dtor_slot")
            .unwrap();
        cg.builder
            .build_store(dtor_slot, data_dtor.as_global_value().as_pointer_value())
            .unwrap();

        // populate the capture slots: fresh captures copy from the source
        // object, transitive captures copy out of the parent environment
        for (index, capture) in lambda.captures.iter().enumerate() {
            let slot = cg
                .builder
                .build_struct_gep(
                    data_ty,
                    data,
                    CLOSURE_DATA_CAPTURE_BASE + index as u32,
                    "capture",
                )
                .unwrap();
            let source = match capture.parent_index {
                Some(parent_index) => {
                    let parent_tys: Vec<Type> =
                        fcx.captures.iter().map(|c| c.ty.clone()).collect();
                    let parent_ty = closure_data_type(cg, &parent_tys);
                    let env = fcx
                        .env_ptr
                        .expect("transitive capture outside a lambda body");
                    cg.builder
                        .build_struct_gep(
                            parent_ty,
                            env,
                            CLOSURE_DATA_CAPTURE_BASE + parent_index,
                            "parent_capture",
                        )
                        .unwrap()
                }
                None => cg.object_addr(capture.object),
            };
            copy_construct(cg, &capture.ty, slot, source);
        }
        data
    };

    let value_ty = closure_value_type(cg);
    let fn_slot = cg
        .builder
        .build_struct_gep(value_ty, dst, 0, "fn_slot")
        .unwrap();
    let data_slot = cg
        .builder
        .build_struct_gep(value_ty, dst, 1, "data_slot")
        .unwrap();
    cg.builder
        .build_store(fn_slot, impl_fn.as_global_value().as_pointer_value())
        .unwrap();
    cg.builder.build_store(data_slot, data).unwrap();
}

/// Signature of an internal function or lambda: leading closure-data
/// pointer, then the declared parameters (by-reference ones as pointers).
pub(crate) fn internal_fn_type<'ctx>(
    cg: &CodegenContext<'ctx>,
    params: &[(ParamRef, Type)],
    ret: &Type,
) -> inkwell::types::FunctionType<'ctx> {
    let mut lowered: Vec<inkwell::types::BasicMetadataTypeEnum> =
        vec![cg.context.ptr_type(AddressSpace::default()).into()];
    for (mode, ty) in params {
        lowered.push(match mode {
            ParamRef::Ref => cg.context.ptr_type(AddressSpace::default()).into(),
            ParamRef::Val => lower_type(cg, ty).into(),
        });
    }
    match ret {
        Type::Void => cg.context.void_type().fn_type(&lowered, false),
        _ => lower_type(cg, ret).fn_type(&lowered, false),
    }
}

fn build_lambda_impl<'ctx>(
    cg: &CodegenContext<'ctx>,
    lambda: &Lambda<TypeInfo>,
    params: &[(ParamRef, Type)],
    ret: &Type,
) -> FunctionValue<'ctx> {
    let saved = cg.builder.get_insert_block();

    let fn_type = internal_fn_type(cg, params, ret);
    let name = format!("lambda.{}", lambda.lambda_id);
    let impl_fn = cg
        .module
        .add_function(&name, fn_type, Some(inkwell::module::Linkage::Internal));

    let entry = cg.context.append_basic_block(impl_fn, "entry");
    cg.builder.position_at_end(entry);

    let mut inner = FnCtx::new(impl_fn, ret.clone());
    inner.env_ptr = Some(impl_fn.get_nth_param(0).unwrap().into_pointer_value());
    inner.captures = lambda.captures.clone();

    super::decl::bind_params(cg, &mut inner, &lambda.params, params, 1);
    super::stat::gen_body(cg, &mut inner, &lambda.body);

    if let Some(block) = saved {
        cg.builder.position_at_end(block);
    }
    impl_fn
}

//---------------------------------- Calls -------------------------------------

pub(crate) fn gen_call<'ctx>(
    cg: &CodegenContext<'ctx>,
    fcx: &mut FnCtx<'ctx>,
    call: &Call<TypeInfo>,
) -> Option<GenExpr<'ctx>> {
    match call.target.as_ref().expect("unresolved call survived analysis") {
        CallTarget::Func(symbol) => {
            let func: FuncSymbol = {
                let borrowed = symbol.borrow();
                let SymbolKind::Func(func) = &borrowed.kind else {
                    unreachable!("call target is not a function");
                };
                FuncSymbol {
                    receiver: func.receiver.clone(),
                    params: func.params.clone(),
                    ret: func.ret.clone(),
                    external: func.external,
                    mangled: func.mangled.clone(),
                }
            };
            let target = cg
                .module
                .get_function(&func.mangled)
                .expect("called function not declared");

            let mut args: Vec<BasicMetadataValueEnum> = vec![];
            if !func.external {
                args.push(
                    cg.context
                        .ptr_type(AddressSpace::default())
                        .const_null()
                        .into(),
                );
            }
            if let Some(receiver) = &func.receiver {
                args.push(lower_arg(cg, fcx, &call.callee, receiver));
            }
            for (arg, param) in call.args.iter().zip(func.params.iter()) {
                args.push(lower_arg(cg, fcx, arg, param));
            }

            let result = cg.builder.build_call(target, &args, "").unwrap();
            wrap_call_result(cg, fcx, result.try_as_basic_value().left(), &func.ret)
        }
        CallTarget::Builtin(builtin) => gen_builtin_call(cg, fcx, call, *builtin),
        CallTarget::Indirect => {
            let callee_ty = etype(&call.callee).ty.concrete().clone();
            let Type::Func { params, ret } = callee_ty else {
                unreachable!("indirect call through a non-function value");
            };
            let closure_addr = gen_addr(cg, fcx, &call.callee);
            let value_ty = closure_value_type(cg);
            let fn_slot = cg
                .builder
                .build_struct_gep(value_ty, closure_addr, 0, "fn_slot")
                .unwrap();
            let data_slot = cg
                .builder
                .build_struct_gep(value_ty, closure_addr, 1, "data_slot")
                .unwrap();
            let ptr_ty = cg.context.ptr_type(AddressSpace::default());
            let fn_ptr = cg
                .builder
                .build_load(ptr_ty, fn_slot, "fn")
                .unwrap()
                .into_pointer_value();
            let data = cg.builder.build_load(ptr_ty, data_slot, "data").unwrap();

            let mut args: Vec<BasicMetadataValueEnum> = vec![data.into()];
            for (arg, (mode, ty)) in call.args.iter().zip(params.iter()) {
                let param = crate::semantic::ExprType::param(*mode, ty.clone());
                args.push(lower_arg(cg, fcx, arg, &param));
            }

            let fn_type = internal_fn_type(cg, &params, &ret);
            let result = cg
                .builder
                .build_indirect_call(fn_type, fn_ptr, &args, "")
                .unwrap();
            wrap_call_result(cg, fcx, result.try_as_basic_value().left(), &ret)
        }
    }
}

fn lower_arg<'ctx>(
    cg: &CodegenContext<'ctx>,
    fcx: &mut FnCtx<'ctx>,
    arg: &Expression<TypeInfo>,
    param: &crate::semantic::ExprType,
) -> BasicMetadataValueEnum<'ctx> {
    use crate::semantic::Binding;
    match param.binding {
        Binding::Reference => gen_addr(cg, fcx, arg).into(),
        // by-value arguments are borrowed: the caller keeps ownership and
        // destroys its own temporaries when the scope ends
        Binding::Value => gen_value(cg, fcx, arg).into(),
    }
}

fn wrap_call_result<'ctx>(
    cg: &CodegenContext<'ctx>,
    fcx: &mut FnCtx<'ctx>,
    value: Option<BasicValueEnum<'ctx>>,
    ret: &Type,
) -> Option<GenExpr<'ctx>> {
    let value = value?;
    if trivially_copyable(ret) {
        return Some(GenExpr::prvalue(value));
    }
    // returned aggregates are owned by the caller; materialize and register
    let slot = entry_alloca(cg, fcx, lower_type(cg, ret), "ret_tmp");
    cg.builder.build_store(slot, value).unwrap();
    fcx.own(ret.clone(), slot);
    Some(GenExpr::xvalue(slot))
}

fn gen_builtin_call<'ctx>(
    cg: &CodegenContext<'ctx>,
    fcx: &mut FnCtx<'ctx>,
    call: &Call<TypeInfo>,
    builtin: BuiltinFunc,
) -> Option<GenExpr<'ctx>> {
    let array_ty = etype(&call.args[0]).ty.concrete().clone();
    match builtin {
        BuiltinFunc::Capacity | BuiltinFunc::Size => {
            let handle_addr = gen_addr(cg, fcx, &call.args[0]);
            let handle = cg
                .builder
                .build_load(cg.context.ptr_type(AddressSpace::default()), handle_addr, "handle")
                .unwrap()
                .into_pointer_value();
            let index = if builtin == BuiltinFunc::Size {
                ARRAY_IDX_LEN
            } else {
                ARRAY_IDX_CAP
            };
            let field = cg
                .builder
                .build_struct_gep(super::types::array_header_type(cg), handle, index, "field")
                .unwrap();
            let value = cg
                .builder
                .build_load(cg.context.i32_type(), field, "count")
                .unwrap();
            Some(GenExpr::prvalue(value))
        }
        BuiltinFunc::Data => {
            let handle_addr = gen_addr(cg, fcx, &call.args[0]);
            let handle = cg
                .builder
                .build_load(cg.context.ptr_type(AddressSpace::default()), handle_addr, "handle")
                .unwrap()
                .into_pointer_value();
            let field = cg
                .builder
                .build_struct_gep(
                    super::types::array_header_type(cg),
                    handle,
                    ARRAY_IDX_DAT,
                    "field",
                )
                .unwrap();
            let value = cg
                .builder
                .build_load(cg.context.ptr_type(AddressSpace::default()), field, "dat")
                .unwrap();
            Some(GenExpr::prvalue(value))
        }
        BuiltinFunc::PushBack => {
            let arr = gen_addr(cg, fcx, &call.args[0]);
            let elem = gen_addr(cg, fcx, &call.args[1]);
            let push = instance(cg, Inst::BtnPushBack, &array_ty);
            call_void(cg, push, &[arr.into(), elem.into()]);
            None
        }
        BuiltinFunc::Append => {
            let dst = gen_addr(cg, fcx, &call.args[0]);
            let src = gen_addr(cg, fcx, &call.args[1]);
            let append = instance(cg, Inst::BtnAppend, &array_ty);
            call_void(cg, append, &[dst.into(), src.into()]);
            None
        }
        BuiltinFunc::PopBack => {
            let arr = gen_addr(cg, fcx, &call.args[0]);
            let pop = instance(cg, Inst::BtnPopBack, &array_ty);
            call_void(cg, pop, &[arr.into()]);
            None
        }
        BuiltinFunc::Resize => {
            let arr = gen_addr(cg, fcx, &call.args[0]);
            let len = gen_value(cg, fcx, &call.args[1]);
            let resize = instance(cg, Inst::BtnResize, &array_ty);
            call_void(cg, resize, &[arr.into(), len.into()]);
            None
        }
        BuiltinFunc::Reserve => {
            let arr = gen_addr(cg, fcx, &call.args[0]);
            let cap = gen_value(cg, fcx, &call.args[1]);
            let reserve = instance(cg, Inst::BtnReserve, &array_ty);
            call_void(cg, reserve, &[arr.into(), cap.into()]);
            None
        }
    }
}
