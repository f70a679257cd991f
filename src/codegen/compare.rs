//! Per-type equality, ordering and bool conversion.
//!
//! Builtins compare bitwise (floats with ordered predicates), arrays
//! compare length then elements with lexicographic ordering, structs
//! compare field-wise with short-circuiting, closures compare their two
//! pointers, and user types dispatch through the host-provided addresses.

use inkwell::{
    values::{FunctionValue, IntValue, PointerValue},
    AddressSpace, FloatPredicate, IntPredicate,
};

use crate::semantic::{Type, UserType, USER_OP_TRIVIAL};

use super::lifetime::{call_value, elem_gep, instance};
use super::types::{
    closure_value_type, lower_type, ARRAY_IDX_DAT, ARRAY_IDX_LEN,
};
use super::{CodegenContext, Inst};

//---------------------------- Value dispatch ----------------------------------

/// Equality of two objects through their addresses; returns an i1.
pub(crate) fn eq_at<'ctx>(
    cg: &CodegenContext<'ctx>,
    ty: &Type,
    lhs: PointerValue<'ctx>,
    rhs: PointerValue<'ctx>,
) -> IntValue<'ctx> {
    match ty.concrete() {
        Type::Array(_) => {
            call_value(cg, instance(cg, Inst::ArrEq, ty.concrete()), &[lhs.into(), rhs.into()], "eq")
                .into_int_value()
        }
        Type::Struct { .. } => {
            call_value(cg, instance(cg, Inst::SrtEq, ty.concrete()), &[lhs.into(), rhs.into()], "eq")
                .into_int_value()
        }
        Type::Func { .. } => {
            call_value(cg, instance(cg, Inst::CloEq, &Type::Void), &[lhs.into(), rhs.into()], "eq")
                .into_int_value()
        }
        Type::User(_) => {
            call_value(cg, instance(cg, Inst::UsrEq, ty.concrete()), &[lhs.into(), rhs.into()], "eq")
                .into_int_value()
        }
        scalar => {
            let lowered = lower_type(cg, scalar);
            let lhs = cg.builder.build_load(lowered, lhs, "lhs").unwrap();
            let rhs = cg.builder.build_load(lowered, rhs, "rhs").unwrap();
            scalar_eq(cg, scalar, lhs.into(), rhs.into())
        }
    }
}

/// Strict ordering of two objects through their addresses; returns an i1.
pub(crate) fn lt_at<'ctx>(
    cg: &CodegenContext<'ctx>,
    ty: &Type,
    lhs: PointerValue<'ctx>,
    rhs: PointerValue<'ctx>,
) -> IntValue<'ctx> {
    match ty.concrete() {
        Type::Array(_) => {
            call_value(cg, instance(cg, Inst::ArrLt, ty.concrete()), &[lhs.into(), rhs.into()], "lt")
                .into_int_value()
        }
        Type::Struct { .. } => {
            call_value(cg, instance(cg, Inst::SrtLt, ty.concrete()), &[lhs.into(), rhs.into()], "lt")
                .into_int_value()
        }
        Type::Func { .. } => {
            call_value(cg, instance(cg, Inst::CloLt, &Type::Void), &[lhs.into(), rhs.into()], "lt")
                .into_int_value()
        }
        Type::User(_) => {
            call_value(cg, instance(cg, Inst::UsrLt, ty.concrete()), &[lhs.into(), rhs.into()], "lt")
                .into_int_value()
        }
        scalar => {
            let lowered = lower_type(cg, scalar);
            let lhs = cg.builder.build_load(lowered, lhs, "lhs").unwrap();
            let rhs = cg.builder.build_load(lowered, rhs, "rhs").unwrap();
            scalar_lt(cg, scalar, lhs.into(), rhs.into())
        }
    }
}

/// Bool conversion of an object through its address; the cast
/// `make bool expr` uses this for function and user values.
pub(crate) fn bool_at<'ctx>(
    cg: &CodegenContext<'ctx>,
    ty: &Type,
    addr: PointerValue<'ctx>,
) -> IntValue<'ctx> {
    match ty.concrete() {
        Type::Func { .. } => {
            call_value(cg, instance(cg, Inst::CloBool, &Type::Void), &[addr.into()], "truthy")
                .into_int_value()
        }
        Type::User(_) => {
            call_value(cg, instance(cg, Inst::UsrBool, ty.concrete()), &[addr.into()], "truthy")
                .into_int_value()
        }
        scalar => {
            let lowered = lower_type(cg, scalar);
            let value = cg.builder.build_load(lowered, addr, "value").unwrap();
            scalar_truthy(cg, scalar, value.into())
        }
    }
}

pub(crate) fn scalar_eq<'ctx>(
    cg: &CodegenContext<'ctx>,
    ty: &Type,
    lhs: inkwell::values::BasicValueEnum<'ctx>,
    rhs: inkwell::values::BasicValueEnum<'ctx>,
) -> IntValue<'ctx> {
    match ty.concrete() {
        Type::Real => cg
            .builder
            .build_float_compare(
                FloatPredicate::OEQ,
                lhs.into_float_value(),
                rhs.into_float_value(),
                "eq",
            )
            .unwrap(),
        Type::Opaq => {
            let lhs = ptr_as_int(cg, lhs.into_pointer_value());
            let rhs = ptr_as_int(cg, rhs.into_pointer_value());
            cg.builder
                .build_int_compare(IntPredicate::EQ, lhs, rhs, "eq")
                .unwrap()
        }
        _ => cg
            .builder
            .build_int_compare(
                IntPredicate::EQ,
                lhs.into_int_value(),
                rhs.into_int_value(),
                "eq",
            )
            .unwrap(),
    }
}

pub(crate) fn scalar_lt<'ctx>(
    cg: &CodegenContext<'ctx>,
    ty: &Type,
    lhs: inkwell::values::BasicValueEnum<'ctx>,
    rhs: inkwell::values::BasicValueEnum<'ctx>,
) -> IntValue<'ctx> {
    match ty.concrete() {
        Type::Real => cg
            .builder
            .build_float_compare(
                FloatPredicate::OLT,
                lhs.into_float_value(),
                rhs.into_float_value(),
                "lt",
            )
            .unwrap(),
        Type::Opaq => {
            let lhs = ptr_as_int(cg, lhs.into_pointer_value());
            let rhs = ptr_as_int(cg, rhs.into_pointer_value());
            cg.builder
                .build_int_compare(IntPredicate::ULT, lhs, rhs, "lt")
                .unwrap()
        }
        signed if signed.is_signed() => cg
            .builder
            .build_int_compare(
                IntPredicate::SLT,
                lhs.into_int_value(),
                rhs.into_int_value(),
                "lt",
            )
            .unwrap(),
        _ => cg
            .builder
            .build_int_compare(
                IntPredicate::ULT,
                lhs.into_int_value(),
                rhs.into_int_value(),
                "lt",
            )
            .unwrap(),
    }
}

fn scalar_truthy<'ctx>(
    cg: &CodegenContext<'ctx>,
    ty: &Type,
    value: inkwell::values::BasicValueEnum<'ctx>,
) -> IntValue<'ctx> {
    match ty.concrete() {
        Type::Real => cg
            .builder
            .build_float_compare(
                FloatPredicate::ONE,
                value.into_float_value(),
                cg.context.f32_type().const_zero(),
                "truthy",
            )
            .unwrap(),
        Type::Opaq => {
            let int = ptr_as_int(cg, value.into_pointer_value());
            cg.builder
                .build_int_compare(IntPredicate::NE, int, cg.context.i64_type().const_zero(), "truthy")
                .unwrap()
        }
        _ => {
            let int = value.into_int_value();
            let zero = int.get_type().const_zero();
            cg.builder
                .build_int_compare(IntPredicate::NE, int, zero, "truthy")
                .unwrap()
        }
    }
}

fn ptr_as_int<'ctx>(cg: &CodegenContext<'ctx>, ptr: PointerValue<'ctx>) -> IntValue<'ctx> {
    cg.builder
        .build_ptr_to_int(ptr, cg.context.i64_type(), "addr")
        .unwrap()
}

//--------------------------------- Arrays -------------------------------------

fn load_handle<'ctx>(cg: &CodegenContext<'ctx>, addr: PointerValue<'ctx>) -> PointerValue<'ctx> {
    cg.builder
        .build_load(cg.context.ptr_type(AddressSpace::default()), addr, "handle")
        .unwrap()
        .into_pointer_value()
}

fn header_i32<'ctx>(
    cg: &CodegenContext<'ctx>,
    header: PointerValue<'ctx>,
    index: u32,
) -> IntValue<'ctx> {
    let field = cg
        .builder
        .build_struct_gep(super::types::array_header_type(cg), header, index, "field")
        .unwrap();
    cg.builder
        .build_load(cg.context.i32_type(), field, "value")
        .unwrap()
        .into_int_value()
}

fn header_dat<'ctx>(
    cg: &CodegenContext<'ctx>,
    header: PointerValue<'ctx>,
) -> PointerValue<'ctx> {
    let field = cg
        .builder
        .build_struct_gep(super::types::array_header_type(cg), header, ARRAY_IDX_DAT, "field")
        .unwrap();
    cg.builder
        .build_load(cg.context.ptr_type(AddressSpace::default()), field, "dat")
        .unwrap()
        .into_pointer_value()
}

fn elem_of(ty: &Type) -> &Type {
    match ty.concrete() {
        Type::Array(elem) => elem,
        _ => unreachable!("array comparison instantiated for {ty:?}"),
    }
}

/// `arr_eq`: same length, then element-wise equality with short-circuit.
pub(crate) fn emit_arr_eq<'ctx>(cg: &CodegenContext<'ctx>, ty: &Type, func: FunctionValue<'ctx>) {
    let elem = elem_of(ty);
    let entry = cg.context.append_basic_block(func, "entry");
    let loop_head = cg.context.append_basic_block(func, "head");
    let loop_body = cg.context.append_basic_block(func, "body");
    let loop_tail = cg.context.append_basic_block(func, "tail");
    let equal = cg.context.append_basic_block(func, "equal");
    let diff = cg.context.append_basic_block(func, "diff");

    cg.builder.position_at_end(entry);
    let lhs = load_handle(cg, func.get_nth_param(0).unwrap().into_pointer_value());
    let rhs = load_handle(cg, func.get_nth_param(1).unwrap().into_pointer_value());
    let lhs_len = header_i32(cg, lhs, ARRAY_IDX_LEN);
    let rhs_len = header_i32(cg, rhs, ARRAY_IDX_LEN);
    let lhs_dat = header_dat(cg, lhs);
    let rhs_dat = header_dat(cg, rhs);
    let counter = cg.builder.build_alloca(cg.context.i32_type(), "i").unwrap();
    cg.builder
        .build_store(counter, cg.context.i32_type().const_zero())
        .unwrap();
    let same_len = cg
        .builder
        .build_int_compare(IntPredicate::EQ, lhs_len, rhs_len, "same_len")
        .unwrap();
    cg.builder.build_conditional_branch(same_len, loop_head, diff).unwrap();

    cg.builder.position_at_end(loop_head);
    let index = cg
        .builder
        .build_load(cg.context.i32_type(), counter, "index")
        .unwrap()
        .into_int_value();
    let at_end = cg
        .builder
        .build_int_compare(IntPredicate::UGE, index, lhs_len, "at_end")
        .unwrap();
    cg.builder.build_conditional_branch(at_end, equal, loop_body).unwrap();

    cg.builder.position_at_end(loop_body);
    let elems_eq = eq_at(
        cg,
        elem,
        elem_gep(cg, elem, lhs_dat, index),
        elem_gep(cg, elem, rhs_dat, index),
    );
    cg.builder.build_conditional_branch(elems_eq, loop_tail, diff).unwrap();

    cg.builder.position_at_end(loop_tail);
    let next = cg
        .builder
        .build_int_add(index, cg.context.i32_type().const_int(1, false), "next")
        .unwrap();
    cg.builder.build_store(counter, next).unwrap();
    cg.builder.build_unconditional_branch(loop_head).unwrap();

    cg.builder.position_at_end(equal);
    cg.builder
        .build_return(Some(&cg.context.bool_type().const_int(1, false)))
        .unwrap();
    cg.builder.position_at_end(diff);
    cg.builder
        .build_return(Some(&cg.context.bool_type().const_zero()))
        .unwrap();
}

/// `arr_lt`: lexicographic with shorter-prefix-wins.
pub(crate) fn emit_arr_lt<'ctx>(cg: &CodegenContext<'ctx>, ty: &Type, func: FunctionValue<'ctx>) {
    let elem = elem_of(ty);
    let entry = cg.context.append_basic_block(func, "entry");
    let loop_head = cg.context.append_basic_block(func, "head");
    let loop_body = cg.context.append_basic_block(func, "body");
    let check_gt = cg.context.append_basic_block(func, "check_gt");
    let loop_tail = cg.context.append_basic_block(func, "tail");
    let prefix_end = cg.context.append_basic_block(func, "prefix_end");
    let less = cg.context.append_basic_block(func, "less");
    let not_less = cg.context.append_basic_block(func, "not_less");

    cg.builder.position_at_end(entry);
    let lhs = load_handle(cg, func.get_nth_param(0).unwrap().into_pointer_value());
    let rhs = load_handle(cg, func.get_nth_param(1).unwrap().into_pointer_value());
    let lhs_len = header_i32(cg, lhs, ARRAY_IDX_LEN);
    let rhs_len = header_i32(cg, rhs, ARRAY_IDX_LEN);
    let lhs_dat = header_dat(cg, lhs);
    let rhs_dat = header_dat(cg, rhs);
    let shorter = cg
        .builder
        .build_int_compare(IntPredicate::ULT, lhs_len, rhs_len, "shorter")
        .unwrap();
    let prefix = cg
        .builder
        .build_select(shorter, lhs_len, rhs_len, "prefix")
        .unwrap()
        .into_int_value();
    let counter = cg.builder.build_alloca(cg.context.i32_type(), "i").unwrap();
    cg.builder
        .build_store(counter, cg.context.i32_type().const_zero())
        .unwrap();
    cg.builder.build_unconditional_branch(loop_head).unwrap();

    cg.builder.position_at_end(loop_head);
    let index = cg
        .builder
        .build_load(cg.context.i32_type(), counter, "index")
        .unwrap()
        .into_int_value();
    let at_end = cg
        .builder
        .build_int_compare(IntPredicate::UGE, index, prefix, "at_end")
        .unwrap();
    cg.builder
        .build_conditional_branch(at_end, prefix_end, loop_body)
        .unwrap();

    cg.builder.position_at_end(loop_body);
    let lhs_elem = elem_gep(cg, elem, lhs_dat, index);
    let rhs_elem = elem_gep(cg, elem, rhs_dat, index);
    let elem_lt = lt_at(cg, elem, lhs_elem, rhs_elem);
    cg.builder.build_conditional_branch(elem_lt, less, check_gt).unwrap();

    cg.builder.position_at_end(check_gt);
    let lhs_elem = elem_gep(cg, elem, lhs_dat, index);
    let rhs_elem = elem_gep(cg, elem, rhs_dat, index);
    let elem_gt = lt_at(cg, elem, rhs_elem, lhs_elem);
    cg.builder.build_conditional_branch(elem_gt, not_less, loop_tail).unwrap();

    cg.builder.position_at_end(loop_tail);
    let next = cg
        .builder
        .build_int_add(index, cg.context.i32_type().const_int(1, false), "next")
        .unwrap();
    cg.builder.build_store(counter, next).unwrap();
    cg.builder.build_unconditional_branch(loop_head).unwrap();

    // the common prefix is equal; the shorter array orders first
    cg.builder.position_at_end(prefix_end);
    let lhs_shorter = cg
        .builder
        .build_int_compare(IntPredicate::ULT, lhs_len, rhs_len, "lhs_shorter")
        .unwrap();
    cg.builder.build_return(Some(&lhs_shorter)).unwrap();

    cg.builder.position_at_end(less);
    cg.builder
        .build_return(Some(&cg.context.bool_type().const_int(1, false)))
        .unwrap();
    cg.builder.position_at_end(not_less);
    cg.builder
        .build_return(Some(&cg.context.bool_type().const_zero()))
        .unwrap();
}

//--------------------------------- Structs ------------------------------------

fn struct_fields(ty: &Type) -> &[crate::semantic::Field] {
    match ty.concrete() {
        Type::Struct { fields } => fields,
        _ => unreachable!("struct comparison instantiated for {ty:?}"),
    }
}

pub(crate) fn emit_srt_eq<'ctx>(cg: &CodegenContext<'ctx>, ty: &Type, func: FunctionValue<'ctx>) {
    let entry = cg.context.append_basic_block(func, "entry");
    let diff = cg.context.append_basic_block(func, "diff");
    cg.builder.position_at_end(entry);
    let lhs = func.get_nth_param(0).unwrap().into_pointer_value();
    let rhs = func.get_nth_param(1).unwrap().into_pointer_value();
    let lowered = lower_type(cg, ty).into_struct_type();

    for (index, field) in struct_fields(ty).iter().enumerate() {
        let lhs_field = cg
            .builder
            .build_struct_gep(lowered, lhs, index as u32, &field.name)
            .unwrap();
        let rhs_field = cg
            .builder
            .build_struct_gep(lowered, rhs, index as u32, &field.name)
            .unwrap();
        let fields_eq = eq_at(cg, &field.ty, lhs_field, rhs_field);
        let next = cg.context.append_basic_block(func, "next");
        cg.builder.build_conditional_branch(fields_eq, next, diff).unwrap();
        cg.builder.position_at_end(next);
    }
    cg.builder
        .build_return(Some(&cg.context.bool_type().const_int(1, false)))
        .unwrap();

    cg.builder.position_at_end(diff);
    cg.builder
        .build_return(Some(&cg.context.bool_type().const_zero()))
        .unwrap();
}

pub(crate) fn emit_srt_lt<'ctx>(cg: &CodegenContext<'ctx>, ty: &Type, func: FunctionValue<'ctx>) {
    let entry = cg.context.append_basic_block(func, "entry");
    let less = cg.context.append_basic_block(func, "less");
    let not_less = cg.context.append_basic_block(func, "not_less");
    cg.builder.position_at_end(entry);
    let lhs = func.get_nth_param(0).unwrap().into_pointer_value();
    let rhs = func.get_nth_param(1).unwrap().into_pointer_value();
    let lowered = lower_type(cg, ty).into_struct_type();

    for (index, field) in struct_fields(ty).iter().enumerate() {
        let lhs_field = cg
            .builder
            .build_struct_gep(lowered, lhs, index as u32, &field.name)
            .unwrap();
        let rhs_field = cg
            .builder
            .build_struct_gep(lowered, rhs, index as u32, &field.name)
            .unwrap();
        let field_lt = lt_at(cg, &field.ty, lhs_field, rhs_field);
        let check_gt = cg.context.append_basic_block(func, "check_gt");
        cg.builder.build_conditional_branch(field_lt, less, check_gt).unwrap();

        cg.builder.position_at_end(check_gt);
        let field_gt = lt_at(cg, &field.ty, rhs_field, lhs_field);
        let next = cg.context.append_basic_block(func, "next");
        cg.builder.build_conditional_branch(field_gt, not_less, next).unwrap();
        cg.builder.position_at_end(next);
    }
    cg.builder.build_unconditional_branch(not_less).unwrap();

    cg.builder.position_at_end(less);
    cg.builder
        .build_return(Some(&cg.context.bool_type().const_int(1, false)))
        .unwrap();
    cg.builder.position_at_end(not_less);
    cg.builder
        .build_return(Some(&cg.context.bool_type().const_zero()))
        .unwrap();
}

//-------------------------------- Closures ------------------------------------

fn closure_parts<'ctx>(
    cg: &CodegenContext<'ctx>,
    value: PointerValue<'ctx>,
) -> (IntValue<'ctx>, IntValue<'ctx>) {
    let value_ty = closure_value_type(cg);
    let fn_slot = cg
        .builder
        .build_struct_gep(value_ty, value, 0, "fn_slot")
        .unwrap();
    let data_slot = cg
        .builder
        .build_struct_gep(value_ty, value, 1, "data_slot")
        .unwrap();
    let fn_val = load_handle(cg, fn_slot);
    let data_val = load_handle(cg, data_slot);
    (ptr_as_int(cg, fn_val), ptr_as_int(cg, data_val))
}

pub(crate) fn emit_clo_eq<'ctx>(cg: &CodegenContext<'ctx>, func: FunctionValue<'ctx>) {
    let entry = cg.context.append_basic_block(func, "entry");
    cg.builder.position_at_end(entry);
    let (lhs_fn, lhs_data) = closure_parts(cg, func.get_nth_param(0).unwrap().into_pointer_value());
    let (rhs_fn, rhs_data) = closure_parts(cg, func.get_nth_param(1).unwrap().into_pointer_value());
    let fn_eq = cg
        .builder
        .build_int_compare(IntPredicate::EQ, lhs_fn, rhs_fn, "fn_eq")
        .unwrap();
    let data_eq = cg
        .builder
        .build_int_compare(IntPredicate::EQ, lhs_data, rhs_data, "data_eq")
        .unwrap();
    let both = cg.builder.build_and(fn_eq, data_eq, "eq").unwrap();
    cg.builder.build_return(Some(&both)).unwrap();
}

pub(crate) fn emit_clo_lt<'ctx>(cg: &CodegenContext<'ctx>, func: FunctionValue<'ctx>) {
    let entry = cg.context.append_basic_block(func, "entry");
    cg.builder.position_at_end(entry);
    let (lhs_fn, lhs_data) = closure_parts(cg, func.get_nth_param(0).unwrap().into_pointer_value());
    let (rhs_fn, rhs_data) = closure_parts(cg, func.get_nth_param(1).unwrap().into_pointer_value());
    let fn_lt = cg
        .builder
        .build_int_compare(IntPredicate::ULT, lhs_fn, rhs_fn, "fn_lt")
        .unwrap();
    let fn_eq = cg
        .builder
        .build_int_compare(IntPredicate::EQ, lhs_fn, rhs_fn, "fn_eq")
        .unwrap();
    let data_lt = cg
        .builder
        .build_int_compare(IntPredicate::ULT, lhs_data, rhs_data, "data_lt")
        .unwrap();
    let tie = cg.builder.build_and(fn_eq, data_lt, "tie").unwrap();
    let result = cg.builder.build_or(fn_lt, tie, "lt").unwrap();
    cg.builder.build_return(Some(&result)).unwrap();
}

/// A closure is truthy unless its function slot still points at the stub.
pub(crate) fn emit_clo_bool<'ctx>(cg: &CodegenContext<'ctx>, func: FunctionValue<'ctx>) {
    let entry = cg.context.append_basic_block(func, "entry");
    cg.builder.position_at_end(entry);
    let (fn_int, _) = closure_parts(cg, func.get_nth_param(0).unwrap().into_pointer_value());
    let stub = instance(cg, Inst::CloStub, &Type::Void);
    let stub_int = ptr_as_int(cg, stub.as_global_value().as_pointer_value());
    let truthy = cg
        .builder
        .build_int_compare(IntPredicate::NE, fn_int, stub_int, "truthy")
        .unwrap();
    cg.builder.build_return(Some(&truthy)).unwrap();
}

//------------------------------- User types -----------------------------------

fn user_of(ty: &Type) -> &UserType {
    match ty.concrete() {
        Type::User(user) => user,
        _ => unreachable!("user comparison instantiated for {ty:?}"),
    }
}

fn memcmp_fn<'ctx>(cg: &CodegenContext<'ctx>) -> FunctionValue<'ctx> {
    if let Some(func) = cg.module.get_function("memcmp") {
        return func;
    }
    let ptr = cg.context.ptr_type(AddressSpace::default());
    let sig = cg.context.i32_type().fn_type(
        &[ptr.into(), ptr.into(), cg.context.i64_type().into()],
        false,
    );
    cg.module
        .add_function("memcmp", sig, Some(inkwell::module::Linkage::External))
}

pub(crate) fn emit_usr_compare<'ctx>(
    cg: &CodegenContext<'ctx>,
    ty: &Type,
    func: FunctionValue<'ctx>,
    select: fn(&UserType) -> u64,
    ordering: bool,
) {
    let user = user_of(ty).clone();
    let entry = cg.context.append_basic_block(func, "entry");
    cg.builder.position_at_end(entry);
    let lhs = func.get_nth_param(0).unwrap().into_pointer_value();
    let rhs = func.get_nth_param(1).unwrap().into_pointer_value();

    let addr = select(&user);
    let result = if addr <= USER_OP_TRIVIAL {
        // byte-wise comparison
        let size = cg.context.i64_type().const_int(user.size as u64, false);
        let order = call_value(
            cg,
            memcmp_fn(cg),
            &[lhs.into(), rhs.into(), size.into()],
            "order",
        )
        .into_int_value();
        let zero = cg.context.i32_type().const_zero();
        let pred = if ordering { IntPredicate::SLT } else { IntPredicate::EQ };
        cg.builder.build_int_compare(pred, order, zero, "cmp").unwrap()
    } else {
        let target = cg
            .builder
            .build_int_to_ptr(
                cg.context.i64_type().const_int(addr, false),
                cg.context.ptr_type(AddressSpace::default()),
                "host_fn",
            )
            .unwrap();
        let sig = cg.context.i8_type().fn_type(
            &[
                cg.context.ptr_type(AddressSpace::default()).into(),
                cg.context.ptr_type(AddressSpace::default()).into(),
            ],
            false,
        );
        let raw = cg
            .builder
            .build_indirect_call(sig, target, &[lhs.into(), rhs.into()], "raw")
            .unwrap()
            .try_as_basic_value()
            .left()
            .expect("host comparison returned void")
            .into_int_value();
        cg.builder
            .build_int_compare(IntPredicate::NE, raw, cg.context.i8_type().const_zero(), "cmp")
            .unwrap()
    };
    cg.builder.build_return(Some(&result)).unwrap();
}

pub(crate) fn emit_usr_bool<'ctx>(cg: &CodegenContext<'ctx>, ty: &Type, func: FunctionValue<'ctx>) {
    let user = user_of(ty).clone();
    let entry = cg.context.append_basic_block(func, "entry");
    cg.builder.position_at_end(entry);
    let obj = func.get_nth_param(0).unwrap().into_pointer_value();

    let result = if user.bool_conv <= USER_OP_TRIVIAL {
        let first = cg
            .builder
            .build_load(cg.context.i8_type(), obj, "first")
            .unwrap()
            .into_int_value();
        cg.builder
            .build_int_compare(IntPredicate::NE, first, cg.context.i8_type().const_zero(), "truthy")
            .unwrap()
    } else {
        let target = cg
            .builder
            .build_int_to_ptr(
                cg.context.i64_type().const_int(user.bool_conv, false),
                cg.context.ptr_type(AddressSpace::default()),
                "host_fn",
            )
            .unwrap();
        let sig = cg
            .context
            .i8_type()
            .fn_type(&[cg.context.ptr_type(AddressSpace::default()).into()], false);
        let raw = cg
            .builder
            .build_indirect_call(sig, target, &[obj.into()], "raw")
            .unwrap()
            .try_as_basic_value()
            .left()
            .expect("host bool conversion returned void")
            .into_int_value();
        cg.builder
            .build_int_compare(IntPredicate::NE, raw, cg.context.i8_type().const_zero(), "truthy")
            .unwrap()
    };
    cg.builder.build_return(Some(&result)).unwrap();
}
