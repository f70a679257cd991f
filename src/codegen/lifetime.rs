//! On-demand materialization of per-type runtime functions.
//!
//! Every aggregate type used by generated code gets six lifetime operations
//! (destructor, default/copy/move construction, copy/move assignment) plus
//! comparison and bool-conversion operations, each emitted at most once and
//! cached in the instance map. Refcounted payloads (array storage, closure
//! data) share the generic `ptr_*` helpers which manipulate the leading
//! 64-bit count; the count is updated non-atomically, generated code is not
//! thread safe.

use inkwell::{
    values::{BasicMetadataValueEnum, BasicValueEnum, FunctionValue, IntValue, PointerValue},
    AddressSpace, IntPredicate,
};

use crate::semantic::{Type, USER_OP_TRIVIAL};

use super::types::{
    array_header_type, binary_op_type, closure_data_type, closure_value_type, compare_op_type,
    lower_type, trivially_copyable, unary_op_type, ARRAY_IDX_CAP, ARRAY_IDX_DAT, ARRAY_IDX_LEN,
    CLOSURE_DATA_CAPTURE_BASE,
};
use super::{CodegenContext, Inst};

//------------------------------ Entry points ----------------------------------

/// Returns the materialized function for `(inst, ty)`, generating it on
/// first use. The builder position is saved and restored, so instances can
/// be requested mid-emission.
pub(crate) fn instance<'ctx>(
    cg: &CodegenContext<'ctx>,
    inst: Inst,
    ty: &Type,
) -> FunctionValue<'ctx> {
    let key = (inst, ty.clone());
    if let Some(func) = cg.instances.borrow().get(&key) {
        return *func;
    }
    let saved = cg.builder.get_insert_block();
    let func = declare(cg, inst, ty);
    cg.instances.borrow_mut().insert(key, func);
    emit(cg, inst, ty, func);
    if let Some(block) = saved {
        cg.builder.position_at_end(block);
    }
    func
}

pub(crate) fn destroy<'ctx>(cg: &CodegenContext<'ctx>, ty: &Type, addr: PointerValue<'ctx>) {
    match ty.concrete() {
        t if trivially_copyable(t) => {}
        Type::Array(_) => call_void(cg, instance(cg, Inst::ArrDtor, ty.concrete()), &[addr.into()]),
        Type::Func { .. } => call_void(cg, instance(cg, Inst::CloDtor, &Type::Void), &[addr.into()]),
        Type::Struct { .. } => call_void(cg, instance(cg, Inst::SrtDtor, ty.concrete()), &[addr.into()]),
        Type::User(_) => call_void(cg, instance(cg, Inst::UsrDtor, ty.concrete()), &[addr.into()]),
        _ => unreachable!("destroying a value of type {ty:?}"),
    }
}

pub(crate) fn def_construct<'ctx>(cg: &CodegenContext<'ctx>, ty: &Type, addr: PointerValue<'ctx>) {
    let concrete = ty.concrete();
    if trivially_copyable(concrete) {
        let zero = lower_type(cg, concrete).const_zero();
        cg.builder.build_store(addr, zero).unwrap();
        return;
    }
    match concrete {
        Type::Array(_) => call_void(cg, instance(cg, Inst::ArrDefCtor, concrete), &[addr.into()]),
        Type::Func { .. } => call_void(cg, instance(cg, Inst::CloDefCtor, &Type::Void), &[addr.into()]),
        Type::Struct { .. } => call_void(cg, instance(cg, Inst::SrtDefCtor, concrete), &[addr.into()]),
        Type::User(_) => call_void(cg, instance(cg, Inst::UsrDefCtor, concrete), &[addr.into()]),
        _ => unreachable!("default constructing a value of type {ty:?}"),
    }
}

macro_rules! binary_lifetime_op {
    ($name:ident, $arr:ident, $clo:ident, $srt:ident, $usr:ident) => {
        pub(crate) fn $name<'ctx>(
            cg: &CodegenContext<'ctx>,
            ty: &Type,
            dst: PointerValue<'ctx>,
            src: PointerValue<'ctx>,
        ) {
            let concrete = ty.concrete();
            if trivially_copyable(concrete) {
                let lowered = lower_type(cg, concrete);
                let value = cg.builder.build_load(lowered, src, "tmp").unwrap();
                cg.builder.build_store(dst, value).unwrap();
                return;
            }
            match concrete {
                Type::Array(_) => call_void(
                    cg,
                    instance(cg, Inst::$arr, concrete),
                    &[dst.into(), src.into()],
                ),
                Type::Func { .. } => call_void(
                    cg,
                    instance(cg, Inst::$clo, &Type::Void),
                    &[dst.into(), src.into()],
                ),
                Type::Struct { .. } => call_void(
                    cg,
                    instance(cg, Inst::$srt, concrete),
                    &[dst.into(), src.into()],
                ),
                Type::User(_) => call_void(
                    cg,
                    instance(cg, Inst::$usr, concrete),
                    &[dst.into(), src.into()],
                ),
                _ => unreachable!("lifetime operation on a value of type Void"),
            }
        }
    };
}

binary_lifetime_op!(copy_construct, ArrCopCtor, CloCopCtor, SrtCopCtor, UsrCopCtor);
binary_lifetime_op!(copy_assign, ArrCopAsgn, CloCopAsgn, SrtCopAsgn, UsrCopAsgn);
binary_lifetime_op!(move_construct, ArrMovCtor, CloMovCtor, SrtMovCtor, UsrMovCtor);
binary_lifetime_op!(move_assign, ArrMovAsgn, CloMovAsgn, SrtMovAsgn, UsrMovAsgn);

//------------------------------ Declarations ----------------------------------

fn declare<'ctx>(cg: &CodegenContext<'ctx>, inst: Inst, ty: &Type) -> FunctionValue<'ctx> {
    use inkwell::module::Linkage;
    let ptr = cg.context.ptr_type(AddressSpace::default());
    let i1 = cg.context.bool_type();
    let i32t = cg.context.i32_type();
    let i64t = cg.context.i64_type();
    let void = cg.context.void_type();

    let (name, fn_type, external) = match inst {
        Inst::Alloc => ("malloc", ptr.fn_type(&[i64t.into()], false), true),
        Inst::Free => ("free", void.fn_type(&[ptr.into()], false), true),
        Inst::Panic => ("stela_panic", void.fn_type(&[ptr.into()], false), true),

        Inst::PtrInc => ("ptr_inc", unary_op_type(cg), false),
        Inst::PtrDec => ("ptr_dec", i1.fn_type(&[ptr.into()], false), false),
        Inst::PtrDtor => ("ptr_dtor", void.fn_type(&[ptr.into(), ptr.into()], false), false),
        Inst::PtrCopCtor => ("ptr_cop_ctor", binary_op_type(cg), false),
        Inst::PtrCopAsgn => (
            "ptr_cop_asgn",
            void.fn_type(&[ptr.into(), ptr.into(), ptr.into()], false),
            false,
        ),
        Inst::PtrMovCtor => ("ptr_mov_ctor", binary_op_type(cg), false),
        Inst::PtrMovAsgn => (
            "ptr_mov_asgn",
            void.fn_type(&[ptr.into(), ptr.into(), ptr.into()], false),
            false,
        ),
        Inst::CeilPow2 => ("ceil_to_pow_2", i32t.fn_type(&[i32t.into()], false), false),

        Inst::ArrDtor => ("arr_dtor", unary_op_type(cg), false),
        Inst::ArrDefCtor => ("arr_def_ctor", unary_op_type(cg), false),
        Inst::ArrCopCtor => ("arr_cop_ctor", binary_op_type(cg), false),
        Inst::ArrCopAsgn => ("arr_cop_asgn", binary_op_type(cg), false),
        Inst::ArrMovCtor => ("arr_mov_ctor", binary_op_type(cg), false),
        Inst::ArrMovAsgn => ("arr_mov_asgn", binary_op_type(cg), false),
        Inst::ArrIdxS | Inst::ArrIdxU => {
            let name = if inst == Inst::ArrIdxS { "arr_idx_s" } else { "arr_idx_u" };
            (name, ptr.fn_type(&[ptr.into(), i32t.into()], false), false)
        }
        Inst::ArrLenCtor => (
            "arr_len_ctor",
            ptr.fn_type(&[ptr.into(), i32t.into()], false),
            false,
        ),
        Inst::ArrStrgDtor => ("arr_strg_dtor", unary_op_type(cg), false),
        Inst::ArrEq => ("arr_eq", compare_op_type(cg), false),
        Inst::ArrLt => ("arr_lt", compare_op_type(cg), false),
        Inst::ConstructN => (
            "construct_n",
            void.fn_type(&[ptr.into(), i32t.into()], false),
            false,
        ),
        Inst::DestroyN => (
            "destroy_n",
            void.fn_type(&[ptr.into(), i32t.into()], false),
            false,
        ),
        Inst::CopyN => (
            "copy_n",
            void.fn_type(&[ptr.into(), ptr.into(), i32t.into()], false),
            false,
        ),
        Inst::MoveN => (
            "move_n",
            void.fn_type(&[ptr.into(), ptr.into(), i32t.into()], false),
            false,
        ),
        Inst::Reallocate => (
            "reallocate",
            void.fn_type(&[ptr.into(), i32t.into()], false),
            false,
        ),

        Inst::BtnPushBack => ("btn_push_back", binary_op_type(cg), false),
        Inst::BtnAppend => ("btn_append", binary_op_type(cg), false),
        Inst::BtnPopBack => ("btn_pop_back", unary_op_type(cg), false),
        Inst::BtnResize => (
            "btn_resize",
            void.fn_type(&[ptr.into(), i32t.into()], false),
            false,
        ),
        Inst::BtnReserve => (
            "btn_reserve",
            void.fn_type(&[ptr.into(), i32t.into()], false),
            false,
        ),

        Inst::SrtDtor => ("srt_dtor", unary_op_type(cg), false),
        Inst::SrtDefCtor => ("srt_def_ctor", unary_op_type(cg), false),
        Inst::SrtCopCtor => ("srt_cop_ctor", binary_op_type(cg), false),
        Inst::SrtCopAsgn => ("srt_cop_asgn", binary_op_type(cg), false),
        Inst::SrtMovCtor => ("srt_mov_ctor", binary_op_type(cg), false),
        Inst::SrtMovAsgn => ("srt_mov_asgn", binary_op_type(cg), false),
        Inst::SrtEq => ("srt_eq", compare_op_type(cg), false),
        Inst::SrtLt => ("srt_lt", compare_op_type(cg), false),

        Inst::CloStub => ("clo_stub", void.fn_type(&[ptr.into()], false), false),
        Inst::CloDefCtor => ("clo_def_ctor", unary_op_type(cg), false),
        Inst::CloDtor => ("clo_dtor", unary_op_type(cg), false),
        Inst::CloCopCtor => ("clo_cop_ctor", binary_op_type(cg), false),
        Inst::CloCopAsgn => ("clo_cop_asgn", binary_op_type(cg), false),
        Inst::CloMovCtor => ("clo_mov_ctor", binary_op_type(cg), false),
        Inst::CloMovAsgn => ("clo_mov_asgn", binary_op_type(cg), false),
        Inst::CloEq => ("clo_eq", compare_op_type(cg), false),
        Inst::CloLt => ("clo_lt", compare_op_type(cg), false),
        Inst::CloBool => ("clo_bool", i1.fn_type(&[ptr.into()], false), false),
        Inst::CloDataDtor => ("clo_data_dtor", unary_op_type(cg), false),

        Inst::UsrDtor => ("usr_dtor", unary_op_type(cg), false),
        Inst::UsrDefCtor => ("usr_def_ctor", unary_op_type(cg), false),
        Inst::UsrCopCtor => ("usr_cop_ctor", binary_op_type(cg), false),
        Inst::UsrCopAsgn => ("usr_cop_asgn", binary_op_type(cg), false),
        Inst::UsrMovCtor => ("usr_mov_ctor", binary_op_type(cg), false),
        Inst::UsrMovAsgn => ("usr_mov_asgn", binary_op_type(cg), false),
        Inst::UsrEq => ("usr_eq", compare_op_type(cg), false),
        Inst::UsrLt => ("usr_lt", compare_op_type(cg), false),
        Inst::UsrBool => ("usr_bool", i1.fn_type(&[ptr.into()], false), false),
    };

    let linkage = if external { Linkage::External } else { Linkage::Internal };
    let func = cg.module.add_function(name, fn_type, Some(linkage));
    if inst == Inst::Panic {
        let noreturn = cg
            .context
            .create_enum_attribute(inkwell::attributes::Attribute::get_named_enum_kind_id("noreturn"), 0);
        func.add_attribute(inkwell::attributes::AttributeLoc::Function, noreturn);
    }
    func
}

//--------------------------------- Helpers ------------------------------------

pub(crate) fn call_void<'ctx>(
    cg: &CodegenContext<'ctx>,
    func: FunctionValue<'ctx>,
    args: &[BasicMetadataValueEnum<'ctx>],
) {
    cg.builder.build_call(func, args, "").unwrap();
}

pub(crate) fn call_value<'ctx>(
    cg: &CodegenContext<'ctx>,
    func: FunctionValue<'ctx>,
    args: &[BasicMetadataValueEnum<'ctx>],
    name: &str,
) -> BasicValueEnum<'ctx> {
    cg.builder
        .build_call(func, args, name)
        .unwrap()
        .try_as_basic_value()
        .left()
        .expect("call to a void function used as a value")
}

/// Calls the runtime panic with a constant message and terminates the block.
pub(crate) fn call_panic<'ctx>(cg: &CodegenContext<'ctx>, message: &str) {
    let panic_fn = instance(cg, Inst::Panic, &Type::Void);
    let text = cg
        .builder
        .build_global_string_ptr(message, "panic_msg")
        .unwrap()
        .as_pointer_value();
    cg.builder.build_call(panic_fn, &[text.into()], "").unwrap();
    cg.builder.build_unreachable().unwrap();
}

fn fn_ptr<'ctx>(func: FunctionValue<'ctx>) -> PointerValue<'ctx> {
    func.as_global_value().as_pointer_value()
}

fn param_ptr<'ctx>(func: FunctionValue<'ctx>, index: u32) -> PointerValue<'ctx> {
    func.get_nth_param(index)
        .expect("missing parameter")
        .into_pointer_value()
}

fn param_int<'ctx>(func: FunctionValue<'ctx>, index: u32) -> IntValue<'ctx> {
    func.get_nth_param(index)
        .expect("missing parameter")
        .into_int_value()
}

fn call_alloc<'ctx>(cg: &CodegenContext<'ctx>, size: IntValue<'ctx>) -> PointerValue<'ctx> {
    let malloc = instance(cg, Inst::Alloc, &Type::Void);
    call_value(cg, malloc, &[size.into()], "mem").into_pointer_value()
}

fn call_free<'ctx>(cg: &CodegenContext<'ctx>, ptr: PointerValue<'ctx>) {
    let free = instance(cg, Inst::Free, &Type::Void);
    call_void(cg, free, &[ptr.into()]);
}

fn elem_size<'ctx>(cg: &CodegenContext<'ctx>, elem: &Type) -> IntValue<'ctx> {
    lower_type(cg, elem)
        .size_of()
        .expect("element type is unsized")
}

pub(crate) fn elem_gep<'ctx>(
    cg: &CodegenContext<'ctx>,
    elem: &Type,
    dat: PointerValue<'ctx>,
    index: IntValue<'ctx>,
) -> PointerValue<'ctx> {
    let elem_ty = lower_type(cg, elem);
    unsafe {
        cg.builder
            .build_in_bounds_gep(elem_ty, dat, &[index], "elem")
            .unwrap()
    }
}

fn header_field<'ctx>(
    cg: &CodegenContext<'ctx>,
    header: PointerValue<'ctx>,
    index: u32,
) -> PointerValue<'ctx> {
    cg.builder
        .build_struct_gep(array_header_type(cg), header, index, "field")
        .unwrap()
}

fn load_header_i32<'ctx>(
    cg: &CodegenContext<'ctx>,
    header: PointerValue<'ctx>,
    index: u32,
) -> IntValue<'ctx> {
    let field = header_field(cg, header, index);
    cg.builder
        .build_load(cg.context.i32_type(), field, "len")
        .unwrap()
        .into_int_value()
}

fn load_header_dat<'ctx>(
    cg: &CodegenContext<'ctx>,
    header: PointerValue<'ctx>,
) -> PointerValue<'ctx> {
    let field = header_field(cg, header, ARRAY_IDX_DAT);
    cg.builder
        .build_load(cg.context.ptr_type(AddressSpace::default()), field, "dat")
        .unwrap()
        .into_pointer_value()
}

fn load_handle<'ctx>(
    cg: &CodegenContext<'ctx>,
    handle_addr: PointerValue<'ctx>,
) -> PointerValue<'ctx> {
    cg.builder
        .build_load(cg.context.ptr_type(AddressSpace::default()), handle_addr, "handle")
        .unwrap()
        .into_pointer_value()
}

fn i32_const<'ctx>(cg: &CodegenContext<'ctx>, value: u64) -> IntValue<'ctx> {
    cg.context.i32_type().const_int(value, false)
}

fn null_ptr<'ctx>(cg: &CodegenContext<'ctx>) -> PointerValue<'ctx> {
    cg.context.ptr_type(AddressSpace::default()).const_null()
}

fn is_null<'ctx>(cg: &CodegenContext<'ctx>, ptr: PointerValue<'ctx>) -> IntValue<'ctx> {
    cg.builder.build_is_null(ptr, "is_null").unwrap()
}

/// Simple counted loop: calls `body` with the current index.
fn counted_loop<'ctx>(
    cg: &CodegenContext<'ctx>,
    func: FunctionValue<'ctx>,
    len: IntValue<'ctx>,
    body: impl FnOnce(IntValue<'ctx>),
) {
    let head = cg.context.append_basic_block(func, "head");
    let work = cg.context.append_basic_block(func, "body");
    let done = cg.context.append_basic_block(func, "done");

    let counter = cg
        .builder
        .build_alloca(cg.context.i32_type(), "i")
        .unwrap();
    cg.builder.build_store(counter, i32_const(cg, 0)).unwrap();
    cg.builder.build_unconditional_branch(head).unwrap();

    cg.builder.position_at_end(head);
    let index = cg
        .builder
        .build_load(cg.context.i32_type(), counter, "index")
        .unwrap()
        .into_int_value();
    let at_end = cg
        .builder
        .build_int_compare(IntPredicate::UGE, index, len, "at_end")
        .unwrap();
    cg.builder.build_conditional_branch(at_end, done, work).unwrap();

    cg.builder.position_at_end(work);
    body(index);
    let next = cg
        .builder
        .build_int_add(index, i32_const(cg, 1), "next")
        .unwrap();
    cg.builder.build_store(counter, next).unwrap();
    cg.builder.build_unconditional_branch(head).unwrap();

    cg.builder.position_at_end(done);
}

fn entry<'ctx>(cg: &CodegenContext<'ctx>, func: FunctionValue<'ctx>) {
    let block = cg.context.append_basic_block(func, "entry");
    cg.builder.position_at_end(block);
}

fn ret_void(cg: &CodegenContext) {
    cg.builder.build_return(None).unwrap();
}

//---------------------------------- Bodies ------------------------------------

fn emit<'ctx>(cg: &CodegenContext<'ctx>, inst: Inst, ty: &Type, func: FunctionValue<'ctx>) {
    match inst {
        Inst::Alloc | Inst::Free | Inst::Panic => {}

        Inst::PtrInc => emit_ptr_inc(cg, func),
        Inst::PtrDec => emit_ptr_dec(cg, func),
        Inst::PtrDtor => emit_ptr_dtor(cg, func),
        Inst::PtrCopCtor => emit_ptr_cop_ctor(cg, func),
        Inst::PtrCopAsgn => emit_ptr_cop_asgn(cg, func),
        Inst::PtrMovCtor => emit_ptr_mov_ctor(cg, func),
        Inst::PtrMovAsgn => emit_ptr_mov_asgn(cg, func),
        Inst::CeilPow2 => emit_ceil_pow2(cg, func),

        Inst::ArrDtor => emit_arr_forward(cg, ty, func, Inst::PtrDtor, true),
        Inst::ArrDefCtor => emit_arr_def_ctor(cg, func),
        Inst::ArrCopCtor => emit_arr_forward(cg, ty, func, Inst::PtrCopCtor, false),
        Inst::ArrCopAsgn => emit_arr_forward(cg, ty, func, Inst::PtrCopAsgn, true),
        Inst::ArrMovCtor => emit_arr_forward(cg, ty, func, Inst::PtrMovCtor, false),
        Inst::ArrMovAsgn => emit_arr_forward(cg, ty, func, Inst::PtrMovAsgn, true),
        Inst::ArrIdxS => emit_arr_idx(cg, ty, func, true),
        Inst::ArrIdxU => emit_arr_idx(cg, ty, func, false),
        Inst::ArrLenCtor => emit_arr_len_ctor(cg, ty, func),
        Inst::ArrStrgDtor => emit_arr_strg_dtor(cg, ty, func),
        Inst::ArrEq => super::compare::emit_arr_eq(cg, ty, func),
        Inst::ArrLt => super::compare::emit_arr_lt(cg, ty, func),
        Inst::ConstructN => emit_construct_n(cg, ty, func),
        Inst::DestroyN => emit_destroy_n(cg, ty, func),
        Inst::CopyN => emit_copy_n(cg, ty, func, false),
        Inst::MoveN => emit_copy_n(cg, ty, func, true),
        Inst::Reallocate => emit_reallocate(cg, ty, func),

        Inst::BtnPushBack => emit_btn_push_back(cg, ty, func),
        Inst::BtnAppend => emit_btn_append(cg, ty, func),
        Inst::BtnPopBack => emit_btn_pop_back(cg, ty, func),
        Inst::BtnResize => emit_btn_resize(cg, ty, func),
        Inst::BtnReserve => emit_btn_reserve(cg, ty, func),

        Inst::SrtDtor => emit_srt_unary(cg, ty, func, destroy),
        Inst::SrtDefCtor => emit_srt_unary(cg, ty, func, def_construct),
        Inst::SrtCopCtor => emit_srt_binary(cg, ty, func, copy_construct),
        Inst::SrtCopAsgn => emit_srt_binary(cg, ty, func, copy_assign),
        Inst::SrtMovCtor => emit_srt_binary(cg, ty, func, move_construct),
        Inst::SrtMovAsgn => emit_srt_binary(cg, ty, func, move_assign),
        Inst::SrtEq => super::compare::emit_srt_eq(cg, ty, func),
        Inst::SrtLt => super::compare::emit_srt_lt(cg, ty, func),

        Inst::CloStub => emit_clo_stub(cg, func),
        Inst::CloDefCtor => emit_clo_def_ctor(cg, func),
        Inst::CloDtor => emit_clo_dtor(cg, func),
        Inst::CloCopCtor => emit_clo_cop_ctor(cg, func),
        Inst::CloCopAsgn => emit_clo_cop_asgn(cg, func),
        Inst::CloMovCtor => emit_clo_mov_ctor(cg, func),
        Inst::CloMovAsgn => emit_clo_mov_asgn(cg, func),
        Inst::CloEq => super::compare::emit_clo_eq(cg, func),
        Inst::CloLt => super::compare::emit_clo_lt(cg, func),
        Inst::CloBool => super::compare::emit_clo_bool(cg, func),
        Inst::CloDataDtor => emit_clo_data_dtor(cg, ty, func),

        Inst::UsrDtor => emit_usr_unary(cg, ty, func, |user| user.dtor, false),
        Inst::UsrDefCtor => emit_usr_unary(cg, ty, func, |user| user.def_ctor, true),
        Inst::UsrCopCtor => emit_usr_binary(cg, ty, func, |user| user.cop_ctor),
        Inst::UsrCopAsgn => emit_usr_binary(cg, ty, func, |user| user.cop_asgn),
        Inst::UsrMovCtor => emit_usr_binary(cg, ty, func, |user| user.mov_ctor),
        Inst::UsrMovAsgn => emit_usr_binary(cg, ty, func, |user| user.mov_asgn),
        Inst::UsrEq => super::compare::emit_usr_compare(cg, ty, func, |user| user.eq, false),
        Inst::UsrLt => super::compare::emit_usr_compare(cg, ty, func, |user| user.lt, true),
        Inst::UsrBool => super::compare::emit_usr_bool(cg, ty, func),
    }
}

//------------------------- Refcount pointer helpers ---------------------------

fn emit_ptr_inc<'ctx>(cg: &CodegenContext<'ctx>, func: FunctionValue<'ctx>) {
    entry(cg, func);
    let header = param_ptr(func, 0);
    let count = cg
        .builder
        .build_load(cg.context.i64_type(), header, "ref")
        .unwrap()
        .into_int_value();
    let next = cg
        .builder
        .build_int_add(count, cg.context.i64_type().const_int(1, false), "next")
        .unwrap();
    cg.builder.build_store(header, next).unwrap();
    ret_void(cg);
}

fn emit_ptr_dec<'ctx>(cg: &CodegenContext<'ctx>, func: FunctionValue<'ctx>) {
    entry(cg, func);
    let header = param_ptr(func, 0);
    let count = cg
        .builder
        .build_load(cg.context.i64_type(), header, "ref")
        .unwrap()
        .into_int_value();
    let next = cg
        .builder
        .build_int_sub(count, cg.context.i64_type().const_int(1, false), "next")
        .unwrap();
    cg.builder.build_store(header, next).unwrap();
    let dead = cg
        .builder
        .build_int_compare(
            IntPredicate::EQ,
            next,
            cg.context.i64_type().const_zero(),
            "dead",
        )
        .unwrap();
    cg.builder.build_return(Some(&dead)).unwrap();
}

/// `ptr_dtor(storage_dtor, handle_addr)`: decrement, and on zero run the
/// storage destructor over the payload and free the header. Null handles
/// (moved-from values, default closures) are ignored.
fn emit_ptr_dtor<'ctx>(cg: &CodegenContext<'ctx>, func: FunctionValue<'ctx>) {
    entry(cg, func);
    let dtor = param_ptr(func, 0);
    let handle_addr = param_ptr(func, 1);

    let live = cg.context.append_basic_block(func, "live");
    let dead = cg.context.append_basic_block(func, "dead");
    let done = cg.context.append_basic_block(func, "done");

    let handle = load_handle(cg, handle_addr);
    cg.builder
        .build_conditional_branch(is_null(cg, handle), done, live)
        .unwrap();

    cg.builder.position_at_end(live);
    let dec = instance(cg, Inst::PtrDec, &Type::Void);
    let is_dead = call_value(cg, dec, &[handle.into()], "is_dead").into_int_value();
    cg.builder.build_conditional_branch(is_dead, dead, done).unwrap();

    cg.builder.position_at_end(dead);
    let dtor_ty = unary_op_type(cg);
    cg.builder
        .build_indirect_call(dtor_ty, dtor, &[handle.into()], "")
        .unwrap();
    call_free(cg, handle);
    cg.builder.build_unconditional_branch(done).unwrap();

    cg.builder.position_at_end(done);
    ret_void(cg);
}

fn emit_ptr_cop_ctor<'ctx>(cg: &CodegenContext<'ctx>, func: FunctionValue<'ctx>) {
    entry(cg, func);
    let dst = param_ptr(func, 0);
    let src = param_ptr(func, 1);

    let keep = cg.context.append_basic_block(func, "retain");
    let done = cg.context.append_basic_block(func, "done");

    let handle = load_handle(cg, src);
    cg.builder.build_store(dst, handle).unwrap();
    cg.builder
        .build_conditional_branch(is_null(cg, handle), done, keep)
        .unwrap();

    cg.builder.position_at_end(keep);
    let inc = instance(cg, Inst::PtrInc, &Type::Void);
    call_void(cg, inc, &[handle.into()]);
    cg.builder.build_unconditional_branch(done).unwrap();

    cg.builder.position_at_end(done);
    ret_void(cg);
}

fn emit_ptr_cop_asgn<'ctx>(cg: &CodegenContext<'ctx>, func: FunctionValue<'ctx>) {
    entry(cg, func);
    let dtor = param_ptr(func, 0);
    let dst = param_ptr(func, 1);
    let src = param_ptr(func, 2);

    let keep = cg.context.append_basic_block(func, "retain");
    let swap = cg.context.append_basic_block(func, "swap");

    // retain before release so self assignment is safe
    let handle = load_handle(cg, src);
    cg.builder
        .build_conditional_branch(is_null(cg, handle), swap, keep)
        .unwrap();

    cg.builder.position_at_end(keep);
    let inc = instance(cg, Inst::PtrInc, &Type::Void);
    call_void(cg, inc, &[handle.into()]);
    cg.builder.build_unconditional_branch(swap).unwrap();

    cg.builder.position_at_end(swap);
    let ptr_dtor = instance(cg, Inst::PtrDtor, &Type::Void);
    call_void(cg, ptr_dtor, &[dtor.into(), dst.into()]);
    cg.builder.build_store(dst, handle).unwrap();
    ret_void(cg);
}

fn emit_ptr_mov_ctor<'ctx>(cg: &CodegenContext<'ctx>, func: FunctionValue<'ctx>) {
    entry(cg, func);
    let dst = param_ptr(func, 0);
    let src = param_ptr(func, 1);
    let handle = load_handle(cg, src);
    cg.builder.build_store(dst, handle).unwrap();
    cg.builder.build_store(src, null_ptr(cg)).unwrap();
    ret_void(cg);
}

fn emit_ptr_mov_asgn<'ctx>(cg: &CodegenContext<'ctx>, func: FunctionValue<'ctx>) {
    entry(cg, func);
    let dtor = param_ptr(func, 0);
    let dst = param_ptr(func, 1);
    let src = param_ptr(func, 2);
    let ptr_dtor = instance(cg, Inst::PtrDtor, &Type::Void);
    call_void(cg, ptr_dtor, &[dtor.into(), dst.into()]);
    let handle = load_handle(cg, src);
    cg.builder.build_store(dst, handle).unwrap();
    cg.builder.build_store(src, null_ptr(cg)).unwrap();
    ret_void(cg);
}

fn emit_ceil_pow2<'ctx>(cg: &CodegenContext<'ctx>, func: FunctionValue<'ctx>) {
    entry(cg, func);
    let value = param_int(func, 0);
    let one = i32_const(cg, 1);
    let mut bits = cg.builder.build_int_sub(value, one, "bits").unwrap();
    for shift in [1u64, 2, 4, 8, 16] {
        let shifted = cg
            .builder
            .build_right_shift(bits, i32_const(cg, shift), false, "shifted")
            .unwrap();
        bits = cg.builder.build_or(bits, shifted, "bits").unwrap();
    }
    let rounded = cg.builder.build_int_add(bits, one, "rounded").unwrap();
    let small = cg
        .builder
        .build_int_compare(IntPredicate::ULE, value, one, "small")
        .unwrap();
    let result = cg
        .builder
        .build_select(small, one, rounded, "result")
        .unwrap();
    cg.builder.build_return(Some(&result)).unwrap();
}

//--------------------------------- Arrays -------------------------------------

fn array_elem(ty: &Type) -> &Type {
    match ty.concrete() {
        Type::Array(elem) => elem,
        _ => unreachable!("array operation instantiated for {ty:?}"),
    }
}

/// The array value operations are thin wrappers over the generic refcount
/// helpers, parameterized only by the storage destructor.
fn emit_arr_forward<'ctx>(
    cg: &CodegenContext<'ctx>,
    ty: &Type,
    func: FunctionValue<'ctx>,
    target: Inst,
    wants_dtor: bool,
) {
    entry(cg, func);
    let helper = instance(cg, target, &Type::Void);
    let mut args: Vec<BasicMetadataValueEnum> = vec![];
    if wants_dtor {
        let strg_dtor = instance(cg, Inst::ArrStrgDtor, ty);
        args.push(fn_ptr(strg_dtor).into());
    }
    for index in 0..func.count_params() {
        args.push(func.get_nth_param(index).expect("missing parameter").into());
    }
    call_void(cg, helper, &args);
    ret_void(cg);
}

fn emit_arr_def_ctor<'ctx>(cg: &CodegenContext<'ctx>, func: FunctionValue<'ctx>) {
    entry(cg, func);
    let dst = param_ptr(func, 0);
    let header_ty = array_header_type(cg);
    let header = call_alloc(cg, header_ty.size_of().expect("header size"));
    cg.builder
        .build_store(
            header_field(cg, header, super::types::ARRAY_IDX_REF),
            cg.context.i64_type().const_int(1, false),
        )
        .unwrap();
    cg.builder
        .build_store(header_field(cg, header, ARRAY_IDX_CAP), i32_const(cg, 0))
        .unwrap();
    cg.builder
        .build_store(header_field(cg, header, ARRAY_IDX_LEN), i32_const(cg, 0))
        .unwrap();
    cg.builder
        .build_store(header_field(cg, header, ARRAY_IDX_DAT), null_ptr(cg))
        .unwrap();
    cg.builder.build_store(dst, header).unwrap();
    ret_void(cg);
}

fn emit_arr_len_ctor<'ctx>(cg: &CodegenContext<'ctx>, ty: &Type, func: FunctionValue<'ctx>) {
    entry(cg, func);
    let elem = array_elem(ty);
    let dst = param_ptr(func, 0);
    let len = param_int(func, 1);

    let header_ty = array_header_type(cg);
    let header = call_alloc(cg, header_ty.size_of().expect("header size"));
    cg.builder
        .build_store(
            header_field(cg, header, super::types::ARRAY_IDX_REF),
            cg.context.i64_type().const_int(1, false),
        )
        .unwrap();
    cg.builder
        .build_store(header_field(cg, header, ARRAY_IDX_CAP), len)
        .unwrap();
    cg.builder
        .build_store(header_field(cg, header, ARRAY_IDX_LEN), len)
        .unwrap();
    let wide_len = cg
        .builder
        .build_int_z_extend(len, cg.context.i64_type(), "wide_len")
        .unwrap();
    let bytes = cg
        .builder
        .build_int_mul(wide_len, elem_size(cg, elem), "bytes")
        .unwrap();
    let dat = call_alloc(cg, bytes);
    cg.builder
        .build_store(header_field(cg, header, ARRAY_IDX_DAT), dat)
        .unwrap();
    cg.builder.build_store(dst, header).unwrap();
    cg.builder.build_return(Some(&dat)).unwrap();
}

/// Destroys the payload of one array storage block: element destructors
/// over `len`, then the buffer itself. The header is freed by `ptr_dtor`.
fn emit_arr_strg_dtor<'ctx>(cg: &CodegenContext<'ctx>, ty: &Type, func: FunctionValue<'ctx>) {
    entry(cg, func);
    let elem = array_elem(ty);
    let header = param_ptr(func, 0);
    let len = load_header_i32(cg, header, ARRAY_IDX_LEN);
    let dat = load_header_dat(cg, header);
    let destroy_n = instance(cg, Inst::DestroyN, elem);
    call_void(cg, destroy_n, &[dat.into(), len.into()]);
    call_free(cg, dat);
    ret_void(cg);
}

fn emit_arr_idx<'ctx>(
    cg: &CodegenContext<'ctx>,
    ty: &Type,
    func: FunctionValue<'ctx>,
    signed: bool,
) {
    entry(cg, func);
    let elem = array_elem(ty);
    let handle_addr = param_ptr(func, 0);
    let index = param_int(func, 1);

    let ok = cg.context.append_basic_block(func, "in_bounds");
    let err = cg.context.append_basic_block(func, "out_of_bounds");

    let handle = load_handle(cg, handle_addr);
    let len = load_header_i32(cg, handle, ARRAY_IDX_LEN);
    let in_bounds = if signed {
        let above = cg
            .builder
            .build_int_compare(IntPredicate::SGE, index, i32_const(cg, 0), "above")
            .unwrap();
        let below = cg
            .builder
            .build_int_compare(IntPredicate::SLT, index, len, "below")
            .unwrap();
        cg.builder.build_and(above, below, "in_bounds").unwrap()
    } else {
        cg.builder
            .build_int_compare(IntPredicate::ULT, index, len, "in_bounds")
            .unwrap()
    };
    cg.builder.build_conditional_branch(in_bounds, ok, err).unwrap();

    cg.builder.position_at_end(ok);
    let dat = load_header_dat(cg, handle);
    let elem_ptr = elem_gep(cg, elem, dat, index);
    cg.builder.build_return(Some(&elem_ptr)).unwrap();

    cg.builder.position_at_end(err);
    call_panic(cg, "Index out of bounds");
}

fn emit_construct_n<'ctx>(cg: &CodegenContext<'ctx>, ty: &Type, func: FunctionValue<'ctx>) {
    entry(cg, func);
    let dat = param_ptr(func, 0);
    let len = param_int(func, 1);
    counted_loop(cg, func, len, |index| {
        def_construct(cg, ty, elem_gep(cg, ty, dat, index));
    });
    ret_void(cg);
}

fn emit_destroy_n<'ctx>(cg: &CodegenContext<'ctx>, ty: &Type, func: FunctionValue<'ctx>) {
    entry(cg, func);
    if trivially_copyable(ty) {
        ret_void(cg);
        return;
    }
    let dat = param_ptr(func, 0);
    let len = param_int(func, 1);
    counted_loop(cg, func, len, |index| {
        destroy(cg, ty, elem_gep(cg, ty, dat, index));
    });
    ret_void(cg);
}

fn emit_copy_n<'ctx>(cg: &CodegenContext<'ctx>, ty: &Type, func: FunctionValue<'ctx>, moving: bool) {
    entry(cg, func);
    let dst = param_ptr(func, 0);
    let src = param_ptr(func, 1);
    let len = param_int(func, 2);
    counted_loop(cg, func, len, |index| {
        let to = elem_gep(cg, ty, dst, index);
        let from = elem_gep(cg, ty, src, index);
        if moving {
            move_construct(cg, ty, to, from);
        } else {
            copy_construct(cg, ty, to, from);
        }
    });
    ret_void(cg);
}

/// Grows (or shrinks) the element buffer of a live header, relocating the
/// elements.
fn emit_reallocate<'ctx>(cg: &CodegenContext<'ctx>, ty: &Type, func: FunctionValue<'ctx>) {
    entry(cg, func);
    let header = param_ptr(func, 0);
    let new_cap = param_int(func, 1);

    let len = load_header_i32(cg, header, ARRAY_IDX_LEN);
    let old_dat = load_header_dat(cg, header);
    let wide = cg
        .builder
        .build_int_z_extend(new_cap, cg.context.i64_type(), "wide")
        .unwrap();
    let bytes = cg
        .builder
        .build_int_mul(wide, elem_size(cg, ty), "bytes")
        .unwrap();
    let new_dat = call_alloc(cg, bytes);

    let move_n = instance(cg, Inst::MoveN, ty);
    call_void(cg, move_n, &[new_dat.into(), old_dat.into(), len.into()]);
    call_free(cg, old_dat);
    cg.builder
        .build_store(header_field(cg, header, ARRAY_IDX_DAT), new_dat)
        .unwrap();
    cg.builder
        .build_store(header_field(cg, header, ARRAY_IDX_CAP), new_cap)
        .unwrap();
    ret_void(cg);
}

//---------------------------- Builtin functions -------------------------------

/// Ensures the array behind `handle` can hold `needed` elements, growing to
/// the next power of two.
fn grow_to<'ctx>(
    cg: &CodegenContext<'ctx>,
    func: FunctionValue<'ctx>,
    elem: &Type,
    handle: PointerValue<'ctx>,
    needed: IntValue<'ctx>,
) {
    let grow = cg.context.append_basic_block(func, "grow");
    let done = cg.context.append_basic_block(func, "grown");

    let cap = load_header_i32(cg, handle, ARRAY_IDX_CAP);
    let wants_more = cg
        .builder
        .build_int_compare(IntPredicate::UGT, needed, cap, "wants_more")
        .unwrap();
    cg.builder.build_conditional_branch(wants_more, grow, done).unwrap();

    cg.builder.position_at_end(grow);
    let ceil = instance(cg, Inst::CeilPow2, &Type::Void);
    let new_cap = call_value(cg, ceil, &[needed.into()], "new_cap").into_int_value();
    let realloc = instance(cg, Inst::Reallocate, elem);
    call_void(cg, realloc, &[handle.into(), new_cap.into()]);
    cg.builder.build_unconditional_branch(done).unwrap();

    cg.builder.position_at_end(done);
}

fn emit_btn_push_back<'ctx>(cg: &CodegenContext<'ctx>, ty: &Type, func: FunctionValue<'ctx>) {
    entry(cg, func);
    let elem = array_elem(ty);
    let handle_addr = param_ptr(func, 0);
    let elem_ptr = param_ptr(func, 1);

    let handle = load_handle(cg, handle_addr);
    let len = load_header_i32(cg, handle, ARRAY_IDX_LEN);
    let needed = cg
        .builder
        .build_int_add(len, i32_const(cg, 1), "needed")
        .unwrap();
    grow_to(cg, func, elem, handle, needed);

    let dat = load_header_dat(cg, handle);
    copy_construct(cg, elem, elem_gep(cg, elem, dat, len), elem_ptr);
    cg.builder
        .build_store(header_field(cg, handle, ARRAY_IDX_LEN), needed)
        .unwrap();
    ret_void(cg);
}

fn emit_btn_append<'ctx>(cg: &CodegenContext<'ctx>, ty: &Type, func: FunctionValue<'ctx>) {
    entry(cg, func);
    let elem = array_elem(ty);
    let dst_addr = param_ptr(func, 0);
    let src_addr = param_ptr(func, 1);

    let dst = load_handle(cg, dst_addr);
    let src = load_handle(cg, src_addr);
    let dst_len = load_header_i32(cg, dst, ARRAY_IDX_LEN);
    let src_len = load_header_i32(cg, src, ARRAY_IDX_LEN);
    let needed = cg.builder.build_int_add(dst_len, src_len, "needed").unwrap();
    grow_to(cg, func, elem, dst, needed);

    let dst_dat = load_header_dat(cg, dst);
    let src_dat = load_header_dat(cg, src);
    let tail = elem_gep(cg, elem, dst_dat, dst_len);
    let copy_n = instance(cg, Inst::CopyN, elem);
    call_void(cg, copy_n, &[tail.into(), src_dat.into(), src_len.into()]);
    cg.builder
        .build_store(header_field(cg, dst, ARRAY_IDX_LEN), needed)
        .unwrap();
    ret_void(cg);
}

fn emit_btn_pop_back<'ctx>(cg: &CodegenContext<'ctx>, ty: &Type, func: FunctionValue<'ctx>) {
    entry(cg, func);
    let elem = array_elem(ty);
    let handle_addr = param_ptr(func, 0);

    let ok = cg.context.append_basic_block(func, "pop");
    let err = cg.context.append_basic_block(func, "empty");

    let handle = load_handle(cg, handle_addr);
    let len = load_header_i32(cg, handle, ARRAY_IDX_LEN);
    let empty = cg
        .builder
        .build_int_compare(IntPredicate::EQ, len, i32_const(cg, 0), "empty")
        .unwrap();
    cg.builder.build_conditional_branch(empty, err, ok).unwrap();

    cg.builder.position_at_end(ok);
    let last = cg
        .builder
        .build_int_sub(len, i32_const(cg, 1), "last")
        .unwrap();
    let dat = load_header_dat(cg, handle);
    destroy(cg, elem, elem_gep(cg, elem, dat, last));
    cg.builder
        .build_store(header_field(cg, handle, ARRAY_IDX_LEN), last)
        .unwrap();
    ret_void(cg);

    cg.builder.position_at_end(err);
    call_panic(cg, "Pop from empty array");
}

fn emit_btn_resize<'ctx>(cg: &CodegenContext<'ctx>, ty: &Type, func: FunctionValue<'ctx>) {
    entry(cg, func);
    let elem = array_elem(ty);
    let handle_addr = param_ptr(func, 0);
    let new_len = param_int(func, 1);

    let bigger = cg.context.append_basic_block(func, "bigger");
    let smaller = cg.context.append_basic_block(func, "smaller");
    let done = cg.context.append_basic_block(func, "done");

    let handle = load_handle(cg, handle_addr);
    let len = load_header_i32(cg, handle, ARRAY_IDX_LEN);
    let grows = cg
        .builder
        .build_int_compare(IntPredicate::UGT, new_len, len, "grows")
        .unwrap();
    cg.builder.build_conditional_branch(grows, bigger, smaller).unwrap();

    cg.builder.position_at_end(bigger);
    grow_to(cg, func, elem, handle, new_len);
    let dat = load_header_dat(cg, handle);
    let fresh = elem_gep(cg, elem, dat, len);
    let added = cg.builder.build_int_sub(new_len, len, "added").unwrap();
    let construct_n = instance(cg, Inst::ConstructN, elem);
    call_void(cg, construct_n, &[fresh.into(), added.into()]);
    cg.builder.build_unconditional_branch(done).unwrap();

    cg.builder.position_at_end(smaller);
    let dat = load_header_dat(cg, handle);
    let tail = elem_gep(cg, elem, dat, new_len);
    let removed = cg.builder.build_int_sub(len, new_len, "removed").unwrap();
    let destroy_n = instance(cg, Inst::DestroyN, elem);
    call_void(cg, destroy_n, &[tail.into(), removed.into()]);
    cg.builder.build_unconditional_branch(done).unwrap();

    cg.builder.position_at_end(done);
    cg.builder
        .build_store(header_field(cg, handle, ARRAY_IDX_LEN), new_len)
        .unwrap();
    ret_void(cg);
}

fn emit_btn_reserve<'ctx>(cg: &CodegenContext<'ctx>, ty: &Type, func: FunctionValue<'ctx>) {
    entry(cg, func);
    let elem = array_elem(ty);
    let handle_addr = param_ptr(func, 0);
    let wanted = param_int(func, 1);

    let grow = cg.context.append_basic_block(func, "grow");
    let done = cg.context.append_basic_block(func, "done");

    let handle = load_handle(cg, handle_addr);
    let cap = load_header_i32(cg, handle, ARRAY_IDX_CAP);
    let wants_more = cg
        .builder
        .build_int_compare(IntPredicate::UGT, wanted, cap, "wants_more")
        .unwrap();
    cg.builder.build_conditional_branch(wants_more, grow, done).unwrap();

    cg.builder.position_at_end(grow);
    let realloc = instance(cg, Inst::Reallocate, elem);
    call_void(cg, realloc, &[handle.into(), wanted.into()]);
    cg.builder.build_unconditional_branch(done).unwrap();

    cg.builder.position_at_end(done);
    ret_void(cg);
}

//--------------------------------- Structs ------------------------------------

fn struct_fields(ty: &Type) -> &[crate::semantic::Field] {
    match ty.concrete() {
        Type::Struct { fields } => fields,
        _ => unreachable!("struct operation instantiated for {ty:?}"),
    }
}

fn emit_srt_unary<'ctx>(
    cg: &CodegenContext<'ctx>,
    ty: &Type,
    func: FunctionValue<'ctx>,
    op: fn(&CodegenContext<'ctx>, &Type, PointerValue<'ctx>),
) {
    entry(cg, func);
    let addr = param_ptr(func, 0);
    let lowered = lower_type(cg, ty).into_struct_type();
    for (index, field) in struct_fields(ty).iter().enumerate() {
        let field_ptr = cg
            .builder
            .build_struct_gep(lowered, addr, index as u32, &field.name)
            .unwrap();
        op(cg, &field.ty, field_ptr);
    }
    ret_void(cg);
}

fn emit_srt_binary<'ctx>(
    cg: &CodegenContext<'ctx>,
    ty: &Type,
    func: FunctionValue<'ctx>,
    op: fn(&CodegenContext<'ctx>, &Type, PointerValue<'ctx>, PointerValue<'ctx>),
) {
    entry(cg, func);
    let dst = param_ptr(func, 0);
    let src = param_ptr(func, 1);
    let lowered = lower_type(cg, ty).into_struct_type();
    for (index, field) in struct_fields(ty).iter().enumerate() {
        let to = cg
            .builder
            .build_struct_gep(lowered, dst, index as u32, &field.name)
            .unwrap();
        let from = cg
            .builder
            .build_struct_gep(lowered, src, index as u32, &field.name)
            .unwrap();
        op(cg, &field.ty, to, from);
    }
    ret_void(cg);
}

//-------------------------------- Closures ------------------------------------

/// The function slot of a default constructed closure. Calling it is a
/// runtime panic.
fn emit_clo_stub<'ctx>(cg: &CodegenContext<'ctx>, func: FunctionValue<'ctx>) {
    entry(cg, func);
    call_panic(cg, "Calling a default constructed function object");
}

fn closure_slots<'ctx>(
    cg: &CodegenContext<'ctx>,
    value: PointerValue<'ctx>,
) -> (PointerValue<'ctx>, PointerValue<'ctx>) {
    let value_ty = closure_value_type(cg);
    let fn_slot = cg
        .builder
        .build_struct_gep(value_ty, value, 0, "fn_slot")
        .unwrap();
    let data_slot = cg
        .builder
        .build_struct_gep(value_ty, value, 1, "data_slot")
        .unwrap();
    (fn_slot, data_slot)
}

fn emit_clo_def_ctor<'ctx>(cg: &CodegenContext<'ctx>, func: FunctionValue<'ctx>) {
    entry(cg, func);
    let value = param_ptr(func, 0);
    let (fn_slot, data_slot) = closure_slots(cg, value);
    let stub = instance(cg, Inst::CloStub, &Type::Void);
    cg.builder.build_store(fn_slot, fn_ptr(stub)).unwrap();
    cg.builder.build_store(data_slot, null_ptr(cg)).unwrap();
    ret_void(cg);
}

/// Closure data carries its destructor in the header, so one destructor
/// works for every capture layout through the type-erased function value.
fn emit_clo_dtor<'ctx>(cg: &CodegenContext<'ctx>, func: FunctionValue<'ctx>) {
    entry(cg, func);
    let value = param_ptr(func, 0);
    let (_, data_slot) = closure_slots(cg, value);

    let live = cg.context.append_basic_block(func, "live");
    let dead = cg.context.append_basic_block(func, "dead");
    let done = cg.context.append_basic_block(func, "done");

    let data = load_handle(cg, data_slot);
    cg.builder
        .build_conditional_branch(is_null(cg, data), done, live)
        .unwrap();

    cg.builder.position_at_end(live);
    let dec = instance(cg, Inst::PtrDec, &Type::Void);
    let is_dead = call_value(cg, dec, &[data.into()], "is_dead").into_int_value();
    cg.builder.build_conditional_branch(is_dead, dead, done).unwrap();

    cg.builder.position_at_end(dead);
    let header_ty = closure_data_type(cg, &[]);
    let dtor_slot = cg
        .builder
        .build_struct_gep(header_ty, data, 1, "dtor_slot")
        .unwrap();
    let dtor = cg
        .builder
        .build_load(cg.context.ptr_type(AddressSpace::default()), dtor_slot, "dtor")
        .unwrap()
        .into_pointer_value();
    cg.builder
        .build_indirect_call(unary_op_type(cg), dtor, &[data.into()], "")
        .unwrap();
    call_free(cg, data);
    cg.builder.build_unconditional_branch(done).unwrap();

    cg.builder.position_at_end(done);
    ret_void(cg);
}

fn copy_closure_fields<'ctx>(
    cg: &CodegenContext<'ctx>,
    dst: PointerValue<'ctx>,
    src: PointerValue<'ctx>,
) -> PointerValue<'ctx> {
    let (dst_fn, dst_data) = closure_slots(cg, dst);
    let (src_fn, src_data) = closure_slots(cg, src);
    let fn_val = load_handle(cg, src_fn);
    let data_val = load_handle(cg, src_data);
    cg.builder.build_store(dst_fn, fn_val).unwrap();
    cg.builder.build_store(dst_data, data_val).unwrap();
    data_val
}

fn emit_clo_cop_ctor<'ctx>(cg: &CodegenContext<'ctx>, func: FunctionValue<'ctx>) {
    entry(cg, func);
    let dst = param_ptr(func, 0);
    let src = param_ptr(func, 1);

    let keep = cg.context.append_basic_block(func, "retain");
    let done = cg.context.append_basic_block(func, "done");

    let data = copy_closure_fields(cg, dst, src);
    cg.builder
        .build_conditional_branch(is_null(cg, data), done, keep)
        .unwrap();

    cg.builder.position_at_end(keep);
    let inc = instance(cg, Inst::PtrInc, &Type::Void);
    call_void(cg, inc, &[data.into()]);
    cg.builder.build_unconditional_branch(done).unwrap();

    cg.builder.position_at_end(done);
    ret_void(cg);
}

fn emit_clo_cop_asgn<'ctx>(cg: &CodegenContext<'ctx>, func: FunctionValue<'ctx>) {
    entry(cg, func);
    let dst = param_ptr(func, 0);
    let src = param_ptr(func, 1);

    let keep = cg.context.append_basic_block(func, "retain");
    let swap = cg.context.append_basic_block(func, "swap");

    let (_, src_data_slot) = closure_slots(cg, src);
    let data = load_handle(cg, src_data_slot);
    cg.builder
        .build_conditional_branch(is_null(cg, data), swap, keep)
        .unwrap();

    cg.builder.position_at_end(keep);
    let inc = instance(cg, Inst::PtrInc, &Type::Void);
    call_void(cg, inc, &[data.into()]);
    cg.builder.build_unconditional_branch(swap).unwrap();

    cg.builder.position_at_end(swap);
    let dtor = instance(cg, Inst::CloDtor, &Type::Void);
    call_void(cg, dtor, &[dst.into()]);
    copy_closure_fields(cg, dst, src);
    ret_void(cg);
}

fn reset_closure<'ctx>(cg: &CodegenContext<'ctx>, value: PointerValue<'ctx>) {
    let (fn_slot, data_slot) = closure_slots(cg, value);
    let stub = instance(cg, Inst::CloStub, &Type::Void);
    cg.builder.build_store(fn_slot, fn_ptr(stub)).unwrap();
    cg.builder.build_store(data_slot, null_ptr(cg)).unwrap();
}

fn emit_clo_mov_ctor<'ctx>(cg: &CodegenContext<'ctx>, func: FunctionValue<'ctx>) {
    entry(cg, func);
    let dst = param_ptr(func, 0);
    let src = param_ptr(func, 1);
    copy_closure_fields(cg, dst, src);
    reset_closure(cg, src);
    ret_void(cg);
}

fn emit_clo_mov_asgn<'ctx>(cg: &CodegenContext<'ctx>, func: FunctionValue<'ctx>) {
    entry(cg, func);
    let dst = param_ptr(func, 0);
    let src = param_ptr(func, 1);
    let dtor = instance(cg, Inst::CloDtor, &Type::Void);
    call_void(cg, dtor, &[dst.into()]);
    copy_closure_fields(cg, dst, src);
    reset_closure(cg, src);
    ret_void(cg);
}

/// Destroys the capture slots of one environment layout; invoked through
/// the virtual destructor slot.
fn emit_clo_data_dtor<'ctx>(cg: &CodegenContext<'ctx>, ty: &Type, func: FunctionValue<'ctx>) {
    entry(cg, func);
    let captures: Vec<Type> = struct_fields(ty).iter().map(|f| f.ty.clone()).collect();
    let data = param_ptr(func, 0);
    let data_ty = closure_data_type(cg, &captures);
    for (index, capture) in captures.iter().enumerate() {
        let slot = cg
            .builder
            .build_struct_gep(
                data_ty,
                data,
                CLOSURE_DATA_CAPTURE_BASE + index as u32,
                "capture",
            )
            .unwrap();
        destroy(cg, capture, slot);
    }
    ret_void(cg);
}

//------------------------------- User types -----------------------------------

fn user_of(ty: &Type) -> &crate::semantic::UserType {
    match ty.concrete() {
        Type::User(user) => user,
        _ => unreachable!("user operation instantiated for {ty:?}"),
    }
}

fn host_fn_ptr<'ctx>(cg: &CodegenContext<'ctx>, addr: u64) -> PointerValue<'ctx> {
    let int = cg.context.i64_type().const_int(addr, false);
    cg.builder
        .build_int_to_ptr(int, cg.context.ptr_type(AddressSpace::default()), "host_fn")
        .unwrap()
}

fn emit_usr_unary<'ctx>(
    cg: &CodegenContext<'ctx>,
    ty: &Type,
    func: FunctionValue<'ctx>,
    select: fn(&crate::semantic::UserType) -> u64,
    zero_on_trivial: bool,
) {
    entry(cg, func);
    let user = user_of(ty).clone();
    let addr = select(&user);
    let obj = param_ptr(func, 0);
    if addr == USER_OP_TRIVIAL {
        // trivial destruction is a no-op; trivial construction zeroes
        if zero_on_trivial {
            let size = cg.context.i64_type().const_int(user.size as u64, false);
            cg.builder
                .build_memset(obj, 1, cg.context.i8_type().const_zero(), size)
                .unwrap();
        }
        ret_void(cg);
        return;
    }
    let target = host_fn_ptr(cg, addr);
    cg.builder
        .build_indirect_call(unary_op_type(cg), target, &[obj.into()], "")
        .unwrap();
    ret_void(cg);
}

fn emit_usr_binary<'ctx>(
    cg: &CodegenContext<'ctx>,
    ty: &Type,
    func: FunctionValue<'ctx>,
    select: fn(&crate::semantic::UserType) -> u64,
) {
    entry(cg, func);
    let user = user_of(ty).clone();
    let addr = select(&user);
    let dst = param_ptr(func, 0);
    let src = param_ptr(func, 1);
    if addr == USER_OP_TRIVIAL {
        let size = cg.context.i64_type().const_int(user.size as u64, false);
        cg.builder.build_memcpy(dst, 1, src, 1, size).unwrap();
        ret_void(cg);
        return;
    }
    let target = host_fn_ptr(cg, addr);
    cg.builder
        .build_indirect_call(binary_op_type(cg), target, &[dst.into(), src.into()], "")
        .unwrap();
    ret_void(cg);
}
