//! Lowering of semantic types to LLVM types.
//!
//! | STELA            | LLVM                                              |
//! |------------------|---------------------------------------------------|
//! | bool, byte, char | i8                                                |
//! | sint, uint       | i32                                               |
//! | real             | f32                                               |
//! | opaq             | ptr                                               |
//! | [T]              | ptr to packed `{i64 ref, i32 cap, i32 len, ptr}`  |
//! | func(...)        | `{ptr fn, ptr data}`, data `{i64 ref, ptr dtor}…` |
//! | struct           | struct of lowered fields                          |
//! | user type        | `[size x i8]`                                     |
//! | strong alias     | the underlying lowering                           |

use inkwell::{
    types::{BasicType, BasicTypeEnum, FunctionType, StructType},
    AddressSpace,
};

use crate::semantic::{Type, USER_OP_TRIVIAL};

use super::CodegenContext;

pub(crate) fn lower_type<'ctx>(cg: &CodegenContext<'ctx>, ty: &Type) -> BasicTypeEnum<'ctx> {
    match ty.concrete() {
        Type::Bool | Type::Byte | Type::Char => cg.context.i8_type().into(),
        Type::Sint | Type::Uint => cg.context.i32_type().into(),
        Type::Real => cg.context.f32_type().into(),
        Type::Opaq => cg.context.ptr_type(AddressSpace::default()).into(),
        Type::Array(_) => cg.context.ptr_type(AddressSpace::default()).into(),
        Type::Func { .. } => closure_value_type(cg).into(),
        Type::Struct { fields } => {
            let lowered: Vec<BasicTypeEnum> = fields
                .iter()
                .map(|field| lower_type(cg, &field.ty))
                .collect();
            cg.context.struct_type(&lowered, false).into()
        }
        Type::User(user) => cg.context.i8_type().array_type(user.size as u32).into(),
        Type::Void => unreachable!("void has no value representation"),
        Type::Strong { .. } => unreachable!("concrete() returned a strong alias"),
    }
}

/// The refcounted array header. Packed, so the layout is the documented
/// `{i64, i32, i32, ptr}` regardless of target. The element buffer is
/// reached through the data pointer, so the header shape is the same for
/// every element type.
pub(crate) fn array_header_type<'ctx>(cg: &CodegenContext<'ctx>) -> StructType<'ctx> {
    cg.context.struct_type(
        &[
            cg.context.i64_type().into(),
            cg.context.i32_type().into(),
            cg.context.i32_type().into(),
            cg.context.ptr_type(AddressSpace::default()).into(),
        ],
        true,
    )
}

pub(crate) const ARRAY_IDX_REF: u32 = 0;
pub(crate) const ARRAY_IDX_CAP: u32 = 1;
pub(crate) const ARRAY_IDX_LEN: u32 = 2;
pub(crate) const ARRAY_IDX_DAT: u32 = 3;

/// The two-word function object.
pub(crate) fn closure_value_type<'ctx>(cg: &CodegenContext<'ctx>) -> StructType<'ctx> {
    let ptr = cg.context.ptr_type(AddressSpace::default());
    cg.context.struct_type(&[ptr.into(), ptr.into()], false)
}

/// Closure data: refcount and virtual destructor, optionally followed by
/// the capture slots.
pub(crate) fn closure_data_type<'ctx>(
    cg: &CodegenContext<'ctx>,
    captures: &[Type],
) -> StructType<'ctx> {
    let mut fields: Vec<BasicTypeEnum> = vec![
        cg.context.i64_type().into(),
        cg.context.ptr_type(AddressSpace::default()).into(),
    ];
    for capture in captures {
        fields.push(lower_type(cg, capture));
    }
    cg.context.struct_type(&fields, false)
}

pub(crate) const CLOSURE_DATA_CAPTURE_BASE: u32 = 2;

/// Function type of a lifetime operation taking one object pointer.
pub(crate) fn unary_op_type<'ctx>(cg: &CodegenContext<'ctx>) -> FunctionType<'ctx> {
    let ptr = cg.context.ptr_type(AddressSpace::default());
    cg.context.void_type().fn_type(&[ptr.into()], false)
}

/// Function type of a lifetime operation taking destination and source.
pub(crate) fn binary_op_type<'ctx>(cg: &CodegenContext<'ctx>) -> FunctionType<'ctx> {
    let ptr = cg.context.ptr_type(AddressSpace::default());
    cg.context
        .void_type()
        .fn_type(&[ptr.into(), ptr.into()], false)
}

/// Function type of a comparison: two object pointers to an i1.
pub(crate) fn compare_op_type<'ctx>(cg: &CodegenContext<'ctx>) -> FunctionType<'ctx> {
    let ptr = cg.context.ptr_type(AddressSpace::default());
    cg.context
        .bool_type()
        .fn_type(&[ptr.into(), ptr.into()], false)
}

/// Whether values of this type are plain bytes: construction is a store,
/// destruction is a no-op.
pub(crate) fn trivially_copyable(ty: &Type) -> bool {
    match ty.concrete() {
        Type::Void | Type::Opaq | Type::Bool | Type::Byte | Type::Char | Type::Real
        | Type::Sint | Type::Uint => true,
        Type::Array(_) | Type::Func { .. } => false,
        Type::Struct { fields } => fields.iter().all(|field| trivially_copyable(&field.ty)),
        Type::User(user) => {
            user.dtor == USER_OP_TRIVIAL
                && user.def_ctor == USER_OP_TRIVIAL
                && user.cop_ctor == USER_OP_TRIVIAL
                && user.cop_asgn == USER_OP_TRIVIAL
                && user.mov_ctor == USER_OP_TRIVIAL
                && user.mov_asgn == USER_OP_TRIVIAL
        }
        Type::Strong { .. } => unreachable!("concrete() returned a strong alias"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::Field;
    use inkwell::context::Context;

    #[test]
    fn test_scalar_lowering() {
        let context = Context::create();
        let cg = CodegenContext::new(&context);
        assert_eq!(lower_type(&cg, &Type::Bool), context.i8_type().into());
        assert_eq!(lower_type(&cg, &Type::Sint), context.i32_type().into());
        assert_eq!(lower_type(&cg, &Type::Real), context.f32_type().into());
    }

    #[test]
    fn test_strong_alias_lowering() {
        let context = Context::create();
        let cg = CodegenContext::new(&context);
        let dir = Type::Strong {
            name: "Dir".into(),
            module: "main".into(),
            underlying: Box::new(Type::Sint),
        };
        assert_eq!(lower_type(&cg, &dir), lower_type(&cg, &Type::Sint));
    }

    #[test]
    fn test_array_header_is_packed() {
        let context = Context::create();
        let cg = CodegenContext::new(&context);
        let header = array_header_type(&cg);
        assert!(header.is_packed());
        assert_eq!(header.count_fields(), 4);
    }

    #[test]
    fn test_triviality() {
        assert!(trivially_copyable(&Type::Sint));
        assert!(!trivially_copyable(&Type::Array(Box::new(Type::Sint))));
        let plain = Type::Struct {
            fields: vec![Field { name: "x".into(), ty: Type::Real }],
        };
        assert!(trivially_copyable(&plain));
        let holds_array = Type::Struct {
            fields: vec![Field {
                name: "v".into(),
                ty: Type::Array(Box::new(Type::Sint)),
            }],
        };
        assert!(!trivially_copyable(&holds_array));
    }
}
