//! Declaration lowering: function signatures and bodies, globals with their
//! synthesized constructor/destructor functions, and the appending-linkage
//! `llvm.global_ctors` / `llvm.global_dtors` lists.
//!
//! Generation is two-pass per compilation: all prototypes and globals are
//! declared first so bodies can reference forward, then bodies and global
//! initializers are emitted in module order.

use inkwell::{
    module::Linkage,
    types::BasicType,
    values::FunctionValue,
    AddressSpace,
};

use crate::parser::ast::{Declaration, FuncDecl, Module, Param, ParamRef, VarDecl};
use crate::semantic::{Binding, ExprType, Symbols, SymbolKind, Type, TypeInfo};

use super::expr::{entry_alloca, gen_into, internal_fn_type};
use super::lifetime::{copy_construct, destroy};
use super::stat::gen_body;
use super::types::{lower_type, trivially_copyable};
use super::{CodegenContext, FnCtx};

/// Lowers all analyzed modules into the backend module.
pub fn generate<'ctx>(cg: &CodegenContext<'ctx>, symbols: &Symbols) {
    for module in &symbols.modules {
        declare_module(cg, module);
    }

    let mut ctors: Vec<FunctionValue> = vec![];
    let mut dtors: Vec<FunctionValue> = vec![];
    for module in &symbols.modules {
        define_module(cg, module, &mut ctors, &mut dtors);
    }
    write_ctor_lists(cg, &ctors, &dtors);
}

fn signature_of(func: &FuncDecl<TypeInfo>) -> (Vec<(ParamRef, Type)>, Type, bool, String) {
    let symbol = func.symbol.as_ref().expect("function without symbol");
    let borrowed = symbol.borrow();
    let SymbolKind::Func(sym) = &borrowed.kind else {
        unreachable!("function declaration without function symbol");
    };
    let mut params: Vec<(ParamRef, Type)> = vec![];
    if let Some(receiver) = &sym.receiver {
        params.push(param_mode(receiver));
    }
    for param in &sym.params {
        params.push(param_mode(param));
    }
    (params, sym.ret.clone(), sym.external, sym.mangled.clone())
}

fn param_mode(param: &ExprType) -> (ParamRef, Type) {
    let mode = if param.binding == Binding::Reference {
        ParamRef::Ref
    } else {
        ParamRef::Val
    };
    (mode, param.ty.clone())
}

//------------------------------ Declarations ----------------------------------

fn declare_module<'ctx>(cg: &CodegenContext<'ctx>, module: &Module<TypeInfo>) {
    for decl in &module.decls {
        match decl {
            Declaration::Func(func) => declare_function(cg, func),
            Declaration::Var(var) => declare_global(cg, module, var),
            Declaration::Type(_) => {}
        }
    }
}

fn declare_function<'ctx>(cg: &CodegenContext<'ctx>, func: &FuncDecl<TypeInfo>) {
    let (params, ret, external, mangled) = signature_of(func);
    let fn_type = if external {
        // externals keep the C signature so the host can call address_of
        let mut lowered: Vec<inkwell::types::BasicMetadataTypeEnum> = vec![];
        for (mode, ty) in &params {
            lowered.push(match mode {
                ParamRef::Ref => cg.context.ptr_type(AddressSpace::default()).into(),
                ParamRef::Val => lower_type(cg, ty).into(),
            });
        }
        match &ret {
            Type::Void => cg.context.void_type().fn_type(&lowered, false),
            _ => lower_type(cg, &ret).fn_type(&lowered, false),
        }
    } else {
        internal_fn_type(cg, &params, &ret)
    };
    let linkage = if external {
        Linkage::External
    } else {
        Linkage::Internal
    };
    cg.module.add_function(&mangled, fn_type, Some(linkage));
}

fn declare_global<'ctx>(cg: &CodegenContext<'ctx>, module: &Module<TypeInfo>, var: &VarDecl<TypeInfo>) {
    let ty = var
        .resolved_ty
        .clone()
        .expect("global without a resolved type");
    let lowered = lower_type(cg, &ty);
    let name = if var.external {
        var.name.clone()
    } else {
        format!("{}.{}", module.name, var.name)
    };
    let global = cg.module.add_global(lowered, None, &name);
    global.set_linkage(if var.external {
        Linkage::External
    } else {
        Linkage::Internal
    });
    global.set_initializer(&lowered.const_zero());
    cg.bind_object(
        var.object.expect("unresolved global declaration"),
        global.as_pointer_value(),
    );
}

//------------------------------- Definitions ----------------------------------

fn define_module<'ctx>(
    cg: &CodegenContext<'ctx>,
    module: &Module<TypeInfo>,
    ctors: &mut Vec<FunctionValue<'ctx>>,
    dtors: &mut Vec<FunctionValue<'ctx>>,
) {
    for decl in &module.decls {
        match decl {
            Declaration::Func(func) => define_function(cg, func),
            Declaration::Var(var) => {
                let (ctor, dtor) = define_global_init(cg, module, var);
                ctors.push(ctor);
                dtors.push(dtor);
            }
            Declaration::Type(_) => {}
        }
    }
}

fn define_function<'ctx>(cg: &CodegenContext<'ctx>, func: &FuncDecl<TypeInfo>) {
    let (params, ret, external, mangled) = signature_of(func);
    let target = cg
        .module
        .get_function(&mangled)
        .expect("function body without declaration");

    let entry = cg.context.append_basic_block(target, "entry");
    cg.builder.position_at_end(entry);

    let mut fcx = FnCtx::new(target, ret);
    let offset = if external { 0 } else { 1 };

    // bind the receiver and parameters in order
    let mut nodes: Vec<&Param> = vec![];
    if let Some(receiver) = &func.receiver {
        nodes.push(receiver);
    }
    nodes.extend(func.params.iter());
    bind_param_nodes(cg, &mut fcx, &nodes, &params, offset);

    gen_body(cg, &mut fcx, &func.body);
}

/// Binds parameters to storage: by-reference parameters use the incoming
/// pointer directly; by-value parameters become callee-owned copies so the
/// body may assign them, with refcounted payloads retained on entry and
/// released on every exit.
pub(crate) fn bind_params<'ctx>(
    cg: &CodegenContext<'ctx>,
    fcx: &mut FnCtx<'ctx>,
    params: &[Param],
    types: &[(ParamRef, Type)],
    offset: u32,
) {
    let nodes: Vec<&Param> = params.iter().collect();
    bind_param_nodes(cg, fcx, &nodes, types, offset);
}

fn bind_param_nodes<'ctx>(
    cg: &CodegenContext<'ctx>,
    fcx: &mut FnCtx<'ctx>,
    params: &[&Param],
    types: &[(ParamRef, Type)],
    offset: u32,
) {
    for (index, (param, (mode, ty))) in params.iter().zip(types.iter()).enumerate() {
        let object = param.object.expect("unresolved parameter");
        let incoming = fcx
            .function
            .get_nth_param(offset + index as u32)
            .expect("missing function parameter");
        match mode {
            ParamRef::Ref => {
                cg.bind_object(object, incoming.into_pointer_value());
            }
            ParamRef::Val => {
                let slot = entry_alloca(cg, fcx, lower_type(cg, ty), &param.name);
                if trivially_copyable(ty) {
                    cg.builder.build_store(slot, incoming).unwrap();
                } else {
                    // copy-construct the callee's own value from the
                    // caller's; the scratch spill itself stays borrowed
                    let scratch =
                        entry_alloca(cg, fcx, lower_type(cg, ty), &format!("{}.in", param.name));
                    cg.builder.build_store(scratch, incoming).unwrap();
                    copy_construct(cg, ty, slot, scratch);
                    fcx.own(ty.clone(), slot);
                }
                cg.bind_object(object, slot);
            }
        }
    }
}

//--------------------------------- Globals ------------------------------------

/// Synthesizes the constructor and destructor functions for one global.
fn define_global_init<'ctx>(
    cg: &CodegenContext<'ctx>,
    module: &Module<TypeInfo>,
    var: &VarDecl<TypeInfo>,
) -> (FunctionValue<'ctx>, FunctionValue<'ctx>) {
    let ty = var
        .resolved_ty
        .clone()
        .expect("global without a resolved type");
    let addr = cg.object_addr(var.object.expect("unresolved global declaration"));
    let void_fn = cg.context.void_type().fn_type(&[], false);

    let ctor = cg.module.add_function(
        &format!("{}.{}_ctor", module.name, var.name),
        void_fn,
        Some(Linkage::Internal),
    );
    let entry = cg.context.append_basic_block(ctor, "entry");
    cg.builder.position_at_end(entry);
    let mut fcx = FnCtx::new(ctor, Type::Void);
    match &var.expr {
        Some(expr) => gen_into(cg, &mut fcx, expr, addr),
        None => super::lifetime::def_construct(cg, &ty, addr),
    }
    // the initializer may have produced temporaries
    gen_epilogue(cg, &fcx);

    let dtor = cg.module.add_function(
        &format!("{}.{}_dtor", module.name, var.name),
        void_fn,
        Some(Linkage::Internal),
    );
    let entry = cg.context.append_basic_block(dtor, "entry");
    cg.builder.position_at_end(entry);
    destroy(cg, &ty, addr);
    cg.builder.build_return(None).unwrap();

    (ctor, dtor)
}

fn gen_epilogue<'ctx>(cg: &CodegenContext<'ctx>, fcx: &FnCtx<'ctx>) {
    for frame in fcx.frames.iter().rev() {
        for (ty, addr) in frame.owned.iter().rev() {
            destroy(cg, ty, *addr);
        }
    }
    cg.builder.build_return(None).unwrap();
}

/// Registers the synthesized functions in the runtime's static
/// constructor/destructor lists; priorities preserve registration order.
fn write_ctor_lists<'ctx>(
    cg: &CodegenContext<'ctx>,
    ctors: &[FunctionValue<'ctx>],
    dtors: &[FunctionValue<'ctx>],
) {
    if ctors.is_empty() {
        return;
    }
    let ptr = cg.context.ptr_type(AddressSpace::default());
    let entry_ty = cg.context.struct_type(
        &[cg.context.i32_type().into(), ptr.into(), ptr.into()],
        false,
    );

    let mut write = |funcs: &[FunctionValue<'ctx>], name: &str| {
        let entries: Vec<_> = funcs
            .iter()
            .enumerate()
            .map(|(priority, func)| {
                cg.context.const_struct(
                    &[
                        cg.context
                            .i32_type()
                            .const_int(priority as u64, false)
                            .into(),
                        func.as_global_value().as_pointer_value().into(),
                        ptr.const_null().into(),
                    ],
                    false,
                )
            })
            .collect();
        let list = entry_ty.const_array(&entries);
        let global = cg
            .module
            .add_global(entry_ty.array_type(entries.len() as u32), None, name);
        global.set_linkage(Linkage::Appending);
        global.set_initializer(&list);
    };
    write(ctors, "llvm.global_ctors");
    write(dtors, "llvm.global_dtors");
}
