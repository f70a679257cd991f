//! LLVM code generation.
//!
//! A [`CodegenContext`] owns the inkwell module and builder plus the caches
//! that make per-type runtime functions unique: every `(operation, type)`
//! pair is materialized at most once through the instance map. Object
//! storage addresses are keyed by the analyzer's [`ObjectId`]s, so code
//! generation never resolves a name.

pub(crate) mod compare;
pub(crate) mod decl;
pub(crate) mod expr;
pub(crate) mod lifetime;
pub(crate) mod stat;
pub(crate) mod types;

use std::{cell::RefCell, collections::HashMap};

use inkwell::{
    basic_block::BasicBlock,
    builder::Builder,
    context::Context,
    module::Module,
    values::{FunctionValue, PointerValue},
};

use crate::semantic::{Capture, ObjectId, Type};

/// Key of a materialized runtime function. Operations that do not depend on
/// a type (the refcount helpers, the closure value operations, panic and the
/// allocator imports) are keyed with [`Type::Void`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Inst {
    PtrInc,
    PtrDec,
    PtrDtor,
    PtrCopCtor,
    PtrCopAsgn,
    PtrMovCtor,
    PtrMovAsgn,
    Panic,
    Alloc,
    Free,
    CeilPow2,

    ArrDtor,
    ArrDefCtor,
    ArrCopCtor,
    ArrCopAsgn,
    ArrMovCtor,
    ArrMovAsgn,
    ArrIdxS,
    ArrIdxU,
    ArrLenCtor,
    ArrStrgDtor,
    ArrEq,
    ArrLt,
    ConstructN,
    DestroyN,
    CopyN,
    MoveN,
    Reallocate,

    BtnPushBack,
    BtnAppend,
    BtnPopBack,
    BtnResize,
    BtnReserve,

    SrtDtor,
    SrtDefCtor,
    SrtCopCtor,
    SrtCopAsgn,
    SrtMovCtor,
    SrtMovAsgn,
    SrtEq,
    SrtLt,

    CloStub,
    CloDefCtor,
    CloDtor,
    CloCopCtor,
    CloCopAsgn,
    CloMovCtor,
    CloMovAsgn,
    CloEq,
    CloLt,
    CloBool,
    /// Virtual destructor for one closure environment layout.
    CloDataDtor,

    UsrDtor,
    UsrDefCtor,
    UsrCopCtor,
    UsrCopAsgn,
    UsrMovCtor,
    UsrMovAsgn,
    UsrEq,
    UsrLt,
    UsrBool,
}

pub struct CodegenContext<'ctx> {
    pub context: &'ctx Context,
    pub module: Module<'ctx>,
    pub builder: Builder<'ctx>,
    /// One generated function per (operation, type) pair.
    pub(crate) instances: RefCell<HashMap<(Inst, Type), FunctionValue<'ctx>>>,
    /// Storage address of every object; ids are unique per compilation so a
    /// flat map needs no scoping.
    pub(crate) objects: RefCell<HashMap<ObjectId, PointerValue<'ctx>>>,
}

impl<'ctx> CodegenContext<'ctx> {
    pub fn new(context: &'ctx Context) -> CodegenContext<'ctx> {
        CodegenContext {
            context,
            module: context.create_module("stela"),
            builder: context.create_builder(),
            instances: RefCell::new(HashMap::new()),
            objects: RefCell::new(HashMap::new()),
        }
    }

    pub(crate) fn bind_object(&self, id: ObjectId, addr: PointerValue<'ctx>) {
        self.objects.borrow_mut().insert(id, addr);
    }

    pub(crate) fn object_addr(&self, id: ObjectId) -> PointerValue<'ctx> {
        *self
            .objects
            .borrow()
            .get(&id)
            .expect("object without storage")
    }

    /// True when the builder's current block already ends in a terminator;
    /// nothing more may be emitted into it.
    pub(crate) fn terminated(&self) -> bool {
        self.builder
            .get_insert_block()
            .and_then(|block| block.get_terminator())
            .is_some()
    }
}

/// Per-function emission state: the frame stack drives destructor insertion
/// on every edge that leaves a scope.
pub(crate) struct FnCtx<'ctx> {
    pub function: FunctionValue<'ctx>,
    pub frames: Vec<Frame<'ctx>>,
    pub ret_ty: Type,
    /// Closure data pointer of the enclosing lambda body, if any.
    pub env_ptr: Option<PointerValue<'ctx>>,
    /// Captures of the enclosing lambda, for resolving capture indices.
    pub captures: Vec<Capture>,
}

pub(crate) enum FrameKind<'ctx> {
    Function,
    Block,
    Loop {
        break_to: BasicBlock<'ctx>,
        continue_to: BasicBlock<'ctx>,
    },
    Switch {
        break_to: BasicBlock<'ctx>,
        /// Body of the next case; `continue` falls through to it.
        next_case: Option<BasicBlock<'ctx>>,
    },
}

pub(crate) struct Frame<'ctx> {
    pub kind: FrameKind<'ctx>,
    /// Objects this frame owns, in declaration order; destroyed in reverse
    /// on every edge leaving the frame.
    pub owned: Vec<(Type, PointerValue<'ctx>)>,
}

impl<'ctx> FnCtx<'ctx> {
    pub fn new(function: FunctionValue<'ctx>, ret_ty: Type) -> FnCtx<'ctx> {
        FnCtx {
            function,
            frames: vec![Frame {
                kind: FrameKind::Function,
                owned: vec![],
            }],
            ret_ty,
            env_ptr: None,
            captures: vec![],
        }
    }

    pub fn push(&mut self, kind: FrameKind<'ctx>) {
        self.frames.push(Frame { kind, owned: vec![] });
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn own(&mut self, ty: Type, addr: PointerValue<'ctx>) {
        self.frames
            .last_mut()
            .expect("no frame to own an object")
            .owned
            .push((ty, addr));
    }
}
