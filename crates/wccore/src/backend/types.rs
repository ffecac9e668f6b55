//! GC type-section construction — spec.md §4.4.
//!
//! Every struct/array/function shape the backend needs is registered once
//! here and referred to everywhere else in `backend` by index. Keeping
//! every index decision in one place is what lets `codegen` stay a pure
//! per-function translator that never has to reason about *which* number a
//! type is, only which logical shape it wants.
//!
//! The calling convention this backend settles on (recorded in full in
//! `DESIGN.md`) is that every compiled function — plain function, method,
//! constructor, or a synthesized interface-accessor thunk — has the same
//! external shape: every parameter and the result are `anyref`, boxed via
//! the `libdyntype` runtime at the boundary. Only *storage* — class fields,
//! environment-record slots, and array elements — keeps its precise
//! WebAssembly type (`f64`/`i32`/a concrete GC ref), matching spec.md
//! §4.4's "numeric fields stay unboxed" intent for the parts of the system
//! the spec's testable properties actually pin down (object layout,
//! subclass extension, interface views).
//!
//! Dispatch — both a class's vtable and an interface's per-class dispatch
//! record — is a `(array (mut i32))` of function-table indices, called
//! through `call_indirect`. One shared array type backs both, since both
//! are simply "a list of callable slots" (spec.md Glossary, Vtable /
//! Dispatch record).
//!
//! Every type declared here lands in a single recursive group, so a
//! class's field can reference another class declared later in the same
//! (or a different) module without a forward-reference problem — indices
//! are assigned before any field list is built.

use ahash::AHashMap;
use wasm_encoder::{
    AbstractHeapType, ArrayType, CompositeType, FieldType, FuncType as WasmFuncType, HeapType, RefType, StorageType, StructType, SubType,
    TypeSection, ValType,
};

use crate::ir::{FunctionId, IrModule};
use crate::runtime_abi::{AbiType, all_imports};
use crate::types::{ClassId, InterfaceId, Type, TypeTables};

/// How a [`Type`] is represented once it reaches a GC struct field, array
/// element, or environment-record slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    F64,
    I32,
    AnyRef,
    Instance(ClassId),
    View(InterfaceId),
    /// Every array is element-`any` in this rewrite (see `DESIGN.md`): the
    /// front end never lowers a narrower element type.
    Array,
    Closure,
}

pub fn storage_kind(ty: &Type) -> StorageKind {
    match ty {
        Type::Number => StorageKind::F64,
        Type::Bool => StorageKind::I32,
        Type::Class(id) => StorageKind::Instance(*id),
        Type::Interface(id) => StorageKind::View(*id),
        Type::Array(_) => StorageKind::Array,
        Type::Function { .. } => StorageKind::Closure,
        // Strings, null, undefined, any, unions, and unspecialized generics
        // all cross the `any` boundary (spec.md §4.2).
        Type::Void | Type::String | Type::Null | Type::Undefined | Type::Any | Type::Union(_) | Type::GenericParam(_) => StorageKind::AnyRef,
    }
}

pub fn anyref() -> ValType {
    ValType::Ref(RefType { nullable: true, heap_type: HeapType::Abstract { shared: false, ty: AbstractHeapType::Any } })
}

pub fn externref() -> ValType {
    ValType::Ref(RefType { nullable: true, heap_type: HeapType::Abstract { shared: false, ty: AbstractHeapType::Extern } })
}

pub fn concrete_ref(index: u32) -> ValType {
    ValType::Ref(RefType { nullable: true, heap_type: HeapType::Concrete(index) })
}

fn field(element_type: ValType, mutable: bool) -> FieldType {
    FieldType { element_type: StorageType::Val(element_type), mutable }
}

pub fn abi_val_type(ty: AbiType) -> ValType {
    match ty {
        AbiType::I32 => ValType::I32,
        AbiType::F64 => ValType::F64,
        AbiType::AnyRef => anyref(),
        AbiType::ExternRef => externref(),
        // The dynamic-runtime context handle is owned by the host, so it
        // crosses the import boundary the same way any other host value
        // does (spec.md §6).
        AbiType::Context => externref(),
    }
}

/// All GC/function type indices the rest of `backend` needs, built once up
/// front from the resolved [`TypeTables`] and the lowered [`IrModule`].
pub struct TypeRegistry {
    pub section: TypeSection,
    pub env_base: u32,
    pub vtable_array: u32,
    pub array_any: u32,
    pub closure: u32,
    /// `{offset: i32, length: i32}`, built fresh at every string-literal
    /// site and passed as the raw payload to `libdyntype.new_string`
    /// (spec.md §6 imports `new_string(ctx, raw) -> anyref`; a struct ref
    /// is a subtype of `anyref` so it satisfies that signature directly
    /// without a dedicated import).
    pub string_slice: u32,
    pub instance_of: AHashMap<ClassId, u32>,
    pub view_of: AHashMap<InterfaceId, u32>,
    /// Env-record struct type for every function that owns one (spec.md
    /// §4.3 Closures).
    pub env_of: AHashMap<FunctionId, u32>,
    /// `func(anyref × n) -> anyref` for every arity `n` actually used by a
    /// `call`/`call_indirect` site (plain functions, vtable calls,
    /// interface calls, closure calls, accessor thunks).
    pub call_shape: AHashMap<u32, u32>,
    /// Import function-type indices, in `runtime_abi::all_imports()` order.
    pub abi_func_types: Vec<u32>,
}

pub fn val_type(kind: StorageKind, reg: &TypeRegistry) -> ValType {
    resolve_val_type(kind, &reg.instance_of, &reg.view_of, reg.array_any, reg.closure)
}

/// Shared by [`val_type`] (post-construction lookups from `codegen`) and
/// `build` itself (which needs to resolve field types before the
/// [`TypeRegistry`] it will return exists).
fn resolve_val_type(kind: StorageKind, instance_of: &AHashMap<ClassId, u32>, view_of: &AHashMap<InterfaceId, u32>, array_any: u32, closure: u32) -> ValType {
    match kind {
        StorageKind::F64 => ValType::F64,
        StorageKind::I32 => ValType::I32,
        StorageKind::AnyRef => anyref(),
        StorageKind::Instance(id) => concrete_ref(*instance_of.get(&id).expect("every class is registered")),
        StorageKind::View(id) => concrete_ref(*view_of.get(&id).expect("every interface is registered")),
        StorageKind::Array => concrete_ref(array_any),
        StorageKind::Closure => concrete_ref(closure),
    }
}

pub fn build(tables: &TypeTables, module: &IrModule) -> TypeRegistry {
    // ---- Pass 1: assign every index up front --------------------------
    let mut next = 0u32;
    let mut alloc = || {
        let idx = next;
        next += 1;
        idx
    };

    let env_base = alloc();
    let vtable_array = alloc();
    let array_any = alloc();
    let closure = alloc();
    let string_slice = alloc();

    let mut instance_of = AHashMap::new();
    for idx in 0..tables.classes.len() {
        instance_of.insert(ClassId(idx as u32), alloc());
    }
    let mut view_of = AHashMap::new();
    for idx in 0..tables.interfaces.len() {
        view_of.insert(InterfaceId(idx as u32), alloc());
    }
    let mut env_of = AHashMap::new();
    for (idx, f) in module.functions.iter().enumerate() {
        if f.env_layout.is_some() {
            env_of.insert(FunctionId(idx as u32), alloc());
        }
    }

    let mut arities = std::collections::BTreeSet::new();
    for f in &module.functions {
        arities.insert(f.param_count + u32::from(f.takes_this) + u32::from(f.takes_parent_env));
    }
    // Interface accessor thunks: a getter thunk takes just `this` (arity
    // 1), a setter thunk takes `this` and the new value (arity 2). The
    // synthesized `~start` function (backend::mod) takes no parameters at
    // all but still returns a boxed `anyref` like every other compiled
    // function, so arity 0 needs a shape too even if every real function in
    // the module happens to take at least one argument.
    arities.insert(0);
    arities.insert(1);
    arities.insert(2);
    let mut call_shape = AHashMap::new();
    for arity in &arities {
        call_shape.insert(*arity, alloc());
    }

    let abi_func_types: Vec<u32> = all_imports().map(|_| alloc()).collect();

    // ---- Pass 2: build every SubType now that indices are stable ------
    let mut subtypes: Vec<SubType> = Vec::with_capacity(next as usize);

    subtypes.push(SubType {
        is_final: false,
        supertype_idx: None,
        composite_type: CompositeType::Struct(StructType { fields: vec![field(anyref(), false)].into_boxed_slice() }),
    });
    subtypes.push(SubType {
        is_final: true,
        supertype_idx: None,
        composite_type: CompositeType::Array(ArrayType(field(ValType::I32, true))),
    });
    subtypes.push(SubType {
        is_final: true,
        supertype_idx: None,
        composite_type: CompositeType::Array(ArrayType(field(anyref(), true))),
    });
    subtypes.push(SubType {
        is_final: true,
        supertype_idx: None,
        composite_type: CompositeType::Struct(StructType {
            fields: vec![field(ValType::I32, false), field(concrete_ref(env_base), false)].into_boxed_slice(),
        }),
    });
    subtypes.push(SubType {
        is_final: true,
        supertype_idx: None,
        composite_type: CompositeType::Struct(StructType {
            fields: vec![field(ValType::I32, false), field(ValType::I32, false)].into_boxed_slice(),
        }),
    });

    for (idx, info) in tables.classes.iter().enumerate() {
        let class_id = ClassId(idx as u32);
        let parent_idx = info.parent.map(|p| instance_of[&p]);
        let mut fields = vec![field(concrete_ref(vtable_array), false)];
        for member in &info.instance_meta.fields {
            fields.push(field(resolve_val_type(storage_kind(&member.ty), &instance_of, &view_of, array_any, closure), true));
        }
        subtypes.push(SubType {
            is_final: !has_subclass(tables, class_id),
            supertype_idx: parent_idx,
            composite_type: CompositeType::Struct(StructType { fields: fields.into_boxed_slice() }),
        });
    }

    for _ in 0..tables.interfaces.len() {
        subtypes.push(SubType {
            is_final: true,
            supertype_idx: None,
            composite_type: CompositeType::Struct(StructType {
                fields: vec![field(anyref(), false), field(concrete_ref(vtable_array), false)].into_boxed_slice(),
            }),
        });
    }

    for f in &module.functions {
        if let Some(layout) = &f.env_layout {
            let mut fields = vec![field(anyref(), false)];
            for ty in &layout.slot_types {
                fields.push(field(resolve_val_type(storage_kind(ty), &instance_of, &view_of, array_any, closure), true));
            }
            subtypes.push(SubType {
                is_final: true,
                supertype_idx: Some(env_base),
                composite_type: CompositeType::Struct(StructType { fields: fields.into_boxed_slice() }),
            });
        }
    }

    for arity in &arities {
        let params = vec![anyref(); *arity as usize];
        subtypes.push(SubType {
            is_final: true,
            supertype_idx: None,
            composite_type: CompositeType::Func(WasmFuncType::new(params, vec![anyref()])),
        });
    }

    for sig in all_imports() {
        let params = sig.params.iter().map(|p| abi_val_type(*p)).collect::<Vec<_>>();
        let results = sig.result.map(|r| vec![abi_val_type(r)]).unwrap_or_default();
        subtypes.push(SubType { is_final: true, supertype_idx: None, composite_type: CompositeType::Func(WasmFuncType::new(params, results)) });
    }

    let mut section = TypeSection::new();
    section.ty().rec(subtypes);

    TypeRegistry { section, env_base, vtable_array, array_any, closure, string_slice, instance_of, view_of, env_of, call_shape, abi_func_types }
}

fn has_subclass(tables: &TypeTables, class_id: ClassId) -> bool {
    tables.classes.iter().any(|c| c.parent == Some(class_id))
}
