//! The dynamic-type runtime contract — spec.md §6.
//!
//! `libdyntype`/`libdstructdyn` are satisfied by a real dynamic-type
//! runtime module at link/instantiation time; this module only *declares*
//! the import signatures the backend needs to reserve function-type
//! indices and import entries for. Every call takes an opaque context
//! handle first (spec.md §6), represented here as `externref` since the
//! context is owned by the host embedding, not by the compiled module.

use crate::ir::node::StringId;

/// A WebAssembly value-type tag used only to describe import signatures;
/// the backend maps these onto concrete `wasm_encoder::ValType`s once it
/// knows the module's GC type indices (spec.md §4.4: struct/array types
/// for classes, interfaces, closures, and arrays).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbiType {
    I32,
    F64,
    AnyRef,
    ExternRef,
    /// The context handle every dynamic-runtime call takes first.
    Context,
}

#[derive(Debug, Clone, Copy)]
pub struct AbiSignature {
    pub module: &'static str,
    pub name: &'static str,
    pub params: &'static [AbiType],
    pub result: Option<AbiType>,
}

/// `libdyntype.*`: creation, inspection, and conversion of boxed dynamic
/// values, plus property get/set on dynamic objects (spec.md §6).
pub const DYNTYPE_IMPORTS: &[AbiSignature] = &[
    AbiSignature { module: "libdyntype", name: "new_number", params: &[AbiType::Context, AbiType::F64], result: Some(AbiType::AnyRef) },
    AbiSignature { module: "libdyntype", name: "new_bool", params: &[AbiType::Context, AbiType::I32], result: Some(AbiType::AnyRef) },
    AbiSignature { module: "libdyntype", name: "new_string", params: &[AbiType::Context, AbiType::AnyRef], result: Some(AbiType::AnyRef) },
    AbiSignature { module: "libdyntype", name: "new_object", params: &[AbiType::Context], result: Some(AbiType::AnyRef) },
    AbiSignature { module: "libdyntype", name: "new_array", params: &[AbiType::Context, AbiType::I32], result: Some(AbiType::AnyRef) },
    AbiSignature { module: "libdyntype", name: "new_undefined", params: &[AbiType::Context], result: Some(AbiType::AnyRef) },
    AbiSignature { module: "libdyntype", name: "new_null", params: &[AbiType::Context], result: Some(AbiType::AnyRef) },
    AbiSignature { module: "libdyntype", name: "new_extref", params: &[AbiType::Context, AbiType::ExternRef], result: Some(AbiType::AnyRef) },
    AbiSignature { module: "libdyntype", name: "to_number", params: &[AbiType::Context, AbiType::AnyRef], result: Some(AbiType::F64) },
    AbiSignature { module: "libdyntype", name: "to_bool", params: &[AbiType::Context, AbiType::AnyRef], result: Some(AbiType::I32) },
    AbiSignature { module: "libdyntype", name: "to_string", params: &[AbiType::Context, AbiType::AnyRef], result: Some(AbiType::AnyRef) },
    AbiSignature { module: "libdyntype", name: "to_extref", params: &[AbiType::Context, AbiType::AnyRef], result: Some(AbiType::ExternRef) },
    /// Tag check performed when unboxing `any` back to a static type
    /// (spec.md §4.2: "checked at the boundary by the runtime and fails
    /// with a tag mismatch, surfaced as a trap").
    AbiSignature { module: "libdyntype", name: "check_tag", params: &[AbiType::Context, AbiType::AnyRef, AbiType::I32], result: Some(AbiType::I32) },
    AbiSignature { module: "libdyntype", name: "get_property", params: &[AbiType::Context, AbiType::AnyRef, AbiType::AnyRef], result: Some(AbiType::AnyRef) },
    AbiSignature { module: "libdyntype", name: "set_property", params: &[AbiType::Context, AbiType::AnyRef, AbiType::AnyRef, AbiType::AnyRef], result: None },
    AbiSignature { module: "libdyntype", name: "invoke", params: &[AbiType::Context, AbiType::AnyRef, AbiType::AnyRef], result: Some(AbiType::AnyRef) },
];

/// `libdstructdyn.*`: typed struct-field dynamic access keyed by slot
/// index (spec.md §6) — used when a statically-typed instance is read or
/// written through an `any`-typed handle rather than its own class layout.
pub const STRUCT_DYN_IMPORTS: &[AbiSignature] = &[
    AbiSignature { module: "libdstructdyn", name: "get_field", params: &[AbiType::Context, AbiType::AnyRef, AbiType::I32], result: Some(AbiType::AnyRef) },
    AbiSignature { module: "libdstructdyn", name: "set_field", params: &[AbiType::Context, AbiType::AnyRef, AbiType::I32, AbiType::AnyRef], result: None },
];

/// All runtime ABI imports the backend must declare, in a fixed order so
/// import indices are deterministic across compiles (spec.md §8: "a
/// compile is deterministic").
pub fn all_imports() -> impl Iterator<Item = &'static AbiSignature> {
    DYNTYPE_IMPORTS.iter().chain(STRUCT_DYN_IMPORTS.iter())
}

/// Interned name of a dynamic property access, used by [`crate::ir`] when
/// lowering `DynGetProp`/`DynSetProp` so the backend can pass the
/// property's name as a boxed string argument to `get_property`/
/// `set_property` (spec.md §4.3 `any` operations).
#[derive(Debug, Clone, Copy)]
pub struct DynPropertyName(pub StringId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_order_is_stable() {
        let names: Vec<&str> = all_imports().map(|s| s.name).collect();
        assert_eq!(names.first().copied(), Some("new_number"));
        assert_eq!(names.last().copied(), Some("set_field"));
    }
}
