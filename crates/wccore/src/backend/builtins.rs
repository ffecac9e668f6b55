//! Built-in import declarations — spec.md §4.4, §6.
//!
//! Unlike `libdyntype`/`libdstructdyn` (declared in [`crate::runtime_abi`]
//! and always present), the `builtIn` namespace is conditional on a single
//! switch: `backend::mod` imports the whole of [`ALL`] unless
//! `CompileOptions::disable_built_in` (spec.md §6) is set, in which case
//! none of it is imported. There is no per-module usage analysis that
//! imports only the subset of built-ins a given module actually calls.
//!
//! The `.wat` snippets under `crates/wccore/builtins/` are the reference
//! bodies the embedding host is expected to provide under these exact
//! (module, name) pairs; `ovidc` declares them as ordinary imports rather
//! than splicing their bytecode into the output module (see `DESIGN.md`'s
//! Open Question resolution on built-in linking).

use crate::runtime_abi::AbiType;

#[derive(Debug, Clone, Copy)]
pub struct BuiltinSignature {
    pub name: &'static str,
    pub params: &'static [AbiType],
    pub result: Option<AbiType>,
}

pub const STRING_LENGTH: BuiltinSignature = BuiltinSignature { name: "String|length", params: &[AbiType::I32, AbiType::I32], result: Some(AbiType::I32) };
pub const STRING_SLICE: BuiltinSignature =
    BuiltinSignature { name: "String|slice", params: &[AbiType::I32, AbiType::I32, AbiType::I32, AbiType::I32], result: Some(AbiType::I32) };
pub const STRING_CONCAT: BuiltinSignature = BuiltinSignature {
    name: "String|concat",
    params: &[AbiType::I32, AbiType::I32, AbiType::I32, AbiType::I32, AbiType::I32],
    result: Some(AbiType::I32),
};
pub const MATH_SQRT: BuiltinSignature = BuiltinSignature { name: "Math|sqrt", params: &[AbiType::F64], result: Some(AbiType::F64) };
pub const MATH_ABS: BuiltinSignature = BuiltinSignature { name: "Math|abs", params: &[AbiType::F64], result: Some(AbiType::F64) };
pub const MATH_CEIL: BuiltinSignature = BuiltinSignature { name: "Math|ceil", params: &[AbiType::F64], result: Some(AbiType::F64) };
pub const MATH_FLOOR: BuiltinSignature = BuiltinSignature { name: "Math|floor", params: &[AbiType::F64], result: Some(AbiType::F64) };
pub const MATH_TRUNC: BuiltinSignature = BuiltinSignature { name: "Math|trunc", params: &[AbiType::F64], result: Some(AbiType::F64) };
pub const ARRAY_IS_ARRAY: BuiltinSignature = BuiltinSignature { name: "Array|isArray", params: &[AbiType::Context, AbiType::AnyRef], result: Some(AbiType::I32) };
pub const CONSOLE_LOG: BuiltinSignature = BuiltinSignature { name: "console.log", params: &[AbiType::I32, AbiType::I32], result: None };

pub const ALL: &[BuiltinSignature] =
    &[STRING_LENGTH, STRING_SLICE, STRING_CONCAT, MATH_SQRT, MATH_ABS, MATH_CEIL, MATH_FLOOR, MATH_TRUNC, ARRAY_IS_ARRAY, CONSOLE_LOG];

pub fn find(name: &str) -> Option<BuiltinSignature> {
    ALL.iter().copied().find(|sig| sig.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STRING_WAT: &str = include_str!("../../builtins/string.wat");
    const MATH_WAT: &str = include_str!("../../builtins/math.wat");
    const ARRAY_WAT: &str = include_str!("../../builtins/array.wat");
    const CONSOLE_WAT: &str = include_str!("../../builtins/console.wat");

    #[test]
    fn every_snippet_parses() {
        for snippet in [STRING_WAT, MATH_WAT, ARRAY_WAT, CONSOLE_WAT] {
            wat::parse_str(snippet).expect("built-in snippet must be valid WAT");
        }
    }

    #[test]
    fn every_declared_signature_is_findable() {
        assert_eq!(find("Math|sqrt").unwrap().params.len(), 1);
        assert!(find("nonexistent").is_none());
    }
}
