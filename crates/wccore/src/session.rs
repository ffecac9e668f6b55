//! Compiler entry point and knobs — spec.md §6.
//!
//! [`compile`] wires the four core passes in the order spec.md §5
//! guarantees: scope & symbol building, type resolution, IR lowering, then
//! backend emission. Each pass returns `Result<_, Vec<Diagnostic>>` and the
//! session stops at the first pass that reports any user error — "after
//! pass 3 detects any error, passes 4 and 5 do not run" (spec.md §5) — so a
//! caller never observes a partially lowered IR or a partially emitted
//! module.

use crate::ast::Module;
use crate::backend;
use crate::diagnostics::Diagnostic;
use crate::ir;
use crate::scope;
use crate::types;

/// Knobs a caller can use to narrow what the compiler accepts, per
/// spec.md §6.
#[derive(Debug, Clone, Copy)]
pub struct CompileOptions {
    /// Marks the input as the built-in library itself, which is allowed to
    /// reference runtime ABI intrinsics ordinary source cannot name.
    pub is_built_in: bool,
    /// Rejects any member or binding whose resolved type is `any`.
    pub disable_any: bool,
    /// Rejects `interface` declarations entirely.
    pub disable_interface: bool,
    /// Skips linking the built-in snippets into the emitted module.
    pub disable_built_in: bool,
    /// Backend optimization level, forwarded to `wasm-encoder` emission
    /// choices (e.g. whether unreachable branches are pruned).
    pub opt: u8,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            is_built_in: false,
            disable_any: false,
            disable_interface: false,
            disable_built_in: false,
            opt: 0,
        }
    }
}

/// The result of a successful compilation: an in-memory WebAssembly
/// module plus a lazily-rendered WAT projection for tooling (spec.md §6,
/// `CompiledModule`).
pub struct CompiledModule {
    binary: Vec<u8>,
}

impl CompiledModule {
    pub fn binary(&self) -> &[u8] {
        &self.binary
    }

    /// Renders the binary back to WAT via `wasmprinter`, mirroring how the
    /// CLI's `--emit=wat` flag and the playground front end (out of scope
    /// here) both want to display a compiled module without re-running the
    /// backend.
    pub fn text(&self) -> Result<String, wasmprinter::Error> {
        wasmprinter::print_bytes(&self.binary)
    }
}

/// Compiles a flat set of input files into one WebAssembly module
/// (spec.md §1, §5, §6).
pub fn compile(modules: &[Module], options: &CompileOptions) -> Result<CompiledModule, Vec<Diagnostic>> {
    log::info!("compiling {} module(s) (opt={})", modules.len(), options.opt);

    let scopes = scope::build_scopes(modules)?;
    let tables = types::resolve_types(modules, &scopes, options)?;
    let module_ir = ir::lower(modules, &scopes, &tables, options)?;
    let binary = backend::emit(&module_ir, &tables, options)?;

    log::info!("emitted module: {} byte(s)", binary.len());
    Ok(CompiledModule { binary })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_enable_every_language_feature() {
        let options = CompileOptions::default();
        assert!(!options.is_built_in);
        assert!(!options.disable_any);
        assert!(!options.disable_interface);
        assert!(!options.disable_built_in);
    }
}
