#![doc = include_str!("../../../README.md")]

pub mod ast;
pub mod backend;
pub mod diagnostics;
pub mod ir;
pub mod mangle;
pub mod runtime_abi;
mod scope;
mod session;
pub mod types;

pub use scope::{ScopeId, ScopeNode, ScopeTag, ScopeTree, SymbolIndex, build_scopes};
pub use session::{CompileOptions, CompiledModule, compile};
