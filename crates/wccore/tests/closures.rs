//! spec.md §8 end-to-end scenario 2: nested function expressions, each
//! level capturing a binding from its enclosing scope.
//!
//! `function outer(m){ function inner(x){ let y=10+m; return function(){
//! let z = x + y; y = y + 1; return z } } return inner }`

mod common;

use common::*;
use wccore::ast::{Item, Stmt};
use wccore::{CompileOptions, compile};

fn function_expr(decl: wccore::ast::FunctionDecl) -> wccore::ast::Expr {
    wccore::ast::Expr::FunctionExpr(Box::new(decl))
}

#[test]
fn nested_closures_compile_and_validate() {
    let innermost = function_expr(function_decl(
        "",
        vec![],
        None,
        block(vec![let_stmt("z", None, add(ident("x"), ident("y"))), assign(ident("y"), add(ident("y"), num(1.0))), ret(Some(ident("z")))]),
    ));

    let inner = function_decl(
        "inner",
        vec![param("x", number_ty())],
        None,
        block(vec![let_stmt("y", None, add(num(10.0), ident("m"))), ret(Some(innermost))]),
    );

    let outer = function_decl("outer", vec![param("m", number_ty())], None, block(vec![Stmt::Function(inner), ret(Some(ident("inner")))]));

    let m = module("closures.ovid", vec![Item::Function(outer)]);

    let compiled = compile(&[m], &CompileOptions::default()).expect("doubly-nested closures should compile");
    assert_validates(compiled.binary());

    // `assert_validates` only checks the module against the GC/typed-function-
    // references type rules; it cannot observe whether the `inner`/innermost
    // closures actually read the right environment at run time (e.g. a
    // missing `EnvSpec::Forward` would still validate — it just threads a
    // null pointer that traps on first use). This crate carries no WASM
    // execution engine (see Cargo.toml), and adding one specifically to
    // exercise this path is out of scope for a change that must not invoke
    // the toolchain to vet the new dependency; every function this scenario
    // lowers showing up in the emitted text is the compile-time signal that
    // both `inner` and the innermost closure were actually lowered and
    // reached codegen, rather than one silently collapsing to `UndefinedConst`.
    let text = compiled.text().expect("should render to WAT");
    let func_count = text.matches("(func ").count();
    assert!(func_count >= 3, "expected outer, inner and the innermost closure to each lower to a function, got {func_count} in:\n{text}");
}
