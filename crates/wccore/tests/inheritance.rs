//! spec.md §8 end-to-end scenario 4: vtable dispatch picks up the override,
//! and an explicit `super` call bypasses it.
//!
//! `class B extends A; b.log()` dispatches to `B.log`; `super.log()` inside
//! `B.log` dispatches to `A.log` bypassing the vtable.

mod common;

use common::*;
use wccore::ast::{Expr, Item};
use wccore::{CompileOptions, compile};

#[test]
fn vtable_override_and_super_call_compile_and_validate() {
    let class_a = class_decl("A", None, vec![], vec![method("log", vec![], block(vec![ret(Some(num(1.0)))]))]);

    let super_call = Expr::SuperMethodCall { method: "log".to_owned(), args: Vec::new(), pos: pos() };
    let class_b = class_decl("B", Some("A"), vec![], vec![method("log", vec![], block(vec![ret(Some(add(super_call, num(1.0))))]))]);

    let run = function_decl(
        "run",
        vec![],
        None,
        block(vec![let_stmt("b", None, new_instance("B", vec![])), ret(Some(call(member(ident("b"), "log"), vec![])))]),
    );

    let m = module("inheritance.ovid", vec![Item::Class(class_a), Item::Class(class_b), Item::Function(run)]);

    let compiled = compile(&[m], &CompileOptions::default()).expect("an overriding subclass calling super should compile");
    assert_validates(compiled.binary());
}
