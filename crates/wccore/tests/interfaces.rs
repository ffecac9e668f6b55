//! spec.md §8 end-to-end scenario 3: a class structurally satisfies an
//! interface despite declaring its fields in a different order.
//!
//! `interface I { x:number; y:boolean }` and
//! `class Foo { y=false; z='s'; x=1 }`; `const i: I = new Foo(); i.x`
//! returns `1`.

mod common;

use common::*;
use wccore::ast::{Item, MemberKind};
use wccore::{CompileOptions, compile};

#[test]
fn structural_interface_view_compiles_and_validates() {
    let iface = interface_decl("I", vec![interface_member("x", MemberKind::Field, number_ty()), interface_member("y", MemberKind::Field, boolean_ty())]);

    let foo = class_decl("Foo", None, vec!["I"], vec![field("y", boolean(false)), field("z", string("s")), field("x", num(1.0))]);

    let run = function_decl(
        "run",
        vec![],
        None,
        block(vec![const_stmt("i", Some(named_ty("I")), new_instance("Foo", vec![])), ret(Some(member(ident("i"), "x")))]),
    );

    let m = module("interfaces.ovid", vec![Item::Interface(iface), Item::Class(foo), Item::Function(run)]);

    let compiled = compile(&[m], &CompileOptions::default()).expect("a class implementing an interface out of field order should still compile");
    assert_validates(compiled.binary());
}
