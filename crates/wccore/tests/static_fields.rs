//! spec.md §8 end-to-end scenario 1: static class fields, one referencing
//! another, read from a free function.
//!
//! `class A { static c = 11; static readonly d = 12 + A.c }`
//! `function f(){ return A.d + A.c }`

mod common;

use common::*;
use wccore::ast::Item;
use wccore::{CompileOptions, compile};

#[test]
fn static_fields_compile_and_validate() {
    let class_a = class_decl("A", None, vec![], vec![static_field("c", false, num(11.0)), static_field("d", true, add(num(12.0), member(ident("A"), "c")))]);

    let f = function_decl("f", vec![], None, block(vec![ret(Some(add(member(ident("A"), "d"), member(ident("A"), "c"))))]));

    let m = module("static_fields.ovid", vec![Item::Class(class_a), Item::Function(f)]);

    let compiled = compile(&[m], &CompileOptions::default()).expect("module with only static fields should compile");
    assert_validates(compiled.binary());
    assert!(!compiled.binary().is_empty());

    let text = compiled.text().expect("compiled module should render to WAT");
    assert!(text.contains("~start"), "the synthesized global-initializer function should be exported as `~start`");
}
