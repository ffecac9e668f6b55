//! spec.md §8 quantified invariant: "a compile is deterministic: the same
//! input produces byte-identical output."

mod common;

use common::*;
use wccore::ast::Item;
use wccore::{CompileOptions, compile};

fn sample_module() -> wccore::ast::Module {
    let class_a = class_decl("A", None, vec![], vec![static_field("c", false, num(11.0)), static_field("d", true, add(num(12.0), member(ident("A"), "c")))]);
    let class_b = class_decl("B", Some("A"), vec![], vec![method("log", vec![], block(vec![ret(Some(num(1.0)))]))]);
    let f = function_decl("f", vec![], None, block(vec![ret(Some(add(member(ident("A"), "d"), member(ident("A"), "c"))))]));
    module("determinism.ovid", vec![Item::Class(class_a), Item::Class(class_b), Item::Function(f)])
}

#[test]
fn identical_input_produces_byte_identical_output() {
    let options = CompileOptions::default();
    let first = compile(&[sample_module()], &options).expect("module should compile");
    let second = compile(&[sample_module()], &options).expect("module should compile");
    assert_eq!(first.binary(), second.binary());
}
