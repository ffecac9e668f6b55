//! `CompileOptions` knobs (spec.md §6) that this implementation enforces.

mod common;

use common::*;
use wccore::ast::Item;
use wccore::diagnostics::Diagnostic;
use wccore::{CompileOptions, compile};

fn trivial_module() -> wccore::ast::Module {
    let f = function_decl("f", vec![], None, block(vec![ret(Some(num(1.0)))]));
    module("options.ovid", vec![Item::Function(f)])
}

#[test]
fn disable_interface_rejects_interface_declarations() {
    let iface = interface_decl("I", vec![interface_member("x", wccore::ast::MemberKind::Field, number_ty())]);
    let m = module("disable_interface.ovid", vec![Item::Interface(iface)]);

    let options = CompileOptions { disable_interface: true, ..CompileOptions::default() };
    let errors = compile(&[m], &options).expect_err("an interface declaration must be rejected once interfaces are disabled");
    assert!(errors.iter().any(|d| matches!(d, Diagnostic::UnsupportedLowering { .. })));
}

#[test]
fn disable_built_in_drops_the_builtin_import_namespace() {
    let with_builtins = compile(&[trivial_module()], &CompileOptions::default()).expect("trivial module should compile");
    let without_builtins = compile(&[trivial_module()], &CompileOptions { disable_built_in: true, ..CompileOptions::default() })
        .expect("trivial module should compile with built-ins disabled");

    let with_text = with_builtins.text().expect("should render to WAT");
    let without_text = without_builtins.text().expect("should render to WAT");

    assert!(with_text.contains("builtIn"), "built-ins enabled by default should import the `builtIn` namespace");
    assert!(!without_text.contains("builtIn"), "`--disable-built-in` must drop every `builtIn` import");
    assert_validates(with_builtins.binary());
    assert_validates(without_builtins.binary());
}
