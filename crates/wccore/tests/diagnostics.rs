//! spec.md §7 error taxonomy: a representative user error per variant
//! that this implementation actually raises. `compile` must reject each
//! of these inputs and report the matching diagnostic rather than panic
//! or silently accept them.

mod common;

use common::*;
use wccore::ast::Item;
use wccore::diagnostics::Diagnostic;
use wccore::{CompileOptions, compile};

#[test]
fn duplicate_top_level_function_is_rejected() {
    let f1 = function_decl("f", vec![], None, block(vec![ret(Some(num(1.0)))]));
    let f2 = function_decl("f", vec![], None, block(vec![ret(Some(num(2.0)))]));
    let m = module("dup.ovid", vec![Item::Function(f1), Item::Function(f2)]);

    let errors = compile(&[m], &CompileOptions::default()).expect_err("redeclaring `f` in the same scope must be rejected");
    assert!(errors.iter().any(|d| matches!(d, Diagnostic::DuplicateIdentifier { name, .. } if name == "f")));
}

#[test]
fn unresolved_identifier_is_rejected() {
    let f = function_decl("f", vec![], None, block(vec![ret(Some(ident("doesNotExist")))]));
    let m = module("unresolved.ovid", vec![Item::Function(f)]);

    let errors = compile(&[m], &CompileOptions::default()).expect_err("referencing an undeclared identifier must be rejected");
    assert!(errors.iter().any(|d| matches!(d, Diagnostic::UnresolvedIdentifier { name, .. } if name == "doesNotExist")));
}

#[test]
fn reassigning_a_const_binding_is_rejected() {
    let f = function_decl(
        "f",
        vec![],
        None,
        block(vec![const_stmt("x", None, num(1.0)), assign(ident("x"), num(2.0)), ret(Some(ident("x")))]),
    );
    let m = module("const_reassign.ovid", vec![Item::Function(f)]);

    let errors = compile(&[m], &CompileOptions::default()).expect_err("assigning to a `const` binding must be rejected");
    assert!(errors.iter().any(|d| matches!(d, Diagnostic::ConstReassigned { name, .. } if name == "x")));
}

#[test]
fn unresolved_parent_class_is_rejected() {
    let b = class_decl("B", Some("DoesNotExist"), vec![], vec![]);
    let m = module("unresolved_parent.ovid", vec![Item::Class(b)]);

    let errors = compile(&[m], &CompileOptions::default()).expect_err("extending an unknown class must be rejected");
    assert!(errors.iter().any(|d| matches!(d, Diagnostic::UnresolvedIdentifier { name, .. } if name == "DoesNotExist")));
}

#[test]
fn any_typed_member_is_rejected_when_any_is_disabled() {
    let a = class_decl("A", None, vec![], vec![field("untyped", num(1.0))]);
    let m = module("disable_any.ovid", vec![Item::Class(a)]);

    let options = CompileOptions { disable_any: true, ..CompileOptions::default() };
    let errors = compile(&[m], &options).expect_err("a member with no declared type must be rejected once `any` is disabled");
    assert!(errors.iter().any(|d| matches!(d, Diagnostic::TypeMismatch { .. })));
}
