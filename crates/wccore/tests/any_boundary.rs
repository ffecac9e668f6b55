//! spec.md §8 end-to-end scenario 5 and the `any`-boundary boundary
//! behaviors.
//!
//! `const fn: any = (a:number)=>a+100; fn(10)` returns `110` via the
//! dynamic boundary — and rest parameters with zero extra arguments
//! produce an empty array, not `undefined`.

mod common;

use common::*;
use wccore::ast::{Expr, FunctionDecl, Item, TypeExpr};
use wccore::{CompileOptions, compile};

#[test]
fn any_typed_closure_call_compiles_and_validates() {
    let add_hundred = FunctionDecl {
        name: String::new(),
        type_params: Vec::new(),
        params: vec![param("a", number_ty())],
        return_type: Some(number_ty()),
        body: block(vec![ret(Some(add(ident("a"), num(100.0))))]),
        pos: pos(),
    };

    let boxed = Expr::ToAny(Box::new(Expr::FunctionExpr(Box::new(add_hundred))), pos());

    let run = function_decl(
        "run",
        vec![],
        None,
        block(vec![const_stmt("dynFn", Some(TypeExpr::Any), boxed), ret(Some(call(ident("dynFn"), vec![num(10.0)])))]),
    );

    let m = module("any_boundary.ovid", vec![Item::Function(run)]);

    let compiled = compile(&[m], &CompileOptions::default()).expect("a closure boxed to `any` and called back should compile");
    assert_validates(compiled.binary());
}

#[test]
fn rest_parameter_with_no_extra_arguments_compiles_and_validates() {
    let collect = function_decl("collect", vec![rest_param("items", number_ty())], None, block(vec![ret(Some(Expr::RestParam("items".to_owned(), pos())))]));

    let run = function_decl("run", vec![], None, block(vec![ret(Some(call(ident("collect"), vec![])))]));

    let m = module("rest_params.ovid", vec![Item::Function(collect), Item::Function(run)]);

    let compiled = compile(&[m], &CompileOptions::default()).expect("calling a rest-parameter function with zero extra arguments should compile");
    assert_validates(compiled.binary());
}
