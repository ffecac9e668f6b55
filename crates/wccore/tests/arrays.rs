//! spec.md §8 end-to-end scenario 6: array literal length and indexing.
//!
//! `let arr = [9,6]; arr.length` returns `2`; `arr[0]` returns `9`.

mod common;

use common::*;
use wccore::ast::{Expr, Item};
use wccore::{CompileOptions, compile};

#[test]
fn array_length_and_index_compile_and_validate() {
    let arr_lit = Expr::ArrayLit(vec![num(9.0), num(6.0)], pos());

    let run = function_decl(
        "run",
        vec![],
        None,
        block(vec![let_stmt("arr", None, arr_lit), ret(Some(add(member(ident("arr"), "length"), index(ident("arr"), num(0.0)))))]),
    );

    let m = module("arrays.ovid", vec![Item::Function(run)]);

    let compiled = compile(&[m], &CompileOptions::default()).expect("array literal construction, `.length`, and indexing should compile");
    assert_validates(compiled.binary());
}
