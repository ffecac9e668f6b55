//! Shared AST-building and validation helpers for the integration suite.
//!
//! There is no lexer/parser in this repository (spec.md puts front-end
//! parsing out of scope), so every test builds its input `ast::Module`
//! by hand instead of compiling source text.

use wccore::ast::{BinOp, BindingKind, Block, ClassDecl, EnumDecl, Expr, FunctionDecl, InterfaceDecl, InterfaceMember, Item, MemberDecl, MemberKind, Module, NamespaceDecl, Param, Stmt, TypeExpr, VariableDecl};
use wccore::diagnostics::SourcePos;

pub fn pos() -> SourcePos {
    SourcePos::default()
}

pub fn module(file: &str, items: Vec<Item>) -> Module {
    Module { file: file.to_owned(), items }
}

pub fn num(n: f64) -> Expr {
    Expr::NumberLit(n, pos())
}

pub fn string(s: &str) -> Expr {
    Expr::StringLit(s.to_owned(), pos())
}

pub fn boolean(b: bool) -> Expr {
    Expr::BoolLit(b, pos())
}

pub fn ident(name: &str) -> Expr {
    Expr::Identifier(name.to_owned(), pos())
}

pub fn add(left: Expr, right: Expr) -> Expr {
    Expr::Binary { op: BinOp::Add, left: Box::new(left), right: Box::new(right), pos: pos() }
}

pub fn member(object: Expr, name: &str) -> Expr {
    Expr::Member { object: Box::new(object), name: name.to_owned(), pos: pos() }
}

pub fn index(object: Expr, idx: Expr) -> Expr {
    Expr::Index { object: Box::new(object), index: Box::new(idx), pos: pos() }
}

pub fn call(callee: Expr, args: Vec<Expr>) -> Expr {
    Expr::Call { callee: Box::new(callee), args, pos: pos() }
}

pub fn new_instance(class_name: &str, args: Vec<Expr>) -> Expr {
    Expr::New { class_name: class_name.to_owned(), args, pos: pos() }
}

pub fn ret(value: Option<Expr>) -> Stmt {
    Stmt::Return(value, pos())
}

pub fn let_stmt(name: &str, declared_type: Option<TypeExpr>, init: Expr) -> Stmt {
    Stmt::Variable(VariableDecl { name: name.to_owned(), binding: BindingKind::BlockMutable, declared_type, init: Some(init), pos: pos() })
}

pub fn const_stmt(name: &str, declared_type: Option<TypeExpr>, init: Expr) -> Stmt {
    Stmt::Variable(VariableDecl { name: name.to_owned(), binding: BindingKind::Immutable, declared_type, init: Some(init), pos: pos() })
}

pub fn assign(target: Expr, value: Expr) -> Stmt {
    Stmt::Expr(Expr::Assign { target: Box::new(target), value: Box::new(value), pos: pos() })
}

pub fn block(stmts: Vec<Stmt>) -> Block {
    Block { stmts }
}

pub fn param(name: &str, ty: TypeExpr) -> Param {
    Param { name: name.to_owned(), declared_type: ty, optional: false, default: None, rest: false, pos: pos() }
}

pub fn rest_param(name: &str, element_ty: TypeExpr) -> Param {
    Param { name: name.to_owned(), declared_type: TypeExpr::Array(Box::new(element_ty)), optional: false, default: None, rest: true, pos: pos() }
}

pub fn function_decl(name: &str, params: Vec<Param>, return_type: Option<TypeExpr>, body: Block) -> FunctionDecl {
    FunctionDecl { name: name.to_owned(), type_params: Vec::new(), params, return_type, body, pos: pos() }
}

pub fn field(name: &str, init: Expr) -> MemberDecl {
    MemberDecl { name: name.to_owned(), kind: MemberKind::Field, declared_type: None, optional: false, readonly: false, params: Vec::new(), body: None, init: Some(init), pos: pos() }
}

pub fn static_field(name: &str, readonly: bool, init: Expr) -> MemberDecl {
    MemberDecl {
        name: name.to_owned(),
        kind: MemberKind::StaticField,
        declared_type: None,
        optional: false,
        readonly,
        params: Vec::new(),
        body: None,
        init: Some(init),
        pos: pos(),
    }
}

pub fn method(name: &str, params: Vec<Param>, body: Block) -> MemberDecl {
    MemberDecl { name: name.to_owned(), kind: MemberKind::Method, declared_type: None, optional: false, readonly: false, params, body: Some(body), init: None, pos: pos() }
}

pub fn class_decl(name: &str, extends: Option<&str>, implements: Vec<&str>, members: Vec<MemberDecl>) -> ClassDecl {
    ClassDecl {
        name: name.to_owned(),
        type_params: Vec::new(),
        extends: extends.map(str::to_owned),
        implements: implements.into_iter().map(str::to_owned).collect(),
        members,
        pos: pos(),
    }
}

pub fn interface_member(name: &str, kind: MemberKind, ty: TypeExpr) -> InterfaceMember {
    InterfaceMember { name: name.to_owned(), kind, ty, optional: false, pos: pos() }
}

pub fn interface_decl(name: &str, members: Vec<InterfaceMember>) -> InterfaceDecl {
    InterfaceDecl { name: name.to_owned(), members, pos: pos() }
}

#[allow(dead_code)]
pub fn enum_decl(name: &str, entries: Vec<&str>) -> EnumDecl {
    EnumDecl { name: name.to_owned(), entries: entries.into_iter().map(str::to_owned).collect() }
}

#[allow(dead_code)]
pub fn namespace_decl(name: &str, items: Vec<Item>) -> NamespaceDecl {
    NamespaceDecl { name: name.to_owned(), items, pos: pos() }
}

pub fn number_ty() -> TypeExpr {
    TypeExpr::Named("number".to_owned())
}

pub fn boolean_ty() -> TypeExpr {
    TypeExpr::Named("boolean".to_owned())
}

pub fn named_ty(name: &str) -> TypeExpr {
    TypeExpr::Named(name.to_owned())
}

/// Asserts `bytes` is a valid module under the reference-types, GC, and
/// typed-function-references proposals (spec.md §8's "emitted modules
/// validate" invariant).
pub fn assert_validates(bytes: &[u8]) {
    let mut validator = wasmparser::Validator::new_with_features(wasmparser::WasmFeatures::all());
    validator.validate_all(bytes).expect("emitted module must validate under the enabled WebAssembly proposals");
}
