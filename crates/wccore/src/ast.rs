//! The surface-syntax contract the front end hands the core.
//!
//! Nothing in this module parses source text. A front end (lexer, parser,
//! and whatever incremental type-annotation machinery produces an `any`
//! fallback for unresolved expressions) is an external collaborator per
//! the compiler's scope — this module only defines the shape of the
//! "parsed, type-annotated syntax forest" that external collaborator must
//! produce. `wccore::scope`, `wccore::types` and `wccore::ir` consume
//! these types read-only and never mutate them.
//!
//! Every node derives `serde::{Serialize, Deserialize}`: the front end and
//! `wccore-cli` are separate processes, so a parsed module crosses that
//! boundary as JSON rather than as an in-process value (spec.md §6 CLI
//! contract).

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::diagnostics::SourcePos;

/// One source file's worth of top-level items, as handed to the compiler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub file: String,
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Item {
    Function(FunctionDecl),
    Class(ClassDecl),
    Interface(InterfaceDecl),
    Enum(EnumDecl),
    Namespace(NamespaceDecl),
    Variable(VariableDecl),
    ExportAlias { from: String, to: String, pos: SourcePos },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceDecl {
    pub name: String,
    pub items: Vec<Item>,
    pub pos: SourcePos,
}

/// Binding kind for a variable declaration, per spec.md §3 (Symbol variants).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindingKind {
    /// `const` — immutable after initialization.
    Immutable,
    /// `let` at block scope — mutable, block-scoped.
    BlockMutable,
    /// `var`-style hoisted declaration — mutable, function-scoped.
    HoistedMutable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableDecl {
    pub name: String,
    pub binding: BindingKind,
    pub declared_type: Option<TypeExpr>,
    pub init: Option<Expr>,
    pub pos: SourcePos,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub declared_type: TypeExpr,
    pub optional: bool,
    pub default: Option<Expr>,
    pub rest: bool,
    pub pos: SourcePos,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    pub type_params: Vec<String>,
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    pub body: Block,
    pub pos: SourcePos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberKind {
    Field,
    Method,
    Getter,
    Setter,
    StaticField,
    StaticMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberDecl {
    pub name: String,
    pub kind: MemberKind,
    pub declared_type: Option<TypeExpr>,
    pub optional: bool,
    pub readonly: bool,
    pub params: Vec<Param>,
    pub body: Option<Block>,
    pub init: Option<Expr>,
    pub pos: SourcePos,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassDecl {
    pub name: String,
    pub type_params: Vec<String>,
    pub extends: Option<String>,
    pub implements: Vec<String>,
    pub members: Vec<MemberDecl>,
    pub pos: SourcePos,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceMember {
    pub name: String,
    pub kind: MemberKind,
    pub ty: TypeExpr,
    pub optional: bool,
    pub pos: SourcePos,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceDecl {
    pub name: String,
    pub members: Vec<InterfaceMember>,
    pub pos: SourcePos,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumDecl {
    pub name: String,
    pub entries: Vec<String>,
    pub pos: SourcePos,
}

/// A surface type annotation, as written by the programmer (or inferred by
/// the external front end and attached here). Distinct from
/// [`crate::types::Type`], which is the resolved, canonical lattice value
/// this annotation resolves to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TypeExpr {
    Named(String),
    Array(Box<TypeExpr>),
    Function {
        params: Vec<TypeExpr>,
        result: Box<TypeExpr>,
        this_param: Option<Box<TypeExpr>>,
    },
    Union(Vec<TypeExpr>),
    Any,
    Void,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Stmt {
    Expr(Expr),
    Variable(VariableDecl),
    Function(FunctionDecl),
    Return(Option<Expr>, SourcePos),
    If {
        cond: Expr,
        then_branch: Block,
        else_branch: Option<Block>,
        pos: SourcePos,
    },
    While {
        cond: Expr,
        body: Block,
        pos: SourcePos,
    },
    Block(Block),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    NotEq,
    Lt,
    Gt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expr {
    NumberLit(f64, SourcePos),
    StringLit(String, SourcePos),
    BoolLit(bool, SourcePos),
    NullLit(SourcePos),
    UndefinedLit(SourcePos),
    Identifier(String, SourcePos),
    ArrayLit(Vec<Expr>, SourcePos),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
        pos: SourcePos,
    },
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
        pos: SourcePos,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        pos: SourcePos,
    },
    New {
        class_name: String,
        args: Vec<Expr>,
        pos: SourcePos,
    },
    Member {
        object: Box<Expr>,
        name: String,
        pos: SourcePos,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        pos: SourcePos,
    },
    This(SourcePos),
    Super(SourcePos),
    SuperCall {
        args: Vec<Expr>,
        pos: SourcePos,
    },
    SuperMethodCall {
        method: String,
        args: Vec<Expr>,
        pos: SourcePos,
    },
    FunctionExpr(Box<FunctionDecl>),
    /// An explicit cast/annotation to `any`, the only way static code may
    /// widen into the dynamic domain (spec.md §4.2, `any` boundary).
    ToAny(Box<Expr>, SourcePos),
    /// An explicit narrowing cast from `any` back to a static type.
    FromAny {
        value: Box<Expr>,
        target: TypeExpr,
        pos: SourcePos,
    },
    /// Rest-parameter reference; desugared by `ir` into an array-construction
    /// prologue (spec.md §4.3).
    RestParam(String, SourcePos),
    /// Spread of extra positional args, counted against a function's rest
    /// parameter slot at the call site.
    CallArgs(SmallVec<[Expr; 4]>),
}

impl Expr {
    pub fn pos(&self) -> SourcePos {
        match self {
            Expr::NumberLit(_, p)
            | Expr::StringLit(_, p)
            | Expr::BoolLit(_, p)
            | Expr::NullLit(p)
            | Expr::UndefinedLit(p)
            | Expr::Identifier(_, p)
            | Expr::ArrayLit(_, p)
            | Expr::Binary { pos: p, .. }
            | Expr::Assign { pos: p, .. }
            | Expr::Call { pos: p, .. }
            | Expr::New { pos: p, .. }
            | Expr::Member { pos: p, .. }
            | Expr::Index { pos: p, .. }
            | Expr::This(p)
            | Expr::Super(p)
            | Expr::SuperCall { pos: p, .. }
            | Expr::SuperMethodCall { pos: p, .. }
            | Expr::ToAny(_, p)
            | Expr::FromAny { pos: p, .. }
            | Expr::RestParam(_, p) => *p,
            Expr::FunctionExpr(f) => f.pos,
            Expr::CallArgs(args) => args.first().map(Expr::pos).unwrap_or_default(),
        }
    }
}
