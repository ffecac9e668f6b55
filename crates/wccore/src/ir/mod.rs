//! IR lowering — spec.md §4.3.
//!
//! Turns the typed syntax forest into the explicit [`node::IrModule`]: every
//! implicit operation of the surface language (closure environments, vtable
//! and interface dispatch, the `any` boundary, super calls, static-field
//! globals) becomes a concrete, type-tagged IR node here, so [`crate::backend`]
//! never has to reason about surface syntax again.
//!
//! Lowering runs in three phases that mirror spec.md §5's ordering
//! guarantee (pass 4 is strictly sequential and matches source order):
//!
//! 1. **Function enumeration** — every function, method, and constructor
//!    (synthesizing a default constructor where a class declares none) is
//!    assigned a stable [`node::FunctionId`] in source order, so forward
//!    references (recursion, mutual recursion, a method calling a sibling
//!    declared later) resolve without a second pass.
//! 2. **Capture analysis** — for every function, every identifier it reads
//!    or writes that resolves (via [`crate::scope::ScopeTree`]) to an
//!    ancestor function's own scope is a capture; the ancestor is marked
//!    `needs_env` and the captured symbol gets a slot in that ancestor's
//!    [`node::EnvLayout`].
//! 3. **Body lowering** — statements and expressions become [`node::IrStmt`]/
//!    [`node::IrExpr`] trees, consulting the tables built in phases 1–2 to
//!    decide whether an identifier is a local, a parameter, a captured
//!    variable, or a module global.

pub mod node;

use ahash::{AHashMap, AHashSet};
use smallvec::SmallVec;

use crate::ast::{self, BinOp, Block, ClassDecl, EnumDecl, Expr, FunctionDecl, Item, MemberDecl, MemberKind, Module, Param, Stmt};
use crate::diagnostics::{Diagnostic, DiagnosticBag, SourcePos};
use crate::scope::{ScopeId, ScopeTag, ScopeTree, Symbol, SymbolIndex};
use crate::session::CompileOptions;
use crate::types::{ClassId, DispatchTarget, MemberOrigin, Type, TypeTables, is_assignable};

pub use node::{
    CallTarget, EnvInitSource, EnvLayout, EnvSpec, FunctionId, GlobalInit, IrBinOp, IrClass, IrExpr, IrFunction, IrLocal, IrModule, IrStmt,
    StringId, StringPool,
};

/// Stand-in for a stable AST-node id: the front-end contract gives no such
/// thing, so (file, position) is the key, exactly as in [`crate::scope`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PosKey {
    file: String,
    pos: SourcePos,
}

/// What a [`FunctionId`] was lowered from — needed by phase 3 to find the
/// original parameter list and body again without re-walking the AST.
enum FunctionOrigin<'a> {
    Plain(&'a FunctionDecl),
    Method { class: ClassId, decl: &'a MemberDecl },
    /// A constructor; `None` when the class declared no `constructor`
    /// method and one is synthesized to run field initializers in order.
    Constructor { class: ClassId, decl: Option<&'a MemberDecl> },
}

impl<'a> FunctionOrigin<'a> {
    fn params(&self) -> &'a [Param] {
        match self {
            FunctionOrigin::Plain(f) => &f.params,
            FunctionOrigin::Method { decl, .. } | FunctionOrigin::Constructor { decl: Some(decl), .. } => &decl.params,
            FunctionOrigin::Constructor { decl: None, .. } => &[],
        }
    }

    fn body(&self) -> Option<&'a Block> {
        match self {
            FunctionOrigin::Plain(f) => Some(&f.body),
            FunctionOrigin::Method { decl, .. } | FunctionOrigin::Constructor { decl: Some(decl), .. } => decl.body.as_ref(),
            FunctionOrigin::Constructor { decl: None, .. } => None,
        }
    }

    fn name(&self, tables: &TypeTables) -> String {
        match self {
            FunctionOrigin::Plain(f) => f.name.clone(),
            FunctionOrigin::Method { class, decl } => format!("{}_{}", tables.class(*class).name, decl.name),
            FunctionOrigin::Constructor { class, .. } => format!("{}_constructor", tables.class(*class).name),
        }
    }

    fn enclosing_class(&self) -> Option<ClassId> {
        match self {
            FunctionOrigin::Plain(_) => None,
            FunctionOrigin::Method { class, .. } | FunctionOrigin::Constructor { class, .. } => Some(*class),
        }
    }
}

/// Per-function capture bookkeeping, filled during phase 2 and consulted
/// during phase 3.
#[derive(Default)]
struct CaptureInfo {
    /// True iff some descendant function reads or writes a local owned by
    /// this function (spec.md §3, Closure environment).
    needs_env: bool,
    /// Captured symbols in slot order (spec.md §4.3 Closures: field index
    /// `i` of the env record holds the `i`-th captured symbol).
    slots: Vec<SymbolIndex>,
}

struct Lowerer<'a> {
    scopes: &'a ScopeTree,
    tables: &'a TypeTables,
    options: &'a CompileOptions,
    bag: DiagnosticBag,
    file: String,
    strings: StringPool,

    origins: Vec<FunctionOrigin<'a>>,
    function_pos: AHashMap<PosKey, FunctionId>,
    /// (scope, symbol) of a named function declaration -> its FunctionId,
    /// for ordinary call-site and first-class-value lookups.
    function_by_symbol: AHashMap<(ScopeId, SymbolIndex), FunctionId>,
    function_scope_of: AHashMap<FunctionId, ScopeId>,
    constructor_of: AHashMap<ClassId, FunctionId>,
    method_of: AHashMap<(ClassId, String), FunctionId>,

    captures: AHashMap<ScopeId, CaptureInfo>,
    /// Every function scope lying on some capture's read path: it neither
    /// owns the captured slot (that's `captures`/`needs_env`) nor reads it
    /// directly, but a closure created somewhere inside it (at any nesting
    /// depth) reaches outward through its environment pointer, so it must
    /// forward (or, if it also owns captures of its own, allocate) one.
    chain_needed: AHashSet<ScopeId>,

    /// Declared or annotated type of every parameter and `let`/`const`
    /// local, keyed by its (scope, symbol) pair. Consulted by
    /// [`Lowerer::infer_type`] so member access and call lowering on a
    /// plain identifier picks the same struct/interface/dynamic shape a
    /// direct field or `this` access would (spec.md §4.3: field access,
    /// method dispatch, and interface dispatch are all chosen from the
    /// expression's static type, not just its syntactic shape).
    declared_types: AHashMap<(ScopeId, SymbolIndex), Type>,

    global_by_pos: AHashMap<PosKey, u32>,
    global_by_static: AHashMap<(ClassId, String), u32>,
    globals: Vec<GlobalInit>,

    ast_classes: AHashMap<String, &'a ClassDecl>,
}

/// Lowers a resolved, type-checked syntax forest into an [`IrModule`]
/// (spec.md §1 pass 4).
pub fn lower(modules: &[Module], scopes: &ScopeTree, tables: &TypeTables, options: &CompileOptions) -> Result<IrModule, Vec<Diagnostic>> {
    log::debug!("ir pass: lowering {} module(s)", modules.len());
    let mut lowerer = Lowerer {
        scopes,
        tables,
        options,
        bag: DiagnosticBag::new(),
        file: String::new(),
        strings: StringPool::default(),
        origins: Vec::new(),
        function_pos: AHashMap::new(),
        function_by_symbol: AHashMap::new(),
        function_scope_of: AHashMap::new(),
        constructor_of: AHashMap::new(),
        method_of: AHashMap::new(),
        captures: AHashMap::new(),
        chain_needed: AHashSet::new(),
        global_by_pos: AHashMap::new(),
        global_by_static: AHashMap::new(),
        globals: Vec::new(),
        ast_classes: AHashMap::new(),
    };

    for module in modules {
        lowerer.index_classes(&module.items);
    }
    for module in modules {
        lowerer.file = module.file.clone();
        lowerer.enumerate_functions(&module.items);
    }
    for module in modules {
        lowerer.file = module.file.clone();
        lowerer.collect_globals(&module.items);
    }
    for module in modules {
        lowerer.file = module.file.clone();
        lowerer.collect_declared_types(&module.items);
    }
    for module in modules {
        lowerer.file = module.file.clone();
        lowerer.analyze_captures_in_items(&module.items);
    }

    let mut functions: Vec<Option<IrFunction>> = (0..lowerer.origins.len()).map(|_| None).collect();
    for id in 0..lowerer.origins.len() {
        let function_id = FunctionId(id as u32);
        let lowered = lowerer.lower_function(function_id);
        functions[id] = Some(lowered);
    }
    lowerer.lower_global_initializers(modules);

    let classes = lowerer.tables.classes.iter().enumerate().map(|(idx, info)| {
        let class_id = ClassId(idx as u32);
        let vtable_functions = info
            .vtable
            .iter()
            .map(|slot| lowerer.method_of.get(&(class_id, slot.name.clone())).copied())
            .collect();
        IrClass { class: class_id, constructor: lowerer.constructor_of.get(&class_id).copied(), vtable_functions }
    });

    let module_ir = IrModule {
        functions: functions.into_iter().map(|f| f.expect("every enumerated function is lowered")).collect(),
        classes: classes.collect(),
        globals: lowerer.globals,
        strings: lowerer.strings,
        start_function: None,
    };

    log::debug!(
        "ir pass: {} function(s), {} global(s), {} string(s)",
        module_ir.functions.len(),
        module_ir.globals.len(),
        module_ir.strings.iter().count()
    );
    lowerer.bag.into_result(module_ir)
}

impl<'a> Lowerer<'a> {
    fn index_classes(&mut self, items: &'a [Item]) {
        for item in items {
            match item {
                Item::Class(c) => {
                    self.ast_classes.insert(c.name.clone(), c);
                }
                Item::Namespace(ns) => self.index_classes(&ns.items),
                _ => {}
            }
        }
    }

    // ---- Phase 1: function enumeration -----------------------------------

    fn register_function(&mut self, origin: FunctionOrigin<'a>, pos: Option<SourcePos>) -> FunctionId {
        let id = FunctionId(self.origins.len() as u32);
        if let Some(pos) = pos {
            self.function_pos.insert(PosKey { file: self.file.clone(), pos }, id);
            if let Some(scope) = self.scopes.function_scope_at(&self.file, pos) {
                self.function_scope_of.insert(id, scope);
            }
            if let Some(resolution) = self.scopes.declaration_at(&self.file, pos) {
                self.function_by_symbol.insert((resolution.scope, resolution.symbol), id);
            }
        }
        self.origins.push(origin);
        id
    }

    fn enumerate_functions(&mut self, items: &'a [Item]) {
        for item in items {
            match item {
                Item::Function(f) => {
                    self.register_function(FunctionOrigin::Plain(f), Some(f.pos));
                    self.enumerate_in_block(&f.body);
                }
                Item::Class(c) => self.enumerate_class(c),
                Item::Namespace(ns) => self.enumerate_functions(&ns.items),
                Item::Variable(v) => {
                    if let Some(init) = &v.init {
                        self.enumerate_in_expr(init);
                    }
                }
                Item::Interface(_) | Item::Enum(_) | Item::ExportAlias { .. } => {}
            }
        }
    }

    fn enumerate_class(&mut self, c: &'a ClassDecl) {
        let class_id = self.tables.class_named(&c.name).expect("every class was installed by the type pass");
        let mut constructor_decl = None;
        for member in &c.members {
            if member.kind == MemberKind::Method && member.name == "constructor" {
                constructor_decl = Some(member);
                continue;
            }
            if let Some(body) = &member.body {
                let origin = FunctionOrigin::Method { class: class_id, decl: member };
                self.register_function(origin, Some(member.pos));
                self.enumerate_in_block(body);
            } else if let Some(init) = &member.init {
                self.enumerate_in_expr(init);
            }
        }
        let ctor_id = match constructor_decl {
            Some(decl) => {
                let id = self.register_function(FunctionOrigin::Constructor { class: class_id, decl: Some(decl) }, Some(decl.pos));
                if let Some(body) = &decl.body {
                    self.enumerate_in_block(body);
                }
                id
            }
            None => self.register_function(FunctionOrigin::Constructor { class: class_id, decl: None }, None),
        };
        self.constructor_of.insert(class_id, ctor_id);
        for member in &c.members {
            if member.kind == MemberKind::Method && member.name != "constructor" {
                if let Some(id) = self.function_pos.get(&PosKey { file: self.file.clone(), pos: member.pos }) {
                    self.method_of.insert((class_id, member.name.clone()), *id);
                }
            }
        }
    }

    fn enumerate_in_block(&mut self, block: &'a Block) {
        for stmt in &block.stmts {
            self.enumerate_in_stmt(stmt);
        }
    }

    fn enumerate_in_stmt(&mut self, stmt: &'a Stmt) {
        match stmt {
            Stmt::Expr(e) => self.enumerate_in_expr(e),
            Stmt::Variable(v) => {
                if let Some(init) = &v.init {
                    self.enumerate_in_expr(init);
                }
            }
            Stmt::Function(f) => {
                self.register_function(FunctionOrigin::Plain(f), Some(f.pos));
                self.enumerate_in_block(&f.body);
            }
            Stmt::Return(Some(e), _) => self.enumerate_in_expr(e),
            Stmt::Return(None, _) => {}
            Stmt::If { cond, then_branch, else_branch, .. } => {
                self.enumerate_in_expr(cond);
                self.enumerate_in_block(then_branch);
                if let Some(else_branch) = else_branch {
                    self.enumerate_in_block(else_branch);
                }
            }
            Stmt::While { cond, body, .. } => {
                self.enumerate_in_expr(cond);
                self.enumerate_in_block(body);
            }
            Stmt::Block(inner) => self.enumerate_in_block(inner),
        }
    }

    fn enumerate_in_expr(&mut self, expr: &'a Expr) {
        match expr {
            Expr::FunctionExpr(f) => {
                self.register_function(FunctionOrigin::Plain(f), Some(f.pos));
                self.enumerate_in_block(&f.body);
            }
            Expr::Binary { left, right, .. } => {
                self.enumerate_in_expr(left);
                self.enumerate_in_expr(right);
            }
            Expr::Assign { target, value, .. } => {
                self.enumerate_in_expr(target);
                self.enumerate_in_expr(value);
            }
            Expr::Call { callee, args, .. } => {
                self.enumerate_in_expr(callee);
                for a in args {
                    self.enumerate_in_expr(a);
                }
            }
            Expr::New { args, .. } | Expr::SuperCall { args, .. } | Expr::SuperMethodCall { args, .. } => {
                for a in args {
                    self.enumerate_in_expr(a);
                }
            }
            Expr::Member { object, .. } => self.enumerate_in_expr(object),
            Expr::Index { object, index, .. } => {
                self.enumerate_in_expr(object);
                self.enumerate_in_expr(index);
            }
            Expr::ArrayLit(items, _) => {
                for item in items {
                    self.enumerate_in_expr(item);
                }
            }
            Expr::ToAny(inner, _) => self.enumerate_in_expr(inner),
            Expr::FromAny { value, .. } => self.enumerate_in_expr(value),
            Expr::CallArgs(items) => {
                for item in items {
                    self.enumerate_in_expr(item);
                }
            }
            Expr::NumberLit(..)
            | Expr::StringLit(..)
            | Expr::BoolLit(..)
            | Expr::NullLit(..)
            | Expr::UndefinedLit(..)
            | Expr::Identifier(..)
            | Expr::This(..)
            | Expr::Super(..)
            | Expr::RestParam(..) => {}
        }
    }

    // ---- Globals -----------------------------------------------------------

    fn collect_globals(&mut self, items: &'a [Item]) {
        for item in items {
            match item {
                Item::Variable(v) => {
                    let index = self.globals.len() as u32;
                    self.global_by_pos.insert(PosKey { file: self.file.clone(), pos: v.pos }, index);
                    // Placeholder; the real initializer is lowered once every
                    // global (including class statics below) has an index,
                    // so forward references between globals resolve.
                    self.globals.push(GlobalInit { name: v.name.clone(), init: IrExpr::UndefinedConst });
                }
                Item::Namespace(ns) => self.collect_globals(&ns.items),
                Item::Class(c) => self.collect_class_statics(c),
                Item::Enum(e) => self.collect_enum_statics(e),
                Item::Function(_) | Item::Interface(_) | Item::ExportAlias { .. } => {}
            }
        }
    }

    fn collect_class_statics(&mut self, c: &ClassDecl) {
        let class_id = self.tables.class_named(&c.name).expect("every class was installed by the type pass");
        for member in &c.members {
            if member.kind != MemberKind::StaticField {
                continue;
            }
            let index = self.globals.len() as u32;
            self.global_by_static.insert((class_id, member.name.clone()), index);
            self.globals.push(GlobalInit { name: format!("{}_{}", c.name, member.name), init: IrExpr::UndefinedConst });
        }
    }

    fn collect_enum_statics(&mut self, e: &EnumDecl) {
        let class_id = self.tables.class_named(&e.name).expect("every enum was installed by the type pass");
        for (ordinal, entry) in e.entries.iter().enumerate() {
            let index = self.globals.len() as u32;
            self.global_by_static.insert((class_id, entry.clone()), index);
            self.globals.push(GlobalInit { name: format!("{}_{}", e.name, entry), init: IrExpr::NumberConst(ordinal as f64) });
        }
    }

    /// Lowers every global's real initializer now that all globals (and all
    /// functions, for statics that call methods) have a stable index
    /// (spec.md §4.3 Static fields, §5 "static-initializer side effects
    /// happen exactly once in declaration order").
    fn lower_global_initializers(&mut self, modules: &[Module]) {
        for module in modules {
            self.file = module.file.clone();
            self.lower_global_initializers_in_items(&module.items);
        }
    }

    fn lower_global_initializers_in_items(&mut self, items: &[Item]) {
        for item in items {
            match item {
                Item::Variable(v) => {
                    let index = self.global_by_pos[&PosKey { file: self.file.clone(), pos: v.pos }];
                    let init = v.init.as_ref().map(|e| self.lower_global_expr(e)).unwrap_or(IrExpr::UndefinedConst);
                    self.globals[index as usize].init = init;
                }
                Item::Namespace(ns) => self.lower_global_initializers_in_items(&ns.items),
                Item::Class(c) => {
                    let class_id = self.tables.class_named(&c.name).expect("class installed");
                    for member in &c.members {
                        if member.kind != MemberKind::StaticField {
                            continue;
                        }
                        let index = self.global_by_static[&(class_id, member.name.clone())];
                        let init = member.init.as_ref().map(|e| self.lower_global_expr(e)).unwrap_or(IrExpr::UndefinedConst);
                        self.globals[index as usize].init = init;
                    }
                }
                Item::Function(_) | Item::Interface(_) | Item::Enum(_) | Item::ExportAlias { .. } => {}
            }
        }
    }

    /// Lowers an expression that appears outside any function body (a
    /// top-level or static-field initializer): there is no enclosing
    /// function scope, so plain identifiers only ever resolve to other
    /// globals, classes, or functions.
    fn lower_global_expr(&mut self, expr: &Expr) -> IrExpr {
        let ctx = BodyCtx { function_scope: self.scopes.global, function_id: None, class: None };
        self.lower_expr(expr, &ctx)
    }

    // ---- Declared types (feeds both env-slot layout and `infer_type`) ------

    fn collect_declared_types(&mut self, items: &'a [Item]) {
        for item in items {
            match item {
                Item::Function(f) => {
                    self.collect_param_types(&f.params);
                    self.collect_declared_types_in_block(&f.body);
                }
                Item::Class(c) => {
                    for member in &c.members {
                        self.collect_param_types(&member.params);
                        if let Some(body) = &member.body {
                            self.collect_declared_types_in_block(body);
                        } else if let Some(init) = &member.init {
                            self.collect_declared_types_in_expr(init);
                        }
                    }
                }
                Item::Namespace(ns) => self.collect_declared_types(&ns.items),
                Item::Variable(v) => self.collect_variable_type(v),
                Item::Interface(_) | Item::Enum(_) | Item::ExportAlias { .. } => {}
            }
        }
    }

    fn collect_param_types(&mut self, params: &[Param]) {
        for p in params {
            if let Some(resolution) = self.scopes.declaration_at(&self.file, p.pos) {
                let ty = self.tables.resolve_type_expr(&p.declared_type);
                self.declared_types.insert((resolution.scope, resolution.symbol), ty);
            }
        }
    }

    fn collect_variable_type(&mut self, v: &ast::VariableDecl) {
        if let Some(resolution) = self.scopes.declaration_at(&self.file, v.pos) {
            let ty = v.declared_type.as_ref().map(|t| self.tables.resolve_type_expr(t)).unwrap_or(Type::Any);
            self.declared_types.insert((resolution.scope, resolution.symbol), ty);
        }
        if let Some(init) = &v.init {
            self.collect_declared_types_in_expr(init);
        }
    }

    fn collect_declared_types_in_block(&mut self, block: &Block) {
        for stmt in &block.stmts {
            self.collect_declared_types_in_stmt(stmt);
        }
    }

    fn collect_declared_types_in_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expr(e) => self.collect_declared_types_in_expr(e),
            Stmt::Variable(v) => self.collect_variable_type(v),
            Stmt::Function(f) => {
                self.collect_param_types(&f.params);
                self.collect_declared_types_in_block(&f.body);
            }
            Stmt::Return(Some(e), _) => self.collect_declared_types_in_expr(e),
            Stmt::Return(None, _) => {}
            Stmt::If { cond, then_branch, else_branch, .. } => {
                self.collect_declared_types_in_expr(cond);
                self.collect_declared_types_in_block(then_branch);
                if let Some(else_branch) = else_branch {
                    self.collect_declared_types_in_block(else_branch);
                }
            }
            Stmt::While { cond, body, .. } => {
                self.collect_declared_types_in_expr(cond);
                self.collect_declared_types_in_block(body);
            }
            Stmt::Block(inner) => self.collect_declared_types_in_block(inner),
        }
    }

    fn collect_declared_types_in_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::FunctionExpr(f) => {
                self.collect_param_types(&f.params);
                self.collect_declared_types_in_block(&f.body);
            }
            Expr::Binary { left, right, .. } => {
                self.collect_declared_types_in_expr(left);
                self.collect_declared_types_in_expr(right);
            }
            Expr::Assign { target, value, .. } => {
                self.collect_declared_types_in_expr(target);
                self.collect_declared_types_in_expr(value);
            }
            Expr::Call { callee, args, .. } => {
                self.collect_declared_types_in_expr(callee);
                for a in args {
                    self.collect_declared_types_in_expr(a);
                }
            }
            Expr::New { args, .. } | Expr::SuperCall { args, .. } | Expr::SuperMethodCall { args, .. } => {
                for a in args {
                    self.collect_declared_types_in_expr(a);
                }
            }
            Expr::Member { object, .. } => self.collect_declared_types_in_expr(object),
            Expr::Index { object, index, .. } => {
                self.collect_declared_types_in_expr(object);
                self.collect_declared_types_in_expr(index);
            }
            Expr::ArrayLit(items, _) => {
                for item in items {
                    self.collect_declared_types_in_expr(item);
                }
            }
            Expr::ToAny(inner, _) => self.collect_declared_types_in_expr(inner),
            Expr::FromAny { value, .. } => self.collect_declared_types_in_expr(value),
            Expr::CallArgs(items) => {
                for item in items {
                    self.collect_declared_types_in_expr(item);
                }
            }
            Expr::NumberLit(..)
            | Expr::StringLit(..)
            | Expr::BoolLit(..)
            | Expr::NullLit(..)
            | Expr::UndefinedLit(..)
            | Expr::Identifier(..)
            | Expr::This(..)
            | Expr::Super(..)
            | Expr::RestParam(..) => {}
        }
    }

    // ---- Phase 2: capture analysis ------------------------------------------

    fn analyze_captures_in_items(&mut self, items: &[Item]) {
        for item in items {
            match item {
                Item::Function(f) => self.analyze_function_captures(f.pos, &f.body),
                Item::Class(c) => {
                    for member in &c.members {
                        if let Some(body) = &member.body {
                            self.analyze_function_captures(member.pos, body);
                        }
                    }
                }
                Item::Namespace(ns) => self.analyze_captures_in_items(&ns.items),
                Item::Variable(_) | Item::Interface(_) | Item::Enum(_) | Item::ExportAlias { .. } => {}
            }
        }
    }

    fn analyze_function_captures(&mut self, pos: SourcePos, body: &Block) {
        let Some(&own_scope) = self.function_pos.get(&PosKey { file: self.file.clone(), pos }).and_then(|id| self.function_scope_of.get(id))
        else {
            return;
        };
        self.analyze_block(own_scope, body);
    }

    fn analyze_block(&mut self, own_scope: ScopeId, block: &Block) {
        for stmt in &block.stmts {
            self.analyze_stmt(own_scope, stmt);
        }
    }

    fn analyze_stmt(&mut self, own_scope: ScopeId, stmt: &Stmt) {
        match stmt {
            Stmt::Expr(e) => self.analyze_expr(own_scope, e),
            Stmt::Variable(v) => {
                if let Some(init) = &v.init {
                    self.analyze_expr(own_scope, init);
                }
            }
            Stmt::Function(f) => self.analyze_function_captures(f.pos, &f.body),
            Stmt::Return(Some(e), _) => self.analyze_expr(own_scope, e),
            Stmt::Return(None, _) => {}
            Stmt::If { cond, then_branch, else_branch, .. } => {
                self.analyze_expr(own_scope, cond);
                self.analyze_block(own_scope, then_branch);
                if let Some(else_branch) = else_branch {
                    self.analyze_block(own_scope, else_branch);
                }
            }
            Stmt::While { cond, body, .. } => {
                self.analyze_expr(own_scope, cond);
                self.analyze_block(own_scope, body);
            }
            Stmt::Block(inner) => self.analyze_block(own_scope, inner),
        }
    }

    fn analyze_expr(&mut self, own_scope: ScopeId, expr: &Expr) {
        match expr {
            Expr::Identifier(_, pos) => self.note_use(own_scope, *pos),
            Expr::FunctionExpr(f) => self.analyze_function_captures(f.pos, &f.body),
            Expr::Binary { left, right, .. } => {
                self.analyze_expr(own_scope, left);
                self.analyze_expr(own_scope, right);
            }
            Expr::Assign { target, value, .. } => {
                self.analyze_expr(own_scope, target);
                self.analyze_expr(own_scope, value);
            }
            Expr::Call { callee, args, .. } => {
                self.analyze_expr(own_scope, callee);
                for a in args {
                    self.analyze_expr(own_scope, a);
                }
            }
            Expr::New { args, .. } | Expr::SuperCall { args, .. } | Expr::SuperMethodCall { args, .. } => {
                for a in args {
                    self.analyze_expr(own_scope, a);
                }
            }
            Expr::Member { object, .. } => self.analyze_expr(own_scope, object),
            Expr::Index { object, index, .. } => {
                self.analyze_expr(own_scope, object);
                self.analyze_expr(own_scope, index);
            }
            Expr::ArrayLit(items, _) => {
                for item in items {
                    self.analyze_expr(own_scope, item);
                }
            }
            Expr::ToAny(inner, _) => self.analyze_expr(own_scope, inner),
            Expr::FromAny { value, .. } => self.analyze_expr(own_scope, value),
            Expr::CallArgs(items) => {
                for item in items {
                    self.analyze_expr(own_scope, item);
                }
            }
            Expr::NumberLit(..)
            | Expr::StringLit(..)
            | Expr::BoolLit(..)
            | Expr::NullLit(..)
            | Expr::UndefinedLit(..)
            | Expr::This(..)
            | Expr::Super(..)
            | Expr::RestParam(..) => {}
        }
    }

    fn note_use(&mut self, own_scope: ScopeId, pos: SourcePos) {
        let Some(resolution) = self.scopes.resolution_at(&self.file, pos) else { return };
        let owner_scope = self.scopes.owning_function_scope(resolution.scope);
        if owner_scope == own_scope || self.scopes.node(owner_scope).tag != ScopeTag::Function {
            return;
        }
        self.mark_chain(own_scope, owner_scope);
        let info = self.captures.entry(owner_scope).or_default();
        info.needs_env = true;
        if !info.slots.contains(&resolution.symbol) {
            info.slots.push(resolution.symbol);
        }
    }

    /// Marks every function scope strictly between `from` (inclusive) and
    /// `owner` (exclusive) as needing an environment pointer of its own to
    /// forward along, since a read at `from` walks through all of them to
    /// reach the slot `owner` allocates.
    fn mark_chain(&mut self, from: ScopeId, owner: ScopeId) {
        let mut scope = from;
        loop {
            if scope == owner {
                return;
            }
            self.chain_needed.insert(scope);
            let Some(parent) = self.scopes.node(scope).parent else { return };
            let next = self.scopes.owning_function_scope(parent);
            if next == scope {
                return;
            }
            scope = next;
        }
    }

    fn slot_order(&mut self, owner_scope: ScopeId) {
        if let Some(info) = self.captures.get_mut(&owner_scope) {
            info.slots.sort_by_key(|s| s.index());
        }
    }

    fn needs_env(&self, scope: ScopeId) -> bool {
        self.captures.get(&scope).is_some_and(|c| c.needs_env)
    }

    fn captured_slot(&self, owner_scope: ScopeId, symbol: SymbolIndex) -> Option<u32> {
        self.captures.get(&owner_scope)?.slots.iter().position(|s| *s == symbol).map(|p| p as u32)
    }

    // ---- Phase 3: body lowering ----------------------------------------------

    fn lower_function(&mut self, id: FunctionId) -> IrFunction {
        // Work around the borrow checker: `origins` is indexed by value here
        // rather than held across the whole method, since lowering a nested
        // `FunctionExpr` inside this body never re-enters `lower_function`
        // for `id` itself.
        let origin_ptr: *const FunctionOrigin<'a> = &self.origins[id.0 as usize];
        let origin = unsafe { &*origin_ptr };

        let own_scope = self.function_scope_of.get(&id).copied();
        let takes_parent_env = matches!(origin, FunctionOrigin::Plain(f) if self.is_nested(f.pos));
        let takes_this = origin.enclosing_class().is_some();

        if let Some(scope) = own_scope {
            self.slot_order(scope);
        }

        let params = origin.params();
        let param_count = params.len() as u32;

        let mut locals: Vec<IrLocal> = Vec::new();
        let mut local_index: AHashMap<(ScopeId, SymbolIndex), u32> = AHashMap::new();
        let mut param_index: AHashMap<(ScopeId, SymbolIndex), u32> = AHashMap::new();
        if let Some(scope) = own_scope {
            for (i, symbol) in self.scopes.node(scope).params.iter().enumerate() {
                param_index.insert((scope, *symbol), i as u32);
            }
            self.collect_locals(scope, &mut locals, &mut local_index);
        }

        let env_layout = own_scope.filter(|s| self.needs_env(*s)).map(|scope| {
            let slots = self.captures[&scope].slots.clone();
            let slot_types = slots.iter().map(|symbol| self.declared_type_of(scope, *symbol)).collect();
            let init_sources = slots
                .iter()
                .map(|symbol| {
                    if let Some(&p) = param_index.get(&(scope, *symbol)) {
                        node::EnvInitSource::Param(p)
                    } else if let Some(&l) = local_index.get(&(scope, *symbol)) {
                        node::EnvInitSource::Local(l)
                    } else {
                        // A captured symbol not yet reached by `collect_locals`
                        // (e.g. declared in a sibling block visited later);
                        // the slot still exists so the backend's struct shape
                        // stays stable, it just starts out unset.
                        node::EnvInitSource::Local(0)
                    }
                })
                .collect();
            EnvLayout { slot_types, init_sources }
        });

        let ctx = BodyCtx { function_scope: own_scope.unwrap_or(self.scopes.global), function_id: Some(id), class: origin.enclosing_class() };

        let mut body_ctx = FunctionBodyCtx { ctx, param_index, local_index, locals: &mut locals };

        let mut body = Vec::new();
        if let FunctionOrigin::Constructor { class, decl } = origin {
            body.extend(self.lower_constructor_prologue(*class, &mut body_ctx));
            if let Some(decl) = decl {
                if let Some(block) = &decl.body {
                    body.extend(self.lower_block(block, &mut body_ctx));
                }
            }
        } else if let Some(block) = origin.body() {
            body.extend(self.lower_block(block, &mut body_ctx));
        }

        IrFunction {
            name: origin.name(self.tables),
            param_count,
            locals,
            env_layout,
            takes_parent_env,
            takes_this,
            body,
            pos: self.function_pos_of(origin),
        }
    }

    fn function_pos_of(&self, origin: &FunctionOrigin<'a>) -> SourcePos {
        match origin {
            FunctionOrigin::Plain(f) => f.pos,
            FunctionOrigin::Method { decl, .. } => decl.pos,
            FunctionOrigin::Constructor { decl: Some(decl), .. } => decl.pos,
            FunctionOrigin::Constructor { decl: None, .. } => SourcePos::default(),
        }
    }

    fn is_nested(&self, pos: SourcePos) -> bool {
        let Some(&scope) = self.function_pos.get(&PosKey { file: self.file.clone(), pos }).and_then(|id| self.function_scope_of.get(id))
        else {
            return false;
        };
        self.is_nested_scope(scope)
    }

    /// Whether `scope` (a function's own scope) is lexically nested inside
    /// another function, i.e. whether that function's WebAssembly signature
    /// carries a leading `parent_env` parameter at all (spec.md §4.3: "a
    /// plain top-level function has a null environment").
    fn is_nested_scope(&self, scope: ScopeId) -> bool {
        let Some(parent) = self.scopes.node(scope).parent else { return false };
        !matches!(self.scopes.node(self.scopes.owning_function_scope(parent)).tag, ScopeTag::Global)
            && self.scopes.owning_function_scope(parent) != scope
    }

    /// Runs field initializers in textual declaration order, then (if the
    /// class has a parent and no explicit constructor) the implicit
    /// `super(...)` forwarding call (spec.md §4.3 Super calls, Inheritance
    /// reordering: "subclass initializers still run in textual order").
    fn lower_constructor_prologue(&mut self, class: ClassId, ctx: &mut FunctionBodyCtx) -> Vec<IrStmt> {
        let mut stmts = Vec::new();
        let class_name = self.tables.class(class).name.clone();
        let Some(&decl) = self.ast_classes.get(&class_name) else { return stmts };
        if let Some(parent) = self.tables.class(class).parent {
            if let Some(ctor) = self.constructor_of.get(&parent).copied() {
                stmts.push(IrStmt::Expr(IrExpr::Call { target: CallTarget::Direct(ctor), args: vec![IrExpr::This] }));
            }
        }
        for member in &decl.members {
            if member.kind != MemberKind::Field {
                continue;
            }
            let slot = self
                .tables
                .class(class)
                .instance_meta
                .slot_of(&member.name)
                .expect("every own field has an instance slot");
            let value = member
                .init
                .as_ref()
                .map(|e| self.lower_expr(e, &ctx.ctx))
                .unwrap_or(IrExpr::UndefinedConst);
            stmts.push(IrStmt::Expr(IrExpr::StructSet { object: Box::new(IrExpr::This), class, slot, value: Box::new(value) }));
        }
        stmts
    }

    fn collect_locals(&self, scope: ScopeId, locals: &mut Vec<IrLocal>, index: &mut AHashMap<(ScopeId, SymbolIndex), u32>) {
        let node = self.scopes.node(scope);
        for symbol in node.symbols() {
            if let Symbol::Variable { name, index: symbol_index, .. } = symbol {
                let key = (scope, *symbol_index);
                if index.contains_key(&key) {
                    continue;
                }
                index.insert(key, locals.len() as u32);
                locals.push(IrLocal { name: name.clone() });
            }
        }
        for child in &node.children {
            if self.scopes.node(*child).tag == ScopeTag::Block {
                self.collect_locals(*child, locals, index);
            }
        }
    }

    fn declared_type_of(&self, scope: ScopeId, symbol: SymbolIndex) -> Type {
        self.declared_types.get(&(scope, symbol)).cloned().unwrap_or(Type::Any)
    }

    fn lower_block(&mut self, block: &Block, ctx: &mut FunctionBodyCtx) -> Vec<IrStmt> {
        block.stmts.iter().filter_map(|s| self.lower_stmt(s, ctx)).collect()
    }

    fn lower_stmt(&mut self, stmt: &Stmt, ctx: &mut FunctionBodyCtx) -> Option<IrStmt> {
        match stmt {
            Stmt::Expr(e) => Some(IrStmt::Expr(self.lower_expr(e, &ctx.ctx))),
            Stmt::Variable(v) => {
                let value = v.init.as_ref().map(|e| self.lower_expr(e, &ctx.ctx)).unwrap_or(IrExpr::UndefinedConst);
                let resolution = self.scopes.declaration_at(&self.file, v.pos)?;
                if let Some(&local) = ctx.local_index.get(&(resolution.scope, resolution.symbol)) {
                    Some(IrStmt::Expr(IrExpr::LocalSet(local, Box::new(value))))
                } else if let Some(slot) = self.captured_slot(resolution.scope, resolution.symbol) {
                    Some(IrStmt::Expr(IrExpr::EnvStore {
                        depth: self.depth_to_owner(ctx.ctx.function_scope, resolution.scope),
                        slot,
                        owner: self.function_id_of_scope(resolution.scope),
                        value: Box::new(value),
                    }))
                } else {
                    None
                }
            }
            Stmt::Function(_) => None,
            Stmt::Return(expr, _) => Some(IrStmt::Return(expr.as_ref().map(|e| self.lower_expr(e, &ctx.ctx)))),
            Stmt::If { cond, then_branch, else_branch, .. } => Some(IrStmt::If {
                cond: self.lower_expr(cond, &ctx.ctx),
                then_branch: self.lower_block(then_branch, ctx),
                else_branch: else_branch.as_ref().map(|b| self.lower_block(b, ctx)).unwrap_or_default(),
            }),
            Stmt::While { cond, body, .. } => {
                Some(IrStmt::Loop { cond: self.lower_expr(cond, &ctx.ctx), body: self.lower_block(body, ctx) })
            }
            Stmt::Block(inner) => {
                let mut stmts = self.lower_block(inner, ctx);
                Some(if stmts.len() == 1 { stmts.remove(0) } else { IrStmt::If { cond: IrExpr::BoolConst(true), then_branch: stmts, else_branch: Vec::new() } })
            }
        }
    }

    /// Depth computation per `node::IrExpr::EnvLoad`'s contract: the count of
    /// *owning* ancestor function scopes from (and including, if it owns its
    /// own environment) the current function up to, but excluding, `owner`.
    fn depth_to_owner(&self, current: ScopeId, owner: ScopeId) -> u32 {
        let mut depth = 0;
        let mut scope = current;
        loop {
            if self.needs_env(scope) {
                depth += 1;
            }
            if scope == owner {
                // owner itself must not be counted past; back it out since
                // the loop condition below breaks on reaching owner's
                // *parent* boundary instead.
                if depth > 0 {
                    depth -= 1;
                }
                return depth;
            }
            let Some(parent) = self.scopes.node(scope).parent else { return depth };
            scope = self.scopes.owning_function_scope(parent);
        }
    }

    fn function_id_of_scope(&self, scope: ScopeId) -> FunctionId {
        self.function_scope_of
            .iter()
            .find(|(_, s)| **s == scope)
            .map(|(id, _)| *id)
            .unwrap_or(FunctionId(0))
    }

    fn lower_expr(&mut self, expr: &Expr, ctx: &BodyCtx) -> IrExpr {
        // `FunctionBodyCtx`-aware identifier/assign lowering needs the local
        // maps, so those two cases are intercepted by `lower_expr_in_function`
        // below when called from a function body; here we handle everything
        // that's shape-generic (constants, calls, member access, etc.), and
        // identifiers default to global/class-member lookups only (used for
        // initializers with no enclosing function scope).
        self.lower_expr_generic(expr, ctx, None)
    }

    fn lower_expr_generic(&mut self, expr: &Expr, ctx: &BodyCtx, locals: Option<&LocalMaps>) -> IrExpr {
        match expr {
            Expr::NumberLit(n, _) => IrExpr::NumberConst(*n),
            Expr::StringLit(s, _) => IrExpr::StringConst(self.strings.intern(s)),
            Expr::BoolLit(b, _) => IrExpr::BoolConst(*b),
            Expr::NullLit(_) => IrExpr::NullConst,
            Expr::UndefinedLit(_) => IrExpr::UndefinedConst,
            Expr::This(_) => IrExpr::This,
            Expr::Super(_) => IrExpr::This,
            Expr::RestParam(name, pos) => self.lower_identifier(name, *pos, ctx, locals),
            Expr::Identifier(name, pos) => self.lower_identifier(name, *pos, ctx, locals),
            Expr::ArrayLit(items, _) => {
                let len = items.len();
                let mut array = IrExpr::ArrayNew { length: Box::new(IrExpr::NumberConst(len as f64)), element_is_any: true };
                for (i, item) in items.iter().enumerate() {
                    let value = self.lower_expr_generic(item, ctx, locals);
                    array = IrExpr::ArraySet {
                        array: Box::new(array),
                        index: Box::new(IrExpr::NumberConst(i as f64)),
                        value: Box::new(value),
                        element_is_any: true,
                    };
                }
                array
            }
            Expr::Binary { op, left, right, pos } => {
                let l = self.lower_expr_generic(left, ctx, locals);
                let r = self.lower_expr_generic(right, ctx, locals);
                let _ = pos;
                IrExpr::Binary { op: IrBinOp::from(*op), left: Box::new(l), right: Box::new(r) }
            }
            Expr::Assign { target, value, .. } => self.lower_assign(target, value, ctx, locals),
            Expr::Call { callee, args, .. } => self.lower_call(callee, args, ctx, locals),
            Expr::New { class_name, args, .. } => {
                let class = self.tables.class_named(class_name);
                let lowered_args = args.iter().map(|a| self.lower_expr_generic(a, ctx, locals)).collect();
                match class {
                    Some(class) => IrExpr::New { class, args: lowered_args },
                    None => IrExpr::UndefinedConst,
                }
            }
            Expr::Member { object, name, pos } => self.lower_member_get(object, name, *pos, ctx, locals),
            Expr::Index { object, index, .. } => IrExpr::ArrayGet {
                array: Box::new(self.lower_expr_generic(object, ctx, locals)),
                index: Box::new(self.lower_expr_generic(index, ctx, locals)),
                element_is_any: true,
            },
            Expr::SuperCall { args, pos } => {
                let _ = pos;
                let lowered_args = args.iter().map(|a| self.lower_expr_generic(a, ctx, locals)).collect::<Vec<_>>();
                match ctx.class.and_then(|c| self.tables.class(c).parent).and_then(|p| self.constructor_of.get(&p).copied()) {
                    Some(parent_ctor) => {
                        let mut full_args = vec![IrExpr::This];
                        full_args.extend(lowered_args);
                        IrExpr::Call { target: CallTarget::Direct(parent_ctor), args: full_args }
                    }
                    None => IrExpr::UndefinedConst,
                }
            }
            Expr::SuperMethodCall { method, args, .. } => {
                let lowered_args = args.iter().map(|a| self.lower_expr_generic(a, ctx, locals)).collect::<Vec<_>>();
                let target = ctx
                    .class
                    .and_then(|c| self.tables.class(c).parent)
                    .and_then(|p| self.method_of.get(&(p, method.clone())).copied());
                match target {
                    Some(function) => {
                        let mut full_args = vec![IrExpr::This];
                        full_args.extend(lowered_args);
                        IrExpr::Call { target: CallTarget::Direct(function), args: full_args }
                    }
                    None => IrExpr::UndefinedConst,
                }
            }
            Expr::FunctionExpr(f) => self.lower_closure_new(f, ctx),
            Expr::ToAny(inner, _) => IrExpr::BoxAny(Box::new(self.lower_expr_generic(inner, ctx, locals))),
            Expr::FromAny { value, .. } => IrExpr::UnboxAny(Box::new(self.lower_expr_generic(value, ctx, locals))),
            Expr::CallArgs(items) => {
                // A bare spread group outside a call position; lower as an
                // array (spec.md §4.3 Rest parameters share the same
                // array-of-values shape).
                let lowered: SmallVec<[IrExpr; 4]> = items.iter().map(|i| self.lower_expr_generic(i, ctx, locals)).collect();
                let mut array = IrExpr::ArrayNew { length: Box::new(IrExpr::NumberConst(lowered.len() as f64)), element_is_any: true };
                for (i, value) in lowered.into_iter().enumerate() {
                    array = IrExpr::ArraySet {
                        array: Box::new(array),
                        index: Box::new(IrExpr::NumberConst(i as f64)),
                        value: Box::new(value),
                        element_is_any: true,
                    };
                }
                array
            }
        }
    }

    fn lower_identifier(&mut self, name: &str, pos: SourcePos, ctx: &BodyCtx, locals: Option<&LocalMaps>) -> IrExpr {
        let Some(resolution) = self.scopes.resolution_at(&self.file, pos) else {
            self.bag.push(Diagnostic::BackendInvariantViolated { message: format!("unresolved identifier `{name}` reached ir lowering") });
            return IrExpr::UndefinedConst;
        };
        if let Some(locals) = locals {
            if let Some(&param) = locals.param_index.get(&(resolution.scope, resolution.symbol)) {
                return IrExpr::ParamGet(param);
            }
            if let Some(&local) = locals.local_index.get(&(resolution.scope, resolution.symbol)) {
                return IrExpr::LocalGet(local);
            }
            let owner_scope = self.scopes.owning_function_scope(resolution.scope);
            if self.scopes.node(owner_scope).tag == ScopeTag::Function && owner_scope != ctx.function_scope {
                if let Some(slot) = self.captured_slot(owner_scope, resolution.symbol) {
                    return IrExpr::EnvLoad {
                        depth: self.depth_to_owner(ctx.function_scope, owner_scope),
                        slot,
                        owner: self.function_id_of_scope(owner_scope),
                    };
                }
            }
        }
        // Anything else is module-level: a plain global, a function value,
        // or a class/interface/namespace name used at a call/member site
        // (those are handled by their own lowering paths and never reach
        // here directly).
        if let Some((decl_file, decl_pos)) = self.scopes.declared_at(resolution.scope, resolution.symbol) {
            if let Some(&index) = self.global_by_pos.get(&PosKey { file: decl_file.to_owned(), pos: decl_pos }) {
                return IrExpr::GlobalGet(index);
            }
        }
        if let Some(&function) = self.function_by_symbol.get(&(resolution.scope, resolution.symbol)) {
            let env = self.env_spec_for(function, ctx);
            return IrExpr::ClosureNew { function, env };
        }
        IrExpr::UndefinedConst
    }

    fn lower_assign(&mut self, target: &Expr, value: &Expr, ctx: &BodyCtx, locals: Option<&LocalMaps>) -> IrExpr {
        let lowered_value = self.lower_expr_generic(value, ctx, locals);
        match target {
            Expr::Identifier(_, pos) => self.lower_identifier_set(*pos, lowered_value, ctx, locals),
            Expr::Member { object, name, pos } => self.lower_member_set(object, name, *pos, lowered_value, ctx, locals),
            Expr::Index { object, index, .. } => IrExpr::ArraySet {
                array: Box::new(self.lower_expr_generic(object, ctx, locals)),
                index: Box::new(self.lower_expr_generic(index, ctx, locals)),
                value: Box::new(lowered_value),
                element_is_any: true,
            },
            _ => lowered_value,
        }
    }

    fn lower_identifier_set(&mut self, pos: SourcePos, value: IrExpr, ctx: &BodyCtx, locals: Option<&LocalMaps>) -> IrExpr {
        let Some(resolution) = self.scopes.resolution_at(&self.file, pos) else { return value };
        if let Some(locals) = locals {
            if let Some(&local) = locals.local_index.get(&(resolution.scope, resolution.symbol)) {
                return IrExpr::LocalSet(local, Box::new(value));
            }
            let owner_scope = self.scopes.owning_function_scope(resolution.scope);
            if self.scopes.node(owner_scope).tag == ScopeTag::Function && owner_scope != ctx.function_scope {
                if let Some(slot) = self.captured_slot(owner_scope, resolution.symbol) {
                    return IrExpr::EnvStore {
                        depth: self.depth_to_owner(ctx.function_scope, owner_scope),
                        slot,
                        owner: self.function_id_of_scope(owner_scope),
                        value: Box::new(value),
                    };
                }
            }
        }
        if let Some((decl_file, decl_pos)) = self.scopes.declared_at(resolution.scope, resolution.symbol) {
            if let Some(&index) = self.global_by_pos.get(&PosKey { file: decl_file.to_owned(), pos: decl_pos }) {
                return IrExpr::GlobalSet(index, Box::new(value));
            }
        }
        value
    }

    fn lower_member_get(&mut self, object: &Expr, name: &str, pos: SourcePos, ctx: &BodyCtx, locals: Option<&LocalMaps>) -> IrExpr {
        let _ = pos;
        if let Expr::Identifier(class_name, _) = object {
            if let Some(class_id) = self.tables.class_named(class_name) {
                if let Some(&index) = self.global_by_static.get(&(class_id, name.to_owned())) {
                    return IrExpr::GlobalGet(index);
                }
                if let Some(&function) = self.method_of.get(&(class_id, name.to_owned())) {
                    return IrExpr::ClosureNew { function, env: EnvSpec::None };
                }
            }
        }
        let object_type = self.infer_type(object, ctx, locals);
        let lowered_object = self.lower_expr_generic(object, ctx, locals);
        match object_type {
            Type::Class(class_id) => {
                if let Some(slot) = self.tables.class(class_id).instance_meta.slot_of(name) {
                    IrExpr::StructGet { object: Box::new(lowered_object), class: class_id, slot }
                } else if let Some(method) = self.method_of.get(&(class_id, name.to_owned())).copied() {
                    IrExpr::ClosureNew { function: method, env: EnvSpec::Forward(Box::new(lowered_object)) }
                } else {
                    IrExpr::UndefinedConst
                }
            }
            Type::Interface(iface_id) => {
                let member_index = self.tables.interface(iface_id).member_index(name).unwrap_or(0);
                IrExpr::InterfaceGet { view: Box::new(lowered_object), interface: iface_id, member_index }
            }
            Type::Array(_) if name == "length" => IrExpr::ArrayLen(Box::new(lowered_object)),
            _ => IrExpr::DynGetProp { object: Box::new(lowered_object), name: self.strings.intern(name) },
        }
    }

    fn lower_member_set(&mut self, object: &Expr, name: &str, pos: SourcePos, value: IrExpr, ctx: &BodyCtx, locals: Option<&LocalMaps>) -> IrExpr {
        let _ = pos;
        if let Expr::Identifier(class_name, _) = object {
            if let Some(class_id) = self.tables.class_named(class_name) {
                if let Some(&index) = self.global_by_static.get(&(class_id, name.to_owned())) {
                    return IrExpr::GlobalSet(index, Box::new(value));
                }
            }
        }
        let object_type = self.infer_type(object, ctx, locals);
        let lowered_object = self.lower_expr_generic(object, ctx, locals);
        match object_type {
            Type::Class(class_id) => {
                if let Some(slot) = self.tables.class(class_id).instance_meta.slot_of(name) {
                    IrExpr::StructSet { object: Box::new(lowered_object), class: class_id, slot, value: Box::new(value) }
                } else {
                    IrExpr::UndefinedConst
                }
            }
            Type::Interface(iface_id) => {
                let member_index = self.tables.interface(iface_id).member_index(name).unwrap_or(0);
                IrExpr::InterfaceSet { view: Box::new(lowered_object), interface: iface_id, member_index, value: Box::new(value) }
            }
            _ => IrExpr::DynSetProp { object: Box::new(lowered_object), name: self.strings.intern(name), value: Box::new(value) },
        }
    }

    fn lower_call(&mut self, callee: &Expr, args: &[Expr], ctx: &BodyCtx, locals: Option<&LocalMaps>) -> IrExpr {
        let lowered_args: Vec<IrExpr> = args.iter().map(|a| self.lower_expr_generic(a, ctx, locals)).collect();
        match callee {
            Expr::Identifier(_, pos) => {
                if let Some(resolution) = self.scopes.resolution_at(&self.file, *pos) {
                    if let Some(&function) = self.function_by_symbol.get(&(resolution.scope, resolution.symbol)) {
                        return IrExpr::Call { target: CallTarget::Direct(function), args: lowered_args };
                    }
                }
                let closure = self.lower_expr_generic(callee, ctx, locals);
                IrExpr::Call { target: CallTarget::Closure(Box::new(closure)), args: lowered_args }
            }
            Expr::Member { object, name, pos } => {
                let _ = pos;
                if let Expr::Identifier(class_name, _) = object.as_ref() {
                    if let Some(class_id) = self.tables.class_named(class_name) {
                        if let Some(&function) = self.method_of.get(&(class_id, name.clone())) {
                            return IrExpr::Call { target: CallTarget::Direct(function), args: lowered_args };
                        }
                    }
                }
                let object_type = self.infer_type(object, ctx, locals);
                let lowered_object = self.lower_expr_generic(object, ctx, locals);
                match object_type {
                    Type::Class(class_id) => {
                        if let Some(slot) = self.tables.class(class_id).vtable.iter().find(|s| &s.name == name).map(|s| s.slot) {
                            let mut full_args = vec![lowered_object.clone()];
                            full_args.extend(lowered_args);
                            IrExpr::Call { target: CallTarget::MethodSlot { object: Box::new(lowered_object), class: class_id, slot }, args: full_args }
                        } else {
                            IrExpr::UndefinedConst
                        }
                    }
                    Type::Interface(iface_id) => {
                        let member_index = self.tables.interface(iface_id).member_index(name).unwrap_or(0);
                        let mut full_args = vec![lowered_object.clone()];
                        full_args.extend(lowered_args);
                        IrExpr::Call {
                            target: CallTarget::InterfaceSlot { view: Box::new(lowered_object), interface: iface_id, member_index },
                            args: full_args,
                        }
                    }
                    Type::Any => IrExpr::DynCall {
                        callee: Box::new(IrExpr::DynGetProp { object: Box::new(lowered_object), name: self.strings.intern(name) }),
                        args: lowered_args,
                    },
                    _ => IrExpr::UndefinedConst,
                }
            }
            _ => {
                let object_type = self.infer_type(callee, ctx, locals);
                let lowered_callee = self.lower_expr_generic(callee, ctx, locals);
                if object_type.is_any() {
                    IrExpr::DynCall { callee: Box::new(lowered_callee), args: lowered_args }
                } else {
                    IrExpr::Call { target: CallTarget::Closure(Box::new(lowered_callee)), args: lowered_args }
                }
            }
        }
    }

    fn lower_closure_new(&mut self, f: &FunctionDecl, ctx: &BodyCtx) -> IrExpr {
        let Some(&function) = self.function_pos.get(&PosKey { file: self.file.clone(), pos: f.pos }) else {
            return IrExpr::UndefinedConst;
        };
        let env = self.env_spec_for(function, ctx);
        IrExpr::ClosureNew { function, env }
    }

    /// How `function`'s environment pointer should be built at a closure
    /// creation site. spec.md §4.3 allocates a function's own environment
    /// record only at that function's own entry ("when a function captures
    /// mutable locals, the lowering inserts an `env.new` at the function
    /// entry"); a closure *value* never snapshots captured slots at the
    /// point it's created; it only carries the creator's own current
    /// environment pointer outward so the callee's entry prologue can chase
    /// parent links back to it ("a function value is a two-word record:
    /// code pointer + environment pointer"). So the only real choice here is
    /// between forwarding the creator's `EnvSelf` (`function` is lexically
    /// nested and either owns captures of its own or merely relays an
    /// ancestor's pointer past itself, `chain_needed`) and needing none at
    /// all (a plain top-level function, which has a null environment).
    fn env_spec_for(&mut self, function: FunctionId, ctx: &BodyCtx) -> EnvSpec {
        let Some(&inner_scope) = self.function_scope_of.get(&function) else {
            return EnvSpec::None;
        };
        let relays_env = self.needs_env(inner_scope) || self.chain_needed.contains(&inner_scope);
        if relays_env && self.is_nested_scope(inner_scope) && ctx.function_id.is_some() {
            return EnvSpec::Forward(Box::new(IrExpr::EnvSelf));
        }
        EnvSpec::None
    }

    /// Best-effort static type of an expression, used only to choose a
    /// lowering *shape* (struct vs. interface-view vs. dynamic access) —
    /// pass 3 already validated the program, so this does not re-diagnose
    /// type errors, only recovers enough of the answer pass 3 already knows.
    fn infer_type(&self, expr: &Expr, ctx: &BodyCtx, locals: Option<&LocalMaps>) -> Type {
        match expr {
            Expr::NumberLit(..) => Type::Number,
            Expr::StringLit(..) => Type::String,
            Expr::BoolLit(..) => Type::Bool,
            Expr::NullLit(..) => Type::Null,
            Expr::UndefinedLit(..) => Type::Undefined,
            Expr::ArrayLit(items, _) => Type::Array(Box::new(items.first().map(|i| self.infer_type(i, ctx, locals)).unwrap_or(Type::Any))),
            Expr::This(_) => ctx.class.map(Type::Class).unwrap_or(Type::Any),
            Expr::New { class_name, .. } => self.tables.class_named(class_name).map(Type::Class).unwrap_or(Type::Any),
            Expr::ToAny(..) => Type::Any,
            Expr::FromAny { target, .. } => self.tables.resolve_type_expr(target),
            Expr::Binary { op: BinOp::Eq | BinOp::NotEq | BinOp::Lt | BinOp::Gt, .. } => Type::Bool,
            Expr::Binary { .. } => Type::Number,
            Expr::Identifier(_, pos) | Expr::RestParam(_, pos) => self.infer_identifier_type(*pos, ctx, locals),
            Expr::Member { object, name, .. } => self.infer_member_type(object, name, ctx, locals),
            Expr::Index { object, .. } => match self.infer_type(object, ctx, locals) {
                Type::Array(element) => *element,
                _ => Type::Any,
            },
            _ => Type::Any,
        }
    }

    fn infer_identifier_type(&self, pos: SourcePos, ctx: &BodyCtx, locals: Option<&LocalMaps>) -> Type {
        let _ = (ctx, locals);
        let Some(resolution) = self.scopes.resolution_at(&self.file, pos) else { return Type::Any };
        self.declared_type_of(resolution.scope, resolution.symbol)
    }

    fn infer_member_type(&self, object: &Expr, name: &str, ctx: &BodyCtx, locals: Option<&LocalMaps>) -> Type {
        match self.infer_type(object, ctx, locals) {
            Type::Class(class_id) => self
                .tables
                .class(class_id)
                .members
                .iter()
                .find(|m| m.name == name && matches!(m.origin, MemberOrigin::Own | MemberOrigin::Inherited | MemberOrigin::Overridden))
                .map(|m| m.ty.clone())
                .unwrap_or(Type::Any),
            Type::Interface(iface_id) => self
                .tables
                .interface(iface_id)
                .members
                .iter()
                .find(|m| m.name == name)
                .map(|m| m.ty.clone())
                .unwrap_or(Type::Any),
            _ => Type::Any,
        }
    }
}

/// Per-function-body lowering context threaded through expression lowering:
/// which scope is "home" (for deciding local vs. captured vs. global), which
/// [`FunctionId`] is currently being lowered (`None` for a global
/// initializer, which has no enclosing function), and which class (if any)
/// `this`/`super` refer to.
struct BodyCtx {
    function_scope: ScopeId,
    function_id: Option<FunctionId>,
    class: Option<ClassId>,
}

struct LocalMaps {
    param_index: AHashMap<(ScopeId, SymbolIndex), u32>,
    local_index: AHashMap<(ScopeId, SymbolIndex), u32>,
}

struct FunctionBodyCtx<'l> {
    ctx: BodyCtx,
    param_index: AHashMap<(ScopeId, SymbolIndex), u32>,
    local_index: AHashMap<(ScopeId, SymbolIndex), u32>,
    locals: &'l mut Vec<IrLocal>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BindingKind, ClassDecl, FunctionDecl, MemberDecl, Stmt, VariableDecl};
    use crate::scope::build_scopes;
    use crate::types::resolve_types;

    fn pos(line: u32, col: u32) -> SourcePos {
        SourcePos::new(line, col)
    }

    fn opts() -> CompileOptions {
        CompileOptions::default()
    }

    #[test]
    fn static_field_arithmetic_lowers_to_global_init() {
        let module = Module {
            file: "a.ovd".into(),
            items: vec![Item::Class(ClassDecl {
                name: "A".into(),
                type_params: vec![],
                extends: None,
                implements: vec![],
                members: vec![
                    MemberDecl {
                        name: "c".into(),
                        kind: MemberKind::StaticField,
                        declared_type: Some(ast::TypeExpr::Named("number".into())),
                        optional: false,
                        readonly: false,
                        params: vec![],
                        body: None,
                        init: Some(Expr::NumberLit(11.0, pos(0, 20))),
                        pos: pos(0, 10),
                    },
                    MemberDecl {
                        name: "d".into(),
                        kind: MemberKind::StaticField,
                        declared_type: Some(ast::TypeExpr::Named("number".into())),
                        optional: false,
                        readonly: true,
                        params: vec![],
                        body: None,
                        init: Some(Expr::Binary {
                            op: BinOp::Add,
                            left: Box::new(Expr::NumberLit(12.0, pos(1, 10))),
                            right: Box::new(Expr::Member {
                                object: Box::new(Expr::Identifier("A".into(), pos(1, 16))),
                                name: "c".into(),
                                pos: pos(1, 17),
                            }),
                            pos: pos(1, 15),
                        }),
                        pos: pos(1, 0),
                    },
                ],
                pos: pos(0, 0),
            })],
        };
        let scopes = build_scopes(std::slice::from_ref(&module)).unwrap();
        let tables = resolve_types(std::slice::from_ref(&module), &scopes, &opts()).unwrap();
        let ir_module = lower(std::slice::from_ref(&module), &scopes, &tables, &opts()).unwrap();
        assert_eq!(ir_module.globals.len(), 2);
        assert!(matches!(ir_module.globals[0].init, IrExpr::NumberConst(n) if n == 11.0));
        assert!(matches!(ir_module.globals[1].init, IrExpr::Binary { .. }));
    }

    #[test]
    fn rest_of_module_compiles_with_plain_function() {
        let module = Module {
            file: "a.ovd".into(),
            items: vec![Item::Function(FunctionDecl {
                name: "f".into(),
                type_params: vec![],
                params: vec![],
                return_type: None,
                body: Block { stmts: vec![Stmt::Return(Some(Expr::NumberLit(1.0, pos(0, 10))), pos(0, 4))] },
                pos: pos(0, 0),
            })],
        };
        let scopes = build_scopes(std::slice::from_ref(&module)).unwrap();
        let tables = resolve_types(std::slice::from_ref(&module), &scopes, &opts()).unwrap();
        let ir_module = lower(std::slice::from_ref(&module), &scopes, &tables, &opts()).unwrap();
        assert_eq!(ir_module.functions.len(), 1);
        assert_eq!(ir_module.functions[0].name, "f");
    }

    #[test]
    fn module_level_variable_becomes_global() {
        let module = Module {
            file: "a.ovd".into(),
            items: vec![Item::Variable(VariableDecl {
                name: "x".into(),
                binding: BindingKind::Immutable,
                declared_type: None,
                init: Some(Expr::NumberLit(42.0, pos(0, 10))),
                pos: pos(0, 0),
            })],
        };
        let scopes = build_scopes(std::slice::from_ref(&module)).unwrap();
        let tables = resolve_types(std::slice::from_ref(&module), &scopes, &opts()).unwrap();
        let ir_module = lower(std::slice::from_ref(&module), &scopes, &tables, &opts()).unwrap();
        assert_eq!(ir_module.globals.len(), 1);
        assert!(matches!(ir_module.globals[0].init, IrExpr::NumberConst(n) if n == 42.0));
    }
}
