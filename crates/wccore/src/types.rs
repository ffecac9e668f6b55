//! The type lattice and resolver — spec.md §4.2.
//!
//! [`Type`] is the closed, tagged lattice of spec.md §3. [`TypeTables`]
//! holds the class/interface meta tables built here: for every class, an
//! instance meta (own + inherited fields in layout order) and a class meta
//! (statics); for every interface, a member list plus, per concrete class
//! assignable to it, a dispatch record. Cyclic type references (a class
//! referencing itself, mutually recursive interfaces) are handled by the
//! two-phase build of spec.md §9: every named type is installed as an
//! empty placeholder first, then member lists are filled in a second pass
//! so member types can point at already-installed placeholders without the
//! builder ever following an unresolved pointer.

use ahash::AHashMap;

use crate::ast::{self, MemberKind, Module, TypeExpr};
use crate::diagnostics::{Diagnostic, DiagnosticBag, SourcePos};
use crate::scope::ScopeTree;
use crate::session::CompileOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceId(pub(crate) u32);

/// The canonical type lattice of spec.md §3.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Void,
    Bool,
    Number,
    String,
    Null,
    Undefined,
    Any,
    Array(Box<Type>),
    Function {
        params: Vec<Type>,
        result: Box<Type>,
        this_param: Option<Box<Type>>,
    },
    Class(ClassId),
    Interface(InterfaceId),
    Union(Vec<Type>),
    /// Erased to `any` at IR time unless the call site is monomorphic and
    /// the resolver can specialize it (spec.md §4.2). This rewrite does not
    /// implement monomorphization — see `DESIGN.md`'s Open Question
    /// resolution — so every `GenericParam` behaves as `any` from
    /// `is_assignable` onward.
    GenericParam(String),
}

impl Type {
    pub fn is_any(&self) -> bool {
        matches!(self, Type::Any | Type::GenericParam(_))
    }

    /// Optional members widen to `T | undefined` (spec.md §4.2).
    fn widened_optional(self) -> Type {
        match self {
            Type::Union(mut variants) => {
                if !variants.contains(&Type::Undefined) {
                    variants.push(Type::Undefined);
                }
                Type::Union(variants)
            }
            other => Type::Union(vec![other, Type::Undefined]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberOrigin {
    Own,
    Inherited,
    Overridden,
}

#[derive(Debug, Clone)]
pub struct Member {
    pub name: String,
    pub kind: MemberKind,
    pub ty: Type,
    pub origin: MemberOrigin,
    pub readonly: bool,
}

/// Own + inherited fields in layout order (spec.md §3 Object layout: "A
/// subclass extends the slot layout of its parent without reordering").
#[derive(Debug, Clone, Default)]
pub struct InstanceMeta {
    pub fields: Vec<Member>,
}

impl InstanceMeta {
    pub fn slot_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|m| m.name == name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClassMeta {
    pub static_fields: Vec<Member>,
    pub static_methods: Vec<Member>,
}

#[derive(Debug, Clone)]
pub struct MethodSlot {
    pub name: String,
    /// Index of the function in `vtable` order; subclass vtables extend the
    /// parent's by appending new slots and overwriting overridden ones
    /// (spec.md Glossary, Vtable).
    pub slot: usize,
}

#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub name: String,
    pub parent: Option<ClassId>,
    pub members: Vec<Member>,
    pub instance_meta: InstanceMeta,
    pub class_meta: ClassMeta,
    pub vtable: Vec<MethodSlot>,
    pub pos: SourcePos,
}

#[derive(Debug, Clone)]
pub struct InterfaceInfo {
    pub name: String,
    /// Declaration order — preserved because the dispatch record indexes
    /// into it (spec.md §4.2: "Member order is irrelevant to assignability
    /// but *is* preserved in the interface dispatch record").
    pub members: Vec<Member>,
    pub pos: SourcePos,
}

impl InterfaceInfo {
    pub fn member_index(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|m| m.name == name)
    }
}

/// Where an interface-member slot is satisfied on a concrete class:
/// either a plain instance field (read via `struct.get`) or one of the
/// class's vtable method slots (spec.md §4.3 Interface dispatch).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchTarget {
    InstanceSlot(usize),
    MethodSlot(usize),
}

pub type DispatchRecord = Vec<DispatchTarget>;

#[derive(Debug, Default)]
pub struct TypeTables {
    pub classes: Vec<ClassInfo>,
    pub interfaces: Vec<InterfaceInfo>,
    pub dispatch_records: AHashMap<(InterfaceId, ClassId), DispatchRecord>,
    names: AHashMap<String, NamedType>,
}

#[derive(Debug, Clone, Copy)]
enum NamedType {
    Class(ClassId),
    Interface(InterfaceId),
}

impl TypeTables {
    pub fn class(&self, id: ClassId) -> &ClassInfo {
        &self.classes[id.0 as usize]
    }

    pub fn interface(&self, id: InterfaceId) -> &InterfaceInfo {
        &self.interfaces[id.0 as usize]
    }

    pub fn class_named(&self, name: &str) -> Option<ClassId> {
        match self.names.get(name) {
            Some(NamedType::Class(id)) => Some(*id),
            _ => None,
        }
    }

    pub fn resolve_type_expr(&self, expr: &TypeExpr) -> Type {
        match expr {
            TypeExpr::Any => Type::Any,
            TypeExpr::Void => Type::Void,
            TypeExpr::Array(inner) => Type::Array(Box::new(self.resolve_type_expr(inner))),
            TypeExpr::Union(parts) => Type::Union(parts.iter().map(|p| self.resolve_type_expr(p)).collect()),
            TypeExpr::Function { params, result, this_param } => Type::Function {
                params: params.iter().map(|p| self.resolve_type_expr(p)).collect(),
                result: Box::new(self.resolve_type_expr(result)),
                this_param: this_param.as_ref().map(|t| Box::new(self.resolve_type_expr(t))),
            },
            TypeExpr::Named(name) => match name.as_str() {
                "number" => Type::Number,
                "bool" | "boolean" => Type::Bool,
                "string" => Type::String,
                "null" => Type::Null,
                "undefined" => Type::Undefined,
                "void" => Type::Void,
                "any" => Type::Any,
                _ => match self.names.get(name) {
                    Some(NamedType::Class(id)) => Type::Class(*id),
                    Some(NamedType::Interface(id)) => Type::Interface(*id),
                    None => Type::GenericParam(name.clone()),
                },
            },
        }
    }
}

/// Subtyping per spec.md §4.2.
pub fn is_assignable(from: &Type, to: &Type, tables: &TypeTables) -> bool {
    if from.is_any() || to.is_any() {
        return true;
    }
    match (from, to) {
        (a, b) if a == b => true,
        (Type::Null | Type::Undefined, Type::Union(variants)) => variants.iter().any(|v| v == from),
        (_, Type::Union(variants)) => variants.iter().any(|v| is_assignable(from, v, tables)),
        (Type::Union(variants), _) => variants.iter().all(|v| is_assignable(v, to, tables)),
        (Type::Array(a), Type::Array(b)) => is_assignable(a, b, tables),
        (
            Type::Function { params: ps, result: r, .. },
            Type::Function { params: qs, result: s, .. },
        ) => {
            // f: (A1..An) -> R assignable to g: (B1..Bm) -> S iff n <= m,
            // each Bi <: Ai (contravariant), and R <: S (spec.md §4.2).
            ps.len() <= qs.len()
                && ps.iter().zip(qs).all(|(a, b)| is_assignable(b, a, tables))
                && is_assignable(r, s, tables)
        }
        (Type::Class(a), Type::Class(b)) => class_extends(*a, *b, tables),
        (Type::Class(class_id), Type::Interface(iface_id)) => {
            structurally_satisfies(&tables.class(*class_id).members, &tables.interface(*iface_id).members, tables)
        }
        (Type::Interface(a), Type::Interface(b)) => {
            a == b || structurally_satisfies(&tables.interface(*a).members, &tables.interface(*b).members, tables)
        }
        _ => false,
    }
}

fn class_extends(mut from: ClassId, to: ClassId, tables: &TypeTables) -> bool {
    loop {
        if from == to {
            return true;
        }
        match tables.class(from).parent {
            Some(parent) => from = parent,
            None => return false,
        }
    }
}

fn structurally_satisfies(candidate: &[Member], required: &[Member], tables: &TypeTables) -> bool {
    required.iter().all(|req| {
        candidate
            .iter()
            .any(|cand| cand.name == req.name && is_assignable(&cand.ty, &req.ty, tables))
    })
}

struct Resolver<'a> {
    tables: TypeTables,
    bag: DiagnosticBag,
    file: String,
    options: &'a CompileOptions,
}

impl<'a> Resolver<'a> {
    fn install_placeholders(&mut self, items: &[ast::Item]) {
        for item in items {
            match item {
                ast::Item::Class(c) => {
                    let id = ClassId(self.tables.classes.len() as u32);
                    self.tables.classes.push(ClassInfo {
                        name: c.name.clone(),
                        parent: None,
                        members: Vec::new(),
                        instance_meta: InstanceMeta::default(),
                        class_meta: ClassMeta::default(),
                        vtable: Vec::new(),
                        pos: c.pos,
                    });
                    self.tables.names.insert(c.name.clone(), NamedType::Class(id));
                }
                ast::Item::Enum(e) => {
                    let id = ClassId(self.tables.classes.len() as u32);
                    self.tables.classes.push(ClassInfo {
                        name: e.name.clone(),
                        parent: None,
                        members: e
                            .entries
                            .iter()
                            .map(|entry| Member {
                                name: entry.clone(),
                                kind: MemberKind::StaticField,
                                ty: Type::Number,
                                origin: MemberOrigin::Own,
                                readonly: true,
                            })
                            .collect(),
                        instance_meta: InstanceMeta::default(),
                        class_meta: ClassMeta::default(),
                        vtable: Vec::new(),
                        pos: e.pos,
                    });
                    self.tables.names.insert(e.name.clone(), NamedType::Class(id));
                }
                ast::Item::Interface(i) => {
                    if self.options.disable_interface {
                        self.bag.push(Diagnostic::UnsupportedLowering {
                            file: self.file.clone(),
                            pos: i.pos,
                            construct: format!("interface `{}` (interfaces are disabled)", i.name),
                        });
                    }
                    let id = InterfaceId(self.tables.interfaces.len() as u32);
                    self.tables.interfaces.push(InterfaceInfo { name: i.name.clone(), members: Vec::new(), pos: i.pos });
                    self.tables.names.insert(i.name.clone(), NamedType::Interface(id));
                }
                ast::Item::Namespace(ns) => self.install_placeholders(&ns.items),
                ast::Item::Function(_) | ast::Item::Variable(_) | ast::Item::ExportAlias { .. } => {}
            }
        }
    }

    fn fill_members(&mut self, items: &[ast::Item]) {
        for item in items {
            match item {
                ast::Item::Class(c) => self.fill_class(c),
                ast::Item::Interface(i) => self.fill_interface(i),
                ast::Item::Namespace(ns) => self.fill_members(&ns.items),
                _ => {}
            }
        }
    }

    fn fill_class(&mut self, c: &ast::ClassDecl) {
        let id = match self.tables.names.get(&c.name) {
            Some(NamedType::Class(id)) => *id,
            _ => return,
        };
        let parent = c.extends.as_ref().and_then(|name| self.tables.class_named(name));
        if c.extends.is_some() && parent.is_none() {
            self.bag.push(Diagnostic::UnresolvedIdentifier {
                file: self.file.clone(),
                pos: c.pos,
                name: c.extends.clone().unwrap(),
            });
        }

        let mut members = Vec::new();
        let mut static_fields = Vec::new();
        let mut static_methods = Vec::new();
        let mut own_fields = Vec::new();
        let mut own_methods = Vec::new();

        for m in &c.members {
            let mut ty = m
                .declared_type
                .as_ref()
                .map(|t| self.tables.resolve_type_expr(t))
                .unwrap_or(Type::Any);
            if m.optional {
                ty = ty.widened_optional();
            }
            if self.options.disable_any && matches!(ty, Type::Any) {
                self.bag.push(Diagnostic::TypeMismatch {
                    file: self.file.clone(),
                    pos: m.pos,
                    expected: "a static type".into(),
                    found: "any (disabled by CompileOptions::disable_any)".into(),
                });
            }
            let member = Member { name: m.name.clone(), kind: m.kind, ty, origin: MemberOrigin::Own, readonly: m.readonly };
            match m.kind {
                MemberKind::Field => own_fields.push(member.clone()),
                MemberKind::Method | MemberKind::Getter | MemberKind::Setter => own_methods.push(member.clone()),
                MemberKind::StaticField => static_fields.push(member.clone()),
                MemberKind::StaticMethod => static_methods.push(member.clone()),
            }
            members.push(member);
        }

        // Inheritance reordering (spec.md §4.3): parent's slots keep their
        // positions, the subclass's new slots append at the end.
        let mut instance_fields = Vec::new();
        if let Some(parent_id) = parent {
            instance_fields.extend(self.tables.class(parent_id).instance_meta.fields.iter().cloned().map(|mut f| {
                f.origin = MemberOrigin::Inherited;
                f
            }));
        }
        for field in &own_fields {
            if let Some(existing) = instance_fields.iter_mut().find(|f: &&mut Member| f.name == field.name) {
                *existing = Member { origin: MemberOrigin::Overridden, ..field.clone() };
            } else {
                instance_fields.push(field.clone());
            }
        }

        let mut vtable: Vec<MethodSlot> = Vec::new();
        if let Some(parent_id) = parent {
            vtable = self.tables.class(parent_id).vtable.clone();
        }
        for method in &own_methods {
            if let Some(existing) = vtable.iter().find(|s| s.name == method.name) {
                let _ = existing; // overriding keeps the parent's slot index
            } else {
                vtable.push(MethodSlot { name: method.name.clone(), slot: vtable.len() });
            }
        }

        let info = &mut self.tables.classes[id.0 as usize];
        info.parent = parent;
        info.members = members;
        info.instance_meta = InstanceMeta { fields: instance_fields };
        info.class_meta = ClassMeta { static_fields, static_methods };
        info.vtable = vtable;
    }

    fn fill_interface(&mut self, i: &ast::InterfaceDecl) {
        let id = match self.tables.names.get(&i.name) {
            Some(NamedType::Interface(id)) => *id,
            _ => return,
        };
        let members = i
            .members
            .iter()
            .map(|m| {
                let mut ty = self.tables.resolve_type_expr(&m.ty);
                if m.optional {
                    ty = ty.widened_optional();
                }
                Member { name: m.name.clone(), kind: m.kind, ty, origin: MemberOrigin::Own, readonly: false }
            })
            .collect();
        self.tables.interfaces[id.0 as usize].members = members;
    }

    fn build_dispatch_records(&mut self) {
        for iface_idx in 0..self.tables.interfaces.len() {
            let iface_id = InterfaceId(iface_idx as u32);
            for class_idx in 0..self.tables.classes.len() {
                let class_id = ClassId(class_idx as u32);
                if !is_assignable(&Type::Class(class_id), &Type::Interface(iface_id), &self.tables) {
                    continue;
                }
                let iface = self.tables.interface(iface_id).clone();
                let class = self.tables.class(class_id).clone();
                let mut record = DispatchRecord::new();
                for member in &iface.members {
                    let target = match member.kind {
                        MemberKind::Field | MemberKind::Getter | MemberKind::Setter => class
                            .instance_meta
                            .slot_of(&member.name)
                            .map(DispatchTarget::InstanceSlot)
                            .unwrap_or_else(|| {
                                // a getter/setter-only member with no backing
                                // field is satisfied via the vtable instead
                                class
                                    .vtable
                                    .iter()
                                    .find(|s| s.name == member.name)
                                    .map(|s| DispatchTarget::MethodSlot(s.slot))
                                    .expect("structural check guaranteed a match")
                            }),
                        MemberKind::Method => class
                            .vtable
                            .iter()
                            .find(|s| s.name == member.name)
                            .map(|s| DispatchTarget::MethodSlot(s.slot))
                            .expect("structural check guaranteed a match"),
                        MemberKind::StaticField | MemberKind::StaticMethod => continue,
                    };
                    record.push(target);
                }
                self.tables.dispatch_records.insert((iface_id, class_id), record);
            }
        }
    }
}

/// Runs the type resolver over every module, producing the filled
/// [`TypeTables`]. Does not yet type-check statement/expression bodies in
/// detail beyond member declarations — per-expression typing happens in
/// [`crate::ir`], which consults these tables while lowering (spec.md's
/// three subsystems are "tightly coupled" by design, see spec.md §1).
pub fn resolve_types(modules: &[Module], _scopes: &ScopeTree, options: &CompileOptions) -> Result<TypeTables, Vec<Diagnostic>> {
    log::debug!("type pass: resolving {} module(s)", modules.len());
    let mut resolver = Resolver { tables: TypeTables::default(), bag: DiagnosticBag::new(), file: String::new(), options };

    for module in modules {
        resolver.file = module.file.clone();
        resolver.install_placeholders(&module.items);
    }
    for module in modules {
        resolver.file = module.file.clone();
        resolver.fill_members(&module.items);
    }
    resolver.build_dispatch_records();

    log::debug!(
        "type pass: {} class(es), {} interface(s)",
        resolver.tables.classes.len(),
        resolver.tables.interfaces.len()
    );
    resolver.bag.into_result(resolver.tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ClassDecl, InterfaceDecl, InterfaceMember, Item, MemberDecl, Module};
    use crate::scope::build_scopes;

    fn opts() -> CompileOptions {
        CompileOptions::default()
    }

    #[test]
    fn interface_assignability_ignores_member_order() {
        let module = Module {
            file: "a.ovd".into(),
            items: vec![
                Item::Interface(InterfaceDecl {
                    name: "I".into(),
                    members: vec![
                        InterfaceMember { name: "x".into(), kind: MemberKind::Field, ty: TypeExpr::Named("number".into()), optional: false, pos: SourcePos::default() },
                        InterfaceMember { name: "y".into(), kind: MemberKind::Field, ty: TypeExpr::Named("bool".into()), optional: false, pos: SourcePos::default() },
                    ],
                    pos: SourcePos::default(),
                }),
                Item::Class(ClassDecl {
                    name: "Foo".into(),
                    type_params: vec![],
                    extends: None,
                    implements: vec![],
                    members: vec![
                        MemberDecl { name: "y".into(), kind: MemberKind::Field, declared_type: Some(TypeExpr::Named("bool".into())), optional: false, readonly: false, params: vec![], body: None, init: None, pos: SourcePos::default() },
                        MemberDecl { name: "z".into(), kind: MemberKind::Field, declared_type: Some(TypeExpr::Named("string".into())), optional: false, readonly: false, params: vec![], body: None, init: None, pos: SourcePos::default() },
                        MemberDecl { name: "x".into(), kind: MemberKind::Field, declared_type: Some(TypeExpr::Named("number".into())), optional: false, readonly: false, params: vec![], body: None, init: None, pos: SourcePos::default() },
                    ],
                    pos: SourcePos::default(),
                }),
            ],
        };
        let scopes = build_scopes(std::slice::from_ref(&module)).unwrap();
        let tables = resolve_types(std::slice::from_ref(&module), &scopes, &opts()).unwrap();
        let class_id = tables.class_named("Foo").unwrap();
        let iface_id = match tables.names.get("I").unwrap() {
            NamedType::Interface(id) => *id,
            _ => panic!("I should resolve to an interface"),
        };
        assert!(is_assignable(&Type::Class(class_id), &Type::Interface(iface_id), &tables));
        let record = &tables.dispatch_records[&(iface_id, class_id)];
        assert_eq!(record.len(), 2);
        assert_eq!(record[0], DispatchTarget::InstanceSlot(tables.class(class_id).instance_meta.slot_of("x").unwrap()));
    }

    #[test]
    fn subclass_layout_extends_parent_byte_for_byte() {
        let module = Module {
            file: "a.ovd".into(),
            items: vec![
                Item::Class(ClassDecl {
                    name: "A".into(),
                    type_params: vec![],
                    extends: None,
                    implements: vec![],
                    members: vec![MemberDecl { name: "a".into(), kind: MemberKind::Field, declared_type: Some(TypeExpr::Named("number".into())), optional: false, readonly: false, params: vec![], body: None, init: None, pos: SourcePos::default() }],
                    pos: SourcePos::default(),
                }),
                Item::Class(ClassDecl {
                    name: "B".into(),
                    type_params: vec![],
                    extends: Some("A".into()),
                    implements: vec![],
                    members: vec![MemberDecl { name: "b".into(), kind: MemberKind::Field, declared_type: Some(TypeExpr::Named("number".into())), optional: false, readonly: false, params: vec![], body: None, init: None, pos: SourcePos::default() }],
                    pos: SourcePos::default(),
                }),
            ],
        };
        let scopes = build_scopes(std::slice::from_ref(&module)).unwrap();
        let tables = resolve_types(std::slice::from_ref(&module), &scopes, &opts()).unwrap();
        let a = tables.class_named("A").unwrap();
        let b = tables.class_named("B").unwrap();
        assert_eq!(tables.class(b).instance_meta.fields[0].name, tables.class(a).instance_meta.fields[0].name);
        assert_eq!(tables.class(b).instance_meta.fields.len(), 2);
    }
}
