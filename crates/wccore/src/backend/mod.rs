//! Backend entry point — spec.md §4.4.
//!
//! `emit` is the only thing [`crate::session::compile`] calls; everything
//! else in this module tree is private plumbing reached only from here.
//! The three passes run in a fixed order because each one's output is an
//! input the next can't do without: [`types::build`] decides every GC/
//! function type index the module will use, [`layout::build`] lays out the
//! string pool and shadow stack in linear memory, and [`codegen::Codegen`]
//! turns one [`crate::ir::node::IrFunction`] at a time into a
//! `wasm_encoder::Function` using both of those as a fixed reference frame.
//!
//! Index bookkeeping that doesn't belong to any one function — the shared
//! function table, class vtables, interface dispatch records, the
//! synthetic `~start` — is decided once here rather than inside `codegen`,
//! so a per-function translator never has to guess at a number owned by
//! the whole module.

pub mod builtins;
mod codegen;
mod layout;
mod types;

use ahash::AHashMap;
use wasm_encoder::{
    AbstractHeapType, CodeSection, CompositeType, ConstExpr, DataSection, ElementSection, Elements, EntityType, ExportKind, ExportSection,
    FuncType as WasmFuncType, FunctionSection, GlobalSection, GlobalType, HeapType, ImportSection, Instruction, MemorySection, MemoryType,
    Module as WasmModule, RefType, SubType, TableSection, TableType, ValType,
};

use crate::diagnostics::{Diagnostic, SourcePos};
use crate::ir::{FunctionId, IrExpr, IrFunction, IrModule, IrStmt};
use crate::runtime_abi::all_imports;
use crate::session::CompileOptions;
use crate::types::{ClassId, DispatchTarget, InterfaceId, TypeTables};

use codegen::{Codegen, FunctionIndex};
use types::{abi_val_type, anyref, concrete_ref, externref};

/// Bytes reserved before the string-literal data pool (mirrors
/// `backend::layout`'s own `DATA_POOL_OFFSET`; the two have to agree since
/// `layout::build`'s string offsets are computed relative to it).
const DATA_POOL_OFFSET: u32 = 8;

pub fn emit(module: &IrModule, tables: &TypeTables, options: &CompileOptions) -> Result<Vec<u8>, Vec<Diagnostic>> {
    log::info!("backend: emitting {} function(s), {} class(es), {} interface(s)", module.functions.len(), tables.classes.len(), tables.interfaces.len());

    let mut reg = types::build(tables, module);
    let layout = layout::build(module);

    // ---- imports: libdyntype/libdstructdyn always, builtIn when enabled ---
    let used_builtins: &[builtins::BuiltinSignature] = if options.disable_built_in { &[] } else { builtins::ALL };
    let mut next_type = *reg.abi_func_types.last().expect("all_imports() is never empty") + 1;
    let mut builtin_type_of: AHashMap<&str, u32> = AHashMap::new();
    let mut builtin_subtypes = Vec::with_capacity(used_builtins.len());
    for sig in used_builtins {
        let params: Vec<ValType> = sig.params.iter().map(|p| abi_val_type(*p)).collect();
        let results: Vec<ValType> = sig.result.map(|r| vec![abi_val_type(r)]).unwrap_or_default();
        builtin_subtypes.push(SubType { is_final: true, supertype_idx: None, composite_type: CompositeType::Func(WasmFuncType::new(params, results)) });
        builtin_type_of.insert(sig.name, next_type);
        next_type += 1;
    }
    if !builtin_subtypes.is_empty() {
        reg.section.ty().rec(builtin_subtypes);
    }

    let abi_sigs: Vec<_> = all_imports().collect();
    let mut imports = ImportSection::new();
    for (i, sig) in abi_sigs.iter().enumerate() {
        imports.import(sig.module, sig.name, EntityType::Function(reg.abi_func_types[i]));
    }
    for sig in used_builtins {
        imports.import("builtIn", sig.name, EntityType::Function(builtin_type_of[sig.name]));
    }
    let import_count = abi_sigs.len() as u32 + used_builtins.len() as u32;

    // Positions fixed by `runtime_abi::DYNTYPE_IMPORTS`/`STRUCT_DYN_IMPORTS`'s
    // declaration order (`all_imports`'s own stability test pins this).
    let new_number_fn = 0;
    let new_bool_fn = 1;
    let new_string_fn = 2;
    let to_number_fn = 8;
    let to_bool_fn = 9;
    let check_tag_fn = 12;
    let get_property_fn = 13;
    let set_property_fn = 14;
    let invoke_fn = 15;

    // ---- function-table index assignment -----------------------------
    // Function index space and `call_indirect` table index space are kept
    // identical throughout this backend (spec.md §4.4 "table... growable in
    // fixed deltas"): every function, imported or not, lands in the shared
    // table at exactly its function index, so a vtable/dispatch-record cell
    // only ever needs to remember one number.
    let fn_base = import_count;
    let function_index = FunctionIndex { of: (0..module.functions.len() as u32).map(|i| fn_base + i).collect(), base: fn_base };
    let start_fn_index = fn_base + module.functions.len() as u32;
    let mut next_fn = start_fn_index + 1;

    // Dispatch-record keys are walked in a fixed order from here on so that
    // thunk/table/global index assignment — and therefore the emitted
    // binary — is deterministic across runs (spec.md §8).
    let mut dispatch_keys: Vec<(InterfaceId, ClassId)> = tables.dispatch_records.keys().copied().collect();
    dispatch_keys.sort_by_key(|(iface, class)| (iface.0, class.0));

    let mut getter_thunk_of: AHashMap<(ClassId, usize), u32> = AHashMap::new();
    let mut setter_thunk_of: AHashMap<(ClassId, usize), u32> = AHashMap::new();
    // (table index, is_setter, class, field slot), in assignment order.
    let mut thunks: Vec<(u32, bool, ClassId, usize)> = Vec::new();
    for &(iface_id, class_id) in &dispatch_keys {
        for target in &tables.dispatch_records[&(iface_id, class_id)] {
            if let DispatchTarget::InstanceSlot(slot) = *target {
                getter_thunk_of.entry((class_id, slot)).or_insert_with(|| {
                    let idx = next_fn;
                    next_fn += 1;
                    thunks.push((idx, false, class_id, slot));
                    idx
                });
                setter_thunk_of.entry((class_id, slot)).or_insert_with(|| {
                    let idx = next_fn;
                    next_fn += 1;
                    thunks.push((idx, true, class_id, slot));
                    idx
                });
            }
        }
    }
    let total_functions = next_fn;

    // ---- global index assignment ---------------------------------------
    // Static-field globals occupy `0..module.globals.len()` verbatim —
    // `IrExpr::GlobalGet`/`GlobalSet` were lowered against that assumption
    // (spec.md §4.3 Static fields), so nothing else may be interleaved
    // among them.
    let static_global_count = module.globals.len() as u32;
    let ctx_global = static_global_count;
    let data_end_global = ctx_global + 1;
    let stack_pointer_global = ctx_global + 2;
    let heap_base_global = ctx_global + 3;
    let mut next_global = ctx_global + 4;

    let mut vtable_globals: AHashMap<ClassId, u32> = AHashMap::new();
    for idx in 0..tables.classes.len() {
        vtable_globals.insert(ClassId(idx as u32), next_global);
        next_global += 1;
    }
    let mut dispatch_record_globals: AHashMap<(ClassId, InterfaceId), u32> = AHashMap::new();
    for &(iface_id, class_id) in &dispatch_keys {
        dispatch_record_globals.insert((class_id, iface_id), next_global);
        next_global += 1;
    }

    // ---- per-function codegen -------------------------------------------
    let codegen = Codegen {
        tables,
        module,
        reg: &reg,
        layout: &layout,
        functions: &function_index,
        new_string_fn,
        get_property_fn,
        set_property_fn,
        invoke_fn,
        check_tag_fn,
        to_number_fn,
        to_bool_fn,
        new_number_fn,
        new_bool_fn,
        ctx_global,
        vtable_globals: &vtable_globals,
        dispatch_record_globals: &dispatch_record_globals,
    };

    let mut functions_section = FunctionSection::new();
    let mut code = CodeSection::new();
    let mut exports = ExportSection::new();

    for (idx, f) in module.functions.iter().enumerate() {
        let arity = f.param_count + u32::from(f.takes_this) + u32::from(f.takes_parent_env);
        let shape = *reg.call_shape.get(&arity).ok_or_else(|| {
            vec![Diagnostic::BackendInvariantViolated { message: format!("no call_shape registered for arity {arity} (function `{}`)", f.name) }]
        })?;
        functions_section.function(shape);
        code.function(&codegen.compile(f, Some(FunctionId(idx as u32))));
    }

    // `~start` chains every static initializer in declaration order
    // (spec.md §4.4, §4.3 "static-initializer side effects happen exactly
    // once in declaration order"); `ir::lower` only assigns indices to the
    // globals themselves, so the function that actually runs them is
    // synthesized here rather than carried in the IR.
    let mut start_body: Vec<IrStmt> = module.globals.iter().enumerate().map(|(i, g)| IrStmt::Expr(IrExpr::GlobalSet(i as u32, Box::new(g.init.clone())))).collect();
    start_body.push(IrStmt::Return(None));
    let start_function = IrFunction {
        name: "~start".to_owned(),
        param_count: 0,
        locals: Vec::new(),
        env_layout: None,
        takes_parent_env: false,
        takes_this: false,
        body: start_body,
        pos: SourcePos::default(),
    };
    functions_section.function(reg.call_shape[&0]);
    code.function(&codegen.compile(&start_function, None));
    exports.export("~start", ExportKind::Func, start_fn_index);

    // Thunks were pushed to `thunks` in table-index order as they were
    // discovered above, so emitting them in that same order here lines up
    // function-section/code-section position with the table index each one
    // was promised (`table_idx` itself is never read again: it's already
    // baked into `getter_thunk_of`/`setter_thunk_of`, which the dispatch
    // record globals below read from).
    for (_table_idx, is_setter, class, slot) in &thunks {
        let f = if *is_setter { codegen.build_instance_setter_thunk(*class, *slot) } else { codegen.build_instance_getter_thunk(*class, *slot) };
        functions_section.function(reg.call_shape[&if *is_setter { 2 } else { 1 }]);
        code.function(&f);
    }

    // ---- globals section --------------------------------------------------
    let mut globals_section = GlobalSection::new();
    for _ in &module.globals {
        globals_section.global(
            GlobalType { val_type: anyref(), mutable: true, shared: false },
            &ConstExpr::ref_null(HeapType::Abstract { shared: false, ty: AbstractHeapType::Any }),
        );
    }
    globals_section.global(
        GlobalType { val_type: externref(), mutable: true, shared: false },
        &ConstExpr::ref_null(HeapType::Abstract { shared: false, ty: AbstractHeapType::Extern }),
    );
    globals_section.global(GlobalType { val_type: ValType::I32, mutable: false, shared: false }, &ConstExpr::i32_const(layout.data_end as i32));
    globals_section.global(GlobalType { val_type: ValType::I32, mutable: true, shared: false }, &ConstExpr::i32_const(layout.stack_pointer as i32));
    globals_section.global(GlobalType { val_type: ValType::I32, mutable: false, shared: false }, &ConstExpr::i32_const(layout.heap_base as i32));

    for idx in 0..tables.classes.len() {
        let class_id = ClassId(idx as u32);
        let ir_class = &module.classes[idx];
        let slot_values: Vec<u32> = tables
            .class(class_id)
            .vtable
            .iter()
            .enumerate()
            .map(|(slot_i, _)| ir_class.vtable_functions.get(slot_i).copied().flatten().map(|fid| function_index.func(fid)).unwrap_or(0))
            .collect();
        globals_section.global(GlobalType { val_type: concrete_ref(reg.vtable_array), mutable: false, shared: false }, &fixed_i32_array_expr(reg.vtable_array, &slot_values));
    }

    for &(iface_id, class_id) in &dispatch_keys {
        let record = &tables.dispatch_records[&(iface_id, class_id)];
        let mut cells = vec![0u32; record.len() * 2];
        for (member_i, target) in record.iter().enumerate() {
            match *target {
                DispatchTarget::InstanceSlot(slot) => {
                    cells[member_i * 2] = getter_thunk_of[&(class_id, slot)];
                    cells[member_i * 2 + 1] = setter_thunk_of[&(class_id, slot)];
                }
                DispatchTarget::MethodSlot(vtable_slot) => {
                    let fid = module.classes[class_id.0 as usize].vtable_functions.get(vtable_slot).copied().flatten();
                    cells[member_i * 2] = fid.map(|id| function_index.func(id)).unwrap_or(0);
                    // No setter wrapper is synthesized for a property member
                    // satisfied by a dedicated vtable method rather than a
                    // backing field (`DispatchTarget::MethodSlot` only ever
                    // names one slot); writing such a member through an
                    // interface view is narrower than the field-backed case
                    // and left unresolved here, see DESIGN.md.
                    cells[member_i * 2 + 1] = 0;
                }
            }
        }
        globals_section.global(GlobalType { val_type: concrete_ref(reg.vtable_array), mutable: false, shared: false }, &fixed_i32_array_expr(reg.vtable_array, &cells));
    }

    // ---- table + elements ------------------------------------------------
    let mut table_section = TableSection::new();
    table_section.table(TableType { element_type: RefType::FUNCREF, minimum: total_functions as u64, maximum: None, table64: false, shared: false });

    let mut elements = ElementSection::new();
    let table_contents: Vec<u32> = (0..total_functions).collect();
    elements.active(Some(0), &ConstExpr::i32_const(0), Elements::Functions((&table_contents[..]).into()));

    // ---- memory + data ----------------------------------------------------
    let mut memory_section = MemorySection::new();
    memory_section.memory(MemoryType { minimum: 1, maximum: None, memory64: false, shared: false, page_size_log2: None });
    exports.export("memory", ExportKind::Memory, 0);
    exports.export("__data_end", ExportKind::Global, data_end_global);
    exports.export("__stack_pointer", ExportKind::Global, stack_pointer_global);
    exports.export("__heap_base", ExportKind::Global, heap_base_global);

    let mut data_section = DataSection::new();
    data_section.active(0, &ConstExpr::i32_const(DATA_POOL_OFFSET as i32), layout.data.iter().copied());

    // ---- assemble -----------------------------------------------------
    let mut out = WasmModule::new();
    out.section(&reg.section);
    out.section(&imports);
    out.section(&functions_section);
    out.section(&table_section);
    out.section(&memory_section);
    out.section(&globals_section);
    out.section(&exports);
    out.section(&elements);
    out.section(&code);
    out.section(&data_section);

    let binary = out.finish();
    log::debug!(
        "backend: {} global(s) ({} static, {} vtable/dispatch), {} table entries, {} byte(s) emitted",
        next_global,
        static_global_count,
        vtable_globals.len() + dispatch_record_globals.len(),
        total_functions,
        binary.len()
    );
    Ok(binary)
}

/// A const-expr that pushes every value in `values` as an `i32.const` and
/// closes with `array.new_fixed` against `array_type` — every vtable and
/// dispatch record is exactly this shape, a fixed-length `(array (mut
/// i32))` known in full at module-build time (spec.md §4.2 Vtable /
/// Dispatch record).
fn fixed_i32_array_expr(array_type: u32, values: &[u32]) -> ConstExpr {
    let mut insns: Vec<Instruction<'static>> = values.iter().map(|v| Instruction::I32Const(*v as i32)).collect();
    insns.push(Instruction::ArrayNewFixed { array_type_index: array_type, array_size: values.len() as u32 });
    ConstExpr::extended(insns)
}
