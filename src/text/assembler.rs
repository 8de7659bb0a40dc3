//! Lowers parsed S-expressions to a [`WasmFile`].
//!
//! Symbolic identifiers are resolved through one symbol table per index
//! space, folded instructions are flattened, and the inline
//! import/export/data abbreviations are expanded. All problems are
//! reported to the [`Diagnostics`] sink; a module is only produced when
//! no error was emitted.

use super::float::{FloatLiteral, FloatLiteralKind};
use super::lexer::{Span, Token};
use super::sexpr::SExpr;
use crate::elements::{
    CodeSection, DataSection, DataSegment, ElementSection, ElementSegment, ExportEntry,
    ExportSection, External, FuncBody, FunctionSection, GlobalEntry, GlobalSection, ImportEntry,
    ImportSection, InitExpr, Internal, LocalEntry, MemorySection, NameSection, Section,
    StartSection, TableSection, TypeSection, WasmFile,
};
use crate::ops::{self, BrTableData, Instruction, MemArg};
use crate::types::{
    BlockType, FunctionType, GlobalType, MemoryType, ResizableLimits, TableType, ValueType,
};
use crate::Error;
use num_bigint::BigUint;
use num_traits::ToPrimitive;
use std::collections::HashMap;

/// Severity of a diagnostic.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Severity {
    /// Assembly continues, output is still produced.
    Warning,
    /// Assembly continues to find more problems, but no module is
    /// produced.
    Error,
}

/// A single assembler message with its source position.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    /// How bad it is.
    pub severity: Severity,
    /// Where it happened.
    pub span: Span,
    /// What happened.
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{}: {}: {}", self.span, severity, self.message)
    }
}

/// Collects assembler diagnostics and forwards them to the `log` facade.
#[derive(Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Creates an empty sink.
    pub fn new() -> Diagnostics {
        Diagnostics::default()
    }

    /// Records an error.
    pub fn error<M: Into<String>>(&mut self, span: Span, message: M) {
        let diagnostic = Diagnostic {
            severity: Severity::Error,
            span,
            message: message.into(),
        };
        log::debug!("assembler: {}", diagnostic);
        self.entries.push(diagnostic);
    }

    /// Records a warning.
    pub fn warning<M: Into<String>>(&mut self, span: Span, message: M) {
        let diagnostic = Diagnostic {
            severity: Severity::Warning,
            span,
            message: message.into(),
        };
        log::debug!("assembler: {}", diagnostic);
        self.entries.push(diagnostic);
    }

    /// Whether any error-severity diagnostic was recorded.
    pub fn has_errors(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.severity == Severity::Error)
    }

    /// All recorded diagnostics.
    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Collapses the recorded errors into a single [`Error`].
    pub fn to_error(&self) -> Error {
        let rendered: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.severity == Severity::Error)
            .map(|entry| entry.to_string())
            .collect();
        if rendered.is_empty() {
            Error::TextFormat("assembly failed".into())
        } else {
            Error::TextFormat(rendered.join("\n"))
        }
    }
}

lazy_static::lazy_static! {
    /// Post-MVP mnemonic spellings mapped back to the canonical ones.
    static ref RENAMED_MNEMONICS: HashMap<&'static str, &'static str> = {
        let renames = [
            ("local.get", "get_local"),
            ("local.set", "set_local"),
            ("local.tee", "tee_local"),
            ("global.get", "get_global"),
            ("global.set", "set_global"),
            ("memory.size", "current_memory"),
            ("memory.grow", "grow_memory"),
            ("i32.wrap_i64", "i32.wrap/i64"),
            ("i32.trunc_f32_s", "i32.trunc_s/f32"),
            ("i32.trunc_f32_u", "i32.trunc_u/f32"),
            ("i32.trunc_f64_s", "i32.trunc_s/f64"),
            ("i32.trunc_f64_u", "i32.trunc_u/f64"),
            ("i64.extend_i32_s", "i64.extend_s/i32"),
            ("i64.extend_i32_u", "i64.extend_u/i32"),
            ("i64.trunc_f32_s", "i64.trunc_s/f32"),
            ("i64.trunc_f32_u", "i64.trunc_u/f32"),
            ("i64.trunc_f64_s", "i64.trunc_s/f64"),
            ("i64.trunc_f64_u", "i64.trunc_u/f64"),
            ("f32.convert_i32_s", "f32.convert_s/i32"),
            ("f32.convert_i32_u", "f32.convert_u/i32"),
            ("f32.convert_i64_s", "f32.convert_s/i64"),
            ("f32.convert_i64_u", "f32.convert_u/i64"),
            ("f32.demote_f64", "f32.demote/f64"),
            ("f64.convert_i32_s", "f64.convert_s/i32"),
            ("f64.convert_i32_u", "f64.convert_u/i32"),
            ("f64.convert_i64_s", "f64.convert_s/i64"),
            ("f64.convert_i64_u", "f64.convert_u/i64"),
            ("f64.promote_f32", "f64.promote/f32"),
            ("i32.reinterpret_f32", "i32.reinterpret/f32"),
            ("i64.reinterpret_f64", "i64.reinterpret/f64"),
            ("f32.reinterpret_i32", "f32.reinterpret/i32"),
            ("f64.reinterpret_i64", "f64.reinterpret/i64"),
        ];
        renames.iter().copied().collect()
    };
}

/// Renames of post-MVP mnemonic spellings back to the canonical ones.
fn canonical_mnemonic(keyword: &str) -> &str {
    RENAMED_MNEMONICS
        .get(keyword)
        .copied()
        .unwrap_or(keyword)
}

fn value_type_from_keyword(keyword: &str) -> Option<ValueType> {
    match keyword {
        "i32" => Some(ValueType::I32),
        "i64" => Some(ValueType::I64),
        "f32" => Some(ValueType::F32),
        "f64" => Some(ValueType::F64),
        _ => None,
    }
}

/// One symbol table per namespace.
#[derive(Default)]
struct SymbolTables {
    types: HashMap<String, u32>,
    funcs: HashMap<String, u32>,
    tables: HashMap<String, u32>,
    memories: HashMap<String, u32>,
    globals: HashMap<String, u32>,
}

/// Per-function assembly state.
struct FuncContext {
    local_names: HashMap<String, u32>,
    local_count: u32,
    /// Innermost label last; anonymous labels are `None`.
    labels: Vec<Option<String>>,
}

impl FuncContext {
    fn new() -> FuncContext {
        FuncContext {
            local_names: HashMap::new(),
            local_count: 0,
            labels: Vec::new(),
        }
    }

    fn label_depth(&self, name: &str) -> Option<u32> {
        self.labels
            .iter()
            .rev()
            .position(|label| label.as_deref() == Some(name))
            .map(|depth| depth as u32)
    }
}

struct Assembler<'d> {
    diagnostics: &'d mut Diagnostics,
    symbols: SymbolTables,
    types: Vec<FunctionType>,
    imports: Vec<ImportEntry>,
    func_type_indices: Vec<u32>,
    bodies: Vec<FuncBody>,
    tables: Vec<TableType>,
    memories: Vec<MemoryType>,
    globals: Vec<GlobalEntry>,
    exports: Vec<ExportEntry>,
    start: Option<u32>,
    elements: Vec<ElementSegment>,
    data: Vec<DataSegment>,
    module_name: Option<String>,
    imported_funcs: u32,
    imported_tables: u32,
    imported_memories: u32,
    imported_globals: u32,
}

/// Assembles a `(module …)` form. Returns `None` (with diagnostics
/// recorded) if any error was encountered; no partial modules are
/// produced.
pub fn assemble_module(module: &SExpr, diagnostics: &mut Diagnostics) -> Option<WasmFile> {
    let Some(fields) = module.as_list_of("module") else {
        diagnostics.error(module.span(), "expected a (module …) form");
        return None;
    };

    let (module_name, fields) = match fields.first() {
        Some(SExpr::Atom(located)) => match &located.token {
            Token::Identifier(name) => (Some(name.clone()), &fields[1..]),
            _ => {
                diagnostics.error(located.span, "expected a module name or fields");
                return None;
            }
        },
        _ => (None, fields),
    };

    assemble_fields_with_name(fields, module_name, diagnostics)
}

/// Assembles a bare field list, as found in an inline module.
pub fn assemble_fields(fields: &[SExpr], diagnostics: &mut Diagnostics) -> Option<WasmFile> {
    assemble_fields_with_name(fields, None, diagnostics)
}

fn assemble_fields_with_name(
    fields: &[SExpr],
    module_name: Option<String>,
    diagnostics: &mut Diagnostics,
) -> Option<WasmFile> {
    let mut assembler = Assembler {
        diagnostics,
        symbols: SymbolTables::default(),
        types: Vec::new(),
        imports: Vec::new(),
        func_type_indices: Vec::new(),
        bodies: Vec::new(),
        tables: Vec::new(),
        memories: Vec::new(),
        globals: Vec::new(),
        exports: Vec::new(),
        start: None,
        elements: Vec::new(),
        data: Vec::new(),
        module_name,
        imported_funcs: 0,
        imported_tables: 0,
        imported_memories: 0,
        imported_globals: 0,
    };
    assembler.collect_names(fields);
    for field in fields {
        assembler.assemble_field(field);
    }
    if assembler.diagnostics.has_errors() {
        return None;
    }
    Some(assembler.into_file())
}

impl<'d> Assembler<'d> {
    // ----- pass 1: symbol tables --------------------------------------

    /// Walks the fields once to fill the symbol tables, so bodies can
    /// refer to entities defined later. Imports always occupy the low
    /// indices of their space.
    fn collect_names(&mut self, fields: &[SExpr]) {
        let mut imported = [0u32; 4];
        let mut defined = [0u32; 4];
        let mut imported_names: Vec<(usize, String)> = Vec::new();
        let mut defined_names: Vec<(usize, String, u32)> = Vec::new();
        let mut type_count = 0u32;

        for field in fields {
            let Some(items) = field.as_list() else { continue };
            let Some(head) = items.first().and_then(SExpr::as_keyword) else {
                continue;
            };
            match head {
                // Explicit type definitions are parsed up front: every
                // inline type use appends after them, so the whole list
                // must exist before pass 2 starts.
                "type" => {
                    if let Some(name) = identifier(items.get(1)) {
                        self.symbols.types.insert(name.to_string(), type_count);
                    }
                    type_count += 1;
                    let mut pos = 1;
                    if identifier(items.get(pos)).is_some() {
                        pos += 1;
                    }
                    match items.get(pos).and_then(|item| item.as_list_of("func")) {
                        Some(func_items) => {
                            let func_type =
                                self.parse_function_type(func_items, &mut Vec::new());
                            self.types.push(func_type);
                        }
                        None => {
                            self.diagnostics
                                .error(field.span(), "expected (func …) in type definition");
                            self.types.push(FunctionType::new(vec![], vec![]));
                        }
                    }
                }
                "import" => {
                    // (import "m" "n" (kind $id? …))
                    if let Some(desc) = items.get(3).and_then(SExpr::as_list) {
                        if let Some(space) = desc
                            .first()
                            .and_then(SExpr::as_keyword)
                            .and_then(kind_space)
                        {
                            if let Some(name) = identifier(desc.get(1)) {
                                imported_names.push((space, name.to_string()));
                            }
                            imported[space] += 1;
                        }
                    }
                }
                "func" | "table" | "memory" | "global" => {
                    let space = kind_space(head).expect("matched above");
                    let has_inline_import =
                        items.iter().any(|item| item.is_list_of("import"));
                    if has_inline_import {
                        if let Some(name) = identifier(items.get(1)) {
                            imported_names.push((space, name.to_string()));
                        }
                        imported[space] += 1;
                    } else {
                        if let Some(name) = identifier(items.get(1)) {
                            defined_names.push((space, name.to_string(), defined[space]));
                        }
                        defined[space] += 1;
                    }
                }
                _ => {}
            }
        }

        // Imported entities were pushed in order, so their index is their
        // rank among imports of the same space.
        let mut import_rank = [0u32; 4];
        for (space, name) in imported_names {
            self.space_symbols(space)
                .insert(name, import_rank[space]);
            import_rank[space] += 1;
        }
        for (space, name, rank) in defined_names {
            self.space_symbols(space).insert(name, imported[space] + rank);
        }
    }

    fn space_symbols(&mut self, space: usize) -> &mut HashMap<String, u32> {
        match space {
            0 => &mut self.symbols.funcs,
            1 => &mut self.symbols.tables,
            2 => &mut self.symbols.memories,
            3 => &mut self.symbols.globals,
            _ => unreachable!("there are four index spaces"),
        }
    }

    // ----- pass 2: emission -------------------------------------------

    fn assemble_field(&mut self, field: &SExpr) {
        let Some(items) = field.as_list() else {
            self.diagnostics
                .error(field.span(), "expected a module field");
            return;
        };
        let Some(head) = items.first().and_then(SExpr::as_keyword) else {
            self.diagnostics
                .error(field.span(), "expected a module field keyword");
            return;
        };
        match head {
            // Handled during name collection.
            "type" => {}
            "import" => self.assemble_import(field, &items[1..]),
            "func" => self.assemble_func(field, &items[1..]),
            "table" => self.assemble_table(field, &items[1..]),
            "memory" => self.assemble_memory(field, &items[1..]),
            "global" => self.assemble_global(field, &items[1..]),
            "export" => self.assemble_export(field, &items[1..]),
            "start" => self.assemble_start(field, &items[1..]),
            "elem" => self.assemble_elem(field, &items[1..]),
            "data" => self.assemble_data(field, &items[1..]),
            other => {
                self.diagnostics
                    .error(field.span(), format!("unknown module field `{}`", other));
            }
        }
    }

    fn parse_function_type(
        &mut self,
        items: &[SExpr],
        param_names: &mut Vec<Option<String>>,
    ) -> FunctionType {
        let mut params = Vec::new();
        let mut results = Vec::new();
        for item in items {
            if let Some(param_items) = item.as_list_of("param") {
                self.parse_params(item, param_items, &mut params, param_names);
            } else if let Some(result_items) = item.as_list_of("result") {
                for result in result_items {
                    match result.as_keyword().and_then(value_type_from_keyword) {
                        Some(vt) => results.push(vt),
                        None => self
                            .diagnostics
                            .error(result.span(), "expected a value type"),
                    }
                }
            } else {
                self.diagnostics
                    .error(item.span(), "expected (param …) or (result …)");
            }
        }
        if results.len() > 1 {
            self.diagnostics.error(
                items
                    .first()
                    .map(SExpr::span)
                    .unwrap_or_else(Span::start),
                "a function may return at most one value",
            );
        }
        FunctionType::new(params, results)
    }

    fn parse_params(
        &mut self,
        origin: &SExpr,
        items: &[SExpr],
        params: &mut Vec<ValueType>,
        param_names: &mut Vec<Option<String>>,
    ) {
        // (param $x i32) names exactly one; (param i32 i64 …) names none.
        if let Some(name) = identifier(items.first()) {
            match items.get(1).and_then(|i| {
                i.as_keyword().and_then(value_type_from_keyword)
            }) {
                Some(vt) => {
                    params.push(vt);
                    param_names.push(Some(name.to_string()));
                }
                None => self
                    .diagnostics
                    .error(origin.span(), "expected a value type after parameter name"),
            }
            if items.len() > 2 {
                self.diagnostics
                    .error(origin.span(), "a named parameter declares exactly one type");
            }
            return;
        }
        for item in items {
            match item.as_keyword().and_then(value_type_from_keyword) {
                Some(vt) => {
                    params.push(vt);
                    param_names.push(None);
                }
                None => self.diagnostics.error(item.span(), "expected a value type"),
            }
        }
    }

    /// Resolves a type use: an optional `(type …)` reference and/or
    /// inline `(param …)`/`(result …)` lists, consuming them from the
    /// cursor. Inline-only signatures are matched structurally against
    /// the type list, appending a fresh type when nothing matches.
    fn resolve_type_use(
        &mut self,
        items: &[SExpr],
        pos: &mut usize,
        param_names: &mut Vec<Option<String>>,
    ) -> u32 {
        let mut explicit: Option<u32> = None;
        if let Some(type_items) = items.get(*pos).and_then(|i| i.as_list_of("type")) {
            *pos += 1;
            explicit = self.resolve_space_index(
                type_items.first(),
                items.get(*pos - 1).map(SExpr::span),
                SymbolSpace::Type,
            );
        }

        let inline_start = *pos;
        while items
            .get(*pos)
            .map(|i| i.is_list_of("param") || i.is_list_of("result"))
            .unwrap_or(false)
        {
            *pos += 1;
        }
        let has_inline = *pos > inline_start;
        let inline = if has_inline {
            Some(self.parse_function_type(&items[inline_start..*pos], param_names))
        } else {
            None
        };

        match (explicit, inline) {
            (Some(index), Some(inline)) => {
                if let Some(declared) = self.types.get(index as usize) {
                    if declared != &inline {
                        self.diagnostics.error(
                            items[inline_start].span(),
                            "inline signature disagrees with the referenced type",
                        );
                    }
                }
                index
            }
            (Some(index), None) => {
                // Parameter names come from the declared type's arity.
                if let Some(declared) = self.types.get(index as usize) {
                    param_names.extend(declared.params().iter().map(|_| None));
                }
                index
            }
            (None, inline) => {
                let func_type = inline.unwrap_or_else(|| FunctionType::new(vec![], vec![]));
                self.find_or_add_type(func_type)
            }
        }
    }

    fn find_or_add_type(&mut self, func_type: FunctionType) -> u32 {
        if let Some(index) = self.types.iter().position(|t| t == &func_type) {
            return index as u32;
        }
        self.types.push(func_type);
        (self.types.len() - 1) as u32
    }

    fn assemble_import(&mut self, field: &SExpr, items: &[SExpr]) {
        let (Some(module), Some(name)) = (string(items.first()), string(items.get(1))) else {
            self.diagnostics
                .error(field.span(), "expected module and field names");
            return;
        };
        let Some(desc) = items.get(2).and_then(SExpr::as_list) else {
            self.diagnostics
                .error(field.span(), "expected an import descriptor");
            return;
        };
        let Some(head) = desc.first().and_then(SExpr::as_keyword) else {
            self.diagnostics
                .error(field.span(), "expected an import descriptor keyword");
            return;
        };
        let mut pos = 1;
        if identifier(desc.get(pos)).is_some() {
            pos += 1;
        }
        let external = match head {
            "func" => {
                let type_index = self.resolve_type_use(desc, &mut pos, &mut Vec::new());
                self.imported_funcs += 1;
                External::Function(type_index)
            }
            "table" => match self.parse_table_type(field, desc, &mut pos) {
                Some(table_type) => {
                    self.imported_tables += 1;
                    External::Table(table_type)
                }
                None => return,
            },
            "memory" => match self.parse_limits(field, desc, &mut pos) {
                Some(limits) => {
                    self.imported_memories += 1;
                    External::Memory(MemoryType::new(limits))
                }
                None => return,
            },
            "global" => match self.parse_global_type(field, desc, &mut pos) {
                Some(global_type) => {
                    self.imported_globals += 1;
                    External::Global(global_type)
                }
                None => return,
            },
            other => {
                self.diagnostics
                    .error(field.span(), format!("unknown import kind `{}`", other));
                return;
            }
        };
        self.imports
            .push(ImportEntry::new(module.into(), name.into(), external));
    }

    /// Splits off leading inline `(export "n")` lists and an optional
    /// inline `(import "m" "n")`.
    fn parse_inline_prefixes<'a>(
        &mut self,
        items: &'a [SExpr],
        pos: &mut usize,
        exports: &mut Vec<String>,
    ) -> Option<(&'a str, &'a str)> {
        let mut import = None;
        loop {
            if let Some(export_items) = items.get(*pos).and_then(|i| i.as_list_of("export")) {
                match string(export_items.first()) {
                    Some(name) => exports.push(name.to_string()),
                    None => self
                        .diagnostics
                        .error(items[*pos].span(), "expected an export name"),
                }
                *pos += 1;
                continue;
            }
            if import.is_none() {
                if let Some(import_items) = items.get(*pos).and_then(|i| i.as_list_of("import")) {
                    match (string(import_items.first()), string(import_items.get(1))) {
                        (Some(module), Some(name)) => import = Some((module, name)),
                        _ => self
                            .diagnostics
                            .error(items[*pos].span(), "expected import module and name"),
                    }
                    *pos += 1;
                    continue;
                }
            }
            return import;
        }
    }

    fn push_inline_exports(&mut self, exports: Vec<String>, internal: Internal) {
        for name in exports {
            self.exports.push(ExportEntry::new(name, internal));
        }
    }

    fn assemble_func(&mut self, field: &SExpr, items: &[SExpr]) {
        let mut pos = 0;
        if identifier(items.first()).is_some() {
            pos += 1;
        }
        let mut inline_exports = Vec::new();
        let inline_import = self.parse_inline_prefixes(items, &mut pos, &mut inline_exports);

        let func_index = self.imported_funcs + self.func_type_indices.len() as u32;

        let mut param_names = Vec::new();
        let type_index = self.resolve_type_use(items, &mut pos, &mut param_names);

        if let Some((module, name)) = inline_import {
            if pos != items.len() {
                self.diagnostics
                    .error(field.span(), "an imported function cannot have a body");
            }
            // The inline form (func (import …) …) sorts into the import
            // section; collect_names already accounted for the index.
            self.imports.push(ImportEntry::new(
                module.into(),
                name.into(),
                External::Function(type_index),
            ));
            let index = self.imported_funcs;
            self.imported_funcs += 1;
            self.push_inline_exports(inline_exports, Internal::Function(index));
            return;
        }

        self.push_inline_exports(inline_exports, Internal::Function(func_index));

        let mut context = FuncContext::new();
        for (index, name) in param_names.iter().enumerate() {
            if let Some(name) = name {
                context.local_names.insert(name.clone(), index as u32);
            }
        }
        context.local_count = param_names.len() as u32;

        // Local declarations.
        let mut locals: Vec<LocalEntry> = Vec::new();
        while let Some(local_items) = items.get(pos).and_then(|i| i.as_list_of("local")) {
            let origin = &items[pos];
            pos += 1;
            let mut declared = Vec::new();
            let mut names = Vec::new();
            self.parse_params(origin, local_items, &mut declared, &mut names);
            for (vt, name) in declared.iter().zip(names) {
                if let Some(name) = name {
                    context.local_names.insert(name, context.local_count);
                }
                context.local_count += 1;
                match locals.last_mut() {
                    Some(last) if last.value_type() == *vt => {
                        *last = LocalEntry::new(last.count() + 1, *vt);
                    }
                    _ => locals.push(LocalEntry::new(1, *vt)),
                }
            }
        }

        let mut code = Vec::new();
        self.parse_instr_seq(&items[pos..], &mut context, &mut code);

        self.func_type_indices.push(type_index);
        self.bodies.push(FuncBody::new(locals, code));
    }

    fn assemble_table(&mut self, field: &SExpr, items: &[SExpr]) {
        let mut pos = 0;
        if identifier(items.first()).is_some() {
            pos += 1;
        }
        let mut inline_exports = Vec::new();
        let inline_import = self.parse_inline_prefixes(items, &mut pos, &mut inline_exports);
        let table_index = if inline_import.is_some() {
            self.imported_tables
        } else {
            self.imported_tables + self.tables.len() as u32
        };
        self.push_inline_exports(inline_exports, Internal::Table(table_index));

        // Abbreviation: (table elemtype (elem f g h)) sizes the table to
        // its element list.
        if is_elem_type(items.get(pos)) {
            if let Some(elem_items) = items.get(pos + 1).and_then(|i| i.as_list_of("elem")) {
                let members: Vec<u32> = elem_items
                    .iter()
                    .filter_map(|item| {
                        self.resolve_space_index(
                            Some(item),
                            Some(item.span()),
                            SymbolSpace::Func,
                        )
                    })
                    .collect();
                let size = members.len() as u32;
                self.tables.push(TableType::new(ResizableLimits::new(
                    size,
                    Some(size),
                )));
                self.elements
                    .push(ElementSegment::new(table_index, InitExpr::i32_const(0), members));
                return;
            }
        }

        let Some(table_type) = self.parse_table_type(field, items, &mut pos) else {
            return;
        };
        if let Some((module, name)) = inline_import {
            self.imports.push(ImportEntry::new(
                module.into(),
                name.into(),
                External::Table(table_type),
            ));
            self.imported_tables += 1;
        } else {
            self.tables.push(table_type);
        }
    }

    fn assemble_memory(&mut self, field: &SExpr, items: &[SExpr]) {
        let mut pos = 0;
        if identifier(items.first()).is_some() {
            pos += 1;
        }
        let mut inline_exports = Vec::new();
        let inline_import = self.parse_inline_prefixes(items, &mut pos, &mut inline_exports);
        let memory_index = if inline_import.is_some() {
            self.imported_memories
        } else {
            self.imported_memories + self.memories.len() as u32
        };
        self.push_inline_exports(inline_exports, Internal::Memory(memory_index));

        // Abbreviation: (memory (data "…")) sizes the memory to its data.
        if let Some(data_items) = items.get(pos).and_then(|i| i.as_list_of("data")) {
            let bytes = self.parse_data_strings(data_items);
            let pages = (bytes.len() as u32).div_ceil(65536);
            self.memories.push(MemoryType::new(ResizableLimits::new(
                pages,
                Some(pages),
            )));
            self.data
                .push(DataSegment::new(memory_index, InitExpr::i32_const(0), bytes));
            return;
        }

        let Some(limits) = self.parse_limits(field, items, &mut pos) else {
            return;
        };
        if let Some((module, name)) = inline_import {
            self.imports.push(ImportEntry::new(
                module.into(),
                name.into(),
                External::Memory(MemoryType::new(limits)),
            ));
            self.imported_memories += 1;
        } else {
            self.memories.push(MemoryType::new(limits));
        }
    }

    fn assemble_global(&mut self, field: &SExpr, items: &[SExpr]) {
        let mut pos = 0;
        if identifier(items.first()).is_some() {
            pos += 1;
        }
        let mut inline_exports = Vec::new();
        let inline_import = self.parse_inline_prefixes(items, &mut pos, &mut inline_exports);
        let global_index = if inline_import.is_some() {
            self.imported_globals
        } else {
            self.imported_globals + self.globals.len() as u32
        };
        self.push_inline_exports(inline_exports, Internal::Global(global_index));

        let Some(global_type) = self.parse_global_type(field, items, &mut pos) else {
            return;
        };

        if let Some((module, name)) = inline_import {
            self.imports.push(ImportEntry::new(
                module.into(),
                name.into(),
                External::Global(global_type),
            ));
            self.imported_globals += 1;
            return;
        }

        let mut context = FuncContext::new();
        let mut code = Vec::new();
        self.parse_instr_seq(&items[pos..], &mut context, &mut code);
        self.globals
            .push(GlobalEntry::new(global_type, InitExpr::new(code)));
    }

    fn assemble_export(&mut self, field: &SExpr, items: &[SExpr]) {
        let Some(name) = string(items.first()) else {
            self.diagnostics
                .error(field.span(), "expected an export name");
            return;
        };
        let Some(desc) = items.get(1).and_then(SExpr::as_list) else {
            self.diagnostics
                .error(field.span(), "expected an export descriptor");
            return;
        };
        let Some(head) = desc.first().and_then(SExpr::as_keyword) else {
            self.diagnostics
                .error(field.span(), "expected an export descriptor keyword");
            return;
        };
        let space = match kind_space(head) {
            Some(space) => space,
            None => {
                self.diagnostics
                    .error(field.span(), format!("unknown export kind `{}`", head));
                return;
            }
        };
        let target = desc.get(1);
        let index = match space {
            0 => self.resolve_space_index(target, Some(field.span()), SymbolSpace::Func),
            1 => self.resolve_space_index(target, Some(field.span()), SymbolSpace::Table),
            2 => self.resolve_space_index(target, Some(field.span()), SymbolSpace::Memory),
            _ => self.resolve_space_index(target, Some(field.span()), SymbolSpace::Global),
        };
        let Some(index) = index else { return };
        let internal = match space {
            0 => Internal::Function(index),
            1 => Internal::Table(index),
            2 => Internal::Memory(index),
            _ => Internal::Global(index),
        };
        self.exports.push(ExportEntry::new(name.into(), internal));
    }

    fn assemble_start(&mut self, field: &SExpr, items: &[SExpr]) {
        match self.resolve_space_index(items.first(), Some(field.span()), SymbolSpace::Func) {
            Some(index) => {
                if self.start.is_some() {
                    self.diagnostics
                        .error(field.span(), "multiple start sections");
                }
                self.start = Some(index);
            }
            None => self
                .diagnostics
                .error(field.span(), "expected a start function index"),
        }
    }

    fn parse_offset_expr(&mut self, items: &[SExpr], pos: &mut usize) -> InitExpr {
        let mut code = Vec::new();
        if let Some(offset_items) = items.get(*pos).and_then(|i| i.as_list_of("offset")) {
            let mut context = FuncContext::new();
            self.parse_instr_seq(offset_items, &mut context, &mut code);
            *pos += 1;
        } else if items.get(*pos).and_then(SExpr::as_list).is_some() {
            // A bare folded instruction is an offset abbreviation.
            let mut context = FuncContext::new();
            let item = items[*pos].clone();
            self.parse_instr_seq(std::slice::from_ref(&item), &mut context, &mut code);
            *pos += 1;
        } else {
            self.diagnostics.error(
                items
                    .get(*pos)
                    .map(SExpr::span)
                    .unwrap_or_else(Span::start),
                "expected an offset expression",
            );
        }
        InitExpr::new(code)
    }

    fn assemble_elem(&mut self, _field: &SExpr, items: &[SExpr]) {
        let mut pos = 0;
        // Optional table index.
        let table_index = match items.first() {
            Some(item @ SExpr::Atom(_)) if !item.is_list_of("offset") => {
                match self.resolve_space_index(Some(item), Some(item.span()), SymbolSpace::Table) {
                    Some(index) => {
                        pos += 1;
                        index
                    }
                    None => return,
                }
            }
            _ => 0,
        };
        let offset = self.parse_offset_expr(items, &mut pos);
        let members: Vec<u32> = items[pos..]
            .iter()
            .filter_map(|item| {
                self.resolve_space_index(Some(item), Some(item.span()), SymbolSpace::Func)
            })
            .collect();
        self.elements
            .push(ElementSegment::new(table_index, offset, members));
    }

    fn parse_data_strings(&mut self, items: &[SExpr]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for item in items {
            match item.as_token() {
                Some(Token::String(chunk)) => bytes.extend_from_slice(chunk),
                _ => self
                    .diagnostics
                    .error(item.span(), "expected a string literal"),
            }
        }
        bytes
    }

    fn assemble_data(&mut self, _field: &SExpr, items: &[SExpr]) {
        let mut pos = 0;
        let memory_index = match items.first() {
            Some(item @ SExpr::Atom(_)) => match item.as_token() {
                Some(Token::String(_)) => 0,
                _ => {
                    match self.resolve_space_index(
                        Some(item),
                        Some(item.span()),
                        SymbolSpace::Memory,
                    ) {
                        Some(index) => {
                            pos += 1;
                            index
                        }
                        None => return,
                    }
                }
            },
            _ => 0,
        };
        let offset = self.parse_offset_expr(items, &mut pos);
        let bytes = self.parse_data_strings(&items[pos..]);
        self.data
            .push(DataSegment::new(memory_index, offset, bytes));
    }

    // ----- shared helpers ---------------------------------------------

    fn parse_limits(
        &mut self,
        field: &SExpr,
        items: &[SExpr],
        pos: &mut usize,
    ) -> Option<ResizableLimits> {
        // Accept both `n m?` and the parenthesized `(limits n m?)` form.
        if let Some(limit_items) = items.get(*pos).and_then(|i| i.as_list_of("limits")) {
            *pos += 1;
            let mut inner = 0;
            return self.parse_limits_values(field, limit_items, &mut inner);
        }
        self.parse_limits_values(field, items, pos)
    }

    fn parse_limits_values(
        &mut self,
        field: &SExpr,
        items: &[SExpr],
        pos: &mut usize,
    ) -> Option<ResizableLimits> {
        let Some(initial) = items.get(*pos).and_then(unsigned_u32) else {
            self.diagnostics
                .error(field.span(), "expected an initial size");
            return None;
        };
        *pos += 1;
        let maximum = match items.get(*pos).and_then(unsigned_u32) {
            Some(maximum) => {
                *pos += 1;
                Some(maximum)
            }
            None => None,
        };
        Some(ResizableLimits::new(initial, maximum))
    }

    fn parse_table_type(
        &mut self,
        field: &SExpr,
        items: &[SExpr],
        pos: &mut usize,
    ) -> Option<TableType> {
        let limits = self.parse_limits(field, items, pos)?;
        if is_elem_type(items.get(*pos)) {
            *pos += 1;
        } else {
            self.diagnostics
                .error(field.span(), "expected the table element type");
        }
        Some(TableType::new(limits))
    }

    fn parse_global_type(
        &mut self,
        field: &SExpr,
        items: &[SExpr],
        pos: &mut usize,
    ) -> Option<GlobalType> {
        match items.get(*pos) {
            Some(item) => {
                if let Some(mut_items) = item.as_list_of("mut") {
                    *pos += 1;
                    match mut_items
                        .first()
                        .and_then(|i| i.as_keyword())
                        .and_then(value_type_from_keyword)
                    {
                        Some(vt) => Some(GlobalType::new(vt, true)),
                        None => {
                            self.diagnostics
                                .error(item.span(), "expected a value type in (mut …)");
                            None
                        }
                    }
                } else if let Some(vt) =
                    item.as_keyword().and_then(value_type_from_keyword)
                {
                    *pos += 1;
                    Some(GlobalType::new(vt, false))
                } else {
                    self.diagnostics
                        .error(field.span(), "expected a global type");
                    None
                }
            }
            None => {
                self.diagnostics
                    .error(field.span(), "expected a global type");
                None
            }
        }
    }

    fn resolve_space_index(
        &mut self,
        item: Option<&SExpr>,
        origin: Option<Span>,
        space: SymbolSpace,
    ) -> Option<u32> {
        let span = item.map(SExpr::span).or(origin).unwrap_or_else(Span::start);
        let Some(token) = item.and_then(SExpr::as_token) else {
            self.diagnostics.error(span, "expected an index");
            return None;
        };
        match token {
            Token::UnsignedInteger(value) => match value.to_u32() {
                Some(index) => Some(index),
                None => {
                    self.diagnostics.error(span, "index out of range");
                    None
                }
            },
            Token::Identifier(name) => {
                let table = match space {
                    SymbolSpace::Type => &self.symbols.types,
                    SymbolSpace::Func => &self.symbols.funcs,
                    SymbolSpace::Table => &self.symbols.tables,
                    SymbolSpace::Memory => &self.symbols.memories,
                    SymbolSpace::Global => &self.symbols.globals,
                };
                match table.get(name) {
                    Some(index) => Some(*index),
                    None => {
                        self.diagnostics
                            .error(span, format!("unknown {} ${}", space.noun(), name));
                        None
                    }
                }
            }
            _ => {
                self.diagnostics.error(span, "expected an index");
                None
            }
        }
    }

    // ----- instructions -----------------------------------------------

    fn parse_instr_seq(
        &mut self,
        items: &[SExpr],
        context: &mut FuncContext,
        out: &mut Vec<Instruction>,
    ) {
        let mut pos = 0;
        self.parse_instrs_until(items, &mut pos, context, out, &[]);
        if pos != items.len() {
            self.diagnostics.error(
                items[pos].span(),
                "unexpected token after the end of the instruction sequence",
            );
        }
    }

    /// Parses instructions until one of `terminators` (or the end of the
    /// items). Returns the terminator keyword found, without consuming
    /// it.
    fn parse_instrs_until<'a>(
        &mut self,
        items: &'a [SExpr],
        pos: &mut usize,
        context: &mut FuncContext,
        out: &mut Vec<Instruction>,
        terminators: &[&str],
    ) -> Option<&'a str> {
        while let Some(item) = items.get(*pos) {
            match item {
                SExpr::List(..) => {
                    *pos += 1;
                    self.parse_folded(item, context, out);
                }
                SExpr::Atom(located) => match &located.token {
                    Token::Keyword(keyword) => {
                        if terminators.contains(&keyword.as_str()) {
                            return Some(keyword.as_str());
                        }
                        *pos += 1;
                        self.parse_plain(keyword, located.span, items, pos, context, out);
                    }
                    _ => {
                        self.diagnostics
                            .error(located.span, "expected an instruction");
                        *pos += 1;
                    }
                },
            }
        }
        None
    }

    /// Parses one plain (unfolded) instruction whose keyword has already
    /// been consumed. Block-structured instructions consume through their
    /// matching `end`.
    fn parse_plain(
        &mut self,
        keyword: &str,
        span: Span,
        items: &[SExpr],
        pos: &mut usize,
        context: &mut FuncContext,
        out: &mut Vec<Instruction>,
    ) {
        match canonical_mnemonic(keyword) {
            "block" | "loop" => {
                let is_loop = canonical_mnemonic(keyword) == "loop";
                let label = self.consume_label(items, pos);
                let block_type = self.parse_block_type(items, pos);
                context.labels.push(label);
                let mut body = Vec::new();
                let terminator =
                    self.parse_instrs_until(items, pos, context, &mut body, &["end"]);
                context.labels.pop();
                if terminator.is_none() {
                    self.diagnostics.error(span, "missing `end` for block");
                } else {
                    *pos += 1;
                    self.consume_label(items, pos);
                }
                out.push(if is_loop {
                    Instruction::Loop(block_type, body)
                } else {
                    Instruction::Block(block_type, body)
                });
            }
            "if" => {
                let label = self.consume_label(items, pos);
                let block_type = self.parse_block_type(items, pos);
                context.labels.push(label);
                let mut consequent = Vec::new();
                let mut alternate = Vec::new();
                match self.parse_instrs_until(items, pos, context, &mut consequent, &["else", "end"])
                {
                    Some("else") => {
                        *pos += 1;
                        self.consume_label(items, pos);
                        if self
                            .parse_instrs_until(items, pos, context, &mut alternate, &["end"])
                            .is_none()
                        {
                            self.diagnostics.error(span, "missing `end` for if");
                        } else {
                            *pos += 1;
                            self.consume_label(items, pos);
                        }
                    }
                    Some(_) => {
                        *pos += 1;
                        self.consume_label(items, pos);
                    }
                    None => self.diagnostics.error(span, "missing `end` for if"),
                }
                context.labels.pop();
                out.push(Instruction::If(block_type, consequent, alternate));
            }
            canonical => {
                if let Some(instruction) = self.parse_op(canonical, span, items, pos, context) {
                    out.push(instruction);
                }
            }
        }
    }

    /// Parses one folded instruction list.
    fn parse_folded(
        &mut self,
        item: &SExpr,
        context: &mut FuncContext,
        out: &mut Vec<Instruction>,
    ) {
        let Some(list) = item.as_list() else {
            self.diagnostics
                .error(item.span(), "expected a folded instruction");
            return;
        };
        let Some(keyword) = list.first().and_then(SExpr::as_keyword) else {
            self.diagnostics
                .error(item.span(), "expected an instruction keyword");
            return;
        };
        let span = item.span();
        let items = &list[1..];
        match canonical_mnemonic(keyword) {
            "block" | "loop" => {
                let is_loop = canonical_mnemonic(keyword) == "loop";
                let mut pos = 0;
                let label = self.consume_label(items, &mut pos);
                let block_type = self.parse_block_type(items, &mut pos);
                context.labels.push(label);
                let mut body = Vec::new();
                let mut body_pos = pos;
                self.parse_instrs_until(items, &mut body_pos, context, &mut body, &[]);
                context.labels.pop();
                out.push(if is_loop {
                    Instruction::Loop(block_type, body)
                } else {
                    Instruction::Block(block_type, body)
                });
            }
            "if" => {
                let mut pos = 0;
                let label = self.consume_label(items, &mut pos);
                let block_type = self.parse_block_type(items, &mut pos);

                // Condition expressions come before (then …).
                while items
                    .get(pos)
                    .map(|i| !i.is_list_of("then") && !i.is_list_of("else"))
                    .unwrap_or(false)
                {
                    let condition = items[pos].clone();
                    self.parse_folded(&condition, context, out);
                    pos += 1;
                }

                context.labels.push(label);
                let mut consequent = Vec::new();
                let mut alternate = Vec::new();
                match items.get(pos).and_then(|i| i.as_list_of("then")) {
                    Some(then_items) => {
                        let mut then_pos = 0;
                        self.parse_instrs_until(
                            then_items,
                            &mut then_pos,
                            context,
                            &mut consequent,
                            &[],
                        );
                        pos += 1;
                    }
                    None => self
                        .diagnostics
                        .error(span, "expected (then …) in a folded if"),
                }
                if let Some(else_items) = items.get(pos).and_then(|i| i.as_list_of("else")) {
                    let mut else_pos = 0;
                    self.parse_instrs_until(
                        else_items,
                        &mut else_pos,
                        context,
                        &mut alternate,
                        &[],
                    );
                    pos += 1;
                }
                context.labels.pop();
                if pos != items.len() {
                    self.diagnostics
                        .error(span, "unexpected items after a folded if");
                }
                out.push(Instruction::If(block_type, consequent, alternate));
            }
            canonical => {
                let mut pos = 0;
                let instruction = self.parse_op(canonical, span, items, &mut pos, context);
                // The remaining items are folded operands, emitted first.
                while pos < items.len() {
                    let operand = items[pos].clone();
                    self.parse_folded(&operand, context, out);
                    pos += 1;
                }
                if let Some(instruction) = instruction {
                    out.push(instruction);
                }
            }
        }
    }

    fn consume_label(&mut self, items: &[SExpr], pos: &mut usize) -> Option<String> {
        match identifier(items.get(*pos)) {
            Some(name) => {
                *pos += 1;
                Some(name.to_string())
            }
            None => None,
        }
    }

    fn parse_block_type(&mut self, items: &[SExpr], pos: &mut usize) -> BlockType {
        if let Some(result_items) = items.get(*pos).and_then(|i| i.as_list_of("result")) {
            if result_items.is_empty() {
                *pos += 1;
                return BlockType(None);
            }
            match result_items[0]
                .as_keyword()
                .and_then(value_type_from_keyword)
            {
                Some(vt) => {
                    if result_items.len() > 1 {
                        self.diagnostics.error(
                            items[*pos].span(),
                            "a block may produce at most one value",
                        );
                    }
                    *pos += 1;
                    return BlockType(Some(vt));
                }
                None => {
                    self.diagnostics
                        .error(result_items[0].span(), "expected a value type");
                    *pos += 1;
                    return BlockType(None);
                }
            }
        }
        BlockType(None)
    }

    fn resolve_label(&mut self, context: &FuncContext, item: Option<&SExpr>, origin: Span) -> Option<u32> {
        let span = item.map(SExpr::span).unwrap_or(origin);
        match item.and_then(SExpr::as_token) {
            Some(Token::UnsignedInteger(value)) => match value.to_u32() {
                Some(depth) => Some(depth),
                None => {
                    self.diagnostics.error(span, "label depth out of range");
                    None
                }
            },
            Some(Token::Identifier(name)) => match context.label_depth(name) {
                Some(depth) => Some(depth),
                None => {
                    self.diagnostics
                        .error(span, format!("unknown label ${}", name));
                    None
                }
            },
            _ => {
                self.diagnostics.error(span, "expected a label");
                None
            }
        }
    }

    fn is_branch_target(item: Option<&SExpr>) -> bool {
        matches!(
            item.and_then(SExpr::as_token),
            Some(Token::UnsignedInteger(_)) | Some(Token::Identifier(_))
        )
    }

    fn parse_mem_arg(
        &mut self,
        items: &[SExpr],
        pos: &mut usize,
        natural_size: u32,
    ) -> MemArg {
        let mut offset = 0u32;
        let mut align_bytes: Option<u32> = None;
        for _ in 0..2 {
            let Some(keyword) = items.get(*pos).and_then(SExpr::as_keyword) else {
                break;
            };
            if let Some(value) = keyword.strip_prefix("offset=") {
                match parse_immediate_u32(value) {
                    Some(value) => offset = value,
                    None => self
                        .diagnostics
                        .error(items[*pos].span(), "malformed offset"),
                }
                *pos += 1;
            } else if let Some(value) = keyword.strip_prefix("align=") {
                match parse_immediate_u32(value) {
                    Some(value) if value.is_power_of_two() => align_bytes = Some(value),
                    _ => self
                        .diagnostics
                        .error(items[*pos].span(), "alignment must be a power of two"),
                }
                *pos += 1;
            } else {
                break;
            }
        }
        let align = align_bytes.unwrap_or(natural_size).trailing_zeros();
        MemArg { align, offset }
    }

    fn parse_op(
        &mut self,
        canonical: &str,
        span: Span,
        items: &[SExpr],
        pos: &mut usize,
        context: &mut FuncContext,
    ) -> Option<Instruction> {
        if let Some(instruction) = ops::nullary_from_name(canonical) {
            return Some(instruction);
        }

        if let Some((constructor, natural_size)) = memory_op(canonical) {
            let arg = self.parse_mem_arg(items, pos, natural_size);
            return Some(constructor(arg));
        }

        match canonical {
            "br" | "br_if" => {
                let depth = self.resolve_label(context, items.get(*pos), span)?;
                *pos += 1;
                Some(if canonical == "br" {
                    Instruction::Br(depth)
                } else {
                    Instruction::BrIf(depth)
                })
            }
            "br_table" => {
                let mut targets = Vec::new();
                while Self::is_branch_target(items.get(*pos)) {
                    if let Some(depth) = self.resolve_label(context, items.get(*pos), span) {
                        targets.push(depth);
                    }
                    *pos += 1;
                }
                if targets.is_empty() {
                    self.diagnostics
                        .error(span, "br_table needs at least a default target");
                    return None;
                }
                let default = targets.pop().expect("checked non-empty");
                Some(Instruction::BrTable(Box::new(BrTableData {
                    table: targets.into_boxed_slice(),
                    default,
                })))
            }
            "call" => {
                let index =
                    self.resolve_space_index(items.get(*pos), Some(span), SymbolSpace::Func)?;
                *pos += 1;
                Some(Instruction::Call(index))
            }
            "call_indirect" => {
                let type_index = self.resolve_type_use(items, pos, &mut Vec::new());
                Some(Instruction::CallIndirect(type_index, 0))
            }
            "get_local" | "set_local" | "tee_local" => {
                let index = self.resolve_local(context, items.get(*pos), span)?;
                *pos += 1;
                Some(match canonical {
                    "get_local" => Instruction::GetLocal(index),
                    "set_local" => Instruction::SetLocal(index),
                    _ => Instruction::TeeLocal(index),
                })
            }
            "get_global" | "set_global" => {
                let index =
                    self.resolve_space_index(items.get(*pos), Some(span), SymbolSpace::Global)?;
                *pos += 1;
                Some(if canonical == "get_global" {
                    Instruction::GetGlobal(index)
                } else {
                    Instruction::SetGlobal(index)
                })
            }
            "current_memory" => Some(Instruction::CurrentMemory(0)),
            "grow_memory" => Some(Instruction::GrowMemory(0)),
            "i32.const" => {
                let value = self.parse_i32_immediate(items.get(*pos), span)?;
                *pos += 1;
                Some(Instruction::I32Const(value))
            }
            "i64.const" => {
                let value = self.parse_i64_immediate(items.get(*pos), span)?;
                *pos += 1;
                Some(Instruction::I64Const(value))
            }
            "f32.const" => {
                let bits = self.parse_float_immediate(items.get(*pos), span, true)?;
                *pos += 1;
                Some(Instruction::F32Const(bits as u32))
            }
            "f64.const" => {
                let bits = self.parse_float_immediate(items.get(*pos), span, false)?;
                *pos += 1;
                Some(Instruction::F64Const(bits))
            }
            other => {
                self.diagnostics
                    .error(span, format!("unknown instruction `{}`", other));
                None
            }
        }
    }

    fn resolve_local(
        &mut self,
        context: &FuncContext,
        item: Option<&SExpr>,
        origin: Span,
    ) -> Option<u32> {
        let span = item.map(SExpr::span).unwrap_or(origin);
        match item.and_then(SExpr::as_token) {
            Some(Token::UnsignedInteger(value)) => match value.to_u32() {
                Some(index) => Some(index),
                None => {
                    self.diagnostics.error(span, "local index out of range");
                    None
                }
            },
            Some(Token::Identifier(name)) => match context.local_names.get(name) {
                Some(index) => Some(*index),
                None => {
                    self.diagnostics
                        .error(span, format!("unknown local ${}", name));
                    None
                }
            },
            _ => {
                self.diagnostics.error(span, "expected a local index");
                None
            }
        }
    }

    fn parse_i32_immediate(&mut self, item: Option<&SExpr>, origin: Span) -> Option<i32> {
        let span = item.map(SExpr::span).unwrap_or(origin);
        match item.and_then(SExpr::as_token) {
            Some(Token::SignedInteger(value)) => match value.to_i64() {
                Some(v) if (i64::from(i32::MIN)..=i64::from(u32::MAX)).contains(&v) => {
                    Some(v as u32 as i32)
                }
                _ => {
                    self.diagnostics.error(span, "i32 constant out of range");
                    None
                }
            },
            Some(Token::UnsignedInteger(value)) => match value.to_u32() {
                Some(v) => Some(v as i32),
                None => {
                    self.diagnostics.error(span, "i32 constant out of range");
                    None
                }
            },
            _ => {
                self.diagnostics.error(span, "expected an i32 constant");
                None
            }
        }
    }

    fn parse_i64_immediate(&mut self, item: Option<&SExpr>, origin: Span) -> Option<i64> {
        let span = item.map(SExpr::span).unwrap_or(origin);
        match item.and_then(SExpr::as_token) {
            Some(Token::SignedInteger(value)) => match value.to_i64() {
                Some(v) => Some(v),
                None => match value.to_u64() {
                    Some(v) => Some(v as i64),
                    None => {
                        self.diagnostics.error(span, "i64 constant out of range");
                        None
                    }
                },
            },
            Some(Token::UnsignedInteger(value)) => match value.to_u64() {
                Some(v) => Some(v as i64),
                None => {
                    self.diagnostics.error(span, "i64 constant out of range");
                    None
                }
            },
            _ => {
                self.diagnostics.error(span, "expected an i64 constant");
                None
            }
        }
    }

    /// Parses a float constant, returning f32 bits zero-extended or f64
    /// bits depending on `single`.
    fn parse_float_immediate(
        &mut self,
        item: Option<&SExpr>,
        origin: Span,
        single: bool,
    ) -> Option<u64> {
        let span = item.map(SExpr::span).unwrap_or(origin);
        let literal = match item.and_then(SExpr::as_token) {
            Some(Token::Float(literal)) => literal.clone(),
            // Integer literals are valid float constants.
            Some(Token::SignedInteger(value)) => FloatLiteral::new(
                value.sign() == num_bigint::Sign::Minus,
                FloatLiteralKind::Number {
                    significand: value.magnitude().clone(),
                    base: 10,
                    exponent: num_bigint::BigInt::from(0),
                },
            ),
            Some(Token::UnsignedInteger(value)) => FloatLiteral::new(
                false,
                FloatLiteralKind::Number {
                    significand: value.clone(),
                    base: 10,
                    exponent: num_bigint::BigInt::from(0),
                },
            ),
            _ => {
                self.diagnostics.error(span, "expected a float constant");
                return None;
            }
        };
        let bits = if single {
            literal.to_f32_bits().map(u64::from)
        } else {
            literal.to_f64_bits()
        };
        match bits {
            Some(bits) => Some(bits),
            None => {
                self.diagnostics.error(span, "float constant out of range");
                None
            }
        }
    }

    // ----- output -----------------------------------------------------

    fn into_file(self) -> WasmFile {
        let mut file = WasmFile::new();
        if !self.types.is_empty() {
            file.insert_section(Section::Type(TypeSection::new(self.types)));
        }
        if !self.imports.is_empty() {
            file.insert_section(Section::Import(ImportSection::new(self.imports)));
        }
        if !self.func_type_indices.is_empty() {
            file.insert_section(Section::Function(FunctionSection::new(
                self.func_type_indices,
            )));
        }
        if !self.tables.is_empty() {
            file.insert_section(Section::Table(TableSection::new(self.tables)));
        }
        if !self.memories.is_empty() {
            file.insert_section(Section::Memory(MemorySection::new(self.memories)));
        }
        if !self.globals.is_empty() {
            file.insert_section(Section::Global(GlobalSection::new(self.globals)));
        }
        if !self.exports.is_empty() {
            file.insert_section(Section::Export(ExportSection::new(self.exports)));
        }
        if let Some(start) = self.start {
            file.insert_section(Section::Start(StartSection::new(start)));
        }
        if !self.elements.is_empty() {
            file.insert_section(Section::Element(ElementSection::new(self.elements)));
        }
        if !self.bodies.is_empty() {
            file.insert_section(Section::Code(CodeSection::new(self.bodies)));
        }
        if !self.data.is_empty() {
            file.insert_section(Section::Data(DataSection::new(self.data)));
        }
        if let Some(name) = self.module_name {
            file.insert_section(Section::Name(NameSection::for_module_name(name)));
        }
        file
    }
}

#[derive(Copy, Clone)]
enum SymbolSpace {
    Type,
    Func,
    Table,
    Memory,
    Global,
}

impl SymbolSpace {
    fn noun(self) -> &'static str {
        match self {
            SymbolSpace::Type => "type",
            SymbolSpace::Func => "function",
            SymbolSpace::Table => "table",
            SymbolSpace::Memory => "memory",
            SymbolSpace::Global => "global",
        }
    }
}

type MemCtor = fn(MemArg) -> Instruction;

/// Memory-access mnemonics with their constructor and natural alignment
/// in bytes.
fn memory_op(name: &str) -> Option<(MemCtor, u32)> {
    Some(match name {
        "i32.load" => (Instruction::I32Load as MemCtor, 4),
        "i64.load" => (Instruction::I64Load as MemCtor, 8),
        "f32.load" => (Instruction::F32Load as MemCtor, 4),
        "f64.load" => (Instruction::F64Load as MemCtor, 8),
        "i32.load8_s" => (Instruction::I32Load8S as MemCtor, 1),
        "i32.load8_u" => (Instruction::I32Load8U as MemCtor, 1),
        "i32.load16_s" => (Instruction::I32Load16S as MemCtor, 2),
        "i32.load16_u" => (Instruction::I32Load16U as MemCtor, 2),
        "i64.load8_s" => (Instruction::I64Load8S as MemCtor, 1),
        "i64.load8_u" => (Instruction::I64Load8U as MemCtor, 1),
        "i64.load16_s" => (Instruction::I64Load16S as MemCtor, 2),
        "i64.load16_u" => (Instruction::I64Load16U as MemCtor, 2),
        "i64.load32_s" => (Instruction::I64Load32S as MemCtor, 4),
        "i64.load32_u" => (Instruction::I64Load32U as MemCtor, 4),
        "i32.store" => (Instruction::I32Store as MemCtor, 4),
        "i64.store" => (Instruction::I64Store as MemCtor, 8),
        "f32.store" => (Instruction::F32Store as MemCtor, 4),
        "f64.store" => (Instruction::F64Store as MemCtor, 8),
        "i32.store8" => (Instruction::I32Store8 as MemCtor, 1),
        "i32.store16" => (Instruction::I32Store16 as MemCtor, 2),
        "i64.store8" => (Instruction::I64Store8 as MemCtor, 1),
        "i64.store16" => (Instruction::I64Store16 as MemCtor, 2),
        "i64.store32" => (Instruction::I64Store32 as MemCtor, 4),
        _ => return None,
    })
}

fn kind_space(keyword: &str) -> Option<usize> {
    match keyword {
        "func" => Some(0),
        "table" => Some(1),
        "memory" => Some(2),
        "global" => Some(3),
        _ => None,
    }
}

fn identifier(item: Option<&SExpr>) -> Option<&str> {
    match item?.as_token()? {
        Token::Identifier(name) => Some(name),
        _ => None,
    }
}

fn string(item: Option<&SExpr>) -> Option<&str> {
    match item?.as_token()? {
        Token::String(bytes) => std::str::from_utf8(bytes).ok(),
        _ => None,
    }
}

fn unsigned_u32(item: &SExpr) -> Option<u32> {
    match item.as_token()? {
        Token::UnsignedInteger(value) => value.to_u32(),
        _ => None,
    }
}

fn is_elem_type(item: Option<&SExpr>) -> bool {
    matches!(
        item.and_then(SExpr::as_keyword),
        Some("anyfunc") | Some("funcref")
    )
}

/// Parses `offset=`/`align=` values, which may themselves be hex.
fn parse_immediate_u32(text: &str) -> Option<u32> {
    let (digits, radix) = match text.strip_prefix("0x") {
        Some(hex) => (hex, 16),
        None => (text, 10),
    };
    let clean: String = digits.chars().filter(|c| *c != '_').collect();
    if clean.is_empty() {
        return None;
    }
    BigUint::parse_bytes(clean.as_bytes(), radix)?.to_u32()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::assemble_str;

    fn assemble(source: &str) -> WasmFile {
        assemble_str(source).expect("assembly should succeed")
    }

    #[test]
    fn empty_module() {
        let file = assemble("(module)");
        assert_eq!(
            file.to_vec().unwrap(),
            [0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn named_module_emits_name_section() {
        let file = assemble("(module $adder)");
        assert_eq!(file.module_name(), Some("adder"));
    }

    #[test]
    fn function_with_folded_body() {
        let file = assemble(
            r#"
            (module
                (func $add (param $lhs i32) (param $rhs i32) (result i32)
                    (i32.add (get_local $lhs) (get_local $rhs)))
                (export "add" (func $add)))
            "#,
        );
        let body = &file.code_section().unwrap().bodies()[0];
        assert_eq!(
            body.code(),
            &[
                Instruction::GetLocal(0),
                Instruction::GetLocal(1),
                Instruction::I32Add,
            ]
        );
        assert_eq!(file.export_section().unwrap().entries().len(), 1);
    }

    #[test]
    fn modern_spellings_are_accepted() {
        let file = assemble(
            r#"
            (module
                (func (param i32) (result i64)
                    local.get 0
                    i64.extend_i32_s))
            "#,
        );
        let body = &file.code_section().unwrap().bodies()[0];
        assert_eq!(
            body.code(),
            &[Instruction::GetLocal(0), Instruction::I64ExtendSI32]
        );
    }

    #[test]
    fn block_labels_resolve_to_depths() {
        let file = assemble(
            r#"
            (module
                (func
                    block $outer
                        block $inner
                            br $outer
                            br $inner
                        end
                    end))
            "#,
        );
        let body = &file.code_section().unwrap().bodies()[0];
        match &body.code()[0] {
            Instruction::Block(_, outer) => match &outer[0] {
                Instruction::Block(_, inner) => {
                    assert_eq!(inner[0], Instruction::Br(1));
                    assert_eq!(inner[1], Instruction::Br(0));
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn inline_import_and_export() {
        let file = assemble(
            r#"
            (module
                (func $print (import "spectest" "print_i32") (param i32))
                (memory $m (export "mem") 1 2))
            "#,
        );
        let imports = file.import_section().unwrap().entries();
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].module(), "spectest");
        let exports = file.export_section().unwrap().entries();
        assert_eq!(exports[0].field(), "mem");
    }

    #[test]
    fn limits_list_dialect() {
        let file = assemble("(module (memory $m (limits 1 1)))");
        let memory = &file.memory_section().unwrap().entries()[0];
        assert_eq!(memory.limits().initial(), 1);
        assert_eq!(memory.limits().maximum(), Some(1));
    }

    #[test]
    fn memory_data_abbreviation() {
        let file = assemble(r#"(module (memory (data "hi")))"#);
        let memory = &file.memory_section().unwrap().entries()[0];
        assert_eq!(memory.limits().initial(), 1);
        assert_eq!(memory.limits().maximum(), Some(1));
        let segment = &file.data_section().unwrap().entries()[0];
        assert_eq!(segment.value(), b"hi");
    }

    #[test]
    fn table_elem_abbreviation() {
        let file = assemble(
            r#"
            (module
                (func $f)
                (func $g)
                (table anyfunc (elem $f $g $f)))
            "#,
        );
        let table = &file.table_section().unwrap().entries()[0];
        assert_eq!(table.limits().initial(), 3);
        let segment = &file.element_section().unwrap().entries()[0];
        assert_eq!(segment.members(), &[0, 1, 0]);
    }

    #[test]
    fn memarg_parsing() {
        let file = assemble(
            r#"
            (module
                (memory 1)
                (func (result i32)
                    i32.const 0
                    i32.load offset=4 align=2))
            "#,
        );
        let body = &file.code_section().unwrap().bodies()[0];
        assert_eq!(
            body.code()[1],
            Instruction::I32Load(MemArg {
                align: 1,
                offset: 4
            })
        );
    }

    #[test]
    fn float_constants_preserve_payloads() {
        let file = assemble(
            r#"
            (module
                (func (result f64) f64.const -nan:0x8000000000001)
                (func (result f32) f32.const 0x1p-149))
            "#,
        );
        let bodies = file.code_section().unwrap().bodies();
        assert_eq!(
            bodies[0].code()[0],
            Instruction::F64Const(0xfff8_0000_0000_0001)
        );
        // Smallest subnormal f32.
        assert_eq!(bodies[1].code()[0], Instruction::F32Const(1));
    }

    #[test]
    fn errors_abort_module_production() {
        assert!(assemble_str("(module (func (result i32) unknown_op))").is_err());
        assert!(assemble_str("(module (func call $missing))").is_err());
        assert!(assemble_str("(module (frobnicate))").is_err());
    }

    #[test]
    fn start_and_elem_fields() {
        let file = assemble(
            r#"
            (module
                (table 2 anyfunc)
                (func $init)
                (elem (i32.const 0) $init $init)
                (start $init))
            "#,
        );
        assert_eq!(file.start_section(), Some(0));
        let segment = &file.element_section().unwrap().entries()[0];
        assert_eq!(segment.members(), &[0, 0]);
    }

    #[test]
    fn call_indirect_with_type() {
        let file = assemble(
            r#"
            (module
                (type $binop (func (param i32 i32) (result i32)))
                (table 1 anyfunc)
                (func (param i32) (result i32)
                    get_local 0
                    get_local 0
                    i32.const 0
                    call_indirect (type $binop)))
            "#,
        );
        let body = &file.code_section().unwrap().bodies()[0];
        assert_eq!(body.code()[3], Instruction::CallIndirect(0, 0));
    }
}
