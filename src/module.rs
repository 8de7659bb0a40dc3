//! Module instances and the instantiation sequence.

use crate::elements::{expand_locals, External, InitExpr, Internal, WasmFile};
use crate::func::{FuncBody, FuncInstance, FuncRef};
use crate::global::{GlobalInstance, GlobalRef};
use crate::host::Externals;
use crate::imports::ImportResolver;
use crate::memory::{match_limits, MemoryInstance, MemoryRef};
use crate::ops::Instruction;
use crate::runner::RunnerConfig;
use crate::table::{TableInstance, TableRef};
use crate::types::{
    GlobalDescriptor, MemoryDescriptor, Signature, TableDescriptor,
};
use crate::value::RuntimeValue;
use crate::{Error, Trap};
use memory_units::wasm32::Pages;
use std::cell::{Ref, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Index of the default linear memory in the MVP.
pub(crate) const DEFAULT_MEMORY_INDEX: u32 = 0;
/// Index of the default table in the MVP.
pub(crate) const DEFAULT_TABLE_INDEX: u32 = 0;

/// Reference to a [`ModuleInstance`].
///
/// This reference has reference-counting semantics.
///
/// A [`ModuleInstance`] holds strong references to its components (globals,
/// memories, funcs, tables); the components hold weak references back to
/// their containing module. Modules that might be needed at execution time
/// must therefore be kept alive by the embedder.
///
/// [`ModuleInstance`]: struct.ModuleInstance.html
#[derive(Clone, Debug)]
pub struct ModuleRef(pub(crate) Rc<ModuleInstance>);

impl ::std::ops::Deref for ModuleRef {
    type Target = ModuleInstance;
    fn deref(&self) -> &ModuleInstance {
        &self.0
    }
}

/// An external value: the runtime representation of an entity that can be
/// imported or exported.
pub enum ExternVal {
    /// [Function][`FuncInstance`].
    ///
    /// [`FuncInstance`]: struct.FuncInstance.html
    Func(FuncRef),
    /// [Table][`TableInstance`].
    ///
    /// [`TableInstance`]: struct.TableInstance.html
    Table(TableRef),
    /// [Memory][`MemoryInstance`].
    ///
    /// [`MemoryInstance`]: struct.MemoryInstance.html
    Memory(MemoryRef),
    /// [Global][`GlobalInstance`].
    ///
    /// Should be immutable.
    ///
    /// [`GlobalInstance`]: struct.GlobalInstance.html
    Global(GlobalRef),
}

impl Clone for ExternVal {
    fn clone(&self) -> Self {
        match self {
            ExternVal::Func(func) => ExternVal::Func(func.clone()),
            ExternVal::Table(table) => ExternVal::Table(table.clone()),
            ExternVal::Memory(memory) => ExternVal::Memory(memory.clone()),
            ExternVal::Global(global) => ExternVal::Global(global.clone()),
        }
    }
}

impl fmt::Debug for ExternVal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "ExternVal {{ {} }}",
            match *self {
                ExternVal::Func(_) => "Func",
                ExternVal::Table(_) => "Table",
                ExternVal::Memory(_) => "Memory",
                ExternVal::Global(_) => "Global",
            }
        )
    }
}

impl ExternVal {
    /// Gets the underlying function reference if this `ExternVal` contains
    /// a function, or `None` if it is some other kind.
    pub fn as_func(&self) -> Option<&FuncRef> {
        match self {
            ExternVal::Func(func) => Some(func),
            _ => None,
        }
    }

    /// Gets the underlying table reference if this `ExternVal` contains
    /// a table, or `None` if it is some other kind.
    pub fn as_table(&self) -> Option<&TableRef> {
        match self {
            ExternVal::Table(table) => Some(table),
            _ => None,
        }
    }

    /// Gets the underlying memory reference if this `ExternVal` contains
    /// a memory, or `None` if it is some other kind.
    pub fn as_memory(&self) -> Option<&MemoryRef> {
        match self {
            ExternVal::Memory(memory) => Some(memory),
            _ => None,
        }
    }

    /// Gets the underlying global reference if this `ExternVal` contains
    /// a global, or `None` if it is some other kind.
    pub fn as_global(&self) -> Option<&GlobalRef> {
        match self {
            ExternVal::Global(global) => Some(global),
            _ => None,
        }
    }
}

/// A module instance is the runtime representation of a [module][`WasmFile`].
///
/// It is created by instantiating a module and collects the runtime
/// representations of all entities that are imported or defined by it:
///
/// - [functions][`FuncInstance`],
/// - [memories][`MemoryInstance`],
/// - [tables][`TableInstance`],
/// - [globals][`GlobalInstance`].
///
/// Instantiation requires an entity for every declared import; wasm modules
/// have no optional imports. After instantiation, exported functions can be
/// invoked with [`invoke_export`].
///
/// [`WasmFile`]: struct.WasmFile.html
/// [`FuncInstance`]: struct.FuncInstance.html
/// [`MemoryInstance`]: struct.MemoryInstance.html
/// [`TableInstance`]: struct.TableInstance.html
/// [`GlobalInstance`]: struct.GlobalInstance.html
/// [`invoke_export`]: #method.invoke_export
#[derive(Debug, Default)]
pub struct ModuleInstance {
    signatures: RefCell<Vec<Rc<Signature>>>,
    tables: RefCell<Vec<TableRef>>,
    funcs: RefCell<Vec<FuncRef>>,
    memories: RefCell<Vec<MemoryRef>>,
    globals: RefCell<Vec<GlobalRef>>,
    exports: RefCell<BTreeMap<String, ExternVal>>,
}

impl ModuleInstance {
    pub(crate) fn memory_by_index(&self, idx: u32) -> Option<MemoryRef> {
        self.memories.borrow().get(idx as usize).cloned()
    }

    pub(crate) fn table_by_index(&self, idx: u32) -> Option<TableRef> {
        self.tables.borrow().get(idx as usize).cloned()
    }

    pub(crate) fn global_by_index(&self, idx: u32) -> Option<GlobalRef> {
        self.globals.borrow().get(idx as usize).cloned()
    }

    pub(crate) fn func_by_index(&self, idx: u32) -> Option<FuncRef> {
        self.funcs.borrow().get(idx as usize).cloned()
    }

    pub(crate) fn signature_by_index(&self, idx: u32) -> Option<Rc<Signature>> {
        self.signatures.borrow().get(idx as usize).cloned()
    }

    fn push_func(&self, func: FuncRef) {
        self.funcs.borrow_mut().push(func);
    }

    fn push_signature(&self, signature: Rc<Signature>) {
        self.signatures.borrow_mut().push(signature)
    }

    fn push_memory(&self, memory: MemoryRef) {
        self.memories.borrow_mut().push(memory)
    }

    fn push_table(&self, table: TableRef) {
        self.tables.borrow_mut().push(table)
    }

    fn push_global(&self, global: GlobalRef) {
        self.globals.borrow_mut().push(global)
    }

    /// Accesses all globals. This is a non-standard API and unlikely to be
    /// portable to other engines.
    pub fn globals(&self) -> Ref<Vec<GlobalRef>> {
        self.globals.borrow()
    }

    fn insert_export<N: Into<String>>(&self, name: N, extern_val: ExternVal) {
        self.exports.borrow_mut().insert(name.into(), extern_val);
    }

    fn alloc_module<'i, I: Iterator<Item = &'i ExternVal>>(
        file: &WasmFile,
        extern_vals: I,
    ) -> Result<ModuleRef, Error> {
        let instance = ModuleRef(Rc::new(ModuleInstance::default()));

        for ty in file.type_section().map(|ts| ts.types()).unwrap_or(&[]) {
            instance.push_signature(Rc::new(Signature::from_function_type(ty)));
        }

        {
            let mut imports = file
                .import_section()
                .map(|is| is.entries())
                .unwrap_or(&[])
                .iter();
            let mut extern_vals = extern_vals;
            loop {
                // Iterate imports and extern_vals in lockstep so length
                // mismatches are detected, which `Iterator::zip` would
                // silently swallow.
                let (import, extern_val) = match (imports.next(), extern_vals.next()) {
                    (Some(import), Some(extern_val)) => (import, extern_val),
                    (None, None) => break,
                    (Some(_), None) | (None, Some(_)) => {
                        return Err(Error::Instantiation(
                            "extern_vals length is not equal to import section entries".to_owned(),
                        ));
                    }
                };

                match (import.external(), extern_val) {
                    (&External::Function(type_index), ExternVal::Func(func)) => {
                        let expected = instance.signature_by_index(type_index).ok_or_else(|| {
                            Error::Validation(format!(
                                "import {} refers to type {} which does not exist",
                                import.field(),
                                type_index
                            ))
                        })?;
                        if &*expected != func.signature() {
                            return Err(Error::Instantiation(format!(
                                "expected function with type {:?}, but actual type is {:?} for entry {}",
                                expected,
                                func.signature(),
                                import.field(),
                            )));
                        }
                        instance.push_func(func.clone())
                    }
                    (External::Table(table_type), ExternVal::Table(table)) => {
                        match_limits(table.limits(), table_type.limits())?;
                        instance.push_table(table.clone());
                    }
                    (External::Memory(memory_type), ExternVal::Memory(memory)) => {
                        match_limits(memory.limits(), memory_type.limits())?;
                        instance.push_memory(memory.clone());
                    }
                    (External::Global(global_type), ExternVal::Global(global)) => {
                        if global_type.content_type() != global.value_type() {
                            return Err(Error::Instantiation(format!(
                                "expected global with {:?} type, but provided global with {:?} type",
                                global_type.content_type(),
                                global.value_type(),
                            )));
                        }
                        instance.push_global(global.clone());
                    }
                    (expected_import, actual_extern_val) => {
                        return Err(Error::Instantiation(format!(
                            "expected {:?} type, but provided {:?} extern_val",
                            expected_import, actual_extern_val
                        )));
                    }
                }
            }
        }

        {
            let func_types = file
                .function_section()
                .map(|fs| fs.entries())
                .unwrap_or(&[]);
            let bodies = file.code_section().map(|cs| cs.bodies()).unwrap_or(&[]);
            if func_types.len() != bodies.len() {
                return Err(Error::Validation(format!(
                    "function section declares {} functions but the code section carries {} bodies",
                    func_types.len(),
                    bodies.len()
                )));
            }

            for (type_index, body) in Iterator::zip(func_types.iter(), bodies.iter()) {
                let signature = instance.signature_by_index(*type_index).ok_or_else(|| {
                    Error::Validation(format!("function refers to unknown type {}", type_index))
                })?;
                let func_body = FuncBody {
                    locals: expand_locals(body.locals()),
                    code: body.code().to_vec(),
                };
                let func_instance =
                    FuncInstance::alloc_internal(Rc::downgrade(&instance.0), signature, func_body);
                instance.push_func(func_instance);
            }
        }

        for table_type in file.table_section().map(|ts| ts.entries()).unwrap_or(&[]) {
            let table =
                TableInstance::alloc(table_type.limits().initial(), table_type.limits().maximum())?;
            instance.push_table(table);
        }

        for memory_type in file.memory_section().map(|ms| ms.entries()).unwrap_or(&[]) {
            let initial: Pages = Pages(memory_type.limits().initial() as usize);
            let maximum: Option<Pages> =
                memory_type.limits().maximum().map(|m| Pages(m as usize));
            let memory = MemoryInstance::alloc(initial, maximum)?;
            instance.push_memory(memory);
        }

        for global_entry in file.global_section().map(|gs| gs.entries()).unwrap_or(&[]) {
            let init_val = eval_init_expr(global_entry.init_expr(), &instance)?;
            if init_val.value_type() != global_entry.global_type().content_type() {
                return Err(Error::Validation(format!(
                    "global initializer yields {:?}, but the global is declared {:?}",
                    init_val.value_type(),
                    global_entry.global_type().content_type()
                )));
            }
            let global = GlobalInstance::alloc(init_val, global_entry.global_type().is_mutable());
            instance.push_global(global);
        }

        for export in file.export_section().map(|es| es.entries()).unwrap_or(&[]) {
            let field = export.field();
            let extern_val: ExternVal = match *export.internal() {
                Internal::Function(idx) => ExternVal::Func(
                    instance
                        .func_by_index(idx)
                        .ok_or_else(|| missing_export(field, "function", idx))?,
                ),
                Internal::Global(idx) => ExternVal::Global(
                    instance
                        .global_by_index(idx)
                        .ok_or_else(|| missing_export(field, "global", idx))?,
                ),
                Internal::Memory(idx) => ExternVal::Memory(
                    instance
                        .memory_by_index(idx)
                        .ok_or_else(|| missing_export(field, "memory", idx))?,
                ),
                Internal::Table(idx) => ExternVal::Table(
                    instance
                        .table_by_index(idx)
                        .ok_or_else(|| missing_export(field, "table", idx))?,
                ),
            };
            instance.insert_export(field, extern_val);
        }

        Ok(instance)
    }

    /// Instantiates a module with the given [external values][ExternVal] as
    /// imports.
    ///
    /// See [`new`] for details.
    ///
    /// [`new`]: #method.new
    /// [ExternVal]: enum.ExternVal.html
    pub fn with_externvals<'a, 'i, I: Iterator<Item = &'i ExternVal>>(
        file: &'a WasmFile,
        extern_vals: I,
    ) -> Result<NotStartedModuleRef<'a>, Error> {
        crate::validation::validate_module(file)?;

        let module_ref = ModuleInstance::alloc_module(file, extern_vals)?;

        for element_segment in file
            .element_section()
            .map(|es| es.entries())
            .unwrap_or(&[])
        {
            let offset_val = match eval_init_expr(element_segment.offset(), &module_ref)? {
                RuntimeValue::I32(v) => v as u32,
                other => {
                    return Err(Error::Validation(format!(
                        "element segment offset should evaluate to i32, got {:?}",
                        other.value_type()
                    )))
                }
            };

            let table_inst = module_ref
                .table_by_index(DEFAULT_TABLE_INDEX)
                .ok_or_else(|| {
                    Error::Instantiation("element segment requires a table".to_owned())
                })?;

            // This check also covers segments with zero members.
            if u64::from(offset_val) + element_segment.members().len() as u64
                > u64::from(table_inst.current_size())
            {
                return Err(Error::Instantiation(
                    "elements segment does not fit".to_string(),
                ));
            }

            for (j, func_idx) in element_segment.members().iter().enumerate() {
                let func = module_ref.func_by_index(*func_idx).ok_or_else(|| {
                    Error::Validation(format!(
                        "element segment refers to unknown function {}",
                        func_idx
                    ))
                })?;
                table_inst.set(offset_val + j as u32, Some(func))?;
            }
        }

        for data_segment in file.data_section().map(|ds| ds.entries()).unwrap_or(&[]) {
            let offset_val = match eval_init_expr(data_segment.offset(), &module_ref)? {
                RuntimeValue::I32(v) => v as u32,
                other => {
                    return Err(Error::Validation(format!(
                        "data segment offset should evaluate to i32, got {:?}",
                        other.value_type()
                    )))
                }
            };

            let memory_inst = module_ref
                .memory_by_index(DEFAULT_MEMORY_INDEX)
                .ok_or_else(|| {
                    Error::Instantiation("data segment requires a memory".to_owned())
                })?;
            memory_inst
                .set(offset_val, data_segment.value())
                .map_err(|_| Error::Instantiation("data segment does not fit".to_string()))?;
        }

        if let Some(start_fn_idx) = file.start_section() {
            if module_ref.func_by_index(start_fn_idx).is_none() {
                return Err(Error::Validation(format!(
                    "start section refers to unknown function {}",
                    start_fn_idx
                )));
            }
        }

        Ok(NotStartedModuleRef {
            file,
            instance: module_ref,
        })
    }

    /// Instantiates a module.
    ///
    /// In the case of successful instantiation this function returns a
    /// reference to a module whose `start` function has not been called.
    /// To complete instantiation, call [`run_start`] on the result; if you
    /// are certain the module has no `start` function, [`assert_no_start`]
    /// skips that step.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the module cannot be instantiated, e.g. if one of
    /// the imports cannot be satisfied or there is a mismatch between a
    /// requested import and the provided entity.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use wasmith::{ModuleInstance, ImportsBuilder, NopExternals};
    /// # fn func() -> Result<(), ::wasmith::Error> {
    /// # let file = wasmith::WasmFile::from_buffer(&[0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00])?;
    ///
    /// // ModuleInstance::new returns an instance whose `start` function
    /// // has not been called.
    /// let not_started = ModuleInstance::new(
    ///     &file,
    ///     &ImportsBuilder::default()
    /// )?;
    /// // Call `start` function if any.
    /// let instance = not_started.run_start(&mut NopExternals)?;
    ///
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// [`run_start`]: struct.NotStartedModuleRef.html#method.run_start
    /// [`assert_no_start`]: struct.NotStartedModuleRef.html#method.assert_no_start
    pub fn new<'f, I: ImportResolver>(
        file: &'f WasmFile,
        imports: &I,
    ) -> Result<NotStartedModuleRef<'f>, Error> {
        let mut extern_vals = Vec::new();
        for import_entry in file.import_section().map(|s| s.entries()).unwrap_or(&[]) {
            let module_name = import_entry.module();
            let field_name = import_entry.field();
            let extern_val = match import_entry.external() {
                External::Function(type_index) => {
                    let types = file.type_section().map(|s| s.types()).unwrap_or(&[]);
                    let func_type = types.get(*type_index as usize).ok_or_else(|| {
                        Error::Validation(format!(
                            "import {} refers to unknown type {}",
                            field_name, type_index
                        ))
                    })?;
                    let signature = Signature::from_function_type(func_type);
                    let func = imports.resolve_func(module_name, field_name, &signature)?;
                    ExternVal::Func(func)
                }
                External::Table(table_type) => {
                    let descriptor = TableDescriptor::from_table_type(table_type);
                    let table = imports.resolve_table(module_name, field_name, &descriptor)?;
                    ExternVal::Table(table)
                }
                External::Memory(memory_type) => {
                    let descriptor = MemoryDescriptor::from_memory_type(memory_type);
                    let memory = imports.resolve_memory(module_name, field_name, &descriptor)?;
                    ExternVal::Memory(memory)
                }
                External::Global(global_type) => {
                    let descriptor = GlobalDescriptor::from_global_type(global_type);
                    let global = imports.resolve_global(module_name, field_name, &descriptor)?;
                    ExternVal::Global(global)
                }
            };
            extern_vals.push(extern_val);
        }

        Self::with_externvals(file, extern_vals.iter())
    }

    /// Invokes an exported function by name.
    ///
    /// This function finds the exported function by name, and calls it with
    /// the provided arguments and external state.
    ///
    /// # Errors
    ///
    /// Returns `Err` if:
    ///
    /// - there is no export with the given name or it is not a function,
    /// - the given arguments don't match the function signature,
    /// - a trap occurred at execution time.
    pub fn invoke_export<E: Externals>(
        &self,
        func_name: &str,
        args: &[RuntimeValue],
        externals: &mut E,
    ) -> Result<Option<RuntimeValue>, Error> {
        let func_instance = self.func_by_name(func_name)?;
        FuncInstance::invoke(&func_instance, args, externals).map_err(Error::Trap)
    }

    /// Invokes an exported function by name with an explicit runner
    /// configuration.
    ///
    /// # Errors
    ///
    /// Same as [`invoke_export`].
    ///
    /// [`invoke_export`]: #method.invoke_export
    pub fn invoke_export_configured<E: Externals>(
        &self,
        func_name: &str,
        args: &[RuntimeValue],
        externals: &mut E,
        config: RunnerConfig,
    ) -> Result<Option<RuntimeValue>, Error> {
        let func_instance = self.func_by_name(func_name)?;
        FuncInstance::invoke_configured(&func_instance, args, externals, config)
            .map_err(Error::Trap)
    }

    fn func_by_name(&self, func_name: &str) -> Result<FuncRef, Error> {
        let extern_val = self
            .export_by_name(func_name)
            .ok_or_else(|| Error::Function(format!("module doesn't have export {}", func_name)))?;

        match extern_val {
            ExternVal::Func(func_instance) => Ok(func_instance),
            unexpected => Err(Error::Function(format!(
                "export {} is not a function, but {:?}",
                func_name, unexpected
            ))),
        }
    }

    /// Finds an export by name.
    ///
    /// Returns `None` if there is no export with such a name.
    pub fn export_by_name(&self, name: &str) -> Option<ExternVal> {
        self.exports.borrow().get(name).cloned()
    }
}

fn missing_export(field: &str, kind: &str, index: u32) -> Error {
    Error::Validation(format!(
        "export {} refers to unknown {} {}",
        field, kind, index
    ))
}

/// A mostly-instantiated [`ModuleRef`].
///
/// At this point memory and table segments have been copied, but the
/// `start` function (if any) has not been called. To get a fully
/// instantiated module, [run the `start` function][`run_start`].
///
/// If you are sure there is no `start` function (e.g. because you created
/// the module without one), [`assert_no_start`] returns the instance
/// without running anything; it panics if a `start` function exists.
///
/// [`ModuleRef`]: struct.ModuleRef.html
/// [`run_start`]: #method.run_start
/// [`assert_no_start`]: #method.assert_no_start
pub struct NotStartedModuleRef<'a> {
    file: &'a WasmFile,
    instance: ModuleRef,
}

impl<'a> NotStartedModuleRef<'a> {
    /// Returns the not fully initialized instance.
    ///
    /// The module may depend on initialization performed by its `start`
    /// function, so calling exports through this reference is an escape
    /// hatch, not the expected workflow.
    pub fn not_started_instance(&self) -> &ModuleRef {
        &self.instance
    }

    /// Executes the `start` function (if any) and returns the fully
    /// instantiated module.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the start function traps.
    pub fn run_start<E: Externals>(self, state: &mut E) -> Result<ModuleRef, Trap> {
        if let Some(start_fn_idx) = self.file.start_section() {
            let start_func = self
                .instance
                .func_by_index(start_fn_idx)
                .expect("start function index checked during instantiation");
            FuncInstance::invoke(&start_func, &[], state)?;
        }
        Ok(self.instance)
    }

    /// Returns the fully instantiated module without running the `start`
    /// function.
    ///
    /// # Panics
    ///
    /// Panics if the module contains a `start` function.
    pub fn assert_no_start(self) -> ModuleRef {
        assert!(
            self.file.start_section().is_none(),
            "assert_no_start called on module with `start` function"
        );
        self.instance
    }

    /// Whether the module has a `start` function.
    pub fn has_start(&self) -> bool {
        self.file.start_section().is_some()
    }
}

pub(crate) fn eval_init_expr(
    init_expr: &InitExpr,
    module: &ModuleInstance,
) -> Result<RuntimeValue, Error> {
    let code = init_expr.code();
    if code.len() != 1 {
        return Err(Error::Validation(format!(
            "initializer expression must be a single constant instruction, got {} instructions",
            code.len()
        )));
    }
    match code[0] {
        Instruction::I32Const(v) => Ok(v.into()),
        Instruction::I64Const(v) => Ok(v.into()),
        Instruction::F32Const(v) => Ok(RuntimeValue::decode_f32(v)),
        Instruction::F64Const(v) => Ok(RuntimeValue::decode_f64(v)),
        Instruction::GetGlobal(idx) => {
            let global = module.global_by_index(idx).ok_or_else(|| {
                Error::Validation(format!(
                    "initializer expression refers to unknown global {}",
                    idx
                ))
            })?;
            if global.is_mutable() {
                return Err(Error::Validation(
                    "initializer expression may only read immutable globals".into(),
                ));
            }
            Ok(global.get())
        }
        ref other => Err(Error::Validation(format!(
            "initializer expression may not contain `{}`",
            other.mnemonic()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::{ExternVal, ModuleInstance};
    use crate::elements::WasmFile;
    use crate::func::FuncInstance;
    use crate::imports::ImportsBuilder;
    use crate::text::assemble_str;
    use crate::types::{Signature, ValueType};

    fn parse_wat(source: &str) -> WasmFile {
        assemble_str(source).expect("failed to assemble test module")
    }

    #[should_panic]
    #[test]
    fn assert_no_start_panics_on_module_with_start() {
        let file = parse_wat(
            r#"
            (module
                (func $f)
                (start $f))
            "#,
        );
        let module = ModuleInstance::new(&file, &ImportsBuilder::default()).unwrap();
        assert!(module.has_start());
        module.assert_no_start();
    }

    #[test]
    fn imports_provided_by_externvals() {
        let file = parse_wat(
            r#"
            (module
                (import "foo" "bar" (func))
                )
            "#,
        );

        assert!(ModuleInstance::with_externvals(
            &file,
            [ExternVal::Func(FuncInstance::alloc_host(
                Signature::new(&[][..], None),
                0
            ))]
            .iter(),
        )
        .is_ok());

        // externval vector is longer than the import count.
        assert!(ModuleInstance::with_externvals(
            &file,
            [
                ExternVal::Func(FuncInstance::alloc_host(Signature::new(&[][..], None), 0)),
                ExternVal::Func(FuncInstance::alloc_host(Signature::new(&[][..], None), 1)),
            ]
            .iter(),
        )
        .is_err());

        // externval vector is shorter than the import count.
        assert!(ModuleInstance::with_externvals(&file, [].iter()).is_err());

        // externval has an unexpected signature.
        assert!(ModuleInstance::with_externvals(
            &file,
            [ExternVal::Func(FuncInstance::alloc_host(
                Signature::new(&[][..], Some(ValueType::I32)),
                0
            ))]
            .iter(),
        )
        .is_err());
    }
}
