//! Module validation: index-space checks and function-body type checking.
//!
//! Runs at instantiation time, before any storage is allocated. The body
//! checker is the usual abstract interpretation over a typed value stack
//! with a frame per block; a frame whose control flow can no longer be
//! reached becomes polymorphic and satisfies any pop.

use crate::elements::{expand_locals, External, FuncBody, InitExpr, Internal, WasmFile};
use crate::memory::validate_memory;
use crate::ops::{BrTableData, Instruction, MemArg};
use crate::types::{BlockType, FunctionType, GlobalType, ResizableLimits, ValueType};
use crate::Error;
use memory_units::wasm32::Pages;
use std::collections::HashSet;

struct ModuleContext<'a> {
    types: &'a [FunctionType],
    /// Type index of every function in the index space, imports first.
    func_type_indices: Vec<u32>,
    /// Types of every global in the index space, imports first.
    globals: Vec<GlobalType>,
    /// Number of imported globals; initializers may only read these.
    imported_globals: usize,
    tables: usize,
    memories: usize,
}

impl<'a> ModuleContext<'a> {
    fn require_function_type(&self, type_index: u32) -> Result<&FunctionType, Error> {
        self.types.get(type_index as usize).ok_or_else(|| {
            Error::Validation(format!("missing function type {}", type_index))
        })
    }

    fn require_function(&self, func_index: u32) -> Result<&FunctionType, Error> {
        let type_index = self
            .func_type_indices
            .get(func_index as usize)
            .ok_or_else(|| Error::Validation(format!("missing function {}", func_index)))?;
        self.require_function_type(*type_index)
    }

    fn require_global(&self, index: u32, mutability: Option<bool>) -> Result<&GlobalType, Error> {
        let global = self
            .globals
            .get(index as usize)
            .ok_or_else(|| Error::Validation(format!("missing global {}", index)))?;
        if let Some(expected) = mutability {
            if global.is_mutable() != expected {
                return Err(Error::Validation(format!(
                    "global {} is {}mutable",
                    index,
                    if global.is_mutable() { "" } else { "im" }
                )));
            }
        }
        Ok(global)
    }

    fn require_table(&self, index: u32) -> Result<(), Error> {
        if (index as usize) < self.tables {
            Ok(())
        } else {
            Err(Error::Validation(format!("missing table {}", index)))
        }
    }

    fn require_memory(&self, index: u32) -> Result<(), Error> {
        if (index as usize) < self.memories {
            Ok(())
        } else {
            Err(Error::Validation(format!("missing memory {}", index)))
        }
    }
}

/// Validates a decoded module: index spaces, section consistency and every
/// function body.
pub fn validate_module(file: &WasmFile) -> Result<(), Error> {
    let types = file.type_section().map(|ts| ts.types()).unwrap_or(&[]);

    let mut context = ModuleContext {
        types,
        func_type_indices: Vec::new(),
        globals: Vec::new(),
        imported_globals: 0,
        tables: 0,
        memories: 0,
    };

    if let Some(import_section) = file.import_section() {
        for import in import_section.entries() {
            match import.external() {
                External::Function(type_index) => {
                    context.require_function_type(*type_index)?;
                    context.func_type_indices.push(*type_index);
                }
                External::Table(table_type) => {
                    validate_limits(table_type.limits())?;
                    context.tables += 1;
                }
                External::Memory(memory_type) => {
                    validate_memory_limits(memory_type.limits())?;
                    context.memories += 1;
                }
                External::Global(global_type) => {
                    if global_type.is_mutable() {
                        return Err(Error::Validation(format!(
                            "trying to import mutable global {}",
                            import.field()
                        )));
                    }
                    context.globals.push(*global_type);
                }
            }
        }
    }
    context.imported_globals = context.globals.len();

    if let Some(function_section) = file.function_section() {
        for type_index in function_section.entries() {
            context.require_function_type(*type_index)?;
            context.func_type_indices.push(*type_index);
        }
    }
    if let Some(table_section) = file.table_section() {
        for table_type in table_section.entries() {
            validate_limits(table_type.limits())?;
            context.tables += 1;
        }
    }
    if let Some(memory_section) = file.memory_section() {
        for memory_type in memory_section.entries() {
            validate_memory_limits(memory_type.limits())?;
            context.memories += 1;
        }
    }
    if let Some(global_section) = file.global_section() {
        for global_entry in global_section.entries() {
            let init_ty = const_expr_type(global_entry.init_expr(), &context)?;
            if init_ty != global_entry.global_type().content_type() {
                return Err(Error::Validation(format!(
                    "trying to initialize a global of type {} with a value of type {}",
                    global_entry.global_type().content_type(),
                    init_ty
                )));
            }
            context.globals.push(*global_entry.global_type());
        }
    }

    if context.tables > 1 {
        return Err(Error::Validation(format!(
            "too many tables in index space: {}",
            context.tables
        )));
    }
    if context.memories > 1 {
        return Err(Error::Validation(format!(
            "too many memory regions in index space: {}",
            context.memories
        )));
    }

    let function_count = file
        .function_section()
        .map(|s| s.entries().len())
        .unwrap_or(0);
    let body_count = file.code_section().map(|s| s.bodies().len()).unwrap_or(0);
    if function_count != body_count {
        return Err(Error::Validation(format!(
            "length of function section is {}, while len of code section is {}",
            function_count, body_count
        )));
    }

    if let (Some(function_section), Some(code_section)) =
        (file.function_section(), file.code_section())
    {
        let imported_funcs = context.func_type_indices.len() - function_count;
        for (index, (type_index, body)) in Iterator::zip(
            function_section.entries().iter(),
            code_section.bodies().iter(),
        )
        .enumerate()
        {
            let func_type = context.require_function_type(*type_index)?;
            FunctionValidator::validate(&context, func_type, body).map_err(|e| {
                Error::Validation(format!(
                    "function #{} validation error: {}",
                    imported_funcs + index,
                    e
                ))
            })?;
        }
    }

    if let Some(start_fn_idx) = file.start_section() {
        let func_type = context.require_function(start_fn_idx)?;
        if !func_type.params().is_empty() || func_type.return_type().is_some() {
            return Err(Error::Validation(
                "start function expected to have type [] -> []".into(),
            ));
        }
    }

    if let Some(export_section) = file.export_section() {
        let mut export_names = HashSet::with_capacity(export_section.entries().len());
        for export in export_section.entries() {
            if !export_names.insert(export.field()) {
                return Err(Error::Validation(format!(
                    "duplicate export {}",
                    export.field()
                )));
            }
            match *export.internal() {
                Internal::Function(index) => {
                    context.require_function(index)?;
                }
                Internal::Global(index) => {
                    // Only immutable globals may cross the module
                    // boundary in the MVP.
                    context.require_global(index, Some(false))?;
                }
                Internal::Memory(index) => context.require_memory(index)?,
                Internal::Table(index) => context.require_table(index)?,
            }
        }
    }

    if let Some(data_section) = file.data_section() {
        for data_segment in data_section.entries() {
            context.require_memory(data_segment.memory_index())?;
            if const_expr_type(data_segment.offset(), &context)? != ValueType::I32 {
                return Err(Error::Validation("segment offset should return i32".into()));
            }
        }
    }

    if let Some(element_section) = file.element_section() {
        for element_segment in element_section.entries() {
            context.require_table(element_segment.table_index())?;
            if const_expr_type(element_segment.offset(), &context)? != ValueType::I32 {
                return Err(Error::Validation("segment offset should return i32".into()));
            }
            for function_index in element_segment.members() {
                context.require_function(*function_index)?;
            }
        }
    }

    Ok(())
}

fn validate_limits(limits: &ResizableLimits) -> Result<(), Error> {
    if let Some(maximum) = limits.maximum() {
        if limits.initial() > maximum {
            return Err(Error::Validation(format!(
                "maximum limit {} is less than minimum {}",
                maximum,
                limits.initial()
            )));
        }
    }
    Ok(())
}

fn validate_memory_limits(limits: &ResizableLimits) -> Result<(), Error> {
    let initial: Pages = Pages(limits.initial() as usize);
    let maximum: Option<Pages> = limits.maximum().map(|m| Pages(m as usize));
    validate_memory(initial, maximum).map_err(Error::Validation)
}

/// Returns the type of a constant expression, checking that it is in fact
/// constant: a single `*.const` or a read of an imported immutable global.
fn const_expr_type(init_expr: &InitExpr, context: &ModuleContext) -> Result<ValueType, Error> {
    let code = init_expr.code();
    if code.len() != 1 {
        return Err(Error::Validation(
            "initializer expression must consist of a single instruction".into(),
        ));
    }
    match code[0] {
        Instruction::I32Const(_) => Ok(ValueType::I32),
        Instruction::I64Const(_) => Ok(ValueType::I64),
        Instruction::F32Const(_) => Ok(ValueType::F32),
        Instruction::F64Const(_) => Ok(ValueType::F64),
        Instruction::GetGlobal(idx) => {
            if idx as usize >= context.imported_globals {
                return Err(Error::Validation(format!(
                    "global {} does not exist or is not yet defined",
                    idx
                )));
            }
            let global = context.require_global(idx, Some(false))?;
            Ok(global.content_type())
        }
        ref other => Err(Error::Validation(format!(
            "non-constant instruction `{}` in initializer expression",
            other.mnemonic()
        ))),
    }
}

/// Value type on the abstract stack; `Any` appears only in polymorphic
/// (unreachable) regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StackValueType {
    Any,
    Specific(ValueType),
}

impl StackValueType {
    fn matches(self, other: ValueType) -> bool {
        match self {
            StackValueType::Any => true,
            StackValueType::Specific(vt) => vt == other,
        }
    }
}

impl From<ValueType> for StackValueType {
    fn from(value_type: ValueType) -> Self {
        StackValueType::Specific(value_type)
    }
}

struct Frame {
    /// Type the block leaves on the stack.
    result: BlockType,
    /// Arity a branch to this label transfers: loops take branches to
    /// their start, which carries nothing in the MVP.
    branch_result: BlockType,
    stack_base: usize,
    polymorphic: bool,
}

struct FunctionValidator<'a> {
    context: &'a ModuleContext<'a>,
    locals: Vec<ValueType>,
    stack: Vec<StackValueType>,
    frames: Vec<Frame>,
}

impl<'a> FunctionValidator<'a> {
    fn validate(
        context: &ModuleContext,
        func_type: &FunctionType,
        body: &FuncBody,
    ) -> Result<(), Error> {
        let mut locals = func_type.params().to_vec();
        locals.extend(expand_locals(body.locals()));

        let mut validator = FunctionValidator {
            context,
            locals,
            stack: Vec::new(),
            frames: Vec::new(),
        };

        let result = BlockType(func_type.return_type());
        validator.validate_block(body.code(), result, result)?;
        Ok(())
    }

    fn push(&mut self, value: StackValueType) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Result<StackValueType, Error> {
        let frame = self.frames.last().expect("frame stack is never empty");
        if self.stack.len() == frame.stack_base {
            if frame.polymorphic {
                return Ok(StackValueType::Any);
            }
            return Err(Error::Validation("stack underflow".into()));
        }
        Ok(self.stack.pop().expect("length checked above"))
    }

    fn pop_expected(&mut self, expected: ValueType) -> Result<(), Error> {
        let actual = self.pop()?;
        if !actual.matches(expected) {
            return Err(Error::Validation(format!(
                "expected {} on the stack, found {:?}",
                expected, actual
            )));
        }
        Ok(())
    }

    fn mark_unreachable(&mut self) {
        let frame = self.frames.last_mut().expect("frame stack is never empty");
        frame.polymorphic = true;
        self.stack.truncate(frame.stack_base);
    }

    fn require_label(&self, depth: u32) -> Result<&Frame, Error> {
        let len = self.frames.len();
        (depth as usize)
            .checked_add(1)
            .filter(|d| *d <= len)
            .map(|d| &self.frames[len - d])
            .ok_or_else(|| Error::Validation(format!("unreachable label depth {}", depth)))
    }

    fn pop_branch_values(&mut self, depth: u32) -> Result<(), Error> {
        if let BlockType(Some(value_type)) = self.require_label(depth)?.branch_result {
            self.pop_expected(value_type)?;
        }
        Ok(())
    }

    /// Checks a branch without consuming the transferred values, as
    /// `br_if` falls through with them intact.
    fn peek_branch_values(&mut self, depth: u32) -> Result<(), Error> {
        if let BlockType(Some(value_type)) = self.require_label(depth)?.branch_result {
            self.pop_expected(value_type)?;
            self.push(value_type.into());
        }
        Ok(())
    }

    fn validate_block(
        &mut self,
        code: &[Instruction],
        result: BlockType,
        branch_result: BlockType,
    ) -> Result<(), Error> {
        self.frames.push(Frame {
            result,
            branch_result,
            stack_base: self.stack.len(),
            polymorphic: false,
        });

        for instruction in code {
            self.validate_instruction(instruction)?;
        }

        // The block's fall-through value.
        if let BlockType(Some(value_type)) = result {
            self.pop_expected(value_type)?;
        }
        let frame = self.frames.pop().expect("pushed above");
        if !frame.polymorphic && self.stack.len() != frame.stack_base {
            return Err(Error::Validation(format!(
                "{} superfluous values on the stack at the end of a block",
                self.stack.len() - frame.stack_base
            )));
        }
        self.stack.truncate(frame.stack_base);
        if let BlockType(Some(value_type)) = result {
            self.push(value_type.into());
        }
        Ok(())
    }

    fn local_type(&self, index: u32) -> Result<ValueType, Error> {
        self.locals
            .get(index as usize)
            .copied()
            .ok_or_else(|| Error::Validation(format!("missing local {}", index)))
    }

    fn validate_load(&mut self, arg: &MemArg, size: u32, result: ValueType) -> Result<(), Error> {
        self.context.require_memory(0)?;
        validate_alignment(arg, size)?;
        self.pop_expected(ValueType::I32)?;
        self.push(result.into());
        Ok(())
    }

    fn validate_store(&mut self, arg: &MemArg, size: u32, stored: ValueType) -> Result<(), Error> {
        self.context.require_memory(0)?;
        validate_alignment(arg, size)?;
        self.pop_expected(stored)?;
        self.pop_expected(ValueType::I32)?;
        Ok(())
    }

    fn validate_testop(&mut self, operand: ValueType) -> Result<(), Error> {
        self.pop_expected(operand)?;
        self.push(ValueType::I32.into());
        Ok(())
    }

    fn validate_relop(&mut self, operand: ValueType) -> Result<(), Error> {
        self.pop_expected(operand)?;
        self.pop_expected(operand)?;
        self.push(ValueType::I32.into());
        Ok(())
    }

    fn validate_unop(&mut self, operand: ValueType) -> Result<(), Error> {
        self.pop_expected(operand)?;
        self.push(operand.into());
        Ok(())
    }

    fn validate_binop(&mut self, operand: ValueType) -> Result<(), Error> {
        self.pop_expected(operand)?;
        self.pop_expected(operand)?;
        self.push(operand.into());
        Ok(())
    }

    fn validate_cvtop(&mut self, from: ValueType, to: ValueType) -> Result<(), Error> {
        self.pop_expected(from)?;
        self.push(to.into());
        Ok(())
    }

    fn validate_instruction(&mut self, instruction: &Instruction) -> Result<(), Error> {
        use crate::ops::Instruction::*;
        use ValueType::{F32, F64, I32, I64};

        match instruction {
            Nop => {}
            Unreachable => self.mark_unreachable(),

            Block(block_type, code) => {
                self.validate_block(code, *block_type, *block_type)?;
            }
            Loop(block_type, code) => {
                // A branch to a loop header carries no values.
                self.validate_block(code, *block_type, BlockType(None))?;
            }
            If(block_type, consequent, alternate) => {
                self.pop_expected(I32)?;
                if alternate.is_empty() && block_type.0.is_some() {
                    return Err(Error::Validation(format!(
                        "if block without else cannot produce a {}",
                        block_type.0.expect("checked by condition"),
                    )));
                }
                self.validate_block(consequent, *block_type, *block_type)?;
                if !alternate.is_empty() {
                    // The consequent's result is on the stack; the
                    // alternate starts from the same base.
                    if let BlockType(Some(value_type)) = block_type {
                        self.pop_expected(*value_type)?;
                    }
                    self.validate_block(alternate, *block_type, *block_type)?;
                }
            }
            Br(depth) => {
                self.pop_branch_values(*depth)?;
                self.mark_unreachable();
            }
            BrIf(depth) => {
                self.pop_expected(I32)?;
                self.peek_branch_values(*depth)?;
            }
            BrTable(data) => {
                let BrTableData { table, default } = &**data;
                self.pop_expected(I32)?;
                // All targets must agree with the default's arity.
                let default_result = self.require_label(*default)?.branch_result;
                for depth in table.iter() {
                    let result = self.require_label(*depth)?.branch_result;
                    if result != default_result {
                        return Err(Error::Validation(
                            "br_table targets disagree on label arity".into(),
                        ));
                    }
                }
                if let BlockType(Some(value_type)) = default_result {
                    self.pop_expected(value_type)?;
                }
                self.mark_unreachable();
            }
            Return => {
                if let BlockType(Some(value_type)) =
                    self.frames.first().expect("function frame").result
                {
                    self.pop_expected(value_type)?;
                }
                self.mark_unreachable();
            }
            Call(func_index) => {
                let func_type = self.context.require_function(*func_index)?.clone();
                for param in func_type.params().iter().rev() {
                    self.pop_expected(*param)?;
                }
                if let Some(result) = func_type.return_type() {
                    self.push(result.into());
                }
            }
            CallIndirect(type_index, _) => {
                self.context.require_table(0)?;
                let func_type = self.context.require_function_type(*type_index)?.clone();
                self.pop_expected(I32)?;
                for param in func_type.params().iter().rev() {
                    self.pop_expected(*param)?;
                }
                if let Some(result) = func_type.return_type() {
                    self.push(result.into());
                }
            }

            Drop => {
                self.pop()?;
            }
            Select => {
                self.pop_expected(I32)?;
                let first = self.pop()?;
                let second = self.pop()?;
                match (first, second) {
                    (StackValueType::Any, other) | (other, StackValueType::Any) => {
                        self.push(other)
                    }
                    (a, b) if a == b => self.push(a),
                    (a, b) => {
                        return Err(Error::Validation(format!(
                            "select operands disagree: {:?} vs {:?}",
                            a, b
                        )))
                    }
                }
            }

            GetLocal(index) => {
                let vt = self.local_type(*index)?;
                self.push(vt.into());
            }
            SetLocal(index) => {
                let vt = self.local_type(*index)?;
                self.pop_expected(vt)?;
            }
            TeeLocal(index) => {
                let vt = self.local_type(*index)?;
                self.pop_expected(vt)?;
                self.push(vt.into());
            }
            GetGlobal(index) => {
                let vt = self.context.require_global(*index, None)?.content_type();
                self.push(vt.into());
            }
            SetGlobal(index) => {
                let vt = self
                    .context
                    .require_global(*index, Some(true))?
                    .content_type();
                self.pop_expected(vt)?;
            }

            I32Load(arg) => self.validate_load(arg, 4, I32)?,
            I64Load(arg) => self.validate_load(arg, 8, I64)?,
            F32Load(arg) => self.validate_load(arg, 4, F32)?,
            F64Load(arg) => self.validate_load(arg, 8, F64)?,
            I32Load8S(arg) | I32Load8U(arg) => self.validate_load(arg, 1, I32)?,
            I32Load16S(arg) | I32Load16U(arg) => self.validate_load(arg, 2, I32)?,
            I64Load8S(arg) | I64Load8U(arg) => self.validate_load(arg, 1, I64)?,
            I64Load16S(arg) | I64Load16U(arg) => self.validate_load(arg, 2, I64)?,
            I64Load32S(arg) | I64Load32U(arg) => self.validate_load(arg, 4, I64)?,
            I32Store(arg) => self.validate_store(arg, 4, I32)?,
            I64Store(arg) => self.validate_store(arg, 8, I64)?,
            F32Store(arg) => self.validate_store(arg, 4, F32)?,
            F64Store(arg) => self.validate_store(arg, 8, F64)?,
            I32Store8(arg) => self.validate_store(arg, 1, I32)?,
            I32Store16(arg) => self.validate_store(arg, 2, I32)?,
            I64Store8(arg) => self.validate_store(arg, 1, I64)?,
            I64Store16(arg) => self.validate_store(arg, 2, I64)?,
            I64Store32(arg) => self.validate_store(arg, 4, I64)?,

            CurrentMemory(_) => {
                self.context.require_memory(0)?;
                self.push(I32.into());
            }
            GrowMemory(_) => {
                self.context.require_memory(0)?;
                self.pop_expected(I32)?;
                self.push(I32.into());
            }

            I32Const(_) => self.push(I32.into()),
            I64Const(_) => self.push(I64.into()),
            F32Const(_) => self.push(F32.into()),
            F64Const(_) => self.push(F64.into()),

            I32Eqz => self.validate_testop(I32)?,
            I64Eqz => {
                self.pop_expected(I64)?;
                self.push(I32.into());
            }
            I32Eq | I32Ne | I32LtS | I32LtU | I32GtS | I32GtU | I32LeS | I32LeU | I32GeS
            | I32GeU => self.validate_relop(I32)?,
            I64Eq | I64Ne | I64LtS | I64LtU | I64GtS | I64GtU | I64LeS | I64LeU | I64GeS
            | I64GeU => {
                self.pop_expected(I64)?;
                self.pop_expected(I64)?;
                self.push(I32.into());
            }
            F32Eq | F32Ne | F32Lt | F32Gt | F32Le | F32Ge => {
                self.pop_expected(F32)?;
                self.pop_expected(F32)?;
                self.push(I32.into());
            }
            F64Eq | F64Ne | F64Lt | F64Gt | F64Le | F64Ge => {
                self.pop_expected(F64)?;
                self.pop_expected(F64)?;
                self.push(I32.into());
            }

            I32Clz | I32Ctz | I32Popcnt => self.validate_unop(I32)?,
            I32Add | I32Sub | I32Mul | I32DivS | I32DivU | I32RemS | I32RemU | I32And | I32Or
            | I32Xor | I32Shl | I32ShrS | I32ShrU | I32Rotl | I32Rotr => {
                self.validate_binop(I32)?
            }
            I64Clz | I64Ctz | I64Popcnt => self.validate_unop(I64)?,
            I64Add | I64Sub | I64Mul | I64DivS | I64DivU | I64RemS | I64RemU | I64And | I64Or
            | I64Xor | I64Shl | I64ShrS | I64ShrU | I64Rotl | I64Rotr => {
                self.validate_binop(I64)?
            }
            F32Abs | F32Neg | F32Ceil | F32Floor | F32Trunc | F32Nearest | F32Sqrt => {
                self.validate_unop(F32)?
            }
            F32Add | F32Sub | F32Mul | F32Div | F32Min | F32Max | F32Copysign => {
                self.validate_binop(F32)?
            }
            F64Abs | F64Neg | F64Ceil | F64Floor | F64Trunc | F64Nearest | F64Sqrt => {
                self.validate_unop(F64)?
            }
            F64Add | F64Sub | F64Mul | F64Div | F64Min | F64Max | F64Copysign => {
                self.validate_binop(F64)?
            }

            I32WrapI64 => self.validate_cvtop(I64, I32)?,
            I32TruncSF32 | I32TruncUF32 => self.validate_cvtop(F32, I32)?,
            I32TruncSF64 | I32TruncUF64 => self.validate_cvtop(F64, I32)?,
            I64ExtendSI32 | I64ExtendUI32 => self.validate_cvtop(I32, I64)?,
            I64TruncSF32 | I64TruncUF32 => self.validate_cvtop(F32, I64)?,
            I64TruncSF64 | I64TruncUF64 => self.validate_cvtop(F64, I64)?,
            F32ConvertSI32 | F32ConvertUI32 => self.validate_cvtop(I32, F32)?,
            F32ConvertSI64 | F32ConvertUI64 => self.validate_cvtop(I64, F32)?,
            F32DemoteF64 => self.validate_cvtop(F64, F32)?,
            F64ConvertSI32 | F64ConvertUI32 => self.validate_cvtop(I32, F64)?,
            F64ConvertSI64 | F64ConvertUI64 => self.validate_cvtop(I64, F64)?,
            F64PromoteF32 => self.validate_cvtop(F32, F64)?,
            I32ReinterpretF32 => self.validate_cvtop(F32, I32)?,
            I64ReinterpretF64 => self.validate_cvtop(F64, I64)?,
            F32ReinterpretI32 => self.validate_cvtop(I32, F32)?,
            F64ReinterpretI64 => self.validate_cvtop(I64, F64)?,
        }
        Ok(())
    }
}

fn validate_alignment(arg: &MemArg, size: u32) -> Result<(), Error> {
    if arg.align >= 32 || (1u64 << arg.align) > u64::from(size) {
        return Err(Error::Validation(format!(
            "alignment 2^{} exceeds the natural alignment of a {}-byte access",
            arg.align, size
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::validate_module;
    use crate::text::assemble_str;
    use crate::Error;

    fn validate(source: &str) -> Result<(), Error> {
        let file = assemble_str(source).expect("assembly should succeed");
        validate_module(&file)
    }

    #[test]
    fn well_typed_module_passes() {
        assert!(validate(
            r#"
            (module
                (memory 1)
                (func (param i32) (result i32)
                    get_local 0
                    i32.const 1
                    i32.add))
            "#,
        )
        .is_ok());
    }

    #[test]
    fn stack_type_mismatch_fails() {
        assert!(validate(
            r#"
            (module
                (func (result i32)
                    i64.const 1))
            "#,
        )
        .is_err());
    }

    #[test]
    fn stack_underflow_fails() {
        assert!(validate(
            r#"
            (module
                (func (result i32)
                    i32.add))
            "#,
        )
        .is_err());
    }

    #[test]
    fn unreachable_makes_stack_polymorphic() {
        assert!(validate(
            r#"
            (module
                (func (result i32)
                    unreachable))
            "#,
        )
        .is_ok());
        assert!(validate(
            r#"
            (module
                (func (result i32)
                    unreachable
                    i32.add))
            "#,
        )
        .is_ok());
    }

    #[test]
    fn branch_depths_are_checked() {
        assert!(validate(
            r#"
            (module
                (func
                    block
                        br 2
                    end))
            "#,
        )
        .is_err());
    }

    #[test]
    fn loop_branches_carry_no_values() {
        assert!(validate(
            r#"
            (module
                (func (result i32)
                    loop (result i32)
                        i32.const 1
                        br 0
                    end))
            "#,
        )
        .is_ok());
    }

    #[test]
    fn set_of_immutable_global_fails() {
        assert!(validate(
            r#"
            (module
                (global $g i32 (i32.const 0))
                (func
                    i32.const 1
                    set_global $g))
            "#,
        )
        .is_err());
    }

    #[test]
    fn overaligned_access_fails() {
        assert!(validate(
            r#"
            (module
                (memory 1)
                (func (result i32)
                    i32.const 0
                    i32.load align=8))
            "#,
        )
        .is_err());
    }

    #[test]
    fn memory_is_required_for_loads() {
        assert!(validate(
            r#"
            (module
                (func (result i32)
                    i32.const 0
                    i32.load))
            "#,
        )
        .is_err());
    }
}
