//! The evaluation stack machine.
//!
//! Executes validated function bodies directly over the structured
//! instruction tree: every block form is run recursively and reports how
//! control left it through [`InstructionOutcome`]. Wasm calls map onto
//! host-stack recursion guarded by an explicit call-depth ceiling.

use crate::func::{FuncInstanceInternal, FuncRef};
use crate::host::Externals;
use crate::memory::MemoryRef;
use crate::module::{ModuleInstance, DEFAULT_MEMORY_INDEX, DEFAULT_TABLE_INDEX};
use crate::nan_preserving_float::{F32, F64};
use crate::ops::{BrTableData, Instruction, MemArg};
use crate::types::{BlockType, Signature};
use crate::value::{
    ArithmeticOps, ExtendInto, Float, FromRuntimeValue, Integer, LittleEndianConvert, RuntimeValue,
    TransmuteInto, TryTruncateInto, WrapInto,
};
use crate::{Trap, TrapCode};
use memory_units::wasm32::Pages;
use std::rc::Rc;

/// Default limit on the depth of the call stack, in frames.
///
/// Exceeding it traps with `call stack exhausted`.
pub const DEFAULT_CALL_STACK_LIMIT: usize = 256;

/// Default limit on the number of entries on the value stack.
pub const DEFAULT_VALUE_STACK_LIMIT: usize = 64 * 1024;

/// Execution policy knobs for a single invocation.
#[derive(Copy, Clone, Debug)]
pub struct RunnerConfig {
    /// Maximum call-stack depth before the `call stack exhausted` trap.
    pub call_stack_limit: usize,
    /// Maximum number of values on the operand stack.
    pub value_stack_limit: usize,
}

impl Default for RunnerConfig {
    fn default() -> RunnerConfig {
        RunnerConfig {
            call_stack_limit: DEFAULT_CALL_STACK_LIMIT,
            value_stack_limit: DEFAULT_VALUE_STACK_LIMIT,
        }
    }
}

impl RunnerConfig {
    /// Config with the given call-stack ceiling.
    pub fn with_call_stack_limit(call_stack_limit: usize) -> RunnerConfig {
        RunnerConfig {
            call_stack_limit,
            ..RunnerConfig::default()
        }
    }
}

/// Checks that the given arguments match the signature exactly.
pub(crate) fn check_function_args(
    signature: &Signature,
    args: &[RuntimeValue],
) -> Result<(), Trap> {
    if signature.params().len() != args.len() {
        return Err(TrapCode::UnexpectedSignature.into());
    }
    if signature
        .params()
        .iter()
        .zip(args)
        .any(|(expected, arg)| arg.value_type() != *expected)
    {
        return Err(TrapCode::UnexpectedSignature.into());
    }
    Ok(())
}

/// Interpreter action to take after executing an instruction.
enum InstructionOutcome {
    /// Continue with the next instruction.
    RunNextInstruction,
    /// Branch to the label at the given relative depth.
    Branch(u32),
    /// Unwind to the current function frame.
    Return,
}

/// Per-call state: the owning module, its default memory and the locals.
struct FunctionContext {
    module: Rc<ModuleInstance>,
    memory: Option<MemoryRef>,
    locals: Vec<RuntimeValue>,
}

impl FunctionContext {
    fn new(func: &FuncRef, args: &[RuntimeValue]) -> FunctionContext {
        let module = func
            .module()
            .expect("internal functions always hold their module");
        let body = func.body().expect("internal functions always have a body");
        let mut locals = args.to_vec();
        locals.extend(body.locals.iter().map(|vt| RuntimeValue::default(*vt)));
        let memory = module.memory_by_index(DEFAULT_MEMORY_INDEX);
        FunctionContext {
            module,
            memory,
            locals,
        }
    }

    fn memory(&self) -> &MemoryRef {
        self.memory
            .as_ref()
            .expect("due to validation memory exists for memory instructions")
    }
}

struct ValueStack {
    values: Vec<RuntimeValue>,
    limit: usize,
}

impl ValueStack {
    fn with_limit(limit: usize) -> ValueStack {
        ValueStack {
            values: Vec::new(),
            limit,
        }
    }

    fn push(&mut self, value: RuntimeValue) -> Result<(), Trap> {
        if self.values.len() >= self.limit {
            return Err(TrapCode::StackOverflow.into());
        }
        self.values.push(value);
        Ok(())
    }

    fn pop(&mut self) -> RuntimeValue {
        self.values
            .pop()
            .expect("due to validation the stack cannot underflow")
    }

    fn pop_as<T: FromRuntimeValue>(&mut self) -> T {
        self.pop()
            .try_into()
            .expect("due to validation the popped value has the expected type")
    }

    fn pop_pair_as<T: FromRuntimeValue>(&mut self) -> (T, T) {
        let right = self.pop_as();
        let left = self.pop_as();
        (left, right)
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn truncate(&mut self, new_len: usize) {
        self.values.truncate(new_len);
    }
}

/// The function interpreter.
pub(crate) struct Interpreter<'a, E: Externals + 'a> {
    externals: &'a mut E,
    value_stack: ValueStack,
    call_depth: usize,
    config: RunnerConfig,
}

impl<'a, E: Externals> Interpreter<'a, E> {
    pub fn new(externals: &'a mut E, config: RunnerConfig) -> Interpreter<'a, E> {
        Interpreter {
            externals,
            value_stack: ValueStack::with_limit(config.value_stack_limit),
            call_depth: 0,
            config,
        }
    }

    /// Runs the given function to completion and returns its result.
    pub fn invoke(
        mut self,
        func: &FuncRef,
        args: &[RuntimeValue],
    ) -> Result<Option<RuntimeValue>, Trap> {
        let result = self.call_function(func, args)?;
        debug_assert!(self.value_stack.len() == 0);
        Ok(result)
    }

    /// Calls a function, wasm or host, bumping the call-depth counter.
    fn call_function(
        &mut self,
        func: &FuncRef,
        args: &[RuntimeValue],
    ) -> Result<Option<RuntimeValue>, Trap> {
        if self.call_depth >= self.config.call_stack_limit {
            return Err(TrapCode::StackOverflow.into());
        }
        self.call_depth += 1;
        let result = self.dispatch_call(func, args);
        self.call_depth -= 1;
        result
    }

    fn dispatch_call(
        &mut self,
        func: &FuncRef,
        args: &[RuntimeValue],
    ) -> Result<Option<RuntimeValue>, Trap> {
        match *func.as_internal() {
            FuncInstanceInternal::Internal { .. } => self.run_function(func, args),
            FuncInstanceInternal::Host {
                ref host_func_index,
                ref signature,
            } => {
                let return_val = self.externals.invoke_index(*host_func_index, args.into())?;

                // The host is untyped; hold it to the signature it
                // registered with.
                let value_ty = return_val.as_ref().map(|val| val.value_type());
                let expected_ty = signature.return_type();
                if value_ty != expected_ty {
                    return Err(TrapCode::UnexpectedSignature.into());
                }
                Ok(return_val)
            }
        }
    }

    fn run_function(
        &mut self,
        func: &FuncRef,
        args: &[RuntimeValue],
    ) -> Result<Option<RuntimeValue>, Trap> {
        let body = func.body().expect("internal functions always have a body");
        let mut context = FunctionContext::new(func, args);

        let stack_base = self.value_stack.len();
        self.run_expression(&mut context, &body.code)?;

        let result = func
            .signature()
            .return_type()
            .map(|_| self.value_stack.pop());
        self.value_stack.truncate(stack_base);
        Ok(result)
    }

    fn run_expression(
        &mut self,
        context: &mut FunctionContext,
        code: &[Instruction],
    ) -> Result<InstructionOutcome, Trap> {
        for instruction in code {
            match self.run_instruction(context, instruction)? {
                InstructionOutcome::RunNextInstruction => {}
                outcome => return Ok(outcome),
            }
        }
        Ok(InstructionOutcome::RunNextInstruction)
    }

    /// Pops the label's transfer values and drops everything else pushed
    /// since the block was entered.
    fn unwind(&mut self, stack_base: usize, arity: usize) -> Result<(), Trap> {
        if arity == 0 {
            self.value_stack.truncate(stack_base);
        } else {
            let value = self.value_stack.pop();
            self.value_stack.truncate(stack_base);
            self.value_stack.push(value)?;
        }
        Ok(())
    }

    fn run_block(
        &mut self,
        context: &mut FunctionContext,
        block_type: BlockType,
        code: &[Instruction],
    ) -> Result<InstructionOutcome, Trap> {
        let stack_base = self.value_stack.len();
        match self.run_expression(context, code)? {
            InstructionOutcome::RunNextInstruction => Ok(InstructionOutcome::RunNextInstruction),
            InstructionOutcome::Branch(0) => {
                self.unwind(stack_base, block_type.arity())?;
                Ok(InstructionOutcome::RunNextInstruction)
            }
            InstructionOutcome::Branch(depth) => Ok(InstructionOutcome::Branch(depth - 1)),
            InstructionOutcome::Return => Ok(InstructionOutcome::Return),
        }
    }

    fn run_loop(
        &mut self,
        context: &mut FunctionContext,
        code: &[Instruction],
    ) -> Result<InstructionOutcome, Trap> {
        let stack_base = self.value_stack.len();
        loop {
            match self.run_expression(context, code)? {
                InstructionOutcome::RunNextInstruction => {
                    return Ok(InstructionOutcome::RunNextInstruction)
                }
                // A branch to a loop label restarts the loop with an
                // empty transfer.
                InstructionOutcome::Branch(0) => {
                    self.value_stack.truncate(stack_base);
                }
                InstructionOutcome::Branch(depth) => {
                    return Ok(InstructionOutcome::Branch(depth - 1))
                }
                InstructionOutcome::Return => return Ok(InstructionOutcome::Return),
            }
        }
    }

    fn run_if(
        &mut self,
        context: &mut FunctionContext,
        block_type: BlockType,
        consequent: &[Instruction],
        alternate: &[Instruction],
    ) -> Result<InstructionOutcome, Trap> {
        let condition: bool = self.value_stack.pop_as();
        let code = if condition { consequent } else { alternate };
        self.run_block(context, block_type, code)
    }

    fn run_call(
        &mut self,
        context: &mut FunctionContext,
        func_index: u32,
    ) -> Result<InstructionOutcome, Trap> {
        let func = context
            .module
            .func_by_index(func_index)
            .expect("due to validation the called function exists");
        self.run_invocation(&func)
    }

    fn run_call_indirect(
        &mut self,
        context: &mut FunctionContext,
        type_index: u32,
    ) -> Result<InstructionOutcome, Trap> {
        let table_slot: u32 = self.value_stack.pop_as();
        let table = context
            .module
            .table_by_index(DEFAULT_TABLE_INDEX)
            .expect("due to validation the table exists");
        let func = table
            .get(table_slot)
            .map_err(|_| TrapCode::TableAccessOutOfBounds)?
            .ok_or(TrapCode::ElemUninitialized)?;

        let expected = context
            .module
            .signature_by_index(type_index)
            .expect("due to validation the signature exists");
        if &*expected != func.signature() {
            return Err(TrapCode::UnexpectedSignature.into());
        }
        self.run_invocation(&func)
    }

    fn run_invocation(&mut self, func: &FuncRef) -> Result<InstructionOutcome, Trap> {
        let param_count = func.signature().params().len();
        let mut args = vec![RuntimeValue::I32(0); param_count];
        for slot in args.iter_mut().rev() {
            *slot = self.value_stack.pop();
        }
        if let Some(return_val) = self.call_function(func, &args)? {
            self.value_stack.push(return_val)?;
        }
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn effective_address(arg: &MemArg, base: u32) -> Result<u32, Trap> {
        u64::from(base)
            .checked_add(u64::from(arg.offset))
            .filter(|address| *address <= u64::from(u32::MAX))
            .map(|address| address as u32)
            .ok_or_else(|| TrapCode::MemoryAccessOutOfBounds.into())
    }

    fn run_load<T>(
        &mut self,
        context: &mut FunctionContext,
        arg: &MemArg,
    ) -> Result<InstructionOutcome, Trap>
    where
        T: LittleEndianConvert + Into<RuntimeValue>,
    {
        let base: u32 = self.value_stack.pop_as();
        let address = Self::effective_address(arg, base)?;
        let value: T = context
            .memory()
            .get_value(address)
            .map_err(|_| TrapCode::MemoryAccessOutOfBounds)?;
        self.value_stack.push(value.into())?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_load_extend<T, U>(
        &mut self,
        context: &mut FunctionContext,
        arg: &MemArg,
    ) -> Result<InstructionOutcome, Trap>
    where
        T: LittleEndianConvert + ExtendInto<U>,
        U: Into<RuntimeValue>,
    {
        let base: u32 = self.value_stack.pop_as();
        let address = Self::effective_address(arg, base)?;
        let narrow: T = context
            .memory()
            .get_value(address)
            .map_err(|_| TrapCode::MemoryAccessOutOfBounds)?;
        self.value_stack.push(narrow.extend_into().into())?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_store<T>(
        &mut self,
        context: &mut FunctionContext,
        arg: &MemArg,
    ) -> Result<InstructionOutcome, Trap>
    where
        T: FromRuntimeValue + LittleEndianConvert,
    {
        let value: T = self.value_stack.pop_as();
        let base: u32 = self.value_stack.pop_as();
        let address = Self::effective_address(arg, base)?;
        context
            .memory()
            .set_value(address, value)
            .map_err(|_| TrapCode::MemoryAccessOutOfBounds)?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_store_wrap<T, U>(
        &mut self,
        context: &mut FunctionContext,
        arg: &MemArg,
    ) -> Result<InstructionOutcome, Trap>
    where
        T: FromRuntimeValue + WrapInto<U>,
        U: LittleEndianConvert,
    {
        let value: T = self.value_stack.pop_as();
        let base: u32 = self.value_stack.pop_as();
        let address = Self::effective_address(arg, base)?;
        context
            .memory()
            .set_value(address, value.wrap_into())
            .map_err(|_| TrapCode::MemoryAccessOutOfBounds)?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_current_memory(
        &mut self,
        context: &mut FunctionContext,
    ) -> Result<InstructionOutcome, Trap> {
        let pages = context.memory().current_size().0;
        self.value_stack.push(RuntimeValue::I32(pages as i32))?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_grow_memory(
        &mut self,
        context: &mut FunctionContext,
    ) -> Result<InstructionOutcome, Trap> {
        let additional: u32 = self.value_stack.pop_as();
        // Failure to grow is the -1 sentinel, not a trap.
        let result = match context.memory().grow(Pages(additional as usize)) {
            Ok(previous) => previous.0 as i32,
            Err(_) => -1,
        };
        self.value_stack.push(RuntimeValue::I32(result))?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_select(&mut self) -> Result<InstructionOutcome, Trap> {
        let condition: bool = self.value_stack.pop_as();
        let right = self.value_stack.pop();
        let left = self.value_stack.pop();
        self.value_stack
            .push(if condition { left } else { right })?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_eqz<T>(&mut self) -> Result<InstructionOutcome, Trap>
    where
        T: FromRuntimeValue + PartialEq<T> + Default,
    {
        let value: T = self.value_stack.pop_as();
        self.value_stack
            .push(RuntimeValue::I32((value == T::default()) as i32))?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_relop<T, F>(&mut self, compare: F) -> Result<InstructionOutcome, Trap>
    where
        T: FromRuntimeValue,
        F: FnOnce(T, T) -> bool,
    {
        let (left, right) = self.value_stack.pop_pair_as::<T>();
        self.value_stack
            .push(RuntimeValue::I32(compare(left, right) as i32))?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_unop<T, U, F>(&mut self, op: F) -> Result<InstructionOutcome, Trap>
    where
        T: FromRuntimeValue,
        U: Into<RuntimeValue>,
        F: FnOnce(T) -> U,
    {
        let value: T = self.value_stack.pop_as();
        self.value_stack.push(op(value).into())?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_binop<T, F>(&mut self, op: F) -> Result<InstructionOutcome, Trap>
    where
        T: FromRuntimeValue + Into<RuntimeValue>,
        F: FnOnce(T, T) -> T,
    {
        let (left, right) = self.value_stack.pop_pair_as::<T>();
        self.value_stack.push(op(left, right).into())?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_binop_trap<T, F>(&mut self, op: F) -> Result<InstructionOutcome, Trap>
    where
        T: FromRuntimeValue + Into<RuntimeValue>,
        F: FnOnce(T, T) -> Result<T, TrapCode>,
    {
        let (left, right) = self.value_stack.pop_pair_as::<T>();
        self.value_stack.push(op(left, right)?.into())?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_trunc_to_int<F, I>(&mut self) -> Result<InstructionOutcome, Trap>
    where
        F: FromRuntimeValue + TryTruncateInto<I, TrapCode>,
        I: Into<RuntimeValue>,
    {
        let value: F = self.value_stack.pop_as();
        self.value_stack.push(value.try_truncate_into()?.into())?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_extend<T, U>(&mut self) -> Result<InstructionOutcome, Trap>
    where
        T: FromRuntimeValue + ExtendInto<U>,
        U: Into<RuntimeValue>,
    {
        let value: T = self.value_stack.pop_as();
        self.value_stack.push(value.extend_into().into())?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_wrap<T, U>(&mut self) -> Result<InstructionOutcome, Trap>
    where
        T: FromRuntimeValue + WrapInto<U>,
        U: Into<RuntimeValue>,
    {
        let value: T = self.value_stack.pop_as();
        self.value_stack.push(value.wrap_into().into())?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_reinterpret<T, U>(&mut self) -> Result<InstructionOutcome, Trap>
    where
        T: FromRuntimeValue + TransmuteInto<U>,
        U: Into<RuntimeValue>,
    {
        let value: T = self.value_stack.pop_as();
        self.value_stack.push(value.transmute_into().into())?;
        Ok(InstructionOutcome::RunNextInstruction)
    }

    fn run_instruction(
        &mut self,
        context: &mut FunctionContext,
        instruction: &Instruction,
    ) -> Result<InstructionOutcome, Trap> {
        use crate::ops::Instruction::*;

        match instruction {
            Unreachable => Err(TrapCode::Unreachable.into()),
            Nop => Ok(InstructionOutcome::RunNextInstruction),

            Block(block_type, code) => self.run_block(context, *block_type, code),
            Loop(_, code) => self.run_loop(context, code),
            If(block_type, consequent, alternate) => {
                self.run_if(context, *block_type, consequent, alternate)
            }
            Br(depth) => Ok(InstructionOutcome::Branch(*depth)),
            BrIf(depth) => {
                let condition: bool = self.value_stack.pop_as();
                if condition {
                    Ok(InstructionOutcome::Branch(*depth))
                } else {
                    Ok(InstructionOutcome::RunNextInstruction)
                }
            }
            BrTable(data) => {
                let BrTableData { table, default } = &**data;
                let index: u32 = self.value_stack.pop_as();
                let depth = table.get(index as usize).copied().unwrap_or(*default);
                Ok(InstructionOutcome::Branch(depth))
            }
            Return => Ok(InstructionOutcome::Return),

            Call(func_index) => self.run_call(context, *func_index),
            CallIndirect(type_index, _) => self.run_call_indirect(context, *type_index),

            Drop => {
                self.value_stack.pop();
                Ok(InstructionOutcome::RunNextInstruction)
            }
            Select => self.run_select(),

            GetLocal(index) => {
                let value = context.locals[*index as usize];
                self.value_stack.push(value)?;
                Ok(InstructionOutcome::RunNextInstruction)
            }
            SetLocal(index) => {
                let value = self.value_stack.pop();
                context.locals[*index as usize] = value;
                Ok(InstructionOutcome::RunNextInstruction)
            }
            TeeLocal(index) => {
                let value = self.value_stack.pop();
                context.locals[*index as usize] = value;
                self.value_stack.push(value)?;
                Ok(InstructionOutcome::RunNextInstruction)
            }
            GetGlobal(index) => {
                let global = context
                    .module
                    .global_by_index(*index)
                    .expect("due to validation the global exists");
                self.value_stack.push(global.get())?;
                Ok(InstructionOutcome::RunNextInstruction)
            }
            SetGlobal(index) => {
                let value = self.value_stack.pop();
                let global = context
                    .module
                    .global_by_index(*index)
                    .expect("due to validation the global exists");
                global
                    .set(value)
                    .expect("due to validation the global is mutable and types match");
                Ok(InstructionOutcome::RunNextInstruction)
            }

            I32Load(arg) => self.run_load::<i32>(context, arg),
            I64Load(arg) => self.run_load::<i64>(context, arg),
            F32Load(arg) => self.run_load::<F32>(context, arg),
            F64Load(arg) => self.run_load::<F64>(context, arg),
            I32Load8S(arg) => self.run_load_extend::<i8, i32>(context, arg),
            I32Load8U(arg) => self.run_load_extend::<u8, i32>(context, arg),
            I32Load16S(arg) => self.run_load_extend::<i16, i32>(context, arg),
            I32Load16U(arg) => self.run_load_extend::<u16, i32>(context, arg),
            I64Load8S(arg) => self.run_load_extend::<i8, i64>(context, arg),
            I64Load8U(arg) => self.run_load_extend::<u8, i64>(context, arg),
            I64Load16S(arg) => self.run_load_extend::<i16, i64>(context, arg),
            I64Load16U(arg) => self.run_load_extend::<u16, i64>(context, arg),
            I64Load32S(arg) => self.run_load_extend::<i32, i64>(context, arg),
            I64Load32U(arg) => self.run_load_extend::<u32, u64>(context, arg),
            I32Store(arg) => self.run_store::<i32>(context, arg),
            I64Store(arg) => self.run_store::<i64>(context, arg),
            F32Store(arg) => self.run_store::<F32>(context, arg),
            F64Store(arg) => self.run_store::<F64>(context, arg),
            I32Store8(arg) => self.run_store_wrap::<i32, i8>(context, arg),
            I32Store16(arg) => self.run_store_wrap::<i32, i16>(context, arg),
            I64Store8(arg) => self.run_store_wrap::<i64, i8>(context, arg),
            I64Store16(arg) => self.run_store_wrap::<i64, i16>(context, arg),
            I64Store32(arg) => self.run_store_wrap::<i64, i32>(context, arg),

            CurrentMemory(_) => self.run_current_memory(context),
            GrowMemory(_) => self.run_grow_memory(context),

            I32Const(value) => {
                self.value_stack.push(RuntimeValue::I32(*value))?;
                Ok(InstructionOutcome::RunNextInstruction)
            }
            I64Const(value) => {
                self.value_stack.push(RuntimeValue::I64(*value))?;
                Ok(InstructionOutcome::RunNextInstruction)
            }
            F32Const(bits) => {
                self.value_stack.push(RuntimeValue::decode_f32(*bits))?;
                Ok(InstructionOutcome::RunNextInstruction)
            }
            F64Const(bits) => {
                self.value_stack.push(RuntimeValue::decode_f64(*bits))?;
                Ok(InstructionOutcome::RunNextInstruction)
            }

            I32Eqz => self.run_eqz::<i32>(),
            I64Eqz => self.run_eqz::<i64>(),
            I32Eq => self.run_relop(|l: i32, r: i32| l == r),
            I32Ne => self.run_relop(|l: i32, r: i32| l != r),
            I32LtS => self.run_relop(|l: i32, r: i32| l < r),
            I32LtU => self.run_relop(|l: u32, r: u32| l < r),
            I32GtS => self.run_relop(|l: i32, r: i32| l > r),
            I32GtU => self.run_relop(|l: u32, r: u32| l > r),
            I32LeS => self.run_relop(|l: i32, r: i32| l <= r),
            I32LeU => self.run_relop(|l: u32, r: u32| l <= r),
            I32GeS => self.run_relop(|l: i32, r: i32| l >= r),
            I32GeU => self.run_relop(|l: u32, r: u32| l >= r),
            I64Eq => self.run_relop(|l: i64, r: i64| l == r),
            I64Ne => self.run_relop(|l: i64, r: i64| l != r),
            I64LtS => self.run_relop(|l: i64, r: i64| l < r),
            I64LtU => self.run_relop(|l: u64, r: u64| l < r),
            I64GtS => self.run_relop(|l: i64, r: i64| l > r),
            I64GtU => self.run_relop(|l: u64, r: u64| l > r),
            I64LeS => self.run_relop(|l: i64, r: i64| l <= r),
            I64LeU => self.run_relop(|l: u64, r: u64| l <= r),
            I64GeS => self.run_relop(|l: i64, r: i64| l >= r),
            I64GeU => self.run_relop(|l: u64, r: u64| l >= r),
            F32Eq => self.run_relop(|l: F32, r: F32| l == r),
            F32Ne => self.run_relop(|l: F32, r: F32| l != r),
            F32Lt => self.run_relop(|l: F32, r: F32| l < r),
            F32Gt => self.run_relop(|l: F32, r: F32| l > r),
            F32Le => self.run_relop(|l: F32, r: F32| l <= r),
            F32Ge => self.run_relop(|l: F32, r: F32| l >= r),
            F64Eq => self.run_relop(|l: F64, r: F64| l == r),
            F64Ne => self.run_relop(|l: F64, r: F64| l != r),
            F64Lt => self.run_relop(|l: F64, r: F64| l < r),
            F64Gt => self.run_relop(|l: F64, r: F64| l > r),
            F64Le => self.run_relop(|l: F64, r: F64| l <= r),
            F64Ge => self.run_relop(|l: F64, r: F64| l >= r),

            I32Clz => self.run_unop(|v: i32| Integer::leading_zeros(v)),
            I32Ctz => self.run_unop(|v: i32| Integer::trailing_zeros(v)),
            I32Popcnt => self.run_unop(|v: i32| Integer::count_ones(v)),
            I32Add => self.run_binop(|l: i32, r| ArithmeticOps::add(l, r)),
            I32Sub => self.run_binop(|l: i32, r| ArithmeticOps::sub(l, r)),
            I32Mul => self.run_binop(|l: i32, r| ArithmeticOps::mul(l, r)),
            I32DivS => self.run_binop_trap(|l: i32, r| ArithmeticOps::div(l, r)),
            I32DivU => self.run_binop_trap(|l: u32, r| ArithmeticOps::div(l, r)),
            I32RemS => self.run_binop_trap(|l: i32, r| Integer::rem(l, r)),
            I32RemU => self.run_binop_trap(|l: u32, r| Integer::rem(l, r)),
            I32And => self.run_binop(|l: i32, r| l & r),
            I32Or => self.run_binop(|l: i32, r| l | r),
            I32Xor => self.run_binop(|l: i32, r| l ^ r),
            I32Shl => self.run_binop(|l: i32, r| l.wrapping_shl(r as u32)),
            I32ShrS => self.run_binop(|l: i32, r| l.wrapping_shr(r as u32)),
            I32ShrU => self.run_binop(|l: u32, r| l.wrapping_shr(r)),
            I32Rotl => self.run_binop(|l: i32, r| Integer::rotl(l, r)),
            I32Rotr => self.run_binop(|l: i32, r| Integer::rotr(l, r)),
            I64Clz => self.run_unop(|v: i64| Integer::leading_zeros(v)),
            I64Ctz => self.run_unop(|v: i64| Integer::trailing_zeros(v)),
            I64Popcnt => self.run_unop(|v: i64| Integer::count_ones(v)),
            I64Add => self.run_binop(|l: i64, r| ArithmeticOps::add(l, r)),
            I64Sub => self.run_binop(|l: i64, r| ArithmeticOps::sub(l, r)),
            I64Mul => self.run_binop(|l: i64, r| ArithmeticOps::mul(l, r)),
            I64DivS => self.run_binop_trap(|l: i64, r| ArithmeticOps::div(l, r)),
            I64DivU => self.run_binop_trap(|l: u64, r| ArithmeticOps::div(l, r)),
            I64RemS => self.run_binop_trap(|l: i64, r| Integer::rem(l, r)),
            I64RemU => self.run_binop_trap(|l: u64, r| Integer::rem(l, r)),
            I64And => self.run_binop(|l: i64, r| l & r),
            I64Or => self.run_binop(|l: i64, r| l | r),
            I64Xor => self.run_binop(|l: i64, r| l ^ r),
            I64Shl => self.run_binop(|l: i64, r| l.wrapping_shl(r as u32)),
            I64ShrS => self.run_binop(|l: i64, r| l.wrapping_shr(r as u32)),
            I64ShrU => self.run_binop(|l: u64, r| l.wrapping_shr(r as u32)),
            I64Rotl => self.run_binop(|l: i64, r| Integer::rotl(l, r)),
            I64Rotr => self.run_binop(|l: i64, r| Integer::rotr(l, r)),

            F32Abs => self.run_unop(|v: F32| Float::abs(v)),
            F32Neg => self.run_unop(|v: F32| -v),
            F32Ceil => self.run_unop(|v: F32| Float::ceil(v)),
            F32Floor => self.run_unop(|v: F32| Float::floor(v)),
            F32Trunc => self.run_unop(|v: F32| Float::trunc(v)),
            F32Nearest => self.run_unop(|v: F32| Float::nearest(v)),
            F32Sqrt => self.run_unop(|v: F32| Float::sqrt(v)),
            F32Add => self.run_binop(|l: F32, r| ArithmeticOps::add(l, r)),
            F32Sub => self.run_binop(|l: F32, r| ArithmeticOps::sub(l, r)),
            F32Mul => self.run_binop(|l: F32, r| ArithmeticOps::mul(l, r)),
            F32Div => self.run_binop_trap(|l: F32, r| ArithmeticOps::div(l, r)),
            F32Min => self.run_binop(|l: F32, r| Float::min(l, r)),
            F32Max => self.run_binop(|l: F32, r| Float::max(l, r)),
            F32Copysign => self.run_binop(|l: F32, r| Float::copysign(l, r)),
            F64Abs => self.run_unop(|v: F64| Float::abs(v)),
            F64Neg => self.run_unop(|v: F64| -v),
            F64Ceil => self.run_unop(|v: F64| Float::ceil(v)),
            F64Floor => self.run_unop(|v: F64| Float::floor(v)),
            F64Trunc => self.run_unop(|v: F64| Float::trunc(v)),
            F64Nearest => self.run_unop(|v: F64| Float::nearest(v)),
            F64Sqrt => self.run_unop(|v: F64| Float::sqrt(v)),
            F64Add => self.run_binop(|l: F64, r| ArithmeticOps::add(l, r)),
            F64Sub => self.run_binop(|l: F64, r| ArithmeticOps::sub(l, r)),
            F64Mul => self.run_binop(|l: F64, r| ArithmeticOps::mul(l, r)),
            F64Div => self.run_binop_trap(|l: F64, r| ArithmeticOps::div(l, r)),
            F64Min => self.run_binop(|l: F64, r| Float::min(l, r)),
            F64Max => self.run_binop(|l: F64, r| Float::max(l, r)),
            F64Copysign => self.run_binop(|l: F64, r| Float::copysign(l, r)),

            I32WrapI64 => self.run_wrap::<i64, i32>(),
            I32TruncSF32 => self.run_trunc_to_int::<F32, i32>(),
            I32TruncUF32 => self.run_trunc_to_int::<F32, u32>(),
            I32TruncSF64 => self.run_trunc_to_int::<F64, i32>(),
            I32TruncUF64 => self.run_trunc_to_int::<F64, u32>(),
            I64ExtendSI32 => self.run_extend::<i32, i64>(),
            I64ExtendUI32 => self.run_extend::<u32, u64>(),
            I64TruncSF32 => self.run_trunc_to_int::<F32, i64>(),
            I64TruncUF32 => self.run_trunc_to_int::<F32, u64>(),
            I64TruncSF64 => self.run_trunc_to_int::<F64, i64>(),
            I64TruncUF64 => self.run_trunc_to_int::<F64, u64>(),
            F32ConvertSI32 => self.run_extend::<i32, F32>(),
            F32ConvertUI32 => self.run_extend::<u32, F32>(),
            F32ConvertSI64 => self.run_extend::<i64, F32>(),
            F32ConvertUI64 => self.run_extend::<u64, F32>(),
            F32DemoteF64 => self.run_wrap::<F64, F32>(),
            F64ConvertSI32 => self.run_extend::<i32, F64>(),
            F64ConvertUI32 => self.run_extend::<u32, F64>(),
            F64ConvertSI64 => self.run_extend::<i64, F64>(),
            F64ConvertUI64 => self.run_extend::<u64, F64>(),
            F64PromoteF32 => self.run_extend::<F32, F64>(),
            I32ReinterpretF32 => self.run_reinterpret::<F32, i32>(),
            I64ReinterpretF64 => self.run_reinterpret::<F64, i64>(),
            F32ReinterpretI32 => self.run_reinterpret::<i32, F32>(),
            F64ReinterpretI64 => self.run_reinterpret::<i64, F64>(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::check_function_args;
    use crate::types::{Signature, ValueType};
    use crate::value::RuntimeValue;

    #[test]
    fn argument_type_mismatch_is_rejected() {
        let signature = Signature::new(&[ValueType::I32][..], None);
        assert!(check_function_args(&signature, &[RuntimeValue::I32(1)]).is_ok());
        assert!(check_function_args(&signature, &[RuntimeValue::I64(1)]).is_err());
        assert!(check_function_args(&signature, &[]).is_err());
        assert!(
            check_function_args(&signature, &[RuntimeValue::I32(1), RuntimeValue::I32(2)])
                .is_err()
        );
    }
}
