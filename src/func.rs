//! Runtime function instances.

use crate::host::Externals;
use crate::module::ModuleInstance;
use crate::ops::Instruction;
use crate::runner::{check_function_args, Interpreter, RunnerConfig};
use crate::types::{Signature, ValueType};
use crate::value::RuntimeValue;
use crate::Trap;
use std::fmt;
use std::rc::{Rc, Weak};

/// Reference to a function (See [`FuncInstance`] for details).
///
/// This reference has reference-counting semantics.
///
/// [`FuncInstance`]: struct.FuncInstance.html
#[derive(Clone, Debug)]
pub struct FuncRef(Rc<FuncInstance>);

impl ::std::ops::Deref for FuncRef {
    type Target = FuncInstance;
    fn deref(&self) -> &FuncInstance {
        &self.0
    }
}

/// Runtime representation of a function.
///
/// Functions are the unit of organization of code in WebAssembly. Each
/// function takes a sequence of values as parameters and either optionally
/// returns a value or traps. Functions can call other functions, including
/// themselves, and imported functions.
///
/// A function can be defined either:
///
/// - by a wasm module,
/// - by the host environment and passed to a wasm module as an import.
///   See more in [`Externals`].
///
/// [`Externals`]: trait.Externals.html
pub struct FuncInstance(FuncInstanceInternal);

#[derive(Clone)]
pub(crate) enum FuncInstanceInternal {
    Internal {
        signature: Rc<Signature>,
        module: Weak<ModuleInstance>,
        body: Rc<FuncBody>,
    },
    Host {
        signature: Signature,
        host_func_index: usize,
    },
}

impl fmt::Debug for FuncInstance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.as_internal() {
            FuncInstanceInternal::Internal { ref signature, .. } => {
                // Describing self.module here would recurse back into this
                // function instance.
                write!(f, "Internal {{ signature={:?} }}", signature)
            }
            FuncInstanceInternal::Host { ref signature, .. } => {
                write!(f, "Host {{ signature={:?} }}", signature)
            }
        }
    }
}

impl FuncInstance {
    /// Allocates a function instance for a host function.
    ///
    /// When this function instance is called by wasm code, the instance of
    /// [`Externals`] passed to the invocation will receive an
    /// `invoke_index` call with the `host_func_index` given here.
    ///
    /// [`Externals`]: trait.Externals.html
    pub fn alloc_host(signature: Signature, host_func_index: usize) -> FuncRef {
        let func = FuncInstanceInternal::Host {
            signature,
            host_func_index,
        };
        FuncRef(Rc::new(FuncInstance(func)))
    }

    /// Returns the [signature] of this function instance.
    ///
    /// A function instance can only be called with a matching signature.
    ///
    /// [signature]: struct.Signature.html
    pub fn signature(&self) -> &Signature {
        match *self.as_internal() {
            FuncInstanceInternal::Internal { ref signature, .. } => signature,
            FuncInstanceInternal::Host { ref signature, .. } => signature,
        }
    }

    pub(crate) fn as_internal(&self) -> &FuncInstanceInternal {
        &self.0
    }

    pub(crate) fn alloc_internal(
        module: Weak<ModuleInstance>,
        signature: Rc<Signature>,
        body: FuncBody,
    ) -> FuncRef {
        let func = FuncInstanceInternal::Internal {
            signature,
            module,
            body: Rc::new(body),
        };
        FuncRef(Rc::new(FuncInstance(func)))
    }

    pub(crate) fn body(&self) -> Option<Rc<FuncBody>> {
        match *self.as_internal() {
            FuncInstanceInternal::Internal { ref body, .. } => Some(Rc::clone(body)),
            FuncInstanceInternal::Host { .. } => None,
        }
    }

    pub(crate) fn module(&self) -> Option<Rc<ModuleInstance>> {
        match *self.as_internal() {
            FuncInstanceInternal::Internal { ref module, .. } => module.upgrade(),
            FuncInstanceInternal::Host { .. } => None,
        }
    }

    /// Invokes this function with the default runner configuration.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the types of `args` do not match the function
    /// [`signature`], or if a [`Trap`] occurred during execution.
    ///
    /// [`signature`]: #method.signature
    /// [`Trap`]: struct.Trap.html
    pub fn invoke<E: Externals>(
        func: &FuncRef,
        args: &[RuntimeValue],
        externals: &mut E,
    ) -> Result<Option<RuntimeValue>, Trap> {
        Self::invoke_configured(func, args, externals, RunnerConfig::default())
    }

    /// Invokes this function with an explicit runner configuration, e.g.
    /// a raised call-depth ceiling.
    ///
    /// # Errors
    ///
    /// Same as [`invoke`].
    ///
    /// [`invoke`]: #method.invoke
    pub fn invoke_configured<E: Externals>(
        func: &FuncRef,
        args: &[RuntimeValue],
        externals: &mut E,
        config: RunnerConfig,
    ) -> Result<Option<RuntimeValue>, Trap> {
        check_function_args(func.signature(), args)?;
        match *func.as_internal() {
            FuncInstanceInternal::Internal { .. } => {
                Interpreter::new(externals, config).invoke(func, args)
            }
            FuncInstanceInternal::Host {
                ref host_func_index,
                ..
            } => externals.invoke_index(*host_func_index, args.into()),
        }
    }
}

/// An internal function body, ready for execution: locals are expanded to
/// one type per slot.
#[derive(Clone, Debug)]
pub(crate) struct FuncBody {
    pub(crate) locals: Vec<ValueType>,
    pub(crate) code: Vec<Instruction>,
}
