//! # wasmith
//!
//! A toolkit for WebAssembly modules: a round-trip-faithful binary codec,
//! a text-format assembler, a small semantics-preserving optimizer and an
//! interpreter with a pluggable host-import environment.
//!
//! Binary modules decode into a [`WasmFile`] — the version header plus
//! the ordered section list — and encode back byte-for-byte when left
//! unmodified. Text modules assemble through [`assemble_str`]. Either way
//! the result instantiates into a [`ModuleInstance`] whose exports can be
//! invoked directly.
//!
//! # Examples
//!
//! ```rust
//! use wasmith::{ImportsBuilder, ModuleInstance, NopExternals, RuntimeValue};
//!
//! let file = wasmith::assemble_str(
//!     r#"
//!     (module
//!         (func (export "test") (result i32)
//!             i32.const 1337))
//!     "#,
//! )
//! .expect("failed to assemble module");
//!
//! let instance = ModuleInstance::new(&file, &ImportsBuilder::default())
//!     .expect("failed to instantiate module")
//!     .assert_no_start();
//!
//! assert_eq!(
//!     instance
//!         .invoke_export("test", &[], &mut NopExternals)
//!         .expect("failed to execute export"),
//!     Some(RuntimeValue::I32(1337)),
//! );
//! ```

#![warn(missing_docs)]
#![allow(clippy::len_without_is_empty)]
#![allow(clippy::new_ret_no_self)]

use std::error;
use std::fmt;

/// Error type which can be thrown by wasm code or by the host
/// environment.
///
/// Under some conditions, wasm execution may produce a `Trap`, which
/// immediately aborts execution. Traps can't be handled by WebAssembly
/// code, but are reported to the embedder.
#[derive(Debug)]
pub struct Trap {
    kind: TrapKind,
}

impl Trap {
    /// Creates a new trap.
    pub fn new(kind: TrapKind) -> Trap {
        Trap { kind }
    }

    /// Returns the kind of this trap.
    pub fn kind(&self) -> &TrapKind {
        &self.kind
    }

    /// Converts into the kind of this trap.
    pub fn into_kind(self) -> TrapKind {
        self.kind
    }

    /// The trap code, unless this is a host trap.
    pub fn code(&self) -> Option<TrapCode> {
        match self.kind {
            TrapKind::Code(code) => Some(code),
            TrapKind::Host(_) => None,
        }
    }

    /// Whether this trap was raised by the host.
    pub fn is_host(&self) -> bool {
        matches!(self.kind, TrapKind::Host(_))
    }
}

impl fmt::Display for Trap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            TrapKind::Code(code) => write!(f, "{}", code),
            TrapKind::Host(host) => write!(f, "{}", host),
        }
    }
}

impl error::Error for Trap {}

/// What raised a [`Trap`]: one of the wasm trap conditions, or the host.
#[derive(Debug)]
pub enum TrapKind {
    /// A wasm-defined trap condition.
    Code(TrapCode),
    /// An error reported by a host function.
    Host(Box<dyn HostError>),
}

/// The wasm-defined trap conditions.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum TrapCode {
    /// Wasm code executed the `unreachable` opcode.
    Unreachable,

    /// Attempt to load or store at an address outside the bounds of the
    /// memory.
    ///
    /// Since addresses are interpreted as unsigned integers, out of
    /// bounds access can't happen with negative addresses.
    MemoryAccessOutOfBounds,

    /// Attempt to access a table element at an index outside the table's
    /// bounds. Typically raised by `call_indirect`.
    TableAccessOutOfBounds,

    /// Attempt to call through an uninitialized (null) table element.
    ElemUninitialized,

    /// Integer division or remainder by zero.
    DivisionByZero,

    /// An integer operation overflowed: signed division of
    /// -2<sup>N-1</sup> by -1.
    IntegerOverflow,

    /// A float-to-integer truncation saw NaN, an infinity or a value out
    /// of the target range.
    InvalidConversionToInt,

    /// The call stack grew past its configured ceiling, usually due to
    /// runaway recursion.
    StackOverflow,

    /// A function was invoked with a signature that does not match its
    /// definition. Always possible with indirect calls.
    UnexpectedSignature,
}

impl TrapCode {
    /// Returns the trap message as specified by the WebAssembly
    /// specification's test scripts.
    pub fn trap_message(&self) -> &'static str {
        match self {
            TrapCode::Unreachable => "unreachable",
            TrapCode::MemoryAccessOutOfBounds => "out of bounds memory access",
            TrapCode::TableAccessOutOfBounds => "undefined element",
            TrapCode::ElemUninitialized => "uninitialized element",
            TrapCode::DivisionByZero => "integer divide by zero",
            TrapCode::IntegerOverflow => "integer overflow",
            TrapCode::InvalidConversionToInt => "invalid conversion to integer",
            TrapCode::StackOverflow => "call stack exhausted",
            TrapCode::UnexpectedSignature => "indirect call type mismatch",
        }
    }
}

impl fmt::Display for TrapCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.trap_message())
    }
}

impl From<TrapCode> for Trap {
    fn from(code: TrapCode) -> Trap {
        Trap::new(TrapKind::Code(code))
    }
}

impl From<TrapKind> for Trap {
    fn from(kind: TrapKind) -> Trap {
        Trap::new(kind)
    }
}

/// Everything that can go wrong outside of wasm execution itself.
#[derive(Debug)]
pub enum Error {
    /// The binary's magic number or version is wrong.
    BadHeader(String),
    /// Malformed binary or text encoding: bad LEB128, an unterminated
    /// expression, an unknown mandatory opcode, a section length
    /// mismatch.
    Encoding(String),
    /// The module is well-formed but not valid: stack-type mismatches,
    /// unreachable labels, missing indices, multiple return values.
    Validation(String),
    /// Linking failed while instantiating a module: an import was not
    /// provided or its type does not match.
    Instantiation(String),
    /// Function-level error.
    Function(String),
    /// Table-level error.
    Table(String),
    /// Memory-level error.
    Memory(String),
    /// Global-level error.
    Global(String),
    /// Value-level error.
    Value(String),
    /// A lexer or assembler failure, carrying rendered diagnostics.
    TextFormat(String),
    /// A "cannot happen" invariant was violated by upstream input.
    Internal(String),
    /// Trap.
    Trap(Trap),
    /// Custom embedder error.
    Host(Box<dyn HostError>),
}

impl Error {
    /// Returns a reference to a [`HostError`] if this `Error` wraps one,
    /// directly or inside a trap.
    pub fn as_host_error(&self) -> Option<&dyn HostError> {
        match self {
            Error::Host(host_err) => Some(&**host_err),
            Error::Trap(Trap {
                kind: TrapKind::Host(host_err),
            }) => Some(&**host_err),
            _ => None,
        }
    }

    /// Consumes this `Error`, yielding the wrapped [`HostError`] if there
    /// is one.
    pub fn into_host_error(self) -> Option<Box<dyn HostError>> {
        match self {
            Error::Host(host_err) => Some(host_err),
            Error::Trap(Trap {
                kind: TrapKind::Host(host_err),
            }) => Some(host_err),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::BadHeader(s) => write!(f, "bad header: {}", s),
            Error::Encoding(s) => write!(f, "encoding: {}", s),
            Error::Validation(s) => write!(f, "validation: {}", s),
            Error::Instantiation(s) => write!(f, "instantiation: {}", s),
            Error::Function(s) => write!(f, "function: {}", s),
            Error::Table(s) => write!(f, "table: {}", s),
            Error::Memory(s) => write!(f, "memory: {}", s),
            Error::Global(s) => write!(f, "global: {}", s),
            Error::Value(s) => write!(f, "value: {}", s),
            Error::TextFormat(s) => write!(f, "{}", s),
            Error::Internal(s) => write!(f, "internal: {}", s),
            Error::Trap(trap) => write!(f, "trap: {}", trap),
            Error::Host(e) => write!(f, "user: {}", e),
        }
    }
}

impl error::Error for Error {}

impl<U> From<U> for Error
where
    U: HostError + Sized,
{
    fn from(e: U) -> Self {
        Error::Host(Box::new(e))
    }
}

impl<U> From<U> for Trap
where
    U: HostError + Sized,
{
    fn from(e: U) -> Self {
        Trap::new(TrapKind::Host(Box::new(e)))
    }
}

impl From<Trap> for Error {
    fn from(e: Trap) -> Error {
        Error::Trap(e)
    }
}

impl From<crate::value::Error> for Error {
    fn from(e: crate::value::Error) -> Error {
        Error::Value(format!("{:?}", e))
    }
}

pub mod elements;
mod func;
mod global;
mod host;
mod imports;
pub mod io;
mod memory;
mod module;
pub mod nan_preserving_float;
pub mod ops;
pub mod optimize;
mod runner;
pub mod script;
mod spectest;
mod table;
pub mod text;
pub mod types;
mod validation;
mod value;

pub use self::elements::WasmFile;
pub use self::func::{FuncInstance, FuncRef};
pub use self::global::{GlobalInstance, GlobalRef};
pub use self::host::{Externals, HostError, NopExternals, RuntimeArgs};
pub use self::imports::{ImportResolver, ImportsBuilder, ModuleImportResolver};
pub use self::memory::{MemoryInstance, MemoryRef, LINEAR_MEMORY_PAGE_SIZE};
pub use self::module::{ExternVal, ModuleInstance, ModuleRef, NotStartedModuleRef};
pub use self::runner::{RunnerConfig, DEFAULT_CALL_STACK_LIMIT, DEFAULT_VALUE_STACK_LIMIT};
pub use self::script::{run_script, ScriptRunner, ScriptSummary};
pub use self::spectest::{BaseRuntimeImporter, SpecTestImporter};
pub use self::table::{TableInstance, TableRef};
pub use self::text::assemble_str;
pub use self::types::{
    BlockType, ExternalKind, FunctionType, GlobalDescriptor, GlobalType, MemoryDescriptor,
    MemoryType, ResizableLimits, Signature, TableDescriptor, TableType, ValueType,
};
pub use self::validation::validate_module;
pub use self::value::{
    Error as ValueError, FromRuntimeValue, LittleEndianConvert, RuntimeValue,
};

/// WebAssembly-specific sizes and units.
pub mod memory_units {
    pub use memory_units::wasm32::*;
    pub use memory_units::{size_of, ByteSize, Bytes, RoundUpTo};
}
