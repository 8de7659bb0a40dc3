//! Value and entity types shared by the codec, the assembler and the
//! interpreter.

use crate::io::{BinaryReader, BinaryWriter};
use crate::Error;
use std::borrow::Cow;
use std::fmt;
use std::io::{Read, Write};

/// Type of a value on the evaluation stack, in a local, a global or a
/// linear-memory view.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// 32-bit signed or unsigned integer.
    I32,
    /// 64-bit signed or unsigned integer.
    I64,
    /// 32-bit IEEE 754-2008 floating point number.
    F32,
    /// 64-bit IEEE 754-2008 floating point number.
    F64,
}

impl ValueType {
    pub(crate) fn from_code(code: i8) -> Result<ValueType, Error> {
        match code {
            -0x01 => Ok(ValueType::I32),
            -0x02 => Ok(ValueType::I64),
            -0x03 => Ok(ValueType::F32),
            -0x04 => Ok(ValueType::F64),
            other => Err(Error::Encoding(format!("unknown value type {:#x}", other))),
        }
    }

    pub(crate) fn code(self) -> i8 {
        match self {
            ValueType::I32 => -0x01,
            ValueType::I64 => -0x02,
            ValueType::F32 => -0x03,
            ValueType::F64 => -0x04,
        }
    }

    pub(crate) fn read<R: Read>(reader: &mut BinaryReader<R>) -> Result<ValueType, Error> {
        ValueType::from_code(reader.read_var_i7()?)
    }

    pub(crate) fn write<W: Write>(self, writer: &mut BinaryWriter<W>) -> Result<(), Error> {
        writer.write_var_i7(self.code())
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ValueType::I32 => write!(f, "i32"),
            ValueType::I64 => write!(f, "i64"),
            ValueType::F32 => write!(f, "f32"),
            ValueType::F64 => write!(f, "f64"),
        }
    }
}

/// Superset of [`ValueType`] used in type positions of the binary format:
/// block types, table element types and the function-type constructor.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LanguageType {
    /// A plain value type.
    Value(ValueType),
    /// `anyfunc`, the only table element type in the MVP.
    AnyFunc,
    /// The function-type constructor.
    Func,
    /// The empty block type.
    Empty,
}

impl LanguageType {
    pub(crate) fn read<R: Read>(reader: &mut BinaryReader<R>) -> Result<LanguageType, Error> {
        let code = reader.read_var_i7()?;
        match code {
            -0x10 => Ok(LanguageType::AnyFunc),
            -0x20 => Ok(LanguageType::Func),
            -0x40 => Ok(LanguageType::Empty),
            other => Ok(LanguageType::Value(ValueType::from_code(other)?)),
        }
    }

    pub(crate) fn write<W: Write>(self, writer: &mut BinaryWriter<W>) -> Result<(), Error> {
        let code = match self {
            LanguageType::Value(vt) => vt.code(),
            LanguageType::AnyFunc => -0x10,
            LanguageType::Func => -0x20,
            LanguageType::Empty => -0x40,
        };
        writer.write_var_i7(code)
    }
}

/// Result type of a block-structured instruction: at most one value in
/// the MVP.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlockType(pub Option<ValueType>);

impl BlockType {
    /// Number of values a branch to the end of this block transfers.
    pub fn arity(self) -> usize {
        usize::from(self.0.is_some())
    }

    pub(crate) fn read<R: Read>(reader: &mut BinaryReader<R>) -> Result<BlockType, Error> {
        match LanguageType::read(reader)? {
            LanguageType::Empty => Ok(BlockType(None)),
            LanguageType::Value(vt) => Ok(BlockType(Some(vt))),
            other => Err(Error::Encoding(format!(
                "{:?} is not a valid block type",
                other
            ))),
        }
    }

    pub(crate) fn write<W: Write>(self, writer: &mut BinaryWriter<W>) -> Result<(), Error> {
        match self.0 {
            None => LanguageType::Empty.write(writer),
            Some(vt) => LanguageType::Value(vt).write(writer),
        }
    }
}

/// Kind of an imported or exported entity.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExternalKind {
    /// A function.
    Function,
    /// A table.
    Table,
    /// A linear memory.
    Memory,
    /// A global variable.
    Global,
}

impl ExternalKind {
    pub(crate) fn from_code(code: u8) -> Result<ExternalKind, Error> {
        match code {
            0 => Ok(ExternalKind::Function),
            1 => Ok(ExternalKind::Table),
            2 => Ok(ExternalKind::Memory),
            3 => Ok(ExternalKind::Global),
            other => Err(Error::Encoding(format!("unknown external kind {}", other))),
        }
    }

    pub(crate) fn code(self) -> u8 {
        match self {
            ExternalKind::Function => 0,
            ExternalKind::Table => 1,
            ExternalKind::Memory => 2,
            ExternalKind::Global => 3,
        }
    }
}

/// Size bounds of a linear memory or table: an initial size and an
/// optional maximum, both in units of the subject (pages or elements).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResizableLimits {
    initial: u32,
    maximum: Option<u32>,
}

impl ResizableLimits {
    /// Creates limits with the given initial size and optional maximum.
    pub fn new(initial: u32, maximum: Option<u32>) -> ResizableLimits {
        ResizableLimits { initial, maximum }
    }

    /// Initial size.
    pub fn initial(&self) -> u32 {
        self.initial
    }

    /// Maximum size, if bounded.
    pub fn maximum(&self) -> Option<u32> {
        self.maximum
    }

    pub(crate) fn read<R: Read>(reader: &mut BinaryReader<R>) -> Result<ResizableLimits, Error> {
        let has_maximum = reader.read_var_u1()?;
        let initial = reader.read_var_u32()?;
        let maximum = if has_maximum {
            Some(reader.read_var_u32()?)
        } else {
            None
        };
        Ok(ResizableLimits { initial, maximum })
    }

    pub(crate) fn write<W: Write>(&self, writer: &mut BinaryWriter<W>) -> Result<(), Error> {
        match self.maximum {
            None => {
                writer.write_var_u7(0)?;
                writer.write_var_u32(self.initial)
            }
            Some(maximum) => {
                writer.write_var_u7(1)?;
                writer.write_var_u32(self.initial)?;
                writer.write_var_u32(maximum)
            }
        }
    }
}

/// Type of a function: parameter types and return types.
///
/// Two function types are equal iff their parameter and return lists are
/// element-wise equal; the derived `Hash` combines both lists, which the
/// type-deduplication pass relies on.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FunctionType {
    params: Vec<ValueType>,
    results: Vec<ValueType>,
}

impl FunctionType {
    /// Creates a new function type.
    pub fn new(params: Vec<ValueType>, results: Vec<ValueType>) -> FunctionType {
        FunctionType { params, results }
    }

    /// Parameter types.
    pub fn params(&self) -> &[ValueType] {
        &self.params
    }

    /// Return types. At most one entry in the MVP.
    pub fn results(&self) -> &[ValueType] {
        &self.results
    }

    /// The single return type, if any.
    pub fn return_type(&self) -> Option<ValueType> {
        self.results.first().copied()
    }

    pub(crate) fn read<R: Read>(reader: &mut BinaryReader<R>) -> Result<FunctionType, Error> {
        match LanguageType::read(reader)? {
            LanguageType::Func => {}
            other => {
                return Err(Error::Encoding(format!(
                    "expected a function type, found {:?}",
                    other
                )))
            }
        }
        let param_count = reader.read_var_u32()? as usize;
        let mut params = Vec::with_capacity(param_count.min(64));
        for _ in 0..param_count {
            params.push(ValueType::read(reader)?);
        }
        let result_count = reader.read_var_u32()? as usize;
        if result_count > 1 {
            return Err(Error::Validation(format!(
                "function type declares {} return values; at most one is allowed",
                result_count
            )));
        }
        let mut results = Vec::with_capacity(result_count);
        for _ in 0..result_count {
            results.push(ValueType::read(reader)?);
        }
        Ok(FunctionType { params, results })
    }

    pub(crate) fn write<W: Write>(&self, writer: &mut BinaryWriter<W>) -> Result<(), Error> {
        if self.results.len() > 1 {
            return Err(Error::Validation(
                "cannot encode a function type with multiple return values".into(),
            ));
        }
        LanguageType::Func.write(writer)?;
        writer.write_var_u32(self.params.len() as u32)?;
        for param in &self.params {
            param.write(writer)?;
        }
        writer.write_var_u32(self.results.len() as u32)?;
        for result in &self.results {
            result.write(writer)?;
        }
        Ok(())
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "(func")?;
        for param in &self.params {
            write!(f, " (param {})", param)?;
        }
        for result in &self.results {
            write!(f, " (result {})", result)?;
        }
        write!(f, ")")
    }
}

/// Type of a global variable: its value type and mutability.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GlobalType {
    content_type: ValueType,
    mutable: bool,
}

impl GlobalType {
    /// Creates a new global type.
    pub fn new(content_type: ValueType, mutable: bool) -> GlobalType {
        GlobalType {
            content_type,
            mutable,
        }
    }

    /// Type of the global's value.
    pub fn content_type(&self) -> ValueType {
        self.content_type
    }

    /// Whether the global may be written after initialization.
    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    pub(crate) fn read<R: Read>(reader: &mut BinaryReader<R>) -> Result<GlobalType, Error> {
        let content_type = ValueType::read(reader)?;
        let mutable = reader.read_var_u1()?;
        Ok(GlobalType {
            content_type,
            mutable,
        })
    }

    pub(crate) fn write<W: Write>(&self, writer: &mut BinaryWriter<W>) -> Result<(), Error> {
        self.content_type.write(writer)?;
        writer.write_var_u7(u8::from(self.mutable))
    }
}

/// Type of a table: element type (always `anyfunc` in the MVP) and limits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableType {
    limits: ResizableLimits,
}

impl TableType {
    /// Creates a new table type.
    pub fn new(limits: ResizableLimits) -> TableType {
        TableType { limits }
    }

    /// Size bounds of the table.
    pub fn limits(&self) -> &ResizableLimits {
        &self.limits
    }

    pub(crate) fn read<R: Read>(reader: &mut BinaryReader<R>) -> Result<TableType, Error> {
        match LanguageType::read(reader)? {
            LanguageType::AnyFunc => {}
            other => {
                return Err(Error::Encoding(format!(
                    "unsupported table element type {:?}",
                    other
                )))
            }
        }
        Ok(TableType {
            limits: ResizableLimits::read(reader)?,
        })
    }

    pub(crate) fn write<W: Write>(&self, writer: &mut BinaryWriter<W>) -> Result<(), Error> {
        LanguageType::AnyFunc.write(writer)?;
        self.limits.write(writer)
    }
}

/// Type of a linear memory: its limits, in pages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryType {
    limits: ResizableLimits,
}

impl MemoryType {
    /// Creates a new memory type.
    pub fn new(limits: ResizableLimits) -> MemoryType {
        MemoryType { limits }
    }

    /// Size bounds of the memory, in pages.
    pub fn limits(&self) -> &ResizableLimits {
        &self.limits
    }

    pub(crate) fn read<R: Read>(reader: &mut BinaryReader<R>) -> Result<MemoryType, Error> {
        Ok(MemoryType {
            limits: ResizableLimits::read(reader)?,
        })
    }

    pub(crate) fn write<W: Write>(&self, writer: &mut BinaryWriter<W>) -> Result<(), Error> {
        self.limits.write(writer)
    }
}

/// Signature of a function as seen by the interpreter.
///
/// Signature of a function consists of zero or more parameter types and zero
/// or one return type. Two signatures are considered equal if they have equal
/// lists of parameters and equal return types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    params: Cow<'static, [ValueType]>,
    return_type: Option<ValueType>,
}

impl Signature {
    /// Creates new signature with given parameter types and optional
    /// return type.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use wasmith::{Signature, ValueType};
    ///
    /// // s1: (i32) -> ()
    /// let s1 = Signature::new(&[ValueType::I32][..], None);
    ///
    /// // s2: () -> i32
    /// let s2 = Signature::new(&[][..], Some(ValueType::I32));
    /// ```
    pub fn new<C: Into<Cow<'static, [ValueType]>>>(
        params: C,
        return_type: Option<ValueType>,
    ) -> Signature {
        Signature {
            params: params.into(),
            return_type,
        }
    }

    /// Returns parameter types of this signature.
    pub fn params(&self) -> &[ValueType] {
        self.params.as_ref()
    }

    /// Returns return type of this signature.
    pub fn return_type(&self) -> Option<ValueType> {
        self.return_type
    }

    pub(crate) fn from_function_type(func_type: &FunctionType) -> Signature {
        Signature {
            params: func_type.params().to_vec().into(),
            return_type: func_type.return_type(),
        }
    }
}

/// Description of a global variable, primarily used to describe imports.
pub struct GlobalDescriptor {
    value_type: ValueType,
    mutable: bool,
}

impl GlobalDescriptor {
    pub(crate) fn from_global_type(global_type: &GlobalType) -> GlobalDescriptor {
        GlobalDescriptor {
            value_type: global_type.content_type(),
            mutable: global_type.is_mutable(),
        }
    }

    /// Returns the [`ValueType`] of the requested global.
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Returns whether the requested global is mutable.
    pub fn is_mutable(&self) -> bool {
        self.mutable
    }
}

/// Description of a table, primarily used to describe imports.
pub struct TableDescriptor {
    initial: u32,
    maximum: Option<u32>,
}

impl TableDescriptor {
    pub(crate) fn from_table_type(table_type: &TableType) -> TableDescriptor {
        TableDescriptor {
            initial: table_type.limits().initial(),
            maximum: table_type.limits().maximum(),
        }
    }

    /// Returns the initial size of the requested table.
    pub fn initial(&self) -> u32 {
        self.initial
    }

    /// Returns the maximum size of the requested table.
    pub fn maximum(&self) -> Option<u32> {
        self.maximum
    }
}

/// Description of a linear memory, primarily used to describe imports.
pub struct MemoryDescriptor {
    initial: u32,
    maximum: Option<u32>,
}

impl MemoryDescriptor {
    pub(crate) fn from_memory_type(memory_type: &MemoryType) -> MemoryDescriptor {
        MemoryDescriptor {
            initial: memory_type.limits().initial(),
            maximum: memory_type.limits().maximum(),
        }
    }

    /// Returns the initial size (in pages) of the requested memory.
    pub fn initial(&self) -> u32 {
        self.initial
    }

    /// Returns the maximum size (in pages) of the requested memory.
    pub fn maximum(&self) -> Option<u32> {
        self.maximum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{BinaryReader, BinaryWriter};

    fn round_trip_limits(limits: ResizableLimits) {
        let mut writer = BinaryWriter::buffer();
        limits.write(&mut writer).unwrap();
        let bytes = writer.into_inner();
        let mut reader = BinaryReader::new(&bytes[..]);
        assert_eq!(ResizableLimits::read(&mut reader).unwrap(), limits);
    }

    #[test]
    fn resizable_limits() {
        round_trip_limits(ResizableLimits::new(0, None));
        round_trip_limits(ResizableLimits::new(1, Some(1)));
        round_trip_limits(ResizableLimits::new(17, Some(65536)));
    }

    #[test]
    fn function_type_structural_equality() {
        let a = FunctionType::new(vec![ValueType::I32, ValueType::F64], vec![ValueType::I32]);
        let b = FunctionType::new(vec![ValueType::I32, ValueType::F64], vec![ValueType::I32]);
        let c = FunctionType::new(vec![ValueType::F64, ValueType::I32], vec![ValueType::I32]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn multi_value_rejected() {
        // Function type declaring two results.
        let bytes = [0x60, 0x00, 0x02, 0x7f, 0x7f];
        let mut reader = BinaryReader::new(&bytes[..]);
        assert!(matches!(
            FunctionType::read(&mut reader),
            Err(Error::Validation(_))
        ));
    }
}
