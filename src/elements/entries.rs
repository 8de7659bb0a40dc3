//! Entry types carried by the known sections.

use crate::io::{BinaryReader, BinaryWriter};
use crate::ops::Instruction;
use crate::types::{ExternalKind, GlobalType, MemoryType, TableType, ValueType};
use crate::Error;
use std::io::{Read, Write};

/// A constant expression used to initialize globals and segment offsets.
///
/// The terminating `end` opcode is implicit. Whether the expression is
/// actually constant (`*.const` or `get_global` of an immutable import)
/// is checked at instantiation time, not at decode.
#[derive(Clone, Debug, PartialEq)]
pub struct InitExpr {
    code: Vec<Instruction>,
}

impl InitExpr {
    /// Creates an initializer from the given instruction list.
    pub fn new(code: Vec<Instruction>) -> InitExpr {
        InitExpr { code }
    }

    /// Shorthand for the common `i32.const` offset initializer.
    pub fn i32_const(value: i32) -> InitExpr {
        InitExpr {
            code: vec![Instruction::I32Const(value)],
        }
    }

    /// The instructions of this initializer, without the trailing `end`.
    pub fn code(&self) -> &[Instruction] {
        &self.code
    }

    pub(crate) fn read<R: Read>(reader: &mut BinaryReader<R>) -> Result<InitExpr, Error> {
        Ok(InitExpr {
            code: Instruction::read_expression(reader)?,
        })
    }

    pub(crate) fn write<W: Write>(&self, writer: &mut BinaryWriter<W>) -> Result<(), Error> {
        Instruction::write_expression(&self.code, writer)
    }
}

/// The imported entity described by an [`ImportEntry`].
#[derive(Clone, Debug, PartialEq)]
pub enum External {
    /// A function with the given type index.
    Function(u32),
    /// A table.
    Table(TableType),
    /// A linear memory.
    Memory(MemoryType),
    /// A global variable.
    Global(GlobalType),
}

impl External {
    /// The external kind tag of this entity.
    pub fn kind(&self) -> ExternalKind {
        match self {
            External::Function(_) => ExternalKind::Function,
            External::Table(_) => ExternalKind::Table,
            External::Memory(_) => ExternalKind::Memory,
            External::Global(_) => ExternalKind::Global,
        }
    }
}

/// A single import: module name, field name and the expected entity.
#[derive(Clone, Debug, PartialEq)]
pub struct ImportEntry {
    module: String,
    field: String,
    external: External,
}

impl ImportEntry {
    /// Creates a new import entry.
    pub fn new(module: String, field: String, external: External) -> ImportEntry {
        ImportEntry {
            module,
            field,
            external,
        }
    }

    /// Name of the module the entity is imported from.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Name of the field within the module.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// The imported entity.
    pub fn external(&self) -> &External {
        &self.external
    }

    pub(crate) fn external_mut(&mut self) -> &mut External {
        &mut self.external
    }

    pub(crate) fn read<R: Read>(reader: &mut BinaryReader<R>) -> Result<ImportEntry, Error> {
        let module = reader.read_string()?;
        let field = reader.read_string()?;
        let kind = ExternalKind::from_code(reader.read_u8()?)?;
        let external = match kind {
            ExternalKind::Function => External::Function(reader.read_var_u32()?),
            ExternalKind::Table => External::Table(TableType::read(reader)?),
            ExternalKind::Memory => External::Memory(MemoryType::read(reader)?),
            ExternalKind::Global => External::Global(GlobalType::read(reader)?),
        };
        Ok(ImportEntry {
            module,
            field,
            external,
        })
    }

    pub(crate) fn write<W: Write>(&self, writer: &mut BinaryWriter<W>) -> Result<(), Error> {
        writer.write_string(&self.module)?;
        writer.write_string(&self.field)?;
        writer.write_u8(self.external.kind().code())?;
        match &self.external {
            External::Function(type_index) => writer.write_var_u32(*type_index),
            External::Table(table_type) => table_type.write(writer),
            External::Memory(memory_type) => memory_type.write(writer),
            External::Global(global_type) => global_type.write(writer),
        }
    }
}

/// The entity referenced by an [`ExportEntry`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Internal {
    /// Function at the given module-level index.
    Function(u32),
    /// Table at the given index.
    Table(u32),
    /// Memory at the given index.
    Memory(u32),
    /// Global at the given index.
    Global(u32),
}

impl Internal {
    /// The external kind tag of this reference.
    pub fn kind(&self) -> ExternalKind {
        match self {
            Internal::Function(_) => ExternalKind::Function,
            Internal::Table(_) => ExternalKind::Table,
            Internal::Memory(_) => ExternalKind::Memory,
            Internal::Global(_) => ExternalKind::Global,
        }
    }

    /// The raw index of the referenced entity.
    pub fn index(&self) -> u32 {
        match *self {
            Internal::Function(index)
            | Internal::Table(index)
            | Internal::Memory(index)
            | Internal::Global(index) => index,
        }
    }
}

/// A single export: a field name and the referenced entity.
#[derive(Clone, Debug, PartialEq)]
pub struct ExportEntry {
    field: String,
    internal: Internal,
}

impl ExportEntry {
    /// Creates a new export entry.
    pub fn new(field: String, internal: Internal) -> ExportEntry {
        ExportEntry { field, internal }
    }

    /// Name under which the entity is exported.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// The exported entity.
    pub fn internal(&self) -> &Internal {
        &self.internal
    }

    pub(crate) fn read<R: Read>(reader: &mut BinaryReader<R>) -> Result<ExportEntry, Error> {
        let field = reader.read_string()?;
        let kind = ExternalKind::from_code(reader.read_u8()?)?;
        let index = reader.read_var_u32()?;
        let internal = match kind {
            ExternalKind::Function => Internal::Function(index),
            ExternalKind::Table => Internal::Table(index),
            ExternalKind::Memory => Internal::Memory(index),
            ExternalKind::Global => Internal::Global(index),
        };
        Ok(ExportEntry { field, internal })
    }

    pub(crate) fn write<W: Write>(&self, writer: &mut BinaryWriter<W>) -> Result<(), Error> {
        writer.write_string(&self.field)?;
        writer.write_u8(self.internal.kind().code())?;
        writer.write_var_u32(self.internal.index())
    }
}

/// A global definition: its type and initializer.
#[derive(Clone, Debug, PartialEq)]
pub struct GlobalEntry {
    global_type: GlobalType,
    init_expr: InitExpr,
}

impl GlobalEntry {
    /// Creates a new global definition.
    pub fn new(global_type: GlobalType, init_expr: InitExpr) -> GlobalEntry {
        GlobalEntry {
            global_type,
            init_expr,
        }
    }

    /// The global's type.
    pub fn global_type(&self) -> &GlobalType {
        &self.global_type
    }

    /// The global's initializer expression.
    pub fn init_expr(&self) -> &InitExpr {
        &self.init_expr
    }

    pub(crate) fn read<R: Read>(reader: &mut BinaryReader<R>) -> Result<GlobalEntry, Error> {
        Ok(GlobalEntry {
            global_type: GlobalType::read(reader)?,
            init_expr: InitExpr::read(reader)?,
        })
    }

    pub(crate) fn write<W: Write>(&self, writer: &mut BinaryWriter<W>) -> Result<(), Error> {
        self.global_type.write(writer)?;
        self.init_expr.write(writer)
    }
}

/// An element segment: function indices copied into a table at
/// instantiation time.
#[derive(Clone, Debug, PartialEq)]
pub struct ElementSegment {
    table_index: u32,
    offset: InitExpr,
    members: Vec<u32>,
}

impl ElementSegment {
    /// Creates a new element segment.
    pub fn new(table_index: u32, offset: InitExpr, members: Vec<u32>) -> ElementSegment {
        ElementSegment {
            table_index,
            offset,
            members,
        }
    }

    /// Index of the table to initialize; always 0 in the MVP.
    pub fn table_index(&self) -> u32 {
        self.table_index
    }

    /// Offset initializer; must evaluate to an `i32`.
    pub fn offset(&self) -> &InitExpr {
        &self.offset
    }

    /// Function indices to place into the table.
    pub fn members(&self) -> &[u32] {
        &self.members
    }

    pub(crate) fn read<R: Read>(reader: &mut BinaryReader<R>) -> Result<ElementSegment, Error> {
        let table_index = reader.read_var_u32()?;
        let offset = InitExpr::read(reader)?;
        let count = reader.read_var_u32()? as usize;
        let mut members = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            members.push(reader.read_var_u32()?);
        }
        Ok(ElementSegment {
            table_index,
            offset,
            members,
        })
    }

    pub(crate) fn write<W: Write>(&self, writer: &mut BinaryWriter<W>) -> Result<(), Error> {
        writer.write_var_u32(self.table_index)?;
        self.offset.write(writer)?;
        writer.write_var_u32(self.members.len() as u32)?;
        for member in &self.members {
            writer.write_var_u32(*member)?;
        }
        Ok(())
    }
}

/// A data segment: raw bytes copied into a linear memory at
/// instantiation time.
#[derive(Clone, Debug, PartialEq)]
pub struct DataSegment {
    memory_index: u32,
    offset: InitExpr,
    value: Vec<u8>,
}

impl DataSegment {
    /// Creates a new data segment.
    pub fn new(memory_index: u32, offset: InitExpr, value: Vec<u8>) -> DataSegment {
        DataSegment {
            memory_index,
            offset,
            value,
        }
    }

    /// Index of the memory to initialize; always 0 in the MVP.
    pub fn memory_index(&self) -> u32 {
        self.memory_index
    }

    /// Offset initializer; must evaluate to an `i32`.
    pub fn offset(&self) -> &InitExpr {
        &self.offset
    }

    /// The bytes to copy.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub(crate) fn read<R: Read>(reader: &mut BinaryReader<R>) -> Result<DataSegment, Error> {
        let memory_index = reader.read_var_u32()?;
        let offset = InitExpr::read(reader)?;
        let len = reader.read_var_u32()? as usize;
        let value = reader.read_bytes(len)?;
        Ok(DataSegment {
            memory_index,
            offset,
            value,
        })
    }

    pub(crate) fn write<W: Write>(&self, writer: &mut BinaryWriter<W>) -> Result<(), Error> {
        writer.write_var_u32(self.memory_index)?;
        self.offset.write(writer)?;
        writer.write_var_u32(self.value.len() as u32)?;
        writer.write_bytes(&self.value)
    }
}

/// A run of locals of one type at the head of a function body.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LocalEntry {
    count: u32,
    value_type: ValueType,
}

impl LocalEntry {
    /// Creates a new local-entry run.
    pub fn new(count: u32, value_type: ValueType) -> LocalEntry {
        LocalEntry { count, value_type }
    }

    /// Number of locals in this run.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Type of every local in this run.
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub(crate) fn read<R: Read>(reader: &mut BinaryReader<R>) -> Result<LocalEntry, Error> {
        let count = reader.read_var_u32()?;
        let value_type = ValueType::read(reader)?;
        Ok(LocalEntry { count, value_type })
    }

    pub(crate) fn write<W: Write>(&self, writer: &mut BinaryWriter<W>) -> Result<(), Error> {
        writer.write_var_u32(self.count)?;
        self.value_type.write(writer)
    }
}

/// Expands local-entry runs into one type per local.
pub fn expand_locals(locals: &[LocalEntry]) -> Vec<ValueType> {
    let mut expanded = Vec::new();
    for entry in locals {
        for _ in 0..entry.count() {
            expanded.push(entry.value_type());
        }
    }
    expanded
}

/// A function body: its local declarations and code.
#[derive(Clone, Debug, PartialEq)]
pub struct FuncBody {
    locals: Vec<LocalEntry>,
    code: Vec<Instruction>,
}

impl FuncBody {
    /// Creates a new function body.
    pub fn new(locals: Vec<LocalEntry>, code: Vec<Instruction>) -> FuncBody {
        FuncBody { locals, code }
    }

    /// The local declarations.
    pub fn locals(&self) -> &[LocalEntry] {
        &self.locals
    }

    /// The instructions, without the trailing `end`.
    pub fn code(&self) -> &[Instruction] {
        &self.code
    }

    pub(crate) fn locals_mut(&mut self) -> &mut Vec<LocalEntry> {
        &mut self.locals
    }

    pub(crate) fn code_mut(&mut self) -> &mut Vec<Instruction> {
        &mut self.code
    }

    pub(crate) fn read<R: Read>(reader: &mut BinaryReader<R>) -> Result<FuncBody, Error> {
        let body_size = reader.read_var_u32()? as usize;
        let payload = reader.read_bytes(body_size)?;
        let mut body_reader = BinaryReader::new(&payload[..]);
        let local_count = body_reader.read_var_u32()? as usize;
        let mut locals = Vec::with_capacity(local_count.min(64));
        for _ in 0..local_count {
            locals.push(LocalEntry::read(&mut body_reader)?);
        }
        let code = Instruction::read_expression(&mut body_reader)?;
        if body_reader.position() != body_size as u64 {
            return Err(Error::Encoding(format!(
                "function body declared {} bytes but {} were consumed",
                body_size,
                body_reader.position()
            )));
        }
        Ok(FuncBody { locals, code })
    }

    pub(crate) fn write<W: Write>(&self, writer: &mut BinaryWriter<W>) -> Result<(), Error> {
        let mut scratch = BinaryWriter::buffer();
        scratch.write_var_u32(self.locals.len() as u32)?;
        for local in &self.locals {
            local.write(&mut scratch)?;
        }
        Instruction::write_expression(&self.code, &mut scratch)?;
        let payload = scratch.into_inner();
        writer.write_var_u32(payload.len() as u32)?;
        writer.write_bytes(&payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{BinaryReader, BinaryWriter};
    use crate::ops::Instruction;

    #[test]
    fn func_body_round_trip() {
        let body = FuncBody::new(
            vec![
                LocalEntry::new(2, ValueType::I32),
                LocalEntry::new(1, ValueType::F64),
            ],
            vec![
                Instruction::GetLocal(0),
                Instruction::GetLocal(1),
                Instruction::I32Add,
            ],
        );
        let mut writer = BinaryWriter::buffer();
        body.write(&mut writer).unwrap();
        let bytes = writer.into_inner();
        let mut reader = BinaryReader::new(&bytes[..]);
        assert_eq!(FuncBody::read(&mut reader).unwrap(), body);
    }

    #[test]
    fn expand_locals_works() {
        let locals = vec![
            LocalEntry::new(2, ValueType::I32),
            LocalEntry::new(0, ValueType::F32),
            LocalEntry::new(1, ValueType::I64),
        ];
        assert_eq!(
            expand_locals(&locals),
            vec![ValueType::I32, ValueType::I32, ValueType::I64]
        );
    }

    #[test]
    fn data_segment_round_trip() {
        let segment = DataSegment::new(0, InitExpr::i32_const(16), b"hello".to_vec());
        let mut writer = BinaryWriter::buffer();
        segment.write(&mut writer).unwrap();
        let bytes = writer.into_inner();
        let mut reader = BinaryReader::new(&bytes[..]);
        assert_eq!(DataSegment::read(&mut reader).unwrap(), segment);
    }

    #[test]
    fn truncated_body_rejected() {
        // Body size says 1 byte, but locals vector alone needs more.
        let bytes = [0x01, 0x02];
        let mut reader = BinaryReader::new(&bytes[..]);
        assert!(FuncBody::read(&mut reader).is_err());
    }
}
