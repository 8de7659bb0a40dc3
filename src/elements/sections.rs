//! The known sections of a module, each a count-prefixed vector of its
//! entry type plus any trailing bytes the parser did not consume.
//!
//! The `extra_payload` bytes are replayed verbatim on encode; this is the
//! key round-trip invariant of the codec.

use super::entries::{
    DataSegment, ElementSegment, ExportEntry, FuncBody, GlobalEntry, ImportEntry,
};
use crate::io::{BinaryReader, BinaryWriter};
use crate::types::{FunctionType, MemoryType, TableType};
use crate::Error;
use std::io::Write;

fn remaining(reader: &mut BinaryReader<&[u8]>, payload: &[u8]) -> Result<Vec<u8>, Error> {
    let consumed = reader.position() as usize;
    if consumed > payload.len() {
        return Err(Error::Internal(
            "section reader consumed past the payload".into(),
        ));
    }
    Ok(payload[consumed..].to_vec())
}

macro_rules! entry_section {
    ($(#[$doc:meta])* $name:ident, $entry:ty, $entries:ident, $entries_mut:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Default)]
        pub struct $name {
            entries: Vec<$entry>,
            extra_payload: Vec<u8>,
        }

        impl $name {
            /// Creates a section with the given entries.
            pub fn new(entries: Vec<$entry>) -> $name {
                $name {
                    entries,
                    extra_payload: Vec::new(),
                }
            }

            /// The section's entries.
            pub fn $entries(&self) -> &[$entry] {
                &self.entries
            }

            /// Mutable access to the section's entries.
            pub fn $entries_mut(&mut self) -> &mut Vec<$entry> {
                &mut self.entries
            }

            /// Bytes after the last entry that the parser did not
            /// recognize; replayed verbatim on encode.
            pub fn extra_payload(&self) -> &[u8] {
                &self.extra_payload
            }

            pub(crate) fn from_payload(payload: &[u8]) -> Result<$name, Error> {
                let mut reader = BinaryReader::new(payload);
                let count = reader.read_var_u32()? as usize;
                let mut entries = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    entries.push(<$entry>::read(&mut reader)?);
                }
                let extra_payload = remaining(&mut reader, payload)?;
                Ok($name {
                    entries,
                    extra_payload,
                })
            }

            pub(crate) fn write_payload<W: Write>(
                &self,
                writer: &mut BinaryWriter<W>,
            ) -> Result<(), Error> {
                writer.write_var_u32(self.entries.len() as u32)?;
                for entry in &self.entries {
                    entry.write(writer)?;
                }
                writer.write_bytes(&self.extra_payload)
            }
        }
    };
}

entry_section! {
    /// The type section: the module's function types.
    TypeSection, FunctionType, types, types_mut
}

entry_section! {
    /// The import section.
    ImportSection, ImportEntry, entries, entries_mut
}

entry_section! {
    /// The table section.
    TableSection, TableType, entries, entries_mut
}

entry_section! {
    /// The memory section.
    MemorySection, MemoryType, entries, entries_mut
}

entry_section! {
    /// The global section.
    GlobalSection, GlobalEntry, entries, entries_mut
}

entry_section! {
    /// The export section.
    ExportSection, ExportEntry, entries, entries_mut
}

entry_section! {
    /// The element section.
    ElementSection, ElementSegment, entries, entries_mut
}

entry_section! {
    /// The code section: one body per locally-defined function.
    CodeSection, FuncBody, bodies, bodies_mut
}

entry_section! {
    /// The data section.
    DataSection, DataSegment, entries, entries_mut
}

/// The function section: a type index per locally-defined function.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct FunctionSection {
    entries: Vec<u32>,
    extra_payload: Vec<u8>,
}

impl FunctionSection {
    /// Creates a function section with the given type indices.
    pub fn new(entries: Vec<u32>) -> FunctionSection {
        FunctionSection {
            entries,
            extra_payload: Vec::new(),
        }
    }

    /// Type index of each locally-defined function.
    pub fn entries(&self) -> &[u32] {
        &self.entries
    }

    /// Mutable access to the type indices.
    pub fn entries_mut(&mut self) -> &mut Vec<u32> {
        &mut self.entries
    }

    /// Unrecognized trailing bytes, replayed on encode.
    pub fn extra_payload(&self) -> &[u8] {
        &self.extra_payload
    }

    pub(crate) fn from_payload(payload: &[u8]) -> Result<FunctionSection, Error> {
        let mut reader = BinaryReader::new(payload);
        let count = reader.read_var_u32()? as usize;
        let mut entries = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            entries.push(reader.read_var_u32()?);
        }
        let extra_payload = remaining(&mut reader, payload)?;
        Ok(FunctionSection {
            entries,
            extra_payload,
        })
    }

    pub(crate) fn write_payload<W: Write>(&self, writer: &mut BinaryWriter<W>) -> Result<(), Error> {
        writer.write_var_u32(self.entries.len() as u32)?;
        for entry in &self.entries {
            writer.write_var_u32(*entry)?;
        }
        writer.write_bytes(&self.extra_payload)
    }
}

/// The start section: index of the function run after instantiation.
#[derive(Clone, Debug, PartialEq)]
pub struct StartSection {
    function_index: u32,
    extra_payload: Vec<u8>,
}

impl StartSection {
    /// Creates a start section pointing at the given function.
    pub fn new(function_index: u32) -> StartSection {
        StartSection {
            function_index,
            extra_payload: Vec::new(),
        }
    }

    /// Index of the start function.
    pub fn function_index(&self) -> u32 {
        self.function_index
    }

    /// Unrecognized trailing bytes, replayed on encode.
    pub fn extra_payload(&self) -> &[u8] {
        &self.extra_payload
    }

    pub(crate) fn from_payload(payload: &[u8]) -> Result<StartSection, Error> {
        let mut reader = BinaryReader::new(payload);
        let function_index = reader.read_var_u32()?;
        let extra_payload = remaining(&mut reader, payload)?;
        Ok(StartSection {
            function_index,
            extra_payload,
        })
    }

    pub(crate) fn write_payload<W: Write>(&self, writer: &mut BinaryWriter<W>) -> Result<(), Error> {
        writer.write_var_u32(self.function_index)?;
        writer.write_bytes(&self.extra_payload)
    }
}

/// A custom section whose name the codec does not recognize.
#[derive(Clone, Debug, PartialEq)]
pub struct CustomSection {
    name: String,
    payload: Vec<u8>,
}

impl CustomSection {
    /// Creates a custom section with the given name and payload.
    pub fn new(name: String, payload: Vec<u8>) -> CustomSection {
        CustomSection { name, payload }
    }

    /// The section's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The section's raw payload, excluding the name.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// A non-custom section with a code the codec does not recognize.
#[derive(Clone, Debug, PartialEq)]
pub struct UnknownSection {
    code: u8,
    payload: Vec<u8>,
}

impl UnknownSection {
    /// Creates an unknown section with the given code and raw payload.
    pub fn new(code: u8, payload: Vec<u8>) -> UnknownSection {
        UnknownSection { code, payload }
    }

    /// The section code.
    pub fn code(&self) -> u8 {
        self.code
    }

    /// The raw payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValueType;

    #[test]
    fn type_section_round_trip() {
        let section = TypeSection::new(vec![
            FunctionType::new(vec![], vec![]),
            FunctionType::new(vec![ValueType::I32], vec![ValueType::I64]),
        ]);
        let mut writer = BinaryWriter::buffer();
        section.write_payload(&mut writer).unwrap();
        let payload = writer.into_inner();
        assert_eq!(TypeSection::from_payload(&payload).unwrap(), section);
    }

    #[test]
    fn extra_payload_survives() {
        // An empty function section followed by junk the parser keeps.
        let payload = [0x00, 0xaa, 0xbb];
        let section = FunctionSection::from_payload(&payload).unwrap();
        assert_eq!(section.extra_payload(), &[0xaa, 0xbb]);
        let mut writer = BinaryWriter::buffer();
        section.write_payload(&mut writer).unwrap();
        assert_eq!(writer.into_inner(), payload);
    }
}
