//! The module model and its binary codec.
//!
//! A [`WasmFile`] is a version header plus the ordered list of sections
//! exactly as they appeared in the encoded module; writing a file replays
//! that order, which makes decode-then-encode byte exact for unmodified
//! MVP modules.

mod entries;
mod name;
mod sections;

pub use self::entries::{
    expand_locals, DataSegment, ElementSegment, ExportEntry, External, FuncBody, GlobalEntry,
    ImportEntry, InitExpr, Internal, LocalEntry,
};
pub use self::name::NameSection;
pub use self::sections::{
    CodeSection, CustomSection, DataSection, ElementSection, ExportSection, FunctionSection,
    GlobalSection, ImportSection, MemorySection, StartSection, TableSection, TypeSection,
    UnknownSection,
};

use crate::io::{BinaryReader, BinaryWriter};
use crate::Error;
use log::debug;
use std::fmt;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

/// The magic number at the start of every module: `\0asm` read as a
/// little-endian `u32`.
pub const WASM_MAGIC: u32 = 0x6d73_6100;

/// The MVP binary version. The only version this library emits.
pub const VERSION_MVP: u32 = 0x1;

/// The pre-MVP binary version, accepted on read only.
pub const VERSION_PRE_MVP: u32 = 0xd;

/// The magic/version pair at the start of a module.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VersionHeader {
    /// Always [`WASM_MAGIC`] for a well-formed module.
    pub magic: u32,
    /// [`VERSION_MVP`] or [`VERSION_PRE_MVP`].
    pub version: u32,
}

impl Default for VersionHeader {
    fn default() -> VersionHeader {
        VersionHeader {
            magic: WASM_MAGIC,
            version: VERSION_MVP,
        }
    }
}

/// A section of a module, tagged by its single-byte section code.
#[derive(Clone, Debug, PartialEq)]
pub enum Section {
    /// An unrecognized custom section (code 0).
    Custom(CustomSection),
    /// The `"name"` custom section (code 0).
    Name(NameSection),
    /// The type section (code 1).
    Type(TypeSection),
    /// The import section (code 2).
    Import(ImportSection),
    /// The function section (code 3).
    Function(FunctionSection),
    /// The table section (code 4).
    Table(TableSection),
    /// The memory section (code 5).
    Memory(MemorySection),
    /// The global section (code 6).
    Global(GlobalSection),
    /// The export section (code 7).
    Export(ExportSection),
    /// The start section (code 8).
    Start(StartSection),
    /// The element section (code 9).
    Element(ElementSection),
    /// The code section (code 10).
    Code(CodeSection),
    /// The data section (code 11).
    Data(DataSection),
    /// A non-custom section with an unrecognized code.
    Unknown(UnknownSection),
}

impl Section {
    /// The single-byte section code.
    pub fn code(&self) -> u8 {
        match self {
            Section::Custom(_) | Section::Name(_) => 0,
            Section::Type(_) => 1,
            Section::Import(_) => 2,
            Section::Function(_) => 3,
            Section::Table(_) => 4,
            Section::Memory(_) => 5,
            Section::Global(_) => 6,
            Section::Export(_) => 7,
            Section::Start(_) => 8,
            Section::Element(_) => 9,
            Section::Code(_) => 10,
            Section::Data(_) => 11,
            Section::Unknown(section) => section.code(),
        }
    }

    fn from_payload(code: u8, payload: Vec<u8>) -> Result<Section, Error> {
        Ok(match code {
            1 => Section::Type(TypeSection::from_payload(&payload)?),
            2 => Section::Import(ImportSection::from_payload(&payload)?),
            3 => Section::Function(FunctionSection::from_payload(&payload)?),
            4 => Section::Table(TableSection::from_payload(&payload)?),
            5 => Section::Memory(MemorySection::from_payload(&payload)?),
            6 => Section::Global(GlobalSection::from_payload(&payload)?),
            7 => Section::Export(ExportSection::from_payload(&payload)?),
            8 => Section::Start(StartSection::from_payload(&payload)?),
            9 => Section::Element(ElementSection::from_payload(&payload)?),
            10 => Section::Code(CodeSection::from_payload(&payload)?),
            11 => Section::Data(DataSection::from_payload(&payload)?),
            _ => Section::Unknown(UnknownSection::new(code, payload)),
        })
    }

    fn write_payload<W: Write>(&self, writer: &mut BinaryWriter<W>) -> Result<(), Error> {
        match self {
            Section::Custom(section) => writer.write_bytes(section.payload()),
            Section::Name(section) => section.write_payload(writer),
            Section::Type(section) => section.write_payload(writer),
            Section::Import(section) => section.write_payload(writer),
            Section::Function(section) => section.write_payload(writer),
            Section::Table(section) => section.write_payload(writer),
            Section::Memory(section) => section.write_payload(writer),
            Section::Global(section) => section.write_payload(writer),
            Section::Export(section) => section.write_payload(writer),
            Section::Start(section) => section.write_payload(writer),
            Section::Element(section) => section.write_payload(writer),
            Section::Code(section) => section.write_payload(writer),
            Section::Data(section) => section.write_payload(writer),
            Section::Unknown(section) => writer.write_bytes(section.payload()),
        }
    }

    fn custom_name(&self) -> Option<&str> {
        match self {
            Section::Custom(section) => Some(section.name()),
            Section::Name(_) => Some("name"),
            _ => None,
        }
    }
}

/// An in-memory module: the version header and its sections, in encoded
/// order.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct WasmFile {
    version: VersionHeader,
    sections: Vec<Section>,
}

impl WasmFile {
    /// Creates an empty MVP module.
    pub fn new() -> WasmFile {
        WasmFile::default()
    }

    /// The version header read from (or written to) the binary form.
    pub fn version(&self) -> VersionHeader {
        self.version
    }

    /// The module's sections, in encoded order.
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Mutable access to the module's sections.
    pub fn sections_mut(&mut self) -> &mut Vec<Section> {
        &mut self.sections
    }

    /// Decodes a module from a byte buffer.
    pub fn from_buffer(buffer: &[u8]) -> Result<WasmFile, Error> {
        WasmFile::read(&mut BinaryReader::new(buffer))
    }

    /// Decodes a module from a file on disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<WasmFile, Error> {
        let file = fs::File::open(path.as_ref())
            .map_err(|e| Error::Encoding(format!("cannot open {}: {}", path.as_ref().display(), e)))?;
        WasmFile::read(&mut BinaryReader::new(std::io::BufReader::new(file)))
    }

    /// Decodes a module from a binary reader. The reader may wrap a
    /// non-seekable stream; the module is expected to extend to the end
    /// of it.
    pub fn read<R: Read>(reader: &mut BinaryReader<R>) -> Result<WasmFile, Error> {
        let magic = reader.read_u32_le()?;
        if magic != WASM_MAGIC {
            return Err(Error::BadHeader(format!(
                "bad magic number {:#010x}; this is not a WebAssembly module",
                magic
            )));
        }
        let version = reader.read_u32_le()?;
        if version != VERSION_MVP && version != VERSION_PRE_MVP {
            return Err(Error::BadHeader(format!(
                "unsupported binary version {:#x}",
                version
            )));
        }

        let mut sections = Vec::new();
        while let Some(code) = reader.read_u8_opt()? {
            if code & 0x80 != 0 {
                return Err(Error::Encoding(format!("invalid section id {:#x}", code)));
            }
            let payload_length = reader.read_var_u32()? as u64;
            let section = if code == 0 {
                let before_name = reader.position();
                let name = reader.read_string()?;
                let name_length = reader.position() - before_name;
                // The declared length covers the name; what remains is the
                // section's own payload.
                let payload_length = payload_length.checked_sub(name_length).ok_or_else(|| {
                    Error::Encoding(format!(
                        "custom section length {} is shorter than its name",
                        payload_length
                    ))
                })?;
                let payload = reader.read_bytes(payload_length as usize)?;
                if name == "name" {
                    match NameSection::from_payload(&payload) {
                        Ok(section) => Section::Name(section),
                        Err(error) => {
                            debug!("treating malformed name section as opaque: {}", error);
                            Section::Custom(CustomSection::new(name, payload))
                        }
                    }
                } else {
                    Section::Custom(CustomSection::new(name, payload))
                }
            } else {
                let payload = reader.read_bytes(payload_length as usize)?;
                Section::from_payload(code, payload)?
            };
            sections.push(section);
        }

        Ok(WasmFile {
            version: VersionHeader { magic, version },
            sections,
        })
    }

    /// Encodes the module into a byte vector.
    pub fn to_vec(&self) -> Result<Vec<u8>, Error> {
        let mut writer = BinaryWriter::buffer();
        self.write(&mut writer)?;
        Ok(writer.into_inner())
    }

    /// Encodes the module. Always emits the MVP version; a module read
    /// with the pre-MVP version is upgraded on write.
    pub fn write<W: Write>(&self, writer: &mut BinaryWriter<W>) -> Result<(), Error> {
        if self.version.version != VERSION_MVP {
            debug!(
                "rewriting binary version {:#x} as {:#x}",
                self.version.version, VERSION_MVP
            );
        }
        writer.write_u32_le(WASM_MAGIC)?;
        writer.write_u32_le(VERSION_MVP)?;
        for section in &self.sections {
            writer.write_u8(section.code() & 0x7f)?;
            let mut scratch = BinaryWriter::buffer();
            if let Some(name) = section.custom_name() {
                scratch.write_string(name)?;
            }
            section.write_payload(&mut scratch)?;
            let payload = scratch.into_inner();
            writer.write_var_u32(payload.len() as u32)?;
            writer.write_bytes(&payload)?;
        }
        Ok(())
    }

    /// Writes the encoded module to a file on disk.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let bytes = self.to_vec()?;
        fs::write(path.as_ref(), bytes)
            .map_err(|e| Error::Encoding(format!("cannot write {}: {}", path.as_ref().display(), e)))
    }

    // Custom sections inherit the position of the preceding non-custom
    // section so inserts do not reorder them.
    fn section_sort_key(&self, up_to: usize) -> u8 {
        let mut key = 0;
        for section in &self.sections[..up_to] {
            if section.code() != 0 {
                key = section.code();
            }
        }
        key
    }

    /// Inserts a section at its canonical position: after every section
    /// with a smaller or equal code, with custom sections sticking to the
    /// section they follow.
    pub fn insert_section(&mut self, section: Section) {
        let code = section.code();
        if code == 0 {
            self.sections.push(section);
            return;
        }
        let mut index = self.sections.len();
        for i in (0..self.sections.len()).rev() {
            let existing = match self.sections[i].code() {
                0 => self.section_sort_key(i),
                other => other,
            };
            if existing <= code {
                break;
            }
            index = i;
        }
        self.sections.insert(index, section);
    }

    /// Concatenates the sections of several modules into one, keeping the
    /// largest version header seen.
    pub fn merge<I: IntoIterator<Item = WasmFile>>(files: I) -> WasmFile {
        let mut merged = WasmFile::new();
        let mut version = 0;
        for file in files {
            version = version.max(file.version.version);
            merged.sections.extend(file.sections);
        }
        if version != 0 {
            merged.version.version = version;
        }
        merged
    }

    fn find_section<T, F: Fn(&Section) -> Option<&T>>(&self, f: F) -> Option<&T> {
        self.sections.iter().find_map(f)
    }

    fn find_section_mut<T, F: FnMut(&mut Section) -> Option<&mut T>>(
        &mut self,
        f: F,
    ) -> Option<&mut T> {
        self.sections.iter_mut().find_map(f)
    }

    /// The type section, if present.
    pub fn type_section(&self) -> Option<&TypeSection> {
        self.find_section(|s| match s {
            Section::Type(section) => Some(section),
            _ => None,
        })
    }

    /// Mutable access to the type section.
    pub fn type_section_mut(&mut self) -> Option<&mut TypeSection> {
        self.find_section_mut(|s| match s {
            Section::Type(section) => Some(section),
            _ => None,
        })
    }

    /// The import section, if present.
    pub fn import_section(&self) -> Option<&ImportSection> {
        self.find_section(|s| match s {
            Section::Import(section) => Some(section),
            _ => None,
        })
    }

    /// Mutable access to the import section.
    pub fn import_section_mut(&mut self) -> Option<&mut ImportSection> {
        self.find_section_mut(|s| match s {
            Section::Import(section) => Some(section),
            _ => None,
        })
    }

    /// The function section, if present.
    pub fn function_section(&self) -> Option<&FunctionSection> {
        self.find_section(|s| match s {
            Section::Function(section) => Some(section),
            _ => None,
        })
    }

    /// Mutable access to the function section.
    pub fn function_section_mut(&mut self) -> Option<&mut FunctionSection> {
        self.find_section_mut(|s| match s {
            Section::Function(section) => Some(section),
            _ => None,
        })
    }

    /// The table section, if present.
    pub fn table_section(&self) -> Option<&TableSection> {
        self.find_section(|s| match s {
            Section::Table(section) => Some(section),
            _ => None,
        })
    }

    /// The memory section, if present.
    pub fn memory_section(&self) -> Option<&MemorySection> {
        self.find_section(|s| match s {
            Section::Memory(section) => Some(section),
            _ => None,
        })
    }

    /// The global section, if present.
    pub fn global_section(&self) -> Option<&GlobalSection> {
        self.find_section(|s| match s {
            Section::Global(section) => Some(section),
            _ => None,
        })
    }

    /// The export section, if present.
    pub fn export_section(&self) -> Option<&ExportSection> {
        self.find_section(|s| match s {
            Section::Export(section) => Some(section),
            _ => None,
        })
    }

    /// The start function index, if a start section is present.
    pub fn start_section(&self) -> Option<u32> {
        self.find_section(|s| match s {
            Section::Start(section) => Some(section),
            _ => None,
        })
        .map(StartSection::function_index)
    }

    /// The element section, if present.
    pub fn element_section(&self) -> Option<&ElementSection> {
        self.find_section(|s| match s {
            Section::Element(section) => Some(section),
            _ => None,
        })
    }

    /// The code section, if present.
    pub fn code_section(&self) -> Option<&CodeSection> {
        self.find_section(|s| match s {
            Section::Code(section) => Some(section),
            _ => None,
        })
    }

    /// Mutable access to the code section.
    pub fn code_section_mut(&mut self) -> Option<&mut CodeSection> {
        self.find_section_mut(|s| match s {
            Section::Code(section) => Some(section),
            _ => None,
        })
    }

    /// The data section, if present.
    pub fn data_section(&self) -> Option<&DataSection> {
        self.find_section(|s| match s {
            Section::Data(section) => Some(section),
            _ => None,
        })
    }

    /// The name section, if present.
    pub fn name_section(&self) -> Option<&NameSection> {
        self.find_section(|s| match s {
            Section::Name(section) => Some(section),
            _ => None,
        })
    }

    /// The module's name hint from the name section, if any.
    pub fn module_name(&self) -> Option<&str> {
        self.name_section().and_then(NameSection::module_name)
    }
}

impl fmt::Display for WasmFile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "(module")?;
        if let Some(name) = self.module_name() {
            writeln!(f, "  ;; name: {}", name)?;
        }
        for section in &self.sections {
            match section {
                Section::Type(section) => {
                    for (i, ty) in section.types().iter().enumerate() {
                        writeln!(f, "  (type {} {})", i, ty)?;
                    }
                }
                Section::Import(section) => {
                    for entry in section.entries() {
                        write!(f, "  (import \"{}\" \"{}\" ", entry.module(), entry.field())?;
                        match entry.external() {
                            External::Function(type_index) => {
                                writeln!(f, "(func (type {})))", type_index)?
                            }
                            External::Table(table) => writeln!(
                                f,
                                "(table {} {} anyfunc))",
                                table.limits().initial(),
                                table
                                    .limits()
                                    .maximum()
                                    .map_or(String::new(), |m| m.to_string()),
                            )?,
                            External::Memory(memory) => writeln!(
                                f,
                                "(memory {} {}))",
                                memory.limits().initial(),
                                memory
                                    .limits()
                                    .maximum()
                                    .map_or(String::new(), |m| m.to_string()),
                            )?,
                            External::Global(global) => {
                                if global.is_mutable() {
                                    writeln!(f, "(global (mut {})))", global.content_type())?
                                } else {
                                    writeln!(f, "(global {}))", global.content_type())?
                                }
                            }
                        }
                    }
                }
                Section::Function(section) => {
                    for (i, type_index) in section.entries().iter().enumerate() {
                        writeln!(f, "  ;; func {} uses type {}", i, type_index)?;
                    }
                }
                Section::Table(section) => {
                    for table in section.entries() {
                        write!(f, "  (table {}", table.limits().initial())?;
                        if let Some(maximum) = table.limits().maximum() {
                            write!(f, " {}", maximum)?;
                        }
                        writeln!(f, " anyfunc)")?;
                    }
                }
                Section::Memory(section) => {
                    for memory in section.entries() {
                        write!(f, "  (memory {}", memory.limits().initial())?;
                        if let Some(maximum) = memory.limits().maximum() {
                            write!(f, " {}", maximum)?;
                        }
                        writeln!(f, ")")?;
                    }
                }
                Section::Global(section) => {
                    for (i, entry) in section.entries().iter().enumerate() {
                        let ty = entry.global_type();
                        if ty.is_mutable() {
                            writeln!(f, "  (global {} (mut {})", i, ty.content_type())?;
                        } else {
                            writeln!(f, "  (global {} {}", i, ty.content_type())?;
                        }
                        for instruction in entry.init_expr().code() {
                            write!(f, "    {}", instruction)?;
                        }
                        writeln!(f, "  )")?;
                    }
                }
                Section::Export(section) => {
                    for entry in section.entries() {
                        let keyword = match entry.internal() {
                            Internal::Function(_) => "func",
                            Internal::Table(_) => "table",
                            Internal::Memory(_) => "memory",
                            Internal::Global(_) => "global",
                        };
                        writeln!(
                            f,
                            "  (export \"{}\" ({} {}))",
                            entry.field(),
                            keyword,
                            entry.internal().index()
                        )?;
                    }
                }
                Section::Start(section) => {
                    writeln!(f, "  (start {})", section.function_index())?;
                }
                Section::Element(section) => {
                    for segment in section.entries() {
                        write!(f, "  (elem (table {})", segment.table_index())?;
                        for member in segment.members() {
                            write!(f, " {}", member)?;
                        }
                        writeln!(f, ")")?;
                    }
                }
                Section::Code(section) => {
                    for (i, body) in section.bodies().iter().enumerate() {
                        writeln!(f, "  (func {}", i)?;
                        for local in body.locals() {
                            writeln!(
                                f,
                                "    (local {} x{})",
                                local.value_type(),
                                local.count()
                            )?;
                        }
                        for instruction in body.code() {
                            for line in instruction.to_string().lines() {
                                writeln!(f, "    {}", line)?;
                            }
                        }
                        writeln!(f, "  )")?;
                    }
                }
                Section::Data(section) => {
                    for segment in section.entries() {
                        writeln!(
                            f,
                            "  (data (memory {}) ({} bytes))",
                            segment.memory_index(),
                            segment.value().len()
                        )?;
                    }
                }
                Section::Custom(section) => {
                    writeln!(
                        f,
                        "  ;; custom section \"{}\" ({} bytes)",
                        section.name(),
                        section.payload().len()
                    )?;
                }
                Section::Name(_) => {}
                Section::Unknown(section) => {
                    writeln!(
                        f,
                        "  ;; unknown section {} ({} bytes)",
                        section.code(),
                        section.payload().len()
                    )?;
                }
            }
        }
        writeln!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_module() {
        let file = WasmFile::new();
        let bytes = file.to_vec().unwrap();
        assert_eq!(bytes, [0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00]);
        let decoded = WasmFile::from_buffer(&bytes).unwrap();
        assert_eq!(decoded, file);
    }

    #[test]
    fn bad_magic_rejected() {
        let bytes = [0x00, 0x61, 0x73, 0x6e, 0x01, 0x00, 0x00, 0x00];
        assert!(matches!(
            WasmFile::from_buffer(&bytes),
            Err(Error::BadHeader(_))
        ));
    }

    #[test]
    fn pre_mvp_version_accepted() {
        let bytes = [0x00, 0x61, 0x73, 0x6d, 0x0d, 0x00, 0x00, 0x00];
        let file = WasmFile::from_buffer(&bytes).unwrap();
        assert_eq!(file.version().version, VERSION_PRE_MVP);
        // Re-encoding upgrades to the MVP version.
        assert_eq!(
            file.to_vec().unwrap(),
            [0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn unknown_version_rejected() {
        let bytes = [0x00, 0x61, 0x73, 0x6d, 0x02, 0x00, 0x00, 0x00];
        assert!(matches!(
            WasmFile::from_buffer(&bytes),
            Err(Error::BadHeader(_))
        ));
    }

    #[test]
    fn custom_section_round_trip() {
        let mut file = WasmFile::new();
        file.sections_mut().push(Section::Custom(CustomSection::new(
            "producers".into(),
            vec![1, 2, 3],
        )));
        let bytes = file.to_vec().unwrap();
        let decoded = WasmFile::from_buffer(&bytes).unwrap();
        assert_eq!(decoded, file);
        assert_eq!(decoded.to_vec().unwrap(), bytes);
    }

    #[test]
    fn insert_section_keeps_canonical_order() {
        let mut file = WasmFile::new();
        file.insert_section(Section::Code(CodeSection::default()));
        file.insert_section(Section::Type(TypeSection::default()));
        file.insert_section(Section::Function(FunctionSection::default()));
        let codes: Vec<u8> = file.sections().iter().map(Section::code).collect();
        assert_eq!(codes, vec![1, 3, 10]);
    }

    #[test]
    fn merge_keeps_largest_version() {
        let mvp = WasmFile::new();
        let pre = WasmFile::from_buffer(&[0x00, 0x61, 0x73, 0x6d, 0x0d, 0x00, 0x00, 0x00]).unwrap();
        let merged = WasmFile::merge(vec![mvp, pre]);
        assert_eq!(merged.version().version, VERSION_PRE_MVP);
    }
}
