//! The `"name"` custom section: debug name hints for the module, its
//! functions and their locals.

use crate::io::{BinaryReader, BinaryWriter};
use crate::Error;
use std::collections::BTreeMap;
use std::io::Write;

const SUBSECTION_MODULE: u8 = 0;
const SUBSECTION_FUNCTIONS: u8 = 1;
const SUBSECTION_LOCALS: u8 = 2;

/// Parsed view of the `"name"` custom section.
///
/// A decoded section keeps its raw payload so an unmodified module
/// round-trips byte for byte; programmatically built sections serialize
/// their subsections in id order.
#[derive(Clone, Debug, Default)]
pub struct NameSection {
    module_name: Option<String>,
    function_names: BTreeMap<u32, String>,
    local_names: BTreeMap<u32, BTreeMap<u32, String>>,
    raw: Option<Vec<u8>>,
}

/// Equality is over the parsed names; the cached raw payload is an
/// encoding detail.
impl PartialEq for NameSection {
    fn eq(&self, other: &NameSection) -> bool {
        self.module_name == other.module_name
            && self.function_names == other.function_names
            && self.local_names == other.local_names
    }
}

impl NameSection {
    /// Creates a name section carrying only a module name, as emitted for
    /// `(module $name …)` text modules.
    pub fn for_module_name(name: String) -> NameSection {
        NameSection {
            module_name: Some(name),
            ..NameSection::default()
        }
    }

    /// Creates a name section with function name hints.
    pub fn with_function_names(
        module_name: Option<String>,
        function_names: BTreeMap<u32, String>,
    ) -> NameSection {
        NameSection {
            module_name,
            function_names,
            ..NameSection::default()
        }
    }

    /// The module name hint, if present.
    pub fn module_name(&self) -> Option<&str> {
        self.module_name.as_deref()
    }

    /// The function name hints, keyed by function index.
    pub fn function_names(&self) -> &BTreeMap<u32, String> {
        &self.function_names
    }

    /// The local name hints, keyed by function index then local index.
    pub fn local_names(&self) -> &BTreeMap<u32, BTreeMap<u32, String>> {
        &self.local_names
    }

    fn read_name_map(reader: &mut BinaryReader<&[u8]>) -> Result<BTreeMap<u32, String>, Error> {
        let count = reader.read_var_u32()?;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let index = reader.read_var_u32()?;
            let name = reader.read_string()?;
            map.insert(index, name);
        }
        Ok(map)
    }

    pub(crate) fn from_payload(payload: &[u8]) -> Result<NameSection, Error> {
        let mut section = NameSection {
            raw: Some(payload.to_vec()),
            ..NameSection::default()
        };
        let mut reader = BinaryReader::new(payload);
        while (reader.position() as usize) < payload.len() {
            let id = reader.read_var_u7()?;
            let len = reader.read_var_u32()? as usize;
            let subsection = reader.read_bytes(len)?;
            let mut sub_reader = BinaryReader::new(&subsection[..]);
            match id {
                SUBSECTION_MODULE => {
                    section.module_name = Some(sub_reader.read_string()?);
                }
                SUBSECTION_FUNCTIONS => {
                    section.function_names = Self::read_name_map(&mut sub_reader)?;
                }
                SUBSECTION_LOCALS => {
                    let count = sub_reader.read_var_u32()?;
                    for _ in 0..count {
                        let func_index = sub_reader.read_var_u32()?;
                        let names = Self::read_name_map(&mut sub_reader)?;
                        section.local_names.insert(func_index, names);
                    }
                }
                // Later name subsections are preserved through `raw`.
                _ => {}
            }
        }
        Ok(section)
    }

    fn write_name_map<W: Write>(
        writer: &mut BinaryWriter<W>,
        map: &BTreeMap<u32, String>,
    ) -> Result<(), Error> {
        writer.write_var_u32(map.len() as u32)?;
        for (index, name) in map {
            writer.write_var_u32(*index)?;
            writer.write_string(name)?;
        }
        Ok(())
    }

    fn write_subsection<W: Write>(
        writer: &mut BinaryWriter<W>,
        id: u8,
        payload: &[u8],
    ) -> Result<(), Error> {
        writer.write_var_u7(id)?;
        writer.write_var_u32(payload.len() as u32)?;
        writer.write_bytes(payload)
    }

    pub(crate) fn write_payload<W: Write>(&self, writer: &mut BinaryWriter<W>) -> Result<(), Error> {
        if let Some(raw) = &self.raw {
            return writer.write_bytes(raw);
        }
        if let Some(module_name) = &self.module_name {
            let mut scratch = BinaryWriter::buffer();
            scratch.write_string(module_name)?;
            Self::write_subsection(writer, SUBSECTION_MODULE, &scratch.into_inner())?;
        }
        if !self.function_names.is_empty() {
            let mut scratch = BinaryWriter::buffer();
            Self::write_name_map(&mut scratch, &self.function_names)?;
            Self::write_subsection(writer, SUBSECTION_FUNCTIONS, &scratch.into_inner())?;
        }
        if !self.local_names.is_empty() {
            let mut scratch = BinaryWriter::buffer();
            scratch.write_var_u32(self.local_names.len() as u32)?;
            for (func_index, names) in &self.local_names {
                scratch.write_var_u32(*func_index)?;
                Self::write_name_map(&mut scratch, names)?;
            }
            Self::write_subsection(writer, SUBSECTION_LOCALS, &scratch.into_inner())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_name_round_trip() {
        let section = NameSection::for_module_name("adder".into());
        let mut writer = BinaryWriter::buffer();
        section.write_payload(&mut writer).unwrap();
        let payload = writer.into_inner();

        let decoded = NameSection::from_payload(&payload).unwrap();
        assert_eq!(decoded.module_name(), Some("adder"));
    }

    #[test]
    fn decoded_payload_is_replayed() {
        let section = {
            let mut names = BTreeMap::new();
            names.insert(0, "fac".to_string());
            names.insert(3, "main".to_string());
            NameSection::with_function_names(Some("demo".into()), names)
        };
        let mut writer = BinaryWriter::buffer();
        section.write_payload(&mut writer).unwrap();
        let payload = writer.into_inner();

        let decoded = NameSection::from_payload(&payload).unwrap();
        let mut writer = BinaryWriter::buffer();
        decoded.write_payload(&mut writer).unwrap();
        assert_eq!(writer.into_inner(), payload);
        assert_eq!(decoded.function_names().get(&3).unwrap(), "main");
    }
}
