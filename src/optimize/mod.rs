//! Semantics-preserving module transformations: peephole rewriting,
//! local-entry compaction and function-type deduplication.

mod peephole;

pub use self::peephole::{PeepholeOptimizer, PeepholeRule, TeeLocalRule, UnreachableCodeRule};

use crate::elements::{expand_locals, External, LocalEntry, Section, WasmFile};
use crate::ops::Instruction;
use crate::types::FunctionType;
use log::debug;
use std::collections::HashMap;

/// Merges adjacent local entries of the same type and drops zero-count
/// entries. The expansion of the list is unchanged.
pub fn compress_locals(locals: &mut Vec<LocalEntry>) {
    let mut compressed: Vec<LocalEntry> = Vec::with_capacity(locals.len());
    for entry in locals.drain(..) {
        if entry.count() == 0 {
            continue;
        }
        match compressed.last_mut() {
            Some(last) if last.value_type() == entry.value_type() => {
                *last = LocalEntry::new(last.count() + entry.count(), entry.value_type());
            }
            _ => compressed.push(entry),
        }
    }
    *locals = compressed;
}

fn remap_type_indices(code: &mut [Instruction], remap: &HashMap<u32, u32>) {
    for instruction in code {
        match instruction {
            Instruction::CallIndirect(type_index, _) => {
                if let Some(new_index) = remap.get(type_index) {
                    *type_index = *new_index;
                }
            }
            Instruction::Block(_, body) | Instruction::Loop(_, body) => {
                remap_type_indices(body, remap);
            }
            Instruction::If(_, consequent, alternate) => {
                remap_type_indices(consequent, remap);
                remap_type_indices(alternate, remap);
            }
            _ => {}
        }
    }
}

/// Deduplicates the type section by structural equality and rewrites
/// every type reference: function declarations, function imports and
/// `call_indirect` immediates.
pub fn compress_function_types(file: &mut WasmFile) {
    let Some(type_section) = file.type_section() else {
        return;
    };

    let original_count = type_section.types().len();
    let mut distinct: Vec<FunctionType> = Vec::new();
    let mut seen: HashMap<FunctionType, u32> = HashMap::new();
    let mut remap: HashMap<u32, u32> = HashMap::new();
    for (old_index, func_type) in type_section.types().iter().enumerate() {
        let new_index = *seen.entry(func_type.clone()).or_insert_with(|| {
            distinct.push(func_type.clone());
            (distinct.len() - 1) as u32
        });
        if new_index != old_index as u32 {
            remap.insert(old_index as u32, new_index);
        }
    }

    if remap.is_empty() {
        return;
    }
    debug!(
        "type deduplication: {} types -> {}",
        original_count,
        distinct.len()
    );

    for section in file.sections_mut() {
        match section {
            Section::Type(section) => {
                *section.types_mut() = distinct.clone();
            }
            Section::Function(section) => {
                for type_index in section.entries_mut() {
                    if let Some(new_index) = remap.get(type_index) {
                        *type_index = *new_index;
                    }
                }
            }
            Section::Import(section) => {
                for entry in section.entries_mut() {
                    if let External::Function(type_index) = entry.external_mut() {
                        if let Some(new_index) = remap.get(type_index) {
                            *type_index = *new_index;
                        }
                    }
                }
            }
            Section::Code(section) => {
                for body in section.bodies_mut() {
                    remap_type_indices(body.code_mut(), &remap);
                }
            }
            _ => {}
        }
    }
}

impl WasmFile {
    /// Applies the full optimization pipeline: function-type
    /// deduplication, then per-body local compaction and the default
    /// peephole rules.
    pub fn optimize(&mut self) {
        compress_function_types(self);
        let optimizer = PeepholeOptimizer::default();
        if let Some(code_section) = self.code_section_mut() {
            for body in code_section.bodies_mut() {
                compress_locals(body.locals_mut());
                optimizer.rewrite(body.code_mut());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::LocalEntry;
    use crate::text::assemble_str;
    use crate::types::ValueType;

    #[test]
    fn compress_preserves_expansion() {
        let samples: Vec<Vec<LocalEntry>> = vec![
            vec![],
            vec![LocalEntry::new(0, ValueType::I32)],
            vec![
                LocalEntry::new(1, ValueType::I32),
                LocalEntry::new(2, ValueType::I32),
                LocalEntry::new(0, ValueType::F32),
                LocalEntry::new(1, ValueType::I32),
                LocalEntry::new(3, ValueType::F64),
            ],
        ];
        for sample in samples {
            let mut compressed = sample.clone();
            compress_locals(&mut compressed);
            assert_eq!(expand_locals(&compressed), expand_locals(&sample));
            // Compressed form has no zero entries and no adjacent
            // duplicates.
            assert!(compressed.iter().all(|entry| entry.count() > 0));
            assert!(compressed
                .windows(2)
                .all(|pair| pair[0].value_type() != pair[1].value_type()));
        }
    }

    #[test]
    fn type_dedup_rewrites_references() {
        let mut file = assemble_str(
            r#"
            (module
                (type $a (func (param i32) (result i32)))
                (type $b (func (param i32) (result i32)))
                (type $c (func))
                (import "env" "f" (func (type $b)))
                (table 1 anyfunc)
                (func (type $b) (param i32) (result i32)
                    get_local 0
                    i32.const 0
                    call_indirect (type $b)))
            "#,
        )
        .unwrap();

        compress_function_types(&mut file);

        let types = file.type_section().unwrap().types();
        assert_eq!(types.len(), 2);
        // The import referenced $b (old index 1) and now targets the
        // structurally equal type 0.
        let import = &file.import_section().unwrap().entries()[0];
        assert_eq!(import.external(), &External::Function(0));
        assert_eq!(file.function_section().unwrap().entries(), &[0]);
        let body = &file.code_section().unwrap().bodies()[0];
        assert!(body
            .code()
            .iter()
            .any(|i| matches!(i, Instruction::CallIndirect(0, _))));
    }

    #[test]
    fn optimize_pipeline_runs() {
        let mut file = assemble_str(
            r#"
            (module
                (func (param i32) (result i32) (local $t i32)
                    get_local 0
                    set_local $t
                    get_local $t))
            "#,
        )
        .unwrap();
        file.optimize();
        let body = &file.code_section().unwrap().bodies()[0];
        assert_eq!(
            body.code(),
            &[
                Instruction::GetLocal(0),
                Instruction::TeeLocal(1),
            ]
        );
    }
}
