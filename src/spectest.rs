//! Built-in importers: the reference-test host module and a minimal
//! stdio-backed runtime.

use crate::func::{FuncInstance, FuncRef};
use crate::global::{GlobalInstance, GlobalRef};
use crate::host::{Externals, RuntimeArgs};
use crate::imports::ModuleImportResolver;
use crate::memory::{MemoryInstance, MemoryRef};
use crate::table::{TableInstance, TableRef};
use crate::types::{GlobalDescriptor, MemoryDescriptor, Signature, TableDescriptor, ValueType};
use crate::value::RuntimeValue;
use crate::{Error, Trap, TrapCode};
use memory_units::wasm32::Pages;
use std::io::{Read, Write};

const PRINT_FUNC_INDEX: usize = 0;

/// The `"spectest"` host module expected by the reference test scripts:
/// `print_*` functions, fixture globals, a small memory and a table.
pub struct SpecTestImporter {
    table: TableRef,
    memory: MemoryRef,
    global_i32: GlobalRef,
    global_i64: GlobalRef,
    global_f32: GlobalRef,
    global_f64: GlobalRef,
}

impl Default for SpecTestImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl SpecTestImporter {
    /// Creates the importer with the fixture values from the reference
    /// harness.
    pub fn new() -> SpecTestImporter {
        SpecTestImporter {
            table: TableInstance::alloc(10, Some(20)).expect("static limits are valid"),
            memory: MemoryInstance::alloc(Pages(1), Some(Pages(2)))
                .expect("static limits are valid"),
            global_i32: GlobalInstance::alloc(RuntimeValue::I32(666), false),
            global_i64: GlobalInstance::alloc(RuntimeValue::I64(666), false),
            global_f32: GlobalInstance::alloc(RuntimeValue::F32(666.6f32.into()), false),
            global_f64: GlobalInstance::alloc(RuntimeValue::F64(666.6f64.into()), false),
        }
    }
}

impl Externals for SpecTestImporter {
    fn invoke_index(
        &mut self,
        index: usize,
        args: RuntimeArgs,
    ) -> Result<Option<RuntimeValue>, Trap> {
        match index {
            PRINT_FUNC_INDEX => {
                let rendered: Vec<String> = args
                    .as_ref()
                    .iter()
                    .map(|value| value.to_string())
                    .collect();
                println!("{}", rendered.join(" "));
                Ok(None)
            }
            _ => Err(TrapCode::Unreachable.into()),
        }
    }
}

impl ModuleImportResolver for SpecTestImporter {
    fn resolve_func(&self, field_name: &str, signature: &Signature) -> Result<FuncRef, Error> {
        match field_name {
            "print" | "print_i32" | "print_i64" | "print_f32" | "print_f64"
            | "print_i32_f32" | "print_f64_f64" => {
                if signature.return_type().is_some() {
                    return Err(Error::Instantiation(format!(
                        "spectest `{}` returns nothing",
                        field_name
                    )));
                }
                Ok(FuncInstance::alloc_host(
                    signature.clone(),
                    PRINT_FUNC_INDEX,
                ))
            }
            _ => Err(Error::Instantiation(format!(
                "unknown spectest func import {}",
                field_name
            ))),
        }
    }

    fn resolve_global(
        &self,
        field_name: &str,
        descriptor: &GlobalDescriptor,
    ) -> Result<GlobalRef, Error> {
        match field_name {
            "global" | "global_i32" | "global_i64" | "global_f32" | "global_f64" => {
                Ok(match descriptor.value_type() {
                    ValueType::I32 => self.global_i32.clone(),
                    ValueType::I64 => self.global_i64.clone(),
                    ValueType::F32 => self.global_f32.clone(),
                    ValueType::F64 => self.global_f64.clone(),
                })
            }
            _ => Err(Error::Instantiation(format!(
                "unknown spectest global import {}",
                field_name
            ))),
        }
    }

    fn resolve_memory(
        &self,
        field_name: &str,
        _descriptor: &MemoryDescriptor,
    ) -> Result<MemoryRef, Error> {
        if field_name == "memory" {
            return Ok(self.memory.clone());
        }
        Err(Error::Instantiation(format!(
            "unknown spectest memory import {}",
            field_name
        )))
    }

    fn resolve_table(
        &self,
        field_name: &str,
        _descriptor: &TableDescriptor,
    ) -> Result<TableRef, Error> {
        if field_name == "table" {
            return Ok(self.table.clone());
        }
        Err(Error::Instantiation(format!(
            "unknown spectest table import {}",
            field_name
        )))
    }
}

const STDIN_READ_INDEX: usize = 0;
const STDOUT_WRITE_INDEX: usize = 1;
const STDERR_WRITE_INDEX: usize = 2;

/// A minimal host runtime exposing byte-oriented standard I/O under the
/// `"runtime"` module:
///
/// - `stdin_read: () -> i32` returns the next byte or `-1` at EOF,
/// - `stdout_write: (i32) -> ()` writes one byte,
/// - `stderr_write: (i32) -> ()` writes one byte.
pub struct BaseRuntimeImporter<R, W, V> {
    stdin: R,
    stdout: W,
    stderr: V,
}

impl BaseRuntimeImporter<std::io::Stdin, std::io::Stdout, std::io::Stderr> {
    /// An importer wired to the process's standard streams.
    pub fn stdio() -> Self {
        BaseRuntimeImporter {
            stdin: std::io::stdin(),
            stdout: std::io::stdout(),
            stderr: std::io::stderr(),
        }
    }
}

impl<R: Read, W: Write, V: Write> BaseRuntimeImporter<R, W, V> {
    /// An importer over arbitrary streams, e.g. buffers in tests.
    pub fn new(stdin: R, stdout: W, stderr: V) -> Self {
        BaseRuntimeImporter {
            stdin,
            stdout,
            stderr,
        }
    }

    fn check_signature(index: usize, signature: &Signature) -> bool {
        let (params, ret): (&[ValueType], Option<ValueType>) = match index {
            STDIN_READ_INDEX => (&[], Some(ValueType::I32)),
            STDOUT_WRITE_INDEX | STDERR_WRITE_INDEX => (&[ValueType::I32], None),
            _ => return false,
        };
        signature.params() == params && signature.return_type() == ret
    }
}

impl<R: Read, W: Write, V: Write> Externals for BaseRuntimeImporter<R, W, V> {
    fn invoke_index(
        &mut self,
        index: usize,
        args: RuntimeArgs,
    ) -> Result<Option<RuntimeValue>, Trap> {
        match index {
            STDIN_READ_INDEX => {
                let mut byte = [0u8; 1];
                let value = match self.stdin.read(&mut byte) {
                    Ok(1) => i32::from(byte[0]),
                    _ => -1,
                };
                Ok(Some(RuntimeValue::I32(value)))
            }
            STDOUT_WRITE_INDEX | STDERR_WRITE_INDEX => {
                let value: i32 = args.nth_checked(0)?;
                let byte = [value as u8];
                let result = if index == STDOUT_WRITE_INDEX {
                    self.stdout.write_all(&byte)
                } else {
                    self.stderr.write_all(&byte)
                };
                result.map_err(|_| Trap::from(TrapCode::Unreachable))?;
                Ok(None)
            }
            _ => Err(TrapCode::Unreachable.into()),
        }
    }
}

impl<R: Read, W: Write, V: Write> ModuleImportResolver for BaseRuntimeImporter<R, W, V> {
    fn resolve_func(&self, field_name: &str, signature: &Signature) -> Result<FuncRef, Error> {
        let index = match field_name {
            "stdin_read" => STDIN_READ_INDEX,
            "stdout_write" => STDOUT_WRITE_INDEX,
            "stderr_write" => STDERR_WRITE_INDEX,
            _ => {
                return Err(Error::Instantiation(format!(
                    "unknown runtime import {}",
                    field_name
                )))
            }
        };
        if !Self::check_signature(index, signature) {
            return Err(Error::Instantiation(format!(
                "runtime import {} has a bad signature",
                field_name
            )));
        }
        Ok(FuncInstance::alloc_host(signature.clone(), index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imports::ImportsBuilder;
    use crate::module::ModuleInstance;
    use crate::text::assemble_str;

    #[test]
    fn spectest_satisfies_reference_imports() {
        let file = assemble_str(
            r#"
            (module
                (import "spectest" "print_i32" (func $p (param i32)))
                (import "spectest" "global_i32" (global i32))
                (import "spectest" "memory" (memory 1))
                (import "spectest" "table" (table 10 anyfunc)))
            "#,
        )
        .unwrap();
        let spectest = SpecTestImporter::new();
        let imports = ImportsBuilder::new().with_resolver("spectest", &spectest);
        assert!(ModuleInstance::new(&file, &imports).is_ok());
    }

    #[test]
    fn base_runtime_round_trips_bytes() {
        let file = assemble_str(
            r#"
            (module
                (import "runtime" "stdin_read" (func $read (result i32)))
                (import "runtime" "stdout_write" (func $write (param i32)))
                (func (export "echo")
                    (call $write (call $read))))
            "#,
        )
        .unwrap();
        let mut runtime = BaseRuntimeImporter::new(&b"A"[..], Vec::new(), Vec::new());
        let instance = {
            let imports = ImportsBuilder::new().with_resolver("runtime", &runtime);
            ModuleInstance::new(&file, &imports)
                .unwrap()
                .assert_no_start()
        };
        instance.invoke_export("echo", &[], &mut runtime).unwrap();
        assert_eq!(runtime.stdout, b"A");
    }
}
