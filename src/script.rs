//! Runner for `.wast` test scripts.
//!
//! Drives the command vocabulary of the reference test suite — `module`,
//! `register`, `invoke`, `get` and the `assert_*` family — against this
//! crate's own assembler and interpreter.

use crate::elements::WasmFile;
use crate::func::FuncRef;
use crate::global::GlobalRef;
use crate::imports::{ImportResolver, ModuleImportResolver};
use crate::memory::MemoryRef;
use crate::module::{ModuleInstance, ModuleRef};
use crate::spectest::SpecTestImporter;
use crate::table::TableRef;
use crate::text::{
    assemble_fields, assemble_module, Diagnostics, FloatLiteral, FloatLiteralKind, SExpr, Token,
};
use crate::types::{GlobalDescriptor, MemoryDescriptor, Signature, TableDescriptor};
use crate::value::RuntimeValue;
use crate::Error;
use log::debug;
use num_traits::ToPrimitive;
use std::collections::HashMap;

/// Tally of a script run.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptSummary {
    /// Commands executed, including module definitions.
    pub commands: usize,
    /// Assertions that were checked.
    pub assertions: usize,
}

/// The host state threaded through a script: instantiated modules by
/// name, the most recent module, registered import namespaces and the
/// `spectest` fixture module.
pub struct ScriptRunner {
    spec_module: SpecTestImporter,
    instances: HashMap<String, ModuleRef>,
    registered: HashMap<String, ModuleRef>,
    last_module: Option<ModuleRef>,
}

impl Default for ScriptRunner {
    fn default() -> Self {
        Self::new()
    }
}

struct ScriptResolver<'a> {
    spec_module: &'a SpecTestImporter,
    registered: &'a HashMap<String, ModuleRef>,
}

impl<'a> ScriptResolver<'a> {
    fn resolver(&self, module_name: &str) -> Result<&dyn ModuleImportResolver, Error> {
        if module_name == "spectest" {
            return Ok(self.spec_module);
        }
        self.registered
            .get(module_name)
            .map(|module| module as &dyn ModuleImportResolver)
            .ok_or_else(|| Error::Instantiation(format!("module {} not registered", module_name)))
    }
}

impl<'a> ImportResolver for ScriptResolver<'a> {
    fn resolve_func(
        &self,
        module_name: &str,
        field_name: &str,
        signature: &Signature,
    ) -> Result<FuncRef, Error> {
        self.resolver(module_name)?.resolve_func(field_name, signature)
    }

    fn resolve_global(
        &self,
        module_name: &str,
        field_name: &str,
        descriptor: &GlobalDescriptor,
    ) -> Result<GlobalRef, Error> {
        self.resolver(module_name)?
            .resolve_global(field_name, descriptor)
    }

    fn resolve_memory(
        &self,
        module_name: &str,
        field_name: &str,
        descriptor: &MemoryDescriptor,
    ) -> Result<MemoryRef, Error> {
        self.resolver(module_name)?
            .resolve_memory(field_name, descriptor)
    }

    fn resolve_table(
        &self,
        module_name: &str,
        field_name: &str,
        descriptor: &TableDescriptor,
    ) -> Result<TableRef, Error> {
        self.resolver(module_name)?
            .resolve_table(field_name, descriptor)
    }
}

fn script_error(command: &SExpr, message: impl Into<String>) -> Error {
    Error::TextFormat(format!("{}: {}", command.span(), message.into()))
}

impl ScriptRunner {
    /// Creates a runner with a fresh `spectest` fixture module.
    pub fn new() -> ScriptRunner {
        ScriptRunner {
            spec_module: SpecTestImporter::new(),
            instances: HashMap::new(),
            registered: HashMap::new(),
            last_module: None,
        }
    }

    /// Runs a whole script source, stopping at the first failure.
    pub fn run_script(&mut self, source: &str) -> Result<ScriptSummary, Error> {
        let document = crate::text::parse_document(source)?;

        // A document with no commands at all is an inline module.
        let is_command = |expr: &SExpr| {
            expr.as_list()
                .and_then(|items| items.first())
                .and_then(SExpr::as_keyword)
                .map(|head| {
                    matches!(
                        head,
                        "module"
                            | "register"
                            | "invoke"
                            | "get"
                            | "assert_return"
                            | "assert_return_canonical_nan"
                            | "assert_return_arithmetic_nan"
                            | "assert_trap"
                            | "assert_exhaustion"
                            | "assert_malformed"
                            | "assert_invalid"
                            | "assert_unlinkable"
                    )
                })
                .unwrap_or(false)
        };

        let mut summary = ScriptSummary::default();
        if !document.is_empty() && !document.iter().any(is_command) {
            let mut diagnostics = Diagnostics::new();
            let file = assemble_fields(&document, &mut diagnostics)
                .ok_or_else(|| diagnostics.to_error())?;
            self.instantiate(&file, None)?;
            summary.commands += 1;
            return Ok(summary);
        }

        for command in &document {
            self.run_command(command, &mut summary)?;
        }
        Ok(summary)
    }

    fn run_command(
        &mut self,
        command: &SExpr,
        summary: &mut ScriptSummary,
    ) -> Result<(), Error> {
        let items = command
            .as_list()
            .ok_or_else(|| script_error(command, "expected a script command"))?;
        let head = items
            .first()
            .and_then(SExpr::as_keyword)
            .ok_or_else(|| script_error(command, "expected a command keyword"))?;
        summary.commands += 1;
        match head {
            "module" => {
                let file = self.build_module(command)?;
                let name = module_name(items);
                self.instantiate(&file, name)?;
            }
            "register" => {
                let name = string_arg(items.get(1))
                    .ok_or_else(|| script_error(command, "expected a registration name"))?;
                let module = self.module_or_last(identifier_arg(items.get(2)))?;
                self.registered.insert(name.to_string(), module);
            }
            "invoke" | "get" => {
                self.run_action(command)?;
            }
            "assert_return" => {
                summary.assertions += 1;
                let result = self.run_action(items.get(1).ok_or_else(|| {
                    script_error(command, "expected an action to assert on")
                })?)?;
                let expected: Vec<RuntimeValue> = items[2..]
                    .iter()
                    .map(parse_const)
                    .collect::<Result<_, _>>()?;
                self.check_return(command, result, &expected)?;
            }
            "assert_return_canonical_nan" | "assert_return_arithmetic_nan" => {
                summary.assertions += 1;
                let result = self.run_action(items.get(1).ok_or_else(|| {
                    script_error(command, "expected an action to assert on")
                })?)?;
                let is_nan = match result {
                    Some(RuntimeValue::F32(value)) => value.is_nan(),
                    Some(RuntimeValue::F64(value)) => value.is_nan(),
                    _ => false,
                };
                if !is_nan {
                    return Err(script_error(
                        command,
                        format!("expected a NaN result, got {:?}", result),
                    ));
                }
            }
            "assert_trap" => {
                summary.assertions += 1;
                let subject = items
                    .get(1)
                    .ok_or_else(|| script_error(command, "expected an action or module"))?;
                let expected = string_arg(items.get(2)).unwrap_or("");
                let outcome = if subject.is_list_of("module") {
                    self.build_module(subject)
                        .and_then(|file| self.instantiate(&file, None))
                        .map(|_| None)
                } else {
                    self.run_action(subject)
                };
                match outcome {
                    Ok(result) => {
                        return Err(script_error(
                            command,
                            format!("expected a trap, got {:?}", result),
                        ))
                    }
                    Err(error) => self.check_trap_message(command, &error, expected)?,
                }
            }
            "assert_exhaustion" => {
                summary.assertions += 1;
                let subject = items
                    .get(1)
                    .ok_or_else(|| script_error(command, "expected an action"))?;
                match self.run_action(subject) {
                    Ok(result) => {
                        return Err(script_error(
                            command,
                            format!("expected exhaustion, got {:?}", result),
                        ))
                    }
                    Err(error) => {
                        self.check_trap_message(command, &error, "call stack exhausted")?
                    }
                }
            }
            "assert_malformed" | "assert_invalid" | "assert_unlinkable" => {
                summary.assertions += 1;
                let subject = items
                    .get(1)
                    .ok_or_else(|| script_error(command, "expected a module"))?;
                let outcome = self
                    .build_module(subject)
                    .and_then(|file| self.instantiate(&file, None));
                match outcome {
                    Ok(_) => {
                        return Err(script_error(
                            command,
                            format!("{} expected the module to be rejected", head),
                        ))
                    }
                    Err(error) => debug!("{} at {}: {}", head, command.span(), error),
                }
            }
            other => {
                return Err(script_error(
                    command,
                    format!("unknown script command `{}`", other),
                ))
            }
        }
        Ok(())
    }

    /// Builds a module from any of its script forms: text fields,
    /// `(module binary "…")` or `(module quote "…")`.
    fn build_module(&mut self, command: &SExpr) -> Result<WasmFile, Error> {
        let items = command
            .as_list_of("module")
            .ok_or_else(|| script_error(command, "expected a module"))?;
        let mut pos = 0;
        if identifier_arg(items.first()).is_some() {
            pos += 1;
        }
        match items.get(pos).and_then(SExpr::as_keyword) {
            Some("binary") => {
                let bytes = collect_strings(&items[pos + 1..])
                    .ok_or_else(|| script_error(command, "expected string literals"))?;
                WasmFile::from_buffer(&bytes)
            }
            Some("quote") => {
                let bytes = collect_strings(&items[pos + 1..])
                    .ok_or_else(|| script_error(command, "expected string literals"))?;
                let source = String::from_utf8(bytes).map_err(|_| {
                    script_error(command, "quoted module is not valid UTF-8")
                })?;
                crate::text::assemble_str(&source)
            }
            _ => {
                let mut diagnostics = Diagnostics::new();
                assemble_module(command, &mut diagnostics)
                    .ok_or_else(|| diagnostics.to_error())
            }
        }
    }

    fn instantiate(&mut self, file: &WasmFile, name: Option<String>) -> Result<(), Error> {
        let not_started = {
            let resolver = ScriptResolver {
                spec_module: &self.spec_module,
                registered: &self.registered,
            };
            ModuleInstance::new(file, &resolver)?
        };
        let instance = not_started
            .run_start(&mut self.spec_module)
            .map_err(Error::Trap)?;
        if let Some(name) = name {
            self.instances.insert(name, instance.clone());
        }
        self.last_module = Some(instance);
        Ok(())
    }

    fn module_or_last(&self, name: Option<&str>) -> Result<ModuleRef, Error> {
        match name {
            Some(name) => self.instances.get(name).cloned().ok_or_else(|| {
                Error::Instantiation(format!("module ${} not defined in this script", name))
            }),
            None => self
                .last_module
                .clone()
                .ok_or_else(|| Error::Instantiation("no module defined yet".into())),
        }
    }

    /// Runs an `(invoke …)` or `(get …)` action.
    fn run_action(&mut self, action: &SExpr) -> Result<Option<RuntimeValue>, Error> {
        if let Some(items) = action.as_list_of("invoke") {
            let mut pos = 0;
            let module = identifier_arg(items.first());
            if module.is_some() {
                pos += 1;
            }
            let module = self.module_or_last(module)?;
            let field = string_arg(items.get(pos))
                .ok_or_else(|| script_error(action, "expected a function name"))?
                .to_string();
            pos += 1;
            let args: Vec<RuntimeValue> = items[pos..]
                .iter()
                .map(parse_const)
                .collect::<Result<_, _>>()?;
            return module.invoke_export(&field, &args, &mut self.spec_module);
        }
        if let Some(items) = action.as_list_of("get") {
            let mut pos = 0;
            let module = identifier_arg(items.first());
            if module.is_some() {
                pos += 1;
            }
            let module = self.module_or_last(module)?;
            let field = string_arg(items.get(pos))
                .ok_or_else(|| script_error(action, "expected a global name"))?;
            let global = module
                .export_by_name(field)
                .ok_or_else(|| {
                    Error::Global(format!("expected to have export with name {}", field))
                })?
                .as_global()
                .cloned()
                .ok_or_else(|| {
                    Error::Global(format!("expected export {} to be a global", field))
                })?;
            return Ok(Some(global.get()));
        }
        Err(script_error(action, "expected (invoke …) or (get …)"))
    }

    fn check_return(
        &self,
        command: &SExpr,
        actual: Option<RuntimeValue>,
        expected: &[RuntimeValue],
    ) -> Result<(), Error> {
        let actual: Vec<RuntimeValue> = actual.into_iter().collect();
        if actual.len() != expected.len() {
            return Err(script_error(
                command,
                format!("expected {:?}, got {:?}", expected, actual),
            ));
        }
        for (actual, expected) in actual.iter().zip(expected) {
            let matches = match (actual, expected) {
                // NaN payloads may be quietened by the engine; NaN-ness
                // is what the assertion checks.
                (RuntimeValue::F32(a), RuntimeValue::F32(e)) if e.is_nan() => a.is_nan(),
                (RuntimeValue::F64(a), RuntimeValue::F64(e)) if e.is_nan() => a.is_nan(),
                (RuntimeValue::F32(a), RuntimeValue::F32(e)) => a.to_bits() == e.to_bits(),
                (RuntimeValue::F64(a), RuntimeValue::F64(e)) => a.to_bits() == e.to_bits(),
                (a, e) => a == e,
            };
            if !matches {
                return Err(script_error(
                    command,
                    format!("expected {:?}, got {:?}", expected, actual),
                ));
            }
        }
        Ok(())
    }

    fn check_trap_message(
        &self,
        command: &SExpr,
        error: &Error,
        expected: &str,
    ) -> Result<(), Error> {
        let message = match error {
            Error::Trap(trap) => trap.to_string(),
            other => other.to_string(),
        };
        if !expected.is_empty() && !message.contains(expected) {
            return Err(script_error(
                command,
                format!("expected trap `{}`, got `{}`", expected, message),
            ));
        }
        Ok(())
    }
}

/// Runs a script from source with a fresh runner.
pub fn run_script(source: &str) -> Result<ScriptSummary, Error> {
    ScriptRunner::new().run_script(source)
}

fn module_name(items: &[SExpr]) -> Option<String> {
    identifier_arg(items.get(1)).map(str::to_string)
}

fn identifier_arg(item: Option<&SExpr>) -> Option<&str> {
    match item?.as_token()? {
        Token::Identifier(name) => Some(name),
        _ => None,
    }
}

fn string_arg(item: Option<&SExpr>) -> Option<&str> {
    match item?.as_token()? {
        Token::String(bytes) => std::str::from_utf8(bytes).ok(),
        _ => None,
    }
}

fn collect_strings(items: &[SExpr]) -> Option<Vec<u8>> {
    let mut bytes = Vec::new();
    for item in items {
        match item.as_token()? {
            Token::String(chunk) => bytes.extend_from_slice(chunk),
            _ => return None,
        }
    }
    Some(bytes)
}

/// Parses a `(t.const literal)` argument or expectation.
fn parse_const(expr: &SExpr) -> Result<RuntimeValue, Error> {
    let items = expr
        .as_list()
        .ok_or_else(|| script_error(expr, "expected a constant"))?;
    let head = items
        .first()
        .and_then(SExpr::as_keyword)
        .ok_or_else(|| script_error(expr, "expected a constant keyword"))?;
    let token = items
        .get(1)
        .and_then(SExpr::as_token)
        .ok_or_else(|| script_error(expr, "expected a literal"))?;
    match head {
        "i32.const" => {
            let value = match token {
                Token::SignedInteger(value) => value
                    .to_i64()
                    .filter(|v| (i64::from(i32::MIN)..=i64::from(u32::MAX)).contains(v))
                    .map(|v| v as u32 as i32),
                Token::UnsignedInteger(value) => value.to_u32().map(|v| v as i32),
                _ => None,
            };
            value
                .map(RuntimeValue::I32)
                .ok_or_else(|| script_error(expr, "i32 constant out of range"))
        }
        "i64.const" => {
            let value = match token {
                Token::SignedInteger(value) => {
                    value.to_i64().or_else(|| value.to_u64().map(|v| v as i64))
                }
                Token::UnsignedInteger(value) => value.to_u64().map(|v| v as i64),
                _ => None,
            };
            value
                .map(RuntimeValue::I64)
                .ok_or_else(|| script_error(expr, "i64 constant out of range"))
        }
        "f32.const" => const_float(expr, token)?
            .to_f32_bits()
            .map(RuntimeValue::decode_f32)
            .ok_or_else(|| script_error(expr, "f32 constant out of range")),
        "f64.const" => const_float(expr, token)?
            .to_f64_bits()
            .map(RuntimeValue::decode_f64)
            .ok_or_else(|| script_error(expr, "f64 constant out of range")),
        other => Err(script_error(
            expr,
            format!("unknown constant form `{}`", other),
        )),
    }
}

fn const_float(expr: &SExpr, token: &Token) -> Result<FloatLiteral, Error> {
    match token {
        Token::Float(literal) => Ok(literal.clone()),
        Token::SignedInteger(value) => Ok(FloatLiteral::new(
            value.sign() == num_bigint::Sign::Minus,
            FloatLiteralKind::Number {
                significand: value.magnitude().clone(),
                base: 10,
                exponent: num_bigint::BigInt::from(0),
            },
        )),
        Token::UnsignedInteger(value) => Ok(FloatLiteral::new(
            false,
            FloatLiteralKind::Number {
                significand: value.clone(),
                base: 10,
                exponent: num_bigint::BigInt::from(0),
            },
        )),
        _ => Err(script_error(expr, "expected a float literal")),
    }
}

#[cfg(test)]
mod tests {
    use super::run_script;

    #[test]
    fn module_invoke_and_assert() {
        let summary = run_script(
            r#"
            (module
                (func (export "add") (param i32 i32) (result i32)
                    get_local 0
                    get_local 1
                    i32.add))
            (assert_return (invoke "add" (i32.const 2) (i32.const 3)) (i32.const 5))
            (assert_return (invoke "add" (i32.const -1) (i32.const 1)) (i32.const 0))
            "#,
        )
        .unwrap();
        assert_eq!(summary.assertions, 2);
    }

    #[test]
    fn assert_trap_checks_messages() {
        run_script(
            r#"
            (module
                (func (export "div") (param i32 i32) (result i32)
                    get_local 0
                    get_local 1
                    i32.div_s))
            (assert_trap (invoke "div" (i32.const 1) (i32.const 0)) "integer divide by zero")
            (assert_trap (invoke "div" (i32.const -2147483648) (i32.const -1)) "integer overflow")
            "#,
        )
        .unwrap();
    }

    #[test]
    fn register_makes_exports_importable() {
        run_script(
            r#"
            (module $lib
                (func (export "answer") (result i32) i32.const 42))
            (register "lib" $lib)
            (module
                (import "lib" "answer" (func $answer (result i32)))
                (func (export "ask") (result i32) call $answer))
            (assert_return (invoke "ask") (i32.const 42))
            "#,
        )
        .unwrap();
    }

    #[test]
    fn assert_invalid_and_malformed() {
        run_script(
            r#"
            (assert_invalid
                (module (func (result i32) i64.const 0))
                "type mismatch")
            (assert_malformed
                (module quote "(module (func (oops)))")
                "unknown")
            "#,
        )
        .unwrap();
    }

    #[test]
    fn assert_exhaustion_sees_stack_overflow() {
        run_script(
            r#"
            (module
                (func $loop (export "loop") (result i32)
                    call $loop))
            (assert_exhaustion (invoke "loop") "call stack exhausted")
            "#,
        )
        .unwrap();
    }

    #[test]
    fn binary_modules_load() {
        run_script(
            r#"
            (module binary "\00asm\01\00\00\00")
            "#,
        )
        .unwrap();
    }

    #[test]
    fn get_reads_exported_globals() {
        run_script(
            r#"
            (module
                (global (export "g") i32 (i32.const 7)))
            (assert_return (get "g") (i32.const 7))
            "#,
        )
        .unwrap();
    }
}
