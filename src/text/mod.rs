//! The WebAssembly text format: tokenizer, S-expressions and the
//! assembler that lowers them to the binary module model.

mod assembler;
mod float;
mod lexer;
mod sexpr;

pub use self::assembler::{
    assemble_fields, assemble_module, Diagnostic, Diagnostics, Severity,
};
pub use self::float::{FloatLiteral, FloatLiteralKind};
pub use self::lexer::{Lexer, LocatedToken, Span, Token};
pub use self::sexpr::{parse_document, SExpr};

use crate::elements::WasmFile;
use crate::Error;

/// Assembles a complete `.wat` source text into a module.
///
/// Accepts either a single `(module …)` form or a bare field list (the
/// "inline module" shorthand).
///
/// # Errors
///
/// Returns `Err` carrying every diagnostic the assembler emitted.
pub fn assemble_str(source: &str) -> Result<WasmFile, Error> {
    let document = parse_document(source)?;
    let mut diagnostics = Diagnostics::new();
    let file = match document.as_slice() {
        [module] if module.is_list_of("module") => assemble_module(module, &mut diagnostics),
        fields => assemble_fields(fields, &mut diagnostics),
    };
    file.ok_or_else(|| diagnostics.to_error())
}
