//! The instruction model: one variant per MVP operator, with binary
//! encoding/decoding and the textual mnemonic for each.
//!
//! Block-structured instructions own their child instructions; `end` and
//! `else` markers exist only in the binary format and are consumed by the
//! decoder.

use crate::io::{BinaryReader, BinaryWriter};
use crate::types::BlockType;
use crate::Error;
use std::fmt;
use std::io::{Read, Write};

/// Raw opcode values of the MVP instruction set.
pub mod opcodes {
    #![allow(missing_docs)]

    pub const UNREACHABLE: u8 = 0x00;
    pub const NOP: u8 = 0x01;
    pub const BLOCK: u8 = 0x02;
    pub const LOOP: u8 = 0x03;
    pub const IF: u8 = 0x04;
    pub const ELSE: u8 = 0x05;
    pub const END: u8 = 0x0b;
    pub const BR: u8 = 0x0c;
    pub const BR_IF: u8 = 0x0d;
    pub const BR_TABLE: u8 = 0x0e;
    pub const RETURN: u8 = 0x0f;
    pub const CALL: u8 = 0x10;
    pub const CALL_INDIRECT: u8 = 0x11;
    pub const DROP: u8 = 0x1a;
    pub const SELECT: u8 = 0x1b;
    pub const GET_LOCAL: u8 = 0x20;
    pub const SET_LOCAL: u8 = 0x21;
    pub const TEE_LOCAL: u8 = 0x22;
    pub const GET_GLOBAL: u8 = 0x23;
    pub const SET_GLOBAL: u8 = 0x24;
    pub const I32_LOAD: u8 = 0x28;
    pub const I64_LOAD: u8 = 0x29;
    pub const F32_LOAD: u8 = 0x2a;
    pub const F64_LOAD: u8 = 0x2b;
    pub const I32_LOAD8_S: u8 = 0x2c;
    pub const I32_LOAD8_U: u8 = 0x2d;
    pub const I32_LOAD16_S: u8 = 0x2e;
    pub const I32_LOAD16_U: u8 = 0x2f;
    pub const I64_LOAD8_S: u8 = 0x30;
    pub const I64_LOAD8_U: u8 = 0x31;
    pub const I64_LOAD16_S: u8 = 0x32;
    pub const I64_LOAD16_U: u8 = 0x33;
    pub const I64_LOAD32_S: u8 = 0x34;
    pub const I64_LOAD32_U: u8 = 0x35;
    pub const I32_STORE: u8 = 0x36;
    pub const I64_STORE: u8 = 0x37;
    pub const F32_STORE: u8 = 0x38;
    pub const F64_STORE: u8 = 0x39;
    pub const I32_STORE8: u8 = 0x3a;
    pub const I32_STORE16: u8 = 0x3b;
    pub const I64_STORE8: u8 = 0x3c;
    pub const I64_STORE16: u8 = 0x3d;
    pub const I64_STORE32: u8 = 0x3e;
    pub const CURRENT_MEMORY: u8 = 0x3f;
    pub const GROW_MEMORY: u8 = 0x40;
    pub const I32_CONST: u8 = 0x41;
    pub const I64_CONST: u8 = 0x42;
    pub const F32_CONST: u8 = 0x43;
    pub const F64_CONST: u8 = 0x44;
    pub const I32_EQZ: u8 = 0x45;
    pub const I32_EQ: u8 = 0x46;
    pub const I32_NE: u8 = 0x47;
    pub const I32_LT_S: u8 = 0x48;
    pub const I32_LT_U: u8 = 0x49;
    pub const I32_GT_S: u8 = 0x4a;
    pub const I32_GT_U: u8 = 0x4b;
    pub const I32_LE_S: u8 = 0x4c;
    pub const I32_LE_U: u8 = 0x4d;
    pub const I32_GE_S: u8 = 0x4e;
    pub const I32_GE_U: u8 = 0x4f;
    pub const I64_EQZ: u8 = 0x50;
    pub const I64_EQ: u8 = 0x51;
    pub const I64_NE: u8 = 0x52;
    pub const I64_LT_S: u8 = 0x53;
    pub const I64_LT_U: u8 = 0x54;
    pub const I64_GT_S: u8 = 0x55;
    pub const I64_GT_U: u8 = 0x56;
    pub const I64_LE_S: u8 = 0x57;
    pub const I64_LE_U: u8 = 0x58;
    pub const I64_GE_S: u8 = 0x59;
    pub const I64_GE_U: u8 = 0x5a;
    pub const F32_EQ: u8 = 0x5b;
    pub const F32_NE: u8 = 0x5c;
    pub const F32_LT: u8 = 0x5d;
    pub const F32_GT: u8 = 0x5e;
    pub const F32_LE: u8 = 0x5f;
    pub const F32_GE: u8 = 0x60;
    pub const F64_EQ: u8 = 0x61;
    pub const F64_NE: u8 = 0x62;
    pub const F64_LT: u8 = 0x63;
    pub const F64_GT: u8 = 0x64;
    pub const F64_LE: u8 = 0x65;
    pub const F64_GE: u8 = 0x66;
    pub const I32_CLZ: u8 = 0x67;
    pub const I32_CTZ: u8 = 0x68;
    pub const I32_POPCNT: u8 = 0x69;
    pub const I32_ADD: u8 = 0x6a;
    pub const I32_SUB: u8 = 0x6b;
    pub const I32_MUL: u8 = 0x6c;
    pub const I32_DIV_S: u8 = 0x6d;
    pub const I32_DIV_U: u8 = 0x6e;
    pub const I32_REM_S: u8 = 0x6f;
    pub const I32_REM_U: u8 = 0x70;
    pub const I32_AND: u8 = 0x71;
    pub const I32_OR: u8 = 0x72;
    pub const I32_XOR: u8 = 0x73;
    pub const I32_SHL: u8 = 0x74;
    pub const I32_SHR_S: u8 = 0x75;
    pub const I32_SHR_U: u8 = 0x76;
    pub const I32_ROTL: u8 = 0x77;
    pub const I32_ROTR: u8 = 0x78;
    pub const I64_CLZ: u8 = 0x79;
    pub const I64_CTZ: u8 = 0x7a;
    pub const I64_POPCNT: u8 = 0x7b;
    pub const I64_ADD: u8 = 0x7c;
    pub const I64_SUB: u8 = 0x7d;
    pub const I64_MUL: u8 = 0x7e;
    pub const I64_DIV_S: u8 = 0x7f;
    pub const I64_DIV_U: u8 = 0x80;
    pub const I64_REM_S: u8 = 0x81;
    pub const I64_REM_U: u8 = 0x82;
    pub const I64_AND: u8 = 0x83;
    pub const I64_OR: u8 = 0x84;
    pub const I64_XOR: u8 = 0x85;
    pub const I64_SHL: u8 = 0x86;
    pub const I64_SHR_S: u8 = 0x87;
    pub const I64_SHR_U: u8 = 0x88;
    pub const I64_ROTL: u8 = 0x89;
    pub const I64_ROTR: u8 = 0x8a;
    pub const F32_ABS: u8 = 0x8b;
    pub const F32_NEG: u8 = 0x8c;
    pub const F32_CEIL: u8 = 0x8d;
    pub const F32_FLOOR: u8 = 0x8e;
    pub const F32_TRUNC: u8 = 0x8f;
    pub const F32_NEAREST: u8 = 0x90;
    pub const F32_SQRT: u8 = 0x91;
    pub const F32_ADD: u8 = 0x92;
    pub const F32_SUB: u8 = 0x93;
    pub const F32_MUL: u8 = 0x94;
    pub const F32_DIV: u8 = 0x95;
    pub const F32_MIN: u8 = 0x96;
    pub const F32_MAX: u8 = 0x97;
    pub const F32_COPYSIGN: u8 = 0x98;
    pub const F64_ABS: u8 = 0x99;
    pub const F64_NEG: u8 = 0x9a;
    pub const F64_CEIL: u8 = 0x9b;
    pub const F64_FLOOR: u8 = 0x9c;
    pub const F64_TRUNC: u8 = 0x9d;
    pub const F64_NEAREST: u8 = 0x9e;
    pub const F64_SQRT: u8 = 0x9f;
    pub const F64_ADD: u8 = 0xa0;
    pub const F64_SUB: u8 = 0xa1;
    pub const F64_MUL: u8 = 0xa2;
    pub const F64_DIV: u8 = 0xa3;
    pub const F64_MIN: u8 = 0xa4;
    pub const F64_MAX: u8 = 0xa5;
    pub const F64_COPYSIGN: u8 = 0xa6;
    pub const I32_WRAP_I64: u8 = 0xa7;
    pub const I32_TRUNC_S_F32: u8 = 0xa8;
    pub const I32_TRUNC_U_F32: u8 = 0xa9;
    pub const I32_TRUNC_S_F64: u8 = 0xaa;
    pub const I32_TRUNC_U_F64: u8 = 0xab;
    pub const I64_EXTEND_S_I32: u8 = 0xac;
    pub const I64_EXTEND_U_I32: u8 = 0xad;
    pub const I64_TRUNC_S_F32: u8 = 0xae;
    pub const I64_TRUNC_U_F32: u8 = 0xaf;
    pub const I64_TRUNC_S_F64: u8 = 0xb0;
    pub const I64_TRUNC_U_F64: u8 = 0xb1;
    pub const F32_CONVERT_S_I32: u8 = 0xb2;
    pub const F32_CONVERT_U_I32: u8 = 0xb3;
    pub const F32_CONVERT_S_I64: u8 = 0xb4;
    pub const F32_CONVERT_U_I64: u8 = 0xb5;
    pub const F32_DEMOTE_F64: u8 = 0xb6;
    pub const F64_CONVERT_S_I32: u8 = 0xb7;
    pub const F64_CONVERT_U_I32: u8 = 0xb8;
    pub const F64_CONVERT_S_I64: u8 = 0xb9;
    pub const F64_CONVERT_U_I64: u8 = 0xba;
    pub const F64_PROMOTE_F32: u8 = 0xbb;
    pub const I32_REINTERPRET_F32: u8 = 0xbc;
    pub const I64_REINTERPRET_F64: u8 = 0xbd;
    pub const F32_REINTERPRET_I32: u8 = 0xbe;
    pub const F64_REINTERPRET_I64: u8 = 0xbf;
}

use opcodes::*;

/// Alignment and offset immediates of a memory access instruction.
///
/// `align` is the base-2 logarithm of the alignment hint; `offset` is
/// added to the popped base address.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MemArg {
    /// Base-2 logarithm of the alignment hint.
    pub align: u32,
    /// Constant offset added to the popped address.
    pub offset: u32,
}

impl MemArg {
    /// Zero offset with the given alignment exponent.
    pub fn aligned(align: u32) -> MemArg {
        MemArg { align, offset: 0 }
    }

    fn read<R: Read>(reader: &mut BinaryReader<R>) -> Result<MemArg, Error> {
        let align = reader.read_var_u32()?;
        let offset = reader.read_var_u32()?;
        Ok(MemArg { align, offset })
    }

    fn write<W: Write>(&self, writer: &mut BinaryWriter<W>) -> Result<(), Error> {
        writer.write_var_u32(self.align)?;
        writer.write_var_u32(self.offset)
    }
}

/// Branch targets of a `br_table` instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrTableData {
    /// Relative label depths selected by the popped index.
    pub table: Box<[u32]>,
    /// Relative label depth taken when the index is out of range.
    pub default: u32,
}

/// A single MVP instruction.
///
/// Immediates are stored exactly as decoded; float constants keep their
/// bit patterns so that NaN payloads survive a round trip.
#[derive(Clone, Debug, PartialEq)]
#[allow(missing_docs)]
pub enum Instruction {
    Unreachable,
    Nop,
    Block(BlockType, Vec<Instruction>),
    Loop(BlockType, Vec<Instruction>),
    If(BlockType, Vec<Instruction>, Vec<Instruction>),
    Br(u32),
    BrIf(u32),
    BrTable(Box<BrTableData>),
    Return,
    Call(u32),
    /// Type index plus the reserved table-index byte, preserved for
    /// byte-exact round trips.
    CallIndirect(u32, u8),
    Drop,
    Select,
    GetLocal(u32),
    SetLocal(u32),
    TeeLocal(u32),
    GetGlobal(u32),
    SetGlobal(u32),
    I32Load(MemArg),
    I64Load(MemArg),
    F32Load(MemArg),
    F64Load(MemArg),
    I32Load8S(MemArg),
    I32Load8U(MemArg),
    I32Load16S(MemArg),
    I32Load16U(MemArg),
    I64Load8S(MemArg),
    I64Load8U(MemArg),
    I64Load16S(MemArg),
    I64Load16U(MemArg),
    I64Load32S(MemArg),
    I64Load32U(MemArg),
    I32Store(MemArg),
    I64Store(MemArg),
    F32Store(MemArg),
    F64Store(MemArg),
    I32Store8(MemArg),
    I32Store16(MemArg),
    I64Store8(MemArg),
    I64Store16(MemArg),
    I64Store32(MemArg),
    /// Reserved memory-index byte, preserved for round trips.
    CurrentMemory(u8),
    /// Reserved memory-index byte, preserved for round trips.
    GrowMemory(u8),
    I32Const(i32),
    I64Const(i64),
    F32Const(u32),
    F64Const(u64),
    I32Eqz,
    I32Eq,
    I32Ne,
    I32LtS,
    I32LtU,
    I32GtS,
    I32GtU,
    I32LeS,
    I32LeU,
    I32GeS,
    I32GeU,
    I64Eqz,
    I64Eq,
    I64Ne,
    I64LtS,
    I64LtU,
    I64GtS,
    I64GtU,
    I64LeS,
    I64LeU,
    I64GeS,
    I64GeU,
    F32Eq,
    F32Ne,
    F32Lt,
    F32Gt,
    F32Le,
    F32Ge,
    F64Eq,
    F64Ne,
    F64Lt,
    F64Gt,
    F64Le,
    F64Ge,
    I32Clz,
    I32Ctz,
    I32Popcnt,
    I32Add,
    I32Sub,
    I32Mul,
    I32DivS,
    I32DivU,
    I32RemS,
    I32RemU,
    I32And,
    I32Or,
    I32Xor,
    I32Shl,
    I32ShrS,
    I32ShrU,
    I32Rotl,
    I32Rotr,
    I64Clz,
    I64Ctz,
    I64Popcnt,
    I64Add,
    I64Sub,
    I64Mul,
    I64DivS,
    I64DivU,
    I64RemS,
    I64RemU,
    I64And,
    I64Or,
    I64Xor,
    I64Shl,
    I64ShrS,
    I64ShrU,
    I64Rotl,
    I64Rotr,
    F32Abs,
    F32Neg,
    F32Ceil,
    F32Floor,
    F32Trunc,
    F32Nearest,
    F32Sqrt,
    F32Add,
    F32Sub,
    F32Mul,
    F32Div,
    F32Min,
    F32Max,
    F32Copysign,
    F64Abs,
    F64Neg,
    F64Ceil,
    F64Floor,
    F64Trunc,
    F64Nearest,
    F64Sqrt,
    F64Add,
    F64Sub,
    F64Mul,
    F64Div,
    F64Min,
    F64Max,
    F64Copysign,
    I32WrapI64,
    I32TruncSF32,
    I32TruncUF32,
    I32TruncSF64,
    I32TruncUF64,
    I64ExtendSI32,
    I64ExtendUI32,
    I64TruncSF32,
    I64TruncUF32,
    I64TruncSF64,
    I64TruncUF64,
    F32ConvertSI32,
    F32ConvertUI32,
    F32ConvertSI64,
    F32ConvertUI64,
    F32DemoteF64,
    F64ConvertSI32,
    F64ConvertUI32,
    F64ConvertSI64,
    F64ConvertUI64,
    F64PromoteF32,
    I32ReinterpretF32,
    I64ReinterpretF64,
    F32ReinterpretI32,
    F64ReinterpretI64,
}

macro_rules! nullary_registry {
    ($( $opcode:ident => $variant:ident, $mnemonic:expr; )*) => {
        fn nullary_from_opcode(opcode: u8) -> Option<Instruction> {
            match opcode {
                $( $opcode => Some(Instruction::$variant), )*
                _ => None,
            }
        }

        fn nullary_opcode(instruction: &Instruction) -> Option<u8> {
            match instruction {
                $( Instruction::$variant => Some($opcode), )*
                _ => None,
            }
        }

        fn nullary_mnemonic(instruction: &Instruction) -> Option<&'static str> {
            match instruction {
                $( Instruction::$variant => Some($mnemonic), )*
                _ => None,
            }
        }

        /// Looks up a nullary operator by its canonical mnemonic.
        pub fn nullary_from_name(name: &str) -> Option<Instruction> {
            match name {
                $( $mnemonic => Some(Instruction::$variant), )*
                _ => None,
            }
        }
    };
}

nullary_registry! {
    UNREACHABLE => Unreachable, "unreachable";
    NOP => Nop, "nop";
    RETURN => Return, "return";
    DROP => Drop, "drop";
    SELECT => Select, "select";
    I32_EQZ => I32Eqz, "i32.eqz";
    I32_EQ => I32Eq, "i32.eq";
    I32_NE => I32Ne, "i32.ne";
    I32_LT_S => I32LtS, "i32.lt_s";
    I32_LT_U => I32LtU, "i32.lt_u";
    I32_GT_S => I32GtS, "i32.gt_s";
    I32_GT_U => I32GtU, "i32.gt_u";
    I32_LE_S => I32LeS, "i32.le_s";
    I32_LE_U => I32LeU, "i32.le_u";
    I32_GE_S => I32GeS, "i32.ge_s";
    I32_GE_U => I32GeU, "i32.ge_u";
    I64_EQZ => I64Eqz, "i64.eqz";
    I64_EQ => I64Eq, "i64.eq";
    I64_NE => I64Ne, "i64.ne";
    I64_LT_S => I64LtS, "i64.lt_s";
    I64_LT_U => I64LtU, "i64.lt_u";
    I64_GT_S => I64GtS, "i64.gt_s";
    I64_GT_U => I64GtU, "i64.gt_u";
    I64_LE_S => I64LeS, "i64.le_s";
    I64_LE_U => I64LeU, "i64.le_u";
    I64_GE_S => I64GeS, "i64.ge_s";
    I64_GE_U => I64GeU, "i64.ge_u";
    F32_EQ => F32Eq, "f32.eq";
    F32_NE => F32Ne, "f32.ne";
    F32_LT => F32Lt, "f32.lt";
    F32_GT => F32Gt, "f32.gt";
    F32_LE => F32Le, "f32.le";
    F32_GE => F32Ge, "f32.ge";
    F64_EQ => F64Eq, "f64.eq";
    F64_NE => F64Ne, "f64.ne";
    F64_LT => F64Lt, "f64.lt";
    F64_GT => F64Gt, "f64.gt";
    F64_LE => F64Le, "f64.le";
    F64_GE => F64Ge, "f64.ge";
    I32_CLZ => I32Clz, "i32.clz";
    I32_CTZ => I32Ctz, "i32.ctz";
    I32_POPCNT => I32Popcnt, "i32.popcnt";
    I32_ADD => I32Add, "i32.add";
    I32_SUB => I32Sub, "i32.sub";
    I32_MUL => I32Mul, "i32.mul";
    I32_DIV_S => I32DivS, "i32.div_s";
    I32_DIV_U => I32DivU, "i32.div_u";
    I32_REM_S => I32RemS, "i32.rem_s";
    I32_REM_U => I32RemU, "i32.rem_u";
    I32_AND => I32And, "i32.and";
    I32_OR => I32Or, "i32.or";
    I32_XOR => I32Xor, "i32.xor";
    I32_SHL => I32Shl, "i32.shl";
    I32_SHR_S => I32ShrS, "i32.shr_s";
    I32_SHR_U => I32ShrU, "i32.shr_u";
    I32_ROTL => I32Rotl, "i32.rotl";
    I32_ROTR => I32Rotr, "i32.rotr";
    I64_CLZ => I64Clz, "i64.clz";
    I64_CTZ => I64Ctz, "i64.ctz";
    I64_POPCNT => I64Popcnt, "i64.popcnt";
    I64_ADD => I64Add, "i64.add";
    I64_SUB => I64Sub, "i64.sub";
    I64_MUL => I64Mul, "i64.mul";
    I64_DIV_S => I64DivS, "i64.div_s";
    I64_DIV_U => I64DivU, "i64.div_u";
    I64_REM_S => I64RemS, "i64.rem_s";
    I64_REM_U => I64RemU, "i64.rem_u";
    I64_AND => I64And, "i64.and";
    I64_OR => I64Or, "i64.or";
    I64_XOR => I64Xor, "i64.xor";
    I64_SHL => I64Shl, "i64.shl";
    I64_SHR_S => I64ShrS, "i64.shr_s";
    I64_SHR_U => I64ShrU, "i64.shr_u";
    I64_ROTL => I64Rotl, "i64.rotl";
    I64_ROTR => I64Rotr, "i64.rotr";
    F32_ABS => F32Abs, "f32.abs";
    F32_NEG => F32Neg, "f32.neg";
    F32_CEIL => F32Ceil, "f32.ceil";
    F32_FLOOR => F32Floor, "f32.floor";
    F32_TRUNC => F32Trunc, "f32.trunc";
    F32_NEAREST => F32Nearest, "f32.nearest";
    F32_SQRT => F32Sqrt, "f32.sqrt";
    F32_ADD => F32Add, "f32.add";
    F32_SUB => F32Sub, "f32.sub";
    F32_MUL => F32Mul, "f32.mul";
    F32_DIV => F32Div, "f32.div";
    F32_MIN => F32Min, "f32.min";
    F32_MAX => F32Max, "f32.max";
    F32_COPYSIGN => F32Copysign, "f32.copysign";
    F64_ABS => F64Abs, "f64.abs";
    F64_NEG => F64Neg, "f64.neg";
    F64_CEIL => F64Ceil, "f64.ceil";
    F64_FLOOR => F64Floor, "f64.floor";
    F64_TRUNC => F64Trunc, "f64.trunc";
    F64_NEAREST => F64Nearest, "f64.nearest";
    F64_SQRT => F64Sqrt, "f64.sqrt";
    F64_ADD => F64Add, "f64.add";
    F64_SUB => F64Sub, "f64.sub";
    F64_MUL => F64Mul, "f64.mul";
    F64_DIV => F64Div, "f64.div";
    F64_MIN => F64Min, "f64.min";
    F64_MAX => F64Max, "f64.max";
    F64_COPYSIGN => F64Copysign, "f64.copysign";
    I32_WRAP_I64 => I32WrapI64, "i32.wrap/i64";
    I32_TRUNC_S_F32 => I32TruncSF32, "i32.trunc_s/f32";
    I32_TRUNC_U_F32 => I32TruncUF32, "i32.trunc_u/f32";
    I32_TRUNC_S_F64 => I32TruncSF64, "i32.trunc_s/f64";
    I32_TRUNC_U_F64 => I32TruncUF64, "i32.trunc_u/f64";
    I64_EXTEND_S_I32 => I64ExtendSI32, "i64.extend_s/i32";
    I64_EXTEND_U_I32 => I64ExtendUI32, "i64.extend_u/i32";
    I64_TRUNC_S_F32 => I64TruncSF32, "i64.trunc_s/f32";
    I64_TRUNC_U_F32 => I64TruncUF32, "i64.trunc_u/f32";
    I64_TRUNC_S_F64 => I64TruncSF64, "i64.trunc_s/f64";
    I64_TRUNC_U_F64 => I64TruncUF64, "i64.trunc_u/f64";
    F32_CONVERT_S_I32 => F32ConvertSI32, "f32.convert_s/i32";
    F32_CONVERT_U_I32 => F32ConvertUI32, "f32.convert_u/i32";
    F32_CONVERT_S_I64 => F32ConvertSI64, "f32.convert_s/i64";
    F32_CONVERT_U_I64 => F32ConvertUI64, "f32.convert_u/i64";
    F32_DEMOTE_F64 => F32DemoteF64, "f32.demote/f64";
    F64_CONVERT_S_I32 => F64ConvertSI32, "f64.convert_s/i32";
    F64_CONVERT_U_I32 => F64ConvertUI32, "f64.convert_u/i32";
    F64_CONVERT_S_I64 => F64ConvertSI64, "f64.convert_s/i64";
    F64_CONVERT_U_I64 => F64ConvertUI64, "f64.convert_u/i64";
    F64_PROMOTE_F32 => F64PromoteF32, "f64.promote/f32";
    I32_REINTERPRET_F32 => I32ReinterpretF32, "i32.reinterpret/f32";
    I64_REINTERPRET_F64 => I64ReinterpretF64, "i64.reinterpret/f64";
    F32_REINTERPRET_I32 => F32ReinterpretI32, "f32.reinterpret/i32";
    F64_REINTERPRET_I64 => F64ReinterpretI64, "f64.reinterpret/i64";
}

/// What ended a structured instruction sequence in the binary stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Terminator {
    End,
    Else,
}

impl Instruction {
    /// Decodes an expression: instructions up to and including the matching
    /// `end` opcode. The terminator itself is not represented.
    pub(crate) fn read_expression<R: Read>(
        reader: &mut BinaryReader<R>,
    ) -> Result<Vec<Instruction>, Error> {
        let mut instructions = Vec::new();
        match Self::read_sequence(reader, &mut instructions, false)? {
            Terminator::End => Ok(instructions),
            Terminator::Else => Err(Error::Encoding(
                "unexpected `else` outside of an `if` block".into(),
            )),
        }
    }

    fn read_sequence<R: Read>(
        reader: &mut BinaryReader<R>,
        out: &mut Vec<Instruction>,
        allow_else: bool,
    ) -> Result<Terminator, Error> {
        loop {
            let opcode = reader.read_u8()?;
            match opcode {
                END => return Ok(Terminator::End),
                ELSE if allow_else => return Ok(Terminator::Else),
                ELSE => {
                    return Err(Error::Encoding(
                        "unexpected `else` outside of an `if` block".into(),
                    ))
                }
                _ => out.push(Self::read_one(reader, opcode)?),
            }
        }
    }

    fn read_one<R: Read>(reader: &mut BinaryReader<R>, opcode: u8) -> Result<Instruction, Error> {
        if let Some(instruction) = nullary_from_opcode(opcode) {
            return Ok(instruction);
        }
        Ok(match opcode {
            BLOCK => {
                let block_type = BlockType::read(reader)?;
                let mut body = Vec::new();
                Self::read_sequence(reader, &mut body, false)?;
                Instruction::Block(block_type, body)
            }
            LOOP => {
                let block_type = BlockType::read(reader)?;
                let mut body = Vec::new();
                Self::read_sequence(reader, &mut body, false)?;
                Instruction::Loop(block_type, body)
            }
            IF => {
                let block_type = BlockType::read(reader)?;
                let mut consequent = Vec::new();
                let mut alternate = Vec::new();
                if Self::read_sequence(reader, &mut consequent, true)? == Terminator::Else {
                    Self::read_sequence(reader, &mut alternate, false)?;
                }
                Instruction::If(block_type, consequent, alternate)
            }
            BR => Instruction::Br(reader.read_var_u32()?),
            BR_IF => Instruction::BrIf(reader.read_var_u32()?),
            BR_TABLE => {
                let count = reader.read_var_u32()? as usize;
                let mut table = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    table.push(reader.read_var_u32()?);
                }
                let default = reader.read_var_u32()?;
                Instruction::BrTable(Box::new(BrTableData {
                    table: table.into_boxed_slice(),
                    default,
                }))
            }
            CALL => Instruction::Call(reader.read_var_u32()?),
            CALL_INDIRECT => {
                let type_index = reader.read_var_u32()?;
                let reserved = reader.read_u8()?;
                Instruction::CallIndirect(type_index, reserved)
            }
            GET_LOCAL => Instruction::GetLocal(reader.read_var_u32()?),
            SET_LOCAL => Instruction::SetLocal(reader.read_var_u32()?),
            TEE_LOCAL => Instruction::TeeLocal(reader.read_var_u32()?),
            GET_GLOBAL => Instruction::GetGlobal(reader.read_var_u32()?),
            SET_GLOBAL => Instruction::SetGlobal(reader.read_var_u32()?),
            I32_LOAD => Instruction::I32Load(MemArg::read(reader)?),
            I64_LOAD => Instruction::I64Load(MemArg::read(reader)?),
            F32_LOAD => Instruction::F32Load(MemArg::read(reader)?),
            F64_LOAD => Instruction::F64Load(MemArg::read(reader)?),
            I32_LOAD8_S => Instruction::I32Load8S(MemArg::read(reader)?),
            I32_LOAD8_U => Instruction::I32Load8U(MemArg::read(reader)?),
            I32_LOAD16_S => Instruction::I32Load16S(MemArg::read(reader)?),
            I32_LOAD16_U => Instruction::I32Load16U(MemArg::read(reader)?),
            I64_LOAD8_S => Instruction::I64Load8S(MemArg::read(reader)?),
            I64_LOAD8_U => Instruction::I64Load8U(MemArg::read(reader)?),
            I64_LOAD16_S => Instruction::I64Load16S(MemArg::read(reader)?),
            I64_LOAD16_U => Instruction::I64Load16U(MemArg::read(reader)?),
            I64_LOAD32_S => Instruction::I64Load32S(MemArg::read(reader)?),
            I64_LOAD32_U => Instruction::I64Load32U(MemArg::read(reader)?),
            I32_STORE => Instruction::I32Store(MemArg::read(reader)?),
            I64_STORE => Instruction::I64Store(MemArg::read(reader)?),
            F32_STORE => Instruction::F32Store(MemArg::read(reader)?),
            F64_STORE => Instruction::F64Store(MemArg::read(reader)?),
            I32_STORE8 => Instruction::I32Store8(MemArg::read(reader)?),
            I32_STORE16 => Instruction::I32Store16(MemArg::read(reader)?),
            I64_STORE8 => Instruction::I64Store8(MemArg::read(reader)?),
            I64_STORE16 => Instruction::I64Store16(MemArg::read(reader)?),
            I64_STORE32 => Instruction::I64Store32(MemArg::read(reader)?),
            CURRENT_MEMORY => Instruction::CurrentMemory(reader.read_u8()?),
            GROW_MEMORY => Instruction::GrowMemory(reader.read_u8()?),
            I32_CONST => Instruction::I32Const(reader.read_var_i32()?),
            I64_CONST => Instruction::I64Const(reader.read_var_i64()?),
            F32_CONST => Instruction::F32Const(reader.read_f32_bits()?),
            F64_CONST => Instruction::F64Const(reader.read_f64_bits()?),
            other => {
                return Err(Error::Encoding(format!("unknown opcode {:#04x}", other)));
            }
        })
    }

    /// Encodes an expression followed by the terminating `end` opcode.
    pub(crate) fn write_expression<W: Write>(
        instructions: &[Instruction],
        writer: &mut BinaryWriter<W>,
    ) -> Result<(), Error> {
        for instruction in instructions {
            instruction.write(writer)?;
        }
        writer.write_u8(END)
    }

    /// Encodes this instruction, including nested bodies of block forms.
    pub(crate) fn write<W: Write>(&self, writer: &mut BinaryWriter<W>) -> Result<(), Error> {
        if let Some(opcode) = nullary_opcode(self) {
            return writer.write_u8(opcode);
        }
        match self {
            Instruction::Block(block_type, body) => {
                writer.write_u8(BLOCK)?;
                block_type.write(writer)?;
                Self::write_expression(body, writer)
            }
            Instruction::Loop(block_type, body) => {
                writer.write_u8(LOOP)?;
                block_type.write(writer)?;
                Self::write_expression(body, writer)
            }
            Instruction::If(block_type, consequent, alternate) => {
                writer.write_u8(IF)?;
                block_type.write(writer)?;
                for instruction in consequent {
                    instruction.write(writer)?;
                }
                if !alternate.is_empty() {
                    writer.write_u8(ELSE)?;
                    for instruction in alternate {
                        instruction.write(writer)?;
                    }
                }
                writer.write_u8(END)
            }
            Instruction::Br(depth) => {
                writer.write_u8(BR)?;
                writer.write_var_u32(*depth)
            }
            Instruction::BrIf(depth) => {
                writer.write_u8(BR_IF)?;
                writer.write_var_u32(*depth)
            }
            Instruction::BrTable(data) => {
                writer.write_u8(BR_TABLE)?;
                writer.write_var_u32(data.table.len() as u32)?;
                for depth in data.table.iter() {
                    writer.write_var_u32(*depth)?;
                }
                writer.write_var_u32(data.default)
            }
            Instruction::Call(index) => {
                writer.write_u8(CALL)?;
                writer.write_var_u32(*index)
            }
            Instruction::CallIndirect(type_index, reserved) => {
                writer.write_u8(CALL_INDIRECT)?;
                writer.write_var_u32(*type_index)?;
                writer.write_u8(*reserved)
            }
            Instruction::GetLocal(index) => {
                writer.write_u8(GET_LOCAL)?;
                writer.write_var_u32(*index)
            }
            Instruction::SetLocal(index) => {
                writer.write_u8(SET_LOCAL)?;
                writer.write_var_u32(*index)
            }
            Instruction::TeeLocal(index) => {
                writer.write_u8(TEE_LOCAL)?;
                writer.write_var_u32(*index)
            }
            Instruction::GetGlobal(index) => {
                writer.write_u8(GET_GLOBAL)?;
                writer.write_var_u32(*index)
            }
            Instruction::SetGlobal(index) => {
                writer.write_u8(SET_GLOBAL)?;
                writer.write_var_u32(*index)
            }
            Instruction::I32Load(arg) => Self::write_mem(writer, I32_LOAD, arg),
            Instruction::I64Load(arg) => Self::write_mem(writer, I64_LOAD, arg),
            Instruction::F32Load(arg) => Self::write_mem(writer, F32_LOAD, arg),
            Instruction::F64Load(arg) => Self::write_mem(writer, F64_LOAD, arg),
            Instruction::I32Load8S(arg) => Self::write_mem(writer, I32_LOAD8_S, arg),
            Instruction::I32Load8U(arg) => Self::write_mem(writer, I32_LOAD8_U, arg),
            Instruction::I32Load16S(arg) => Self::write_mem(writer, I32_LOAD16_S, arg),
            Instruction::I32Load16U(arg) => Self::write_mem(writer, I32_LOAD16_U, arg),
            Instruction::I64Load8S(arg) => Self::write_mem(writer, I64_LOAD8_S, arg),
            Instruction::I64Load8U(arg) => Self::write_mem(writer, I64_LOAD8_U, arg),
            Instruction::I64Load16S(arg) => Self::write_mem(writer, I64_LOAD16_S, arg),
            Instruction::I64Load16U(arg) => Self::write_mem(writer, I64_LOAD16_U, arg),
            Instruction::I64Load32S(arg) => Self::write_mem(writer, I64_LOAD32_S, arg),
            Instruction::I64Load32U(arg) => Self::write_mem(writer, I64_LOAD32_U, arg),
            Instruction::I32Store(arg) => Self::write_mem(writer, I32_STORE, arg),
            Instruction::I64Store(arg) => Self::write_mem(writer, I64_STORE, arg),
            Instruction::F32Store(arg) => Self::write_mem(writer, F32_STORE, arg),
            Instruction::F64Store(arg) => Self::write_mem(writer, F64_STORE, arg),
            Instruction::I32Store8(arg) => Self::write_mem(writer, I32_STORE8, arg),
            Instruction::I32Store16(arg) => Self::write_mem(writer, I32_STORE16, arg),
            Instruction::I64Store8(arg) => Self::write_mem(writer, I64_STORE8, arg),
            Instruction::I64Store16(arg) => Self::write_mem(writer, I64_STORE16, arg),
            Instruction::I64Store32(arg) => Self::write_mem(writer, I64_STORE32, arg),
            Instruction::CurrentMemory(reserved) => {
                writer.write_u8(CURRENT_MEMORY)?;
                writer.write_u8(*reserved)
            }
            Instruction::GrowMemory(reserved) => {
                writer.write_u8(GROW_MEMORY)?;
                writer.write_u8(*reserved)
            }
            Instruction::I32Const(value) => {
                writer.write_u8(I32_CONST)?;
                writer.write_var_i32(*value)
            }
            Instruction::I64Const(value) => {
                writer.write_u8(I64_CONST)?;
                writer.write_var_i64(*value)
            }
            Instruction::F32Const(bits) => {
                writer.write_u8(F32_CONST)?;
                writer.write_f32_bits(*bits)
            }
            Instruction::F64Const(bits) => {
                writer.write_u8(F64_CONST)?;
                writer.write_f64_bits(*bits)
            }
            other => Err(Error::Internal(format!(
                "instruction {:?} has no encoding",
                other
            ))),
        }
    }

    fn write_mem<W: Write>(
        writer: &mut BinaryWriter<W>,
        opcode: u8,
        arg: &MemArg,
    ) -> Result<(), Error> {
        writer.write_u8(opcode)?;
        arg.write(writer)
    }

    /// The canonical textual mnemonic of this instruction.
    pub fn mnemonic(&self) -> &'static str {
        if let Some(name) = nullary_mnemonic(self) {
            return name;
        }
        match self {
            Instruction::Block(..) => "block",
            Instruction::Loop(..) => "loop",
            Instruction::If(..) => "if",
            Instruction::Br(_) => "br",
            Instruction::BrIf(_) => "br_if",
            Instruction::BrTable(_) => "br_table",
            Instruction::Call(_) => "call",
            Instruction::CallIndirect(..) => "call_indirect",
            Instruction::GetLocal(_) => "get_local",
            Instruction::SetLocal(_) => "set_local",
            Instruction::TeeLocal(_) => "tee_local",
            Instruction::GetGlobal(_) => "get_global",
            Instruction::SetGlobal(_) => "set_global",
            Instruction::I32Load(_) => "i32.load",
            Instruction::I64Load(_) => "i64.load",
            Instruction::F32Load(_) => "f32.load",
            Instruction::F64Load(_) => "f64.load",
            Instruction::I32Load8S(_) => "i32.load8_s",
            Instruction::I32Load8U(_) => "i32.load8_u",
            Instruction::I32Load16S(_) => "i32.load16_s",
            Instruction::I32Load16U(_) => "i32.load16_u",
            Instruction::I64Load8S(_) => "i64.load8_s",
            Instruction::I64Load8U(_) => "i64.load8_u",
            Instruction::I64Load16S(_) => "i64.load16_s",
            Instruction::I64Load16U(_) => "i64.load16_u",
            Instruction::I64Load32S(_) => "i64.load32_s",
            Instruction::I64Load32U(_) => "i64.load32_u",
            Instruction::I32Store(_) => "i32.store",
            Instruction::I64Store(_) => "i64.store",
            Instruction::F32Store(_) => "f32.store",
            Instruction::F64Store(_) => "f64.store",
            Instruction::I32Store8(_) => "i32.store8",
            Instruction::I32Store16(_) => "i32.store16",
            Instruction::I64Store8(_) => "i64.store8",
            Instruction::I64Store16(_) => "i64.store16",
            Instruction::I64Store32(_) => "i64.store32",
            Instruction::CurrentMemory(_) => "current_memory",
            Instruction::GrowMemory(_) => "grow_memory",
            Instruction::I32Const(_) => "i32.const",
            Instruction::I64Const(_) => "i64.const",
            Instruction::F32Const(_) => "f32.const",
            Instruction::F64Const(_) => "f64.const",
            _ => unreachable!("nullary mnemonics are covered by the registry"),
        }
    }

    /// Whether this instruction unconditionally diverts control flow,
    /// making straight-line successors unreachable.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Instruction::Br(_)
                | Instruction::BrTable(_)
                | Instruction::Return
                | Instruction::Unreachable
        )
    }

    /// The memory-access immediates, if this is a load or store.
    pub fn mem_arg(&self) -> Option<&MemArg> {
        match self {
            Instruction::I32Load(arg)
            | Instruction::I64Load(arg)
            | Instruction::F32Load(arg)
            | Instruction::F64Load(arg)
            | Instruction::I32Load8S(arg)
            | Instruction::I32Load8U(arg)
            | Instruction::I32Load16S(arg)
            | Instruction::I32Load16U(arg)
            | Instruction::I64Load8S(arg)
            | Instruction::I64Load8U(arg)
            | Instruction::I64Load16S(arg)
            | Instruction::I64Load16U(arg)
            | Instruction::I64Load32S(arg)
            | Instruction::I64Load32U(arg)
            | Instruction::I32Store(arg)
            | Instruction::I64Store(arg)
            | Instruction::F32Store(arg)
            | Instruction::F64Store(arg)
            | Instruction::I32Store8(arg)
            | Instruction::I32Store16(arg)
            | Instruction::I64Store8(arg)
            | Instruction::I64Store16(arg)
            | Instruction::I64Store32(arg) => Some(arg),
            _ => None,
        }
    }

    fn fmt_block_type(f: &mut fmt::Formatter, block_type: &BlockType) -> fmt::Result {
        if let Some(vt) = block_type.0 {
            write!(f, " (result {})", vt)?;
        }
        Ok(())
    }

    fn dump(&self, f: &mut fmt::Formatter, indent: usize) -> fmt::Result {
        let pad = "  ".repeat(indent);
        match self {
            Instruction::Block(block_type, body) | Instruction::Loop(block_type, body) => {
                write!(f, "{}{}", pad, self.mnemonic())?;
                Self::fmt_block_type(f, block_type)?;
                writeln!(f)?;
                for instruction in body {
                    instruction.dump(f, indent + 1)?;
                }
                writeln!(f, "{}end", pad)
            }
            Instruction::If(block_type, consequent, alternate) => {
                write!(f, "{}if", pad)?;
                Self::fmt_block_type(f, block_type)?;
                writeln!(f)?;
                for instruction in consequent {
                    instruction.dump(f, indent + 1)?;
                }
                if !alternate.is_empty() {
                    writeln!(f, "{}else", pad)?;
                    for instruction in alternate {
                        instruction.dump(f, indent + 1)?;
                    }
                }
                writeln!(f, "{}end", pad)
            }
            Instruction::Br(depth) | Instruction::BrIf(depth) => {
                writeln!(f, "{}{} {}", pad, self.mnemonic(), depth)
            }
            Instruction::BrTable(data) => {
                write!(f, "{}br_table", pad)?;
                for depth in data.table.iter() {
                    write!(f, " {}", depth)?;
                }
                writeln!(f, " {}", data.default)
            }
            Instruction::Call(index) => writeln!(f, "{}call {}", pad, index),
            Instruction::CallIndirect(type_index, _) => {
                writeln!(f, "{}call_indirect (type {})", pad, type_index)
            }
            Instruction::GetLocal(index)
            | Instruction::SetLocal(index)
            | Instruction::TeeLocal(index)
            | Instruction::GetGlobal(index)
            | Instruction::SetGlobal(index) => {
                writeln!(f, "{}{} {}", pad, self.mnemonic(), index)
            }
            Instruction::I32Const(value) => writeln!(f, "{}i32.const {}", pad, value),
            Instruction::I64Const(value) => writeln!(f, "{}i64.const {}", pad, value),
            Instruction::F32Const(bits) => {
                writeln!(f, "{}f32.const {}", pad, f32::from_bits(*bits))
            }
            Instruction::F64Const(bits) => {
                writeln!(f, "{}f64.const {}", pad, f64::from_bits(*bits))
            }
            other => {
                if let Some(arg) = other.mem_arg() {
                    write!(f, "{}{}", pad, other.mnemonic())?;
                    if arg.offset != 0 {
                        write!(f, " offset={}", arg.offset)?;
                    }
                    writeln!(f, " align={}", 1u32 << arg.align)
                } else {
                    writeln!(f, "{}{}", pad, other.mnemonic())
                }
            }
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.dump(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{BinaryReader, BinaryWriter};
    use crate::types::{BlockType, ValueType};

    fn round_trip(instructions: Vec<Instruction>) {
        let mut writer = BinaryWriter::buffer();
        Instruction::write_expression(&instructions, &mut writer).unwrap();
        let bytes = writer.into_inner();
        let mut reader = BinaryReader::new(&bytes[..]);
        let decoded = Instruction::read_expression(&mut reader).unwrap();
        assert_eq!(decoded, instructions);
        assert_eq!(reader.position(), bytes.len() as u64);
    }

    #[test]
    fn flat_round_trip() {
        round_trip(vec![
            Instruction::I32Const(-5),
            Instruction::GetLocal(0),
            Instruction::I32Add,
            Instruction::TeeLocal(1),
            Instruction::Drop,
        ]);
    }

    #[test]
    fn nested_round_trip() {
        round_trip(vec![Instruction::Block(
            BlockType(Some(ValueType::I32)),
            vec![
                Instruction::Loop(
                    BlockType(None),
                    vec![Instruction::Br(1), Instruction::BrIf(0)],
                ),
                Instruction::If(
                    BlockType(Some(ValueType::I32)),
                    vec![Instruction::I32Const(1)],
                    vec![Instruction::I32Const(0)],
                ),
            ],
        )]);
    }

    #[test]
    fn if_without_else() {
        round_trip(vec![
            Instruction::I32Const(1),
            Instruction::If(BlockType(None), vec![Instruction::Nop], vec![]),
        ]);
    }

    #[test]
    fn br_table_round_trip() {
        round_trip(vec![Instruction::BrTable(Box::new(BrTableData {
            table: vec![0, 1, 2].into_boxed_slice(),
            default: 3,
        }))]);
    }

    #[test]
    fn float_const_bits_preserved() {
        // A NaN with a payload must survive encode/decode untouched.
        let nan_bits = 0x7ff8_dead_beef_0001u64;
        round_trip(vec![Instruction::F64Const(nan_bits)]);
    }

    #[test]
    fn memory_immediates() {
        round_trip(vec![
            Instruction::I32Const(0),
            Instruction::I32Load(MemArg {
                align: 2,
                offset: 16,
            }),
            Instruction::Drop,
        ]);
    }

    #[test]
    fn unknown_opcode_rejected() {
        let bytes = [0xfe, 0x0b];
        let mut reader = BinaryReader::new(&bytes[..]);
        assert!(Instruction::read_expression(&mut reader).is_err());
    }
}
