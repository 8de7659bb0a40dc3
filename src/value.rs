//! Runtime values and the conversion traits the interpreter is built on.

use crate::nan_preserving_float::{F32, F64};
use crate::types::ValueType;
use crate::TrapCode;

/// Error for [`LittleEndianConvert`].
#[derive(Debug)]
pub enum Error {
    /// The buffer is too short for the type being deserialized.
    InvalidLittleEndianBuffer,
}

/// Runtime representation of a value.
///
/// Wasm code manipulates values of four basic types: integers and
/// floating-point (IEEE 754-2008) data of 32 or 64 bit width each.
///
/// There is no distinction between signed and unsigned integer types.
/// Instead, integers are interpreted by respective operations as either
/// unsigned or signed in two's complement representation.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum RuntimeValue {
    /// Value of 32-bit signed or unsigned integer.
    I32(i32),
    /// Value of 64-bit signed or unsigned integer.
    I64(i64),
    /// Value of 32-bit IEEE 754-2008 floating point number.
    F32(F32),
    /// Value of 64-bit IEEE 754-2008 floating point number.
    F64(F64),
}

/// Trait for creating a value from a [`RuntimeValue`].
pub trait FromRuntimeValue
where
    Self: Sized,
{
    /// Creates a value of type `Self` from a given [`RuntimeValue`].
    ///
    /// Returns `None` if the [`RuntimeValue`] is of type different than
    /// expected by the conversion in question.
    fn from_runtime_value(val: RuntimeValue) -> Option<Self>;
}

/// Convert one type to another by wrapping.
pub trait WrapInto<T> {
    /// Convert one type to another by wrapping.
    fn wrap_into(self) -> T;
}

/// Convert one type to another by rounding to the nearest integer towards zero.
pub trait TryTruncateInto<T, E> {
    /// Convert one type to another by rounding to the nearest integer towards zero.
    fn try_truncate_into(self) -> Result<T, E>;
}

/// Convert one type to another by extending with leading zeroes or the
/// sign bit.
pub trait ExtendInto<T> {
    /// Convert one type to another by extending.
    fn extend_into(self) -> T;
}

/// Reinterprets the bits of a value of one type as another type.
pub trait TransmuteInto<T> {
    /// Reinterprets the bits of a value of one type as another type.
    fn transmute_into(self) -> T;
}

/// Convert from and to little endian.
pub trait LittleEndianConvert
where
    Self: Sized,
{
    /// Convert to little endian buffer.
    fn into_little_endian(self, buffer: &mut [u8]);
    /// Convert from little endian buffer.
    fn from_little_endian(buffer: &[u8]) -> Result<Self, Error>;
}

/// Arithmetic operations.
pub trait ArithmeticOps<T> {
    /// Add two values.
    fn add(self, other: T) -> T;
    /// Subtract two values.
    fn sub(self, other: T) -> T;
    /// Multiply two values.
    fn mul(self, other: T) -> T;
    /// Divide two values.
    fn div(self, other: T) -> Result<T, TrapCode>;
}

/// Integer value.
pub trait Integer<T>: ArithmeticOps<T> {
    /// Counts leading zeros in the bitwise representation of the value.
    fn leading_zeros(self) -> T;
    /// Counts trailing zeros in the bitwise representation of the value.
    fn trailing_zeros(self) -> T;
    /// Counts 1-bits in the bitwise representation of the value.
    fn count_ones(self) -> T;
    /// Get left bit rotation result.
    fn rotl(self, other: T) -> T;
    /// Get right bit rotation result.
    fn rotr(self, other: T) -> T;
    /// Get division remainder.
    fn rem(self, other: T) -> Result<T, TrapCode>;
}

/// Float-point value.
pub trait Float<T>: ArithmeticOps<T> {
    /// Get absolute value.
    fn abs(self) -> T;
    /// Returns the largest integer less than or equal to a number.
    fn floor(self) -> T;
    /// Returns the smallest integer greater than or equal to a number.
    fn ceil(self) -> T;
    /// Returns the integer part of a number.
    fn trunc(self) -> T;
    /// Returns the nearest integer to a number. Ties are rounded to the
    /// even number.
    fn nearest(self) -> T;
    /// Takes the square root of a number.
    fn sqrt(self) -> T;
    /// Returns the minimum of the two numbers.
    fn min(self, other: T) -> T;
    /// Returns the maximum of the two numbers.
    fn max(self, other: T) -> T;
    /// Sets sign of this value to the sign of other value.
    fn copysign(self, other: T) -> T;
}

impl RuntimeValue {
    /// Creates new default value of given type.
    pub fn default(value_type: ValueType) -> Self {
        match value_type {
            ValueType::I32 => RuntimeValue::I32(0),
            ValueType::I64 => RuntimeValue::I64(0),
            ValueType::F32 => RuntimeValue::F32(0f32.into()),
            ValueType::F64 => RuntimeValue::F64(0f64.into()),
        }
    }

    /// Creates new value by interpreting passed u32 as f32.
    pub fn decode_f32(val: u32) -> Self {
        RuntimeValue::F32(F32::from_bits(val))
    }

    /// Creates new value by interpreting passed u64 as f64.
    pub fn decode_f64(val: u64) -> Self {
        RuntimeValue::F64(F64::from_bits(val))
    }

    /// Get variable type for this value.
    pub fn value_type(&self) -> ValueType {
        match *self {
            RuntimeValue::I32(_) => ValueType::I32,
            RuntimeValue::I64(_) => ValueType::I64,
            RuntimeValue::F32(_) => ValueType::F32,
            RuntimeValue::F64(_) => ValueType::F64,
        }
    }

    /// Returns `T` if this particular [`RuntimeValue`] contains the
    /// appropriate type.
    ///
    /// See [`FromRuntimeValue`] for details.
    pub fn try_into<T: FromRuntimeValue>(self) -> Option<T> {
        FromRuntimeValue::from_runtime_value(self)
    }
}

impl core::fmt::Display for RuntimeValue {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            RuntimeValue::I32(value) => write!(f, "{}", value),
            RuntimeValue::I64(value) => write!(f, "{}", value),
            RuntimeValue::F32(value) => write!(f, "{}", value),
            RuntimeValue::F64(value) => write!(f, "{}", value),
        }
    }
}

impl From<i8> for RuntimeValue {
    fn from(val: i8) -> Self {
        RuntimeValue::I32(val as i32)
    }
}

impl From<i16> for RuntimeValue {
    fn from(val: i16) -> Self {
        RuntimeValue::I32(val as i32)
    }
}

impl From<i32> for RuntimeValue {
    fn from(val: i32) -> Self {
        RuntimeValue::I32(val)
    }
}

impl From<i64> for RuntimeValue {
    fn from(val: i64) -> Self {
        RuntimeValue::I64(val)
    }
}

impl From<u8> for RuntimeValue {
    fn from(val: u8) -> Self {
        RuntimeValue::I32(val as i32)
    }
}

impl From<u16> for RuntimeValue {
    fn from(val: u16) -> Self {
        RuntimeValue::I32(val as i32)
    }
}

impl From<u32> for RuntimeValue {
    fn from(val: u32) -> Self {
        RuntimeValue::I32(val.transmute_into())
    }
}

impl From<u64> for RuntimeValue {
    fn from(val: u64) -> Self {
        RuntimeValue::I64(val.transmute_into())
    }
}

impl From<F32> for RuntimeValue {
    fn from(val: F32) -> Self {
        RuntimeValue::F32(val)
    }
}

impl From<F64> for RuntimeValue {
    fn from(val: F64) -> Self {
        RuntimeValue::F64(val)
    }
}

macro_rules! impl_from_runtime_value {
    ($expected_rt_ty: ident, $into: ty) => {
        impl FromRuntimeValue for $into {
            fn from_runtime_value(val: RuntimeValue) -> Option<Self> {
                match val {
                    RuntimeValue::$expected_rt_ty(val) => Some(val.transmute_into()),
                    _ => None,
                }
            }
        }
    };
}

/// This conversion assumes that boolean values are represented by
/// [`I32`] type.
///
/// [`I32`]: enum.RuntimeValue.html#variant.I32
impl FromRuntimeValue for bool {
    fn from_runtime_value(val: RuntimeValue) -> Option<Self> {
        match val {
            RuntimeValue::I32(val) => Some(val != 0),
            _ => None,
        }
    }
}

impl_from_runtime_value!(I32, i32);
impl_from_runtime_value!(I64, i64);
impl_from_runtime_value!(F32, F32);
impl_from_runtime_value!(F64, F64);
impl_from_runtime_value!(I32, u32);
impl_from_runtime_value!(I64, u64);

macro_rules! impl_wrap_into {
    ($from:ident, $into:ident) => {
        impl WrapInto<$into> for $from {
            fn wrap_into(self) -> $into {
                self as $into
            }
        }
    };
}

impl_wrap_into!(i32, i8);
impl_wrap_into!(i32, i16);
impl_wrap_into!(i64, i8);
impl_wrap_into!(i64, i16);
impl_wrap_into!(i64, i32);

impl WrapInto<F32> for F64 {
    fn wrap_into(self) -> F32 {
        // Demotion quietens NaNs; the payload's top bits survive in
        // hardware but the wasm spec only requires an arithmetic NaN.
        F32::from(f64::from(self) as f32).quieten()
    }
}

macro_rules! impl_try_truncate_into {
    (@primitive $from: ident, $into: ident, $to_primitive:path) => {
        impl TryTruncateInto<$into, TrapCode> for $from {
            fn try_truncate_into(self) -> Result<$into, TrapCode> {
                // Casting from a float to an integer rounds towards zero.
                // BigRational makes the range check exact even where the
                // float mantissa cannot represent the integer bounds.
                num_rational::BigRational::from_float(self)
                    .map(|val| val.to_integer())
                    .and_then(|val| $to_primitive(&val))
                    .ok_or(TrapCode::InvalidConversionToInt)
            }
        }
    };
    (@wrapped $from:ident, $intermediate:ident, $into:ident) => {
        impl TryTruncateInto<$into, TrapCode> for $from {
            fn try_truncate_into(self) -> Result<$into, TrapCode> {
                $intermediate::from(self).try_truncate_into()
            }
        }
    };
}

impl_try_truncate_into!(@primitive f32, i32, num_traits::cast::ToPrimitive::to_i32);
impl_try_truncate_into!(@primitive f32, i64, num_traits::cast::ToPrimitive::to_i64);
impl_try_truncate_into!(@primitive f64, i32, num_traits::cast::ToPrimitive::to_i32);
impl_try_truncate_into!(@primitive f64, i64, num_traits::cast::ToPrimitive::to_i64);
impl_try_truncate_into!(@primitive f32, u32, num_traits::cast::ToPrimitive::to_u32);
impl_try_truncate_into!(@primitive f32, u64, num_traits::cast::ToPrimitive::to_u64);
impl_try_truncate_into!(@primitive f64, u32, num_traits::cast::ToPrimitive::to_u32);
impl_try_truncate_into!(@primitive f64, u64, num_traits::cast::ToPrimitive::to_u64);
impl_try_truncate_into!(@wrapped F32, f32, i32);
impl_try_truncate_into!(@wrapped F32, f32, i64);
impl_try_truncate_into!(@wrapped F64, f64, i32);
impl_try_truncate_into!(@wrapped F64, f64, i64);
impl_try_truncate_into!(@wrapped F32, f32, u32);
impl_try_truncate_into!(@wrapped F32, f32, u64);
impl_try_truncate_into!(@wrapped F64, f64, u32);
impl_try_truncate_into!(@wrapped F64, f64, u64);

macro_rules! impl_extend_into {
    ($from:ident, $into:ident) => {
        impl ExtendInto<$into> for $from {
            fn extend_into(self) -> $into {
                self as $into
            }
        }
    };
    ($from:ident, $intermediate:ident, $into:ident) => {
        impl ExtendInto<$into> for $from {
            fn extend_into(self) -> $into {
                $into::from(self as $intermediate)
            }
        }
    };
}

impl_extend_into!(i8, i32);
impl_extend_into!(u8, i32);
impl_extend_into!(i16, i32);
impl_extend_into!(u16, i32);
impl_extend_into!(i8, i64);
impl_extend_into!(u8, i64);
impl_extend_into!(i16, i64);
impl_extend_into!(u16, i64);
impl_extend_into!(i32, i64);
impl_extend_into!(u32, i64);
impl_extend_into!(u32, u64);

impl_extend_into!(i32, f32, F32);
impl_extend_into!(i32, f64, F64);
impl_extend_into!(u32, f32, F32);
impl_extend_into!(u32, f64, F64);
impl_extend_into!(i64, f64, F64);
impl_extend_into!(u64, f64, F64);

impl ExtendInto<F32> for i64 {
    fn extend_into(self) -> F32 {
        F32::from(self as f32)
    }
}

impl ExtendInto<F32> for u64 {
    fn extend_into(self) -> F32 {
        F32::from(self as f32)
    }
}

impl ExtendInto<F64> for F32 {
    fn extend_into(self) -> F64 {
        F64::from(f32::from(self) as f64).quieten()
    }
}

macro_rules! impl_transmute_into_self {
    ($type: ident) => {
        impl TransmuteInto<$type> for $type {
            fn transmute_into(self) -> $type {
                self
            }
        }
    };
}

impl_transmute_into_self!(i32);
impl_transmute_into_self!(i64);
impl_transmute_into_self!(f32);
impl_transmute_into_self!(f64);
impl_transmute_into_self!(F32);
impl_transmute_into_self!(F64);

macro_rules! impl_transmute_into_as {
    ($from: ident, $into: ident) => {
        impl TransmuteInto<$into> for $from {
            fn transmute_into(self) -> $into {
                self as $into
            }
        }
    };
}

impl_transmute_into_as!(i8, u8);
impl_transmute_into_as!(i32, u32);
impl_transmute_into_as!(u32, i32);
impl_transmute_into_as!(i64, u64);
impl_transmute_into_as!(u64, i64);

macro_rules! impl_transmute_into_npf {
    ($npf:ident, $float:ident, $signed:ident, $unsigned:ident) => {
        impl TransmuteInto<$float> for $npf {
            fn transmute_into(self) -> $float {
                self.into()
            }
        }

        impl TransmuteInto<$npf> for $float {
            fn transmute_into(self) -> $npf {
                self.into()
            }
        }

        impl TransmuteInto<$signed> for $npf {
            fn transmute_into(self) -> $signed {
                self.to_bits() as _
            }
        }

        impl TransmuteInto<$unsigned> for $npf {
            fn transmute_into(self) -> $unsigned {
                self.to_bits()
            }
        }

        impl TransmuteInto<$npf> for $signed {
            fn transmute_into(self) -> $npf {
                $npf::from_bits(self as _)
            }
        }

        impl TransmuteInto<$npf> for $unsigned {
            fn transmute_into(self) -> $npf {
                $npf::from_bits(self)
            }
        }
    };
}

impl_transmute_into_npf!(F32, f32, i32, u32);
impl_transmute_into_npf!(F64, f64, i64, u64);

impl LittleEndianConvert for i8 {
    fn into_little_endian(self, buffer: &mut [u8]) {
        buffer[0] = self as u8;
    }

    fn from_little_endian(buffer: &[u8]) -> Result<Self, Error> {
        buffer
            .first()
            .map(|v| *v as i8)
            .ok_or(Error::InvalidLittleEndianBuffer)
    }
}

impl LittleEndianConvert for u8 {
    fn into_little_endian(self, buffer: &mut [u8]) {
        buffer[0] = self;
    }

    fn from_little_endian(buffer: &[u8]) -> Result<Self, Error> {
        buffer
            .first()
            .copied()
            .ok_or(Error::InvalidLittleEndianBuffer)
    }
}

macro_rules! impl_little_endian_convert {
    ($type:ident, $size:expr) => {
        impl LittleEndianConvert for $type {
            fn into_little_endian(self, buffer: &mut [u8]) {
                buffer.copy_from_slice(&self.to_le_bytes());
            }

            fn from_little_endian(buffer: &[u8]) -> Result<Self, Error> {
                let mut res = [0u8; $size];
                buffer
                    .get(0..$size)
                    .map(|s| {
                        res.copy_from_slice(s);
                        Self::from_le_bytes(res)
                    })
                    .ok_or(Error::InvalidLittleEndianBuffer)
            }
        }
    };
}

impl_little_endian_convert!(i16, 2);
impl_little_endian_convert!(u16, 2);
impl_little_endian_convert!(i32, 4);
impl_little_endian_convert!(u32, 4);
impl_little_endian_convert!(i64, 8);
impl_little_endian_convert!(u64, 8);

impl LittleEndianConvert for F32 {
    fn into_little_endian(self, buffer: &mut [u8]) {
        self.to_bits().into_little_endian(buffer)
    }

    fn from_little_endian(buffer: &[u8]) -> Result<Self, Error> {
        u32::from_little_endian(buffer).map(Self::from_bits)
    }
}

impl LittleEndianConvert for F64 {
    fn into_little_endian(self, buffer: &mut [u8]) {
        self.to_bits().into_little_endian(buffer)
    }

    fn from_little_endian(buffer: &[u8]) -> Result<Self, Error> {
        u64::from_little_endian(buffer).map(Self::from_bits)
    }
}

macro_rules! impl_integer_arithmetic_ops {
    ($type: ident) => {
        impl ArithmeticOps<$type> for $type {
            fn add(self, other: $type) -> $type {
                self.wrapping_add(other)
            }
            fn sub(self, other: $type) -> $type {
                self.wrapping_sub(other)
            }
            fn mul(self, other: $type) -> $type {
                self.wrapping_mul(other)
            }
            fn div(self, other: $type) -> Result<$type, TrapCode> {
                if other == 0 {
                    Err(TrapCode::DivisionByZero)
                } else {
                    let (result, overflow) = self.overflowing_div(other);
                    if overflow {
                        Err(TrapCode::IntegerOverflow)
                    } else {
                        Ok(result)
                    }
                }
            }
        }
    };
}

impl_integer_arithmetic_ops!(i32);
impl_integer_arithmetic_ops!(u32);
impl_integer_arithmetic_ops!(i64);
impl_integer_arithmetic_ops!(u64);

macro_rules! impl_float_arithmetic_ops {
    ($type: ident) => {
        impl ArithmeticOps<$type> for $type {
            fn add(self, other: $type) -> $type {
                (self + other).quieten()
            }
            fn sub(self, other: $type) -> $type {
                (self - other).quieten()
            }
            fn mul(self, other: $type) -> $type {
                (self * other).quieten()
            }
            fn div(self, other: $type) -> Result<$type, TrapCode> {
                Ok((self / other).quieten())
            }
        }
    };
}

impl_float_arithmetic_ops!(F32);
impl_float_arithmetic_ops!(F64);

macro_rules! impl_integer {
    ($type: ident) => {
        impl Integer<$type> for $type {
            fn leading_zeros(self) -> $type {
                self.leading_zeros() as $type
            }
            fn trailing_zeros(self) -> $type {
                self.trailing_zeros() as $type
            }
            fn count_ones(self) -> $type {
                self.count_ones() as $type
            }
            fn rotl(self, other: $type) -> $type {
                self.rotate_left(other as u32)
            }
            fn rotr(self, other: $type) -> $type {
                self.rotate_right(other as u32)
            }
            fn rem(self, other: $type) -> Result<$type, TrapCode> {
                if other == 0 {
                    Err(TrapCode::DivisionByZero)
                } else {
                    Ok(self.wrapping_rem(other))
                }
            }
        }
    };
}

impl_integer!(i32);
impl_integer!(u32);
impl_integer!(i64);
impl_integer!(u64);

macro_rules! impl_float {
    ($type:ident, $fXX:ident) => {
        // In this particular instance we want to directly compare
        // floating point numbers.
        #[allow(clippy::float_cmp)]
        impl Float<$type> for $type {
            fn abs(self) -> $type {
                // Sign-bit manipulation only; never canonicalizes.
                $type::abs(self)
            }
            fn floor(self) -> $type {
                $type::from($fXX::from(self).floor()).quieten()
            }
            fn ceil(self) -> $type {
                $type::from($fXX::from(self).ceil()).quieten()
            }
            fn trunc(self) -> $type {
                $type::from($fXX::from(self).trunc()).quieten()
            }
            fn nearest(self) -> $type {
                let this = $fXX::from(self);
                let round = this.round();
                if this.fract().abs() != 0.5 {
                    return $type::from(round).quieten();
                }
                // Ties round to even.
                use core::ops::Rem;
                let result = if round.rem(2.0) == 1.0 {
                    this.floor()
                } else if round.rem(2.0) == -1.0 {
                    this.ceil()
                } else {
                    round
                };
                $type::from(result).quieten()
            }
            fn sqrt(self) -> $type {
                $type::from($fXX::from(self).sqrt()).quieten()
            }
            // This instruction corresponds to what is sometimes called
            // "minNaN" in other languages: NaN inputs propagate.
            fn min(self, other: $type) -> $type {
                if self.is_nan() {
                    return self.quieten();
                }
                if other.is_nan() {
                    return other.quieten();
                }
                // `f32::min(-0.0, 0.0)` may return either zero; pick the
                // negative one explicitly.
                let (a, b) = ($fXX::from(self), $fXX::from(other));
                if a == b {
                    return if self.signbit() { self } else { other };
                }
                $type::from(a.min(b))
            }
            // This instruction corresponds to what is sometimes called
            // "maxNaN" in other languages: NaN inputs propagate.
            fn max(self, other: $type) -> $type {
                if self.is_nan() {
                    return self.quieten();
                }
                if other.is_nan() {
                    return other.quieten();
                }
                let (a, b) = ($fXX::from(self), $fXX::from(other));
                if a == b {
                    return if self.signbit() { other } else { self };
                }
                $type::from(a.max(b))
            }
            fn copysign(self, other: $type) -> $type {
                // Sign transfer is bitwise; NaN payloads pass through.
                $type::copysign(self, other)
            }
        }
    };
}

impl_float!(F32, f32);
impl_float!(F64, f64);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nan_preserving_float::{F32, F64};

    #[test]
    fn try_into_dispatches_on_type() {
        assert_eq!(RuntimeValue::I32(17).try_into::<i32>(), Some(17));
        assert_eq!(RuntimeValue::I32(17).try_into::<i64>(), None);
        assert_eq!(RuntimeValue::I64(-1).try_into::<u64>(), Some(u64::MAX));
    }

    #[test]
    fn signed_division_overflow_traps() {
        assert!(matches!(
            ArithmeticOps::div(i32::MIN, -1),
            Err(TrapCode::IntegerOverflow)
        ));
        assert!(matches!(
            ArithmeticOps::div(1i64, 0),
            Err(TrapCode::DivisionByZero)
        ));
        assert_eq!(ArithmeticOps::div(7i32, -2), Ok(-3));
    }

    #[test]
    fn remainder_by_zero_traps() {
        assert!(matches!(
            Integer::rem(5u32, 0),
            Err(TrapCode::DivisionByZero)
        ));
        // MIN % -1 is 0, not an overflow.
        assert_eq!(Integer::rem(i32::MIN, -1), Ok(0));
    }

    #[test]
    fn truncation_range_checks() {
        assert_eq!(TryTruncateInto::<i32, _>::try_truncate_into(-1.9f64), Ok(-1));
        assert!(TryTruncateInto::<i32, _>::try_truncate_into(f64::NAN).is_err());
        assert!(TryTruncateInto::<i32, _>::try_truncate_into(f64::INFINITY).is_err());
        assert!(TryTruncateInto::<i32, _>::try_truncate_into(2147483648.0f64).is_err());
        assert_eq!(
            TryTruncateInto::<i32, _>::try_truncate_into(2147483647.0f64),
            Ok(i32::MAX)
        );
        assert!(TryTruncateInto::<u32, _>::try_truncate_into(-1.0f64).is_err());
        // -0.9 truncates toward zero into the u32 range.
        assert_eq!(TryTruncateInto::<u32, _>::try_truncate_into(-0.9f64), Ok(0));
    }

    #[test]
    fn little_endian_views_round_trip() {
        let mut buffer = [0u8; 8];
        0x1122_3344_5566_7788u64.into_little_endian(&mut buffer);
        assert_eq!(u64::from_little_endian(&buffer).unwrap(), 0x1122_3344_5566_7788);
        assert_eq!(buffer[0], 0x88);

        let mut buffer = [0u8; 4];
        F32::from_bits(0x7fc0_0001).into_little_endian(&mut buffer);
        assert_eq!(
            F32::from_little_endian(&buffer).unwrap().to_bits(),
            0x7fc0_0001
        );
    }

    #[test]
    fn nearest_rounds_ties_to_even() {
        assert_eq!(f64::from(Float::nearest(F64::from(2.5f64))), 2.0);
        assert_eq!(f64::from(Float::nearest(F64::from(3.5f64))), 4.0);
        assert_eq!(f64::from(Float::nearest(F64::from(-2.5f64))), -2.0);
        assert_eq!(f64::from(Float::nearest(F64::from(0.4f64))), 0.0);
    }

    #[test]
    fn min_max_zero_signs() {
        let pos = F64::from(0.0f64);
        let neg = F64::from(-0.0f64);
        assert!(Float::min(pos, neg).signbit());
        assert!(!Float::max(neg, pos).signbit());
    }

    #[test]
    fn nan_propagation_is_quiet() {
        let signaling = F64::nan_with_payload(false, 1);
        let result = Float::min(signaling, F64::from(1.0f64));
        assert!(result.is_nan());
        // Quiet bit must be set on the way out.
        assert!(result.payload() & (1 << 51) != 0);
    }
}
