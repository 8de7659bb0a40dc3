//! Exact representation of floating-point literals.
//!
//! The lexer never rounds: a literal is carried as sign, kind and exact
//! significand/exponent bignums, and only collapses to IEEE-754 bits when
//! a constant is materialized. NaN literals keep their payload bits.

use num_bigint::{BigInt, BigUint};
use num_traits::{ToPrimitive, Zero};
use std::str::FromStr;

/// What a float literal denotes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FloatLiteralKind {
    /// A finite number: `significand * base^exponent`.
    Number {
        /// The digits with the point removed.
        significand: BigUint,
        /// 2 for hexadecimal literals (the `p` exponent is binary),
        /// 10 for decimal literals.
        base: u8,
        /// The exponent, adjusted for fractional digits.
        exponent: BigInt,
    },
    /// `nan`: the canonical quiet NaN.
    CanonicalNan,
    /// `nan:0x…`: a NaN with explicit fraction bits.
    NanWithPayload(u64),
    /// `inf`.
    Infinity,
}

/// A floating-point literal, preserved exactly as written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FloatLiteral {
    negative: bool,
    kind: FloatLiteralKind,
}

impl FloatLiteral {
    /// Creates a literal from its parts.
    pub fn new(negative: bool, kind: FloatLiteralKind) -> FloatLiteral {
        FloatLiteral { negative, kind }
    }

    /// The canonical NaN literal.
    pub fn canonical_nan(negative: bool) -> FloatLiteral {
        FloatLiteral {
            negative,
            kind: FloatLiteralKind::CanonicalNan,
        }
    }

    /// A NaN literal with an explicit payload.
    pub fn nan_with_payload(negative: bool, payload: u64) -> FloatLiteral {
        FloatLiteral {
            negative,
            kind: FloatLiteralKind::NanWithPayload(payload),
        }
    }

    /// Whether the literal carries a minus sign.
    pub fn is_negative(&self) -> bool {
        self.negative
    }

    /// The literal's kind.
    pub fn kind(&self) -> &FloatLiteralKind {
        &self.kind
    }

    /// Re-expresses a finite literal in another base.
    ///
    /// This is lossless only when the current base is an integer power of
    /// `new_base`; `None` is returned otherwise. Non-numeric literals are
    /// returned unchanged.
    pub fn change_base(self, new_base: u8) -> Option<FloatLiteral> {
        let negative = self.negative;
        match self.kind {
            FloatLiteralKind::Number {
                significand,
                base,
                exponent,
            } => {
                if base == new_base {
                    return Some(FloatLiteral {
                        negative,
                        kind: FloatLiteralKind::Number {
                            significand,
                            base,
                            exponent,
                        },
                    });
                }
                // The old base must be new_base^k for integer k.
                let mut power = u32::from(new_base);
                let mut k = 1u32;
                while power < u32::from(base) {
                    power *= u32::from(new_base);
                    k += 1;
                }
                if power != u32::from(base) {
                    return None;
                }
                Some(FloatLiteral {
                    negative,
                    kind: FloatLiteralKind::Number {
                        significand,
                        base: new_base,
                        exponent: exponent * k,
                    },
                })
            }
            other => Some(FloatLiteral {
                negative,
                kind: other,
            }),
        }
    }

    /// Converts to IEEE-754 double bits with correct rounding.
    pub fn to_f64_bits(&self) -> Option<u64> {
        let sign = if self.negative { 1u64 << 63 } else { 0 };
        match &self.kind {
            FloatLiteralKind::Infinity => Some(sign | 0x7ff0_0000_0000_0000),
            FloatLiteralKind::CanonicalNan => Some(sign | 0x7ff8_0000_0000_0000),
            FloatLiteralKind::NanWithPayload(payload) => {
                if *payload == 0 || *payload > 0x000f_ffff_ffff_ffff {
                    return None;
                }
                Some(sign | 0x7ff0_0000_0000_0000 | payload)
            }
            FloatLiteralKind::Number {
                significand,
                base,
                exponent,
            } => {
                let magnitude = match base {
                    10 => decimal_to_float::<f64>(significand, exponent)?,
                    2 => f64::from_bits(binary_to_bits(
                        significand,
                        exponent.to_i64()?,
                        52,
                        1023,
                    )),
                    16 => {
                        let exponent = exponent.to_i64()?.checked_mul(4)?;
                        f64::from_bits(binary_to_bits(significand, exponent, 52, 1023))
                    }
                    _ => return None,
                };
                Some(sign | magnitude.to_bits())
            }
        }
    }

    /// Converts to IEEE-754 single bits with correct rounding.
    pub fn to_f32_bits(&self) -> Option<u32> {
        let sign = if self.negative { 1u32 << 31 } else { 0 };
        match &self.kind {
            FloatLiteralKind::Infinity => Some(sign | 0x7f80_0000),
            FloatLiteralKind::CanonicalNan => Some(sign | 0x7fc0_0000),
            FloatLiteralKind::NanWithPayload(payload) => {
                if *payload == 0 || *payload > 0x007f_ffff {
                    return None;
                }
                Some(sign | 0x7f80_0000 | *payload as u32)
            }
            FloatLiteralKind::Number {
                significand,
                base,
                exponent,
            } => {
                let magnitude = match base {
                    10 => decimal_to_float::<f32>(significand, exponent)?,
                    2 => f32::from_bits(binary_to_bits(significand, exponent.to_i64()?, 23, 127)
                        as u32),
                    16 => {
                        let exponent = exponent.to_i64()?.checked_mul(4)?;
                        f32::from_bits(
                            binary_to_bits(significand, exponent, 23, 127) as u32
                        )
                    }
                    _ => return None,
                };
                Some(sign | magnitude.to_bits())
            }
        }
    }
}

/// Decimal conversion defers to the standard library parser, which rounds
/// correctly for arbitrary precision input.
fn decimal_to_float<T: FromStr>(significand: &BigUint, exponent: &BigInt) -> Option<T> {
    let rendered = format!("{}e{}", significand, exponent);
    rendered.parse::<T>().ok()
}

/// Rounds `significand * 2^exponent` to the nearest representable float,
/// ties to even, returning the magnitude's bit pattern (sign bit clear).
///
/// `mant_bits` and `exp_bias` select the format: (52, 1023) for f64,
/// (23, 127) for f32.
fn binary_to_bits(significand: &BigUint, exponent: i64, mant_bits: u32, exp_bias: i64) -> u64 {
    if significand.is_zero() {
        return 0;
    }
    let target = i64::from(mant_bits) + 1;
    let min_e = 1 - exp_bias;

    let mut significand = significand.clone();
    let mut exponent = exponent;

    // Discard bits the format cannot hold, rounding half to even. The
    // carry may add a bit, in which case the second pass shifts it out
    // exactly.
    for _ in 0..2 {
        let bit_len = significand.bits() as i64;
        if bit_len == 0 {
            return 0;
        }
        let e = bit_len - 1 + exponent;
        let keep = if e < min_e {
            (target - (min_e - e)).max(0)
        } else {
            target
        };
        if keep >= bit_len {
            break;
        }
        let shift = (bit_len - keep) as u64;
        significand = round_half_even(&significand, shift);
        exponent += shift as i64;
    }

    if significand.is_zero() {
        return 0;
    }
    let bit_len = significand.bits() as i64;
    let e = bit_len - 1 + exponent;
    if e > exp_bias {
        // Overflow to infinity.
        return ((2 * exp_bias as u64) + 1) << mant_bits;
    }

    if e >= min_e {
        // Normal: scale the significand to exactly `target` bits and drop
        // the implicit leading one.
        let scaled = significand << (target - bit_len) as u64;
        let full = scaled.to_u64().expect("scaled significand fits the format");
        let mantissa = full & ((1u64 << mant_bits) - 1);
        let biased = (e + exp_bias) as u64;
        (biased << mant_bits) | mantissa
    } else {
        // Subnormal: the exponent field is zero and the significand is
        // aligned to the fixed scale 2^(min_e - mant_bits).
        let sub_shift = exponent - (min_e - i64::from(mant_bits));
        debug_assert!(sub_shift >= 0, "rounding pass keeps subnormals aligned");
        let aligned = significand << sub_shift as u64;
        let full = aligned.to_u64().expect("subnormal fits the format");
        if full >> mant_bits == 1 {
            // Rounded up into the smallest normal.
            1u64 << mant_bits
        } else {
            full
        }
    }
}

fn round_half_even(value: &BigUint, shift: u64) -> BigUint {
    if shift == 0 {
        return value.clone();
    }
    let quotient: BigUint = value >> shift;
    let remainder: BigUint = value - (&quotient << shift);
    let half: BigUint = BigUint::from(1u8) << (shift - 1);
    if remainder > half {
        quotient + 1u8
    } else if remainder == half {
        let is_odd = quotient.bit(0);
        if is_odd {
            quotient + 1u8
        } else {
            quotient
        }
    } else {
        quotient
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::{BigInt, BigUint};

    fn number(sig: u64, base: u8, exp: i64) -> FloatLiteral {
        FloatLiteral::new(
            false,
            FloatLiteralKind::Number {
                significand: BigUint::from(sig),
                base,
                exponent: BigInt::from(exp),
            },
        )
    }

    #[test]
    fn decimal_values() {
        // 1.5
        assert_eq!(
            number(15, 10, -1).to_f64_bits().unwrap(),
            1.5f64.to_bits()
        );
        // 1e100 survives with full precision.
        assert_eq!(
            number(1, 10, 100).to_f64_bits().unwrap(),
            1e100f64.to_bits()
        );
        // 0.1 rounds the usual way.
        assert_eq!(number(1, 10, -1).to_f64_bits().unwrap(), 0.1f64.to_bits());
    }

    #[test]
    fn hex_values() {
        // 0x1.8p3 = 0x18 * 2^(3-4) = 12
        assert_eq!(number(0x18, 2, -1).to_f64_bits().unwrap(), 12.0f64.to_bits());
        // Exactly the largest finite f64: (2^53 - 1) * 2^971.
        let max_sig = (1u64 << 53) - 1;
        assert_eq!(
            number(max_sig, 2, 971).to_f64_bits().unwrap(),
            f64::MAX.to_bits()
        );
        // One ulp beyond overflows to infinity.
        assert_eq!(
            number(1, 2, 1024).to_f64_bits().unwrap(),
            f64::INFINITY.to_bits()
        );
    }

    #[test]
    fn ties_round_to_even() {
        // 2^53 + 1 is exactly halfway between representables; rounds down
        // to 2^53 (even mantissa).
        let halfway = BigUint::from((1u64 << 53) + 1);
        let literal = FloatLiteral::new(
            false,
            FloatLiteralKind::Number {
                significand: halfway,
                base: 2,
                exponent: BigInt::from(0),
            },
        );
        assert_eq!(
            literal.to_f64_bits().unwrap(),
            (9007199254740992.0f64).to_bits()
        );
    }

    #[test]
    fn subnormals() {
        // Smallest subnormal: 2^-1074.
        assert_eq!(number(1, 2, -1074).to_f64_bits().unwrap(), 1);
        // Half of it rounds to zero (ties to even).
        assert_eq!(number(1, 2, -1075).to_f64_bits().unwrap(), 0);
        // Three quarters rounds up to the smallest subnormal.
        assert_eq!(number(3, 2, -1076).to_f64_bits().unwrap(), 1);
    }

    #[test]
    fn nan_payload_round_trips() {
        let literal = FloatLiteral::nan_with_payload(true, 0x0123_4567_89ab);
        let bits = literal.to_f64_bits().unwrap();
        assert_eq!(bits >> 63, 1);
        assert_eq!(bits & 0x000f_ffff_ffff_ffff, 0x0123_4567_89ab);
        assert!(f64::from_bits(bits).is_nan());
    }

    #[test]
    fn f32_payload_range_enforced() {
        assert!(FloatLiteral::nan_with_payload(false, 0x20_0000)
            .to_f32_bits()
            .is_some());
        assert!(FloatLiteral::nan_with_payload(false, 0x100_0000)
            .to_f32_bits()
            .is_none());
        assert!(FloatLiteral::nan_with_payload(false, 0)
            .to_f32_bits()
            .is_none());
    }

    #[test]
    fn infinity_and_canonical_nan() {
        assert_eq!(
            FloatLiteral::new(false, FloatLiteralKind::Infinity)
                .to_f32_bits()
                .unwrap(),
            f32::INFINITY.to_bits()
        );
        let nan = FloatLiteral::canonical_nan(true);
        assert_eq!(nan.to_f64_bits().unwrap(), 0xfff8_0000_0000_0000);
    }

    #[test]
    fn base_change() {
        let hex = number(0x18, 16, 1);
        let binary = hex.change_base(2).unwrap();
        match binary.kind() {
            FloatLiteralKind::Number { base, exponent, .. } => {
                assert_eq!(*base, 2);
                assert_eq!(*exponent, BigInt::from(4));
            }
            other => panic!("unexpected kind {:?}", other),
        }
        // Decimal cannot be re-expressed in binary.
        assert!(number(15, 10, -1).change_base(2).is_none());
    }
}
