//! VM-carried values: fixed-width unsigned integers, bytes, booleans, and
//! null. No floats — banned entirely at validation (spec §3, §9).

use animica_config::NUMERIC_BIT_WIDTH;
use num_bigint::BigUint;
use num_traits::Zero;
use once_cell::sync::Lazy;

static MASK: Lazy<BigUint> = Lazy::new(|| (BigUint::from(1u8) << NUMERIC_BIT_WIDTH) - BigUint::from(1u8));

/// Reduce `v` modulo `2^NUMERIC_BIT_WIDTH`.
pub fn mask(v: BigUint) -> BigUint {
    v & &*MASK
}

/// A value living on the interpreter's operand stack or stored as an IR
/// constant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Arbitrary-precision integer, always kept reduced mod `2^N`.
    Int(BigUint),
    Bytes(Vec<u8>),
    Bool(bool),
    Null,
}

impl Value {
    pub fn int(v: impl Into<BigUint>) -> Self {
        Value::Int(mask(v.into()))
    }

    pub fn bytes(v: impl Into<Vec<u8>>) -> Self {
        Value::Bytes(v.into())
    }

    /// `ISZERO` semantics: empty bytes and the integer/bool zero are zero;
    /// everything else (including `Null`) is one. Mirrors
    /// `vm_py.runtime.engine`'s truthiness handling.
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Int(v) => v.is_zero(),
            Value::Bool(b) => !b,
            Value::Bytes(b) => b.is_empty(),
            Value::Null => false,
        }
    }

    /// Truthiness used by `JumpIfTrue`/`JumpIfFalse` and boolean ops.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Int(v) => !v.is_zero(),
            Value::Bool(b) => *b,
            Value::Bytes(b) => !b.is_empty(),
            Value::Null => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Bytes(_) => "bytes",
            Value::Bool(_) => "bool",
            Value::Null => "null",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_is_masked_to_bit_width() {
        let huge = BigUint::from(1u8) << 300u32;
        let v = Value::int(huge);
        match v {
            Value::Int(i) => assert!(i.bits() <= NUMERIC_BIT_WIDTH as u64),
            _ => panic!("expected int"),
        }
    }

    #[test]
    fn iszero_matches_spec_semantics() {
        assert!(Value::Int(BigUint::zero()).is_zero());
        assert!(Value::Bytes(vec![]).is_zero());
        assert!(!Value::Bytes(vec![0]).is_zero());
        assert!(!Value::Null.is_zero());
    }
}
