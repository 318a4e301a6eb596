//! Runtime value representation.
//!
//! Float variants store raw IEEE-754 bits so NaN payloads survive every
//! stack and memory round trip. Reference variants carry a nullable opaque
//! handle: a store address for funcref, an embedder-chosen word for
//! externref.

use skiff_wasm::model::ValType;

/// A single operand-stack value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    I32(i32),
    I64(i64),
    /// Raw f32 bits.
    F32(u32),
    /// Raw f64 bits.
    F64(u64),
    V128(u128),
    FuncRef(Option<usize>),
    ExternRef(Option<usize>),
}

impl Value {
    /// The zero value for a type; reference types get a null reference.
    pub fn default_for(ty: ValType) -> Self {
        match ty {
            ValType::I32 => Value::I32(0),
            ValType::I64 => Value::I64(0),
            ValType::F32 => Value::F32(0),
            ValType::F64 => Value::F64(0),
            ValType::V128 => Value::V128(0),
            ValType::FuncRef => Value::FuncRef(None),
            ValType::ExternRef => Value::ExternRef(None),
        }
    }

    pub fn ty(self) -> ValType {
        match self {
            Value::I32(_) => ValType::I32,
            Value::I64(_) => ValType::I64,
            Value::F32(_) => ValType::F32,
            Value::F64(_) => ValType::F64,
            Value::V128(_) => ValType::V128,
            Value::FuncRef(_) => ValType::FuncRef,
            Value::ExternRef(_) => ValType::ExternRef,
        }
    }

    /// Raw payload bits, independent of variant. Reference handles map to
    /// their address value, null to 0.
    fn raw_bits(self) -> u128 {
        match self {
            Value::I32(v) => v as u32 as u128,
            Value::I64(v) => v as u64 as u128,
            Value::F32(b) => b as u128,
            Value::F64(b) => b as u128,
            Value::V128(b) => b,
            Value::FuncRef(h) | Value::ExternRef(h) => h.map(|a| a as u128).unwrap_or(0),
        }
    }

    // Typed getters. Validated code never hits the mismatch arm; debug
    // builds assert on it, release builds reinterpret the raw bits.

    pub fn as_i32(self) -> i32 {
        match self {
            Value::I32(v) => v,
            other => {
                debug_assert!(false, "expected i32, got {other:?}");
                other.raw_bits() as i32
            }
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            Value::I64(v) => v,
            other => {
                debug_assert!(false, "expected i64, got {other:?}");
                other.raw_bits() as i64
            }
        }
    }

    pub fn as_f32_bits(self) -> u32 {
        match self {
            Value::F32(b) => b,
            other => {
                debug_assert!(false, "expected f32, got {other:?}");
                other.raw_bits() as u32
            }
        }
    }

    pub fn as_f64_bits(self) -> u64 {
        match self {
            Value::F64(b) => b,
            other => {
                debug_assert!(false, "expected f64, got {other:?}");
                other.raw_bits() as u64
            }
        }
    }

    pub fn as_f32(self) -> f32 {
        f32::from_bits(self.as_f32_bits())
    }

    pub fn as_f64(self) -> f64 {
        f64::from_bits(self.as_f64_bits())
    }

    pub fn as_v128(self) -> u128 {
        match self {
            Value::V128(b) => b,
            other => {
                debug_assert!(false, "expected v128, got {other:?}");
                other.raw_bits()
            }
        }
    }

    /// Reference payload of either reference variant.
    pub fn as_ref(self) -> Option<usize> {
        match self {
            Value::FuncRef(h) | Value::ExternRef(h) => h,
            other => {
                debug_assert!(false, "expected reference, got {other:?}");
                None
            }
        }
    }

    pub fn is_null_ref(self) -> bool {
        matches!(self, Value::FuncRef(None) | Value::ExternRef(None))
    }

    pub fn from_f32(v: f32) -> Self {
        Value::F32(v.to_bits())
    }

    pub fn from_f64(v: f64) -> Self {
        Value::F64(v.to_bits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        assert_eq!(Value::default_for(ValType::I64), Value::I64(0));
        assert_eq!(Value::default_for(ValType::FuncRef), Value::FuncRef(None));
        assert!(Value::default_for(ValType::ExternRef).is_null_ref());
    }

    #[test]
    fn float_bits_preserved() {
        // A quiet NaN with a payload survives the value round trip.
        let bits = 0x7FC0_0001u32;
        let v = Value::F32(bits);
        assert_eq!(v.as_f32_bits(), bits);
        assert!(v.as_f32().is_nan());

        let bits64 = 0x7FF8_0000_0000_0001u64;
        assert_eq!(Value::F64(bits64).as_f64_bits(), bits64);
    }

    #[test]
    fn null_ref_distinct_from_zero_address() {
        assert_ne!(Value::FuncRef(None), Value::FuncRef(Some(0)));
        assert!(!Value::FuncRef(Some(0)).is_null_ref());
    }

    #[test]
    fn value_types() {
        assert_eq!(Value::V128(7).ty(), ValType::V128);
        assert_eq!(Value::from_f64(1.5).ty(), ValType::F64);
    }
}
