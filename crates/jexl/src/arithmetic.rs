//! Operator semantics over mixed dynamic types.
//!
//! Binary operators resolve through a numeric tower: floating-point-like
//! operands compute as doubles, paired big integers stay big, big decimals
//! contaminate, and everything else computes as big integers with the result
//! narrowed back to `Int64` when it fits. Addition falls through to string
//! concatenation when an operand refuses to be a number.

use std::cmp::Ordering;
use std::str::FromStr;

use bigdecimal::{BigDecimal, RoundingMode};
use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{FromPrimitive, ToPrimitive, Zero};

use crate::{
    error::{ErrorKind, EvalResult, JexlError},
    value::Value,
};

/// The numeric classes recognised by narrowing and by method-argument
/// matching. Ordered from narrowest to widest; an integer class widens into
/// any later class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NumberClass {
    I8,
    I16,
    I32,
    I64,
    Big,
    F32,
    F64,
    BigDec,
}

impl NumberClass {
    /// Whether a value of class `self` may be passed where `target` is
    /// declared, allowing numeric widening but never shrinking.
    #[must_use]
    pub fn widens_to(self, target: Self) -> bool {
        self <= target
    }
}

#[derive(Debug, Clone, Copy)]
enum NumOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

/// The operator engine. `strict` controls the null policy: strict activations
/// fail on null operands, lenient ones coerce null to zero or the empty
/// string.
#[derive(Debug, Clone, Copy)]
pub struct Arithmetic {
    strict: bool,
}

impl Arithmetic {
    #[must_use]
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    #[must_use]
    pub fn strict(&self) -> bool {
        self.strict
    }

    // --- binary operators ---

    pub fn add(&self, left: &Value, right: &Value) -> EvalResult<Value> {
        self.tower(NumOp::Add, left, right)
    }

    pub fn sub(&self, left: &Value, right: &Value) -> EvalResult<Value> {
        self.tower(NumOp::Sub, left, right)
    }

    pub fn mul(&self, left: &Value, right: &Value) -> EvalResult<Value> {
        self.tower(NumOp::Mul, left, right)
    }

    pub fn div(&self, left: &Value, right: &Value) -> EvalResult<Value> {
        self.tower(NumOp::Div, left, right)
    }

    pub fn rem(&self, left: &Value, right: &Value) -> EvalResult<Value> {
        self.tower(NumOp::Mod, left, right)
    }

    /// An operand computes as floating point when it already is a double or
    /// when it is a string shaped like one. Big decimals keep their own rung
    /// of the tower so decimal arithmetic stays exact.
    fn is_float_like(value: &Value) -> bool {
        match value {
            Value::Float64(_) => true,
            Value::Str(s) => s.contains(['.', 'e', 'E']),
            _ => false,
        }
    }

    fn tower(&self, op: NumOp, left: &Value, right: &Value) -> EvalResult<Value> {
        if left.is_null() || right.is_null() {
            if self.strict {
                return Err(JexlError::new(ErrorKind::NullOperand));
            }
            if left.is_null() && right.is_null() {
                return Ok(Value::Int64(0));
            }
        }

        if Self::is_float_like(left) || Self::is_float_like(right) {
            return match (self.to_f64(left), self.to_f64(right)) {
                (Ok(a), Ok(b)) => self.float_op(op, a, b),
                (Err(e), _) | (_, Err(e)) => self.concat_fallback(op, left, right, e),
            };
        }

        let both_big = matches!((left, right), (Value::BigInt(_), Value::BigInt(_)));
        if !both_big && (matches!(left, Value::BigDec(_)) || matches!(right, Value::BigDec(_))) {
            return match (self.to_bigdec(left), self.to_bigdec(right)) {
                (Ok(a), Ok(b)) => self.decimal_op(op, &a, &b),
                (Err(e), _) | (_, Err(e)) => self.concat_fallback(op, left, right, e),
            };
        }

        match (self.to_bigint(left), self.to_bigint(right)) {
            (Ok(a), Ok(b)) => {
                let result = self.bigint_op(op, &a, &b)?;
                if both_big {
                    Ok(Value::BigInt(result))
                } else {
                    Ok(narrow_bigint(result))
                }
            }
            (Err(e), _) | (_, Err(e)) => self.concat_fallback(op, left, right, e),
        }
    }

    /// Addition treats an unconvertible operand as a request for string
    /// concatenation; every other operator surfaces the coercion failure.
    fn concat_fallback(&self, op: NumOp, left: &Value, right: &Value, err: JexlError) -> EvalResult<Value> {
        if matches!(op, NumOp::Add) && matches!(err.kind, ErrorKind::NumberFormat { .. }) {
            let mut out = left.display_string();
            out.push_str(&right.display_string());
            return Ok(Value::Str(out));
        }
        Err(err)
    }

    fn float_op(&self, op: NumOp, a: f64, b: f64) -> EvalResult<Value> {
        let result = match op {
            NumOp::Add => a + b,
            NumOp::Sub => a - b,
            NumOp::Mul => a * b,
            NumOp::Div | NumOp::Mod if b == 0.0 => {
                if self.strict {
                    return Err(JexlError::new(ErrorKind::DivideByZero));
                }
                // lenient: hand back the (signed) zero divisor
                return Ok(Value::Float64(b));
            }
            NumOp::Div => a / b,
            NumOp::Mod => a % b,
        };
        Ok(Value::Float64(result))
    }

    fn decimal_op(&self, op: NumOp, a: &BigDecimal, b: &BigDecimal) -> EvalResult<Value> {
        let result = match op {
            NumOp::Add => a + b,
            NumOp::Sub => a - b,
            NumOp::Mul => a * b,
            NumOp::Div => {
                if b.is_zero() {
                    return Err(JexlError::new(ErrorKind::DivideByZero));
                }
                let scale = (a.fractional_digit_count() + b.fractional_digit_count()).max(0);
                (a / b).with_scale_round(scale, RoundingMode::HalfUp)
            }
            NumOp::Mod => {
                if b.is_zero() {
                    return Err(JexlError::new(ErrorKind::DivideByZero));
                }
                // divide-then-subtract with a truncated quotient keeps the
                // dividend's sign
                let quotient = (a / b).with_scale_round(0, RoundingMode::Down);
                a - &quotient * b
            }
        };
        Ok(Value::BigDec(result))
    }

    fn bigint_op(&self, op: NumOp, a: &BigInt, b: &BigInt) -> EvalResult<BigInt> {
        let result = match op {
            NumOp::Add => a + b,
            NumOp::Sub => a - b,
            NumOp::Mul => a * b,
            NumOp::Div | NumOp::Mod if b.is_zero() => {
                return Err(JexlError::new(ErrorKind::DivideByZero));
            }
            NumOp::Div => {
                let (quotient, _) = a.div_rem(b);
                quotient
            }
            NumOp::Mod => {
                let (_, remainder) = a.div_rem(b);
                remainder
            }
        };
        Ok(result)
    }

    // --- unary operators ---

    /// Negation keeps the operand's concrete type, widening only when the
    /// negated payload does not fit (e.g. `-Int32::MIN`).
    pub fn neg(&self, value: &Value) -> EvalResult<Value> {
        match value {
            Value::Null => {
                if self.strict {
                    Err(JexlError::new(ErrorKind::NullOperand))
                } else {
                    Ok(Value::Int64(0))
                }
            }
            Value::Int32(v) => Ok(v.checked_neg().map_or_else(|| Value::Int64(-i64::from(*v)), Value::Int32)),
            Value::Int64(v) => Ok(v
                .checked_neg()
                .map_or_else(|| Value::BigInt(-BigInt::from(*v)), Value::Int64)),
            Value::BigInt(v) => Ok(Value::BigInt(-v)),
            Value::Float64(v) => Ok(Value::Float64(-v)),
            Value::BigDec(v) => Ok(Value::BigDec(-v)),
            Value::Char(c) => Ok(Value::Int32(-(*c as i32))),
            Value::Str(s) => {
                if Self::is_float_like(value) {
                    Ok(Value::Float64(-self.to_f64(value)?))
                } else if let Ok(v) = s.trim().parse::<i64>() {
                    Ok(Value::Int64(-v))
                } else {
                    Err(JexlError::new(ErrorKind::NumberFormat { image: s.clone() }))
                }
            }
            _ => Err(JexlError::new(ErrorKind::TypeCoercion {
                from: value.kind(),
                to: "number",
            })),
        }
    }

    /// Logical complement of the boolean coercion.
    pub fn not(&self, value: &Value) -> EvalResult<Value> {
        Ok(Value::Bool(!self.to_bool(value)?))
    }

    // --- bitwise operators (long semantics) ---

    pub fn bit_and(&self, left: &Value, right: &Value) -> EvalResult<Value> {
        Ok(Value::Int64(self.to_i64(left)? & self.to_i64(right)?))
    }

    pub fn bit_or(&self, left: &Value, right: &Value) -> EvalResult<Value> {
        Ok(Value::Int64(self.to_i64(left)? | self.to_i64(right)?))
    }

    pub fn bit_xor(&self, left: &Value, right: &Value) -> EvalResult<Value> {
        Ok(Value::Int64(self.to_i64(left)? ^ self.to_i64(right)?))
    }

    pub fn bit_not(&self, value: &Value) -> EvalResult<Value> {
        Ok(Value::Int64(!self.to_i64(value)?))
    }

    // --- comparison family ---

    /// Value equality for the language's `==`. Null-safe in both modes: two
    /// nulls are equal, one null never equals a non-null.
    pub fn eq(&self, left: &Value, right: &Value) -> EvalResult<bool> {
        match (left, right) {
            (Value::Null, Value::Null) => return Ok(true),
            (Value::Null, _) | (_, Value::Null) => return Ok(false),
            _ => {}
        }
        if std::mem::discriminant(left) == std::mem::discriminant(right) {
            return Ok(left == right);
        }
        if matches!(left, Value::BigDec(_)) || matches!(right, Value::BigDec(_)) {
            return Ok(self.to_bigdec(left)? == self.to_bigdec(right)?);
        }
        if matches!(left, Value::Float64(_)) || matches!(right, Value::Float64(_)) {
            return Ok(self.to_f64(left)? == self.to_f64(right)?);
        }
        // paired big integers were caught by the same-class check; a lone one
        // compares exactly rather than through a lossy long cast
        if matches!(left, Value::BigInt(_)) || matches!(right, Value::BigInt(_)) {
            return Ok(self.to_bigint(left)? == self.to_bigint(right)?);
        }
        if is_integral(left) || is_integral(right) {
            return Ok(self.to_i64(left)? == self.to_i64(right)?);
        }
        if matches!(left, Value::Bool(_)) || matches!(right, Value::Bool(_)) {
            return Ok(self.to_bool(left)? == self.to_bool(right)?);
        }
        if matches!(left, Value::Str(_)) || matches!(right, Value::Str(_)) {
            return Ok(left.display_string() == right.display_string());
        }
        Ok(left == right)
    }

    pub fn ne(&self, left: &Value, right: &Value) -> EvalResult<bool> {
        Ok(!self.eq(left, right)?)
    }

    /// Strict ordering for the language's `<`, following the numeric ladder,
    /// then lexicographic strings, then a host comparator hook.
    pub fn lt(&self, left: &Value, right: &Value) -> EvalResult<bool> {
        if left.is_null() || right.is_null() {
            if self.strict {
                return Err(JexlError::new(ErrorKind::NullOperand));
            }
            if left.is_null() && right.is_null() {
                return Ok(false);
            }
        }
        if matches!(left, Value::BigDec(_)) || matches!(right, Value::BigDec(_)) {
            return Ok(self.to_bigdec(left)? < self.to_bigdec(right)?);
        }
        if matches!(left, Value::Float64(_)) || matches!(right, Value::Float64(_)) {
            return Ok(self.to_f64(left)? < self.to_f64(right)?);
        }
        if matches!(left, Value::BigInt(_)) || matches!(right, Value::BigInt(_)) {
            return Ok(self.to_bigint(left)? < self.to_bigint(right)?);
        }
        if is_integral(left) || is_integral(right) || left.is_null() || right.is_null() {
            return Ok(self.to_i64(left)? < self.to_i64(right)?);
        }
        if let (Value::Str(a), Value::Str(b)) = (left, right) {
            return Ok(a < b);
        }
        if let Some(ordering) = self.host_compare(left, right) {
            return Ok(ordering == Ordering::Less);
        }
        Err(JexlError::new(ErrorKind::InvalidComparison {
            left: left.kind(),
            right: right.kind(),
        }))
    }

    pub fn gt(&self, left: &Value, right: &Value) -> EvalResult<bool> {
        Ok(!self.eq(left, right)? && !self.lt(left, right)?)
    }

    pub fn le(&self, left: &Value, right: &Value) -> EvalResult<bool> {
        Ok(self.eq(left, right)? || self.lt(left, right)?)
    }

    pub fn ge(&self, left: &Value, right: &Value) -> EvalResult<bool> {
        Ok(self.eq(left, right)? || self.gt(left, right)?)
    }

    /// Host comparator fallback, left side queried first.
    fn host_compare(&self, left: &Value, right: &Value) -> Option<Ordering> {
        if let Value::Host(h) = left
            && let Some(ordering) = h.compare(right)
        {
            return Some(ordering);
        }
        if let Value::Host(h) = right {
            return h.compare(left).map(Ordering::reverse);
        }
        None
    }

    // --- coercions ---

    /// Boolean coercion: null is false, strings follow `"true"`
    /// (case-insensitive), anything else has no boolean meaning.
    pub fn to_bool(&self, value: &Value) -> EvalResult<bool> {
        match value {
            Value::Null => Ok(false),
            Value::Bool(b) => Ok(*b),
            Value::Str(s) => Ok(s.eq_ignore_ascii_case("true")),
            _ => Err(JexlError::new(ErrorKind::TypeCoercion {
                from: value.kind(),
                to: "boolean",
            })),
        }
    }

    pub fn to_i32(&self, value: &Value) -> EvalResult<i32> {
        Ok(self.to_i64(value)? as i32)
    }

    pub fn to_i64(&self, value: &Value) -> EvalResult<i64> {
        match value {
            Value::Null => {
                if self.strict {
                    Err(JexlError::new(ErrorKind::NullOperand))
                } else {
                    Ok(0)
                }
            }
            Value::Int32(v) => Ok(i64::from(*v)),
            Value::Int64(v) => Ok(*v),
            Value::BigInt(v) => v
                .to_i64()
                .ok_or_else(|| JexlError::new(ErrorKind::NumberFormat { image: v.to_string() })),
            Value::Float64(v) => Ok(*v as i64),
            Value::BigDec(v) => v
                .to_i64()
                .ok_or_else(|| JexlError::new(ErrorKind::NumberFormat { image: v.to_string() })),
            Value::Char(c) => Ok(i64::from(*c as u32)),
            Value::Str(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Ok(0);
                }
                if let Ok(v) = trimmed.parse::<i64>() {
                    return Ok(v);
                }
                // tolerate decimal-shaped strings by truncating
                trimmed
                    .parse::<f64>()
                    .map(|v| v as i64)
                    .map_err(|_| JexlError::new(ErrorKind::NumberFormat { image: s.clone() }))
            }
            _ => Err(JexlError::new(ErrorKind::TypeCoercion {
                from: value.kind(),
                to: "long",
            })),
        }
    }

    pub fn to_f64(&self, value: &Value) -> EvalResult<f64> {
        match value {
            Value::Null => {
                if self.strict {
                    Err(JexlError::new(ErrorKind::NullOperand))
                } else {
                    Ok(0.0)
                }
            }
            Value::Int32(v) => Ok(f64::from(*v)),
            Value::Int64(v) => Ok(*v as f64),
            Value::BigInt(v) => Ok(v.to_f64().unwrap_or(f64::INFINITY)),
            Value::Float64(v) => Ok(*v),
            Value::BigDec(v) => v
                .to_f64()
                .ok_or_else(|| JexlError::new(ErrorKind::NumberFormat { image: v.to_string() })),
            Value::Char(c) => Ok(f64::from(*c as u32)),
            Value::Str(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Ok(0.0);
                }
                trimmed
                    .parse::<f64>()
                    .map_err(|_| JexlError::new(ErrorKind::NumberFormat { image: s.clone() }))
            }
            _ => Err(JexlError::new(ErrorKind::TypeCoercion {
                from: value.kind(),
                to: "double",
            })),
        }
    }

    pub fn to_bigint(&self, value: &Value) -> EvalResult<BigInt> {
        match value {
            Value::Null => {
                if self.strict {
                    Err(JexlError::new(ErrorKind::NullOperand))
                } else {
                    Ok(BigInt::from(0))
                }
            }
            Value::Int32(v) => Ok(BigInt::from(*v)),
            Value::Int64(v) => Ok(BigInt::from(*v)),
            Value::BigInt(v) => Ok(v.clone()),
            Value::Float64(v) => BigInt::from_f64(v.trunc())
                .ok_or_else(|| JexlError::new(ErrorKind::NumberFormat { image: v.to_string() })),
            Value::BigDec(v) => {
                let (int, _) = v.with_scale_round(0, RoundingMode::Down).into_bigint_and_exponent();
                Ok(int)
            }
            Value::Char(c) => Ok(BigInt::from(*c as u32)),
            Value::Str(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Ok(BigInt::from(0));
                }
                BigInt::from_str(trimmed).map_err(|_| JexlError::new(ErrorKind::NumberFormat { image: s.clone() }))
            }
            _ => Err(JexlError::new(ErrorKind::TypeCoercion {
                from: value.kind(),
                to: "big integer",
            })),
        }
    }

    pub fn to_bigdec(&self, value: &Value) -> EvalResult<BigDecimal> {
        match value {
            Value::Null => {
                if self.strict {
                    Err(JexlError::new(ErrorKind::NullOperand))
                } else {
                    Ok(BigDecimal::zero())
                }
            }
            Value::Int32(v) => Ok(BigDecimal::from(*v)),
            Value::Int64(v) => Ok(BigDecimal::from(*v)),
            Value::BigInt(v) => Ok(BigDecimal::from(v.clone())),
            Value::Float64(v) => BigDecimal::from_f64(*v)
                .ok_or_else(|| JexlError::new(ErrorKind::NumberFormat { image: v.to_string() })),
            Value::BigDec(v) => Ok(v.clone()),
            Value::Char(c) => Ok(BigDecimal::from(u64::from(*c as u32))),
            Value::Str(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Ok(BigDecimal::zero());
                }
                BigDecimal::from_str(trimmed)
                    .map_err(|_| JexlError::new(ErrorKind::NumberFormat { image: s.clone() }))
            }
            _ => Err(JexlError::new(ErrorKind::TypeCoercion {
                from: value.kind(),
                to: "big decimal",
            })),
        }
    }

    /// String coercion is total: null renders as the empty string.
    #[must_use]
    pub fn to_str(&self, value: &Value) -> String {
        value.display_string()
    }

    // --- narrowing ---

    /// Replaces a numeric value with the smallest variant whose domain still
    /// contains it. Characters narrow to their integer code. Non-numeric
    /// values pass through untouched, making this a total function.
    #[must_use]
    pub fn narrow(&self, value: &Value) -> Value {
        match value {
            Value::Int64(v) => i32::try_from(*v).map_or_else(|_| value.clone(), Value::Int32),
            Value::BigInt(big) => match big.to_i64() {
                Some(v) => self.narrow(&Value::Int64(v)),
                None => value.clone(),
            },
            Value::Char(c) => Value::Int32(*c as i32),
            _ => value.clone(),
        }
    }

    /// The smallest [`NumberClass`] whose range contains the value, used for
    /// method-argument matching. Returns `None` for non-numeric values.
    #[must_use]
    pub fn narrow_class(&self, value: &Value) -> Option<NumberClass> {
        match value {
            Value::Int32(v) => Some(narrow_i64_class(i64::from(*v))),
            Value::Int64(v) => Some(narrow_i64_class(*v)),
            Value::BigInt(big) => Some(big.to_i64().map_or(NumberClass::Big, narrow_i64_class)),
            Value::Float64(v) => {
                if v.abs() <= f64::from(f32::MAX) {
                    Some(NumberClass::F32)
                } else {
                    Some(NumberClass::F64)
                }
            }
            Value::BigDec(v) => match v.to_f32() {
                Some(f) if f.is_finite() => Some(NumberClass::F32),
                _ => Some(NumberClass::BigDec),
            },
            Value::Char(c) => Some(narrow_i64_class(i64::from(*c as u32))),
            _ => None,
        }
    }

    /// The class a value naturally belongs to before narrowing.
    #[must_use]
    pub fn natural_class(&self, value: &Value) -> Option<NumberClass> {
        match value {
            Value::Int32(_) => Some(NumberClass::I32),
            Value::Int64(_) => Some(NumberClass::I64),
            Value::BigInt(_) => Some(NumberClass::Big),
            Value::Float64(_) => Some(NumberClass::F64),
            Value::BigDec(_) => Some(NumberClass::BigDec),
            _ => None,
        }
    }
}

fn is_integral(value: &Value) -> bool {
    matches!(value, Value::Int32(_) | Value::Int64(_) | Value::Char(_))
}

fn narrow_i64_class(v: i64) -> NumberClass {
    if i8::try_from(v).is_ok() {
        NumberClass::I8
    } else if i16::try_from(v).is_ok() {
        NumberClass::I16
    } else if i32::try_from(v).is_ok() {
        NumberClass::I32
    } else {
        NumberClass::I64
    }
}

/// Narrows an exact big-integer result back to `Int64` when it fits; the
/// default rung of the tower never produces anything smaller.
fn narrow_bigint(big: BigInt) -> Value {
    match big.to_i64() {
        Some(v) => Value::Int64(v),
        None => Value::BigInt(big),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn lenient() -> Arithmetic {
        Arithmetic::new(false)
    }

    fn strict() -> Arithmetic {
        Arithmetic::new(true)
    }

    fn dec(s: &str) -> Value {
        Value::BigDec(BigDecimal::from_str(s).unwrap())
    }

    // === numeric tower ===

    #[test]
    fn int_add_narrows_to_long() {
        let result = lenient().add(&Value::Int32(1), &Value::Int32(2)).unwrap();
        assert_eq!(result, Value::Int64(3));
    }

    #[test]
    fn long_overflow_stays_big() {
        let result = lenient().add(&Value::Int64(i64::MAX), &Value::Int64(1)).unwrap();
        assert_eq!(result, Value::BigInt(BigInt::from(i64::MAX) + 1));
    }

    #[test]
    fn long_range_result_fits_in_long() {
        let result = lenient().add(&Value::Int64(2_147_483_648), &Value::Int32(1)).unwrap();
        assert_eq!(result, Value::Int64(2_147_483_649));
    }

    #[test]
    fn paired_big_integers_stay_big() {
        let result = lenient()
            .add(&Value::BigInt(BigInt::from(2)), &Value::BigInt(BigInt::from(3)))
            .unwrap();
        assert_eq!(result, Value::BigInt(BigInt::from(5)));
    }

    #[test]
    fn float_contaminates() {
        let result = lenient().mul(&Value::Int32(2), &Value::Float64(1.5)).unwrap();
        assert_eq!(result, Value::Float64(3.0));
    }

    #[test]
    fn float_like_string_computes_as_double() {
        let result = lenient().add(&Value::from("1.5"), &Value::Int32(1)).unwrap();
        assert_eq!(result, Value::Float64(2.5));
    }

    #[test]
    fn numeric_strings_compute_as_integers() {
        let result = lenient().add(&Value::from("1"), &Value::from("2")).unwrap();
        assert_eq!(result, Value::Int64(3));
    }

    #[test]
    fn add_falls_through_to_concat() {
        let result = lenient().add(&Value::from("foo"), &Value::Int32(2)).unwrap();
        assert_eq!(result, Value::Str("foo2".to_owned()));
    }

    #[test]
    fn sub_does_not_concat() {
        let err = lenient().sub(&Value::from("foo"), &Value::Int32(2)).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::NumberFormat { .. }));
    }

    #[test]
    fn decimal_division_rounds_half_up_at_combined_scale() {
        let result = lenient().div(&dec("1.0"), &dec("3.0")).unwrap();
        assert_eq!(result, dec("0.33"));
    }

    #[test]
    fn decimal_modulus_keeps_dividend_sign() {
        assert_eq!(lenient().rem(&dec("-7.5"), &Value::Int32(2)).unwrap(), dec("-1.5"));
        assert_eq!(lenient().rem(&dec("7.5"), &Value::Int32(-2)).unwrap(), dec("1.5"));
    }

    // === null policy ===

    #[test]
    fn lenient_null_null_is_long_zero() {
        for op in ["add", "sub", "mul", "div", "rem"] {
            let a = lenient();
            let result = match op {
                "add" => a.add(&Value::Null, &Value::Null),
                "sub" => a.sub(&Value::Null, &Value::Null),
                "mul" => a.mul(&Value::Null, &Value::Null),
                "div" => a.div(&Value::Null, &Value::Null),
                _ => a.rem(&Value::Null, &Value::Null),
            };
            assert_eq!(result.unwrap(), Value::Int64(0), "op {op}");
        }
    }

    #[test]
    fn lenient_null_coerces_to_zero() {
        let result = lenient().add(&Value::Null, &Value::Int32(1)).unwrap();
        assert_eq!(result, Value::Int64(1));
    }

    #[test]
    fn strict_null_operand_fails() {
        let err = strict().add(&Value::Null, &Value::Int32(1)).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::NullOperand));
    }

    // === division by zero ===

    #[test]
    fn integer_divide_by_zero_always_fails() {
        let err = lenient().div(&Value::Int32(1), &Value::Int32(0)).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::DivideByZero));
    }

    #[test]
    fn float_divide_by_zero_is_lenient() {
        let result = lenient().div(&Value::Float64(1.0), &Value::Float64(0.0)).unwrap();
        assert_eq!(result, Value::Float64(0.0));
        let err = strict().div(&Value::Float64(1.0), &Value::Float64(0.0)).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::DivideByZero));
    }

    // === comparison ladder ===

    #[test]
    fn eq_is_null_safe() {
        assert!(lenient().eq(&Value::Null, &Value::Null).unwrap());
        assert!(!lenient().eq(&Value::Null, &Value::Int32(0)).unwrap());
        assert!(strict().eq(&Value::Null, &Value::Null).unwrap());
    }

    #[test]
    fn eq_coerces_across_numeric_kinds() {
        assert!(lenient().eq(&Value::Int32(2), &Value::Int64(2)).unwrap());
        assert!(lenient().eq(&Value::Int32(2), &Value::Float64(2.0)).unwrap());
        assert!(lenient().eq(&Value::Int32(2), &Value::from("2")).unwrap());
        assert!(lenient().eq(&Value::Char('a'), &Value::Int32(97)).unwrap());
    }

    #[test]
    fn eq_booleans_against_strings() {
        assert!(lenient().eq(&Value::Bool(true), &Value::from("TRUE")).unwrap());
        assert!(!lenient().eq(&Value::Bool(true), &Value::from("no")).unwrap());
    }

    #[test]
    fn lt_numeric_and_lexicographic() {
        assert!(lenient().lt(&Value::Int32(2), &Value::from("10")).unwrap());
        assert!(lenient().lt(&Value::from("abc"), &Value::from("abd")).unwrap());
        // two strings compare as strings even when they look numeric
        assert!(lenient().lt(&Value::from("10"), &Value::from("9")).unwrap());
    }

    #[test]
    fn derived_comparisons() {
        let a = lenient();
        assert!(a.gt(&Value::Int32(3), &Value::Int32(2)).unwrap());
        assert!(a.le(&Value::Int32(2), &Value::Int32(2)).unwrap());
        assert!(a.ge(&Value::Int32(2), &Value::Int32(2)).unwrap());
        assert!(a.ne(&Value::Int32(2), &Value::Int32(3)).unwrap());
    }

    #[test]
    fn incomparable_values_fail() {
        let err = lenient()
            .lt(&Value::seq(vec![]), &Value::map_from([]))
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::InvalidComparison { .. }));
    }

    // === narrowing ===

    #[test]
    fn narrow_finds_smallest_variant() {
        let a = lenient();
        assert_eq!(a.narrow(&Value::Int64(7)), Value::Int32(7));
        assert_eq!(a.narrow(&Value::Int64(i64::MAX)), Value::Int64(i64::MAX));
        assert_eq!(a.narrow(&Value::BigInt(BigInt::from(5))), Value::Int32(5));
        assert_eq!(a.narrow(&Value::Char('a')), Value::Int32(97));
    }

    #[test]
    fn narrow_class_ladder() {
        let a = lenient();
        assert_eq!(a.narrow_class(&Value::Int32(5)), Some(NumberClass::I8));
        assert_eq!(a.narrow_class(&Value::Int64(40_000)), Some(NumberClass::I32));
        assert_eq!(a.narrow_class(&Value::Float64(1.5)), Some(NumberClass::F32));
        assert!(NumberClass::I8.widens_to(NumberClass::I64));
        assert!(!NumberClass::I64.widens_to(NumberClass::I32));
    }

    // === unary ===

    #[test]
    fn neg_keeps_concrete_type() {
        let a = lenient();
        assert_eq!(a.neg(&Value::Int32(5)).unwrap(), Value::Int32(-5));
        assert_eq!(a.neg(&Value::Int32(i32::MIN)).unwrap(), Value::Int64(-(i64::from(i32::MIN))));
        assert_eq!(a.neg(&Value::Float64(1.5)).unwrap(), Value::Float64(-1.5));
        assert_eq!(a.neg(&Value::Char('a')).unwrap(), Value::Int32(-97));
    }

    #[test]
    fn bitwise_uses_long_semantics() {
        let a = lenient();
        assert_eq!(a.bit_and(&Value::Int32(6), &Value::Int32(3)).unwrap(), Value::Int64(2));
        assert_eq!(a.bit_or(&Value::Int32(6), &Value::Int32(3)).unwrap(), Value::Int64(7));
        assert_eq!(a.bit_xor(&Value::Int32(6), &Value::Int32(3)).unwrap(), Value::Int64(5));
        assert_eq!(a.bit_not(&Value::Int32(0)).unwrap(), Value::Int64(-1));
        let err = a.bit_and(&Value::Bool(true), &Value::Int32(1)).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::TypeCoercion { .. }));
    }
}
