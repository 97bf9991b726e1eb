use std::{
    cell::RefCell,
    collections::hash_map::DefaultHasher,
    fmt::{self, Write},
    hash::{Hash, Hasher},
    rc::Rc,
};

use bigdecimal::BigDecimal;
use indexmap::IndexMap;
use num_bigint::BigInt;
use strum::{Display, IntoStaticStr};

use crate::uberspect::HostObject;

/// Primary value type representing JEXL data at runtime.
///
/// Small scalar values are stored inline. `Seq`, `Map`, `Iter` and `Host` are
/// shared handles whose mutability is owned outside the value itself; an
/// evaluation activation is single-threaded, so interior mutability through
/// `RefCell` is sufficient.
///
/// Equality on this type is *identity* equality: same variant and structurally
/// equal payload, with floats compared bit-exact and `Iter`/`Host` compared by
/// reference. The language-level `==` operator lives in [`crate::Arithmetic`]
/// and follows a coercing ladder instead.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    /// Arbitrary-precision integer, produced by literals and arithmetic that
    /// overflow the 64-bit range.
    BigInt(BigInt),
    Float64(f64),
    /// Arbitrary-precision decimal.
    BigDec(BigDecimal),
    Char(char),
    Str(String),
    /// Ordered sequence of values. Shared; mutation is visible through every
    /// handle.
    Seq(Rc<RefCell<Vec<Value>>>),
    /// Value-keyed mapping. Insertion order is preserved for iteration
    /// fairness only and is not otherwise observable.
    Map(Rc<RefCell<IndexMap<Value, Value>>>),
    /// A lazy sequence. Consuming it through one handle consumes it for all.
    Iter(Rc<RefCell<ValueIter>>),
    /// Opaque reference to a host object, accessed through the Uberspect.
    Host(Rc<dyn HostObject>),
}

/// Discriminant-only view of a [`Value`], used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
pub enum ValueKind {
    #[strum(serialize = "null")]
    Null,
    #[strum(serialize = "boolean")]
    Bool,
    #[strum(serialize = "int")]
    Int32,
    #[strum(serialize = "long")]
    Int64,
    #[strum(serialize = "big integer")]
    BigInt,
    #[strum(serialize = "double")]
    Float64,
    #[strum(serialize = "big decimal")]
    BigDec,
    #[strum(serialize = "char")]
    Char,
    #[strum(serialize = "string")]
    Str,
    #[strum(serialize = "sequence")]
    Seq,
    #[strum(serialize = "map")]
    Map,
    #[strum(serialize = "iterator")]
    Iter,
    #[strum(serialize = "host object")]
    Host,
}

/// A boxed lazy sequence of values.
pub struct ValueIter {
    inner: Box<dyn Iterator<Item = Value>>,
}

impl ValueIter {
    pub fn new(inner: impl Iterator<Item = Value> + 'static) -> Self {
        Self { inner: Box::new(inner) }
    }
}

impl Iterator for ValueIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        self.inner.next()
    }
}

impl fmt::Debug for ValueIter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ValueIter(..)")
    }
}

impl Value {
    /// Builds a shared sequence from owned elements.
    pub fn seq(elements: Vec<Value>) -> Self {
        Self::Seq(Rc::new(RefCell::new(elements)))
    }

    /// Builds a shared map from key/value pairs, later keys overwriting
    /// earlier ones.
    pub fn map_from(pairs: impl IntoIterator<Item = (Value, Value)>) -> Self {
        Self::Map(Rc::new(RefCell::new(pairs.into_iter().collect())))
    }

    /// Wraps a host object.
    pub fn host(object: impl HostObject + 'static) -> Self {
        Self::Host(Rc::new(object))
    }

    /// Wraps a lazy iterator.
    pub fn iter_from(inner: impl Iterator<Item = Value> + 'static) -> Self {
        Self::Iter(Rc::new(RefCell::new(ValueIter::new(inner))))
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int32(_) => ValueKind::Int32,
            Self::Int64(_) => ValueKind::Int64,
            Self::BigInt(_) => ValueKind::BigInt,
            Self::Float64(_) => ValueKind::Float64,
            Self::BigDec(_) => ValueKind::BigDec,
            Self::Char(_) => ValueKind::Char,
            Self::Str(_) => ValueKind::Str,
            Self::Seq(_) => ValueKind::Seq,
            Self::Map(_) => ValueKind::Map,
            Self::Iter(_) => ValueKind::Iter,
            Self::Host(_) => ValueKind::Host,
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.kind().into()
    }

    /// Renders the value the way string coercion does: null becomes the empty
    /// string, sequences and maps render their elements recursively.
    #[must_use]
    pub fn display_string(&self) -> String {
        let mut out = String::new();
        self.write_display(&mut out);
        out
    }

    fn write_display(&self, out: &mut String) {
        match self {
            Self::Null => {}
            Self::Bool(b) => {
                let _ = write!(out, "{b}");
            }
            Self::Int32(v) => {
                let _ = write!(out, "{v}");
            }
            Self::Int64(v) => {
                let _ = write!(out, "{v}");
            }
            Self::BigInt(v) => {
                let _ = write!(out, "{v}");
            }
            // {:?} keeps a trailing ".0" on integral doubles, matching the
            // canonical rendering of double-typed results
            Self::Float64(v) => {
                let _ = write!(out, "{v:?}");
            }
            Self::BigDec(v) => {
                let _ = write!(out, "{v}");
            }
            Self::Char(c) => out.push(*c),
            Self::Str(s) => out.push_str(s),
            Self::Seq(seq) => {
                out.push('[');
                for (i, element) in seq.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    element.write_display(out);
                }
                out.push(']');
            }
            Self::Map(map) => {
                out.push('{');
                for (i, (key, value)) in map.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    key.write_display(out);
                    out.push('=');
                    value.write_display(out);
                }
                out.push('}');
            }
            Self::Iter(_) => out.push_str("<iterator>"),
            Self::Host(host) => out.push_str(&host.display()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Self::Int32(v) => f.debug_tuple("Int32").field(v).finish(),
            Self::Int64(v) => f.debug_tuple("Int64").field(v).finish(),
            Self::BigInt(v) => f.debug_tuple("BigInt").field(v).finish(),
            Self::Float64(v) => f.debug_tuple("Float64").field(v).finish(),
            Self::BigDec(v) => f.debug_tuple("BigDec").field(v).finish(),
            Self::Char(c) => f.debug_tuple("Char").field(c).finish(),
            Self::Str(s) => f.debug_tuple("Str").field(s).finish(),
            Self::Seq(seq) => f.debug_tuple("Seq").field(&seq.borrow()).finish(),
            Self::Map(map) => {
                let map = map.borrow();
                let mut dbg = f.debug_map();
                for (key, value) in map.iter() {
                    dbg.entry(key, value);
                }
                dbg.finish()
            }
            Self::Iter(_) => f.write_str("Iter(..)"),
            Self::Host(host) => write!(f, "Host({})", host.type_name()),
        }
    }
}

fn host_ptr(host: &Rc<dyn HostObject>) -> *const () {
    Rc::as_ptr(host) as *const ()
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int32(a), Self::Int32(b)) => a == b,
            (Self::Int64(a), Self::Int64(b)) => a == b,
            (Self::BigInt(a), Self::BigInt(b)) => a == b,
            // bit-exact so that identity equality stays a lawful Eq
            (Self::Float64(a), Self::Float64(b)) => a.to_bits() == b.to_bits(),
            (Self::BigDec(a), Self::BigDec(b)) => a == b,
            (Self::Char(a), Self::Char(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Seq(a), Self::Seq(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Self::Map(a), Self::Map(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Self::Iter(a), Self::Iter(b)) => Rc::ptr_eq(a, b),
            (Self::Host(a), Self::Host(b)) => match a.host_eq(b.as_ref()) {
                Some(eq) => eq,
                None => host_ptr(a) == host_ptr(b),
            },
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(b) => b.hash(state),
            Self::Int32(v) => v.hash(state),
            Self::Int64(v) => v.hash(state),
            Self::BigInt(v) => v.hash(state),
            Self::Float64(v) => v.to_bits().hash(state),
            Self::BigDec(v) => v.hash(state),
            Self::Char(c) => c.hash(state),
            Self::Str(s) => s.hash(state),
            Self::Seq(seq) => {
                for element in seq.borrow().iter() {
                    element.hash(state);
                }
            }
            Self::Map(map) => {
                // IndexMap equality ignores insertion order, so the hash must
                // be order-insensitive as well: combine per-entry hashes with
                // a commutative operation.
                let mut acc: u64 = 0;
                for (key, value) in map.borrow().iter() {
                    let mut entry_hasher = DefaultHasher::new();
                    key.hash(&mut entry_hasher);
                    value.hash(&mut entry_hasher);
                    acc = acc.wrapping_add(entry_hasher.finish());
                }
                state.write_u64(acc);
            }
            Self::Iter(it) => (Rc::as_ptr(it) as usize).hash(state),
            Self::Host(host) => (host_ptr(host) as usize).hash(state),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_equality_is_bit_exact_on_floats() {
        assert_eq!(Value::Float64(f64::NAN), Value::Float64(f64::NAN));
        assert_ne!(Value::Float64(0.0), Value::Float64(-0.0));
    }

    #[test]
    fn map_hash_ignores_insertion_order() {
        fn hash_of(v: &Value) -> u64 {
            let mut hasher = DefaultHasher::new();
            v.hash(&mut hasher);
            hasher.finish()
        }
        let a = Value::map_from([(Value::from("x"), Value::Int32(1)), (Value::from("y"), Value::Int32(2))]);
        let b = Value::map_from([(Value::from("y"), Value::Int32(2)), (Value::from("x"), Value::Int32(1))]);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn seq_equality_is_structural() {
        let a = Value::seq(vec![Value::Int32(1), Value::from("two")]);
        let b = Value::seq(vec![Value::Int32(1), Value::from("two")]);
        assert_eq!(a, b);
    }

    #[test]
    fn display_renders_collections() {
        let seq = Value::seq(vec![Value::Int32(1), Value::Int32(2)]);
        assert_eq!(seq.display_string(), "[1, 2]");
        assert_eq!(Value::Null.display_string(), "");
        assert_eq!(Value::Float64(7.0).display_string(), "7.0");
    }
}
