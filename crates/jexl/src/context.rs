use ahash::AHashMap;

use crate::{
    error::{ErrorKind, EvalResult, JexlError},
    value::Value,
};

/// A named-variable store evaluated expressions read from and assign into.
///
/// Contexts are owned by the caller and passed by mutable reference into each
/// evaluation; an evaluation never retains the context after returning.
pub trait JexlContext {
    /// Returns the variable's value, or `None` when the name is not bound.
    fn get(&self, name: &str) -> Option<Value>;

    /// Binds `name` to `value`. Immutable contexts reject this.
    fn set(&mut self, name: &str, value: Value) -> EvalResult<()>;

    /// Whether the name is bound at all (a binding to null still counts).
    fn has(&self, name: &str) -> bool;

    /// Iterates the bound variable names.
    fn vars(&self) -> Box<dyn Iterator<Item = &str> + '_>;
}

/// The standard mutable context backed by a hash map.
#[derive(Debug, Default)]
pub struct MapContext {
    vars: AHashMap<String, Value>,
}

impl MapContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a context from `(name, value)` pairs.
    pub fn with_vars(pairs: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            vars: pairs.into_iter().collect(),
        }
    }

    /// Convenience insertion that skips the `EvalResult` wrapper of the trait.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }
}

impl JexlContext for MapContext {
    fn get(&self, name: &str) -> Option<Value> {
        self.vars.get(name).cloned()
    }

    fn set(&mut self, name: &str, value: Value) -> EvalResult<()> {
        self.vars.insert(name.to_owned(), value);
        Ok(())
    }

    fn has(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    fn vars(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        Box::new(self.vars.keys().map(String::as_str))
    }
}

/// An immutable context with no variables. Assignments fail.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyContext;

impl JexlContext for EmptyContext {
    fn get(&self, _name: &str) -> Option<Value> {
        None
    }

    fn set(&mut self, _name: &str, _value: Value) -> EvalResult<()> {
        Err(JexlError::new(ErrorKind::BadAssignment {
            detail: "context is immutable",
        }))
    }

    fn has(&self, _name: &str) -> bool {
        false
    }

    fn vars(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        Box::new(std::iter::empty())
    }
}

/// The four-slot register array `[k0, v0, k1, v1]` attached to an activation
/// by the engine's property helpers. The reserved spellings `$0` and `$1`
/// resolve to the value slots without touching user variable space.
#[derive(Debug)]
pub(crate) struct Registers {
    slots: [Value; 4],
}

impl Registers {
    pub fn for_property(root: Value, value: Value) -> Self {
        Self {
            slots: [Value::from("$0"), root, Value::from("$1"), value],
        }
    }

    /// Resolves a reserved register identifier to its value slot.
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        if let Value::Str(k0) = &self.slots[0]
            && k0 == name
        {
            return Some(&self.slots[1]);
        }
        if let Value::Str(k1) = &self.slots[2]
            && k1 == name
        {
            return Some(&self.slots[3]);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_context_round_trips() {
        let mut ctx = MapContext::new();
        ctx.insert("a", Value::Int32(1));
        assert_eq!(ctx.get("a"), Some(Value::Int32(1)));
        assert!(ctx.has("a"));
        assert!(!ctx.has("b"));
        assert_eq!(ctx.vars().count(), 1);
    }

    #[test]
    fn empty_context_rejects_mutation() {
        let mut ctx = EmptyContext;
        assert!(ctx.set("a", Value::Null).is_err());
        assert_eq!(ctx.get("a"), None);
    }

    #[test]
    fn registers_resolve_reserved_names() {
        let regs = Registers::for_property(Value::Int32(42), Value::Null);
        assert_eq!(regs.lookup("$0"), Some(&Value::Int32(42)));
        assert_eq!(regs.lookup("$1"), Some(&Value::Null));
        assert_eq!(regs.lookup("$2"), None);
    }
}
