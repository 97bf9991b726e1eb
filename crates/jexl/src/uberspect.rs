//! Introspection boundary between the interpreter and host objects.
//!
//! The interpreter never looks inside a `Value::Host`; it asks an
//! [`Uberspect`] for properties, methods and iterators. The default
//! implementation is a registry of handles keyed by `(type id, name)` that the
//! host populates up front, with duck-typed fallback strategies tried in a
//! fixed order.

use std::{
    any::{Any, TypeId},
    cmp::Ordering,
    rc::Rc,
};

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::{
    arithmetic::{Arithmetic, NumberClass},
    ast::Span,
    error::{ErrorKind, EvalResult, JexlError},
    value::{Value, ValueIter},
};

/// An opaque host value surfaced to scripts.
///
/// The required methods are the identity hooks; the shape hooks default to
/// "not this shape" and are overridden by hosts whose objects behave like
/// maps, lists or iterables.
pub trait HostObject {
    /// Short name used in diagnostics.
    fn type_name(&self) -> &'static str;

    /// Downcast support for registry handles.
    fn as_any(&self) -> &dyn Any;

    /// Rendering used by string coercion.
    fn display(&self) -> String {
        format!("<{}>", self.type_name())
    }

    /// Keyed lookup for map-shaped hosts.
    fn get_key(&self, _key: &Value) -> Option<Value> {
        None
    }

    /// Keyed store for map-shaped hosts; returns false when unsupported.
    fn set_key(&self, _key: Value, _value: Value) -> bool {
        false
    }

    /// Indexed lookup for list-shaped hosts.
    fn get_index(&self, _index: usize) -> Option<Value> {
        None
    }

    /// Indexed store for list-shaped hosts; returns false when unsupported.
    fn set_index(&self, _index: usize, _value: Value) -> bool {
        false
    }

    /// Element count for sized hosts.
    fn len(&self) -> Option<usize> {
        None
    }

    /// Snapshot of the host's elements for iteration.
    fn iter_values(&self) -> Option<Vec<Value>> {
        None
    }

    /// Equality hook; `None` falls back to reference identity.
    fn host_eq(&self, _other: &dyn HostObject) -> Option<bool> {
        None
    }

    /// Ordering hook used by the `<`-family comparison fallback.
    fn compare(&self, _other: &Value) -> Option<Ordering> {
        None
    }
}

/// Declared parameter class of a registered method, used for overload
/// matching with numeric widening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamClass {
    /// Accepts any value.
    Any,
    Bool,
    Str,
    Char,
    /// Accepts numeric values whose class widens into the declared one.
    Number(NumberClass),
}

impl ParamClass {
    fn accepts(self, arithmetic: &Arithmetic, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::Bool => matches!(value, Value::Bool(_)),
            Self::Str => matches!(value, Value::Str(_)),
            Self::Char => matches!(value, Value::Char(_)),
            Self::Number(declared) => arithmetic
                .natural_class(value)
                .is_some_and(|natural| natural.widens_to(declared)),
        }
    }
}

type MethodFn = dyn Fn(&dyn HostObject, &[Value]) -> EvalResult<Value>;
type GetterFn = dyn Fn(&dyn HostObject) -> EvalResult<Value>;
type SetterFn = dyn Fn(&dyn HostObject, Value) -> EvalResult<()>;

struct MethodSpec {
    name: String,
    params: SmallVec<[ParamClass; 4]>,
    func: Rc<MethodFn>,
}

/// An opaque, invokable handle resolved by [`Uberspect::find_method`].
#[derive(Clone)]
pub struct MethodHandle(Rc<MethodSpec>);

impl std::fmt::Debug for MethodHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MethodHandle({})", self.0.name)
    }
}

/// The five operations the interpreter needs from the host boundary. The
/// `info` span is used only for diagnostics.
pub trait Uberspect {
    fn get_property(&self, host: &Value, name: &Value, info: Span) -> EvalResult<Value>;

    fn set_property(&self, host: &Value, name: &Value, value: Value, info: Span) -> EvalResult<()>;

    /// Builds an iterator over the value, or `None` when it is not iterable.
    fn get_iterator(&self, value: &Value, info: Span) -> EvalResult<Option<ValueIter>>;

    /// Resolves a method by name and argument profile. `None` means no
    /// candidate matched; the caller may narrow numeric arguments and retry.
    fn find_method(&self, host: &Value, name: &str, args: &[Value], info: Span)
    -> EvalResult<Option<MethodHandle>>;

    fn invoke(&self, handle: &MethodHandle, host: &Value, args: &[Value], info: Span) -> EvalResult<Value>;
}

type Key = (TypeId, String);

/// Registry-backed [`Uberspect`]. Hosts register getter/setter/method handles
/// per concrete type; unregistered access falls through the duck-typed
/// strategies of the host object itself.
#[derive(Default)]
pub struct RegistryUberspect {
    getters: AHashMap<Key, Rc<GetterFn>>,
    bool_getters: AHashMap<Key, Rc<GetterFn>>,
    setters: AHashMap<Key, Rc<SetterFn>>,
    methods: AHashMap<Key, Vec<MethodHandle>>,
}

impl RegistryUberspect {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a "get"-style property accessor for `T`.
    pub fn register_getter<T: HostObject + 'static>(
        &mut self,
        property: &str,
        getter: impl Fn(&T) -> EvalResult<Value> + 'static,
    ) {
        self.getters
            .insert((TypeId::of::<T>(), property.to_owned()), wrap_getter(getter));
    }

    /// Registers a boolean "is"-style accessor for `T`, consulted after the
    /// plain getters.
    pub fn register_bool_getter<T: HostObject + 'static>(
        &mut self,
        property: &str,
        getter: impl Fn(&T) -> EvalResult<Value> + 'static,
    ) {
        self.bool_getters
            .insert((TypeId::of::<T>(), property.to_owned()), wrap_getter(getter));
    }

    /// Registers a property setter for `T`.
    pub fn register_setter<T: HostObject + 'static>(
        &mut self,
        property: &str,
        setter: impl Fn(&T, Value) -> EvalResult<()> + 'static,
    ) {
        let wrapped: Rc<SetterFn> = Rc::new(move |host, value| {
            let Some(typed) = host.as_any().downcast_ref::<T>() else {
                return Err(JexlError::new(ErrorKind::NoSuchMethod {
                    name: "property setter".to_owned(),
                }));
            };
            setter(typed, value)
        });
        self.setters.insert((TypeId::of::<T>(), property.to_owned()), wrapped);
    }

    /// Registers a method for `T` with a declared parameter profile. Several
    /// registrations under one name form an overload set.
    pub fn register_method<T: HostObject + 'static>(
        &mut self,
        name: &str,
        params: &[ParamClass],
        method: impl Fn(&T, &[Value]) -> EvalResult<Value> + 'static,
    ) {
        let spec = MethodSpec {
            name: name.to_owned(),
            params: params.iter().copied().collect(),
            func: Rc::new(move |host: &dyn HostObject, args: &[Value]| {
                let Some(typed) = host.as_any().downcast_ref::<T>() else {
                    return Err(JexlError::new(ErrorKind::NoSuchMethod { name: "method".to_owned() }));
                };
                method(typed, args)
            }),
        };
        self.methods
            .entry((TypeId::of::<T>(), name.to_owned()))
            .or_default()
            .push(MethodHandle(Rc::new(spec)));
    }
}

fn wrap_getter<T: HostObject + 'static>(getter: impl Fn(&T) -> EvalResult<Value> + 'static) -> Rc<GetterFn> {
    Rc::new(move |host| {
        let Some(typed) = host.as_any().downcast_ref::<T>() else {
            return Err(JexlError::new(ErrorKind::NoSuchMethod {
                name: "property getter".to_owned(),
            }));
        };
        getter(typed)
    })
}

fn index_of(name: &Value) -> Option<usize> {
    match name {
        Value::Int32(i) => usize::try_from(*i).ok(),
        Value::Int64(i) => usize::try_from(*i).ok(),
        _ => None,
    }
}

impl Uberspect for RegistryUberspect {
    fn get_property(&self, host: &Value, name: &Value, _info: Span) -> EvalResult<Value> {
        let Value::Host(object) = host else {
            return Ok(Value::Null);
        };
        let tid = object.as_any().type_id();
        let key_name = name.display_string();

        // strategy order: get-accessor, is-accessor, map shape, list index,
        // generic get(key) method
        if let Some(getter) = self.getters.get(&(tid, key_name.clone())) {
            return getter(object.as_ref());
        }
        if let Some(getter) = self.bool_getters.get(&(tid, key_name.clone())) {
            return getter(object.as_ref());
        }
        if let Some(value) = object.get_key(name) {
            return Ok(value);
        }
        if let Some(index) = index_of(name)
            && let Some(value) = object.get_index(index)
        {
            return Ok(value);
        }
        if let Some(candidates) = self.methods.get(&(tid, "get".to_owned()))
            && let Some(handle) = candidates.first()
        {
            return (handle.0.func)(object.as_ref(), std::slice::from_ref(name));
        }
        Ok(Value::Null)
    }

    fn set_property(&self, host: &Value, name: &Value, value: Value, _info: Span) -> EvalResult<()> {
        let Value::Host(object) = host else {
            return Err(JexlError::new(ErrorKind::BadAssignment {
                detail: "value has no settable properties",
            }));
        };
        let tid = object.as_any().type_id();
        let key_name = name.display_string();

        if let Some(setter) = self.setters.get(&(tid, key_name.clone())) {
            return setter(object.as_ref(), value);
        }
        if object.set_key(name.clone(), value.clone()) {
            return Ok(());
        }
        if let Some(index) = index_of(name)
            && object.set_index(index, value.clone())
        {
            return Ok(());
        }
        if let Some(candidates) = self.methods.get(&(tid, "set".to_owned()))
            && let Some(handle) = candidates.first()
        {
            return (handle.0.func)(object.as_ref(), &[name.clone(), value]).map(|_| ());
        }
        Err(JexlError::new(ErrorKind::NoSuchMethod {
            name: format!("setter for '{key_name}'"),
        }))
    }

    fn get_iterator(&self, value: &Value, _info: Span) -> EvalResult<Option<ValueIter>> {
        Ok(default_iterator(value))
    }

    fn find_method(
        &self,
        host: &Value,
        name: &str,
        args: &[Value],
        _info: Span,
    ) -> EvalResult<Option<MethodHandle>> {
        let Value::Host(object) = host else {
            return Ok(None);
        };
        let tid = object.as_any().type_id();
        let Some(candidates) = self.methods.get(&(tid, name.to_owned())) else {
            return Ok(None);
        };

        let arithmetic = Arithmetic::new(false);
        let matching: Vec<&MethodHandle> = candidates
            .iter()
            .filter(|handle| {
                handle.0.params.len() == args.len()
                    && handle
                        .0
                        .params
                        .iter()
                        .zip(args)
                        .all(|(param, arg)| param.accepts(&arithmetic, arg))
            })
            .collect();
        match matching.as_slice() {
            [] => Ok(None),
            [single] => Ok(Some((*single).clone())),
            _ => Err(JexlError::new(ErrorKind::AmbiguousMethod { name: name.to_owned() })),
        }
    }

    fn invoke(&self, handle: &MethodHandle, host: &Value, args: &[Value], _info: Span) -> EvalResult<Value> {
        let Value::Host(object) = host else {
            return Err(JexlError::new(ErrorKind::NoSuchMethod {
                name: handle.0.name.clone(),
            }));
        };
        (handle.0.func)(object.as_ref(), args)
    }
}

/// The iterator shapes shared by every uberspect: sequences and maps snapshot
/// their elements, strings iterate characters, shared iterators drain in
/// place, host objects surface their own snapshot.
#[must_use]
pub fn default_iterator(value: &Value) -> Option<ValueIter> {
    match value {
        Value::Null => None,
        Value::Seq(seq) => Some(ValueIter::new(seq.borrow().clone().into_iter())),
        Value::Map(map) => {
            let values: Vec<Value> = map.borrow().values().cloned().collect();
            Some(ValueIter::new(values.into_iter()))
        }
        Value::Str(s) => {
            let chars: Vec<Value> = s.chars().map(Value::Char).collect();
            Some(ValueIter::new(chars.into_iter()))
        }
        Value::Iter(shared) => Some(ValueIter::new(SharedIter(Rc::clone(shared)))),
        Value::Host(object) => object.iter_values().map(|values| ValueIter::new(values.into_iter())),
        _ => None,
    }
}

/// Adapter draining a shared `Value::Iter` handle.
struct SharedIter(Rc<std::cell::RefCell<ValueIter>>);

impl Iterator for SharedIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        self.0.borrow_mut().next()
    }
}
