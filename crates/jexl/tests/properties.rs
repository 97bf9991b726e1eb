//! Host-object access through the uberspect registry, the engine's
//! property helpers, and namespaced functions.

use std::{any::Any, cell::Cell, cmp::Ordering, rc::Rc};

use jexl::{
    Engine, ErrorKind, HostObject, MapContext, NumberClass, ParamClass, RegistryUberspect, Value,
};
use pretty_assertions::assert_eq;

#[derive(Debug, Default)]
struct Point {
    x: Cell<i64>,
    y: Cell<i64>,
}

impl HostObject for Point {
    fn type_name(&self) -> &'static str {
        "Point"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn compare(&self, other: &Value) -> Option<Ordering> {
        if let Value::Host(host) = other {
            let other = host.as_any().downcast_ref::<Point>()?;
            return Some((self.x.get() + self.y.get()).cmp(&(other.x.get() + other.y.get())));
        }
        None
    }
}

#[derive(Debug)]
struct Bag {
    items: Vec<Value>,
}

impl HostObject for Bag {
    fn type_name(&self) -> &'static str {
        "Bag"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn get_index(&self, index: usize) -> Option<Value> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> Option<usize> {
        Some(self.items.len())
    }

    fn iter_values(&self) -> Option<Vec<Value>> {
        Some(self.items.clone())
    }
}

struct MathHost;

impl HostObject for MathHost {
    fn type_name(&self) -> &'static str {
        "MathHost"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn point_engine() -> Engine {
    let mut registry = RegistryUberspect::new();
    registry.register_getter::<Point>("x", |p| Ok(Value::Int64(p.x.get())));
    registry.register_getter::<Point>("y", |p| Ok(Value::Int64(p.y.get())));
    registry.register_bool_getter::<Point>("origin", |p| {
        Ok(Value::Bool(p.x.get() == 0 && p.y.get() == 0))
    });
    registry.register_setter::<Point>("x", |p, v| {
        p.x.set(match v {
            Value::Int32(i) => i64::from(i),
            Value::Int64(i) => i,
            _ => 0,
        });
        Ok(())
    });
    registry.register_method::<Point>(
        "shift",
        &[
            ParamClass::Number(NumberClass::I64),
            ParamClass::Number(NumberClass::I64),
        ],
        |p, args| {
            let dx = match &args[0] {
                Value::Int32(i) => i64::from(*i),
                Value::Int64(i) => *i,
                _ => 0,
            };
            let dy = match &args[1] {
                Value::Int32(i) => i64::from(*i),
                Value::Int64(i) => *i,
                _ => 0,
            };
            p.x.set(p.x.get() + dx);
            p.y.set(p.y.get() + dy);
            Ok(Value::Null)
        },
    );
    // equally specific overloads used by the ambiguity test
    registry.register_method::<Point>("blur", &[ParamClass::Any], |_, _| Ok(Value::Int32(1)));
    registry.register_method::<Point>("blur", &[ParamClass::Any], |_, _| Ok(Value::Int32(2)));
    // only matches an int-class argument, so long arguments need narrowing
    registry.register_method::<Point>("quadrant", &[ParamClass::Number(NumberClass::I32)], |_, args| {
        Ok(args[0].clone())
    });
    Engine::with_uberspect(Rc::new(registry))
}

fn point(x: i64, y: i64) -> Value {
    Value::host(Point {
        x: Cell::new(x),
        y: Cell::new(y),
    })
}

// === property access ===

#[test]
fn registered_getter_resolves() {
    let engine = point_engine();
    let mut ctx = MapContext::new();
    ctx.insert("p", point(3, 4));
    let expr = engine.create_expression("p.x + p.y").unwrap();
    assert_eq!(expr.evaluate(&mut ctx).unwrap(), Value::Int64(7));
}

#[test]
fn boolean_is_accessor_resolves() {
    let engine = point_engine();
    let mut ctx = MapContext::new();
    ctx.insert("p", point(0, 0));
    let expr = engine.create_expression("p.origin").unwrap();
    assert_eq!(expr.evaluate(&mut ctx).unwrap(), Value::Bool(true));
}

#[test]
fn unknown_property_is_null() {
    let engine = point_engine();
    let mut ctx = MapContext::new();
    ctx.insert("p", point(1, 2));
    let expr = engine.create_expression("p.z").unwrap();
    assert_eq!(expr.evaluate(&mut ctx).unwrap(), Value::Null);
}

#[test]
fn list_shaped_host_indexes() {
    let engine = Engine::with_uberspect(Rc::new(RegistryUberspect::new()));
    let mut ctx = MapContext::new();
    ctx.insert(
        "bag",
        Value::host(Bag {
            items: vec![Value::from("a"), Value::from("b")],
        }),
    );
    let expr = engine.create_expression("bag[1]").unwrap();
    assert_eq!(expr.evaluate(&mut ctx).unwrap(), Value::Str("b".to_owned()));
    let size = engine.create_expression("size(bag)").unwrap();
    assert_eq!(size.evaluate(&mut ctx).unwrap(), Value::Int32(2));
    let empty = engine.create_expression("empty(bag)").unwrap();
    assert_eq!(empty.evaluate(&mut ctx).unwrap(), Value::Bool(false));
}

// === method invocation ===

#[test]
fn method_with_widening_match() {
    let engine = point_engine();
    let mut ctx = MapContext::new();
    ctx.insert("p", point(1, 1));
    let script = engine.create_script("p.shift(2, 3); p.x + p.y").unwrap();
    assert_eq!(script.execute(&mut ctx).unwrap(), Value::Int64(7));
}

#[test]
fn method_arguments_narrow_once_and_retry() {
    let engine = point_engine();
    let mut ctx = MapContext::new();
    ctx.insert("p", point(0, 0));
    ctx.insert("big", Value::Int64(7));
    // a long does not widen into the declared int class, so the first lookup
    // misses and the narrowed retry resolves it
    let expr = engine.create_expression("p.quadrant(big)").unwrap();
    assert_eq!(expr.evaluate(&mut ctx).unwrap(), Value::Int32(7));
}

#[test]
fn ambiguous_overloads_always_raise() {
    let engine = point_engine();
    engine.set_silent(true);
    let mut ctx = MapContext::new();
    ctx.insert("p", point(0, 0));
    let expr = engine.create_expression("p.blur(1)").unwrap();
    let err = expr.evaluate(&mut ctx).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::AmbiguousMethod { .. }));
}

#[test]
fn missing_method_raises_or_goes_silent() {
    let engine = point_engine();
    let mut ctx = MapContext::new();
    ctx.insert("p", point(0, 0));
    let expr = engine.create_expression("p.warp()").unwrap();
    let err = expr.evaluate(&mut ctx).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NoSuchMethod { .. }));

    engine.set_silent(true);
    let expr = engine.create_expression("p.warp()").unwrap();
    assert_eq!(expr.evaluate(&mut ctx).unwrap(), Value::Null);
}

// === host comparator hook ===

#[test]
fn host_comparator_orders_values() {
    let engine = point_engine();
    let mut ctx = MapContext::new();
    ctx.insert("small", point(1, 1));
    ctx.insert("large", point(5, 5));
    let expr = engine.create_expression("small < large").unwrap();
    assert_eq!(expr.evaluate(&mut ctx).unwrap(), Value::Bool(true));
}

// === iteration over hosts ===

#[test]
fn foreach_over_host_snapshot() {
    let engine = Engine::new();
    let mut ctx = MapContext::new();
    ctx.insert(
        "bag",
        Value::host(Bag {
            items: vec![Value::Int32(1), Value::Int32(2), Value::Int32(4)],
        }),
    );
    let script = engine.create_script("t = 0; foreach (v in bag) t = t + v; t").unwrap();
    assert_eq!(script.execute(&mut ctx).unwrap(), Value::Int64(7));
}

// === engine property helpers (register splice) ===

#[test]
fn get_property_reads_through_registers() {
    let engine = point_engine();
    assert_eq!(
        engine.get_property(None, point(9, 0), "x").unwrap(),
        Value::Int64(9)
    );
}

#[test]
fn get_property_walks_nested_paths() {
    let engine = Engine::new();
    let inner = Value::map_from([(Value::from("b"), Value::Int32(5))]);
    let bean = Value::map_from([(Value::from("a"), inner)]);
    assert_eq!(engine.get_property(None, bean, "a.b").unwrap(), Value::Int32(5));
}

#[test]
fn get_property_with_bracket_form() {
    let engine = Engine::new();
    let bean = Value::map_from([(Value::from("key"), Value::from("v"))]);
    assert_eq!(
        engine.get_property(None, bean, "['key']").unwrap(),
        Value::Str("v".to_owned())
    );
}

#[test]
fn set_property_writes_through_registers() {
    let engine = point_engine();
    let bean = point(0, 0);
    engine.set_property(None, bean.clone(), "x", Value::Int64(42)).unwrap();
    assert_eq!(engine.get_property(None, bean, "x").unwrap(), Value::Int64(42));
}

#[test]
fn set_property_into_maps_and_sequences() {
    let engine = Engine::new();
    let bean = Value::map_from([(Value::from("xs"), Value::seq(vec![Value::Int32(0)]))]);
    engine
        .set_property(None, bean.clone(), "xs[0]", Value::Int32(8))
        .unwrap();
    assert_eq!(engine.get_property(None, bean, "xs[0]").unwrap(), Value::Int32(8));
}

// === namespaced functions ===

#[test]
fn namespaced_function_call() {
    let mut registry = RegistryUberspect::new();
    registry.register_method::<MathHost>(
        "max",
        &[
            ParamClass::Number(NumberClass::I64),
            ParamClass::Number(NumberClass::I64),
        ],
        |_, args| {
            let arithmetic = jexl::Arithmetic::new(false);
            let a = arithmetic.to_i64(&args[0])?;
            let b = arithmetic.to_i64(&args[1])?;
            Ok(Value::Int64(a.max(b)))
        },
    );
    let engine = Engine::with_uberspect(Rc::new(registry));
    engine.set_functions([("math".to_owned(), Value::host(MathHost))]);
    let expr = engine.create_expression("math:max(2, 5)").unwrap();
    assert_eq!(expr.evaluate(&mut MapContext::new()).unwrap(), Value::Int64(5));
}

#[test]
fn unknown_namespace_raises() {
    let engine = Engine::new();
    let expr = engine.create_expression("nope:fn(1)").unwrap();
    let err = expr.evaluate(&mut MapContext::new()).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NoSuchMethod { .. }));
}
