//! Interpreter and arithmetic behavior through the public engine API.

use jexl::{EmptyContext, Engine, ErrorKind, JexlContext, MapContext, Value};
use num_bigint::BigInt;
use pretty_assertions::assert_eq;

fn eval(src: &str) -> Value {
    eval_with(src, &mut MapContext::new())
}

fn eval_with(src: &str, ctx: &mut MapContext) -> Value {
    let engine = Engine::new();
    let expr = engine.create_expression(src).unwrap();
    expr.evaluate(ctx).unwrap()
}

// === literals and precedence ===

#[test]
fn integer_arithmetic_narrows_to_long() {
    assert_eq!(eval("1 + 2 * 3"), Value::Int64(7));
}

#[test]
fn literals_take_the_smallest_variant() {
    assert_eq!(eval("5"), Value::Int32(5));
    assert_eq!(eval("2147483648"), Value::Int64(2_147_483_648));
    assert_eq!(eval("1.5"), Value::Float64(1.5));
    assert_eq!(eval("'hi'"), Value::Str("hi".to_owned()));
    assert_eq!(eval("true"), Value::Bool(true));
    assert_eq!(eval("null"), Value::Null);
}

#[test]
fn long_result_stays_long() {
    assert_eq!(eval("2147483648 + 1"), Value::Int64(2_147_483_649));
}

#[test]
fn long_overflow_grows_to_big_integer() {
    assert_eq!(
        eval("9223372036854775807 + 1"),
        Value::BigInt(BigInt::from(i64::MAX) + 1)
    );
}

#[test]
fn division_and_modulus() {
    assert_eq!(eval("7 / 2"), Value::Int64(3));
    assert_eq!(eval("7.0 / 2"), Value::Float64(3.5));
    assert_eq!(eval("5 % 3"), Value::Int64(2));
}

#[test]
fn unary_minus() {
    assert_eq!(eval("-5"), Value::Int32(-5));
    assert_eq!(eval("-(1 + 2)"), Value::Int64(-3));
}

#[test]
fn bitwise_operators() {
    assert_eq!(eval("6 & 3"), Value::Int64(2));
    assert_eq!(eval("6 & 3 | 4"), Value::Int64(6));
    assert_eq!(eval("6 ^ 3"), Value::Int64(5));
    assert_eq!(eval("~0"), Value::Int64(-1));
}

// === string concatenation fallback ===

#[test]
fn add_concatenates_when_not_numeric() {
    let mut ctx = MapContext::new();
    ctx.insert("a", Value::from("foo"));
    ctx.insert("b", Value::Int32(2));
    assert_eq!(eval_with("a + b", &mut ctx), Value::Str("foo2".to_owned()));
}

#[test]
fn numeric_strings_stay_numeric() {
    assert_eq!(eval("'1' + '2'"), Value::Int64(3));
    assert_eq!(eval("'1.5' + 1"), Value::Float64(2.5));
}

// === comparisons, word aliases ===

#[test]
fn comparison_ladder() {
    assert_eq!(eval("2 == 2.0"), Value::Bool(true));
    assert_eq!(eval("2 != 3"), Value::Bool(true));
    assert_eq!(eval("2 < 10"), Value::Bool(true));
    assert_eq!(eval("'a' < 'b'"), Value::Bool(true));
    assert_eq!(eval("3 >= 3"), Value::Bool(true));
}

#[test]
fn word_form_aliases() {
    assert_eq!(eval("4 div 2"), Value::Int64(2));
    assert_eq!(eval("5 mod 2"), Value::Int64(1));
    assert_eq!(eval("1 lt 2"), Value::Bool(true));
    assert_eq!(eval("1 eq 1 and 2 ge 2"), Value::Bool(true));
    assert_eq!(eval("not false"), Value::Bool(true));
}

// === logic and short-circuit ===

#[test]
fn and_or_short_circuit() {
    let engine = Engine::new();
    engine.set_lenient(false);
    let mut ctx = MapContext::new();
    // the right side would raise UnknownVariable if evaluated
    let and = engine.create_expression("false && nosuchvar").unwrap();
    assert_eq!(and.evaluate(&mut ctx).unwrap(), Value::Bool(false));
    let or = engine.create_expression("true || nosuchvar").unwrap();
    assert_eq!(or.evaluate(&mut ctx).unwrap(), Value::Bool(true));
}

#[test]
fn not_requires_a_non_null_operand() {
    assert_eq!(eval("!true"), Value::Bool(false));
    let engine = Engine::new();
    let expr = engine.create_expression("!null").unwrap();
    let err = expr.evaluate(&mut MapContext::new()).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NullOperand));
}

// === control flow ===

#[test]
fn if_else_over_null() {
    let mut ctx = MapContext::new();
    ctx.insert("x", Value::Null);
    assert_eq!(
        eval_with("if (x == null) 'unset' else x", &mut ctx),
        Value::Str("unset".to_owned())
    );
    let mut ctx = MapContext::new();
    ctx.insert("x", Value::Int32(5));
    assert_eq!(eval_with("if (x == null) 'unset' else x", &mut ctx), Value::Int32(5));
}

#[test]
fn while_loop_value_is_last_body_value() {
    let engine = Engine::new();
    let script = engine
        .create_script("i = 0; s = 0; while (i < 3) { s = s + i; i = i + 1; } s")
        .unwrap();
    assert_eq!(script.execute(&mut MapContext::new()).unwrap(), Value::Int64(3));
}

#[test]
fn while_that_never_runs_is_null() {
    assert_eq!(eval("while (false) 1"), Value::Null);
}

#[test]
fn foreach_binds_the_loop_variable() {
    let engine = Engine::new();
    let mut ctx = MapContext::new();
    ctx.insert(
        "xs",
        Value::seq(vec![Value::Int32(1), Value::Int32(2), Value::Int32(3)]),
    );
    let script = engine.create_script("t = 0; foreach (x in xs) t = t + x; t").unwrap();
    assert_eq!(script.execute(&mut ctx).unwrap(), Value::Int64(6));
}

#[test]
fn foreach_over_null_produces_no_iterations() {
    let mut ctx = MapContext::new();
    ctx.insert("xs", Value::Null);
    assert_eq!(eval_with("foreach (x in xs) 1", &mut ctx), Value::Null);
}

#[test]
fn foreach_over_map_visits_values() {
    let engine = Engine::new();
    let mut ctx = MapContext::new();
    ctx.insert(
        "m",
        Value::map_from([
            (Value::from("a"), Value::Int32(10)),
            (Value::from("b"), Value::Int32(20)),
        ]),
    );
    let script = engine.create_script("t = 0; foreach (v in m) t = t + v; t").unwrap();
    assert_eq!(script.execute(&mut ctx).unwrap(), Value::Int64(30));
}

#[test]
fn block_value_is_its_last_statement() {
    assert_eq!(eval("{ 1; 2; }"), Value::Int32(2));
}

// === assignment ===

#[test]
fn assignment_stores_and_returns_the_value() {
    let mut ctx = MapContext::new();
    assert_eq!(eval_with("a = 3", &mut ctx), Value::Int32(3));
    assert_eq!(ctx.get("a"), Some(Value::Int32(3)));
}

#[test]
fn nested_assignment_is_rejected() {
    let engine = Engine::new();
    engine.set_silent(true);
    let expr = engine.create_expression("a.b = 2").unwrap();
    let mut ctx = MapContext::new();
    ctx.insert("a", Value::map_from([]));
    // fatal even in silent mode
    let err = expr.evaluate(&mut ctx).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::BadAssignment { .. }));
}

#[test]
fn empty_context_rejects_assignment() {
    let engine = Engine::new();
    let expr = engine.create_expression("a = 1").unwrap();
    let err = expr.evaluate(&mut EmptyContext).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::BadAssignment { .. }));
}

// === references ===

#[test]
fn map_access_by_key_and_property() {
    let engine = Engine::new();
    let mut ctx = MapContext::new();
    ctx.insert("m", Value::map_from([(Value::from("a"), Value::Int32(1))]));
    let by_index = engine.create_expression("m['a']").unwrap();
    assert_eq!(by_index.evaluate(&mut ctx).unwrap(), Value::Int32(1));
    let by_property = engine.create_expression("m.a").unwrap();
    assert_eq!(by_property.evaluate(&mut ctx).unwrap(), Value::Int32(1));
}

#[test]
fn sequence_and_string_indexing() {
    let mut ctx = MapContext::new();
    ctx.insert("xs", Value::seq(vec![Value::Int32(10), Value::Int32(20)]));
    assert_eq!(eval_with("xs[1]", &mut ctx), Value::Int32(20));
    assert_eq!(eval("'abc'[1]"), Value::Char('b'));
}

#[test]
fn lenient_index_out_of_range_is_null() {
    let mut ctx = MapContext::new();
    ctx.insert("xs", Value::seq(vec![Value::Int32(1)]));
    assert_eq!(eval_with("xs[9]", &mut ctx), Value::Null);
}

#[test]
fn strict_index_out_of_range_raises() {
    let engine = Engine::new();
    engine.set_lenient(false);
    let mut ctx = MapContext::new();
    ctx.insert("xs", Value::seq(vec![Value::Int32(1)]));
    let expr = engine.create_expression("xs[9]").unwrap();
    let err = expr.evaluate(&mut ctx).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::IndexOutOfRange { index: 9 }));
}

#[test]
fn dotted_name_falls_back_to_flat_lookup() {
    let mut ctx = MapContext::new();
    ctx.insert("my.var", Value::from("flat"));
    assert_eq!(eval_with("my.var", &mut ctx), Value::Str("flat".to_owned()));
}

#[test]
fn map_literal_builds_a_map() {
    let engine = Engine::new();
    let script = engine.create_script("m = { 'a' : 1, 'b' : 2 }; m.b").unwrap();
    assert_eq!(script.execute(&mut MapContext::new()).unwrap(), Value::Int32(2));
}

// === size and empty ===

#[test]
fn size_over_builtin_shapes() {
    let mut ctx = MapContext::new();
    ctx.insert("xs", Value::seq(vec![Value::Int32(1), Value::Int32(2)]));
    ctx.insert("m", Value::map_from([(Value::from("k"), Value::Null)]));
    assert_eq!(eval("size('abc')"), Value::Int32(3));
    assert_eq!(eval_with("size(xs)", &mut ctx), Value::Int32(2));
    assert_eq!(eval_with("m.size()", &mut ctx), Value::Int32(1));
    assert_eq!(eval_with("xs.size()", &mut ctx), Value::Int32(2));
}

#[test]
fn empty_over_builtin_shapes() {
    let mut ctx = MapContext::new();
    ctx.insert("xs", Value::seq(vec![]));
    assert_eq!(eval("empty(null)"), Value::Bool(true));
    assert_eq!(eval("empty('')"), Value::Bool(true));
    assert_eq!(eval("empty('x')"), Value::Bool(false));
    assert_eq!(eval("empty(3)"), Value::Bool(false));
    assert_eq!(eval_with("empty(xs)", &mut ctx), Value::Bool(true));
}

// === strict and silent modes ===

#[test]
fn strict_null_operand_raises() {
    let engine = Engine::new();
    engine.set_lenient(false);
    let mut ctx = MapContext::new();
    ctx.insert("a", Value::Null);
    let expr = engine.create_expression("a + 1").unwrap();
    let err = expr.evaluate(&mut ctx).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NullOperand));
}

#[test]
fn lenient_null_arithmetic_coerces() {
    let mut ctx = MapContext::new();
    ctx.insert("a", Value::Null);
    ctx.insert("b", Value::Null);
    assert_eq!(eval_with("a + b", &mut ctx), Value::Int64(0));
    assert_eq!(eval_with("a + 1", &mut ctx), Value::Int64(1));
}

#[test]
fn strict_unknown_variable_raises() {
    let engine = Engine::new();
    engine.set_lenient(false);
    let expr = engine.create_expression("nope + 1").unwrap();
    let err = expr.evaluate(&mut MapContext::new()).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnknownVariable { .. }));
}

#[test]
fn silent_mode_logs_and_returns_null() {
    let engine = Engine::new();
    engine.set_silent(true);
    let expr = engine.create_expression("1 / 0").unwrap();
    assert_eq!(expr.evaluate(&mut MapContext::new()).unwrap(), Value::Null);
}

#[test]
fn divide_by_zero_raises_when_not_silent() {
    let engine = Engine::new();
    let expr = engine.create_expression("1 / 0").unwrap();
    let err = expr.evaluate(&mut MapContext::new()).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::DivideByZero));
}

// === engine facade ===

#[test]
fn source_is_cleaned() {
    let engine = Engine::new();
    let expr = engine.create_expression("  1 + 1  ").unwrap();
    assert_eq!(expr.source(), "1 + 1;");
}

#[test]
fn script_of_expression_source_is_equivalent() {
    let engine = Engine::new();
    let expr = engine.create_expression("21 * 2").unwrap();
    let script = engine.create_script(expr.source()).unwrap();
    assert_eq!(
        expr.evaluate(&mut MapContext::new()).unwrap(),
        script.execute(&mut MapContext::new()).unwrap()
    );
}

#[test]
fn cache_keeps_results_correct() {
    let engine = Engine::new();
    engine.set_cache(4);
    for _ in 0..3 {
        let expr = engine.create_expression("1 + 1").unwrap();
        assert_eq!(expr.evaluate(&mut MapContext::new()).unwrap(), Value::Int64(2));
    }
}

#[test]
fn foreach_drains_a_lazy_iterator() {
    let engine = Engine::new();
    let mut ctx = MapContext::new();
    ctx.insert(
        "it",
        Value::iter_from(vec![Value::Int32(1), Value::Int32(2), Value::Int32(4)].into_iter()),
    );
    let script = engine.create_script("t = 0; foreach (v in it) t = t + v; t").unwrap();
    assert_eq!(script.execute(&mut ctx).unwrap(), Value::Int64(7));
    // the shared iterator is consumed; a second pass sees nothing
    let again = engine.create_script("t = 0; foreach (v in it) t = t + v; t").unwrap();
    assert_eq!(again.execute(&mut ctx).unwrap(), Value::Int64(0));
}

#[test]
fn scripts_load_from_files() {
    let path = std::env::temp_dir().join("jexl_script_test.jexl");
    std::fs::write(&path, "6 * 7;").unwrap();
    let engine = Engine::new();
    let script = engine.create_script_from_file(&path).unwrap();
    assert_eq!(script.execute(&mut MapContext::new()).unwrap(), Value::Int64(42));
    std::fs::remove_file(&path).ok();

    let err = engine.create_script_from_file("/no/such/file.jexl").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Io { .. }));
}

#[test]
fn parse_errors_surface() {
    let engine = Engine::new();
    let err = engine.create_expression("1 +").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Parse { .. }));
}

#[test]
fn multiple_statements_are_not_an_expression() {
    let engine = Engine::new();
    assert!(engine.create_expression("1; 2").is_err());
    assert!(engine.create_script("1; 2").is_ok());
}
