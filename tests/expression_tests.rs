//! Integration tests for the property expression engine
//!
//! These tests verify scalar classification (literal / single / composite),
//! typed evaluation against a layered scope, dependency extraction, and the
//! standard library surface.

use serde_json::{json, Map, Value};

use klaudio_operator::expression::{Expression, ExpressionError, Scope};

// ============================================================================
// Test Helpers
// ============================================================================

fn parse(value: Value) -> Expression {
    Expression::parse(&value).expect("expression should parse")
}

fn empty_scope() -> Scope {
    Scope::default()
}

fn scope_with_parameters(parameters: Value) -> Scope {
    let Value::Object(map) = parameters else {
        panic!("parameters must be an object");
    };
    Scope::new(map, Map::new())
}

fn scope_with_refs(refs: Value) -> Scope {
    let Value::Object(map) = refs else {
        panic!("refs must be an object");
    };
    Scope::new(Map::new(), map)
}

// ============================================================================
// Literal Expressions
// ============================================================================

#[test]
fn plain_string_round_trips_through_evaluation() {
    let expression = parse(json!("just a value"));
    let result = expression.evaluate(&empty_scope()).unwrap();
    assert_eq!(result, json!("just a value"));
    assert!(expression.dependencies().is_empty());
}

#[test]
fn non_string_scalars_are_literals() {
    for value in [json!(42), json!(2.5), json!(true), json!(null)] {
        let expression = parse(value.clone());
        assert_eq!(expression.evaluate(&empty_scope()).unwrap(), value);
        assert!(expression.dependencies().is_empty());
    }
}

#[test]
fn string_with_unterminated_token_stays_literal() {
    let expression = parse(json!("half ${open"));
    let result = expression.evaluate(&empty_scope()).unwrap();
    assert_eq!(result, json!("half ${open"));
}

// ============================================================================
// Single Expressions
// ============================================================================

#[test]
fn constant_single_expression_evaluates() {
    let expression = parse(json!("${'sample'}"));
    let result = expression.evaluate(&empty_scope()).unwrap();
    assert_eq!(result, json!("sample"));
}

#[test]
fn single_expression_preserves_result_type() {
    let scope = scope_with_parameters(json!({"replicas": 3, "flags": ["a", "b"]}));

    let number = parse(json!("${parameters.replicas}"));
    assert_eq!(number.evaluate(&scope).unwrap(), json!(3));

    let list = parse(json!("${parameters.flags}"));
    assert_eq!(list.evaluate(&scope).unwrap(), json!(["a", "b"]));
}

#[test]
fn indexed_access_reads_lists_and_maps() {
    let scope = scope_with_parameters(json!({
        "message": ["hello", "world"],
        "labels": {"env": "prod"},
    }));

    let by_index = parse(json!("${parameters.message[1]}"));
    assert_eq!(by_index.evaluate(&scope).unwrap(), json!("world"));

    let by_key = parse(json!("${parameters.labels['env']}"));
    assert_eq!(by_key.evaluate(&scope).unwrap(), json!("prod"));
}

#[test]
fn member_chain_traverses_nested_objects() {
    let scope = scope_with_refs(json!({
        "env": {"data": {"name": "world"}},
    }));
    let expression = parse(json!("${refs.env.data.name}"));
    assert_eq!(expression.evaluate(&scope).unwrap(), json!("world"));
}

#[test]
fn missing_root_evaluates_to_empty_mapping() {
    // resources is not populated yet, so member access on it fails cleanly
    let expression = parse(json!("${resources.a.status}"));
    let err = expression.evaluate(&empty_scope()).unwrap_err();
    assert!(matches!(err, ExpressionError::UndefinedSymbol { .. }));
}

// ============================================================================
// Composite Expressions
// ============================================================================

#[test]
fn composite_splices_evaluated_fragments() {
    let scope = scope_with_refs(json!({
        "env": {"data": {"name": "world"}},
    }));
    let expression = parse(json!("${'hello'}, ${refs.env.data.name}!"));
    assert_eq!(expression.evaluate(&scope).unwrap(), json!("hello, world!"));
}

#[test]
fn composite_is_always_a_string() {
    let scope = scope_with_parameters(json!({"replicas": 3}));
    let expression = parse(json!("count: ${parameters.replicas}"));
    assert_eq!(expression.evaluate(&scope).unwrap(), json!("count: 3"));
}

#[test]
fn composite_with_multiple_indexed_fragments() {
    let scope = scope_with_parameters(json!({"message": ["hello", "world"]}));
    let expression = parse(json!("${parameters.message[0]}, ${parameters.message[1]}!"));
    assert_eq!(expression.evaluate(&scope).unwrap(), json!("hello, world!"));
}

// ============================================================================
// Dependency Extraction
// ============================================================================

#[test]
fn resources_root_yields_one_dependency() {
    let expression = parse(json!("${resources.sample.whatever}"));
    let dependencies: Vec<String> = expression.dependencies().into_iter().collect();
    assert_eq!(dependencies, vec!["resources.sample".to_string()]);
}

#[test]
fn refs_root_yields_one_dependency() {
    let expression = parse(json!("${refs.sample.whatever}"));
    let dependencies: Vec<String> = expression.dependencies().into_iter().collect();
    assert_eq!(dependencies, vec!["refs.sample".to_string()]);
}

#[test]
fn bracketed_root_access_yields_dependency() {
    let expression = parse(json!("${resources['my-db'].status.outputs.id}"));
    let dependencies: Vec<String> = expression.dependencies().into_iter().collect();
    assert_eq!(dependencies, vec!["resources.my-db".to_string()]);
}

#[test]
fn parameters_root_yields_no_dependencies() {
    let expression = parse(json!("${parameters.anything.at.all}"));
    assert!(expression.dependencies().is_empty());
}

#[test]
fn constant_expressions_have_no_dependencies() {
    let expression = parse(json!("${'hello'}"));
    assert!(expression.dependencies().is_empty());
}

#[test]
fn composite_collects_dependencies_from_every_fragment() {
    let expression = parse(json!("${resources.a.status.outputs.id}-${refs.env.data.zone}"));
    let dependencies: Vec<String> = expression.dependencies().into_iter().collect();
    assert_eq!(
        dependencies,
        vec!["refs.env".to_string(), "resources.a".to_string()]
    );
}

#[test]
fn function_arguments_contribute_dependencies() {
    let expression = parse(json!("${upper(resources.db.status.outputs.name)}"));
    let dependencies: Vec<String> = expression.dependencies().into_iter().collect();
    assert_eq!(dependencies, vec!["resources.db".to_string()]);
}

// ============================================================================
// Standard Library
// ============================================================================

#[test]
fn string_helpers() {
    let scope = scope_with_parameters(json!({"name": "  World  "}));

    assert_eq!(
        parse(json!("${upper('abc')}")).evaluate(&scope).unwrap(),
        json!("ABC")
    );
    assert_eq!(
        parse(json!("${lower('ABC')}")).evaluate(&scope).unwrap(),
        json!("abc")
    );
    assert_eq!(
        parse(json!("${trim(parameters.name)}")).evaluate(&scope).unwrap(),
        json!("World")
    );
    assert_eq!(
        parse(json!("${replace('a-b-c', '-', '.')}"))
            .evaluate(&scope)
            .unwrap(),
        json!("a.b.c")
    );
    assert_eq!(
        parse(json!("${size('hello')}")).evaluate(&scope).unwrap(),
        json!(5)
    );
}

#[test]
fn list_helpers() {
    let scope = scope_with_parameters(json!({"zones": ["a", "b", "c"]}));

    assert_eq!(
        parse(json!("${split('a,b,c', ',')}")).evaluate(&scope).unwrap(),
        json!(["a", "b", "c"])
    );
    assert_eq!(
        parse(json!("${join(parameters.zones, '/')}"))
            .evaluate(&scope)
            .unwrap(),
        json!("a/b/c")
    );
    assert_eq!(
        parse(json!("${first(parameters.zones)}"))
            .evaluate(&scope)
            .unwrap(),
        json!("a")
    );
    assert_eq!(
        parse(json!("${last(parameters.zones)}"))
            .evaluate(&scope)
            .unwrap(),
        json!("c")
    );
    assert_eq!(
        parse(json!("${size(parameters.zones)}"))
            .evaluate(&scope)
            .unwrap(),
        json!(3)
    );
}

#[test]
fn list_and_map_literals_evaluate() {
    let expression = parse(json!("${['x', 'y'][0]}"));
    assert_eq!(expression.evaluate(&empty_scope()).unwrap(), json!("x"));

    let expression = parse(json!("${{'a': 1}['a']}"));
    assert_eq!(expression.evaluate(&empty_scope()).unwrap(), json!(1));
}

// ============================================================================
// Evaluation Errors
// ============================================================================

#[test]
fn undefined_symbol_error_carries_source() {
    let scope = scope_with_parameters(json!({"present": 1}));
    let err = parse(json!("${parameters.absent}"))
        .evaluate(&scope)
        .unwrap_err();
    match err {
        ExpressionError::UndefinedSymbol { symbol, source } => {
            assert_eq!(symbol, "absent");
            assert_eq!(source, "parameters.absent");
        }
        other => panic!("expected undefined symbol error, got {other}"),
    }
}

#[test]
fn unknown_root_is_undefined() {
    let err = parse(json!("${mystery.field}"))
        .evaluate(&empty_scope())
        .unwrap_err();
    assert!(matches!(err, ExpressionError::UndefinedSymbol { .. }));
}

#[test]
fn index_out_of_range_error() {
    let scope = scope_with_parameters(json!({"items": ["only"]}));
    let err = parse(json!("${parameters.items[3]}"))
        .evaluate(&scope)
        .unwrap_err();
    assert!(matches!(
        err,
        ExpressionError::IndexOutOfRange { index: 3, len: 1, .. }
    ));
}

#[test]
fn member_access_on_scalar_is_a_type_mismatch() {
    let scope = scope_with_parameters(json!({"flat": 1}));
    let err = parse(json!("${parameters.flat.deeper}"))
        .evaluate(&scope)
        .unwrap_err();
    assert!(matches!(err, ExpressionError::TypeMismatch { .. }));
}

#[test]
fn unknown_function_is_rejected() {
    let err = parse(json!("${frobnicate('x')}"))
        .evaluate(&empty_scope())
        .unwrap_err();
    assert!(matches!(err, ExpressionError::UnknownFunction { .. }));
}

#[test]
fn wrong_arity_is_rejected() {
    let err = parse(json!("${upper('a', 'b')}"))
        .evaluate(&empty_scope())
        .unwrap_err();
    assert!(matches!(err, ExpressionError::Function { .. }));
}

#[test]
fn malformed_fragment_fails_at_parse_time() {
    let err = Expression::parse(&json!("${..broken..}")).unwrap_err();
    assert!(matches!(err, ExpressionError::Parse { .. }));
}

// ============================================================================
// Scope Layering
// ============================================================================

#[test]
fn with_resource_extends_the_scope() {
    let base = empty_scope();
    let extended = base.with_resource(
        "db",
        json!({"status": {"outputs": {"id": "db-123"}}}),
    );

    let expression = parse(json!("${resources.db.status.outputs.id}"));
    assert_eq!(expression.evaluate(&extended).unwrap(), json!("db-123"));

    // the original scope is untouched
    assert!(expression.evaluate(&base).is_err());
}

#[test]
fn later_layers_see_earlier_resources() {
    let scope = empty_scope()
        .with_resource("a", json!({"status": {"outputs": {"id": "a-1"}}}))
        .with_resource("b", json!({"status": {"outputs": {"id": "b-2"}}}));

    let expression = parse(json!("${resources.a.status.outputs.id}/${resources.b.status.outputs.id}"));
    assert_eq!(expression.evaluate(&scope).unwrap(), json!("a-1/b-2"));
}
