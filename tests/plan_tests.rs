//! Integration tests for deployment planning
//!
//! These tests verify duplicate detection, dependency wiring, cycle
//! rejection, and the stable topological order the driver walks.

use serde_json::{json, Map, Value};

use klaudio_operator::crd::ResourceGroupElement;
use klaudio_operator::expression::Scope;
use klaudio_operator::plan::Plan;
use klaudio_operator::Error;

// ============================================================================
// Test Helpers
// ============================================================================

fn element(name: &str, properties: Value) -> ResourceGroupElement {
    ResourceGroupElement {
        name: name.to_string(),
        resource_ref: "sample-ref".to_string(),
        properties: Some(properties),
    }
}

fn bare_element(name: &str) -> ResourceGroupElement {
    ResourceGroupElement {
        name: name.to_string(),
        resource_ref: "sample-ref".to_string(),
        properties: None,
    }
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn independent_resources_are_ordered_by_name() {
    let plan = Plan::build(&[
        element("b", json!({"k": "w"})),
        element("a", json!({"k": "v"})),
    ])
    .unwrap();
    assert_eq!(plan.order(), ["a", "b"]);
}

#[test]
fn linear_chain_orders_upstream_first() {
    let plan = Plan::build(&[
        element("b", json!({"n": "${resources.a.status.outputs.id}"})),
        element("a", json!({"k": "v"})),
    ])
    .unwrap();
    assert_eq!(plan.order(), ["a", "b"]);
}

#[test]
fn diamond_orders_deterministically() {
    let plan = Plan::build(&[
        element("d", json!({"left": "${resources.b.status.outputs.id}", "right": "${resources.c.status.outputs.id}"})),
        element("c", json!({"base": "${resources.a.status.outputs.id}"})),
        element("b", json!({"base": "${resources.a.status.outputs.id}"})),
        bare_element("a"),
    ])
    .unwrap();
    assert_eq!(plan.order(), ["a", "b", "c", "d"]);
}

#[test]
fn order_is_stable_under_input_reordering() {
    let forward = Plan::build(&[
        bare_element("a"),
        element("b", json!({"n": "${resources.a.status.outputs.id}"})),
        bare_element("z"),
    ])
    .unwrap();
    let backward = Plan::build(&[
        bare_element("z"),
        element("b", json!({"n": "${resources.a.status.outputs.id}"})),
        bare_element("a"),
    ])
    .unwrap();
    assert_eq!(forward.order(), backward.order());
}

#[test]
fn dependencies_nested_deep_in_property_trees_are_found() {
    let plan = Plan::build(&[
        element(
            "app",
            json!({
                "env": [
                    {"name": "DB_URL", "value": "${resources.database.status.outputs.url}"}
                ]
            }),
        ),
        bare_element("database"),
    ])
    .unwrap();
    assert_eq!(plan.order(), ["database", "app"]);
}

#[test]
fn refs_dependencies_do_not_order_resources() {
    // refs resolve before planning; only resources.* edges exist
    let plan = Plan::build(&[
        element("a", json!({"zone": "${refs.env.data.zone}"})),
        bare_element("b"),
    ])
    .unwrap();
    assert_eq!(plan.order(), ["a", "b"]);
}

// ============================================================================
// Spec Errors
// ============================================================================

#[test]
fn duplicate_resource_name_is_rejected() {
    let result = Plan::build(&[bare_element("a"), bare_element("a")]);
    match result {
        Err(Error::Spec(message)) => assert!(message.contains("duplicated")),
        other => panic!("expected spec error, got {other:?}"),
    }
}

#[test]
fn dependency_cycle_is_rejected() {
    let result = Plan::build(&[
        element("a", json!({"n": "${resources.b.status.outputs.id}"})),
        element("b", json!({"n": "${resources.a.status.outputs.id}"})),
    ]);
    match result {
        Err(Error::DependencyCycle(message)) => {
            assert!(message.contains("resources.a"));
            assert!(message.contains("resources.b"));
        }
        other => panic!("expected cycle error, got {other:?}"),
    }
}

#[test]
fn dependency_on_undeclared_resource_is_rejected() {
    let result = Plan::build(&[element(
        "a",
        json!({"n": "${resources.ghost.status.outputs.id}"}),
    )]);
    match result {
        Err(Error::Spec(message)) => {
            assert!(message.contains("ghost"));
            assert!(message.contains("not declared"));
        }
        other => panic!("expected spec error, got {other:?}"),
    }
}

#[test]
fn malformed_expression_in_properties_is_rejected() {
    let result = Plan::build(&[element("a", json!({"n": "${..nope..}"}))]);
    assert!(matches!(result, Err(Error::Spec(_))));
}

#[test]
fn non_object_properties_are_rejected() {
    let result = Plan::build(&[element("a", json!(["not", "an", "object"]))]);
    assert!(matches!(result, Err(Error::Spec(_))));
}

// ============================================================================
// Property Evaluation Through the Plan
// ============================================================================

#[test]
fn literal_property_tree_evaluates_on_the_first_pass() {
    let plan = Plan::build(&[element("a", json!({"k": "v", "nested": {"x": 1}}))]).unwrap();
    let resource = plan.get("a").unwrap();
    assert!(resource.properties.dependencies().is_empty());

    let expanded = resource.properties.evaluate(&Scope::default()).unwrap();
    assert_eq!(expanded, json!({"k": "v", "nested": {"x": 1}}));
}

#[test]
fn downstream_properties_see_upstream_outputs() {
    let plan = Plan::build(&[
        bare_element("a"),
        element("b", json!({"n": "${resources.a.status.outputs.id}"})),
    ])
    .unwrap();

    let scope = Scope::new(Map::new(), Map::new()).with_resource(
        "a",
        json!({
            "spec": {"placement": "p", "resourceRef": "sample-ref", "properties": {}},
            "status": {"phase": "Done", "outputs": {"id": "a-42"}},
        }),
    );

    let expanded = plan.get("b").unwrap().properties.evaluate(&scope).unwrap();
    assert_eq!(expanded, json!({"n": "a-42"}));
}

#[test]
fn empty_plan_is_empty() {
    let plan = Plan::build(&[]).unwrap();
    assert!(plan.is_empty());
    assert_eq!(plan.len(), 0);
    assert!(plan.order().is_empty());
}
