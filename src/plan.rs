//! Deployment planning
//!
//! Turns the resource entries of one deployment generation into parsed
//! property trees and a stable execution order. Duplicate names, references
//! to undeclared resources, and dependency cycles are spec errors; the plan
//! is rebuilt from scratch on every reconcile, so the planner itself holds no
//! state between passes.

use std::collections::BTreeMap;

use crate::crd::ResourceGroupElement;
use crate::dag::{Dag, DagError};
use crate::error::{Error, Result};
use crate::expression::Properties;

const RESOURCES_PREFIX: &str = "resources.";

/// One resource entry with its parsed property tree
#[derive(Debug)]
pub struct PlannedResource {
    pub name: String,
    pub resource_ref: String,
    pub properties: Properties,
}

/// Ordered plan for one deployment generation
#[derive(Debug)]
pub struct Plan {
    resources: BTreeMap<String, PlannedResource>,
    order: Vec<String>,
}

impl Plan {
    /// Parse every entry, wire the dependency graph, and produce the stable
    /// topological order
    pub fn build(elements: &[ResourceGroupElement]) -> Result<Plan> {
        let mut resources: BTreeMap<String, PlannedResource> = BTreeMap::new();
        for element in elements {
            if resources.contains_key(&element.name) {
                return Err(Error::spec(format!(
                    "resource '{}' is duplicated; check the spec",
                    element.name
                )));
            }
            let properties = Properties::parse(element.properties.as_ref()).map_err(|e| {
                Error::spec(format!(
                    "unable to read properties of resource '{}': {e}",
                    element.name
                ))
            })?;
            resources.insert(
                element.name.clone(),
                PlannedResource {
                    name: element.name.clone(),
                    resource_ref: element.resource_ref.clone(),
                    properties,
                },
            );
        }

        let mut dag = Dag::new();
        for name in resources.keys() {
            dag.add_vertex(vertex_name(name));
        }
        for (name, resource) in &resources {
            for dependency in resource.properties.dependencies() {
                // refs resolve before planning; only resource edges order the walk
                let Some(upstream) = dependency.strip_prefix(RESOURCES_PREFIX) else {
                    continue;
                };
                dag.add_edge(&vertex_name(upstream), &vertex_name(name))
                    .map_err(|_| {
                        Error::spec(format!(
                            "resource '{name}' depends on '{dependency}', which is not declared in the bundle"
                        ))
                    })?;
            }
        }

        let order = dag
            .stable_topological_sort()
            .map_err(|e| match e {
                DagError::Cycle(members) => Error::DependencyCycle(members.join(", ")),
                other => Error::spec(other.to_string()),
            })?
            .into_iter()
            .map(|vertex| {
                vertex
                    .strip_prefix(RESOURCES_PREFIX)
                    .unwrap_or(&vertex)
                    .to_string()
            })
            .collect();

        Ok(Plan { resources, order })
    }

    /// Resource names in execution order
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Look up one planned resource by name
    pub fn get(&self, name: &str) -> Option<&PlannedResource> {
        self.resources.get(name)
    }

    /// Number of planned resources
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the plan schedules nothing
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

fn vertex_name(name: &str) -> String {
    format!("resources.{name}")
}
