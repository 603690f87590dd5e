//! Recursive property trees
//!
//! A resource's `properties` field is an opaque JSON object. Parsing turns
//! every scalar leaf into an [`Expression`] and records the union of leaf
//! dependencies at each level, so the planner can wire the deployment DAG
//! without evaluating anything.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

use super::{Expression, ExpressionError, Scope};

/// One node of a parsed property tree
#[derive(Debug, Clone)]
pub enum PropertyNode {
    Object(BTreeMap<String, PropertyNode>),
    Array(Vec<PropertyNode>),
    Scalar(Expression),
}

impl PropertyNode {
    fn from_value(value: &Value) -> Result<PropertyNode, ExpressionError> {
        match value {
            Value::Object(map) => {
                let mut nodes = BTreeMap::new();
                for (name, element) in map {
                    nodes.insert(name.clone(), PropertyNode::from_value(element)?);
                }
                Ok(PropertyNode::Object(nodes))
            }
            Value::Array(items) => {
                let nodes = items
                    .iter()
                    .map(PropertyNode::from_value)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(PropertyNode::Array(nodes))
            }
            scalar => Ok(PropertyNode::Scalar(Expression::parse(scalar)?)),
        }
    }

    fn collect_dependencies(&self, deps: &mut BTreeSet<String>) {
        match self {
            PropertyNode::Object(nodes) => {
                for node in nodes.values() {
                    node.collect_dependencies(deps);
                }
            }
            PropertyNode::Array(nodes) => {
                for node in nodes {
                    node.collect_dependencies(deps);
                }
            }
            PropertyNode::Scalar(expression) => {
                deps.extend(expression.dependencies());
            }
        }
    }

    fn evaluate(&self, scope: &Scope) -> Result<Value, ExpressionError> {
        match self {
            PropertyNode::Object(nodes) => {
                let mut object = Map::new();
                for (name, node) in nodes {
                    object.insert(name.clone(), node.evaluate(scope)?);
                }
                Ok(Value::Object(object))
            }
            PropertyNode::Array(nodes) => {
                let values = nodes
                    .iter()
                    .map(|node| node.evaluate(scope))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Array(values))
            }
            PropertyNode::Scalar(expression) => expression.evaluate(scope),
        }
    }
}

/// Parsed property tree of one resource entry
#[derive(Debug, Clone, Default)]
pub struct Properties {
    properties: BTreeMap<String, PropertyNode>,
    dependencies: BTreeSet<String>,
}

impl Properties {
    /// Parse a `properties` value; `None` yields an empty tree
    pub fn parse(properties: Option<&Value>) -> Result<Properties, ExpressionError> {
        let Some(value) = properties else {
            return Ok(Properties::default());
        };
        let Value::Object(map) = value else {
            return Err(ExpressionError::Parse {
                source: value.to_string(),
                message: "resource properties must be an object".to_string(),
            });
        };

        let mut parsed = BTreeMap::new();
        let mut dependencies = BTreeSet::new();
        for (name, element) in map {
            let node = PropertyNode::from_value(element)?;
            node.collect_dependencies(&mut dependencies);
            parsed.insert(name.clone(), node);
        }

        Ok(Properties {
            properties: parsed,
            dependencies,
        })
    }

    /// Union of dependencies across every leaf
    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }

    /// Expand the whole tree against a scope
    pub fn evaluate(&self, scope: &Scope) -> Result<Value, ExpressionError> {
        let mut object = Map::new();
        for (name, node) in &self.properties {
            object.insert(name.clone(), node.evaluate(scope)?);
        }
        Ok(Value::Object(object))
    }
}
