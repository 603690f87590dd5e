//! Layered variable bindings for expression evaluation
//!
//! The scope carries exactly three reserved roots: `parameters`, `refs`, and
//! `resources`. It is immutable; the planner extends it one completed
//! resource at a time via [`Scope::with_resource`], which is what makes the
//! topological order observable to downstream expressions.

use serde_json::{Map, Value};

/// Immutable evaluation scope
#[derive(Clone, Debug, Default)]
pub struct Scope {
    parameters: Map<String, Value>,
    refs: Map<String, Value>,
    resources: Map<String, Value>,
}

impl Scope {
    /// Scope seeded with bundle parameters and resolved refs
    pub fn new(parameters: Map<String, Value>, refs: Map<String, Value>) -> Self {
        Self {
            parameters,
            refs,
            resources: Map::new(),
        }
    }

    /// Extended scope exposing a completed resource under `resources.<name>`
    pub fn with_resource(&self, name: &str, body: Value) -> Scope {
        let mut next = self.clone();
        next.resources.insert(name.to_string(), body);
        next
    }

    /// Resolve a reserved root; a missing root evaluates to an empty mapping
    pub(crate) fn root(&self, name: &str) -> Option<Value> {
        match name {
            "parameters" => Some(Value::Object(self.parameters.clone())),
            "refs" => Some(Value::Object(self.refs.clone())),
            "resources" => Some(Value::Object(self.resources.clone())),
            _ => None,
        }
    }
}
