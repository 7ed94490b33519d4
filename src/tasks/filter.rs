//! JSON predicate language used by change subscriptions and queries.
//!
//! A [`JsonFilter`] is the serializable form sent by clients. Before it is
//! evaluated it is compiled once into a [`CompiledFilter`], which can then be
//! applied to any number of entities.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::cmp::Ordering;

/// Boolean predicate over a JSON entity. Fields are dotted paths (`a.b.c`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum JsonFilter {
    True,
    Equal { field: String, value: Value },
    NotEqual { field: String, value: Value },
    Less { field: String, value: Value },
    LessOrEqual { field: String, value: Value },
    Greater { field: String, value: Value },
    GreaterOrEqual { field: String, value: Value },
    In { field: String, values: Vec<Value> },
    Exists { field: String },
    StartsWith { field: String, prefix: String },
    And { filters: Vec<JsonFilter> },
    Or { filters: Vec<JsonFilter> },
    Not { filter: Box<JsonFilter> },
}

impl JsonFilter {
    pub fn equal(field: impl Into<String>, value: impl Into<Value>) -> Self {
        JsonFilter::Equal {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn greater(field: impl Into<String>, value: impl Into<Value>) -> Self {
        JsonFilter::Greater {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn less(field: impl Into<String>, value: impl Into<Value>) -> Self {
        JsonFilter::Less {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Compile into an evaluator. Field paths are split once here.
    pub fn compile(&self) -> CompiledFilter {
        CompiledFilter {
            root: Node::build(self),
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Compare {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug)]
enum Node {
    True,
    Compare {
        path: Vec<String>,
        cmp: Compare,
        value: Value,
    },
    In {
        path: Vec<String>,
        values: Vec<Value>,
    },
    Exists {
        path: Vec<String>,
    },
    StartsWith {
        path: Vec<String>,
        prefix: String,
    },
    And(Vec<Node>),
    Or(Vec<Node>),
    Not(Box<Node>),
}

fn split_path(field: &str) -> Vec<String> {
    field
        .split('.')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Node {
    fn build(filter: &JsonFilter) -> Node {
        let compare = |field: &str, cmp: Compare, value: &Value| Node::Compare {
            path: split_path(field),
            cmp,
            value: value.clone(),
        };
        match filter {
            JsonFilter::True => Node::True,
            JsonFilter::Equal { field, value } => compare(field, Compare::Eq, value),
            JsonFilter::NotEqual { field, value } => compare(field, Compare::Ne, value),
            JsonFilter::Less { field, value } => compare(field, Compare::Lt, value),
            JsonFilter::LessOrEqual { field, value } => compare(field, Compare::Le, value),
            JsonFilter::Greater { field, value } => compare(field, Compare::Gt, value),
            JsonFilter::GreaterOrEqual { field, value } => compare(field, Compare::Ge, value),
            JsonFilter::In { field, values } => Node::In {
                path: split_path(field),
                values: values.clone(),
            },
            JsonFilter::Exists { field } => Node::Exists {
                path: split_path(field),
            },
            JsonFilter::StartsWith { field, prefix } => Node::StartsWith {
                path: split_path(field),
                prefix: prefix.clone(),
            },
            JsonFilter::And { filters } => Node::And(filters.iter().map(Node::build).collect()),
            JsonFilter::Or { filters } => Node::Or(filters.iter().map(Node::build).collect()),
            JsonFilter::Not { filter } => Node::Not(Box::new(Node::build(filter))),
        }
    }

    fn eval(&self, entity: &Value) -> bool {
        match self {
            Node::True => true,
            Node::Compare { path, cmp, value } => {
                let field = lookup(entity, path);
                // a missing field is not equal to anything
                let equal = || field.is_some_and(|f| json_eq(f, value));
                let ordering = || field.and_then(|f| json_cmp(f, value));
                match cmp {
                    Compare::Eq => equal(),
                    Compare::Ne => !equal(),
                    Compare::Lt => ordering() == Some(Ordering::Less),
                    Compare::Le => matches!(ordering(), Some(Ordering::Less | Ordering::Equal)),
                    Compare::Gt => ordering() == Some(Ordering::Greater),
                    Compare::Ge => {
                        matches!(ordering(), Some(Ordering::Greater | Ordering::Equal))
                    }
                }
            }
            Node::In { path, values } => {
                lookup(entity, path).is_some_and(|f| values.iter().any(|v| json_eq(f, v)))
            }
            Node::Exists { path } => lookup(entity, path).is_some_and(|f| !f.is_null()),
            Node::StartsWith { path, prefix } => lookup(entity, path)
                .and_then(Value::as_str)
                .is_some_and(|s| s.starts_with(prefix.as_str())),
            Node::And(nodes) => nodes.iter().all(|n| n.eval(entity)),
            Node::Or(nodes) => nodes.iter().any(|n| n.eval(entity)),
            Node::Not(node) => !node.eval(entity),
        }
    }
}

fn lookup<'a>(entity: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(entity, |current, key| current.get(key.as_str()))
}

/// Numbers are compared by value so `1` equals `1.0`.
fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => number_cmp(x, y) == Some(Ordering::Equal),
        _ => a == b,
    }
}

fn json_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => number_cmp(x, y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Integers compare exactly, floats through `f64`.
fn number_cmp(x: &Number, y: &Number) -> Option<Ordering> {
    match (as_integer(x), as_integer(y)) {
        (Some(x), Some(y)) => Some(x.cmp(&y)),
        _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
    }
}

fn as_integer(n: &Number) -> Option<i128> {
    n.as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from))
}

/// Reusable evaluator of a [`JsonFilter`].
#[derive(Debug)]
pub struct CompiledFilter {
    root: Node,
}

impl CompiledFilter {
    /// Evaluate against one entity. Side-effect free.
    pub fn matches(&self, entity: &Value) -> bool {
        self.root.eval(entity)
    }
}
