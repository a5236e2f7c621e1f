//! Fact tuples and the `Kernel` contract.
//!
//! DESIGN DECISION: a fact is a flat `{predicate, args}` tuple, matching the
//! kernel contract in spec.md §6 exactly rather than a typed per-predicate
//! struct.
//! WHY: shards assert heterogeneous predicates (`test_state`, `failed_test`,
//! `coverage_metric`, prompt-fragment metadata, …) against one logical
//! engine they never otherwise touch; a single value-carrying tuple keeps
//! the shard/kernel boundary narrow, matching the corpus convention of
//! injecting collaborators as narrow trait objects (teacher's
//! `domain_agent.rs` trait-per-collaborator style, generalized here to a
//! single `Kernel` trait per spec.md §9 "Cyclic references").

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A single argument value carried by a `Fact`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// A tuple asserted into the durable fact engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub predicate: String,
    pub args: Vec<Value>,
}

impl Fact {
    pub fn new(predicate: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            predicate: predicate.into(),
            args,
        }
    }
}

/// Narrow contract for the durable fact engine ("kernel"). The kernel's own
/// rule language and policy files are out of scope (spec.md §1) — this
/// crate depends only on the ability to assert tuples and answer queries.
#[async_trait]
pub trait Kernel: Send + Sync {
    async fn assert(&self, fact: Fact) -> Result<()>;
    async fn query(&self, predicate: &str) -> Result<Vec<Fact>>;
    async fn load_facts(&self, facts: Vec<Fact>) -> Result<()>;
    async fn load_policy_file(&self, name: &str) -> Result<()>;
}
