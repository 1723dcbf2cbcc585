// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Argument resolution against workflow state.
//!
//! Resolution has two modes:
//! - **strict** ([`resolve_arguments`]): any unresolvable spec aborts with a
//!   structured [`Unresolvable`] outcome. Speculation uses this; an
//!   unresolvable candidate is skipped, never guessed at.
//! - **lenient** ([`resolve_arguments_lenient`]): unresolvable specs become
//!   JSON null. Real execution uses this, so a missing upstream output (for
//!   example a `failed_safe` dependency) reaches the task as null instead of
//!   failing it before it runs.
//!
//! After resolution, field renames declared in the tool's permissions entry
//! are applied (`from_field` to `to_field`).

use crate::safety::SafetyOracle;
use crate::state::WorkflowState;
use crate::task::{ArgSpec, Task, TaskKind};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Why an argument could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unresolvable {
    /// The referenced task has not executed yet (or produced no output).
    Unexecuted { task_id: String },
    /// The referenced output exists but the JSON path points at nothing.
    MissingPath { task_id: String, json_path: String },
    /// The named workflow parameter is absent from the initial context.
    MissingParameter { name: String },
}

impl std::fmt::Display for Unresolvable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Unresolvable::Unexecuted { task_id } => {
                write!(f, "task '{task_id}' has not executed")
            }
            Unresolvable::MissingPath { task_id, json_path } => {
                write!(f, "no value at '{json_path}' in output of '{task_id}'")
            }
            Unresolvable::MissingParameter { name } => {
                write!(f, "missing workflow parameter '{name}'")
            }
        }
    }
}

/// Project a dot-separated path into a value. Numeric segments index arrays.
/// An empty path selects the whole value.
pub fn project<'a>(value: &'a Value, json_path: &str) -> Option<&'a Value> {
    if json_path.is_empty() {
        return Some(value);
    }
    let mut current = value;
    for segment in json_path.split('.') {
        current = match current {
            Value::Object(fields) => fields.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn resolve_spec(
    spec: &ArgSpec,
    state: &WorkflowState,
) -> std::result::Result<Value, Unresolvable> {
    match spec {
        ArgSpec::Literal { value } => Ok(value.clone()),
        ArgSpec::Reference { task_id, json_path } => {
            let output = state
                .context
                .get(task_id)
                .ok_or_else(|| Unresolvable::Unexecuted {
                    task_id: task_id.clone(),
                })?;
            project(output, json_path)
                .cloned()
                .ok_or_else(|| Unresolvable::MissingPath {
                    task_id: task_id.clone(),
                    json_path: json_path.clone(),
                })
        }
        ArgSpec::Parameter { name } => state
            .initial_context
            .get(name)
            .cloned()
            .ok_or_else(|| Unresolvable::MissingParameter { name: name.clone() }),
    }
}

/// Strictly resolve a bare spec map, without field mappings. Speculative
/// prediction uses this for oracle-proposed calls that have no [`Task`].
pub fn resolve_spec_map(
    specs: &BTreeMap<String, ArgSpec>,
    state: &WorkflowState,
) -> std::result::Result<Map<String, Value>, Unresolvable> {
    let mut resolved = Map::with_capacity(specs.len());
    for (name, spec) in specs {
        resolved.insert(name.clone(), resolve_spec(spec, state)?);
    }
    Ok(resolved)
}

fn apply_field_mappings(task: &Task, safety: &SafetyOracle, args: Map<String, Value>) -> Value {
    let mappings = match &task.kind {
        TaskKind::ToolCall { tool } => safety.field_mappings(tool),
        TaskKind::CodeExec { .. } => BTreeMap::new(),
    };
    if mappings.is_empty() {
        return Value::Object(args);
    }
    let mut renamed = Map::with_capacity(args.len());
    for (name, value) in args {
        let key = mappings.get(&name).cloned().unwrap_or(name);
        renamed.insert(key, value);
    }
    Value::Object(renamed)
}

/// Strictly resolve every argument of a task. Used by speculation; any
/// unresolvable spec means the candidate is skipped.
pub fn resolve_arguments(
    task: &Task,
    state: &WorkflowState,
    safety: &SafetyOracle,
) -> std::result::Result<Value, Unresolvable> {
    let resolved = resolve_spec_map(&task.arguments, state)?;
    Ok(apply_field_mappings(task, safety, resolved))
}

/// Leniently resolve: unresolvable specs become null. Used for real
/// execution, where resolution problems must not fail the task outright.
pub fn resolve_arguments_lenient(
    task: &Task,
    state: &WorkflowState,
    safety: &SafetyOracle,
) -> Value {
    let mut resolved = Map::with_capacity(task.arguments.len());
    for (name, spec) in &task.arguments {
        let value = resolve_spec(spec, state).unwrap_or(Value::Null);
        resolved.insert(name.clone(), value);
    }
    apply_field_mappings(task, safety, resolved)
}
