// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Property-based tests for the universal invariants.

use pml::canonical::canonical_json;
use pml::graph::TaskGraph;
use pml::sanitize::Sanitizer;
use pml::state::{reduce, StateUpdate, WorkflowState};
use pml::task::{Task, TaskResult};
use proptest::prelude::*;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashSet};

/// Random DAG: each task may depend on any subset of earlier tasks, which
/// keeps generation acyclic by construction.
fn arb_dag() -> impl Strategy<Value = Vec<Task>> {
    (1usize..12)
        .prop_flat_map(|n| {
            let masks = proptest::collection::vec(any::<u16>(), n);
            let priorities = proptest::collection::vec(-5i32..5, n);
            (Just(n), masks, priorities)
        })
        .prop_map(|(n, masks, priorities)| {
            (0..n)
                .map(|i| {
                    let deps: Vec<String> = (0..i)
                        .filter(|j| masks[i] & (1u16 << (j % 16)) != 0)
                        .map(|j| format!("t{j}"))
                        .collect();
                    Task::tool_call(format!("t{i}"), "test:tool")
                        .depends_on(deps)
                        .with_priority(priorities[i])
                })
                .collect()
        })
}

proptest! {
    // P1: layering is a valid topological order.
    #[test]
    fn layering_is_topological(tasks in arb_dag()) {
        let graph = TaskGraph::new(tasks).unwrap();
        for task in graph.tasks() {
            let layer = graph.layer_of(&task.id).unwrap();
            for dep in &task.depends_on {
                prop_assert!(graph.layer_of(dep).unwrap() < layer);
            }
        }
        // Every task appears in exactly one layer.
        let mut seen = HashSet::new();
        for layer in graph.layers() {
            for id in layer {
                prop_assert!(seen.insert(id.clone()));
            }
        }
        prop_assert_eq!(seen.len(), graph.len());
    }

    // P2: no two tasks in one layer depend on each other, even transitively.
    #[test]
    fn layers_contain_no_mutual_dependencies(tasks in arb_dag()) {
        let graph = TaskGraph::new(tasks).unwrap();
        for layer in graph.layers() {
            let members: HashSet<&str> = layer.iter().map(String::as_str).collect();
            for id in layer {
                for dependent in graph.transitive_dependents_of(id) {
                    prop_assert!(
                        !members.contains(dependent.id.as_str()),
                        "{} and {} share a layer but are ordered",
                        id,
                        dependent.id
                    );
                }
            }
        }
    }

    // P3: the reducer is idempotent for the collections keyed by id.
    #[test]
    fn reducer_is_idempotent_for_keyed_collections(
        outputs in proptest::collection::vec(any::<i64>(), 1..6),
        layer in 0usize..10,
    ) {
        let sanitizer = Sanitizer::new();
        let mut update = StateUpdate::for_layer(layer);
        for (i, value) in outputs.iter().enumerate() {
            update = update.record(
                TaskResult::success(format!("t{i}"), json!({ "v": value }), 1),
                &sanitizer,
            );
        }

        let base = WorkflowState::new("wf", BTreeMap::new(), &sanitizer);
        let once = reduce(&base, &update);
        let twice = reduce(&once, &update);

        prop_assert_eq!(&once.tasks, &twice.tasks);
        prop_assert_eq!(&once.context, &twice.context);
        prop_assert_eq!(once.current_layer, twice.current_layer);
        prop_assert_eq!(once.replan_count, twice.replan_count);
    }

    // P4: sanitized values stay JSON-representable and secret-free.
    #[test]
    fn sanitization_removes_secrets_and_stays_json(
        prefix in "[a-zA-Z ]{0,12}",
        key_body in "[A-Za-z0-9]{16,24}",
        suffix in "[a-zA-Z ]{0,12}",
    ) {
        let sanitizer = Sanitizer::new();
        let secret = format!("{prefix}sk-{key_body}{suffix}");
        let value = json!({
            "note": secret,
            "nested": [{"token": format!("Bearer {key_body}")}],
        });

        let clean = sanitizer.sanitize(&value);
        let rendered = serde_json::to_string(&clean).unwrap();
        let needle = format!("sk-{}", key_body);
        prop_assert!(!rendered.contains(&needle));
        prop_assert!(!sanitizer.contains_secret(&rendered));
    }

    // P9: canonical JSON is stable under key permutation.
    #[test]
    fn canonical_json_ignores_key_order(
        pairs in proptest::collection::vec(("[a-z]{1,6}", any::<i64>()), 1..8),
        seed in any::<u64>(),
    ) {
        let forward: Map<String, Value> = pairs
            .iter()
            .map(|(k, v)| (k.clone(), json!(v)))
            .collect();

        // Insert in a different order.
        let mut shuffled = pairs.clone();
        let n = shuffled.len();
        for i in 0..n {
            let j = ((seed as usize).wrapping_add(i * 7)) % n;
            shuffled.swap(i, j);
        }
        let backward: Map<String, Value> = shuffled
            .into_iter()
            .map(|(k, v)| (k, json!(v)))
            .collect();

        prop_assert_eq!(
            canonical_json(&Value::Object(forward)),
            canonical_json(&Value::Object(backward))
        );
    }
}

// P7 is deterministic; keep it out of the proptest harness.
#[test]
fn speculation_and_validation_are_complements_on_known_tools() {
    use pml::safety::{ApprovalMode, PermissionScope, SafetyOracle, StaticPermissions, ToolPermissions};
    use std::sync::Arc;

    let mut table = StaticPermissions::new();
    let combos = [
        (ApprovalMode::Auto, true),
        (ApprovalMode::Auto, false),
        (ApprovalMode::Hil, true),
        (ApprovalMode::Hil, false),
    ];
    for (i, (approval, read_only)) in combos.iter().enumerate() {
        table = table.with_tool(
            format!("tool{i}"),
            ToolPermissions {
                approval: *approval,
                scope: PermissionScope::Minimal,
                read_only: *read_only,
                field_mappings: BTreeMap::new(),
            },
        );
    }
    let oracle = SafetyOracle::new(Arc::new(table));

    for i in 0..combos.len() {
        let tool = format!("tool{i}");
        assert_eq!(
            oracle.can_speculate(&tool, false),
            !oracle.requires_validation(&tool),
            "complement violated for {tool}"
        );
    }

    // Unknown tools are conservative on both sides.
    assert!(!oracle.can_speculate("unknown", false));
    assert!(oracle.requires_validation("unknown"));
}
