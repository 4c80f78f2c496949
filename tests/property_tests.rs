//! Property-based tests for the todo model and in-memory store.
//!
//! Uses proptest to verify invariants across random inputs:
//! - Created records keep their text and start not done
//! - Listing is newest first and contains every live record
//! - Patches change only the fields they carry
//! - Deleted ids never come back
//! - Only base-10 integers address in-memory records

// Property tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use proptest::prelude::*;
use simple_crud::{MemoryTodoStore, Todo, TodoId, TodoPatch};
use std::collections::HashSet;

/// One step applied to a store.
#[derive(Debug, Clone)]
enum Op {
    Create(String),
    Patch(u64, TodoPatch),
    Delete(u64),
}

fn patch_strategy() -> impl Strategy<Value = TodoPatch> {
    (proptest::option::of(".{0,20}"), proptest::option::of(any::<bool>()))
        .prop_map(|(text, done)| TodoPatch { text, done })
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        ".{0,30}".prop_map(Op::Create),
        (1..20u64, patch_strategy()).prop_map(|(id, patch)| Op::Patch(id, patch)),
        (1..20u64).prop_map(Op::Delete),
    ]
}

proptest! {
    /// Property: a created record echoes its text, is not done and has the next id.
    #[test]
    fn prop_create_preserves_text(texts in proptest::collection::vec(".{0,50}", 1..20)) {
        let store = MemoryTodoStore::new();
        for (i, text) in texts.iter().enumerate() {
            let todo = store.insert(text.as_str()).unwrap();
            prop_assert_eq!(&todo.text, text);
            prop_assert!(!todo.done);
            prop_assert_eq!(todo.id, TodoId::Seq(i as u64 + 1));
        }
    }

    /// Property: a random operation sequence leaves the store in the same
    /// state as a simple model, listed newest first.
    #[test]
    fn prop_store_matches_model(ops in proptest::collection::vec(op_strategy(), 0..60)) {
        let store = MemoryTodoStore::new();
        let mut model: Vec<Todo> = Vec::new();
        let mut deleted: HashSet<u64> = HashSet::new();

        for op in ops {
            match op {
                Op::Create(text) => {
                    let todo = store.insert(text).unwrap();
                    model.push(todo);
                },
                Op::Patch(id, patch) => {
                    let result = store.patch(&id.to_string(), &patch).unwrap();
                    let expected = model.iter_mut().find(|t| t.id == TodoId::Seq(id));
                    match (result, expected) {
                        (Some(updated), Some(entry)) => {
                            patch.apply(entry);
                            prop_assert_eq!(&updated, &*entry);
                        },
                        (None, None) => {},
                        (got, want) => prop_assert!(false, "patch {id}: got {got:?}, want {want:?}"),
                    }
                },
                Op::Delete(id) => {
                    let removed = store.remove(&id.to_string()).unwrap();
                    let position = model.iter().position(|t| t.id == TodoId::Seq(id));
                    prop_assert_eq!(removed, position.is_some());
                    if let Some(position) = position {
                        model.remove(position);
                        deleted.insert(id);
                    }
                },
            }
        }

        let listed = store.snapshot().unwrap();
        let mut expected = model.clone();
        expected.reverse();
        prop_assert_eq!(&listed, &expected);

        for pair in listed.windows(2) {
            prop_assert!(pair[0].created_at >= pair[1].created_at);
        }
        for todo in &listed {
            prop_assert!(!deleted.contains(&todo.id.as_seq().unwrap()));
        }
    }

    /// Property: an empty patch is a no-op.
    #[test]
    fn prop_empty_patch_is_noop(text in ".{0,30}") {
        let store = MemoryTodoStore::new();
        let created = store.insert(text).unwrap();

        let updated = store.patch("1", &TodoPatch::default()).unwrap().unwrap();
        prop_assert_eq!(updated, created);
    }

    /// Property: identifiers that are not base-10 integers address nothing.
    #[test]
    fn prop_non_numeric_ids_match_nothing(raw in "[a-zA-Z_-][a-zA-Z0-9_-]{0,24}") {
        let store = MemoryTodoStore::new();
        store.insert("buy milk").unwrap();

        prop_assert!(store.patch(&raw, &TodoPatch::done(true)).unwrap().is_none());
        prop_assert!(!store.remove(&raw).unwrap());
        prop_assert_eq!(store.len().unwrap(), 1);
    }

    /// Property: `TodoPatch` JSON deserialization keeps exactly the given fields.
    #[test]
    fn prop_patch_json_fields(text in proptest::option::of("[a-z ]{0,20}"), done in proptest::option::of(any::<bool>())) {
        let mut body = serde_json::Map::new();
        if let Some(text) = &text {
            body.insert("text".to_string(), serde_json::json!(text));
        }
        if let Some(done) = done {
            body.insert("done".to_string(), serde_json::json!(done));
        }
        body.insert("createdAt".to_string(), serde_json::json!("2000-01-01T00:00:00Z"));

        let patch: TodoPatch = serde_json::from_value(serde_json::Value::Object(body)).unwrap();
        prop_assert_eq!(patch.text, text);
        prop_assert_eq!(patch.done, done);
    }
}
