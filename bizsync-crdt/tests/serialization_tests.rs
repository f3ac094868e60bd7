//! Stored-state compatibility: canonical key names, tolerance of data
//! written by newer or older devices, and rejection of unreadable state.

use bizsync_crdt::{CrdtCounter, CrdtRegister, ORSet, PNCounter, Tag};
use bizsync_types::{HlcTimestamp, NodeId};
use pretty_assertions::assert_eq;
use serde_json::json;

fn node(name: &str) -> NodeId {
    NodeId::new(name)
}

#[test]
fn pncounter_round_trip_keeps_unknown_nodes() {
    let stored = json!({
        "node_id": "laptop",
        "positive_counters": { "laptop": 5, "phone-2031": 12 },
        "negative_counters": { "tablet-9": 4 },
        "vector_clock": { "laptop": 1, "phone-2031": 3, "tablet-9": 2 },
        "current_value": 13
    });

    let counter: PNCounter = serde_json::from_value(stored.clone()).unwrap();
    assert_eq!(counter.value(), 13);
    assert_eq!(counter.positive_for(&node("phone-2031")), 12);
    assert_eq!(counter.negative_for(&node("tablet-9")), 4);

    assert_eq!(serde_json::to_value(&counter).unwrap(), stored);
}

#[test]
fn empty_node_ids_are_rejected() {
    let owner = serde_json::from_value::<PNCounter>(json!({ "node_id": "" }));
    assert!(owner.is_err());

    let entry = serde_json::from_value::<PNCounter>(json!({
        "node_id": "a",
        "positive_counters": { "": 3 }
    }));
    assert!(entry.is_err());
}

#[test]
fn pncounter_ignores_unknown_top_level_keys() {
    let counter: PNCounter = serde_json::from_value(json!({
        "node_id": "a",
        "positive_counters": { "a": 2 },
        "schema_hint": "v9"
    }))
    .unwrap();
    assert_eq!(counter.value(), 2);
}

#[test]
fn pncounter_rejects_negative_entries() {
    let result: Result<PNCounter, _> = serde_json::from_value(json!({
        "node_id": "a",
        "positive_counters": { "a": -3 }
    }));
    assert!(result.is_err());
}

#[test]
fn orset_serialized_form() {
    let set = ORSet::new(node("a")).add_with_tag("net-30".to_string(), Tag::new(node("a"), 1, 1_700_000_000_000));
    let json = serde_json::to_value(&set).unwrap();

    assert_eq!(
        json,
        json!({
            "node_id": "a",
            "elements": {
                "net-30": [ { "node_id": "a", "counter": 1, "timestamp": 1_700_000_000_000u64 } ]
            },
            "removed_tags": [],
            "vector_clock": { "a": 0 },
            "tag_counter": 1,
            "current_elements": ["net-30"]
        })
    );
}

#[test]
fn orset_round_trip_keeps_foreign_tags_and_tombstones() {
    let stored = json!({
        "node_id": "a",
        "elements": {
            "x": [ { "node_id": "a", "counter": 3, "timestamp": 10 } ],
            "y": [ { "node_id": "future-node", "counter": 8, "timestamp": 11 } ]
        },
        "removed_tags": [ { "node_id": "future-node", "counter": 8, "timestamp": 11 } ],
        "vector_clock": { "a": 3, "future-node": 8 },
        "tag_counter": 3,
        "current_elements": ["x"]
    });

    let set: ORSet<String> = serde_json::from_value(stored.clone()).unwrap();
    assert!(set.contains(&"x".to_string()));
    assert!(!set.contains(&"y".to_string()));
    assert_eq!(set.clock().get(&node("future-node")), 8);
    assert_eq!(serde_json::to_value(&set).unwrap(), stored);
}

#[test]
fn orset_missing_tag_timestamp_defaults() {
    let set: ORSet<String> = serde_json::from_value(json!({
        "node_id": "a",
        "elements": { "x": [ { "node_id": "b", "counter": 1 } ] }
    }))
    .unwrap();
    let tag = set.tags_for(&"x".to_string()).unwrap().iter().next().unwrap().clone();
    assert_eq!(tag.timestamp(), 0);
}

#[test]
fn orset_stale_tag_counter_is_raised_on_load() {
    let set: ORSet<String> = serde_json::from_value(json!({
        "node_id": "a",
        "elements": { "x": [ { "node_id": "a", "counter": 9, "timestamp": 0 } ] },
        "tag_counter": 2
    }))
    .unwrap();
    assert_eq!(set.tag_counter(), 9);
}

#[test]
fn orset_integer_keys_round_trip() {
    let set: ORSet<i64> = ORSet::new(node("a")).add(42).add(-7);
    let json = serde_json::to_string(&set).unwrap();
    let back: ORSet<i64> = serde_json::from_str(&json).unwrap();
    assert_eq!(back, set);
    assert!(back.contains(&-7));
}

#[test]
fn orset_undecodable_key_fails_to_load() {
    let result: Result<ORSet<i64>, _> = serde_json::from_value(json!({
        "node_id": "a",
        "elements": { "not-a-number": [ { "node_id": "a", "counter": 1, "timestamp": 0 } ] }
    }));
    let err = result.unwrap_err().to_string();
    assert!(err.contains("not-a-number"), "{err}");
}

#[test]
fn crdt_register_serialized_form() {
    let reg = CrdtRegister::new(3_i32, HlcTimestamp::new(12, 1, node("a")));
    assert_eq!(
        serde_json::to_value(&reg).unwrap(),
        json!({ "value": 3, "timestamp": "000000000000012-0000000001-a" })
    );
}

#[test]
fn crdt_counter_serialized_form() {
    assert_eq!(
        serde_json::to_value(CrdtCounter::new(-4)).unwrap(),
        json!({ "value": -4 })
    );
    let empty: CrdtCounter = serde_json::from_str("{}").unwrap();
    assert_eq!(empty.value(), 0);
}
