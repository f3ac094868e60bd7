//! Read-merge-write reconciliation against a snapshot store.

use bizsync_model::{
    ApplyOutcome, ConflictLog, ConflictResolver, ConflictType, CrdtRecord, MalformedStatePolicy,
    MemoryConflictLog, MemorySnapshotStore, ModelError, Reconciler, RecordEditor, ResolverConfig,
    SnapshotStore,
};
use bizsync_types::{EntityId, HybridClock, ManualClock, NodeId};
use std::sync::Arc;
use std::thread;

type MemoryReconciler = Reconciler<MemorySnapshotStore, MemoryConflictLog>;

fn reconciler(config: ResolverConfig) -> MemoryReconciler {
    Reconciler::new(
        MemorySnapshotStore::new(),
        MemoryConflictLog::new(),
        ConflictResolver::with_clock(config, Arc::new(ManualClock::new(7))),
    )
}

fn editor(node: &str, record: CrdtRecord, wall: &ManualClock) -> RecordEditor {
    let clock = HybridClock::with_source(NodeId::new(node), Arc::new(wall.clone()));
    RecordEditor::new(record, clock)
}

fn payment(wall: &ManualClock) -> RecordEditor {
    let mut ed = editor("a", CrdtRecord::new(EntityId::new(), "payment"), wall);
    ed.set("method", "bank_transfer").unwrap();
    ed.increment("allocated", 0).unwrap();
    ed
}

#[test]
fn first_apply_inserts() {
    let wall = ManualClock::new(1_000);
    let r = reconciler(ResolverConfig::default());
    let record = payment(&wall).into_record();

    assert_eq!(r.apply(&record).unwrap(), ApplyOutcome::Inserted);
    assert_eq!(r.store().len().unwrap(), 1);
    let stored: CrdtRecord = r.load(&record.id()).unwrap().unwrap();
    assert_eq!(stored, record);
    assert!(r.log().records().unwrap().is_empty());
}

#[test]
fn duplicate_delivery_is_unchanged() {
    let wall = ManualClock::new(1_000);
    let r = reconciler(ResolverConfig::default());
    let record = payment(&wall).into_record();

    r.apply(&record).unwrap();
    assert_eq!(r.apply(&record).unwrap(), ApplyOutcome::Unchanged);
    assert_eq!(r.apply(&record).unwrap(), ApplyOutcome::Unchanged);
    assert!(r.log().records().unwrap().is_empty());
}

#[test]
fn stale_version_leaves_store_unchanged() {
    let wall = ManualClock::new(1_000);
    let r = reconciler(ResolverConfig::default());
    let mut ed = payment(&wall);
    let old = ed.record().clone();
    wall.advance(10);
    ed.set("method", "card").unwrap();
    let new = ed.into_record();

    r.apply(&new).unwrap();
    assert_eq!(r.apply(&old).unwrap(), ApplyOutcome::Unchanged);

    let stored: CrdtRecord = r.load(&new.id()).unwrap().unwrap();
    assert_eq!(stored.plain()["method"], "card");

    let records = r.log().records().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].conflict_type, ConflictType::Causal);
    assert_eq!(records[0].detected_at, 7);
}

#[test]
fn concurrent_versions_are_merged_and_logged() {
    let wall = ManualClock::new(1_000);
    let r = reconciler(ResolverConfig::default());
    let base = payment(&wall).into_record();
    r.apply(&base).unwrap();

    let mut a = editor("a", base.clone(), &wall);
    let mut b = editor("b", base, &wall);
    a.increment("allocated", 40).unwrap();
    b.increment("allocated", 60).unwrap();

    r.apply(a.record()).unwrap();
    assert_eq!(r.apply(b.record()).unwrap(), ApplyOutcome::Merged);

    let stored: CrdtRecord = r.load(&a.record().id()).unwrap().unwrap();
    assert_eq!(stored.plain()["allocated"], 100);

    let records = r.log().records().unwrap();
    let last = records.last().unwrap();
    assert_eq!(last.conflict_type, ConflictType::Concurrent);
    assert_eq!(last.concurrent_fields, vec!["allocated".to_string()]);
}

#[test]
fn corrupt_snapshot_is_rejected_by_default() {
    let wall = ManualClock::new(1_000);
    let r = reconciler(ResolverConfig::default());
    let record = payment(&wall).into_record();
    r.store().save_raw(&record.id(), "{ not json").unwrap();

    let err = r.apply(&record).unwrap_err();
    assert!(matches!(err, ModelError::MalformedSnapshot { entity_id, .. } if entity_id == record.id()));
    assert_eq!(
        r.store().load_raw(&record.id()).unwrap().as_deref(),
        Some("{ not json")
    );
}

#[test]
fn corrupt_snapshot_is_replaced_under_reset_policy() {
    let wall = ManualClock::new(1_000);
    let r = reconciler(ResolverConfig {
        malformed_local_state: MalformedStatePolicy::Reset,
        ..ResolverConfig::default()
    });
    let record = payment(&wall).into_record();
    r.store().save_raw(&record.id(), "{ not json").unwrap();

    assert_eq!(r.apply(&record).unwrap(), ApplyOutcome::Inserted);
    let stored: CrdtRecord = r.load(&record.id()).unwrap().unwrap();
    assert_eq!(stored, record);
}

#[test]
fn parallel_applies_to_one_entity_lose_nothing() {
    let wall = ManualClock::new(1_000);
    let r = reconciler(ResolverConfig::default());
    let base = payment(&wall).into_record();
    r.apply(&base).unwrap();

    let versions: Vec<CrdtRecord> = (0..16)
        .map(|n| {
            let mut ed = editor(&format!("device-{n}"), base.clone(), &wall);
            ed.increment("allocated", 10).unwrap();
            ed.insert("receipts", format!("rcpt-{n}")).unwrap();
            ed.into_record()
        })
        .collect();

    thread::scope(|s| {
        for version in &versions {
            let r = &r;
            s.spawn(move || r.apply(version).unwrap());
        }
    });

    let stored: CrdtRecord = r.load(&base.id()).unwrap().unwrap();
    assert_eq!(stored.plain()["allocated"], 160);
    assert_eq!(stored.plain()["receipts"].as_array().unwrap().len(), 16);
}

#[test]
fn failing_log_aborts_before_write() {
    struct BrokenLog;

    impl ConflictLog for BrokenLog {
        fn append(&self, _: &bizsync_model::ConflictRecord) -> bizsync_model::ModelResult<()> {
            Err(ModelError::Storage("audit log offline".to_string()))
        }
    }

    let wall = ManualClock::new(1_000);
    let r = Reconciler::new(
        MemorySnapshotStore::new(),
        BrokenLog,
        ConflictResolver::default(),
    );
    let base = payment(&wall).into_record();
    r.apply(&base).unwrap();

    let mut b = editor("b", base.clone(), &wall);
    b.increment("allocated", 5).unwrap();

    assert!(matches!(r.apply(b.record()), Err(ModelError::Storage(_))));
    let stored: CrdtRecord = r.load(&base.id()).unwrap().unwrap();
    assert_eq!(stored, base);
}

#[test]
fn display_edit_from_lagging_device_is_kept() {
    let ahead = ManualClock::new(9_000);
    let r = reconciler(ResolverConfig::default());
    let mut a = editor("a", CrdtRecord::new(EntityId::new(), "payment"), &ahead);
    a.set_display("label", "paid").unwrap();
    r.apply(a.record()).unwrap();

    let behind = ManualClock::new(1_000);
    let stored: CrdtRecord = r.load(&a.record().id()).unwrap().unwrap();
    let mut b = editor("b", stored, &behind);
    b.set_display("label", "draft").unwrap();

    assert_eq!(r.apply(b.record()).unwrap(), ApplyOutcome::Merged);
    let stored: CrdtRecord = r.load(&a.record().id()).unwrap().unwrap();
    assert_eq!(stored.plain()["label"], "draft");
}
