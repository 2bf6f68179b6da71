//! `ObjectReconciler` behavior driven directly against `InMemoryCluster`,
//! independent of the full settle-loop harness.

use hnc_api::{Condition, ConditionCode, KindRef, Manifest, Mode};
use hnc_core::forest::Forest;
use hnc_core::kinds::{KindSyncer, RBAC_GROUP};
use hnc_core::reconcile::{ObjectKey, ObjectReconciler};
use hnc_core::settings::Settings;
use hnc_testkit::InMemoryCluster;
use serde_json::json;
use std::sync::Arc;

fn role_kind() -> KindRef {
    KindRef::new(RBAC_GROUP, "v1", "Role", "roles")
}

fn role(ns: &str, name: &str) -> Manifest {
    Manifest::new(role_kind(), ns, name).with_content(json!({
        "rules": [{ "resources": ["pods"], "verbs": ["get"] }]
    }))
}

fn fixture() -> (Arc<Forest>, Arc<InMemoryCluster>, Arc<ObjectReconciler>) {
    let forest = Forest::new();
    let cluster = InMemoryCluster::new();
    {
        let mut data = forest.lock();
        data.get("parent").exists = true;
        data.get("child").exists = true;
        data.set_parent("child", Some("parent"));
    }
    let reconciler = ObjectReconciler::new(
        role_kind(),
        Mode::Propagate,
        Arc::clone(&forest),
        cluster.clone(),
        Settings::test_default(),
    );
    (forest, cluster, reconciler)
}

fn key(ns: &str, name: &str) -> ObjectKey {
    ObjectKey::new(role_kind(), ns, name)
}

#[tokio::test]
async fn sources_are_recorded_and_descendants_enqueued() {
    let (forest, cluster, reconciler) = fixture();
    cluster.put_object(role("parent", "admin"));

    let pending = reconciler.reconcile(&key("parent", "admin")).await.unwrap();
    assert!(pending.objects.contains(&key("child", "admin")));
    assert!(forest.lock().has_source("parent", &role_kind(), "admin"));

    reconciler.reconcile(&key("child", "admin")).await.unwrap();
    let copy = cluster.object(&role_kind(), "child", "admin").unwrap();
    assert_eq!(copy.inherited_from(), Some("parent"));
}

#[tokio::test]
async fn stale_copies_are_removed() {
    let (_, cluster, reconciler) = fixture();
    let mut orphan = role("child", "gone");
    orphan.set_inherited_from("parent");
    cluster.put_object(orphan);

    reconciler.reconcile(&key("child", "gone")).await.unwrap();
    assert!(cluster.object(&role_kind(), "child", "gone").is_none());
}

#[tokio::test]
async fn shadowed_descendant_objects_are_overwritten() {
    let (_, cluster, reconciler) = fixture();
    cluster.put_object(role("parent", "shared"));
    reconciler.reconcile(&key("parent", "shared")).await.unwrap();

    // A descendant-originated object with the same name behaves as a
    // propagated copy and is overwritten.
    let user_version = Manifest::new(role_kind(), "child", "shared")
        .with_content(json!({ "rules": [] }));
    cluster.put_object(user_version);
    reconciler.reconcile(&key("child", "shared")).await.unwrap();

    let copy = cluster.object(&role_kind(), "child", "shared").unwrap();
    assert_eq!(copy.inherited_from(), Some("parent"));
    assert_eq!(copy.content, role("parent", "shared").content);
}

#[tokio::test]
async fn critical_conditions_pause_the_destination() {
    let (forest, cluster, reconciler) = fixture();
    cluster.put_object(role("parent", "admin"));
    reconciler.reconcile(&key("parent", "admin")).await.unwrap();

    forest.lock().set_condition(
        "child",
        Condition::new(ConditionCode::CritCycle, "cycle"),
    );
    reconciler.reconcile(&key("child", "admin")).await.unwrap();
    assert!(cluster.object(&role_kind(), "child", "admin").is_none());

    // Clearing the condition lets the copy through.
    forest
        .lock()
        .clear_condition("child", ConditionCode::CritCycle, None);
    reconciler.reconcile(&key("child", "admin")).await.unwrap();
    assert!(cluster.object(&role_kind(), "child", "admin").is_some());
}

#[tokio::test]
async fn remove_mode_deletes_copies_but_not_sources() {
    let (_, cluster, reconciler) = fixture();
    cluster.put_object(role("parent", "admin"));
    reconciler.reconcile(&key("parent", "admin")).await.unwrap();
    reconciler.reconcile(&key("child", "admin")).await.unwrap();
    assert!(cluster.object(&role_kind(), "child", "admin").is_some());

    assert!(reconciler.set_mode(Mode::Remove));
    reconciler.reconcile(&key("child", "admin")).await.unwrap();
    reconciler.reconcile(&key("parent", "admin")).await.unwrap();

    assert!(cluster.object(&role_kind(), "child", "admin").is_none());
    assert!(cluster.object(&role_kind(), "parent", "admin").is_some());
}
