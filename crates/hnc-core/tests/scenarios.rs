//! End-to-end flows: hierarchy edits, propagation, anchors, and mode
//! changes driven through the in-memory orchestrator until quiescence.

mod common;

use common::*;
use hnc_api::{AnchorState, ConditionCode, Manifest, Mode, Namespace, SubnamespaceAnchor, keys};
use hnc_core::cluster::Cluster;
use hnc_core::validate::Review;

#[tokio::test]
async fn roles_propagate_into_children() {
    let harness = harness();
    add_namespace(&harness, "foo");
    add_namespace(&harness, "bar");
    set_parent(&harness, "bar", Some("foo"));
    harness.cluster.put_object(role("foo", "foo-role"));
    harness.settle().await;

    let copy = harness
        .cluster
        .object(&role_kind(), "bar", "foo-role")
        .expect("role must propagate into the child");
    assert_eq!(copy.inherited_from(), Some("foo"));

    // The child records its position in the tree.
    let bar = harness.cluster.namespace("bar").unwrap();
    assert_eq!(bar.meta.label(&keys::tree_depth_label("bar")), Some("0"));
    assert_eq!(bar.meta.label(&keys::tree_depth_label("foo")), Some("1"));

    // The parent's status lists the child.
    let foo_entity = harness.cluster.hierarchy("foo").unwrap();
    assert_eq!(foo_entity.status.children, ["bar"]);
}

#[tokio::test]
async fn propagation_reaches_grandchildren_but_never_climbs() {
    let harness = harness();
    for ns in ["foo", "bar", "baz"] {
        add_namespace(&harness, ns);
    }
    set_parent(&harness, "bar", Some("foo"));
    set_parent(&harness, "baz", Some("bar"));
    harness.cluster.put_object(role("foo", "foo-role"));
    harness.cluster.put_object(role("bar", "bar-role"));
    harness.settle().await;

    let in_baz = harness.cluster.object(&role_kind(), "baz", "foo-role").unwrap();
    assert_eq!(in_baz.inherited_from(), Some("foo"));

    let bar_role_in_baz = harness.cluster.object(&role_kind(), "baz", "bar-role").unwrap();
    assert_eq!(bar_role_in_baz.inherited_from(), Some("bar"));

    // Nothing climbs up.
    assert!(harness.cluster.object(&role_kind(), "foo", "bar-role").is_none());
}

#[tokio::test]
async fn missing_parents_pause_the_subtree_until_they_appear() {
    let harness = harness();
    for ns in ["foo", "bar", "baz"] {
        add_namespace(&harness, ns);
    }
    set_parent(&harness, "bar", Some("foo"));
    set_parent(&harness, "baz", Some("bar"));
    harness.cluster.put_object(role("foo", "foo-role"));
    harness.settle().await;

    set_parent(&harness, "foo", Some("missing"));
    harness.settle().await;

    let has = |ns: &str, code: ConditionCode| {
        harness
            .cluster
            .hierarchy(ns)
            .unwrap()
            .status
            .conditions
            .iter()
            .any(|c| c.code == code)
    };
    assert!(has("foo", ConditionCode::CritParentMissing));
    assert!(has("bar", ConditionCode::CritAncestor));
    assert!(has("baz", ConditionCode::CritAncestor));

    // Deleting the source changes nothing under a paused subtree.
    harness.cluster.remove_object(&role_kind(), "foo", "foo-role");
    harness.settle().await;
    assert!(harness.cluster.object(&role_kind(), "bar", "foo-role").is_some());
    assert!(harness.cluster.object(&role_kind(), "baz", "foo-role").is_some());

    // Creating the missing parent resumes the subtree.
    add_namespace(&harness, "missing");
    harness.settle().await;
    assert!(!has("foo", ConditionCode::CritParentMissing));
    assert!(!has("bar", ConditionCode::CritAncestor));
    assert!(harness.cluster.object(&role_kind(), "bar", "foo-role").is_none());
    assert!(harness.cluster.object(&role_kind(), "baz", "foo-role").is_none());
}

#[tokio::test]
async fn anchors_create_and_cascade_subnamespaces() {
    let harness = harness();
    add_namespace(&harness, "foo");
    harness.cluster.put_anchor(SubnamespaceAnchor::new("foo", "sub"));
    harness.settle().await;

    let sub = harness.cluster.namespace("sub").expect("subnamespace created");
    assert_eq!(sub.meta.annotation(keys::SUBNAMESPACE_OF), Some("foo"));
    assert_eq!(
        harness.cluster.anchor("foo", "sub").unwrap().status.state,
        AnchorState::Ok
    );

    // Direct deletion of the parent is rejected while the subnamespace
    // does not permit cascading deletion.
    let validator = harness.namespace_validator();
    let denial = validator
        .review(&Review::delete("alice", Namespace::named("foo")))
        .unwrap_err();
    assert!(denial.message.contains("sub"), "{}", denial.message);

    allow_cascading_deletion(&harness, "foo");
    harness.settle().await;
    assert!(
        validator
            .review(&Review::delete("alice", Namespace::named("foo")))
            .is_ok()
    );

    harness.cluster.delete_namespace("foo").await.unwrap();
    harness.settle().await;
    assert!(harness.cluster.namespace("foo").is_none());
    assert!(harness.cluster.namespace("sub").is_none());
    assert!(harness.cluster.anchor("foo", "sub").is_none());
}

#[tokio::test]
async fn secrets_follow_the_configured_mode() {
    let harness = harness();
    harness.cluster.add_kind(secret_kind());
    for ns in ["foo", "bar", "baz"] {
        add_namespace(&harness, ns);
    }
    set_parent(&harness, "bar", Some("foo"));
    set_parent(&harness, "baz", Some("foo"));
    harness.cluster.put_config(secrets_config(Mode::Propagate));
    harness.cluster.put_object(secret("foo", "s"));
    harness.settle().await;

    assert!(harness.cluster.object(&secret_kind(), "bar", "s").is_some());
    assert!(harness.cluster.object(&secret_kind(), "baz", "s").is_some());

    harness.cluster.put_config(secrets_config(Mode::Remove));
    harness.settle().await;

    assert!(harness.cluster.object(&secret_kind(), "bar", "s").is_none());
    assert!(harness.cluster.object(&secret_kind(), "baz", "s").is_none());
    // The source is left alone.
    let source = harness.cluster.object(&secret_kind(), "foo", "s").unwrap();
    assert!(!source.is_propagated_copy());
}

#[tokio::test]
async fn select_annotations_restrict_destinations() {
    let harness = harness();
    for ns in ["foo", "bar", "baz"] {
        add_namespace(&harness, ns);
    }
    set_parent(&harness, "bar", Some("foo"));
    set_parent(&harness, "baz", Some("foo"));

    let mut source = role("foo", "scoped");
    source.meta.set_annotation(
        keys::PROPAGATE_SELECT,
        format!("!{}", keys::tree_depth_label("bar")),
    );
    harness.cluster.put_object(source.clone());
    harness.settle().await;

    assert!(harness.cluster.object(&role_kind(), "baz", "scoped").is_some());
    assert!(harness.cluster.object(&role_kind(), "bar", "scoped").is_none());

    // Widening the selector brings the copy back within bounded rounds.
    source.meta.remove_annotation(keys::PROPAGATE_SELECT);
    harness.cluster.put_object(source);
    harness.settle().await;
    assert!(harness.cluster.object(&role_kind(), "bar", "scoped").is_some());
}

#[tokio::test]
async fn service_account_tokens_never_propagate() {
    let harness = harness();
    harness.cluster.add_kind(secret_kind());
    add_namespace(&harness, "foo");
    add_namespace(&harness, "bar");
    set_parent(&harness, "bar", Some("foo"));
    harness.cluster.put_config(secrets_config(Mode::Propagate));

    let token = Manifest::new(secret_kind(), "foo", "token").with_content(serde_json::json!({
        "type": keys::SERVICE_ACCOUNT_TOKEN_TYPE,
        "data": { "token": "c2VjcmV0" }
    }));
    harness.cluster.put_object(token);
    harness.settle().await;

    assert!(harness.cluster.object(&secret_kind(), "bar", "token").is_none());
}
