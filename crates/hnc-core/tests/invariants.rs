//! Structural invariants under randomized operation sequences, plus the
//! round-trip and idempotence guarantees.

mod common;

use common::*;
use hnc_api::{ConditionCode, Mode, SubnamespaceAnchor, keys};
use hnc_core::cluster::Cluster;
use hnc_testkit::Harness;
use std::collections::BTreeMap;

/// Deterministic pseudo-random stream so failures replay exactly.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.0 >> 33
    }

    fn pick(&mut self, bound: usize) -> usize {
        (self.next() % bound as u64) as usize
    }
}

const POOL: [&str; 5] = ["n0", "n1", "n2", "n3", "n4"];
const ROLE_NAMES: [&str; 3] = ["alpha", "beta", "gamma"];

#[tokio::test]
async fn forest_invariants_hold_under_random_operations() {
    let harness = harness();
    for ns in POOL {
        add_namespace(&harness, ns);
    }
    harness.settle().await;

    let mut rng = Lcg(0x5eed_cafe);
    for _ in 0..25 {
        match rng.pick(4) {
            0 => {
                let child = POOL[rng.pick(POOL.len())];
                let parent = match rng.pick(7) {
                    0..=4 => Some(POOL[rng.pick(POOL.len())]),
                    5 => Some("ghost"),
                    _ => None,
                };
                let parent = parent.filter(|p| *p != child);
                set_parent(&harness, child, parent);
            }
            1 => {
                let ns = POOL[rng.pick(POOL.len())];
                let name = ROLE_NAMES[rng.pick(ROLE_NAMES.len())];
                harness.cluster.put_object(role(ns, name));
            }
            2 => {
                let ns = POOL[rng.pick(POOL.len())];
                let name = ROLE_NAMES[rng.pick(ROLE_NAMES.len())];
                if harness
                    .cluster
                    .object(&role_kind(), ns, name)
                    .is_some_and(|m| !m.is_propagated_copy())
                {
                    harness.cluster.remove_object(&role_kind(), ns, name);
                }
            }
            _ => {
                let ns = POOL[rng.pick(POOL.len())];
                allow_cascading_deletion(&harness, ns);
            }
        }
        harness.settle().await;
        assert_invariants(&harness);
    }
}

fn assert_invariants(harness: &Harness) {
    let data = harness.forest.lock();

    for ns in data.node_names() {
        if !data.ns_exists(&ns) {
            continue;
        }

        // Acyclicity: CritCycle iff the namespace really is a cycle member,
        // and then every member carries it.
        let cycle = data.cycle_names(&ns);
        assert_eq!(
            cycle.is_some(),
            data.has_condition(&ns, ConditionCode::CritCycle),
            "cycle condition mismatch for '{ns}'"
        );
        if let Some(members) = cycle {
            for member in members {
                assert!(
                    data.has_condition(&member, ConditionCode::CritCycle),
                    "cycle member '{member}' must carry CritCycle"
                );
            }
        }

        // Condition soundness: CritAncestor iff a strict ancestor carries a
        // local critical condition.
        assert_eq!(
            data.nearest_crit_ancestor(&ns).is_some(),
            data.has_condition(&ns, ConditionCode::CritAncestor),
            "CritAncestor mismatch for '{ns}'"
        );

        // Label correctness for healthy, internally-managed namespaces.
        let node = data.try_get(&ns).unwrap();
        if !data.has_crit(&ns) && !node.is_external() {
            let actual: BTreeMap<&str, &str> = node
                .labels
                .iter()
                .filter_map(|(key, value)| {
                    keys::parse_tree_depth_label(key).map(|a| (a, value.as_str()))
                })
                .collect();
            let ancestry = data.ancestry_names(&ns);
            let expected: BTreeMap<&str, String> = ancestry
                .iter()
                .enumerate()
                .map(|(depth, ancestor)| (ancestor.as_str(), depth.to_string()))
                .collect();
            assert_eq!(
                actual.len(),
                expected.len(),
                "depth label count mismatch for '{ns}'"
            );
            for (ancestor, depth) in expected {
                assert_eq!(actual.get(ancestor), Some(&depth.as_str()));
            }
        }
    }

    // Source uniqueness: in a healthy namespace every propagated copy names
    // the authoritative source for its (kind, name).
    for ns in data.node_names() {
        if !data.ns_exists(&ns) || data.has_crit(&ns) {
            continue;
        }
        for manifest in harness.cluster.objects_in(&role_kind(), &ns) {
            if let Some(recorded) = manifest.inherited_from() {
                let authoritative = data.get_source(&ns, &role_kind(), manifest.name());
                assert_eq!(
                    authoritative.map(|(source_ns, _)| source_ns).as_deref(),
                    Some(recorded),
                    "copy '{}' in '{ns}' names the wrong source",
                    manifest.name()
                );
            }
        }
    }
}

#[tokio::test]
async fn reapplying_the_same_parent_writes_nothing() {
    let harness = harness();
    add_namespace(&harness, "foo");
    add_namespace(&harness, "bar");
    set_parent(&harness, "bar", Some("foo"));
    harness.settle().await;

    // A settled system stays silent.
    let version = harness.cluster.version();
    harness.settle().await;
    assert_eq!(harness.cluster.version(), version);

    // Re-storing the identical entity triggers exactly the user's write
    // and nothing from the reconcilers.
    set_parent(&harness, "bar", Some("foo"));
    let version = harness.cluster.version();
    harness.settle().await;
    assert_eq!(harness.cluster.version(), version);
}

#[tokio::test]
async fn reapplying_the_same_configuration_yields_the_same_status() {
    let harness = harness();
    harness.cluster.add_kind(secret_kind());
    add_namespace(&harness, "foo");
    add_namespace(&harness, "bar");
    set_parent(&harness, "bar", Some("foo"));
    harness.cluster.put_object(secret("foo", "s"));
    harness.cluster.put_config(secrets_config(Mode::Propagate));
    harness.settle().await;
    let first = harness.cluster.config().unwrap().status;

    harness.cluster.put_config(secrets_config(Mode::Propagate));
    harness.settle().await;
    let second = harness.cluster.config().unwrap().status;
    assert_eq!(first, second);
}

#[tokio::test]
async fn anchor_delete_and_recreate_round_trips() {
    let harness = harness();
    add_namespace(&harness, "parent");
    harness
        .cluster
        .put_anchor(SubnamespaceAnchor::new("parent", "sub"));
    harness.settle().await;
    assert!(harness.cluster.namespace("sub").is_some());

    harness.cluster.delete_anchor("parent", "sub").await.unwrap();
    harness.settle().await;
    assert!(harness.cluster.namespace("sub").is_none());
    assert!(harness.cluster.anchor("parent", "sub").is_none());

    harness
        .cluster
        .put_anchor(SubnamespaceAnchor::new("parent", "sub"));
    harness.settle().await;
    let sub = harness.cluster.namespace("sub").unwrap();
    assert_eq!(sub.meta.annotation(keys::SUBNAMESPACE_OF), Some("parent"));
    assert_eq!(
        harness.forest.lock().parent("sub").as_deref(),
        Some("parent")
    );
}
