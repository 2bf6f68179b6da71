#![allow(dead_code)]

use hnc_api::{
    HierarchyConfiguration, HncConfiguration, KindRef, Manifest, Mode, Namespace, ResourceSpec,
};
use hnc_core::kinds::RBAC_GROUP;
use hnc_testkit::Harness;
use serde_json::json;

pub fn role_kind() -> KindRef {
    KindRef::new(RBAC_GROUP, "v1", "Role", "roles")
}

pub fn role_binding_kind() -> KindRef {
    KindRef::new(RBAC_GROUP, "v1", "RoleBinding", "rolebindings")
}

pub fn secret_kind() -> KindRef {
    KindRef::new("", "v1", "Secret", "secrets")
}

/// A harness whose discovery knows the two enforced access-control kinds.
pub fn harness() -> Harness {
    init_tracing();
    let harness = Harness::new();
    harness.cluster.add_kind(role_kind());
    harness.cluster.add_kind(role_binding_kind());
    harness
}

/// Route controller logs through the test harness when RUST_LOG asks for
/// them.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn add_namespace(harness: &Harness, name: &str) {
    harness.cluster.put_namespace(Namespace::named(name));
}

/// Stores the requested parent the way an admitted user edit would.
pub fn set_parent(harness: &Harness, child: &str, parent: Option<&str>) {
    let mut entity = harness
        .cluster
        .hierarchy(child)
        .unwrap_or_else(|| HierarchyConfiguration::for_namespace(child));
    entity.spec.parent = parent.map(String::from);
    harness.cluster.put_hierarchy(entity);
}

pub fn allow_cascading_deletion(harness: &Harness, namespace: &str) {
    let mut entity = harness
        .cluster
        .hierarchy(namespace)
        .unwrap_or_else(|| HierarchyConfiguration::for_namespace(namespace));
    entity.spec.allow_cascading_deletion = true;
    harness.cluster.put_hierarchy(entity);
}

pub fn role(namespace: &str, name: &str) -> Manifest {
    Manifest::new(role_kind(), namespace, name).with_content(json!({
        "rules": [{ "resources": ["pods"], "verbs": ["get", "list"] }]
    }))
}

pub fn secret(namespace: &str, name: &str) -> Manifest {
    Manifest::new(secret_kind(), namespace, name).with_content(json!({
        "type": "Opaque",
        "data": { "token": "c2VjcmV0" }
    }))
}

/// A configuration singleton managing secrets in the given mode.
pub fn secrets_config(mode: Mode) -> HncConfiguration {
    let mut config = HncConfiguration::singleton();
    config
        .spec
        .resources
        .push(ResourceSpec::new("", "secrets", Some(mode)));
    config
}
