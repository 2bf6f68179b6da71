use async_trait::async_trait;
use hnc_api::{
    GroupResource, HierarchyConfiguration, HncConfiguration, KindRef, Manifest, Namespace,
    SubnamespaceAnchor,
};
use hnc_core::cluster::{Authorizer, Cluster, ClusterError};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

///
/// InMemoryCluster
/// Orchestrator stand-in. Mutations bump a version counter so the harness
/// can detect quiescence; finalizer and cascading-deletion semantics follow
/// the orchestrator contract the reconcilers are written against.
///

#[derive(Default)]
pub struct InMemoryCluster {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    version: u64,
    namespaces: BTreeMap<String, Namespace>,
    hierarchies: BTreeMap<String, HierarchyConfiguration>,
    anchors: BTreeMap<(String, String), SubnamespaceAnchor>,
    config: Option<HncConfiguration>,
    objects: BTreeMap<(KindRef, String, String), Manifest>,
    discoverable: Vec<KindRef>,
    schemas_deleting: bool,
    immutable_kinds: BTreeSet<KindRef>,
}

impl InMemoryCluster {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Monotonic change counter; unchanged across a full pass means settled.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.state.lock().version
    }

    //
    // Test setup
    //

    /// Makes a kind resolvable through discovery.
    pub fn add_kind(&self, kind: KindRef) {
        let mut state = self.state.lock();
        if !state.discoverable.contains(&kind) {
            state.discoverable.push(kind);
            state.version += 1;
        }
    }

    /// Removes a kind from discovery, as if its schema were uninstalled.
    pub fn remove_kind(&self, kind: &KindRef) {
        let mut state = self.state.lock();
        state.discoverable.retain(|k| k != kind);
        state.version += 1;
    }

    /// Marks the controller's own schemas as being torn down.
    pub fn set_schemas_deleting(&self, deleting: bool) {
        let mut state = self.state.lock();
        state.schemas_deleting = deleting;
        state.version += 1;
    }

    /// Makes in-place updates of `kind` fail as Invalid, forcing the
    /// delete-then-create fallback.
    pub fn make_updates_invalid(&self, kind: KindRef) {
        self.state.lock().immutable_kinds.insert(kind);
    }

    //
    // Direct state access for seeding and assertions (bypasses admission,
    // like any sufficiently privileged client would)
    //

    pub fn put_namespace(&self, namespace: Namespace) {
        let mut state = self.state.lock();
        state.namespaces.insert(namespace.meta.name.clone(), namespace);
        state.version += 1;
    }

    pub fn put_hierarchy(&self, entity: HierarchyConfiguration) {
        let mut state = self.state.lock();
        state
            .hierarchies
            .insert(entity.namespace().to_string(), entity);
        state.version += 1;
    }

    pub fn put_anchor(&self, anchor: SubnamespaceAnchor) {
        let mut state = self.state.lock();
        state.anchors.insert(
            (anchor.parent().to_string(), anchor.child().to_string()),
            anchor,
        );
        state.version += 1;
    }

    pub fn put_config(&self, config: HncConfiguration) {
        let mut state = self.state.lock();
        state.config = Some(config);
        state.version += 1;
    }

    pub fn put_object(&self, manifest: Manifest) {
        let mut state = self.state.lock();
        state.objects.insert(
            (
                manifest.kind.clone(),
                manifest.namespace().to_string(),
                manifest.name().to_string(),
            ),
            manifest,
        );
        state.version += 1;
    }

    pub fn remove_object(&self, kind: &KindRef, namespace: &str, name: &str) {
        let mut state = self.state.lock();
        state.objects.remove(&(
            kind.clone(),
            namespace.to_string(),
            name.to_string(),
        ));
        state.version += 1;
    }

    #[must_use]
    pub fn namespace(&self, name: &str) -> Option<Namespace> {
        self.state.lock().namespaces.get(name).cloned()
    }

    #[must_use]
    pub fn hierarchy(&self, namespace: &str) -> Option<HierarchyConfiguration> {
        self.state.lock().hierarchies.get(namespace).cloned()
    }

    #[must_use]
    pub fn anchor(&self, parent: &str, name: &str) -> Option<SubnamespaceAnchor> {
        self.state
            .lock()
            .anchors
            .get(&(parent.to_string(), name.to_string()))
            .cloned()
    }

    #[must_use]
    pub fn config(&self) -> Option<HncConfiguration> {
        self.state.lock().config.clone()
    }

    #[must_use]
    pub fn object(&self, kind: &KindRef, namespace: &str, name: &str) -> Option<Manifest> {
        self.state
            .lock()
            .objects
            .get(&(kind.clone(), namespace.to_string(), name.to_string()))
            .cloned()
    }

    #[must_use]
    pub fn objects_in(&self, kind: &KindRef, namespace: &str) -> Vec<Manifest> {
        self.state
            .lock()
            .objects
            .iter()
            .filter(|((k, ns, _), _)| k == kind && ns == namespace)
            .map(|(_, manifest)| manifest.clone())
            .collect()
    }

    /// Every anchor currently stored, as (parent, child) pairs.
    #[must_use]
    pub fn anchor_keys(&self) -> Vec<(String, String)> {
        self.state.lock().anchors.keys().cloned().collect()
    }

    #[must_use]
    pub fn namespace_names(&self) -> Vec<String> {
        self.state.lock().namespaces.keys().cloned().collect()
    }
}

#[async_trait]
impl Cluster for InMemoryCluster {
    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, ClusterError> {
        Ok(self.state.lock().namespaces.get(name).cloned())
    }

    async fn list_namespaces(&self) -> Result<Vec<Namespace>, ClusterError> {
        Ok(self.state.lock().namespaces.values().cloned().collect())
    }

    async fn create_namespace(&self, namespace: &Namespace) -> Result<(), ClusterError> {
        let mut state = self.state.lock();
        let name = namespace.meta.name.clone();
        if state.namespaces.contains_key(&name) {
            return Err(ClusterError::AlreadyExists(format!("namespace '{name}'")));
        }
        state.namespaces.insert(name, namespace.clone());
        state.version += 1;
        Ok(())
    }

    async fn update_namespace(&self, namespace: &Namespace) -> Result<(), ClusterError> {
        let mut state = self.state.lock();
        let name = namespace.meta.name.clone();
        if !state.namespaces.contains_key(&name) {
            return Err(ClusterError::NotFound(format!("namespace '{name}'")));
        }
        state.namespaces.insert(name, namespace.clone());
        state.version += 1;
        Ok(())
    }

    /// Namespace deletion cascades the way the orchestrator's own garbage
    /// collection does: contained objects and the hierarchy entity vanish;
    /// contained anchors are released through their finalizers so the
    /// anchor deletion protocol can cascade further.
    async fn delete_namespace(&self, name: &str) -> Result<(), ClusterError> {
        let mut state = self.state.lock();
        if state.namespaces.remove(name).is_none() {
            return Err(ClusterError::NotFound(format!("namespace '{name}'")));
        }
        state.hierarchies.remove(name);
        state.objects.retain(|(_, ns, _), _| ns != name);

        let contained: Vec<(String, String)> = state
            .anchors
            .keys()
            .filter(|(parent, _)| parent == name)
            .cloned()
            .collect();
        for key in contained {
            let remove = {
                let anchor = state.anchors.get_mut(&key);
                match anchor {
                    Some(anchor) if anchor.meta.finalizers.is_empty() => true,
                    Some(anchor) => {
                        anchor.meta.deletion_timestamp =
                            Some("namespace-deleted".to_string());
                        false
                    }
                    None => false,
                }
            };
            if remove {
                state.anchors.remove(&key);
            }
        }
        state.version += 1;
        Ok(())
    }

    async fn get_hierarchy(
        &self,
        namespace: &str,
    ) -> Result<Option<HierarchyConfiguration>, ClusterError> {
        Ok(self.state.lock().hierarchies.get(namespace).cloned())
    }

    async fn update_hierarchy(&self, entity: &HierarchyConfiguration) -> Result<(), ClusterError> {
        let mut state = self.state.lock();
        state
            .hierarchies
            .insert(entity.namespace().to_string(), entity.clone());
        state.version += 1;
        Ok(())
    }

    async fn list_anchors(
        &self,
        namespace: &str,
    ) -> Result<Vec<SubnamespaceAnchor>, ClusterError> {
        Ok(self
            .state
            .lock()
            .anchors
            .iter()
            .filter(|((parent, _), _)| parent == namespace)
            .map(|(_, anchor)| anchor.clone())
            .collect())
    }

    async fn get_anchor(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<SubnamespaceAnchor>, ClusterError> {
        Ok(self
            .state
            .lock()
            .anchors
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn update_anchor(&self, anchor: &SubnamespaceAnchor) -> Result<(), ClusterError> {
        let mut state = self.state.lock();
        let key = (anchor.parent().to_string(), anchor.child().to_string());
        // A deleting anchor whose finalizers are gone is collected.
        if anchor.meta.is_deleting() && anchor.meta.finalizers.is_empty() {
            state.anchors.remove(&key);
        } else {
            state.anchors.insert(key, anchor.clone());
        }
        state.version += 1;
        Ok(())
    }

    async fn delete_anchor(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        let mut state = self.state.lock();
        let key = (namespace.to_string(), name.to_string());
        let Some(anchor) = state.anchors.get_mut(&key) else {
            return Err(ClusterError::NotFound(format!(
                "anchor '{namespace}/{name}'"
            )));
        };
        if anchor.meta.finalizers.is_empty() {
            state.anchors.remove(&key);
        } else {
            anchor.meta.deletion_timestamp = Some("deleted".to_string());
        }
        state.version += 1;
        Ok(())
    }

    async fn get_hnc_config(&self) -> Result<Option<HncConfiguration>, ClusterError> {
        Ok(self.state.lock().config.clone())
    }

    async fn update_hnc_config(&self, config: &HncConfiguration) -> Result<(), ClusterError> {
        let mut state = self.state.lock();
        state.config = Some(config.clone());
        state.version += 1;
        Ok(())
    }

    async fn get_object(
        &self,
        kind: &KindRef,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Manifest>, ClusterError> {
        Ok(self
            .state
            .lock()
            .objects
            .get(&(kind.clone(), namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn list_objects(
        &self,
        kind: &KindRef,
        namespace: &str,
    ) -> Result<Vec<Manifest>, ClusterError> {
        Ok(self
            .state
            .lock()
            .objects
            .iter()
            .filter(|((k, ns, _), _)| k == kind && ns == namespace)
            .map(|(_, manifest)| manifest.clone())
            .collect())
    }

    async fn create_object(&self, manifest: &Manifest) -> Result<(), ClusterError> {
        let mut state = self.state.lock();
        let key = (
            manifest.kind.clone(),
            manifest.namespace().to_string(),
            manifest.name().to_string(),
        );
        if state.objects.contains_key(&key) {
            return Err(ClusterError::AlreadyExists(format!(
                "object '{}'",
                manifest.name()
            )));
        }
        state.objects.insert(key, manifest.clone());
        state.version += 1;
        Ok(())
    }

    async fn update_object(&self, manifest: &Manifest) -> Result<(), ClusterError> {
        let mut state = self.state.lock();
        let key = (
            manifest.kind.clone(),
            manifest.namespace().to_string(),
            manifest.name().to_string(),
        );
        let Some(existing) = state.objects.get(&key) else {
            return Err(ClusterError::NotFound(format!(
                "object '{}'",
                manifest.name()
            )));
        };
        if state.immutable_kinds.contains(&manifest.kind) && existing.content != manifest.content {
            return Err(ClusterError::Invalid(format!(
                "the content of '{}' cannot be changed in place",
                manifest.name()
            )));
        }
        state.objects.insert(key, manifest.clone());
        state.version += 1;
        Ok(())
    }

    async fn delete_object(
        &self,
        kind: &KindRef,
        namespace: &str,
        name: &str,
    ) -> Result<(), ClusterError> {
        let mut state = self.state.lock();
        let key = (kind.clone(), namespace.to_string(), name.to_string());
        if state.objects.remove(&key).is_none() {
            return Err(ClusterError::NotFound(format!("object '{name}'")));
        }
        state.version += 1;
        Ok(())
    }

    async fn resolve_kind(&self, gr: &GroupResource) -> Result<Option<KindRef>, ClusterError> {
        Ok(self
            .state
            .lock()
            .discoverable
            .iter()
            .find(|kind| kind.group == gr.group && kind.resource == gr.resource)
            .cloned())
    }

    async fn hnc_schemas_deleting(&self) -> Result<bool, ClusterError> {
        Ok(self.state.lock().schemas_deleting)
    }
}

///
/// StaticAuthorizer
/// Grant-table authorizer for admission tests.
///

#[derive(Default)]
pub struct StaticAuthorizer {
    admins: Mutex<BTreeSet<(String, String)>>,
}

impl StaticAuthorizer {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn grant(&self, user: &str, namespace: &str) {
        self.admins
            .lock()
            .insert((user.to_string(), namespace.to_string()));
    }

    pub fn revoke(&self, user: &str, namespace: &str) {
        self.admins
            .lock()
            .remove(&(user.to_string(), namespace.to_string()));
    }
}

#[async_trait]
impl Authorizer for StaticAuthorizer {
    async fn is_admin(&self, user: &str, namespace: &str) -> Result<bool, ClusterError> {
        Ok(self
            .admins
            .lock()
            .contains(&(user.to_string(), namespace.to_string())))
    }
}
