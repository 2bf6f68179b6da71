use super::ForestData;
use hnc_api::{KindRef, Manifest};

impl ForestData {
    //
    // Source-object catalogs
    //

    /// Records `manifest` as the locally authored source in its namespace,
    /// returning whether the stored value changed.
    pub fn set_source_object(&mut self, manifest: Manifest) -> bool {
        let namespace = manifest.namespace().to_string();
        let node = self.get(&namespace);
        let by_name = node.sources.entry(manifest.kind.clone()).or_default();

        match by_name.get(manifest.name()) {
            Some(existing) if *existing == manifest => false,
            _ => {
                by_name.insert(manifest.name().to_string(), manifest);
                true
            }
        }
    }

    /// Removes a recorded source, returning whether one was present.
    pub fn delete_source_object(&mut self, namespace: &str, kind: &KindRef, name: &str) -> bool {
        let node = self.get(namespace);
        node.sources
            .get_mut(kind)
            .is_some_and(|by_name| by_name.remove(name).is_some())
    }

    #[must_use]
    pub fn has_source(&self, namespace: &str, kind: &KindRef, name: &str) -> bool {
        self.try_get(namespace)
            .and_then(|ns| ns.sources.get(kind))
            .is_some_and(|by_name| by_name.contains_key(name))
    }

    /// The authoritative source for (kind, name) as seen from `namespace`:
    /// walks the ancestry top-down (root first, `namespace` last) and
    /// returns the first hit, so the topmost source wins and shadowed ones
    /// below behave as propagated copies.
    #[must_use]
    pub fn get_source(
        &self,
        namespace: &str,
        kind: &KindRef,
        name: &str,
    ) -> Option<(String, Manifest)> {
        let ancestry = self.ancestry_names(namespace);
        ancestry.iter().rev().find_map(|ancestor| {
            self.try_get(ancestor)
                .and_then(|ns| ns.sources.get(kind))
                .and_then(|by_name| by_name.get(name))
                .map(|manifest| (ancestor.clone(), manifest.clone()))
        })
    }

    /// Names of the sources of `kind` authored directly in `namespace`.
    #[must_use]
    pub fn source_names(&self, namespace: &str, kind: &KindRef) -> Vec<String> {
        self.try_get(namespace)
            .and_then(|ns| ns.sources.get(kind))
            .map(|by_name| by_name.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Names of every source of `kind` visible from `namespace`, i.e.
    /// authored in it or any ancestor. These are the candidate propagation
    /// targets after a structural change.
    #[must_use]
    pub fn visible_source_names(&self, namespace: &str, kind: &KindRef) -> Vec<String> {
        let mut names: Vec<String> = self
            .ancestry_names(namespace)
            .iter()
            .flat_map(|ancestor| self.source_names(ancestor, kind))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Total number of sources of `kind` across the forest.
    #[must_use]
    pub fn num_sources(&self, kind: &KindRef) -> u64 {
        self.node_names()
            .iter()
            .map(|ns| self.source_names(ns, kind).len() as u64)
            .sum()
    }

    /// Drops every recorded source in `namespace`, returning the (kind,
    /// name) pairs that were present. Used when the orchestrator reports the
    /// namespace gone.
    pub fn clear_sources(&mut self, namespace: &str) -> Vec<(KindRef, String)> {
        let node = self.get(namespace);
        let mut dropped = Vec::new();
        for (kind, by_name) in std::mem::take(&mut node.sources) {
            for name in by_name.into_keys() {
                dropped.push((kind.clone(), name));
            }
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn role_kind() -> KindRef {
        KindRef::new("rbac.orchestrator.io", "v1", "Role", "roles")
    }

    fn role(ns: &str, name: &str, verb: &str) -> Manifest {
        Manifest::new(role_kind(), ns, name).with_content(json!({ "verbs": [verb] }))
    }

    #[test]
    fn topmost_source_wins() {
        let mut data = ForestData::default();
        data.set_parent("mid", Some("root"));
        data.set_parent("leaf", Some("mid"));

        assert!(data.set_source_object(role("mid", "admin", "get")));
        assert!(data.set_source_object(role("root", "admin", "list")));

        // From the leaf, the root's source shadows the mid one.
        let (source_ns, manifest) = data.get_source("leaf", &role_kind(), "admin").unwrap();
        assert_eq!(source_ns, "root");
        assert_eq!(manifest.content, json!({ "verbs": ["list"] }));

        // The shadowed namespace sees the topmost source too.
        let (source_ns, _) = data.get_source("mid", &role_kind(), "admin").unwrap();
        assert_eq!(source_ns, "root");
    }

    #[test]
    fn set_source_reports_changes() {
        let mut data = ForestData::default();
        assert!(data.set_source_object(role("ns", "admin", "get")));
        assert!(!data.set_source_object(role("ns", "admin", "get")));
        assert!(data.set_source_object(role("ns", "admin", "watch")));
    }

    #[test]
    fn visible_sources_include_ancestors() {
        let mut data = ForestData::default();
        data.set_parent("child", Some("parent"));
        data.set_source_object(role("parent", "from-parent", "get"));
        data.set_source_object(role("child", "from-child", "get"));

        assert_eq!(
            data.visible_source_names("child", &role_kind()),
            ["from-child", "from-parent"]
        );
        assert_eq!(
            data.visible_source_names("parent", &role_kind()),
            ["from-parent"]
        );
    }

    #[test]
    fn clear_sources_drops_everything() {
        let mut data = ForestData::default();
        data.set_source_object(role("ns", "a", "get"));
        data.set_source_object(role("ns", "b", "get"));

        let dropped = data.clear_sources("ns");
        assert_eq!(dropped.len(), 2);
        assert!(!data.has_source("ns", &role_kind(), "a"));
        assert_eq!(data.num_sources(&role_kind()), 0);
    }
}
