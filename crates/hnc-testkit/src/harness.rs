use crate::cluster::{InMemoryCluster, StaticAuthorizer};
use hnc_core::forest::Forest;
use hnc_core::reconcile::{
    AnchorKey, AnchorReconciler, ConfigReconciler, HierarchyReconciler, ObjectKey, Pending,
};
use hnc_core::settings::Settings;
use hnc_core::validate::{
    AnchorValidator, ConfigValidator, HierarchyValidator, NamespaceValidator, ObjectValidator,
};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

const MAX_ROUNDS: usize = 32;
const MAX_KEYS_PER_ROUND: usize = 100_000;

///
/// Harness
/// Drives the reconcilers to a fixpoint without watches: every stored and
/// remembered key is seeded each round, returned pendings are drained, and
/// settling means a full round without a single cluster mutation.
///

pub struct Harness {
    pub forest: Arc<Forest>,
    pub cluster: Arc<InMemoryCluster>,
    pub settings: Arc<Settings>,
    pub authorizer: Arc<StaticAuthorizer>,
    hierarchy: HierarchyReconciler,
    anchors: AnchorReconciler,
    config: ConfigReconciler,
}

enum Key {
    Config,
    Namespace(String),
    Anchor(AnchorKey),
    Object(ObjectKey),
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(Settings::test_default())
    }

    #[must_use]
    pub fn with_settings(settings: Arc<Settings>) -> Self {
        let forest = Forest::new();
        let cluster = InMemoryCluster::new();
        let authorizer = StaticAuthorizer::new();

        let hierarchy = HierarchyReconciler::new(
            Arc::clone(&forest),
            cluster.clone(),
            Arc::clone(&settings),
        );
        let anchors = AnchorReconciler::new(
            Arc::clone(&forest),
            cluster.clone(),
            Arc::clone(&settings),
        );
        let config = ConfigReconciler::new(
            Arc::clone(&forest),
            cluster.clone(),
            Arc::clone(&settings),
        );

        Self {
            forest,
            cluster,
            settings,
            authorizer,
            hierarchy,
            anchors,
            config,
        }
    }

    //
    // Validators, wired to the same forest and cluster
    //

    #[must_use]
    pub fn namespace_validator(&self) -> NamespaceValidator {
        NamespaceValidator::new(Arc::clone(&self.forest), Arc::clone(&self.settings))
    }

    #[must_use]
    pub fn hierarchy_validator(&self) -> HierarchyValidator {
        HierarchyValidator::new(
            Arc::clone(&self.forest),
            self.cluster.clone(),
            self.authorizer.clone(),
        )
    }

    #[must_use]
    pub fn anchor_validator(&self) -> AnchorValidator {
        AnchorValidator::new(Arc::clone(&self.forest), Arc::clone(&self.settings))
    }

    #[must_use]
    pub fn config_validator(&self) -> ConfigValidator {
        ConfigValidator::new(Arc::clone(&self.forest), self.cluster.clone())
    }

    #[must_use]
    pub fn object_validator(&self) -> ObjectValidator {
        ObjectValidator::new(
            Arc::clone(&self.forest),
            self.cluster.clone(),
            Arc::clone(&self.settings),
        )
    }

    /// Runs reconcile rounds until a full round leaves the cluster
    /// untouched. Panics if the system refuses to quiesce, which in a test
    /// means a reconcile loop.
    pub async fn settle(&self) {
        let mut quiet_rounds = 0;
        for _ in 0..MAX_ROUNDS {
            let before = self.cluster.version();
            self.run_round().await;
            if self.cluster.version() == before {
                quiet_rounds += 1;
                if quiet_rounds >= 2 {
                    return;
                }
            } else {
                quiet_rounds = 0;
            }
        }
        panic!("reconcilers did not settle within {MAX_ROUNDS} rounds");
    }

    async fn run_round(&self) {
        let mut queue = self.seed().await;
        let mut processed = 0;
        while let Some(key) = queue.pop_front() {
            processed += 1;
            assert!(
                processed <= MAX_KEYS_PER_ROUND,
                "reconcile queue did not drain; a reconciler is looping"
            );

            let pending = match &key {
                Key::Config => self.config.reconcile().await,
                Key::Namespace(name) => self.hierarchy.reconcile(name).await,
                Key::Anchor(anchor) => self.anchors.reconcile(anchor).await,
                Key::Object(object) => {
                    let syncer = self.forest.lock().get_kind_syncer(&object.kind);
                    match syncer {
                        Some(syncer) => syncer.reconcile_object(object).await,
                        None => Ok(Pending::default()),
                    }
                }
            };

            let pending = pending.expect("reconcile failed in harness");
            push_pending(&mut queue, pending);
        }
    }

    /// Everything worth looking at: the config singleton, every namespace
    /// the cluster stores or the forest remembers, every anchor, and every
    /// object of every managed kind (stored or implied by a visible
    /// source).
    async fn seed(&self) -> VecDeque<Key> {
        let mut queue = VecDeque::new();
        queue.push_back(Key::Config);

        let mut names: BTreeSet<String> = self.cluster.namespace_names().into_iter().collect();
        names.extend(self.forest.lock().node_names());
        for name in &names {
            queue.push_back(Key::Namespace(name.clone()));
        }

        let mut anchor_keys: BTreeSet<(String, String)> =
            self.cluster.anchor_keys().into_iter().collect();
        {
            let data = self.forest.lock();
            for parent in data.node_names() {
                for child in data.anchors(&parent) {
                    anchor_keys.insert((parent.clone(), child.clone()));
                }
            }
        }
        for (parent, child) in anchor_keys {
            queue.push_back(Key::Anchor(AnchorKey::new(parent, child)));
        }

        let syncers = self.forest.lock().kind_syncers();
        for syncer in syncers {
            let kind = syncer.kind();
            let mut object_keys: BTreeSet<(String, String)> = BTreeSet::new();
            for name in &names {
                for manifest in self.cluster.objects_in(&kind, name) {
                    object_keys.insert((name.clone(), manifest.name().to_string()));
                }
                for object_name in self.forest.lock().visible_source_names(name, &kind) {
                    object_keys.insert((name.clone(), object_name));
                }
            }
            for (namespace, object_name) in object_keys {
                queue.push_back(Key::Object(ObjectKey::new(
                    kind.clone(),
                    namespace,
                    object_name,
                )));
            }
        }

        queue
    }
}

fn push_pending(queue: &mut VecDeque<Key>, pending: Pending) {
    for name in pending.namespaces {
        queue.push_back(Key::Namespace(name));
    }
    for anchor in pending.anchors {
        queue.push_back(Key::Anchor(anchor));
    }
    for object in pending.objects {
        queue.push_back(Key::Object(object));
    }
    if pending.config {
        queue.push_back(Key::Config);
    }
}
