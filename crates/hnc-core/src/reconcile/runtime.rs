use crate::cluster::Cluster;
use crate::forest::Forest;
use crate::log;
use crate::log::Topic;
use crate::reconcile::queue::{Router, build_queues};
use crate::reconcile::{
    AnchorKey, AnchorReconciler, ConfigReconciler, HierarchyReconciler, ObjectKey, Pending,
    ReconcileError, config::CONFIG_HEARTBEAT,
};
use crate::settings::Settings;
use std::sync::Arc;
use tokio::task::JoinHandle;

///
/// Controller
/// The running reconciler set: four workers plus the config heartbeat.
/// Admission validators are served separately; they only need the forest.
///

pub struct Controller {
    pub router: Router,
    tasks: Vec<JoinHandle<()>>,
}

impl Controller {
    /// Spawns the workers on the current tokio runtime and seeds the queues
    /// with everything currently stored in the orchestrator.
    #[must_use]
    pub fn spawn(forest: Arc<Forest>, cluster: Arc<dyn Cluster>, settings: Arc<Settings>) -> Self {
        let (router, runners) = build_queues();
        let mut tasks = Vec::new();

        let hierarchy = Arc::new(HierarchyReconciler::new(
            Arc::clone(&forest),
            Arc::clone(&cluster),
            Arc::clone(&settings),
        ));
        tasks.push(tokio::spawn(runners.namespaces.run(
            settings.workers.hierarchy,
            router.clone(),
            move |name: String| {
                let hierarchy = Arc::clone(&hierarchy);
                async move { hierarchy.reconcile(&name).await }
            },
        )));

        let anchors = Arc::new(AnchorReconciler::new(
            Arc::clone(&forest),
            Arc::clone(&cluster),
            Arc::clone(&settings),
        ));
        tasks.push(tokio::spawn(runners.anchors.run(
            settings.workers.hierarchy,
            router.clone(),
            move |key: AnchorKey| {
                let anchors = Arc::clone(&anchors);
                async move { anchors.reconcile(&key).await }
            },
        )));

        // Object keys carry their kind; the worker routes each to the
        // registered syncer. A missing syncer retries with backoff until
        // the config reconciler has registered it.
        let object_forest = Arc::clone(&forest);
        tasks.push(tokio::spawn(runners.objects.run(
            settings.workers.objects,
            router.clone(),
            move |key: ObjectKey| {
                let forest = Arc::clone(&object_forest);
                async move {
                    let syncer = forest.lock().get_kind_syncer(&key.kind);
                    match syncer {
                        Some(syncer) => syncer.reconcile_object(&key).await,
                        None => Err(ReconcileError::UnknownKind(key.kind.clone())),
                    }
                }
            },
        )));

        let config = Arc::new(ConfigReconciler::new(
            Arc::clone(&forest),
            Arc::clone(&cluster),
            Arc::clone(&settings),
        ));
        tasks.push(tokio::spawn(runners.config.run(
            1,
            router.clone(),
            move |(): ()| {
                let config = Arc::clone(&config);
                async move { config.reconcile().await }
            },
        )));

        let heartbeat_router = router.clone();
        tasks.push(tokio::spawn(async move {
            loop {
                tokio::time::sleep(CONFIG_HEARTBEAT).await;
                heartbeat_router.config.add(());
            }
        }));

        let seed_router = router.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(err) = seed(&seed_router, cluster).await {
                log!(Topic::Config, WARN, "initial seeding failed: {err}");
            }
        }));

        Self { router, tasks }
    }

    pub fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}

/// Enqueues every stored namespace and anchor once, plus a config pass, so
/// the forest converges without waiting for events.
async fn seed(router: &Router, cluster: Arc<dyn Cluster>) -> Result<(), ReconcileError> {
    let mut pending = Pending::default();
    pending.config = true;
    for namespace in cluster.list_namespaces().await? {
        let name = &namespace.meta.name;
        pending.namespace(name);
        for anchor in cluster.list_anchors(name).await? {
            pending.anchor(AnchorKey::new(anchor.parent(), anchor.child()));
        }
    }
    router.dispatch(pending);
    Ok(())
}
