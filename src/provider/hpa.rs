//! External metric rules declared as HPA annotations
//!
//! A HorizontalPodAutoscaler can define external metrics inline:
//!
//! ```yaml
//! metadata:
//!   annotations:
//!     wavefront.com.external.metric.queue-depth: ts(rabbitmq.queue.depth)
//! ```
//!
//! The watcher keeps the [`RuleStore`] in sync with these annotations across
//! all namespaces.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use kube::{
    api::Api,
    client::Client,
    runtime::{watcher, WatchStreamExt},
    ResourceExt,
};
use tracing::{debug, error, info, warn};

use super::rules::RuleStore;
use crate::config::MetricRule;

/// Annotation key prefix; the remainder after the `.` is the rule name
pub const METRIC_ANNOTATION_PREFIX: &str = "wavefront.com.external.metric";

pub type Annotations = BTreeMap<String, String>;

/// Change of an annotated object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationEvent {
    Added(Annotations),
    Updated { old: Annotations, new: Annotations },
    Deleted(Annotations),
}

/// Extract the metric rules declared in `annotations`
pub fn rules_from_annotations(annotations: &Annotations) -> Vec<MetricRule> {
    annotations
        .iter()
        .filter_map(|(key, query)| {
            let name = key
                .strip_prefix(METRIC_ANNOTATION_PREFIX)?
                .strip_prefix('.')?;
            if name.is_empty() {
                return None;
            }
            Some(MetricRule::new(name, query.clone()))
        })
        .collect()
}

/// Apply one annotation change to the store
///
/// An update with unchanged annotations is skipped entirely. Otherwise the
/// old rules are deleted and the new ones added as two separate mutations,
/// so readers may briefly see the old rules missing.
pub async fn apply_event(store: &RuleStore, event: AnnotationEvent) {
    match event {
        AnnotationEvent::Added(annotations) => {
            store.add_rules(rules_from_annotations(&annotations)).await;
        }
        AnnotationEvent::Deleted(annotations) => {
            store.delete_rules(rules_from_annotations(&annotations)).await;
        }
        AnnotationEvent::Updated { old, new } => {
            if old == new {
                return;
            }
            store.delete_rules(rules_from_annotations(&old)).await;
            store.add_rules(rules_from_annotations(&new)).await;
        }
    }
}

/// Turns watcher snapshots into add/update/delete events
///
/// The watch stream only carries the current state of an object, so the
/// previous annotations are remembered per `namespace/name`.
#[derive(Debug, Default)]
pub struct AnnotationTracker {
    known: HashMap<String, Annotations>,
    relist_seen: Option<HashSet<String>>,
}

impl AnnotationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current annotations of `key`
    pub fn apply(&mut self, key: String, annotations: Annotations) -> AnnotationEvent {
        if let Some(seen) = self.relist_seen.as_mut() {
            seen.insert(key.clone());
        }
        match self.known.insert(key, annotations.clone()) {
            Some(old) => AnnotationEvent::Updated {
                old,
                new: annotations,
            },
            None => AnnotationEvent::Added(annotations),
        }
    }

    /// Forget `key`, preferring the annotations its rules were added from
    pub fn delete(&mut self, key: &str, annotations: Annotations) -> AnnotationEvent {
        AnnotationEvent::Deleted(self.known.remove(key).unwrap_or(annotations))
    }

    /// A full re-list of the watched objects starts
    pub fn begin_relist(&mut self) {
        self.relist_seen = Some(HashSet::new());
    }

    /// A re-list completed; objects it did not return were deleted meanwhile
    pub fn finish_relist(&mut self) -> Vec<AnnotationEvent> {
        let Some(seen) = self.relist_seen.take() else {
            return Vec::new();
        };
        let gone: Vec<String> = self
            .known
            .keys()
            .filter(|key| !seen.contains(*key))
            .cloned()
            .collect();
        gone.into_iter()
            .filter_map(|key| self.known.remove(&key))
            .map(AnnotationEvent::Deleted)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}

/// Watches HorizontalPodAutoscalers in all namespaces
pub struct HpaWatcher {
    client: Client,
    store: Arc<RuleStore>,
}

impl HpaWatcher {
    pub fn new(client: Client, store: Arc<RuleStore>) -> Self {
        Self { client, store }
    }

    /// Follow the HPA watch stream until it ends
    ///
    /// Watch errors are logged; the stream backs off and re-establishes the
    /// watch on its own.
    pub async fn run(self) {
        info!("Listening for HPA instances");

        let api: Api<HorizontalPodAutoscaler> = Api::all(self.client.clone());
        let mut stream = watcher(api, watcher::Config::default())
            .default_backoff()
            .boxed();
        let mut tracker = AnnotationTracker::new();

        while let Some(event) = stream.next().await {
            match event {
                Ok(event) => self.handle(&mut tracker, event).await,
                Err(e) => warn!("HPA watch error: {}", e),
            }
        }

        error!("HPA watch stream ended");
    }

    async fn handle(
        &self,
        tracker: &mut AnnotationTracker,
        event: watcher::Event<HorizontalPodAutoscaler>,
    ) {
        match event {
            watcher::Event::Apply(hpa) | watcher::Event::InitApply(hpa) => {
                let key = object_key(&hpa);
                let change = tracker.apply(key.clone(), hpa.annotations().clone());
                if let AnnotationEvent::Updated { old, new } = &change {
                    if old == new {
                        debug!("Annotations have not changed for {}", key);
                    }
                }
                apply_event(&self.store, change).await;
            }
            watcher::Event::Delete(hpa) => {
                let key = object_key(&hpa);
                let change = tracker.delete(&key, hpa.annotations().clone());
                apply_event(&self.store, change).await;
            }
            watcher::Event::Init => tracker.begin_relist(),
            watcher::Event::InitDone => {
                for change in tracker.finish_relist() {
                    apply_event(&self.store, change).await;
                }
                debug!("HPA re-list complete, tracking {} objects", tracker.len());
            }
        }
    }
}

fn object_key(hpa: &HorizontalPodAutoscaler) -> String {
    format!("{}/{}", hpa.namespace().unwrap_or_default(), hpa.name_any())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::rules::RuleListener;
    use std::sync::Mutex;

    fn annotations(pairs: &[(&str, &str)]) -> Annotations {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// Records the query of one rule every time the store changes
    struct ObservingListener {
        store: Arc<RuleStore>,
        rule: String,
        observed: Mutex<Vec<Option<String>>>,
    }

    impl RuleListener for ObservingListener {
        fn rules_changed(&self) {
            let query = futures::executor::block_on(self.store.get_query(&self.rule));
            self.observed.lock().unwrap().push(query);
        }
    }

    async fn observed_store(rule: &str) -> (Arc<RuleStore>, Arc<ObservingListener>) {
        let store = Arc::new(RuleStore::new());
        let listener = Arc::new(ObservingListener {
            store: store.clone(),
            rule: rule.to_string(),
            observed: Mutex::new(Vec::new()),
        });
        store.register_listener(listener.clone()).await;
        (store, listener)
    }

    // =========================================================================
    // Annotation extraction
    // =========================================================================

    #[test]
    fn test_rules_from_annotations() {
        let rules = rules_from_annotations(&annotations(&[
            ("wavefront.com.external.metric.queue-depth", "ts(queue.depth)"),
            ("wavefront.com.external.metric.", "ts(ignored)"),
            ("wavefront.com.external.metric", "ts(ignored)"),
            ("kubectl.kubernetes.io/last-applied-configuration", "{}"),
        ]));
        assert_eq!(rules, vec![MetricRule::new("queue-depth", "ts(queue.depth)")]);
    }

    // =========================================================================
    // Store mutations
    // =========================================================================

    #[tokio::test]
    async fn test_add_and_delete_events() {
        let (store, listener) = observed_store("m1").await;
        let a = annotations(&[("wavefront.com.external.metric.m1", "ts(a)")]);

        apply_event(&store, AnnotationEvent::Added(a.clone())).await;
        assert_eq!(store.get_query("m1").await, Some("ts(a)".to_string()));

        apply_event(&store, AnnotationEvent::Deleted(a)).await;
        assert!(store.is_empty().await);
        assert_eq!(listener.observed.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unannotated_object_causes_no_mutation() {
        let (store, listener) = observed_store("m1").await;
        apply_event(
            &store,
            AnnotationEvent::Added(annotations(&[("team", "payments")])),
        )
        .await;
        assert!(listener.observed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unchanged_update_is_skipped() {
        let (store, listener) = observed_store("m1").await;
        let a = annotations(&[("wavefront.com.external.metric.m1", "ts(a)")]);
        apply_event(&store, AnnotationEvent::Added(a.clone())).await;

        apply_event(
            &store,
            AnnotationEvent::Updated {
                old: a.clone(),
                new: a,
            },
        )
        .await;
        assert_eq!(listener.observed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_changed_update_deletes_then_adds() {
        let (store, listener) = observed_store("m1").await;
        let old = annotations(&[("wavefront.com.external.metric.m1", "ts(a)")]);
        let new = annotations(&[("wavefront.com.external.metric.m1", "ts(b)")]);
        apply_event(&store, AnnotationEvent::Added(old.clone())).await;

        apply_event(&store, AnnotationEvent::Updated { old, new }).await;

        assert_eq!(
            *listener.observed.lock().unwrap(),
            vec![Some("ts(a)".to_string()), None, Some("ts(b)".to_string())]
        );
    }

    // =========================================================================
    // Tracker
    // =========================================================================

    #[test]
    fn test_tracker_add_then_update() {
        let mut tracker = AnnotationTracker::new();
        let a = annotations(&[("x", "1")]);
        let b = annotations(&[("x", "2")]);

        assert_eq!(
            tracker.apply("ns/hpa".to_string(), a.clone()),
            AnnotationEvent::Added(a.clone())
        );
        assert_eq!(
            tracker.apply("ns/hpa".to_string(), b.clone()),
            AnnotationEvent::Updated { old: a, new: b }
        );
    }

    #[test]
    fn test_tracker_delete_uses_cached_annotations() {
        let mut tracker = AnnotationTracker::new();
        let a = annotations(&[("wavefront.com.external.metric.m1", "ts(a)")]);
        tracker.apply("ns/hpa".to_string(), a.clone());

        let event = tracker.delete("ns/hpa", Annotations::new());
        assert_eq!(event, AnnotationEvent::Deleted(a));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_tracker_relist_reports_vanished_objects() {
        let mut tracker = AnnotationTracker::new();
        let a = annotations(&[("wavefront.com.external.metric.m1", "ts(a)")]);
        let b = annotations(&[("wavefront.com.external.metric.m2", "ts(b)")]);
        tracker.apply("ns/keep".to_string(), a.clone());
        tracker.apply("ns/gone".to_string(), b.clone());

        tracker.begin_relist();
        tracker.apply("ns/keep".to_string(), a);
        let events = tracker.finish_relist();

        assert_eq!(events, vec![AnnotationEvent::Deleted(b)]);
        assert_eq!(tracker.len(), 1);
        assert!(tracker.finish_relist().is_empty());
    }
}
