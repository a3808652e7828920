//! # Shared Value Propagation
//!
//! Updates, metadata and history flowing between nodes on a live mesh.

#[cfg(test)]
mod tests {
    use crate::support::{eventually, TestCluster};
    use async_trait::async_trait;
    use node_runtime::{HistoryPoint, HistoryProvider, MetadataChange, SharedValue, ValueChange};
    use parking_lot::Mutex;
    use serde_json::{json, Map};
    use shared_types::{Metadata, Tags, Timestamp};
    use std::sync::Arc;
    use std::time::Duration;
    use vm_04_rpc::ProcedureError;

    const SETTLE: Duration = Duration::from_secs(2);

    fn metadata(pairs: &[(&str, serde_json::Value)]) -> Metadata {
        pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
    }

    async fn quiet(node: &node_runtime::Node, uri: &str) -> SharedValue {
        SharedValue::builder(node, uri)
            .survey_last_value(false)
            .survey_static_tags(false)
            .create()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_update_reaches_observer_on_peer() {
        let cluster = TestCluster::start(&["x", "y"]).await;
        let (x, y) = (cluster.node(0), cluster.node(1));
        let on_x = quiet(x, "house://lamp").await;
        let on_y = quiet(y, "house://lamp").await;

        let seen: Arc<Mutex<Vec<ValueChange>>> = Arc::default();
        let sink = seen.clone();
        on_y.observe(move |change| sink.lock().push(change));

        let mut tags = Tags::new();
        tags.insert("unit".into(), json!("lux"));
        on_x.set_value_tags(300, tags).unwrap();

        assert!(eventually(SETTLE, || seen.lock().len() == 1).await);
        let change = seen.lock()[0].clone();
        assert_eq!(change.uri, "house://lamp");
        assert_eq!(change.value, json!(300));
        assert_eq!(change.timestamp, on_x.timestamp());
        assert_eq!(change.tags.get("unit"), Some(&json!("lux")));
        assert_eq!(change.tags.get("peer_name"), Some(&json!("x")));
        assert_eq!(on_y.value_ts(), on_x.value_ts());

        drop((on_x, on_y));
        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_same_timestamp_notifies_once() {
        let cluster = TestCluster::start(&["x", "y"]).await;
        let (x, y) = (cluster.node(0), cluster.node(1));
        let on_x = quiet(x, "door").await;
        let on_y = quiet(y, "door").await;

        let count = Arc::new(Mutex::new(0_usize));
        let counter = count.clone();
        on_y.observe(move |_| *counter.lock() += 1);

        let at = Timestamp::from_secs_f64(5_000.0);
        assert!(on_x.set_value_ts("open", at).unwrap());
        assert!(on_x.set_value_ts("open", at).unwrap());

        assert!(eventually(SETTLE, || *count.lock() == 1).await);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*count.lock(), 1);
        assert_eq!(on_y.value_ts(), (json!("open"), at));

        drop((on_x, on_y));
        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_observed_timestamps_never_go_backwards() {
        let cluster = TestCluster::start(&["x", "y"]).await;
        let (x, y) = (cluster.node(0), cluster.node(1));
        let on_x = quiet(x, "counter").await;
        let on_y = quiet(y, "counter").await;

        let seen: Arc<Mutex<Vec<Timestamp>>> = Arc::default();
        let sink = seen.clone();
        on_y.observe(move |change| sink.lock().push(change.timestamp));

        for i in 0..20 {
            on_x.set_value(i).unwrap();
        }
        assert!(!on_x.set_value_ts(-1, Timestamp::from_secs_f64(1.0)).unwrap());

        assert!(eventually(SETTLE, || on_y.value() == json!(19)).await);
        let seen = seen.lock().clone();
        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|w| w[0] < w[1]), "out of order: {seen:?}");
        assert_eq!(on_x.value(), json!(19));

        drop((on_x, on_y));
        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_metadata_propagates_with_source() {
        let cluster = TestCluster::start(&["x", "y"]).await;
        let (x, y) = (cluster.node(0), cluster.node(1));
        let on_x = quiet(x, "boiler").await;
        let on_y = quiet(y, "boiler").await;

        let seen: Arc<Mutex<Option<MetadataChange>>> = Arc::default();
        let sink = seen.clone();
        on_y.observe_metadata(move |change| *sink.lock() = Some(change));

        on_x.set_metadata(metadata(&[("unit", json!("C")), ("max", json!(90))])).unwrap();

        assert!(eventually(SETTLE, || seen.lock().is_some()).await);
        let change = seen.lock().clone().unwrap();
        assert_eq!(change.uri, "boiler");
        assert_eq!(change.metadata.get("unit"), Some(&json!("C")));
        let source = change.source.unwrap();
        assert_eq!(source.peer_name, "x");
        assert_eq!(source, x.name_uuid());
        assert_eq!(on_y.metadata(), on_x.metadata());

        drop((on_x, on_y));
        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_late_creator_surveys_metadata() {
        let cluster = TestCluster::start(&["x", "y"]).await;
        let (x, y) = (cluster.node(0), cluster.node(1));
        let on_x = SharedValue::builder(x, "pump")
            .value(1)
            .metadata(metadata(&[("model", json!("P-20"))]))
            .survey_last_value(false)
            .survey_static_tags(false)
            .create()
            .await
            .unwrap();

        let on_y = quiet(y, "pump").await;
        assert!(on_y.metadata().is_none());
        assert!(on_y.survey_metadata().await.unwrap());
        assert_eq!(on_y.metadata().unwrap().get("model"), Some(&json!("P-20")));
        assert_eq!(on_y.metadata_source().unwrap().peer_name, "x");

        drop((on_x, on_y));
        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_static_tags_surveyed_on_creation() {
        let cluster = TestCluster::start(&["x", "y"]).await;
        let (x, y) = (cluster.node(0), cluster.node(1));
        let mut room = Tags::new();
        room.insert("room".into(), json!("attic"));
        let on_x = SharedValue::builder(x, "fan")
            .static_tags(room.clone())
            .survey_last_value(false)
            .create()
            .await
            .unwrap();

        let on_y = SharedValue::new(y, "fan").await.unwrap();
        assert_eq!(on_y.static_tags(), room);

        drop((on_x, on_y));
        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_value_entering_reaches_observer() {
        let cluster = TestCluster::start(&["x", "y"]).await;
        let (x, y) = (cluster.node(0), cluster.node(1));

        let entered: Arc<Mutex<Vec<(String, String)>>> = Arc::default();
        let sink = entered.clone();
        let id = y.register_value_entering(move |peer, uri| sink.lock().push((peer, uri)));

        let on_x = quiet(x, "garage://gate").await;
        assert!(eventually(SETTLE, || !entered.lock().is_empty()).await);
        assert_eq!(entered.lock()[0], ("x".to_string(), "garage://gate".to_string()));

        assert!(y.unregister_value_entering(id));
        drop(on_x);
        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_peer_exit_is_noticed() {
        let cluster = TestCluster::start(&["x", "y", "z"]).await;
        let (x, z) = (cluster.node(0), cluster.node(2));
        assert_eq!(x.peers().len(), 2);

        z.shutdown().await;
        assert!(eventually(SETTLE, || x.peers().len() == 1).await);
        assert_eq!(x.peers()[0].name, "y");

        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_late_joiner_adopts_value() {
        let mut cluster = TestCluster::start(&["x"]).await;
        let on_x = SharedValue::builder(cluster.node(0), "weather")
            .value("sunny")
            .survey_last_value(false)
            .survey_static_tags(false)
            .create()
            .await
            .unwrap();

        let late = cluster.join("late").await;
        let on_late = SharedValue::new(&late, "weather").await.unwrap();
        assert_eq!(on_late.value_ts(), on_x.value_ts());

        on_x.set_value("rain").unwrap();
        assert!(eventually(SETTLE, || on_late.value() == json!("rain")).await);

        drop((on_x, on_late));
        cluster.shutdown().await;
    }

    struct FixedArchive;

    #[async_trait]
    impl HistoryProvider for FixedArchive {
        async fn history(
            &self,
            _uri: &str,
            start: Timestamp,
            end: Timestamp,
        ) -> Result<Vec<HistoryPoint>, ProcedureError> {
            Ok((1..=5)
                .map(|i| HistoryPoint::new(json!(i * 10), Timestamp::from_secs_f64(f64::from(i) * 100.0), Map::new()))
                .filter(|p| p.timestamp >= start && p.timestamp <= end)
                .collect())
        }
    }

    #[tokio::test]
    async fn test_history_fetched_from_archiving_peer() {
        let cluster = TestCluster::start(&["x", "y"]).await;
        let (x, y) = (cluster.node(0), cluster.node(1));
        let on_x = SharedValue::builder(x, "meter")
            .value(50)
            .archived(Arc::new(FixedArchive))
            .survey_last_value(false)
            .survey_static_tags(false)
            .create()
            .await
            .unwrap();
        assert!(on_x.is_archived());
        let on_y = SharedValue::new(y, "meter").await.unwrap();

        let points = on_y
            .get_history(Timestamp::from_secs_f64(150.0), Timestamp::from_secs_f64(400.0))
            .await
            .unwrap();
        let values: Vec<_> = points.iter().map(|p| p.value.clone()).collect();
        assert_eq!(values, vec![json!(20), json!(30), json!(40)]);
        assert_eq!(points[0].timestamp, Timestamp::from_secs_f64(200.0));

        drop((on_x, on_y));
        cluster.shutdown().await;
    }
}
