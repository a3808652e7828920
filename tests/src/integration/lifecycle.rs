//! # Value Lifecycle
//!
//! End-to-end behavior of value creation, discovery and failure paths:
//! unset values, adoption of a peer's value, timestamp ordering between
//! initial values, bad URI filters, unknown procedures and missing
//! archives.

#[cfg(test)]
mod tests {
    use crate::support::TestCluster;
    use node_runtime::{NodeError, SharedValue, SurveyOptions, ValueError};
    use serde_json::{json, Map, Value};
    use shared_types::Timestamp;
    use std::time::Duration;
    use tokio::time::timeout;
    use vm_04_rpc::RpcError;

    #[tokio::test]
    async fn test_lonely_value_is_unset() {
        let cluster = TestCluster::start(&["x"]).await;

        let value = SharedValue::new(cluster.node(0), "a").await.unwrap();
        assert_eq!(value.value(), Value::Null);
        assert_eq!(value.timestamp(), Timestamp::epoch());
        assert!(value.timestamp().is_epoch());

        drop(value);
        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_late_creator_adopts_peer_value() {
        let cluster = TestCluster::start(&["x", "y"]).await;
        let (x, y) = (cluster.node(0), cluster.node(1));

        let on_x = SharedValue::builder(x, "a")
            .survey_last_value(false)
            .survey_static_tags(false)
            .create()
            .await
            .unwrap();
        on_x.set_value(12).unwrap();

        let on_y = SharedValue::new(y, "a").await.unwrap();
        assert_eq!(on_y.value(), json!(12));
        assert_eq!(on_y.timestamp(), on_x.timestamp());
        assert_eq!(on_y.tags().get("peer_name"), Some(&json!("x")));

        drop((on_x, on_y));
        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_older_initial_value_yields() {
        let cluster = TestCluster::start(&["x", "y"]).await;
        let (x, y) = (cluster.node(0), cluster.node(1));
        let older = Timestamp::from_secs_f64(1_000.0);
        let newer = Timestamp::from_secs_f64(2_000.0);

        let on_y = SharedValue::builder(y, "c")
            .value_ts("new", newer)
            .survey_last_value(false)
            .create()
            .await
            .unwrap();
        let on_x = SharedValue::builder(x, "c").value_ts("old", older).create().await.unwrap();

        assert_eq!(on_x.value_ts(), (json!("new"), newer));
        assert_eq!(on_y.value_ts(), (json!("new"), newer));

        drop((on_x, on_y));
        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_newer_initial_value_wins_everywhere() {
        let cluster = TestCluster::start(&["x", "y"]).await;
        let (x, y) = (cluster.node(0), cluster.node(1));
        let older = Timestamp::from_secs_f64(1_000.0);
        let newer = Timestamp::from_secs_f64(2_000.0);

        let on_y = SharedValue::builder(y, "c")
            .value_ts("old", older)
            .survey_last_value(false)
            .create()
            .await
            .unwrap();
        let on_x = SharedValue::builder(x, "c").value_ts("new", newer).create().await.unwrap();

        assert_eq!(on_x.value_ts(), (json!("new"), newer));
        let converged = crate::support::eventually(Duration::from_secs(2), || on_y.timestamp() == newer).await;
        assert!(converged, "y never received the newer value");
        assert_eq!(on_y.value(), json!("new"));

        drop((on_x, on_y));
        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_filter_is_ignored() {
        let cluster = TestCluster::start(&["x", "y"]).await;
        let (x, y) = (cluster.node(0), cluster.node(1));
        let hosted = SharedValue::builder(x, "house://kitchen/temp")
            .value(20)
            .survey_last_value(false)
            .survey_static_tags(false)
            .create()
            .await
            .unwrap();

        let quick = SurveyOptions::default().with_timeout(Duration::from_millis(200));
        let broken = y.survey_value_uri("(unclosed", quick).await.unwrap();
        assert!(broken.is_empty());

        let found = y.survey_value_uri("kitchen", quick).await.unwrap();
        assert!(found.contains("house://kitchen/temp"));
        assert_eq!(x.pending_surveys(), 0);
        assert_eq!(y.pending_surveys(), 0);

        drop(hosted);
        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_procedure_fails_fast() {
        let cluster = TestCluster::start(&["x", "y"]).await;
        let y = cluster.node(1);

        let result = timeout(
            Duration::from_secs(2),
            y.call_rpc("rpc://x/does_not_exist", vec![json!(1)], Map::new()),
        )
        .await
        .expect("call must not hang");

        match result {
            Err(NodeError::Rpc(RpcError::Remote(remote))) => {
                assert_eq!(remote.kind, "NotImplementedError");
                assert!(remote.message.contains("does_not_exist"));
            }
            other => panic!("expected a remote failure, got {other:?}"),
        }

        let pong = y
            .call_rpc("rpc://x/does_not_exist_either", vec![], Map::new())
            .await;
        assert!(pong.is_err());
        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_history_without_archive() {
        let cluster = TestCluster::start(&["x", "y"]).await;
        let (x, y) = (cluster.node(0), cluster.node(1));

        let on_x = SharedValue::builder(x, "h")
            .value(1)
            .survey_last_value(false)
            .survey_static_tags(false)
            .create()
            .await
            .unwrap();
        let on_y = SharedValue::new(y, "h").await.unwrap();

        let err = on_y
            .get_history(Timestamp::epoch(), Timestamp::now())
            .await
            .unwrap_err();
        assert!(matches!(err, ValueError::NoPeerWithHistory { ref uri } if uri == "h"));
        assert_eq!(y.pending_surveys(), 0);

        drop((on_x, on_y));
        cluster.shutdown().await;
    }
}
