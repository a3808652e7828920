//! # Survey Properties
//!
//! Timing and bookkeeping of `ask` across real nodes:
//! - `limit_peers = 0` always waits the full timeout
//! - `limit_peers = N` returns as soon as N replies arrived
//! - no request id outlives its `ask`, even when the caller gives up

#[cfg(test)]
mod tests {
    use crate::support::TestCluster;
    use node_runtime::{SharedValue, SurveyOptions, UriSelection};
    use serde_json::json;
    use shared_types::{Metadata, Tags};
    use std::time::{Duration, Instant};

    async fn host(node: &node_runtime::Node, uri: &str, value: i64) -> SharedValue {
        SharedValue::builder(node, uri)
            .value(value)
            .survey_last_value(false)
            .survey_static_tags(false)
            .create()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_unlimited_survey_waits_full_timeout() {
        let cluster = TestCluster::start(&["x", "y", "z"]).await;
        let on_x = host(cluster.node(0), "room://x/temp", 1).await;
        let on_z = host(cluster.node(2), "room://z/temp", 2).await;

        let window = Duration::from_millis(400);
        let started = Instant::now();
        let uris = cluster
            .node(1)
            .survey_value_uri("temp$", SurveyOptions::default().with_timeout(window))
            .await
            .unwrap();

        assert!(started.elapsed() >= window);
        assert_eq!(
            uris.into_iter().collect::<Vec<_>>(),
            vec!["room://x/temp".to_string(), "room://z/temp".to_string()]
        );
        assert_eq!(cluster.node(1).pending_surveys(), 0);

        drop((on_x, on_z));
        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_limited_survey_returns_early() {
        let cluster = TestCluster::start(&["x", "y"]).await;
        let on_x = host(cluster.node(0), "room://x/temp", 7).await;

        let window = Duration::from_secs(3);
        let started = Instant::now();
        let last = cluster
            .node(1)
            .survey_last_value(
                "room://x/temp",
                SurveyOptions::default().with_timeout(window).with_limit(1),
            )
            .await
            .unwrap();

        assert!(started.elapsed() < window);
        assert_eq!(last.value, json!(7));
        assert_eq!(last.timestamp, on_x.timestamp());
        assert_eq!(cluster.node(1).pending_surveys(), 0);

        drop(on_x);
        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_freshest_reply_wins() {
        let cluster = TestCluster::start(&["x", "y", "z"]).await;
        let on_x = host(cluster.node(0), "shared", 1).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let on_z = SharedValue::builder(cluster.node(2), "shared")
            .value(2)
            .survey_static_tags(false)
            .survey_last_value(false)
            .create()
            .await
            .unwrap();

        let last = cluster
            .node(1)
            .survey_last_value("shared", SurveyOptions::default().with_limit(2))
            .await
            .unwrap();
        assert_eq!(last.value, json!(2));
        assert_eq!(last.timestamp, on_z.timestamp());

        drop((on_x, on_z));
        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_cancelled_ask_retires_its_request() {
        let cluster = TestCluster::start(&["x", "y"]).await;
        let y = cluster.node(1);

        let gave_up = tokio::time::timeout(
            Duration::from_millis(50),
            y.survey_value_uri(".*", SurveyOptions::default().with_timeout(Duration::from_secs(5))),
        )
        .await;
        assert!(gave_up.is_err());
        assert_eq!(y.pending_surveys(), 0);

        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_static_tags_and_metadata_surveys() {
        let cluster = TestCluster::start(&["x", "y"]).await;
        let (x, y) = (cluster.node(0), cluster.node(1));

        let mut static_tags = Tags::new();
        static_tags.insert("unit".into(), json!("C"));
        let mut metadata = Metadata::new();
        metadata.insert("room".into(), json!("kitchen"));
        let on_x = SharedValue::builder(x, "house://kitchen/temp")
            .value(20)
            .static_tags(static_tags.clone())
            .metadata(metadata.clone())
            .survey_last_value(false)
            .create()
            .await
            .unwrap();

        let tags = y
            .survey_value_static_tags("house://kitchen/temp", SurveyOptions::default())
            .await
            .unwrap();
        assert_eq!(tags, static_tags);

        let (found, source) = y
            .survey_value_metadata("house://kitchen/temp", SurveyOptions::default())
            .await
            .unwrap();
        assert_eq!(found, Some(metadata.clone()));
        assert_eq!(source.map(|s| s.peer_name), Some("x".to_string()));

        let by_pattern = y
            .survey_values_metadata(UriSelection::Pattern("kitchen".into()), SurveyOptions::default())
            .await
            .unwrap();
        assert_eq!(by_pattern.get("house://kitchen/temp"), Some(&metadata));

        let by_list = y
            .survey_values_metadata(
                UriSelection::Uris(vec!["house://kitchen/temp".into(), "house://none".into()]),
                SurveyOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(by_list.len(), 1);

        let on_y = SharedValue::new(y, "house://kitchen/temp").await.unwrap();
        assert_eq!(on_y.static_tags(), static_tags);
        assert_eq!(on_y.value(), json!(20));

        drop((on_x, on_y));
        cluster.shutdown().await;
    }
}
