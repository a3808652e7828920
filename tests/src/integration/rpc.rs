//! # RPC Across Nodes
//!
//! Calls addressed by `rpc://<peer>/<procedure>` between real nodes.

#[cfg(test)]
mod tests {
    use crate::support::TestCluster;
    use anyhow::Context;
    use node_runtime::{NodeError, SharedValue};
    use rand::Rng;
    use serde_json::{json, Map, Value};
    use std::time::{Duration, Instant};
    use tokio::time::timeout;
    use vm_04_rpc::{procedure, ProcedureError, RpcError};

    fn random_value(rng: &mut impl Rng, depth: usize) -> Value {
        match rng.gen_range(0..if depth == 0 { 4 } else { 6 }) {
            0 => Value::Null,
            1 => json!(rng.gen::<bool>()),
            2 => json!(rng.gen_range(-1_000_000i64..1_000_000)),
            3 => json!(format!("s{}", rng.gen::<u32>())),
            4 => Value::Array((0..rng.gen_range(0..4)).map(|_| random_value(rng, depth - 1)).collect()),
            _ => Value::Object(
                (0..rng.gen_range(0..4))
                    .map(|i| (format!("k{i}"), random_value(rng, depth - 1)))
                    .collect(),
            ),
        }
    }

    #[tokio::test]
    async fn test_round_trip_arbitrary_payloads() {
        let cluster = TestCluster::start(&["x", "y"]).await;
        cluster
            .node(0)
            .add_rpc(
                "echo",
                procedure(|args, kwargs| async move { Ok(json!({"args": args, "kwargs": kwargs})) }),
            )
            .unwrap();

        let mut rng = rand::thread_rng();
        for _ in 0..25 {
            let args: Vec<Value> = (0..rng.gen_range(0..4)).map(|_| random_value(&mut rng, 3)).collect();
            let kwargs: Map<String, Value> = (0..rng.gen_range(0..3))
                .map(|i| (format!("kw{i}"), random_value(&mut rng, 2)))
                .collect();

            let reply = cluster
                .node(1)
                .call_rpc("rpc://x/echo", args.clone(), kwargs.clone())
                .await
                .unwrap();
            assert_eq!(reply, json!({"args": args, "kwargs": kwargs}));
        }
        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_procedure_failure_is_typed() {
        let cluster = TestCluster::start(&["x", "y"]).await;
        cluster
            .node(0)
            .add_rpc(
                "divide",
                procedure(|args, _| async move {
                    let a = args.first().and_then(Value::as_i64).context("missing dividend")?;
                    let b = args.get(1).and_then(Value::as_i64).context("missing divisor")?;
                    let q = a.checked_div(b).context("division by zero")?;
                    Ok::<_, ProcedureError>(json!(q))
                }),
            )
            .unwrap();
        let y = cluster.node(1);

        assert_eq!(
            y.call_rpc("rpc://x/divide", vec![json!(9), json!(3)], Map::new()).await.unwrap(),
            json!(3)
        );
        match y.call_rpc("rpc://x/divide", vec![json!(9), json!(0)], Map::new()).await {
            Err(NodeError::Rpc(RpcError::Remote(remote))) => {
                assert_eq!(remote.kind, "Error");
                assert_eq!(remote.message, "division by zero");
            }
            other => panic!("expected a remote failure, got {other:?}"),
        }
        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_one_connection() {
        let cluster = TestCluster::start(&["x", "y"]).await;
        cluster
            .node(0)
            .add_rpc(
                "sleepy",
                procedure(|args, _| async move {
                    let ms = args.first().and_then(Value::as_u64).unwrap_or(0);
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Ok(json!(ms))
                }),
            )
            .unwrap();
        let y = cluster.node(1).clone();

        let started = Instant::now();
        let calls = (0..10u64).rev().map(|i| {
            let y = y.clone();
            async move { y.call_rpc("rpc://x/sleepy", vec![json!(i * 20)], Map::new()).await }
        });
        let replies = futures::future::join_all(calls).await;

        for (reply, i) in replies.into_iter().zip((0..10u64).rev()) {
            assert_eq!(reply.unwrap(), json!(i * 20));
        }
        assert!(started.elapsed() < Duration::from_millis(900));
        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_server_shutdown_fails_blocked_call() {
        let cluster = TestCluster::start(&["x", "y"]).await;
        cluster
            .node(0)
            .add_rpc(
                "forever",
                procedure(|_, _| async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(Value::Null)
                }),
            )
            .unwrap();
        let y = cluster.node(1).clone();

        let call = tokio::spawn(async move { y.call_rpc("rpc://x/forever", vec![], Map::new()).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        cluster.node(0).shutdown().await;

        let result = timeout(Duration::from_secs(2), call)
            .await
            .expect("blocked call must fail fast")
            .unwrap();
        assert!(result.is_err());
        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_hosted_value_is_callable() {
        let cluster = TestCluster::start(&["x", "y"]).await;
        let on_x = SharedValue::builder(cluster.node(0), "house://door")
            .value("open")
            .survey_last_value(false)
            .survey_static_tags(false)
            .create()
            .await
            .unwrap();

        let reply = cluster
            .node(1)
            .call_rpc("rpc://x/house://door", vec![], Map::new())
            .await
            .unwrap();
        assert_eq!(reply, json!(["open", on_x.timestamp_f64()]));

        drop(on_x);
        cluster.shutdown().await;
    }
}
