//! # Node Runtime Library
//!
//! A peer-to-peer value-sharing runtime. Nodes on a local network find
//! each other over a group-messaging fabric, host URI-addressed
//! timestamped values and keep them synchronized.
//!
//! ## Channels
//!
//! | Concern                     | Channel                         |
//! |-----------------------------|---------------------------------|
//! | Value updates               | pub/sub, topic = URI            |
//! | Discovery and initial state | surveys on the `SURVEY` group   |
//! | Announcements, metadata     | events on the `EVENT` group     |
//! | Point-to-point calls        | RPC, `rpc://<peer>/<procedure>` |
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use node_runtime::{Node, NodeConfig, SharedValue};
//! use vm_01_peer_fabric::LocalMesh;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let mesh = LocalMesh::new();
//! let node = Node::start(Arc::new(mesh.node("kitchen")), NodeConfig::default()).await?;
//!
//! let temperature = SharedValue::builder(&node, "house://kitchen/temperature")
//!     .value(21.5)
//!     .create()
//!     .await?;
//! temperature.set_value(22.0)?;
//! # Ok(())
//! # }
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod container;
pub mod errors;
pub mod handlers;
pub mod registry;
pub mod value;
pub mod wiring;

pub use container::{parse_rpc_uri, LastValue, ConfigError, Node, NodeConfig, PeerInfo, UriSelection};
pub use errors::{NodeError, ValueError};
pub use value::{
    EmptyHistory, HistoryPoint, HistoryProvider, MetadataChange, SharedValue, SharedValueBuilder, ValueChange,
    ValueSnapshot,
};
pub use vm_02_survey::SurveyOptions;
