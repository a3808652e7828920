//! # Node Container
//!
//! The running node and its configuration.
//!
//! - `config`: TOML-backed settings for the node and its transports
//! - `node`: the `Node` handle, owner of every subsystem instance

pub mod config;
pub mod node;

pub use config::{ConfigError, NodeConfig};
pub use node::{parse_rpc_uri, LastValue, Node, PeerInfo, UriSelection};
