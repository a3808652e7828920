//! # ValueMesh Test Suite
//!
//! Cross-crate tests that need more than one node: real loopback TCP for
//! RPC and pub/sub, the in-process `LocalMesh` for the fabric.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── support.rs        # TestCluster: N nodes on one mesh
//! └── integration/
//!     ├── lifecycle.rs  # value creation, discovery and failure paths
//!     ├── surveys.rs    # survey timing and bookkeeping properties
//!     ├── rpc.rs        # RPC round trips and failures
//!     ├── values.rs     # propagation, metadata, history, ordering
//!     └── config.rs     # config files on disk
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p vm-tests
//! cargo test -p vm-tests integration::lifecycle::
//! cargo bench -p vm-tests
//! ```

pub mod integration;
pub mod support;
