//! # Endpoint Derivation
//!
//! A peer advertises the protocol and port of its RPC server and pub/sub
//! publisher as fabric headers. The host part is never advertised: it is
//! taken from the address the fabric itself reports for the peer, so a
//! node bound to `0.0.0.0` is still reachable on the interface its
//! beacons came from.
//!
//! ```text
//! headers: rpc_proto=tcp rpc_port=5000     fabric address: tcp://10.0.0.7:49152
//!                         \                       /
//!                          tcp://10.0.0.7:5000
//! ```

use super::errors::FabricError;
use regex::Regex;
use shared_types::{PUB_PORT_HEADER, PUB_PROTO_HEADER, RPC_PORT_HEADER, RPC_PROTO_HEADER};
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

#[allow(clippy::expect_used)]
fn address_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(.*)://(.*):(.*)$").expect("static pattern compiles"))
}

/// A `<proto>://<host>:<port>` service endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub proto: String,
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Parse `<proto>://<host>:<port>`.
    pub fn parse(address: &str) -> Result<Self, FabricError> {
        let captures = address_pattern()
            .captures(address)
            .ok_or_else(|| FabricError::InvalidAddress(address.to_string()))?;
        let port = captures[3]
            .parse::<u16>()
            .map_err(|_| FabricError::InvalidAddress(address.to_string()))?;
        Ok(Self {
            proto: captures[1].to_string(),
            host: captures[2].to_string(),
            port,
        })
    }

    /// `host:port`, suitable for `TcpStream::connect`.
    #[must_use]
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.proto, self.host, self.port)
    }
}

/// Combine an advertised protocol and port with the host of the peer's
/// fabric address.
pub fn derive_endpoint(proto: &str, port: &str, fabric_address: &str) -> Result<Endpoint, FabricError> {
    let host = Endpoint::parse(fabric_address)?.host;
    let port = port
        .trim()
        .parse::<u16>()
        .map_err(|_| FabricError::InvalidAddress(format!("{proto}://{host}:{port}")))?;
    Ok(Endpoint {
        proto: proto.to_string(),
        host,
        port,
    })
}

/// The two service endpoints every node advertises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEndpoints {
    pub rpc: Endpoint,
    pub publisher: Endpoint,
}

impl PeerEndpoints {
    /// Derive both endpoints from a peer's header map and fabric address.
    pub fn from_headers(
        peer_name: &str,
        headers: &HashMap<String, String>,
        fabric_address: &str,
    ) -> Result<Self, FabricError> {
        let header = |key: &str| {
            headers
                .get(key)
                .map(String::as_str)
                .ok_or_else(|| FabricError::MissingHeader {
                    peer: peer_name.to_string(),
                    key: key.to_string(),
                })
        };

        Ok(Self {
            rpc: derive_endpoint(header(RPC_PROTO_HEADER)?, header(RPC_PORT_HEADER)?, fabric_address)?,
            publisher: derive_endpoint(
                header(PUB_PROTO_HEADER)?,
                header(PUB_PORT_HEADER)?,
                fabric_address,
            )?,
        })
    }
}
