//! # Core Domain Entities
//!
//! Identities, timestamps and tag maps used across subsystems.
//!
//! ## Clusters
//!
//! - **Identity**: `PeerId`, `NodeIdentity`
//! - **Time**: `Timestamp`
//! - **Data**: `Payload`, `Tags`, `Metadata`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

/// Opaque application payload carried by values, surveys and RPC calls.
pub type Payload = serde_json::Value;

/// String-keyed map used for static and dynamic tags.
pub type Tags = serde_json::Map<String, serde_json::Value>;

/// Descriptive metadata attached to a value.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

// =============================================================================
// IDENTITY
// =============================================================================

/// Unique identifier of a peer on the fabric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(pub Uuid);

impl PeerId {
    /// Generate a fresh random peer id.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Access the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Provenance stamp of a node: its display name and its unique id.
///
/// Serialized as `{"peer_name": ..., "peer_uuid": ...}` and merged into
/// dynamic tags whenever a node publishes a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// Display name (not guaranteed unique).
    pub peer_name: String,
    /// Textual UUID of the node.
    pub peer_uuid: String,
}

impl NodeIdentity {
    /// Build an identity from a name and a peer id.
    #[must_use]
    pub fn new(peer_name: impl Into<String>, peer_id: PeerId) -> Self {
        Self {
            peer_name: peer_name.into(),
            peer_uuid: peer_id.to_string(),
        }
    }

    /// Render this identity as a tag map.
    #[must_use]
    pub fn to_tags(&self) -> Tags {
        let mut tags = Tags::new();
        tags.insert("peer_name".into(), self.peer_name.clone().into());
        tags.insert("peer_uuid".into(), self.peer_uuid.clone().into());
        tags
    }

    /// Parse an identity from a JSON value, if it has the expected shape.
    #[must_use]
    pub fn from_payload(payload: &Payload) -> Option<Self> {
        serde_json::from_value(payload.clone()).ok()
    }
}

// =============================================================================
// TIME
// =============================================================================

/// A point in time with microsecond precision.
///
/// On the wire a timestamp is a float number of seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// The Unix epoch, the timestamp of a value that was never set.
    #[must_use]
    pub fn epoch() -> Self {
        Self(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Current wall-clock time, truncated to microseconds.
    #[must_use]
    pub fn now() -> Self {
        Self::from_micros(Utc::now().timestamp_micros())
    }

    /// Build from microseconds since the epoch. Out-of-range input maps to the epoch.
    #[must_use]
    pub fn from_micros(micros: i64) -> Self {
        DateTime::<Utc>::from_timestamp_micros(micros)
            .map(Self)
            .unwrap_or_else(Self::epoch)
    }

    /// Build from float seconds since the epoch. Non-finite input maps to the epoch.
    #[must_use]
    pub fn from_secs_f64(secs: f64) -> Self {
        if !secs.is_finite() {
            return Self::epoch();
        }
        Self::from_micros((secs * 1_000_000.0).round() as i64)
    }

    /// Build from a chrono datetime, dropping sub-microsecond precision.
    #[must_use]
    pub fn from_datetime(datetime: DateTime<Utc>) -> Self {
        Self::from_micros(datetime.timestamp_micros())
    }

    /// Float seconds since the epoch (wire form).
    #[must_use]
    pub fn as_secs_f64(&self) -> f64 {
        self.0.timestamp_micros() as f64 / 1_000_000.0
    }

    /// Microseconds since the epoch.
    #[must_use]
    pub fn as_micros(&self) -> i64 {
        self.0.timestamp_micros()
    }

    /// The underlying chrono datetime.
    #[must_use]
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Whether this is the epoch (a never-set value).
    #[must_use]
    pub fn is_epoch(&self) -> bool {
        *self == Self::epoch()
    }

    /// Shift by a signed number of seconds.
    #[must_use]
    pub fn offset_secs(&self, secs: i64) -> Self {
        Self::from_micros(self.as_micros().saturating_add(secs.saturating_mul(1_000_000)))
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::epoch()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_secs_f64())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Ok(Self::from_secs_f64(secs))
    }
}
