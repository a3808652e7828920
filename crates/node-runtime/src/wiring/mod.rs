//! # Wiring
//!
//! Connects the fabric event stream to the survey, event, RPC and pub/sub
//! subsystems.
//!
//! ```text
//!                         ┌──────────────┐
//!                         │  PeerFabric  │
//!                         └──────┬───────┘
//!                                │ FabricEvent
//!        ┌──────────────┬────────┴───────┬─────────────────┐
//!        │ Enter/Exit   │ Shout SURVEY   │ Shout EVENT     │ Whisper
//!        ▼              ▼                ▼                 ▼
//!   peer table    SurveyEngine      EventEngine       SurveyEngine
//!   RPC clients   on_request        on_event          on_reply
//!   subscriber
//! ```
//!
//! Pub/sub traffic does not go through the fabric: the subscriber calls
//! `value_update_handler` directly for every delivered message.

pub mod event_routing;

pub use event_routing::{run_event_loop, value_update_handler};
