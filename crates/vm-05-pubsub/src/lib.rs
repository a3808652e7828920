//! # Pub/Sub Channel
//!
//! **Subsystem ID:** 5
//!
//! Every node runs one `Publisher` and connects one `Subscriber` stream
//! to the publisher of each peer. Topics are value URIs; a subscriber
//! delivers a message when its topic starts with any subscribed prefix.
//!
//! ```text
//!  node A                         node B
//! ┌───────────┐   READY, msg..   ┌────────────┐
//! │ Publisher │ ───────────────► │ Subscriber │──► on_message(topic, data)
//! └───────────┘                  └────────────┘
//! ```
//!
//! The publisher registers a new connection with its fan-out before it
//! sends `READY`, so anything published after a subscriber's `connect`
//! returns is delivered to it.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod config;
mod errors;
mod frame;
mod publisher;
mod subscriber;


pub use config::PubSubConfig;
pub use errors::PubSubError;
pub use frame::PubSubFrame;
pub use publisher::Publisher;
pub use subscriber::{MessageHandler, Subscriber};
