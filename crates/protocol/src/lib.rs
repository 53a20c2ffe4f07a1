//! Wire types for the AR bridge host protocol.
//!
//! The host writes one [`RequestEnvelope`] per line, tagged by `op`, and reads
//! back [`Message`] lines: a [`Response`] echoing the request `id`, or an
//! [`Event`] carrying one frame for a subscription. Poses always travel as
//! `position[3]` plus a unit `rotation[4]` in `(x, y, z, w)` order, and failed
//! responses name an [`ErrorCode`] instead of free text alone.

pub mod message;
pub mod types;

pub use message::*;
pub use types::*;
