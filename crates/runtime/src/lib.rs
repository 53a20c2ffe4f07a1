//! Anchor lifecycle and frame-synchronization engine for AR tracking sessions.
//!
//! The engine bridges a native tracking capability ([`capability::TrackingCapability`])
//! and an application overlay ([`capability::Overlay`]) to a host:
//!
//! - [`session::SessionController`] owns the one native session and its
//!   `Created -> Running <-> Paused -> Closed` lifecycle.
//! - [`registry::AnchorRegistry`] maps externally visible anchor ids onto
//!   native anchors and their renderables.
//! - [`dispatcher::FrameDispatcher`] pulls one frame per tick and fans it out
//!   to subscribers without ever blocking on a slow one.
//! - [`hit_test::HitTestResolver`] and [`pose`] answer queries against the
//!   current frame.
//!
//! All of it lives in one [`context::ArContext`] owned by a dedicated thread;
//! hosts talk to it through the cloneable [`Bridge`] handle, or over the wire
//! protocol via [`boundary::handle_request`].
//!
//! ```ignore
//! let (engine, world, _view) = sim::engine();
//! let bridge = Bridge::spawn(BridgeConfig::default(), move || engine.into_parts())?;
//! bridge.attach_overlay().await?;
//! bridge.start_session().await?;
//! let id = bridge.add_anchor(Vec3::new(1.0, 0.0, -1.0), false).await?;
//! ```

pub mod boundary;
pub mod capability;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod pose;
pub mod registry;
pub mod session;
pub mod sim;

pub use boundary::{Handled, decode_request, handle_request};
pub use capability::{EngineParts, Overlay, TrackingCapability, TrackingSession};
pub use config::BridgeConfig;
pub use dispatcher::{FrameStream, SubscriptionHandle, SubscriptionId, TickReport};
pub use error::{Error, Result};
pub use executor::Bridge;
pub use hit_test::HitResult;
pub use pose::{Pose, Quat, Vec3};
pub use registry::{AnchorId, AnchorSnapshot};
