//! Error taxonomy for the tracking engine.

use ar_protocol::ErrorCode;
use thiserror::Error;

/// Result alias used across the runtime.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced to callers of engine operations.
///
/// None of these terminate the execution context; every variant is returned
/// to the caller and mapped onto a wire [`ErrorCode`] at the boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
	/// The tracking capability could not provide a session.
	#[error("failed to start AR session: {0}")]
	SessionInit(String),

	#[error("AR session not started")]
	SessionNotStarted,

	/// The session was destroyed; a new engine must be spawned.
	#[error("AR session closed")]
	SessionClosed,

	#[error("{kind} not found: {id}")]
	NotFound { kind: &'static str, id: String },

	#[error("overlay view not attached")]
	ViewNotAttached,

	#[error("hit-test coordinate out of range: ({u}, {v})")]
	InvalidCoordinate { u: f32, v: f32 },

	#[error("anchor position is not finite: ({x}, {y}, {z})")]
	InvalidPosition { x: f32, y: f32, z: f32 },

	/// Native tracking failed while the session was running.
	#[error("tracking failure: {0}")]
	Tracking(String),

	/// The execution context is gone (every handle dropped or the thread exited).
	#[error("execution context has shut down")]
	ContextGone,

	#[error("invalid configuration: {0}")]
	Config(String),
}

impl Error {
	pub(crate) fn anchor_not_found(id: impl Into<String>) -> Self {
		Error::NotFound { kind: "anchor", id: id.into() }
	}

	pub(crate) fn subscription_not_found(id: impl Into<String>) -> Self {
		Error::NotFound {
			kind: "subscription",
			id: id.into(),
		}
	}

	/// Stable wire code for this error.
	pub fn code(&self) -> ErrorCode {
		match self {
			Error::SessionInit(_) => ErrorCode::SessionInitError,
			Error::SessionNotStarted => ErrorCode::SessionNotStarted,
			Error::SessionClosed => ErrorCode::SessionClosed,
			Error::NotFound { .. } => ErrorCode::NotFound,
			Error::ViewNotAttached => ErrorCode::ViewNotAttached,
			Error::InvalidCoordinate { .. } | Error::InvalidPosition { .. } => ErrorCode::InvalidCoordinate,
			Error::Tracking(_) => ErrorCode::TrackingFailure,
			Error::ContextGone => ErrorCode::ContextGone,
			Error::Config(_) => ErrorCode::InvalidRequest,
		}
	}

	/// Returns `true` for failures caused by calling before `start()`.
	pub fn is_not_started(&self) -> bool {
		matches!(self, Error::SessionNotStarted)
	}

	/// Returns `true` for post-teardown access.
	pub fn is_closed(&self) -> bool {
		matches!(self, Error::SessionClosed)
	}

	pub fn is_not_found(&self) -> bool {
		matches!(self, Error::NotFound { .. })
	}
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
	fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
		Error::ContextGone
	}
}

impl From<tokio::sync::oneshot::error::RecvError> for Error {
	fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
		Error::ContextGone
	}
}
