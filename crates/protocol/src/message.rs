//! Request/response envelopes exchanged with the host.
//!
//! Requests carry a caller-chosen `id` and an `op` tag:
//! ```json
//! { "id": 7, "op": "addAnchor", "x": 1.0, "y": 0.0, "z": -1.0, "attachToPlane": false }
//! ```
//!
//! Responses echo the `id`:
//! ```json
//! { "id": 7, "ok": true, "result": { "anchorId": "anchor_1718000000000" } }
//! { "id": 8, "ok": false, "error": { "code": "NOT_FOUND", "message": "anchor not found: anchor_1" } }
//! ```
//!
//! Frame notifications have no `id` and are keyed by subscription:
//! ```json
//! { "subscriptionId": "sub_1", "frame": { "sequence": 3, ... } }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{FrameEvent, SessionState, WireAnchor, WireHit};

fn screen_center() -> f32 {
	0.5
}

/// Boundary operations exposed to the host application layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Request {
	AttachOverlay,
	StartSession,
	StopSession,
	AddAnchor {
		#[serde(default)]
		x: f32,
		#[serde(default)]
		y: f32,
		#[serde(default)]
		z: f32,
		#[serde(default)]
		attach_to_plane: bool,
	},
	RemoveAnchor {
		anchor_id: String,
	},
	GetAnchor {
		anchor_id: String,
	},
	ListAnchors,
	GetCameraPose,
	PerformHitTest {
		#[serde(default = "screen_center")]
		x: f32,
		#[serde(default = "screen_center")]
		y: f32,
	},
	/// Long-lived: the response carries a subscription id and frame events follow.
	SubscribeFrames {
		#[serde(default)]
		subscriber: Option<String>,
	},
	UnsubscribeFrames {
		subscription_id: String,
	},
	SessionState,
	/// Host moved to the background.
	Pause,
	/// Host returned to the foreground.
	Resume,
	/// Host is terminating.
	Destroy,
}

impl Request {
	/// Wire name of the operation, as used in the `op` tag.
	pub fn op_name(&self) -> &'static str {
		match self {
			Request::AttachOverlay => "attachOverlay",
			Request::StartSession => "startSession",
			Request::StopSession => "stopSession",
			Request::AddAnchor { .. } => "addAnchor",
			Request::RemoveAnchor { .. } => "removeAnchor",
			Request::GetAnchor { .. } => "getAnchor",
			Request::ListAnchors => "listAnchors",
			Request::GetCameraPose => "getCameraPose",
			Request::PerformHitTest { .. } => "performHitTest",
			Request::SubscribeFrames { .. } => "subscribeFrames",
			Request::UnsubscribeFrames { .. } => "unsubscribeFrames",
			Request::SessionState => "sessionState",
			Request::Pause => "pause",
			Request::Resume => "resume",
			Request::Destroy => "destroy",
		}
	}
}

/// A request with its correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
	pub id: u64,
	#[serde(flatten)]
	pub request: Request,
}

/// Standardized error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
	SessionInitError,
	SessionNotStarted,
	SessionClosed,
	NotFound,
	ViewNotAttached,
	InvalidCoordinate,
	TrackingFailure,
	ContextGone,
	InvalidRequest,
}

impl std::fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ErrorCode::SessionInitError => write!(f, "SESSION_INIT_ERROR"),
			ErrorCode::SessionNotStarted => write!(f, "SESSION_NOT_STARTED"),
			ErrorCode::SessionClosed => write!(f, "SESSION_CLOSED"),
			ErrorCode::NotFound => write!(f, "NOT_FOUND"),
			ErrorCode::ViewNotAttached => write!(f, "VIEW_NOT_ATTACHED"),
			ErrorCode::InvalidCoordinate => write!(f, "INVALID_COORDINATE"),
			ErrorCode::TrackingFailure => write!(f, "TRACKING_FAILURE"),
			ErrorCode::ContextGone => write!(f, "CONTEXT_GONE"),
			ErrorCode::InvalidRequest => write!(f, "INVALID_REQUEST"),
		}
	}
}

/// Error details for a failed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
	pub code: ErrorCode,
	pub message: String,
}

/// Response to a single request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
	/// Request id this response correlates to.
	pub id: u64,
	pub ok: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<ErrorBody>,
}

impl Response {
	pub fn success(id: u64, result: Value) -> Self {
		Self {
			id,
			ok: true,
			result: Some(result),
			error: None,
		}
	}

	pub fn failure(id: u64, code: ErrorCode, message: impl Into<String>) -> Self {
		Self {
			id,
			ok: false,
			result: None,
			error: Some(ErrorBody {
				code,
				message: message.into(),
			}),
		}
	}
}

/// Frame notification routed to one subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
	pub subscription_id: String,
	pub frame: FrameEvent,
}

/// Any line the bridge writes to the host.
///
/// Untagged on the wire: responses always carry the request `id`, frame
/// events never do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
	Response(Response),
	Event(Event),
}

/// `{ "success": true }` result for operations without a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Success {
	pub success: bool,
}

impl Success {
	pub const OK: Success = Success { success: true };
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorCreated {
	pub anchor_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorList {
	pub anchors: Vec<WireAnchor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitTestResults {
	pub results: Vec<WireHit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscribed {
	pub subscription_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStateReport {
	pub state: SessionState,
}
