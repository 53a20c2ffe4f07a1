//! Encoded tracking data as it appears on the wire.

use serde::{Deserialize, Serialize};

/// Rigid transform in tracking space.
///
/// `rotation` is a unit quaternion in `(x, y, z, w)` order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WirePose {
	pub position: [f32; 3],
	pub rotation: [f32; 4],
}

impl WirePose {
	/// Pose at the tracking-space origin with no rotation.
	pub const IDENTITY: WirePose = WirePose {
		position: [0.0, 0.0, 0.0],
		rotation: [0.0, 0.0, 0.0, 1.0],
	};
}

/// Tracking status of an anchor, surface, or the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingStatus {
	Tracking,
	Paused,
	Stopped,
}

/// Kind of trackable a hit test intersected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackableType {
	Plane,
	Point,
	Depth,
}

/// Orientation of a detected plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaneOrientation {
	/// Floors and table tops.
	HorizontalUp,
	/// Ceilings.
	HorizontalDown,
	Vertical,
}

/// Lifecycle state of the tracking session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
	Created,
	Running,
	Paused,
	Closed,
}

/// One hit-test intersection, nearest first within a result list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WireHit {
	pub position: [f32; 3],
	#[serde(rename = "type")]
	pub kind: TrackableType,
	/// Distance from the camera in meters.
	pub distance: f32,
}

/// A tracked surface visible in a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSurface {
	pub id: u64,
	pub orientation: PlaneOrientation,
	pub center: WirePose,
	/// Extent along the plane's local x and z axes, in meters.
	pub extent: [f32; 2],
	pub status: TrackingStatus,
}

/// Registered anchor as reported to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireAnchor {
	pub anchor_id: String,
	pub status: TrackingStatus,
	pub pose: WirePose,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub plane_id: Option<u64>,
}

/// Per-frame notification pushed to every active frame subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameEvent {
	/// Tick sequence number, starting at 1 for the first dispatched frame.
	pub sequence: u64,
	pub timestamp_ns: i64,
	pub camera: WirePose,
	pub camera_status: TrackingStatus,
	#[serde(default)]
	pub surfaces: Vec<WireSurface>,
	#[serde(default)]
	pub anchors: Vec<WireAnchor>,
}
