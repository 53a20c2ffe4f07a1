//! Seams to the native collaborators: the tracking capability and the overlay view.
//!
//! The engine never talks to a tracking SDK or a view hierarchy directly.
//! Implementations of these traits live on the single execution context and
//! are never shared across threads, so none of them are required to be
//! `Send` or `Sync`.

use ar_protocol::{PlaneOrientation, TrackableType, TrackingStatus};
use thiserror::Error;

use crate::pose::{Pose, Vec3};

/// Tracking state reported by the native capability.
pub type TrackingState = TrackingStatus;

/// Failure reported by a native collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
	#[error("camera permission not granted")]
	PermissionDenied,
	#[error("AR tracking is not supported on this device")]
	Unsupported,
	#[error("camera is in use or unavailable")]
	CameraUnavailable,
	#[error("{0}")]
	Native(String),
}

/// Plane detection mode requested from the capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneFindingMode {
	Disabled,
	Horizontal,
	Vertical,
	HorizontalAndVertical,
}

/// How `update()` paces frames relative to the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
	/// Block until a new camera image is available.
	Blocking,
	/// Return immediately with the most recent camera image.
	LatestCameraImage,
}

/// Native session configuration.
///
/// The engine always uses [`SessionConfig::default`]: horizontal and vertical
/// plane finding with latest-camera-image updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
	pub plane_finding: PlaneFindingMode,
	pub update_mode: UpdateMode,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			plane_finding: PlaneFindingMode::HorizontalAndVertical,
			update_mode: UpdateMode::LatestCameraImage,
		}
	}
}

/// Opaque handle to a native anchor. Only meaningful to the session that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeAnchor(pub u64);

/// Identifier of a trackable (plane, feature point) within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackableId(pub u64);

/// Opaque handle to a renderable owned by the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderableId(pub u64);

/// A detected real-world surface.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedPlane {
	pub id: TrackableId,
	pub orientation: PlaneOrientation,
	/// Center of the plane; its translation gives the plane height for horizontal planes.
	pub center: Pose,
	/// Extent along the plane's local x and z axes.
	pub extent: [f32; 2],
	pub state: TrackingState,
}

impl TrackedPlane {
	/// Returns `true` when this is an upward-facing plane directly beneath `point`.
	///
	/// The footprint test treats the extent as axis-aligned in world space.
	pub fn lies_under(&self, point: Vec3) -> bool {
		if self.orientation != PlaneOrientation::HorizontalUp {
			return false;
		}
		let c = self.center.translation;
		let [ex, ez] = self.extent;
		(point.x - c.x).abs() <= ex / 2.0 && (point.z - c.z).abs() <= ez / 2.0 && c.y <= point.y
	}
}

/// One tracking-cycle snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
	pub timestamp_ns: i64,
	pub camera: Pose,
	pub camera_state: TrackingState,
	pub planes: Vec<TrackedPlane>,
}

/// Intersection reported by the native hit test, nearest first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawHit {
	pub pose: Pose,
	pub distance: f32,
	pub kind: TrackableType,
	pub trackable: TrackableId,
	pub state: TrackingState,
}

/// Current native view of an anchor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorState {
	pub pose: Pose,
	pub state: TrackingState,
}

/// Factory for native tracking sessions.
pub trait TrackingCapability {
	/// Creates a configured, not yet resumed session.
	///
	/// Fails when the device cannot track (missing permission, unsupported hardware).
	fn create_session(&mut self, config: &SessionConfig) -> Result<Box<NativeSession>, CapabilityError>;
}

/// A live native tracking session.
pub trait TrackingSession {
	fn resume(&mut self) -> Result<(), CapabilityError>;

	fn pause(&mut self);

	/// Releases every native resource. The session is unusable afterwards.
	fn close(&mut self);

	/// Advances tracking by one frame.
	fn update(&mut self) -> Result<Frame, CapabilityError>;

	/// Creates an anchor at `pose`, optionally attached to a trackable.
	fn create_anchor(&mut self, pose: Pose, trackable: Option<TrackableId>) -> Result<NativeAnchor, CapabilityError>;

	/// Stops tracking an anchor. Unknown handles are ignored.
	fn detach_anchor(&mut self, anchor: NativeAnchor);

	fn anchor_state(&self, anchor: NativeAnchor) -> AnchorState;

	/// Intersects the ray through normalized screen coordinate `(u, v)` with
	/// trackables in `frame`, ordered by ascending distance from the camera.
	fn hit_test(&mut self, frame: &Frame, u: f32, v: f32) -> Vec<RawHit>;
}

/// Session trait object as owned by the engine.
pub type NativeSession = dyn TrackingSession;

/// Overlay container hosting one renderable per anchor, placed behind the
/// host's transparent primary surface.
pub trait Overlay {
	/// Inserts the overlay container into the host view hierarchy.
	fn attach(&mut self) -> Result<(), CapabilityError>;

	fn is_attached(&self) -> bool;

	/// Adds the default anchor renderable.
	fn add_renderable(&mut self, anchor_id: &str, pose: &Pose) -> Result<RenderableId, CapabilityError>;

	fn update_renderable(&mut self, renderable: RenderableId, pose: &Pose, visible: bool);

	/// Removes a renderable. Unknown handles are ignored.
	fn remove_renderable(&mut self, renderable: RenderableId);
}

/// Native collaborators handed to a new engine.
pub struct EngineParts {
	pub capability: Box<dyn TrackingCapability>,
	pub overlay: Box<dyn Overlay>,
}
