//! Simulated tracking capability and overlay.
//!
//! Provides an in-memory world for exercising the engine without a device:
//! a pinhole camera, scriptable planes, anchors whose tracking can be
//! dropped, and injectable native failures. Every simulated object shares its
//! state with a controller so tests (and the demo host) can steer the world
//! and inspect what the engine did to it.
//!
//! # Example
//!
//! ```ignore
//! let (engine, world, view) = sim::engine();
//! world.add_plane(PlaneOrientation::HorizontalUp, Vec3::new(0.0, -1.4, -1.0), [3.0, 3.0]);
//! let bridge = Bridge::spawn(BridgeConfig::default(), move || engine.into_parts())?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use ar_protocol::{PlaneOrientation, TrackableType};
use parking_lot::Mutex;

use crate::capability::{
	AnchorState, CapabilityError, EngineParts, Frame, NativeAnchor, NativeSession, Overlay, RawHit, RenderableId, SessionConfig, TrackableId,
	TrackedPlane, TrackingCapability, TrackingSession, TrackingState,
};
use crate::pose::{Pose, Quat, Vec3, canonical_rotation};

/// Simulated frame period (30 Hz).
pub const FRAME_PERIOD_NS: i64 = 33_333_333;

const VERTICAL_FOV_RADIANS: f32 = 1.047_197_6;
const ASPECT: f32 = 9.0 / 16.0;

#[derive(Debug, Clone, Copy)]
struct SimAnchor {
	pose: Pose,
	state: TrackingState,
	trackable: Option<TrackableId>,
}

struct World {
	deny_sessions: Option<CapabilityError>,
	fail_next_resume: Option<CapabilityError>,
	fail_updates: Option<CapabilityError>,
	sessions_created: u32,
	config: Option<SessionConfig>,
	running: bool,
	closed: bool,
	clock_ns: i64,
	updates: u64,
	camera: Pose,
	camera_state: TrackingState,
	planes: Vec<TrackedPlane>,
	next_trackable: u64,
	scripted_hits: Option<Vec<RawHit>>,
	anchors: BTreeMap<u64, SimAnchor>,
	next_anchor: u64,
	detached: Vec<NativeAnchor>,
}

impl Default for World {
	fn default() -> Self {
		Self {
			deny_sessions: None,
			fail_next_resume: None,
			fail_updates: None,
			sessions_created: 0,
			config: None,
			running: false,
			closed: false,
			clock_ns: 0,
			updates: 0,
			camera: Pose::IDENTITY,
			camera_state: TrackingState::Tracking,
			planes: Vec::new(),
			next_trackable: 1,
			scripted_hits: None,
			anchors: BTreeMap::new(),
			next_anchor: 1,
			detached: Vec::new(),
		}
	}
}

impl World {
	fn frame(&self) -> Frame {
		Frame {
			timestamp_ns: self.clock_ns,
			camera: self.camera,
			camera_state: self.camera_state,
			planes: self.planes.clone(),
		}
	}

	fn plane_state(&self, id: TrackableId) -> Option<TrackingState> {
		self.planes.iter().find(|p| p.id == id).map(|p| p.state)
	}
}

/// Camera-space ray direction through normalized screen coordinate `(u, v)`.
fn screen_ray(u: f32, v: f32) -> Vec3 {
	let tan_v = (VERTICAL_FOV_RADIANS / 2.0).tan();
	let tan_h = tan_v * ASPECT;
	Vec3::new((u - 0.5) * 2.0 * tan_h, -(v - 0.5) * 2.0 * tan_v, -1.0).normalize_or_zero()
}

fn intersect(plane: &TrackedPlane, origin: Vec3, dir: Vec3) -> Option<(Vec3, f32)> {
	let center = plane.center.translation;
	let normal = match plane.orientation {
		PlaneOrientation::HorizontalUp => Vec3::new(0.0, 1.0, 0.0),
		PlaneOrientation::HorizontalDown => Vec3::new(0.0, -1.0, 0.0),
		PlaneOrientation::Vertical => canonical_rotation(plane.center.rotation).mul_vec3(Vec3::Z),
	};
	let denom = normal.dot(dir);
	if denom.abs() <= f32::EPSILON {
		return None;
	}
	let t = normal.dot(center - origin) / denom;
	if t <= 0.0 {
		return None;
	}
	let point = origin + dir * t;
	let [ex, ez] = plane.extent;
	let inside = match plane.orientation {
		PlaneOrientation::HorizontalUp | PlaneOrientation::HorizontalDown => {
			(point.x - center.x).abs() <= ex / 2.0 && (point.z - center.z).abs() <= ez / 2.0
		}
		PlaneOrientation::Vertical => {
			let axis = canonical_rotation(plane.center.rotation).mul_vec3(Vec3::X);
			(point - center).dot(axis).abs() <= ex / 2.0 && (point.y - center.y).abs() <= ez / 2.0
		}
	};
	inside.then_some((point, t))
}

/// Simulated tracking capability.
pub struct SimTracking {
	world: Arc<Mutex<World>>,
}

impl SimTracking {
	/// Creates the capability and the controller sharing its world.
	pub fn new() -> (Self, SimController) {
		let world = Arc::new(Mutex::new(World::default()));
		(Self { world: Arc::clone(&world) }, SimController { world })
	}
}

impl TrackingCapability for SimTracking {
	fn create_session(&mut self, config: &SessionConfig) -> Result<Box<NativeSession>, CapabilityError> {
		let mut world = self.world.lock();
		if let Some(err) = world.deny_sessions.clone() {
			return Err(err);
		}
		world.sessions_created += 1;
		world.config = Some(*config);
		world.closed = false;
		Ok(Box::new(SimSession {
			world: Arc::clone(&self.world),
		}))
	}
}

struct SimSession {
	world: Arc<Mutex<World>>,
}

impl TrackingSession for SimSession {
	fn resume(&mut self) -> Result<(), CapabilityError> {
		let mut world = self.world.lock();
		if let Some(err) = world.fail_next_resume.take() {
			return Err(err);
		}
		world.running = true;
		Ok(())
	}

	fn pause(&mut self) {
		self.world.lock().running = false;
	}

	fn close(&mut self) {
		let mut world = self.world.lock();
		world.running = false;
		world.closed = true;
		world.anchors.clear();
	}

	fn update(&mut self) -> Result<Frame, CapabilityError> {
		let mut world = self.world.lock();
		if !world.running {
			return Err(CapabilityError::Native("session is paused".to_string()));
		}
		if let Some(err) = world.fail_updates.clone() {
			return Err(err);
		}
		world.clock_ns += FRAME_PERIOD_NS;
		world.updates += 1;
		Ok(world.frame())
	}

	fn create_anchor(&mut self, pose: Pose, trackable: Option<TrackableId>) -> Result<NativeAnchor, CapabilityError> {
		let mut world = self.world.lock();
		if !world.running {
			return Err(CapabilityError::Native("session is paused".to_string()));
		}
		let handle = world.next_anchor;
		world.next_anchor += 1;
		world.anchors.insert(
			handle,
			SimAnchor {
				pose,
				state: TrackingState::Tracking,
				trackable,
			},
		);
		Ok(NativeAnchor(handle))
	}

	fn detach_anchor(&mut self, anchor: NativeAnchor) {
		let mut world = self.world.lock();
		if world.anchors.remove(&anchor.0).is_some() {
			world.detached.push(anchor);
		}
	}

	fn anchor_state(&self, anchor: NativeAnchor) -> AnchorState {
		let world = self.world.lock();
		let Some(sim) = world.anchors.get(&anchor.0) else {
			return AnchorState {
				pose: Pose::IDENTITY,
				state: TrackingState::Stopped,
			};
		};
		let plane_state = sim.trackable.and_then(|id| world.plane_state(id));
		let state = match (sim.state, plane_state) {
			(TrackingState::Tracking, Some(TrackingState::Paused)) => TrackingState::Paused,
			(state, _) => state,
		};
		AnchorState { pose: sim.pose, state }
	}

	fn hit_test(&mut self, frame: &Frame, u: f32, v: f32) -> Vec<RawHit> {
		let world = self.world.lock();
		if let Some(hits) = &world.scripted_hits {
			return hits.clone();
		}
		let origin = frame.camera.translation;
		let dir = canonical_rotation(frame.camera.rotation).mul_vec3(screen_ray(u, v));
		let mut hits: Vec<RawHit> = frame
			.planes
			.iter()
			.filter_map(|plane| {
				intersect(plane, origin, dir).map(|(point, distance)| RawHit {
					pose: Pose::new(point, plane.center.rotation),
					distance,
					kind: TrackableType::Plane,
					trackable: plane.id,
					state: plane.state,
				})
			})
			.collect();
		hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
		hits
	}
}

/// Steers and inspects a [`SimTracking`] world.
#[derive(Clone)]
pub struct SimController {
	world: Arc<Mutex<World>>,
}

impl SimController {
	/// Makes every following `create_session` fail with `err`.
	pub fn deny_sessions(&self, err: CapabilityError) {
		self.world.lock().deny_sessions = Some(err);
	}

	pub fn allow_sessions(&self) {
		self.world.lock().deny_sessions = None;
	}

	pub fn fail_next_resume(&self, err: CapabilityError) {
		self.world.lock().fail_next_resume = Some(err);
	}

	/// Makes every `update()` fail until cleared with `None`.
	pub fn fail_updates(&self, err: Option<CapabilityError>) {
		self.world.lock().fail_updates = err;
	}

	pub fn sessions_created(&self) -> u32 {
		self.world.lock().sessions_created
	}

	pub fn session_config(&self) -> Option<SessionConfig> {
		self.world.lock().config
	}

	pub fn is_running(&self) -> bool {
		self.world.lock().running
	}

	pub fn is_closed(&self) -> bool {
		self.world.lock().closed
	}

	pub fn update_count(&self) -> u64 {
		self.world.lock().updates
	}

	pub fn set_camera(&self, pose: Pose) {
		self.world.lock().camera = pose;
	}

	pub fn set_camera_state(&self, state: TrackingState) {
		self.world.lock().camera_state = state;
	}

	/// Adds a tracking plane centered at `center` and returns its id.
	pub fn add_plane(&self, orientation: PlaneOrientation, center: Vec3, extent: [f32; 2]) -> TrackableId {
		self.add_plane_with_rotation(orientation, Pose::new(center, Quat::IDENTITY), extent)
	}

	pub fn add_plane_with_rotation(&self, orientation: PlaneOrientation, center: Pose, extent: [f32; 2]) -> TrackableId {
		let mut world = self.world.lock();
		let id = TrackableId(world.next_trackable);
		world.next_trackable += 1;
		world.planes.push(TrackedPlane {
			id,
			orientation,
			center,
			extent,
			state: TrackingState::Tracking,
		});
		id
	}

	pub fn set_plane_state(&self, id: TrackableId, state: TrackingState) {
		let mut world = self.world.lock();
		if let Some(plane) = world.planes.iter_mut().find(|p| p.id == id) {
			plane.state = state;
		}
	}

	/// Replaces geometric hit testing with a fixed result list.
	pub fn script_hits(&self, hits: Vec<RawHit>) {
		self.world.lock().scripted_hits = Some(hits);
	}

	/// Native handles of anchors that are still attached, in creation order.
	pub fn native_anchors(&self) -> Vec<NativeAnchor> {
		self.world.lock().anchors.keys().map(|&k| NativeAnchor(k)).collect()
	}

	pub fn live_anchor_count(&self) -> usize {
		self.world.lock().anchors.len()
	}

	pub fn detached_anchors(&self) -> Vec<NativeAnchor> {
		self.world.lock().detached.clone()
	}

	pub fn set_anchor_state(&self, anchor: NativeAnchor, state: TrackingState) {
		if let Some(sim) = self.world.lock().anchors.get_mut(&anchor.0) {
			sim.state = state;
		}
	}

	pub fn set_anchor_state_for_all(&self, state: TrackingState) {
		for sim in self.world.lock().anchors.values_mut() {
			sim.state = state;
		}
	}

	/// Simulates drift correction: the tracker moves an anchor.
	pub fn move_anchor(&self, anchor: NativeAnchor, pose: Pose) {
		if let Some(sim) = self.world.lock().anchors.get_mut(&anchor.0) {
			sim.pose = pose;
		}
	}
}

/// A renderable as placed in the simulated overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct SimRenderable {
	pub id: RenderableId,
	pub anchor_id: String,
	pub pose: Pose,
	pub visible: bool,
}

struct ViewState {
	host_view_available: bool,
	attached: bool,
	reject_renderables: bool,
	renderables: BTreeMap<u64, SimRenderable>,
	next_id: u64,
}

/// Simulated overlay container.
pub struct SimOverlay {
	view: Arc<Mutex<ViewState>>,
}

impl SimOverlay {
	pub fn new() -> (Self, OverlayController) {
		let view = Arc::new(Mutex::new(ViewState {
			host_view_available: true,
			attached: false,
			reject_renderables: false,
			renderables: BTreeMap::new(),
			next_id: 1,
		}));
		(Self { view: Arc::clone(&view) }, OverlayController { view })
	}
}

impl Overlay for SimOverlay {
	fn attach(&mut self) -> Result<(), CapabilityError> {
		let mut view = self.view.lock();
		if !view.host_view_available {
			return Err(CapabilityError::Native("host view has no parent container".to_string()));
		}
		view.attached = true;
		Ok(())
	}

	fn is_attached(&self) -> bool {
		self.view.lock().attached
	}

	fn add_renderable(&mut self, anchor_id: &str, pose: &Pose) -> Result<RenderableId, CapabilityError> {
		let mut view = self.view.lock();
		if !view.attached || view.reject_renderables {
			return Err(CapabilityError::Native("overlay container rejected renderable".to_string()));
		}
		let id = RenderableId(view.next_id);
		view.next_id += 1;
		view.renderables.insert(
			id.0,
			SimRenderable {
				id,
				anchor_id: anchor_id.to_string(),
				pose: *pose,
				visible: true,
			},
		);
		Ok(id)
	}

	fn update_renderable(&mut self, renderable: RenderableId, pose: &Pose, visible: bool) {
		if let Some(r) = self.view.lock().renderables.get_mut(&renderable.0) {
			r.pose = *pose;
			r.visible = visible;
		}
	}

	fn remove_renderable(&mut self, renderable: RenderableId) {
		self.view.lock().renderables.remove(&renderable.0);
	}
}

/// Steers and inspects a [`SimOverlay`].
#[derive(Clone)]
pub struct OverlayController {
	view: Arc<Mutex<ViewState>>,
}

impl OverlayController {
	/// Controls whether the host exposes a container the overlay can attach to.
	pub fn set_host_view_available(&self, available: bool) {
		self.view.lock().host_view_available = available;
	}

	pub fn reject_renderables(&self, reject: bool) {
		self.view.lock().reject_renderables = reject;
	}

	pub fn is_attached(&self) -> bool {
		self.view.lock().attached
	}

	pub fn renderable_count(&self) -> usize {
		self.view.lock().renderables.len()
	}

	pub fn renderable_for(&self, anchor_id: &str) -> Option<SimRenderable> {
		self.view.lock().renderables.values().find(|r| r.anchor_id == anchor_id).cloned()
	}
}

/// Simulated collaborators for one engine.
///
/// Unlike [`EngineParts`] this is `Send`, so it can be moved into the
/// factory passed to [`Bridge::spawn`](crate::executor::Bridge::spawn).
pub struct SimEngine {
	pub tracking: SimTracking,
	pub overlay: SimOverlay,
}

impl SimEngine {
	pub fn into_parts(self) -> EngineParts {
		EngineParts {
			capability: Box::new(self.tracking),
			overlay: Box::new(self.overlay),
		}
	}
}

/// Simulated collaborators for a new engine, plus their controllers.
pub fn engine() -> (SimEngine, SimController, OverlayController) {
	let (tracking, world) = SimTracking::new();
	let (overlay, view) = SimOverlay::new();
	(SimEngine { tracking, overlay }, world, view)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn running_session() -> (Box<NativeSession>, SimController) {
		let (mut tracking, sim) = SimTracking::new();
		let mut session = tracking.create_session(&SessionConfig::default()).unwrap();
		session.resume().unwrap();
		(session, sim)
	}

	#[test]
	fn update_advances_clock_only_while_running() {
		let (mut session, sim) = running_session();
		let first = session.update().unwrap();
		let second = session.update().unwrap();
		assert_eq!(second.timestamp_ns - first.timestamp_ns, FRAME_PERIOD_NS);

		session.pause();
		assert!(session.update().is_err());
		assert_eq!(sim.update_count(), 2);
	}

	#[test]
	fn center_ray_hits_floor_ahead_before_far_wall() {
		let (mut session, sim) = running_session();
		let pitch_down = Quat::from_rotation_x(-std::f32::consts::FRAC_PI_4);
		sim.set_camera(Pose::new(Vec3::new(0.0, 1.5, 0.0), pitch_down));
		let floor = sim.add_plane(PlaneOrientation::HorizontalUp, Vec3::new(0.0, 0.0, -1.5), [4.0, 4.0]);
		let wall = sim.add_plane(PlaneOrientation::Vertical, Vec3::new(0.0, 1.0, -10.0), [20.0, 20.0]);

		let frame = session.update().unwrap();
		let hits = session.hit_test(&frame, 0.5, 0.5);

		assert_eq!(hits.len(), 2);
		assert_eq!(hits[0].trackable, floor);
		assert_eq!(hits[1].trackable, wall);
		assert!(hits[0].distance <= hits[1].distance);
		assert!((hits[0].pose.translation.y).abs() < 1e-4);
	}

	#[test]
	fn ray_misses_plane_behind_camera() {
		let (mut session, sim) = running_session();
		sim.add_plane(PlaneOrientation::Vertical, Vec3::new(0.0, 0.0, 5.0), [10.0, 10.0]);
		let frame = session.update().unwrap();
		assert!(session.hit_test(&frame, 0.5, 0.5).is_empty());
	}

	#[test]
	fn anchor_on_paused_plane_reports_paused() {
		let (mut session, sim) = running_session();
		let plane = sim.add_plane(PlaneOrientation::HorizontalUp, Vec3::ZERO, [1.0, 1.0]);
		let anchor = session.create_anchor(Pose::IDENTITY, Some(plane)).unwrap();

		sim.set_plane_state(plane, TrackingState::Paused);
		assert_eq!(session.anchor_state(anchor).state, TrackingState::Paused);

		session.detach_anchor(anchor);
		assert_eq!(session.anchor_state(anchor).state, TrackingState::Stopped);
		assert_eq!(sim.detached_anchors(), vec![anchor]);
	}

	#[test]
	fn overlay_attach_requires_host_view() {
		let (mut overlay, view) = SimOverlay::new();
		view.set_host_view_available(false);
		assert!(overlay.attach().is_err());
		view.set_host_view_available(true);
		overlay.attach().unwrap();
		assert!(view.is_attached());
	}
}
