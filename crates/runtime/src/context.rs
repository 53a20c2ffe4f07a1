//! The owned engine context.
//!
//! [`ArContext`] holds the session controller, anchor registry, frame
//! dispatcher, hit-test resolver, overlay, and the current frame. It is not
//! shared: exactly one execution context owns it (see [`crate::executor`])
//! and every operation takes `&mut self`, so operations can never interleave
//! with each other or with a tick.

use ar_protocol::SessionState;
use tracing::{debug, trace};

use crate::capability::{EngineParts, Frame, NativeSession, Overlay};
use crate::config::BridgeConfig;
use crate::dispatcher::{FrameDispatcher, FrameStream, SubscriptionHandle, TickReport};
use crate::error::{Error, Result};
use crate::hit_test::{HitResult, HitTestResolver};
use crate::pose::{Pose, Vec3};
use crate::registry::{AnchorId, AnchorRegistry, AnchorSnapshot};
use crate::session::SessionController;

pub struct ArContext {
	session: SessionController,
	registry: AnchorRegistry,
	dispatcher: FrameDispatcher,
	hit_test: HitTestResolver,
	overlay: Box<dyn Overlay>,
	/// Latest frame pulled while running; cleared on every lifecycle transition.
	frame: Option<Frame>,
}

/// Returns the cached frame, pulling one from the session when none is cached.
fn current_frame<'a>(session: &mut NativeSession, slot: &'a mut Option<Frame>) -> Result<&'a Frame> {
	if slot.is_none() {
		let frame = session.update().map_err(|err| Error::Tracking(err.to_string()))?;
		trace!(target = "ar.frames", timestamp_ns = frame.timestamp_ns, "frame pulled on demand");
		*slot = Some(frame);
	}
	slot.as_ref().ok_or(Error::SessionNotStarted)
}

impl ArContext {
	pub fn new(config: &BridgeConfig, parts: EngineParts) -> Self {
		Self {
			session: SessionController::new(parts.capability),
			registry: AnchorRegistry::new(config.anchor_id_prefix.clone()),
			dispatcher: FrameDispatcher::new(config.subscription_buffer),
			hit_test: HitTestResolver::new(config.hit_test_kinds.clone()),
			overlay: parts.overlay,
			frame: None,
		}
	}

	pub fn state(&self) -> SessionState {
		self.session.state()
	}

	fn ensure_open(&self) -> Result<()> {
		if self.session.state() == SessionState::Closed { Err(Error::SessionClosed) } else { Ok(()) }
	}

	/// Inserts the overlay container behind the host surface.
	pub fn attach_overlay(&mut self) -> Result<()> {
		self.ensure_open()?;
		self.overlay.attach().map_err(|err| {
			debug!(target = "ar.bridge", error = %err, "overlay attach failed");
			Error::ViewNotAttached
		})
	}

	pub fn start_session(&mut self) -> Result<()> {
		self.session.start()?;
		self.frame = None;
		Ok(())
	}

	pub fn stop_session(&mut self) -> Result<()> {
		self.session.stop()?;
		self.frame = None;
		Ok(())
	}

	/// Host background transition. No-op unless running.
	pub fn pause(&mut self) {
		self.session.pause();
		self.frame = None;
	}

	/// Host foreground transition. Best-effort; native failures are swallowed.
	pub fn resume(&mut self) {
		self.session.resume();
		self.frame = None;
	}

	/// Tears everything down: anchors, subscriptions, then the session itself.
	pub fn destroy(&mut self) {
		if self.session.state() == SessionState::Closed {
			return;
		}
		let session = self.session.live_mut().ok();
		self.registry.clear(session, self.overlay.as_mut());
		self.dispatcher.close_all();
		self.frame = None;
		self.session.destroy();
	}

	pub fn add_anchor(&mut self, position: Vec3, attach_to_plane: bool) -> Result<AnchorId> {
		let session = self.session.running_mut()?;
		if !self.overlay.is_attached() {
			return Err(Error::ViewNotAttached);
		}
		if !position.is_finite() {
			return Err(Error::InvalidPosition {
				x: position.x,
				y: position.y,
				z: position.z,
			});
		}
		let frame = if attach_to_plane { Some(current_frame(session, &mut self.frame)?) } else { None };
		self.registry.add(session, self.overlay.as_mut(), frame, position, attach_to_plane)
	}

	/// Removes an anchor. Allowed while paused; requires a started session.
	pub fn remove_anchor(&mut self, id: &str) -> Result<()> {
		let session = self.session.live_mut()?;
		self.registry.remove(session, self.overlay.as_mut(), id)
	}

	pub fn anchor(&self, id: &str) -> Result<Option<AnchorSnapshot>> {
		self.ensure_open()?;
		Ok(self.registry.lookup(id))
	}

	pub fn anchors(&self) -> Result<Vec<AnchorSnapshot>> {
		self.ensure_open()?;
		Ok(self.registry.snapshots())
	}

	pub fn camera_pose(&mut self) -> Result<Pose> {
		let session = self.session.running_mut()?;
		current_frame(session, &mut self.frame).map(|frame| frame.camera)
	}

	pub fn hit_test(&mut self, u: f32, v: f32) -> Result<Vec<HitResult>> {
		let session = self.session.running_mut()?;
		let frame = current_frame(session, &mut self.frame)?;
		self.hit_test.resolve(session, frame, u, v)
	}

	pub fn subscribe(&mut self, subscriber: impl Into<String>) -> Result<FrameStream> {
		self.ensure_open()?;
		Ok(self.dispatcher.subscribe(subscriber))
	}

	/// Idempotent; returns whether a subscription was removed.
	pub fn unsubscribe(&mut self, handle: SubscriptionHandle) -> bool {
		self.dispatcher.unsubscribe(handle)
	}

	/// Advances the session by one frame and notifies subscribers.
	pub fn tick(&mut self) -> Result<TickReport> {
		let session = self.session.running_mut()?;
		let (frame, report) = self.dispatcher.tick(session, &mut self.registry, self.overlay.as_mut())?;
		self.frame = Some(frame);
		Ok(report)
	}
}

#[cfg(test)]
mod tests {
	use ar_protocol::{PlaneOrientation, TrackingStatus};

	use super::*;
	use crate::capability::TrackingState;
	use crate::sim::{self, OverlayController, SimController};

	fn context() -> (ArContext, SimController, OverlayController) {
		let (engine, world, view) = sim::engine();
		(ArContext::new(&BridgeConfig::default(), engine.into_parts()), world, view)
	}

	fn started() -> (ArContext, SimController, OverlayController) {
		let (mut ctx, world, view) = context();
		ctx.attach_overlay().unwrap();
		ctx.start_session().unwrap();
		(ctx, world, view)
	}

	#[test]
	fn operations_before_start_fail_with_not_started() {
		let (mut ctx, _world, _view) = context();
		ctx.attach_overlay().unwrap();

		assert!(ctx.add_anchor(Vec3::ZERO, false).unwrap_err().is_not_started());
		assert!(ctx.remove_anchor("anchor_1").unwrap_err().is_not_started());
		assert!(ctx.camera_pose().unwrap_err().is_not_started());
		assert!(ctx.hit_test(0.5, 0.5).unwrap_err().is_not_started());
		assert!(ctx.tick().unwrap_err().is_not_started());
	}

	#[test]
	fn hit_test_after_start_without_planes_is_empty() {
		let (mut ctx, _world, _view) = started();
		assert!(ctx.hit_test(0.5, 0.5).unwrap().is_empty());
	}

	#[test]
	fn camera_pose_is_available_right_after_start() {
		let (mut ctx, world, _view) = started();
		let pose = Pose::at(Vec3::new(0.2, 1.4, 0.1));
		world.set_camera(pose);

		assert_eq!(ctx.camera_pose().unwrap(), pose);
		assert_eq!(world.update_count(), 1);
		ctx.camera_pose().unwrap();
		assert_eq!(world.update_count(), 1);
	}

	#[test]
	fn tick_refreshes_the_frame_used_by_queries() {
		let (mut ctx, world, _view) = started();
		ctx.tick().unwrap();
		let moved = Pose::at(Vec3::new(0.0, 0.0, -3.0));
		world.set_camera(moved);
		assert_ne!(ctx.camera_pose().unwrap(), moved);

		ctx.tick().unwrap();
		assert_eq!(ctx.camera_pose().unwrap(), moved);
	}

	#[test]
	fn add_anchor_requires_attached_overlay() {
		let (mut ctx, world, _view) = context();
		ctx.start_session().unwrap();
		assert_eq!(ctx.add_anchor(Vec3::ZERO, false), Err(Error::ViewNotAttached));
		assert_eq!(world.live_anchor_count(), 0);
	}

	#[test]
	fn add_anchor_rejects_non_finite_positions() {
		let (mut ctx, world, view) = started();

		let err = ctx.add_anchor(Vec3::new(f32::INFINITY, 0.0, -1.0), false).unwrap_err();
		assert!(matches!(err, Error::InvalidPosition { .. }));
		assert!(ctx.add_anchor(Vec3::new(0.0, f32::NAN, 0.0), true).is_err());

		assert_eq!(world.live_anchor_count(), 0);
		assert_eq!(view.renderable_count(), 0);
		assert!(ctx.anchors().unwrap().is_empty());
	}

	#[test]
	fn attach_overlay_without_host_view_fails() {
		let (mut ctx, _world, view) = context();
		view.set_host_view_available(false);
		assert_eq!(ctx.attach_overlay(), Err(Error::ViewNotAttached));
	}

	#[test]
	fn attach_to_plane_pulls_a_frame_when_none_is_cached() {
		let (mut ctx, world, _view) = started();
		let floor = world.add_plane(PlaneOrientation::HorizontalUp, Vec3::new(0.0, -1.0, -1.0), [2.0, 2.0]);

		let id = ctx.add_anchor(Vec3::new(0.0, 0.0, -1.0), true).unwrap();
		let snapshot = ctx.anchor(id.as_str()).unwrap().unwrap();
		assert_eq!(snapshot.plane, Some(floor));
	}

	#[test]
	fn remove_anchor_works_while_paused() {
		let (mut ctx, world, view) = started();
		let id = ctx.add_anchor(Vec3::ZERO, false).unwrap();
		ctx.stop_session().unwrap();

		ctx.remove_anchor(id.as_str()).unwrap();
		assert_eq!(world.live_anchor_count(), 0);
		assert_eq!(view.renderable_count(), 0);
	}

	#[test]
	fn ticks_are_rejected_while_paused() {
		let (mut ctx, _world, _view) = started();
		let mut stream = ctx.subscribe("host").unwrap();
		ctx.tick().unwrap();
		ctx.stop_session().unwrap();
		assert!(ctx.tick().unwrap_err().is_not_started());

		assert_eq!(stream.try_recv().map(|e| e.sequence), Some(1));
		assert!(stream.try_recv().is_none());
	}

	#[test]
	fn tick_carries_anchor_tracking_changes() {
		let (mut ctx, world, view) = started();
		let mut stream = ctx.subscribe("host").unwrap();
		let id = ctx.add_anchor(Vec3::new(1.0, 0.0, -1.0), false).unwrap();

		world.set_anchor_state_for_all(TrackingState::Stopped);
		ctx.tick().unwrap();

		let event = stream.try_recv().unwrap();
		assert_eq!(event.anchors.len(), 1);
		assert_eq!(event.anchors[0].anchor_id, id.as_str());
		assert_eq!(event.anchors[0].status, TrackingStatus::Stopped);
		assert!(!view.renderable_for(id.as_str()).unwrap().visible);
		assert_eq!(ctx.anchor(id.as_str()).unwrap().unwrap().status, TrackingStatus::Stopped);
	}

	#[test]
	fn destroy_invalidates_everything() {
		let (mut ctx, world, view) = started();
		let stream = ctx.subscribe("host").unwrap();
		let id = ctx.add_anchor(Vec3::ZERO, false).unwrap();

		ctx.destroy();

		assert_eq!(ctx.state(), SessionState::Closed);
		assert!(world.is_closed());
		assert_eq!(view.renderable_count(), 0);
		assert!(!stream.is_active());
		assert!(ctx.add_anchor(Vec3::ZERO, false).unwrap_err().is_closed());
		assert!(ctx.remove_anchor(id.as_str()).unwrap_err().is_closed());
		assert!(ctx.camera_pose().unwrap_err().is_closed());
		assert!(ctx.hit_test(0.5, 0.5).unwrap_err().is_closed());
		assert!(ctx.tick().unwrap_err().is_closed());
		assert!(ctx.anchor(id.as_str()).unwrap_err().is_closed());
		assert!(ctx.subscribe("late").unwrap_err().is_closed());
		assert!(ctx.start_session().unwrap_err().is_closed());
		assert_eq!(ctx.attach_overlay(), Err(Error::SessionClosed));
	}

	#[test]
	fn native_update_failure_surfaces_as_tracking_error() {
		let (mut ctx, world, _view) = started();
		world.fail_updates(Some(crate::capability::CapabilityError::CameraUnavailable));
		assert!(matches!(ctx.tick(), Err(Error::Tracking(_))));
		world.fail_updates(None);
		assert_eq!(ctx.tick().unwrap().sequence, 1);
	}
}
