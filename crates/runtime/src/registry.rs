//! Anchor registry: external identifiers to native handles and renderables.
//!
//! Entries live in a creation-ordered arena keyed by a private sequence
//! number; the external [`AnchorId`] indexes into it. An entry's renderable is
//! attached to the overlay exactly while the entry exists.

use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use ar_protocol::WireAnchor;
use tracing::{debug, info};

use crate::capability::{Frame, NativeAnchor, NativeSession, Overlay, RenderableId, TrackableId, TrackedPlane, TrackingState};
use crate::error::{Error, Result};
use crate::pose::{Pose, Vec3, encode_pose};

/// Last timestamp handed out by [`next_stamp`], shared by every registry in the process.
static LAST_STAMP: AtomicU64 = AtomicU64::new(0);

/// Returns a millisecond timestamp strictly greater than any previously returned.
fn next_stamp(now_ms: u64) -> u64 {
	let mut last = LAST_STAMP.load(Ordering::Relaxed);
	loop {
		let stamp = now_ms.max(last + 1);
		match LAST_STAMP.compare_exchange_weak(last, stamp, Ordering::AcqRel, Ordering::Relaxed) {
			Ok(_) => return stamp,
			Err(actual) => last = actual,
		}
	}
}

fn now_ms() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_millis() as u64)
		.unwrap_or(0)
}

/// External anchor identifier, e.g. `anchor_1718000000000`.
///
/// Never reused within a process, even after the anchor is removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnchorId(String);

impl AnchorId {
	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn into_string(self) -> String {
		self.0
	}
}

impl fmt::Display for AnchorId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl AsRef<str> for AnchorId {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

impl Borrow<str> for AnchorId {
	fn borrow(&self) -> &str {
		&self.0
	}
}

/// Read-only view of a registered anchor.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorSnapshot {
	pub id: AnchorId,
	pub status: TrackingState,
	pub pose: Pose,
	/// Plane the anchor was created on, if any.
	pub plane: Option<TrackableId>,
}

impl AnchorSnapshot {
	pub fn to_wire(&self) -> WireAnchor {
		WireAnchor {
			anchor_id: self.id.to_string(),
			status: self.status,
			pose: encode_pose(&self.pose),
			plane_id: self.plane.map(|p| p.0),
		}
	}
}

struct AnchorEntry {
	id: AnchorId,
	native: NativeAnchor,
	renderable: RenderableId,
	pose: Pose,
	status: TrackingState,
	plane: Option<TrackableId>,
}

impl AnchorEntry {
	fn snapshot(&self) -> AnchorSnapshot {
		AnchorSnapshot {
			id: self.id.clone(),
			status: self.status,
			pose: self.pose,
			plane: self.plane,
		}
	}
}

/// Finds the nearest tracking, upward-facing plane beneath `position`.
pub fn plane_under(frame: &Frame, position: Vec3) -> Option<&TrackedPlane> {
	frame
		.planes
		.iter()
		.filter(|plane| plane.state == TrackingState::Tracking && plane.lies_under(position))
		.max_by(|a, b| a.center.translation.y.total_cmp(&b.center.translation.y))
}

pub struct AnchorRegistry {
	prefix: String,
	entries: BTreeMap<u64, AnchorEntry>,
	index: HashMap<AnchorId, u64>,
	next_slot: u64,
}

impl AnchorRegistry {
	pub fn new(prefix: impl Into<String>) -> Self {
		Self {
			prefix: prefix.into(),
			entries: BTreeMap::new(),
			index: HashMap::new(),
			next_slot: 0,
		}
	}

	fn issue_id(&self) -> AnchorId {
		AnchorId(format!("{}{}", self.prefix, next_stamp(now_ms())))
	}

	/// Creates a native anchor with identity rotation and its default renderable.
	///
	/// With `attach_to_plane`, the anchor is placed on the plane beneath
	/// `position` in `frame` when one exists; otherwise it is free-floating.
	pub fn add(
		&mut self,
		session: &mut NativeSession,
		overlay: &mut dyn Overlay,
		frame: Option<&Frame>,
		position: Vec3,
		attach_to_plane: bool,
	) -> Result<AnchorId> {
		if !overlay.is_attached() {
			return Err(Error::ViewNotAttached);
		}

		let plane = if attach_to_plane { frame.and_then(|f| plane_under(f, position)) } else { None };
		let pose = match plane {
			Some(plane) => Pose::at(Vec3::new(position.x, plane.center.translation.y, position.z)),
			None => {
				if attach_to_plane {
					debug!(target = "ar.anchors", ?position, "no plane under position; creating free-floating anchor");
				}
				Pose::at(position)
			}
		};
		let plane_id = plane.map(|p| p.id);

		let native = session.create_anchor(pose, plane_id).map_err(|err| Error::Tracking(err.to_string()))?;
		let id = self.issue_id();

		let renderable = match overlay.add_renderable(id.as_str(), &pose) {
			Ok(renderable) => renderable,
			Err(err) => {
				debug!(target = "ar.anchors", anchor_id = %id, error = %err, "renderable rejected; detaching native anchor");
				session.detach_anchor(native);
				return Err(Error::ViewNotAttached);
			}
		};

		let slot = self.next_slot;
		self.next_slot += 1;
		self.index.insert(id.clone(), slot);
		self.entries.insert(
			slot,
			AnchorEntry {
				id: id.clone(),
				native,
				renderable,
				pose,
				status: TrackingState::Tracking,
				plane: plane_id,
			},
		);

		info!(target = "ar.anchors", anchor_id = %id, plane = ?plane_id, "anchor added");
		Ok(id)
	}

	/// Detaches the native anchor, removes its renderable, and erases the entry.
	pub fn remove(&mut self, session: &mut NativeSession, overlay: &mut dyn Overlay, id: &str) -> Result<()> {
		let slot = self.index.remove(id).ok_or_else(|| Error::anchor_not_found(id))?;
		let Some(entry) = self.entries.remove(&slot) else {
			return Err(Error::anchor_not_found(id));
		};

		session.detach_anchor(entry.native);
		overlay.remove_renderable(entry.renderable);
		info!(target = "ar.anchors", anchor_id = %entry.id, "anchor removed");
		Ok(())
	}

	pub fn lookup(&self, id: &str) -> Option<AnchorSnapshot> {
		let slot = self.index.get(id)?;
		self.entries.get(slot).map(AnchorEntry::snapshot)
	}

	/// All anchors in creation order.
	pub fn snapshots(&self) -> Vec<AnchorSnapshot> {
		self.entries.values().map(AnchorEntry::snapshot).collect()
	}

	/// Re-reads every anchor's native state and moves its renderable to match.
	///
	/// Renderables stay attached for anchors that lost tracking; they are only
	/// hidden until tracking returns or the anchor is removed.
	pub fn resolve(&mut self, session: &NativeSession, overlay: &mut dyn Overlay) {
		for entry in self.entries.values_mut() {
			let native = session.anchor_state(entry.native);
			if native.state != entry.status {
				debug!(
					target = "ar.anchors",
					anchor_id = %entry.id,
					from = ?entry.status,
					to = ?native.state,
					"anchor tracking changed"
				);
			}
			entry.pose = native.pose;
			entry.status = native.state;
			overlay.update_renderable(entry.renderable, &entry.pose, entry.status == TrackingState::Tracking);
		}
	}

	/// Drops every entry during teardown.
	///
	/// Native handles are detached only when the session is still available.
	pub fn clear(&mut self, mut session: Option<&mut NativeSession>, overlay: &mut dyn Overlay) {
		let count = self.entries.len();
		for entry in std::mem::take(&mut self.entries).into_values() {
			if let Some(session) = session.as_deref_mut() {
				session.detach_anchor(entry.native);
			}
			overlay.remove_renderable(entry.renderable);
		}
		self.index.clear();
		if count > 0 {
			debug!(target = "ar.anchors", count, "anchors invalidated");
		}
	}
}
