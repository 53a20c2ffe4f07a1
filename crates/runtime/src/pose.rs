//! Native pose representation and its stable wire encoding.
//!
//! Tracking capabilities hand out translation + rotation quaternion pairs
//! that may drift slightly off unit length and whose quaternion sign is
//! arbitrary (`q` and `-q` describe the same rotation). [`encode_pose`]
//! normalizes both so hosts see one canonical representation.

use ar_protocol::WirePose;
pub use glam::{Quat, Vec3};

/// Rigid transform in tracking space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
	pub translation: Vec3,
	pub rotation: Quat,
}

impl Pose {
	pub const IDENTITY: Pose = Pose {
		translation: Vec3::ZERO,
		rotation: Quat::IDENTITY,
	};

	pub const fn new(translation: Vec3, rotation: Quat) -> Self {
		Self { translation, rotation }
	}

	/// Pose at `position` with identity rotation, as used for new anchors.
	pub const fn at(position: Vec3) -> Self {
		Self {
			translation: position,
			rotation: Quat::IDENTITY,
		}
	}
}

/// Unit-length rotation with `w >= 0`.
///
/// Degenerate input (zero length or non-finite) collapses to identity.
pub fn canonical_rotation(rotation: Quat) -> Quat {
	let norm = rotation.length();
	if !norm.is_finite() || norm <= f32::EPSILON {
		return Quat::IDENTITY;
	}
	let unit = rotation / norm;
	if unit.w < 0.0 { -unit } else { unit }
}

/// Encodes a native pose into the stable wire format.
pub fn encode_pose(pose: &Pose) -> WirePose {
	WirePose {
		position: pose.translation.to_array(),
		rotation: canonical_rotation(pose.rotation).to_array(),
	}
}
