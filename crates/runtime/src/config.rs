//! Engine configuration loaded from JSON with environment overrides.
//!
//! Every field is optional in the file; missing fields take their defaults.
//!
//! ```json
//! { "anchorIdPrefix": "coin_", "subscriptionBuffer": 4, "hitTestKinds": ["plane", "point"] }
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use ar_protocol::TrackableType;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Overrides `tickIntervalMs`.
pub const TICK_INTERVAL_ENV: &str = "AR_BRIDGE_TICK_MS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct BridgeConfig {
	/// Prefix of generated anchor identifiers.
	pub anchor_id_prefix: String,
	/// Notifications buffered per frame subscriber before frames are dropped for it.
	pub subscription_buffer: usize,
	/// Requests buffered in front of the execution context.
	pub command_queue: usize,
	/// Host tick cadence.
	pub tick_interval_ms: u64,
	/// Trackable kinds reported by hit tests.
	pub hit_test_kinds: Vec<TrackableType>,
}

impl Default for BridgeConfig {
	fn default() -> Self {
		Self {
			anchor_id_prefix: "anchor_".to_string(),
			subscription_buffer: 8,
			command_queue: 64,
			tick_interval_ms: 33,
			hit_test_kinds: vec![TrackableType::Plane],
		}
	}
}

impl BridgeConfig {
	/// Reads and validates a JSON config file.
	pub fn load(path: &Path) -> Result<Self> {
		let content = fs::read_to_string(path).map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
		let config: BridgeConfig = serde_json::from_str(&content).map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
		debug!(target = "ar.bridge", path = %path.display(), "loaded bridge config");
		config.validate()?;
		Ok(config)
	}

	/// Loads `path` when given (defaults otherwise) and applies process environment overrides.
	pub fn from_env_and_file(path: Option<&Path>) -> Result<Self> {
		let base = match path {
			Some(path) => Self::load(path)?,
			None => Self::default(),
		};
		base.with_overrides(|key| std::env::var(key).ok())
	}

	/// Applies overrides from `lookup` (usually the process environment).
	pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
		if let Some(raw) = lookup(TICK_INTERVAL_ENV) {
			self.tick_interval_ms = raw
				.trim()
				.parse()
				.map_err(|_| Error::Config(format!("{TICK_INTERVAL_ENV} must be a positive integer, got {raw:?}")))?;
		}
		self.validate()?;
		Ok(self)
	}

	pub fn validate(&self) -> Result<()> {
		if self.subscription_buffer == 0 {
			return Err(Error::Config("subscriptionBuffer must be at least 1".to_string()));
		}
		if self.command_queue == 0 {
			return Err(Error::Config("commandQueue must be at least 1".to_string()));
		}
		if self.tick_interval_ms == 0 {
			return Err(Error::Config("tickIntervalMs must be at least 1".to_string()));
		}
		if self.anchor_id_prefix.is_empty() {
			return Err(Error::Config("anchorIdPrefix must not be empty".to_string()));
		}
		Ok(())
	}

	pub fn tick_interval(&self) -> Duration {
		Duration::from_millis(self.tick_interval_ms)
	}
}
