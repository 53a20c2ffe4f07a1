use anyhow::{Context, Result};
use ar_protocol::PlaneOrientation;
use ar_runtime::sim;
use ar_runtime::{Bridge, BridgeConfig, Vec3};
use tokio::io::BufReader;
use tracing::info;

use crate::host;

/// Footprint of the seeded floor plane, in meters.
const FLOOR_EXTENT: [f32; 2] = [8.0, 8.0];

pub async fn run(config: BridgeConfig, floor: Option<f32>) -> Result<()> {
	let (engine, world, _view) = sim::engine();
	if let Some(y) = floor {
		let id = world.add_plane(PlaneOrientation::HorizontalUp, Vec3::new(0.0, y, 0.0), FLOOR_EXTENT);
		info!(target = "ar.bridge", plane = id.0, height = y, "seeded floor plane");
	}

	let bridge = Bridge::spawn(config.clone(), move || engine.into_parts()).context("failed to start execution context")?;
	host::serve(bridge, &config, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
}
