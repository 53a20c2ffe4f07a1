//! Scripted walkthrough against the simulated world.
//!
//! Places an anchor on a floor found by hit testing, moves the camera for a
//! few frames, drops the anchor's tracking, and tears everything down. Every
//! response and frame event is printed as a protocol line.

use anyhow::{Context, Result, anyhow};
use ar_protocol::{
	AnchorCreated, AnchorList, Event, HitTestResults, Message, PlaneOrientation, Request, RequestEnvelope, Response, SessionStateReport, Subscribed,
	Success, TrackingStatus, WirePose,
};
use ar_runtime::sim::{self, SimController};
use ar_runtime::{Bridge, BridgeConfig, FrameStream, Pose, Quat, Vec3, handle_request};
use serde::de::DeserializeOwned;

const FLOOR_Y: f32 = -1.4;
/// Lifts the anchor request just above the hit point so it lands on the floor.
const ABOVE_FLOOR: f32 = 0.01;

pub async fn run(config: BridgeConfig, ticks: u32) -> Result<()> {
	for message in script(config, ticks).await? {
		println!("{}", serde_json::to_string(&message).context("failed to encode message")?);
	}
	Ok(())
}

/// Runs the walkthrough and returns every message it produced, in order.
pub async fn script(config: BridgeConfig, ticks: u32) -> Result<Vec<Message>> {
	let (engine, world, _view) = sim::engine();
	world.add_plane(PlaneOrientation::HorizontalUp, Vec3::new(0.0, FLOOR_Y, -2.0), [6.0, 8.0]);
	let bridge = Bridge::spawn(config, move || engine.into_parts()).context("failed to start execution context")?;

	let mut demo = Demo {
		bridge,
		world,
		next_id: 1,
		messages: Vec::new(),
		streams: Vec::new(),
	};

	demo.expect::<Success>(Request::AttachOverlay).await?;
	demo.expect::<Success>(Request::StartSession).await?;
	demo.expect::<Subscribed>(Request::SubscribeFrames {
		subscriber: Some("demo".to_string()),
	})
	.await?;

	let hits: HitTestResults = demo.expect(Request::PerformHitTest { x: 0.5, y: 0.8 }).await?;
	let [x, y, z] = hits.results.first().map(|hit| hit.position).unwrap_or([0.0, FLOOR_Y, -1.0]);
	let created: AnchorCreated = demo
		.expect(Request::AddAnchor {
			x,
			y: y + ABOVE_FLOOR,
			z,
			attach_to_plane: true,
		})
		.await?;
	demo.expect::<WirePose>(Request::GetCameraPose).await?;

	for frame in 0..ticks {
		let step = frame as f32;
		demo.world
			.set_camera(Pose::new(Vec3::new(0.05 * step, 0.0, -0.02 * step), Quat::from_rotation_y(0.03 * step)));
		demo.tick().await?;
	}

	demo.world.set_anchor_state_for_all(TrackingStatus::Stopped);
	demo.tick().await?;

	demo.expect::<AnchorList>(Request::ListAnchors).await?;
	demo.expect::<Success>(Request::RemoveAnchor {
		anchor_id: created.anchor_id.clone(),
	})
	.await?;
	demo.call(Request::RemoveAnchor {
		anchor_id: created.anchor_id,
	})
	.await;
	demo.expect::<Success>(Request::Destroy).await?;
	demo.expect::<SessionStateReport>(Request::SessionState).await?;

	Ok(demo.messages)
}

struct Demo {
	bridge: Bridge,
	world: SimController,
	next_id: u64,
	messages: Vec<Message>,
	streams: Vec<FrameStream>,
}

impl Demo {
	async fn call(&mut self, request: Request) -> Response {
		let id = self.next_id;
		self.next_id += 1;
		let handled = handle_request(&self.bridge, RequestEnvelope { id, request }).await;
		self.streams.extend(handled.stream);
		self.messages.push(Message::Response(handled.response.clone()));
		handled.response
	}

	/// Sends `request` and decodes its result, failing on an error response.
	async fn expect<T: DeserializeOwned>(&mut self, request: Request) -> Result<T> {
		let op = request.op_name();
		let response = self.call(request).await;
		if let Some(error) = response.error {
			return Err(anyhow!("{op} failed: {}: {}", error.code, error.message));
		}
		let result = response.result.ok_or_else(|| anyhow!("{op} returned no result"))?;
		serde_json::from_value(result).with_context(|| format!("unexpected {op} result"))
	}

	async fn tick(&mut self) -> Result<()> {
		self.bridge.tick().await?;
		for stream in &mut self.streams {
			let subscription_id = stream.handle().id().to_string();
			while let Some(frame) = stream.try_recv() {
				self.messages.push(Message::Event(Event {
					subscription_id: subscription_id.clone(),
					frame,
				}));
			}
		}
		Ok(())
	}
}
