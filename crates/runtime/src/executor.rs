//! Single execution context for all engine operations.
//!
//! The tracking capability and overlay are not thread-safe, so the
//! [`ArContext`] lives on one dedicated thread and never leaves it. Callers
//! hold a cheap, cloneable [`Bridge`] that marshals each operation as a
//! [`Command`] over a bounded queue and awaits the reply on a oneshot channel.
//! Commands run strictly in arrival order; a tick is just another command, so
//! no request can interleave with it.
//!
//! Dropping the last [`Bridge`] ends the command loop, which tears the session
//! down before the thread exits.

use std::thread;

use ar_protocol::SessionState;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace};

use crate::capability::EngineParts;
use crate::config::BridgeConfig;
use crate::context::ArContext;
use crate::dispatcher::{FrameStream, SubscriptionHandle, TickReport};
use crate::error::Result;
use crate::hit_test::HitResult;
use crate::pose::{Pose, Vec3};
use crate::registry::{AnchorId, AnchorSnapshot};

const THREAD_NAME: &str = "ar-context";

type Reply<T> = oneshot::Sender<Result<T>>;

/// One marshaled engine operation.
enum Command {
	AttachOverlay(Reply<()>),
	StartSession(Reply<()>),
	StopSession(Reply<()>),
	Pause(Reply<()>),
	Resume(Reply<()>),
	Destroy(Reply<()>),
	AddAnchor {
		position: Vec3,
		attach_to_plane: bool,
		reply: Reply<AnchorId>,
	},
	RemoveAnchor {
		id: String,
		reply: Reply<()>,
	},
	GetAnchor {
		id: String,
		reply: Reply<Option<AnchorSnapshot>>,
	},
	ListAnchors(Reply<Vec<AnchorSnapshot>>),
	CameraPose(Reply<Pose>),
	HitTest {
		u: f32,
		v: f32,
		reply: Reply<Vec<HitResult>>,
	},
	Subscribe {
		subscriber: String,
		reply: Reply<FrameStream>,
	},
	Unsubscribe {
		handle: SubscriptionHandle,
		reply: Reply<bool>,
	},
	Tick(Reply<TickReport>),
	State(Reply<SessionState>),
}

impl Command {
	fn name(&self) -> &'static str {
		match self {
			Command::AttachOverlay(_) => "attach_overlay",
			Command::StartSession(_) => "start_session",
			Command::StopSession(_) => "stop_session",
			Command::Pause(_) => "pause",
			Command::Resume(_) => "resume",
			Command::Destroy(_) => "destroy",
			Command::AddAnchor { .. } => "add_anchor",
			Command::RemoveAnchor { .. } => "remove_anchor",
			Command::GetAnchor { .. } => "get_anchor",
			Command::ListAnchors(_) => "list_anchors",
			Command::CameraPose(_) => "camera_pose",
			Command::HitTest { .. } => "hit_test",
			Command::Subscribe { .. } => "subscribe",
			Command::Unsubscribe { .. } => "unsubscribe",
			Command::Tick(_) => "tick",
			Command::State(_) => "state",
		}
	}
}

/// Handle to the engine's execution context.
#[derive(Clone)]
pub struct Bridge {
	tx: mpsc::Sender<Command>,
}

impl Bridge {
	/// Starts the execution context thread.
	///
	/// `factory` runs on that thread, so the capability and overlay it builds
	/// never need to be `Send`.
	pub fn spawn<F>(config: BridgeConfig, factory: F) -> std::io::Result<Bridge>
	where
		F: FnOnce() -> EngineParts + Send + 'static,
	{
		let (tx, rx) = mpsc::channel(config.command_queue.max(1));
		thread::Builder::new()
			.name(THREAD_NAME.to_string())
			.spawn(move || run(config, factory, rx))?;
		Ok(Bridge { tx })
	}

	async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
		let (reply, rx) = oneshot::channel();
		self.tx.send(command(reply)).await?;
		rx.await?
	}

	pub async fn attach_overlay(&self) -> Result<()> {
		self.request(Command::AttachOverlay).await
	}

	pub async fn start_session(&self) -> Result<()> {
		self.request(Command::StartSession).await
	}

	pub async fn stop_session(&self) -> Result<()> {
		self.request(Command::StopSession).await
	}

	/// Host moved to the background.
	pub async fn pause(&self) -> Result<()> {
		self.request(Command::Pause).await
	}

	/// Host returned to the foreground. Only fails when the context is gone.
	pub async fn resume(&self) -> Result<()> {
		self.request(Command::Resume).await
	}

	/// Terminates the session. Later session operations fail with `SessionClosed`.
	pub async fn destroy(&self) -> Result<()> {
		self.request(Command::Destroy).await
	}

	pub async fn add_anchor(&self, position: Vec3, attach_to_plane: bool) -> Result<AnchorId> {
		self.request(|reply| Command::AddAnchor {
			position,
			attach_to_plane,
			reply,
		})
		.await
	}

	pub async fn remove_anchor(&self, id: impl Into<String>) -> Result<()> {
		let id = id.into();
		self.request(|reply| Command::RemoveAnchor { id, reply }).await
	}

	pub async fn anchor(&self, id: impl Into<String>) -> Result<Option<AnchorSnapshot>> {
		let id = id.into();
		self.request(|reply| Command::GetAnchor { id, reply }).await
	}

	pub async fn anchors(&self) -> Result<Vec<AnchorSnapshot>> {
		self.request(Command::ListAnchors).await
	}

	pub async fn camera_pose(&self) -> Result<Pose> {
		self.request(Command::CameraPose).await
	}

	pub async fn hit_test(&self, u: f32, v: f32) -> Result<Vec<HitResult>> {
		self.request(|reply| Command::HitTest { u, v, reply }).await
	}

	/// Registers a frame subscription, effective from the next tick.
	pub async fn subscribe(&self, subscriber: impl Into<String>) -> Result<FrameStream> {
		let subscriber = subscriber.into();
		self.request(|reply| Command::Subscribe { subscriber, reply }).await
	}

	/// Cancels a subscription; once this returns no further frames are delivered to it.
	pub async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<bool> {
		self.request(|reply| Command::Unsubscribe { handle, reply }).await
	}

	/// Advances the session by one frame.
	pub async fn tick(&self) -> Result<TickReport> {
		self.request(Command::Tick).await
	}

	pub async fn state(&self) -> Result<SessionState> {
		self.request(Command::State).await
	}
}

fn run<F>(config: BridgeConfig, factory: F, mut rx: mpsc::Receiver<Command>)
where
	F: FnOnce() -> EngineParts,
{
	let mut ctx = ArContext::new(&config, factory());
	info!(target = "ar.bridge", "execution context started");

	while let Some(command) = rx.blocking_recv() {
		if !matches!(command, Command::Tick(_)) {
			trace!(target = "ar.bridge", command = command.name(), "executing");
		}
		execute(&mut ctx, command);
	}

	debug!(target = "ar.bridge", "all handles dropped; tearing down");
	ctx.destroy();
	info!(target = "ar.bridge", "execution context stopped");
}

// A send error only means the caller stopped waiting for the reply.
fn execute(ctx: &mut ArContext, command: Command) {
	match command {
		Command::AttachOverlay(reply) => {
			let _ = reply.send(ctx.attach_overlay());
		}
		Command::StartSession(reply) => {
			let _ = reply.send(ctx.start_session());
		}
		Command::StopSession(reply) => {
			let _ = reply.send(ctx.stop_session());
		}
		Command::Pause(reply) => {
			ctx.pause();
			let _ = reply.send(Ok(()));
		}
		Command::Resume(reply) => {
			ctx.resume();
			let _ = reply.send(Ok(()));
		}
		Command::Destroy(reply) => {
			ctx.destroy();
			let _ = reply.send(Ok(()));
		}
		Command::AddAnchor {
			position,
			attach_to_plane,
			reply,
		} => {
			let _ = reply.send(ctx.add_anchor(position, attach_to_plane));
		}
		Command::RemoveAnchor { id, reply } => {
			let _ = reply.send(ctx.remove_anchor(&id));
		}
		Command::GetAnchor { id, reply } => {
			let _ = reply.send(ctx.anchor(&id));
		}
		Command::ListAnchors(reply) => {
			let _ = reply.send(ctx.anchors());
		}
		Command::CameraPose(reply) => {
			let _ = reply.send(ctx.camera_pose());
		}
		Command::HitTest { u, v, reply } => {
			let _ = reply.send(ctx.hit_test(u, v));
		}
		Command::Subscribe { subscriber, reply } => {
			let _ = reply.send(ctx.subscribe(subscriber));
		}
		Command::Unsubscribe { handle, reply } => {
			let _ = reply.send(Ok(ctx.unsubscribe(handle)));
		}
		Command::Tick(reply) => {
			let _ = reply.send(ctx.tick());
		}
		Command::State(reply) => {
			let _ = reply.send(Ok(ctx.state()));
		}
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use super::*;
	use crate::error::Error;
	use crate::sim;

	#[tokio::test]
	async fn operations_run_on_the_context_thread() {
		let (engine, world, _view) = sim::engine();
		let bridge = Bridge::spawn(BridgeConfig::default(), move || engine.into_parts()).unwrap();

		bridge.attach_overlay().await.unwrap();
		bridge.start_session().await.unwrap();
		assert_eq!(bridge.state().await.unwrap(), SessionState::Running);
		assert!(world.is_running());

		let id = bridge.add_anchor(Vec3::new(1.0, 0.0, -1.0), false).await.unwrap();
		assert!(id.as_str().starts_with("anchor_"));
		assert_eq!(bridge.anchors().await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn clones_share_one_context() {
		let (engine, _world, _view) = sim::engine();
		let bridge = Bridge::spawn(BridgeConfig::default(), move || engine.into_parts()).unwrap();
		let other = bridge.clone();

		bridge.start_session().await.unwrap();
		assert_eq!(other.state().await.unwrap(), SessionState::Running);
	}

	#[tokio::test]
	async fn dropping_every_handle_tears_the_session_down() {
		let (engine, world, view) = sim::engine();
		let bridge = Bridge::spawn(BridgeConfig::default(), move || engine.into_parts()).unwrap();
		bridge.attach_overlay().await.unwrap();
		bridge.start_session().await.unwrap();
		bridge.add_anchor(Vec3::ZERO, false).await.unwrap();
		drop(bridge);

		for _ in 0..200 {
			if world.is_closed() {
				break;
			}
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
		assert!(world.is_closed());
		assert_eq!(view.renderable_count(), 0);
	}

	#[tokio::test]
	async fn panicking_factory_reports_context_gone() {
		let bridge = Bridge::spawn(BridgeConfig::default(), || -> EngineParts { panic!("no device") }).unwrap();
		assert_eq!(bridge.start_session().await, Err(Error::ContextGone));
	}
}
