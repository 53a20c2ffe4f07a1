//! Frame dispatcher: one session update per tick, fanned out to subscribers.
//!
//! Subscriptions are kept in registration order. Each owns a bounded queue so
//! a slow consumer can never stall the tracking loop: when its queue is full,
//! that subscriber misses the tick; when its receiver is gone, the
//! subscription is pruned during the same publish step.
//!
//! Publishing borrows the subscription set for the whole fan-out, so a
//! subscription registered on the execution context is only visible from the
//! next tick on.

use std::collections::BTreeMap;
use std::fmt;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use ar_protocol::{FrameEvent, WireSurface};
use futures_util::Stream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, trace};

use crate::capability::{Frame, NativeSession, Overlay};
use crate::error::{Error, Result};
use crate::pose::encode_pose;
use crate::registry::AnchorRegistry;

const SUBSCRIPTION_PREFIX: &str = "sub_";

/// Identifier of a frame subscription, rendered as `sub_<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{SUBSCRIPTION_PREFIX}{}", self.0)
	}
}

impl FromStr for SubscriptionId {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		s.strip_prefix(SUBSCRIPTION_PREFIX)
			.and_then(|n| n.parse().ok())
			.map(SubscriptionId)
			.ok_or_else(|| Error::subscription_not_found(s))
	}
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
	id: SubscriptionId,
}

impl SubscriptionHandle {
	pub fn id(&self) -> SubscriptionId {
		self.id
	}
}

impl From<SubscriptionId> for SubscriptionHandle {
	fn from(id: SubscriptionId) -> Self {
		Self { id }
	}
}

/// Receiving end of a frame subscription.
///
/// Ends (`None`) once the subscription is cancelled or the engine shuts
/// down; notifications still queued at cancellation are discarded.
pub struct FrameStream {
	handle: SubscriptionHandle,
	rx: mpsc::Receiver<FrameEvent>,
	active: Arc<AtomicBool>,
}

impl FrameStream {
	pub fn handle(&self) -> SubscriptionHandle {
		self.handle
	}

	pub fn is_active(&self) -> bool {
		self.active.load(Ordering::Acquire)
	}

	/// Waits for the next frame notification.
	pub async fn recv(&mut self) -> Option<FrameEvent> {
		if !self.is_active() {
			return None;
		}
		let event = self.rx.recv().await?;
		self.is_active().then_some(event)
	}

	/// Takes an already queued notification without waiting.
	pub fn try_recv(&mut self) -> Option<FrameEvent> {
		if !self.is_active() {
			return None;
		}
		self.rx.try_recv().ok()
	}
}

impl fmt::Debug for FrameStream {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FrameStream")
			.field("subscription", &self.handle.id)
			.field("active", &self.is_active())
			.finish()
	}
}

impl Stream for FrameStream {
	type Item = FrameEvent;

	fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<FrameEvent>> {
		if !self.is_active() {
			return Poll::Ready(None);
		}
		match self.rx.poll_recv(cx) {
			Poll::Ready(Some(event)) if self.is_active() => Poll::Ready(Some(event)),
			Poll::Ready(_) => Poll::Ready(None),
			Poll::Pending => Poll::Pending,
		}
	}
}

struct Subscription {
	subscriber: String,
	tx: mpsc::Sender<FrameEvent>,
	active: Arc<AtomicBool>,
}

impl Subscription {
	fn cancel(&self) {
		self.active.store(false, Ordering::Release);
	}
}

/// Outcome of one dispatched tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
	pub sequence: u64,
	/// Subscribers that received this frame.
	pub delivered: usize,
	/// Subscribers that skipped this frame because their queue was full.
	pub dropped: usize,
	/// Subscriptions removed because their receiver was gone.
	pub pruned: usize,
}

pub struct FrameDispatcher {
	subscriptions: BTreeMap<SubscriptionId, Subscription>,
	next_id: u64,
	sequence: u64,
	buffer: usize,
}

impl FrameDispatcher {
	/// Creates a dispatcher whose subscribers each buffer up to `buffer` frames.
	pub fn new(buffer: usize) -> Self {
		Self {
			subscriptions: BTreeMap::new(),
			next_id: 1,
			sequence: 0,
			buffer: buffer.max(1),
		}
	}

	pub fn subscription_count(&self) -> usize {
		self.subscriptions.len()
	}

	/// Registers a long-lived frame subscription.
	pub fn subscribe(&mut self, subscriber: impl Into<String>) -> FrameStream {
		let id = SubscriptionId(self.next_id);
		self.next_id += 1;
		let (tx, rx) = mpsc::channel(self.buffer);
		let active = Arc::new(AtomicBool::new(true));
		let subscriber = subscriber.into();
		debug!(target = "ar.frames", subscription = %id, %subscriber, "frame subscription added");
		self.subscriptions.insert(
			id,
			Subscription {
				subscriber,
				tx,
				active: Arc::clone(&active),
			},
		);
		FrameStream {
			handle: SubscriptionHandle { id },
			rx,
			active,
		}
	}

	/// Removes a subscription. Returns `false` when it was already gone.
	pub fn unsubscribe(&mut self, handle: SubscriptionHandle) -> bool {
		match self.subscriptions.remove(&handle.id) {
			Some(subscription) => {
				subscription.cancel();
				debug!(target = "ar.frames", subscription = %handle.id, "frame subscription removed");
				true
			}
			None => false,
		}
	}

	/// Cancels every subscription during teardown.
	pub fn close_all(&mut self) {
		let count = self.subscriptions.len();
		for subscription in std::mem::take(&mut self.subscriptions).into_values() {
			subscription.cancel();
		}
		if count > 0 {
			debug!(target = "ar.frames", count, "frame subscriptions dropped");
		}
	}

	/// Pulls exactly one frame, re-resolves anchors against it, and publishes it.
	pub fn tick(&mut self, session: &mut NativeSession, registry: &mut AnchorRegistry, overlay: &mut dyn Overlay) -> Result<(Frame, TickReport)> {
		let frame = session.update().map_err(|err| Error::Tracking(err.to_string()))?;
		registry.resolve(session, overlay);

		self.sequence += 1;
		let event = frame_event(self.sequence, &frame, registry);
		let report = self.publish(event);
		trace!(
			target = "ar.frames",
			sequence = report.sequence,
			delivered = report.delivered,
			dropped = report.dropped,
			pruned = report.pruned,
			"frame dispatched"
		);
		Ok((frame, report))
	}

	/// Delivers `event` at most once to each active subscription, in subscription order.
	pub fn publish(&mut self, event: FrameEvent) -> TickReport {
		let mut report = TickReport {
			sequence: event.sequence,
			..TickReport::default()
		};
		let mut closed = Vec::new();

		for (id, subscription) in &self.subscriptions {
			match subscription.tx.try_send(event.clone()) {
				Ok(()) => report.delivered += 1,
				Err(TrySendError::Full(_)) => {
					report.dropped += 1;
					debug!(target = "ar.frames", subscription = %id, sequence = event.sequence, "subscriber lagging; frame dropped");
				}
				Err(TrySendError::Closed(_)) => closed.push(*id),
			}
		}

		for id in closed {
			if let Some(subscription) = self.subscriptions.remove(&id) {
				subscription.cancel();
				info!(target = "ar.frames", subscription = %id, subscriber = %subscription.subscriber, "subscriber gone; subscription pruned");
				report.pruned += 1;
			}
		}
		report
	}
}

fn frame_event(sequence: u64, frame: &Frame, registry: &AnchorRegistry) -> FrameEvent {
	FrameEvent {
		sequence,
		timestamp_ns: frame.timestamp_ns,
		camera: encode_pose(&frame.camera),
		camera_status: frame.camera_state,
		surfaces: frame
			.planes
			.iter()
			.map(|plane| WireSurface {
				id: plane.id.0,
				orientation: plane.orientation,
				center: encode_pose(&plane.center),
				extent: plane.extent,
				status: plane.state,
			})
			.collect(),
		anchors: registry.snapshots().iter().map(|a| a.to_wire()).collect(),
	}
}

#[cfg(test)]
mod tests {
	use ar_protocol::{TrackingStatus, WirePose};

	use super::*;

	fn event(sequence: u64) -> FrameEvent {
		FrameEvent {
			sequence,
			timestamp_ns: sequence as i64,
			camera: WirePose::IDENTITY,
			camera_status: TrackingStatus::Tracking,
			surfaces: Vec::new(),
			anchors: Vec::new(),
		}
	}

	#[test]
	fn subscription_ids_round_trip_through_strings() {
		let mut dispatcher = FrameDispatcher::new(4);
		let stream = dispatcher.subscribe("host");
		let text = stream.handle().id().to_string();
		assert_eq!(text, "sub_1");
		assert_eq!(text.parse::<SubscriptionId>().unwrap(), stream.handle().id());
		assert!("anchor_1".parse::<SubscriptionId>().unwrap_err().is_not_found());
	}

	#[test]
	fn every_subscriber_receives_each_frame_once() {
		let mut dispatcher = FrameDispatcher::new(4);
		let mut a = dispatcher.subscribe("a");
		let mut b = dispatcher.subscribe("b");

		let report = dispatcher.publish(event(1));
		assert_eq!(report.delivered, 2);

		assert_eq!(a.try_recv().map(|e| e.sequence), Some(1));
		assert_eq!(b.try_recv().map(|e| e.sequence), Some(1));
		assert!(a.try_recv().is_none());
		assert!(b.try_recv().is_none());
	}

	#[test]
	fn late_subscriber_sees_only_later_frames() {
		let mut dispatcher = FrameDispatcher::new(4);
		dispatcher.publish(event(1));
		let mut late = dispatcher.subscribe("late");
		dispatcher.publish(event(2));

		assert_eq!(late.try_recv().map(|e| e.sequence), Some(2));
		assert!(late.try_recv().is_none());
	}

	#[test]
	fn unsubscribe_is_idempotent_and_discards_queued_frames() {
		let mut dispatcher = FrameDispatcher::new(4);
		let mut stream = dispatcher.subscribe("host");
		dispatcher.publish(event(1));

		assert!(dispatcher.unsubscribe(stream.handle()));
		assert!(!dispatcher.unsubscribe(stream.handle()));
		assert!(!stream.is_active());
		assert!(stream.try_recv().is_none());

		let report = dispatcher.publish(event(2));
		assert_eq!(report.delivered, 0);
	}

	#[test]
	fn full_queue_drops_frame_without_blocking() {
		let mut dispatcher = FrameDispatcher::new(1);
		let mut slow = dispatcher.subscribe("slow");
		let mut fast = dispatcher.subscribe("fast");

		dispatcher.publish(event(1));
		assert_eq!(fast.try_recv().map(|e| e.sequence), Some(1));
		let report = dispatcher.publish(event(2));

		assert_eq!(report.delivered, 1);
		assert_eq!(report.dropped, 1);
		assert_eq!(slow.try_recv().map(|e| e.sequence), Some(1));
		assert_eq!(fast.try_recv().map(|e| e.sequence), Some(2));
	}

	#[test]
	fn dropped_receiver_is_pruned() {
		let mut dispatcher = FrameDispatcher::new(2);
		let gone = dispatcher.subscribe("gone");
		let _kept = dispatcher.subscribe("kept");
		drop(gone);

		let report = dispatcher.publish(event(1));
		assert_eq!(report.pruned, 1);
		assert_eq!(report.delivered, 1);
		assert_eq!(dispatcher.subscription_count(), 1);
	}

	#[test]
	fn close_all_ends_every_stream() {
		let mut dispatcher = FrameDispatcher::new(2);
		let a = dispatcher.subscribe("a");
		let b = dispatcher.subscribe("b");
		dispatcher.close_all();
		assert!(!a.is_active());
		assert!(!b.is_active());
		assert_eq!(dispatcher.subscription_count(), 0);
	}

	#[tokio::test]
	async fn stream_ends_after_cancellation() {
		use futures_util::StreamExt;

		let mut dispatcher = FrameDispatcher::new(2);
		let mut stream = dispatcher.subscribe("host");
		dispatcher.publish(event(1));
		assert_eq!(stream.next().await.map(|e| e.sequence), Some(1));

		dispatcher.unsubscribe(stream.handle());
		assert!(stream.next().await.is_none());
	}
}
