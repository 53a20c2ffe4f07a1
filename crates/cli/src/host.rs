//! JSON-lines host loop.
//!
//! Reads one [`RequestEnvelope`](ar_protocol::RequestEnvelope) per input
//! line, answers each with a response line, and streams frame notifications
//! for every open subscription as event lines. A timer drives the engine's
//! tick independently of requests; ticks that arrive before the session is
//! running are expected and ignored.
//!
//! End of input is treated as host termination: the session is destroyed,
//! which ends every frame stream, and the loop returns once all queued output
//! has been written.

use std::time::Duration;

use anyhow::{Context, Result};
use ar_protocol::{Event, Message};
use ar_runtime::{Bridge, BridgeConfig, Error, FrameStream, decode_request, handle_request};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;
use tracing::{debug, info, trace, warn};

const OUTBOUND_QUEUE: usize = 256;

/// Serves requests from `input` until it is exhausted.
pub async fn serve<R, W>(bridge: Bridge, config: &BridgeConfig, input: R, output: W) -> Result<()>
where
	R: AsyncBufRead + Unpin,
	W: AsyncWrite + Unpin + Send + 'static,
{
	let (out_tx, out_rx) = mpsc::channel(OUTBOUND_QUEUE);
	let writer = tokio::spawn(write_messages(output, out_rx));
	let ticker = tokio::spawn(drive_ticks(bridge.clone(), config.tick_interval()));
	info!(target = "ar.bridge", tick_ms = config.tick_interval_ms, "serving requests on stdio");

	let served = read_requests(&bridge, input, &out_tx).await;

	ticker.abort();
	if let Err(err) = bridge.destroy().await {
		debug!(target = "ar.bridge", error = %err, "engine already gone at shutdown");
	}
	drop(bridge);
	drop(out_tx);

	let written = writer.await.context("output writer task failed")?;
	served.and(written)
}

async fn read_requests<R>(bridge: &Bridge, input: R, out: &mpsc::Sender<Message>) -> Result<()>
where
	R: AsyncBufRead + Unpin,
{
	let mut lines = LinesStream::new(input.lines());
	while let Some(line) = lines.next().await {
		let line = line.context("failed reading request line")?;
		let line = line.trim();
		if line.is_empty() {
			continue;
		}

		let handled = match decode_request(line) {
			Ok(envelope) => handle_request(bridge, envelope).await,
			Err(response) => {
				warn!(target = "ar.bridge", id = response.id, "malformed request line");
				if out.send(Message::Response(response)).await.is_err() {
					break;
				}
				continue;
			}
		};

		if out.send(Message::Response(handled.response)).await.is_err() {
			break;
		}
		if let Some(stream) = handled.stream {
			tokio::spawn(forward_frames(stream, out.clone()));
		}
	}
	Ok(())
}

async fn forward_frames(mut stream: FrameStream, out: mpsc::Sender<Message>) {
	let subscription_id = stream.handle().id().to_string();
	while let Some(frame) = stream.next().await {
		let event = Event {
			subscription_id: subscription_id.clone(),
			frame,
		};
		if out.send(Message::Event(event)).await.is_err() {
			break;
		}
	}
	debug!(target = "ar.frames", subscription = %subscription_id, "frame stream ended");
}

async fn drive_ticks(bridge: Bridge, period: Duration) {
	let mut interval = time::interval(period);
	interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
	loop {
		interval.tick().await;
		match bridge.tick().await {
			Ok(report) if report.dropped > 0 => {
				debug!(target = "ar.frames", sequence = report.sequence, dropped = report.dropped, "frames dropped for lagging subscribers");
			}
			Ok(_) => {}
			Err(Error::SessionNotStarted) => trace!(target = "ar.frames", "tick before session start ignored"),
			Err(Error::SessionClosed) | Err(Error::ContextGone) => break,
			Err(err) => warn!(target = "ar.frames", error = %err, "tick failed"),
		}
	}
	trace!(target = "ar.frames", "tick driver stopped");
}

async fn write_messages<W>(mut output: W, mut rx: mpsc::Receiver<Message>) -> Result<()>
where
	W: AsyncWrite + Unpin,
{
	while let Some(message) = rx.recv().await {
		let mut line = serde_json::to_string(&message).context("failed to encode message")?;
		line.push('\n');
		output.write_all(line.as_bytes()).await.context("failed writing message")?;
		output.flush().await.context("failed flushing output")?;
	}
	Ok(())
}
