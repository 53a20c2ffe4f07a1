//! Request boundary between the host wire protocol and the engine.
//!
//! Every request becomes exactly one [`Response`]; engine failures are turned
//! into `{ok: false}` responses carrying the stable error code. Frame
//! subscriptions additionally hand back the [`FrameStream`] so the host can
//! forward notifications as [`Event`](ar_protocol::Event) messages.

use ar_protocol::{
	AnchorCreated, AnchorList, ErrorCode, HitTestResults, Request, RequestEnvelope, Response, SessionStateReport, Subscribed, Success,
};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::dispatcher::{FrameStream, SubscriptionId};
use crate::error::{Error, Result};
use crate::executor::Bridge;
use crate::pose::{Vec3, encode_pose};

/// Subscriber name used when a `subscribeFrames` request does not name one.
const DEFAULT_SUBSCRIBER: &str = "host";

/// Outcome of one boundary request.
#[derive(Debug)]
pub struct Handled {
	pub response: Response,
	/// Present only for a successful `subscribeFrames`.
	pub stream: Option<FrameStream>,
}

impl Handled {
	fn reply(response: Response) -> Self {
		Self { response, stream: None }
	}
}

/// Parses one request line. On failure, returns the error response to send back.
///
/// The response echoes the request `id` when one can be recovered from the input.
pub fn decode_request(line: &str) -> std::result::Result<RequestEnvelope, Response> {
	serde_json::from_str(line).map_err(|err| {
		let id = serde_json::from_str::<Value>(line)
			.ok()
			.and_then(|value| value.get("id").and_then(Value::as_u64))
			.unwrap_or(0);
		Response::failure(id, ErrorCode::InvalidRequest, err.to_string())
	})
}

/// Runs one request against the engine.
pub async fn handle_request(bridge: &Bridge, envelope: RequestEnvelope) -> Handled {
	let RequestEnvelope { id, request } = envelope;
	let op = request.op_name();

	match dispatch(bridge, request).await {
		Ok((result, stream)) => Handled {
			response: Response::success(id, result),
			stream,
		},
		Err(err) => {
			debug!(target = "ar.bridge", id, op, code = %err.code(), error = %err, "request failed");
			Handled::reply(Response::failure(id, err.code(), err.to_string()))
		}
	}
}

fn payload<T: Serialize>(value: T) -> Result<(Value, Option<FrameStream>)> {
	serde_json::to_value(value)
		.map(|value| (value, None))
		.map_err(|err| Error::Tracking(format!("unencodable result: {err}")))
}

async fn dispatch(bridge: &Bridge, request: Request) -> Result<(Value, Option<FrameStream>)> {
	match request {
		Request::AttachOverlay => {
			bridge.attach_overlay().await?;
			payload(Success::OK)
		}
		Request::StartSession => {
			bridge.start_session().await?;
			payload(Success::OK)
		}
		Request::StopSession => {
			bridge.stop_session().await?;
			payload(Success::OK)
		}
		Request::AddAnchor { x, y, z, attach_to_plane } => {
			let id = bridge.add_anchor(Vec3::new(x, y, z), attach_to_plane).await?;
			payload(AnchorCreated { anchor_id: id.into_string() })
		}
		Request::RemoveAnchor { anchor_id } => {
			bridge.remove_anchor(anchor_id).await?;
			payload(Success::OK)
		}
		Request::GetAnchor { anchor_id } => match bridge.anchor(anchor_id.as_str()).await? {
			Some(snapshot) => payload(snapshot.to_wire()),
			None => Err(Error::anchor_not_found(anchor_id)),
		},
		Request::ListAnchors => {
			let anchors = bridge.anchors().await?;
			payload(AnchorList {
				anchors: anchors.iter().map(|a| a.to_wire()).collect(),
			})
		}
		Request::GetCameraPose => {
			let pose = bridge.camera_pose().await?;
			payload(encode_pose(&pose))
		}
		Request::PerformHitTest { x, y } => {
			let hits = bridge.hit_test(x, y).await?;
			payload(HitTestResults {
				results: hits.iter().map(|h| h.to_wire()).collect(),
			})
		}
		Request::SubscribeFrames { subscriber } => {
			let stream = bridge.subscribe(subscriber.unwrap_or_else(|| DEFAULT_SUBSCRIBER.to_string())).await?;
			let (value, _) = payload(Subscribed {
				subscription_id: stream.handle().id().to_string(),
			})?;
			Ok((value, Some(stream)))
		}
		Request::UnsubscribeFrames { subscription_id } => {
			let id: SubscriptionId = subscription_id.parse()?;
			bridge.unsubscribe(id.into()).await?;
			payload(Success::OK)
		}
		Request::SessionState => {
			let state = bridge.state().await?;
			payload(SessionStateReport { state })
		}
		Request::Pause => {
			bridge.pause().await?;
			payload(Success::OK)
		}
		Request::Resume => {
			bridge.resume().await?;
			payload(Success::OK)
		}
		Request::Destroy => {
			bridge.destroy().await?;
			payload(Success::OK)
		}
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;
	use crate::config::BridgeConfig;
	use crate::sim;

	fn bridge() -> Bridge {
		let (engine, _world, _view) = sim::engine();
		Bridge::spawn(BridgeConfig::default(), move || engine.into_parts()).unwrap()
	}

	async fn call(bridge: &Bridge, line: &str) -> Response {
		let envelope = decode_request(line).unwrap();
		handle_request(bridge, envelope).await.response
	}

	#[test]
	fn malformed_line_recovers_request_id() {
		let response = decode_request(r#"{"id": 9, "op": "teleport"}"#).unwrap_err();
		assert_eq!(response.id, 9);
		assert_eq!(response.error.unwrap().code, ErrorCode::InvalidRequest);

		let response = decode_request("not json").unwrap_err();
		assert_eq!(response.id, 0);
	}

	#[tokio::test]
	async fn success_flag_operations() {
		let bridge = bridge();
		let response = call(&bridge, r#"{"id": 1, "op": "attachOverlay"}"#).await;
		assert_eq!(response.result, Some(json!({"success": true})));
		let response = call(&bridge, r#"{"id": 2, "op": "startSession"}"#).await;
		assert!(response.ok);
		assert_eq!(response.id, 2);
	}

	#[tokio::test]
	async fn errors_carry_wire_codes() {
		let bridge = bridge();
		let response = call(&bridge, r#"{"id": 4, "op": "performHitTest", "x": 0.5, "y": 0.5}"#).await;
		assert!(!response.ok);
		assert!(response.result.is_none());
		let error = response.error.unwrap();
		assert_eq!(error.code, ErrorCode::SessionNotStarted);
		assert_eq!(error.message, "AR session not started");
	}

	#[tokio::test]
	async fn get_anchor_for_unknown_id_is_not_found() {
		let bridge = bridge();
		call(&bridge, r#"{"id": 1, "op": "startSession"}"#).await;
		let response = call(&bridge, r#"{"id": 2, "op": "getAnchor", "anchorId": "anchor_0"}"#).await;
		assert_eq!(response.error.unwrap().code, ErrorCode::NotFound);
	}

	#[tokio::test]
	async fn overflowing_anchor_position_is_rejected() {
		let bridge = bridge();
		call(&bridge, r#"{"id": 1, "op": "attachOverlay"}"#).await;
		call(&bridge, r#"{"id": 2, "op": "startSession"}"#).await;

		let response = call(&bridge, r#"{"id": 3, "op": "addAnchor", "x": 1e39, "y": 0.0, "z": -1.0}"#).await;
		assert_eq!(response.error.unwrap().code, ErrorCode::InvalidCoordinate);

		let response = call(&bridge, r#"{"id": 4, "op": "listAnchors"}"#).await;
		let list: AnchorList = serde_json::from_value(response.result.unwrap()).unwrap();
		assert!(list.anchors.is_empty());
	}

	#[tokio::test]
	async fn subscribe_returns_stream_and_id() {
		let bridge = bridge();
		let envelope = decode_request(r#"{"id": 1, "op": "subscribeFrames"}"#).unwrap();
		let handled = handle_request(&bridge, envelope).await;
		assert_eq!(handled.response.result, Some(json!({"subscriptionId": "sub_1"})));
		assert!(handled.stream.is_some());

		let response = call(&bridge, r#"{"id": 2, "op": "unsubscribeFrames", "subscriptionId": "sub_1"}"#).await;
		assert!(response.ok);
		let response = call(&bridge, r#"{"id": 3, "op": "unsubscribeFrames", "subscriptionId": "sub_1"}"#).await;
		assert!(response.ok);
		let response = call(&bridge, r#"{"id": 4, "op": "unsubscribeFrames", "subscriptionId": "bogus"}"#).await;
		assert_eq!(response.error.unwrap().code, ErrorCode::NotFound);
	}

	#[tokio::test]
	async fn session_state_is_reported_in_lowercase() {
		let bridge = bridge();
		let response = call(&bridge, r#"{"id": 1, "op": "sessionState"}"#).await;
		assert_eq!(response.result, Some(json!({"state": "created"})));
		call(&bridge, r#"{"id": 2, "op": "destroy"}"#).await;
		let response = call(&bridge, r#"{"id": 3, "op": "sessionState"}"#).await;
		assert_eq!(response.result, Some(json!({"state": "closed"})));
	}
}
