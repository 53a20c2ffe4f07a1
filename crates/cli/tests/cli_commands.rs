use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use ar_protocol::Message;
use serde_json::Value;
use tempfile::TempDir;

fn ar_bridge() -> Command {
	let mut command = Command::new(env!("CARGO_BIN_EXE_ar-bridge"));
	command.env_remove("RUST_LOG").env_remove("AR_BRIDGE_TICK_MS");
	command
}

fn serve(args: &[&str]) -> Command {
	let mut command = ar_bridge();
	command.arg("serve").args(args);
	command
}

fn write_config(dir: &Path, content: &str) -> std::path::PathBuf {
	let path = dir.join("bridge.json");
	std::fs::write(&path, content).expect("config should be written");
	path
}

fn run_with_stdin(mut command: Command, stdin: &str) -> Output {
	let mut child = command
		.stdin(Stdio::piped())
		.stdout(Stdio::piped())
		.stderr(Stdio::piped())
		.spawn()
		.expect("failed to execute ar-bridge");
	child
		.stdin
		.take()
		.expect("stdin is piped")
		.write_all(stdin.as_bytes())
		.expect("stdin should accept requests");
	child.wait_with_output().expect("ar-bridge should exit")
}

fn messages(stdout: &[u8]) -> Vec<Message> {
	String::from_utf8_lossy(stdout)
		.lines()
		.filter(|line| !line.trim().is_empty())
		.map(|line| serde_json::from_str(line).unwrap_or_else(|err| panic!("bad line {line:?}: {err}")))
		.collect()
}

#[test]
fn config_merges_file_and_environment() {
	let temp = TempDir::new().unwrap();
	let path = write_config(temp.path(), r#"{"anchorIdPrefix": "coin_"}"#);

	let output = ar_bridge()
		.args(["config", "--config"])
		.arg(&path)
		.env("AR_BRIDGE_TICK_MS", "20")
		.output()
		.expect("failed to execute ar-bridge");

	assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
	let config: Value = serde_json::from_slice(&output.stdout).unwrap();
	assert_eq!(config["anchorIdPrefix"], "coin_");
	assert_eq!(config["tickIntervalMs"], 20);
	assert_eq!(config["hitTestKinds"], serde_json::json!(["plane"]));
}

#[test]
fn invalid_config_fails_before_serving() {
	let temp = TempDir::new().unwrap();
	let path = write_config(temp.path(), r#"{"subscriptionBuffer": 0}"#);

	let output = ar_bridge().args(["serve", "--config"]).arg(&path).output().unwrap();

	assert!(!output.status.success());
	assert!(output.stdout.is_empty());
	let stderr = String::from_utf8_lossy(&output.stderr);
	assert!(stderr.contains("subscriptionBuffer"), "stderr: {stderr}");
}

#[test]
fn serve_answers_each_stdin_line() {
	let requests = [
		r#"{"id": 1, "op": "attachOverlay"}"#,
		r#"{"id": 2, "op": "startSession"}"#,
		r#"{"id": 3, "op": "addAnchor", "x": 1.0, "y": 0.0, "z": -1.0, "attachToPlane": false}"#,
		r#"{"id": 4, "op": "getCameraPose"}"#,
		r#"{"id": 5, "op": "removeAnchor", "anchorId": "anchor_0"}"#,
	]
	.join("\n");

	let output = run_with_stdin(serve(&[]), &requests);

	assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
	let responses: Vec<_> = messages(&output.stdout)
		.into_iter()
		.filter_map(|m| match m {
			Message::Response(r) => Some(r),
			Message::Event(_) => None,
		})
		.collect();
	let ids: Vec<u64> = responses.iter().map(|r| r.id).collect();
	assert_eq!(ids, vec![1, 2, 3, 4, 5]);
	assert!(responses[..4].iter().all(|r| r.ok));
	let pose = responses[3].result.as_ref().unwrap();
	assert_eq!(pose["rotation"].as_array().unwrap().len(), 4);
	assert_eq!(responses[4].error.as_ref().unwrap().code.to_string(), "NOT_FOUND");
}

#[test]
fn serve_with_floor_reports_floor_hits() {
	let requests = [r#"{"id": 1, "op": "startSession"}"#, r#"{"id": 2, "op": "performHitTest", "x": 0.5, "y": 0.9}"#].join("\n");

	let output = run_with_stdin(serve(&["--floor", "-1.5"]), &requests);

	assert!(output.status.success());
	let hit_response = messages(&output.stdout)
		.into_iter()
		.find_map(|m| match m {
			Message::Response(r) if r.id == 2 => Some(r),
			_ => None,
		})
		.expect("hit test response");
	let result = hit_response.result.unwrap();
	let results = &result["results"];
	assert_eq!(results.as_array().unwrap().len(), 1);
	assert_eq!(results[0]["type"], "plane");
}

#[test]
fn demo_prints_protocol_lines() {
	let output = ar_bridge().args(["demo", "--ticks", "2"]).output().unwrap();

	assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
	let all = messages(&output.stdout);
	let events = all.iter().filter(|m| matches!(m, Message::Event(_))).count();
	assert_eq!(events, 3);
}
