use anyhow::{Context, Result};
use ar_runtime::BridgeConfig;

pub fn run(config: &BridgeConfig) -> Result<()> {
	let rendered = serde_json::to_string_pretty(config).context("failed to encode configuration")?;
	println!("{rendered}");
	Ok(())
}
