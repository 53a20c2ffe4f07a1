mod config;
pub mod demo;
mod serve;

use anyhow::{Context, Result};
use ar_runtime::BridgeConfig;

use crate::cli::{Cli, Commands};

pub async fn dispatch(cli: Cli) -> Result<()> {
	let config = BridgeConfig::from_env_and_file(cli.config.as_deref()).context("failed to load bridge configuration")?;

	match cli.command {
		Commands::Serve { floor } => serve::run(config, floor).await?,
		Commands::Demo { ticks } => demo::run(config, ticks).await?,
		Commands::Config => config::run(&config)?,
	}

	Ok(())
}
