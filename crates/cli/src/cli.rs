use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "ar-bridge")]
#[command(about = "AR anchor and frame bridge speaking JSON lines over stdio")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug, -vvv trace)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Bridge configuration file (JSON)
	#[arg(short, long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Serve requests from stdin, writing responses and frame events to stdout
	Serve {
		/// Seed the simulated world with a floor plane at this height (meters)
		#[arg(long, value_name = "Y", allow_hyphen_values = true)]
		floor: Option<f32>,
	},

	/// Run a scripted session against the simulated world and print every message
	Demo {
		/// Number of frames to tick while the camera moves
		#[arg(long, default_value = "5")]
		ticks: u32,
	},

	/// Print the effective configuration
	Config,
}
