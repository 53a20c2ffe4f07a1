use ar_cli::cli::Cli;
use ar_cli::{commands, logging};
use clap::Parser;
use tracing::error;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	if let Err(err) = commands::dispatch(cli).await {
		error!(target = "ar.bridge", error = %err, "command failed");
		eprintln!("error: {err:#}");
		std::process::exit(1);
	}
}
