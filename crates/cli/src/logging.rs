//! Diagnostic logging to stderr; stdout is reserved for protocol messages.

use tracing_subscriber::EnvFilter;

/// Default filter directive for a `-v` count. `RUST_LOG` takes precedence.
pub fn default_directive(verbose: u8) -> &'static str {
	match verbose {
		0 => "warn",
		1 => "info",
		2 => "debug",
		_ => "trace",
	}
}

pub fn init_logging(verbose: u8) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));
	let _ = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_target(true)
		.try_init();
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn verbosity_maps_to_levels() {
		assert_eq!(default_directive(0), "warn");
		assert_eq!(default_directive(1), "info");
		assert_eq!(default_directive(2), "debug");
		assert_eq!(default_directive(7), "trace");
	}
}
