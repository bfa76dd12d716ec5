//! CLI entry point. One executable, no flags: wires process logging, the
//! fixed [`Config`], and [`pipeline::run`] — parse args, init the logger,
//! dispatch, map errors to a nonzero exit code.

use anyhow::Result;
use clap::Parser;
use tilerank::{logging, pipeline};
use tilerank_core::Config;
use tokio_util::sync::CancellationToken;

/// Builds a Cloud-Optimized GeoTIFF of OpenStreetMap tile view density from
/// the public tile-log archive. Takes no flags: cache directory, output
/// path, week count and zoom level are all fixed.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {}

fn main() {
	let _cli = Cli::parse();
	let config = Config::default();

	if let Err(err) = logging::init(&config.log_path) {
		eprintln!("failed to initialize logging: {err:#}");
		std::process::exit(1);
	}

	let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
		Ok(runtime) => runtime,
		Err(err) => {
			log::error!("failed to start async runtime: {err:#}");
			std::process::exit(1);
		}
	};

	let result = runtime.block_on(run(config));
	if let Err(err) = result {
		log::error!("{err:#}");
		std::process::exit(1);
	}
}

async fn run(config: Config) -> Result<()> {
	let cancel = CancellationToken::new();
	pipeline::run(&config, cancel).await
}
