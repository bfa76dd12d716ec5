//! Process logging: an `env_logger::Builder` retargeted from stderr to an
//! append-mode log file.

use anyhow::{Context, Result};
use log::LevelFilter;
use std::fs::OpenOptions;
use std::path::Path;

/// Initializes the global logger to append formatted records to `log_path`,
/// creating its parent directory if needed. Must be called exactly once,
/// before any other module logs.
pub fn init(log_path: &Path) -> Result<()> {
	if let Some(parent) = log_path.parent() {
		std::fs::create_dir_all(parent).with_context(|| format!("creating log directory {}", parent.display()))?;
	}
	let file = OpenOptions::new()
		.create(true)
		.append(true)
		.open(log_path)
		.with_context(|| format!("opening log file {}", log_path.display()))?;

	env_logger::Builder::new()
		.filter_level(LevelFilter::Info)
		.format_timestamp_secs()
		.target(env_logger::Target::Pipe(Box::new(file)))
		.try_init()
		.context("initializing logger")?;
	Ok(())
}
