use std::path::{Path, PathBuf};

/// Fixed, flag-free configuration for a TileRank build: cache directory,
/// output path, log path, and the retention/zoom constants, all given at
/// construction rather than parsed from flags.
#[derive(Debug, Clone)]
pub struct Config {
	/// Directory holding weekly Brotli caches and the COG temp file.
	pub cache_dir: PathBuf,
	/// Final COG output path, e.g. `<cache_dir>/out.tif`.
	pub output_path: PathBuf,
	/// Append-mode log file path.
	pub log_path: PathBuf,
	/// How many of the most recent available weeks to aggregate.
	pub max_weeks: u32,
	/// Deepest (most detailed) zoom level in the output COG.
	pub deepest_zoom: u8,
}

impl Config {
	pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
		let cache_dir = cache_dir.into();
		let output_path = cache_dir.join("out.tif");
		Config {
			cache_dir,
			output_path,
			log_path: PathBuf::from("./logs/tilerank-builder.log"),
			max_weeks: 156,
			deepest_zoom: 18,
		}
	}

	/// The zoom level at which one 256x256 [`Raster`](crate::Raster) lives:
	/// 8 levels above `deepest_zoom`, since a 256x256 raster covers exactly
	/// 2^8 x 2^8 deepest-zoom tiles.
	pub fn raster_zoom(&self) -> u8 {
		self.deepest_zoom - 8
	}

	pub fn weekly_cache_path(&self, week: &str) -> PathBuf {
		self.cache_dir.join(format!("tilelogs-{week}.br"))
	}
}

impl Default for Config {
	fn default() -> Self {
		Config::new(Path::new("./cache"))
	}
}
