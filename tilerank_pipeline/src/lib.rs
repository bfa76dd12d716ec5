//! The streaming stages that turn seven days of raw tile-view logs into a
//! finished pyramid of rasters: per-day parsing, external sort, weekly
//! caching, k-way merge and the pyramid-walking painter.

mod aggregator;
mod merger;
mod painter;
mod parser;
mod sorter;

pub use aggregator::{DayFetcher, weekly_tilecounts};
pub use merger::{merge_sorted_sources, merge_text_sources};
pub use painter::Painter;
pub use parser::{DEEP_ZOOM_CAP, parse_into};
pub use sorter::{DEFAULT_CHUNK_CAPACITY, ExternalSorter};
