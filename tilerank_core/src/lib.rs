//! Core data types shared by the TileRank pipeline and COG writer crates:
//! the [`TileKey`] pre-order codec, the [`TileCount`] varint codec, Web
//! Mercator area/latitude math, the [`Raster`] pixel plane, and the
//! process-wide [`Config`] and [`Error`] types.

mod config;
mod error;
mod mercator;
mod raster;
mod tile_count;
mod tile_key;

pub use config::Config;
pub use error::{Error, Result};
pub use mercator::{tile_area_km2, tile_latitude};
pub use raster::{RASTER_SIZE, Raster};
pub use tile_count::TileCount;
pub use tile_key::{MAX_ZOOM, TileKey};
