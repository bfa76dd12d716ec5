//! Assembles a Cloud-Optimized GeoTIFF from a stream of finished
//! [`tilerank_core::Raster`]s: TIFF primitives in [`tiff`], the fixed
//! EPSG:3857 [`geokeys`] block, and the two-pass [`writer::RasterWriter`]
//! that does the actual compression, dedup, and file assembly.

mod geokeys;
pub mod io;
pub mod tiff;
mod writer;

pub use writer::RasterWriter;
