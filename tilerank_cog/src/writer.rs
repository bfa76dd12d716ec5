//! The COG assembler: ingests finished [`Raster`]s in painter-emission order,
//! compresses and dedups their pixel planes, then assembles the final
//! multi-IFD Cloud-Optimized GeoTIFF on [`RasterWriter::close`].

use crate::geokeys::{GEO_ASCII_PARAMS, geo_key_directory};
use crate::io::TwoPassWriter;
use crate::tiff::{self, Entry};
use anyhow::{Context, Result};
use byteorder::{LittleEndian, WriteBytesExt};
use flate2::Compression;
use flate2::bufread::ZlibEncoder;
use std::collections::HashMap;
use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tilerank_core::{Error, RASTER_SIZE, Raster};

const IMAGE_DESCRIPTION: &[u8] = b"OpenStreetMap view density, in weekly user views per km2\0";
const SOFTWARE: &[u8] = b"TileRank\0";

struct ZoomState {
	zoom: u8,
	tile_count: usize,
	temp_offset: Vec<u32>,
	temp_size: Vec<u32>,
	uniform_index: HashMap<u32, usize>,
}

impl ZoomState {
	fn new(zoom: u8) -> ZoomState {
		let side = 1usize << zoom;
		let tile_count = side * side;
		ZoomState {
			zoom,
			tile_count,
			temp_offset: vec![0; tile_count],
			temp_size: vec![0; tile_count],
			uniform_index: HashMap::new(),
		}
	}

	fn tile_index(&self, x: u32, y: u32) -> usize {
		y as usize * (1usize << self.zoom) + x as usize
	}
}

pub struct RasterWriter {
	raster_zoom: u8,
	temp_path: PathBuf,
	temp_file: TwoPassWriter,
	zooms: Vec<ZoomState>,
}

impl RasterWriter {
	pub fn create(cache_dir: &Path, raster_zoom: u8) -> Result<RasterWriter> {
		let temp_path = cache_dir.join("tilerank-raster.tmp");
		let temp_file = TwoPassWriter::create(&temp_path).with_context(|| format!("creating temp file {temp_path:?}"))?;
		let zooms = (0..=raster_zoom).map(ZoomState::new).collect();
		Ok(RasterWriter {
			raster_zoom,
			temp_path,
			temp_file,
			zooms,
		})
	}

	/// Ingests one finished raster: checks uniformity, dedups against any
	/// same-zoom tile already seen with that color, and otherwise
	/// compresses and appends its pixel plane to the temp file.
	pub fn write(&mut self, raster: &Raster) -> Result<()> {
		let zoom = raster.zoom();
		let (_, x, y) = raster.tile().zoom_xy();
		let state = &mut self.zooms[zoom as usize];
		let index = state.tile_index(x, y);

		if let Some(color) = raster.uniform_color() {
			if let Some(&existing) = state.uniform_index.get(&color) {
				log::trace!("zoom {zoom} tile {x}/{y} dedups against uniform color {color}");
				state.temp_offset[index] = state.temp_offset[existing];
				state.temp_size[index] = state.temp_size[existing];
				return Ok(());
			}
			state.uniform_index.insert(color, index);
		}

		let mut raw = Vec::with_capacity(RASTER_SIZE * RASTER_SIZE * 4);
		for &pixel in raster.pixels().iter() {
			raw.write_f32::<LittleEndian>(pixel)?;
		}
		let mut encoder = ZlibEncoder::new(raw.as_slice(), Compression::best());
		let mut compressed = Vec::new();
		encoder.read_to_end(&mut compressed).context("zlib-compressing raster plane")?;

		let offset = self.temp_file.append(&compressed)?;
		state.temp_offset[index] = u32::try_from(offset).map_err(|_| Error::overflow("temp file exceeds 2^32 bytes"))?;
		state.temp_size[index] = u32::try_from(compressed.len()).map_err(|_| Error::overflow("tile payload exceeds 2^32 bytes"))?;
		Ok(())
	}

	/// Assembles `<cache_dir>/out.tif` (via `<path>.tmp` + atomic rename) and
	/// removes the temp file.
	pub fn close(mut self, output_path: &Path) -> Result<()> {
		log::trace!("closing raster writer, {} zoom levels", self.zooms.len());
		self.temp_file.finish()?;
		let mut temp_read = fs::File::open(&self.temp_path).with_context(|| format!("reopening temp file {:?}", self.temp_path))?;

		let tmp_out_path = output_path.with_extension("tif.tmp");
		let mut out = TwoPassWriter::create(&tmp_out_path).with_context(|| format!("creating {tmp_out_path:?}"))?;

		log::trace!("write IFDs, deepest zoom first");
		let ghost = tiff::ghost_area();
		let first_ifd_offset = 8 + ghost.len() as u64;
		let first_ifd_offset = u32::try_from(first_ifd_offset).map_err(|_| Error::overflow("ghost area pushes first IFD past 2^32"))?;
		tiff::write_header(&mut VecSink(&mut out), first_ifd_offset)?;
		out.append(&ghost)?;

		let mut offsets_slot = vec![0u64; self.zooms.len()];
		let mut byte_counts_slot = vec![0u64; self.zooms.len()];
		for zoom in (0..=self.raster_zoom).rev() {
			let state = &self.zooms[zoom as usize];
			let entries = self.ifd_entries(state, zoom == self.raster_zoom);
			let base = out.position();
			let (bytes, deferred) = tiff::build_ifd(entries, base);
			assert_eq!(deferred.len(), 2, "exactly TileOffsets and TileByteCounts are deferred");
			offsets_slot[zoom as usize] = deferred[0];
			byte_counts_slot[zoom as usize] = deferred[1];
			out.append(&bytes)?;
		}

		log::trace!("write tile data, coarsest zoom first");
		let mut final_offset_of_temp_offset: HashMap<u32, u64> = HashMap::new();
		for zoom in 0..=self.raster_zoom {
			let state = &self.zooms[zoom as usize];
			let mut final_offsets = vec![0u32; state.tile_count];
			for index in 0..state.tile_count {
				let temp_offset = state.temp_offset[index];
				let size = state.temp_size[index];
				let final_offset = if let Some(&known) = final_offset_of_temp_offset.get(&temp_offset) {
					known
				} else {
					temp_read.seek(SeekFrom::Start(temp_offset as u64))?;
					let mut payload = vec![0u8; size as usize];
					temp_read.read_exact(&mut payload)?;

					let mut frame = Vec::with_capacity(8 + payload.len());
					frame.write_u32::<LittleEndian>(size)?;
					let payload_start = out.position() + frame.len() as u64;
					frame.extend_from_slice(&payload);
					let trailer_len = payload.len().min(4);
					frame.extend_from_slice(&payload[payload.len() - trailer_len..]);
					if trailer_len < 4 {
						frame.extend(std::iter::repeat(0u8).take(4 - trailer_len));
					}
					out.append(&frame)?;
					final_offset_of_temp_offset.insert(temp_offset, payload_start);
					payload_start
				};
				final_offsets[index] = u32::try_from(final_offset).map_err(|_| Error::overflow("tile offset exceeds 2^32"))?;
			}

			if state.tile_count == 1 {
				out.patch(offsets_slot[zoom as usize], &final_offsets[0].to_le_bytes())?;
			} else {
				let mut array = Vec::with_capacity(final_offsets.len() * 4);
				for v in &final_offsets {
					array.write_u32::<LittleEndian>(*v)?;
				}
				let array_pos = out.append(&array)?;
				let array_pos = u32::try_from(array_pos).map_err(|_| Error::overflow("TileOffsets array position exceeds 2^32"))?;
				out.patch(offsets_slot[zoom as usize], &array_pos.to_le_bytes())?;
			}
		}

		for zoom in 0..=self.raster_zoom {
			let state = &self.zooms[zoom as usize];
			if state.tile_count == 1 {
				out.patch(byte_counts_slot[zoom as usize], &state.temp_size[0].to_le_bytes())?;
			} else {
				let mut array = Vec::with_capacity(state.temp_size.len() * 4);
				for v in &state.temp_size {
					array.write_u32::<LittleEndian>(*v)?;
				}
				let array_pos = out.append(&array)?;
				let array_pos = u32::try_from(array_pos).map_err(|_| Error::overflow("TileByteCounts array position exceeds 2^32"))?;
				out.patch(byte_counts_slot[zoom as usize], &array_pos.to_le_bytes())?;
			}
		}

		out.finish()?;
		fs::rename(&tmp_out_path, output_path).with_context(|| format!("renaming {tmp_out_path:?} to {output_path:?}"))?;
		fs::remove_file(&self.temp_path).ok();
		log::trace!("wrote {}", output_path.display());
		Ok(())
	}

	fn ifd_entries(&self, state: &ZoomState, is_highest_res: bool) -> Vec<Entry> {
		let side = 1u32 << (state.zoom as u32 + 8);
		let mut entries = vec![
			Entry::scalar(tiff::TAG_IMAGE_WIDTH, side),
			Entry::scalar(tiff::TAG_IMAGE_HEIGHT, side),
			Entry::scalar(tiff::TAG_BITS_PER_SAMPLE, 32),
			Entry::scalar(tiff::TAG_COMPRESSION, 8),
			Entry::scalar(tiff::TAG_PHOTOMETRIC_INTERPRETATION, 0),
			Entry::scalar(tiff::TAG_SAMPLES_PER_PIXEL, 1),
			Entry::scalar(tiff::TAG_PLANAR_CONFIGURATION, 1),
			Entry::scalar(tiff::TAG_TILE_WIDTH, 256),
			Entry::scalar(tiff::TAG_TILE_LENGTH, 256),
			Entry::deferred_long_array(tiff::TAG_TILE_OFFSETS, state.tile_count as u32),
			Entry::deferred_long_array(tiff::TAG_TILE_BYTE_COUNTS, state.tile_count as u32),
			Entry::scalar(tiff::TAG_SAMPLE_FORMAT, 3),
		];
		if is_highest_res {
			entries.push(Entry::ascii(tiff::TAG_IMAGE_DESCRIPTION, IMAGE_DESCRIPTION));
			entries.push(Entry::ascii(tiff::TAG_SOFTWARE, SOFTWARE));
			entries.push(Entry::short_array(tiff::TAG_GEO_KEY_DIRECTORY, &geo_key_directory()));
			entries.push(Entry::ascii(tiff::TAG_GEO_ASCII_PARAMS, GEO_ASCII_PARAMS));
		}
		entries
	}
}

/// Adapts [`TwoPassWriter`] to `std::io::Write` for the handful of helpers
/// (`tiff::write_header`) that write through a generic `Write`.
struct VecSink<'a>(&'a mut TwoPassWriter);

impl std::io::Write for VecSink<'_> {
	fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
		self.0
			.append(buf)
			.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
		Ok(buf.len())
	}
	fn flush(&mut self) -> std::io::Result<()> {
		Ok(())
	}
}
