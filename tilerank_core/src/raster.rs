use crate::TileKey;

/// Width/height of every raster tile, in pixels, and therefore the edge
/// length of the box a single `Paint` call can touch.
pub const RASTER_SIZE: usize = 256;

const PIXEL_COUNT: usize = RASTER_SIZE * RASTER_SIZE;

/// One node of the pyramid the painter builds: a `RASTER_SIZE`x`RASTER_SIZE`
/// plane of weekly-average views/km^2, positioned at `tile`. Deliberately
/// holds no parent pointer: the painter keeps ancestors on its own stack and
/// threads `views_per_km2` down explicitly at construction time instead.
pub struct Raster {
	tile: TileKey,
	pixels: Box<[f32; PIXEL_COUNT]>,
	/// This raster's own aggregated density, including whatever it inherited
	/// from its parent at creation time, updated further whenever a `Paint`
	/// call targets this raster's tile exactly.
	pub views_per_km2: f32,
}

impl Raster {
	/// The raster for the whole world (zoom 0), with no inherited density.
	pub fn world() -> Raster {
		Raster {
			tile: TileKey::WORLD,
			pixels: Box::new([0.0; PIXEL_COUNT]),
			views_per_km2: 0.0,
		}
	}

	/// Creates the raster for `tile`, a direct child of `parent` in the
	/// pyramid, inheriting `parent`'s `views_per_km2` uniformly across every
	/// pixel.
	pub fn child(parent: &Raster, tile: TileKey) -> Raster {
		assert_eq!(
			tile.zoom(),
			parent.zoom() + 1,
			"raster {tile:?} is not a direct child of {:?}",
			parent.tile
		);
		assert!(parent.tile.contains(tile), "{tile:?} is not inside {:?}", parent.tile);
		Raster {
			tile,
			pixels: Box::new([parent.views_per_km2; PIXEL_COUNT]),
			views_per_km2: parent.views_per_km2,
		}
	}

	pub fn tile(&self) -> TileKey {
		self.tile
	}

	pub fn zoom(&self) -> u8 {
		self.tile.zoom()
	}

	pub fn pixels(&self) -> &[f32; PIXEL_COUNT] {
		&self.pixels
	}

	/// Adds `v` views/km^2 to the square of pixels `tile` maps to within this
	/// raster. `tile` may be finer than one pixel
	/// (in which case `v` is scaled down by the pixel's sub-tile count and
	/// spread across the single pixel it rounds to), exactly one pixel, or
	/// coarser (in which case it covers a whole square of pixels, up to the
	/// entire raster when `tile` equals this raster's own tile).
	pub fn paint(&mut self, tile: TileKey, v: f32) {
		let finest_zoom = self.zoom() + 8;
		let (tile, v) = if tile.zoom() > finest_zoom {
			let extra = (tile.zoom() - finest_zoom) as i32;
			(tile.to_zoom(finest_zoom), v / 4f32.powi(extra))
		} else {
			(tile, v)
		};

		let delta = tile.zoom() - self.zoom();
		let side = 1usize << (8 - delta as u32);
		let factor = 1u32 << delta as u32;
		let (tx, ty) = tile.xy();
		let (rx, ry) = self.tile.xy();
		let ox = (tx - rx * factor) as usize * side;
		let oy = (ty - ry * factor) as usize * side;

		for y in oy..oy + side {
			let row = y * RASTER_SIZE;
			for x in ox..ox + side {
				self.pixels[row + x] += v;
			}
		}
		if delta == 0 {
			self.views_per_km2 += v;
		}
	}

	/// `Some(color)` if every pixel carries the same value (rounded to the
	/// nearest integer views/km^2, matching the COG's encoded precision),
	/// enabling the uniform-tile dedup in the COG writer.
	pub fn uniform_color(&self) -> Option<u32> {
		let first = self.pixels[0].round() as i64;
		for &p in self.pixels.iter().skip(1) {
			if p.round() as i64 != first {
				return None;
			}
		}
		u32::try_from(first).ok()
	}
}
