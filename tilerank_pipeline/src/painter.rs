//! Pyramid walker: drives an implicit pyramid of 256x256 [`Raster`]s from
//! the merged, pre-order-sorted [`TileCount`] stream, accumulating parent
//! views into children and emitting finished rasters as soon as traversal
//! leaves their subtree.
//!
//! The painter's ancestor chain is kept as a plain stack, rasters owned by
//! depth rather than referenced by pointer — `stack[0]` is always the world
//! raster, and `stack.last()` is the currently active raster, at whatever
//! zoom the traversal is presently positioned at.

use anyhow::Result;
use tilerank_core::{Error, Raster, TileCount, TileKey, tile_area_km2};
use tokio_util::sync::CancellationToken;

/// Drives the pyramid walk and hands finished rasters to `sink` in
/// emission order: bottom-up within a subtree, left-to-right across
/// siblings.
pub struct Painter<F: FnMut(&Raster) -> Result<()>> {
	raster_zoom: u8,
	num_weeks: u64,
	cancel: CancellationToken,
	/// Most recent `TileKey` actually painted, used to compute the start of
	/// the next gap-filling run.
	last: Option<TileKey>,
	/// `(key, summed count, occurrences)` for the tile-key group currently
	/// being accumulated by `feed`.
	pending: Option<(TileKey, u64, u64)>,
	stack: Vec<Raster>,
	sink: F,
}

impl<F: FnMut(&Raster) -> Result<()>> Painter<F> {
	/// `deepest_zoom` is the COG's most detailed zoom level; the painter's
	/// own raster grid lives 8 levels above it, since a 256x256 raster
	/// covers exactly 2^8 x 2^8 deepest-zoom tiles.
	pub fn new(num_weeks: u64, deepest_zoom: u8, cancel: CancellationToken, sink: F) -> Painter<F> {
		assert!(deepest_zoom >= 8, "deepest zoom {deepest_zoom} leaves no room for a 256x256 raster grid");
		Painter {
			raster_zoom: deepest_zoom - 8,
			num_weeks,
			cancel,
			last: None,
			pending: None,
			stack: vec![Raster::world()],
			sink,
		}
	}

	/// Feeds one record of the merged stream. Records for the same
	/// `TileKey` must arrive consecutively (guaranteed by the merge's sort
	/// order); a group closes, and is painted, as soon as a different key
	/// is seen. A group with more than `num_weeks` occurrences is a fatal
	/// error.
	pub fn feed(&mut self, tc: TileCount) -> Result<()> {
		if self.cancel.is_cancelled() {
			return Err(Error::cancelled());
		}
		match &mut self.pending {
			Some((key, sum, occurrences)) if *key == tc.key => {
				*sum += tc.count;
				*occurrences += 1;
				if *occurrences > self.num_weeks {
					log::trace!("tile {key} exceeded {} occurrences", self.num_weeks);
					return Err(Error::overflow(format!("tile {key} appears more than {} times in input", self.num_weeks)));
				}
				Ok(())
			}
			_ => {
				self.flush_pending()?;
				self.pending = Some((tc.key, tc.count, 1));
				Ok(())
			}
		}
	}

	fn flush_pending(&mut self) -> Result<()> {
		let Some((key, sum, _)) = self.pending.take() else {
			return Ok(());
		};
		let (zoom, _, y) = key.zoom_xy();
		let views_per_km2 = sum as f64 / (self.num_weeks as f64 * tile_area_km2(zoom, y));
		self.paint_tile(key, views_per_km2 as f32)
	}

	/// Positions the active raster, creating and retiring rasters along the
	/// way, then paints `tile` into whichever raster it lands in.
	fn paint_tile(&mut self, tile: TileKey, views_per_km2: f32) -> Result<()> {
		let raster_tile = tile.to_zoom(tile.zoom().min(self.raster_zoom));
		if self.stack.last().expect("painter stack is never empty").tile() != raster_tile {
			self.fill_gaps_before(raster_tile)?;
			self.goto(raster_tile)?;
		}
		self.stack.last_mut().expect("painter stack is never empty").paint(tile, views_per_km2);
		self.last = Some(tile);
		Ok(())
	}

	/// Emits an empty raster for every raster-grid cell between
	/// `last.Next(rasterZoom)` and `target` that is not an ancestor of
	/// `target` — i.e. every cell strictly outside `target`'s subtree — so
	/// the output grid stays dense even where no tile was ever painted.
	/// Passing [`TileKey::NO_TILE`] fills all the way to the end of the
	/// world (used by [`Painter::close`]).
	///
	/// When `last` is coarser than the raster grid (a perfectly ordinary
	/// pre-order event: a zoom-3 log line is itself a valid `TileCount`,
	/// and its own children may follow it immediately), `last`'s children
	/// have not been visited yet — only `last`'s own aggregate has. The
	/// cursor must then start at `last`'s *first* descendant at the raster
	/// zoom, not past its whole subtree, or a sibling child painted right
	/// after a coarse parent would be missed or, worse, walked past
	/// entirely.
	fn fill_gaps_before(&mut self, target: TileKey) -> Result<()> {
		let mut cursor = match self.last {
			None => TileKey::new(self.raster_zoom, 0, 0),
			Some(last) if last.zoom() >= self.raster_zoom => last.next(self.raster_zoom),
			Some(last) => {
				let shift = self.raster_zoom - last.zoom();
				let (x, y) = last.xy();
				TileKey::new(self.raster_zoom, x << shift, y << shift)
			}
		};
		while !cursor.is_no_tile() && !target.contains(cursor) {
			if self.cancel.is_cancelled() {
				return Err(Error::cancelled());
			}
			self.goto(cursor)?;
			let finished = self.stack.pop().expect("goto always leaves at least the world raster");
			(self.sink)(&finished)?;
			cursor = cursor.next(self.raster_zoom);
		}
		Ok(())
	}

	/// Repositions the active raster (the stack's top) onto `target`:
	/// pops every ancestor that does not contain it, handing each to
	/// `sink` as it finishes, then pushes fresh child rasters one zoom
	/// level at a time down to `target`, each inheriting the surviving
	/// ancestor's `views_per_km2`.
	fn goto(&mut self, target: TileKey) -> Result<()> {
		while !self.stack.last().expect("painter stack is never empty").tile().contains(target) {
			let finished = self.stack.pop().expect("the world raster contains every tile, so this never empties the stack");
			(self.sink)(&finished)?;
		}
		let mut zoom = self.stack.last().expect("painter stack is never empty").zoom();
		while zoom < target.zoom() {
			let child_tile = target.to_zoom(zoom + 1);
			let child = Raster::child(self.stack.last().expect("painter stack is never empty"), child_tile);
			self.stack.push(child);
			zoom += 1;
		}
		Ok(())
	}

	/// Flushes any pending group, fills every remaining raster-grid cell
	/// through the end of the world, then retires whatever ancestors
	/// survive on the stack.
	pub fn close(mut self) -> Result<()> {
		log::trace!("closing painter, filling remaining raster-grid cells");
		self.flush_pending()?;
		self.fill_gaps_before(TileKey::NO_TILE)?;
		while let Some(finished) = self.stack.pop() {
			(self.sink)(&finished)?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::cell::RefCell;
	use std::rc::Rc;

	/// Captures every raster handed to the writer, indexed by `(zoom, x, y)`,
	/// along with the emission order.
	#[derive(Default)]
	struct Captured {
		by_tile: std::collections::HashMap<(u8, u32, u32), Vec<f32>>,
		order: Vec<(u8, u32, u32)>,
	}

	fn painter_with_capture(num_weeks: u64, deepest_zoom: u8) -> (Painter<impl FnMut(&Raster) -> Result<()>>, Rc<RefCell<Captured>>) {
		let captured = Rc::new(RefCell::new(Captured::default()));
		let sink_captured = captured.clone();
		let sink = move |raster: &Raster| -> Result<()> {
			let (z, x, y) = raster.tile().zoom_xy();
			let mut c = sink_captured.borrow_mut();
			c.order.push((z, x, y));
			c.by_tile.insert((z, x, y), raster.pixels().to_vec());
			Ok(())
		};
		(Painter::new(num_weeks, deepest_zoom, CancellationToken::new(), sink), captured)
	}

	fn sample(pixels: &[f32], x: usize, y: usize) -> f32 {
		pixels[y * tilerank_core::RASTER_SIZE + x]
	}

	/// A world raster with one child at `(1,1,1)`, painting `(2,3,3)` then
	/// `(3,6,7)`, sampled on a 4x4 grid of 64px-spaced pixels.
	#[test]
	fn paint_pixel_test_matches_expected_grid() {
		let (mut painter, captured) = painter_with_capture(1, 9); // raster_zoom = 1
		painter.paint_tile(TileKey::new(2, 3, 3), 23.0).unwrap();
		painter.paint_tile(TileKey::new(3, 6, 7), 42.0).unwrap();
		painter.close().unwrap();

		let pixels = captured.borrow().by_tile.get(&(1, 1, 1)).cloned().expect("raster (1,1,1) must have been emitted");
		let grid = [
			[sample(&pixels, 0, 0), sample(&pixels, 64, 0), sample(&pixels, 128, 0), sample(&pixels, 192, 0)],
			[sample(&pixels, 0, 64), sample(&pixels, 64, 64), sample(&pixels, 128, 64), sample(&pixels, 192, 64)],
			[sample(&pixels, 0, 128), sample(&pixels, 64, 128), sample(&pixels, 128, 128), sample(&pixels, 192, 128)],
			[sample(&pixels, 0, 192), sample(&pixels, 64, 192), sample(&pixels, 128, 192), sample(&pixels, 192, 192)],
		];
		assert_eq!(grid, [
			[0.0, 0.0, 0.0, 0.0],
			[0.0, 0.0, 0.0, 0.0],
			[0.0, 0.0, 23.0, 23.0],
			[0.0, 0.0, 65.0, 23.0],
		]);
	}

	/// A world raster with a child at `(1,0,0)`, painting a zoom-10 tile (a
	/// quarter-pixel contribution) at `(256,256)` with value 100.
	#[test]
	fn sub_pixel_paint_divides_by_four_per_extra_level() {
		let (mut painter, captured) = painter_with_capture(1, 9); // raster_zoom = 1
		painter.paint_tile(TileKey::new(10, 256, 256), 100.0).unwrap();
		painter.close().unwrap();

		let pixels = captured.borrow().by_tile.get(&(1, 0, 0)).cloned().expect("raster (1,0,0) must have been emitted");
		assert_eq!(sample(&pixels, 128, 128), 25.0);
		for &(x, y) in &[(0, 0), (64, 0), (128, 0), (192, 0), (192, 192)] {
			assert_eq!(sample(&pixels, x, y), 0.0, "pixel ({x},{y}) should be untouched");
		}
	}

	/// The same tile key appears more times than `numWeeks` allows.
	#[test]
	fn group_exceeding_num_weeks_is_a_fatal_error() {
		let (mut painter, _captured) = painter_with_capture(1, 12);
		let key = TileKey::new(7, 39, 87);
		painter.feed(TileCount::new(key, 22)).unwrap();
		let err = painter.feed(TileCount::new(key, 33)).unwrap_err();
		let message = err.to_string();
		assert_eq!(message, "tile 7/39/87 appears more than 1 times in input");
	}

	/// Dense-grid guarantee: painting only the very last cell of a small
	/// world still emits every earlier sibling as an empty raster.
	#[test]
	fn close_fills_every_remaining_cell_of_a_small_world() {
		let (mut painter, captured) = painter_with_capture(1, 8); // raster_zoom = 0: world is the only raster.
		painter.close().unwrap();
		assert_eq!(captured.borrow().order, vec![(0, 0, 0)]);
	}

	/// Gap-filled leaves inherit whatever ancestor density was already
	/// painted, rather than being literally zero when a coarser tile above
	/// them carries a nonzero value.
	#[test]
	fn gap_filled_leaves_inherit_ancestor_density() {
		let (mut painter, captured) = painter_with_capture(1, 10); // raster_zoom = 2
		// Paint the whole world with a base density, then a specific deep
		// leaf with extra density; an unrelated sibling leaf must still
		// inherit the base density via gap-filling, not read as zero.
		painter.paint_tile(TileKey::WORLD, 7.0).unwrap();
		painter.paint_tile(TileKey::new(2, 3, 3), 5.0).unwrap();
		painter.close().unwrap();

		let untouched = captured.borrow().by_tile.get(&(2, 0, 0)).cloned().expect("gap leaf (2,0,0) must have been emitted");
		assert!(untouched.iter().all(|&p| p == 7.0), "gap-filled leaf should inherit the world's density");
	}

	/// Two distinct fine-zoom tile keys that both truncate to the same
	/// coarse raster cell must not trigger spurious gap-filling between
	/// them (the `raster_tile != current raster's tile` guard in
	/// `paint_tile`).
	#[test]
	fn two_keys_mapping_to_the_same_raster_cell_do_not_gap_fill_each_other() {
		let (mut painter, captured) = painter_with_capture(1, 11); // raster_zoom = 3
		painter.paint_tile(TileKey::new(3, 1, 1), 3.0).unwrap();
		// (11, 300, 300) truncates to the very same (3,1,1) raster cell:
		// 300 >> 8 == 1 for both x and y.
		painter.paint_tile(TileKey::new(11, 300, 300), 1.0).unwrap();
		painter.close().unwrap();

		// only one raster at zoom 3 for (1,1) should have been emitted, plus its ancestors.
		let count_at_zoom3 = captured.borrow().order.iter().filter(|&&(z, _, _)| z == 3).count();
		assert_eq!(count_at_zoom3, 64, "every zoom-3 cell of the 8x8 grid must be emitted exactly once");
	}
}
