use std::fmt;

/// A 64-bit encoding of `(zoom, x, y)` chosen so that numeric `<` coincides
/// with depth-first pre-order traversal of the quad-tree.
///
/// Layout: the low 5 bits hold `zoom`. The remaining bits hold the x/y
/// quadrant path interleaved, placed starting at bit `64 - 2*zoom` and
/// growing upward, root quadrant first (highest bits) down to the deepest
/// split (lowest bits of the window, just above the zoom field). Every
/// ancestor therefore sorts strictly before its descendants, and siblings
/// sort in Z-order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileKey(u64);

/// Maximum zoom level this encoding can represent: `2*24 = 48` interleaved
/// bits plus the 5-bit zoom field fit comfortably under 64 bits, with room
/// to spare before the zoom field would start overlapping the path bits.
pub const MAX_ZOOM: u8 = 24;

impl TileKey {
	/// `(zoom=0, x=0, y=0)`: the tile covering the whole world.
	pub const WORLD: TileKey = TileKey(0);

	/// Sentinel returned by [`TileKey::next`] once pre-order traversal has
	/// passed the last tile of the world at the requested zoom.
	pub const NO_TILE: TileKey = TileKey(u64::MAX);

	/// Packs `(zoom, x, y)` into a [`TileKey`].
	pub fn new(zoom: u8, x: u32, y: u32) -> TileKey {
		assert!(zoom <= MAX_ZOOM, "zoom {zoom} exceeds MAX_ZOOM {MAX_ZOOM}");
		if zoom == 0 {
			return TileKey(0);
		}
		let morton = interleave(zoom, x, y);
		TileKey(from_zoom_morton(zoom, morton))
	}

	/// `true` if this is [`TileKey::NO_TILE`].
	pub fn is_no_tile(self) -> bool {
		self == TileKey::NO_TILE
	}

	pub fn zoom(self) -> u8 {
		(self.0 & 0x1f) as u8
	}

	/// Inverse of [`TileKey::new`].
	pub fn zoom_xy(self) -> (u8, u32, u32) {
		let zoom = self.zoom();
		let (x, y) = deinterleave(zoom, self.raw_morton());
		(zoom, x, y)
	}

	pub fn xy(self) -> (u32, u32) {
		let (_, x, y) = self.zoom_xy();
		(x, y)
	}

	fn raw_morton(self) -> u64 {
		let zoom = self.zoom();
		if zoom == 0 { 0 } else { self.0 >> (64 - 2 * zoom as u32) }
	}

	/// `true` if `other` lies in this tile's subtree (including `other ==
	/// self`).
	pub fn contains(self, other: TileKey) -> bool {
		self.zoom() <= other.zoom() && other.to_zoom(self.zoom()) == self
	}

	/// Truncates to the ancestor tile at zoom `z` (`z <= self.zoom()`
	/// required — this only ever truncates toward the root, never refines).
	pub fn to_zoom(self, z: u8) -> TileKey {
		let zoom = self.zoom();
		assert!(z <= zoom, "ToZoom({z}) on a tile at zoom {zoom} must truncate, not refine");
		if z == zoom {
			return self;
		}
		let shift = (zoom - z) as u32;
		TileKey(from_zoom_morton(z, self.raw_morton() >> (2 * shift)))
	}

	/// The next `TileKey` at zoom `z` in pre-order, i.e. the tile
	/// immediately following whatever `self` covers at zoom `z` (its own
	/// cell, if `self.zoom() == z`; its subtree, if coarser; or the zoom-`z`
	/// ancestor's *next sibling*, if `self` is finer than `z`). Returns
	/// [`TileKey::NO_TILE`] once traversal has passed the last tile of the
	/// world at zoom `z`.
	pub fn next(self, z: u8) -> TileKey {
		assert!(z <= MAX_ZOOM, "zoom {z} exceeds MAX_ZOOM {MAX_ZOOM}");
		let zoom = self.zoom();
		let next_index = if zoom <= z {
			let shift = (z - zoom) as u32;
			(self.raw_morton() << (2 * shift)) + (1u64 << (2 * shift))
		} else {
			self.to_zoom(z).raw_morton() + 1
		};
		let count = if z == 0 { 1 } else { 1u64 << (2 * z as u32) };
		if next_index >= count {
			return TileKey::NO_TILE;
		}
		let (x, y) = deinterleave(z, next_index);
		TileKey::new(z, x, y)
	}
}

fn interleave(zoom: u8, x: u32, y: u32) -> u64 {
	let mut morton = 0u64;
	for i in 0..zoom as u32 {
		let xb = ((x >> i) & 1) as u64;
		let yb = ((y >> i) & 1) as u64;
		morton |= xb << (2 * i);
		morton |= yb << (2 * i + 1);
	}
	morton
}

fn deinterleave(zoom: u8, morton: u64) -> (u32, u32) {
	let mut x = 0u32;
	let mut y = 0u32;
	for i in 0..zoom as u32 {
		x |= (((morton >> (2 * i)) & 1) as u32) << i;
		y |= (((morton >> (2 * i + 1)) & 1) as u32) << i;
	}
	(x, y)
}

fn from_zoom_morton(zoom: u8, morton: u64) -> u64 {
	if zoom == 0 {
		0
	} else {
		(zoom as u64) | (morton << (64 - 2 * zoom as u32))
	}
}

impl fmt::Debug for TileKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.is_no_tile() {
			return write!(f, "TileKey(NO_TILE)");
		}
		let (z, x, y) = self.zoom_xy();
		write!(f, "TileKey({z}/{x}/{y})")
	}
}

impl fmt::Display for TileKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let (z, x, y) = self.zoom_xy();
		write!(f, "{z}/{x}/{y}")
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[test]
	fn make_then_zoom_xy_is_identity() {
		for zoom in 0..=MAX_ZOOM {
			let max = 1u32 << zoom;
			for &x in &[0, 1, max.saturating_sub(1), max / 2] {
				for &y in &[0, 1, max.saturating_sub(1), max / 2] {
					if x >= max.max(1) || y >= max.max(1) {
						continue;
					}
					let key = TileKey::new(zoom, x, y);
					assert_eq!(key.zoom_xy(), (zoom, x, y), "zoom={zoom} x={x} y={y}");
				}
			}
		}
	}

	#[rstest]
	#[case(0, 0, 0)]
	#[case(3, 1, 1)]
	#[case(7, 39, 87)]
	#[case(18, 137_341, 91_897)]
	#[case(19, 274_682, 183_794)]
	#[case(24, (1 << 24) - 1, (1 << 24) - 1)]
	fn new_then_zoom_xy_round_trips_known_tiles(#[case] zoom: u8, #[case] x: u32, #[case] y: u32) {
		let key = TileKey::new(zoom, x, y);
		assert_eq!(key.zoom_xy(), (zoom, x, y));
	}

	#[test]
	fn ancestor_sorts_before_every_descendant() {
		let parent = TileKey::new(3, 1, 1);
		for dx in 0..4 {
			for dy in 0..4 {
				let child = TileKey::new(5, 4 + dx, 4 + dy);
				assert!(parent < child, "{parent:?} should sort before {child:?}");
				assert!(parent.contains(child));
			}
		}
		// A tile outside the subtree does not compare as contained.
		let cousin = TileKey::new(5, 0, 0);
		assert!(!parent.contains(cousin));
	}

	#[test]
	fn siblings_sort_in_z_order() {
		let z = TileKey::new(2, 0, 0);
		let o = TileKey::new(2, 1, 0);
		let t = TileKey::new(2, 0, 1);
		let h = TileKey::new(2, 1, 1);
		let mut keys = vec![h, t, o, z];
		keys.sort();
		assert_eq!(keys, vec![z, o, t, h]);
	}

	#[test]
	fn to_zoom_is_monotone_decreasing() {
		let key = TileKey::new(6, 37, 21);
		let mut prev = key;
		for z in (0..6).rev() {
			let anc = key.to_zoom(z);
			assert_eq!(anc.zoom(), z);
			assert!(anc <= prev);
			prev = anc;
		}
	}

	#[test]
	fn world_is_zero() {
		assert_eq!(TileKey::WORLD, TileKey::new(0, 0, 0));
		assert_eq!(TileKey::WORLD.zoom_xy(), (0, 0, 0));
	}

	#[test]
	fn next_walks_pre_order_within_zoom() {
		let a = TileKey::new(2, 0, 0);
		assert_eq!(a.next(2), TileKey::new(2, 1, 0));
		assert_eq!(TileKey::new(2, 1, 1).next(2), TileKey::NO_TILE);
	}

	#[test]
	fn next_skips_a_coarser_tiles_whole_subtree() {
		// A zoom-1 tile covers four zoom-3 cells; next(3) must land just past all of them.
		let coarse = TileKey::new(1, 0, 0);
		let next = coarse.next(3);
		assert_eq!(next.zoom(), 3);
		assert!(!coarse.to_zoom(1).contains(next));
		// the first cell *not* covered by tile (1,0,0) at zoom 3 is (3,4,0) in Z-order:
		// morton(1,0,0) = 0, shifted to zoom 3 covers morton range [0, 16), so next index is 16.
		assert_eq!(next, {
			let (x, y) = super::deinterleave(3, 16);
			TileKey::new(3, x, y)
		});
	}

	#[test]
	fn next_from_finer_zoom_advances_the_ancestor_sibling() {
		let fine = TileKey::new(4, 5, 5);
		let ancestor_next = fine.next(2);
		assert_eq!(ancestor_next, fine.to_zoom(2).next(2));
	}

	#[test]
	fn next_at_world_has_no_successor() {
		assert_eq!(TileKey::WORLD.next(0), TileKey::NO_TILE);
	}
}
