use crate::TileKey;
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::cmp::Ordering;
use std::io::{self, Read, Write};

/// A `(TileKey, count)` pair as it flows through the external sorter. The
/// wire format is a tight varint encoding chosen so the
/// serialized bytes need not preserve `TileKey` order — sorting always goes
/// through [`TileCount`]'s `Ord` impl, never a byte-wise comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileCount {
	pub key: TileKey,
	pub count: u64,
}

impl TileCount {
	pub fn new(key: TileKey, count: u64) -> Self {
		TileCount { key, count }
	}

	/// `zoom/x/y count\n` as used by the weekly Brotli cache and the
	/// per-day parser's plain-text sibling format.
	pub fn to_line(self) -> String {
		let (z, x, y) = self.key.zoom_xy();
		format!("{z}/{x}/{y} {}\n", self.count)
	}

	/// Serializes as `varint(x), varint(y), varint(count), byte(zoom)`.
	pub fn write_to(&self, w: &mut impl Write) -> io::Result<()> {
		let (zoom, x, y) = self.key.zoom_xy();
		write_varint(w, x as u64)?;
		write_varint(w, y as u64)?;
		write_varint(w, self.count)?;
		w.write_u8(zoom)
	}

	/// Deserializes one record, or returns `Ok(None)` on a clean end of
	/// stream (i.e. zero bytes available before the first varint byte).
	pub fn read_from(r: &mut impl Read) -> io::Result<Option<TileCount>> {
		let x = match read_varint_opt(r)? {
			Some(x) => x as u32,
			None => return Ok(None),
		};
		let y = read_varint(r)? as u32;
		let count = read_varint(r)?;
		let zoom = r.read_u8()?;
		Ok(Some(TileCount::new(TileKey::new(zoom, x, y), count)))
	}
}

/// `TileCountLess`: orders first by [`TileKey`] (the pre-order invariant),
/// then by count, so a total order exists even for (rare) duplicate keys
/// flowing through the same merge step.
impl Ord for TileCount {
	fn cmp(&self, other: &Self) -> Ordering {
		self.key.cmp(&other.key).then(self.count.cmp(&other.count))
	}
}

impl PartialOrd for TileCount {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

fn write_varint(w: &mut impl Write, mut v: u64) -> io::Result<()> {
	loop {
		let byte = (v & 0x7f) as u8;
		v >>= 7;
		if v == 0 {
			w.write_u8(byte)?;
			return Ok(());
		}
		w.write_u8(byte | 0x80)?;
	}
}

fn read_varint(r: &mut impl Read) -> io::Result<u64> {
	read_varint_opt(r)?.ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "truncated varint"))
}

/// Like [`read_varint`] but reports a clean EOF (no bytes available at all)
/// as `Ok(None)` instead of an error, so callers can detect "no more
/// records" without a sentinel byte.
fn read_varint_opt(r: &mut impl Read) -> io::Result<Option<u64>> {
	let mut result: u64 = 0;
	let mut shift = 0u32;
	let mut buf = [0u8; 1];
	loop {
		let n = r.read(&mut buf)?;
		if n == 0 {
			if shift == 0 {
				return Ok(None);
			}
			return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated varint"));
		}
		let byte = buf[0];
		result |= ((byte & 0x7f) as u64) << shift;
		if byte & 0x80 == 0 {
			return Ok(Some(result));
		}
		shift += 7;
	}
}
