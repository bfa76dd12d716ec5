//! Low-level TIFF primitives: tag numbers, entry encoding, and IFD assembly.
//! Everything here is little-endian, regardless of host byte order.

use byteorder::{LittleEndian, WriteBytesExt};
use std::io::{self, Write};

pub const TYPE_ASCII: u16 = 2;
pub const TYPE_SHORT: u16 = 3;
pub const TYPE_LONG: u16 = 4;

pub const TAG_IMAGE_WIDTH: u16 = 256;
pub const TAG_IMAGE_HEIGHT: u16 = 257;
pub const TAG_BITS_PER_SAMPLE: u16 = 258;
pub const TAG_COMPRESSION: u16 = 259;
pub const TAG_PHOTOMETRIC_INTERPRETATION: u16 = 262;
pub const TAG_IMAGE_DESCRIPTION: u16 = 270;
pub const TAG_SAMPLES_PER_PIXEL: u16 = 277;
pub const TAG_PLANAR_CONFIGURATION: u16 = 284;
pub const TAG_SOFTWARE: u16 = 305;
pub const TAG_TILE_WIDTH: u16 = 322;
pub const TAG_TILE_LENGTH: u16 = 323;
pub const TAG_TILE_OFFSETS: u16 = 324;
pub const TAG_TILE_BYTE_COUNTS: u16 = 325;
pub const TAG_SAMPLE_FORMAT: u16 = 339;
pub const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
pub const TAG_GEO_ASCII_PARAMS: u16 = 34737;

/// A placeholder 4-byte value written for tags whose real value (an array
/// position, or a single-entry array's inlined offset) is only known once
/// tile data has been written, to be overwritten by [`crate::writer::patch`]
/// once the real value exists.
pub const DEADBEEF: [u8; 4] = [0xef, 0xbe, 0xad, 0xde];

/// Either the 4-byte inline value TIFF stores directly in an IFD entry, or a
/// larger payload that must be written after the IFD (or, for
/// `TileOffsets`/`TileByteCounts`, far later among the tile data) with the
/// entry holding a pointer to it.
pub enum EntryValue {
	Inline([u8; 4]),
	External(Vec<u8>),
	/// Not yet known; write [`DEADBEEF`] and record this entry's absolute
	/// value-slot position for the caller to patch later.
	Deferred,
}

pub struct Entry {
	pub tag: u16,
	pub field_type: u16,
	pub count: u32,
	pub value: EntryValue,
}

impl Entry {
	/// A scalar value whose TIFF type is chosen automatically: SHORT if it
	/// fits in 16 bits, LONG otherwise.
	pub fn scalar(tag: u16, value: u32) -> Entry {
		if value <= 0xFFFF {
			Entry {
				tag,
				field_type: TYPE_SHORT,
				count: 1,
				value: EntryValue::Inline(inline_short(value as u16)),
			}
		} else {
			Entry {
				tag,
				field_type: TYPE_LONG,
				count: 1,
				value: EntryValue::Inline(value.to_le_bytes()),
			}
		}
	}

	pub fn ascii(tag: u16, bytes: &[u8]) -> Entry {
		Entry {
			tag,
			field_type: TYPE_ASCII,
			count: bytes.len() as u32,
			value: external_or_inline(bytes),
		}
	}

	pub fn short_array(tag: u16, values: &[u16]) -> Entry {
		let mut bytes = Vec::with_capacity(values.len() * 2);
		for &v in values {
			bytes.write_u16::<LittleEndian>(v).unwrap();
		}
		Entry {
			tag,
			field_type: TYPE_SHORT,
			count: values.len() as u32,
			value: external_or_inline(&bytes),
		}
	}

	/// A `TileOffsets`/`TileByteCounts` array: always type LONG, overriding
	/// the usual SHORT/LONG choice, since these values are unknown until
	/// tile data is written and may end up exceeding 16 bits.
	pub fn deferred_long_array(tag: u16, count: u32) -> Entry {
		Entry {
			tag,
			field_type: TYPE_LONG,
			count,
			value: EntryValue::Deferred,
		}
	}
}

fn inline_short(v: u16) -> [u8; 4] {
	let le = v.to_le_bytes();
	[le[0], le[1], 0, 0]
}

fn external_or_inline(bytes: &[u8]) -> EntryValue {
	if bytes.len() <= 4 {
		let mut inline = [0u8; 4];
		inline[..bytes.len()].copy_from_slice(bytes);
		EntryValue::Inline(inline)
	} else {
		EntryValue::External(bytes.to_vec())
	}
}

/// Serializes one IFD: entry count, sorted entries (12 bytes each), a 4-byte
/// next-IFD offset (always 0: overviews chain via file placement order, not
/// a linked list), then external payloads for entries too big to inline, in
/// tag order, each padded to an even length.
///
/// `base_offset` is the absolute file position where this IFD begins.
/// Returns the assembled bytes plus the absolute position of each deferred
/// entry's 4-byte value slot, in the same order as `entries`' deferred ones.
pub fn build_ifd(mut entries: Vec<Entry>, base_offset: u64) -> (Vec<u8>, Vec<u64>) {
	entries.sort_by_key(|e| e.tag);
	for w in entries.windows(2) {
		assert!(w[0].tag < w[1].tag, "IFD entries out of order: {} >= {}", w[0].tag, w[1].tag);
	}

	let entry_count = entries.len();
	let header_len = 2 + entry_count * 12 + 4;
	let mut external = Vec::new();
	let mut external_offsets = Vec::with_capacity(entry_count);
	let mut cursor = base_offset + header_len as u64;
	for entry in &entries {
		match &entry.value {
			EntryValue::External(bytes) => {
				external_offsets.push(Some(cursor));
				cursor += bytes.len() as u64;
				if bytes.len() % 2 == 1 {
					cursor += 1;
				}
			}
			_ => external_offsets.push(None),
		}
	}

	let mut out = Vec::with_capacity(header_len);
	out.write_u16::<LittleEndian>(entry_count as u16).unwrap();
	let mut deferred_positions = Vec::new();
	for (entry, ext_offset) in entries.iter().zip(&external_offsets) {
		out.write_u16::<LittleEndian>(entry.tag).unwrap();
		out.write_u16::<LittleEndian>(entry.field_type).unwrap();
		out.write_u32::<LittleEndian>(entry.count).unwrap();
		let value_slot_pos = base_offset + out.len() as u64;
		match &entry.value {
			EntryValue::Inline(bytes) => out.write_all(bytes).unwrap(),
			EntryValue::External(_) => out.write_u32::<LittleEndian>(ext_offset.unwrap() as u32).unwrap(),
			EntryValue::Deferred => {
				out.write_all(&DEADBEEF).unwrap();
				deferred_positions.push(value_slot_pos);
			}
		}
	}
	out.write_u32::<LittleEndian>(0).unwrap(); // next IFD offset

	for (entry, ext_offset) in entries.iter().zip(&external_offsets) {
		if let (EntryValue::External(bytes), Some(_)) = (&entry.value, ext_offset) {
			out.write_all(bytes).unwrap();
			if bytes.len() % 2 == 1 {
				out.write_u8(0).unwrap();
			}
		}
	}

	(out, deferred_positions)
}

/// Writes the 6-byte TIFF magic header plus the 4-byte offset to the first
/// IFD; the GDAL ghost area always follows it directly at byte 8.
pub fn write_header(w: &mut impl Write, first_ifd_offset: u32) -> io::Result<()> {
	w.write_all(b"II")?;
	w.write_u16::<LittleEndian>(42)?;
	w.write_u32::<LittleEndian>(first_ifd_offset)?;
	Ok(())
}

/// The GDAL "ghost area" structural metadata block, immediately following
/// the TIFF header, padded to an even length.
pub fn ghost_area() -> Vec<u8> {
	let body = b"LAYOUT=IFDS_BEFORE_DATA\n\
		BLOCK_LEADER=SIZE_AS_UINT4\n\
		BLOCK_TRAILER=LAST_4_BYTES_REPEATED\n\
		KNOWN_INCOMPATIBLE_EDITION=NO \n";
	let size_line = format!("GDAL_STRUCTURAL_METADATA_SIZE={:06} bytes\n", body.len());
	let mut out = Vec::with_capacity(size_line.len() + body.len() + 1);
	out.extend_from_slice(size_line.as_bytes());
	out.extend_from_slice(body);
	if out.len() % 2 == 1 {
		out.push(0);
	}
	out
}
