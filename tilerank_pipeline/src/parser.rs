//! Per-day log parser: turns `zoom/x/y count` text lines into [`TileCount`]
//! records, clamping anything finer than the deep-zoom cap.

use anyhow::Result;
use lazy_static::lazy_static;
use regex::Regex;
use std::io::BufRead;
use tilerank_core::{Error, MAX_ZOOM, TileCount, TileKey};
use tokio_util::sync::CancellationToken;

/// No tile finer than this ever reaches the sorter; deeper input is
/// projected down to this zoom, summing occupancy by powers of 4.
pub const DEEP_ZOOM_CAP: u8 = 19;

lazy_static! {
	static ref LINE: Regex = Regex::new(r"^(\d+)/(\d+)/(\d+)\s+(\d+)$").unwrap();
}

/// Reads every line of `reader`, emitting one [`TileCount`] per well-formed,
/// non-zero-count line via `emit`. Malformed lines are silently skipped, to
/// stay robust against server-side format drift. Checks `cancel` between
/// lines and returns [`Error::cancelled`] as soon as it fires.
pub fn parse_into(reader: impl BufRead, cancel: &CancellationToken, mut emit: impl FnMut(TileCount) -> Result<()>) -> Result<()> {
	for line in reader.lines() {
		if cancel.is_cancelled() {
			return Err(Error::cancelled());
		}
		let line = match line {
			Ok(line) => line,
			Err(_) => continue,
		};
		if let Some(tc) = parse_line(&line) {
			emit(tc)?;
		}
	}
	Ok(())
}

/// Parses one `zoom/x/y count` line (shared with [`crate::merger`]'s
/// text-source merge, since weekly caches use the same line grammar).
pub(crate) fn parse_line(line: &str) -> Option<TileCount> {
	let caps = LINE.captures(line)?;
	let zoom: u32 = caps[1].parse().ok()?;
	let mut x: u64 = caps[2].parse().ok()?;
	let mut y: u64 = caps[3].parse().ok()?;
	let mut count: u64 = caps[4].parse().ok()?;
	let mut zoom = u8::try_from(zoom).ok()?;

	if zoom > DEEP_ZOOM_CAP {
		let shift = zoom - DEEP_ZOOM_CAP;
		x >>= shift;
		y >>= shift;
		count >>= 2 * shift as u32;
		zoom = DEEP_ZOOM_CAP;
	}
	if zoom > MAX_ZOOM || x > u32::MAX as u64 || y > u32::MAX as u64 {
		return None;
	}
	if count == 0 {
		return None;
	}
	Some(TileCount::new(TileKey::new(zoom, x as u32, y as u32), count))
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use std::io::Cursor;

	fn parse_all(text: &str) -> Vec<TileCount> {
		let mut out = Vec::new();
		parse_into(Cursor::new(text), &CancellationToken::new(), |tc| {
			out.push(tc);
			Ok(())
		})
		.unwrap();
		out
	}

	#[test]
	fn parses_well_formed_lines() {
		let out = parse_all("3/1/1 3\n18/137341/91897 1\n");
		assert_eq!(out, vec![
			TileCount::new(TileKey::new(3, 1, 1), 3),
			TileCount::new(TileKey::new(18, 137341, 91897), 1),
		]);
	}

	#[rstest]
	#[case("not a line\n")]
	#[case("3/1/1 0\n")]
	#[case("3/1/1 abc\n")]
	#[case("\n")]
	#[case("3/1/1\n")]
	fn skips_one_malformed_or_zero_count_line(#[case] line: &str) {
		assert!(parse_all(line).is_empty(), "line {line:?} should have been skipped");
	}

	#[test]
	fn skips_malformed_and_zero_count_lines_mixed_with_good_ones() {
		let out = parse_all("not a line\n3/1/1 0\n3/1/1 abc\n\n3/1/1 5\n");
		assert_eq!(out, vec![TileCount::new(TileKey::new(3, 1, 1), 5)]);
	}

	#[test]
	fn clamps_deep_zoom_to_19() {
		// zoom 21 is 2 levels past the cap: x,y >>= 2, count >>= 4.
		let out = parse_all("21/400/404 160\n");
		assert_eq!(out, vec![TileCount::new(TileKey::new(19, 100, 101), 10)]);
	}

	#[test]
	fn deep_zoom_clamp_can_round_count_to_zero_and_drop_the_line() {
		let out = parse_all("21/0/0 3\n");
		assert!(out.is_empty());
	}

	/// Exactly at the cap, zoom-19 input passes through unclamped, even
	/// though the configured deepest output zoom is 18: the record lands one
	/// level finer than the output's own grid and is folded in as a
	/// sub-pixel contribution by `Raster::paint`, not by anything in this
	/// parser.
	#[test]
	fn zoom_19_input_passes_through_unclamped_for_an_18_deep_output() {
		let out = parse_all("19/274682/183794 4\n");
		assert_eq!(out, vec![TileCount::new(TileKey::new(19, 274682, 183794), 4)]);
	}

	#[test]
	fn cancellation_stops_mid_stream() {
		let cancel = CancellationToken::new();
		cancel.cancel();
		let mut out = Vec::new();
		let err = parse_into(Cursor::new("3/1/1 1\n"), &cancel, |tc| {
			out.push(tc);
			Ok(())
		})
		.unwrap_err();
		assert!(Error::is_cancelled(&err));
		assert!(out.is_empty());
	}
}
