//! K-way merge of sorted [`TileCount`] sources into one globally sorted
//! stream. Used both for the top-level merge of weekly caches and,
//! internally, by [`crate::sorter`] to merge its spilled chunk files — both
//! are "N sorted sources, merge by `TileCountLess`, drop nothing", they just
//! disagree on wire format: spilled chunks are the binary varint encoding,
//! weekly caches are the `zoom/x/y count\n` text grammar.

use crate::parser;
use anyhow::Result;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::io::{BufRead, Read};
use tilerank_core::{Error, TileCount};
use tokio_util::sync::CancellationToken;

struct HeadRecord {
	record: TileCount,
	source: usize,
}

impl PartialEq for HeadRecord {
	fn eq(&self, other: &Self) -> bool {
		self.cmp(other) == Ordering::Equal
	}
}
impl Eq for HeadRecord {}

impl PartialOrd for HeadRecord {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for HeadRecord {
	/// Orders by `TileCountLess` first, then by source index, so that
	/// records tying on key and count still come out in a deterministic,
	/// reproducible order.
	fn cmp(&self, other: &Self) -> Ordering {
		self.record.cmp(&other.record).then(self.source.cmp(&other.source))
	}
}

/// Merges `sources` (each already sorted by `TileCountLess`) into one
/// globally sorted sequence, calling `emit` once per record from every
/// source. Duplicate keys across sources are never dropped — collapsing
/// them, where wanted, is left to the caller.
pub fn merge_sorted_sources<R: Read>(sources: Vec<R>, cancel: &CancellationToken, emit: impl FnMut(TileCount) -> Result<()>) -> Result<()> {
	merge_heads(sources, cancel, |r| TileCount::read_from(r), emit)
}

/// Merges `sources` of the weekly cache's `zoom/x/y count\n` text grammar
/// instead of the binary varint encoding — the top-level merge across a
/// week's worth of cached sources.
pub fn merge_text_sources<R: BufRead>(sources: Vec<R>, cancel: &CancellationToken, emit: impl FnMut(TileCount) -> Result<()>) -> Result<()> {
	merge_heads(sources, cancel, |r| read_next_line(r), emit)
}

fn read_next_line<R: BufRead>(reader: &mut R) -> Result<Option<TileCount>> {
	let mut line = String::new();
	loop {
		line.clear();
		if reader.read_line(&mut line)? == 0 {
			return Ok(None);
		}
		let trimmed = line.trim_end_matches(['\n', '\r']);
		if let Some(tc) = parser::parse_line(trimmed) {
			return Ok(Some(tc));
		}
	}
}

/// Shared heap-merge core: reads one head record per source up front, then
/// repeatedly emits the smallest head and refills it from the same source,
/// independent of how a single record is actually decoded off the wire.
fn merge_heads<S>(mut sources: Vec<S>, cancel: &CancellationToken, mut read_next: impl FnMut(&mut S) -> Result<Option<TileCount>>, mut emit: impl FnMut(TileCount) -> Result<()>) -> Result<()> {
	let mut heap = BinaryHeap::with_capacity(sources.len());
	for (source, reader) in sources.iter_mut().enumerate() {
		if let Some(record) = read_next(reader)? {
			heap.push(Reverse(HeadRecord { record, source }));
		}
	}

	while let Some(Reverse(head)) = heap.pop() {
		if cancel.is_cancelled() {
			return Err(Error::cancelled());
		}
		emit(head.record)?;
		if let Some(record) = read_next(&mut sources[head.source])? {
			heap.push(Reverse(HeadRecord { record, source: head.source }));
		}
	}
	Ok(())
}
