//! Weekly aggregator: turns seven per-day byte streams into one sorted,
//! deduplicated weekly `TileCount` stream, cached on disk as
//! Brotli-compressed `zoom/x/y count` lines so a week is only ever fetched
//! and sorted once.
//!
//! Fetching and decompressing each day's raw log is an external
//! collaborator: this module only knows how to ask a [`DayFetcher`] for a
//! reader per calendar day, named as a plain `"YYYY-MM-DD"` string — ISO
//! week-to-date arithmetic lives in the binary crate, which passes the
//! seven already-resolved day strings in.

use crate::{parser, sorter::ExternalSorter};
use anyhow::{Context, Result};
use async_trait::async_trait;
use brotli::enc::BrotliEncoderParams;
use brotli::{BrotliCompress, BrotliDecompress};
use std::io::{BufRead, Cursor, Write};
use std::path::Path;
use tilerank_core::{Error, TileCount, TileKey};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Bounded queue between the seven per-day parse tasks and the external
/// sorter (mirrors the top-level merge/paint channel's capacity choice,
/// scaled down since a week's unsorted backlog is much smaller).
const DAY_CHANNEL_CAPACITY: usize = 10_000;

/// Brotli quality for the weekly cache.
const BROTLI_QUALITY: i32 = 9;
const BROTLI_LG_WINDOW: i32 = 22;

/// Supplies the decompressed per-day log for one calendar day. Implemented
/// by the binary crate over HTTP; tests use an in-memory fixture.
#[async_trait]
pub trait DayFetcher: Send + Sync {
	async fn fetch(&self, day: &str) -> Result<Box<dyn BufRead + Send>>;
}

/// Returns a reader over the week's sorted, deduplicated `zoom/x/y count\n`
/// lines, building and caching it first if `cache_path` does not already
/// exist. If the cache already exists, the entire fetch+sort pipeline is
/// skipped and a reader over the cached file is returned directly.
pub async fn weekly_tilecounts(days: &[String; 7], cache_path: &Path, fetcher: &dyn DayFetcher, sorter: &ExternalSorter, cancel: &CancellationToken) -> Result<Box<dyn BufRead + Send>> {
	if cache_path.exists() {
		log::trace!("reusing cached weekly tile log {}", cache_path.display());
		return open_cached(cache_path);
	}
	log::trace!("building weekly tile log {}", cache_path.display());
	build_weekly_cache(days, cache_path, fetcher, sorter, cancel).await?;
	open_cached(cache_path)
}

fn open_cached(path: &Path) -> Result<Box<dyn BufRead + Send>> {
	let compressed = std::fs::read(path).with_context(|| format!("reading weekly cache {}", path.display()))?;
	let mut plain = Vec::new();
	BrotliDecompress(&mut Cursor::new(compressed), &mut plain).with_context(|| format!("decompressing weekly cache {}", path.display()))?;
	Ok(Box::new(Cursor::new(plain)))
}

async fn build_weekly_cache(days: &[String; 7], cache_path: &Path, fetcher: &dyn DayFetcher, sorter: &ExternalSorter, cancel: &CancellationToken) -> Result<()> {
	let (tx, rx) = mpsc::channel::<TileCount>(DAY_CHANNEL_CAPACITY);

	// All seven days fetch and parse concurrently, each feeding the same
	// sorter input channel.
	let day_futures: Vec<_> = days
		.iter()
		.map(|day| {
			let tx = tx.clone();
			let cancel = cancel.clone();
			async move {
				let reader = fetcher.fetch(day).await.with_context(|| format!("fetching tile log for {day}"))?;
				tokio::task::spawn_blocking(move || parser::parse_into(reader, &cancel, |tc| tx.blocking_send(tc).map_err(|_| Error::cancelled())))
					.await
					.context("per-day parser task panicked")?
			}
		})
		.collect();
	drop(tx);

	// The day tasks feed `rx` through a channel bounded well below a week's
	// worth of log lines, so they must be polled concurrently with the sort
	// that drains it — awaiting them to completion first would deadlock the
	// moment the channel fills.
	let days_joined = async {
		futures::future::try_join_all(day_futures).await?;
		Ok::<(), anyhow::Error>(())
	};

	let mut plain = Vec::new();
	let mut pending: Option<(TileKey, u64)> = None;
	let sorted = sorter.sort(rx, cancel.clone(), |tc| {
		match &mut pending {
			Some((key, sum)) if *key == tc.key => *sum += tc.count,
			_ => {
				flush_group(&mut plain, pending.take());
				pending = Some((tc.key, tc.count));
			}
		}
		Ok(())
	});

	// Left un-contexted so a cancellation error from either side stays downcastable.
	tokio::try_join!(days_joined, sorted)?;
	flush_group(&mut plain, pending.take());

	let params = BrotliEncoderParams { quality: BROTLI_QUALITY, lgwin: BROTLI_LG_WINDOW, size_hint: plain.len(), ..Default::default() };
	let mut compressed = Vec::new();
	BrotliCompress(&mut Cursor::new(&plain), &mut compressed, &params).context("compressing weekly tile log")?;

	let tmp_path = cache_path.with_extension("br.tmp");
	if let Some(parent) = tmp_path.parent() {
		std::fs::create_dir_all(parent).with_context(|| format!("creating cache directory {}", parent.display()))?;
	}
	let mut tmp_file = std::fs::File::create(&tmp_path).with_context(|| format!("creating {}", tmp_path.display()))?;
	tmp_file.write_all(&compressed).with_context(|| format!("writing {}", tmp_path.display()))?;
	tmp_file.sync_all().with_context(|| format!("fsyncing {}", tmp_path.display()))?;
	std::fs::rename(&tmp_path, cache_path).with_context(|| format!("renaming {} to {}", tmp_path.display(), cache_path.display()))?;
	Ok(())
}

fn flush_group(plain: &mut Vec<u8>, group: Option<(TileKey, u64)>) {
	if let Some((key, sum)) = group {
		if sum > 0 {
			plain.extend_from_slice(TileCount::new(key, sum).to_line().as_bytes());
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;
	use std::io::{Cursor, Read};
	use std::sync::Mutex;

	struct FixtureFetcher(Mutex<HashMap<String, String>>);

	#[async_trait]
	impl DayFetcher for FixtureFetcher {
		async fn fetch(&self, day: &str) -> Result<Box<dyn BufRead + Send>> {
			let text = self.0.lock().unwrap().get(day).cloned().unwrap_or_default();
			Ok(Box::new(Cursor::new(text.into_bytes())))
		}
	}

	fn week_days() -> [String; 7] {
		(1..=7).map(|d| format!("2024-01-0{d}")).collect::<Vec<_>>().try_into().unwrap()
	}

	#[tokio::test]
	async fn builds_sums_and_caches_a_week_then_reuses_it() {
		let dir = tempfile::tempdir().unwrap();
		let cache_path = dir.path().join("tilelogs-2024-W01.br");
		let mut days = HashMap::new();
		days.insert("2024-01-01".to_string(), "3/1/1 5\n3/1/1 2\n".to_string());
		days.insert("2024-01-03".to_string(), "3/1/1 1\n18/0/0 9\n".to_string());
		let fetcher = FixtureFetcher(Mutex::new(days));
		let sorter = ExternalSorter::new(1000).unwrap();

		let mut reader = weekly_tilecounts(&week_days(), &cache_path, &fetcher, &sorter, &CancellationToken::new()).await.unwrap();
		assert!(cache_path.exists());
		let mut out = String::new();
		reader.read_to_string(&mut out).unwrap();
		// (18,0,0) is the all-zero-path descendant of the same zoom-2 ancestor
		// (3,1,1) shares, and sorts first among that ancestor's four zoom-3
		// children in pre-order, so it comes first in the collapsed output.
		assert_eq!(out, "18/0/0 9\n3/1/1 8\n");

		// A second call with a fetcher that would error if invoked must still
		// succeed, by reading straight from the cache.
		struct PanicFetcher;
		#[async_trait]
		impl DayFetcher for PanicFetcher {
			async fn fetch(&self, _day: &str) -> Result<Box<dyn BufRead + Send>> {
				panic!("must not be called when the cache already exists");
			}
		}
		let mut reader = weekly_tilecounts(&week_days(), &cache_path, &PanicFetcher, &sorter, &CancellationToken::new()).await.unwrap();
		let mut out = String::new();
		reader.read_to_string(&mut out).unwrap();
		assert_eq!(out, "18/0/0 9\n3/1/1 8\n");
	}

	#[tokio::test]
	async fn zero_sum_groups_are_dropped() {
		let dir = tempfile::tempdir().unwrap();
		let cache_path = dir.path().join("tilelogs-2024-W02.br");
		let mut days = HashMap::new();
		// parser already drops zero-count lines, so simulate a cancel-free
		// dedupe path where per-day counts still sum to zero is impossible
		// with u64 counts; instead verify an entirely empty week produces an
		// empty, still-valid cache.
		days.insert("2024-01-01".to_string(), String::new());
		let fetcher = FixtureFetcher(Mutex::new(days));
		let sorter = ExternalSorter::new(1000).unwrap();

		let mut reader = weekly_tilecounts(&week_days(), &cache_path, &fetcher, &sorter, &CancellationToken::new()).await.unwrap();
		let mut out = String::new();
		reader.read_to_string(&mut out).unwrap();
		assert!(out.is_empty());
	}

	#[tokio::test]
	async fn cancellation_propagates_from_the_sort_stage() {
		let dir = tempfile::tempdir().unwrap();
		let cache_path = dir.path().join("tilelogs-2024-W03.br");
		let mut days = HashMap::new();
		days.insert("2024-01-01".to_string(), "3/1/1 1\n".to_string());
		let fetcher = FixtureFetcher(Mutex::new(days));
		let sorter = ExternalSorter::new(1000).unwrap();
		let cancel = CancellationToken::new();
		cancel.cancel();

		let err = weekly_tilecounts(&week_days(), &cache_path, &fetcher, &sorter, &cancel).await.unwrap_err();
		assert!(!cache_path.exists());
		assert!(tilerank_core::Error::is_cancelled(&err));
	}
}
