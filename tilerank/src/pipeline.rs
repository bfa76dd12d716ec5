//! Top-level orchestration: wires the directory listing, the weekly
//! aggregator, the k-way merger, the painter and the COG writer into two
//! cooperating tasks — one merging and grouping, the other painting and
//! writing — connected by a bounded channel of capacity 100,000
//! `TileCount`s.

use crate::fetch::HttpFetcher;
use crate::iso_week::IsoWeek;
use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use std::io::BufRead;
use tilerank_cog::RasterWriter;
use tilerank_core::{Config, TileCount};
use tilerank_pipeline::{DEFAULT_CHUNK_CAPACITY, DayFetcher, ExternalSorter, Painter, merge_text_sources};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Channel capacity between the merge/group task and the paint/write task.
const MERGE_CHANNEL_CAPACITY: usize = 100_000;

/// Runs one full TileRank build against the real OpenStreetMap tile-log
/// archive: lists available weeks, keeps the most recent `config.max_weeks`,
/// then delegates to [`run_with`].
pub async fn run(config: &Config, cancel: CancellationToken) -> Result<()> {
	let fetcher = HttpFetcher::new()?;
	let weeks = select_weeks(&fetcher, config.max_weeks, &cancel).await?;
	run_with(config, &fetcher, weeks, cancel).await
}

/// The same build, parameterized over the fetcher and the already-selected
/// week list, so tests can substitute an in-process fixture [`DayFetcher`]
/// and a fixed set of weeks instead of a live network + directory listing.
pub async fn run_with(config: &Config, fetcher: &impl DayFetcher, weeks: Vec<IsoWeek>, cancel: CancellationToken) -> Result<()> {
	log::info!("aggregating {} weeks, deepest zoom {}", weeks.len(), config.deepest_zoom);

	let readers = build_weekly_readers(&weeks, config, fetcher, &cancel).await?;
	let num_weeks = weeks.len() as u64;

	let (tx, rx) = mpsc::channel::<TileCount>(MERGE_CHANNEL_CAPACITY);
	let merge_cancel = cancel.clone();
	let merge_task = tokio::task::spawn_blocking(move || -> Result<()> {
		merge_text_sources(readers, &merge_cancel, |tc| tx.blocking_send(tc).map_err(|_| tilerank_core::Error::cancelled()))
	});

	let cache_dir = config.cache_dir.clone();
	let raster_zoom = config.raster_zoom();
	let deepest_zoom = config.deepest_zoom;
	let output_path = config.output_path.clone();
	let paint_cancel = cancel.clone();
	let paint_task = tokio::task::spawn_blocking(move || -> Result<()> {
		let mut writer = RasterWriter::create(&cache_dir, raster_zoom)?;
		let mut painter = Painter::new(num_weeks, deepest_zoom, paint_cancel, |raster| writer.write(raster));
		let mut rx = rx;
		while let Some(tc) = rx.blocking_recv() {
			painter.feed(tc)?;
		}
		painter.close()?;
		writer.close(&output_path)
	});

	let merge_result = merge_task.await.context("merge task panicked");
	let paint_result = paint_task.await.context("paint task panicked");
	// Surface whichever side failed first; if both did, the merge side's
	// error is almost always the root cause (the paint side's is usually
	// just `Cancelled`, propagated once the channel closed early).
	merge_result??;
	paint_result??;
	Ok(())
}

/// Fetches the directory listing and keeps the most recent `max_weeks`
/// complete weeks, oldest first (the order the merge stage doesn't care
/// about, but that reads naturally in logs).
async fn select_weeks(fetcher: &HttpFetcher, max_weeks: u32, cancel: &CancellationToken) -> Result<Vec<IsoWeek>> {
	if cancel.is_cancelled() {
		return Err(tilerank_core::Error::cancelled());
	}
	let mut weeks = fetcher.list_available_weeks().await?;
	weeks.sort();
	let keep_from = weeks.len().saturating_sub(max_weeks as usize);
	Ok(weeks.split_off(keep_from))
}

/// Builds (or reuses) each week's Brotli cache concurrently, bounded to the
/// CPU count via `buffer_unordered(num_cpus::get())`.
async fn build_weekly_readers(weeks: &[IsoWeek], config: &Config, fetcher: &(impl DayFetcher + ?Sized), cancel: &CancellationToken) -> Result<Vec<Box<dyn BufRead + Send>>> {
	let results = stream::iter(weeks.iter().copied())
		.map(|week| async move {
			let days = week.day_strings()?;
			let cache_path = config.weekly_cache_path(&week.to_string());
			let sorter = ExternalSorter::new(DEFAULT_CHUNK_CAPACITY)?;
			tilerank_pipeline::weekly_tilecounts(&days, &cache_path, fetcher, &sorter, cancel)
				.await
				.with_context(|| format!("aggregating week {week}"))
		})
		.buffer_unordered(num_cpus::get())
		.collect::<Vec<_>>()
		.await;

	results.into_iter().collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use std::collections::HashMap;
	use std::io::Cursor;
	use std::sync::Mutex;
	use tilerank_core::Config;

	struct FixtureFetcher(Mutex<HashMap<String, String>>);

	#[async_trait]
	impl DayFetcher for FixtureFetcher {
		async fn fetch(&self, day: &str) -> Result<Box<dyn BufRead + Send>> {
			let text = self.0.lock().unwrap().get(day).cloned().unwrap_or_default();
			Ok(Box::new(Cursor::new(text.into_bytes())))
		}
	}

	/// One week's worth of input carrying a shallow tile and a deep tile,
	/// `numWeeks=1`, deepest zoom 11, run through the whole wired pipeline
	/// end to end.
	#[tokio::test]
	async fn single_tile_deep_produces_a_valid_cog() {
		let dir = tempfile::tempdir().unwrap();
		let mut config = Config::new(dir.path());
		config.deepest_zoom = 11;
		config.max_weeks = 1;

		let mut days = HashMap::new();
		days.insert("2024-01-01".to_string(), "3/1/1 3\n18/137341/91897 1\n".to_string());
		let fetcher = FixtureFetcher(Mutex::new(days));
		let week = IsoWeek { year: 2024, week: 1 };

		run_with(&config, &fetcher, vec![week], CancellationToken::new()).await.unwrap();

		let bytes = std::fs::read(&config.output_path).unwrap();
		assert_eq!(&bytes[0..4], &[b'I', b'I', 42, 0]);
		assert_eq!(bytes.len() % 2, 0, "every IFD boundary must be even-aligned");
	}

	/// The same tile key appearing in two distinct weeks is not an overflow:
	/// each week contributes at most one record toward a tile's occurrence
	/// count, so two weeks both reporting the same deep tile must paint
	/// without error. The genuine "more than numWeeks occurrences" error is
	/// inherently a single-group property and is covered by
	/// `tilerank_pipeline::painter`'s own unit test.
	#[tokio::test]
	async fn two_weeks_reporting_the_same_tile_sum_without_overflow() {
		let dir = tempfile::tempdir().unwrap();
		let mut config = Config::new(dir.path());
		config.deepest_zoom = 10;
		config.max_weeks = 2;

		let mut days = HashMap::new();
		days.insert("2024-01-01".to_string(), "4/2/1 2\n".to_string());
		days.insert("2024-01-08".to_string(), "4/2/1 3\n".to_string());
		let fetcher = FixtureFetcher(Mutex::new(days));
		let weeks = vec![IsoWeek { year: 2024, week: 1 }, IsoWeek { year: 2024, week: 2 }];

		run_with(&config, &fetcher, weeks, CancellationToken::new()).await.unwrap();
		assert!(config.output_path.exists());
	}
}
