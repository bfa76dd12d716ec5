//! External sort over an unbounded stream of [`TileCount`]: spill
//! fixed-size chunks to disk, sorting each on a worker pool sized to the
//! number of CPUs, then hand the spilled runs to [`crate::merger`] for a
//! final k-way merge. Output is still possibly duplicate-keyed — collapsing
//! duplicates is the caller's job.

use crate::merger;
use anyhow::{Context, Result, anyhow};
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tilerank_core::TileCount;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;

/// Records held in memory before a chunk is sorted and spilled. Chosen so
/// a chunk is a few tens of megabytes at the per-record worst case.
pub const DEFAULT_CHUNK_CAPACITY: usize = 500_000;

pub struct ExternalSorter {
	chunk_capacity: usize,
	dir: TempDir,
}

impl ExternalSorter {
	pub fn new(chunk_capacity: usize) -> Result<ExternalSorter> {
		let dir = tempfile::tempdir().context("creating external-sort scratch directory")?;
		Ok(ExternalSorter { chunk_capacity, dir })
	}

	/// Drains `rx` to completion, spilling full chunks to disk as they
	/// fill (sorted concurrently by a pool of `num_cpus::get()` blocking
	/// workers), then k-way merges every spilled chunk and calls `emit`
	/// once per record in `TileCountLess` order.
	pub async fn sort(&self, mut rx: mpsc::Receiver<TileCount>, cancel: CancellationToken, emit: impl FnMut(TileCount) -> Result<()>) -> Result<()> {
		let semaphore = Arc::new(Semaphore::new(num_cpus::get()));
		let mut handles = Vec::new();
		let mut buffer = Vec::with_capacity(self.chunk_capacity);
		let mut next_chunk_id = 0usize;

		loop {
			tokio::select! {
				biased;
				_ = cancel.cancelled() => return Err(tilerank_core::Error::cancelled()),
				received = rx.recv() => match received {
					Some(tc) => {
						buffer.push(tc);
						if buffer.len() >= self.chunk_capacity {
							let chunk = std::mem::replace(&mut buffer, Vec::with_capacity(self.chunk_capacity));
							handles.push(self.spawn_spill(chunk, next_chunk_id, semaphore.clone()));
							next_chunk_id += 1;
						}
					}
					None => break,
				},
			}
		}
		if !buffer.is_empty() {
			handles.push(self.spawn_spill(buffer, next_chunk_id, semaphore));
		}

		let mut chunk_paths = Vec::with_capacity(handles.len());
		for handle in handles {
			let path: PathBuf = handle.await.map_err(|e| anyhow!("sort worker task panicked: {e}"))??;
			chunk_paths.push(path);
		}

		let readers: Vec<_> = chunk_paths
			.iter()
			.map(|p| std::fs::File::open(p).map(std::io::BufReader::new))
			.collect::<std::io::Result<_>>()
			.context("reopening spilled sort chunks for the merge pass")?;
		merger::merge_sorted_sources(readers, &cancel, emit)
	}

	fn spawn_spill(&self, chunk: Vec<TileCount>, id: usize, semaphore: Arc<Semaphore>) -> tokio::task::JoinHandle<Result<PathBuf>> {
		let path = self.dir.path().join(format!("chunk-{id:08}.bin"));
		tokio::spawn(async move {
			let _permit = semaphore.acquire_owned().await.expect("sort-worker semaphore is never closed");
			tokio::task::spawn_blocking(move || -> Result<PathBuf> {
				log::trace!("spilling sort chunk {id} ({} records)", chunk.len());
				let mut chunk = chunk;
				chunk.sort_unstable();
				let mut file = BufWriter::new(std::fs::File::create(&path).with_context(|| format!("creating sort chunk {}", path.display()))?);
				for record in &chunk {
					record.write_to(&mut file)?;
				}
				Ok(path)
			})
			.await
			.map_err(|e| anyhow!("sort worker thread panicked: {e}"))?
		})
	}
}
