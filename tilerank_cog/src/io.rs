//! A small two-pass file writer: append sequentially, and patch an
//! already-written position later once a value becomes known. This is how
//! the COG writer fills in tile offsets it can't know until every tile's
//! final byte position has been written.

use anyhow::Result;
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

pub struct TwoPassWriter {
	file: BufWriter<File>,
	len: u64,
}

impl TwoPassWriter {
	pub fn create(path: &Path) -> Result<TwoPassWriter> {
		Ok(TwoPassWriter {
			file: BufWriter::new(File::create(path)?),
			len: 0,
		})
	}

	/// Appends `bytes` at the current end of the file, returning the
	/// absolute position it was written at.
	pub fn append(&mut self, bytes: &[u8]) -> Result<u64> {
		let pos = self.len;
		self.file.write_all(bytes)?;
		self.len += bytes.len() as u64;
		Ok(pos)
	}

	pub fn position(&self) -> u64 {
		self.len
	}

	/// Overwrites `bytes` at an already-written absolute position, then
	/// returns the writer to the end of the file so subsequent `append`
	/// calls keep extending it.
	pub fn patch(&mut self, pos: u64, bytes: &[u8]) -> Result<()> {
		self.file.seek(SeekFrom::Start(pos))?;
		self.file.write_all(bytes)?;
		self.file.seek(SeekFrom::Start(self.len))?;
		Ok(())
	}

	pub fn finish(mut self) -> Result<()> {
		self.file.flush()?;
		Ok(())
	}
}
