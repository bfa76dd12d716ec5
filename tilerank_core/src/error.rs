//! Typed error identity for the cases the pipeline needs to recognize by
//! kind (overflow, cancellation), layered on top of `anyhow` the way the
//! rest of the crate reports errors: most functions return
//! `anyhow::Result<T>`, and call sites that care about *which* failure
//! happened downcast via [`Error`].

use std::fmt;

pub type Result<T> = anyhow::Result<T>;

/// Identity for the error kinds callers (the CLI's exit path, and tests)
/// need to distinguish from a generic I/O or parse failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
	/// Fetching a directory listing or a per-day log failed.
	Fetch(String),
	/// Malformed HTML or an input byte stream that failed outside the
	/// per-line skip rule (e.g. the directory listing regex found nothing).
	Parse(String),
	/// The external sorter failed (spill I/O, comparator panic, ...).
	Sort(String),
	/// A tile appeared more than `numWeeks` times, or a computed file
	/// offset exceeded 2^32 - 1.
	Overflow(String),
	/// Temp file, output file or rename failure.
	Io(String),
	/// The shared cancellation token was triggered by a sibling stage.
	Cancelled,
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Error::Fetch(msg) => write!(f, "{msg}"),
			Error::Parse(msg) => write!(f, "{msg}"),
			Error::Sort(msg) => write!(f, "{msg}"),
			Error::Overflow(msg) => write!(f, "{msg}"),
			Error::Io(msg) => write!(f, "{msg}"),
			Error::Cancelled => write!(f, "cancelled"),
		}
	}
}

impl std::error::Error for Error {}

impl Error {
	pub fn fetch(msg: impl Into<String>) -> anyhow::Error {
		anyhow::Error::new(Error::Fetch(msg.into()))
	}
	pub fn parse(msg: impl Into<String>) -> anyhow::Error {
		anyhow::Error::new(Error::Parse(msg.into()))
	}
	pub fn sort(msg: impl Into<String>) -> anyhow::Error {
		anyhow::Error::new(Error::Sort(msg.into()))
	}
	pub fn overflow(msg: impl Into<String>) -> anyhow::Error {
		anyhow::Error::new(Error::Overflow(msg.into()))
	}
	pub fn io(msg: impl Into<String>) -> anyhow::Error {
		anyhow::Error::new(Error::Io(msg.into()))
	}
	pub fn cancelled() -> anyhow::Error {
		anyhow::Error::new(Error::Cancelled)
	}

	/// True if `err` (or one of its causes) is a [`Error::Cancelled`].
	pub fn is_cancelled(err: &anyhow::Error) -> bool {
		matches!(err.downcast_ref::<Error>(), Some(Error::Cancelled))
	}
}
