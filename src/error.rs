//! Error taxonomy shared across the storage engine.

use std::fmt;
use std::io;

/// An error produced by the storage engine.
#[derive(Debug)]
pub enum Error {
	/// A path or directory entry does not exist.
	NotFound,
	/// Attempted to bind a name that is already bound in its parent directory.
	AlreadyExists,
	/// Expected a directory inode but found a regular file.
	NotADirectory,
	/// Expected a regular file inode but found a directory.
	IsADirectory,
	/// The allocator could not grow: creating a new segment was refused by the host.
	OutOfSpace,
	/// The logical offset lies beyond what the inode's indirection depth can address.
	OutOfRange,
	/// An on-disk structure failed an internal consistency check.
	Corruption(String),
	/// A host filesystem call failed.
	Io(io::Error),
	/// A caller-supplied argument is invalid (empty/oversized name, removing `/`, `.`, `..`).
	InvalidArgument(String),
}

/// The result type threaded through every layer of the storage engine.
pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
	fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::NotFound => write!(fmt, "no such file or directory"),
			Self::AlreadyExists => write!(fmt, "already exists"),
			Self::NotADirectory => write!(fmt, "not a directory"),
			Self::IsADirectory => write!(fmt, "is a directory"),
			Self::OutOfSpace => write!(fmt, "out of space"),
			Self::OutOfRange => write!(fmt, "offset out of range"),
			Self::Corruption(msg) => write!(fmt, "corruption: {msg}"),
			Self::Io(e) => write!(fmt, "{e}"),
			Self::InvalidArgument(msg) => write!(fmt, "invalid argument: {msg}"),
		}
	}
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Self {
		Self::Io(e)
	}
}
