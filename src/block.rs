//! Typed views over a raw block buffer.
//!
//! Rather than reinterpreting a `[u8; BLOCK_SIZE]` buffer as a struct
//! through a raw pointer cast, every on-disk array block gets a narrow
//! codec: a `parse` constructor that validates the buffer and produces a
//! typed view, and an `encode` method that writes it back out. Mutation
//! goes through setters on the typed view; the caller re-encodes
//! explicitly before writing the block to disk.

use crate::error::{Error, Result};
use crate::layout::{BLOCK_SIZE, DIRENT_SIZE, ENTRIES_PER_DIR_BLOCK, MAX_FILENAME_LEN, PTRS_PER_INDIRECT_BLOCK};

/// A block interpreted as a flat array of block-number pointers.
#[derive(Clone)]
pub struct IndirectBlock {
	ptrs: [u32; PTRS_PER_INDIRECT_BLOCK],
}

impl IndirectBlock {
	/// Returns a new, all-zero indirect block.
	pub fn empty() -> Self {
		Self { ptrs: [0; PTRS_PER_INDIRECT_BLOCK] }
	}

	/// Parses a raw block buffer into an indirect block view.
	pub fn parse(buf: &[u8; BLOCK_SIZE]) -> Self {
		let mut ptrs = [0u32; PTRS_PER_INDIRECT_BLOCK];
		for (i, slot) in ptrs.iter_mut().enumerate() {
			let off = i * 4;
			*slot = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
		}
		Self { ptrs }
	}

	/// Re-encodes this view into a raw block buffer.
	pub fn encode(&self) -> [u8; BLOCK_SIZE] {
		let mut buf = [0u8; BLOCK_SIZE];
		for (i, ptr) in self.ptrs.iter().enumerate() {
			let off = i * 4;
			buf[off..off + 4].copy_from_slice(&ptr.to_le_bytes());
		}
		buf
	}

	/// Returns the block number stored at slot `i`, or `0` if unallocated.
	pub fn get(&self, i: usize) -> u32 {
		self.ptrs[i]
	}

	/// Sets the block number stored at slot `i`.
	pub fn set(&mut self, i: usize, block: u32) {
		self.ptrs[i] = block;
	}
}

/// A single directory entry: an inode number and a NUL-terminated name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirEntry {
	/// The inode the entry refers to; `0` marks a free (tombstone) slot.
	pub inode_num: u32,
	name: [u8; MAX_FILENAME_LEN + 1],
}

impl DirEntry {
	/// Returns a free (tombstone) entry.
	pub fn free() -> Self {
		Self { inode_num: 0, name: [0; MAX_FILENAME_LEN + 1] }
	}

	/// Builds an occupied entry for `name` pointing at `inode_num`.
	///
	/// Returns [`Error::InvalidArgument`] if `name` is empty or longer than
	/// [`MAX_FILENAME_LEN`] bytes.
	pub fn new(name: &str, inode_num: u32) -> Result<Self> {
		let bytes = name.as_bytes();
		if bytes.is_empty() || bytes.len() > MAX_FILENAME_LEN {
			return Err(Error::InvalidArgument(format!("invalid entry name {name:?}")));
		}
		let mut buf = [0u8; MAX_FILENAME_LEN + 1];
		buf[..bytes.len()].copy_from_slice(bytes);
		Ok(Self { inode_num, name: buf })
	}

	/// Whether this slot is a tombstone (unused).
	pub fn is_free(&self) -> bool {
		self.inode_num == 0
	}

	/// Returns the entry's name, lossily decoded as UTF-8.
	pub fn name(&self) -> String {
		let nul = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
		String::from_utf8_lossy(&self.name[..nul]).into_owned()
	}

	fn parse(buf: &[u8]) -> Self {
		let inode_num = u32::from_le_bytes(buf[0..4].try_into().unwrap());
		let mut name = [0u8; MAX_FILENAME_LEN + 1];
		name.copy_from_slice(&buf[4..4 + MAX_FILENAME_LEN + 1]);
		Self { inode_num, name }
	}

	fn encode_into(&self, buf: &mut [u8]) {
		buf[0..4].copy_from_slice(&self.inode_num.to_le_bytes());
		buf[4..4 + MAX_FILENAME_LEN + 1].copy_from_slice(&self.name);
	}
}

/// A block interpreted as a dense array of fixed-size directory entries.
#[derive(Clone)]
pub struct DirBlock {
	entries: [DirEntry; ENTRIES_PER_DIR_BLOCK],
}

impl DirBlock {
	/// Returns a new directory block with every slot free.
	pub fn empty() -> Self {
		Self { entries: [DirEntry::free(); ENTRIES_PER_DIR_BLOCK] }
	}

	/// Parses a raw block buffer into a directory block view.
	pub fn parse(buf: &[u8; BLOCK_SIZE]) -> Self {
		let mut entries = [DirEntry::free(); ENTRIES_PER_DIR_BLOCK];
		for (i, slot) in entries.iter_mut().enumerate() {
			let off = i * DIRENT_SIZE;
			*slot = DirEntry::parse(&buf[off..off + DIRENT_SIZE]);
		}
		Self { entries }
	}

	/// Re-encodes this view into a raw block buffer.
	pub fn encode(&self) -> [u8; BLOCK_SIZE] {
		let mut buf = [0u8; BLOCK_SIZE];
		for (i, entry) in self.entries.iter().enumerate() {
			let off = i * DIRENT_SIZE;
			entry.encode_into(&mut buf[off..off + DIRENT_SIZE]);
		}
		buf
	}

	/// Returns the entry at slot `i`.
	pub fn get(&self, i: usize) -> &DirEntry {
		&self.entries[i]
	}

	/// Sets the entry at slot `i`.
	pub fn set(&mut self, i: usize, entry: DirEntry) {
		self.entries[i] = entry;
	}

	/// Iterates over every slot in this block, in order.
	pub fn iter(&self) -> impl Iterator<Item = &DirEntry> {
		self.entries.iter()
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn indirect_block_round_trip() {
		let mut blk = IndirectBlock::empty();
		blk.set(0, 42);
		blk.set(1023, 7);
		let encoded = blk.encode();
		let parsed = IndirectBlock::parse(&encoded);
		assert_eq!(parsed.get(0), 42);
		assert_eq!(parsed.get(1023), 7);
		assert_eq!(parsed.get(1), 0);
	}

	#[test]
	fn dir_entry_name_round_trip() {
		let e = DirEntry::new("greet", 5).unwrap();
		assert_eq!(e.name(), "greet");
		assert!(!e.is_free());
		assert!(DirEntry::free().is_free());
	}

	#[test]
	fn dir_entry_rejects_oversized_name() {
		let long = "a".repeat(MAX_FILENAME_LEN + 1);
		assert!(DirEntry::new(&long, 1).is_err());
		assert!(DirEntry::new("", 1).is_err());
	}

	#[test]
	fn dir_block_round_trip() {
		let mut blk = DirBlock::empty();
		blk.set(0, DirEntry::new(".", 3).unwrap());
		blk.set(1, DirEntry::new("..", 2).unwrap());
		let encoded = blk.encode();
		let parsed = DirBlock::parse(&encoded);
		assert_eq!(parsed.get(0).name(), ".");
		assert_eq!(parsed.get(1).name(), "..");
		assert!(parsed.get(2).is_free());
	}
}
