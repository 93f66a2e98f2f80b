//! Segment store: opens and creates the fixed-size segment files backing a
//! volume, and reads/writes single blocks at their computed offsets.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::layout::{BLOCK_SIZE, SEGMENT_SIZE};

/// Which family of segment files a block number indexes into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SegmentFamily {
	/// Segments holding inode records.
	Inode,
	/// Segments holding data blocks (and, by reinterpretation, indirect and
	/// directory blocks).
	Data,
}

impl SegmentFamily {
	fn prefix(self) -> &'static str {
		match self {
			Self::Inode => "inode_",
			Self::Data => "data_",
		}
	}
}

/// Owns open file handles for a volume's segment files, keyed by
/// `(family, index)`. Handles are opened lazily and kept open until the
/// store is dropped, bounding the number of `open`/`close` syscalls
/// instead of reopening on every block access.
pub struct SegmentStore {
	base_dir: PathBuf,
	handles: HashMap<(SegmentFamily, u32), File>,
}

impl SegmentStore {
	/// Creates a store rooted at `base_dir`. Does not touch the filesystem.
	pub fn new(base_dir: impl Into<PathBuf>) -> Self {
		Self { base_dir: base_dir.into(), handles: HashMap::new() }
	}

	/// Returns the directory segment files are stored under.
	pub fn base_dir(&self) -> &Path {
		&self.base_dir
	}

	fn segment_path(&self, family: SegmentFamily, idx: u32) -> PathBuf {
		self.base_dir.join(format!("{}{}", family.prefix(), idx))
	}

	/// Returns whether a segment file for `(family, idx)` currently exists
	/// on disk, without opening it.
	pub fn segment_exists(&self, family: SegmentFamily, idx: u32) -> bool {
		self.segment_path(family, idx).is_file()
	}

	/// Returns an open handle to the given segment, creating and
	/// zero-filling it first if `create_if_missing` is set and it does not
	/// yet exist.
	fn get_segment(&mut self, family: SegmentFamily, idx: u32, create_if_missing: bool) -> Result<&mut File> {
		if !self.handles.contains_key(&(family, idx)) {
			let path = self.segment_path(family, idx);
			let existed = path.is_file();
			if !existed && !create_if_missing {
				return Err(Error::NotFound);
			}
			let file = OpenOptions::new().read(true).write(true).create(true).open(&path)?;
			if !existed {
				zero_fill(&file)?;
			}
			self.handles.insert((family, idx), file);
		}
		Ok(self.handles.get_mut(&(family, idx)).unwrap())
	}

	/// Reads the block at local index `offset_block` (0 = the bitmap block,
	/// 1..=255 the item slots) of segment `idx` in `family`.
	pub fn read_block(&mut self, family: SegmentFamily, idx: u32, offset_block: usize, buf: &mut [u8; BLOCK_SIZE]) -> Result<()> {
		let file = self.get_segment(family, idx, false)?;
		file.seek(SeekFrom::Start((offset_block * BLOCK_SIZE) as u64))?;
		file.read_exact(buf).map_err(|_| Error::Corruption(format!(
			"short read at block {offset_block} of segment {idx}"
		)))?;
		Ok(())
	}

	/// Writes the block at local index `offset_block` of segment `idx` in
	/// `family`, creating the segment (zero-filled) first if it is new.
	pub fn write_block(&mut self, family: SegmentFamily, idx: u32, offset_block: usize, buf: &[u8; BLOCK_SIZE]) -> Result<()> {
		let file = self.get_segment(family, idx, true)?;
		file.seek(SeekFrom::Start((offset_block * BLOCK_SIZE) as u64))?;
		file.write_all(buf)?;
		Ok(())
	}
}

fn zero_fill(mut file: &File) -> Result<()> {
	file.set_len(SEGMENT_SIZE)?;
	file.seek(SeekFrom::Start(0))?;
	Ok(())
}

#[cfg(test)]
mod test {
	use super::*;

	fn tmp_dir(tag: &str) -> PathBuf {
		let dir = std::env::temp_dir().join(format!("exfs2-segment-test-{tag}-{:p}", &tag));
		std::fs::create_dir_all(&dir).unwrap();
		dir
	}

	#[test]
	fn creates_zero_filled_segment_of_exact_size() {
		let dir = tmp_dir("create");
		let mut store = SegmentStore::new(&dir);
		let buf = [0u8; BLOCK_SIZE];
		store.write_block(SegmentFamily::Data, 0, 1, &buf).unwrap();
		let meta = std::fs::metadata(dir.join("data_0")).unwrap();
		assert_eq!(meta.len(), SEGMENT_SIZE);
		let _ = std::fs::remove_dir_all(&dir);
	}

	#[test]
	fn round_trips_a_block() {
		let dir = tmp_dir("roundtrip");
		let mut store = SegmentStore::new(&dir);
		let mut buf = [0u8; BLOCK_SIZE];
		buf[0] = 0xAB;
		buf[BLOCK_SIZE - 1] = 0xCD;
		store.write_block(SegmentFamily::Inode, 0, 3, &buf).unwrap();

		let mut out = [0u8; BLOCK_SIZE];
		store.read_block(SegmentFamily::Inode, 0, 3, &mut out).unwrap();
		assert_eq!(out, buf);
		let _ = std::fs::remove_dir_all(&dir);
	}

	#[test]
	fn reading_missing_segment_is_not_found() {
		let dir = tmp_dir("missing");
		let mut store = SegmentStore::new(&dir);
		let mut out = [0u8; BLOCK_SIZE];
		let err = store.read_block(SegmentFamily::Data, 5, 0, &mut out).unwrap_err();
		assert!(matches!(err, Error::NotFound));
		let _ = std::fs::remove_dir_all(&dir);
	}
}
