//! Owns everything needed to operate on one ExFS2 volume: its segment
//! store, the two bitmap allocators, and the highest segment index seen so
//! far for each family. Replaces what the source kept as process-global
//! mutable counters with a value the caller constructs once and threads
//! through every operation.

use std::path::{Path, PathBuf};

use crate::bitmap::Bitmap;
use crate::block::{DirBlock, DirEntry};
use crate::error::Result;
use crate::inode::{InodeRecord, InodeTable, Mode};
use crate::layout::{DIRENT_SIZE, ROOT_DATA_BLOCK, ROOT_INODE};
use crate::segment::{SegmentFamily, SegmentStore};

/// A single ExFS2 volume rooted at a directory of segment files.
pub struct Volume {
	base_dir: PathBuf,
	store: SegmentStore,
	inode_bitmap: Bitmap,
	data_bitmap: Bitmap,
	max_inode_seg: u32,
	max_data_seg: u32,
}

impl Volume {
	/// Opens (bootstrapping if necessary) the volume rooted at `base_dir`.
	///
	/// Scans for existing `inode_NN`/`data_NN` segment files to compute the
	/// current maximum segment index per family. If inode segment 0 or data
	/// segment 0 is missing, performs full initialization: creates both,
	/// marks bit 0 of each bitmap, and writes the root directory inode with
	/// its `.`/`..` self-referential first data block. Running this on an
	/// already-initialized volume is a no-op.
	pub fn open(base_dir: impl AsRef<Path>) -> Result<Self> {
		let base_dir = base_dir.as_ref().to_path_buf();
		std::fs::create_dir_all(&base_dir)?;

		let max_inode_seg = scan_max_segment(&base_dir, SegmentFamily::Inode);
		let max_data_seg = scan_max_segment(&base_dir, SegmentFamily::Data);

		let mut store = SegmentStore::new(&base_dir);
		let inode_bitmap = Bitmap::new(SegmentFamily::Inode);
		let data_bitmap = Bitmap::new(SegmentFamily::Data);

		let needs_bootstrap = !store.segment_exists(SegmentFamily::Inode, 0) || !store.segment_exists(SegmentFamily::Data, 0);

		let mut vol = Self {
			base_dir,
			store,
			inode_bitmap,
			data_bitmap,
			max_inode_seg: max_inode_seg.unwrap_or(0),
			max_data_seg: max_data_seg.unwrap_or(0),
		};

		if needs_bootstrap {
			vol.bootstrap_root()?;
		}

		Ok(vol)
	}

	fn bootstrap_root(&mut self) -> Result<()> {
		// Create both segment 0 files (zero-filled by `write_block`'s
		// create-if-missing path) and reserve bit 0 of each bitmap directly,
		// rather than going through the allocator scan: the files are
		// guaranteed to not exist yet.
		reserve_bit_zero(&mut self.store, SegmentFamily::Inode)?;
		reserve_bit_zero(&mut self.store, SegmentFamily::Data)?;

		// The root's first data block is the preallocated, permanently
		// reserved data block 0 — bound directly into `direct[0]` rather
		// than obtained from the allocator, which skips that reserved bit
		// and would never hand it back out.
		let mut root = InodeRecord::new(Mode::Directory);
		root.set_direct(0, ROOT_DATA_BLOCK);
		root.size = 2 * DIRENT_SIZE as u64;
		self.store.write_block(SegmentFamily::Inode, 0, 1, &root.encode())?;

		let mut blk = DirBlock::empty();
		blk.set(0, DirEntry::new(".", ROOT_INODE)?);
		blk.set(1, DirEntry::new("..", ROOT_INODE)?);
		self.store.write_block(SegmentFamily::Data, 0, 1, &blk.encode())?;
		Ok(())
	}

	/// Returns the directory segment files live under.
	pub fn base_dir(&self) -> &Path {
		&self.base_dir
	}

	/// Borrows a view over the inode table, wired to this volume's
	/// allocators and segment-growth counters, for the duration of one
	/// operation.
	pub fn inode_table(&mut self) -> InodeTable<'_> {
		InodeTable::new(&mut self.store, &self.inode_bitmap, &self.data_bitmap, &mut self.max_inode_seg, &mut self.max_data_seg)
	}
}

fn reserve_bit_zero(store: &mut SegmentStore, family: SegmentFamily) -> Result<()> {
	let mut buf = [0u8; crate::layout::BLOCK_SIZE];
	if store.segment_exists(family, 0) {
		store.read_block(family, 0, 0, &mut buf)?;
	}
	buf[0] |= 1;
	store.write_block(family, 0, 0, &buf)
}

fn scan_max_segment(base_dir: &Path, family: SegmentFamily) -> Option<u32> {
	let prefix = match family {
		SegmentFamily::Inode => "inode_",
		SegmentFamily::Data => "data_",
	};
	let entries = std::fs::read_dir(base_dir).ok()?;
	entries
		.filter_map(|e| e.ok())
		.filter_map(|e| e.file_name().into_string().ok())
		.filter_map(|name| name.strip_prefix(prefix).map(|s| s.to_string()))
		.filter_map(|idx| idx.parse::<u32>().ok())
		.max()
}
