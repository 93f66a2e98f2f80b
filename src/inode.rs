//! Inode records and the logical-offset-to-block-number mapping.

use crate::block::IndirectBlock;
use crate::bitmap::Bitmap;
use crate::error::{Error, Result};
use crate::layout::{BLOCK_SIZE, N_DIRECT, PTRS_PER_INDIRECT_BLOCK};
use crate::segment::{SegmentFamily, SegmentStore};

/// The type of file an inode represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
	/// The inode slot is not in use.
	Free,
	/// A regular file.
	RegularFile,
	/// A directory.
	Directory,
}

impl Mode {
	fn from_tag(tag: u16) -> Result<Self> {
		match tag {
			0 => Ok(Self::Free),
			1 => Ok(Self::RegularFile),
			2 => Ok(Self::Directory),
			_ => Err(Error::Corruption(format!("unknown inode mode tag {tag}"))),
		}
	}

	fn tag(self) -> u16 {
		match self {
			Self::Free => 0,
			Self::RegularFile => 1,
			Self::Directory => 2,
		}
	}
}

/// An inode record: file metadata plus direct and indirect block pointers.
#[derive(Clone)]
pub struct InodeRecord {
	pub mode: Mode,
	pub size: u64,
	direct: [u32; N_DIRECT],
	pub single_indirect: u32,
	pub double_indirect: u32,
}

impl InodeRecord {
	/// Returns a blank inode record of the given `mode` and zero size.
	pub fn new(mode: Mode) -> Self {
		Self { mode, size: 0, direct: [0; N_DIRECT], single_indirect: 0, double_indirect: 0 }
	}

	/// Decodes an inode record from a raw block buffer.
	pub fn decode(buf: &[u8; BLOCK_SIZE]) -> Result<Self> {
		let mode = Mode::from_tag(u16::from_le_bytes(buf[0..2].try_into().unwrap()))?;
		let size = u64::from_le_bytes(buf[2..10].try_into().unwrap());
		let mut direct = [0u32; N_DIRECT];
		for (i, slot) in direct.iter_mut().enumerate() {
			let off = 10 + i * 4;
			*slot = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
		}
		let tail = 10 + N_DIRECT * 4;
		let single_indirect = u32::from_le_bytes(buf[tail..tail + 4].try_into().unwrap());
		let double_indirect = u32::from_le_bytes(buf[tail + 4..tail + 8].try_into().unwrap());
		Ok(Self { mode, size, direct, single_indirect, double_indirect })
	}

	/// Encodes this record into a raw block buffer.
	pub fn encode(&self) -> [u8; BLOCK_SIZE] {
		let mut buf = [0u8; BLOCK_SIZE];
		buf[0..2].copy_from_slice(&self.mode.tag().to_le_bytes());
		buf[2..10].copy_from_slice(&self.size.to_le_bytes());
		for (i, ptr) in self.direct.iter().enumerate() {
			let off = 10 + i * 4;
			buf[off..off + 4].copy_from_slice(&ptr.to_le_bytes());
		}
		let tail = 10 + N_DIRECT * 4;
		buf[tail..tail + 4].copy_from_slice(&self.single_indirect.to_le_bytes());
		buf[tail + 4..tail + 8].copy_from_slice(&self.double_indirect.to_le_bytes());
		buf
	}

	/// Returns the direct block pointer at index `i`, or `0` if unset.
	pub fn direct(&self, i: usize) -> u32 {
		self.direct[i]
	}

	/// Sets the direct block pointer at index `i`.
	pub fn set_direct(&mut self, i: usize, block: u32) {
		self.direct[i] = block;
	}
}

/// Reads and writes inode records, and maps an inode's logical byte offset
/// to a physical data block number, allocating indirection lazily.
pub struct InodeTable<'a> {
	store: &'a mut SegmentStore,
	inode_bitmap: &'a Bitmap,
	data_bitmap: &'a Bitmap,
	max_inode_seg: &'a mut u32,
	max_data_seg: &'a mut u32,
}

impl<'a> InodeTable<'a> {
	/// Builds a table view wired to the allocators and max-segment counters
	/// a [`crate::volume::Volume`] owns.
	pub fn new(
		store: &'a mut SegmentStore,
		inode_bitmap: &'a Bitmap,
		data_bitmap: &'a Bitmap,
		max_inode_seg: &'a mut u32,
		max_data_seg: &'a mut u32,
	) -> Self {
		Self { store, inode_bitmap, data_bitmap, max_inode_seg, max_data_seg }
	}

	/// Reads the inode record numbered `inode_num`.
	pub fn read(&mut self, inode_num: u32) -> Result<InodeRecord> {
		let (seg, local) = split(inode_num);
		let mut buf = [0u8; BLOCK_SIZE];
		self.store.read_block(SegmentFamily::Inode, seg, local + 1, &mut buf)?;
		InodeRecord::decode(&buf)
	}

	/// Writes `record` back as inode `inode_num`.
	pub fn write(&mut self, inode_num: u32, record: &InodeRecord) -> Result<()> {
		let (seg, local) = split(inode_num);
		self.store.write_block(SegmentFamily::Inode, seg, local + 1, &record.encode())
	}

	/// Allocates a new inode of the given `mode`, writing a blank record.
	pub fn alloc(&mut self, mode: Mode) -> Result<u32> {
		let num = self.inode_bitmap.alloc(self.store, self.max_inode_seg)?;
		let record = InodeRecord::new(mode);
		if let Err(e) = self.write(num, &record) {
			let _ = self.inode_bitmap.rollback(self.store, num);
			return Err(e);
		}
		Ok(num)
	}

	/// Frees inode `inode_num`. Does not touch any blocks it references;
	/// callers reclaim those separately (see `ops::recursive_free`).
	pub fn free(&mut self, inode_num: u32) -> Result<()> {
		self.inode_bitmap.free(self.store, inode_num)?;
		Ok(())
	}

	fn read_data_block(&mut self, block: u32, buf: &mut [u8; BLOCK_SIZE]) -> Result<()> {
		let (seg, local) = split(block);
		self.store.read_block(SegmentFamily::Data, seg, local + 1, buf)
	}

	fn write_data_block(&mut self, block: u32, buf: &[u8; BLOCK_SIZE]) -> Result<()> {
		let (seg, local) = split(block);
		self.store.write_block(SegmentFamily::Data, seg, local + 1, buf)
	}

	/// Allocates a fresh, zeroed data block and returns its number.
	pub fn alloc_data_block(&mut self) -> Result<u32> {
		let num = self.data_bitmap.alloc(self.store, self.max_data_seg)?;
		if let Err(e) = self.write_data_block(num, &[0u8; BLOCK_SIZE]) {
			let _ = self.data_bitmap.rollback(self.store, num);
			return Err(e);
		}
		Ok(num)
	}

	/// Frees data block `block`.
	pub fn free_data_block(&mut self, block: u32) -> Result<()> {
		self.data_bitmap.free(self.store, block)?;
		Ok(())
	}

	fn read_indirect(&mut self, block: u32) -> Result<IndirectBlock> {
		let mut buf = [0u8; BLOCK_SIZE];
		self.read_data_block(block, &mut buf)?;
		Ok(IndirectBlock::parse(&buf))
	}

	fn write_indirect(&mut self, block: u32, ind: &IndirectBlock) -> Result<()> {
		self.write_data_block(block, &ind.encode())
	}

	/// Maps `inode_num`'s logical byte offset to a physical data block
	/// number without allocating anything. Returns `0` for an offset that
	/// has no block mapped yet.
	///
	/// `inode_num` is needed even for this read-only lookup because of one
	/// special case: the root directory's `direct[0]` permanently holds
	/// [`crate::layout::ROOT_DATA_BLOCK`] (`0`), which every other inode's
	/// direct slot uses as the "unallocated" sentinel. Only the root's own
	/// lookup treats that `0` as a real, always-present mapping.
	pub fn lookup_block(&mut self, inode_num: u32, inode: &InodeRecord, byte_offset: u64) -> Result<u32> {
		let mut scratch = inode.clone();
		self.block_for_offset(Some(inode_num), &mut scratch, byte_offset, false)
	}

	/// Reports whether a block is mapped at logical offset
	/// `block_idx * BLOCK_SIZE` for `inode_num`/`inode`, without the
	/// ambiguity [`Self::lookup_block`]'s `0` return value carries for the
	/// root directory: the root's first block is the permanently reserved,
	/// always-present [`crate::layout::ROOT_DATA_BLOCK`] (`0`), the same
	/// value every other slot uses to mean "unallocated". Callers that only
	/// need to know whether a block exists (directory block enumeration)
	/// must use this instead of comparing `lookup_block`'s result to `0`.
	pub fn block_exists(&mut self, inode_num: u32, inode: &InodeRecord, block_idx: usize) -> Result<bool> {
		if block_idx == 0 && inode_num == crate::layout::ROOT_INODE {
			return Ok(true);
		}
		Ok(self.lookup_block(inode_num, inode, block_idx as u64 * BLOCK_SIZE as u64)? != 0)
	}

	/// Maps `inode`'s logical byte offset to a physical data block number,
	/// per the algorithm of the storage engine's inode table component,
	/// allocating missing direct slots or indirection as needed.
	///
	/// The mapping traverses an unallocated direct slot or indirection
	/// level, the missing piece is allocated, zeroed, linked, and flushed
	/// before the target block is returned. If linking the target block
	/// fails partway through, everything newly allocated for this call is
	/// rolled back.
	pub fn alloc_block_for_offset(&mut self, inode_num: u32, inode: &mut InodeRecord, byte_offset: u64) -> Result<u32> {
		self.block_for_offset(Some(inode_num), inode, byte_offset, true)
	}

	fn block_for_offset(&mut self, inode_num: Option<u32>, inode: &mut InodeRecord, byte_offset: u64, allocate: bool) -> Result<u32> {
		let logical = (byte_offset / BLOCK_SIZE as u64) as usize;

		if logical == 0 && inode_num == Some(crate::layout::ROOT_INODE) {
			return Ok(crate::layout::ROOT_DATA_BLOCK);
		}

		if logical < N_DIRECT {
			let existing = inode.direct(logical);
			if existing != 0 || !allocate {
				return if existing == 0 { Ok(0) } else { Ok(existing) };
			}
			let block = self.alloc_data_block()?;
			inode.set_direct(logical, block);
			if let Err(e) = self.write(inode_num.expect("allocate implies an inode number"), inode) {
				let _ = self.free_data_block(block);
				inode.set_direct(logical, 0);
				return Err(e);
			}
			return Ok(block);
		}

		let logical = logical - N_DIRECT;
		if logical < PTRS_PER_INDIRECT_BLOCK {
			return self.map_single_indirect(inode_num, inode, logical, allocate);
		}

		Err(Error::OutOfRange)
	}

	fn map_single_indirect(&mut self, inode_num: Option<u32>, inode: &mut InodeRecord, slot: usize, allocate: bool) -> Result<u32> {
		let mut ind_block = inode.single_indirect;
		if ind_block == 0 {
			if !allocate {
				return Ok(0);
			}
			let new_block = self.alloc_data_block()?;
			if let Err(e) = self.write_indirect(new_block, &IndirectBlock::empty()) {
				let _ = self.free_data_block(new_block);
				return Err(e);
			}
			inode.single_indirect = new_block;
			if let Err(e) = self.write(inode_num.expect("allocate implies an inode number"), inode) {
				let _ = self.free_data_block(new_block);
				inode.single_indirect = 0;
				return Err(e);
			}
			ind_block = new_block;
		}

		let mut ind = self.read_indirect(ind_block)?;
		let existing = ind.get(slot);
		if existing != 0 || !allocate {
			return Ok(existing);
		}

		let data_block = self.alloc_data_block()?;
		ind.set(slot, data_block);
		if let Err(e) = self.write_indirect(ind_block, &ind) {
			let _ = self.free_data_block(data_block);
			return Err(e);
		}
		Ok(data_block)
	}

	/// Reads exactly [`BLOCK_SIZE`] bytes from data block `block`.
	pub fn read_block(&mut self, block: u32, buf: &mut [u8; BLOCK_SIZE]) -> Result<()> {
		self.read_data_block(block, buf)
	}

	/// Writes exactly [`BLOCK_SIZE`] bytes to data block `block`.
	pub fn write_block(&mut self, block: u32, buf: &[u8; BLOCK_SIZE]) -> Result<()> {
		self.write_data_block(block, buf)
	}

	/// Returns the single-indirect block's current pointer table, if any
	/// indirect block is allocated.
	pub fn read_single_indirect(&mut self, inode: &InodeRecord) -> Result<Option<IndirectBlock>> {
		if inode.single_indirect == 0 {
			return Ok(None);
		}
		Ok(Some(self.read_indirect(inode.single_indirect)?))
	}
}

fn split(global: u32) -> (u32, usize) {
	let per_seg = crate::layout::ITEMS_PER_SEGMENT as u32;
	(global / per_seg, (global % per_seg) as usize)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::segment::SegmentFamily;
	use std::path::PathBuf;

	fn tmp_dir(tag: &str) -> PathBuf {
		let dir = std::env::temp_dir().join(format!("exfs2-inode-test-{tag}"));
		let _ = std::fs::remove_dir_all(&dir);
		std::fs::create_dir_all(&dir).unwrap();
		dir
	}

	#[test]
	fn inode_record_round_trip() {
		let mut rec = InodeRecord::new(Mode::RegularFile);
		rec.size = 1234;
		rec.set_direct(0, 9);
		rec.single_indirect = 77;
		let encoded = rec.encode();
        let decoded = InodeRecord::decode(&encoded).unwrap();
		assert_eq!(decoded.mode, Mode::RegularFile);
		assert_eq!(decoded.size, 1234);
		assert_eq!(decoded.direct(0), 9);
		assert_eq!(decoded.single_indirect, 77);
	}

	#[test]
	fn block_for_offset_allocates_direct_blocks_lazily() {
		let dir = tmp_dir("direct");
		let mut store = SegmentStore::new(&dir);
		let inode_bm = Bitmap::new(SegmentFamily::Inode);
		let data_bm = Bitmap::new(SegmentFamily::Data);
		let mut max_inode_seg = 0;
		let mut max_data_seg = 0;
		// Seed reserved bits as bootstrap would.
		inode_bm.alloc(&mut store, &mut max_inode_seg).unwrap(); // consumes reserved inode 0
		data_bm.alloc(&mut store, &mut max_data_seg).unwrap(); // consumes reserved data block 0

		let mut table = InodeTable::new(&mut store, &inode_bm, &data_bm, &mut max_inode_seg, &mut max_data_seg);
		let inode_num = table.alloc(Mode::RegularFile).unwrap();
		let mut rec = table.read(inode_num).unwrap();

		let blk = table.alloc_block_for_offset(inode_num, &mut rec, 0).unwrap();
		assert_ne!(blk, 0);
		let again = table.alloc_block_for_offset(inode_num, &mut rec, 10).unwrap();
		assert_eq!(blk, again, "same block for offsets within the same block_size window");
		let _ = std::fs::remove_dir_all(&dir);
	}

	#[test]
	fn block_for_offset_crosses_into_single_indirection() {
		let dir = tmp_dir("indirect");
		let mut store = SegmentStore::new(&dir);
		let inode_bm = Bitmap::new(SegmentFamily::Inode);
		let data_bm = Bitmap::new(SegmentFamily::Data);
		let mut max_inode_seg = 0;
		let mut max_data_seg = 0;
		inode_bm.alloc(&mut store, &mut max_inode_seg).unwrap();
		data_bm.alloc(&mut store, &mut max_data_seg).unwrap();

		let mut table = InodeTable::new(&mut store, &inode_bm, &data_bm, &mut max_inode_seg, &mut max_data_seg);
		let inode_num = table.alloc(Mode::RegularFile).unwrap();
		let mut rec = table.read(inode_num).unwrap();

		let offset = (N_DIRECT as u64) * BLOCK_SIZE as u64;
		let blk = table.alloc_block_for_offset(inode_num, &mut rec, offset).unwrap();
		assert_ne!(blk, 0);
		assert_ne!(rec.single_indirect, 0);
		let _ = std::fs::remove_dir_all(&dir);
	}

	#[test]
	fn block_for_offset_out_of_range_past_single_indirection() {
		let dir = tmp_dir("oor");
		let mut store = SegmentStore::new(&dir);
		let inode_bm = Bitmap::new(SegmentFamily::Inode);
		let data_bm = Bitmap::new(SegmentFamily::Data);
		let mut max_inode_seg = 0;
		let mut max_data_seg = 0;
		inode_bm.alloc(&mut store, &mut max_inode_seg).unwrap();
		data_bm.alloc(&mut store, &mut max_data_seg).unwrap();

		let mut table = InodeTable::new(&mut store, &inode_bm, &data_bm, &mut max_inode_seg, &mut max_data_seg);
		let inode_num = table.alloc(Mode::RegularFile).unwrap();
		let mut rec = table.read(inode_num).unwrap();

		let offset = (N_DIRECT as u64 + PTRS_PER_INDIRECT_BLOCK as u64) * BLOCK_SIZE as u64;
		let err = table.alloc_block_for_offset(inode_num, &mut rec, offset).unwrap_err();
		assert!(matches!(err, Error::OutOfRange));
		let _ = std::fs::remove_dir_all(&dir);
	}

	#[test]
	fn block_exists_treats_roots_reserved_block_zero_as_present() {
		let dir = tmp_dir("root-block-exists");
		let mut store = SegmentStore::new(&dir);
		let inode_bm = Bitmap::new(SegmentFamily::Inode);
		let data_bm = Bitmap::new(SegmentFamily::Data);
		let mut max_inode_seg = 0;
		let mut max_data_seg = 0;
		inode_bm.alloc(&mut store, &mut max_inode_seg).unwrap();
		data_bm.alloc(&mut store, &mut max_data_seg).unwrap();

		let mut table = InodeTable::new(&mut store, &inode_bm, &data_bm, &mut max_inode_seg, &mut max_data_seg);
		let mut root = InodeRecord::new(Mode::Directory);
		root.set_direct(0, crate::layout::ROOT_DATA_BLOCK);
		table.write(crate::layout::ROOT_INODE, &root).unwrap();

		assert!(table.block_exists(crate::layout::ROOT_INODE, &root, 0).unwrap());
		assert!(!table.block_exists(crate::layout::ROOT_INODE, &root, 1).unwrap());

		// A non-root, freshly allocated directory has no block yet: block 0
		// is genuinely absent until something allocates it.
		let other_num = table.alloc(Mode::Directory).unwrap();
		let other = table.read(other_num).unwrap();
		assert!(!table.block_exists(other_num, &other, 0).unwrap());
		let _ = std::fs::remove_dir_all(&dir);
	}
}
