//! Per-segment free/used bitmap allocator for inodes and data blocks.

use crate::error::{Error, Result};
use crate::layout::{BLOCK_SIZE, ITEMS_PER_SEGMENT};
use crate::segment::{SegmentFamily, SegmentStore};

/// A warning the allocator wants surfaced to the user, without being fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Warning {
	/// Freed a bit that was already clear.
	AlreadyFree { family: SegmentFamily, global: u32 },
	/// Attempted to free a reserved item (root inode or data block 0).
	Reserved { family: SegmentFamily, global: u32 },
}

/// Allocates and frees items (inodes or data blocks) for one
/// [`SegmentFamily`], tracking which segment/bit is in use via the bitmap
/// block at the start of each segment.
pub struct Bitmap {
	family: SegmentFamily,
}

impl Bitmap {
	/// Creates an allocator view over `family`.
	pub fn new(family: SegmentFamily) -> Self {
		Self { family }
	}

	fn reserved_bit(&self, seg_idx: u32, local: usize) -> bool {
		seg_idx == 0 && local == 0
	}

	/// Allocates a free item, scanning segments `0..=*max_seg` in order and,
	/// within a segment, bits in order. Grows a new segment (bumping
	/// `*max_seg`) if none is free. Returns the newly allocated item's
	/// global number.
	pub fn alloc(&self, store: &mut SegmentStore, max_seg: &mut u32) -> Result<u32> {
		for seg_idx in 0..=*max_seg {
			if let Some(local) = self.find_free_bit(store, seg_idx)? {
				self.set_bit(store, seg_idx, local, true)?;
				return Ok(seg_idx * ITEMS_PER_SEGMENT as u32 + local as u32);
			}
		}
		// No free bit anywhere: grow. `seg_idx >= 1` here, so bit 0 of the
		// new segment is never the reserved root slot. A failure here means
		// the host refused to create the new segment file: that is what
		// `OutOfSpace` means for this allocator, not a generic I/O error.
		let seg_idx = *max_seg + 1;
		self.set_bit(store, seg_idx, 0, true).map_err(|_| Error::OutOfSpace)?;
		*max_seg = seg_idx;
		Ok(seg_idx * ITEMS_PER_SEGMENT as u32)
	}

	fn find_free_bit(&self, store: &mut SegmentStore, seg_idx: u32) -> Result<Option<usize>> {
		if !store.segment_exists(self.family, seg_idx) {
			return Ok(None);
		}
		let mut buf = [0u8; BLOCK_SIZE];
		match store.read_block(self.family, seg_idx, 0, &mut buf) {
			Ok(()) => {}
			// A short read on the bitmap block itself is treated as "this
			// segment is full", not propagated as corruption: the defensive
			// reading of a truncated/unreadable bitmap is to skip past the
			// segment during the allocation scan rather than fail the whole
			// allocation.
			Err(Error::Corruption(_)) => return Ok(None),
			Err(e) => return Err(e),
		}
		for local in 0..ITEMS_PER_SEGMENT {
			if self.reserved_bit(seg_idx, local) {
				continue;
			}
			if !get_bit(&buf, local) {
				return Ok(Some(local));
			}
		}
		Ok(None)
	}

	fn set_bit(&self, store: &mut SegmentStore, seg_idx: u32, local: usize, value: bool) -> Result<()> {
		let mut buf = [0u8; BLOCK_SIZE];
		if store.segment_exists(self.family, seg_idx) {
			store.read_block(self.family, seg_idx, 0, &mut buf)?;
		}
		if value {
			set_bit(&mut buf, local);
		} else {
			clear_bit(&mut buf, local);
		}
		store.write_block(self.family, seg_idx, 0, &buf)
	}

	/// Clears the bit belonging to global item number `global`. Clearing an
	/// already-clear bit, or a reserved item, is not fatal: it yields a
	/// [`Warning`] instead of mutating anything.
	pub fn free(&self, store: &mut SegmentStore, global: u32) -> Result<Option<Warning>> {
		let seg_idx = global / ITEMS_PER_SEGMENT as u32;
		let local = (global % ITEMS_PER_SEGMENT as u32) as usize;

		if self.reserved_bit(seg_idx, local) {
			return Ok(Some(Warning::Reserved { family: self.family, global }));
		}

		let mut buf = [0u8; BLOCK_SIZE];
		store.read_block(self.family, seg_idx, 0, &mut buf)?;
		if !get_bit(&buf, local) {
			return Ok(Some(Warning::AlreadyFree { family: self.family, global }));
		}
		clear_bit(&mut buf, local);
		store.write_block(self.family, seg_idx, 0, &buf)?;
		Ok(None)
	}

	/// Rolls back a just-performed allocation, clearing its bit
	/// unconditionally (used when a secondary write following allocation
	/// fails).
	pub fn rollback(&self, store: &mut SegmentStore, global: u32) -> Result<()> {
		let seg_idx = global / ITEMS_PER_SEGMENT as u32;
		let local = (global % ITEMS_PER_SEGMENT as u32) as usize;
		self.set_bit(store, seg_idx, local, false)
	}
}

fn get_bit(buf: &[u8; BLOCK_SIZE], i: usize) -> bool {
	(buf[i / 8] >> (i % 8)) & 1 != 0
}

fn set_bit(buf: &mut [u8; BLOCK_SIZE], i: usize) {
	buf[i / 8] |= 1 << (i % 8);
}

fn clear_bit(buf: &mut [u8; BLOCK_SIZE], i: usize) {
	buf[i / 8] &= !(1 << (i % 8));
}
