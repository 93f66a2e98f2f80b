//! Directory operations: a directory's contents are just the data blocks of
//! its inode, read as a dense array of [`DirBlock`]s with tombstone-based
//! removal.

use crate::block::{DirBlock, DirEntry};
use crate::error::{Error, Result};
use crate::inode::{InodeRecord, InodeTable, Mode};
use crate::layout::{BLOCK_SIZE, DIRENT_SIZE, ENTRIES_PER_DIR_BLOCK};

/// Looks up `name` in directory `dir_num`/`dir`, returning its inode number.
pub fn find(table: &mut InodeTable, dir_num: u32, dir: &InodeRecord, name: &str) -> Result<Option<u32>> {
	if dir.mode != Mode::Directory {
		return Err(Error::NotADirectory);
	}
	for block_idx in 0..block_count(table, dir_num, dir)? {
		let blk = read_dir_block(table, dir_num, dir, block_idx)?;
		for entry in blk.iter() {
			if !entry.is_free() && entry.name() == name {
				return Ok(Some(entry.inode_num));
			}
		}
	}
	Ok(None)
}

/// Lists every non-tombstone entry's name and inode number, in on-disk order.
pub fn list(table: &mut InodeTable, dir_num: u32, dir: &InodeRecord) -> Result<Vec<(String, u32)>> {
	if dir.mode != Mode::Directory {
		return Err(Error::NotADirectory);
	}
	let mut out = Vec::new();
	for block_idx in 0..block_count(table, dir_num, dir)? {
		let blk = read_dir_block(table, dir_num, dir, block_idx)?;
		for entry in blk.iter() {
			if !entry.is_free() {
				out.push((entry.name(), entry.inode_num));
			}
		}
	}
	Ok(out)
}

/// Binds `name` to `inode_num` in directory `dir_num`/`dir`. Reuses the
/// first tombstone slot found; appends a freshly allocated block if every
/// existing block is full.
///
/// Returns [`Error::AlreadyExists`] if `name` is already bound.
pub fn insert(table: &mut InodeTable, dir_num: u32, dir: &mut InodeRecord, name: &str, inode_num: u32) -> Result<()> {
	if dir.mode != Mode::Directory {
		return Err(Error::NotADirectory);
	}
	let entry = DirEntry::new(name, inode_num)?;

	let existing_blocks = block_count(table, dir_num, dir)?;
	for block_idx in 0..existing_blocks {
		let mut blk = read_dir_block(table, dir_num, dir, block_idx)?;
		let mut free_slot = None;
		for slot in 0..ENTRIES_PER_DIR_BLOCK {
			let e = blk.get(slot);
			if !e.is_free() && e.name() == name {
				return Err(Error::AlreadyExists);
			}
			if e.is_free() && free_slot.is_none() {
				free_slot = Some(slot);
			}
		}
		if let Some(slot) = free_slot {
			blk.set(slot, entry);
			write_dir_block(table, dir_num, dir, block_idx, &blk)?;
			dir.size += DIRENT_SIZE as u64;
			table.write(dir_num, dir)?;
			return Ok(());
		}
	}

	// No existing block had room: allocate the next one and place the entry
	// in its first slot.
	let mut blk = DirBlock::empty();
	blk.set(0, entry);
	let offset = existing_blocks as u64 * BLOCK_SIZE as u64;
	let block = table.alloc_block_for_offset(dir_num, dir, offset)?;
	table.write_block(block, &blk.encode())?;
	dir.size += DIRENT_SIZE as u64;
	table.write(dir_num, dir)?;
	Ok(())
}

/// Unbinds `name` from directory `dir_num`/`dir`, leaving a tombstone in its
/// slot. If removing the entry empties its block entirely (every slot now a
/// tombstone) and that block is the directory's last, the block itself is
/// freed and the directory shrinks.
///
/// Returns [`Error::NotFound`] if `name` is not bound.
pub fn remove(table: &mut InodeTable, dir_num: u32, dir: &mut InodeRecord, name: &str) -> Result<u32> {
	if dir.mode != Mode::Directory {
		return Err(Error::NotADirectory);
	}
	let last_block_idx = block_count(table, dir_num, dir)?.checked_sub(1).ok_or(Error::NotFound)?;

	for block_idx in 0..=last_block_idx {
		let mut blk = read_dir_block(table, dir_num, dir, block_idx)?;
		let mut found = None;
		for slot in 0..ENTRIES_PER_DIR_BLOCK {
			let e = blk.get(slot);
			if !e.is_free() && e.name() == name {
				found = Some((slot, e.inode_num));
				break;
			}
		}
		let Some((slot, removed_inode)) = found else { continue };

		blk.set(slot, DirEntry::free());
		dir.size -= DIRENT_SIZE as u64;

		// The directory's own first block (index 0) always carries `.`/`..`
		// and, for root, is the permanently reserved block 0 — never freed.
		if block_idx == last_block_idx && blk.iter().all(DirEntry::is_free) && last_block_idx > 0 {
			let block_num = table.lookup_block(dir_num, dir, block_idx as u64 * BLOCK_SIZE as u64)?;
			if block_num != 0 {
				table.free_data_block(block_num)?;
			}
		} else {
			write_dir_block(table, dir_num, dir, block_idx, &blk)?;
		}
		table.write(dir_num, dir)?;
		return Ok(removed_inode);
	}
	Err(Error::NotFound)
}

/// Seeds a freshly allocated directory's first block with `.` and `..`
/// entries, sizing the inode to match.
pub fn seed_dot_entries(table: &mut InodeTable, dir_num: u32, dir: &mut InodeRecord, parent_num: u32) -> Result<()> {
	let mut blk = DirBlock::empty();
	blk.set(0, DirEntry::new(".", dir_num)?);
	blk.set(1, DirEntry::new("..", parent_num)?);
	let block = table.alloc_block_for_offset(dir_num, dir, 0)?;
	table.write_block(block, &blk.encode())?;
	dir.size = 2 * DIRENT_SIZE as u64;
	table.write(dir_num, dir)
}

/// Returns the number of data blocks currently reachable from `dir`'s
/// pointers, by probing sequential block indices until one comes back
/// unmapped. Directory blocks are always allocated contiguously from
/// offset 0, so this is exact.
///
/// Uses [`InodeTable::block_exists`] rather than comparing
/// [`InodeTable::lookup_block`]'s result against `0`: the root directory's
/// first block is the permanently reserved, always-present data block `0`,
/// the same value every other slot uses as the "unallocated" sentinel, so
/// a bare `== 0` check would see root as having no blocks at all.
fn block_count(table: &mut InodeTable, dir_num: u32, dir: &InodeRecord) -> Result<usize> {
	let mut count = 0usize;
	while table.block_exists(dir_num, dir, count)? {
		count += 1;
	}
	Ok(count)
}

fn read_dir_block(table: &mut InodeTable, dir_num: u32, dir: &InodeRecord, block_idx: usize) -> Result<DirBlock> {
	if !table.block_exists(dir_num, dir, block_idx)? {
		return Ok(DirBlock::empty());
	}
	let offset = block_idx as u64 * BLOCK_SIZE as u64;
	let block = table.lookup_block(dir_num, dir, offset)?;
	let mut buf = [0u8; BLOCK_SIZE];
	table.read_block(block, &mut buf)?;
	Ok(DirBlock::parse(&buf))
}

fn write_dir_block(table: &mut InodeTable, dir_num: u32, dir: &InodeRecord, block_idx: usize, blk: &DirBlock) -> Result<()> {
	if !table.block_exists(dir_num, dir, block_idx)? {
		return Err(Error::Corruption(format!("directory block {block_idx} missing on write")));
	}
	let offset = block_idx as u64 * BLOCK_SIZE as u64;
	let block = table.lookup_block(dir_num, dir, offset)?;
	table.write_block(block, &blk.encode())
}
