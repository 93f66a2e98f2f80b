//! High-level file operations: add, extract, remove, list, debug.
//!
//! These functions are the only callers that combine the path resolver with
//! the directory layer and the inode table; `main.rs` dispatches CLI flags
//! straight into them.

use std::io::{Read, Write};

use crate::dir;
use crate::error::{Error, Result};
use crate::inode::{InodeRecord, InodeTable, Mode};
use crate::layout::{BLOCK_SIZE, N_DIRECT, PTRS_PER_INDIRECT_BLOCK, ROOT_INODE};
use crate::path;

/// Imports bytes read from `source` into a new regular file at `target_path`,
/// creating any missing parent directories along the way.
///
/// Rolls the new inode back via [`recursive_free`] if any step after
/// allocating it fails, per the file operations' rollback contract.
pub fn add(table: &mut InodeTable, target_path: &str, source: &mut dyn Read) -> Result<()> {
	let resolved = path::resolve_parent(table, target_path, true)?;
	if resolved.inode_num.is_some() {
		return Err(Error::AlreadyExists);
	}

	let inode_num = table.alloc(Mode::RegularFile)?;
	if let Err(e) = fill_from_reader(table, inode_num, source) {
		let _ = recursive_free(table, inode_num);
		return Err(e);
	}

	let mut parent = resolved.parent;
	if let Err(e) = dir::insert(table, resolved.parent_num, &mut parent, &resolved.name, inode_num) {
		let _ = recursive_free(table, inode_num);
		return Err(e);
	}
	Ok(())
}

fn fill_from_reader(table: &mut InodeTable, inode_num: u32, source: &mut dyn Read) -> Result<()> {
	let mut inode = table.read(inode_num)?;
	let mut chunk = [0u8; BLOCK_SIZE];
	let mut cursor = 0u64;
	loop {
		let mut filled = 0usize;
		while filled < BLOCK_SIZE {
			let n = source.read(&mut chunk[filled..])?;
			if n == 0 {
				break;
			}
			filled += n;
		}
		if filled == 0 {
			break;
		}
		if filled < BLOCK_SIZE {
			chunk[filled..].fill(0);
		}
		let block = table.alloc_block_for_offset(inode_num, &mut inode, cursor)?;
		table.write_block(block, &chunk)?;
		cursor += filled as u64;
		inode.size = cursor;
		table.write(inode_num, &inode)?;
		if filled < BLOCK_SIZE {
			break;
		}
	}
	Ok(())
}

/// Streams the bytes of the regular file at `path` to `sink`.
///
/// Returns [`Error::IsADirectory`] if `path` does not name a regular file,
/// and [`Error::Corruption`] if a block expected to exist (before the
/// file's recorded end) is unmapped.
pub fn extract(table: &mut InodeTable, path: &str, sink: &mut dyn Write) -> Result<()> {
	let inode_num = path::resolve(table, path)?;
	let inode = table.read(inode_num)?;
	if inode.mode != Mode::RegularFile {
		return Err(Error::IsADirectory);
	}

	let mut remaining = inode.size;
	let mut cursor = 0u64;
	let mut buf = [0u8; BLOCK_SIZE];
	while remaining > 0 {
		let block = table.lookup_block(inode_num, &inode, cursor)?;
		if block == 0 {
			return Err(Error::Corruption(format!("unmapped block at offset {cursor} before end of file")));
		}
		table.read_block(block, &mut buf)?;
		let take = remaining.min(BLOCK_SIZE as u64) as usize;
		sink.write_all(&buf[..take])?;
		cursor += BLOCK_SIZE as u64;
		remaining -= take as u64;
	}
	Ok(())
}

/// Recursively deletes the file or directory at `path`.
///
/// Refuses to remove the root (`/`, or an empty path).
pub fn remove(table: &mut InodeTable, path: &str) -> Result<()> {
	let resolved = path::resolve_parent(table, path, false)?;
	let inode_num = resolved.inode_num.ok_or(Error::NotFound)?;
	// `path::split` rejects bare `.`/`..` components, and those are the only
	// directory entries that ever point back at the root, so no path can
	// resolve here with `inode_num == ROOT_INODE` — `/`, `.`, and `..` are
	// all refused earlier, at `resolve_parent`'s component split.
	debug_assert_ne!(inode_num, ROOT_INODE);

	let mut parent = resolved.parent;
	dir::remove(table, resolved.parent_num, &mut parent, &resolved.name)?;
	recursive_free(table, inode_num)
}

/// Releases every data block, indirect block, and finally the inode itself
/// belonging to `inode_num`. For a directory, first recurses into every
/// entry other than `.`/`..`.
///
/// Per the file operations' error policy, this does not itself roll back on
/// partial failure: the directory entry has already been unlinked, so
/// proceeding with best-effort cleanup is preferred to leaving the tree in
/// an inconsistent state with an orphaned, still-linked inode.
pub fn recursive_free(table: &mut InodeTable, inode_num: u32) -> Result<()> {
	let inode = table.read(inode_num)?;

	if inode.mode == Mode::Directory {
		for (name, child_num) in dir::list(table, inode_num, &inode)? {
			if name == "." || name == ".." {
				continue;
			}
			recursive_free(table, child_num)?;
		}
	}

	free_data_blocks(table, &inode)?;
	table.free(inode_num)
}

fn free_data_blocks(table: &mut InodeTable, inode: &InodeRecord) -> Result<()> {
	for i in 0..N_DIRECT {
		let block = inode.direct(i);
		if block != 0 {
			table.free_data_block(block)?;
		}
	}
	if let Some(ind) = table.read_single_indirect(inode)? {
		for i in 0..PTRS_PER_INDIRECT_BLOCK {
			let block = ind.get(i);
			if block != 0 {
				table.free_data_block(block)?;
			}
		}
		table.free_data_block(inode.single_indirect)?;
	}
	Ok(())
}

/// Recursively lists the contents of the directory at `path` to `out`,
/// printing directory names with a trailing `/` and indenting by depth.
///
/// Listing the root additionally writes `/` as a header line before its
/// children: root has no entry of its own in any parent directory (it is
/// the one inode no directory entry but `.`/`..` ever names), so without
/// this special case `--ls /` on a store with no other content would print
/// nothing at all.
pub fn list(table: &mut InodeTable, path: &str, out: &mut dyn Write) -> Result<()> {
	let inode_num = path::resolve(table, path)?;
	let inode = table.read(inode_num)?;
	if inode.mode != Mode::Directory {
		return Err(Error::NotADirectory);
	}
	if inode_num == ROOT_INODE {
		writeln!(out, "/")?;
	}
	list_recursive(table, inode_num, &inode, out, 0)
}

fn list_recursive(table: &mut InodeTable, dir_num: u32, dir_inode: &InodeRecord, out: &mut dyn Write, depth: usize) -> Result<()> {
	for (name, child_num) in dir::list(table, dir_num, dir_inode)? {
		if name == "." || name == ".." {
			continue;
		}
		let child = table.read(child_num)?;
		let indent = "  ".repeat(depth);
		match child.mode {
			Mode::Directory => {
				writeln!(out, "{indent}{name}/")?;
				list_recursive(table, child_num, &child, out, depth + 1)?;
			}
			Mode::RegularFile => writeln!(out, "{indent}{name}")?,
			Mode::Free => return Err(Error::Corruption(format!("directory entry {name:?} points at a free inode"))),
		}
	}
	Ok(())
}

/// Prints a step-by-step trace of resolving `path`: each inode visited
/// along the way, its mode, size, and allocated block pointers.
pub fn debug(table: &mut InodeTable, path: &str, out: &mut dyn Write) -> Result<()> {
	writeln!(out, "inode {ROOT_INODE}: {}", describe(&table.read(ROOT_INODE)?))?;

	let mut current = ROOT_INODE;
	for part in path.split('/').filter(|p| !p.is_empty()) {
		let dir_rec = table.read(current)?;
		if dir_rec.mode != Mode::Directory {
			return Err(Error::NotADirectory);
		}
		let next = dir::find(table, current, &dir_rec, part)?.ok_or(Error::NotFound)?;
		let next_rec = table.read(next)?;
		writeln!(out, "  -> {part:?} = inode {next}: {}", describe(&next_rec))?;
		current = next;
	}
	Ok(())
}

fn describe(inode: &InodeRecord) -> String {
	let mode = match inode.mode {
		Mode::Free => "free",
		Mode::Directory => "directory",
		Mode::RegularFile => "file",
	};
	let allocated_direct = (0..N_DIRECT).filter(|&i| inode.direct(i) != 0).count();
	format!(
		"mode={mode} size={} direct_blocks_used={allocated_direct} single_indirect={}",
		inode.size, inode.single_indirect
	)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::bitmap::Bitmap;
	use crate::segment::{SegmentFamily, SegmentStore};
	use std::io::Cursor;
	use std::path::PathBuf;

	fn tmp_dir(tag: &str) -> PathBuf {
		let dir = std::env::temp_dir().join(format!("exfs2-ops-test-{tag}"));
		let _ = std::fs::remove_dir_all(&dir);
		std::fs::create_dir_all(&dir).unwrap();
		dir
	}

	fn bootstrap_root(table: &mut InodeTable) {
		let mut root = InodeRecord::new(Mode::Directory);
		table.write(ROOT_INODE, &root).unwrap();
		dir::seed_dot_entries(table, ROOT_INODE, &mut root, ROOT_INODE).unwrap();
	}

	fn harness<'a>(
		store: &'a mut SegmentStore,
		inode_bm: &'a Bitmap,
		data_bm: &'a Bitmap,
		max_inode_seg: &'a mut u32,
		max_data_seg: &'a mut u32,
	) -> InodeTable<'a> {
		InodeTable::new(store, inode_bm, data_bm, max_inode_seg, max_data_seg)
	}

	#[test]
	fn add_then_extract_round_trips_small_file() {
		let dir = tmp_dir("roundtrip-small");
		let mut store = SegmentStore::new(&dir);
		let inode_bm = Bitmap::new(SegmentFamily::Inode);
		let data_bm = Bitmap::new(SegmentFamily::Data);
		let mut max_inode_seg = 0;
		let mut max_data_seg = 0;
		inode_bm.alloc(&mut store, &mut max_inode_seg).unwrap();
		data_bm.alloc(&mut store, &mut max_data_seg).unwrap();
		let mut table = harness(&mut store, &inode_bm, &data_bm, &mut max_inode_seg, &mut max_data_seg);
		bootstrap_root(&mut table);

		let payload = b"Hello, World!";
		add(&mut table, "/greet", &mut Cursor::new(payload.to_vec())).unwrap();

		let mut out = Vec::new();
		extract(&mut table, "/greet", &mut out).unwrap();
		assert_eq!(out, payload);
	}

	#[test]
	fn add_creates_missing_parents_and_list_shows_them() {
		let dir = tmp_dir("nested-add");
		let mut store = SegmentStore::new(&dir);
		let inode_bm = Bitmap::new(SegmentFamily::Inode);
		let data_bm = Bitmap::new(SegmentFamily::Data);
		let mut max_inode_seg = 0;
		let mut max_data_seg = 0;
		inode_bm.alloc(&mut store, &mut max_inode_seg).unwrap();
		data_bm.alloc(&mut store, &mut max_data_seg).unwrap();
		let mut table = harness(&mut store, &inode_bm, &data_bm, &mut max_inode_seg, &mut max_data_seg);
		bootstrap_root(&mut table);

		add(&mut table, "/a/b/c/file", &mut Cursor::new(b"x".to_vec())).unwrap();

		let mut out = Vec::new();
		list(&mut table, "/", &mut out).unwrap();
		assert_eq!(String::from_utf8(out).unwrap(), "/\na/\n");

		let mut out = Vec::new();
		list(&mut table, "/a/b", &mut out).unwrap();
		assert_eq!(String::from_utf8(out).unwrap(), "c/\n");
	}

	#[test]
	fn double_add_rejected() {
		let dir = tmp_dir("double-add");
		let mut store = SegmentStore::new(&dir);
		let inode_bm = Bitmap::new(SegmentFamily::Inode);
		let data_bm = Bitmap::new(SegmentFamily::Data);
		let mut max_inode_seg = 0;
		let mut max_data_seg = 0;
		inode_bm.alloc(&mut store, &mut max_inode_seg).unwrap();
		data_bm.alloc(&mut store, &mut max_data_seg).unwrap();
		let mut table = harness(&mut store, &inode_bm, &data_bm, &mut max_inode_seg, &mut max_data_seg);
		bootstrap_root(&mut table);

		add(&mut table, "/x", &mut Cursor::new(b"a".to_vec())).unwrap();
		let err = add(&mut table, "/x", &mut Cursor::new(b"b".to_vec())).unwrap_err();
		assert!(matches!(err, Error::AlreadyExists));
	}

	#[test]
	fn remove_recursively_frees_subtree() {
		let dir = tmp_dir("remove-recursive");
		let mut store = SegmentStore::new(&dir);
		let inode_bm = Bitmap::new(SegmentFamily::Inode);
		let data_bm = Bitmap::new(SegmentFamily::Data);
		let mut max_inode_seg = 0;
		let mut max_data_seg = 0;
		inode_bm.alloc(&mut store, &mut max_inode_seg).unwrap();
		data_bm.alloc(&mut store, &mut max_data_seg).unwrap();
		let mut table = harness(&mut store, &inode_bm, &data_bm, &mut max_inode_seg, &mut max_data_seg);
		bootstrap_root(&mut table);

		add(&mut table, "/a/b/file", &mut Cursor::new(b"data".to_vec())).unwrap();
		remove(&mut table, "/a").unwrap();

		let mut out = Vec::new();
		list(&mut table, "/", &mut out).unwrap();
		assert_eq!(String::from_utf8(out).unwrap(), "/\n");
	}

	#[test]
	fn remove_refuses_root() {
		let dir = tmp_dir("remove-root");
		let mut store = SegmentStore::new(&dir);
		let inode_bm = Bitmap::new(SegmentFamily::Inode);
		let data_bm = Bitmap::new(SegmentFamily::Data);
		let mut max_inode_seg = 0;
		let mut max_data_seg = 0;
		inode_bm.alloc(&mut store, &mut max_inode_seg).unwrap();
		data_bm.alloc(&mut store, &mut max_data_seg).unwrap();
		let mut table = harness(&mut store, &inode_bm, &data_bm, &mut max_inode_seg, &mut max_data_seg);
		bootstrap_root(&mut table);

		let err = remove(&mut table, "/").unwrap_err();
		assert!(matches!(err, Error::InvalidArgument(_)));
	}

	#[test]
	fn large_file_crosses_into_single_indirection() {
		let dir = tmp_dir("large-file");
		let mut store = SegmentStore::new(&dir);
		let inode_bm = Bitmap::new(SegmentFamily::Inode);
		let data_bm = Bitmap::new(SegmentFamily::Data);
		let mut max_inode_seg = 0;
		let mut max_data_seg = 0;
		inode_bm.alloc(&mut store, &mut max_inode_seg).unwrap();
		data_bm.alloc(&mut store, &mut max_data_seg).unwrap();
		let mut table = harness(&mut store, &inode_bm, &data_bm, &mut max_inode_seg, &mut max_data_seg);
		bootstrap_root(&mut table);

		let size = (N_DIRECT + 5) * BLOCK_SIZE;
		let payload: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
		add(&mut table, "/big", &mut Cursor::new(payload.clone())).unwrap();

		let mut out = Vec::new();
		extract(&mut table, "/big", &mut out).unwrap();
		assert_eq!(out, payload);
	}
}
