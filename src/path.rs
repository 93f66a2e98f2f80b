//! Resolves slash-separated paths to inode numbers, walking directory
//! entries one component at a time.

use crate::dir;
use crate::error::{Error, Result};
use crate::inode::{InodeRecord, InodeTable, Mode};
use crate::layout::{MAX_RESOLVE_DEPTH, ROOT_INODE};

/// The result of resolving a path down to its final component.
pub struct Resolved {
	/// The inode number of the final component's containing directory.
	pub parent_num: u32,
	/// The final component's containing directory, already read.
	pub parent: InodeRecord,
	/// The final path component's name.
	pub name: String,
	/// The final component's inode number, if it already exists.
	pub inode_num: Option<u32>,
}

/// Splits `path` on `/`, dropping empty components (so leading, trailing,
/// and repeated slashes are all tolerated), and rejects `.`/`..` components:
/// this store has no notion of a current or parent directory outside of the
/// on-disk `.`/`..` directory entries themselves.
fn split(path: &str) -> Result<Vec<&str>> {
	let mut parts = Vec::new();
	for part in path.split('/') {
		if part.is_empty() {
			continue;
		}
		if part == "." || part == ".." {
			return Err(Error::InvalidArgument(format!("path component {part:?} is not allowed")));
		}
		parts.push(part);
	}
	Ok(parts)
}

/// Resolves `path` to its final inode number, walking every component.
///
/// Returns [`Error::NotFound`] if any component along the way is missing,
/// and [`Error::NotADirectory`] if a non-final component is not a
/// directory. An empty path (after splitting) resolves to the root.
pub fn resolve(table: &mut InodeTable, path: &str) -> Result<u32> {
	let parts = split(path)?;
	let mut current = ROOT_INODE;
	for (depth, part) in parts.iter().enumerate() {
		if depth >= MAX_RESOLVE_DEPTH {
			return Err(Error::InvalidArgument("path resolution depth exceeded".into()));
		}
		let dir_rec = table.read(current)?;
		let next = dir::find(table, current, &dir_rec, part)?.ok_or(Error::NotFound)?;
		current = next;
	}
	Ok(current)
}

/// Resolves `path` down to its parent directory and final component name,
/// without requiring the final component to exist. Every component up to
/// (but not including) the last must already exist and be a directory.
///
/// When `create_missing` is set, missing intermediate directories are
/// created (and seeded with `.`/`..`) as the walk proceeds, instead of
/// failing with [`Error::NotFound`].
pub fn resolve_parent(table: &mut InodeTable, path: &str, create_missing: bool) -> Result<Resolved> {
	let mut parts = split(path)?;
	let name = parts.pop().ok_or_else(|| Error::InvalidArgument("empty path".into()))?.to_string();

	let mut current = ROOT_INODE;
	for (depth, part) in parts.iter().enumerate() {
		if depth >= MAX_RESOLVE_DEPTH {
			return Err(Error::InvalidArgument("path resolution depth exceeded".into()));
		}
		let mut dir_rec = table.read(current)?;
		if dir_rec.mode != Mode::Directory {
			return Err(Error::NotADirectory);
		}
		current = match dir::find(table, current, &dir_rec, part)? {
			Some(n) => n,
			None if create_missing => {
				let new_num = table.alloc(Mode::Directory)?;
				dir::insert(table, current, &mut dir_rec, part, new_num)?;
				let mut new_rec = table.read(new_num)?;
				dir::seed_dot_entries(table, new_num, &mut new_rec, current)?;
				new_num
			}
			None => return Err(Error::NotFound),
		};
	}

	let parent = table.read(current)?;
	if parent.mode != Mode::Directory {
		return Err(Error::NotADirectory);
	}
	let inode_num = dir::find(table, current, &parent, &name)?;
	Ok(Resolved { parent_num: current, parent, name, inode_num })
}
