//! On-disk layout constants.
//!
//! Every quantity that depends on another is derived with a `const`
//! expression rather than hardcoded, so that changing e.g. [`BLOCK_SIZE`]
//! keeps the rest of the layout consistent.

/// Size in bytes of a single inode record, data block, or indirect/directory block.
pub const BLOCK_SIZE: usize = 4096;

/// Size in bytes of a segment file: one bitmap block plus [`ITEMS_PER_SEGMENT`] item blocks.
pub const SEGMENT_SIZE: u64 = 1024 * 1024;

/// Number of usable item slots (inodes or data blocks) per segment, after the bitmap block.
pub const ITEMS_PER_SEGMENT: usize = (SEGMENT_SIZE as usize / BLOCK_SIZE) - 1;

/// Maximum length in bytes of a single path component, not counting the NUL terminator.
pub const MAX_FILENAME_LEN: usize = 255;

/// On-disk size in bytes of one directory entry: a 4-byte inode number plus a
/// fixed-size NUL-terminated name field.
pub const DIRENT_SIZE: usize = 4 + (MAX_FILENAME_LEN + 1);

/// Number of directory entries that fit in one directory block.
pub const ENTRIES_PER_DIR_BLOCK: usize = BLOCK_SIZE / DIRENT_SIZE;

/// Number of 4-byte block-number slots in one indirect block.
pub const PTRS_PER_INDIRECT_BLOCK: usize = BLOCK_SIZE / 4;

/// Number of direct block pointers an inode record carries.
///
/// The "fill the block" choice: `2 (mode) + 8 (size) + N_DIRECT * 4 + 4
/// (single_indirect) + 4 (double_indirect)` leaves a few bytes of trailing
/// padding in one [`BLOCK_SIZE`] record. Tests must not depend on this
/// exact count; any value in `[12, 1018]` is conformant.
pub const N_DIRECT: usize = 1018;

/// Bytes of unused padding at the end of an encoded inode record.
pub const INODE_RECORD_PADDING: usize = BLOCK_SIZE - (2 + 8 + N_DIRECT * 4 + 4 + 4);

/// The global inode number of the root directory.
pub const ROOT_INODE: u32 = 0;

/// The global data block number of the root directory's first data block.
pub const ROOT_DATA_BLOCK: u32 = 0;

/// Safety cap on path resolution depth, guarding against pathological inputs.
pub const MAX_RESOLVE_DEPTH: usize = 4096;

const _: () = assert!(N_DIRECT >= 12 && N_DIRECT <= 1018);
