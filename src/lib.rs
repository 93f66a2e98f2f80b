//! ExFS2: a user-space, single-volume file store persisted as a family of
//! fixed-size segment files in the host filesystem.
//!
//! See [`volume::Volume`] for the entry point; [`ops`] holds the CLI-facing
//! operations (add/extract/remove/list/debug) built on top of it.

pub mod bitmap;
pub mod block;
pub mod dir;
pub mod error;
pub mod inode;
pub mod layout;
pub mod ops;
pub mod path;
pub mod segment;
pub mod volume;

pub use error::{Error, Result};
pub use volume::Volume;
