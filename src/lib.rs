//! Copy-on-write B-tree storage core for embedded key-value stores
//!
//! This crate implements the node layer of an embedded key-value store: a
//! B-tree whose nodes are serialized into fixed-size pages and whose every
//! mutation is copy-on-write. Page allocation, durability and reclamation
//! are injected through the [`PageStore`] trait, so the core runs the same
//! against a memory-mapped file, a write-ahead-logged pager, or the bundled
//! in-memory table.
//!
//! ```
//! use copse::{BTree, MemPageStore};
//!
//! # fn main() -> copse::Result<()> {
//! let mut tree = BTree::new(MemPageStore::new());
//! tree.insert(b"hello", b"world")?;
//! assert_eq!(tree.get(b"hello")?.as_deref(), Some(&b"world"[..]));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod btree;
pub mod comparator;
pub mod cursor;
pub mod error;
pub mod node;
pub mod page;
pub mod split;
pub mod store;

// Re-exports
pub use btree::{BTree, MAX_TREE_DEPTH, MERGE_THRESHOLD};
pub use comparator::{Comparator, LexicographicComparator};
pub use cursor::Cursor;
pub use error::{Error, PageId, Result};
pub use page::{Node, NodeType, HEADER_SIZE, MAX_KEY_SIZE, MAX_VALUE_SIZE, PAGE_SIZE};
pub use store::{MemPageStore, PageStore};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
