//! The injected page-store contract
//!
//! The tree core performs no I/O of its own. Allocation, persistence and
//! reclamation belong to a page store supplied at construction time, which
//! keeps the core testable against a plain in-memory page table and lets
//! the surrounding system decide on durability.

use std::borrow::Cow;
use std::collections::HashMap;

use crate::error::{Error, PageId, Result};
use crate::page::PAGE_SIZE;

/// The three operations the tree core needs from its environment.
///
/// Implementations must return the exact bytes previously written for a
/// live id, never hand out `PageId::NULL`, and never reuse an id while it
/// is live. Reading a freed or unknown id is a contract violation the
/// store should surface as an error rather than undefined data.
pub trait PageStore {
    /// Read the bytes of a live page.
    fn get(&self, id: PageId) -> Result<Vec<u8>>;

    /// Store `page` (at most one page of bytes) and return a fresh id.
    fn create(&mut self, page: &[u8]) -> Result<PageId>;

    /// Release a page id. The core never reads an id again after this.
    fn del(&mut self, id: PageId) -> Result<()>;
}

/// In-memory page table, the reference [`PageStore`] for tests, benches
/// and embedders that bring their own durability layer.
#[derive(Debug, Default)]
pub struct MemPageStore {
    pages: HashMap<u64, Vec<u8>>,
    next_id: u64,
}

impl MemPageStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live pages
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Whether the store holds no pages
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Whether `id` is currently live
    pub fn contains(&self, id: PageId) -> bool {
        self.pages.contains_key(&id.0)
    }
}

impl PageStore for MemPageStore {
    fn get(&self, id: PageId) -> Result<Vec<u8>> {
        self.pages.get(&id.0).cloned().ok_or(Error::PageNotFound(id))
    }

    fn create(&mut self, page: &[u8]) -> Result<PageId> {
        if page.len() > PAGE_SIZE {
            return Err(Error::Store(Cow::Owned(format!(
                "page of {} bytes exceeds the page size {PAGE_SIZE}",
                page.len()
            ))));
        }
        self.next_id += 1;
        self.pages.insert(self.next_id, page.to_vec());
        Ok(PageId(self.next_id))
    }

    fn del(&mut self, id: PageId) -> Result<()> {
        match self.pages.remove(&id.0) {
            Some(_) => Ok(()),
            None => Err(Error::PageNotFound(id)),
        }
    }
}
