//! In-order traversal over a tree
//!
//! The cursor walks the tree with an explicit stack of `(node, index)`
//! frames, reading child pages lazily. Items are `Result`s: a page-store
//! failure mid-scan is yielded once and the cursor fuses.

use crate::btree::BTree;
use crate::comparator::Comparator;
use crate::error::{PageId, Result};
use crate::page::{Node, NodeType};
use crate::store::PageStore;

/// Ascending iterator over the `(key, value)` pairs of a [`BTree`].
///
/// The sentinel entry is not yielded. Created by [`BTree::iter`].
pub struct Cursor<'a, S, C> {
    tree: &'a BTree<S, C>,
    start: Option<PageId>,
    stack: Vec<(Node, u16)>,
}

impl<S: PageStore, C: Comparator> BTree<S, C> {
    /// Iterate over all entries in ascending key order
    pub fn iter(&self) -> Cursor<'_, S, C> {
        let start = if self.root().is_null() { None } else { Some(self.root()) };
        Cursor { tree: self, start, stack: Vec::new() }
    }
}

impl<S: PageStore, C: Comparator> Iterator for Cursor<'_, S, C> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(root) = self.start.take() {
            match self.tree.read_node(root) {
                Ok(node) => self.stack.push((node, 0)),
                Err(e) => return Some(Err(e)),
            }
        }

        loop {
            let (node, index) = self.stack.last_mut()?;
            let i = *index;
            if i >= node.n_keys() {
                self.stack.pop();
                continue;
            }
            *index += 1;

            let node_type = match node.node_type() {
                Ok(t) => t,
                Err(e) => {
                    self.stack.clear();
                    return Some(Err(e));
                }
            };
            match node_type {
                NodeType::Leaf => {
                    let entry: Result<(Vec<u8>, Vec<u8>)> = (|| {
                        Ok((node.get_key(i)?.to_vec(), node.get_value(i)?.to_vec()))
                    })();
                    match entry {
                        // The sentinel owns the empty key; skip it.
                        Ok((key, _)) if key.is_empty() => continue,
                        Ok(entry) => return Some(Ok(entry)),
                        Err(e) => {
                            self.stack.clear();
                            return Some(Err(e));
                        }
                    }
                }
                NodeType::Internal => {
                    let child_id = match node.get_ptr(i) {
                        Ok(id) => id,
                        Err(e) => {
                            self.stack.clear();
                            return Some(Err(e));
                        }
                    };
                    match self.tree.read_node(child_id) {
                        Ok(child) => self.stack.push((child, 0)),
                        Err(e) => {
                            self.stack.clear();
                            return Some(Err(e));
                        }
                    }
                }
            }
        }
    }
}
