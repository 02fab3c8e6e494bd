//! Copy-on-write B-tree operations
//!
//! The walker descends from the root, rebuilds every node on the path to
//! the touched leaf through the node builder, resolves overflow with the
//! splitter and underflow with the merge policy, and finally swings the
//! root pointer. Pages are never edited in place: each level writes a
//! replacement page and frees the one it supersedes, so an interrupted
//! call leaves the previous tree intact under the old root.

use std::cmp::Ordering;
use std::marker::PhantomData;

use tracing::{debug, trace};

use crate::comparator::{Comparator, LexicographicComparator};
use crate::error::{Error, PageId, Result};
use crate::node::{self, ChildLink};
use crate::page::{Node, NodeType, HEADER_SIZE, MAX_KEY_SIZE, MAX_VALUE_SIZE, PAGE_SIZE};
use crate::split::split3;
use crate::store::PageStore;

/// Merge threshold: a child at or below a quarter page is a candidate for
/// merging with a sibling.
pub const MERGE_THRESHOLD: usize = PAGE_SIZE / 4;

/// Maximum depth accepted while walking, guarding against corrupt cycles
/// and stack exhaustion. Real trees stay far below this.
pub const MAX_TREE_DEPTH: usize = 100;

/// Which sibling an underflowing child merges into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MergeDir {
    Left,
    Right,
}

/// A copy-on-write B-tree over an injected page store.
///
/// The handle owns the root page id, the only long-lived mutable state.
/// All node storage goes through the [`PageStore`], so durability and
/// reclamation policy stay outside the core.
pub struct BTree<S, C = LexicographicComparator> {
    store: S,
    root: PageId,
    _comparator: PhantomData<C>,
}

impl<S: PageStore> BTree<S> {
    /// Create an empty tree on `store`, ordered lexicographically
    pub fn new(store: S) -> Self {
        Self::open(store, PageId::NULL)
    }

    /// Re-attach to a tree whose root page id is already known
    pub fn open(store: S, root: PageId) -> Self {
        Self::open_with_comparator(store, root)
    }
}

impl<S: PageStore, C: Comparator> BTree<S, C> {
    /// Create an empty tree ordered by a custom comparator
    pub fn with_comparator(store: S) -> Self {
        Self::open_with_comparator(store, PageId::NULL)
    }

    /// Re-attach under a custom comparator. The comparator must match the
    /// one the tree was built with.
    pub fn open_with_comparator(store: S, root: PageId) -> Self {
        Self { store, root, _comparator: PhantomData }
    }

    /// Current root page id; `PageId::NULL` for an empty tree
    pub fn root(&self) -> PageId {
        self.root
    }

    /// Access the underlying page store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Tear down the handle, returning the store and the root page id
    pub fn into_parts(self) -> (S, PageId) {
        (self.store, self.root)
    }

    pub(crate) fn read_node(&self, id: PageId) -> Result<Node> {
        Node::from_page(id, self.store.get(id)?)
    }

    /// Insert `key`/`value`, replacing the value if the key exists.
    ///
    /// Fails with a size-limit error when the key or value exceeds its
    /// maximum; nothing is mutated in that case.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        check_key(key)?;
        check_value(value)?;

        if self.root.is_null() {
            // First insert: seed the leaf with the sentinel entry, so the
            // leftmost position can never precede every key on a descent.
            let mut root = Node::scratch(PAGE_SIZE);
            root.set_header(NodeType::Leaf, 2);
            node::append_entry(&mut root, 0, PageId::NULL, b"", b"")?;
            node::append_entry(&mut root, 1, PageId::NULL, key, value)?;
            self.root = self.store.create(root.encoded())?;
            debug!(root = %self.root, "created root leaf");
            return Ok(());
        }

        let root_node = self.read_node(self.root)?;
        let next = self.insert_at(&root_node, key, value, 0)?;
        let parts = split3(next)?;

        let old_root = self.root;
        let new_root = if parts.len() == 1 {
            self.store.create(parts[0].encoded())?
        } else {
            self.grow_root(&parts)?
        };
        self.store.del(old_root)?;
        self.root = new_root;
        Ok(())
    }

    fn insert_at(&mut self, old: &Node, key: &[u8], value: &[u8], depth: usize) -> Result<Node> {
        if depth >= MAX_TREE_DEPTH {
            return Err(depth_error(None));
        }
        let mut next = Node::scratch(2 * PAGE_SIZE);
        match old.node_type()? {
            NodeType::Leaf => match lookup_le::<C>(old, key)? {
                Some(i) if C::compare(old.get_key(i)?, key) == Ordering::Equal => {
                    trace!(index = i, "leaf update");
                    node::leaf_update(&mut next, old, i, key, value)?;
                }
                Some(i) => {
                    trace!(index = i + 1, "leaf insert");
                    node::leaf_insert(&mut next, old, i + 1, key, value)?;
                }
                // Key precedes the whole leaf. Unreachable under the
                // sentinel invariant, but correct for foreign roots.
                None => node::leaf_insert(&mut next, old, 0, key, value)?,
            },
            NodeType::Internal => {
                let i = lookup_le::<C>(old, key)?.unwrap_or(0);
                let child_id = old.get_ptr(i)?;
                let child = self.read_node(child_id)?;
                let sub = self.insert_at(&child, key, value, depth + 1)?;
                let parts = split3(sub)?;
                self.store.del(child_id)?;
                if parts.len() > 1 {
                    debug!(child = %child_id, parts = parts.len(), "child split");
                }
                let mut links = Vec::with_capacity(parts.len());
                for part in &parts {
                    links.push(ChildLink {
                        key: part.get_key(0)?,
                        page: self.store.create(part.encoded())?,
                    });
                }
                node::node_replace_child(&mut next, old, i, &links)?;
            }
        }
        Ok(next)
    }

    /// Delete `key`. Returns `false` when the key was absent, in which
    /// case the tree is untouched.
    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        check_key(key)?;
        if self.root.is_null() {
            return Ok(false);
        }

        let root_node = self.read_node(self.root)?;
        let Some(updated) = self.delete_at(&root_node, key, 0)? else {
            return Ok(false);
        };

        let old_root = self.root;
        let mut parts = split3(updated)?;
        let new_root = if parts.len() > 1 {
            self.grow_root(&parts)?
        } else {
            let updated = parts.remove(0);
            if updated.n_keys() == 0 {
                debug!("tree drained to empty");
                PageId::NULL
            } else if updated.node_type()? == NodeType::Internal && updated.n_keys() == 1 {
                // The root kept a single child: drop a level.
                let child = updated.get_ptr(0)?;
                debug!(root = %child, "tree height shrank");
                child
            } else {
                self.store.create(updated.encoded())?
            }
        };
        self.store.del(old_root)?;
        self.root = new_root;
        Ok(true)
    }

    fn delete_at(&mut self, old: &Node, key: &[u8], depth: usize) -> Result<Option<Node>> {
        if depth >= MAX_TREE_DEPTH {
            return Err(depth_error(None));
        }
        match old.node_type()? {
            NodeType::Leaf => {
                let Some(i) = lookup_le::<C>(old, key)? else {
                    return Ok(None);
                };
                if C::compare(old.get_key(i)?, key) != Ordering::Equal {
                    return Ok(None);
                }
                let mut next = Node::scratch(PAGE_SIZE);
                node::leaf_delete(&mut next, old, i)?;
                Ok(Some(next))
            }
            NodeType::Internal => {
                // A key preceding the whole subtree cannot be present.
                let Some(i) = lookup_le::<C>(old, key)? else {
                    return Ok(None);
                };
                let child_id = old.get_ptr(i)?;
                let child = self.read_node(child_id)?;
                let Some(updated) = self.delete_at(&child, key, depth + 1)? else {
                    return Ok(None);
                };
                self.store.del(child_id)?;

                // Replacing the separator can grow the parent, so the
                // rebuilt child passes through the splitter like on insert.
                let mut parts = split3(updated)?;
                let mut next = Node::scratch(2 * PAGE_SIZE);
                if parts.len() == 1 {
                    let updated = parts.remove(0);
                    self.fold_child(&mut next, old, i, updated)?;
                } else {
                    let mut links = Vec::with_capacity(parts.len());
                    for part in &parts {
                        links.push(ChildLink {
                            key: part.get_key(0)?,
                            page: self.store.create(part.encoded())?,
                        });
                    }
                    node::node_replace_child(&mut next, old, i, &links)?;
                }
                Ok(Some(next))
            }
        }
    }

    /// Fold a single rebuilt child into a copy of its parent, merging with
    /// a sibling or dropping the entry when the child drained.
    fn fold_child(&mut self, next: &mut Node, parent: &Node, i: u16, updated: Node) -> Result<()> {
        if updated.n_keys() == 0 {
            debug!(index = i, "dropping drained child");
            return node::node_remove_child(next, parent, i);
        }

        if let Some((dir, sibling_id, sibling)) = self.should_merge(parent, i, &updated)? {
            let mut merged = Node::scratch(PAGE_SIZE);
            let at = match dir {
                MergeDir::Left => {
                    node::node_merge(&mut merged, &sibling, &updated)?;
                    i - 1
                }
                MergeDir::Right => {
                    node::node_merge(&mut merged, &updated, &sibling)?;
                    i
                }
            };
            let merged_id = self.store.create(merged.encoded())?;
            self.store.del(sibling_id)?;
            debug!(sibling = %sibling_id, merged = %merged_id, ?dir, "merged underflowing child");
            return node::node_replace_two(
                next,
                parent,
                at,
                ChildLink { key: merged.get_key(0)?, page: merged_id },
            );
        }

        let id = self.store.create(updated.encoded())?;
        node::node_replace_child(next, parent, i, &[ChildLink { key: updated.get_key(0)?, page: id }])
    }

    /// Decide whether the rebuilt child at `i` should merge with a
    /// sibling. Merging is opportunistic: only attempted below the
    /// threshold, and only when the combined node is guaranteed to fit one
    /// page, so a merge can never bounce back into a split.
    fn should_merge(
        &self,
        parent: &Node,
        i: u16,
        updated: &Node,
    ) -> Result<Option<(MergeDir, PageId, Node)>> {
        if updated.nbytes() > MERGE_THRESHOLD {
            return Ok(None);
        }

        if i > 0 {
            let sibling_id = parent.get_ptr(i - 1)?;
            let sibling = self.read_node(sibling_id)?;
            if sibling.nbytes() + updated.nbytes() - HEADER_SIZE <= PAGE_SIZE {
                return Ok(Some((MergeDir::Left, sibling_id, sibling)));
            }
        }

        if i + 1 < parent.n_keys() {
            let sibling_id = parent.get_ptr(i + 1)?;
            let sibling = self.read_node(sibling_id)?;
            if sibling.nbytes() + updated.nbytes() - HEADER_SIZE <= PAGE_SIZE {
                return Ok(Some((MergeDir::Right, sibling_id, sibling)));
            }
        }

        Ok(None)
    }

    /// Write `parts` out and build a fresh internal root over them.
    fn grow_root(&mut self, parts: &[Node]) -> Result<PageId> {
        let mut root = Node::scratch(PAGE_SIZE);
        root.set_header(NodeType::Internal, parts.len() as u16);
        for (i, part) in parts.iter().enumerate() {
            let id = self.store.create(part.encoded())?;
            node::append_entry(&mut root, i as u16, id, part.get_key(0)?, b"")?;
        }
        let id = self.store.create(root.encoded())?;
        debug!(root = %id, children = parts.len(), "grew new root");
        Ok(id)
    }

    /// Point lookup. Returns the stored value, or `None` when the key is
    /// absent (the reserved empty key is always absent).
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if self.root.is_null() || key.is_empty() {
            return Ok(None);
        }
        let mut page_id = self.root;
        for _ in 0..MAX_TREE_DEPTH {
            let node = self.read_node(page_id)?;
            let Some(i) = lookup_le::<C>(&node, key)? else {
                return Ok(None);
            };
            match node.node_type()? {
                NodeType::Leaf => {
                    if C::compare(node.get_key(i)?, key) == Ordering::Equal {
                        return Ok(Some(node.get_value(i)?.to_vec()));
                    }
                    return Ok(None);
                }
                NodeType::Internal => page_id = node.get_ptr(i)?,
            }
        }
        Err(depth_error(Some(page_id)))
    }

    /// Height of the tree: 0 when empty, 1 for a lone leaf root.
    pub fn depth(&self) -> Result<usize> {
        let mut depth = 0;
        let mut page_id = self.root;
        while !page_id.is_null() {
            if depth >= MAX_TREE_DEPTH {
                return Err(depth_error(Some(page_id)));
            }
            depth += 1;
            let node = self.read_node(page_id)?;
            match node.node_type()? {
                NodeType::Leaf => break,
                NodeType::Internal => page_id = node.get_ptr(0)?,
            }
        }
        Ok(depth)
    }

    /// Validate the structural invariants of the whole tree: every stored
    /// node within the page budget, keys strictly increasing, separators
    /// matching each child's first key, and all leaves at the same depth.
    pub fn check_invariants(&self) -> Result<()> {
        if self.root.is_null() {
            return Ok(());
        }
        self.check_subtree(self.root, None, 0)?;
        Ok(())
    }

    fn check_subtree(&self, page_id: PageId, lower: Option<&[u8]>, depth: usize) -> Result<usize> {
        if depth >= MAX_TREE_DEPTH {
            return Err(depth_error(Some(page_id)));
        }
        let node = self.read_node(page_id)?;
        let corrupt =
            |details: String| Error::Corruption { details, page_id: Some(page_id) };

        if node.nbytes() > PAGE_SIZE {
            return Err(corrupt(format!(
                "stored node of {} bytes exceeds the page size",
                node.nbytes()
            )));
        }
        if node.n_keys() == 0 {
            return Err(corrupt("stored node has no entries".into()));
        }
        if let Some(lower) = lower {
            if C::compare(node.get_key(0)?, lower) == Ordering::Less {
                return Err(corrupt("first key sorts below the parent separator".into()));
            }
        }
        for i in 1..node.n_keys() {
            if C::compare(node.get_key(i - 1)?, node.get_key(i)?) != Ordering::Less {
                return Err(corrupt(format!("keys out of order at entry {i}")));
            }
        }

        match node.node_type()? {
            NodeType::Leaf => Ok(1),
            NodeType::Internal => {
                let mut child_depth = None;
                for i in 0..node.n_keys() {
                    let sep = node.get_key(i)?;
                    let child_id = node.get_ptr(i)?;
                    let child = self.read_node(child_id)?;
                    if C::compare(child.get_key(0)?, sep) != Ordering::Equal {
                        return Err(corrupt(format!(
                            "separator {i} does not match the child's first key"
                        )));
                    }
                    let d = self.check_subtree(child_id, Some(sep), depth + 1)?;
                    if *child_depth.get_or_insert(d) != d {
                        return Err(corrupt("children at different depths".into()));
                    }
                }
                Ok(child_depth.unwrap_or(0) + 1)
            }
        }
    }
}

/// Binary search for the last entry whose key is `<=` the search key.
/// Returns `None` when every key in the node is greater; for internal
/// nodes the returned index selects the child subtree to descend into.
pub(crate) fn lookup_le<C: Comparator>(node: &Node, key: &[u8]) -> Result<Option<u16>> {
    let mut lo: u16 = 0;
    let mut hi: u16 = node.n_keys();
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        match C::compare(node.get_key(mid)?, key) {
            Ordering::Greater => hi = mid,
            _ => lo = mid + 1,
        }
    }
    Ok(lo.checked_sub(1))
}

fn check_key(key: &[u8]) -> Result<()> {
    if key.is_empty() || key.len() > MAX_KEY_SIZE {
        return Err(Error::KeySizeLimit { size: key.len(), max: MAX_KEY_SIZE });
    }
    Ok(())
}

fn check_value(value: &[u8]) -> Result<()> {
    if value.len() > MAX_VALUE_SIZE {
        return Err(Error::ValueSizeLimit { size: value.len(), max: MAX_VALUE_SIZE });
    }
    Ok(())
}

fn depth_error(page_id: Option<PageId>) -> Error {
    Error::Corruption {
        details: format!("tree exceeds maximum depth {MAX_TREE_DEPTH}"),
        page_id,
    }
}
