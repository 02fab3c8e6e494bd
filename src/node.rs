//! Node assembly for copy-on-write updates
//!
//! A mutation never edits a published node. Each operation assembles a
//! replacement buffer from ranges of the old node plus the changed entry,
//! preserving sort order. The destination is always a scratch [`Node`]
//! sized by the caller; writes that would not fit are reported, not
//! panicked on.

use crate::error::{Error, PageId, Result};
use crate::page::{Node, NodeType};

/// A parent-side reference to a freshly written child page: the child's
/// first key (its separator) and its page id.
#[derive(Debug, Clone, Copy)]
pub struct ChildLink<'a> {
    /// Separator key: the first key of the child's subtree
    pub key: &'a [u8],
    /// Page id the child was written under
    pub page: PageId,
}

/// Write one entry at logical position `i`: the child pointer (internal
/// nodes), the key, and the value. Entries must be appended in order.
pub fn append_entry(dst: &mut Node, i: u16, ptr: PageId, key: &[u8], value: &[u8]) -> Result<()> {
    if dst.node_type()? == NodeType::Internal {
        dst.set_ptr(i, ptr)?;
    }
    dst.write_entry(i, key, value)
}

/// Copy `n` consecutive entries from `src` starting at `src_start` into
/// `dst` starting at `dst_start`, pointers included.
pub fn copy_range(dst: &mut Node, src: &Node, dst_start: u16, src_start: u16, n: u16) -> Result<()> {
    for j in 0..n {
        let ptr = match src.node_type()? {
            NodeType::Internal => src.get_ptr(src_start + j)?,
            NodeType::Leaf => PageId::NULL,
        };
        append_entry(dst, dst_start + j, ptr, src.get_key(src_start + j)?, src.get_value(src_start + j)?)?;
    }
    Ok(())
}

/// Build a leaf with `(key, value)` inserted at position `i`.
pub fn leaf_insert(dst: &mut Node, old: &Node, i: u16, key: &[u8], value: &[u8]) -> Result<()> {
    dst.set_header(NodeType::Leaf, old.n_keys() + 1);
    copy_range(dst, old, 0, 0, i)?;
    append_entry(dst, i, PageId::NULL, key, value)?;
    copy_range(dst, old, i + 1, i, old.n_keys() - i)
}

/// Build a leaf with entry `i` replaced by `(key, value)`.
pub fn leaf_update(dst: &mut Node, old: &Node, i: u16, key: &[u8], value: &[u8]) -> Result<()> {
    dst.set_header(NodeType::Leaf, old.n_keys());
    copy_range(dst, old, 0, 0, i)?;
    append_entry(dst, i, PageId::NULL, key, value)?;
    copy_range(dst, old, i + 1, i + 1, old.n_keys() - (i + 1))
}

/// Build a leaf with entry `i` removed.
pub fn leaf_delete(dst: &mut Node, old: &Node, i: u16) -> Result<()> {
    dst.set_header(NodeType::Leaf, old.n_keys() - 1);
    copy_range(dst, old, 0, 0, i)?;
    copy_range(dst, old, i, i + 1, old.n_keys() - (i + 1))
}

/// Build an internal node with child entry `i` replaced by `links` (the 1-3
/// pages a child became after splitting). Subsequent entries shift right.
pub fn node_replace_child(dst: &mut Node, old: &Node, i: u16, links: &[ChildLink<'_>]) -> Result<()> {
    dst.set_header(NodeType::Internal, old.n_keys() + links.len() as u16 - 1);
    copy_range(dst, old, 0, 0, i)?;
    for (j, link) in links.iter().enumerate() {
        append_entry(dst, i + j as u16, link.page, link.key, b"")?;
    }
    copy_range(dst, old, i + links.len() as u16, i + 1, old.n_keys() - (i + 1))
}

/// Build an internal node with the adjacent child entries `i` and `i + 1`
/// collapsed into the single merged child `link`. The entry count shrinks
/// by one and later entries shift left.
pub fn node_replace_two(dst: &mut Node, old: &Node, i: u16, link: ChildLink<'_>) -> Result<()> {
    dst.set_header(NodeType::Internal, old.n_keys() - 1);
    copy_range(dst, old, 0, 0, i)?;
    append_entry(dst, i, link.page, link.key, b"")?;
    copy_range(dst, old, i + 1, i + 2, old.n_keys() - (i + 2))
}

/// Build an internal node with child entry `i` dropped (the child drained).
pub fn node_remove_child(dst: &mut Node, old: &Node, i: u16) -> Result<()> {
    dst.set_header(NodeType::Internal, old.n_keys() - 1);
    copy_range(dst, old, 0, 0, i)?;
    copy_range(dst, old, i, i + 1, old.n_keys() - (i + 1))
}

/// Concatenate two same-type siblings into `dst`, `left` entries first.
pub fn node_merge(dst: &mut Node, left: &Node, right: &Node) -> Result<()> {
    let node_type = left.node_type()?;
    if node_type != right.node_type()? {
        return Err(Error::Corruption {
            details: "merge of mismatched node types".into(),
            page_id: None,
        });
    }
    dst.set_header(node_type, left.n_keys() + right.n_keys());
    copy_range(dst, left, 0, 0, left.n_keys())?;
    copy_range(dst, right, left.n_keys(), 0, right.n_keys())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PAGE_SIZE;

    fn leaf(entries: &[(&[u8], &[u8])]) -> Node {
        let mut node = Node::scratch(PAGE_SIZE);
        node.set_header(NodeType::Leaf, entries.len() as u16);
        for (i, (k, v)) in entries.iter().enumerate() {
            append_entry(&mut node, i as u16, PageId::NULL, k, v).unwrap();
        }
        node
    }

    fn keys(node: &Node) -> Vec<Vec<u8>> {
        (0..node.n_keys()).map(|i| node.get_key(i).unwrap().to_vec()).collect()
    }

    #[test]
    fn test_leaf_insert_positions() {
        let old = leaf(&[(b"b", b"2"), (b"d", b"4")]);

        let mut front = Node::scratch(PAGE_SIZE);
        leaf_insert(&mut front, &old, 0, b"a", b"1").unwrap();
        assert_eq!(keys(&front), [b"a".to_vec(), b"b".to_vec(), b"d".to_vec()]);

        let mut middle = Node::scratch(PAGE_SIZE);
        leaf_insert(&mut middle, &old, 1, b"c", b"3").unwrap();
        assert_eq!(keys(&middle), [b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]);
        assert_eq!(middle.get_value(1).unwrap(), b"3");

        let mut back = Node::scratch(PAGE_SIZE);
        leaf_insert(&mut back, &old, 2, b"e", b"5").unwrap();
        assert_eq!(keys(&back), [b"b".to_vec(), b"d".to_vec(), b"e".to_vec()]);
    }

    #[test]
    fn test_leaf_update_keeps_count() {
        let old = leaf(&[(b"a", b"1"), (b"b", b"2")]);
        let mut next = Node::scratch(PAGE_SIZE);
        leaf_update(&mut next, &old, 1, b"b", b"two").unwrap();
        assert_eq!(next.n_keys(), 2);
        assert_eq!(next.get_value(0).unwrap(), b"1");
        assert_eq!(next.get_value(1).unwrap(), b"two");
    }

    #[test]
    fn test_leaf_delete() {
        let old = leaf(&[(b"a", b"1"), (b"b", b"2"), (b"c", b"3")]);
        let mut next = Node::scratch(PAGE_SIZE);
        leaf_delete(&mut next, &old, 1).unwrap();
        assert_eq!(keys(&next), [b"a".to_vec(), b"c".to_vec()]);
        assert_eq!(next.get_value(1).unwrap(), b"3");
    }

    fn internal(entries: &[(&[u8], u64)]) -> Node {
        let mut node = Node::scratch(PAGE_SIZE);
        node.set_header(NodeType::Internal, entries.len() as u16);
        for (i, (k, p)) in entries.iter().enumerate() {
            append_entry(&mut node, i as u16, PageId(*p), k, b"").unwrap();
        }
        node
    }

    #[test]
    fn test_node_replace_child_with_split() {
        let old = internal(&[(b"", 10), (b"m", 20), (b"t", 30)]);
        let mut next = Node::scratch(PAGE_SIZE);
        let links = [
            ChildLink { key: b"m", page: PageId(21) },
            ChildLink { key: b"p", page: PageId(22) },
        ];
        node_replace_child(&mut next, &old, 1, &links).unwrap();

        assert_eq!(next.n_keys(), 4);
        assert_eq!(keys(&next), [b"".to_vec(), b"m".to_vec(), b"p".to_vec(), b"t".to_vec()]);
        assert_eq!(next.get_ptr(0).unwrap(), PageId(10));
        assert_eq!(next.get_ptr(1).unwrap(), PageId(21));
        assert_eq!(next.get_ptr(2).unwrap(), PageId(22));
        assert_eq!(next.get_ptr(3).unwrap(), PageId(30));
    }

    #[test]
    fn test_node_replace_two_collapses_merge() {
        let old = internal(&[(b"", 10), (b"m", 20), (b"t", 30)]);
        let mut next = Node::scratch(PAGE_SIZE);
        node_replace_two(&mut next, &old, 0, ChildLink { key: b"", page: PageId(11) }).unwrap();

        assert_eq!(next.n_keys(), 2);
        assert_eq!(keys(&next), [b"".to_vec(), b"t".to_vec()]);
        assert_eq!(next.get_ptr(0).unwrap(), PageId(11));
        assert_eq!(next.get_ptr(1).unwrap(), PageId(30));
    }

    #[test]
    fn test_node_merge_concatenates() {
        let left = leaf(&[(b"a", b"1"), (b"b", b"2")]);
        let right = leaf(&[(b"c", b"3")]);
        let mut merged = Node::scratch(PAGE_SIZE);
        node_merge(&mut merged, &left, &right).unwrap();
        assert_eq!(keys(&merged), [b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn test_node_merge_rejects_mixed_types() {
        let left = leaf(&[(b"a", b"1")]);
        let right = internal(&[(b"", 10)]);
        let mut merged = Node::scratch(PAGE_SIZE);
        assert!(matches!(
            node_merge(&mut merged, &left, &right),
            Err(Error::Corruption { .. })
        ));
    }
}
