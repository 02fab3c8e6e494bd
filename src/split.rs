//! Partitioning oversized nodes back into page-sized pieces
//!
//! An insert (or a separator replacement during delete) may leave a scratch
//! node larger than one page. [`split3`] cuts it into at most three
//! page-sized nodes; the size limits on keys and values guarantee three
//! always suffice for a two-page input.

use tracing::trace;

use crate::error::{Error, Result};
use crate::node::copy_range;
use crate::page::{Node, PAGE_SIZE};

/// Split `old` into two nodes. The cut point starts at the byte-balanced
/// midpoint, then moves left until the left half fits a page and right
/// until the right half does. The right half is guaranteed to fit; the left
/// half may still exceed one page and require a second pass.
fn split2(old: &Node) -> Result<(Node, Node)> {
    let n = old.n_keys();
    if n < 2 {
        return Err(Error::SplitBudget { nbytes: old.nbytes() });
    }

    let total = old.nbytes();
    let mut n_left: u16 = 1;
    while n_left < n - 1 && old.prefix_bytes(n_left) < total / 2 {
        n_left += 1;
    }
    while n_left > 1 && old.prefix_bytes(n_left) > PAGE_SIZE {
        n_left -= 1;
    }
    while n_left < n - 1 && old.suffix_bytes(n_left) > PAGE_SIZE {
        n_left += 1;
    }
    if old.suffix_bytes(n_left) > PAGE_SIZE {
        return Err(Error::SplitBudget { nbytes: old.suffix_bytes(n_left) });
    }

    let node_type = old.node_type()?;
    let mut left = Node::scratch(2 * PAGE_SIZE);
    left.set_header(node_type, n_left);
    copy_range(&mut left, old, 0, 0, n_left)?;

    let mut right = Node::scratch(PAGE_SIZE);
    right.set_header(node_type, n - n_left);
    copy_range(&mut right, old, 0, n_left, n - n_left)?;

    Ok((left, right))
}

/// Partition a node of up to two pages into 1-3 page-sized nodes whose
/// concatenation preserves the original entries and their order.
pub fn split3(node: Node) -> Result<Vec<Node>> {
    if node.nbytes() <= PAGE_SIZE {
        return Ok(vec![node]);
    }

    let (left, right) = split2(&node)?;
    if left.nbytes() <= PAGE_SIZE {
        trace!(parts = 2, "split oversized node");
        return Ok(vec![left, right]);
    }

    let (left_left, middle) = split2(&left)?;
    if left_left.nbytes() > PAGE_SIZE {
        return Err(Error::SplitBudget { nbytes: left_left.nbytes() });
    }
    trace!(parts = 3, "split oversized node");
    Ok(vec![left_left, middle, right])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PageId;
    use crate::node::append_entry;
    use crate::page::NodeType;

    fn leaf_of(entries: &[(Vec<u8>, Vec<u8>)]) -> Node {
        let mut node = Node::scratch(2 * PAGE_SIZE);
        node.set_header(NodeType::Leaf, entries.len() as u16);
        for (i, (k, v)) in entries.iter().enumerate() {
            append_entry(&mut node, i as u16, PageId::NULL, k, v).unwrap();
        }
        node
    }

    fn all_entries(parts: &[Node]) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut out = Vec::new();
        for part in parts {
            for i in 0..part.n_keys() {
                out.push((part.get_key(i).unwrap().to_vec(), part.get_value(i).unwrap().to_vec()));
            }
        }
        out
    }

    #[test]
    fn test_fits_one_page_unchanged() {
        let entries: Vec<_> =
            (0..10u8).map(|i| (vec![b'k', i], vec![i; 16])).collect();
        let node = leaf_of(&entries);
        let parts = split3(node).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(all_entries(&parts), entries);
    }

    #[test]
    fn test_two_way_split() {
        // ~40 entries of ~150 bytes overflow one page but not two.
        let entries: Vec<_> = (0..40u8)
            .map(|i| (format!("key{i:03}").into_bytes(), vec![i; 140]))
            .collect();
        let node = leaf_of(&entries);
        assert!(node.nbytes() > PAGE_SIZE);

        let parts = split3(node).unwrap();
        assert_eq!(parts.len(), 2);
        for part in &parts {
            assert!(part.nbytes() <= PAGE_SIZE);
            assert!(part.n_keys() >= 1);
        }
        assert_eq!(all_entries(&parts), entries);
    }

    #[test]
    fn test_three_way_split_on_large_entries() {
        // Three entries of ~2.5KB each: any two together overflow a page,
        // so the first half-split leaves an oversized left side.
        let entries: Vec<_> = (0..3u8)
            .map(|i| (format!("big{i}").into_bytes(), vec![i; 2500]))
            .collect();
        let node = leaf_of(&entries);
        assert!(node.nbytes() > PAGE_SIZE);

        let parts = split3(node).unwrap();
        assert_eq!(parts.len(), 3);
        for part in &parts {
            assert!(part.nbytes() <= PAGE_SIZE);
            assert_eq!(part.n_keys(), 1);
        }
        assert_eq!(all_entries(&parts), entries);
    }

    #[test]
    fn test_split_preserves_internal_pointers() {
        let mut node = Node::scratch(2 * PAGE_SIZE);
        let count = 40u16;
        node.set_header(NodeType::Internal, count);
        for i in 0..count {
            let key = format!("sep{i:03}{}", "x".repeat(120)).into_bytes();
            append_entry(&mut node, i, PageId(100 + i as u64), &key, b"").unwrap();
        }
        assert!(node.nbytes() > PAGE_SIZE);

        let parts = split3(node).unwrap();
        assert!(parts.len() >= 2);
        let mut next = 100u64;
        for part in &parts {
            for i in 0..part.n_keys() {
                assert_eq!(part.get_ptr(i).unwrap(), PageId(next));
                next += 1;
            }
        }
        assert_eq!(next, 100 + count as u64);
    }
}
