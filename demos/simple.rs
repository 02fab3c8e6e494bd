//! Minimal walkthrough: build a tree on the in-memory page store,
//! scan it, and delete a key.

use copse::{BTree, MemPageStore, Result};

fn main() -> Result<()> {
    let mut tree = BTree::new(MemPageStore::new());

    tree.insert(b"cherry", b"dark")?;
    tree.insert(b"apple", b"red")?;
    tree.insert(b"banana", b"yellow")?;

    println!("banana -> {:?}", tree.get(b"banana")?);

    println!("all entries in order:");
    for entry in tree.iter() {
        let (key, value) = entry?;
        println!("  {} -> {}", String::from_utf8_lossy(&key), String::from_utf8_lossy(&value));
    }

    let found = tree.delete(b"banana")?;
    println!("deleted banana: {found}");
    println!("banana -> {:?}", tree.get(b"banana")?);
    println!("live pages in the store: {}", tree.store().len());

    Ok(())
}
