//! Integration tests for removal from trees shared between roots.
//!
//! A snapshot is an extra reference to a root. Removing from either root
//! must leave the other exactly as it was.

mod common;

use common::{entries, init_tracing, shuffled};
use parking_lot::Mutex;
use thinmeta::btree::{check_tree, BTree, CheckOptions, DataBlockValue, TreeBuilder, U64Value};
use thinmeta::{BlockId, CoreSpaceMap, SpaceMap, TransactionManager};

const STRICT: CheckOptions = CheckOptions { min_occupancy: true };

fn all_keys(tree: &BTree<'_>, root: BlockId, candidates: &[u64]) -> Vec<u64> {
    candidates
        .iter()
        .copied()
        .filter(|&k| tree.contains(root, k).unwrap())
        .collect()
}

#[test]
fn test_snapshot_survives_removals_from_origin() {
    init_tracing();
    let tm = TransactionManager::in_memory(256);
    let tree = BTree::new(&tm, &U64Value);
    let input = entries(3000, 1);
    let keys: Vec<u64> = input.iter().map(|(k, _)| *k).collect();

    let snap = TreeBuilder::new(&tree).build(&input).unwrap();
    let snap_report = check_tree(&tree, snap, &STRICT).unwrap();
    tm.inc(snap).unwrap();

    let mut origin = snap;
    for &key in shuffled(keys.clone(), 3).iter().take(1500) {
        origin = tree.remove(origin, key).unwrap();
    }

    assert_ne!(origin, snap);
    assert_eq!(check_tree(&tree, snap, &STRICT).unwrap(), snap_report);
    assert_eq!(all_keys(&tree, snap, &keys).len(), 3000);
    assert_eq!(check_tree(&tree, origin, &STRICT).unwrap().entries, 1500);
    assert_eq!(tm.block_manager().held_locks(), 0);
}

#[test]
fn test_both_roots_diverge_independently() {
    let tm = TransactionManager::in_memory(128);
    let tree = BTree::new(&tm, &U64Value);
    let input = entries(1000, 1);
    let keys: Vec<u64> = input.iter().map(|(k, _)| *k).collect();

    let base = TreeBuilder::new(&tree).build(&input).unwrap();
    tm.inc(base).unwrap();

    let mut evens = base;
    let mut odds = base;
    for &k in &keys {
        if k % 2 == 1 {
            evens = tree.remove(evens, k).unwrap();
        } else {
            odds = tree.remove(odds, k).unwrap();
        }
    }

    let even_keys = all_keys(&tree, evens, &keys);
    let odd_keys = all_keys(&tree, odds, &keys);
    assert_eq!(even_keys, (0..1000).step_by(2).collect::<Vec<_>>());
    assert_eq!(odd_keys, (1..1000).step_by(2).collect::<Vec<_>>());
    check_tree(&tree, evens, &STRICT).unwrap();
    check_tree(&tree, odds, &STRICT).unwrap();
}

#[test]
fn test_delete_tree_after_divergence_frees_all_blocks() {
    let tm = TransactionManager::in_memory(128);
    let tree = BTree::new(&tm, &U64Value);
    let input = entries(1200, 1);

    let snap = TreeBuilder::new(&tree).build(&input).unwrap();
    tm.inc(snap).unwrap();

    let mut origin = snap;
    for k in (0..1200).step_by(7) {
        origin = tree.remove(origin, k).unwrap();
    }

    let snap_blocks = check_tree(&tree, snap, &STRICT).unwrap().blocks;
    let origin_blocks = check_tree(&tree, origin, &STRICT).unwrap().blocks;
    assert!(tm.free_count() >= 128 - snap_blocks - origin_blocks);

    tree.delete_tree(origin).unwrap();
    assert_eq!(tm.free_count() + snap_blocks, 128);
    check_tree(&tree, snap, &STRICT).unwrap();

    tree.delete_tree(snap).unwrap();
    assert_eq!(tm.free_count(), 128);
}

#[test]
fn test_shadowing_duplicates_data_references() {
    let data = Mutex::new(CoreSpaceMap::new(600));
    let values: Vec<(u64, [u8; 8])> = (0..600u64)
        .map(|k| (k, data.lock().new_block().unwrap().to_le_bytes()))
        .collect();

    let tm = TransactionManager::in_memory(64);
    let vt = DataBlockValue::new(&data);
    let tree = BTree::new(&tm, &vt);

    let snap = TreeBuilder::new(&tree).build(&values).unwrap();
    tm.inc(snap).unwrap();

    // Copying the leaf holding key 10 gives every value in it a second
    // owner; only the removed one loses the new owner again.
    let origin = tree.remove(snap, 10).unwrap();
    let removed = BlockId::from_le_bytes(values[10].1);
    let neighbour = BlockId::from_le_bytes(values[11].1);
    assert_eq!(data.lock().count(removed).unwrap(), 1);
    assert_eq!(data.lock().count(neighbour).unwrap(), 2);

    // Dropping the snapshot leaves the origin as sole owner
    tree.delete_tree(snap).unwrap();
    assert_eq!(data.lock().count(removed).unwrap(), 0);
    assert_eq!(data.lock().count(neighbour).unwrap(), 1);
    assert_eq!(check_tree(&tree, origin, &STRICT).unwrap().entries, 599);

    tree.delete_tree(origin).unwrap();
    assert_eq!(data.lock().free_count(), 600);
    assert_eq!(tm.free_count(), 64);
}
