//! Integration tests for key removal.
//!
//! Every test checks the whole tree after mutating it, and that no block
//! lock or block reference leaks.

mod common;

use common::{entries, init_tracing, shuffled};
use parking_lot::Mutex;
use thinmeta::btree::{check_tree, BTree, CheckOptions, DataBlockValue, TreeBuilder, U64Value};
use thinmeta::common::config::{calc_capacity, min_entries};
use thinmeta::{BlockId, CoreSpaceMap, Error, SpaceMap, TransactionManager};

const STRICT: CheckOptions = CheckOptions { min_occupancy: true };

/// Free blocks plus reachable blocks must cover the device exactly.
fn assert_no_leaks(tm: &TransactionManager, reachable: u64) {
    assert_eq!(tm.free_count() + reachable, tm.block_manager().block_count());
    assert_eq!(tm.block_manager().held_locks(), 0);
}

#[test]
fn test_capacity_for_u64_values() {
    // 4064 usable bytes / 16 bytes per entry, rounded down to a multiple of 3
    assert_eq!(calc_capacity(8), 252);
    assert_eq!(min_entries(252), 84);
}

#[test]
fn test_single_entry_leaves_merge_and_root_collapses() {
    init_tracing();
    let tm = TransactionManager::in_memory(8);
    let tree = BTree::new(&tm, &U64Value);
    let root = TreeBuilder::new(&tree).with_fill(1, 2).build(&entries(2, 10)).unwrap();
    assert_eq!(check_tree(&tree, root, &CheckOptions::default()).unwrap().leaves, 2);

    let new_root = tree.remove(root, 0).unwrap();

    let report = check_tree(&tree, new_root, &STRICT).unwrap();
    assert_eq!(report.depth, 1);
    assert_eq!(report.entries, 1);
    assert_eq!(tree.lookup(new_root, 10).unwrap(), Some(10u64.to_le_bytes().to_vec()));
    assert_eq!(tm.ref_count(root).unwrap(), 0);
    assert_no_leaks(&tm, 1);
}

#[test]
fn test_remove_everything_in_random_order() {
    init_tracing();
    let tm = TransactionManager::in_memory(64);
    let tree = BTree::new(&tm, &U64Value);
    let input = entries(2000, 1);
    let mut root = TreeBuilder::new(&tree).build(&input).unwrap();

    let report = check_tree(&tree, root, &STRICT).unwrap();
    assert_eq!(report.depth, 2);
    assert_no_leaks(&tm, report.blocks);

    let keys = shuffled(input.iter().map(|(k, _)| *k).collect(), 42);
    for (removed, &key) in keys.iter().enumerate() {
        root = tree.remove(root, key).unwrap();

        let report = check_tree(&tree, root, &STRICT).unwrap();
        assert_eq!(report.entries, 2000 - removed as u64 - 1);
        assert_no_leaks(&tm, report.blocks);
        assert!(!tree.contains(root, key).unwrap());
    }

    let report = check_tree(&tree, root, &STRICT).unwrap();
    assert_eq!(report, thinmeta::btree::TreeReport { blocks: 1, depth: 1, leaves: 1, ..Default::default() });
}

#[test]
fn test_remove_from_front_and_back() {
    let tm = TransactionManager::in_memory(64);
    let tree = BTree::new(&tm, &U64Value);
    let mut root = TreeBuilder::new(&tree).build(&entries(1500, 2)).unwrap();

    // ascending from the front leaves separators below their subtrees
    for i in 0..400u64 {
        root = tree.remove(root, i * 2).unwrap();
    }
    // then descending from the back
    for i in (1100..1500u64).rev() {
        root = tree.remove(root, i * 2).unwrap();
    }

    let report = check_tree(&tree, root, &STRICT).unwrap();
    assert_eq!(report.entries, 700);
    assert_no_leaks(&tm, report.blocks);
    for i in 400..1100u64 {
        assert_eq!(tree.lookup(root, i * 2).unwrap(), Some((i * 2).to_le_bytes().to_vec()));
    }
}

#[test]
fn test_remove_from_deep_sparse_tree() {
    init_tracing();
    let tm = TransactionManager::in_memory(1024);
    let tree = BTree::new(&tm, &U64Value);
    let input = entries(3000, 3);
    let mut root = TreeBuilder::new(&tree).with_fill(8, 4).build(&input).unwrap();
    assert!(check_tree(&tree, root, &CheckOptions::default()).unwrap().depth >= 5);

    let keys = shuffled(input.iter().map(|(k, _)| *k).collect(), 7);
    for (removed, &key) in keys.iter().enumerate() {
        root = tree.remove(root, key).unwrap();
        if removed % 100 == 0 {
            let report = check_tree(&tree, root, &CheckOptions::default()).unwrap();
            assert_eq!(report.entries, 3000 - removed as u64 - 1);
            assert_no_leaks(&tm, report.blocks);
        }
    }

    let report = check_tree(&tree, root, &STRICT).unwrap();
    assert_eq!(report.entries, 0);
    assert_no_leaks(&tm, 1);
}

#[test]
fn test_missing_keys_are_rejected_without_side_effects() {
    let tm = TransactionManager::in_memory(64);
    let tree = BTree::new(&tm, &U64Value);
    let root = TreeBuilder::new(&tree).build(&entries(600, 2)).unwrap();
    let before = check_tree(&tree, root, &STRICT).unwrap();
    let free = tm.free_count();

    for key in [1u64, 599, 1201, u64::MAX] {
        assert!(matches!(tree.remove(root, key), Err(Error::KeyNotFound(k)) if k == key));
    }
    assert_eq!(check_tree(&tree, root, &STRICT).unwrap(), before);
    assert_eq!(tm.free_count(), free);
}

#[test]
fn test_removed_values_are_released() {
    let data = Mutex::new(CoreSpaceMap::new(1000));
    let values: Vec<(u64, [u8; 8])> = (0..1000u64)
        .map(|k| (k, data.lock().new_block().unwrap().to_le_bytes()))
        .collect();

    let tm = TransactionManager::in_memory(64);
    let vt = DataBlockValue::new(&data);
    let tree = BTree::new(&tm, &vt);
    let mut root = TreeBuilder::new(&tree).build(&values).unwrap();

    for &(k, v) in values.iter().step_by(3) {
        root = tree.remove(root, k).unwrap();
        assert_eq!(data.lock().count(BlockId::from_le_bytes(v)).unwrap(), 0);
    }
    assert_eq!(data.lock().free_count(), 334);
    assert_eq!(check_tree(&tree, root, &STRICT).unwrap().entries, 666);
}

#[test]
fn test_out_of_space_aborts_cleanly_then_succeeds_after_extend() {
    let tm = TransactionManager::in_memory(9);
    let tree = BTree::new(&tm, &U64Value);
    // 2000 entries: 8 full leaves and a root fill the device
    let root = TreeBuilder::new(&tree).build(&entries(2000, 1)).unwrap();
    assert_eq!(tm.free_count(), 0);
    tm.inc(root).unwrap();

    assert!(matches!(tree.remove(root, 1000), Err(Error::OutOfSpace)));
    assert_eq!(tm.ref_count(root).unwrap(), 2);
    assert_eq!(tm.block_manager().held_locks(), 0);

    tm.extend(4).unwrap();
    let new_root = tree.remove(root, 1000).unwrap();
    assert!(tree.contains(root, 1000).unwrap());
    assert!(!tree.contains(new_root, 1000).unwrap());
    check_tree(&tree, root, &STRICT).unwrap();
    check_tree(&tree, new_root, &STRICT).unwrap();
    assert_eq!(tm.free_count(), 2);
}

#[test]
fn test_out_of_space_below_the_root_leaves_snapshot_intact() {
    init_tracing();
    // One spare block: enough to copy the root, not the leaf under it
    let tm = TransactionManager::in_memory(10);
    let tree = BTree::new(&tm, &U64Value);
    let root = TreeBuilder::new(&tree).build(&entries(2000, 1)).unwrap();
    let before = check_tree(&tree, root, &STRICT).unwrap();
    tm.inc(root).unwrap();

    assert!(matches!(tree.remove(root, 1000), Err(Error::OutOfSpace)));
    assert_eq!(tm.ref_count(root).unwrap(), 2);
    assert_eq!(tm.free_count(), 1);
    assert_eq!(tm.block_manager().held_locks(), 0);
    assert_eq!(check_tree(&tree, root, &STRICT).unwrap(), before);

    tm.extend(4).unwrap();
    let new_root = tree.remove(root, 1000).unwrap();
    assert_ne!(new_root, root);
    assert!(tree.contains(root, 1000).unwrap());
    assert!(!tree.contains(new_root, 1000).unwrap());
    assert_eq!(tm.ref_count(root).unwrap(), 1);
    assert_eq!(check_tree(&tree, root, &STRICT).unwrap(), before);
    assert_eq!(tm.free_count(), 3);
}

#[test]
fn test_removed_value_survives_an_aborted_remove() {
    let data = Mutex::new(CoreSpaceMap::new(2016));
    let values: Vec<(u64, [u8; 8])> = (0..2016u64)
        .map(|k| (k, data.lock().new_block().unwrap().to_le_bytes()))
        .collect();
    let count = |v: [u8; 8]| data.lock().count(BlockId::from_le_bytes(v)).unwrap();

    // 24 leaves at the low-water mark under one root, two spare blocks:
    // root and leaf get copied, the sibling needed for the merge does not.
    let tm = TransactionManager::in_memory(27);
    let vt = DataBlockValue::new(&data);
    let tree = BTree::new(&tm, &vt);
    let root = TreeBuilder::new(&tree).with_fill(84, 252).build(&values).unwrap();
    assert_eq!(tm.free_count(), 2);
    tm.inc(root).unwrap();

    assert!(matches!(tree.remove(root, 0), Err(Error::OutOfSpace)));
    assert!(tree.contains(root, 0).unwrap());
    assert_eq!(count(values[0].1), 1);
    assert_eq!(count(values[1].1), 1);
    assert_eq!(data.lock().free_count(), 0);
    assert_eq!(tm.ref_count(root).unwrap(), 2);
    assert_eq!(tm.free_count(), 2);
    assert_eq!(tm.block_manager().held_locks(), 0);

    tm.extend(1).unwrap();
    let new_root = tree.remove(root, 0).unwrap();
    // the snapshot's leaf still holds key 0; both leaves hold key 1
    assert_eq!(count(values[0].1), 1);
    assert_eq!(count(values[1].1), 2);
    assert!(tree.contains(root, 0).unwrap());
    assert_eq!(check_tree(&tree, new_root, &CheckOptions::default()).unwrap().leaves, 23);
}

#[test]
fn test_write_locked_block_aborts_remove() {
    let tm = TransactionManager::in_memory(16);
    let tree = BTree::new(&tm, &U64Value);
    let root = TreeBuilder::new(&tree).build(&entries(10, 1)).unwrap();

    let held = tm.block_manager().write_lock(root, &thinmeta::btree::NODE_VALIDATOR).unwrap();
    assert!(matches!(tree.remove(root, 3), Err(Error::Locked(b)) if b == root));
    drop(held);

    assert_eq!(tm.block_manager().held_locks(), 0);
    assert!(tree.remove(root, 3).is_ok());
}
