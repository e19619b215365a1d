extern crate std;

use std::{ops::Range, prelude::v1::*};

use proptest::prelude::*;

use crate::model::{self, TestNode};

use super::*;

fn insert_find_all(keys: &[u32]) {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for &key in keys {
        assert!(tree.insert(TestNode::new(key)).is_ok());
        tree.assert_invariants();
    }

    for key in keys {
        let node = tree.get_raw(key).expect("item not found");
        assert_eq!(unsafe { node.as_ref().key() }, key);
    }
}

#[test]
fn zero_elems_find() {
    insert_find_all(&[]);
}

#[test]
fn single_elem_find() {
    insert_find_all(&[0]);
}

#[test]
fn two_elems_find() {
    insert_find_all(&[0, 1]);
    insert_find_all(&[1, 0]);
}

#[test]
fn three_elems_find() {
    insert_find_all(&[0, 1, 2]);
    insert_find_all(&[0, 2, 1]);
    insert_find_all(&[1, 0, 2]);
    insert_find_all(&[1, 2, 0]);
    insert_find_all(&[2, 0, 1]);
    insert_find_all(&[2, 1, 0]);
}

#[test]
fn four_elems_find() {
    insert_find_all(&[0, 1, 2, 3]);
    insert_find_all(&[0, 1, 3, 2]);
    insert_find_all(&[0, 2, 1, 3]);
    insert_find_all(&[0, 2, 3, 1]);
    insert_find_all(&[0, 3, 1, 2]);
    insert_find_all(&[0, 3, 2, 1]);

    insert_find_all(&[1, 0, 2, 3]);
    insert_find_all(&[1, 0, 3, 2]);
    insert_find_all(&[1, 2, 0, 3]);
    insert_find_all(&[1, 2, 3, 0]);
    insert_find_all(&[1, 3, 0, 2]);
    insert_find_all(&[1, 3, 2, 0]);

    insert_find_all(&[2, 0, 1, 3]);
    insert_find_all(&[2, 0, 3, 1]);
    insert_find_all(&[2, 1, 0, 3]);
    insert_find_all(&[2, 1, 3, 0]);
    insert_find_all(&[2, 3, 0, 1]);
    insert_find_all(&[2, 3, 1, 0]);

    insert_find_all(&[3, 0, 1, 2]);
    insert_find_all(&[3, 0, 2, 1]);
    insert_find_all(&[3, 1, 0, 2]);
    insert_find_all(&[3, 1, 2, 0]);
    insert_find_all(&[3, 2, 0, 1]);
    insert_find_all(&[3, 2, 1, 0]);
}

fn insert_remove_all(keys: &[u32]) {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for &key in keys {
        assert!(tree.insert(TestNode::new(key)).is_ok());
        tree.assert_invariants();
    }

    for key in keys {
        let node = tree.get_raw(key).expect("item not found");
        unsafe { tree.remove_at(node) };
        tree.assert_invariants();
    }

    for &key in keys {
        assert!(tree.insert(TestNode::new(key)).is_ok());
        tree.assert_invariants();
    }

    for key in keys.iter().rev() {
        let node = tree.get_raw(key).expect("item not found");
        unsafe { tree.remove_at(node) };
        tree.assert_invariants();
    }

    assert!(tree.is_empty());
    assert!(tree.first().is_none());
    assert!(tree.last().is_none());
    assert!(tree.root().is_none());
}

#[test]
fn remove_one() {
    insert_remove_all(&[0]);
}

#[test]
fn remove_two() {
    insert_remove_all(&[0, 1]);
    insert_remove_all(&[1, 0]);
}

#[test]
fn remove_three() {
    insert_remove_all(&[0, 1, 2]);
    insert_remove_all(&[0, 2, 1]);
    insert_remove_all(&[1, 0, 2]);
    insert_remove_all(&[1, 2, 0]);
    insert_remove_all(&[2, 0, 1]);
    insert_remove_all(&[2, 1, 0]);
}

#[test]
fn remove_four() {
    insert_remove_all(&[0, 1, 2, 3]);
    insert_remove_all(&[0, 1, 3, 2]);
    insert_remove_all(&[0, 2, 1, 3]);
    insert_remove_all(&[0, 2, 3, 1]);
    insert_remove_all(&[0, 3, 1, 2]);
    insert_remove_all(&[0, 3, 2, 1]);

    insert_remove_all(&[1, 0, 2, 3]);
    insert_remove_all(&[1, 0, 3, 2]);
    insert_remove_all(&[1, 2, 0, 3]);
    insert_remove_all(&[1, 2, 3, 0]);
    insert_remove_all(&[1, 3, 0, 2]);
    insert_remove_all(&[1, 3, 2, 0]);

    insert_remove_all(&[2, 0, 1, 3]);
    insert_remove_all(&[2, 0, 3, 1]);
    insert_remove_all(&[2, 1, 0, 3]);
    insert_remove_all(&[2, 1, 3, 0]);
    insert_remove_all(&[2, 3, 0, 1]);
    insert_remove_all(&[2, 3, 1, 0]);

    insert_remove_all(&[3, 0, 1, 2]);
    insert_remove_all(&[3, 0, 2, 1]);
    insert_remove_all(&[3, 1, 0, 2]);
    insert_remove_all(&[3, 1, 2, 0]);
    insert_remove_all(&[3, 2, 0, 1]);
    insert_remove_all(&[3, 2, 1, 0]);
}

#[test]
fn seven_elems_ordered_traversal() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for key in [5, 3, 8, 1, 4, 7, 9] {
        assert!(tree.insert(TestNode::new(key)).is_ok());
        tree.assert_invariants();
    }

    let keys: Vec<u32> = tree.iter().map(|node| node.key).collect();
    assert_eq!(keys, [1, 3, 4, 5, 7, 8, 9]);
    assert_eq!(tree.len(), 7);
}

#[test]
fn duplicate_insert_is_rejected() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    assert!(tree.insert(TestNode::new(7)).is_ok());
    let rejected = tree.insert(TestNode::new(7)).unwrap_err();
    assert_eq!(rejected.key, 7);

    assert_eq!(tree.len(), 1);
    tree.assert_invariants();

    let rejected = tree.finger_insert(TestNode::new(7)).unwrap_err();
    assert_eq!(rejected.key, 7);
    assert_eq!(tree.len(), 1);
    tree.assert_invariants();
}

#[test]
fn insert_metrics_ascending() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    let metrics = tree.insert(TestNode::new(1)).unwrap();
    assert_eq!((metrics.edges, metrics.promotes), (0, 0));

    let metrics = tree.insert(TestNode::new(2)).unwrap();
    assert_eq!((metrics.edges, metrics.promotes), (1, 1));

    let metrics = tree.insert(TestNode::new(3)).unwrap();
    assert_eq!((metrics.edges, metrics.promotes), (2, 1));

    tree.assert_invariants();
}

#[test]
fn finger_insert_ascending_is_shallow() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    assert!(tree.finger_insert(TestNode::new(0)).is_ok());

    for key in 1..256 {
        let metrics = tree.finger_insert(TestNode::new(key)).unwrap();
        // A new maximum attaches directly under the previous one.
        assert_eq!(metrics.edges, 1);
        tree.assert_invariants();
    }

    let keys: Vec<u32> = tree.iter().map(|node| node.key).collect();
    assert!(keys.iter().copied().eq(0..256));
}

#[test]
fn search_edge_counts() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    assert_eq!(tree.search(&1).1, 0);

    assert!(tree.insert(TestNode::new(2)).is_ok());
    // A hit counts nodes visited; a miss counts edges walked.
    assert_eq!(tree.search(&2).1, 1);
    assert_eq!(tree.search(&1).1, 1);
    assert!(tree.search(&1).0.is_none());

    // The maximum is found from the finger without descending.
    assert_eq!(tree.finger_search(&2).1, 1);
}

#[test]
fn finger_search_agrees_with_search() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for key in 0..128 {
        assert!(tree.insert(TestNode::new(key)).is_ok());
    }

    for probe in 0..160 {
        let (by_root, _) = tree.search(&probe);
        let (by_finger, _) = tree.finger_search(&probe);
        assert_eq!(
            by_root.map(|node| node.key),
            by_finger.map(|node| node.key),
        );
    }

    // Probes at the maximum never descend.
    assert_eq!(tree.finger_search(&127).1, 1);
}

#[test]
fn successor_predecessor_walk() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for key in [4, 1, 9, 2, 6, 0, 8] {
        assert!(tree.insert(TestNode::new(key)).is_ok());
    }

    let sorted = [0, 1, 2, 4, 6, 8, 9];

    let mut cur = tree.get_raw(&0);
    for &expected in &sorted {
        let node = cur.expect("walk ended early");
        assert_eq!(unsafe { node.as_ref().key }, expected);
        cur = unsafe { AvlTree::successor(node) };
    }
    assert!(cur.is_none());

    let mut cur = tree.get_raw(&9);
    for &expected in sorted.iter().rev() {
        let node = cur.expect("walk ended early");
        assert_eq!(unsafe { node.as_ref().key }, expected);
        cur = unsafe { AvlTree::predecessor(node) };
    }
    assert!(cur.is_none());
}

#[test]
fn pop_drains_in_order() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for key in [3, 1, 4, 1, 5, 9, 2, 6] {
        let _ = tree.insert(TestNode::new(key));
    }

    let mut popped = Vec::new();
    while let Some(node) = tree.pop_first() {
        popped.push(node.key);
        tree.assert_invariants();
    }

    assert_eq!(popped, [1, 2, 3, 4, 5, 6, 9]);
    assert!(tree.is_empty());
}

#[test]
fn join_two_trees_around_separator() {
    let mut lower: AvlTree<TestNode> = AvlTree::new();
    let mut upper: AvlTree<TestNode> = AvlTree::new();

    for key in [1, 2, 3] {
        assert!(lower.insert(TestNode::new(key)).is_ok());
    }
    for key in [10, 20] {
        assert!(upper.insert(TestNode::new(key)).is_ok());
    }

    lower.join(upper, TestNode::new(5));
    lower.assert_invariants();

    let keys: Vec<u32> = lower.iter().map(|node| node.key).collect();
    assert_eq!(keys, [1, 2, 3, 5, 10, 20]);
    assert_eq!(lower.len(), 6);
    assert_eq!(lower.first().map(|node| node.key), Some(1));
    assert_eq!(lower.last().map(|node| node.key), Some(20));
}

#[test]
fn join_accepts_swapped_orientation() {
    let mut upper: AvlTree<TestNode> = AvlTree::new();
    let mut lower: AvlTree<TestNode> = AvlTree::new();

    for key in 50..70 {
        assert!(upper.insert(TestNode::new(key)).is_ok());
    }
    for key in 0..3 {
        assert!(lower.insert(TestNode::new(key)).is_ok());
    }

    // The receiver holds the larger keys here.
    upper.join(lower, TestNode::new(10));
    upper.assert_invariants();

    let keys: Vec<u32> = upper.iter().map(|node| node.key).collect();
    assert!(keys.iter().copied().eq((0..3).chain([10]).chain(50..70)));
}

#[test]
fn join_empty_cases() {
    // Both empty: the separator becomes the sole element.
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    tree.join(AvlTree::new(), TestNode::new(5));
    tree.assert_invariants();
    assert_eq!(tree.len(), 1);
    assert_eq!(tree.first().map(|node| node.key), Some(5));

    // Receiver empty.
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    let mut other: AvlTree<TestNode> = AvlTree::new();
    for key in [10, 11, 12] {
        assert!(other.insert(TestNode::new(key)).is_ok());
    }
    tree.join(other, TestNode::new(5));
    tree.assert_invariants();
    let keys: Vec<u32> = tree.iter().map(|node| node.key).collect();
    assert_eq!(keys, [5, 10, 11, 12]);

    // Argument empty.
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    for key in [10, 11, 12] {
        assert!(tree.insert(TestNode::new(key)).is_ok());
    }
    tree.join(AvlTree::new(), TestNode::new(42));
    tree.assert_invariants();
    let keys: Vec<u32> = tree.iter().map(|node| node.key).collect();
    assert_eq!(keys, [10, 11, 12, 42]);
}

#[test]
#[should_panic(expected = "join: separator key does not separate")]
fn join_rejects_overlapping_ranges() {
    let mut a: AvlTree<TestNode> = AvlTree::new();
    let mut b: AvlTree<TestNode> = AvlTree::new();

    for key in [1, 5, 9] {
        assert!(a.insert(TestNode::new(key)).is_ok());
    }
    for key in [4, 12] {
        assert!(b.insert(TestNode::new(key)).is_ok());
    }

    a.join(b, TestNode::new(7));
}

#[test]
fn split_then_join_round_trips() {
    let keys: Vec<u32> = (0..40).collect();

    for pivot in [0, 1, 13, 20, 38, 39] {
        let mut tree: AvlTree<TestNode> = AvlTree::new();
        for &key in &keys {
            assert!(tree.insert(TestNode::new(key)).is_ok());
        }

        let node = tree.get_raw(&pivot).expect("pivot is present");
        let (mut left, right, handle) = unsafe { tree.split_at(node) };

        left.assert_invariants();
        right.assert_invariants();
        assert_eq!(handle.key, pivot);
        assert_eq!(left.len() as u32, pivot);
        assert_eq!(right.len() as u32, 39 - pivot);
        assert!(left.iter().map(|node| node.key).eq(0..pivot));
        assert!(right.iter().map(|node| node.key).eq(pivot + 1..40));

        left.join(right, handle);
        left.assert_invariants();
        assert!(left.iter().map(|node| node.key).eq(0..40));
    }
}

#[test]
fn split_at_root_and_extremes() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    for key in [2, 1, 3] {
        assert!(tree.insert(TestNode::new(key)).is_ok());
    }

    let node = tree.get_raw(&2).expect("root is present");
    let (left, right, handle) = unsafe { tree.split_at(node) };

    assert_eq!(handle.key, 2);
    assert_eq!(left.len(), 1);
    assert_eq!(right.len(), 1);
    assert_eq!(left.first().map(|node| node.key), Some(1));
    assert_eq!(right.last().map(|node| node.key), Some(3));

    // Splitting at the minimum leaves an empty low side.
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    for key in 0..10 {
        assert!(tree.insert(TestNode::new(key)).is_ok());
    }
    let node = tree.get_raw(&0).expect("minimum is present");
    let (left, right, _handle) = unsafe { tree.split_at(node) };
    assert!(left.is_empty());
    assert!(left.first().is_none());
    assert_eq!(right.len(), 9);
    right.assert_invariants();
}

#[test]
fn dotgraph_renders() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    for key in [5, 3, 8, 1, 4] {
        assert!(tree.insert(TestNode::new(key)).is_ok());
    }

    let mut out = String::new();
    tree.dotgraph("t", &mut out).unwrap();
    assert!(out.starts_with("digraph"));
    assert!(out.contains("\"grapht-5\""));
}

mod map_tests {
    use super::*;
    use crate::map::AvlMap;

    #[test]
    fn insert_get_remove() {
        let mut map: AvlMap<u32, &str> = AvlMap::new();

        assert!(map.insert(3, "three").is_ok());
        assert!(map.insert(1, "one").is_ok());
        assert!(map.insert(2, "two").is_ok());
        map.assert_invariants();

        assert_eq!(map.insert(2, "again"), Err((2, "again")));

        assert_eq!(map.get(&1), Some(&"one"));
        assert!(map.contains_key(&3));
        assert_eq!(map.get(&4), None);

        if let Some(value) = map.get_mut(&2) {
            *value = "deux";
        }
        assert_eq!(map.get(&2), Some(&"deux"));

        assert_eq!(map.remove(&1), Some("one"));
        assert_eq!(map.remove(&1), None);
        map.assert_invariants();
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn ordered_accessors() {
        let mut map: AvlMap<u32, u32> = AvlMap::new();
        for key in [4, 1, 9, 2, 6] {
            assert!(map.insert(key, key * 10).is_ok());
        }

        assert_eq!(map.first_key_value(), Some((&1, &10)));
        assert_eq!(map.last_key_value(), Some((&9, &90)));
        assert!(map.root_key_value().is_some());

        assert_eq!(map.successor(&4), Some((&6, &60)));
        assert_eq!(map.predecessor(&4), Some((&2, &20)));
        assert_eq!(map.successor(&9), None);
        assert_eq!(map.predecessor(&1), None);
        // Absent keys have no neighbors.
        assert_eq!(map.successor(&5), None);

        assert_eq!(
            map.to_vec(),
            [(&1, &10), (&2, &20), (&4, &40), (&6, &60), (&9, &90)]
        );
    }

    #[test]
    fn drain_to_empty() {
        let mut map: AvlMap<u32, u32> = AvlMap::new();
        for key in [13, 2, 8, 21, 1, 5, 3] {
            assert!(map.insert(key, key).is_ok());
        }

        for key in [8, 1, 21, 3, 13, 5, 2] {
            assert_eq!(map.remove(&key), Some(key));
            map.assert_invariants();
        }

        assert_eq!(map.len(), 0);
        assert!(map.is_empty());
        assert!(map.first_key_value().is_none());
        assert!(map.last_key_value().is_none());
        assert!(map.root_key_value().is_none());
    }

    #[test]
    fn split_and_join() {
        let mut map: AvlMap<u32, u32> = AvlMap::new();
        for key in 0..30 {
            assert!(map.insert(key, !key).is_ok());
        }

        let map = match map.split(&99) {
            Err(map) => map,
            Ok(_) => panic!("absent key must not split"),
        };

        let (mut left, right, pair) = map.split(&11).ok().expect("key is present");
        assert_eq!(pair, (11, !11));
        assert_eq!(left.len(), 11);
        assert_eq!(right.len(), 18);
        left.assert_invariants();
        right.assert_invariants();

        left.join(right, pair.0, pair.1);
        left.assert_invariants();
        assert!(left.iter().map(|(&k, _)| k).eq(0..30));
        assert_eq!(left.len(), 30);
    }

    #[test]
    fn finger_ops() {
        let mut map: AvlMap<u32, u32> = AvlMap::new();

        for key in 0..100 {
            assert!(map.finger_insert(key, key).is_ok());
            map.assert_invariants();
        }

        let (found, edges) = map.finger_search(&99);
        assert_eq!(found, Some(&99));
        assert_eq!(edges, 1);

        let (found, _) = map.finger_search(&42);
        assert_eq!(found, Some(&42));
        assert_eq!(map.search(&42).0, Some(&42));
    }
}

#[cfg(miri)]
const FUZZ_RANGE: Range<usize> = 0..10;

#[cfg(not(miri))]
const FUZZ_RANGE: Range<usize> = 0..1000;

proptest::proptest! {
    #![proptest_config(ProptestConfig {
        max_shrink_iters: 65536,
        .. ProptestConfig::default()
    })]

    #[test]
    fn btree_equivalence(ops in proptest::collection::vec(model::op_strategy(), FUZZ_RANGE)) {
        model::run_btree_equivalence(ops);
    }

    #[test]
    fn join_split_round_trip(
        keys in proptest::collection::vec(any::<u32>(), 0..200),
        pivot in any::<usize>(),
    ) {
        model::run_join_split(keys, pivot);
    }
}
