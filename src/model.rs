extern crate std;

use std::{collections::BTreeMap, prelude::v1::*, ptr::NonNull};

use arbitrary::Arbitrary;
use cordyceps::Linked;
use proptest::strategy::{Just, Strategy};

use crate::{map::AvlMap, Links, TreeNode};

/// A minimal keyed element for tree-level tests.
#[repr(C)]
pub struct TestNode {
    pub links: Links<TestNode>,
    pub key: u32,
}

impl std::fmt::Debug for TestNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestNode").field("key", &self.key).finish()
    }
}

impl TestNode {
    pub(crate) fn new(key: u32) -> Box<TestNode> {
        Box::new(TestNode {
            links: Links::new(),
            key,
        })
    }
}

unsafe impl Linked<Links<TestNode>> for TestNode {
    type Handle = Box<TestNode>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        NonNull::new(Box::into_raw(r)).unwrap()
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<TestNode>> {
        // SAFETY: Self is #[repr(C)] and `links` is first field
        ptr.cast()
    }
}

impl TreeNode<Links<TestNode>> for TestNode {
    type Key = u32;

    fn key(&self) -> &Self::Key {
        &self.key
    }
}

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum ItemValue {
    Index(usize),
    Random(u32),
}

proptest::prop_compose! {
    fn index_strategy()(
        index in 0usize..1000,
    ) -> ItemValue {
        ItemValue::Index(index)
    }
}

proptest::prop_compose! {
    fn random_strategy()(
        random in 0u32..1000,
    ) -> ItemValue {
        ItemValue::Random(random)
    }
}

fn value_strategy() -> impl Strategy<Value = ItemValue> {
    proptest::prop_oneof![index_strategy(), random_strategy()]
}

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum Op {
    Insert(ItemValue),
    FingerInsert(ItemValue),
    Search(ItemValue),
    FingerSearch(ItemValue),
    Remove(ItemValue),
    First,
    PopFirst,
    Last,
    PopLast,
}

impl Op {
    fn finalize(self, sorted: &[u32]) -> FinalOp {
        fn get_value(v: &[u32], i: ItemValue) -> u32 {
            match i {
                ItemValue::Index(idx) => {
                    if v.is_empty() {
                        idx as u32
                    } else {
                        v[idx % v.len().max(1)]
                    }
                }
                ItemValue::Random(v) => v,
            }
        }

        match self {
            Op::Insert(item) => FinalOp::Insert(get_value(sorted, item)),
            Op::FingerInsert(item) => FinalOp::FingerInsert(get_value(sorted, item)),
            Op::Search(item) => FinalOp::Search(get_value(sorted, item)),
            Op::FingerSearch(item) => FinalOp::FingerSearch(get_value(sorted, item)),
            Op::Remove(item) => FinalOp::Remove(get_value(sorted, item)),
            Op::First => FinalOp::First,
            Op::PopFirst => FinalOp::PopFirst,
            Op::Last => FinalOp::Last,
            Op::PopLast => FinalOp::PopLast,
        }
    }
}

#[derive(Copy, Clone, Debug)]
enum FinalOp {
    Insert(u32),
    FingerInsert(u32),
    Search(u32),
    FingerSearch(u32),
    Remove(u32),
    First,
    PopFirst,
    Last,
    PopLast,
}

pub fn op_strategy() -> impl Strategy<Value = Op> {
    proptest::prop_oneof![
        value_strategy().prop_map(Op::Insert),
        value_strategy().prop_map(Op::FingerInsert),
        value_strategy().prop_map(Op::Search),
        value_strategy().prop_map(Op::FingerSearch),
        value_strategy().prop_map(Op::Remove),
        Just(Op::First),
        Just(Op::PopFirst),
        Just(Op::Last),
        Just(Op::PopLast),
    ]
}

/// Runs an operation stream against both an [`AvlMap`] and a [`BTreeMap`],
/// checking the results, the lengths, the in-order contents and the tree
/// invariants after every step.
pub fn run_btree_equivalence(ops: Vec<Op>) {
    let mut sorted_keys = Vec::with_capacity(ops.len());
    let mut btree = BTreeMap::new();
    let mut avl: AvlMap<u32, u32> = AvlMap::new();

    fn insert_sorted(v: &mut Vec<u32>, value: u32) {
        if let Err(idx) = v.binary_search(&value) {
            v.insert(idx, value);
        }
    }

    fn remove_sorted(v: &mut Vec<u32>, value: u32) {
        if let Ok(idx) = v.binary_search(&value) {
            v.remove(idx);
        }
    }

    for (op_id, op) in ops.into_iter().enumerate() {
        let final_op = op.finalize(&sorted_keys);

        match final_op {
            FinalOp::Insert(key) => {
                let expect_clash = btree.contains_key(&key);
                btree.entry(key).or_insert(!key);
                insert_sorted(&mut sorted_keys, key);

                let result = avl.insert(key, !key);
                assert_eq!(expect_clash, result.is_err(), "FinalOp #{op_id}: {final_op:?}");
                if let Err(pair) = result {
                    assert_eq!(pair, (key, !key), "FinalOp #{op_id}: {final_op:?}");
                }
            }

            FinalOp::FingerInsert(key) => {
                let expect_clash = btree.contains_key(&key);
                btree.entry(key).or_insert(!key);
                insert_sorted(&mut sorted_keys, key);

                let result = avl.finger_insert(key, !key);
                assert_eq!(expect_clash, result.is_err(), "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Search(key) => {
                let from_btree = btree.get(&key);
                let (from_avl, _edges) = avl.search(&key);

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::FingerSearch(key) => {
                let from_btree = btree.get(&key);
                let (from_avl, _edges) = avl.finger_search(&key);

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Remove(key) => {
                remove_sorted(&mut sorted_keys, key);

                let from_btree = btree.remove(&key);
                let from_avl = avl.remove(&key);

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::First => {
                assert_eq!(
                    btree.first_key_value(),
                    avl.first_key_value(),
                    "FinalOp #{op_id}: {final_op:?}"
                );
            }

            FinalOp::PopFirst => {
                assert_eq!(btree.pop_first(), avl.pop_first(), "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Last => {
                assert_eq!(
                    btree.last_key_value(),
                    avl.last_key_value(),
                    "FinalOp #{op_id}: {final_op:?}"
                );
            }

            FinalOp::PopLast => {
                assert_eq!(btree.pop_last(), avl.pop_last(), "FinalOp #{op_id}: {final_op:?}");
            }
        }

        avl.assert_invariants();
        assert_eq!(btree.len(), avl.len());
        assert!(btree
            .iter()
            .zip(avl.iter())
            .all(|((bk, bv), (ak, av))| bk == ak && bv == av));
    }
}

#[derive(Clone, Debug)]
pub struct JoinSplitInput {
    pub keys: Vec<u32>,
    pub pivot: usize,
}

impl<'a> arbitrary::Arbitrary<'a> for JoinSplitInput {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let num_keys = u8::arbitrary(u)? % 200;

        let keys = core::iter::repeat_with(|| u32::arbitrary(u).unwrap_or(0))
            .take(num_keys.into())
            .collect();

        let pivot = usize::from(u16::arbitrary(u)?);

        Ok(JoinSplitInput { keys, pivot })
    }
}

/// Splits a map built from `keys` around the `pivot`-th distinct key, checks
/// both halves against the expected partitions, then joins them back and
/// checks that the original map is reproduced.
pub fn run_join_split(mut keys: Vec<u32>, pivot: usize) {
    keys.sort_unstable();
    keys.dedup();

    let Some(&split_key) = keys.get(pivot % keys.len().max(1)) else {
        return;
    };

    let mut map: AvlMap<u32, u32> = AvlMap::new();
    for &key in &keys {
        assert!(map.insert(key, !key).is_ok());
    }

    let (left, right, pair) = match map.split(&split_key) {
        Ok(parts) => parts,
        Err(_) => unreachable!("split key was inserted above"),
    };

    assert_eq!(pair, (split_key, !split_key));
    left.assert_invariants();
    right.assert_invariants();

    let expect_left: Vec<u32> = keys.iter().copied().filter(|&k| k < split_key).collect();
    let expect_right: Vec<u32> = keys.iter().copied().filter(|&k| k > split_key).collect();

    assert_eq!(left.len(), expect_left.len());
    assert_eq!(right.len(), expect_right.len());
    assert!(left.iter().map(|(&k, _)| k).eq(expect_left.iter().copied()));
    assert!(right.iter().map(|(&k, _)| k).eq(expect_right.iter().copied()));

    // Joining the halves back around the pivot must reproduce the original.
    let mut rejoined = left;
    rejoined.join(right, pair.0, pair.1);
    rejoined.assert_invariants();

    assert_eq!(rejoined.len(), keys.len());
    assert!(rejoined.iter().map(|(&k, _)| k).eq(keys.iter().copied()));
}
