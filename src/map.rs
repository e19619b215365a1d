extern crate alloc;

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::{borrow::Borrow, marker::PhantomPinned, ptr::NonNull};

use cordyceps::Linked;

use crate::{AvlTree, InsertMetrics, Links, TreeNode};

/// An ordered map based on an intrusive [AVL tree].
///
/// On top of the usual ordered-map operations, the map supports *finger*
/// variants of search and insertion that are anchored at the maximum key,
/// [`join`]ing two maps with separated key ranges, and [`split`]ting a map
/// around one of its keys.
///
/// [AVL tree]: https://en.wikipedia.org/wiki/AVL_tree
/// [`join`]: AvlMap::join
/// [`split`]: AvlMap::split
pub struct AvlMap<K: Ord, V> {
    tree: AvlTree<MapNode<K, V>>,
}

struct MapNode<K, V> {
    links: Links<MapNode<K, V>>,
    key: K,
    value: V,
    _unpin: PhantomPinned,
}

impl<K, V> MapNode<K, V> {
    fn new(key: K, value: V) -> Box<Self> {
        Box::new(MapNode {
            links: Links::new(),
            key,
            value,
            _unpin: PhantomPinned,
        })
    }

    fn into_pair(self) -> (K, V) {
        let MapNode { key, value, .. } = self;
        (key, value)
    }
}

unsafe impl<K, V> Linked<Links<MapNode<K, V>>> for MapNode<K, V> {
    type Handle = Box<Self>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        Box::leak(r).into()
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<MapNode<K, V>>> {
        let ptr = ptr.as_ptr();
        NonNull::new(core::ptr::addr_of_mut!((*ptr).links)).unwrap()
    }
}

impl<K: Ord, V> TreeNode<Links<MapNode<K, V>>> for MapNode<K, V> {
    type Key = K;

    fn key(&self) -> &Self::Key {
        &self.key
    }
}

impl<K: Ord, V> AvlMap<K, V> {
    /// Creates a new, empty `AvlMap`.
    pub const fn new() -> Self {
        Self {
            tree: AvlTree::new(),
        }
    }

    /// Returns `true` if the map contains no elements.
    pub const fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Returns the number of elements in the map.
    pub const fn len(&self) -> usize {
        self.tree.len()
    }

    /// Returns `true` if the map contains a value associated with `key`.
    #[inline]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        self.tree.contains_key(key)
    }

    /// Returns a reference to the value associated with `key`.
    #[inline]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        self.tree.get(key).map(|node| &node.get_ref().value)
    }

    /// Returns a mutable reference to the value associated with `key`.
    #[inline]
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        self.tree
            .get_mut(key)
            // SAFETY: Pinning is not structural for `node.value`.
            .map(|node| unsafe { &mut node.get_unchecked_mut().value })
    }

    /// Inserts a key-value pair into the map.
    ///
    /// On success, reports the descent depth of the new entry and the number
    /// of promotions performed while rebalancing. If `key` is already
    /// present, the map is unchanged and the pair is handed back.
    pub fn insert(&mut self, key: K, value: V) -> Result<InsertMetrics, (K, V)> {
        self.tree
            .insert(MapNode::new(key, value))
            .map_err(|node| node.into_pair())
    }

    /// Inserts a key-value pair, locating the insertion point from the
    /// maximum key rather than the root.
    ///
    /// Cheap for keys near the current maximum; see
    /// [`finger_search`](AvlMap::finger_search).
    pub fn finger_insert(&mut self, key: K, value: V) -> Result<InsertMetrics, (K, V)> {
        self.tree
            .finger_insert(MapNode::new(key, value))
            .map_err(|node| node.into_pair())
    }

    /// Searches for `key` from the root down, returning the value (if any)
    /// and the number of nodes visited.
    pub fn search<Q>(&self, key: &Q) -> (Option<&V>, usize)
    where
        K: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let (node, edges) = self.tree.search(key);
        (node.map(|node| &node.get_ref().value), edges)
    }

    /// Searches for `key` starting from the maximum key, returning the value
    /// (if any) and the number of nodes visited including the climb.
    ///
    /// Keys near the maximum are found in time logarithmic in their rank
    /// distance from it rather than in the size of the map.
    pub fn finger_search<Q>(&self, key: &Q) -> (Option<&V>, usize)
    where
        K: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let (node, edges) = self.tree.finger_search(key);
        (node.map(|node| &node.get_ref().value), edges)
    }

    /// Returns the first key-value pair in the map.
    ///
    /// The returned key is the minimum key in the map.
    #[inline]
    pub fn first_key_value(&self) -> Option<(&K, &V)> {
        self.tree.first().map(|node| {
            let node = node.get_ref();
            (&node.key, &node.value)
        })
    }

    /// Removes and returns the first key-value pair in the map.
    ///
    /// The returned key is the minimum key in the map.
    #[inline]
    pub fn pop_first(&mut self) -> Option<(K, V)> {
        self.tree.pop_first().map(|node| node.into_pair())
    }

    /// Returns the last key-value pair in the map.
    ///
    /// The returned key is the maximum key in the map.
    #[inline]
    pub fn last_key_value(&self) -> Option<(&K, &V)> {
        self.tree.last().map(|node| {
            let node = node.get_ref();
            (&node.key, &node.value)
        })
    }

    /// Removes and returns the last key-value pair in the map.
    ///
    /// The returned key is the maximum key in the map.
    #[inline]
    pub fn pop_last(&mut self) -> Option<(K, V)> {
        self.tree.pop_last().map(|node| node.into_pair())
    }

    /// Returns the key-value pair at the root of the underlying tree.
    #[inline]
    pub fn root_key_value(&self) -> Option<(&K, &V)> {
        self.tree.root().map(|node| {
            let node = node.get_ref();
            (&node.key, &node.value)
        })
    }

    /// Returns the entry with the smallest key strictly greater than `key`,
    /// or `None` if `key` is absent or holds the maximum.
    pub fn successor<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let node = self.tree.get_raw(key)?;

        unsafe {
            // SAFETY: `node` is an element of this tree, which outlives the
            // returned references.
            let next = AvlTree::successor(node)?;
            let next = next.as_ref();
            Some((&next.key, &next.value))
        }
    }

    /// Returns the entry with the largest key strictly less than `key`, or
    /// `None` if `key` is absent or holds the minimum.
    pub fn predecessor<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let node = self.tree.get_raw(key)?;

        unsafe {
            // SAFETY: as in `successor`.
            let prev = AvlTree::predecessor(node)?;
            let prev = prev.as_ref();
            Some((&prev.key, &prev.value))
        }
    }

    /// Removes the value associated with `key` from the map.
    #[inline]
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let node = self.tree.get_raw(key)?;
        // SAFETY: the node was just found in this tree.
        let node = unsafe { self.tree.remove_at(node) };
        Some(node.into_pair().1)
    }

    /// Concatenates `other` and the separating pair into `self`.
    ///
    /// One of the two maps must hold only keys less than `key` and the other
    /// only keys greater; either orientation is accepted.
    ///
    /// # Panics
    ///
    /// Panics if the key ranges of `self` and `other` are not strictly
    /// separated by `key`.
    pub fn join(&mut self, other: Self, key: K, value: V) {
        self.tree.join(other.tree, MapNode::new(key, value));
    }

    /// Splits the map around `key`, returning the map of strictly smaller
    /// keys, the map of strictly larger keys, and the matched pair itself.
    ///
    /// If `key` is not present, the map is returned unchanged as the error.
    pub fn split<Q>(self, key: &Q) -> Result<(Self, Self, (K, V)), Self>
    where
        K: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let Some(node) = self.tree.get_raw(key) else {
            return Err(self);
        };

        // SAFETY: the node was just found in this tree.
        let (left, right, node) = unsafe { self.tree.split_at(node) };

        Ok((
            Self { tree: left },
            Self { tree: right },
            node.into_pair(),
        ))
    }

    /// Returns an iterator over the entries of the map in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        self.tree.iter().map(|node| (&node.key, &node.value))
    }

    /// Returns the contents of the map as a key-ordered vector of pairs.
    pub fn to_vec(&self) -> Vec<(&K, &V)> {
        self.iter().collect()
    }

    /// Clears the map, removing all elements.
    #[inline]
    pub fn clear(&mut self) {
        self.tree.clear();
    }

    #[doc(hidden)]
    pub fn assert_invariants(&self) {
        self.tree.assert_invariants();
    }
}
