//! Equivalence classes over hashable keys.
//!
//! A disjoint-set forest with union by rank and path compression. Elements are
//! stored densely in insertion order, which makes member iteration and leader
//! choice deterministic for a given sequence of operations.

use rustc_hash::FxHashMap;
use std::hash::Hash;

/// Disjoint sets of `T`.
#[derive(Debug, Clone)]
pub struct EquivalenceClasses<T> {
    index: FxHashMap<T, u32>,
    elems: Vec<T>,
    parent: Vec<u32>,
    rank: Vec<u8>,
}

impl<T> Default for EquivalenceClasses<T> {
    fn default() -> Self {
        Self {
            index: FxHashMap::default(),
            elems: Vec::new(),
            parent: Vec::new(),
            rank: Vec::new(),
        }
    }
}

impl<T: Copy + Eq + Hash> EquivalenceClasses<T> {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.elems.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    #[inline]
    pub fn contains(&self, x: &T) -> bool {
        self.index.contains_key(x)
    }

    /// Add `x` as a singleton class if it is not present yet.
    pub fn insert(&mut self, x: T) -> u32 {
        if let Some(&slot) = self.index.get(&x) {
            return slot;
        }
        let slot = self.elems.len() as u32;
        self.index.insert(x, slot);
        self.elems.push(x);
        self.parent.push(slot);
        self.rank.push(0);
        slot
    }

    fn root(&self, mut slot: u32) -> u32 {
        while self.parent[slot as usize] != slot {
            slot = self.parent[slot as usize];
        }
        slot
    }

    fn root_compressing(&mut self, slot: u32) -> u32 {
        let root = self.root(slot);
        let mut cur = slot;
        while self.parent[cur as usize] != root {
            let next = self.parent[cur as usize];
            self.parent[cur as usize] = root;
            cur = next;
        }
        root
    }

    /// Representative of the class containing `x`.
    pub fn leader(&self, x: &T) -> Option<T> {
        let slot = *self.index.get(x)?;
        Some(self.elems[self.root(slot) as usize])
    }

    /// Whether `a` and `b` are in the same class.
    pub fn same_class(&self, a: &T, b: &T) -> bool {
        match (self.index.get(a), self.index.get(b)) {
            (Some(&sa), Some(&sb)) => self.root(sa) == self.root(sb),
            _ => false,
        }
    }

    /// Merge the classes of `a` and `b`, inserting either if needed.
    /// Returns the leader of the merged class.
    pub fn union(&mut self, a: T, b: T) -> T {
        let sa = self.insert(a);
        let sb = self.insert(b);
        let ra = self.root_compressing(sa);
        let rb = self.root_compressing(sb);
        if ra == rb {
            return self.elems[ra as usize];
        }

        let (hi, lo) = match self.rank[ra as usize].cmp(&self.rank[rb as usize]) {
            std::cmp::Ordering::Less => (rb, ra),
            std::cmp::Ordering::Greater => (ra, rb),
            std::cmp::Ordering::Equal => {
                self.rank[ra as usize] += 1;
                (ra, rb)
            }
        };
        self.parent[lo as usize] = hi;
        self.elems[hi as usize]
    }

    /// Members of the class containing `x`, in insertion order.
    pub fn members(&self, x: &T) -> Vec<T> {
        let Some(&slot) = self.index.get(x) else {
            return Vec::new();
        };
        let root = self.root(slot);
        (0..self.elems.len() as u32)
            .filter(|&s| self.root(s) == root)
            .map(|s| self.elems[s as usize])
            .collect()
    }
}
