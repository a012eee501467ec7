//! Constant-time clearable sets over a dense integer universe.
//!
//! The placer and router clear and refill small working sets millions of
//! times; an Ullman set stores the members densely and keeps a reverse
//! index so membership is O(1) and `clear` is O(1) regardless of size.

/// A set of `usize` keys drawn from `0..capacity`.
///
/// The `pos` table may contain stale entries; membership checks validate
/// them against the live prefix of `key`.
#[derive(Debug, Clone, Default)]
pub struct UllmanSet {
    n: usize,
    key: Vec<usize>,
    pos: Vec<usize>,
}

impl UllmanSet {
    /// Creates an empty set with capacity for keys `0..cap`.
    pub fn new(cap: usize) -> Self {
        Self {
            n: 0,
            key: vec![0; cap],
            pos: vec![0; cap],
        }
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.n
    }

    /// Returns `true` if the set has no members.
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Removes all members in O(1).
    pub fn clear(&mut self) {
        self.n = 0;
    }

    /// Grows the key universe to `0..cap` and clears the set.
    pub fn resize(&mut self, cap: usize) {
        self.key.resize(cap, 0);
        self.pos.resize(cap, 0);
        self.n = 0;
    }

    /// Membership test.
    pub fn contains(&self, k: usize) -> bool {
        let p = self.pos[k];
        p < self.n && self.key[p] == k
    }

    /// Inserts `k`; no effect if already present.
    pub fn insert(&mut self, k: usize) {
        if self.contains(k) {
            return;
        }
        let p = self.n;
        self.n += 1;
        self.key[p] = k;
        self.pos[k] = p;
    }

    /// Inserts `k`, which must not be present.
    pub fn extend(&mut self, k: usize) {
        debug_assert!(!self.contains(k));
        let p = self.n;
        self.n += 1;
        self.key[p] = k;
        self.pos[k] = p;
    }

    /// Removes `k`; no effect if absent.
    pub fn erase(&mut self, k: usize) {
        if !self.contains(k) {
            return;
        }
        let p = self.pos[k];
        self.n -= 1;
        if p != self.n {
            let last = self.key[self.n];
            self.pos[last] = p;
            self.key[p] = last;
        }
    }

    /// Returns the `i`th member in insertion order (stable until an erase).
    pub fn ith(&self, i: usize) -> usize {
        debug_assert!(i < self.n);
        self.key[i]
    }
}

/// An Ullman set whose keys start at a constant base (typically 1).
#[derive(Debug, Clone, Default)]
pub struct BasedUllmanSet<const B: usize> {
    inner: UllmanSet,
}

impl<const B: usize> BasedUllmanSet<B> {
    /// Creates an empty set for keys `B..B+cap`.
    pub fn new(cap: usize) -> Self {
        Self {
            inner: UllmanSet::new(cap),
        }
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if the set has no members.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Removes all members in O(1).
    pub fn clear(&mut self) {
        self.inner.clear()
    }

    /// Grows the key universe and clears the set.
    pub fn resize(&mut self, cap: usize) {
        self.inner.resize(cap)
    }

    /// Membership test.
    pub fn contains(&self, k: usize) -> bool {
        self.inner.contains(k - B)
    }

    /// Inserts `k`; no effect if already present.
    pub fn insert(&mut self, k: usize) {
        self.inner.insert(k - B)
    }

    /// Removes `k`; no effect if absent.
    pub fn erase(&mut self, k: usize) {
        self.inner.erase(k - B)
    }

    /// Returns the `i`th member in insertion order.
    pub fn ith(&self, i: usize) -> usize {
        self.inner.ith(i) + B
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_contains_erase() {
        let mut s = UllmanSet::new(10);
        assert!(s.is_empty());
        s.insert(3);
        s.insert(7);
        assert!(s.contains(3) && s.contains(7));
        assert!(!s.contains(4));
        assert_eq!(s.len(), 2);
        s.erase(3);
        assert!(!s.contains(3));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn double_insert_is_idempotent() {
        let mut s = UllmanSet::new(4);
        s.insert(2);
        s.insert(2);
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn clear_is_constant_time_reset() {
        let mut s = UllmanSet::new(8);
        for k in 0..8 {
            s.insert(k);
        }
        s.clear();
        assert!(s.is_empty());
        for k in 0..8 {
            assert!(!s.contains(k), "stale entry for {k} after clear");
        }
    }

    #[test]
    fn erase_middle_keeps_others() {
        let mut s = UllmanSet::new(8);
        s.insert(1);
        s.insert(2);
        s.insert(3);
        s.erase(2);
        assert!(s.contains(1) && s.contains(3) && !s.contains(2));
        let members: Vec<_> = (0..s.len()).map(|i| s.ith(i)).collect();
        assert_eq!(members.len(), 2);
    }

    #[test]
    fn ith_iterates_in_insertion_order() {
        let mut s = UllmanSet::new(16);
        s.insert(5);
        s.insert(9);
        s.insert(0);
        let members: Vec<_> = (0..s.len()).map(|i| s.ith(i)).collect();
        assert_eq!(members, vec![5, 9, 0]);
    }

    #[test]
    fn based_set_offsets_keys() {
        let mut s: BasedUllmanSet<1> = BasedUllmanSet::new(4);
        s.insert(1);
        s.insert(4);
        assert!(s.contains(1) && s.contains(4));
        assert_eq!(s.ith(0), 1);
        s.erase(1);
        assert!(!s.contains(1));
    }

    #[test]
    fn reuse_after_clear_and_resize() {
        let mut s = UllmanSet::new(2);
        s.insert(1);
        s.resize(100);
        assert!(s.is_empty());
        s.insert(99);
        assert!(s.contains(99));
    }
}
