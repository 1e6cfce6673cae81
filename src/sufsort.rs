//! Larsson-Sadakane suffix sorting ("qsufsort").
//!
//! `I` is the suffix array and `V` the rank array. While sorting, a negative
//! `I[k]` marks the start of a run of `-I[k]` suffixes whose final position is
//! already known, and `V[i]` holds the index of the last slot of the group
//! the suffix at `i` currently belongs to. Once `I[0] == -(n + 1)` the whole
//! array is one resolved run and `V` is inverted back into `I`.

#![allow(non_snake_case)]

use crate::matcher::{self, LongestMatch};

/// Groups shorter than this are refined by repeated minimum selection,
/// longer ones by a three-way partition around a pivot.
const SHORT_GROUP: usize = 16;

pub struct SuffixArray<'a> {
    text: &'a [u8],
    indices: Vec<isize>,
    ranks: Vec<isize>,
}

impl<'a> SuffixArray<'a> {
    pub fn new(text: &'a [u8]) -> Self {
        let (indices, ranks) = qsufsort(text);
        Self {
            text,
            indices,
            ranks,
        }
    }

    #[inline(always)]
    pub fn text(&self) -> &'a [u8] {
        self.text
    }

    /// `text.len() + 1` entries; entry 0 is always the empty suffix.
    #[inline(always)]
    pub fn indices(&self) -> &[isize] {
        &self.indices
    }

    /// Rank of the suffix starting at each offset, the inverse of `indices`.
    #[inline(always)]
    pub fn ranks(&self) -> &[isize] {
        &self.ranks
    }

    /// Panics if the suffixes are not in ascending order.
    pub fn check_valid(&self) {
        let suf = |i: isize| -> &[u8] { &self.text[i as usize..] };

        let mut seen = vec![false; self.indices.len()];
        for &i in &self.indices {
            assert!(
                i >= 0 && (i as usize) < seen.len() && !seen[i as usize],
                "{} is not a fresh suffix offset",
                i
            );
            seen[i as usize] = true;
        }

        for win in self.indices.windows(2) {
            if suf(win[0]) > suf(win[1]) {
                panic!("Sequence {:?} > {:?}", suf(win[0]), suf(win[1]));
            }
        }
    }

    /// Find the suffix of `text` sharing the longest prefix with `needle`.
    pub fn longest_match(&self, needle: &[u8]) -> LongestMatch {
        let (len, start) = matcher::search(&self.indices, self.text, needle, 0, self.text.len());
        LongestMatch { start, len }
    }
}

/// Sort all suffixes of `old`, returning `(I, V)` with `I[V[i]] == i`.
pub fn qsufsort(old: &[u8]) -> (Vec<isize>, Vec<isize>) {
    let n = old.len();
    let mut I = vec![0isize; n + 1];
    let mut V = vec![0isize; n + 1];

    // bucket by first byte: after the scatter below, buckets[c] is the
    // last slot of the group of suffixes starting with `c`
    let mut buckets = [0isize; 256];
    for &c in old {
        buckets[c as usize] += 1;
    }
    for c in 1..256 {
        buckets[c] += buckets[c - 1];
    }
    for c in (1..256).rev() {
        buckets[c] = buckets[c - 1];
    }
    buckets[0] = 0;

    for (i, &c) in old.iter().enumerate() {
        buckets[c as usize] += 1;
        I[buckets[c as usize] as usize] = i as isize;
    }
    I[0] = n as isize;
    for (i, &c) in old.iter().enumerate() {
        V[i] = buckets[c as usize];
    }
    V[n] = 0;

    for c in 1..256 {
        if buckets[c] == buckets[c - 1] + 1 {
            I[buckets[c] as usize] = -1;
        }
    }
    I[0] = -1;

    let end = n as isize + 1;
    let mut h = 1;
    while I[0] != -end {
        let mut len = 0isize;
        let mut i = 0isize;
        while i < end {
            let run = I[i as usize];
            if run < 0 {
                len -= run;
                i -= run;
            } else {
                if len != 0 {
                    I[(i - len) as usize] = -len;
                }
                len = V[run as usize] + 1 - i;
                split(&mut I, &mut V, i as usize, len as usize, h);
                i += len;
                len = 0;
            }
        }
        if len != 0 {
            I[(i - len) as usize] = -len;
        }
        h += h;
    }

    for (i, &rank) in V.iter().enumerate() {
        I[rank as usize] = i as isize;
    }

    (I, V)
}

#[inline(always)]
fn key(I: &[isize], V: &[isize], k: usize, h: usize) -> isize {
    V[I[k] as usize + h]
}

enum Task {
    Split { start: usize, len: usize },
    Settle { lo: usize, hi: usize },
}

/// Refine the unresolved group `I[start..start + len]` by the rank of the
/// suffix `h` bytes further on.
///
/// Sub-groups are refined low keys first, then the pivot group is settled,
/// then high keys. The work list replaces recursion so that adversarial
/// inputs cannot exhaust the call stack.
pub fn split(I: &mut [isize], V: &mut [isize], start: usize, len: usize, h: usize) {
    if len < SHORT_GROUP {
        split_short(I, V, start, len, h);
        return;
    }

    let mut stack = vec![Task::Split { start, len }];
    while let Some(task) = stack.pop() {
        match task {
            Task::Split { start, len } if len < SHORT_GROUP => split_short(I, V, start, len, h),
            Task::Split { start, len } => {
                let (lo, hi) = partition(I, V, start, len, h);
                if start + len > hi {
                    stack.push(Task::Split {
                        start: hi,
                        len: start + len - hi,
                    });
                }
                stack.push(Task::Settle { lo, hi });
                if lo > start {
                    stack.push(Task::Split {
                        start,
                        len: lo - start,
                    });
                }
            }
            Task::Settle { lo, hi } => settle(I, V, lo, hi),
        }
    }
}

/// Pull out the smallest-key group, settle it, and repeat on the rest.
fn split_short(I: &mut [isize], V: &mut [isize], start: usize, len: usize, h: usize) {
    let end = start + len;
    let mut k = start;
    while k < end {
        let mut j = 1;
        let mut x = key(I, V, k, h);
        for i in k + 1..end {
            let v = key(I, V, i, h);
            if v < x {
                x = v;
                j = 0;
            }
            if v == x {
                I.swap(k + j, i);
                j += 1;
            }
        }
        settle(I, V, k, k + j);
        k += j;
    }
}

/// Three-way partition around the key of the middle element.
/// Returns the bounds `lo..hi` of the equal-key block.
fn partition(I: &mut [isize], V: &[isize], start: usize, len: usize, h: usize) -> (usize, usize) {
    let x = key(I, V, start + len / 2, h);

    let mut lo = start;
    let mut hi = start;
    for i in start..start + len {
        let v = key(I, V, i, h);
        if v < x {
            lo += 1;
        }
        if v == x {
            hi += 1;
        }
    }
    hi += lo - start;

    let (mut j, mut k) = (0, 0);
    let mut i = start;
    while i < lo {
        let v = key(I, V, i, h);
        if v < x {
            i += 1;
        } else if v == x {
            I.swap(i, lo + j);
            j += 1;
        } else {
            I.swap(i, hi + k);
            k += 1;
        }
    }
    while lo + j < hi {
        if key(I, V, lo + j, h) == x {
            j += 1;
        } else {
            I.swap(lo + j, hi + k);
            k += 1;
        }
    }

    (lo, hi)
}

/// `I[lo..hi]` now share a key: give them the group rank `hi - 1`,
/// and mark the slot resolved if the group is a singleton.
#[inline]
fn settle(I: &mut [isize], V: &mut [isize], lo: usize, hi: usize) {
    let rank = hi as isize - 1;
    for &p in &I[lo..hi] {
        V[p as usize] = rank;
    }
    if hi - lo == 1 {
        I[lo] = -1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn assert_sorted(text: &[u8]) {
        let sa = SuffixArray::new(text);
        let (I, V) = (sa.indices(), sa.ranks());
        assert_eq!(I.len(), text.len() + 1);
        assert_eq!(V.len(), text.len() + 1);
        for (i, &rank) in V.iter().enumerate() {
            assert_eq!(I[rank as usize], i as isize, "I[V[{}]] != {}", i, i);
        }
        sa.check_valid();
    }

    #[test]
    fn empty() {
        let (I, V) = qsufsort(b"");
        assert_eq!(I, vec![0]);
        assert_eq!(V, vec![0]);
    }

    #[test]
    fn banana() {
        let (I, V) = qsufsort(b"banana");
        assert_eq!(I, vec![6, 5, 3, 1, 0, 4, 2]);
        assert_eq!(V, vec![4, 3, 6, 2, 5, 1, 0]);
    }

    #[test]
    fn single_byte() {
        let (I, _) = qsufsort(b"x");
        assert_eq!(I, vec![1, 0]);
    }

    #[test]
    fn uniform_runs() {
        // one huge first-byte group, refined all the way down
        for n in [2usize, 15, 16, 17, 100, 1000] {
            let text = vec![b'a'; n];
            let (I, _) = qsufsort(&text);
            let expected: Vec<isize> = (0..=n as isize).rev().collect();
            assert_eq!(I, expected, "n = {}", n);
        }
    }

    #[test]
    fn periodic_and_mixed() {
        assert_sorted(b"abababababababababababababababab");
        assert_sorted(b"mississippi");
        assert_sorted(&[1, 0, 0, 2, 2, 0, 0, 2, 2, 0, 1, 0]);
        assert_sorted(&[0, 0, 0, 255, 255, 0, 0, 255]);
        let text: Vec<u8> = (0..4096u32).map(|i| (i * i % 7) as u8).collect();
        assert_sorted(&text);
    }

    /// Lay out one unresolved group of `keys.len()` elements at even offsets,
    /// with the key of element `m` at `V[2m + 1]`, so refining with `h = 1`
    /// never rewrites a key it still has to read.
    fn split_group(keys: &[isize]) -> (Vec<isize>, Vec<isize>) {
        let len = keys.len();
        let mut I: Vec<isize> = (0..len).map(|m| 2 * m as isize).collect();
        let mut V = vec![len as isize - 1; 2 * len];
        for (m, &k) in keys.iter().enumerate() {
            V[2 * m + 1] = k;
        }
        split(&mut I, &mut V, 0, len, 1);
        (I, V)
    }

    fn assert_split(keys: &[isize]) {
        let (I, V) = split_group(keys);
        for (m, &k) in keys.iter().enumerate() {
            let not_above = keys.iter().filter(|&&o| o <= k).count() as isize;
            let equal = keys.iter().filter(|&&o| o == k).count() as isize;
            let rank = V[2 * m];
            assert_eq!(rank, not_above - 1, "rank of element {} (key {})", m, k);
            let first = rank - equal + 1;
            if equal == 1 {
                assert_eq!(I[rank as usize], -1, "singleton {} not marked", m);
            } else {
                let group = &I[first as usize..=rank as usize];
                assert!(group.contains(&(2 * m as isize)), "element {} outside its group", m);
            }
        }
    }

    #[test]
    fn split_short_groups() {
        let keys = [5, 3, 5, 1, 9, 3, 3, 0, 7, 5];
        assert!(keys.len() < SHORT_GROUP);
        assert_split(&keys);
        assert_split(&[4]);
        assert_split(&[2, 2, 2, 2]);
        assert_split(&[3, 2, 1, 0]);
    }

    #[test]
    fn split_long_groups() {
        let mut keys: Vec<isize> = (0..40).map(|m| (m * 7) % 13).collect();
        for (m, k) in keys.iter_mut().enumerate().skip(36) {
            *k = 100 + m as isize;
        }
        assert!(keys.len() >= SHORT_GROUP);
        assert_split(&keys);

        let descending: Vec<isize> = (0..64).rev().collect();
        assert_split(&descending);

        assert_split(&vec![1; 33]);
    }

    proptest! {
        #[test]
        fn random_input(text in proptest::collection::vec(any::<u8>(), 0..512)) {
            assert_sorted(&text);
        }

        #[test]
        fn small_alphabet(text in proptest::collection::vec(0u8..3, 0..1024)) {
            assert_sorted(&text);
        }
    }
}
