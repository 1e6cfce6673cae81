#![allow(non_snake_case)]

use std::{cmp::min, fmt};

/// A run of `len` bytes of the indexed text starting at `start`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct LongestMatch {
    pub start: usize,
    pub len: usize,
}

impl fmt::Debug for LongestMatch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "T[{}..{}]", self.start, self.start + self.len)
    }
}

/// Returns the number of leading bytes common to a and b
#[inline]
pub fn matchlen(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// Binary search the sorted suffixes `I[st..=en]` of `old` for the one
/// sharing the longest prefix with `new`. Returns `(length, old offset)`.
///
/// Only the two suffixes the search converges on are measured, so this is
/// a good anchor rather than a guaranteed global maximum. Ties go to `en`.
///
/// `I` must be a finished suffix array of `old` and `st <= en < I.len()`.
pub fn search(I: &[isize], old: &[u8], new: &[u8], mut st: usize, mut en: usize) -> (usize, usize) {
    while en - st >= 2 {
        let mid = st + (en - st) / 2;
        let suffix = &old[I[mid] as usize..];
        let n = min(suffix.len(), new.len());
        if suffix[..n] < new[..n] {
            st = mid;
        } else {
            en = mid;
        }
    }

    let (ps, pe) = (I[st] as usize, I[en] as usize);
    let x = matchlen(&old[ps..], new);
    let y = matchlen(&old[pe..], new);
    if x > y { (x, ps) } else { (y, pe) }
}
