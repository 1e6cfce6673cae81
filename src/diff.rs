//! The greedy scan that cuts the new buffer into copy and extra regions.

use crate::{DiffParams, Error, Match, Patch, PatchBuilder, Result, sufsort::SuffixArray};
use std::{cmp::min, fmt, time::Instant};
use tracing::debug;

struct MatchScanner<'a> {
    scan: usize,
    pos: usize,
    length: usize,
    lastscan: usize,
    lastpos: usize,
    lastoffset: isize,
    margin: isize,

    obuf: &'a [u8],
    nbuf: &'a [u8],
    sa: &'a SuffixArray<'a>,
}

impl<'a> MatchScanner<'a> {
    fn new(obuf: &'a [u8], nbuf: &'a [u8], sa: &'a SuffixArray<'a>, margin: usize) -> Self {
        Self {
            scan: 0,
            pos: 0,
            length: 0,
            lastscan: 0,
            lastpos: 0,
            lastoffset: 0,
            margin: margin as isize,
            obuf,
            nbuf,
            sa,
        }
    }

    /// Does `nbuf[i]` agree with old under the previous alignment?
    #[inline(always)]
    fn old_matches(&self, i: usize) -> bool {
        let oi = i as isize + self.lastoffset;
        oi >= 0 && (oi as usize) < self.obuf.len() && self.obuf[oi as usize] == self.nbuf[i]
    }

    /// How far the previous alignment can be pushed forward from `lastscan`.
    fn forward_extent(&self) -> usize {
        let n = min(self.scan - self.lastscan, self.obuf.len() - self.lastpos);
        let o_slice = &self.obuf[self.lastpos..self.lastpos + n];
        let n_slice = &self.nbuf[self.lastscan..self.lastscan + n];

        let (mut s, mut sf, mut lenf) = (0_isize, 0_isize, 0_isize);
        for (i, (o, n)) in o_slice.iter().zip(n_slice).enumerate() {
            if o == n {
                s += 1;
            }
            let i = i as isize + 1;
            if s * 2 - i > sf * 2 - lenf {
                sf = s;
                lenf = i;
            }
        }
        lenf as usize
    }

    /// How far the fresh anchor can be pulled back from `scan`.
    fn backward_extent(&self) -> usize {
        if self.scan >= self.nbuf.len() {
            return 0;
        }

        let n = min(self.scan - self.lastscan, self.pos);
        let o_slice = &self.obuf[self.pos - n..self.pos];
        let n_slice = &self.nbuf[self.scan - n..self.scan];

        let (mut s, mut sb, mut lenb) = (0_isize, 0_isize, 0_isize);
        for (i, (o, n)) in o_slice.iter().rev().zip(n_slice.iter().rev()).enumerate() {
            if o == n {
                s += 1;
            }
            let i = i as isize + 1;
            if s * 2 - i > sb * 2 - lenb {
                sb = s;
                lenb = i;
            }
        }
        lenb as usize
    }

    /// Where inside the overlap the previous region should hand over to the
    /// fresh one, measured from the start of the overlap.
    fn overlap_split(&self, lenf: usize, lenb: usize, overlap: usize) -> usize {
        let last_n = &self.nbuf[self.lastscan + lenf - overlap..self.lastscan + lenf];
        let last_o = &self.obuf[self.lastpos + lenf - overlap..self.lastpos + lenf];
        let cur_n = &self.nbuf[self.scan - lenb..self.scan - lenb + overlap];
        let cur_o = &self.obuf[self.pos - lenb..self.pos - lenb + overlap];

        let (mut s, mut ss, mut lens) = (0_isize, 0_isize, 0);
        for i in 0..overlap {
            if last_n[i] == last_o[i] {
                s += 1;
            }
            if cur_n[i] == cur_o[i] {
                s -= 1;
            }
            if s > ss {
                ss = s;
                lens = i + 1;
            }
        }
        lens
    }
}

impl<'a> Iterator for MatchScanner<'a> {
    type Item = Match;

    fn next(&mut self) -> Option<Self::Item> {
        let nbuflen = self.nbuf.len();

        while self.scan < nbuflen {
            let mut oldscore = 0_isize;
            self.scan += self.length;

            let mut scsc = self.scan;
            while self.scan < nbuflen {
                let res = self.sa.longest_match(&self.nbuf[self.scan..]);
                self.pos = res.start;
                self.length = res.len;

                let end = self.scan + self.length;
                while scsc < end {
                    if self.old_matches(scsc) {
                        oldscore += 1;
                    }
                    scsc += 1;
                }

                let same_length = self.length as isize == oldscore && self.length != 0;
                let significantly_better = self.length as isize > oldscore + self.margin;
                if same_length || significantly_better {
                    break;
                }

                if self.old_matches(self.scan) {
                    oldscore -= 1;
                }
                self.scan += 1;
            }

            let done_scanning = self.scan == nbuflen;
            if self.length as isize != oldscore || done_scanning {
                let mut lenf = self.forward_extent();
                let mut lenb = self.backward_extent();

                if self.lastscan + lenf > self.scan - lenb {
                    let overlap = (self.lastscan + lenf) - (self.scan - lenb);
                    let lens = self.overlap_split(lenf, lenb, overlap);
                    // order matters to avoid underflow
                    lenf += lens;
                    lenf -= overlap;
                    lenb -= lens;
                }

                let m = Match {
                    old_start: self.lastpos,
                    new_start: self.lastscan,
                    copy_len: lenf,
                    extra_end: self.scan - lenb,
                };

                self.lastscan = self.scan - lenb;
                self.lastpos = self.pos - lenb;
                self.lastoffset = self.pos as isize - self.scan as isize;

                return Some(m);
            }
        }

        None
    }
}

/// Walk `nbuf` and report every region it is cut into, in order.
///
/// Matches tile the new buffer: each one starts where the previous one's
/// extra bytes ended, and the last one ends at `nbuf.len()`.
pub fn scan<F, E>(obuf: &[u8], nbuf: &[u8], params: &DiffParams, mut on_match: F) -> std::result::Result<(), E>
where
    F: FnMut(Match) -> std::result::Result<(), E>,
    E: From<Error>,
{
    params.check_inputs(obuf, nbuf)?;

    let before_sort = Instant::now();
    let sa = SuffixArray::new(obuf);
    debug!(
        old_len = obuf.len(),
        "suffix sort took {}",
        DurationSpeed(obuf.len() as u64, before_sort.elapsed())
    );

    let before_scan = Instant::now();
    let mut matches = 0usize;
    for m in MatchScanner::new(obuf, nbuf, &sa, params.margin) {
        matches += 1;
        on_match(m)?;
    }
    debug!(
        records = matches,
        "scanning took {}",
        DurationSpeed(nbuf.len() as u64, before_scan.elapsed())
    );

    Ok(())
}

/// Diff `obuf` into `nbuf`.
pub fn diff(obuf: &[u8], nbuf: &[u8], params: &DiffParams) -> Result<Patch> {
    let mut builder = PatchBuilder::new(obuf, nbuf);
    scan(obuf, nbuf, params, |m| -> Result<()> {
        builder.push(&m);
        Ok(())
    })?;
    let patch = builder.finish();

    debug!(
        controls = patch.controls.len(),
        diff = patch.diff.len(),
        extra = patch.extra.len(),
        "diff done"
    );
    Ok(patch)
}

struct DurationSpeed(u64, std::time::Duration);

impl fmt::Display for DurationSpeed {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (size, duration) = (self.0, self.1);
        let secs = duration.as_secs_f64();
        if secs > 0.0 {
            let mib = size as f64 / 1024.0 / 1024.0;
            write!(f, "{:?} ({:.2} MiB/s)", duration, mib / secs)
        } else {
            write!(f, "{:?}", duration)
        }
    }
}
