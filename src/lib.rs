//! qsdiff: bsdiff-style binary diffs over a qsufsort suffix array.
//!
//! A diff walks the new buffer, anchoring on long matches found through a
//! suffix array of the old buffer and widening each anchor over scattered
//! byte changes. The result is a [`Patch`]: control records plus a stream of
//! byte differences and a stream of literal bytes, each compressed
//! separately when serialized.
//!
//! ```
//! use qsdiff::{DiffParams, Patch, compress::Uncompressed, diff::diff};
//!
//! let older = b"the quick brown fox jumps over the lazy dog";
//! let newer = b"the quick brown cat jumps over the lazy dog!";
//!
//! let patch = diff(older, newer, &DiffParams::default()).unwrap();
//! let bytes = patch.to_bytes(&Uncompressed).unwrap();
//!
//! let fresh = Patch::from_bytes(&bytes, &Uncompressed).unwrap().apply(older).unwrap();
//! assert_eq!(fresh, newer);
//! ```

use tracing::trace;

pub mod compress;
pub mod enc;
pub mod error;
pub mod int64;
pub mod patch;

#[cfg(feature = "diff")]
pub mod diff;
#[cfg(feature = "diff")]
pub mod matcher;
#[cfg(feature = "diff")]
pub mod sufsort;
#[cfg(feature = "tree")]
pub mod tree;

#[cfg(any(test, feature = "instructions"))]
pub mod instructions;

use compress::Compressor;
pub use error::{Corruption, Error, Result, Stream};

pub const MAGIC: &[u8; 8] = b"QSDIFF40";

/// One region of the new buffer, as found by the scanner: `copy_len` bytes
/// at `new_start` are explained by `old_start` in the old buffer (with byte
/// differences), and the bytes from there up to `extra_end` are literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub old_start: usize,
    pub new_start: usize,
    pub copy_len: usize,
    pub extra_end: usize,
}

impl Match {
    #[inline(always)]
    pub fn extra_start(&self) -> usize {
        self.new_start + self.copy_len
    }
}

/// One `(copyLen, extraLen, seekDelta)` triple of the control stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Control {
    pub copy_len: usize,
    pub extra_len: usize,
    pub seek: i64,
}

/// A decoded patch: the control records in replay order, the diff and
/// extra streams they consume, and the size of the buffer they rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patch {
    pub controls: Vec<Control>,
    pub diff: Vec<u8>,
    pub extra: Vec<u8>,
    pub new_size: u64,
}

impl Patch {
    pub fn new(new_size: u64) -> Self {
        Self {
            new_size,
            ..Default::default()
        }
    }

    pub fn to_bytes(&self, compressor: &dyn Compressor) -> Result<Vec<u8>> {
        let mut w = enc::Writer::new(Vec::new(), compressor);
        w.write(self)?;
        Ok(w.into_inner())
    }

    pub fn from_bytes(data: &[u8], compressor: &dyn Compressor) -> Result<Self> {
        patch::read_patch(data, compressor)
    }

    pub fn apply(&self, older: &[u8]) -> Result<Vec<u8>> {
        patch::apply(older, self)
    }
}

/// Accumulates scanner output into a [`Patch`].
///
/// A seek is measured from where the previous copy ended in the old buffer,
/// so each pushed match settles the seek of the control before it. The last
/// control keeps a seek of 0.
#[derive(Debug)]
pub struct PatchBuilder<'a> {
    obuf: &'a [u8],
    nbuf: &'a [u8],
    old_end: usize,
    patch: Patch,
}

impl<'a> PatchBuilder<'a> {
    pub fn new(obuf: &'a [u8], nbuf: &'a [u8]) -> Self {
        Self {
            obuf,
            nbuf,
            old_end: 0,
            patch: Patch::new(nbuf.len() as u64),
        }
    }

    /// Append the control for `m`, its diff bytes and its literal bytes.
    ///
    /// Matches must come in scan order: each one starts in `nbuf` where the
    /// previous one's extra bytes ended.
    pub fn push(&mut self, m: &Match) {
        if self.patch.controls.is_empty() && m.old_start != 0 {
            // replay starts at old[0], so an empty record carries the first seek
            self.patch.controls.push(Control {
                copy_len: 0,
                extra_len: 0,
                seek: 0,
            });
        }
        if let Some(prev) = self.patch.controls.last_mut() {
            prev.seek = m.old_start as i64 - self.old_end as i64;
        }

        let old = &self.obuf[m.old_start..m.old_start + m.copy_len];
        let new = &self.nbuf[m.new_start..m.extra_start()];
        self.patch
            .diff
            .extend(new.iter().zip(old).map(|(n, o)| n.wrapping_sub(*o)));

        let extra = &self.nbuf[m.extra_start()..m.extra_end];
        self.patch.extra.extend_from_slice(extra);

        trace!(
            old = m.old_start,
            new = m.new_start,
            copy = m.copy_len,
            extra = extra.len(),
            "control record"
        );
        self.patch.controls.push(Control {
            copy_len: m.copy_len,
            extra_len: extra.len(),
            seek: 0,
        });
        self.old_end = m.old_start + m.copy_len;
    }

    pub fn finish(self) -> Patch {
        self.patch
    }
}

/// Parameters used when creating diffs
#[derive(Debug, Clone)]
pub struct DiffParams {
    pub(crate) margin: usize,
    pub(crate) max_input_len: Option<usize>,
}

impl DiffParams {
    pub const DEFAULT_MARGIN: usize = 8;
    pub const MAX_MARGIN: usize = 1 << 20;

    /// Construct new diff params and check validity
    ///
    /// # Parameters
    ///
    /// - `margin`: how many bytes longer than the running score of the
    ///   current alignment a fresh match must be before the scanner cuts
    ///   over to it. Lower values split more eagerly.
    /// - `max_input_len`: refuse to diff buffers longer than this. When
    ///   `None`, only the limits of the patch format apply.
    pub fn new(margin: usize, max_input_len: Option<usize>) -> Result<Self> {
        if margin > Self::MAX_MARGIN {
            return Err(Error::InvalidInput(format!(
                "margin cannot exceed {}",
                Self::MAX_MARGIN
            )));
        }
        if max_input_len == Some(0) {
            return Err(Error::InvalidInput("max input length cannot be 0".into()));
        }

        Ok(Self {
            margin,
            max_input_len,
        })
    }

    pub fn margin(&self) -> usize {
        self.margin
    }

    pub fn max_input_len(&self) -> Option<usize> {
        self.max_input_len
    }

    pub(crate) fn check_inputs(&self, older: &[u8], newer: &[u8]) -> Result<()> {
        for (name, buf) in [("old", older), ("new", newer)] {
            if let Some(max) = self.max_input_len {
                if buf.len() > max {
                    return Err(Error::InvalidInput(format!(
                        "{} buffer is {} bytes, limit is {}",
                        name,
                        buf.len(),
                        max
                    )));
                }
            }
            if i64::try_from(buf.len()).is_err() {
                return Err(Error::InvalidInput(format!(
                    "{} buffer does not fit the patch format",
                    name
                )));
            }
        }
        Ok(())
    }
}

impl Default for DiffParams {
    fn default() -> Self {
        Self {
            margin: Self::DEFAULT_MARGIN,
            max_input_len: None,
        }
    }
}

/// Diff `older` into `newer` and serialize the patch with zstd.
#[cfg(all(feature = "diff", feature = "zstd"))]
pub fn simple_diff(older: &[u8], newer: &[u8]) -> Result<Vec<u8>> {
    simple_diff_with_params(older, newer, &DiffParams::default(), &compress::Zstd::default())
}

#[cfg(feature = "diff")]
pub fn simple_diff_with_params(
    older: &[u8],
    newer: &[u8],
    params: &DiffParams,
    compressor: &dyn Compressor,
) -> Result<Vec<u8>> {
    diff::diff(older, newer, params)?.to_bytes(compressor)
}

/// Rebuild the new buffer from `older` and a zstd patch.
#[cfg(feature = "zstd")]
pub fn simple_patch(older: &[u8], patch: &[u8]) -> Result<Vec<u8>> {
    simple_patch_with(older, patch, &compress::Zstd::default())
}

pub fn simple_patch_with(older: &[u8], patch: &[u8], compressor: &dyn Compressor) -> Result<Vec<u8>> {
    Patch::from_bytes(patch, compressor)?.apply(older)
}

#[cfg(feature = "diff")]
pub fn assert_cycle(older: &[u8], newer: &[u8]) {
    assert_cycle_with_params(older, newer, &Default::default());
}

#[cfg(feature = "diff")]
pub fn assert_cycle_with_params(older: &[u8], newer: &[u8], params: &DiffParams) {
    let patch = diff::diff(older, newer, params).expect("diff failed");
    assert_eq!(patch.new_size, newer.len() as u64);

    let bytes = patch
        .to_bytes(&compress::Uncompressed)
        .expect("serializing failed");
    let reread = Patch::from_bytes(&bytes, &compress::Uncompressed).expect("reading back failed");
    assert_eq!(reread, patch, "patch should survive serialization");

    let fresh = reread.apply(older).expect("apply failed");
    assert_eq!(fresh, newer, "fresh should be the same as newer");
}
