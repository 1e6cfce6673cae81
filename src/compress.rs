//! The byte compressor that shrinks each of the three patch streams.
//!
//! The patch format does not record which compressor was used, so the
//! reader has to be given the same backend the writer used.

use crate::error::{Corruption, Stream};
use std::io::{self, ErrorKind};

/// A pluggable compressor for the control, diff and extra streams.
///
/// # Implementing a custom backend
///
/// ```
/// use qsdiff::compress::Compressor;
/// use std::io;
///
/// struct Passthrough;
///
/// impl Compressor for Passthrough {
///     fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
///         Ok(data.to_vec())
///     }
///
///     fn decompress(&self, data: &[u8], max_len: usize) -> io::Result<Vec<u8>> {
///         if data.len() > max_len {
///             return Err(io::Error::new(io::ErrorKind::InvalidData, "stream too long"));
///         }
///         Ok(data.to_vec())
///     }
/// }
/// ```
pub trait Compressor: Send + Sync {
    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>>;

    /// Must fail rather than produce more than `max_len` bytes.
    fn decompress(&self, data: &[u8], max_len: usize) -> io::Result<Vec<u8>>;
}

fn too_long(max_len: usize) -> io::Error {
    io::Error::new(
        ErrorKind::InvalidData,
        format!("stream decompresses past its {} byte limit", max_len),
    )
}

/// Stores streams as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uncompressed;

impl Compressor for Uncompressed {
    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8], max_len: usize) -> io::Result<Vec<u8>> {
        if data.len() > max_len {
            return Err(too_long(max_len));
        }
        Ok(data.to_vec())
    }
}

#[cfg(feature = "zstd")]
pub use self::zstd_backend::Zstd;

#[cfg(feature = "zstd")]
mod zstd_backend {
    use super::{Compressor, too_long};
    use crate::error::Error;
    use std::io::{self, Read};

    /// zstd, one frame per stream.
    #[derive(Debug, Clone, Copy)]
    pub struct Zstd {
        level: i32,
    }

    impl Zstd {
        pub const DEFAULT_LEVEL: i32 = 19;

        pub fn new(level: i32) -> Result<Self, Error> {
            let range = zstd::compression_level_range();
            if !range.contains(&level) {
                return Err(Error::InvalidInput(format!(
                    "zstd level {} is outside {}..={}",
                    level,
                    range.start(),
                    range.end()
                )));
            }
            Ok(Self { level })
        }

        pub fn level(&self) -> i32 {
            self.level
        }
    }

    impl Default for Zstd {
        fn default() -> Self {
            Self {
                level: Self::DEFAULT_LEVEL,
            }
        }
    }

    impl Compressor for Zstd {
        fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
            zstd::bulk::compress(data, self.level)
        }

        fn decompress(&self, data: &[u8], max_len: usize) -> io::Result<Vec<u8>> {
            // stream rather than bulk-decompress: `max_len` comes from an
            // untrusted header and must not size an allocation up front
            let decoder = zstd::stream::read::Decoder::with_buffer(data)?;
            let mut out = Vec::new();
            decoder
                .take((max_len as u64).saturating_add(1))
                .read_to_end(&mut out)?;
            if out.len() > max_len {
                return Err(too_long(max_len));
            }
            Ok(out)
        }
    }
}

/// Compress the control, diff and extra streams, concurrently with the
/// `parallel` feature.
pub(crate) fn compress_streams(c: &dyn Compressor, streams: [&[u8]; 3]) -> io::Result<[Vec<u8>; 3]> {
    let [ctrl, diff, extra] = streams;

    #[cfg(feature = "parallel")]
    let (ctrl, (diff, extra)) = rayon::join(
        || c.compress(ctrl),
        || rayon::join(|| c.compress(diff), || c.compress(extra)),
    );
    #[cfg(not(feature = "parallel"))]
    let (ctrl, diff, extra) = (c.compress(ctrl), c.compress(diff), c.compress(extra));

    Ok([ctrl?, diff?, extra?])
}

/// Decompress the control, diff and extra streams, each against its own limit.
pub(crate) fn decompress_streams(
    c: &dyn Compressor,
    streams: [(&[u8], usize); 3],
) -> Result<[Vec<u8>; 3], Corruption> {
    let one = |stream: Stream, (data, max_len): (&[u8], usize)| {
        c.decompress(data, max_len)
            .map_err(|source| Corruption::Decompress { stream, source })
    };
    let [ctrl, diff, extra] = streams;

    #[cfg(feature = "parallel")]
    let (ctrl, (diff, extra)) = rayon::join(
        || one(Stream::Control, ctrl),
        || rayon::join(|| one(Stream::Diff, diff), || one(Stream::Extra, extra)),
    );
    #[cfg(not(feature = "parallel"))]
    let (ctrl, diff, extra) = (
        one(Stream::Control, ctrl),
        one(Stream::Diff, diff),
        one(Stream::Extra, extra),
    );

    Ok([ctrl?, diff?, extra?])
}
