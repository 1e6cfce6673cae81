use std::{fmt, io};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("corrupt patch: {0}")]
    CorruptPatch(#[from] Corruption),
    #[error("compressor failure")]
    CompressorFailure(#[source] io::Error),
    #[error("I/O error")]
    Io(#[from] io::Error),
}

/// One of the three independently compressed streams of a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Control,
    Diff,
    Extra,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Stream::Control => "control",
            Stream::Diff => "diff",
            Stream::Extra => "extra",
        })
    }
}

/// What exactly was wrong with a patch.
#[derive(Error, Debug)]
pub enum Corruption {
    #[error("patch is {0} bytes, shorter than its header")]
    TruncatedHeader(usize),
    #[error("integer field needs 8 bytes, got {0}")]
    TruncatedInt(usize),
    #[error("wrong magic: expected `{expected:X?}`, got `{got:X?}`")]
    WrongMagic { expected: [u8; 8], got: [u8; 8] },
    #[error("negative {0} length")]
    NegativeLength(&'static str),
    #[error("{stream} stream claims {claimed} bytes but only {available} remain")]
    StreamOverrun {
        stream: Stream,
        claimed: u64,
        available: u64,
    },
    #[error("{0} trailing bytes after the extra stream")]
    TrailingBytes(usize),
    #[error("{stream} stream failed to decompress")]
    Decompress {
        stream: Stream,
        #[source]
        source: io::Error,
    },
    #[error("control stream is {0} bytes, not a whole number of records")]
    RaggedControl(usize),
    #[error("record {record}: copy of {len} bytes at old offset {pos} reads outside old ({old_len} bytes)")]
    OldOverrun {
        record: usize,
        pos: i64,
        len: usize,
        old_len: usize,
    },
    #[error("record {record}: {stream} stream exhausted")]
    StreamExhausted { record: usize, stream: Stream },
    #[error("record {record}: output would exceed declared size {new_size}")]
    OutputOverrun { record: usize, new_size: u64 },
    #[error("record {record}: seek overflows the old offset")]
    SeekOverflow { record: usize },
    #[error("patch produces {actual} bytes, header declares {expected}")]
    SizeMismatch { expected: u64, actual: u64 },
    #[error("{stream} stream has {left} unused bytes")]
    Unconsumed { stream: Stream, left: usize },
}
