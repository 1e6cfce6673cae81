//! Reading patches back and replaying them against the old buffer.
//!
//! Everything here treats its input as untrusted: every length is checked
//! against what is actually present before it is used, and decompression
//! is capped by the size the header declares for the output.

use crate::{
    Control, MAGIC, Patch,
    compress::{Compressor, decompress_streams},
    enc::CONTROL_LEN,
    error::{Corruption, Result, Stream},
    int64,
};
use std::cmp::min;
use tracing::debug;

pub const HEADER_LEN: usize = MAGIC.len() + 4 * int64::SIZE;

fn non_negative(value: i64, what: &'static str) -> std::result::Result<u64, Corruption> {
    u64::try_from(value).map_err(|_| Corruption::NegativeLength(what))
}

fn take<'d>(rest: &mut &'d [u8], stream: Stream, claimed: u64) -> std::result::Result<&'d [u8], Corruption> {
    let data: &'d [u8] = *rest;
    let available = data.len() as u64;
    if claimed > available {
        return Err(Corruption::StreamOverrun {
            stream,
            claimed,
            available,
        });
    }
    let (head, tail) = data.split_at(claimed as usize);
    *rest = tail;
    Ok(head)
}

/// Parse and decompress a serialized patch.
pub fn read_patch(data: &[u8], compressor: &dyn Compressor) -> Result<Patch> {
    if data.len() < HEADER_LEN {
        return Err(Corruption::TruncatedHeader(data.len()).into());
    }

    let mut got = [0u8; 8];
    got.copy_from_slice(&data[..MAGIC.len()]);
    if &got != MAGIC {
        return Err(Corruption::WrongMagic {
            expected: *MAGIC,
            got,
        }
        .into());
    }

    let fields = &data[MAGIC.len()..HEADER_LEN];
    let ctrl_len = non_negative(int64::decode_at(fields, 0)?, "control")?;
    let diff_len = non_negative(int64::decode_at(fields, 1)?, "diff")?;
    let extra_len = non_negative(int64::decode_at(fields, 2)?, "extra")?;
    let new_size = non_negative(int64::decode_at(fields, 3)?, "output")?;

    let mut rest = &data[HEADER_LEN..];
    let ctrl = take(&mut rest, Stream::Control, ctrl_len)?;
    let diff = take(&mut rest, Stream::Diff, diff_len)?;
    let extra = take(&mut rest, Stream::Extra, extra_len)?;
    if !rest.is_empty() {
        return Err(Corruption::TrailingBytes(rest.len()).into());
    }

    // a scan emits at most one record per output byte, plus one
    let out_limit = usize::try_from(new_size).unwrap_or(usize::MAX);
    let ctrl_limit = CONTROL_LEN.saturating_mul(out_limit.saturating_add(1));
    let [ctrl, diff, extra] = decompress_streams(
        compressor,
        [(ctrl, ctrl_limit), (diff, out_limit), (extra, out_limit)],
    )?;

    if ctrl.len() % CONTROL_LEN != 0 {
        return Err(Corruption::RaggedControl(ctrl.len()).into());
    }

    let controls = ctrl
        .chunks_exact(CONTROL_LEN)
        .enumerate()
        .map(|(record, raw)| -> std::result::Result<Control, Corruption> {
            let len = |index: usize, what: &'static str| -> std::result::Result<usize, Corruption> {
                let value = non_negative(int64::decode_at(raw, index)?, what)?;
                usize::try_from(value).map_err(|_| Corruption::OutputOverrun { record, new_size })
            };
            Ok(Control {
                copy_len: len(0, "copy")?,
                extra_len: len(1, "extra")?,
                seek: int64::decode_at(raw, 2)?,
            })
        })
        .collect::<std::result::Result<Vec<_>, Corruption>>()?;

    debug!(
        controls = controls.len(),
        diff = diff.len(),
        extra = extra.len(),
        new_size,
        "read patch"
    );

    Ok(Patch {
        controls,
        diff,
        extra,
        new_size,
    })
}

/// Replay `patch` against `old`.
///
/// Either the whole new buffer comes back or an error does; a patch that
/// leaves stream bytes unused or produces a different size than it declares
/// is rejected.
pub fn apply(old: &[u8], patch: &Patch) -> Result<Vec<u8>> {
    let new_size = patch.new_size;
    // each output byte consumes one diff or extra byte
    let capacity = min(new_size, (patch.diff.len() + patch.extra.len()) as u64) as usize;
    let mut out = Vec::with_capacity(capacity);

    let mut diff = &patch.diff[..];
    let mut extra = &patch.extra[..];
    let mut old_pos = 0_i64;

    for (record, c) in patch.controls.iter().enumerate() {
        let remaining = new_size - out.len() as u64;
        if (c.copy_len as u64).saturating_add(c.extra_len as u64) > remaining {
            return Err(Corruption::OutputOverrun { record, new_size }.into());
        }

        if c.copy_len > diff.len() {
            return Err(Corruption::StreamExhausted {
                record,
                stream: Stream::Diff,
            }
            .into());
        }
        if c.copy_len > 0 {
            let start = usize::try_from(old_pos)
                .ok()
                .filter(|&start| start <= old.len() && old.len() - start >= c.copy_len)
                .ok_or(Corruption::OldOverrun {
                    record,
                    pos: old_pos,
                    len: c.copy_len,
                    old_len: old.len(),
                })?;
            let (d, tail) = diff.split_at(c.copy_len);
            out.extend(
                old[start..start + c.copy_len]
                    .iter()
                    .zip(d)
                    .map(|(o, d)| o.wrapping_add(*d)),
            );
            diff = tail;
        }

        if c.extra_len > extra.len() {
            return Err(Corruption::StreamExhausted {
                record,
                stream: Stream::Extra,
            }
            .into());
        }
        let (e, tail) = extra.split_at(c.extra_len);
        out.extend_from_slice(e);
        extra = tail;

        old_pos = i64::try_from(c.copy_len)
            .ok()
            .and_then(|len| old_pos.checked_add(len))
            .and_then(|pos| pos.checked_add(c.seek))
            .ok_or(Corruption::SeekOverflow { record })?;
    }

    if out.len() as u64 != new_size {
        return Err(Corruption::SizeMismatch {
            expected: new_size,
            actual: out.len() as u64,
        }
        .into());
    }
    for (stream, left) in [(Stream::Diff, diff), (Stream::Extra, extra)] {
        if !left.is_empty() {
            return Err(Corruption::Unconsumed {
                stream,
                left: left.len(),
            }
            .into());
        }
    }

    debug!(records = patch.controls.len(), new_size, "applied patch");
    Ok(out)
}
