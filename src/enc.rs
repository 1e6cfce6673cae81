use crate::{
    Control, MAGIC, Patch,
    compress::{Compressor, compress_streams},
    error::{Error, Result},
    int64,
};
use std::io::Write;
use tracing::debug;

/// Bytes per encoded control record.
pub const CONTROL_LEN: usize = 3 * int64::SIZE;

pub fn encode_controls(controls: &[Control]) -> Vec<u8> {
    let mut out = Vec::with_capacity(controls.len() * CONTROL_LEN);
    for c in controls {
        // lengths are bounded by the input sizes, which fit i64
        out.extend_from_slice(&int64::encode(c.copy_len as i64));
        out.extend_from_slice(&int64::encode(c.extra_len as i64));
        out.extend_from_slice(&int64::encode(c.seek));
    }
    out
}

fn length_field(len: usize) -> Result<[u8; int64::SIZE]> {
    let len = i64::try_from(len)
        .map_err(|_| Error::InvalidInput(format!("{} byte stream does not fit the patch format", len)))?;
    Ok(int64::encode(len))
}

pub struct Writer<'c, W>
where
    W: Write,
{
    w: W,
    compressor: &'c dyn Compressor,
}

impl<'c, W> Writer<'c, W>
where
    W: Write,
{
    pub fn new(w: W, compressor: &'c dyn Compressor) -> Self {
        Self { w, compressor }
    }

    /// Write the header followed by the three compressed streams.
    pub fn write(&mut self, patch: &Patch) -> Result<()> {
        let ctrl = encode_controls(&patch.controls);
        let [ctrl, diff, extra] = compress_streams(self.compressor, [&ctrl[..], &patch.diff[..], &patch.extra[..]])
            .map_err(Error::CompressorFailure)?;

        let new_size = i64::try_from(patch.new_size)
            .map_err(|_| Error::InvalidInput("new size does not fit the patch format".into()))?;

        let w = &mut self.w;
        w.write_all(MAGIC)?;
        w.write_all(&length_field(ctrl.len())?)?;
        w.write_all(&length_field(diff.len())?)?;
        w.write_all(&length_field(extra.len())?)?;
        w.write_all(&int64::encode(new_size))?;
        w.write_all(&ctrl)?;
        w.write_all(&diff)?;
        w.write_all(&extra)?;

        debug!(
            ctrl = ctrl.len(),
            diff = diff.len(),
            extra = extra.len(),
            new_size = patch.new_size,
            "wrote patch"
        );
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        Ok(self.w.flush()?)
    }

    pub fn into_inner(self) -> W {
        self.w
    }
}
