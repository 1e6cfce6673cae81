#![no_main]
use libfuzzer_sys::fuzz_target;
use qsdiff::compress::{Uncompressed, Zstd};

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    // first byte picks how much of the rest is the old buffer
    let split = data[0] as usize % data.len();
    let (older, patch) = data[1..].split_at(split.min(data.len() - 1));

    // corrupt input must come back as an error, never a panic
    let _ = qsdiff::simple_patch_with(older, patch, &Uncompressed);
    let _ = qsdiff::simple_patch_with(older, patch, &Zstd::default());
});
