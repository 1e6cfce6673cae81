//! Derive plausible "newer" buffers from an "older" one, for tests and fuzzing.

use std::cmp::min;

/// Generate a "newer" input from an "older" input and a set of instructions
///
/// Instructions are read two bytes at a time, `(op, arg)`:
///
/// - `op < 64`: append a copy of up to `arg` bytes found at `op`
/// - `op < 128`: append `op - 64` copies of `arg`
/// - `op < 192`: flip bits of the byte at `arg`
/// - otherwise: delete up to `op - 192` bytes starting at `arg`
///
/// Positions wrap around the current length. A trailing odd byte is ignored.
pub fn apply_instructions(older: &[u8], instructions: &[u8]) -> Vec<u8> {
    let mut newer = older.to_vec();

    for couple in instructions.chunks_exact(2) {
        let (op, arg) = (couple[0], couple[1]);

        match op {
            0..=63 => {
                if newer.is_empty() {
                    continue;
                }
                let pos = op as usize % newer.len();
                let end = min(pos + arg as usize, newer.len());
                newer.extend_from_within(pos..end);
            }
            64..=127 => {
                newer.resize(newer.len() + (op - 64) as usize, arg);
            }
            128..=191 => {
                if newer.is_empty() {
                    continue;
                }
                let pos = arg as usize % newer.len();
                newer[pos] ^= op;
            }
            _ => {
                if newer.is_empty() {
                    continue;
                }
                let pos = arg as usize % newer.len();
                let end = min(pos + (op - 192) as usize, newer.len());
                newer.drain(pos..end);
            }
        }
    }
    newer
}

#[cfg(test)]
mod tests {
    use super::apply_instructions;

    #[test]
    fn no_instructions() {
        assert_eq!(apply_instructions(b"abc", &[]), b"abc");
        assert_eq!(apply_instructions(b"abc", &[7]), b"abc");
    }

    #[test]
    fn each_op() {
        assert_eq!(apply_instructions(b"abcd", &[1, 2]), b"abcdbc");
        assert_eq!(apply_instructions(b"ab", &[67, b'z']), b"abzzz");
        assert_eq!(apply_instructions(b"ab", &[128, 1]), [b'a', b'b' ^ 128]);
        assert_eq!(apply_instructions(b"abcdef", &[194, 1]), b"adef");
    }

    #[test]
    fn empty_older() {
        assert!(apply_instructions(b"", &[0, 9, 130, 3, 200, 1]).is_empty());
        assert_eq!(apply_instructions(b"", &[66, b'x', 0, 1]), b"xxx");
    }
}
