#![cfg(all(feature = "diff", feature = "zstd"))]

use proptest::prelude::*;
use qsdiff::{
    DiffParams, Patch,
    compress::{Uncompressed, Zstd},
    simple_diff, simple_diff_with_params, simple_patch, simple_patch_with,
};

fn pseudo_random(len: usize, mut seed: u32) -> Vec<u8> {
    (0..len)
        .map(|_| {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            (seed >> 24) as u8
        })
        .collect()
}

/// Something shaped like a small executable: a header, a few sections of
/// structured data, and an embedded string table.
fn fake_binary(version: u8) -> Vec<u8> {
    let mut out = b"\x7fELF\x02\x01\x01".to_vec();
    out.push(version);
    for section in 0..8u32 {
        out.extend((0..512u32).map(|i| ((i * (section + 3)) % 251) as u8));
        out.extend_from_slice(&(section * 0x1000 + version as u32).to_le_bytes());
    }
    out.extend_from_slice(b"main\0init\0fini\0qsdiff_version_");
    out.push(b'0' + version);
    out
}

#[test]
fn simple_cycle() {
    let older = fake_binary(1);
    let newer = fake_binary(2);
    let patch = simple_diff(&older, &newer).unwrap();
    assert!(patch.len() < newer.len());
    assert_eq!(simple_patch(&older, &patch).unwrap(), newer);
}

#[test]
fn edge_shapes() {
    let cases = [
        ("", ""),
        ("", "x"),
        ("x", ""),
        ("x", "x"),
        ("x", "y"),
        ("aaaaaaaaaaaaaaaaaaaaaaaaa", "aaaaaaaaaaaabaaaaaaaaaaaa"),
        ("abcdefgh", "abcXefgh"),
        ("hello", ""),
        ("", "hello"),
    ];
    for (older, newer) in cases {
        let (older, newer) = (older.as_bytes(), newer.as_bytes());
        let patch = simple_diff(older, newer).unwrap();
        assert_eq!(simple_patch(older, &patch).unwrap(), newer);
    }
}

#[test]
fn uncompressed_and_zstd_agree() {
    let older = pseudo_random(20_000, 7);
    let mut newer = older.clone();
    newer.splice(5_000..5_000, b"an insertion in the middle".iter().copied());
    newer.truncate(18_000);
    newer.extend(pseudo_random(1_000, 11));

    let params = DiffParams::default();
    let plain = simple_diff_with_params(&older, &newer, &params, &Uncompressed).unwrap();
    let packed = simple_diff_with_params(&older, &newer, &params, &Zstd::default()).unwrap();

    let a = Patch::from_bytes(&plain, &Uncompressed).unwrap();
    let b = Patch::from_bytes(&packed, &Zstd::default()).unwrap();
    assert_eq!(a, b);
    assert_eq!(simple_patch_with(&older, &plain, &Uncompressed).unwrap(), newer);
    assert_eq!(simple_patch(&older, &packed).unwrap(), newer);
}

#[test]
fn zstd_levels() {
    let older = fake_binary(3);
    let newer = fake_binary(4);
    for level in [1, 3, 19] {
        let c = Zstd::new(level).unwrap();
        let patch = simple_diff_with_params(&older, &newer, &DiffParams::default(), &c).unwrap();
        assert_eq!(simple_patch_with(&older, &patch, &c).unwrap(), newer);
    }
}

#[test]
fn repeated_runs() {
    let older = vec![0u8; 10_000];
    let mut newer = vec![0u8; 12_000];
    newer[6_000..6_100].fill(1);
    qsdiff::assert_cycle(&older, &newer);
    qsdiff::assert_cycle(&newer, &older);
}

#[test]
fn wrong_backend_is_corruption() {
    let older = fake_binary(5);
    let newer = fake_binary(6);
    let packed = simple_diff(&older, &newer).unwrap();
    assert!(matches!(
        simple_patch_with(&older, &packed, &Uncompressed),
        Err(qsdiff::Error::CorruptPatch(_))
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn cycle_with_zstd(
        older in proptest::collection::vec(0u8..16, 0..2048),
        cut in 0usize..2048,
        insert in proptest::collection::vec(any::<u8>(), 0..64),
    ) {
        let mut newer = older.clone();
        let cut = cut.min(newer.len());
        newer.splice(cut..cut, insert);

        let patch = simple_diff(&older, &newer).unwrap();
        prop_assert_eq!(simple_patch(&older, &patch).unwrap(), newer);
    }
}
