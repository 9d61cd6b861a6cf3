use std::io::Cursor;

use proptest::prelude::*;

use ixcan_core::format::directory_size;
use ixcan_core::{compact, restore, CompactOptions, Directory, FormatOptions};
use ixcan_sinks::MemorySink;

/// One 512-byte block: mostly absent, otherwise a single non-zero record
/// at a random slot.
fn raw_block() -> impl Strategy<Value = Vec<u8>> {
    prop::option::weighted(0.3, (1u8..=255, 0usize..32)).prop_map(|b| {
        let mut block = vec![0u8; 512];
        if let Some((fill, slot)) = b {
            block[slot * 16..(slot + 1) * 16].fill(fill);
        }
        block
    })
}

/// Raw index of up to 400 blocks, so up to five segments, plus a trailing
/// run of 0 to 31 records that may or may not hold data.
fn raw_index() -> impl Strategy<Value = Vec<u8>> {
    (
        prop::collection::vec(raw_block(), 0..400),
        prop::collection::vec(prop::option::weighted(0.3, 1u8..=255), 0..32),
    )
        .prop_map(|(blocks, tail)| {
            let mut raw = blocks.concat();
            raw.extend(tail.into_iter().flat_map(|r| [r.unwrap_or(0); 16]));
            raw
        })
}

fn can(raw: &[u8], opts: CompactOptions) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    compact(raw, raw.len() as u64, &mut out, opts).unwrap();
    out.into_inner()
}

fn non_zero_blocks(raw: &[u8]) -> u64 {
    raw.chunks(512).filter(|b| b.iter().any(|&x| x != 0)).count() as u64
}

proptest! {
    #[test]
    fn restore_inverts_compact(raw in raw_index(), sentinel in any::<bool>()) {
        let format = FormatOptions { empty_segment_sentinel: sentinel };
        let canned = can(&raw, CompactOptions { format, ..CompactOptions::default() });
        let mut sink = MemorySink::new();
        restore(&canned[..], &mut sink, format).unwrap();
        prop_assert_eq!(sink.into_inner(), raw);
    }

    #[test]
    fn directory_size_depends_only_on_length(raw in raw_index()) {
        let canned = can(&raw, CompactOptions::default());
        let n = (raw.len() as u64).div_ceil(512);
        let expected = 16 + 16 * n.div_ceil(96);
        prop_assert_eq!(directory_size(raw.len() as u64), expected);
        prop_assert_eq!(Directory::size(raw.len() as u64), expected);
        let units = u32::from_be_bytes(canned[4..8].try_into().unwrap()) as u64;
        prop_assert_eq!(units * 16, expected);
    }

    #[test]
    fn set_bits_count_stored_blocks(raw in raw_index()) {
        let canned = can(&raw, CompactOptions::default());
        let dir_end = directory_size(raw.len() as u64) as usize;
        let dir = Directory::decode(&canned[16..dir_end]).unwrap();
        let stored = non_zero_blocks(&raw);
        prop_assert_eq!(dir.present_blocks(), stored);

        let body = (canned.len() - dir_end) as u64;
        let tail = raw.len() as u64 % 512;
        let tail_stored = raw[raw.len() - tail as usize..].iter().any(|&x| x != 0);
        let expected_body = if tail_stored { (stored - 1) * 512 + tail } else { stored * 512 };
        prop_assert_eq!(body, expected_body);

        // counts telescope
        let mut seen = 0u64;
        for line in dir.segments() {
            prop_assert_eq!(line.running_count as u64, seen);
            seen += line.count_ones() as u64;
        }
    }

    #[test]
    fn generic_inputs_of_any_length_roundtrip(raw in raw_index(), extra in prop::collection::vec(any::<u8>(), 1..16)) {
        let mut raw = raw;
        raw.extend_from_slice(&extra);
        let canned = can(&raw, CompactOptions::generic());
        let mut sink = MemorySink::new();
        restore(&canned[..], &mut sink, FormatOptions::default()).unwrap();
        prop_assert_eq!(sink.into_inner(), raw);
    }
}
