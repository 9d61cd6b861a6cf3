use crate::format::BLOCK_SIZE;

/// True when every byte of `block` is zero.
///
/// The block is OR-reduced as 8-byte words. Raw index blocks are made of
/// 16-byte records, so the byte-wise remainder is normally empty.
#[inline]
pub fn is_zero(block: &[u8]) -> bool {
    let words = block.chunks_exact(8);
    let rest = words.remainder().iter().fold(0u8, |acc, &b| acc | b);
    words.fold(0u64, |acc, w| {
        let mut word = [0u8; 8];
        word.copy_from_slice(w);
        acc | u64::from_ne_bytes(word)
    }) == 0
        && rest == 0
}

/// Classify a block of any length up to `BLOCK_SIZE` by testing it as if it
/// were zero-padded to a full block. `scratch` is left holding that padded copy.
#[inline]
pub fn is_zero_padded(block: &[u8], scratch: &mut [u8; BLOCK_SIZE as usize]) -> bool {
    if block.len() == scratch.len() {
        return is_zero(block);
    }
    scratch.fill(0);
    scratch[..block.len()].copy_from_slice(block);
    is_zero(scratch)
}
