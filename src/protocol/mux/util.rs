//! Buffer helpers shared by the multiplex Rx and Tx paths.
use crate::core::{ByteOrder, SelectorPattern, Segment};
use crate::infra::codec::bits::mask_union_at;

/// Whether every selector pattern matches `buffer`.
///
/// A pattern outside of `buffer` never matches. Value bits outside of the
/// mask never match either.
pub fn selector_matches(buffer: &[u8], selector: &[SelectorPattern]) -> bool {
    selector.iter().all(|pattern| {
        buffer
            .get(pattern.byte_position as usize)
            .is_some_and(|byte| byte & pattern.mask == pattern.value)
    })
}

/// Write the selector of a dynamic part into `buffer` (masked read-modify-write).
pub fn stamp_selector(buffer: &mut [u8], selector: &[SelectorPattern]) {
    for pattern in selector {
        if let Some(byte) = buffer.get_mut(pattern.byte_position as usize) {
            *byte = (*byte & !pattern.mask) | (pattern.value & pattern.mask);
        }
    }
}

/// Overwrite every bit not covered by `used` with `padding`.
///
/// `used` lists the segment sets of the parts that stay in the buffer.
pub fn write_rest_segments(
    buffer: &mut [u8],
    used: &[&[Segment]],
    order: ByteOrder,
    padding: u8,
) {
    for (index, byte) in buffer.iter_mut().enumerate() {
        let covered = used
            .iter()
            .fold(0u8, |acc, segments| acc | mask_union_at(segments, order, index));
        *byte = (*byte & covered) | (padding & !covered);
    }
}
