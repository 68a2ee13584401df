//! Low-level components dedicated to bit manipulation of multiplexed buffers.
//! Segments are copied between buffers that share the same layout, so a
//! segment occupies the same bits in the source and in the destination.
//!
//! Two layouts are supported:
//! * little endian (Intel): `start_bit` is the least significant bit, the
//!   segment grows toward higher bit numbers (`byte = bit / 8`, `bit % 8`).
//! * big endian (Motorola): `start_bit` is the most significant bit, the
//!   segment runs down to bit 0 and continues at bit 7 of the next byte.
use core::ops::Range;

use crate::core::{ByteOrder, Segment};
use crate::error::BitSegmentError;

/// Linear position of the first bit of the segment.
///
/// For big endian segments bits are numbered MSB-first inside each byte so
/// that the segment becomes a contiguous range.
fn linear_start(segment: Segment, order: ByteOrder) -> usize {
    let start = segment.start_bit as usize;
    match order {
        ByteOrder::LittleEndian => start,
        ByteOrder::BigEndian => (start / 8) * 8 + (7 - start % 8),
    }
}

/// Bytes touched by the segment.
pub fn byte_span(segment: Segment, order: ByteOrder) -> Range<usize> {
    let first = segment.start_bit as usize / 8;
    if segment.length_bits == 0 {
        return first..first;
    }
    let end = linear_start(segment, order) + segment.length_bits as usize;
    first..end.div_ceil(8)
}

/// Bits of `byte` covered by the segment.
pub fn mask_at(segment: Segment, order: ByteOrder, byte: usize) -> u8 {
    let seg_lo = linear_start(segment, order);
    let seg_hi = seg_lo + segment.length_bits as usize;
    let byte_lo = byte * 8;
    let lo = seg_lo.max(byte_lo);
    let hi = seg_hi.min(byte_lo + 8);
    if lo >= hi {
        return 0;
    }

    let width = hi - lo;
    let bits = ((1u16 << width) - 1) as u8;
    match order {
        // Linear order equals bit order inside the byte.
        ByteOrder::LittleEndian => bits << (lo - byte_lo),
        // Linear order runs from bit 7 downward.
        ByteOrder::BigEndian => bits << (8 - (hi - byte_lo)),
    }
}

/// Union of the bits of `byte` covered by any of `segments`.
pub fn mask_union_at(segments: &[Segment], order: ByteOrder, byte: usize) -> u8 {
    segments
        .iter()
        .fold(0u8, |acc, seg| acc | mask_at(*seg, order, byte))
}

/// Copy the bits of `segment` from `src` into `dst`.
///
/// Bits outside the segment are left untouched in `dst`. Nothing is copied
/// when the segment ends past either buffer.
pub fn copy_segment(
    src: &[u8],
    dst: &mut [u8],
    segment: Segment,
    order: ByteOrder,
) -> Result<(), BitSegmentError> {
    let span = byte_span(segment, order);
    let available = src.len().min(dst.len());
    if span.end > available {
        return Err(BitSegmentError::OutOfBounds {
            needed: span.end,
            available,
        });
    }

    for byte in span {
        let mask = mask_at(segment, order, byte);
        dst[byte] = (dst[byte] & !mask) | (src[byte] & mask);
    }
    Ok(())
}

/// Copy every segment, stopping at the first one that does not fit.
pub fn copy_segments(
    src: &[u8],
    dst: &mut [u8],
    segments: &[Segment],
    order: ByteOrder,
) -> Result<(), BitSegmentError> {
    for segment in segments {
        copy_segment(src, dst, *segment, order)?;
    }
    Ok(())
}

/// State of the bit at absolute position `bit` (`byte = bit / 8`, bit
/// `bit % 8` of that byte). Bits past the buffer read as clear.
pub fn read_bit(bytes: &[u8], bit: u16) -> bool {
    bytes
        .get(bit as usize / 8)
        .is_some_and(|byte| byte & (1 << (bit % 8)) != 0)
}

/// Set or clear the bit at absolute position `bit`; ignored past the buffer.
pub fn write_bit(bytes: &mut [u8], bit: u16, value: bool) {
    if let Some(byte) = bytes.get_mut(bit as usize / 8) {
        let mask = 1u8 << (bit % 8);
        if value {
            *byte |= mask;
        } else {
            *byte &= !mask;
        }
    }
}
