//! Header preceding every contained PDU of a dynamic-layout container.
//!
//! * short header: 3-byte id followed by a 1-byte DLC;
//! * long header: 4-byte id followed by a 4-byte DLC.
//!
//! Both fields use the configured byte order. An id of 0 marks the end of the
//! container.
use crate::core::{ByteOrder, HeaderSize};

/// Header id reserved as end-of-container marker.
pub const END_OF_CONTAINER_ID: u32 = 0;

/// Largest id of a short header.
pub const SHORT_HEADER_MAX_ID: u32 = 0x00FF_FFFF;

/// Largest DLC of a short header.
pub const SHORT_HEADER_MAX_DLC: u32 = 0xFF;

/// Decoded contained PDU header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ContainedHeader {
    pub id: u32,
    pub dlc: u32,
}

impl ContainedHeader {
    /// Whether this header terminates the scan of a container.
    #[inline]
    pub fn is_end_of_container(&self) -> bool {
        self.id == END_OF_CONTAINER_ID
    }
}

/// Write `header` at the start of `out`.
///
/// Returns the number of bytes written, or `None` if `out` is shorter than the
/// header (or the layout has no header).
pub fn encode(
    size: HeaderSize,
    order: ByteOrder,
    header: ContainedHeader,
    out: &mut [u8],
) -> Option<usize> {
    let len = size.bytes();
    if len == 0 || out.len() < len {
        return None;
    }

    match (size, order) {
        (HeaderSize::Short, ByteOrder::BigEndian) => {
            out[..3].copy_from_slice(&header.id.to_be_bytes()[1..]);
            out[3] = header.dlc as u8;
        }
        (HeaderSize::Short, ByteOrder::LittleEndian) => {
            out[..3].copy_from_slice(&header.id.to_le_bytes()[..3]);
            out[3] = header.dlc as u8;
        }
        (HeaderSize::Long, ByteOrder::BigEndian) => {
            out[..4].copy_from_slice(&header.id.to_be_bytes());
            out[4..8].copy_from_slice(&header.dlc.to_be_bytes());
        }
        (HeaderSize::Long, ByteOrder::LittleEndian) => {
            out[..4].copy_from_slice(&header.id.to_le_bytes());
            out[4..8].copy_from_slice(&header.dlc.to_le_bytes());
        }
        (HeaderSize::None, _) => return None,
    }
    Some(len)
}

/// Read a header from the start of `bytes`.
///
/// Returns `None` if `bytes` is shorter than the header.
pub fn decode(size: HeaderSize, order: ByteOrder, bytes: &[u8]) -> Option<ContainedHeader> {
    let len = size.bytes();
    if len == 0 || bytes.len() < len {
        return None;
    }

    let header = match (size, order) {
        (HeaderSize::Short, ByteOrder::BigEndian) => ContainedHeader {
            id: u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]),
            dlc: bytes[3] as u32,
        },
        (HeaderSize::Short, ByteOrder::LittleEndian) => ContainedHeader {
            id: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]),
            dlc: bytes[3] as u32,
        },
        (HeaderSize::Long, ByteOrder::BigEndian) => ContainedHeader {
            id: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            dlc: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        },
        (HeaderSize::Long, ByteOrder::LittleEndian) => ContainedHeader {
            id: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            dlc: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        },
        (HeaderSize::None, _) => return None,
    };
    Some(header)
}
