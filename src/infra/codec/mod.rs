//! Byte and bit level codecs shared by the multiplexer and container paths.
pub mod bits;
pub mod header;
