//! Container PDUs: several contained PDUs packed into one lower-layer PDU,
//! either back to back behind headers (dynamic layout) or at fixed offsets
//! flagged by update bits (static layout).
pub mod rx;
pub mod tx;
