//! Multiplexed PDUs: one physical PDU carrying a static part and one of
//! several dynamic parts, told apart by a selector field.
//!
//! * [`rx`] selects the dynamic part matching the selector and extracts it;
//! * [`tx`] composes the shared buffer from part transmissions;
//! * [`jit`] refreshes co-resident parts right before the buffer leaves.
pub mod jit;
pub mod rx;
pub mod tx;
pub mod util;
