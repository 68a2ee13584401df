//! Trigger conditions of a Tx container.
use crate::core::{ContainedTxPdu, ContainerTxPdu};

/// Whether adding `contained` must send the container right away.
///
/// `current_length` is the accumulated length after the addition, `first`
/// tells whether the container was empty before.
pub fn is_triggered(
    container: &ContainerTxPdu<'_>,
    contained: &ContainedTxPdu,
    current_length: usize,
    first: bool,
) -> bool {
    let threshold_exceeded = container
        .size_threshold
        .is_some_and(|threshold| current_length > threshold as usize);
    threshold_exceeded || contained.trigger || (container.first_contained_trigger && first)
}
