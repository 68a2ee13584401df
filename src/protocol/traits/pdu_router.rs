//! Minimal abstraction of the PDU router, the only neighbour of the
//! multiplexer: downward transmissions go to the lower layer, indications,
//! confirmations and trigger transmit upcalls go to the upper layer.
use crate::core::{PduId, PduInfo, TxResult};

/// The lower layer did not accept a transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransmitRejected;

/// Contract between the multiplexer and the PDU router.
///
/// Every method takes `&self`: calls may arrive from interrupt and task
/// context alike, implementations synchronise internally.
pub trait PduRouter {
    /// Hand a PDU to the lower layer.
    ///
    /// `info.sdu == None` announces `info.length` bytes that will be pulled
    /// later through [`IpduM::trigger_transmit`](crate::IpduM::trigger_transmit).
    /// Such informative transmissions are made without any internal lock
    /// held, so the implementation may pull synchronously.
    fn transmit(&self, lower: PduId, info: PduInfo<'_>) -> Result<(), TransmitRejected>;

    /// Ask the upper layer for the latest data of `upper`.
    ///
    /// Returns the number of bytes written into `buffer`, `None` if no data
    /// is available.
    fn trigger_transmit(&self, upper: PduId, buffer: &mut [u8]) -> Option<usize>;

    /// Deliver a received PDU to the upper layer.
    fn rx_indication(&self, upper: PduId, data: &[u8]);

    /// Report the outcome of a transmission to the upper layer.
    fn tx_confirmation(&self, upper: PduId, result: TxResult);
}
