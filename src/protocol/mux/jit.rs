//! Just-in-time update: a part flagged for it is refreshed through the upper
//! layer's trigger transmit right before the shared buffer is sent.
use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::core::ByteOrder;
use crate::error::{RuntimeError, ServiceId};
use crate::infra::codec::bits::copy_segments;
use crate::ipdum::IpduM;
use crate::protocol::traits::{diagnostics::DiagnosticSink, pdu_router::PduRouter};

impl<'a, M: RawMutex, R: PduRouter, D: DiagnosticSink> IpduM<'a, M, R, D> {
    /// Refresh the segments of `part` in `buffer` with the latest upper data.
    ///
    /// `scratch` receives the upper PDU; without data the buffer keeps its
    /// previous content.
    pub(crate) fn jit_update(
        &self,
        service: ServiceId,
        part: u16,
        buffer: &mut [u8],
        scratch: &mut [u8],
        order: ByteOrder,
    ) {
        let Some(desc) = self.config.mux_tx_parts.get(part as usize) else {
            return;
        };
        if !desc.jit_update {
            return;
        }
        let len = (desc.length as usize).min(scratch.len());
        let scratch = &mut scratch[..len];
        if self.router.trigger_transmit(desc.upper_pdu, scratch).is_none() {
            #[cfg(feature = "defmt")]
            defmt::debug!("IpduM: no JIT data for part {}", part);
            return;
        }
        if copy_segments(scratch, buffer, desc.segments, order).is_err() {
            self.report_runtime(service, RuntimeError::Segment);
        }
    }
}
