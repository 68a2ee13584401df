//! Receive side of multiplexed PDUs.
//!
//! The received PDU is copied into a scratch buffer, then dynamic parts are
//! tried in configuration order: the first whose minimum length and selector
//! patterns all match is extracted and forwarded. The static part, if any,
//! is extracted and forwarded independently.
use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::core::{ByteOrder, MuxRxPart};
use crate::error::{RuntimeError, ServiceId};
use crate::infra::codec::bits::copy_segments;
use crate::infra::ram::region_mut;
use crate::ipdum::IpduM;
use crate::protocol::mux::util::selector_matches;
use crate::protocol::traits::{diagnostics::DiagnosticSink, pdu_router::PduRouter};

impl<'a, M: RawMutex, R: PduRouter, D: DiagnosticSink> IpduM<'a, M, R, D> {
    pub(crate) fn mux_rx_indication(&self, pathway_index: u16, data: &[u8]) {
        const SID: ServiceId = ServiceId::RxIndication;
        let Some(pathway) = self.config.mux_rx_pathways.get(pathway_index as usize) else {
            return;
        };
        let capacity = pathway.buffer_length as usize;

        let served = self.with_pathway_rx(pathway_index, |rx| {
            let Some(state) = self
                .with_general_or_report(SID, |g| g.mux_rx.get(pathway_index as usize).copied())
                .flatten()
            else {
                return;
            };
            let Some(area) = region_mut(rx, state.scratch_start, 2 * capacity) else {
                return;
            };
            let (scratch, out) = area.split_at_mut(capacity);

            let len = data.len().min(capacity);
            if data.len() > capacity {
                self.report_runtime(SID, RuntimeError::RxPduTruncated);
            }
            scratch[..len].copy_from_slice(&data[..len]);
            scratch[len..].fill(0);
            let received = &scratch[..len];

            let selected = pathway.dynamic_parts.iter().find(|part| {
                len >= part.min_dlc as usize && selector_matches(received, part.selector)
            });
            if let Some(part) = selected {
                self.forward_mux_part(part, scratch, out, len, pathway.byte_order);
            }
            if let Some(part) = &pathway.static_part {
                if len >= part.min_dlc as usize {
                    self.forward_mux_part(part, scratch, out, len, pathway.byte_order);
                }
            }
        });
        if served.is_none() {
            #[cfg(feature = "defmt")]
            defmt::warn!("IpduM: mux Rx pathway {} busy, PDU dropped", pathway_index);
            self.report_runtime(SID, RuntimeError::Busy);
        }
    }

    /// Extract the segments of `part` into a cleared `out` and forward the
    /// first `len` bytes.
    fn forward_mux_part(
        &self,
        part: &MuxRxPart<'_>,
        scratch: &[u8],
        out: &mut [u8],
        len: usize,
        order: ByteOrder,
    ) {
        out.fill(0);
        if copy_segments(scratch, out, part.segments, order).is_err() {
            self.report_runtime(ServiceId::RxIndication, RuntimeError::Segment);
            return;
        }
        self.router.rx_indication(part.upper_pdu, &out[..len]);
    }
}
