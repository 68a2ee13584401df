//! Transmit side of multiplexed PDUs.
//!
//! Parts are written into the shared buffer of their pathway as they are
//! transmitted by the upper layer. Writing a dynamic part replaces the
//! previous one: bits used neither by the static part nor by the new dynamic
//! part are reset to the padding value, then its segments and selector are
//! written. Writing a trigger part sends the whole buffer.
use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::core::{MuxTxPathway, PartKind, PduInfo};
use crate::error::{PduError, RuntimeError, ServiceId};
use crate::infra::codec::bits::copy_segments;
use crate::infra::ram::region_mut;
use crate::ipdum::{General, IpduM};
use crate::protocol::mux::util::{stamp_selector, write_rest_segments};
use crate::protocol::traits::{diagnostics::DiagnosticSink, pdu_router::PduRouter};

impl<'a, M: RawMutex, R: PduRouter, D: DiagnosticSink> IpduM<'a, M, R, D> {
    /// Fill the buffer of `pathway_index` with its padding and stamp the
    /// selector of the initial dynamic part.
    pub(crate) fn init_mux_buffer(&self, g: &General<'a>, pathway_index: usize, tx: &mut [u8]) {
        let (Some(pathway), Some(state)) = (
            self.config.mux_tx_pathways.get(pathway_index),
            g.mux_tx.get(pathway_index),
        ) else {
            return;
        };
        let Some(buffer) = region_mut(tx, state.buffer_start, pathway.length as usize) else {
            return;
        };
        buffer.fill(pathway.padding);
        let initial = state
            .active_dynamic
            .and_then(|part| self.config.mux_tx_parts.get(part as usize));
        if let Some(part) = initial {
            stamp_selector(buffer, part.selector);
        }
    }

    /// Write part `part_index` into its pathway and send the pathway if the
    /// part is a trigger.
    pub(crate) fn mux_transmit(&self, part_index: u16, data: &[u8]) -> Result<(), PduError> {
        const SID: ServiceId = ServiceId::Transmit;
        let config = self.config;
        let part = config
            .mux_tx_parts
            .get(part_index as usize)
            .ok_or(PduError::NotOk)?;
        let pathway = config
            .mux_tx_pathways
            .get(part.pathway as usize)
            .ok_or(PduError::NotOk)?;
        let len = pathway.length as usize;
        let order = pathway.byte_order;

        self.with_pathway_tx(part.pathway, |tx| {
            let (before, allowed) = self
                .with_general(|g| {
                    let state = g.mux_tx.get_mut(part.pathway as usize)?;
                    let before = *state;
                    if part.kind == PartKind::Dynamic {
                        state.active_dynamic = Some(part_index);
                    }
                    Some((before, self.is_transmission_allowed(g, pathway.tx_lo)))
                })
                .flatten()
                .ok_or(PduError::NotOk)?;

            let area = region_mut(tx, before.buffer_start, 2 * len).ok_or(PduError::NotOk)?;
            let (buffer, scratch) = area.split_at_mut(len);

            if part.kind == PartKind::Dynamic {
                let static_segments = pathway
                    .static_part
                    .and_then(|p| config.mux_tx_parts.get(p as usize))
                    .map_or(&[][..], |p| p.segments);
                write_rest_segments(
                    buffer,
                    &[static_segments, part.segments],
                    order,
                    pathway.padding,
                );
            }
            if copy_segments(data, buffer, part.segments, order).is_err() {
                self.report_runtime(SID, RuntimeError::Segment);
            }
            if part.kind == PartKind::Dynamic {
                stamp_selector(buffer, part.selector);
            }

            if !part.trigger {
                return Ok(());
            }
            if !allowed {
                #[cfg(feature = "defmt")]
                defmt::debug!("IpduM: pathway {} awaits confirmation", part.pathway);
                return Err(PduError::NotOk);
            }

            let counterpart = match part.kind {
                PartKind::Dynamic => pathway.static_part,
                PartKind::Static => before.active_dynamic,
            };
            if let Some(counterpart) = counterpart {
                self.jit_update(SID, counterpart, buffer, scratch, order);
            }
            self.send_pathway(pathway, buffer)
        })
        .unwrap_or(Err(PduError::NotOk))
    }

    /// Hand the buffer of `pathway` to the lower layer, supervising the
    /// confirmation on acceptance.
    fn send_pathway(&self, pathway: &MuxTxPathway, buffer: &[u8]) -> Result<(), PduError> {
        let Some(info) = self.config.tx_lo.get(pathway.tx_lo as usize) else {
            return Err(PduError::NotOk);
        };
        self.with_general(|g| self.start_confirmation_timeout(g, pathway.tx_lo));
        match self
            .router
            .transmit(info.lower_pdu, PduInfo::with_data(buffer))
        {
            Ok(()) => Ok(()),
            Err(_) => {
                self.with_general(|g| self.stop_confirmation_timeout(g, pathway.tx_lo));
                Err(PduError::NotOk)
            }
        }
    }

    /// Copy the buffer of `pathway_index` into `out` after refreshing both
    /// the static and the active dynamic part.
    pub(crate) fn mux_trigger_transmit(
        &self,
        pathway_index: u16,
        out: &mut [u8],
    ) -> Result<usize, PduError> {
        const SID: ServiceId = ServiceId::TriggerTransmit;
        let pathway = self
            .config
            .mux_tx_pathways
            .get(pathway_index as usize)
            .ok_or(PduError::NotOk)?;
        let len = pathway.length as usize;
        if out.len() < len {
            return Err(PduError::NotOk);
        }

        self.with_pathway_tx(pathway_index, |tx| {
            let state = self
                .with_general(|g| g.mux_tx.get(pathway_index as usize).copied())
                .flatten()
                .ok_or(PduError::NotOk)?;
            let area = region_mut(tx, state.buffer_start, 2 * len).ok_or(PduError::NotOk)?;
            let (buffer, scratch) = area.split_at_mut(len);

            for part in [pathway.static_part, state.active_dynamic]
                .into_iter()
                .flatten()
            {
                self.jit_update(SID, part, buffer, scratch, pathway.byte_order);
            }
            out[..len].copy_from_slice(buffer);
            Ok(len)
        })
        .unwrap_or(Err(PduError::NotOk))
    }
}
