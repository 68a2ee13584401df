//! Receive side of container PDUs.
//!
//! A received container is unpacked either inside `rx_indication`
//! (immediate processing) or queued and unpacked by `main_function_rx`
//! (deferred processing). Dynamic layouts are scanned header by header until
//! the end-of-container id, the end of the data or a malformed header; static
//! layouts forward every contained PDU whose update bit is set.
use core::ops::Range;

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::core::{ByteOrder, ContainedRxPdu, ContainerRxPdu, HeaderSize, RxProcessing};
use crate::error::{RuntimeError, ServiceId};
use crate::infra::codec::bits::read_bit;
use crate::infra::codec::header::decode;
use crate::infra::ram::{container_slot_len, region_mut};
use crate::infra::ring::SlotQueue;
use crate::ipdum::IpduM;
use crate::protocol::traits::{diagnostics::DiagnosticSink, pdu_router::PduRouter};

/// Outcome of reading one header of a dynamic-layout container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanStep {
    /// Contained PDU `id` with its payload at `payload`.
    Pdu { id: u32, payload: Range<usize> },
    /// End-of-container id, or not enough bytes left for a header.
    End,
    /// The DLC points past the end of the container.
    Malformed,
}

/// Read the header at byte `at` of `payload`.
pub fn scan_step(payload: &[u8], at: usize, size: HeaderSize, order: ByteOrder) -> ScanStep {
    let header_len = size.bytes();
    let Some(rest) = payload.get(at..) else {
        return ScanStep::End;
    };
    let Some(header) = decode(size, order, rest) else {
        return ScanStep::End;
    };
    if header.is_end_of_container() {
        return ScanStep::End;
    }
    let start = at + header_len;
    match start.checked_add(header.dlc as usize) {
        Some(end) if end <= payload.len() => ScanStep::Pdu {
            id: header.id,
            payload: start..end,
        },
        _ => ScanStep::Malformed,
    }
}

impl<'a, M: RawMutex, R: PduRouter, D: DiagnosticSink> IpduM<'a, M, R, D> {
    pub(crate) fn container_rx_indication(&self, container_index: u16, data: &[u8]) {
        const SID: ServiceId = ServiceId::RxIndication;
        let Some(container) = self.config.container_rx.get(container_index as usize) else {
            return;
        };
        let slot_len = container_slot_len(container.length, container.meta_data_size);
        if data.len() > slot_len {
            self.report_runtime(SID, RuntimeError::RxPduTruncated);
        }

        let served = match container.processing {
            RxProcessing::Deferred { .. } => self
                .with_container_rx(container_index, |rx| {
                    self.with_general_or_report(SID, |g| {
                        let Some(state) = g.container_rx.get_mut(container_index as usize) else {
                            return;
                        };
                        let Some(slots) = rx.get_mut(state.slots_start as usize..) else {
                            return;
                        };
                        let mut queue =
                            SlotQueue::new(&mut state.queue, g.rx_lengths, slots, 0, slot_len);
                        if queue.is_full() {
                            let _ = queue.remove();
                            #[cfg(feature = "defmt")]
                            defmt::warn!(
                                "IpduM: Rx container {} queue full, oldest dropped",
                                container_index
                            );
                            self.report_runtime(SID, RuntimeError::QueueOverflow);
                        }
                        let _ = queue.put(data);
                    })
                })
                .map(|_| ()),
            RxProcessing::Immediate => self.with_container_rx(container_index, |rx| {
                let Some(state) = self
                    .with_general_or_report(SID, |g| g.container_rx.get(container_index as usize).copied())
                    .flatten()
                else {
                    return;
                };
                let Some(area) = region_mut(rx, state.scratch_start, 2 * slot_len) else {
                    return;
                };
                let (scratch, meta_scratch) = area.split_at_mut(slot_len);
                let len = data.len().min(slot_len);
                scratch[..len].copy_from_slice(&data[..len]);
                self.unpack_container(container_index, container, &scratch[..len], meta_scratch, SID);
            }),
        };
        if served.is_none() {
            #[cfg(feature = "defmt")]
            defmt::warn!("IpduM: Rx container {} busy, PDU dropped", container_index);
            self.report_runtime(SID, RuntimeError::Busy);
        }
    }

    /// Unpack the queued containers of `partition`, oldest first.
    pub(crate) fn process_rx_queues(&self, partition: u8) {
        const SID: ServiceId = ServiceId::MainFunctionRx;
        for (index, container) in self.config.container_rx.iter().enumerate() {
            let RxProcessing::Deferred { queue_depth } = container.processing else {
                continue;
            };
            if container.partition != partition {
                continue;
            }
            let index = index as u16;
            let slot_len = container_slot_len(container.length, container.meta_data_size);

            for _ in 0..queue_depth {
                // a busy region is retried on the next main function
                let unpacked = self.with_container_rx(index, |rx| {
                    let fetched = self
                        .with_general(|g| {
                            let state = g.container_rx.get_mut(index as usize)?;
                            let split = state.slots_start as usize;
                            if split > rx.len() {
                                return None;
                            }
                            let (head, slots) = rx.split_at_mut(split);
                            let scratch = region_mut(head, state.scratch_start, slot_len)?;
                            let len = SlotQueue::new(&mut state.queue, g.rx_lengths, slots, 0, slot_len)
                                .get(scratch)
                                .ok()?;
                            Some((*state, len))
                        })
                        .flatten();
                    let Some((state, len)) = fetched else {
                        return false;
                    };
                    let Some(area) = region_mut(rx, state.scratch_start, 2 * slot_len) else {
                        return false;
                    };
                    let (scratch, meta_scratch) = area.split_at_mut(slot_len);
                    self.unpack_container(index, container, &scratch[..len], meta_scratch, SID);
                    true
                });
                if unpacked != Some(true) {
                    break;
                }
            }
        }
    }

    /// Forward every contained PDU of a received container.
    ///
    /// `buf` holds the payload followed by the container's meta data.
    #[cfg_attr(not(feature = "defmt"), allow(unused_variables))]
    fn unpack_container(
        &self,
        container_index: u16,
        container: &ContainerRxPdu,
        buf: &[u8],
        meta_scratch: &mut [u8],
        service: ServiceId,
    ) {
        let meta_len = container.meta_data_size as usize;
        let Some((payload, meta)) = buf.len().checked_sub(meta_len).map(|at| buf.split_at(at))
        else {
            return;
        };

        if !container.header.is_dynamic() {
            for desc in self.contained_rx_of(container) {
                if let Some(bit) = desc.update_bit {
                    if !read_bit(payload, bit) {
                        continue;
                    }
                }
                let start = desc.offset as usize;
                if let Some(data) = payload.get(start..start + desc.length as usize) {
                    self.forward_contained(desc.upper_pdu, data, meta, meta_scratch);
                }
            }
            return;
        }

        let order = self.config.header_byte_order;
        // every step consumes at least one header
        let bound = payload.len() / container.header.bytes() + 1;
        let mut at = 0;
        for _ in 0..bound {
            match scan_step(payload, at, container.header, order) {
                ScanStep::End => break,
                ScanStep::Malformed => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("IpduM: malformed header at {} in Rx container {}", at, container_index);
                    self.report_runtime(service, RuntimeError::Header);
                    break;
                }
                ScanStep::Pdu { id, payload: range } => {
                    at = range.end;
                    match self.find_contained_rx(container, id) {
                        Some(desc) => {
                            self.forward_contained(desc.upper_pdu, &payload[range], meta, meta_scratch)
                        }
                        None => {
                            #[cfg(feature = "defmt")]
                            defmt::trace!("IpduM: unknown id {} in Rx container {}", id, container_index);
                        }
                    }
                }
            }
        }
    }

    fn contained_rx_of(&self, container: &ContainerRxPdu) -> &'a [ContainedRxPdu] {
        self.config
            .contained_rx
            .get(container.contained.start as usize..container.contained.end as usize)
            .unwrap_or(&[])
    }

    /// Contained PDU with header `id`: the container's own PDUs first, then
    /// any configured PDU if the container accepts all.
    fn find_contained_rx(&self, container: &ContainerRxPdu, id: u32) -> Option<&'a ContainedRxPdu> {
        self.contained_rx_of(container)
            .iter()
            .find(|desc| desc.header_id == id)
            .or_else(|| {
                if !container.accept_all {
                    return None;
                }
                self.config
                    .contained_rx
                    .iter()
                    .find(|desc| desc.header_id == id)
            })
    }

    /// Forward `data`, with the container's meta data appended if any.
    fn forward_contained(&self, upper: u16, data: &[u8], meta: &[u8], scratch: &mut [u8]) {
        if meta.is_empty() {
            self.router.rx_indication(upper, data);
            return;
        }
        let len = data.len() + meta.len();
        let Some(out) = scratch.get_mut(..len) else {
            return;
        };
        out[..data.len()].copy_from_slice(data);
        out[data.len()..].copy_from_slice(meta);
        self.router.rx_indication(upper, out);
    }
}
