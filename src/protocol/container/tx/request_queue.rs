//! Last-is-best collection of Tx containers.
//!
//! `transmit` only records a request in the queue of the contained PDU's
//! priority. When the container is built, the pending requests are walked
//! from the highest priority down and the current data of each PDU is pulled
//! from the upper layer, so a value superseded in the meantime never leaves.
//!
//! Meta data of last-is-best containers is not carried by the requests and
//! leaves as zeros.
use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::core::{Collection, ContainerTxPdu, DataProvision, PduInfo};
use crate::error::{PduError, RuntimeError, ServiceId};
use crate::infra::codec::bits::write_bit;
use crate::infra::codec::header::{encode, ContainedHeader};
use crate::infra::ram::{container_slot_len, region_mut, RequestEntry};
use crate::infra::ring::RingQueue;
use crate::ipdum::{General, IpduM};
use crate::protocol::container::tx::trigger::is_triggered;
use crate::protocol::container::tx::{contained_of, reset_container_bytes, sent_length};
use crate::protocol::traits::{diagnostics::DiagnosticSink, pdu_router::PduRouter};

impl<'a> General<'a> {
    /// Request queue `queue` over the shared entry pool.
    pub(crate) fn request_queue(&mut self, queue: usize) -> Option<RingQueue<'_, RequestEntry>> {
        let state = self.request_queues.get_mut(queue)?;
        Some(RingQueue::new(&mut state.ring, self.request_entries))
    }

    /// Request queues of a last-is-best container.
    fn request_queue_range(&self, container: u16, priorities: usize) -> core::ops::Range<usize> {
        let start = self
            .container_tx
            .get(container as usize)
            .map_or(0, |state| state.request_queues_start as usize);
        start..start + priorities
    }

    /// Sum of header and DLC over every pending request of a container.
    fn recompute_pending(&mut self, container: u16, priorities: usize, header: usize) {
        let mut pending = 0u32;
        for queue in self.request_queue_range(container, priorities) {
            if let Some(queue) = self.request_queue(queue) {
                pending += queue
                    .iter()
                    .map(|entry| (header + entry.dlc as usize) as u32)
                    .sum::<u32>();
            }
        }
        if let Some(state) = self.container_tx.get_mut(container as usize) {
            state.pending_length = pending;
        }
    }

    /// Remember the read position of every request queue of a container.
    fn set_restore_points(&mut self, container: u16, priorities: usize) {
        for queue in self.request_queue_range(container, priorities) {
            if let Some(state) = self.request_queues.get_mut(queue) {
                state.restore = Some(state.ring.restore_point());
            }
        }
    }

    /// Forget the restore points; with `rollback`, rewind the queues first.
    fn release_restore_points(&mut self, container: u16, priorities: usize, rollback: bool) {
        for queue in self.request_queue_range(container, priorities) {
            if let Some(state) = self.request_queues.get_mut(queue) {
                if let (true, Some(point)) = (rollback, state.restore) {
                    if !state.ring.rollback(point) {
                        #[cfg(feature = "defmt")]
                        defmt::warn!("IpduM: request queue {} cannot be rolled back", queue);
                    }
                }
                state.restore = None;
            }
        }
    }
}

impl<'a, M: RawMutex, R: PduRouter, D: DiagnosticSink> IpduM<'a, M, R, D> {
    /// Record a request for `contained` announcing `length` bytes.
    pub(crate) fn last_is_best_transmit(
        &self,
        contained_index: u16,
        length: usize,
    ) -> Result<(), PduError> {
        let contained = self
            .config
            .contained_tx
            .get(contained_index as usize)
            .ok_or(PduError::NotOk)?;
        let container_index = contained.container;
        let container = self
            .config
            .container_tx
            .get(container_index as usize)
            .ok_or(PduError::NotOk)?;
        let header = container.header.bytes();
        let dlc = length.min(contained.length as usize) as u16;

        let requested = self
            .with_general(|g| {
                let queue = g
                    .container_tx
                    .get(container_index as usize)
                    .ok_or(PduError::NotOk)?
                    .request_queues_start as usize
                    + contained.priority as usize;
                let mut requests = g.request_queue(queue).ok_or(PduError::NotOk)?;
                let queued = requests.iter().any(|entry| entry.contained == contained_index);
                if !queued {
                    if requests.is_full() {
                        self.report_runtime(ServiceId::Transmit, RuntimeError::QueueOverflow);
                        return Err(PduError::NotOk);
                    }
                    requests
                        .put(RequestEntry {
                            contained: contained_index,
                            dlc,
                        })
                        .map_err(|_| PduError::NotOk)?;
                }

                let state = g
                    .container_tx
                    .get_mut(container_index as usize)
                    .ok_or(PduError::NotOk)?;
                let first = state.pending_length == 0;
                if !queued {
                    state.pending_length += (header + dlc as usize) as u32;
                }
                if first {
                    state.send_timeout.start_or_shorten(container.send_timeout);
                }
                state.send_timeout.start_or_shorten(contained.send_timeout);
                if is_triggered(container, contained, state.pending_length as usize, first) {
                    state.transmission_requested = true;
                }
                Ok(state.transmission_requested)
            })
            .unwrap_or(Err(PduError::NotOk))?;

        if requested {
            self.send_last_is_best(container_index);
        }
        Ok(())
    }

    /// Build the container into `buf` (payload area only) from the pending
    /// requests, calling the upper layer for every fitting PDU.
    ///
    /// The general region is only taken between upper-layer calls. Returns
    /// the number of payload bytes to send, 0 if nothing was written.
    fn fill_last_is_best(
        &self,
        container_index: u16,
        container: &ContainerTxPdu<'_>,
        buf: &mut [u8],
    ) -> usize {
        let Collection::LastIsBest { queue_depths } = container.collection else {
            return 0;
        };
        let length = (container.length as usize).min(buf.len());
        let buf = &mut buf[..length];
        let header = container.header.bytes();
        let dynamic = container.header.is_dynamic();
        reset_container_bytes(container, contained_of(self.config, container), buf);

        let Some(queues) = self.with_general(|g| {
            g.open_conf_group(container_index);
            g.request_queue_range(container_index, queue_depths.len())
        }) else {
            return 0;
        };
        let mut fill = 0usize;
        let mut written = false;

        for (queue, depth) in queues.zip(queue_depths) {
            for _ in 0..*depth {
                let Some(entry) = self
                    .with_general(|g| g.request_queue(queue).and_then(|requests| requests.peek()))
                    .flatten()
                else {
                    break;
                };
                let desc = self.config.contained_tx.get(entry.contained as usize);
                let dlc = entry.dlc as usize;
                let target = match desc {
                    None => None,
                    Some(_) if dynamic => {
                        let start = fill + header;
                        if start + dlc > length {
                            break;
                        }
                        Some(start..start + dlc)
                    }
                    Some(desc) => {
                        let offset = desc.offset as usize;
                        let end = offset + desc.length as usize;
                        (end <= length).then_some(offset..end)
                    }
                };
                self.with_general(|g| {
                    if let Some(mut requests) = g.request_queue(queue) {
                        let _ = requests.remove();
                    }
                });
                let (Some(desc), Some(range)) = (desc, target) else {
                    continue;
                };

                let got = self.router.trigger_transmit(desc.upper_pdu, &mut buf[range.clone()]);
                if dynamic {
                    let Some(got) = got else {
                        buf[range].fill(0);
                        continue;
                    };
                    let got = got.min(dlc);
                    let _ = encode(
                        container.header,
                        self.config.header_byte_order,
                        ContainedHeader {
                            id: desc.header_id,
                            dlc: got as u32,
                        },
                        &mut buf[fill..range.start],
                    );
                    fill = range.start + got;
                } else {
                    if got.is_none() {
                        buf[range].fill(container.unused_byte);
                        continue;
                    }
                    if let Some(bit) = desc.update_bit {
                        write_bit(buf, bit, true);
                    }
                    written = true;
                }
                self.with_general(|g| g.record_conf_id(container_index, entry.contained));
            }
        }

        if dynamic {
            buf[fill..].fill(0);
        }
        let sent = match (dynamic, written) {
            (true, _) => fill,
            (false, true) => length,
            (false, false) => 0,
        };
        self.with_general(|g| {
            g.recompute_pending(container_index, queue_depths.len(), header);
            if sent == 0 {
                g.discard_conf_group(container_index);
            } else {
                g.close_conf_group(container_index);
            }
        });
        sent
    }

    /// Send a last-is-best container whose transmission was requested.
    pub(crate) fn send_last_is_best(&self, container_index: u16) {
        let Some(container) = self.config.container_tx.get(container_index as usize) else {
            return;
        };
        match container.provision {
            DataProvision::TriggerTransmit => self.announce_last_is_best(container_index, container),
            DataProvision::Direct => self.transmit_last_is_best(container_index, container),
        }
    }

    /// Announce the pending length; the lower layer pulls the content.
    fn announce_last_is_best(&self, container_index: u16, container: &ContainerTxPdu<'_>) {
        let Some(info) = self.config.tx_lo.get(container.tx_lo as usize) else {
            return;
        };
        let length = self
            .with_general(|g| {
                let allowed = self.is_transmission_allowed(g, container.tx_lo);
                let state = g.container_tx.get_mut(container_index as usize)?;
                if !allowed || state.pending_length == 0 {
                    return None;
                }
                state.transmission_requested = false;
                state.send_timeout.stop();
                let pending = state.pending_length as usize;
                self.start_confirmation_timeout(g, container.tx_lo);
                let payload = if container.header.is_dynamic() {
                    pending.min(container.length as usize)
                } else {
                    container.length as usize
                };
                Some(payload + container.meta_data_size as usize)
            })
            .flatten();
        let Some(length) = length else {
            return;
        };

        if self
            .router
            .transmit(info.lower_pdu, PduInfo::announce(length))
            .is_err()
        {
            self.with_general(|g| {
                self.stop_confirmation_timeout(g, container.tx_lo);
                if let Some(state) = g.container_tx.get_mut(container_index as usize) {
                    state.transmission_requested = true;
                }
            });
        }
    }

    /// Fill the container buffer and hand it down with its data. Requests
    /// consumed by a rejected transmission are restored.
    fn transmit_last_is_best(&self, container_index: u16, container: &ContainerTxPdu<'_>) {
        let Some(info) = self.config.tx_lo.get(container.tx_lo as usize) else {
            return;
        };
        let Collection::LastIsBest { queue_depths } = container.collection else {
            return;
        };
        let priorities = queue_depths.len();
        let header = container.header.bytes();
        let slot_len = container_slot_len(container.length, container.meta_data_size);

        self.with_container_tx(container_index, |tx| {
            let start = self
                .with_general(|g| {
                    if !self.is_transmission_allowed(g, container.tx_lo) {
                        return None;
                    }
                    let start = g.container_tx.get(container_index as usize)?.bytes_start;
                    g.set_restore_points(container_index, priorities);
                    Some(start)
                })
                .flatten()?;
            let slot = region_mut(tx, start, slot_len)?;
            let fill = self.fill_last_is_best(container_index, container, slot);

            let sent_len = self
                .with_general(|g| {
                    let state = g.container_tx.get_mut(container_index as usize)?;
                    state.transmission_requested = false;
                    if fill == 0 {
                        g.release_restore_points(container_index, priorities, false);
                        return None;
                    }
                    state.send_timeout.stop();
                    self.start_confirmation_timeout(g, container.tx_lo);
                    Some(sent_length(container, fill as u16))
                })
                .flatten()?;
            slot[container.length as usize..].fill(0);

            let accepted = self
                .router
                .transmit(info.lower_pdu, PduInfo::with_data(&slot[..sent_len]))
                .is_ok();
            self.with_general(|g| {
                g.release_restore_points(container_index, priorities, !accepted);
                if accepted {
                    return;
                }
                #[cfg(feature = "defmt")]
                defmt::debug!("IpduM: container {} rejected, requests restored", container_index);
                self.stop_confirmation_timeout(g, container.tx_lo);
                g.discard_conf_group(container_index);
                g.recompute_pending(container_index, priorities, header);
                if let Some(state) = g.container_tx.get_mut(container_index as usize) {
                    state.transmission_requested = true;
                }
            });
            Some(())
        });
    }

    /// Build the container directly into the lower layer's buffer.
    ///
    /// `out` needs room for the payload actually written plus the meta data;
    /// a static layout always writes the full container length.
    pub(crate) fn last_is_best_trigger_transmit(
        &self,
        container_index: u16,
        out: &mut [u8],
    ) -> Result<usize, PduError> {
        let container = self
            .config
            .container_tx
            .get(container_index as usize)
            .ok_or(PduError::NotOk)?;
        let length = container.length as usize;
        let meta_len = container.meta_data_size as usize;
        let avail = if container.header.is_dynamic() {
            out.len().checked_sub(meta_len).map(|avail| avail.min(length))
        } else {
            (out.len() >= length + meta_len).then_some(length)
        };
        let avail = avail.ok_or(PduError::NotOk)?;

        self.with_container_tx(container_index, |_| {
            let pending = self
                .with_general(|g| {
                    g.container_tx
                        .get(container_index as usize)
                        .map_or(0, |state| state.pending_length)
                })
                .unwrap_or(0);
            if pending == 0 {
                return Err(PduError::NotOk);
            }
            let fill = self.fill_last_is_best(container_index, container, &mut out[..avail]);
            if fill == 0 {
                return Err(PduError::NotOk);
            }
            // meta data of last-is-best containers leaves as zeros
            let payload = sent_length(container, fill as u16) - meta_len;
            out[payload..payload + meta_len].fill(0);

            self.with_general(|g| {
                if let Some(state) = g.container_tx.get_mut(container_index as usize) {
                    state.transmission_requested = false;
                    state.send_timeout.stop();
                }
                self.start_confirmation_timeout(g, container.tx_lo);
            });
            Ok(payload + meta_len)
        })
        .unwrap_or(Err(PduError::NotOk))
    }
}
