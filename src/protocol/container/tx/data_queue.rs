//! Queued collection of Tx containers.
//!
//! Instances of one container live in a ring of `depth + 1` slots: up to
//! `depth` closed instances waiting for transmission, plus the current
//! instance at the write position. Closing the current instance while the
//! FIFO is full evicts the oldest one.
use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::core::{Collection, ContainedTxPdu, ContainerTxPdu, DataProvision, PduInfo};
use crate::error::{PduError, RuntimeError, ServiceId};
use crate::infra::codec::bits::write_bit;
use crate::infra::codec::header::{encode, ContainedHeader};
use crate::infra::ram::{container_slot_len, region_mut, QueueInstance};
use crate::ipdum::{General, IpduM};
use crate::protocol::container::tx::trigger::is_triggered;
use crate::protocol::container::tx::{contained_of, reset_container_bytes, sent_length};
use crate::protocol::traits::{diagnostics::DiagnosticSink, pdu_router::PduRouter};

impl<'a, M: RawMutex, R: PduRouter, D: DiagnosticSink> IpduM<'a, M, R, D> {
    /// Copy a contained PDU into the current instance of its container.
    ///
    /// `data` carries the payload followed by the container's meta data.
    pub(crate) fn queued_transmit(&self, contained_index: u16, data: &[u8]) -> Result<(), PduError> {
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

        let send = self
            .with_container_tx(container_index, |tx| {
                self.with_general(|g| {
                    self.add_contained(g, tx, container_index, container, contained_index, contained, data)
                })
            })
            .flatten()
            .ok_or(PduError::NotOk)?;

        if send {
            match container.provision {
                DataProvision::TriggerTransmit => self.announce_queued(container_index),
                DataProvision::Direct => self.drain_queued(container_index),
            }
        }
        Ok(())
    }

    /// Write `data` into the current instance, closing instances as needed.
    ///
    /// Returns whether a closed instance awaits transmission.
    #[allow(clippy::too_many_arguments)]
    fn add_contained(
        &self,
        g: &mut General<'a>,
        tx: &mut [u8],
        container_index: u16,
        container: &ContainerTxPdu<'_>,
        contained_index: u16,
        contained: &ContainedTxPdu,
        data: &[u8],
    ) -> bool {
        const SID: ServiceId = ServiceId::Transmit;
        let meta_len = container.meta_data_size as usize;
        let Some((payload, meta)) = data.len().checked_sub(meta_len).map(|at| data.split_at(at)) else {
            return false;
        };
        let header = container.header.bytes();
        let length = container.length as usize;
        let mut send = false;

        if container.header.is_dynamic() {
            let fill = self.current_instance(g, container_index).map_or(0, |(_, i)| i.fill);
            if fill as usize + header + payload.len() > length {
                self.close_current(g, tx, container_index, container, SID);
                send = true;
            }
        }

        let Some((slot, mut instance)) = self.current_instance(g, container_index) else {
            return send;
        };
        let Some(bytes) = region_mut(
            tx,
            instance.bytes_start,
            container_slot_len(container.length, container.meta_data_size),
        ) else {
            return send;
        };
        let first = instance.fill == 0;

        if container.header.is_dynamic() {
            let at = instance.fill as usize;
            if at + header + payload.len() > length {
                return send;
            }
            let written = encode(
                container.header,
                self.config.header_byte_order,
                ContainedHeader {
                    id: contained.header_id,
                    dlc: payload.len() as u32,
                },
                &mut bytes[at..length],
            );
            if written.is_none() {
                return send;
            }
            bytes[at + header..at + header + payload.len()].copy_from_slice(payload);
            instance.fill += (header + payload.len()) as u16;
            push_id(g, container_index, &mut instance, contained_index, false);
        } else {
            let offset = contained.offset as usize;
            let Some(target) = bytes.get_mut(offset..offset + payload.len()) else {
                return send;
            };
            target.copy_from_slice(payload);
            if let Some(bit) = contained.update_bit {
                write_bit(&mut bytes[..length], bit, true);
            }
            instance.fill = container.length;
            push_id(g, container_index, &mut instance, contained_index, true);
        }
        if meta_len > 0 {
            bytes[length..length + meta_len].copy_from_slice(meta);
        }
        if let Some(record) = g.queue_instances.get_mut(slot) {
            *record = instance;
        }

        let Some(state) = g.container_tx.get_mut(container_index as usize) else {
            return send;
        };
        if first {
            state.send_timeout.start_or_shorten(container.send_timeout);
        }
        state.send_timeout.start_or_shorten(contained.send_timeout);

        if is_triggered(container, contained, instance.fill as usize, first) {
            self.close_current(g, tx, container_index, container, SID);
            send = true;
        }
        send
    }

    /// Slot and record of the current (open) instance.
    fn current_instance(&self, g: &General<'a>, container: u16) -> Option<(usize, QueueInstance)> {
        let slot = g.container_tx.get(container as usize)?.queue.write_slot();
        Some((slot, *g.queue_instances.get(slot)?))
    }

    /// Queue the current instance and stop the send timeout. The oldest
    /// closed instance is evicted if the FIFO is full.
    pub(crate) fn close_current(
        &self,
        g: &mut General<'a>,
        tx: &mut [u8],
        container_index: u16,
        container: &ContainerTxPdu<'_>,
        service: ServiceId,
    ) {
        let Some(state) = g.container_tx.get_mut(container_index as usize) else {
            return;
        };
        state.send_timeout.stop();
        let empty = g
            .queue_instances
            .get(state.queue.write_slot())
            .map_or(true, |instance| instance.fill == 0);
        if empty {
            return;
        }

        if state.queue.is_full() {
            let oldest = state.queue.read_slot();
            let _ = state.queue.remove();
            self.reset_instance(g, tx, container, oldest);
            #[cfg(feature = "defmt")]
            defmt::warn!("IpduM: container {} queue full, oldest instance dropped", container_index);
            self.report_runtime(service, RuntimeError::QueueOverflow);
        }
        if let Some(state) = g.container_tx.get_mut(container_index as usize) {
            let _ = state.queue.commit_write();
        }
    }

    /// Clear the record and the bytes of the instance in `slot`.
    fn reset_instance(
        &self,
        g: &mut General<'a>,
        tx: &mut [u8],
        container: &ContainerTxPdu<'_>,
        slot: usize,
    ) {
        let Some(instance) = g.queue_instances.get_mut(slot) else {
            return;
        };
        instance.fill = 0;
        instance.id_count = 0;
        let slot_len = container_slot_len(container.length, container.meta_data_size);
        if let Some(bytes) = region_mut(tx, instance.bytes_start, slot_len) {
            reset_container_bytes(container, contained_of(self.config, container), bytes);
        }
    }

    /// Close a partially filled instance whose send timeout expired.
    pub(crate) fn close_on_timeout(&self, container_index: u16, container: &ContainerTxPdu<'_>) {
        #[cfg(feature = "defmt")]
        defmt::debug!("IpduM: send timeout of container {}", container_index);
        self.with_container_tx(container_index, |tx| {
            self.with_general(|g| {
                self.close_current(g, tx, container_index, container, ServiceId::MainFunctionTx)
            })
        });
    }

    /// Announce the oldest closed instance; the lower layer pulls it with
    /// trigger transmit.
    pub(crate) fn announce_queued(&self, container_index: u16) {
        let Some(container) = self.config.container_tx.get(container_index as usize) else {
            return;
        };
        let Some(info) = self.config.tx_lo.get(container.tx_lo as usize) else {
            return;
        };
        let length = self
            .with_general(|g| {
                let state = g.container_tx.get(container_index as usize)?;
                if state.queue.is_empty() || !self.is_transmission_allowed(g, container.tx_lo) {
                    return None;
                }
                let fill = g.queue_instances.get(state.queue.read_slot())?.fill;
                self.start_confirmation_timeout(g, container.tx_lo);
                Some(sent_length(container, fill))
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
            self.with_general(|g| self.stop_confirmation_timeout(g, container.tx_lo));
        }
    }

    /// Send closed instances with their data until the FIFO is empty, a
    /// transmission fails or a confirmation becomes outstanding.
    pub(crate) fn drain_queued(&self, container_index: u16) {
        let Some(container) = self.config.container_tx.get(container_index as usize) else {
            return;
        };
        let Some(info) = self.config.tx_lo.get(container.tx_lo as usize) else {
            return;
        };
        let Collection::Queued { depth } = container.collection else {
            return;
        };
        let length = container.length as usize;
        let meta_len = container.meta_data_size as usize;
        let slot_len = container_slot_len(container.length, container.meta_data_size);

        for _ in 0..depth {
            let sent = self
                .with_container_tx(container_index, |tx| {
                    let (slot, instance) = self
                        .with_general(|g| {
                            let state = g.container_tx.get(container_index as usize)?;
                            if state.queue.is_empty()
                                || !self.is_transmission_allowed(g, container.tx_lo)
                            {
                                return None;
                            }
                            let slot = state.queue.read_slot();
                            let instance = *g.queue_instances.get(slot)?;
                            g.move_ids_to_conf(container_index, slot);
                            self.start_confirmation_timeout(g, container.tx_lo);
                            Some((slot, instance))
                        })
                        .flatten()?;

                    let bytes = region_mut(tx, instance.bytes_start, slot_len)?;
                    let fill = instance.fill as usize;
                    let moved = meta_len > 0 && container.header.is_dynamic() && fill < length;
                    if moved {
                        bytes.copy_within(length..length + meta_len, fill);
                    }
                    let sent_len = sent_length(container, instance.fill);

                    match self
                        .router
                        .transmit(info.lower_pdu, PduInfo::with_data(&bytes[..sent_len]))
                    {
                        Ok(()) => {
                            self.with_general(|g| {
                                if let Some(state) = g.container_tx.get_mut(container_index as usize) {
                                    let _ = state.queue.remove();
                                }
                                self.reset_instance(g, tx, container, slot);
                            });
                            Some(true)
                        }
                        Err(_) => {
                            if moved {
                                bytes.copy_within(fill..fill + meta_len, length);
                                bytes[fill..length].fill(0);
                            }
                            self.with_general(|g| {
                                self.stop_confirmation_timeout(g, container.tx_lo);
                                g.discard_conf_group(container_index);
                            });
                            Some(false)
                        }
                    }
                })
                .flatten();
            if sent != Some(true) {
                break;
            }
        }
    }

    /// Copy the oldest closed instance into `out`, queuing the current
    /// instance first if nothing else is pending.
    pub(crate) fn queued_trigger_transmit(
        &self,
        container_index: u16,
        out: &mut [u8],
    ) -> Result<usize, PduError> {
        const SID: ServiceId = ServiceId::TriggerTransmit;
        let container = self
            .config
            .container_tx
            .get(container_index as usize)
            .ok_or(PduError::NotOk)?;
        let length = container.length as usize;
        let meta_len = container.meta_data_size as usize;
        let slot_len = container_slot_len(container.length, container.meta_data_size);

        self.with_container_tx(container_index, |tx| {
            self.with_general(|g| {
                let empty = g
                    .container_tx
                    .get(container_index as usize)
                    .map_or(true, |state| state.queue.is_empty());
                if empty {
                    self.close_current(g, tx, container_index, container, SID);
                }

                let state = g
                    .container_tx
                    .get(container_index as usize)
                    .ok_or(PduError::NotOk)?;
                if state.queue.is_empty() {
                    return Err(PduError::NotOk);
                }
                let slot = state.queue.read_slot();
                let instance = *g.queue_instances.get(slot).ok_or(PduError::NotOk)?;
                let sent_len = sent_length(container, instance.fill);
                if out.len() < sent_len {
                    return Err(PduError::NotOk);
                }

                let bytes = region_mut(tx, instance.bytes_start, slot_len).ok_or(PduError::NotOk)?;
                let payload = sent_len - meta_len;
                out[..payload].copy_from_slice(&bytes[..payload]);
                out[payload..sent_len].copy_from_slice(&bytes[length..length + meta_len]);

                g.move_ids_to_conf(container_index, slot);
                if let Some(state) = g.container_tx.get_mut(container_index as usize) {
                    let _ = state.queue.remove();
                }
                self.reset_instance(g, tx, container, slot);
                self.start_confirmation_timeout(g, container.tx_lo);
                Ok(sent_len)
            })
        })
        .flatten()
        .unwrap_or(Err(PduError::NotOk))
    }
}

/// Record `contained` in the id list of `instance`.
///
/// With `dedupe`, an id already present is not recorded twice (static layout
/// overwrites in place).
fn push_id(
    g: &mut General<'_>,
    container: u16,
    instance: &mut QueueInstance,
    contained: u16,
    dedupe: bool,
) {
    let capacity = g
        .container_tx
        .get(container as usize)
        .map_or(0, |state| state.id_capacity);
    if instance.id_count >= capacity {
        return;
    }
    let start = instance.ids_start as usize;
    let count = instance.id_count as usize;
    let Some(ids) = g.ids.get_mut(start..start + count + 1) else {
        return;
    };
    if dedupe && ids[..count].contains(&contained) {
        return;
    }
    ids[count] = contained;
    instance.id_count += 1;
}
