//! Transmit side of container PDUs.
//!
//! Two collection semantics exist:
//! * queued ([`data_queue`]): contained PDUs are copied in on transmit, full
//!   or triggered instances are closed into a FIFO and sent in order;
//! * last-is-best ([`request_queue`]): only requests are recorded per
//!   priority, the data is fetched from the upper layer when the container
//!   is built, so only the latest value of each PDU leaves.
pub mod data_queue;
pub mod request_queue;
pub mod send_timeout;
pub mod trigger;

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::core::{Collection, ContainedTxPdu, ContainerTxPdu, DataProvision, IpduMConfig};
use crate::infra::codec::bits::write_bit;
use crate::infra::ram::{container_slot_len, region_mut};
use crate::ipdum::{General, IpduM};
use crate::protocol::traits::{diagnostics::DiagnosticSink, pdu_router::PduRouter};

/// Contained PDUs configured for `container`.
pub(crate) fn contained_of<'c>(
    config: &'c IpduMConfig<'c>,
    container: &ContainerTxPdu<'_>,
) -> &'c [ContainedTxPdu] {
    config
        .contained_tx
        .get(container.contained.start as usize..container.contained.end as usize)
        .unwrap_or(&[])
}

/// Reset one container instance: zeros for a dynamic layout, unused byte
/// and cleared update bits for a static layout. Meta data is zeroed.
pub(crate) fn reset_container_bytes(
    container: &ContainerTxPdu<'_>,
    contained: &[ContainedTxPdu],
    bytes: &mut [u8],
) {
    let len = (container.length as usize).min(bytes.len());
    let (payload, meta) = bytes.split_at_mut(len);
    meta.fill(0);
    if container.header.is_dynamic() {
        payload.fill(0);
        return;
    }
    payload.fill(container.unused_byte);
    for pdu in contained {
        if let Some(bit) = pdu.update_bit {
            write_bit(payload, bit, false);
        }
    }
}

/// Bytes handed to the lower layer for `fill` written payload bytes.
pub(crate) fn sent_length(container: &ContainerTxPdu<'_>, fill: u16) -> usize {
    let payload = if container.header.is_dynamic() {
        fill
    } else {
        container.length
    };
    payload as usize + container.meta_data_size as usize
}

impl<'a, M: RawMutex, R: PduRouter, D: DiagnosticSink> IpduM<'a, M, R, D> {
    /// Reset every instance, or the last-is-best buffer, of a Tx container.
    pub(crate) fn init_container_buffer(&self, g: &General<'a>, index: usize, tx: &mut [u8]) {
        let config = self.config;
        let (Some(container), Some(state)) = (config.container_tx.get(index), g.container_tx.get(index))
        else {
            return;
        };
        let contained = contained_of(config, container);
        let slot = container_slot_len(container.length, container.meta_data_size);
        match container.collection {
            Collection::Queued { depth } => {
                let base = state.queue.base();
                let instances = g.queue_instances.iter().skip(base).take(depth as usize + 1);
                for instance in instances {
                    if let Some(bytes) = region_mut(tx, instance.bytes_start, slot) {
                        reset_container_bytes(container, contained, bytes);
                    }
                }
            }
            Collection::LastIsBest { .. } => {
                if let Some(bytes) = region_mut(tx, state.bytes_start, slot) {
                    reset_container_bytes(container, contained, bytes);
                }
            }
        }
    }

    /// Send timeouts and pending transmissions of the Tx containers of
    /// `partition`.
    pub(crate) fn process_tx_containers(&self, partition: u8) {
        for (index, container) in self.config.container_tx.iter().enumerate() {
            if container.partition != partition {
                continue;
            }
            let index = index as u16;
            let expired = self
                .with_general(|g| {
                    g.container_tx
                        .get_mut(index as usize)
                        .is_some_and(|state| state.send_timeout.tick())
                })
                .unwrap_or(false);

            match container.collection {
                Collection::Queued { .. } => {
                    if expired {
                        self.close_on_timeout(index, container);
                    }
                    match container.provision {
                        DataProvision::TriggerTransmit => self.announce_queued(index),
                        DataProvision::Direct => self.drain_queued(index),
                    }
                }
                Collection::LastIsBest { .. } => {
                    let requested = self
                        .with_general(|g| {
                            let state = g.container_tx.get_mut(index as usize)?;
                            if expired && state.pending_length > 0 {
                                state.transmission_requested = true;
                            }
                            Some(state.transmission_requested)
                        })
                        .flatten()
                        .unwrap_or(false);
                    if requested {
                        self.send_last_is_best(index);
                    }
                }
            }
        }
    }
}
