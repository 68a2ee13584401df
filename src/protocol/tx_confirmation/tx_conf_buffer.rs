//! Contained PDUs of the transmissions of a Tx container still waiting for
//! their confirmation.
//!
//! Every transmission appends one group: the ids it carries followed by
//! [`GROUP_END`]. A confirmation consumes the oldest group only, so several
//! instances may be in flight at once.
use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::core::TxResult;
use crate::error::ServiceId;
use crate::infra::ram::id_capacity;
use crate::infra::ring::RingQueue;
use crate::ipdum::{General, IpduM};
use crate::protocol::traits::{diagnostics::DiagnosticSink, pdu_router::PduRouter};

/// Closes a group in the confirmation ring.
pub(crate) const GROUP_END: u16 = u16::MAX;

impl<'a> General<'a> {
    /// Start the group of a new transmission.
    ///
    /// Groups that were never confirmed are dropped, oldest first, until a
    /// full group fits.
    pub(crate) fn open_conf_group(&mut self, container: u16) {
        let Some(state) = self.container_tx.get_mut(container as usize) else {
            return;
        };
        state.conf_group = 0;
        let needed = state.id_capacity + 1;
        let mut conf = RingQueue::new(&mut state.conf, self.ids);
        for _ in 0..conf.capacity() {
            if conf.capacity() - conf.len() >= needed {
                break;
            }
            if conf.get().is_err() {
                break;
            }
        }
    }

    /// Append one contained PDU to the open group.
    pub(crate) fn record_conf_id(&mut self, container: u16, contained: u16) {
        let Some(state) = self.container_tx.get_mut(container as usize) else {
            return;
        };
        if RingQueue::new(&mut state.conf, self.ids).put(contained).is_ok() {
            state.conf_group += 1;
        }
    }

    pub(crate) fn close_conf_group(&mut self, container: u16) {
        self.record_conf_id(container, GROUP_END);
    }

    /// Drop the group of a transmission the lower layer rejected.
    pub(crate) fn discard_conf_group(&mut self, container: u16) {
        let Some(state) = self.container_tx.get_mut(container as usize) else {
            return;
        };
        let _ = state.conf.retract(state.conf_group);
        state.conf_group = 0;
    }

    /// Record the ids of a queue instance as one group.
    pub(crate) fn move_ids_to_conf(&mut self, container: u16, instance: usize) {
        let Some(record) = self.queue_instances.get(instance).copied() else {
            return;
        };
        self.open_conf_group(container);
        for k in 0..record.id_count as usize {
            let Some(id) = self.ids.get(record.ids_start as usize + k).copied() else {
                break;
            };
            self.record_conf_id(container, id);
        }
        self.close_conf_group(container);
    }

    /// Next id of the oldest group, `None` at its end.
    fn take_conf_id(&mut self, container: u16) -> Option<u16> {
        let state = self.container_tx.get_mut(container as usize)?;
        let id = RingQueue::new(&mut state.conf, self.ids).get().ok();
        // the newest group shrinks once the oldest runs into it
        state.conf_group = state.conf_group.min(state.conf.len());
        id.filter(|&id| id != GROUP_END)
    }
}

impl<'a, M: RawMutex, R: PduRouter, D: DiagnosticSink> IpduM<'a, M, R, D> {
    /// Deliver `result` to every contained PDU of the oldest transmission
    /// configured for confirmation.
    pub(crate) fn confirm_container(&self, container: u16, result: TxResult) {
        if container as usize >= self.config.container_tx.len() {
            return;
        }
        let bound = id_capacity(self.config, container as usize) + 1;
        for _ in 0..bound {
            let next = self.with_general_or_report(ServiceId::TxConfirmation, |g| {
                g.take_conf_id(container)
            });
            let Some(Some(contained)) = next else {
                break;
            };
            if let Some(desc) = self.config.contained_tx.get(contained as usize) {
                if desc.confirmation {
                    self.router.tx_confirmation(desc.upper_pdu, result);
                }
            }
        }
    }
}
