//! Confirmation supervision of lower-layer Tx PDUs.
//!
//! Every accepted transmission arms a timeout. While it runs, no further
//! transmission of the same PDU is allowed. A timeout reaching 1 at a tick
//! synthesizes a negative confirmation for a bound container; multiplex
//! pathways have no negative confirmation.
pub mod tx_conf_buffer;

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::core::{PduId, TxLoTarget, TxResult};
use crate::error::ServiceId;
use crate::infra::ram::TxLoState;
use crate::ipdum::{General, IpduM};
use crate::protocol::traits::{diagnostics::DiagnosticSink, pdu_router::PduRouter};

impl TxLoState {
    /// Arm with the configured timeout (no-op when unsupervised).
    pub(crate) fn start(&mut self, configured: u16) {
        self.timeout = configured;
    }

    pub(crate) fn stop(&mut self) {
        self.timeout = 0;
    }

    /// No confirmation outstanding.
    pub(crate) fn is_transmission_allowed(&self, configured: u16) -> bool {
        configured == 0 || self.timeout == 0
    }

    /// Advance by one tick. Returns `true` on the tick the timeout elapses.
    pub(crate) fn tick(&mut self) -> bool {
        if self.timeout == 0 {
            return false;
        }
        let elapsed = self.timeout == 1;
        self.timeout -= 1;
        elapsed
    }
}

impl<'a, M: RawMutex, R: PduRouter, D: DiagnosticSink> IpduM<'a, M, R, D> {
    /// Configured confirmation timeout of `tx_lo` (0 when unsupervised or unknown).
    fn configured_timeout(&self, tx_lo: u16) -> u16 {
        self.config
            .tx_lo
            .get(tx_lo as usize)
            .map_or(0, |info| info.confirmation_timeout)
    }

    pub(crate) fn is_transmission_allowed(&self, g: &General<'a>, tx_lo: u16) -> bool {
        g.tx_lo
            .get(tx_lo as usize)
            .is_some_and(|state| state.is_transmission_allowed(self.configured_timeout(tx_lo)))
    }

    pub(crate) fn start_confirmation_timeout(&self, g: &mut General<'a>, tx_lo: u16) {
        let configured = self.configured_timeout(tx_lo);
        if let Some(state) = g.tx_lo.get_mut(tx_lo as usize) {
            state.start(configured);
        }
    }

    pub(crate) fn stop_confirmation_timeout(&self, g: &mut General<'a>, tx_lo: u16) {
        if let Some(state) = g.tx_lo.get_mut(tx_lo as usize) {
            state.stop();
        }
    }

    /// Confirmation from the lower layer.
    pub(crate) fn confirm_lower(&self, tx_lo: PduId, result: TxResult) {
        let Some(info) = self.config.tx_lo.get(tx_lo as usize) else {
            return;
        };
        // A confirmation arriving after the timeout elapsed was already
        // answered negatively.
        let forward = self
            .with_general_or_report(ServiceId::TxConfirmation, |g| {
                let Some(state) = g.tx_lo.get_mut(tx_lo as usize) else {
                    return false;
                };
                let pending = info.confirmation_timeout == 0 || state.timeout > 0;
                state.stop();
                pending
            })
            .unwrap_or(false);

        if !forward {
            #[cfg(feature = "defmt")]
            defmt::debug!("IpduM: late confirmation of Tx PDU {} dropped", tx_lo);
            return;
        }

        match (info.target, result) {
            (TxLoTarget::Pathway(pathway), TxResult::Ok) => self.confirm_pathway(pathway),
            (TxLoTarget::Pathway(_), TxResult::NotOk) => {}
            (TxLoTarget::Container(container), result) => {
                self.confirm_container(container, result)
            }
        }
    }

    /// Forward a positive confirmation to the static part and the active
    /// dynamic part of a multiplex pathway.
    fn confirm_pathway(&self, pathway: u16) {
        let Some(desc) = self.config.mux_tx_pathways.get(pathway as usize) else {
            return;
        };
        let active = self
            .with_general(|g| {
                g.mux_tx
                    .get(pathway as usize)
                    .and_then(|state| state.active_dynamic)
            })
            .flatten();

        for part in [desc.static_part, active].into_iter().flatten() {
            let Some(part) = self.config.mux_tx_parts.get(part as usize) else {
                continue;
            };
            if part.confirmation {
                self.router.tx_confirmation(part.upper_pdu, TxResult::Ok);
            }
        }
    }

    /// Confirmation timeouts of `partition`.
    pub(crate) fn tick_confirmation_timeouts(&self, partition: u8) {
        for (tx_lo, info) in self.config.tx_lo.iter().enumerate() {
            if info.partition != partition {
                continue;
            }
            let elapsed = self
                .with_general(|g| g.tx_lo.get_mut(tx_lo).is_some_and(|state| state.tick()))
                .unwrap_or(false);
            if !elapsed {
                continue;
            }

            #[cfg(feature = "defmt")]
            defmt::warn!("IpduM: confirmation timeout of Tx PDU {}", tx_lo);

            if let TxLoTarget::Container(container) = info.target {
                self.confirm_container(container, TxResult::NotOk);
            }
        }
    }
}
