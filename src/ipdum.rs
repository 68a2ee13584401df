//! Multiplexer instance: owns the RAM regions, validates requests and
//! dispatches them to the multiplex and container engines.
//!
//! # Regions
//!
//! * general: counters, queue indices, flags and id lists, guarded by an
//!   `embassy_sync::blocking_mutex::Mutex`. It is held for short bookkeeping
//!   only and never across a router call.
//! * bytes: one [`ByteRegion`] per pathway and per container (multiplex
//!   buffers, container instances, receive scratch buffers and deferred Rx
//!   queues). Router calls are made while the region of the handle being
//!   served is held, so only calls on that same handle are excluded.
//!
//! A byte region is always taken before the general region. A region that
//! is already in use makes the request fail instead of blocking; calls
//! without a result report [`RuntimeError::Busy`].
use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::{raw::RawMutex, Mutex};

use crate::core::{
    Collection, HeaderSize, IpduMConfig, PduId, PduInfo, RxLoTarget, RxProcessing, TxLoTarget,
    TxResult, TxUpTarget,
};
use crate::error::{ConfigError, DevError, PduError, RuntimeError, ServiceId};
use crate::infra::ram::{
    bind_regions, conf_capacity, container_slot_len, id_capacity, rx_region_len, tx_region_len,
    ByteRegion, ContainerRxState, ContainerTxState, IpduMRam, MuxRxState, MuxTxState,
    QueueInstance, RamRequirements, RequestEntry, RequestQueueState, TxLoState,
};
use crate::infra::ring::RingIndex;
use crate::protocol::traits::{diagnostics::DiagnosticSink, pdu_router::PduRouter};

/// AUTOSAR module id of the PDU multiplexer.
pub const IPDUM_MODULE_ID: u16 = 52;

/// Vendor id reported by [`IpduM::version_info`].
pub const IPDUM_VENDOR_ID: u16 = 0;

/// Module and software version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VersionInfo {
    pub vendor_id: u16,
    pub module_id: u16,
    pub sw_major_version: u8,
    pub sw_minor_version: u8,
    pub sw_patch_version: u8,
}

const fn parse_version(s: &str) -> u8 {
    let bytes = s.as_bytes();
    let mut value: u8 = 0;
    let mut i = 0;
    while i < bytes.len() {
        value = value * 10 + (bytes[i] - b'0');
        i += 1;
    }
    value
}

const VERSION: VersionInfo = VersionInfo {
    vendor_id: IPDUM_VENDOR_ID,
    module_id: IPDUM_MODULE_ID,
    sw_major_version: parse_version(env!("CARGO_PKG_VERSION_MAJOR")),
    sw_minor_version: parse_version(env!("CARGO_PKG_VERSION_MINOR")),
    sw_patch_version: parse_version(env!("CARGO_PKG_VERSION_PATCH")),
};

//==================================================================================GENERAL_REGION

/// Records of the general region.
pub(crate) struct General<'a> {
    pub(crate) tx_lo: &'a mut [TxLoState],
    pub(crate) mux_tx: &'a mut [MuxTxState],
    pub(crate) mux_rx: &'a mut [MuxRxState],
    pub(crate) container_tx: &'a mut [ContainerTxState],
    pub(crate) container_rx: &'a mut [ContainerRxState],
    pub(crate) queue_instances: &'a mut [QueueInstance],
    pub(crate) request_queues: &'a mut [RequestQueueState],
    pub(crate) request_entries: &'a mut [RequestEntry],
    pub(crate) ids: &'a mut [u16],
    pub(crate) rx_lengths: &'a mut [u16],
}

//==================================================================================IPDUM

/// PDU multiplexer.
///
/// * `M` - raw mutex guarding the regions (`CriticalSectionRawMutex` when
///   called from interrupts, `NoopRawMutex` on a single executor).
/// * `R` - PDU router receiving every upward and downward call.
/// * `D` - sink of development and runtime errors.
pub struct IpduM<'a, M: RawMutex, R: PduRouter, D: DiagnosticSink> {
    pub(crate) config: &'a IpduMConfig<'a>,
    pub(crate) router: R,
    pub(crate) diagnostics: D,
    initialized: AtomicBool,
    general: Mutex<M, RefCell<General<'a>>>,
    tx_regions: &'a [ByteRegion<'a, M>],
    rx_regions: &'a [ByteRegion<'a, M>],
}

impl<'a, M: RawMutex, R: PduRouter, D: DiagnosticSink> IpduM<'a, M, R, D> {
    /// Bind a validated configuration to its RAM.
    ///
    /// The instance starts uninitialized; call [`init`](Self::init) before use.
    pub fn new(
        config: &'a IpduMConfig<'a>,
        ram: IpduMRam<'a, M>,
        router: R,
        diagnostics: D,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        RamRequirements::of(config).check(&ram)?;

        let IpduMRam {
            tx_lo,
            mux_tx,
            mux_rx,
            container_tx,
            container_rx,
            queue_instances,
            request_queues,
            request_entries,
            ids,
            rx_lengths,
            tx_bytes,
            rx_bytes,
            tx_regions,
            rx_regions,
        } = ram;
        let tx_regions = bind_regions(tx_regions, tx_bytes, |k| tx_region_len(config, k));
        let rx_regions = bind_regions(rx_regions, rx_bytes, |k| rx_region_len(config, k));

        Ok(Self {
            config,
            router,
            diagnostics,
            initialized: AtomicBool::new(false),
            general: Mutex::new(RefCell::new(General {
                tx_lo,
                mux_tx,
                mux_rx,
                container_tx,
                container_rx,
                queue_instances,
                request_queues,
                request_entries,
                ids,
                rx_lengths,
            })),
            tx_regions,
            rx_regions,
        })
    }

    /// Lay out the RAM and reset every buffer, queue, counter and flag.
    ///
    /// Reports `IPDUM_E_INIT_FAILED` if a region is in use.
    pub fn init(&self) {
        let mut done = self.with_general(|g| layout(self.config, g)).is_some();
        for (index, region) in self.tx_regions.iter().enumerate() {
            done &= region
                .try_with(|tx| self.with_general(|g| self.reset_tx_region(g, index, tx)))
                .flatten()
                .is_some();
        }
        for region in self.rx_regions {
            done &= region.try_with(|rx| rx.fill(0)).is_some();
        }

        if !done {
            self.report_development(ServiceId::Init, DevError::InitFailed);
            return;
        }
        self.initialized.store(true, Ordering::Release);

        #[cfg(feature = "defmt")]
        defmt::info!(
            "IpduM initialized: {} mux Tx, {} mux Rx, {} container Tx, {} container Rx",
            self.config.mux_tx_pathways.len(),
            self.config.mux_rx_pathways.len(),
            self.config.container_tx.len(),
            self.config.container_rx.len()
        );
    }

    /// Return to the uninitialized state; every request is rejected until
    /// the next [`init`](Self::init).
    pub fn init_memory(&self) {
        self.initialized.store(false, Ordering::Release);
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Module and software version.
    pub fn version_info(&self) -> VersionInfo {
        VERSION
    }

    pub fn config(&self) -> &'a IpduMConfig<'a> {
        self.config
    }

    pub fn router(&self) -> &R {
        &self.router
    }

    pub fn diagnostics(&self) -> &D {
        &self.diagnostics
    }

    //==================================================================================ENTRY_POINTS

    /// Request transmission of an upper-layer PDU.
    ///
    /// Multiplexed parts and queued contained PDUs need data. Last-is-best
    /// contained PDUs only need the announced length; data is fetched when
    /// the container is built.
    pub fn transmit(&self, tx_up: PduId, info: PduInfo<'_>) -> Result<(), PduError> {
        const SID: ServiceId = ServiceId::Transmit;
        self.check_initialized(SID)?;
        let target = self.check_handle(SID, self.config.tx_up.get(tx_up as usize))?;

        match *target {
            TxUpTarget::MuxPart(part) => {
                let desc = self.check_handle(SID, self.config.mux_tx_parts.get(part as usize))?;
                let data = self.check_pointer(SID, info.sdu)?;
                self.check_param(SID, data.len() == desc.length as usize)?;
                self.mux_transmit(part, data)
            }
            TxUpTarget::Contained(contained) => {
                let desc =
                    self.check_handle(SID, self.config.contained_tx.get(contained as usize))?;
                let container = self.check_handle(
                    SID,
                    self.config.container_tx.get(desc.container as usize),
                )?;
                match container.collection {
                    Collection::Queued { .. } => {
                        let data = self.check_pointer(SID, info.sdu)?;
                        let meta = container.meta_data_size as usize;
                        let payload = data.len().checked_sub(meta);
                        let ok = match (container.header, payload) {
                            (_, None) => false,
                            (HeaderSize::None, Some(len)) => len == desc.length as usize,
                            (_, Some(len)) => len <= desc.length as usize,
                        };
                        self.check_param(SID, ok)?;
                        self.queued_transmit(contained, data)
                    }
                    Collection::LastIsBest { .. } => {
                        self.check_param(SID, info.length <= desc.length as usize)?;
                        self.last_is_best_transmit(contained, info.length)
                    }
                }
            }
        }
    }

    /// Copy the PDU `tx_lo` into `out` on request of the lower layer.
    ///
    /// Returns the number of bytes written.
    pub fn trigger_transmit(&self, tx_lo: PduId, out: &mut [u8]) -> Result<usize, PduError> {
        const SID: ServiceId = ServiceId::TriggerTransmit;
        self.check_initialized(SID)?;
        let info = self.check_handle(SID, self.config.tx_lo.get(tx_lo as usize))?;
        self.check_pointer(SID, (!out.is_empty()).then_some(()))?;

        match info.target {
            TxLoTarget::Pathway(pathway) => self.mux_trigger_transmit(pathway, out),
            TxLoTarget::Container(container) => {
                let desc =
                    self.check_handle(SID, self.config.container_tx.get(container as usize))?;
                match desc.collection {
                    Collection::Queued { .. } => self.queued_trigger_transmit(container, out),
                    Collection::LastIsBest { .. } => {
                        self.last_is_best_trigger_transmit(container, out)
                    }
                }
            }
        }
    }

    /// Outcome of a transmission of `tx_lo` reported by the lower layer.
    pub fn tx_confirmation(&self, tx_lo: PduId, result: TxResult) {
        const SID: ServiceId = ServiceId::TxConfirmation;
        if self.check_initialized(SID).is_err() {
            return;
        }
        if self
            .check_handle(SID, self.config.tx_lo.get(tx_lo as usize))
            .is_err()
        {
            return;
        }
        self.confirm_lower(tx_lo, result);
    }

    /// PDU `rx_lo` received from the lower layer.
    pub fn rx_indication(&self, rx_lo: PduId, data: &[u8]) {
        const SID: ServiceId = ServiceId::RxIndication;
        if self.check_initialized(SID).is_err() {
            return;
        }
        let Ok(target) = self.check_handle(SID, self.config.rx_lo.get(rx_lo as usize)) else {
            return;
        };
        match *target {
            RxLoTarget::Pathway(pathway) => self.mux_rx_indication(pathway, data),
            RxLoTarget::Container(container) => self.container_rx_indication(container, data),
        }
    }

    /// Periodic processing of `partition`: deferred Rx containers, then
    /// confirmation timeouts, send timeouts and queued Tx containers.
    pub fn main_function(&self, partition: u8) {
        self.main_function_rx(partition);
        self.main_function_tx(partition);
    }

    /// Unpack the deferred Rx containers of `partition`.
    pub fn main_function_rx(&self, partition: u8) {
        if self.check_partition(ServiceId::MainFunctionRx, partition) {
            self.process_rx_queues(partition);
        }
    }

    /// Tx timeouts and transmissions of `partition`.
    pub fn main_function_tx(&self, partition: u8) {
        if !self.check_partition(ServiceId::MainFunctionTx, partition) {
            return;
        }
        self.tick_confirmation_timeouts(partition);
        self.process_tx_containers(partition);
    }

    //==================================================================================INSPECTION

    /// Remaining ticks of the confirmation timeout of `tx_lo` (0 = idle).
    pub fn confirmation_timeout(&self, tx_lo: PduId) -> Option<u16> {
        self.with_general(|g| g.tx_lo.get(tx_lo as usize).map(|s| s.timeout))
            .flatten()
    }

    /// Remaining ticks of the send timeout of a Tx container (0 = stopped).
    pub fn send_timeout(&self, container: u16) -> Option<u16> {
        self.with_general(|g| {
            g.container_tx
                .get(container as usize)
                .map(|s| s.send_timeout.remaining())
        })
        .flatten()
    }

    /// Closed instances waiting in the queue of a queued Tx container.
    pub fn tx_queue_len(&self, container: u16) -> Option<u16> {
        self.with_general(|g| g.container_tx.get(container as usize).map(|s| s.queue.len()))
            .flatten()
    }

    /// Pending entries of a deferred Rx container.
    pub fn rx_queue_len(&self, container: u16) -> Option<u16> {
        self.with_general(|g| g.container_rx.get(container as usize).map(|s| s.queue.len()))
            .flatten()
    }

    //==================================================================================REGIONS

    pub(crate) fn with_general<T>(&self, f: impl FnOnce(&mut General<'a>) -> T) -> Option<T> {
        self.general
            .lock(|cell| cell.try_borrow_mut().ok().map(|mut g| f(&mut g)))
    }

    /// General region with the busy case reported against `service`.
    pub(crate) fn with_general_or_report<T>(
        &self,
        service: ServiceId,
        f: impl FnOnce(&mut General<'a>) -> T,
    ) -> Option<T> {
        let result = self.with_general(f);
        if result.is_none() {
            self.report_runtime(service, RuntimeError::Busy);
        }
        result
    }

    /// Bytes of mux Tx pathway `pathway`.
    pub(crate) fn with_pathway_tx<T>(
        &self,
        pathway: u16,
        f: impl FnOnce(&mut [u8]) -> T,
    ) -> Option<T> {
        self.tx_regions.get(pathway as usize)?.try_with(f)
    }

    /// Bytes of Tx container `container`.
    pub(crate) fn with_container_tx<T>(
        &self,
        container: u16,
        f: impl FnOnce(&mut [u8]) -> T,
    ) -> Option<T> {
        let index = self.config.mux_tx_pathways.len() + container as usize;
        self.tx_regions.get(index)?.try_with(f)
    }

    /// Bytes of mux Rx pathway `pathway`.
    pub(crate) fn with_pathway_rx<T>(
        &self,
        pathway: u16,
        f: impl FnOnce(&mut [u8]) -> T,
    ) -> Option<T> {
        self.rx_regions.get(pathway as usize)?.try_with(f)
    }

    /// Bytes of Rx container `container`.
    pub(crate) fn with_container_rx<T>(
        &self,
        container: u16,
        f: impl FnOnce(&mut [u8]) -> T,
    ) -> Option<T> {
        let index = self.config.mux_rx_pathways.len() + container as usize;
        self.rx_regions.get(index)?.try_with(f)
    }

    /// Reset Tx region `index` (mux pathways first, then containers).
    fn reset_tx_region(&self, g: &General<'a>, index: usize, tx: &mut [u8]) {
        tx.fill(0);
        let pathways = self.config.mux_tx_pathways.len();
        if index < pathways {
            self.init_mux_buffer(g, index, tx);
        } else {
            self.init_container_buffer(g, index - pathways, tx);
        }
    }

    //==================================================================================REPORTS

    pub(crate) fn report_development(&self, service: ServiceId, error: DevError) {
        #[cfg(feature = "defmt")]
        defmt::warn!("IpduM development error {} in {}", error, service);
        self.diagnostics.report_development_error(service, error);
    }

    pub(crate) fn report_runtime(&self, service: ServiceId, error: RuntimeError) {
        #[cfg(feature = "defmt")]
        defmt::warn!("IpduM runtime error {} in {}", error, service);
        self.diagnostics.report_runtime_error(service, error);
    }

    /// Reject a request failing a development check.
    ///
    /// Without development error detection the request is still rejected,
    /// just not reported.
    fn reject(&self, service: ServiceId, error: DevError) -> PduError {
        if self.config.dev_error_detect {
            self.report_development(service, error);
            PduError::Development(error)
        } else {
            PduError::NotOk
        }
    }

    fn check_initialized(&self, service: ServiceId) -> Result<(), PduError> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(self.reject(service, DevError::Uninit))
        }
    }

    fn check_handle<T>(&self, service: ServiceId, entry: Option<T>) -> Result<T, PduError> {
        entry.ok_or_else(|| self.reject(service, DevError::Param))
    }

    fn check_pointer<T>(&self, service: ServiceId, data: Option<T>) -> Result<T, PduError> {
        data.ok_or_else(|| self.reject(service, DevError::ParamPointer))
    }

    fn check_param(&self, service: ServiceId, ok: bool) -> Result<(), PduError> {
        if ok {
            Ok(())
        } else {
            Err(self.reject(service, DevError::Param))
        }
    }

    /// Main functions do nothing before `init` and on unknown partitions.
    fn check_partition(&self, service: ServiceId, partition: u8) -> bool {
        if partition >= self.config.partition_count {
            if self.config.dev_error_detect {
                self.report_development(service, DevError::Param);
            }
            return false;
        }
        self.is_initialized()
    }
}

//==================================================================================LAYOUT

/// Assign pool offsets to every record and reset runtime values.
fn layout(config: &IpduMConfig<'_>, g: &mut General<'_>) {
    for state in g.tx_lo.iter_mut() {
        *state = TxLoState::INIT;
    }

    for (pathway, state) in config.mux_tx_pathways.iter().zip(g.mux_tx.iter_mut()) {
        *state = MuxTxState {
            active_dynamic: pathway.initial_dynamic_part,
            buffer_start: 0,
            jit_start: pathway.length as u32,
        };
    }

    let mut instance_offset = 0usize;
    let mut id_offset = 0usize;
    let mut queue_offset = 0usize;
    let mut entry_offset = 0usize;
    for (index, (container, state)) in config
        .container_tx
        .iter()
        .zip(g.container_tx.iter_mut())
        .enumerate()
    {
        let slot = container_slot_len(container.length, container.meta_data_size);
        let ids = id_capacity(config, index);
        *state = ContainerTxState {
            id_capacity: ids as u16,
            ..ContainerTxState::INIT
        };

        match container.collection {
            Collection::Queued { depth } => {
                let instances = depth as usize + 1;
                state.queue = RingIndex::new(instance_offset, instances as u16, depth as u16);
                let records = g
                    .queue_instances
                    .iter_mut()
                    .skip(instance_offset)
                    .take(instances);
                for (k, instance) in records.enumerate() {
                    *instance = QueueInstance {
                        bytes_start: (k * slot) as u32,
                        fill: 0,
                        ids_start: (id_offset + k * ids) as u32,
                        id_count: 0,
                    };
                }
                instance_offset += instances;
                id_offset += instances * ids;
            }
            Collection::LastIsBest { queue_depths } => {
                state.bytes_start = 0;
                state.request_queues_start = queue_offset as u16;
                let queues = g
                    .request_queues
                    .iter_mut()
                    .skip(queue_offset)
                    .take(queue_depths.len());
                for (queue, depth) in queues.zip(queue_depths) {
                    *queue = RequestQueueState {
                        ring: RingIndex::new(entry_offset, *depth as u16, *depth as u16),
                        restore: None,
                    };
                    entry_offset += *depth as usize;
                }
                queue_offset += queue_depths.len();
            }
        }

        let conf = conf_capacity(config, index) as u16;
        state.conf = RingIndex::new(id_offset, conf, conf);
        id_offset += conf as usize;
    }

    for (pathway, state) in config.mux_rx_pathways.iter().zip(g.mux_rx.iter_mut()) {
        *state = MuxRxState {
            scratch_start: 0,
            out_start: pathway.buffer_length as u32,
        };
    }

    let mut length_offset = 0usize;
    for (container, state) in config.container_rx.iter().zip(g.container_rx.iter_mut()) {
        let slot = container_slot_len(container.length, container.meta_data_size) as u32;
        *state = ContainerRxState {
            scratch_start: 0,
            meta_start: slot,
            slots_start: 2 * slot,
            ..ContainerRxState::INIT
        };
        if let RxProcessing::Deferred { queue_depth } = container.processing {
            let depth = queue_depth as u16;
            state.queue = RingIndex::new(length_offset, depth, depth);
            length_offset += queue_depth as usize;
        }
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
