//! RAM tables of the multiplexer.
//!
//! All runtime state lives in slices handed over by the integrator. The size
//! of every slice is a pure function of the configuration, computed by
//! [`RamRequirements::of`] which is `const` so `static` arrays can be sized at
//! compile time:
//!
//! ```rust,ignore
//! const CONFIG: IpduMConfig<'static> = IpduMConfig { /* generated */ };
//! const RAM: RamRequirements = RamRequirements::of(&CONFIG);
//! static TX_BYTES: StaticCell<[u8; RAM.tx_bytes]> = StaticCell::new();
//! ```
//!
//! The Tx and Rx byte pools are split at construction into one
//! [`ByteRegion`] per pathway and per container, so calls on different
//! handles never exclude each other. Records store offsets relative to the
//! region of their handle; offsets are assigned by `IpduM::init` and stay
//! fixed until the next initialization.
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;

use crate::core::{Collection, IpduMConfig, RxProcessing};
use crate::error::ConfigError;
use crate::infra::ring::{RestorePoint, RingIndex};
use crate::protocol::container::tx::send_timeout::SendTimeout;

//==================================================================================RECORDS

/// Confirmation supervision of a lower-layer Tx PDU.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxLoState {
    /// Remaining ticks until a missing confirmation is reported (0 = idle).
    pub(crate) timeout: u16,
}

impl TxLoState {
    pub const INIT: Self = Self { timeout: 0 };
}

/// Multiplexed Tx pathway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MuxTxState {
    pub(crate) active_dynamic: Option<u16>,
    /// Shared Tx buffer in the Tx byte pool.
    pub(crate) buffer_start: u32,
    /// Scratch receiving just-in-time updates.
    pub(crate) jit_start: u32,
}

impl MuxTxState {
    pub const INIT: Self = Self {
        active_dynamic: None,
        buffer_start: 0,
        jit_start: 0,
    };
}

/// Multiplexed Rx pathway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MuxRxState {
    /// Copy of the received PDU.
    pub(crate) scratch_start: u32,
    /// PDU assembled for the upper layer.
    pub(crate) out_start: u32,
}

impl MuxRxState {
    pub const INIT: Self = Self {
        scratch_start: 0,
        out_start: 0,
    };
}

/// Tx container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerTxState {
    pub(crate) send_timeout: SendTimeout,
    /// Queued collection: closed instances over the instance pool. The
    /// current (open) instance sits at the write position.
    pub(crate) queue: RingIndex,
    /// Last-is-best collection: buffer in the Tx byte pool.
    pub(crate) bytes_start: u32,
    /// Last-is-best collection: first request queue of this container.
    pub(crate) request_queues_start: u16,
    /// Last-is-best collection: bytes announced by pending requests.
    pub(crate) pending_length: u32,
    /// Last-is-best collection: a trigger condition fired.
    pub(crate) transmission_requested: bool,
    /// Contained PDUs of the transmissions awaiting confirmation, one group
    /// per transmission.
    pub(crate) conf: RingIndex,
    /// Entries of the newest confirmation group.
    pub(crate) conf_group: u16,
    /// Capacity of one contained-id list.
    pub(crate) id_capacity: u16,
}

impl ContainerTxState {
    pub const INIT: Self = Self {
        send_timeout: SendTimeout::STOPPED,
        queue: RingIndex::new(0, 0, 0),
        bytes_start: 0,
        request_queues_start: 0,
        pending_length: 0,
        transmission_requested: false,
        conf: RingIndex::new(0, 0, 0),
        conf_group: 0,
        id_capacity: 0,
    };
}

/// One slot of container content of a queued collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueInstance {
    pub(crate) bytes_start: u32,
    /// Written bytes (payload, meta data excluded).
    pub(crate) fill: u16,
    /// Contained ids written into this instance.
    pub(crate) ids_start: u32,
    pub(crate) id_count: u16,
}

impl QueueInstance {
    pub const INIT: Self = Self {
        bytes_start: 0,
        fill: 0,
        ids_start: 0,
        id_count: 0,
    };
}

/// Priority queue of last-is-best requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestQueueState {
    pub(crate) ring: RingIndex,
    /// Read position before the last fill, kept until the transmission result is known.
    pub(crate) restore: Option<RestorePoint>,
}

impl RequestQueueState {
    pub const INIT: Self = Self {
        ring: RingIndex::new(0, 0, 0),
        restore: None,
    };
}

/// Pending last-is-best request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestEntry {
    pub(crate) contained: u16,
    /// Announced length.
    pub(crate) dlc: u16,
}

impl RequestEntry {
    pub const INIT: Self = Self {
        contained: 0,
        dlc: 0,
    };
}

/// Rx container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerRxState {
    /// Deferred processing: ring over the Rx length pool.
    pub(crate) queue: RingIndex,
    /// Deferred processing: first slot in the Rx byte pool.
    pub(crate) slots_start: u32,
    /// Container being unpacked.
    pub(crate) scratch_start: u32,
    /// Contained PDU with re-attached meta data.
    pub(crate) meta_start: u32,
}

impl ContainerRxState {
    pub const INIT: Self = Self {
        queue: RingIndex::new(0, 0, 0),
        slots_start: 0,
        scratch_start: 0,
        meta_start: 0,
    };
}

//==================================================================================BYTE_REGIONS

/// Bytes of one pathway or container.
///
/// Guarded by a non-blocking async mutex: a call finding the region taken
/// gives up instead of waiting, and holding it keeps no critical section
/// open while the router is called.
pub struct ByteRegion<'a, M: RawMutex> {
    bytes: Mutex<M, &'a mut [u8]>,
}

impl<'a, M: RawMutex> ByteRegion<'a, M> {
    /// Empty region, bound to its bytes by `IpduM::new`.
    ///
    /// Static tables can be built with `core::array::from_fn(|_| ByteRegion::new())`.
    pub fn new() -> Self {
        Self {
            bytes: Mutex::new(Default::default()),
        }
    }

    fn bind(&mut self, bytes: &'a mut [u8]) {
        self.bytes = Mutex::new(bytes);
    }

    /// Run `f` on the bytes; `None` if the region is in use.
    pub(crate) fn try_with<T>(&self, f: impl FnOnce(&mut [u8]) -> T) -> Option<T> {
        let mut bytes = self.bytes.try_lock().ok()?;
        Some(f(&mut bytes))
    }
}

impl<M: RawMutex> Default for ByteRegion<'_, M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Split `pool` over `regions`, region `k` receiving `len_of(k)` bytes.
pub(crate) fn bind_regions<'a, M: RawMutex>(
    regions: &'a mut [ByteRegion<'a, M>],
    mut pool: &'a mut [u8],
    len_of: impl Fn(usize) -> usize,
) -> &'a [ByteRegion<'a, M>] {
    for (index, region) in regions.iter_mut().enumerate() {
        let len = len_of(index).min(pool.len());
        let (bytes, rest) = core::mem::take(&mut pool).split_at_mut(len);
        region.bind(bytes);
        pool = rest;
    }
    regions
}

//==================================================================================RAM

/// Caller-provided RAM, sized with [`RamRequirements::of`].
pub struct IpduMRam<'a, M: RawMutex> {
    pub tx_lo: &'a mut [TxLoState],
    pub mux_tx: &'a mut [MuxTxState],
    pub mux_rx: &'a mut [MuxRxState],
    pub container_tx: &'a mut [ContainerTxState],
    pub container_rx: &'a mut [ContainerRxState],
    pub queue_instances: &'a mut [QueueInstance],
    pub request_queues: &'a mut [RequestQueueState],
    pub request_entries: &'a mut [RequestEntry],
    /// Contained PDU ids of queue instances and confirmation buffers.
    pub ids: &'a mut [u16],
    /// Stored lengths of deferred Rx container slots.
    pub rx_lengths: &'a mut [u16],
    pub tx_bytes: &'a mut [u8],
    pub rx_bytes: &'a mut [u8],
    /// One region per mux Tx pathway, then one per Tx container.
    pub tx_regions: &'a mut [ByteRegion<'a, M>],
    /// One region per mux Rx pathway, then one per Rx container.
    pub rx_regions: &'a mut [ByteRegion<'a, M>],
}

/// Exact number of elements of every [`IpduMRam`] slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RamRequirements {
    pub tx_lo: usize,
    pub mux_tx: usize,
    pub mux_rx: usize,
    pub container_tx: usize,
    pub container_rx: usize,
    pub queue_instances: usize,
    pub request_queues: usize,
    pub request_entries: usize,
    pub ids: usize,
    pub rx_lengths: usize,
    pub tx_bytes: usize,
    pub rx_bytes: usize,
    pub tx_regions: usize,
    pub rx_regions: usize,
}

/// `len` bytes of a region starting at `start`.
pub(crate) fn region_mut(bytes: &mut [u8], start: u32, len: usize) -> Option<&mut [u8]> {
    let start = start as usize;
    bytes.get_mut(start..start.checked_add(len)?)
}

/// Bytes of one container instance including trailing meta data.
pub(crate) const fn container_slot_len(length: u16, meta_data_size: u8) -> usize {
    length as usize + meta_data_size as usize
}

/// Number of contained ids one instance of a Tx container can hold.
pub(crate) const fn id_capacity(config: &IpduMConfig<'_>, container: usize) -> usize {
    let pdu = &config.container_tx[container];
    let header = pdu.header.bytes();
    if header == 0 {
        pdu.contained.end.saturating_sub(pdu.contained.start) as usize
    } else {
        pdu.length as usize / header
    }
}

/// Transmissions of a Tx container that can await confirmation at once:
/// a whole FIFO plus the current instance, or one per pending request.
const fn transmissions_in_flight(config: &IpduMConfig<'_>, container: usize) -> usize {
    match config.container_tx[container].collection {
        Collection::Queued { depth } => depth as usize + 1,
        Collection::LastIsBest { queue_depths } => {
            let mut total = 0;
            let mut p = 0;
            while p < queue_depths.len() {
                total += queue_depths[p] as usize;
                p += 1;
            }
            total
        }
    }
}

/// Entries of the confirmation ring of a Tx container: every in-flight
/// transmission with its ids and a group terminator.
pub(crate) const fn conf_capacity(config: &IpduMConfig<'_>, container: usize) -> usize {
    transmissions_in_flight(config, container) * (id_capacity(config, container) + 1)
}

/// Bytes of Tx region `index` (mux pathways first, then containers).
pub(crate) const fn tx_region_len(config: &IpduMConfig<'_>, index: usize) -> usize {
    let pathways = config.mux_tx_pathways.len();
    if index < pathways {
        // shared buffer + just-in-time scratch
        return 2 * config.mux_tx_pathways[index].length as usize;
    }
    if index - pathways >= config.container_tx.len() {
        return 0;
    }
    let pdu = &config.container_tx[index - pathways];
    let slot = container_slot_len(pdu.length, pdu.meta_data_size);
    match pdu.collection {
        Collection::Queued { depth } => (depth as usize + 1) * slot,
        Collection::LastIsBest { .. } => slot,
    }
}

/// Bytes of Rx region `index` (mux pathways first, then containers).
pub(crate) const fn rx_region_len(config: &IpduMConfig<'_>, index: usize) -> usize {
    let pathways = config.mux_rx_pathways.len();
    if index < pathways {
        // received copy + assembled output
        return 2 * config.mux_rx_pathways[index].buffer_length as usize;
    }
    if index - pathways >= config.container_rx.len() {
        return 0;
    }
    let pdu = &config.container_rx[index - pathways];
    let slot = container_slot_len(pdu.length, pdu.meta_data_size);
    // unpack scratch + meta data scratch
    let scratch = 2 * slot;
    match pdu.processing {
        RxProcessing::Deferred { queue_depth } => scratch + queue_depth as usize * slot,
        RxProcessing::Immediate => scratch,
    }
}

impl RamRequirements {
    /// Sizes required by `config`.
    pub const fn of(config: &IpduMConfig<'_>) -> Self {
        let mut req = RamRequirements {
            tx_lo: config.tx_lo.len(),
            mux_tx: config.mux_tx_pathways.len(),
            mux_rx: config.mux_rx_pathways.len(),
            container_tx: config.container_tx.len(),
            container_rx: config.container_rx.len(),
            queue_instances: 0,
            request_queues: 0,
            request_entries: 0,
            ids: 0,
            rx_lengths: 0,
            tx_bytes: 0,
            rx_bytes: 0,
            tx_regions: config.mux_tx_pathways.len() + config.container_tx.len(),
            rx_regions: config.mux_rx_pathways.len() + config.container_rx.len(),
        };

        let mut i = 0;
        while i < req.tx_regions {
            req.tx_bytes += tx_region_len(config, i);
            i += 1;
        }

        i = 0;
        while i < req.rx_regions {
            req.rx_bytes += rx_region_len(config, i);
            i += 1;
        }

        i = 0;
        while i < config.container_tx.len() {
            let pdu = &config.container_tx[i];
            req.ids += conf_capacity(config, i);
            match pdu.collection {
                Collection::Queued { depth } => {
                    let instances = depth as usize + 1;
                    req.queue_instances += instances;
                    // one id list per instance
                    req.ids += instances * id_capacity(config, i);
                }
                Collection::LastIsBest { queue_depths } => {
                    req.request_queues += queue_depths.len();
                    let mut p = 0;
                    while p < queue_depths.len() {
                        req.request_entries += queue_depths[p] as usize;
                        p += 1;
                    }
                }
            }
            i += 1;
        }

        i = 0;
        while i < config.container_rx.len() {
            if let RxProcessing::Deferred { queue_depth } = config.container_rx[i].processing {
                req.rx_lengths += queue_depth as usize;
            }
            i += 1;
        }

        req
    }

    /// Check every slice of `ram` against the requirements.
    pub fn check<M: RawMutex>(&self, ram: &IpduMRam<'_, M>) -> Result<(), ConfigError> {
        let tables = [
            ("tx_lo", self.tx_lo, ram.tx_lo.len()),
            ("mux_tx", self.mux_tx, ram.mux_tx.len()),
            ("mux_rx", self.mux_rx, ram.mux_rx.len()),
            ("container_tx", self.container_tx, ram.container_tx.len()),
            ("container_rx", self.container_rx, ram.container_rx.len()),
            ("queue_instances", self.queue_instances, ram.queue_instances.len()),
            ("request_queues", self.request_queues, ram.request_queues.len()),
            ("request_entries", self.request_entries, ram.request_entries.len()),
            ("ids", self.ids, ram.ids.len()),
            ("rx_lengths", self.rx_lengths, ram.rx_lengths.len()),
            ("tx_bytes", self.tx_bytes, ram.tx_bytes.len()),
            ("rx_bytes", self.rx_bytes, ram.rx_bytes.len()),
            ("tx_regions", self.tx_regions, ram.tx_regions.len()),
            ("rx_regions", self.rx_regions, ram.rx_regions.len()),
        ];
        for (table, required, provided) in tables {
            if provided < required {
                return Err(ConfigError::RamTooSmall {
                    table,
                    required,
                    provided,
                });
            }
        }
        Ok(())
    }
}
