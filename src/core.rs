//! Defines the "data contract" between the configuration generator and the
//! multiplexer engine.
//!
//! The generator produces static descriptor tables implementing this
//! contract. Every relationship is expressed by a dense `u16` index into
//! another table of [`IpduMConfig`], validated once at construction time.
use core::ops::Range;

/// Handle of a PDU as known by the router (upper or lower side).
pub type PduId = u16;

//==================================================================================Transport types

/// Data handed over with a transmit request.
///
/// `sdu == None` is an informative transmission: the receiver pulls the
/// `length` bytes later through trigger transmit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PduInfo<'a> {
    /// Payload (including trailing meta data, if any).
    pub sdu: Option<&'a [u8]>,
    /// Announced length in bytes.
    pub length: usize,
}

impl<'a> PduInfo<'a> {
    /// Data-carrying transmission.
    pub const fn with_data(sdu: &'a [u8]) -> Self {
        Self {
            sdu: Some(sdu),
            length: sdu.len(),
        }
    }

    /// Data-less transmission announcing `length` bytes.
    pub const fn announce(length: usize) -> Self {
        Self { sdu: None, length }
    }
}

/// Outcome of a transmission, as forwarded with confirmations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxResult {
    Ok,
    NotOk,
}

/// Byte order of contained PDU headers and bit layout of multiplexed segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ByteOrder {
    /// Motorola layout.
    BigEndian,
    /// Intel layout.
    LittleEndian,
}

//==================================================================================Multiplexer descriptors

/// Bit range of a multiplexed PDU. Source and destination share the position.
///
/// For little-endian layout, `start_bit` is the least significant bit and the
/// range grows toward higher bit numbers. For big-endian layout, `start_bit` is
/// the most significant bit and the range continues at bit 7 of the next byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start_bit: u16,
    pub length_bits: u16,
}

/// One byte of a selector field: `buffer[byte_position] & mask == value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectorPattern {
    pub byte_position: u16,
    pub mask: u8,
    pub value: u8,
}

/// Role of a multiplexed part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PartKind {
    Static,
    Dynamic,
}

/// Static or dynamic part of a multiplexed Tx pathway.
#[derive(Debug, Clone)]
pub struct MuxTxPart<'a> {
    /// Owning pathway.
    pub pathway: u16,
    pub kind: PartKind,
    /// Upper layer handle used for JIT trigger transmit and confirmation.
    pub upper_pdu: PduId,
    /// Exact length expected from `transmit`.
    pub length: u16,
    pub segments: &'a [Segment],
    /// Selector stamped into the buffer when a dynamic part is written.
    pub selector: &'a [SelectorPattern],
    /// Writing this part triggers a transmission of the pathway.
    pub trigger: bool,
    /// Refresh this part via trigger transmit right before it leaves.
    pub jit_update: bool,
    /// Forward Tx confirmations to the upper layer.
    pub confirmation: bool,
}

/// Multiplexed Tx pathway: one shared buffer composed of parts.
#[derive(Debug, Clone)]
pub struct MuxTxPathway {
    pub tx_lo: u16,
    pub length: u16,
    pub byte_order: ByteOrder,
    /// Filler written to bits not covered by the static or active dynamic part.
    pub padding: u8,
    pub static_part: Option<u16>,
    pub dynamic_parts: Range<u16>,
    pub initial_dynamic_part: Option<u16>,
}

/// Static or dynamic part of a multiplexed Rx pathway.
#[derive(Debug, Clone)]
pub struct MuxRxPart<'a> {
    pub upper_pdu: PduId,
    pub min_dlc: u16,
    /// All patterns must match for the part to be selected (empty for static parts).
    pub selector: &'a [SelectorPattern],
    pub segments: &'a [Segment],
}

/// Multiplexed Rx pathway.
#[derive(Debug, Clone)]
pub struct MuxRxPathway<'a> {
    pub buffer_length: u16,
    pub byte_order: ByteOrder,
    pub static_part: Option<MuxRxPart<'a>>,
    /// Scanned in order; the first match wins.
    pub dynamic_parts: &'a [MuxRxPart<'a>],
}

//==================================================================================Container descriptors

/// Size of the header preceding every contained PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HeaderSize {
    /// Static layout: contained PDUs live at fixed offsets.
    None,
    /// 3-byte id + 1-byte DLC.
    Short,
    /// 4-byte id + 4-byte DLC.
    Long,
}

impl HeaderSize {
    /// Header length in bytes.
    pub const fn bytes(self) -> usize {
        match self {
            HeaderSize::None => 0,
            HeaderSize::Short => 4,
            HeaderSize::Long => 8,
        }
    }

    /// Whether contained PDUs are prefixed by a header.
    pub const fn is_dynamic(self) -> bool {
        !matches!(self, HeaderSize::None)
    }
}

/// How a container obtains the data of its contained PDUs when sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataProvision {
    /// Data is handed down with `transmit`.
    Direct,
    /// An informative transmit is sent; the lower layer pulls with trigger transmit.
    TriggerTransmit,
}

/// Collection semantics of a Tx container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection<'a> {
    /// Contained PDUs are copied in on `transmit`; closed instances queue up.
    Queued { depth: u8 },
    /// Only requests are recorded; data is fetched when the container is built.
    /// One request queue per priority, index 0 is the highest priority.
    LastIsBest { queue_depths: &'a [u8] },
}

/// Tx container PDU.
#[derive(Debug, Clone)]
pub struct ContainerTxPdu<'a> {
    pub tx_lo: u16,
    /// Payload length in bytes (meta data excluded).
    pub length: u16,
    pub header: HeaderSize,
    pub meta_data_size: u8,
    /// Trigger once the accumulated length exceeds this value.
    pub size_threshold: Option<u16>,
    /// Ticks before a partially filled container is sent (0 = none).
    pub send_timeout: u16,
    pub first_contained_trigger: bool,
    pub provision: DataProvision,
    pub collection: Collection<'a>,
    pub contained: Range<u16>,
    pub partition: u8,
    /// Value of bytes not written by any contained PDU (static layout).
    pub unused_byte: u8,
}

/// Tx contained PDU.
#[derive(Debug, Clone)]
pub struct ContainedTxPdu {
    pub container: u16,
    pub header_id: u32,
    /// Maximum DLC.
    pub length: u16,
    pub upper_pdu: PduId,
    /// Static layout only.
    pub offset: u16,
    /// Static layout only: absolute bit position inside the container.
    pub update_bit: Option<u16>,
    /// Ticks before the container must be sent once this PDU is added (0 = none).
    pub send_timeout: u16,
    /// Adding this PDU triggers the container.
    pub trigger: bool,
    pub confirmation: bool,
    /// Last-is-best request queue index.
    pub priority: u8,
}

/// When received containers are unpacked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxProcessing {
    Immediate,
    Deferred { queue_depth: u8 },
}

/// Rx container PDU.
#[derive(Debug, Clone)]
pub struct ContainerRxPdu {
    /// Payload length in bytes (meta data excluded).
    pub length: u16,
    pub header: HeaderSize,
    pub meta_data_size: u8,
    /// Forward contained PDUs configured for other containers as well.
    pub accept_all: bool,
    pub processing: RxProcessing,
    pub contained: Range<u16>,
    pub partition: u8,
}

/// Rx contained PDU.
#[derive(Debug, Clone)]
pub struct ContainedRxPdu {
    pub container: u16,
    pub header_id: u32,
    pub upper_pdu: PduId,
    /// Static layout only.
    pub offset: u16,
    /// Static layout only.
    pub length: u16,
    /// Static layout only.
    pub update_bit: Option<u16>,
}

//==================================================================================Routing tables

/// Target of an upper-layer transmit handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxUpTarget {
    MuxPart(u16),
    Contained(u16),
}

/// Target of a lower-layer Tx handle (trigger transmit and confirmation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxLoTarget {
    Pathway(u16),
    Container(u16),
}

/// Target of a lower-layer Rx handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxLoTarget {
    Pathway(u16),
    Container(u16),
}

/// Lower-layer Tx PDU.
#[derive(Debug, Clone)]
pub struct TxLoInfo {
    /// Handle used with the router's `transmit`.
    pub lower_pdu: PduId,
    /// Ticks to wait for a confirmation (0 = no supervision).
    pub confirmation_timeout: u16,
    pub target: TxLoTarget,
    pub partition: u8,
}

//==================================================================================Root

/// Complete module configuration.
#[derive(Debug, Clone)]
pub struct IpduMConfig<'a> {
    pub dev_error_detect: bool,
    pub header_byte_order: ByteOrder,
    pub partition_count: u8,
    pub tx_up: &'a [TxUpTarget],
    pub tx_lo: &'a [TxLoInfo],
    pub rx_lo: &'a [RxLoTarget],
    pub mux_tx_pathways: &'a [MuxTxPathway],
    pub mux_tx_parts: &'a [MuxTxPart<'a>],
    pub mux_rx_pathways: &'a [MuxRxPathway<'a>],
    pub container_tx: &'a [ContainerTxPdu<'a>],
    pub contained_tx: &'a [ContainedTxPdu],
    pub container_rx: &'a [ContainerRxPdu],
    pub contained_rx: &'a [ContainedRxPdu],
}

impl IpduMConfig<'static> {
    /// Configuration without any PDU; base for struct update syntax.
    pub const EMPTY: IpduMConfig<'static> = IpduMConfig {
        dev_error_detect: true,
        header_byte_order: ByteOrder::BigEndian,
        partition_count: 1,
        tx_up: &[],
        tx_lo: &[],
        rx_lo: &[],
        mux_tx_pathways: &[],
        mux_tx_parts: &[],
        mux_rx_pathways: &[],
        container_tx: &[],
        contained_tx: &[],
        container_rx: &[],
        contained_rx: &[],
    };
}
