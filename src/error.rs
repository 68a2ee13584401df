//! Error definitions shared across library modules.
//! Development errors flag misuse of the API, runtime errors flag degraded
//! but recovered operation, configuration errors are raised once at
//! construction time.
use thiserror_no_std::Error;

//==================================================================================SERVICE_IDS
/// Entry point that reported an error to the diagnostic sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ServiceId {
    Init = 0x00,
    GetVersionInfo = 0x01,
    MainFunctionRx = 0x11,
    MainFunctionTx = 0x12,
    TxConfirmation = 0x40,
    TriggerTransmit = 0x41,
    RxIndication = 0x42,
    Transmit = 0x49,
}

//==================================================================================DEV_ERRORS
/// Errors reported when development error detection is enabled.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DevError {
    /// Handle out of range or length not matching the configuration.
    #[error("IPDUM_E_PARAM: invalid parameter")]
    Param,
    /// Mandatory data buffer missing.
    #[error("IPDUM_E_PARAM_POINTER: missing data buffer")]
    ParamPointer,
    /// API called before `init`.
    #[error("IPDUM_E_UNINIT: module not initialized")]
    Uninit,
    /// Initialization rejected the configuration.
    #[error("IPDUM_E_INIT_FAILED: invalid configuration")]
    InitFailed,
}

impl DevError {
    /// Numeric code as reported to the diagnostic sink.
    pub const fn code(self) -> u8 {
        match self {
            DevError::Param => 0x10,
            DevError::ParamPointer => 0x11,
            DevError::Uninit => 0x20,
            DevError::InitFailed => 0x30,
        }
    }
}

//==================================================================================RUNTIME_ERRORS
/// Errors always reported; the operation degrades instead of failing.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RuntimeError {
    /// A queue was full; the oldest entry was evicted or the request dropped.
    #[error("IPDUM_E_QUEUEOVFL: queue overflow")]
    QueueOverflow,
    /// A contained PDU header announced more bytes than the container holds.
    #[error("IPDUM_E_HEADER: malformed contained PDU header")]
    Header,
    /// A received PDU was longer than its buffer and was truncated.
    #[error("IPDUM_E_RXPDU_TRUNCATED: received PDU truncated")]
    RxPduTruncated,
    /// A bit segment did not fit into the source or destination buffer.
    #[error("IPDUM_E_SEGMENT: bit segment out of buffer bounds")]
    Segment,
    /// The buffers of the addressed handle were in use by an interrupted or
    /// re-entrant call; the request was dropped.
    #[error("IPDUM_E_BUSY: handle buffers in use, request dropped")]
    Busy,
}

impl RuntimeError {
    /// Numeric code as reported to the diagnostic sink.
    pub const fn code(self) -> u8 {
        match self {
            RuntimeError::QueueOverflow => 0x50,
            RuntimeError::Header => 0x51,
            RuntimeError::RxPduTruncated => 0x52,
            RuntimeError::Segment => 0x53,
            RuntimeError::Busy => 0x54,
        }
    }
}

//==================================================================================API_RESULT
/// Failure returned by the public entry points.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PduError {
    /// Call rejected by a development check (already reported to the sink).
    #[error("development error: {0}")]
    Development(DevError),
    /// Request could not be served (no data, transmission rejected or blocked).
    #[error("request not accepted")]
    NotOk,
}

impl From<DevError> for PduError {
    fn from(err: DevError) -> Self {
        PduError::Development(err)
    }
}

//==================================================================================INFRA_ERRORS
/// Failures of the bit segment copy primitive.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BitSegmentError {
    /// The segment ends past the end of one of the buffers.
    #[error("Segment out of bounds -> needed bytes: {needed}, available: {available}")]
    OutOfBounds { needed: usize, available: usize },
}

/// Failures of ring queue operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QueueError {
    /// Write attempted on a full queue.
    #[error("Queue full")]
    Full,
    /// Read attempted on an empty queue.
    #[error("Queue empty")]
    Empty,
}

//==================================================================================CONFIG_ERRORS
/// Inconsistencies detected while validating a configuration against itself
/// and against the RAM handed to the module.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// A table entry references an index outside the referenced table.
    #[error("Dangling reference in {table}[{index}]")]
    DanglingReference { table: &'static str, index: usize },
    /// Two tables disagree about a relationship (e.g. Tx-Lo target vs pathway).
    #[error("Inconsistent back-reference in {table}[{index}]")]
    BackReference { table: &'static str, index: usize },
    /// A contained PDU (header + DLC, or offset + length) exceeds its container.
    #[error("Contained PDU {index} does not fit into its container")]
    ContainedTooLarge { index: usize },
    /// An update bit lies outside the container payload.
    #[error("Update bit of contained PDU {index} outside of the container")]
    UpdateBitOutOfRange { index: usize },
    /// Header identifier 0 is reserved as end-of-container marker.
    #[error("Contained PDU {index} uses the reserved header id 0")]
    ReservedHeaderId { index: usize },
    /// Header identifier or DLC does not fit the configured header size.
    #[error("Contained PDU {index} does not fit the header format")]
    HeaderRange { index: usize },
    /// Queue depth outside of 1..=254.
    #[error("Invalid queue depth {depth} in {table}[{index}]")]
    QueueDepth { table: &'static str, index: usize, depth: u8 },
    /// A bit segment or selector lies outside of the pathway buffer.
    #[error("Segment or selector outside of pathway {index}")]
    SegmentOutOfRange { index: usize },
    /// Partition index not below `partition_count`.
    #[error("Partition out of range in {table}[{index}]")]
    Partition { table: &'static str, index: usize },
    /// One of the RAM slices is shorter than required.
    #[error("RAM table {table} too small: required {required}, provided {provided}")]
    RamTooSmall { table: &'static str, required: usize, provided: usize },
}
