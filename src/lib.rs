//! `korri-ipdum` library: PDU multiplexer (IpduM) of an automotive
//! communication stack in a `no_std` environment. The crate maps upper-layer
//! PDUs onto multiplexed and container PDUs exchanged with the bus
//! interfaces, and back.
//!
//! The configuration is a set of static descriptor tables ([`IpduMConfig`]),
//! all runtime state lives in caller-provided RAM ([`IpduMRam`]), and the
//! neighbours are reached through the [`PduRouter`] and [`DiagnosticSink`]
//! traits.
#![no_std]
//==================================================================================
/// Configuration data contract: descriptors, routing tables and transport types.
pub mod core;
/// Development, runtime and configuration errors.
pub mod error;
/// Bit segment copy, header codec, ring queues, RAM layout and configuration checks.
pub mod infra;
/// Multiplexer instance and its public API.
pub mod ipdum;
/// Multiplexing, containers, Tx confirmation and collaborator traits.
pub mod protocol;
//==================================================================================
pub use crate::core::{IpduMConfig, PduId, PduInfo, TxResult};
pub use crate::error::{ConfigError, DevError, PduError, RuntimeError, ServiceId};
pub use crate::infra::ram::{ByteRegion, IpduMRam, RamRequirements};
pub use crate::ipdum::{IpduM, VersionInfo, IPDUM_MODULE_ID, IPDUM_VENDOR_ID};
pub use crate::protocol::traits::diagnostics::{DiagnosticSink, NoDiagnostics};
pub use crate::protocol::traits::main_function_timer::MainFunctionTimer;
pub use crate::protocol::traits::pdu_router::{PduRouter, TransmitRejected};
