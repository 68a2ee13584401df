//! Low-level building blocks of the multiplexer: bit segment copy, contained
//! PDU header codec, fixed-capacity ring queues, configuration validation and
//! RAM layout.
pub mod codec;
pub mod config;
pub mod ram;
pub mod ring;
