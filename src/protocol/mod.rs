//! Multiplexer logic: multiplexed pathways, container PDUs, Tx confirmation
//! supervision, collaborator traits and the async main-function driver.
pub mod container;
pub mod mux;
pub mod runner;
pub mod traits;
pub mod tx_confirmation;
