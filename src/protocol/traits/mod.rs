//! Abstraction traits for the collaborators of the multiplexer (PDU router,
//! diagnostic sink and main-function timer).
pub mod diagnostics;
pub mod main_function_timer;
pub mod pdu_router;
