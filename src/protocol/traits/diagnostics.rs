//! Sink of development and runtime errors.
use crate::error::{DevError, RuntimeError, ServiceId};

/// Receives every error the multiplexer reports.
pub trait DiagnosticSink {
    /// API misuse detected by a development check.
    fn report_development_error(&self, service: ServiceId, error: DevError);
    /// Degraded operation (overflow, truncation, malformed data).
    fn report_runtime_error(&self, service: ServiceId, error: RuntimeError);
}

/// Sink discarding every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDiagnostics;

impl DiagnosticSink for NoDiagnostics {
    fn report_development_error(&self, _service: ServiceId, _error: DevError) {}

    fn report_runtime_error(&self, _service: ServiceId, _error: RuntimeError) {}
}
