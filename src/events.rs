use crate::error::ErrorKind;
use megascan_engine::ScanResult;
use megascan_engine::host::PermissionState;

/// Receives controller notifications. Every method defaults to a no-op, so
/// implementors only override what they render.
pub trait ScannerEvents: Send + Sync {
    fn on_scan_success(&self, _result: &ScanResult) {}

    /// `message` is the user-facing text for `error`.
    fn on_scan_error(&self, _error: &ErrorKind, _message: &str) {}

    fn on_permission_change(&self, _state: PermissionState) {}

    fn on_status_update(&self, _message: &str) {}
}

impl ScannerEvents for () {}
