//! User-facing messages for every error the controller surfaces.

use crate::error::ErrorKind;
use megascan_engine::error::ErrorKind as EngineErrorKind;
use megascan_factory::error::ErrorKind as FactoryErrorKind;

pub const PERMISSION_DENIED: &str =
    "Camera permission denied. Allow camera access in your browser settings and reload the page.";
pub const NO_CAMERA_FOUND: &str = "No camera was found on this device.";
pub const CAMERA_IN_USE: &str = "The camera is being used by another application.";
pub const UNSUPPORTED_CONSTRAINTS: &str = "The camera cannot satisfy the requested settings.";
pub const LIBRARY_LOAD_FAILED: &str = "The scanner could not be loaded. An ad blocker or network restrictions may be \
                                       blocking it; disable your ad blocker and reload the page.";
pub const DESKTOP_NO_CAMERA: &str =
    "No camera was detected on this computer. Connect a camera or scan from a mobile device.";
pub const HTTPS_REQUIRED: &str = "HTTPS is required for camera access on mobile devices.";
pub const CAMERA_UNSUPPORTED: &str = "This browser does not support camera access.";
pub const ALL_ENGINES_EXHAUSTED: &str =
    "No scanner could be started on this device. You can still enter the code manually.";

/// Map an error to the message shown to the user.
pub fn user_message(error: &ErrorKind) -> String {
    let fixed = match error {
        ErrorKind::HttpsRequired => Some(HTTPS_REQUIRED),
        ErrorKind::CameraUnsupported => Some(CAMERA_UNSUPPORTED),
        ErrorKind::DesktopNoCamera => Some(DESKTOP_NO_CAMERA),
        ErrorKind::Engine(kind) | ErrorKind::Factory(FactoryErrorKind::Engine(kind)) => engine_message(kind),
        ErrorKind::Factory(FactoryErrorKind::AllEnginesExhausted { .. }) => Some(ALL_ENGINES_EXHAUSTED),
        ErrorKind::Factory(_) => None,
    };
    match fixed {
        Some(message) => message.to_string(),
        None => format!("Unexpected error: {error}"),
    }
}

fn engine_message(kind: &EngineErrorKind) -> Option<&'static str> {
    match kind {
        EngineErrorKind::PermissionDenied => Some(PERMISSION_DENIED),
        EngineErrorKind::NoCameraFound => Some(NO_CAMERA_FOUND),
        EngineErrorKind::CameraInUse => Some(CAMERA_IN_USE),
        EngineErrorKind::UnsupportedConstraints => Some(UNSUPPORTED_CONSTRAINTS),
        EngineErrorKind::LibraryLoadFailed(_) => Some(LIBRARY_LOAD_FAILED),
        _ => None,
    }
}
