mod browser;
mod detector;
mod report;

pub use crate::browser::{BrowserFamily, BrowserInfo};
pub use crate::detector::CapabilityDetector;
pub use crate::report::{CameraInfo, CapabilityReport, Hardware, NativeSupport, PerformanceTier};
