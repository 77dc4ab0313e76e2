//! Best-effort device classification from platform hints.
//!
//! Touch laptops and convertibles can be misclassified either way; callers
//! use the result only to pick a friendlier error, never to refuse access.

use derive_more::Display;
use megascan_engine::host::Platform;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

regex!(MOBILE_REGEX, r"(?i)android|webos|iphone|ipad|ipod|blackberry|iemobile|opera mini");
regex!(DESKTOP_PLATFORM_REGEX, r"(?i)win|mac|linux");

/// Screens wider than this are not considered tablets.
const TABLET_MAX_WIDTH: u32 = 1024;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    #[display("mobile")]
    Mobile,
    #[display("desktop")]
    Desktop,
    /// Neither hint is conclusive, e.g. a touch device on a desktop platform.
    #[display("unknown")]
    Unknown,
}

impl DeviceClass {
    pub fn detect(platform: &dyn Platform) -> Self {
        Self::classify(
            &platform.user_agent(),
            &platform.platform(),
            platform.max_touch_points(),
            platform.screen_width(),
        )
    }

    pub fn classify(user_agent: &str, platform: &str, touch_points: u32, screen_width: u32) -> Self {
        if MOBILE_REGEX.is_match(user_agent) {
            Self::Mobile
        } else if DESKTOP_PLATFORM_REGEX.is_match(platform) && (touch_points == 0 || screen_width > TABLET_MAX_WIDTH) {
            Self::Desktop
        } else {
            Self::Unknown
        }
    }

    pub fn is_desktop(&self) -> bool {
        *self == Self::Desktop
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use megascan_engine::mock::MockPlatform;
    use rstest::rstest;

    const WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/126.0 Safari/537.36";
    const IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_5 like Mac OS X) AppleWebKit/605.1.15 Mobile/15E148";
    const IPADOS: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 Version/17.5 Safari";

    #[rstest]
    #[case(WINDOWS, "Win32", 0, 1920, DeviceClass::Desktop)]
    #[case(WINDOWS, "Win32", 10, 2560, DeviceClass::Desktop)]
    #[case(IPHONE, "iPhone", 5, 390, DeviceClass::Mobile)]
    #[case(IPADOS, "MacIntel", 5, 1024, DeviceClass::Unknown)]
    #[case("Mozilla/5.0 (X11; CrOS x86_64)", "CrOS", 0, 1366, DeviceClass::Unknown)]
    fn classification(
        #[case] user_agent: &str,
        #[case] platform: &str,
        #[case] touch_points: u32,
        #[case] screen_width: u32,
        #[case] expected: DeviceClass,
    ) {
        assert_eq!(DeviceClass::classify(user_agent, platform, touch_points, screen_width), expected);
    }

    #[test]
    fn detect_reads_the_platform() {
        let platform = MockPlatform::default();
        assert_eq!(DeviceClass::detect(&platform), DeviceClass::Desktop);
        platform.set_mobile();
        assert_eq!(DeviceClass::detect(&platform), DeviceClass::Mobile);
    }
}
