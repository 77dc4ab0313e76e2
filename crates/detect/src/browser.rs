use derive_more::Display;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

regex!(EDGE_REGEX, r"Edge?/(\d+)");
regex!(CHROME_REGEX, r"Chrome/(\d+)");
regex!(FIREFOX_REGEX, r"Firefox/(\d+)");
regex!(SAFARI_REGEX, r"Version/(\d+)");
regex!(MOBILE_REGEX, r"(?i)Mobi|Android");

#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserFamily {
    #[display("Chrome")]
    Chrome,
    #[display("Edge")]
    Edge,
    #[display("Firefox")]
    Firefox,
    #[display("Safari")]
    Safari,
    #[default]
    #[display("Unknown")]
    Unknown,
}

/// Browser identification from the user agent string, for analytics only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserInfo {
    pub family: BrowserFamily,
    /// Major version, when the user agent carries one.
    pub version: Option<u32>,
    pub mobile: bool,
}

impl BrowserInfo {
    pub fn from_user_agent(user_agent: &str) -> Self {
        // Order matters: Edge claims to be Chrome, and Chrome claims to be Safari.
        let (family, regex) = if EDGE_REGEX.is_match(user_agent) {
            (BrowserFamily::Edge, &*EDGE_REGEX)
        } else if CHROME_REGEX.is_match(user_agent) {
            (BrowserFamily::Chrome, &*CHROME_REGEX)
        } else if FIREFOX_REGEX.is_match(user_agent) {
            (BrowserFamily::Firefox, &*FIREFOX_REGEX)
        } else if user_agent.contains("Safari") {
            (BrowserFamily::Safari, &*SAFARI_REGEX)
        } else {
            return Self { mobile: MOBILE_REGEX.is_match(user_agent), ..Self::default() };
        };
        let version = regex
            .captures(user_agent)
            .and_then(|captures| captures.get(1))
            .and_then(|major| major.as_str().parse().ok());
        Self { family, version, mobile: MOBILE_REGEX.is_match(user_agent) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
        BrowserFamily::Chrome,
        Some(126),
        false
    )]
    #[case(
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/126.0.0.0 Safari/537.36 Edg/126.0.2592.87",
        BrowserFamily::Edge,
        Some(126),
        false
    )]
    #[case(
        "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0",
        BrowserFamily::Firefox,
        Some(128),
        false
    )]
    #[case(
        "Mozilla/5.0 (iPhone; CPU iPhone OS 17_5 like Mac OS X) AppleWebKit/605.1.15 Version/17.5 Mobile/15E148 Safari/604.1",
        BrowserFamily::Safari,
        Some(17),
        true
    )]
    #[case("curl/8.5.0", BrowserFamily::Unknown, None, false)]
    fn parses_user_agents(
        #[case] user_agent: &str,
        #[case] family: BrowserFamily,
        #[case] version: Option<u32>,
        #[case] mobile: bool,
    ) {
        assert_eq!(BrowserInfo::from_user_agent(user_agent), BrowserInfo { family, version, mobile });
    }
}
