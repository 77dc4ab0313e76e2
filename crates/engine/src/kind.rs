use crate::error::{Error, ErrorKind};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Identifies one of the interchangeable scanning backends.
///
/// The derived ordering is the fallback priority: an engine is only ever
/// replaced by one that sorts after it.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Browser-provided barcode detection API.
    #[display("native")]
    Native,
    /// WebAssembly-compiled decoder library.
    #[display("wasm")]
    Wasm,
    /// Pure-script decoder library. Always considered available.
    #[display("script")]
    #[serde(alias = "javascript")]
    Script,
}

impl EngineKind {
    /// Every engine, in priority order.
    pub const ALL: [EngineKind; 3] = [Self::Native, Self::Wasm, Self::Script];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Wasm => "wasm",
            Self::Script => "script",
        }
    }

    /// Human-readable name of the backend.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Native => "Native BarcodeDetector",
            Self::Wasm => "ZXing (WebAssembly)",
            Self::Script => "html5-qrcode (JavaScript)",
        }
    }

    /// Zero-based position in the fallback priority.
    pub fn priority(&self) -> usize {
        *self as usize
    }

    /// Engines strictly after this one, in priority order.
    pub fn successors(&self) -> impl Iterator<Item = EngineKind> + use<> {
        let me = *self;
        Self::ALL.into_iter().filter(move |kind| *kind > me)
    }
}

impl FromStr for EngineKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" => Ok(Self::Native),
            "wasm" => Ok(Self::Wasm),
            // Older persisted preferences used the language name.
            "script" | "javascript" => Ok(Self::Script),
            _ => exn::bail!(ErrorKind::UnknownEngine(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("native", EngineKind::Native)]
    #[case("wasm", EngineKind::Wasm)]
    #[case("script", EngineKind::Script)]
    #[case("javascript", EngineKind::Script)]
    #[case(" WASM ", EngineKind::Wasm)]
    fn parse_engine_kind(#[case] input: &str, #[case] expected: EngineKind) {
        assert_eq!(input.parse::<EngineKind>().unwrap(), expected);
    }

    #[test]
    fn parse_unknown_engine() {
        let err = "quagga".parse::<EngineKind>().unwrap_err();
        assert_eq!(*err, ErrorKind::UnknownEngine("quagga".to_string()));
    }

    #[test]
    fn display_round_trips_through_parse() {
        for kind in EngineKind::ALL {
            assert_eq!(kind.to_string().parse::<EngineKind>().unwrap(), kind);
        }
    }

    #[rstest]
    #[case(EngineKind::Native, vec![EngineKind::Wasm, EngineKind::Script])]
    #[case(EngineKind::Wasm, vec![EngineKind::Script])]
    #[case(EngineKind::Script, vec![])]
    fn successors_are_strictly_later(#[case] kind: EngineKind, #[case] expected: Vec<EngineKind>) {
        assert_eq!(kind.successors().collect::<Vec<_>>(), expected);
    }
}
