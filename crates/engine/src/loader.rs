//! Decoder library loading.
//!
//! Libraries are fetched from a prioritised list of CDN sources. The list is
//! first tailored to the connection and the user's approximate region
//! ([`optimize`]), then tried strictly one source at a time ([`load`]) so a
//! success is always attributable to exactly one source and slow networks
//! are never saturated by parallel fetches.

use crate::error::{ErrorKind, Result};
use crate::host::{ConnectionInfo, ConnectionQuality, ScriptHost};
use crate::settings::LibrarySettings;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::instrument;

/// CDN operator serving a source.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[display("jsDelivr")]
    Jsdelivr,
    #[display("UNPKG")]
    Unpkg,
    #[display("Cloudflare")]
    Cdnjs,
    #[display("unknown CDN")]
    Other,
}

impl Provider {
    pub fn from_url(url: &str) -> Self {
        if url.contains("jsdelivr.net") {
            Self::Jsdelivr
        } else if url.contains("unpkg.com") {
            Self::Unpkg
        } else if url.contains("cdnjs.cloudflare.com") {
            Self::Cdnjs
        } else {
            Self::Other
        }
    }
}

/// One candidate location of a library.
#[derive(Debug, Display, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[display("{provider} ({url})")]
pub struct Source {
    pub url: String,
    pub provider: Provider,
}

impl Source {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let provider = Provider::from_url(&url);
        Self { url, provider }
    }
}

/// Providers to move to the front when the time zone contains `zone`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionPreference {
    pub zone: String,
    pub providers: Vec<Provider>,
}

impl RegionPreference {
    pub fn new(zone: impl Into<String>, providers: impl IntoIterator<Item = Provider>) -> Self {
        Self { zone: zone.into(), providers: providers.into_iter().collect() }
    }
}

#[derive(Debug, Display, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    #[display("loaded")]
    Loaded,
    #[display("timed out")]
    TimedOut,
    #[display("failed: {_0}")]
    Failed(String),
    /// The script loaded but never defined the expected global.
    #[display("loaded without defining the library")]
    SymbolMissing,
}

/// Record of a single source attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadAttempt {
    pub source: Source,
    pub outcome: AttemptOutcome,
    pub elapsed: Duration,
}

/// Outcome of a successful [`load`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    /// `None` when the library was already present and nothing was fetched.
    pub successful_source: Option<Source>,
    /// Every attempt made, in order, including the successful one.
    pub attempts: Vec<LoadAttempt>,
    pub load_time: Duration,
}

/// Every attempt of a load that exhausted its sources.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoadFailures(pub Vec<LoadAttempt>);

impl fmt::Display for LoadFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} source(s) exhausted", self.0.len())?;
        for (index, attempt) in self.0.iter().enumerate() {
            let sep = if index == 0 { ": " } else { "; " };
            write!(f, "{sep}{} {}", attempt.source.provider, attempt.outcome)?;
        }
        Ok(())
    }
}

/// Tailor the candidate list to the connection and region.
///
/// On a lean connection (or with save-data on) the lean providers are moved
/// to the front and the list is cut to `lean_limit`; on a merely slow one
/// the same happens with `slow_limit`, if set. Finally the first region whose
/// zone appears in `time_zone` moves its providers to the front. Every
/// reordering is stable.
pub fn optimize(
    sources: &[String],
    connection: &ConnectionInfo,
    time_zone: Option<&str>,
    settings: &LibrarySettings,
) -> Vec<Source> {
    let mut candidates: Vec<Source> = sources.iter().map(Source::new).collect();
    let quality = connection.quality();

    if connection.save_data || quality >= settings.lean_at {
        tracing::debug!(quality = ?quality, save_data = connection.save_data, "constrained connection; using lean sources");
        candidates = prioritize(candidates, &settings.lean_providers);
        candidates.truncate(settings.lean_limit);
    } else if quality >= ConnectionQuality::Slow
        && let Some(limit) = settings.slow_limit
    {
        tracing::debug!(limit, "slow connection; limiting sources");
        candidates = prioritize(candidates, &settings.lean_providers);
        candidates.truncate(limit);
    }

    if let Some(zone) = time_zone
        && let Some(region) = settings.regions.iter().find(|region| zone.contains(region.zone.as_str()))
    {
        candidates = prioritize(candidates, &region.providers);
    }
    candidates
}

fn prioritize(candidates: Vec<Source>, preferred: &[Provider]) -> Vec<Source> {
    let (mut front, back): (Vec<_>, Vec<_>) =
        candidates.into_iter().partition(|source| preferred.contains(&source.provider));
    front.extend(back);
    front
}

/// Load a library by trying each candidate in turn.
///
/// Each attempt is bounded by the configured timeout. A failed attempt has
/// its script tag removed and is followed by the retry delay. After a script
/// loads, the library's global symbol is polled for a bounded number of
/// times before the attempt counts as a success.
#[instrument(skip_all, fields(symbol = %settings.global_symbol))]
pub async fn load(scripts: &dyn ScriptHost, candidates: &[Source], settings: &LibrarySettings) -> Result<LoadReport> {
    let started = Instant::now();
    if scripts.has_global(&settings.global_symbol) {
        tracing::debug!("library already available; nothing to fetch");
        return Ok(LoadReport { successful_source: None, attempts: Vec::new(), load_time: Duration::ZERO });
    }

    let mut attempts = Vec::with_capacity(candidates.len());
    for (index, source) in candidates.iter().enumerate() {
        if index > 0 {
            tokio::time::sleep(settings.retry_delay()).await;
        }
        tracing::debug!(attempt = index + 1, total = candidates.len(), source = %source, "loading library");
        let attempt_started = Instant::now();
        let outcome = match tokio::time::timeout(settings.timeout(), scripts.inject(&source.url)).await {
            Err(_elapsed) => AttemptOutcome::TimedOut,
            Ok(Err(fault)) => AttemptOutcome::Failed(fault.to_string()),
            Ok(Ok(())) => {
                if wait_for_symbol(scripts, settings).await {
                    AttemptOutcome::Loaded
                } else {
                    AttemptOutcome::SymbolMissing
                }
            },
        };

        if outcome == AttemptOutcome::Loaded {
            attempts.push(LoadAttempt { source: source.clone(), outcome, elapsed: attempt_started.elapsed() });
            let load_time = started.elapsed();
            tracing::info!(source = %source, elapsed = ?load_time, "library loaded");
            return Ok(LoadReport { successful_source: Some(source.clone()), attempts, load_time });
        }
        tracing::warn!(source = %source, outcome = %outcome, "library source failed");
        attempts.push(LoadAttempt { source: source.clone(), outcome, elapsed: attempt_started.elapsed() });
        scripts.remove(&source.url);
    }

    exn::bail!(ErrorKind::LibraryLoadFailed(LoadFailures(attempts)));
}

async fn wait_for_symbol(scripts: &dyn ScriptHost, settings: &LibrarySettings) -> bool {
    for _ in 0..settings.availability_checks.max(1) {
        if scripts.has_global(&settings.global_symbol) {
            return true;
        }
        tokio::time::sleep(settings.availability_interval()).await;
    }
    scripts.has_global(&settings.global_symbol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostFault;
    use crate::mock::{MockScriptHost, ScriptBehavior};
    use rstest::rstest;

    fn providers(candidates: &[Source]) -> Vec<Provider> {
        candidates.iter().map(|source| source.provider).collect()
    }

    fn connection(effective: &str, save_data: bool) -> ConnectionInfo {
        ConnectionInfo { effective_type: Some(effective.to_string()), save_data }
    }

    #[rstest]
    #[case("https://cdn.jsdelivr.net/npm/x", Provider::Jsdelivr)]
    #[case("https://unpkg.com/x", Provider::Unpkg)]
    #[case("https://cdnjs.cloudflare.com/ajax/libs/x", Provider::Cdnjs)]
    #[case("https://example.com/x.js", Provider::Other)]
    fn provider_from_url(#[case] url: &str, #[case] expected: Provider) {
        assert_eq!(Provider::from_url(url), expected);
    }

    #[test]
    fn fast_connection_without_region_keeps_order() {
        let settings = LibrarySettings::html5_qrcode();
        let candidates = optimize(&settings.sources, &ConnectionInfo::default(), None, &settings);
        let urls: Vec<_> = candidates.iter().map(|s| s.url.clone()).collect();
        assert_eq!(urls, settings.sources);
    }

    #[test]
    fn american_time_zone_moves_unpkg_and_jsdelivr_first() {
        let settings = LibrarySettings::zxing();
        let candidates = optimize(&settings.sources, &ConnectionInfo::default(), Some("America/New_York"), &settings);
        assert_eq!(candidates.len(), 6);
        assert_eq!(candidates.last().map(|s| s.provider), Some(Provider::Cdnjs));
        // Stable: the relative order of the preferred sources is unchanged.
        assert_eq!(candidates[0].url, settings.sources[0]);
    }

    #[rstest]
    #[case::save_data(connection("4g", true))]
    #[case::two_g(connection("2g", false))]
    #[case::slow_two_g(connection("slow-2g", false))]
    fn wasm_lean_connection(#[case] info: ConnectionInfo) {
        let settings = LibrarySettings::zxing();
        let candidates = optimize(&settings.sources, &info, None, &settings);
        assert_eq!(candidates.len(), 4);
        assert!(candidates.iter().all(|s| matches!(s.provider, Provider::Jsdelivr | Provider::Unpkg)));
    }

    #[test]
    fn script_slow_connection_is_limited_not_filtered() {
        let settings = LibrarySettings::html5_qrcode();
        let candidates = optimize(&settings.sources, &connection("2g", false), None, &settings);
        assert_eq!(candidates.len(), 6);
        assert_eq!(
            providers(&candidates),
            vec![Provider::Jsdelivr, Provider::Unpkg, Provider::Jsdelivr, Provider::Unpkg, Provider::Jsdelivr, Provider::Unpkg]
        );
    }

    #[test]
    fn script_very_slow_connection_keeps_newest_lean_sources() {
        let settings = LibrarySettings::html5_qrcode();
        let candidates = optimize(&settings.sources, &connection("slow-2g", false), Some("Asia/Tokyo"), &settings);
        assert_eq!(candidates.len(), 4);
        assert!(candidates.iter().all(|s| s.url.contains("2.3.8") || s.url.contains("2.3.7")));
    }

    fn settings_for(urls: &[&str]) -> LibrarySettings {
        LibrarySettings { sources: urls.iter().map(|u| u.to_string()).collect(), ..LibrarySettings::html5_qrcode() }
    }

    #[tokio::test(start_paused = true)]
    async fn last_source_succeeds_after_earlier_failures() {
        let urls = ["https://cdn.jsdelivr.net/a.js", "https://unpkg.com/b.js", "https://cdnjs.cloudflare.com/c.js"];
        let settings = settings_for(&urls);
        let scripts = MockScriptHost::new("Html5Qrcode")
            .with_behavior(urls[0], ScriptBehavior::Hang)
            .with_behavior(urls[1], ScriptBehavior::Fail(HostFault::Other("blocked".into())))
            .with_behavior(urls[2], ScriptBehavior::Load);
        let candidates: Vec<_> = urls.iter().map(|u| Source::new(*u)).collect();

        let report = load(&scripts, &candidates, &settings).await.unwrap();

        assert_eq!(report.successful_source, Some(Source::new(urls[2])));
        assert_eq!(report.attempts.len(), 3);
        assert_eq!(report.attempts[0].outcome, AttemptOutcome::TimedOut);
        assert_eq!(report.attempts[1].outcome, AttemptOutcome::Failed("blocked".into()));
        assert_eq!(report.attempts[2].outcome, AttemptOutcome::Loaded);
        assert_eq!(scripts.injected(), urls.iter().map(|u| u.to_string()).collect::<Vec<_>>());
        assert_eq!(scripts.removed(), vec![urls[0].to_string(), urls[1].to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_sources_report_every_attempt() {
        let urls = ["https://cdn.jsdelivr.net/a.js", "https://unpkg.com/b.js"];
        let settings = settings_for(&urls);
        let scripts = MockScriptHost::new("Html5Qrcode")
            .with_behavior(urls[0], ScriptBehavior::LoadWithoutSymbol)
            .with_behavior(urls[1], ScriptBehavior::Fail(HostFault::NotFound));
        let candidates: Vec<_> = urls.iter().map(|u| Source::new(*u)).collect();

        let err = load(&scripts, &candidates, &settings).await.unwrap_err();
        let ErrorKind::LibraryLoadFailed(failures) = &*err else {
            panic!("unexpected error: {err:?}");
        };
        assert_eq!(failures.0.len(), 2);
        assert_eq!(failures.0[0].outcome, AttemptOutcome::SymbolMissing);
        assert_eq!(failures.to_string(), "2 source(s) exhausted: jsDelivr loaded without defining the library; UNPKG failed: NotFoundError");
    }

    #[tokio::test]
    async fn preloaded_library_fetches_nothing() {
        let settings = settings_for(&["https://unpkg.com/b.js"]);
        let scripts = MockScriptHost::new("Html5Qrcode").with_global("Html5Qrcode");

        let report = load(&scripts, &[Source::new("https://unpkg.com/b.js")], &settings).await.unwrap();

        assert_eq!(report.successful_source, None);
        assert!(report.attempts.is_empty());
        assert!(scripts.injected().is_empty());
    }
}
