//! Committee activity analytics.
//!
//! Activity records (bills, reports, nominations, communications) come from
//! an external [`ActivitySource`]. The [`ActivityAnalyzer`] fetches each kind
//! through a [`TtlCache`] keyed by the request signature, counts the records
//! that fall inside a trailing window, and reduces the counts to a single
//! productivity score.
//!
//! # Scoring
//!
//! | Category | Weight | Cap |
//! |----------|--------|-----|
//! | bills | 5 | 40 |
//! | reports | 10 | 30 |
//! | nominations | 15 | 20 |
//! | communications | 2 | 10 |
//!
//! Each term is capped before summing, so the score lies in `[0, 100]`.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::cache::{TtlCache, DEFAULT_TTL};
use crate::config::ActivityConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Bill,
    Report,
    Nomination,
    Communication,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 4] = [
        ActivityKind::Bill,
        ActivityKind::Report,
        ActivityKind::Nomination,
        ActivityKind::Communication,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Bill => "bill",
            ActivityKind::Report => "report",
            ActivityKind::Nomination => "nomination",
            ActivityKind::Communication => "communication",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One item of committee activity as reported upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub committee_code: String,
    pub kind: ActivityKind,
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub date: NaiveDate,
}

/// Parameters of a single upstream fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityRequest {
    pub committee_code: String,
    pub kind: ActivityKind,
    pub since: NaiveDate,
}

impl ActivityRequest {
    /// Cache key identifying this request: `activity:<committee>:<kind>:<since>`.
    pub fn cache_key(&self) -> String {
        format!(
            "activity:{}:{}:{}",
            self.committee_code,
            self.kind,
            self.since.format("%Y-%m-%d")
        )
    }
}

/// External provider of committee activity.
#[async_trait]
pub trait ActivitySource: Send + Sync {
    /// Records of `request.kind` for the committee dated on or after `request.since`.
    async fn fetch(&self, request: &ActivityRequest) -> Result<Vec<ActivityRecord>>;
}

/// Activity source backed by a JSON array of [`ActivityRecord`]s on disk.
pub struct JsonFileSource {
    records: Vec<ActivityRecord>,
}

impl JsonFileSource {
    pub fn new(records: Vec<ActivityRecord>) -> Self {
        Self { records }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read activity file: {}", path.display()))?;
        let records: Vec<ActivityRecord> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse activity file: {}", path.display()))?;
        Ok(Self::new(records))
    }
}

#[async_trait]
impl ActivitySource for JsonFileSource {
    async fn fetch(&self, request: &ActivityRequest) -> Result<Vec<ActivityRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|r| {
                r.committee_code == request.committee_code
                    && r.kind == request.kind
                    && r.date >= request.since
            })
            .cloned()
            .collect())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActivityCounts {
    pub bills: u32,
    pub reports: u32,
    pub nominations: u32,
    pub communications: u32,
}

impl ActivityCounts {
    pub fn new(bills: u32, reports: u32, nominations: u32, communications: u32) -> Self {
        Self {
            bills,
            reports,
            nominations,
            communications,
        }
    }

    fn add(&mut self, kind: ActivityKind, n: u32) {
        let slot = match kind {
            ActivityKind::Bill => &mut self.bills,
            ActivityKind::Report => &mut self.reports,
            ActivityKind::Nomination => &mut self.nominations,
            ActivityKind::Communication => &mut self.communications,
        };
        *slot = slot.saturating_add(n);
    }
}

/// Weighted, per-category capped productivity score in `[0, 100]`.
pub fn productivity_score(counts: &ActivityCounts) -> u32 {
    counts.bills.saturating_mul(5).min(40)
        + counts.reports.saturating_mul(10).min(30)
        + counts.nominations.saturating_mul(15).min(20)
        + counts.communications.saturating_mul(2).min(10)
}

/// Activity summary for one committee over a trailing window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityAnalytics {
    pub committee_code: String,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub counts: ActivityCounts,
    pub productivity_score: u32,
    /// Set when some count came from a stale cache entry after a failed refetch.
    pub degraded: bool,
}

pub struct ActivityAnalyzer {
    source: Arc<dyn ActivitySource>,
    cache: TtlCache<Vec<ActivityRecord>>,
    ttl: Duration,
    window_months: u32,
}

impl ActivityAnalyzer {
    pub fn new(source: Arc<dyn ActivitySource>) -> Self {
        Self {
            source,
            cache: TtlCache::new(),
            ttl: DEFAULT_TTL,
            window_months: 6,
        }
    }

    pub fn from_config(source: Arc<dyn ActivitySource>, config: &ActivityConfig) -> Self {
        Self::new(source)
            .with_ttl(config.ttl())
            .with_window_months(config.window_months)
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_window_months(mut self, months: u32) -> Self {
        self.window_months = months.max(1);
        self
    }

    /// Count each activity kind for `committee_code` over the window ending
    /// at `today` and score the result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CacheFetch`] when a kind could not be fetched and
    /// nothing was cached for it.
    pub async fn analyze(&self, committee_code: &str, today: NaiveDate) -> Result<ActivityAnalytics> {
        let window_start = today
            .checked_sub_months(Months::new(self.window_months))
            .ok_or_else(|| {
                Error::invalid_query(format!(
                    "a {}-month window before {} is out of range",
                    self.window_months, today
                ))
            })?;

        let mut counts = ActivityCounts::default();
        let mut degraded = false;

        for kind in ActivityKind::ALL {
            let request = ActivityRequest {
                committee_code: committee_code.to_string(),
                kind,
                since: window_start,
            };
            let lookup = self
                .cache
                .lookup(&request.cache_key(), self.ttl, || self.source.fetch(&request))
                .await?;
            degraded |= lookup.is_stale();

            let in_window = lookup
                .value()
                .iter()
                .filter(|r| r.kind == kind && r.date >= window_start && r.date <= today)
                .count();
            counts.add(kind, u32::try_from(in_window).unwrap_or(u32::MAX));
        }

        let productivity_score = productivity_score(&counts);
        tracing::info!(
            committee = committee_code,
            bills = counts.bills,
            reports = counts.reports,
            nominations = counts.nominations,
            communications = counts.communications,
            score = productivity_score,
            degraded,
            "scored committee activity"
        );

        Ok(ActivityAnalytics {
            committee_code: committee_code.to_string(),
            window_start,
            window_end: today,
            counts,
            productivity_score,
            degraded,
        })
    }
}

/// `civic score`: score a committee from a JSON activity file.
pub async fn run_score(
    config: &crate::config::Config,
    committee_code: &str,
    records: &Path,
    today: NaiveDate,
    json: bool,
) -> anyhow::Result<()> {
    let source = Arc::new(JsonFileSource::load(records)?);
    let analyzer = ActivityAnalyzer::from_config(source, &config.activity);
    let analytics = analyzer.analyze(committee_code, today).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&analytics)?);
        return Ok(());
    }

    println!(
        "committee {} ({} to {})",
        analytics.committee_code, analytics.window_start, analytics.window_end
    );
    println!("  bills: {}", analytics.counts.bills);
    println!("  reports: {}", analytics.counts.reports);
    println!("  nominations: {}", analytics.counts.nominations);
    println!("  communications: {}", analytics.counts.communications);
    println!("  productivity score: {}", analytics.productivity_score);
    if analytics.degraded {
        println!("  (served from stale cache)");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn rec(kind: ActivityKind, id: &str, d: &str) -> ActivityRecord {
        ActivityRecord {
            committee_code: "HSAG".to_string(),
            kind,
            id: id.to_string(),
            title: None,
            date: date(d),
        }
    }

    /// Wraps a file source, counting calls and optionally failing.
    struct FlakySource {
        inner: JsonFileSource,
        calls: AtomicUsize,
        failing: AtomicBool,
    }

    #[async_trait]
    impl ActivitySource for FlakySource {
        async fn fetch(&self, request: &ActivityRequest) -> Result<Vec<ActivityRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(Error::upstream("503 Service Unavailable"));
            }
            self.inner.fetch(request).await
        }
    }

    fn flaky(records: Vec<ActivityRecord>) -> Arc<FlakySource> {
        Arc::new(FlakySource {
            inner: JsonFileSource::new(records),
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        })
    }

    #[test]
    fn test_score_bounds() {
        assert_eq!(productivity_score(&ActivityCounts::default()), 0);
        assert_eq!(productivity_score(&ActivityCounts::new(100, 100, 100, 100)), 100);
        assert_eq!(
            productivity_score(&ActivityCounts::new(u32::MAX, u32::MAX, u32::MAX, u32::MAX)),
            100
        );
    }

    #[test]
    fn test_score_weights_and_caps() {
        assert_eq!(productivity_score(&ActivityCounts::new(3, 0, 0, 0)), 15);
        assert_eq!(productivity_score(&ActivityCounts::new(8, 0, 0, 0)), 40);
        assert_eq!(productivity_score(&ActivityCounts::new(9, 0, 0, 0)), 40);
        assert_eq!(productivity_score(&ActivityCounts::new(0, 2, 0, 0)), 20);
        assert_eq!(productivity_score(&ActivityCounts::new(0, 0, 1, 0)), 15);
        assert_eq!(productivity_score(&ActivityCounts::new(0, 0, 2, 0)), 20);
        assert_eq!(productivity_score(&ActivityCounts::new(0, 0, 0, 4)), 8);
        assert_eq!(productivity_score(&ActivityCounts::new(2, 1, 1, 3)), 10 + 10 + 15 + 6);
    }

    #[test]
    fn test_score_always_in_range() {
        for b in [0, 1, 7, 8, 50] {
            for r in [0, 1, 3, 4] {
                for n in [0, 1, 2] {
                    for c in [0, 4, 5, 6] {
                        let s = productivity_score(&ActivityCounts::new(b, r, n, c));
                        assert!(s <= 100);
                    }
                }
            }
        }
    }

    #[test]
    fn test_cache_key_signature() {
        let req = ActivityRequest {
            committee_code: "SSJU".to_string(),
            kind: ActivityKind::Nomination,
            since: date("2024-01-15"),
        };
        assert_eq!(req.cache_key(), "activity:SSJU:nomination:2024-01-15");
    }

    #[tokio::test]
    async fn test_analyze_counts_trailing_window() {
        let source = flaky(vec![
            rec(ActivityKind::Bill, "b1", "2024-05-01"),
            rec(ActivityKind::Bill, "b2", "2024-06-30"),
            rec(ActivityKind::Bill, "old", "2023-11-30"),
            rec(ActivityKind::Report, "r1", "2024-03-10"),
            rec(ActivityKind::Nomination, "n1", "2024-02-01"),
            rec(ActivityKind::Communication, "future", "2024-07-02"),
        ]);
        let analyzer = ActivityAnalyzer::new(source.clone());

        let out = analyzer.analyze("HSAG", date("2024-07-01")).await.unwrap();
        assert_eq!(out.window_start, date("2024-01-01"));
        assert_eq!(out.counts, ActivityCounts::new(2, 1, 1, 0));
        assert_eq!(out.productivity_score, 10 + 10 + 15);
        assert!(!out.degraded);
        assert_eq!(source.calls.load(Ordering::SeqCst), 4);

        // Fresh entries are reused.
        analyzer.analyze("HSAG", date("2024-07-01")).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refetch_marks_degraded() {
        let source = flaky(vec![rec(ActivityKind::Report, "r1", "2024-03-10")]);
        let analyzer =
            ActivityAnalyzer::new(source.clone()).with_ttl(Duration::from_secs(60));
        let today = date("2024-07-01");

        let first = analyzer.analyze("HSAG", today).await.unwrap();
        assert_eq!(first.counts.reports, 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        source.failing.store(true, Ordering::SeqCst);

        let second = analyzer.analyze("HSAG", today).await.unwrap();
        assert!(second.degraded);
        assert_eq!(second.counts, first.counts);
    }

    #[tokio::test]
    async fn test_failure_without_cache_propagates() {
        let source = flaky(Vec::new());
        source.failing.store(true, Ordering::SeqCst);
        let analyzer = ActivityAnalyzer::new(source);

        let err = analyzer.analyze("HSAG", date("2024-07-01")).await.unwrap_err();
        assert!(matches!(err, Error::CacheFetch { .. }));
    }

    #[test]
    fn test_records_deserialize_from_json() {
        let json = r#"[{"committee_code":"HSAG","kind":"bill","id":"hr-1","date":"2024-01-02"}]"#;
        let records: Vec<ActivityRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(records[0].kind, ActivityKind::Bill);
        assert!(records[0].title.is_none());
    }
}
