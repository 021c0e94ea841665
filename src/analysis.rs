//! Per-author AI-likelihood analysis of repositories and organizations.
//!
//! [`RepoAnalyzer`] samples, summarizes, classifies and averages the commits
//! of one repository; [`OrgAnalyzer`] runs it over every repository of an
//! organization and merges the results weighted by analysed-commit counts.

pub mod org;
pub mod repo;

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::source::{CommitRef, SourceError};

pub use org::{OrgAnalysisSummary, OrgAnalyzer};
pub use repo::{AnalysisSummary, RepoAnalyzer};

/// Commits sent to the classifier per repository unless overridden.
pub const DEFAULT_COMMIT_LIMIT: usize = 50;

/// Errors that end an analysis request.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// A date bound could not be parsed.
    #[error("Invalid {field} date '{value}': expected RFC 3339 timestamp or YYYY-MM-DD")]
    InvalidDate {
        /// Which bound was malformed.
        field: &'static str,
        /// The rejected input.
        value: String,
    },

    /// `since` is later than `until`.
    #[error("Invalid date range: since {since} is after until {until}")]
    InvertedRange {
        /// Lower bound.
        since: DateTime<Utc>,
        /// Upper bound.
        until: DateTime<Utc>,
    },

    /// The commit source could not list what the run needs.
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Inclusive author-date bounds. A missing side is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Inclusive lower bound.
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound.
    pub until: Option<DateTime<Utc>>,
}

impl DateRange {
    /// Parses optional `since`/`until` inputs.
    ///
    /// Accepts RFC 3339 timestamps and plain `YYYY-MM-DD` dates, the latter
    /// meaning midnight UTC. Blank inputs count as absent.
    pub fn parse(since: Option<&str>, until: Option<&str>) -> Result<Self, AnalysisError> {
        let since = parse_bound("since", since)?;
        let until = parse_bound("until", until)?;

        if let (Some(since), Some(until)) = (since, until) {
            if since > until {
                return Err(AnalysisError::InvertedRange { since, until });
            }
        }

        Ok(Self { since, until })
    }

    /// Whether a commit dated `authored_at` falls inside the range.
    ///
    /// Undated commits only pass an unbounded range.
    #[must_use]
    pub fn contains(&self, authored_at: Option<DateTime<Utc>>) -> bool {
        match authored_at {
            Some(date) => {
                self.since.map_or(true, |since| date >= since)
                    && self.until.map_or(true, |until| date <= until)
            }
            None => self.since.is_none() && self.until.is_none(),
        }
    }
}

fn parse_bound(
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<DateTime<Utc>>, AnalysisError> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(None);
    };

    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(date.with_timezone(&Utc)));
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| Some(midnight.and_utc()))
        .ok_or_else(|| AnalysisError::InvalidDate {
            field,
            value: raw.to_string(),
        })
}

/// Caller-tunable knobs of a run.
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    /// Author-date bounds.
    pub range: DateRange,
    /// Maximum commits classified per repository.
    pub commit_limit: usize,
    /// Serve the newest stored run for the same query instead of recomputing.
    pub prefer_cache: bool,
    /// Wall-clock budget for the whole request.
    pub timeout: Option<Duration>,
    /// External cancellation.
    pub cancel: CancellationToken,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            range: DateRange::default(),
            commit_limit: DEFAULT_COMMIT_LIMIT,
            prefer_cache: false,
            timeout: None,
            cancel: CancellationToken::new(),
        }
    }
}

impl AnalysisOptions {
    /// Starts the request clock.
    pub(crate) fn interrupt(&self) -> Interrupt {
        Interrupt {
            cancel: self.cancel.clone(),
            deadline: self.timeout.map(|timeout| Instant::now() + timeout),
        }
    }
}

/// Cancellation token plus optional deadline, shared by one request.
#[derive(Debug, Clone)]
pub(crate) struct Interrupt {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl Interrupt {
    /// Whether the request must stop now.
    pub(crate) fn is_triggered(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves once the request must stop.
    pub(crate) async fn triggered(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = self.cancel.cancelled() => {}
                    () = sleep_until(deadline) => {}
                }
            }
            None => self.cancel.cancelled().await,
        }
    }
}

/// Date-filters commits and keeps the first `limit` in source order.
///
/// Returns the number of commits inside the range alongside the sample.
#[must_use]
pub fn sample_commits(
    commits: Vec<CommitRef>,
    range: &DateRange,
    limit: usize,
) -> (usize, Vec<CommitRef>) {
    let mut filtered: Vec<CommitRef> = commits
        .into_iter()
        .filter(|commit| range.contains(commit.authored_at))
        .collect();
    let total = filtered.len();
    filtered.truncate(limit);
    (total, filtered)
}

/// Rounds `sum / count` half up; zero when `count` is zero.
#[must_use]
pub fn rounded_average(sum: u64, count: u64) -> u8 {
    if count == 0 {
        return 0;
    }
    let average = (2 * sum + count) / (2 * count);
    average.min(100) as u8
}

/// Per-author result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserScore {
    /// Attributed identity.
    pub user: String,
    /// Average AI likelihood, `0..=100`.
    pub ai_percent: u8,
    /// `100 - ai_percent`.
    pub human_percent: u8,
    /// Commits that contributed to the average.
    pub commits_analyzed: u64,
}

impl UserScore {
    /// Builds a score from a running sum and the number of contributions.
    #[must_use]
    pub fn from_totals(user: &str, sum: u64, count: u64) -> Self {
        let ai_percent = rounded_average(sum, count);
        Self {
            user: user.to_string(),
            ai_percent,
            human_percent: 100 - ai_percent,
            commits_analyzed: count,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    sum: u64,
    count: u64,
}

/// Per-author running sums, kept in first-seen order.
///
/// Only ever grows; dropped once the averages are taken.
#[derive(Debug, Default)]
pub struct ScoreAccumulator {
    order: Vec<String>,
    tallies: HashMap<String, Tally>,
}

impl ScoreAccumulator {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `amount` to the author's sum and `weight` to their count.
    pub fn add(&mut self, author: &str, amount: u64, weight: u64) {
        if !self.tallies.contains_key(author) {
            self.order.push(author.to_string());
        }
        let tally = self.tallies.entry(author.to_string()).or_default();
        tally.sum += amount;
        tally.count += weight;
    }

    /// Returns `true` if nothing was added.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Converts the sums into per-author averages.
    pub fn into_scores(self) -> Vec<UserScore> {
        let Self { order, tallies } = self;
        order
            .iter()
            .map(|author| {
                let tally = tallies.get(author).copied().unwrap_or_default();
                UserScore::from_totals(author, tally.sum, tally.count)
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::source::test_utils::commit;

    fn at(raw: &str) -> Option<DateTime<Utc>> {
        Some(DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc))
    }

    #[test]
    fn parse_accepts_dates_and_timestamps() {
        let range = DateRange::parse(Some("2024-01-01"), Some("2024-02-01T12:30:00+02:00")).unwrap();
        assert_eq!(range.since, at("2024-01-01T00:00:00Z"));
        assert_eq!(range.until, at("2024-02-01T10:30:00Z"));
    }

    #[test]
    fn parse_treats_blank_as_absent() {
        assert_eq!(
            DateRange::parse(Some("  "), None).unwrap(),
            DateRange::default()
        );
    }

    #[test]
    fn parse_rejects_malformed_dates() {
        let err = DateRange::parse(Some("last tuesday"), None).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidDate { field: "since", .. }));

        let err = DateRange::parse(None, Some("2024-13-40")).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidDate { field: "until", .. }));
    }

    #[test]
    fn parse_rejects_inverted_range() {
        let err = DateRange::parse(Some("2024-02-01"), Some("2024-01-01")).unwrap_err();
        assert!(matches!(err, AnalysisError::InvertedRange { .. }));
    }

    #[test]
    fn bounds_are_inclusive() {
        let range = DateRange::parse(Some("2024-01-01T00:00:00Z"), Some("2024-01-31T00:00:00Z"))
            .unwrap();
        assert!(range.contains(at("2024-01-01T00:00:00Z")));
        assert!(range.contains(at("2024-01-31T00:00:00Z")));
        assert!(!range.contains(at("2023-12-31T23:59:59Z")));
        assert!(!range.contains(at("2024-01-31T00:00:01Z")));
    }

    #[test]
    fn undated_commits_only_pass_open_ranges() {
        assert!(DateRange::default().contains(None));
        let range = DateRange::parse(Some("2024-01-01"), None).unwrap();
        assert!(!range.contains(None));
    }

    #[test]
    fn sample_reports_filtered_total_and_caps_sample() {
        let commits = vec![
            commit("c5", "alice", "2024-05-01T00:00:00Z"),
            commit("c4", "bob", "2024-04-01T00:00:00Z"),
            commit("c3", "alice", "2024-03-01T00:00:00Z"),
            commit("c2", "bob", "2024-02-01T00:00:00Z"),
            commit("c1", "alice", "2023-01-01T00:00:00Z"),
        ];
        let range = DateRange::parse(Some("2024-01-01"), None).unwrap();

        let (total, sample) = sample_commits(commits, &range, 2);

        assert_eq!(total, 4);
        assert_eq!(
            sample.iter().map(|c| c.sha.as_str()).collect::<Vec<_>>(),
            vec!["c5", "c4"]
        );
    }

    #[test]
    fn rounded_average_rounds_half_up() {
        assert_eq!(rounded_average(240, 3), 80);
        assert_eq!(rounded_average(1, 2), 1);
        assert_eq!(rounded_average(101, 2), 51);
        assert_eq!(rounded_average(300, 5), 60);
        assert_eq!(rounded_average(0, 0), 0);
    }

    #[test]
    fn accumulator_keeps_first_seen_order() {
        let mut acc = ScoreAccumulator::new();
        assert!(acc.is_empty());
        acc.add("carol", 10, 1);
        acc.add("alice", 80, 1);
        acc.add("carol", 30, 1);

        let scores = acc.into_scores();
        assert_eq!(scores[0], UserScore::from_totals("carol", 40, 2));
        assert_eq!(scores[0].ai_percent, 20);
        assert_eq!(scores[1].user, "alice");
    }

    proptest! {
        #[test]
        fn user_scores_always_sum_to_hundred(scores in prop::collection::vec(0u8..=100, 1..60)) {
            let sum: u64 = scores.iter().map(|s| u64::from(*s)).sum();
            let score = UserScore::from_totals("x", sum, scores.len() as u64);
            prop_assert!(score.ai_percent <= 100);
            prop_assert_eq!(u16::from(score.ai_percent) + u16::from(score.human_percent), 100);
            prop_assert_eq!(score.commits_analyzed, scores.len() as u64);
        }

        #[test]
        fn weighted_merge_matches_formula(
            a1 in 0u8..=100, c1 in 1u64..200,
            a2 in 0u8..=100, c2 in 1u64..200,
        ) {
            let mut acc = ScoreAccumulator::new();
            acc.add("bob", u64::from(a1) * c1, c1);
            acc.add("bob", u64::from(a2) * c2, c2);
            let merged = acc.into_scores().remove(0);

            let expected = ((f64::from(a1) * c1 as f64 + f64::from(a2) * c2 as f64)
                / (c1 + c2) as f64 + 0.5).floor() as u8;
            prop_assert_eq!(merged.ai_percent, expected);
            prop_assert_eq!(merged.commits_analyzed, c1 + c2);
        }
    }
}
