// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Individual test results and their TestRail representation.
//!
//! A [`ResultRecord`] captures one observed outcome of one test for one TestRail case. Records are
//! collected into a [`ResultSet`](crate::ordering::ResultSet) and turned into
//! [`ResultPayload`]s at publish time.

use crate::errors::UnknownStatusError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{fmt, num::NonZeroU64, str::FromStr};

/// The header that starts every result comment.
pub const COMMENT_HEADER: &str = "# Test result: #\n";

/// The header of the section describing a parametrized test's parameters.
pub const PARAMETRIZE_HEADER: &str = "# Test parametrize: #\n";

/// The marker placed at the start of a comment whose beginning was dropped.
pub const TRUNCATION_MARKER: &str = "Log truncated\n...\n";

/// The default maximum number of characters kept from a result comment.
pub const DEFAULT_COMMENT_SIZE_LIMIT: usize = 4000;

static INDENT: &str = "    ";

/// The ID of a TestRail case. Always positive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(NonZeroU64);

impl CaseId {
    /// Creates a new `CaseId`, returning `None` for zero.
    pub fn new(id: u64) -> Option<Self> {
        NonZeroU64::new(id).map(Self)
    }

    /// Returns the ID as an integer.
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The outcome of a test as reported by the test runner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutcomeStatus {
    /// The test passed.
    Passed,

    /// The test failed.
    Failed,

    /// The test was skipped.
    Skipped,
}

impl OutcomeStatus {
    /// Returns the string names of all variants.
    pub fn variants() -> &'static [&'static str] {
        &["passed", "failed", "skipped"]
    }

    /// Returns the string name of this outcome.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Maps this outcome to the status reported to TestRail.
    ///
    /// TestRail has no dedicated "skipped" status: skipped tests are reported as blocked.
    pub fn testrail_status(self) -> TestRailStatus {
        match self {
            Self::Passed => TestRailStatus::Passed,
            Self::Failed => TestRailStatus::Failed,
            Self::Skipped => TestRailStatus::Blocked,
        }
    }
}

impl FromStr for OutcomeStatus {
    type Err = UnknownStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "passed" => Ok(Self::Passed),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            other => Err(UnknownStatusError::new(other)),
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A built-in TestRail result status.
///
/// The discriminants are TestRail's status IDs. Ordering by ID places failures after passes, which
/// the publish order relies on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TestRailStatus {
    /// The case passed.
    Passed = 1,

    /// The case is not eligible for execution in the run.
    Blocked = 2,

    /// The case has no result yet.
    Untested = 3,

    /// The case must be run again.
    Retest = 4,

    /// The case failed.
    Failed = 5,
}

impl TestRailStatus {
    /// Returns TestRail's numeric ID for this status.
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Looks up a status by TestRail's numeric ID.
    ///
    /// Returns `None` for custom statuses.
    pub fn from_id(id: u64) -> Option<Self> {
        match id {
            1 => Some(Self::Passed),
            2 => Some(Self::Blocked),
            3 => Some(Self::Untested),
            4 => Some(Self::Retest),
            5 => Some(Self::Failed),
            _ => None,
        }
    }
}

/// References to issues in an external defect tracker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Defects {
    /// A single string, possibly holding several comma-separated references.
    Single(String),

    /// A list of references.
    Many(Vec<String>),
}

impl From<&str> for Defects {
    fn from(s: &str) -> Self {
        Self::Single(s.to_owned())
    }
}

impl From<String> for Defects {
    fn from(s: String) -> Self {
        Self::Single(s)
    }
}

impl From<Vec<String>> for Defects {
    fn from(v: Vec<String>) -> Self {
        Self::Many(v)
    }
}

/// The parameters of a parametrized test, in declaration order.
pub type Parametrization = IndexMap<String, serde_json::Value>;

/// One observed outcome of one test, for one TestRail case.
///
/// A single test may produce several records: one per associated case, and one per rerun. Records
/// are never modified once created; a [`ResultSet`](crate::ordering::ResultSet) only reorders and
/// filters them.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultRecord {
    /// The TestRail case this result is for.
    pub case_id: CaseId,

    /// The name of the test that produced this result.
    pub test_name: String,

    /// The outcome of the test.
    pub status: OutcomeStatus,

    /// How long the test took, in seconds.
    pub duration: Option<f64>,

    /// Failure details or other output.
    pub comment: Option<String>,

    /// Defect references to attach to the result.
    pub defects: Option<Defects>,

    /// The test's parameters, if it is parametrized.
    pub parametrization: Option<Parametrization>,

    /// When the result was observed, in seconds. Only meaningful relative to other records from
    /// the same session.
    pub timestamp: f64,
}

impl ResultRecord {
    /// Creates a new record with no duration, comment, defects or parametrization.
    pub fn new(
        case_id: CaseId,
        test_name: impl Into<String>,
        status: OutcomeStatus,
        timestamp: f64,
    ) -> Self {
        Self {
            case_id,
            test_name: test_name.into(),
            status,
            duration: None,
            comment: None,
            defects: None,
            parametrization: None,
            timestamp,
        }
    }

    /// Returns the status reported to TestRail for this record.
    pub fn testrail_status(&self) -> TestRailStatus {
        self.status.testrail_status()
    }

    /// Serializes this record into the form used by `add_results_for_cases`.
    ///
    /// `custom_comment` is added below the comment header. If the assembled comment is longer than
    /// `comment_size_limit` characters, only its last `comment_size_limit` characters are kept.
    pub fn to_payload(
        &self,
        custom_comment: Option<&str>,
        comment_size_limit: usize,
    ) -> ResultPayload {
        ResultPayload {
            case_id: self.case_id,
            status_id: self.testrail_status().id(),
            defects: self.defects.clone(),
            elapsed: format_elapsed(self.duration),
            comment: self.format_comment(custom_comment, comment_size_limit),
            version: None,
        }
    }

    fn format_comment(&self, custom_comment: Option<&str>, comment_size_limit: usize) -> String {
        let mut comment = String::from(COMMENT_HEADER);

        if let Some(custom_comment) = custom_comment.filter(|c| !c.is_empty()) {
            comment.push_str(custom_comment);
            comment.push('\n');
        }

        if let Some(output) = self.comment.as_deref().filter(|c| !c.is_empty()) {
            comment.push_str(INDENT);
            comment.push_str(output);
            comment.push('\n');
        }

        if let Some(parametrization) = self.parametrization.as_ref().filter(|p| !p.is_empty()) {
            comment.push_str(PARAMETRIZE_HEADER);
            comment.push_str(&render_parametrization(parametrization));
            comment.push_str("\n\n");
        }

        truncate_comment(comment, comment_size_limit)
    }
}

/// A single entry of the `results` array sent to `add_results_for_cases`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultPayload {
    /// The case ID.
    pub case_id: CaseId,

    /// TestRail's status ID.
    pub status_id: u8,

    /// Defect references, sent as `null` if absent.
    pub defects: Option<Defects>,

    /// Elapsed time such as `"3s"`, or the empty string.
    pub elapsed: String,

    /// The result comment.
    pub comment: String,

    /// The version of the software under test.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Formats a duration in TestRail's elapsed syntax.
///
/// TestRail rejects zero and sub-second timespans, so any nonzero duration is reported as at least
/// one second.
pub fn format_elapsed(duration: Option<f64>) -> String {
    match duration {
        Some(duration) if duration > 0.0 => {
            let seconds = if duration < 1.0 {
                1
            } else {
                duration.round_ties_even() as u64
            };
            format!("{seconds}s")
        }
        _ => String::new(),
    }
}

fn render_parametrization(parametrization: &Parametrization) -> String {
    // Serializing a map of strings to JSON values cannot fail.
    serde_json::to_string(parametrization).unwrap_or_else(|_| format!("{parametrization:?}"))
}

fn truncate_comment(comment: String, comment_size_limit: usize) -> String {
    let char_count = comment.chars().count();
    if char_count <= comment_size_limit {
        return comment;
    }

    // Keep the end of the comment: for failures, the most relevant output is usually last.
    // Indentation keeps TestRail from interpreting the kept text as markup.
    let tail: String = comment.chars().skip(char_count - comment_size_limit).collect();
    let tail = tail.replace('\n', "\n    ");
    format!("{INDENT}{TRUNCATION_MARKER}{tail}")
}
