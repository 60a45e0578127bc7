// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Normalization of case and defect references attached to tests.
//!
//! Tests refer to TestRail cases with strings such as `C1234` or `1234`, and to defects with
//! free-form tracker IDs such as `PF-516`.

use crate::result::CaseId;
use regex::Regex;
use std::sync::LazyLock;

static TRAILING_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+$").expect("pattern is valid"));

/// Extracts case IDs from raw references.
///
/// The ID is the run of digits a reference ends with. References that don't end with a digit, or
/// whose ID is zero or out of range, are dropped.
pub fn clean_case_ids<I, S>(raw: I) -> Vec<CaseId>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter()
        .filter_map(|reference| {
            let digits = TRAILING_DIGITS.find(reference.as_ref())?;
            CaseId::new(digits.as_str().parse().ok()?)
        })
        .collect()
}

/// Normalizes raw defect references.
///
/// Only the first line of each reference is kept, without surrounding whitespace. References that
/// end up empty are dropped.
pub fn clean_defect_ids<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter()
        .filter_map(|reference| {
            let first_line = reference.as_ref().lines().next()?.trim();
            (!first_line.is_empty()).then(|| first_line.to_owned())
        })
        .collect()
}

/// Joins defect references into the single comma-separated string TestRail expects.
///
/// Returns `None` if there are no references.
pub fn join_defect_ids<S: AsRef<str>>(defects: &[S]) -> Option<String> {
    if defects.is_empty() {
        return None;
    }
    Some(
        defects
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(", "),
    )
}
