// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ordering of results for publishing.
//!
//! TestRail has no notion of a batch of results being applied atomically: results are applied in
//! order, and the last result for a case wins. [`ResultSet::sorted`] orders results so that the
//! result that ends up visible for each case is the right one:
//!
//! * Reruns of the same test are published oldest first, so the latest run wins.
//! * Different tests sharing a case (typically variants of a parametrized test) are published in
//!   ascending order of their latest status ID. Failures have higher IDs than passes, so a failing
//!   variant is never hidden behind a passing one.

use crate::result::{CaseId, ResultRecord};

/// An append-only collection of [`ResultRecord`]s.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultSet {
    records: Vec<ResultRecord>,
}

impl ResultSet {
    /// Creates an empty result set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record to the set.
    pub fn append(&mut self, record: ResultRecord) {
        self.records.push(record);
    }

    /// Returns the number of records in the set.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the set has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates over records in the order they were added.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &ResultRecord> + '_ {
        self.records.iter()
    }

    /// Returns the case IDs of all records, in the order they were added.
    pub fn case_ids(&self) -> impl Iterator<Item = CaseId> + '_ {
        self.records.iter().map(|record| record.case_id)
    }

    /// Returns the records in publish order.
    ///
    /// Records are grouped into partitions sharing a case ID and test name, each partition sorted
    /// by timestamp. Partitions are then ordered by the TestRail status ID of their latest record.
    /// Ties keep the order of case ID, then test name.
    pub fn sorted(&self) -> Vec<&ResultRecord> {
        let mut records: Vec<&ResultRecord> = self.records.iter().collect();
        // This is a stable sort, so records that compare equal keep the order they were added in.
        records.sort_by(|a, b| {
            a.case_id
                .cmp(&b.case_id)
                .then_with(|| a.test_name.cmp(&b.test_name))
                .then_with(|| a.timestamp.total_cmp(&b.timestamp))
        });

        let mut partitions: Vec<&[&ResultRecord]> = records
            .chunk_by(|a, b| a.case_id == b.case_id && a.test_name == b.test_name)
            .collect();
        partitions.sort_by_key(|partition| {
            partition
                .last()
                .map(|latest| latest.testrail_status().id())
                .unwrap_or_default()
        });

        partitions.into_iter().flatten().copied().collect()
    }
}

impl Extend<ResultRecord> for ResultSet {
    fn extend<T: IntoIterator<Item = ResultRecord>>(&mut self, iter: T) {
        self.records.extend(iter);
    }
}

impl FromIterator<ResultRecord> for ResultSet {
    fn from_iter<T: IntoIterator<Item = ResultRecord>>(iter: T) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a ResultRecord;
    type IntoIter = std::slice::Iter<'a, ResultRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
