// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Publishing of test results to [TestRail](https://www.testrail.com/).
//!
//! The flow of operations is:
//!
//! 1. At the start of a session, a [`TestRailSession`](session::TestRailSession) resolves the
//!    run or plan that receives results. If neither is configured, cooperating worker processes
//!    elect a single new run through the file-backed [`Register`](register::Register).
//! 2. As each test completes, its outcome is turned into one
//!    [`ResultRecord`](result::ResultRecord) per associated case.
//! 3. At the end of the session, the records are put into publish order by
//!    [`ResultSet`](ordering::ResultSet) and submitted by the
//!    [`TestRailController`](controller::TestRailController).

pub mod client;
pub mod config;
pub mod controller;
pub mod converters;
pub mod errors;
pub mod ordering;
pub mod output;
pub mod register;
pub mod result;
pub mod session;

#[cfg(test)]
pub(crate) mod test_helpers;
