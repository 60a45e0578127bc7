// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A TestRail publishing session.
//!
//! A [`TestRailSession`] is driven by the test runner through three phases:
//!
//! 1. [`collect`](TestRailSession::collect), once the tests to run are known. If no run or plan is
//!    configured, this elects the run shared by every process of the session.
//! 2. [`record`](TestRailSession::record), as each test finishes.
//! 3. [`finish`](TestRailSession::finish), at the end of the session, to publish results.
//!
//! When tests are spread across worker processes, each worker drives its own session. The
//! processes coordinate through a [`Register`]: the first process to reach the election creates the
//! run and stores its ID, and every other process adopts it.

use crate::{
    client::TestRailApi,
    controller::{PublishTarget, RunCreation, TestRailController},
    converters::{clean_case_ids, clean_defect_ids, join_defect_ids},
    errors::{SessionError, UnknownStatusError},
    ordering::ResultSet,
    register::{PLAN_ID_KEY, RUN_ID_KEY, Register},
    result::{CaseId, Defects, OutcomeStatus, Parametrization, ResultRecord},
};
use chrono::Utc;
use indexmap::IndexSet;
use serde_json::{Map, Value};
use std::{collections::BTreeSet, ffi::OsString};
use tracing::{debug, info};

/// Set in worker processes to the name of the worker.
pub const WORKER_ENV: &str = "NEXTEST_TESTRAIL_WORKER";

/// Set in worker processes to the total number of workers.
pub const WORKER_COUNT_ENV: &str = "NEXTEST_TESTRAIL_WORKER_COUNT";

/// The reason given for tests skipped because their cases aren't part of the run.
pub const MISSING_FROM_RUN_REASON: &str = "Test is not present in testrun.";

/// The part a process plays in a session spread across several processes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerRole {
    /// The only process, or the one coordinating the workers. Closes runs and clears the register
    /// at the end of the session.
    Coordinator,

    /// One of several worker processes.
    Worker,
}

impl WorkerRole {
    /// Determines the role of the current process from the environment.
    ///
    /// A process with [`WORKER_ENV`] or [`WORKER_COUNT_ENV`] set is a worker.
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var_os(WORKER_ENV),
            std::env::var_os(WORKER_COUNT_ENV),
        )
    }

    fn from_vars(worker: Option<OsString>, worker_count: Option<OsString>) -> Self {
        let is_set = |value: &Option<OsString>| value.as_ref().is_some_and(|v| !v.is_empty());
        if is_set(&worker) || is_set(&worker_count) {
            Self::Worker
        } else {
            Self::Coordinator
        }
    }

    /// Returns true if this is the coordinating process.
    pub fn is_coordinator(self) -> bool {
        self == Self::Coordinator
    }
}

/// Settings for a [`TestRailSession`].
#[derive(Clone, Debug, Default)]
pub struct SessionSettings {
    /// The project new runs are created in.
    pub project_id: u64,

    /// The suite new runs are created from.
    pub suite_id: u64,

    /// The user new runs are assigned to.
    pub assignee_id: Option<u64>,

    /// The milestone new runs belong to.
    pub milestone_id: Option<u64>,

    /// The description of new runs.
    pub run_description: String,

    /// Whether to close the run or plan at the end of the session.
    pub close_on_complete: bool,

    /// Whether to skip tests whose cases aren't part of the configured run.
    pub skip_missing: bool,
}

/// A test that is about to run, and the cases it reports to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectedTest {
    /// The name of the test.
    pub name: String,

    /// The cases the test reports to. Tests without cases are ignored.
    pub case_ids: Vec<CaseId>,
}

impl CollectedTest {
    /// Creates a collected test from the raw case references attached to it, such as `C1234`.
    ///
    /// References that don't name a case are dropped.
    pub fn from_markers<I, S>(name: impl Into<String>, case_refs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            name: name.into(),
            case_ids: clean_case_ids(case_refs),
        }
    }
}

/// A test that should be skipped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedTest {
    /// The name of the test.
    pub name: String,

    /// Why the test should be skipped.
    pub reason: &'static str,
}

/// The result of [`TestRailSession::collect`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CollectionOutcome {
    /// Tests the runner should skip.
    pub skipped: Vec<SkippedTest>,
}

/// The outcome of a finished test.
#[derive(Clone, Debug, PartialEq)]
pub struct TestOutcome {
    /// The name of the test.
    pub test_name: String,

    /// The cases the test reports to.
    pub case_ids: Vec<CaseId>,

    /// Whether the test passed.
    pub status: OutcomeStatus,

    /// How long the test took, in seconds.
    pub duration: Option<f64>,

    /// Failure details or other output.
    pub comment: Option<String>,

    /// Defects associated with the test.
    pub defects: Vec<String>,

    /// The test's parameters, if it is parametrized.
    pub parametrization: Option<Parametrization>,
}

impl TestOutcome {
    /// Creates an outcome with no duration, comment, defects or parametrization.
    pub fn new(test_name: impl Into<String>, case_ids: Vec<CaseId>, status: OutcomeStatus) -> Self {
        Self {
            test_name: test_name.into(),
            case_ids,
            status,
            duration: None,
            comment: None,
            defects: Vec::new(),
            parametrization: None,
        }
    }

    /// Creates an outcome from the status name reported by the test runner.
    pub fn parse(
        test_name: impl Into<String>,
        case_ids: Vec<CaseId>,
        status: &str,
    ) -> Result<Self, UnknownStatusError> {
        Ok(Self::new(test_name, case_ids, status.parse()?))
    }

    /// Creates an outcome from the raw case references attached to the test and the status name
    /// reported by the test runner.
    pub fn from_markers<I, S>(
        test_name: impl Into<String>,
        case_refs: I,
        status: &str,
    ) -> Result<Self, UnknownStatusError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::parse(test_name, clean_case_ids(case_refs), status)
    }

    /// Sets the defects from the raw defect references attached to the test.
    pub fn with_defect_markers<I, S>(mut self, defect_refs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.defects = clean_defect_ids(defect_refs);
        self
    }
}

/// Collects test outcomes over a session and publishes them to TestRail.
#[derive(Debug)]
pub struct TestRailSession<C> {
    controller: TestRailController<C>,
    register: Register,
    settings: SessionSettings,
    role: WorkerRole,
    results: ResultSet,
}

impl<C: TestRailApi> TestRailSession<C> {
    /// Starts a session.
    ///
    /// A run or plan configured on the controller is stored in the register, unless another process
    /// already stored one.
    pub fn new(
        controller: TestRailController<C>,
        register: Register,
        settings: SessionSettings,
        role: WorkerRole,
    ) -> Result<Self, SessionError> {
        {
            let locked = register.lock()?;
            let target = controller.target();
            if let Some(run_id) = target.run_id()
                && locked.get(RUN_ID_KEY)?.is_none()
            {
                locked.set_value(RUN_ID_KEY, run_id)?;
            }
            if let Some(plan_id) = target.plan_id()
                && locked.get(PLAN_ID_KEY)?.is_none()
            {
                locked.set_value(PLAN_ID_KEY, plan_id)?;
            }
        }

        Ok(Self {
            controller,
            register,
            settings,
            role,
            results: ResultSet::new(),
        })
    }

    /// Returns the line describing where results will be published.
    pub fn report_header(&self) -> String {
        // A plan configured together with a run is reported, even though results go to the run.
        let message = match (self.controller.target(), self.controller.overridden_plan_id()) {
            (PublishTarget::None, _) => "A new testrun will be created".to_owned(),
            (PublishTarget::Plan(plan_id), _) | (PublishTarget::Run(_), Some(plan_id)) => {
                format!("Using existing testplan ID={plan_id}")
            }
            (PublishTarget::Run(run_id), None) => format!("Using existing testrun ID={run_id}"),
        };
        format!("nextest-testrail: {message}")
    }

    /// Prepares the session for the collected tests.
    ///
    /// With neither a run nor a plan configured, this elects the run the session publishes to,
    /// creating it if no other process has. With a run configured and missing cases skipped, the
    /// returned outcome lists the tests none of whose cases are in the run.
    pub fn collect(&mut self, tests: &[CollectedTest]) -> Result<CollectionOutcome, SessionError> {
        let mut outcome = CollectionOutcome::default();

        match self.controller.target() {
            PublishTarget::Run(run_id) => {
                if self.settings.skip_missing {
                    let present = self.controller.list_case_ids(run_id)?;
                    outcome.skipped = missing_from_run(tests, &present);
                    debug!("{} tests are not present in testrun", outcome.skipped.len());
                }
            }
            PublishTarget::Plan(_) => {}
            PublishTarget::None => {
                let case_ids: IndexSet<CaseId> = tests
                    .iter()
                    .flat_map(|test| test.case_ids.iter().copied())
                    .collect();
                self.elect_run(case_ids.into_iter().collect())?;
            }
        }

        Ok(outcome)
    }

    /// Records the outcome of a finished test, once for each of its cases.
    pub fn record(&mut self, outcome: TestOutcome) {
        let timestamp = Utc::now().timestamp_micros() as f64 / 1_000_000.0;
        let defects = join_defect_ids(&outcome.defects).map(Defects::Single);

        for &case_id in &outcome.case_ids {
            debug!(
                "recording {} for case {case_id} ({})",
                outcome.status, outcome.test_name
            );
            self.results.append(ResultRecord {
                case_id,
                test_name: outcome.test_name.clone(),
                status: outcome.status,
                duration: outcome.duration,
                comment: outcome.comment.clone(),
                defects: defects.clone(),
                parametrization: outcome.parametrization.clone(),
                timestamp,
            });
        }
    }

    /// Returns the results recorded so far.
    pub fn results(&self) -> &ResultSet {
        &self.results
    }

    /// Returns the controller.
    pub fn controller(&self) -> &TestRailController<C> {
        &self.controller
    }

    /// Publishes recorded results, and, in the coordinating process, wraps up the session.
    ///
    /// The coordinator closes the run or plan stored in the register if configured to, then removes
    /// the register.
    pub fn finish(self) -> Result<(), SessionError> {
        if !self.results.is_empty() {
            self.controller.upload(&self.results)?;
        }

        if self.role.is_coordinator() {
            if self.settings.close_on_complete {
                // Another process may have elected the run, so always read it from the register.
                let stored = self.register.get_all()?;
                let target = PublishTarget::from_ids(
                    stored_id(&stored, RUN_ID_KEY)?,
                    stored_id(&stored, PLAN_ID_KEY)?,
                );
                self.controller.close_target(target)?;
            }
            self.register.clear();
        }

        Ok(())
    }

    fn elect_run(&mut self, case_ids: Vec<CaseId>) -> Result<(), SessionError> {
        let run_id = {
            // The lock is held across creation so that only one process creates a run.
            let locked = self.register.lock()?;
            match locked.get(RUN_ID_KEY)? {
                Some(value) => {
                    let run_id = register_id(RUN_ID_KEY, value)?;
                    info!("Using testrun ID={run_id} created by another process");
                    run_id
                }
                None => {
                    let run_id = self.controller.create_run(&RunCreation {
                        project_id: self.settings.project_id,
                        suite_id: self.settings.suite_id,
                        assignee_id: self.settings.assignee_id,
                        description: self.settings.run_description.clone(),
                        case_ids,
                        milestone_id: self.settings.milestone_id,
                    })?;
                    locked.set_value(RUN_ID_KEY, run_id)?;
                    run_id
                }
            }
        };

        self.controller.set_run_id(run_id);
        Ok(())
    }
}

fn missing_from_run(tests: &[CollectedTest], present: &BTreeSet<u64>) -> Vec<SkippedTest> {
    tests
        .iter()
        .filter(|test| !test.case_ids.is_empty())
        .filter(|test| !test.case_ids.iter().any(|id| present.contains(&id.get())))
        .map(|test| SkippedTest {
            name: test.name.clone(),
            reason: MISSING_FROM_RUN_REASON,
        })
        .collect()
}

fn register_id(key: &str, value: Value) -> Result<u64, SessionError> {
    match value.as_u64() {
        Some(id) => Ok(id),
        None => Err(SessionError::InvalidRegisterValue {
            key: key.to_owned(),
            value,
        }),
    }
}

fn stored_id(stored: &Map<String, Value>, key: &str) -> Result<u64, SessionError> {
    match stored.get(key) {
        None | Some(Value::Null) => Ok(0),
        Some(value) => register_id(key, value.clone()),
    }
}
