// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Publishing results to TestRail runs and plans.

use crate::{
    client::{Endpoint, TestRailApi, validate_response},
    errors::{ControllerError, TargetKind, TerminalStateError},
    ordering::ResultSet,
    result::{CaseId, DEFAULT_COMMENT_SIZE_LIMIT, ResultPayload, TestRailStatus},
};
use chrono::Utc;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use std::{collections::BTreeSet, fmt};
use tracing::{info, warn};

/// The format of the timestamp in generated run names.
pub const RUN_NAME_DATE_FORMAT: &str = "%d-%m-%Y %H:%M:%S";

/// The run or plan that receives results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PublishTarget {
    /// Nothing is configured yet: a new run must be created.
    #[default]
    None,

    /// An existing run.
    Run(u64),

    /// An existing plan. Results are published to each of its open runs.
    Plan(u64),
}

impl PublishTarget {
    /// Creates a target from configured IDs, where 0 means unset.
    ///
    /// If both are set, the run takes precedence.
    pub fn from_ids(run_id: u64, plan_id: u64) -> Self {
        match (run_id, plan_id) {
            (0, 0) => Self::None,
            (0, plan_id) => Self::Plan(plan_id),
            (run_id, 0) => Self::Run(run_id),
            (run_id, plan_id) => {
                warn!("both run ID={run_id} and plan ID={plan_id} are configured, using the run");
                Self::Run(run_id)
            }
        }
    }

    /// Returns the run ID, if this target is a run.
    pub fn run_id(self) -> Option<u64> {
        match self {
            Self::Run(id) => Some(id),
            _ => None,
        }
    }

    /// Returns the plan ID, if this target is a plan.
    pub fn plan_id(self) -> Option<u64> {
        match self {
            Self::Plan(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for PublishTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "a new testrun"),
            Self::Run(id) => write!(f, "testrun ID={id}"),
            Self::Plan(id) => write!(f, "testplan ID={id}"),
        }
    }
}

/// Settings for a [`TestRailController`].
#[derive(Clone, Debug, Default)]
pub struct ControllerSettings {
    /// Where results go.
    pub target: PublishTarget,

    /// Whether results for cases that are blocked in TestRail are published.
    pub publish_blocked: bool,

    /// Whether new runs include every case of the suite, rather than only the collected ones.
    pub include_all: bool,

    /// The version of the software under test, attached to each result.
    pub version: Option<String>,

    /// Text added to the comment of every result.
    pub custom_comment: Option<String>,

    /// The name of new runs. Generated from the current time if unset.
    pub run_name: Option<String>,

    /// A plan configured together with the run in `target`. It receives no results, but must not
    /// be completed either.
    pub overridden_plan_id: Option<u64>,
}

/// The fields of a run to create.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunCreation {
    /// The project the run is created in.
    pub project_id: u64,

    /// The suite the cases belong to.
    pub suite_id: u64,

    /// The user the run is assigned to.
    pub assignee_id: Option<u64>,

    /// The run description.
    pub description: String,

    /// The cases included in the run, unless all cases are included.
    pub case_ids: Vec<CaseId>,

    /// The milestone the run belongs to.
    pub milestone_id: Option<u64>,
}

/// Publishes results to the runs and plans of a TestRail instance.
#[derive(Debug)]
pub struct TestRailController<C> {
    client: C,
    target: PublishTarget,
    publish_blocked: bool,
    include_all: bool,
    version: Option<String>,
    custom_comment: Option<String>,
    run_name: String,
    overridden_plan_id: Option<u64>,
    comment_size_limit: usize,
}

impl<C: TestRailApi> TestRailController<C> {
    /// Creates a new controller.
    ///
    /// Returns [`ControllerError::TerminalState`] if the configured run or plan is already
    /// completed. An overridden plan is checked as well.
    pub fn new(client: C, settings: ControllerSettings) -> Result<Self, ControllerError> {
        let ControllerSettings {
            target,
            publish_blocked,
            include_all,
            version,
            custom_comment,
            run_name,
            overridden_plan_id,
        } = settings;

        let this = Self {
            client,
            target,
            publish_blocked,
            include_all,
            version: version.filter(|v| !v.is_empty()),
            custom_comment: custom_comment.filter(|c| !c.is_empty()),
            run_name: run_name
                .filter(|n| !n.is_empty())
                .unwrap_or_else(new_run_name),
            overridden_plan_id: overridden_plan_id.filter(|_| target.run_id().is_some()),
            comment_size_limit: DEFAULT_COMMENT_SIZE_LIMIT,
        };

        if let Some(plan_id) = target.plan_id().or(this.overridden_plan_id) {
            this.ensure_open(TargetKind::Plan, plan_id)?;
        }
        if let Some(run_id) = target.run_id() {
            this.ensure_open(TargetKind::Run, run_id)?;
        }

        Ok(this)
    }

    fn ensure_open(&self, kind: TargetKind, id: u64) -> Result<(), ControllerError> {
        let endpoint = match kind {
            TargetKind::Run => Endpoint::GetRun(id),
            TargetKind::Plan => Endpoint::GetPlan(id),
        };
        let status: CompletionStatus = self.get(&endpoint)?;
        if status.is_completed {
            return Err(TerminalStateError::new(kind, id).into());
        }
        Ok(())
    }

    /// Returns the client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns the run or plan results are published to.
    pub fn target(&self) -> PublishTarget {
        self.target
    }

    /// Returns the plan configured together with the run results are published to, if any.
    pub fn overridden_plan_id(&self) -> Option<u64> {
        self.overridden_plan_id
    }

    /// Returns the name used for new runs.
    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    /// Sets the maximum number of characters kept from each result comment.
    pub fn set_comment_size_limit(&mut self, limit: usize) {
        self.comment_size_limit = limit;
    }

    /// Publishes results to the given run from now on.
    pub fn set_run_id(&mut self, run_id: u64) {
        self.target = PublishTarget::Run(run_id);
    }

    /// Returns the IDs of the runs in a plan that aren't completed.
    pub fn resolve_open_runs(&self, plan_id: u64) -> Result<Vec<u64>, ControllerError> {
        let plan: PlanResponse = self.get(&Endpoint::GetPlan(plan_id))?;
        Ok(plan
            .entries
            .into_iter()
            .flat_map(|entry| entry.runs)
            .filter(|run| !run.is_completed)
            .map(|run| run.id)
            .collect())
    }

    /// Returns the IDs of the cases that are blocked in a run.
    pub fn list_blocked_cases(&self, run_id: u64) -> Result<BTreeSet<u64>, ControllerError> {
        let tests = self.get_tests(run_id)?;
        Ok(tests
            .into_iter()
            .filter(|test| test.status_id == Some(u64::from(TestRailStatus::Blocked.id())))
            .filter_map(|test| test.case_id)
            .collect())
    }

    /// Returns the IDs of all cases in a run.
    pub fn list_case_ids(&self, run_id: u64) -> Result<BTreeSet<u64>, ControllerError> {
        let tests = self.get_tests(run_id)?;
        Ok(tests.into_iter().filter_map(|test| test.case_id).collect())
    }

    /// Publishes results to a single run, in one request.
    ///
    /// Unless blocked results are published, results for cases that are blocked in the run are
    /// dropped.
    pub fn publish(&self, run_id: u64, results: &ResultSet) -> Result<(), ControllerError> {
        let mut sorted = results.sorted();

        if !self.publish_blocked {
            info!("Blocked testcases will not be published.");
            let blocked = self.list_blocked_cases(run_id)?;
            info!("Blocked testcases excluded: {}.", join_ids(&blocked));
            sorted.retain(|record| !blocked.contains(&record.case_id.get()));
        }

        let payloads: Vec<ResultPayload> = sorted
            .into_iter()
            .map(|record| {
                let mut payload =
                    record.to_payload(self.custom_comment.as_deref(), self.comment_size_limit);
                payload.version = self.version.clone();
                payload
            })
            .collect();

        let body = serde_json::json!({ "results": payloads });
        self.post(&Endpoint::AddResultsForCases(run_id), &body)?;
        Ok(())
    }

    /// Publishes results to the configured run, or to every open run of the configured plan.
    ///
    /// Does nothing if neither is configured.
    pub fn upload(&self, results: &ResultSet) -> Result<(), ControllerError> {
        let case_ids: Vec<u64> = results.case_ids().map(CaseId::get).collect();
        info!("Publishing testcases: {}.", join_ids(&case_ids));

        match self.target {
            PublishTarget::None => {
                warn!("no testrun or testplan is configured, not publishing results");
                return Ok(());
            }
            PublishTarget::Run(run_id) => self.publish(run_id, results)?,
            PublishTarget::Plan(plan_id) => {
                let run_ids = self.resolve_open_runs(plan_id)?;
                info!("Updating testruns: {}.", join_ids(&run_ids));
                for run_id in run_ids {
                    self.publish(run_id, results)?;
                }
            }
        }

        info!("Publishing complete.");
        Ok(())
    }

    /// Closes the configured run or plan. Does nothing if neither is configured.
    pub fn close(&self) -> Result<(), ControllerError> {
        self.close_target(self.target)
    }

    /// Closes the given run or plan. Does nothing for [`PublishTarget::None`].
    pub fn close_target(&self, target: PublishTarget) -> Result<(), ControllerError> {
        match target {
            PublishTarget::None => {}
            PublishTarget::Run(run_id) => {
                self.post(&Endpoint::CloseRun(run_id), &serde_json::json!({}))?;
                info!("Test run with ID={run_id} was closed");
            }
            PublishTarget::Plan(plan_id) => {
                self.post(&Endpoint::ClosePlan(plan_id), &serde_json::json!({}))?;
                info!("Test plan with ID={plan_id} was closed");
            }
        }
        Ok(())
    }

    /// Creates a new run and returns its ID.
    pub fn create_run(&self, creation: &RunCreation) -> Result<u64, ControllerError> {
        if self.include_all {
            info!("Option \"Include all testcases from test suite for test run\" active.");
        }

        let case_ids: Vec<u64> = creation.case_ids.iter().map(|id| id.get()).collect();
        let body = serde_json::json!({
            "suite_id": creation.suite_id,
            "name": self.run_name,
            "description": creation.description,
            "assignedto_id": creation.assignee_id,
            "include_all": self.include_all,
            "case_ids": case_ids,
            "milestone_id": creation.milestone_id,
        });

        let response = self.post(&Endpoint::AddRun(creation.project_id), &body)?;
        let created: CreatedRun = parse_response(&Endpoint::AddRun(creation.project_id), response)?;
        info!(
            "New testrun created with name \"{}\" and ID={}",
            self.run_name, created.id
        );
        Ok(created.id)
    }

    // ---
    // Helper methods
    // ---

    fn get_tests(&self, run_id: u64) -> Result<Vec<TestEntry>, ControllerError> {
        let response: TestsResponse = self.get(&Endpoint::GetTests(run_id))?;
        Ok(response.into_tests())
    }

    fn get<T: DeserializeOwned>(&self, endpoint: &Endpoint) -> Result<T, ControllerError> {
        let response = self.client.get(endpoint)?;
        validate_response(endpoint, &response, true)?;
        parse_response(endpoint, response)
    }

    fn post(&self, endpoint: &Endpoint, body: &Value) -> Result<Value, ControllerError> {
        let response = self.client.post(endpoint, body)?;
        validate_response(endpoint, &response, true)?;
        Ok(response)
    }
}

fn parse_response<T: DeserializeOwned>(
    endpoint: &Endpoint,
    response: Value,
) -> Result<T, ControllerError> {
    serde_json::from_value(response).map_err(|error| ControllerError::UnexpectedResponse {
        endpoint: endpoint.path(),
        error,
    })
}

fn new_run_name() -> String {
    format!("Automated Run {}", Utc::now().format(RUN_NAME_DATE_FORMAT))
}

fn join_ids<'a>(ids: impl IntoIterator<Item = &'a u64>) -> String {
    ids.into_iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Deserialize)]
struct CompletionStatus {
    #[serde(default)]
    is_completed: bool,
}

#[derive(Debug, Deserialize)]
struct PlanResponse {
    #[serde(default)]
    entries: Vec<PlanEntry>,
}

#[derive(Debug, Deserialize)]
struct PlanEntry {
    #[serde(default)]
    runs: Vec<PlanRun>,
}

#[derive(Debug, Deserialize)]
struct PlanRun {
    id: u64,
    #[serde(default)]
    is_completed: bool,
}

/// `get_tests` answers with an object on TestRail 7 and later, and a bare list before that.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TestsResponse {
    Paginated {
        #[serde(default)]
        tests: Option<Vec<TestEntry>>,
    },
    List(Vec<TestEntry>),
}

impl TestsResponse {
    fn into_tests(self) -> Vec<TestEntry> {
        match self {
            Self::Paginated { tests } => tests.unwrap_or_default(),
            Self::List(tests) => tests,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TestEntry {
    #[serde(default)]
    case_id: Option<u64>,
    #[serde(default)]
    status_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct CreatedRun {
    id: u64,
}
