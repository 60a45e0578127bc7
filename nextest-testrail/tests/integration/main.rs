// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests of publishing sessions against an in-memory TestRail.

use camino_tempfile::tempdir;
use fixtures::*;
use nextest_testrail::{
    client::Endpoint,
    controller::{PublishTarget, TestRailController},
    errors::ControllerError,
    register::{RUN_ID_KEY, Register},
    result::{OutcomeStatus, TestRailStatus},
    session::{CollectedTest, SessionSettings, TestOutcome, WorkerRole},
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::BTreeSet;

mod processes;

#[test]
fn workers_elect_a_single_run() {
    const WORKERS: usize = 4;

    let dir = tempdir().expect("tempdir created");
    let fake = FakeTestRail::new();
    let tests = vec![
        CollectedTest {
            name: "test_login".to_owned(),
            case_ids: case_ids(&[1234]),
        },
        CollectedTest {
            name: "test_logout".to_owned(),
            case_ids: case_ids(&[5678]),
        },
    ];

    // The register lock is taken on a freshly opened file each time, so threads contend for it
    // the same way separate processes do. `processes` covers real processes.
    let elected: Vec<PublishTarget> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..WORKERS)
            .map(|_| {
                scope.spawn(|| {
                    let mut session = start_session(
                        &fake,
                        dir.path(),
                        controller_settings(PublishTarget::None),
                        session_settings(),
                        WorkerRole::Worker,
                    );
                    session.collect(&tests).expect("collection succeeds");
                    session.controller().target()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("worker thread succeeded"))
            .collect()
    });

    assert_eq!(fake.created().len(), 1, "exactly one run was created");
    assert_eq!(elected, vec![PublishTarget::Run(FIRST_RUN_ID); WORKERS]);
    assert_eq!(
        Register::new(dir.path(), "integration")
            .get_all()
            .expect("register read")
            .get(RUN_ID_KEY),
        Some(&json!(FIRST_RUN_ID))
    );

    let created = &fake.created()[0];
    assert_eq!(created["case_ids"], json!([1234, 5678]));
    assert_eq!(created["suite_id"], json!(SUITE_ID));
    assert_eq!(created["description"], json!("Nightly regression"));
    assert_eq!(created["include_all"], json!(false));
}

#[test]
fn new_run_session_end_to_end() {
    let dir = tempdir().expect("tempdir created");
    let fake = FakeTestRail::new();

    let mut session = start_session(
        &fake,
        dir.path(),
        controller_settings(PublishTarget::None),
        SessionSettings {
            close_on_complete: true,
            ..session_settings()
        },
        WorkerRole::Coordinator,
    );
    assert_eq!(
        session.report_header(),
        "nextest-testrail: A new testrun will be created"
    );

    session
        .collect(&[CollectedTest {
            name: "test_foo".to_owned(),
            case_ids: case_ids(&[1234]),
        }])
        .expect("collection succeeds");

    // Two variants of a parametrized test share a case. The failing variant finishes first, but
    // its result must be the one left standing.
    let mut failing = TestOutcome::new("test_foo[omega]", case_ids(&[1234]), OutcomeStatus::Failed);
    failing.comment = Some("assertion failed: left == right".to_owned());
    failing.defects = vec!["PF-516".to_owned()];
    session.record(failing);
    session.record(TestOutcome::new(
        "test_foo[alpha]",
        case_ids(&[1234]),
        OutcomeStatus::Passed,
    ));
    session.finish().expect("session finished");

    let run = fake.run(FIRST_RUN_ID).expect("run was created");
    assert_eq!(run.tests.get(&1234), Some(&TestRailStatus::Failed.id()));
    assert!(run.is_completed, "run was closed");
    assert_eq!(fake.closed(), vec![Endpoint::CloseRun(FIRST_RUN_ID)]);

    let published = fake.published();
    assert_eq!(published.len(), 1, "one request per run");
    let results = published[0].1["results"]
        .as_array()
        .expect("results is an array");
    assert_eq!(results.len(), 2);
    assert_eq!(results[1]["defects"], json!("PF-516"));
    assert_eq!(
        results[1]["comment"],
        json!("# Test result: #\n    assertion failed: left == right\n")
    );

    assert!(
        !Register::new(dir.path(), "integration")
            .file_path()
            .exists(),
        "register was cleared"
    );
}

#[test]
fn plan_publishes_to_every_open_run() {
    let dir = tempdir().expect("tempdir created");
    let fake = FakeTestRail::new()
        .with_run(59, open_run(&[(1234, TestRailStatus::Untested)]))
        .with_run(
            60,
            FakeRun {
                is_completed: true,
                ..open_run(&[(1234, TestRailStatus::Untested)])
            },
        )
        .with_run(61, open_run(&[(1234, TestRailStatus::Untested)]))
        .with_plan(
            58,
            FakePlan {
                is_completed: false,
                runs: vec![59, 60, 61],
            },
        );

    let controller =
        TestRailController::new(&fake, controller_settings(PublishTarget::Plan(58)))
            .expect("controller created");
    assert_eq!(
        controller.resolve_open_runs(58).expect("plan resolved"),
        vec![59, 61]
    );

    let mut session = start_session(
        &fake,
        dir.path(),
        controller_settings(PublishTarget::Plan(58)),
        SessionSettings {
            close_on_complete: true,
            ..session_settings()
        },
        WorkerRole::Coordinator,
    );
    assert_eq!(
        session.report_header(),
        "nextest-testrail: Using existing testplan ID=58"
    );
    session.collect(&[]).expect("collection succeeds");
    session.record(TestOutcome::new(
        "test_foo",
        case_ids(&[1234]),
        OutcomeStatus::Passed,
    ));
    session.finish().expect("session finished");

    let published = fake.published();
    let run_ids: Vec<u64> = published.iter().map(|(run_id, _)| *run_id).collect();
    assert_eq!(run_ids, vec![59, 61]);
    assert_eq!(published[0].1, published[1].1, "both runs got the same results");
    assert_eq!(
        fake.run(60).expect("run exists").tests.get(&1234),
        Some(&TestRailStatus::Untested.id()),
        "the completed run is left alone"
    );
    assert_eq!(fake.closed(), vec![Endpoint::ClosePlan(58)]);
    assert!(fake.run(61).expect("run exists").is_completed, "plan was closed");
}

#[test]
fn blocked_cases_are_not_published() {
    let dir = tempdir().expect("tempdir created");
    let fake = FakeTestRail::new().with_run(
        10,
        open_run(&[
            (1234, TestRailStatus::Blocked),
            (5678, TestRailStatus::Untested),
        ]),
    );

    let mut settings = controller_settings(PublishTarget::Run(10));
    settings.publish_blocked = false;
    let mut session = start_session(
        &fake,
        dir.path(),
        settings,
        session_settings(),
        WorkerRole::Coordinator,
    );
    session.record(TestOutcome::new(
        "test_blocked",
        case_ids(&[1234]),
        OutcomeStatus::Failed,
    ));
    session.record(TestOutcome::new(
        "test_open",
        case_ids(&[5678]),
        OutcomeStatus::Passed,
    ));
    session.finish().expect("session finished");

    let published = fake.published();
    let case_ids: BTreeSet<u64> = published[0].1["results"]
        .as_array()
        .expect("results is an array")
        .iter()
        .filter_map(|result| result["case_id"].as_u64())
        .collect();
    assert_eq!(case_ids, BTreeSet::from([5678]));

    let run = fake.run(10).expect("run exists");
    assert_eq!(run.tests.get(&1234), Some(&TestRailStatus::Blocked.id()));
    assert_eq!(run.tests.get(&5678), Some(&TestRailStatus::Passed.id()));
}

#[test]
fn skip_missing_reports_tests_outside_the_run() {
    let dir = tempdir().expect("tempdir created");
    let fake = FakeTestRail::new().with_run(10, open_run(&[(1234, TestRailStatus::Untested)]));

    let mut session = start_session(
        &fake,
        dir.path(),
        controller_settings(PublishTarget::Run(10)),
        SessionSettings {
            skip_missing: true,
            ..session_settings()
        },
        WorkerRole::Coordinator,
    );
    let outcome = session
        .collect(&[
            CollectedTest {
                name: "test_in_run".to_owned(),
                case_ids: case_ids(&[1234]),
            },
            CollectedTest {
                name: "test_not_in_run".to_owned(),
                case_ids: case_ids(&[9999]),
            },
        ])
        .expect("collection succeeds");

    let skipped: Vec<_> = outcome
        .skipped
        .iter()
        .map(|test| (test.name.as_str(), test.reason))
        .collect();
    assert_eq!(
        skipped,
        vec![("test_not_in_run", "Test is not present in testrun.")]
    );
}

#[test]
fn completed_run_is_rejected() {
    let fake = FakeTestRail::new().with_run(
        10,
        FakeRun {
            is_completed: true,
            ..Default::default()
        },
    );
    let error = TestRailController::new(&fake, controller_settings(PublishTarget::Run(10)))
        .expect_err("completed run is rejected");
    assert!(matches!(error, ControllerError::TerminalState(_)));
    assert_eq!(error.to_string(), "Test run is marked as completed.");
}

#[test]
fn publishing_to_a_missing_run_fails() {
    let dir = tempdir().expect("tempdir created");
    let fake = FakeTestRail::new();
    let register = Register::new(dir.path(), "integration");
    register
        .set_value(RUN_ID_KEY, 77)
        .expect("register written");

    // Another process elected run 77, which doesn't exist.
    let mut session = start_session(
        &fake,
        dir.path(),
        controller_settings(PublishTarget::None),
        session_settings(),
        WorkerRole::Coordinator,
    );
    session.collect(&[]).expect("collection succeeds");
    session.record(TestOutcome::new(
        "test_foo",
        case_ids(&[1234]),
        OutcomeStatus::Passed,
    ));
    let error = session.finish().expect_err("publishing fails");
    assert_eq!(
        error.to_string(),
        "TestRail returned an error for `add_results_for_cases/77`: \
         Field :run_id is not a valid test run."
    );
    assert!(register.file_path().exists(), "register is kept on failure");
}
