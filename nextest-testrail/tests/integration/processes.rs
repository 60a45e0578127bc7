// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Run election across separate worker processes.
//!
//! The test binary re-runs itself once per worker, selecting [`election_worker`] and pointing it
//! at a shared directory through [`ELECTION_DIR_ENV`].

use crate::fixtures::*;
use camino::Utf8PathBuf;
use camino_tempfile::tempdir;
use nextest_testrail::{
    controller::PublishTarget,
    register::{RUN_ID_KEY, Register},
    session::{CollectedTest, WorkerRole},
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::{
    collections::BTreeSet,
    process::{Command, Stdio},
};

const ELECTION_DIR_ENV: &str = "__NEXTEST_TESTRAIL_ELECTION_DIR";
const ELECTED_PREFIX: &str = "elected-";

#[test]
fn worker_processes_elect_a_single_run() {
    const WORKERS: usize = 4;

    let dir = tempdir().expect("tempdir created");
    let exe = std::env::current_exe().expect("test binary path is known");

    let children: Vec<_> = (0..WORKERS)
        .map(|_| {
            Command::new(&exe)
                .args(["--exact", "processes::election_worker", "--test-threads=1"])
                .env(ELECTION_DIR_ENV, dir.path())
                .stdout(Stdio::null())
                .spawn()
                .expect("spawned worker process")
        })
        .collect();
    for mut child in children {
        let status = child.wait().expect("waited for worker process");
        assert!(status.success(), "worker process failed: {status}");
    }

    let mut reports = 0;
    let mut elected = BTreeSet::new();
    for entry in dir.path().read_dir_utf8().expect("dir read") {
        let entry = entry.expect("dir entry read");
        if entry.file_name().starts_with(ELECTED_PREFIX) {
            reports += 1;
            let run_id: u64 = std::fs::read_to_string(entry.path())
                .expect("report read")
                .parse()
                .expect("report is a run ID");
            elected.insert(run_id);
        }
    }
    assert_eq!(reports, WORKERS, "every worker reported");

    // Each process numbers its runs from its own pid, so a second creation would show up as a
    // second ID.
    assert_eq!(elected.len(), 1, "all workers adopted one run: {elected:?}");
    let run_id = elected.first().copied().expect("one run elected");
    assert_eq!(
        Register::new(dir.path(), "integration")
            .get_all()
            .expect("register read")
            .get(RUN_ID_KEY),
        Some(&json!(run_id))
    );
}

/// One worker of [`worker_processes_elect_a_single_run`]. Does nothing unless spawned by it.
#[test]
fn election_worker() {
    let Some(dir) = std::env::var_os(ELECTION_DIR_ENV) else {
        return;
    };
    let dir = Utf8PathBuf::try_from(std::path::PathBuf::from(dir)).expect("dir is UTF-8");
    let pid = std::process::id();

    let fake = FakeTestRail::new().with_first_run_id(u64::from(pid));
    let mut session = start_session(
        &fake,
        &dir,
        controller_settings(PublishTarget::None),
        session_settings(),
        WorkerRole::Worker,
    );
    session
        .collect(&[CollectedTest::from_markers("test_login", ["C1234"])])
        .expect("collection succeeds");

    let run_id = session
        .controller()
        .target()
        .run_id()
        .expect("a run was elected");
    std::fs::write(
        dir.join(format!("{ELECTED_PREFIX}{pid}")),
        run_id.to_string(),
    )
    .expect("report written");
}
