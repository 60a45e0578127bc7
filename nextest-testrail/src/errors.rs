// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by nextest-testrail.

use crate::{client::Endpoint, result::OutcomeStatus};
use camino::Utf8PathBuf;
use config::ConfigError;
use std::fmt;
use thiserror::Error;

/// An error that occurred while parsing the TestRail config.
#[derive(Debug, Error)]
#[error("failed to parse TestRail config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    err: ConfigError,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, err: ConfigError) -> Self {
        Self {
            config_file: config_file.into(),
            err,
        }
    }

    /// Returns the config file that failed to parse.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }
}

/// A key was set in the [`Register`](crate::register::Register) more than once.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("register key `{key}` is already set, and cannot be set multiple times")]
pub struct DuplicateKeyError {
    key: String,
}

impl DuplicateKeyError {
    pub(crate) fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// Returns the key that was already set.
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// An error that occurred while reading or writing the [`Register`](crate::register::Register).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegisterError {
    /// An error occurred while creating or acquiring the lock file.
    #[error("error acquiring lock on `{path}`")]
    FileLock {
        /// The path to the lock file.
        path: Utf8PathBuf,

        /// The error that occurred.
        #[source]
        error: std::io::Error,
    },

    /// An error occurred while reading the register file.
    #[error("error reading register from `{path}`")]
    Read {
        /// The path to the register file.
        path: Utf8PathBuf,

        /// The error that occurred.
        #[source]
        error: std::io::Error,
    },

    /// The register file didn't contain a JSON object.
    #[error("error deserializing register from `{path}`")]
    Deserialize {
        /// The path to the register file.
        path: Utf8PathBuf,

        /// The error that occurred.
        #[source]
        error: serde_json::Error,
    },

    /// An error occurred while serializing the register.
    #[error("error serializing register for `{path}`")]
    Serialize {
        /// The path to the register file.
        path: Utf8PathBuf,

        /// The error that occurred.
        #[source]
        error: serde_json::Error,
    },

    /// An error occurred while writing the register file.
    #[error("error writing register to `{path}`")]
    Write {
        /// The path to the register file.
        path: Utf8PathBuf,

        /// The error that occurred.
        #[source]
        error: atomicwrites::Error<std::io::Error>,
    },

    /// The key was already present.
    #[error(transparent)]
    DuplicateKey(#[from] DuplicateKeyError),
}

/// Error returned while parsing an [`OutcomeStatus`] from a string.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error(
    "unrecognized test outcome: {input}\n(known values: {})",
    OutcomeStatus::variants().join(", "),
)]
pub struct UnknownStatusError {
    input: String,
}

impl UnknownStatusError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }

    /// Returns the unrecognized input.
    pub fn input(&self) -> &str {
        &self.input
    }
}

/// The kind of TestRail container a [`TerminalStateError`] refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetKind {
    /// A test run.
    Run,

    /// A test plan.
    Plan,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Run => write!(f, "run"),
            Self::Plan => write!(f, "plan"),
        }
    }
}

/// The configured run or plan is already completed, so no results can be published to it.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("Test {kind} is marked as completed.")]
pub struct TerminalStateError {
    kind: TargetKind,
    id: u64,
}

impl TerminalStateError {
    pub(crate) fn new(kind: TargetKind, id: u64) -> Self {
        Self { kind, id }
    }

    /// Returns whether a run or a plan is completed.
    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    /// Returns the ID of the completed run or plan.
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// TestRail answered a request with an `error` payload.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("TestRail returned an error for `{endpoint}`: {message}")]
pub struct RemoteServiceError {
    endpoint: String,
    message: String,
}

impl RemoteServiceError {
    pub(crate) fn new(endpoint: &Endpoint, message: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.path(),
            message: message.into(),
        }
    }

    /// Returns the path of the endpoint that failed.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the error message reported by TestRail.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// An error that occurred while talking to TestRail, before a response could be inspected.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The HTTP request failed.
    #[error("error sending request to `{endpoint}`")]
    Http {
        /// The endpoint path.
        endpoint: String,

        /// The error that occurred.
        #[source]
        error: Box<ureq::Error>,
    },

    /// The response body wasn't valid JSON.
    #[error("error parsing response from `{endpoint}` as JSON")]
    Json {
        /// The endpoint path.
        endpoint: String,

        /// The error that occurred.
        #[source]
        error: serde_json::Error,
    },

    /// The client failed for a reason of its own.
    #[error("request to `{endpoint}` failed: {message}")]
    Other {
        /// The endpoint path.
        endpoint: String,

        /// A description of the failure.
        message: String,
    },
}

/// An error that occurred within the
/// [`TestRailController`](crate::controller::TestRailController).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ControllerError {
    /// The run or plan is completed.
    #[error(transparent)]
    TerminalState(#[from] TerminalStateError),

    /// TestRail returned an error payload.
    #[error(transparent)]
    RemoteService(#[from] RemoteServiceError),

    /// The request could not be completed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The response was valid JSON but didn't have the expected shape.
    #[error("unexpected response from `{endpoint}`")]
    UnexpectedResponse {
        /// The endpoint path.
        endpoint: String,

        /// The error that occurred.
        #[source]
        error: serde_json::Error,
    },
}

/// An error that occurred while driving a
/// [`TestRailSession`](crate::session::TestRailSession).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    /// Reading or writing the register failed.
    #[error(transparent)]
    Register(#[from] RegisterError),

    /// A TestRail operation failed.
    #[error(transparent)]
    Controller(#[from] ControllerError),

    /// A test outcome wasn't recognized.
    #[error(transparent)]
    UnknownStatus(#[from] UnknownStatusError),

    /// A value stored in the register wasn't a valid ID.
    #[error("register value for `{key}` is not a valid ID: {value}")]
    InvalidRegisterValue {
        /// The register key.
        key: String,

        /// The stored value.
        value: serde_json::Value,
    },
}
