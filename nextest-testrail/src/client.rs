// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Access to the TestRail API.
//!
//! The [`TestRailApi`] trait is the boundary between this crate and TestRail. [`HttpClient`]
//! implements it over HTTP; tests substitute their own implementations.

use crate::errors::{RemoteServiceError, TransportError};
use base64::Engine;
use serde_json::Value;
use std::{fmt, time::Duration};
use tracing::{debug, error};

/// A TestRail API endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// `get_plan/{plan_id}`
    GetPlan(u64),

    /// `get_run/{run_id}`
    GetRun(u64),

    /// `get_tests/{run_id}`
    GetTests(u64),

    /// `add_run/{project_id}`
    AddRun(u64),

    /// `add_results_for_cases/{run_id}`
    AddResultsForCases(u64),

    /// `close_run/{run_id}`
    CloseRun(u64),

    /// `close_plan/{plan_id}`
    ClosePlan(u64),
}

impl Endpoint {
    /// Returns the path of this endpoint, relative to the API root.
    pub fn path(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GetPlan(id) => write!(f, "get_plan/{id}"),
            Self::GetRun(id) => write!(f, "get_run/{id}"),
            Self::GetTests(id) => write!(f, "get_tests/{id}"),
            Self::AddRun(id) => write!(f, "add_run/{id}"),
            Self::AddResultsForCases(id) => write!(f, "add_results_for_cases/{id}"),
            Self::CloseRun(id) => write!(f, "close_run/{id}"),
            Self::ClosePlan(id) => write!(f, "close_plan/{id}"),
        }
    }
}

/// A synchronous client for the TestRail API.
///
/// Implementations return the decoded JSON body of every response, including error responses:
/// TestRail reports failures as an object with an `error` field, which callers check with
/// [`validate_response`].
pub trait TestRailApi {
    /// Sends a GET request.
    fn get(&self, endpoint: &Endpoint) -> Result<Value, TransportError>;

    /// Sends a POST request with a JSON body.
    fn post(&self, endpoint: &Endpoint, body: &Value) -> Result<Value, TransportError>;
}

impl<T: TestRailApi + ?Sized> TestRailApi for &T {
    fn get(&self, endpoint: &Endpoint) -> Result<Value, TransportError> {
        (**self).get(endpoint)
    }

    fn post(&self, endpoint: &Endpoint, body: &Value) -> Result<Value, TransportError> {
        (**self).post(endpoint, body)
    }
}

impl<T: TestRailApi + ?Sized> TestRailApi for Box<T> {
    fn get(&self, endpoint: &Endpoint) -> Result<Value, TransportError> {
        (**self).get(endpoint)
    }

    fn post(&self, endpoint: &Endpoint, body: &Value) -> Result<Value, TransportError> {
        (**self).post(endpoint, body)
    }
}

/// Checks a TestRail response for an `error` payload.
///
/// Lists never carry errors. An object with a non-empty `error` field is always logged; it is
/// returned as an error only if `strict` is set.
pub fn validate_response(
    endpoint: &Endpoint,
    response: &Value,
    strict: bool,
) -> Result<(), RemoteServiceError> {
    let Some(object) = response.as_object() else {
        return Ok(());
    };

    let message = match object.get("error") {
        None | Some(Value::Null) => return Ok(()),
        Some(Value::String(message)) if message.is_empty() => return Ok(()),
        Some(Value::String(message)) => message.clone(),
        Some(other) => other.to_string(),
    };

    error!("{endpoint}: {message}");
    if strict {
        Err(RemoteServiceError::new(endpoint, message))
    } else {
        Ok(())
    }
}

/// Connection settings for [`HttpClient`].
#[derive(Clone, Debug)]
pub struct HttpClientSettings {
    /// The address of the TestRail instance, e.g. `https://example.testrail.io`.
    pub base_url: String,

    /// The account e-mail address.
    pub email: String,

    /// The account password or API key.
    pub password: String,

    /// How long to wait for each request to complete.
    pub timeout: Duration,

    /// Whether to verify the server's TLS certificate.
    pub verify_tls: bool,
}

/// A [`TestRailApi`] implementation that talks to a TestRail instance over HTTP.
pub struct HttpClient {
    agent: ureq::Agent,
    api_root: String,
    authorization: String,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Don't print credentials.
        f.debug_struct("HttpClient")
            .field("api_root", &self.api_root)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Creates a new client.
    pub fn new(settings: &HttpClientSettings) -> Self {
        let tls_config = ureq::tls::TlsConfig::builder()
            .disable_verification(!settings.verify_tls)
            .build();
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(settings.timeout))
            // TestRail describes failures in the body of 4xx responses.
            .http_status_as_error(false)
            .tls_config(tls_config)
            .build();

        let credentials = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", settings.email, settings.password));

        Self {
            agent: ureq::Agent::new_with_config(config),
            api_root: format!(
                "{}/index.php?/api/v2/",
                settings.base_url.trim_end_matches('/')
            ),
            authorization: format!("Basic {credentials}"),
        }
    }

    fn url(&self, endpoint: &Endpoint) -> String {
        format!("{}{}", self.api_root, endpoint)
    }

    fn read_json(
        endpoint: &Endpoint,
        mut response: ureq::http::Response<ureq::Body>,
    ) -> Result<Value, TransportError> {
        debug!("{endpoint}: HTTP {}", response.status());
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|error| TransportError::Http {
                endpoint: endpoint.path(),
                error: Box::new(error),
            })?;
        // Some endpoints, such as close_run on older TestRail versions, answer with an empty body.
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|error| TransportError::Json {
            endpoint: endpoint.path(),
            error,
        })
    }
}

impl TestRailApi for HttpClient {
    fn get(&self, endpoint: &Endpoint) -> Result<Value, TransportError> {
        let response = self
            .agent
            .get(&self.url(endpoint))
            .header("Authorization", &self.authorization)
            .header("Content-Type", "application/json")
            .call()
            .map_err(|error| TransportError::Http {
                endpoint: endpoint.path(),
                error: Box::new(error),
            })?;
        Self::read_json(endpoint, response)
    }

    fn post(&self, endpoint: &Endpoint, body: &Value) -> Result<Value, TransportError> {
        let body = serde_json::to_vec(body).map_err(|error| TransportError::Json {
            endpoint: endpoint.path(),
            error,
        })?;
        let response = self
            .agent
            .post(&self.url(endpoint))
            .header("Authorization", &self.authorization)
            .header("Content-Type", "application/json")
            .send(&body[..])
            .map_err(|error| TransportError::Http {
                endpoint: endpoint.path(),
                error: Box::new(error),
            })?;
        Self::read_json(endpoint, response)
    }
}
