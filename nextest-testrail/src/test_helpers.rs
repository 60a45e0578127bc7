// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    client::{Endpoint, TestRailApi},
    errors::TransportError,
};
use serde_json::{Value, json};
use std::{cell::RefCell, collections::HashMap};

/// A [`TestRailApi`] that answers with canned responses and records every request.
///
/// Endpoints without a canned response answer with an empty object.
#[derive(Debug, Default)]
pub(crate) struct MockClient {
    gets: HashMap<Endpoint, Value>,
    posts: HashMap<Endpoint, Value>,
    failing: Vec<Endpoint>,
    requests: RefCell<Vec<(Endpoint, Option<Value>)>>,
}

impl MockClient {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_get(mut self, endpoint: Endpoint, response: Value) -> Self {
        self.gets.insert(endpoint, response);
        self
    }

    pub(crate) fn with_post(mut self, endpoint: Endpoint, response: Value) -> Self {
        self.posts.insert(endpoint, response);
        self
    }

    pub(crate) fn with_transport_error(mut self, endpoint: Endpoint) -> Self {
        self.failing.push(endpoint);
        self
    }

    /// All requests, in order. POST requests carry their body.
    pub(crate) fn requests(&self) -> Vec<(Endpoint, Option<Value>)> {
        self.requests.borrow().clone()
    }

    /// POST requests and their bodies, in order.
    pub(crate) fn posts(&self) -> Vec<(Endpoint, Value)> {
        self.requests
            .borrow()
            .iter()
            .filter_map(|(endpoint, body)| body.clone().map(|body| (*endpoint, body)))
            .collect()
    }

    fn respond(
        &self,
        responses: &HashMap<Endpoint, Value>,
        endpoint: &Endpoint,
        body: Option<&Value>,
    ) -> Result<Value, TransportError> {
        self.requests
            .borrow_mut()
            .push((*endpoint, body.cloned()));
        if self.failing.contains(endpoint) {
            return Err(TransportError::Other {
                endpoint: endpoint.path(),
                message: "connection refused".to_owned(),
            });
        }
        Ok(responses.get(endpoint).cloned().unwrap_or_else(|| json!({})))
    }
}

impl TestRailApi for MockClient {
    fn get(&self, endpoint: &Endpoint) -> Result<Value, TransportError> {
        self.respond(&self.gets, endpoint, None)
    }

    fn post(&self, endpoint: &Endpoint, body: &Value) -> Result<Value, TransportError> {
        self.respond(&self.posts, endpoint, Some(body))
    }
}

/// An open plan with open runs 59 and 61, and completed run 60.
pub(crate) fn plan_response() -> Value {
    json!({
        "id": 100,
        "is_completed": false,
        "entries": [
            {"runs": [
                {"id": 59, "is_completed": false},
                {"id": 60, "is_completed": true},
            ]},
            {"runs": [
                {"id": 61, "is_completed": false},
            ]},
        ],
    })
}
