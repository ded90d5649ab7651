//! Scripted transport for unit tests.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::error::StoreError;
use crate::http::{HttpRequest, HttpResponse, Transport};

/// Replays queued outcomes in order and records every request it sees.
/// Running out of script is a connection failure.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<HttpResponse, String>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, status: u16, body: &str) -> Self {
        self.script
            .lock()
            .push_back(Ok(HttpResponse::new(status, body)));
        self
    }

    pub fn fail(self, message: &str) -> Self {
        self.script.lock().push_back(Err(message.to_string()));
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }
}

impl Transport for ScriptedTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, StoreError> {
        self.requests.lock().push(request.clone());
        match self.script.lock().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(StoreError::Connection(message)),
            None => Err(StoreError::Connection("script exhausted".to_string())),
        }
    }
}
