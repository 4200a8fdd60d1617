//! Scripted HTTP transport for testing discovery and stat retrieval.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::collector::transport::{HttpMethod, HttpTransport, TransportError};

/// In-memory transport answering from a fixed route table.
///
/// Unknown routes fail with a connection error, like an unreachable host.
/// Every call is recorded so tests can assert on what was requested.
#[derive(Debug, Default)]
pub struct MockTransport {
    routes: HashMap<(HttpMethod, String), Result<String, TransportError>>,
    calls: Mutex<Vec<(HttpMethod, String)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a successful response body for `method url`.
    pub fn respond(&mut self, method: HttpMethod, url: impl Into<String>, body: impl Into<String>) {
        self.routes.insert((method, url.into()), Ok(body.into()));
    }

    /// Registers a failure for `method url`.
    pub fn fail(&mut self, method: HttpMethod, url: impl Into<String>, error: TransportError) {
        self.routes.insert((method, url.into()), Err(error));
    }

    /// Makes `method url` fail as if the peer refused the connection.
    pub fn refuse(&mut self, method: HttpMethod, url: impl Into<String>) {
        let url = url.into();
        let error = TransportError::Connect {
            url: url.clone(),
            message: "connection refused".to_string(),
        };
        self.fail(method, url, error);
    }

    /// Returns every request made so far, in order.
    pub fn calls(&self) -> Vec<(HttpMethod, String)> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Counts requests made to `url` with any method.
    pub fn call_count(&self, url: &str) -> usize {
        self.calls().iter().filter(|(_, u)| u == url).count()
    }
}

impl HttpTransport for MockTransport {
    fn request(&self, method: HttpMethod, url: &str) -> Result<String, TransportError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((method, url.to_string()));

        self.routes
            .get(&(method, url.to_string()))
            .cloned()
            .unwrap_or_else(|| {
                Err(TransportError::Connect {
                    url: url.to_string(),
                    message: "no route".to_string(),
                })
            })
    }
}
