//! Blocking HTTP for the core's request/response values.
//!
//! `core/tests/integration.rs` carries a copy of this transport; changes
//! here belong there too.

use todo_sync::{HttpMethod, HttpRequest, HttpResponse, Transport, TransportError};
use tracing::debug;

/// `Transport` backed by a ureq agent.
///
/// Status codes are returned as data, never as `Err`; only failures to
/// reach the server or read the reply become `TransportError`.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn with_headers<B>(mut builder: ureq::RequestBuilder<B>, headers: &[(String, String)]) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        debug!(method = ?request.method, path = %request.path, "sending request");
        let body = request.body.as_deref().map(str::as_bytes);
        let result = match request.method {
            HttpMethod::Get => with_headers(self.agent.get(&request.path), &request.headers).call(),
            HttpMethod::Delete => with_headers(self.agent.delete(&request.path), &request.headers).call(),
            HttpMethod::Post => {
                let builder = with_headers(self.agent.post(&request.path), &request.headers);
                match body {
                    Some(body) => builder.send(body),
                    None => builder.send_empty(),
                }
            }
            HttpMethod::Put => {
                let builder = with_headers(self.agent.put(&request.path), &request.headers);
                match body {
                    Some(body) => builder.send(body),
                    None => builder.send_empty(),
                }
            }
        };
        let mut response = result.map_err(|err| TransportError(err.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
            .collect();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|err| TransportError(format!("reading response body: {err}")))?;
        debug!(status, "response received");

        Ok(HttpResponse { status, headers, body })
    }
}
