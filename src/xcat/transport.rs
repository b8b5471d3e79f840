//! The single synchronous call the inspector makes to the management node.

use reqwest::{Client, Method, StatusCode};
use std::time::Duration;
use tokio::runtime::Handle;

use crate::error::{Result, ZvmError};

/// Executes one xCAT REST call and returns the raw reply body.
///
/// `url` is the path plus query as built by [`XcatUrl`](super::XcatUrl).
/// `body` is sent as a JSON list of strings (`["command=..."]`).
pub trait XcatTransport: Send + Sync {
    fn request(&self, method: Method, url: &str, body: Option<&[String]>) -> Result<String>;
}

impl<T: XcatTransport + ?Sized> XcatTransport for std::sync::Arc<T> {
    fn request(&self, method: Method, url: &str, body: Option<&[String]>) -> Result<String> {
        (**self).request(method, url, body)
    }
}

/// HTTPS transport to a real xCAT management node.
///
/// Calls block the current thread on the runtime the transport was created
/// in, so they must run outside of async tasks (e.g. in `spawn_blocking`).
pub struct HttpTransport {
    server: String,
    client: Client,
    runtime: Handle,
}

impl HttpTransport {
    pub fn new(server: &str, timeout: Duration, insecure_tls: bool) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            ZvmError::Config(format!("HTTP transport needs a tokio runtime: {}", e))
        })?;
        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(insecure_tls)
            .user_agent(format!("zvm-perf-exporter/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ZvmError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            server: server.to_string(),
            client,
            runtime,
        })
    }

    async fn send(&self, method: Method, url: &str, body: Option<&[String]>) -> Result<String> {
        let target = format!("https://{}{}", self.server, url);
        let mut req = self.client.request(method.clone(), &target);
        if let Some(body) = body {
            req = req.json(body);
        }

        let res = req.send().await.map_err(|e| {
            ZvmError::no_data(format!(
                "Communicate with xCAT server {} error: {}",
                self.server, e
            ))
        })?;

        let status = res.status();
        let message = res.text().await.map_err(|e| {
            ZvmError::no_data(format!(
                "Failed to get response from xCAT server {}: {}",
                self.server, e
            ))
        })?;

        let expected = if method == Method::POST {
            StatusCode::CREATED
        } else {
            StatusCode::OK
        };
        if status != expected {
            return Err(ZvmError::no_data(format!(
                "Request to xCAT server {} failed: status {} message {}",
                self.server, status, message
            )));
        }

        Ok(message)
    }
}

impl XcatTransport for HttpTransport {
    fn request(&self, method: Method, url: &str, body: Option<&[String]>) -> Result<String> {
        self.runtime.block_on(self.send(method, url, body))
    }
}
