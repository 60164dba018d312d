//! Pipeline context management.
//!
//! Request metadata is captured once into an immutable `RequestContext` and
//! passed into the pipeline explicitly.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::logging::structured::LogContext;

/// Metadata for one inbound intake request.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestContext {
    #[serde(default = "new_request_id")]
    pub request_id: String,
    /// Header names are stored lower-cased.
    #[serde(default)]
    headers: HashMap<String, String>,
    /// Remote address of the connection.
    #[serde(default)]
    pub connection_remote_addr: Option<String>,
    /// Remote address of the underlying socket.
    #[serde(default)]
    pub socket_remote_addr: Option<String>,
    /// Legacy nested socket address some frameworks still expose.
    #[serde(default)]
    pub nested_socket_remote_addr: Option<String>,
    /// Address as resolved by the web framework (proxy-aware).
    #[serde(default)]
    pub framework_ip: Option<String>,
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

fn new_request_id() -> String {
    format!("req-{}", &Uuid::new_v4().simple().to_string()[..8])
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            request_id: new_request_id(),
            headers: HashMap::new(),
            connection_remote_addr: None,
            socket_remote_addr: None,
            nested_socket_remote_addr: None,
            framework_ip: None,
            received_at: Utc::now(),
        }
    }
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_connection_addr(mut self, addr: &str) -> Self {
        self.connection_remote_addr = Some(addr.to_string());
        self
    }

    pub fn with_socket_addr(mut self, addr: &str) -> Self {
        self.socket_remote_addr = Some(addr.to_string());
        self
    }

    pub fn with_framework_ip(mut self, ip: &str) -> Self {
        self.framework_ip = Some(ip.to_string());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .or_else(|| {
                self.headers
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
    }

    /// Raw client address by precedence: forwarded-for (first hop),
    /// real-ip, connection, socket, nested socket, framework. Blank values
    /// are skipped.
    pub fn raw_client_ip(&self) -> Option<&str> {
        let forwarded = non_empty(self.header("x-forwarded-for"))
            .and_then(|v| non_empty(v.split(',').next()));

        forwarded
            .or_else(|| non_empty(self.header("x-real-ip")))
            .or_else(|| non_empty(self.connection_remote_addr.as_deref()))
            .or_else(|| non_empty(self.socket_remote_addr.as_deref()))
            .or_else(|| non_empty(self.nested_socket_remote_addr.as_deref()))
            .or_else(|| non_empty(self.framework_ip.as_deref()))
    }

    /// Raw user-agent header, empty when missing.
    pub fn user_agent(&self) -> &str {
        self.header("user-agent").unwrap_or_default()
    }

    pub fn referrer(&self) -> Option<&str> {
        non_empty(self.header("referer"))
    }

    pub fn log_context(&self, operation: &'static str) -> LogContext {
        LogContext::new(&self.request_id, operation)
    }
}
