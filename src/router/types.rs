//! Router record and transport error types

use std::fmt;

use serde::{Deserialize, Serialize};

/// One entry of the router's static DNS table
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct RouterRecord {
    /// Router-assigned identifier, needed to delete the entry
    #[serde(rename = ".id")]
    pub id: String,

    /// DNS name
    #[serde(default)]
    pub name: String,

    /// Address the name resolves to. Empty for non-address entries (CNAME, FWD, ...)
    #[serde(default)]
    pub address: String,
}

/// Body of the create (PUT) request
#[derive(Clone, Debug, Serialize)]
pub struct NewRouterRecord<'a> {
    pub address: &'a str,
    pub name: &'a str,
}

/// Failed call to the router.
///
/// `status` is `None` when no HTTP response was received at all
/// (connection refused, TLS failure, timeout, ...).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportError {
    /// HTTP status code of the response, if one was received
    pub status: Option<u16>,
    /// Response body, or the transport error message
    pub body: String,
    /// The request exceeded its deadline
    pub timed_out: bool,
}

impl TransportError {
    /// Error for a response with an unexpected status
    pub fn unexpected_status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            body: body.into(),
            timed_out: false,
        }
    }

    /// Error for a request that never produced a response
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            body: message.into(),
            timed_out: false,
        }
    }

    /// Error for a request that ran into its deadline
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            status: None,
            body: message.into(),
            timed_out: true,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return TransportError::timeout(err.to_string());
        }
        match err.status() {
            Some(status) => TransportError::unexpected_status(status.as_u16(), err.to_string()),
            None => TransportError::transport(err.to_string()),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "status: '{}', response: '{}'", status, self.body),
            None if self.timed_out => write!(f, "request timed out: {}", self.body),
            None => write!(f, "request failed: {}", self.body),
        }
    }
}

impl std::error::Error for TransportError {}
