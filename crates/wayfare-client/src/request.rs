//! Request descriptors
//!
//! A [`RequestDescriptor`] is the immutable input to the pipeline: method,
//! path, query, headers, body, and an optional per-request timeout override.
//! Descriptors are cheap to clone; the pipeline builds a fresh transport
//! request from an independent copy for every attempt and replay - a built
//! request is never reused.

use std::time::Duration;

use reqwest::Method;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::{Error, Result};

/// Immutable description of a single logical request
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Path relative to the config's base address, e.g. `/feed`
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Per-attempt timeout; falls back to the config default when `None`
    pub timeout: Option<Duration>,
}

impl RequestDescriptor {
    /// Start building a descriptor for an arbitrary method
    pub fn builder(method: Method, path: impl Into<String>) -> RequestDescriptorBuilder {
        RequestDescriptorBuilder {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    /// Shorthand for a GET descriptor
    pub fn get(path: impl Into<String>) -> RequestDescriptorBuilder {
        Self::builder(Method::GET, path)
    }

    /// Shorthand for a POST descriptor
    pub fn post(path: impl Into<String>) -> RequestDescriptorBuilder {
        Self::builder(Method::POST, path)
    }

    /// Shorthand for a PUT descriptor
    pub fn put(path: impl Into<String>) -> RequestDescriptorBuilder {
        Self::builder(Method::PUT, path)
    }

    /// Shorthand for a DELETE descriptor
    pub fn delete(path: impl Into<String>) -> RequestDescriptorBuilder {
        Self::builder(Method::DELETE, path)
    }

    /// Build a transport request for one attempt
    pub(crate) fn build_http_request(
        &self,
        config: &ClientConfig,
        http: &reqwest::Client,
    ) -> Result<reqwest::Request> {
        let url = config.endpoint_url(&self.path)?;

        let mut builder = http.request(self.method.clone(), url);

        if !self.query.is_empty() {
            builder = builder.query(&self.query);
        }

        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }

        if let Some(body) = &self.body {
            builder = builder.json(body);
        }

        builder = builder.timeout(self.timeout.unwrap_or(config.timeout));

        builder.build().map_err(|e| Error::Request {
            message: format!("failed to build request for {}", self.path),
            source: Some(anyhow::Error::new(e)),
        })
    }
}

/// Builder for [`RequestDescriptor`]
#[derive(Debug)]
pub struct RequestDescriptorBuilder {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Option<Value>,
    timeout: Option<Duration>,
}

impl RequestDescriptorBuilder {
    /// Append a query parameter
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Append a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set a JSON body
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Override the per-attempt timeout for this request
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> RequestDescriptor {
        RequestDescriptor {
            method: self.method,
            path: self.path,
            query: self.query,
            headers: self.headers,
            body: self.body,
            timeout: self.timeout,
        }
    }
}
