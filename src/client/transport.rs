//! HTTP transport seam.
//!
//! # Design Decisions
//! - The client only needs GET with an optional Accept header, so the
//!   trait is that narrow; tests substitute scripted transports
//! - Non-2xx responses are returned, not errors; status policy lives in the client

use futures_util::future::{BoxFuture, FutureExt};

use crate::client::error::FetchError;

/// Raw response handed back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub status_text: String,
    pub body: String,
}

impl TransportResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            status_text: "OK".to_string(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs a single GET.
pub trait Transport: Send + Sync {
    fn get<'a>(
        &'a self,
        url: &'a str,
        accept: Option<&'a str>,
    ) -> BoxFuture<'a, Result<TransportResponse, FetchError>>;
}

/// Transport backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("situation-monitor/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for ReqwestTransport {
    fn get<'a>(
        &'a self,
        url: &'a str,
        accept: Option<&'a str>,
    ) -> BoxFuture<'a, Result<TransportResponse, FetchError>> {
        async move {
            let mut request = self.client.get(url);
            if let Some(accept) = accept {
                request = request.header(reqwest::header::ACCEPT, accept);
            }

            let response = request
                .send()
                .await
                .map_err(|e| FetchError::Network(e.to_string()))?;
            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| FetchError::Network(e.to_string()))?;

            Ok(TransportResponse {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
                body,
            })
        }
        .boxed()
    }
}
