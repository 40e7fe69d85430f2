//! HTTP client utilities for talking to the agent.
//!
//! This module provides reusable HTTP client construction and
//! request building logic shared by plain calls and event streams.

use reqwest::{Client, RequestBuilder};
use std::collections::HashMap;

use crate::options::TransportOptions;

/// Build a configured HTTP client from transport options.
///
/// Only the connect timeout is set on the client itself; the request timeout
/// is applied per plain request so that event streams are not cut off.
///
/// # Example
/// ```ignore
/// let client = build_http_client(&transport_options)?;
/// ```
pub fn build_http_client(transport_options: &TransportOptions) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder();

    if let Some(timeout) = transport_options.connect_timeout {
        builder = builder.connect_timeout(timeout);
    }

    if let Some(proxy_url) = &transport_options.proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
    }

    builder.build()
}

/// Join the base URL and an endpoint path.
///
/// # Example
/// ```
/// use vcx_client::http::endpoint_url;
///
/// assert_eq!(endpoint_url("http://localhost:9847", "/ping"), "http://localhost:9847/ping");
/// assert_eq!(endpoint_url("http://localhost:9847/", "ping"), "http://localhost:9847/ping");
/// ```
pub fn endpoint_url(base_url: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

/// Add extra headers to a request if specified in transport options.
///
/// # Example
/// ```ignore
/// let mut req = client.get(url);
/// req = add_extra_headers(req, &transport_options.extra_headers);
/// ```
pub fn add_extra_headers(
    mut request: RequestBuilder,
    extra_headers: &Option<HashMap<String, String>>,
) -> RequestBuilder {
    if let Some(headers) = extra_headers {
        for (key, value) in headers {
            request = request.header(key, value);
        }
    }
    request
}
