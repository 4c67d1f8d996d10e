// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use crate::body::{BoxError, ProxyBody};
use crate::config::Target;
use crate::error::ProxyError;
use bytes::Bytes;
use futures_util::TryStreamExt;
use http::header::{CACHE_CONTROL, CONTENT_LENGTH, HOST};
use http::{HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode};
use http_body_util::{BodyExt, Limited, StreamBody};
use hyper::body::{Body, Frame};
use log::{debug, warn};
use regex::Regex;
use sigv4_proxy_aws_v4::Credential;
use sigv4_proxy_core::{Error, Result, Signer};
use std::time::Duration;

/// Headers that only make sense on a single connection.
static HOP_BY_HOP: [HeaderName; 7] = [
    http::header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    http::header::TRANSFER_ENCODING,
    http::header::TE,
    http::header::TRAILER,
    http::header::UPGRADE,
];

/// Value injected for static assets.
pub const STATIC_ASSET_CACHE_CONTROL: &str = "public, max-age=86400";

const STATIC_ASSET_PATTERN: &str =
    r"(?i)\.(css|js|png|jpg|jpeg|gif|svg|ico|webp|woff|woff2|ttf|otf|eot)$";

/// Default request buffering limit.
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Default upstream deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Forwarder buffers, signs and relays requests to one fixed target.
///
/// Cloning is cheap; clones share the http client and the credential snapshot.
#[derive(Clone)]
pub struct Forwarder {
    target: Target,
    signer: Signer<Credential>,
    client: reqwest::Client,
    static_assets: Regex,
    max_body_size: usize,
    timeout: Duration,
}

impl Forwarder {
    /// Create a forwarder to `target` signing with `signer`.
    pub fn new(target: Target, signer: Signer<Credential>) -> Result<Self> {
        // Upstream redirects are relayed, never followed.
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::unexpected("failed to build http client").with_source(e))?;
        let static_assets = Regex::new(STATIC_ASSET_PATTERN)
            .map_err(|e| Error::unexpected("invalid static asset pattern").with_source(e))?;

        Ok(Self {
            target,
            signer,
            client,
            static_assets,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Use a specific http client for upstream calls.
    ///
    /// The client should not follow redirects.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Set the request buffering limit.
    pub fn with_max_body_size(mut self, limit: usize) -> Self {
        self.max_body_size = limit;
        self
    }

    /// Set the upstream deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Relay `req` upstream and stream back the response.
    ///
    /// No upstream call is made unless the body was buffered and the
    /// request signed.
    pub async fn forward<B>(
        &self,
        req: Request<B>,
    ) -> std::result::Result<Response<ProxyBody>, ProxyError>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();
        let limit = self.max_body_size;

        let declared = parts
            .headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if declared.is_some_and(|len| len > limit as u64) {
            return Err(ProxyError::PayloadTooLarge { limit });
        }

        let body = Limited::new(body, limit)
            .collect()
            .await
            .map_err(|err| {
                if err.is::<http_body_util::LengthLimitError>() {
                    ProxyError::PayloadTooLarge { limit }
                } else {
                    ProxyError::ReadBody(err)
                }
            })?
            .to_bytes();

        let is_static_asset = self.static_assets.is_match(parts.uri.path());
        debug!(
            "forwarding {} {} ({} bytes)",
            parts.method,
            parts.uri.path(),
            body.len()
        );

        let mut upstream = self.outbound(&parts.method, &parts.uri, &parts.headers)?;
        self.signer
            .sign(&mut upstream, &body)
            .await
            .map_err(|err| {
                if err.is_credential_error() {
                    ProxyError::Credential(err)
                } else {
                    ProxyError::Signing(err)
                }
            })?;

        let req = reqwest::Request::try_from(Request::from_parts(upstream, body)).map_err(|e| {
            ProxyError::Signing(Error::request_invalid("invalid upstream request").with_source(e))
        })?;

        let timeout = self.timeout;
        let resp = match tokio::time::timeout(timeout, self.client.execute(req)).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(err)) if err.is_timeout() => return Err(ProxyError::UpstreamTimeout(timeout)),
            Ok(Err(err)) => return Err(ProxyError::UpstreamConnection(err)),
            Err(_) => return Err(ProxyError::UpstreamTimeout(timeout)),
        };

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            warn!(
                "upstream {} rejected {} {} with {status}, check region, service and credentials",
                self.target,
                parts.method,
                parts.uri.path()
            );
        }

        let mut headers = HeaderMap::with_capacity(resp.headers().len());
        copy_headers(resp.headers(), &mut headers);
        if is_static_asset {
            headers.insert(
                CACHE_CONTROL,
                HeaderValue::from_static(STATIC_ASSET_CACHE_CONTROL),
            );
        }

        let stream = resp
            .bytes_stream()
            .map_ok(Frame::data)
            .map_err(|e| Box::new(e) as BoxError);
        let mut out = Response::new(StreamBody::new(stream).boxed_unsync());
        *out.status_mut() = status;
        *out.headers_mut() = headers;
        Ok(out)
    }

    /// Outbound request head: inbound method, path, query and headers aimed at the target.
    fn outbound(
        &self,
        method: &http::Method,
        uri: &http::Uri,
        headers: &HeaderMap,
    ) -> std::result::Result<http::request::Parts, ProxyError> {
        let target = &self.target;
        let uri = target
            .uri_for(uri.path_and_query())
            .map_err(ProxyError::Signing)?;

        let (mut parts, _) = Request::new(()).into_parts();
        parts.method = method.clone();
        parts.uri = uri;
        copy_headers(headers, &mut parts.headers);
        parts.headers.remove(CONTENT_LENGTH);

        let host = HeaderValue::from_str(target.authority().as_str()).map_err(|e| {
            ProxyError::Signing(Error::request_invalid("invalid target host").with_source(e))
        })?;
        parts.headers.insert(HOST, host);
        Ok(parts)
    }
}

impl std::fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forwarder")
            .field("target", &self.target)
            .field("max_body_size", &self.max_body_size)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Copy every header except hop-by-hop ones and those named in `Connection`.
fn copy_headers(from: &HeaderMap, to: &mut HeaderMap) {
    let listed: Vec<HeaderName> = from
        .get_all(http::header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for (name, value) in from {
        if HOP_BY_HOP.contains(name) || listed.contains(name) {
            continue;
        }
        to.append(name.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("/app.js", true; "script")]
    #[test_case("/static/site.CSS", true; "upper case style")]
    #[test_case("/_plugin/kibana/font.woff2", true; "font")]
    #[test_case("/logo.png", true; "image")]
    #[test_case("/data", false; "api")]
    #[test_case("/index/_doc/app.json", false; "json is not static")]
    #[test_case("/app.js/extra", false; "extension mid path")]
    fn test_static_asset_pattern(path: &str, expected: bool) {
        let re = Regex::new(STATIC_ASSET_PATTERN).unwrap();
        assert_eq!(re.is_match(path), expected);
    }

    #[test]
    fn test_copy_headers_drops_hop_by_hop() {
        let mut from = HeaderMap::new();
        from.insert("connection", HeaderValue::from_static("keep-alive, x-private"));
        from.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        from.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        from.insert("x-private", HeaderValue::from_static("1"));
        from.insert("content-type", HeaderValue::from_static("application/json"));
        from.append("x-multi", HeaderValue::from_static("a"));
        from.append("x-multi", HeaderValue::from_static("b"));

        let mut to = HeaderMap::new();
        copy_headers(&from, &mut to);

        let mut names: Vec<_> = to.keys().map(|k| k.as_str().to_string()).collect();
        names.sort();
        assert_eq!(names, vec!["content-type", "x-multi"]);
        assert_eq!(to.get_all("x-multi").iter().count(), 2);
    }
}
