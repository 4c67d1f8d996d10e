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

use crate::body::{full, BoxError, ProxyBody};
use http::header::{CONNECTION, CONTENT_TYPE, WWW_AUTHENTICATE};
use http::{HeaderValue, Response, StatusCode};
use std::time::Duration;

/// Realm announced to clients that fail basic auth.
pub const BASIC_AUTH_CHALLENGE: &str = r#"Basic realm="Authorization Required""#;

/// Every way a single proxied request can fail.
///
/// None of them is fatal: the error is turned into a response with
/// [`ProxyError::into_response`] and the server keeps running.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// No credential provider produced usable credentials.
    #[error("failed to resolve credentials: {0}")]
    Credential(#[source] sigv4_proxy_core::Error),
    /// The request could not be signed.
    #[error("failed to sign request: {0}")]
    Signing(#[source] sigv4_proxy_core::Error),
    /// The inbound body is larger than the buffering limit.
    #[error("request body exceeds the limit of {limit} bytes")]
    PayloadTooLarge {
        /// Configured limit in bytes.
        limit: usize,
    },
    /// The inbound body could not be read.
    #[error("failed to read request body: {0}")]
    ReadBody(#[source] BoxError),
    /// The signed request could not be delivered.
    #[error("upstream connection failed: {0}")]
    UpstreamConnection(#[source] reqwest::Error),
    /// The upstream did not answer within the deadline.
    #[error("upstream did not respond within {0:?}")]
    UpstreamTimeout(Duration),
    /// Basic auth is enabled and the client did not pass it.
    #[error("authentication required")]
    Unauthorized,
}

impl ProxyError {
    /// Status code returned to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Credential(_) | Self::Signing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::ReadBody(_) => StatusCode::BAD_REQUEST,
            Self::UpstreamConnection(_) => StatusCode::BAD_GATEWAY,
            Self::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }

    /// Plain text response describing the error.
    ///
    /// The connection is closed once the response is written.
    pub fn into_response(self) -> Response<ProxyBody> {
        let mut resp = Response::new(full(format!("{self}\n")));
        *resp.status_mut() = self.status();
        resp.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        resp.headers_mut()
            .insert(CONNECTION, HeaderValue::from_static("close"));
        if matches!(self, Self::Unauthorized) {
            resp.headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static(BASIC_AUTH_CHALLENGE));
        }
        resp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(ProxyError::Credential(sigv4_proxy_core::Error::credential_unavailable("none")), 500)]
    #[test_case(ProxyError::Signing(sigv4_proxy_core::Error::request_invalid("bad header")), 500)]
    #[test_case(ProxyError::PayloadTooLarge { limit: 10 }, 413)]
    #[test_case(ProxyError::UpstreamTimeout(Duration::from_secs(1)), 504)]
    #[test_case(ProxyError::Unauthorized, 401)]
    fn test_status(err: ProxyError, expected: u16) {
        assert_eq!(err.status().as_u16(), expected);
    }

    #[test]
    fn test_unauthorized_carries_challenge() {
        let resp = ProxyError::Unauthorized.into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(resp.headers()[WWW_AUTHENTICATE], BASIC_AUTH_CHALLENGE);
    }

    #[test]
    fn test_other_errors_have_no_challenge() {
        let resp = ProxyError::PayloadTooLarge { limit: 10 }.into_response();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(resp.headers().get(WWW_AUTHENTICATE).is_none());
    }

    #[test_case(ProxyError::Credential(sigv4_proxy_core::Error::credential_unavailable("none")); "credential")]
    #[test_case(ProxyError::UpstreamTimeout(Duration::from_secs(1)); "timeout")]
    #[test_case(ProxyError::Unauthorized; "unauthorized")]
    fn test_error_response_closes_connection(err: ProxyError) {
        let resp = err.into_response();
        assert_eq!(resp.headers()[CONNECTION], "close");
    }
}
