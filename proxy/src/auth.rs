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

use crate::error::ProxyError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::header::AUTHORIZATION;
use http::HeaderMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Basic auth gate in front of the forwarder.
#[derive(Clone)]
pub struct BasicAuth {
    user: Arc<str>,
    expected: Arc<[u8]>,
}

impl Debug for BasicAuth {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

impl BasicAuth {
    /// Gate requiring `user` and `password`.
    pub fn new(user: &str, password: &str) -> Self {
        Self {
            user: Arc::from(user),
            expected: Arc::from(format!("{user}:{password}").into_bytes()),
        }
    }

    /// Gate enabled only when both halves are configured.
    pub fn from_pair(user: Option<String>, password: Option<String>) -> Option<Self> {
        match (user, password) {
            (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => {
                Some(Self::new(&user, &password))
            }
            _ => None,
        }
    }

    /// Check the `Authorization` header of an inbound request.
    pub fn check(&self, headers: &HeaderMap) -> Result<(), ProxyError> {
        let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
            return Err(ProxyError::Unauthorized);
        };
        let Some((scheme, encoded)) = value.trim().split_once(' ') else {
            return Err(ProxyError::Unauthorized);
        };
        if !scheme.eq_ignore_ascii_case("basic") {
            return Err(ProxyError::Unauthorized);
        }
        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|_| ProxyError::Unauthorized)?;

        if bool::from(decoded.as_slice().ct_eq(&self.expected[..])) {
            Ok(())
        } else {
            Err(ProxyError::Unauthorized)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use test_case::test_case;

    fn headers(auth: Option<&str>) -> HeaderMap {
        let mut h = HeaderMap::new();
        if let Some(v) = auth {
            h.insert(AUTHORIZATION, HeaderValue::from_str(v).unwrap());
        }
        h
    }

    #[test_case(Some("Basic YWRtaW46c2VjcmV0"), true; "valid")]
    #[test_case(Some("basic YWRtaW46c2VjcmV0"), true; "scheme case")]
    #[test_case(Some("Basic YWRtaW46d3Jvbmc="), false; "wrong password")]
    #[test_case(Some("Bearer YWRtaW46c2VjcmV0"), false; "other scheme")]
    #[test_case(Some("Basic !!!"), false; "bad base64")]
    #[test_case(Some("Basic"), false; "no credentials")]
    #[test_case(None, false; "missing")]
    fn test_check(auth: Option<&str>, ok: bool) {
        let gate = BasicAuth::new("admin", "secret");
        assert_eq!(gate.check(&headers(auth)).is_ok(), ok);
    }

    #[test]
    fn test_from_pair() {
        assert!(BasicAuth::from_pair(Some("a".into()), None).is_none());
        assert!(BasicAuth::from_pair(None, Some("b".into())).is_none());
        assert!(BasicAuth::from_pair(Some("a".into()), Some("".into())).is_none());
        assert!(BasicAuth::from_pair(Some("a".into()), Some("b".into())).is_some());
    }

    #[test]
    fn test_debug_hides_password() {
        let gate = BasicAuth::new("admin", "secret");
        assert!(!format!("{gate:?}").contains("secret"));
    }
}
