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

use crate::canonical::CanonicalRequest;
use crate::constants::{X_AMZ_DATE, X_AMZ_SECURITY_TOKEN};
use crate::Credential;
use http::request::Parts;
use http::{header, HeaderName, HeaderValue};
use log::debug;
use sigv4_proxy_core::hash::{hex_hmac_sha256, hex_sha256, hmac_sha256};
use sigv4_proxy_core::time::{format_date, format_iso8601, DateTime};
use sigv4_proxy_core::{Error, Result, SignRequest};

/// RequestSigner that implement AWS SigV4.
///
/// Region and service are fixed for the lifetime of the signer; only the
/// timestamp changes between requests.
///
/// - [Signature Version 4 signing process](https://docs.aws.amazon.com/general/latest/gr/signature-version-4.html)
#[derive(Debug, Clone)]
pub struct RequestSigner {
    service: String,
    region: String,
    signable: Vec<HeaderName>,
}

impl RequestSigner {
    /// Create a new builder for AWS V4 signer.
    pub fn new(service: &str, region: &str) -> Self {
        Self {
            service: service.into(),
            region: region.into(),
            signable: Vec::new(),
        }
    }

    /// Sign `name` too when the request carries it.
    ///
    /// `host`, `x-amz-date` and `x-amz-security-token` are always signed.
    pub fn with_signed_header(mut self, name: HeaderName) -> Self {
        self.signable.push(name);
        self
    }

    /// The region this signer binds signatures to.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// The service this signer binds signatures to.
    pub fn service(&self) -> &str {
        &self.service
    }
}

impl SignRequest for RequestSigner {
    type Credential = Credential;

    fn sign_request(
        &self,
        req: &mut Parts,
        body: &[u8],
        cred: &Self::Credential,
        now: DateTime,
    ) -> Result<()> {
        // Insert HOST header if not present.
        if req.headers.get(header::HOST).is_none() {
            let authority = req.uri.authority().ok_or_else(|| {
                Error::request_invalid("request has neither a host header nor an authority")
            })?;
            req.headers
                .insert(header::HOST, HeaderValue::from_str(authority.as_str())?);
        }

        // The date header and the scope come from the same instant.
        let timestamp = format_iso8601(now);
        req.headers
            .insert(X_AMZ_DATE, HeaderValue::from_str(&timestamp)?);

        if let Some(token) = &cred.session_token {
            let mut value = HeaderValue::from_str(token)?;
            value.set_sensitive(true);
            req.headers.insert(X_AMZ_SECURITY_TOKEN, value);
        } else {
            req.headers.remove(X_AMZ_SECURITY_TOKEN);
        }

        let creq = CanonicalRequest::build(req, body, &self.signable)?;
        debug!("calculated canonical request: {creq}");

        let scope = credential_scope(now, &self.region, &self.service);
        let string_to_sign = string_to_sign(&timestamp, &scope, &creq);
        debug!("calculated string to sign: {string_to_sign}");

        let signing_key =
            generate_signing_key(&cred.secret_access_key, now, &self.region, &self.service);
        let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

        let mut authorization = HeaderValue::from_str(&format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            cred.access_key_id, scope, creq.signed_headers, signature
        ))?;
        authorization.set_sensitive(true);
        req.headers.insert(header::AUTHORIZATION, authorization);

        Ok(())
    }
}

/// Scope: "20220313/<region>/<service>/aws4_request"
fn credential_scope(now: DateTime, region: &str, service: &str) -> String {
    format!("{}/{region}/{service}/aws4_request", format_date(now))
}

/// StringToSign:
///
/// ```text
/// AWS4-HMAC-SHA256
/// 20220313T072004Z
/// 20220313/<region>/<service>/aws4_request
/// <hashed_canonical_request>
/// ```
fn string_to_sign(timestamp: &str, scope: &str, creq: &CanonicalRequest) -> String {
    format!(
        "AWS4-HMAC-SHA256\n{timestamp}\n{scope}\n{}",
        hex_sha256(creq.to_string().as_bytes())
    )
}

fn generate_signing_key(secret: &str, time: DateTime, region: &str, service: &str) -> Vec<u8> {
    // Sign secret
    let secret = format!("AWS4{secret}");
    // Sign date
    let sign_date = hmac_sha256(secret.as_bytes(), format_date(time).as_bytes());
    // Sign region
    let sign_region = hmac_sha256(sign_date.as_slice(), region.as_bytes());
    // Sign service
    let sign_service = hmac_sha256(sign_region.as_slice(), service.as_bytes());
    // Sign request
    hmac_sha256(sign_service.as_slice(), "aws4_request".as_bytes())
}
