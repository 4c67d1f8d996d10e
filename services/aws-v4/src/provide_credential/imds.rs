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

use super::utils::parse_metadata_error;
use crate::constants::*;
use crate::Credential;
use async_trait::async_trait;
use bytes::Bytes;
use http::header::CONTENT_LENGTH;
use http::Method;
use log::debug;
use serde::Deserialize;
use sigv4_proxy_core::time::{now, parse_rfc3339, DateTime};
use sigv4_proxy_core::{Context, Error, ProvideCredential, Result};
use std::sync::{Arc, Mutex};

const IMDS_ENDPOINT: &str = "http://169.254.169.254";
/// 21600s (6h) is recommended by AWS.
const IMDS_TOKEN_TTL_SECS: i64 = 21600;

/// ImdsCredentialProvider loads credentials from the EC2 instance metadata
/// service using the IMDSv2 session token flow.
///
/// Set `AWS_EC2_METADATA_DISABLED=true` to skip it, or
/// `AWS_EC2_METADATA_SERVICE_ENDPOINT` to talk to another endpoint.
#[derive(Debug, Clone)]
pub struct ImdsCredentialProvider {
    endpoint: Option<String>,
    token: Arc<Mutex<(String, DateTime)>>,
}

impl Default for ImdsCredentialProvider {
    fn default() -> Self {
        Self {
            endpoint: None,
            token: Arc::new(Mutex::new((String::new(), DateTime::default()))),
        }
    }
}

impl ImdsCredentialProvider {
    /// Create a new `ImdsCredentialProvider` instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the endpoint for the metadata service.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    fn endpoint(&self, ctx: &Context) -> String {
        self.endpoint
            .clone()
            .or_else(|| ctx.env_var(AWS_EC2_METADATA_SERVICE_ENDPOINT))
            .unwrap_or_else(|| IMDS_ENDPOINT.to_string())
    }

    fn cached_token(&self) -> Result<Option<String>> {
        let guard = self
            .token
            .lock()
            .map_err(|_| Error::unexpected("imds token cache is poisoned"))?;
        let (token, expires_in) = &*guard;
        Ok((*expires_in > now()).then(|| token.clone()))
    }

    async fn load_metadata_token(&self, ctx: &Context) -> Result<String> {
        if let Some(token) = self.cached_token()? {
            return Ok(token);
        }

        let url = format!("{}/latest/api/token", self.endpoint(ctx));
        let req = http::Request::builder()
            .uri(&url)
            .method(Method::PUT)
            .header(CONTENT_LENGTH, "0")
            .header(X_AWS_EC2_METADATA_TOKEN_TTL_SECONDS, IMDS_TOKEN_TTL_SECS.to_string())
            .body(Bytes::new())
            .map_err(|e| {
                Error::request_invalid("failed to build IMDS token request")
                    .with_source(e)
                    .with_context(format!("url: {url}"))
            })?;

        let resp = ctx.http_send_as_string(req).await?;
        if resp.status() != http::StatusCode::OK {
            return Err(parse_metadata_error(
                "fetch_metadata_token",
                resp.status(),
                resp.body(),
            ));
        }
        let token = resp.into_body();

        // Re-read 10 minutes before the token lapses.
        let expires_in = now() + chrono::TimeDelta::seconds(IMDS_TOKEN_TTL_SECS - 600);
        *self
            .token
            .lock()
            .map_err(|_| Error::unexpected("imds token cache is poisoned"))? =
            (token.clone(), expires_in);

        Ok(token)
    }

    async fn get(&self, ctx: &Context, token: &str, path: &str, op: &str) -> Result<String> {
        let url = format!("{}{path}", self.endpoint(ctx));
        let req = http::Request::builder()
            .uri(&url)
            .method(Method::GET)
            .header(X_AWS_EC2_METADATA_TOKEN, token)
            .body(Bytes::new())
            .map_err(|e| {
                Error::request_invalid("failed to build IMDS request")
                    .with_source(e)
                    .with_context(format!("url: {url}"))
            })?;

        let resp = ctx.http_send_as_string(req).await?;
        if resp.status() != http::StatusCode::OK {
            return Err(parse_metadata_error(op, resp.status(), resp.body()));
        }
        Ok(resp.into_body())
    }
}

#[async_trait]
impl ProvideCredential for ImdsCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        if ctx.env_var(AWS_EC2_METADATA_DISABLED).as_deref() == Some("true") {
            debug!("instance metadata service disabled, skipping");
            return Ok(None);
        }

        let token = self.load_metadata_token(ctx).await?;

        let profile = self
            .get(
                ctx,
                &token,
                "/latest/meta-data/iam/security-credentials/",
                "list_instance_profiles",
            )
            .await?;
        // Only one role can be attached to an instance profile.
        let profile = profile.lines().next().unwrap_or_default().trim().to_string();
        if profile.is_empty() {
            return Err(Error::config_invalid("no IAM role attached to EC2 instance"));
        }

        let content = self
            .get(
                ctx,
                &token,
                &format!("/latest/meta-data/iam/security-credentials/{profile}"),
                "fetch_instance_credentials",
            )
            .await?;
        let resp: Ec2MetadataIamSecurityCredentials =
            serde_json::from_str(&content).map_err(|e| {
                Error::unexpected("failed to parse IMDS credentials response")
                    .with_source(e)
                    .with_context(format!("profile: {profile}"))
            })?;

        if resp.code != "Success" {
            return Err(Error::credential_unavailable(format!(
                "IMDS returned error: [{}] {}",
                resp.code, resp.message
            ))
            .with_context(format!("profile: {profile}")));
        }

        Ok(Some(Credential {
            access_key_id: resp.access_key_id,
            secret_access_key: resp.secret_access_key,
            session_token: Some(resp.token),
            expires_in: Some(parse_rfc3339(&resp.expiration)?),
        }))
    }
}

#[derive(Default, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct Ec2MetadataIamSecurityCredentials {
    access_key_id: String,
    secret_access_key: String,
    token: String,
    expiration: String,

    code: String,
    message: String,
}
