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

use super::utils::{parse_sts_error, sts_endpoint};
use crate::constants::*;
use crate::Credential;
use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use quick_xml::de;
use serde::Deserialize;
use sigv4_proxy_core::time::parse_rfc3339;
use sigv4_proxy_core::{Context, Error, ProvideCredential, Result};

/// WebIdentityCredentialProvider exchanges an OIDC token file for role
/// credentials via STS `AssumeRoleWithWebIdentity`.
///
/// Both `AWS_ROLE_ARN` and `AWS_WEB_IDENTITY_TOKEN_FILE` must be set,
/// which is what EKS does for IAM roles for service accounts. The STS call
/// itself is unsigned; the token is the proof.
///
/// - [AssumeRoleWithWebIdentity](https://docs.aws.amazon.com/STS/latest/APIReference/API_AssumeRoleWithWebIdentity.html)
#[derive(Debug, Default, Clone)]
pub struct WebIdentityCredentialProvider;

impl WebIdentityCredentialProvider {
    /// Create a new `WebIdentityCredentialProvider` instance.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProvideCredential for WebIdentityCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        let (role_arn, token_file) = match (
            ctx.env_var(AWS_ROLE_ARN).filter(|v| !v.is_empty()),
            ctx.env_var(AWS_WEB_IDENTITY_TOKEN_FILE).filter(|v| !v.is_empty()),
        ) {
            (Some(arn), Some(file)) => (arn, file),
            _ => {
                debug!("web identity token not configured, skipping");
                return Ok(None);
            }
        };

        let token = ctx.file_read_as_string(&token_file).await.map_err(|e| {
            Error::config_invalid("failed to read web identity token file")
                .with_source(e)
                .with_context(format!("file: {token_file}"))
        })?;

        let region = ctx.env_var(AWS_REGION);
        let use_regional = ctx.env_var(AWS_STS_REGIONAL_ENDPOINTS).as_deref() == Some("regional");
        let endpoint = sts_endpoint(region.as_deref(), use_regional)
            .map_err(|e| e.with_context(format!("role_arn: {role_arn}")))?;
        let session_name = ctx
            .env_var(AWS_ROLE_SESSION_NAME)
            .unwrap_or_else(|| "sigv4-proxy".to_string());

        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("Action", "AssumeRoleWithWebIdentity")
            .append_pair("Version", "2011-06-15")
            .append_pair("RoleArn", &role_arn)
            .append_pair("RoleSessionName", &session_name)
            .append_pair("WebIdentityToken", token.trim())
            .finish();
        let req = http::Request::builder()
            .method(http::Method::GET)
            .uri(format!("https://{endpoint}/?{query}"))
            .body(Bytes::new())
            .map_err(|e| {
                Error::request_invalid("failed to build STS AssumeRoleWithWebIdentity request")
                    .with_source(e)
                    .with_context(format!("role_arn: {role_arn}"))
            })?;

        debug!("assuming role {role_arn} with web identity via {endpoint}");
        let resp = ctx.http_send_as_string(req).await.map_err(|e| {
            e.with_context(format!("role_arn: {role_arn}"))
                .with_context(format!("endpoint: https://{endpoint}"))
        })?;

        if resp.status() != http::StatusCode::OK {
            return Err(
                parse_sts_error("AssumeRoleWithWebIdentity", resp.status(), resp.body())
                    .with_context(format!("role_arn: {role_arn}"))
                    .with_context(format!("token_file: {token_file}")),
            );
        }

        let body = resp.into_body();
        let resp: AssumeRoleWithWebIdentityResponse = de::from_str(&body).map_err(|e| {
            Error::unexpected("failed to parse STS AssumeRoleWithWebIdentity response")
                .with_source(e)
                .with_context(format!("role_arn: {role_arn}"))
        })?;
        let resp_cred = resp.result.credentials;

        Ok(Some(Credential {
            access_key_id: resp_cred.access_key_id,
            secret_access_key: resp_cred.secret_access_key,
            session_token: Some(resp_cred.session_token.trim().to_string()),
            expires_in: Some(parse_rfc3339(&resp_cred.expiration)?),
        }))
    }
}

#[derive(Default, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct AssumeRoleWithWebIdentityResponse {
    #[serde(rename = "AssumeRoleWithWebIdentityResult")]
    result: AssumeRoleWithWebIdentityResult,
}

#[derive(Default, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct AssumeRoleWithWebIdentityResult {
    credentials: WebIdentityCredentials,
}

#[derive(Default, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct WebIdentityCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
    expiration: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provide_credential::mock::MockHttpSend;
    use http::Method;
    use pretty_assertions::assert_eq;
    use sigv4_proxy_core::{ErrorKind, StaticEnv};
    use sigv4_proxy_file_read_tokio::TokioFileRead;
    use std::collections::HashMap;
    use std::io::Write;

    const WEB_IDENTITY_RESPONSE: &str = r#"<AssumeRoleWithWebIdentityResponse xmlns="https://sts.amazonaws.com/doc/2011-06-15/">
  <AssumeRoleWithWebIdentityResult>
    <SubjectFromWebIdentityToken>system:serviceaccount:search:relay</SubjectFromWebIdentityToken>
    <AssumedRoleUser>
      <Arn>arn:aws:sts::123456789012:assumed-role/search/sigv4-proxy</Arn>
      <AssumedRoleId>AROACLKWSDQRAOEXAMPLE:sigv4-proxy</AssumedRoleId>
    </AssumedRoleUser>
    <Credentials>
      <AccessKeyId>ASIAWEBIDENTITY</AccessKeyId>
      <SecretAccessKey>web-identity-secret</SecretAccessKey>
      <SessionToken>web-identity-token</SessionToken>
      <Expiration>2099-01-01T00:00:00Z</Expiration>
    </Credentials>
  </AssumeRoleWithWebIdentityResult>
</AssumeRoleWithWebIdentityResponse>"#;

    fn ctx(http: MockHttpSend, envs: &[(&str, &str)]) -> Context {
        Context::new()
            .with_file_read(TokioFileRead)
            .with_http_send(http)
            .with_env(StaticEnv {
                home_dir: None,
                envs: envs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<HashMap<_, _>>(),
            })
    }

    #[tokio::test]
    async fn test_web_identity_without_env() {
        let _ = env_logger::builder().is_test(true).try_init();

        let ctx = ctx(
            MockHttpSend::default(),
            &[(AWS_ROLE_ARN, "arn:aws:iam::123456789012:role/search")],
        );
        let result = WebIdentityCredentialProvider::new()
            .provide_credential(&ctx)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_web_identity_exchanges_token() {
        let mut token = tempfile::NamedTempFile::new().unwrap();
        writeln!(token, "eyJhbGciOiJSUzI1NiJ9.payload.sig").unwrap();
        let token_path = token.path().to_string_lossy().to_string();

        let http = MockHttpSend::default().route(Method::GET, "/", 200, WEB_IDENTITY_RESPONSE);
        let ctx = ctx(
            http.clone(),
            &[
                (AWS_ROLE_ARN, "arn:aws:iam::123456789012:role/search"),
                (AWS_WEB_IDENTITY_TOKEN_FILE, token_path.as_str()),
                (AWS_REGION, "us-west-2"),
                (AWS_STS_REGIONAL_ENDPOINTS, "regional"),
            ],
        );

        let cred = WebIdentityCredentialProvider::new()
            .provide_credential(&ctx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cred.access_key_id, "ASIAWEBIDENTITY");
        assert_eq!(cred.secret_access_key, "web-identity-secret");
        assert_eq!(cred.session_token.as_deref(), Some("web-identity-token"));
        assert!(cred.expires_in.is_some());

        let seen = http.seen();
        assert_eq!(seen[0].uri.host(), Some("sts.us-west-2.amazonaws.com"));
        assert!(seen[0].headers.get(http::header::AUTHORIZATION).is_none());

        let query: HashMap<String, String> = form_urlencoded::parse(
            seen[0].uri.query().unwrap().as_bytes(),
        )
        .into_owned()
        .collect();
        assert_eq!(query["Action"], "AssumeRoleWithWebIdentity");
        assert_eq!(query["RoleArn"], "arn:aws:iam::123456789012:role/search");
        assert_eq!(query["RoleSessionName"], "sigv4-proxy");
        assert_eq!(query["WebIdentityToken"], "eyJhbGciOiJSUzI1NiJ9.payload.sig");
    }

    #[tokio::test]
    async fn test_web_identity_missing_token_file() {
        let ctx = ctx(
            MockHttpSend::default(),
            &[
                (AWS_ROLE_ARN, "arn:aws:iam::123456789012:role/search"),
                (AWS_WEB_IDENTITY_TOKEN_FILE, "/non/existent/token"),
            ],
        );

        let err = WebIdentityCredentialProvider::new()
            .provide_credential(&ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[tokio::test]
    async fn test_web_identity_access_denied() {
        let mut token = tempfile::NamedTempFile::new().unwrap();
        write!(token, "token").unwrap();
        let token_path = token.path().to_string_lossy().to_string();

        let body = r#"<ErrorResponse><Error><Code>AccessDenied</Code><Message>no trust</Message></Error></ErrorResponse>"#;
        let http = MockHttpSend::default().route(Method::GET, "/", 403, body);
        let ctx = ctx(
            http,
            &[
                (AWS_ROLE_ARN, "arn:aws:iam::123456789012:role/search"),
                (AWS_WEB_IDENTITY_TOKEN_FILE, token_path.as_str()),
            ],
        );

        let err = WebIdentityCredentialProvider::new()
            .provide_credential(&ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CredentialDenied);
    }
}
