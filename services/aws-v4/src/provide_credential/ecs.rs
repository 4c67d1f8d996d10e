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
use http::Method;
use log::debug;
use serde::Deserialize;
use sigv4_proxy_core::time::parse_rfc3339;
use sigv4_proxy_core::{Context, Error, ProvideCredential, Result};

const ECS_METADATA_ENDPOINT: &str = "http://169.254.170.2";

/// EcsCredentialProvider loads credentials from the container credentials
/// endpoint that ECS, Fargate and EKS Pod Identity expose.
///
/// - `AWS_CONTAINER_CREDENTIALS_RELATIVE_URI` is resolved against `http://169.254.170.2`.
/// - `AWS_CONTAINER_CREDENTIALS_FULL_URI` is used as is.
/// - `AWS_CONTAINER_AUTHORIZATION_TOKEN` is sent as `Authorization` when set.
///
/// References:
/// - [IAM roles for tasks](https://docs.aws.amazon.com/AmazonECS/latest/developerguide/task-iam-roles.html)
#[derive(Debug, Default, Clone)]
pub struct EcsCredentialProvider;

impl EcsCredentialProvider {
    /// Create a new `EcsCredentialProvider` instance.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProvideCredential for EcsCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        let url = match (
            ctx.env_var(AWS_CONTAINER_CREDENTIALS_RELATIVE_URI),
            ctx.env_var(AWS_CONTAINER_CREDENTIALS_FULL_URI),
        ) {
            (Some(relative), _) => format!("{ECS_METADATA_ENDPOINT}{relative}"),
            (None, Some(full)) => full,
            (None, None) => {
                debug!("container credentials endpoint not configured, skipping");
                return Ok(None);
            }
        };

        let mut req = http::Request::builder().uri(&url).method(Method::GET);
        if let Some(token) = ctx.env_var(AWS_CONTAINER_AUTHORIZATION_TOKEN) {
            req = req.header(http::header::AUTHORIZATION, token);
        }
        let req = req.body(Bytes::new()).map_err(|e| {
            Error::request_invalid("failed to build container credentials request")
                .with_source(e)
                .with_context(format!("url: {url}"))
        })?;

        let resp = ctx.http_send_as_string(req).await?;
        if resp.status() != http::StatusCode::OK {
            return Err(parse_metadata_error(
                "fetch_container_credentials",
                resp.status(),
                resp.body(),
            ));
        }

        let content = resp.into_body();
        let cred: EcsTaskCredentials = serde_json::from_str(&content).map_err(|e| {
            Error::unexpected("failed to parse container credentials").with_source(e)
        })?;

        let expires_in = parse_rfc3339(&cred.expiration)
            .map_err(|e| e.with_context(format!("expiration_value: {}", cred.expiration)))?;

        Ok(Some(Credential {
            access_key_id: cred.access_key_id,
            secret_access_key: cred.secret_access_key,
            session_token: Some(cred.token),
            expires_in: Some(expires_in),
        }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EcsTaskCredentials {
    access_key_id: String,
    secret_access_key: String,
    token: String,
    expiration: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provide_credential::mock::MockHttpSend;
    use sigv4_proxy_core::{ErrorKind, StaticEnv};
    use std::collections::HashMap;

    const TASK_CREDENTIALS: &str = r#"{
        "RoleArn": "arn:aws:iam::123456789012:role/task",
        "AccessKeyId": "ASIAECSEXAMPLE",
        "SecretAccessKey": "ecs-secret",
        "Token": "ecs-token",
        "Expiration": "2099-01-01T00:00:00Z"
    }"#;

    fn ctx(http: MockHttpSend, envs: &[(&str, &str)]) -> Context {
        Context::new().with_http_send(http).with_env(StaticEnv {
            home_dir: None,
            envs: envs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        })
    }

    #[tokio::test]
    async fn test_ecs_credential_provider_without_env() {
        let _ = env_logger::builder().is_test(true).try_init();

        let result = EcsCredentialProvider::new()
            .provide_credential(&ctx(MockHttpSend::default(), &[]))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_ecs_relative_uri() {
        let http = MockHttpSend::default().route(Method::GET, "/v2/credentials/abc", 200, TASK_CREDENTIALS);
        let ctx = ctx(
            http.clone(),
            &[(AWS_CONTAINER_CREDENTIALS_RELATIVE_URI, "/v2/credentials/abc")],
        );

        let cred = EcsCredentialProvider::new()
            .provide_credential(&ctx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cred.access_key_id, "ASIAECSEXAMPLE");
        assert_eq!(cred.session_token.as_deref(), Some("ecs-token"));
        assert!(cred.expires_in.is_some());

        let seen = http.seen();
        assert_eq!(seen[0].uri.host(), Some("169.254.170.2"));
        assert!(seen[0].headers.get(http::header::AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn test_ecs_full_uri_with_token() {
        let http = MockHttpSend::default().route(Method::GET, "/creds", 200, TASK_CREDENTIALS);
        let ctx = ctx(
            http.clone(),
            &[
                (AWS_CONTAINER_CREDENTIALS_FULL_URI, "http://127.0.0.1:8080/creds"),
                (AWS_CONTAINER_AUTHORIZATION_TOKEN, "Bearer pod-token"),
            ],
        );

        let cred = EcsCredentialProvider::new()
            .provide_credential(&ctx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cred.secret_access_key, "ecs-secret");
        assert_eq!(
            http.seen()[0].headers[http::header::AUTHORIZATION],
            "Bearer pod-token"
        );
    }

    #[tokio::test]
    async fn test_ecs_error_status() {
        let http = MockHttpSend::default().route(Method::GET, "/creds", 403, "denied");
        let ctx = ctx(
            http,
            &[(AWS_CONTAINER_CREDENTIALS_FULL_URI, "http://127.0.0.1:8080/creds")],
        );

        let err = EcsCredentialProvider::new()
            .provide_credential(&ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CredentialDenied);
    }
}
