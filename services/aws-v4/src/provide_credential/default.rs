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

use crate::constants::*;
use crate::provide_credential::{
    AssumeRoleCredentialProvider, EcsCredentialProvider, EnvCredentialProvider,
    ImdsCredentialProvider, ProfileCredentialProvider, WebIdentityCredentialProvider,
};
use crate::Credential;
use async_trait::async_trait;
use log::debug;
use sigv4_proxy_core::{
    Context, CredentialSource, ProvideCredential, ProvideCredentialChain, Result,
};

/// DefaultCredentialProvider is a loader that will try to load credential via default chains.
///
/// Resolution order:
///
/// 1. Environment variables
/// 2. Shared config (`~/.aws/config`, `~/.aws/credentials`)
/// 3. Web identity token file (`AWS_WEB_IDENTITY_TOKEN_FILE` with `AWS_ROLE_ARN`)
/// 4. ECS (IAM Roles for Tasks) & Container credentials
/// 5. EC2 IMDSv2
///
/// With a role ARN configured, the first credential found this way is only
/// used to call STS, and the assumed role's credentials are returned.
#[derive(Debug)]
pub struct DefaultCredentialProvider {
    provider: Box<dyn ProvideCredential<Credential = Credential>>,
}

impl Default for DefaultCredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultCredentialProvider {
    /// Create a new `DefaultCredentialProvider` instance.
    pub fn new() -> Self {
        Self::with_chain(Self::default_chain())
    }

    /// Create with a custom credential chain.
    pub fn with_chain(chain: ProvideCredentialChain<Credential>) -> Self {
        Self {
            provider: Box::new(chain),
        }
    }

    /// Assume `role_arn` using the default chain as the source credential.
    ///
    /// Session name and STS endpoint settings are read from `ctx`. When the
    /// role is the one the web identity token already grants, the chain is
    /// used as is.
    pub fn with_role_arn(ctx: &Context, role_arn: impl Into<String>) -> Self {
        let role_arn = role_arn.into();
        if ctx.env_var(AWS_WEB_IDENTITY_TOKEN_FILE).is_some_and(|v| !v.is_empty())
            && ctx.env_var(AWS_ROLE_ARN).as_deref() == Some(role_arn.as_str())
        {
            debug!("role {role_arn} is provided by web identity, not assuming it again");
            return Self::new();
        }

        let source = CredentialSource::new(ctx.clone(), Self::default_chain());
        Self {
            provider: Box::new(AssumeRoleCredentialProvider::new(role_arn, source).with_env(ctx)),
        }
    }

    fn default_chain() -> ProvideCredentialChain<Credential> {
        ProvideCredentialChain::new()
            .push(EnvCredentialProvider::new())
            .push(ProfileCredentialProvider::new())
            .push(WebIdentityCredentialProvider::new())
            .push(EcsCredentialProvider::new())
            .push(ImdsCredentialProvider::new())
    }
}

#[async_trait]
impl ProvideCredential for DefaultCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        self.provider.provide_credential(ctx).await
    }
}
