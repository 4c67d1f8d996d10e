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

use crate::time::{now, DateTime};
use crate::{Context, CredentialSource, ProvideCredential, Result, SignRequest, SigningCredential};
use std::sync::Arc;

/// Signer is the main struct used to sign the request.
///
/// It pairs a [`CredentialSource`] with a request builder. Cloning a signer
/// is cheap and every clone shares the same credential snapshot.
#[derive(Debug)]
pub struct Signer<K: SigningCredential> {
    credentials: CredentialSource<K>,
    builder: Arc<dyn SignRequest<Credential = K>>,
}

impl<K: SigningCredential> Clone for Signer<K> {
    fn clone(&self) -> Self {
        Self {
            credentials: self.credentials.clone(),
            builder: self.builder.clone(),
        }
    }
}

impl<K: SigningCredential> Signer<K> {
    /// Create a new signer.
    pub fn new(
        ctx: Context,
        provider: impl ProvideCredential<Credential = K>,
        builder: impl SignRequest<Credential = K>,
    ) -> Self {
        Self {
            credentials: CredentialSource::new(ctx, provider),
            builder: Arc::new(builder),
        }
    }

    /// The credential source backing this signer.
    pub fn credentials(&self) -> &CredentialSource<K> {
        &self.credentials
    }

    /// Sign the request at the current instant.
    pub async fn sign(&self, req: &mut http::request::Parts, body: &[u8]) -> Result<()> {
        self.sign_at(req, body, now()).await
    }

    /// Sign the request at the given instant.
    ///
    /// The timestamp is read exactly once by the caller, so the `x-amz-date`
    /// header and the credential scope can never disagree.
    pub async fn sign_at(
        &self,
        req: &mut http::request::Parts,
        body: &[u8],
        now: DateTime,
    ) -> Result<()> {
        let cred = self.credentials.current().await?;
        self.builder.sign_request(req, body, &cred, now)
    }
}
