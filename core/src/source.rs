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

use crate::{Context, Error, ProvideCredential, Result, SigningCredential};
use arc_swap::ArcSwapOption;
use log::{debug, info, warn};
use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// CredentialSource owns the process wide credential snapshot.
///
/// Readers load the current `Arc<K>` without locking. A refresh builds a
/// brand new credential and swaps the pointer, so no reader can ever observe
/// a half-updated credential. Concurrent refreshes may race; the last writer
/// wins and all of them are equivalent.
pub struct CredentialSource<K: SigningCredential> {
    inner: Arc<Inner<K>>,
}

struct Inner<K: SigningCredential> {
    ctx: Context,
    provider: Box<dyn ProvideCredential<Credential = K>>,
    snapshot: ArcSwapOption<K>,
    refreshing: AtomicBool,
}

impl<K: SigningCredential> Clone for CredentialSource<K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K: SigningCredential> Debug for CredentialSource<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSource")
            .field("provider", &self.inner.provider)
            .field("cached", &self.inner.snapshot.load().is_some())
            .finish()
    }
}

impl<K: SigningCredential> CredentialSource<K> {
    /// Create a new source that resolves lazily through `provider`.
    pub fn new(ctx: Context, provider: impl ProvideCredential<Credential = K>) -> Self {
        Self {
            inner: Arc::new(Inner {
                ctx,
                provider: Box::new(provider),
                snapshot: ArcSwapOption::empty(),
                refreshing: AtomicBool::new(false),
            }),
        }
    }

    /// Run the provider chain once, bypassing the cache.
    ///
    /// Fails with [`crate::ErrorKind::CredentialUnavailable`] when no
    /// provider produced a credential.
    pub async fn resolve(&self) -> Result<K> {
        let cred = self
            .inner
            .provider
            .provide_credential(&self.inner.ctx)
            .await?
            .ok_or_else(|| {
                Error::credential_unavailable("no credential provider produced credentials")
            })?;

        if !cred.is_valid() {
            return Err(Error::credential_invalid(
                "resolved credential is missing keys or already expired",
            ));
        }

        Ok(cred)
    }

    /// Return a usable credential, resolving it if the cache is empty or stale.
    ///
    /// A cached credential that is still valid but close to expiring is
    /// returned immediately while a background task fetches its successor.
    pub async fn current(&self) -> Result<Arc<K>> {
        if let Some(cred) = self.inner.snapshot.load_full() {
            if cred.is_valid() {
                if cred.needs_refresh() {
                    self.spawn_refresh();
                }
                return Ok(cred);
            }
            debug!("cached credential expired, resolving inline");
        }

        let cred = Arc::new(self.resolve().await?);
        self.inner.snapshot.store(Some(cred.clone()));
        info!("resolved new credential: {cred:?}");
        Ok(cred)
    }

    /// Peek at the cached credential without triggering resolution.
    pub fn cached(&self) -> Option<Arc<K>> {
        self.inner.snapshot.load_full()
    }

    fn spawn_refresh(&self) {
        if self.inner.refreshing.swap(true, Ordering::AcqRel) {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            self.inner.refreshing.store(false, Ordering::Release);
            return;
        };

        let this = self.clone();
        handle.spawn(async move {
            match this.resolve().await {
                Ok(cred) => {
                    info!("refreshed credential ahead of expiration: {cred:?}");
                    this.inner.snapshot.store(Some(Arc::new(cred)));
                }
                Err(err) => {
                    warn!("background credential refresh failed: {err:?}");
                }
            }
            this.inner.refreshing.store(false, Ordering::Release);
        });
    }
}
