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

//! Core components for signing proxied requests.
//!
//! This crate provides the foundational types and traits shared by the
//! credential providers, the SigV4 signer and the proxy itself.
//!
//! ## Overview
//!
//! - **Context**: holds the file reading, HTTP sending and environment seams
//!   that credential providers use
//! - **Traits**: [`ProvideCredential`] for loading credentials and
//!   [`SignRequest`] for turning a credential into authentication headers
//! - **CredentialSource**: the cached, atomically swapped credential snapshot
//! - **Signer**: couples a credential source with a request builder
//!
//! ## Example
//!
//! ```no_run
//! use sigv4_proxy_core::time::DateTime;
//! use sigv4_proxy_core::{Context, ProvideCredential, Result, SignRequest, Signer, SigningCredential};
//! use async_trait::async_trait;
//!
//! #[derive(Clone, Debug)]
//! struct Token(String);
//!
//! impl SigningCredential for Token {
//!     fn is_valid(&self) -> bool {
//!         !self.0.is_empty()
//!     }
//! }
//!
//! #[derive(Debug)]
//! struct Loader;
//!
//! #[async_trait]
//! impl ProvideCredential for Loader {
//!     type Credential = Token;
//!
//!     async fn provide_credential(&self, _: &Context) -> Result<Option<Token>> {
//!         Ok(Some(Token("secret".to_string())))
//!     }
//! }
//!
//! #[derive(Debug)]
//! struct Bearer;
//!
//! impl SignRequest for Bearer {
//!     type Credential = Token;
//!
//!     fn sign_request(
//!         &self,
//!         req: &mut http::request::Parts,
//!         _body: &[u8],
//!         cred: &Token,
//!         _now: DateTime,
//!     ) -> Result<()> {
//!         req.headers.insert(http::header::AUTHORIZATION, format!("Bearer {}", cred.0).parse()?);
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> Result<()> {
//! let signer = Signer::new(Context::new(), Loader, Bearer);
//!
//! let (mut parts, body) = http::Request::builder()
//!     .uri("https://example.com")
//!     .body(Vec::new())?
//!     .into_parts();
//! signer.sign(&mut parts, &body).await?;
//! # Ok(())
//! # }
//! ```

// Make sure all our public APIs have docs.
#![warn(missing_docs)]

pub mod hash;
pub mod time;
pub mod utils;

mod context;
pub use context::Context;
pub use context::Env;
pub use context::FileRead;
pub use context::HttpSend;
pub use context::OsEnv;
pub use context::StaticEnv;

mod error;
pub use error::{Error, ErrorKind, Result};

mod api;
pub use api::{ProvideCredential, SignRequest, SigningCredential};
mod chain;
pub use chain::ProvideCredentialChain;
mod source;
pub use source::CredentialSource;
mod signer;
pub use signer::Signer;
