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

//! AWS SigV4 signing for the proxy.
//!
//! This crate turns a buffered request into a signed one:
//!
//! - [`Credential`] and the providers that load it (environment, shared
//!   profile files, container and instance metadata, STS AssumeRole).
//! - [`CanonicalRequest`], the deterministic form SigV4 signs over.
//! - [`RequestSigner`], which derives the signing key and injects the
//!   `Host`, `X-Amz-Date`, `x-amz-security-token` and `Authorization` headers.
//!
//! ## Example
//!
//! ```no_run
//! use sigv4_proxy_aws_v4::{DefaultCredentialProvider, RequestSigner};
//! use sigv4_proxy_core::{Context, OsEnv, Signer};
//! use sigv4_proxy_file_read_tokio::TokioFileRead;
//! use sigv4_proxy_http_send_reqwest::ReqwestHttpSend;
//!
//! # async fn example() -> sigv4_proxy_core::Result<()> {
//! let ctx = Context::new()
//!     .with_file_read(TokioFileRead)
//!     .with_http_send(ReqwestHttpSend::default())
//!     .with_env(OsEnv);
//! let signer = Signer::new(
//!     ctx,
//!     DefaultCredentialProvider::new(),
//!     RequestSigner::new("es", "us-west-2"),
//! );
//!
//! let body = br#"{"a":1}"#;
//! let (mut parts, _) = http::Request::put("https://search-demo.us-west-2.es.amazonaws.com/index/doc/1")
//!     .body(())?
//!     .into_parts();
//! signer.sign(&mut parts, body).await?;
//! # Ok(())
//! # }
//! ```

// Make sure all our public APIs have docs.
#![warn(missing_docs)]

mod constants;
pub use constants::EMPTY_STRING_SHA256;

mod credential;
pub use credential::Credential;

mod canonical;
pub use canonical::CanonicalRequest;

mod sign_request;
pub use sign_request::RequestSigner;

mod provide_credential;
pub use provide_credential::*;
