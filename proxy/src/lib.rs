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

//! A relay that signs every inbound request with AWS SigV4 and forwards it
//! to one fixed endpoint, such as an Amazon OpenSearch domain.
//!
//! The request path is [`ProxyService`] → [`BasicAuth`] (optional) →
//! [`Forwarder`] → gzip (optional). Signing itself lives in
//! `sigv4-proxy-aws-v4`.

// Make sure all our public APIs have docs.
#![warn(missing_docs)]

mod auth;
pub use auth::BasicAuth;

pub mod body;

mod compress;
pub use compress::{accepts_gzip, should_compress, GzipBody};

mod config;
pub use config::{infer_region_service, Args, Config, Target};

mod error;
pub use error::{ProxyError, BASIC_AUTH_CHALLENGE};

mod forward;
pub use forward::{Forwarder, STATIC_ASSET_CACHE_CONTROL};

mod server;
pub use server::{build_service, run, serve, shutdown_signal, ProxyService};
