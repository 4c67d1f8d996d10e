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

use crate::auth::BasicAuth;
use crate::body::{BoxError, ProxyBody};
use crate::compress::{accepts_gzip, gzip, should_compress};
use crate::config::Config;
use crate::forward::Forwarder;
use anyhow::Context as _;
use bytes::Bytes;
use http::header::AUTHORIZATION;
use http::{Method, Request, Response};
use hyper::body::{Body, Incoming};
use hyper::service::Service;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use log::{debug, error, info, warn};
use sigv4_proxy_aws_v4::{DefaultCredentialProvider, RequestSigner};
use sigv4_proxy_core::{Context, OsEnv, Signer};
use sigv4_proxy_file_read_tokio::TokioFileRead;
use sigv4_proxy_http_send_reqwest::ReqwestHttpSend;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::net::TcpListener;

/// Hyper service: basic auth gate, forwarder, then optional gzip.
#[derive(Clone, Debug)]
pub struct ProxyService {
    forwarder: Forwarder,
    basic_auth: Option<BasicAuth>,
    compression: bool,
}

impl ProxyService {
    /// Service relaying through `forwarder`, without auth and with compression.
    pub fn new(forwarder: Forwarder) -> Self {
        Self {
            forwarder,
            basic_auth: None,
            compression: true,
        }
    }

    /// Require basic auth before forwarding.
    pub fn with_basic_auth(mut self, auth: Option<BasicAuth>) -> Self {
        self.basic_auth = auth;
        self
    }

    /// Enable or disable gzip responses.
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    /// Handle one request. Failures become error responses.
    pub async fn handle<B>(&self, mut req: Request<B>) -> Response<ProxyBody>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        if let Some(auth) = &self.basic_auth {
            if let Err(err) = auth.check(req.headers()) {
                debug!("{method} {path} rejected: {err}");
                return err.into_response();
            }
            // Replaced by the SigV4 authorization below.
            req.headers_mut().remove(AUTHORIZATION);
        }

        let compress = self.compression && method != Method::HEAD && accepts_gzip(req.headers());

        match self.forwarder.forward(req).await {
            Ok(resp) if compress && should_compress(&resp) => gzip(resp),
            Ok(resp) => resp,
            Err(err) => {
                if err.status().is_server_error() {
                    error!("{method} {path} failed: {err}");
                } else {
                    warn!("{method} {path} failed: {err}");
                }
                err.into_response()
            }
        }
    }
}

impl Service<Request<Incoming>> for ProxyService {
    type Response = Response<ProxyBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let this = self.clone();
        Box::pin(async move { Ok(this.handle(req).await) })
    }
}

/// Build the service described by `config`.
///
/// Credentials come from the ambient AWS environment; nothing is fetched here.
pub fn build_service(config: &Config) -> anyhow::Result<ProxyService> {
    // Keep metadata lookups short so a host without IMDS fails fast.
    let metadata_client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(1))
        .timeout(Duration::from_secs(5))
        .build()
        .context("failed to build credential http client")?;

    let ctx = Context::new()
        .with_file_read(TokioFileRead)
        .with_http_send(ReqwestHttpSend::new(metadata_client))
        .with_env(OsEnv);

    let provider = match &config.role_arn {
        Some(arn) => DefaultCredentialProvider::with_role_arn(&ctx, arn.as_str()),
        None => DefaultCredentialProvider::new(),
    };
    let signer = Signer::new(
        ctx,
        provider,
        RequestSigner::new(&config.service, &config.region),
    );

    let forwarder = Forwarder::new(config.target.clone(), signer)?
        .with_max_body_size(config.max_body_size)
        .with_timeout(config.upstream_timeout);

    Ok(ProxyService::new(forwarder)
        .with_basic_auth(config.basic_auth.clone())
        .with_compression(config.compression))
}

/// Bind, announce and serve until `shutdown` resolves.
pub async fn run(config: Config, shutdown: impl Future<Output = ()>) -> anyhow::Result<()> {
    let service = build_service(&config)?;
    info!(
        "signing for region {} service {}, relaying to {}",
        config.region, config.service, config.target
    );

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    info!(
        "AWS Sign Proxy available at http://{}",
        listener.local_addr()?
    );

    serve(listener, service, shutdown).await
}

/// Accept connections until `shutdown` resolves, then drain in-flight ones.
pub async fn serve(
    listener: TcpListener,
    service: ProxyService,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();
    let http = HttpConnBuilder::new(TokioExecutor::new());

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("failed to accept connection: {e}");
                        continue;
                    }
                };

                let svc = service.clone();
                let conn = http.serve_connection(TokioIo::new(stream), svc);
                let conn = graceful.watch(conn.into_owned());

                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        debug!("connection from {peer_addr} closed with error: {e}");
                    }
                });
            }

            () = &mut shutdown => {
                info!("shutting down gracefully");
                break;
            }
        }
    }

    graceful.shutdown().await;
    info!("all connections drained, exiting");

    Ok(())
}

/// Resolves on Ctrl-C.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("received shutdown signal, draining connections");
}
