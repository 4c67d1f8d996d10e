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
use clap::Parser;
use http::uri::{Authority, PathAndQuery, Scheme};
use http::Uri;
use regex::Regex;
use sigv4_proxy_core::{Error, Result};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Command line arguments, each with an environment fallback.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "sigv4-proxy",
    version,
    about = "Signs every request with AWS SigV4 and relays it to a fixed endpoint"
)]
pub struct Args {
    /// Address to listen on.
    #[arg(short, long, env = "BIND_ADDRESS", default_value = "127.0.0.1")]
    pub bind_address: IpAddr,

    /// Port to listen on.
    #[arg(short, long, env = "PORT", default_value_t = 9200)]
    pub port: u16,

    /// Signing region, inferred from the endpoint when omitted.
    #[arg(short, long, env = "REGION")]
    pub region: Option<String>,

    /// Signing service name, inferred from the endpoint when omitted.
    #[arg(short, long, env = "SERVICE")]
    pub service: Option<String>,

    /// Basic auth user; the gate is enabled only together with a password.
    #[arg(short, long, env = "USER")]
    pub user: Option<String>,

    /// Basic auth password.
    #[arg(short = 'a', long, env = "PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Role to assume with the resolved credentials.
    #[arg(long, env = "AWS_ROLE_ARN")]
    pub role_arn: Option<String>,

    /// Largest request body buffered before signing, in bytes.
    #[arg(long, env = "MAX_BODY_SIZE", default_value_t = 10 * 1024 * 1024)]
    pub max_body_size: usize,

    /// Upstream deadline in seconds.
    #[arg(long = "timeout", env = "UPSTREAM_TIMEOUT", default_value_t = 60)]
    pub timeout_secs: u64,

    /// Never gzip responses.
    #[arg(long)]
    pub no_compression: bool,

    /// Target endpoint, e.g. `search-demo.us-west-2.es.amazonaws.com`.
    #[arg(env = "ENDPOINT")]
    pub endpoint: String,
}

/// Resolved proxy configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Socket the proxy listens on.
    pub bind: SocketAddr,
    /// Upstream every request is relayed to.
    pub target: Target,
    /// Region used in the credential scope.
    pub region: String,
    /// Service used in the credential scope.
    pub service: String,
    /// Basic auth gate, if enabled.
    pub basic_auth: Option<BasicAuth>,
    /// Role assumed on top of the default chain.
    pub role_arn: Option<String>,
    /// Request buffering limit in bytes.
    pub max_body_size: usize,
    /// Upstream deadline.
    pub upstream_timeout: Duration,
    /// Whether gzip compression is applied.
    pub compression: bool,
}

impl Config {
    /// Validate `args` into a config.
    ///
    /// Fails when region or service is neither given nor inferable from the
    /// endpoint host.
    pub fn from_args(args: Args) -> Result<Self> {
        let target = Target::parse(&args.endpoint)?;
        let inferred = infer_region_service(target.host())?;

        let region = args
            .region
            .filter(|v| !v.is_empty())
            .or_else(|| inferred.as_ref().map(|(r, _)| r.clone()))
            .ok_or_else(|| {
                Error::config_invalid("region is not set and can't be inferred from endpoint")
                    .with_context(format!("endpoint: {}", args.endpoint))
            })?;
        let service = args
            .service
            .filter(|v| !v.is_empty())
            .or_else(|| inferred.map(|(_, s)| s))
            .ok_or_else(|| {
                Error::config_invalid("service is not set and can't be inferred from endpoint")
                    .with_context(format!("endpoint: {}", args.endpoint))
            })?;

        Ok(Self {
            bind: SocketAddr::new(args.bind_address, args.port),
            target,
            region,
            service,
            basic_auth: BasicAuth::from_pair(args.user, args.password),
            role_arn: args.role_arn.filter(|v| !v.is_empty()),
            max_body_size: args.max_body_size,
            upstream_timeout: Duration::from_secs(args.timeout_secs),
            compression: !args.no_compression,
        })
    }
}

/// Take `(region, service)` from a `<region>.<service>.amazonaws.com` host.
///
/// ```
/// use sigv4_proxy::infer_region_service;
///
/// let v = infer_region_service("search-demo.us-west-2.es.amazonaws.com").unwrap();
/// assert_eq!(v, Some(("us-west-2".to_string(), "es".to_string())));
/// ```
pub fn infer_region_service(host: &str) -> Result<Option<(String, String)>> {
    let re = Regex::new(r"([^.]+)\.([^.]+)\.amazonaws\.com\.?$")
        .map_err(|e| Error::unexpected("invalid endpoint pattern").with_source(e))?;

    Ok(re
        .captures(host)
        .map(|caps| (caps[1].to_string(), caps[2].to_string())))
}

/// The fixed upstream: scheme and authority only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    scheme: Scheme,
    authority: Authority,
}

impl Target {
    /// Parse an endpoint, assuming `https://` when no scheme is given.
    pub fn parse(endpoint: &str) -> Result<Self> {
        let endpoint = endpoint.trim();
        let with_scheme = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("https://{endpoint}")
        };

        let invalid = |msg: &str| {
            Error::config_invalid(msg.to_string()).with_context(format!("endpoint: {endpoint}"))
        };

        let uri: Uri = with_scheme
            .parse()
            .map_err(|e: http::uri::InvalidUri| invalid("endpoint is not a valid uri").with_source(e))?;
        let parts = uri.into_parts();

        if parts
            .path_and_query
            .as_ref()
            .is_some_and(|pq| pq.as_str() != "/")
        {
            return Err(invalid("endpoint must not carry a path or query"));
        }

        match (parts.scheme, parts.authority) {
            (Some(scheme), Some(authority)) if !authority.host().is_empty() => {
                Ok(Self { scheme, authority })
            }
            _ => Err(invalid("endpoint has no host")),
        }
    }

    /// Host name without port.
    pub fn host(&self) -> &str {
        self.authority.host()
    }

    /// Value sent as `Host`.
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Upstream uri for an inbound path and query.
    pub fn uri_for(&self, path_and_query: Option<&PathAndQuery>) -> Result<Uri> {
        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(
                path_and_query
                    .cloned()
                    .unwrap_or_else(|| PathAndQuery::from_static("/")),
            )
            .build()
            .map_err(|e| Error::request_invalid("failed to build upstream uri").with_source(e))
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sigv4_proxy_core::ErrorKind;
    use test_case::test_case;

    fn args(endpoint: &str) -> Args {
        Args {
            bind_address: IpAddr::from([127, 0, 0, 1]),
            port: 9200,
            region: None,
            service: None,
            user: None,
            password: None,
            role_arn: None,
            max_body_size: 10 * 1024 * 1024,
            timeout_secs: 60,
            no_compression: false,
            endpoint: endpoint.to_string(),
        }
    }

    #[test]
    fn test_cli_flags() {
        let a = Args::try_parse_from([
            "sigv4-proxy",
            "-b",
            "0.0.0.0",
            "-p",
            "8080",
            "-r",
            "eu-west-1",
            "-s",
            "es",
            "--timeout",
            "5",
            "--no-compression",
            "search-demo.eu-west-1.es.amazonaws.com",
        ])
        .unwrap();
        assert_eq!(a.bind_address.to_string(), "0.0.0.0");
        assert_eq!(a.port, 8080);
        assert_eq!(a.region.as_deref(), Some("eu-west-1"));
        assert_eq!(a.timeout_secs, 5);
        assert!(a.no_compression);
    }

    #[test_case("search-demo.us-west-2.es.amazonaws.com", Some(("us-west-2", "es")); "es domain")]
    #[test_case("foo.eu-central-1.aoss.amazonaws.com.", Some(("eu-central-1", "aoss")); "trailing dot")]
    #[test_case("example.com", None; "foreign host")]
    #[test_case("amazonaws.com", None; "bare suffix")]
    fn test_infer_region_service(host: &str, expected: Option<(&str, &str)>) {
        let got = infer_region_service(host).unwrap();
        assert_eq!(
            got,
            expected.map(|(r, s)| (r.to_string(), s.to_string()))
        );
    }

    #[test_case("search-demo.us-west-2.es.amazonaws.com", "https://search-demo.us-west-2.es.amazonaws.com"; "no scheme")]
    #[test_case("http://127.0.0.1:9200", "http://127.0.0.1:9200"; "explicit http")]
    #[test_case("https://example.com/", "https://example.com"; "root path")]
    fn test_target_parse(endpoint: &str, expected: &str) {
        assert_eq!(Target::parse(endpoint).unwrap().to_string(), expected);
    }

    #[test]
    fn test_target_rejects_path() {
        let err = Target::parse("https://example.com/prefix").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_target_uri_keeps_path_and_query() {
        let target = Target::parse("http://127.0.0.1:9200").unwrap();
        let pq = PathAndQuery::from_static("/a%20b/_search?q=x&size=1");
        assert_eq!(
            target.uri_for(Some(&pq)).unwrap().to_string(),
            "http://127.0.0.1:9200/a%20b/_search?q=x&size=1"
        );
        assert_eq!(target.uri_for(None).unwrap().to_string(), "http://127.0.0.1:9200/");
    }

    #[test]
    fn test_config_infers_both() {
        let cfg = Config::from_args(args("search-demo.us-west-2.es.amazonaws.com")).unwrap();
        assert_eq!(cfg.region, "us-west-2");
        assert_eq!(cfg.service, "es");
        assert_eq!(cfg.bind.to_string(), "127.0.0.1:9200");
        assert!(cfg.compression);
    }

    #[test]
    fn test_config_service_override_with_inferred_region() {
        let mut a = args("search-demo.us-west-2.es.amazonaws.com");
        a.service = Some("aoss".to_string());
        let cfg = Config::from_args(a).unwrap();
        assert_eq!(cfg.region, "us-west-2");
        assert_eq!(cfg.service, "aoss");
    }

    #[test]
    fn test_config_region_override_with_inferred_service() {
        let mut a = args("search-demo.us-west-2.es.amazonaws.com");
        a.region = Some("us-east-1".to_string());
        let cfg = Config::from_args(a).unwrap();
        assert_eq!(cfg.region, "us-east-1");
        assert_eq!(cfg.service, "es");
    }

    #[test]
    fn test_config_unresolvable_is_fatal() {
        let err = Config::from_args(args("http://localhost:9200")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);

        let mut a = args("http://localhost:9200");
        a.region = Some("us-east-1".to_string());
        let err = Config::from_args(a).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_config_basic_auth_needs_both() {
        let mut a = args("search-demo.us-west-2.es.amazonaws.com");
        a.user = Some("admin".to_string());
        a.password = None;
        assert!(Config::from_args(a.clone()).unwrap().basic_auth.is_none());

        a.password = Some("secret".to_string());
        assert!(Config::from_args(a).unwrap().basic_auth.is_some());
    }
}
