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

use crate::constants::{AWS_QUERY_ENCODE_SET, AWS_URI_ENCODE_SET, X_AMZ_DATE, X_AMZ_SECURITY_TOKEN};
use http::header::HOST;
use http::request::Parts;
use http::HeaderName;
use percent_encoding::utf8_percent_encode;
use sigv4_proxy_core::hash::hex_sha256;
use sigv4_proxy_core::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write;

/// The canonical form of a request that SigV4 signs over.
///
/// Every field is already rendered. `Display` writes them in the fixed
/// layout, so two builds from the same input always produce the same bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRequest {
    /// Upper-cased method.
    pub method: String,
    /// URI-encoded path, always starting with `/`.
    pub uri: String,
    /// Sorted and encoded query string, may be empty.
    pub query: String,
    /// `name:value\n` for every signed header.
    pub headers: String,
    /// Semicolon joined list of signed header names.
    pub signed_headers: String,
    /// Hex encoded SHA-256 of the body.
    pub payload_hash: String,
}

impl CanonicalRequest {
    /// Build the canonical request from request parts and the complete body.
    ///
    /// `host`, `x-amz-date` and `x-amz-security-token` are signed whenever
    /// present; `signable` lists any extra headers to sign. The body must be
    /// fully buffered: its exact bytes are hashed into the payload hash.
    pub fn build(parts: &Parts, body: &[u8], signable: &[HeaderName]) -> Result<Self> {
        let method = parts.method.as_str().to_ascii_uppercase();

        let path = parts.uri.path();
        let uri = if path.starts_with('/') {
            utf8_percent_encode(path, &AWS_URI_ENCODE_SET).to_string()
        } else {
            format!("/{}", utf8_percent_encode(path, &AWS_URI_ENCODE_SET))
        };

        let query = canonical_query(parts.uri.query().unwrap_or_default());

        let mut names: Vec<&str> = vec![HOST.as_str(), X_AMZ_DATE, X_AMZ_SECURITY_TOKEN];
        names.extend(signable.iter().map(|v| v.as_str()));

        let mut signed = BTreeMap::new();
        for name in names {
            let mut values = Vec::new();
            for value in parts.headers.get_all(name) {
                let value = value.to_str().map_err(|e| {
                    Error::request_invalid("header value is not visible ascii")
                        .with_source(e)
                        .with_context(format!("header: {name}"))
                })?;
                values.push(normalize_header_value(value));
            }
            if !values.is_empty() {
                signed.insert(name.to_ascii_lowercase(), values.join(","));
            }
        }

        let mut headers = String::with_capacity(128);
        for (name, value) in signed.iter() {
            writeln!(headers, "{name}:{value}")?;
        }
        let signed_headers = signed.keys().map(String::as_str).collect::<Vec<_>>().join(";");

        Ok(Self {
            method,
            uri,
            query,
            headers,
            signed_headers,
            payload_hash: hex_sha256(body),
        })
    }
}

impl fmt::Display for CanonicalRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.method)?;
        writeln!(f, "{}", self.uri)?;
        writeln!(f, "{}", self.query)?;
        write!(f, "{}", self.headers)?;
        writeln!(f)?;
        writeln!(f, "{}", self.signed_headers)?;
        write!(f, "{}", self.payload_hash)
    }
}

/// Sort query pairs by name then value and encode both with the AWS rules.
fn canonical_query(query: &str) -> String {
    if query.is_empty() {
        return String::new();
    }

    let mut pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();

    pairs
        .iter()
        .map(|(k, v)| {
            format!(
                "{}={}",
                utf8_percent_encode(k, &AWS_QUERY_ENCODE_SET),
                utf8_percent_encode(v, &AWS_QUERY_ENCODE_SET)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Trim the value and fold internal whitespace runs into a single space.
fn normalize_header_value(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::EMPTY_STRING_SHA256;
    use http::header::CONTENT_TYPE;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn parts(method: &str, uri: &str, headers: &[(&str, &str)]) -> Parts {
        let mut builder = http::Request::builder().method(method).uri(uri);
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_iam_list_users() {
        let p = parts(
            "GET",
            "https://iam.amazonaws.com/?Action=ListUsers&Version=2010-05-08",
            &[
                (
                    "content-type",
                    "application/x-www-form-urlencoded; charset=utf-8",
                ),
                ("host", "iam.amazonaws.com"),
                ("x-amz-date", "20150830T123600Z"),
            ],
        );

        let creq = CanonicalRequest::build(&p, b"", &[CONTENT_TYPE]).unwrap();
        assert_eq!(
            creq.to_string(),
            "GET\n\
             /\n\
             Action=ListUsers&Version=2010-05-08\n\
             content-type:application/x-www-form-urlencoded; charset=utf-8\n\
             host:iam.amazonaws.com\n\
             x-amz-date:20150830T123600Z\n\
             \n\
             content-type;host;x-amz-date\n\
             e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            hex_sha256(creq.to_string().as_bytes()),
            "f536975d06c0309214f805bb90ccff089219ecd68b2577efef23edd43b7e1a59"
        );
    }

    #[test]
    fn test_empty_body_hashes_empty_string() {
        let p = parts("get", "/", &[("host", "example.com")]);
        let creq = CanonicalRequest::build(&p, b"", &[]).unwrap();
        assert_eq!(creq.method, "GET");
        assert_eq!(creq.payload_hash, EMPTY_STRING_SHA256);
    }

    #[test]
    fn test_unsigned_headers_are_left_out() {
        let p = parts(
            "GET",
            "/",
            &[
                ("host", "example.com"),
                ("user-agent", "curl/8.0"),
                ("content-type", "application/json"),
            ],
        );
        let creq = CanonicalRequest::build(&p, b"", &[]).unwrap();
        assert_eq!(creq.headers, "host:example.com\n");
        assert_eq!(creq.signed_headers, "host");
    }

    #[test]
    fn test_header_order_does_not_matter() {
        let a = parts(
            "GET",
            "/",
            &[
                ("x-amz-date", "20150830T123600Z"),
                ("content-type", "text/plain"),
                ("host", "example.com"),
            ],
        );
        let b = parts(
            "GET",
            "/",
            &[
                ("host", "example.com"),
                ("content-type", "text/plain"),
                ("x-amz-date", "20150830T123600Z"),
            ],
        );

        let a = CanonicalRequest::build(&a, b"", &[CONTENT_TYPE]).unwrap();
        let b = CanonicalRequest::build(&b, b"", &[CONTENT_TYPE]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_header_values_are_normalized_and_folded() {
        let p = parts(
            "GET",
            "/",
            &[
                ("host", "example.com"),
                ("x-custom", "  a   b\tc  "),
                ("x-custom", "second"),
            ],
        );
        let creq =
            CanonicalRequest::build(&p, b"", &[HeaderName::from_static("x-custom")]).unwrap();
        assert_eq!(creq.headers, "host:example.com\nx-custom:a b c,second\n");
        assert_eq!(creq.signed_headers, "host;x-custom");
    }

    #[test_case("/index/doc/1", "/index/doc/1" ; "plain path")]
    #[test_case("/a%20b", "/a%2520b" ; "encoded path is not decoded")]
    #[test_case("/_search/scroll~x", "/_search/scroll~x" ; "unreserved kept")]
    #[test_case("/logs-*/_search", "/logs-%2A/_search" ; "reserved encoded")]
    fn test_canonical_uri(path: &str, expected: &str) {
        let p = parts("GET", path, &[("host", "example.com")]);
        let creq = CanonicalRequest::build(&p, b"", &[]).unwrap();
        assert_eq!(creq.uri, expected);
    }

    #[test_case("", "" ; "empty")]
    #[test_case("b=2&a=1", "a=1&b=2" ; "sorted by name")]
    #[test_case("a=2&a=1", "a=1&a=2" ; "ties broken by value")]
    #[test_case("q=a b&flag", "flag=&q=a%20b" ; "encoded and valueless")]
    #[test_case("path=/x:y", "path=%2Fx%3Ay" ; "reserved characters")]
    fn test_canonical_query(input: &str, expected: &str) {
        assert_eq!(canonical_query(input), expected);
    }

    #[test]
    fn test_build_is_deterministic() {
        let p = parts(
            "PUT",
            "/index/doc/1?refresh=true",
            &[("host", "example.com"), ("x-amz-date", "20150830T123600Z")],
        );
        let a = CanonicalRequest::build(&p, br#"{"a":1}"#, &[]).unwrap();
        let b = CanonicalRequest::build(&p, br#"{"a":1}"#, &[]).unwrap();
        assert_eq!(a.to_string(), b.to_string());
    }
}
