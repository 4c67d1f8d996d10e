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

use http::StatusCode;
use quick_xml::de;
use serde::Deserialize;
use sigv4_proxy_core::{Error, Result};

/// Get the sts endpoint.
///
/// The returning format may look like `sts.{region}.amazonaws.com`
///
/// # Notes
///
/// AWS could have different sts endpoint based on it's region.
/// We can check them by region name.
///
/// ref: https://github.com/awslabs/aws-sdk-rust/blob/31cfae2cf23be0c68a47357070dea1aee9227e3a/sdk/sts/src/aws_endpoint.rs
pub fn sts_endpoint(region: Option<&str>, use_regional: bool) -> Result<String> {
    // use regional sts if use_regional has been set.
    if use_regional {
        let region =
            region.ok_or_else(|| Error::config_invalid("regional STS endpoint requires region"))?;
        if region.starts_with("cn-") {
            Ok(format!("sts.{region}.amazonaws.com.cn"))
        } else {
            Ok(format!("sts.{region}.amazonaws.com"))
        }
    } else {
        let region = region.unwrap_or_default();
        if region.starts_with("cn") {
            Ok("sts.amazonaws.com.cn".to_string())
        } else {
            Ok("sts.amazonaws.com".to_string())
        }
    }
}

#[derive(Default, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct StsErrorResponse {
    error: StsError,
    request_id: String,
}

#[derive(Default, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct StsError {
    code: String,
    message: String,
}

/// Turn a non-200 STS response into an error.
///
/// Access denials keep their own kind so operators can tell a broken trust
/// policy apart from an unreachable endpoint.
pub fn parse_sts_error(operation: &str, status: StatusCode, body: &str) -> Error {
    let resp: StsErrorResponse = de::from_str(body).unwrap_or_default();

    let message = if resp.error.code.is_empty() {
        format!("{operation} failed with status {status}")
    } else {
        format!(
            "{operation} failed with {}: {}",
            resp.error.code, resp.error.message
        )
    };

    let err = match (status, resp.error.code.as_str()) {
        (StatusCode::FORBIDDEN, _) | (_, "AccessDenied") => Error::credential_denied(message),
        (_, "ExpiredToken" | "InvalidClientTokenId") => Error::credential_invalid(message),
        _ => Error::unexpected(message),
    };

    let err = err.with_context(format!("status: {status}"));
    if resp.request_id.is_empty() {
        err
    } else {
        err.with_context(format!("request_id: {}", resp.request_id))
    }
}

/// Turn a non-200 metadata service response into an error.
pub fn parse_metadata_error(operation: &str, status: StatusCode, body: &str) -> Error {
    let err = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::credential_denied(format!("{operation} was rejected by metadata service"))
        }
        StatusCode::NOT_FOUND => {
            Error::config_invalid(format!("{operation} found nothing on metadata service"))
        }
        _ => Error::unexpected(format!("{operation} failed on metadata service")),
    };

    err.with_context(format!("status: {status}"))
        .with_context(format!("body: {body}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigv4_proxy_core::ErrorKind;
    use test_case::test_case;

    #[test_case(None, false, "sts.amazonaws.com" ; "global")]
    #[test_case(Some("cn-north-1"), false, "sts.amazonaws.com.cn" ; "global china")]
    #[test_case(Some("us-west-2"), true, "sts.us-west-2.amazonaws.com" ; "regional")]
    #[test_case(Some("cn-north-1"), true, "sts.cn-north-1.amazonaws.com.cn" ; "regional china")]
    fn test_sts_endpoint(region: Option<&str>, regional: bool, expected: &str) {
        assert_eq!(sts_endpoint(region, regional).unwrap(), expected);
    }

    #[test]
    fn test_regional_sts_endpoint_requires_region() {
        let err = sts_endpoint(None, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_parse_sts_access_denied() {
        let body = r#"<ErrorResponse xmlns="https://sts.amazonaws.com/doc/2011-06-15/">
  <Error>
    <Type>Sender</Type>
    <Code>AccessDenied</Code>
    <Message>User is not authorized to perform: sts:AssumeRole</Message>
  </Error>
  <RequestId>4ff5d4f8-6e2e-4d32-a1fc-6f8a8bd0c6c6</RequestId>
</ErrorResponse>"#;

        let err = parse_sts_error("AssumeRole", StatusCode::FORBIDDEN, body);
        assert_eq!(err.kind(), ErrorKind::CredentialDenied);
        assert!(err.to_string().contains("AccessDenied"));
        assert!(err
            .context()
            .iter()
            .any(|c| c == "request_id: 4ff5d4f8-6e2e-4d32-a1fc-6f8a8bd0c6c6"));
    }

    #[test]
    fn test_parse_sts_unreadable_body() {
        let err = parse_sts_error("AssumeRole", StatusCode::BAD_GATEWAY, "<html>oops");
        assert_eq!(err.kind(), ErrorKind::Unexpected);
        assert!(err.to_string().contains("502"));
    }
}
