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

use sigv4_proxy_core::time::{now, DateTime};
use sigv4_proxy_core::utils::Redact;
use sigv4_proxy_core::SigningCredential;
use std::fmt::{Debug, Formatter};

/// Credentials closer than this to expiring are no longer used for signing,
/// so a request can't reach the upstream with a key that just lapsed.
const EXPIRY_MARGIN_SECS: i64 = 120;

/// Credentials this close to expiring are still used but a replacement is
/// fetched in the background.
const REFRESH_WINDOW_SECS: i64 = 300;

/// Credential that holds the access_key and secret_key.
#[derive(Default, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Access key id for aws services.
    pub access_key_id: String,
    /// Secret access key for aws services.
    pub secret_access_key: String,
    /// Session token for aws services.
    pub session_token: Option<String>,
    /// Expiration time for this credential.
    pub expires_in: Option<DateTime>,
}

impl Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_key_id", &Redact::from(&self.access_key_id))
            .field("secret_access_key", &Redact::from(&self.secret_access_key))
            .field("session_token", &Redact::from(&self.session_token))
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

impl SigningCredential for Credential {
    fn is_valid(&self) -> bool {
        if self.access_key_id.is_empty() || self.secret_access_key.is_empty() {
            return false;
        }

        match self.expires_in {
            Some(expires_in) => expires_in > now() + chrono::TimeDelta::seconds(EXPIRY_MARGIN_SECS),
            None => true,
        }
    }

    fn needs_refresh(&self) -> bool {
        match self.expires_in {
            Some(expires_in) => {
                expires_in <= now() + chrono::TimeDelta::seconds(REFRESH_WINDOW_SECS)
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn cred(expires_in: Option<DateTime>) -> Credential {
        Credential {
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: None,
            expires_in,
        }
    }

    #[test]
    fn test_without_expiration_is_permanent() {
        let c = cred(None);
        assert!(c.is_valid());
        assert!(!c.needs_refresh());
    }

    #[test_case(3600, true, false ; "far from expiry")]
    #[test_case(240, true, true ; "inside refresh window")]
    #[test_case(60, false, true ; "inside safety margin")]
    #[test_case(-10, false, true ; "already expired")]
    fn test_expiration_windows(secs: i64, valid: bool, refresh: bool) {
        let c = cred(Some(now() + chrono::TimeDelta::seconds(secs)));
        assert_eq!(c.is_valid(), valid);
        assert_eq!(c.needs_refresh(), refresh);
    }

    #[test]
    fn test_missing_keys_are_invalid() {
        let mut c = cred(None);
        c.secret_access_key.clear();
        assert!(!c.is_valid());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let c = Credential {
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string(),
            session_token: Some("session-token".to_string()),
            expires_in: None,
        };
        let out = format!("{c:?}");
        assert!(!out.contains("wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY"));
        assert!(!out.contains("session-token"));
    }
}
