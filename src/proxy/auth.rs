//! Authentication strategies.
//!
//! `anonymous` always passes. `basic` compares the `Authorization` header
//! against the route's configured credentials; any failure yields a 401
//! challenge with `WWW-Authenticate: Basic realm="<realm>"`, realm defaulting
//! to the request hostname. Authentication runs after pre-processing so that
//! middlewares may inject or rewrite credentials.

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::routing::schema::{Authentication, BasicAuth};

/// Challenge details for a failed authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub realm: String,
}

impl Challenge {
    pub fn header_value(&self) -> String {
        format!("Basic realm=\"{}\"", self.realm)
    }
}

/// Gate a request. `Ok(())` means dispatch continues.
pub fn authenticate(
    policy: &Authentication,
    headers: &HeaderMap,
    request_host: &str,
) -> std::result::Result<(), Challenge> {
    match policy {
        Authentication::Anonymous => Ok(()),
        Authentication::Basic(basic) => {
            if credentials_match(basic, headers) {
                Ok(())
            } else {
                Err(Challenge {
                    realm: basic
                        .realm
                        .clone()
                        .unwrap_or_else(|| request_host.to_owned()),
                })
            }
        }
    }
}

fn credentials_match(expected: &BasicAuth, headers: &HeaderMap) -> bool {
    let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let Some(encoded) = value.strip_prefix("Basic ") else {
        return false;
    };
    let Ok(decoded) = BASE64.decode(encoded.trim()) else {
        return false;
    };
    let Ok(pair) = String::from_utf8(decoded) else {
        return false;
    };
    match pair.split_once(':') {
        Some((user, pass)) => user == expected.username && pass == expected.password,
        None => false,
    }
}
