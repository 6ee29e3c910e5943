//! Routing-table schema definitions.
//!
//! All types derive Serde traits for deserialization from JSON (routing-table
//! files, the management API, and discovery all produce the same shape).
//! Unknown fields are rejected so that operator typos surface as validation
//! errors instead of silently dropped policy.

use serde::{Deserialize, Serialize};

/// One entry of the routing table.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Route {
    /// Host to match (exact, case-insensitive, no port).
    pub hostname: String,

    /// Path prefix to match. Empty string matches any path under the host.
    #[serde(default)]
    pub path: String,

    /// Per-route upstream deadline in milliseconds. Falls back to the
    /// process-wide default (5000 ms) when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Ordered middleware keys for the pre/post phases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middlewares: Option<MiddlewareSpec>,

    /// Target selection strategy. Defaults to `random`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancing: Option<LoadBalancing>,

    /// Gate applied after pre-processing, before dispatch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<Authentication>,

    /// Reserved. The dispatcher honors `no-cache` only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CachePolicy>,

    /// Non-empty ordered sequence of targets.
    pub targets: Vec<Target>,
}

/// Ordered middleware keys per phase.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MiddlewareSpec {
    #[serde(default)]
    pub pre: Vec<String>,

    #[serde(default)]
    pub post: Vec<String>,
}

/// Endpoint a matched route dispatches to.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Target {
    Forward(ForwardTarget),
    Static(StaticTarget),
    /// Reserved tag; dispatch answers 501.
    Redirect(RedirectTarget),
}

impl Target {
    pub fn type_name(&self) -> &'static str {
        match self {
            Target::Forward(_) => "forward",
            Target::Static(_) => "static",
            Target::Redirect(_) => "redirect",
        }
    }
}

/// Remote HTTP origin.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ForwardTarget {
    /// Absolute URL of the origin.
    pub url: String,
}

/// Local filesystem subtree.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StaticTarget {
    pub directory: String,

    /// File served when the request path ends with `/`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
}

impl StaticTarget {
    pub fn index_file(&self) -> &str {
        self.index.as_deref().unwrap_or("index.html")
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RedirectTarget {
    pub url: String,
}

/// Target selection strategy.
///
/// The tag space is reserved for future strategies; tags we do not know yet
/// deserialize as `Unknown` and fall back to uniform random selection with a
/// warning at dispatch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LoadBalancing {
    Random,
    #[serde(other)]
    Unknown,
}

/// Authentication strategy for a route.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Authentication {
    Anonymous,
    Basic(BasicAuth),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,

    /// Challenge realm. Defaults to the request hostname.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
}

/// Cache policy. Reserved variant space; only `no-cache` is honored.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum CachePolicy {
    #[serde(rename = "no-cache")]
    NoCache,
    #[serde(rename = "basic")]
    Basic(BasicCache),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BasicCache {
    pub ttl_ms: u64,
}

/// Ordered sequence of routes. Position is significant: the first matching
/// entry wins.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct RoutingTable {
    pub routes: Vec<Route>,
}

impl RoutingTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_forward_route() {
        let json = r#"[{"hostname":"localhost","path":"/api","targets":[{"type":"forward","url":"http://127.0.0.1:3000"}]}]"#;
        let table: RoutingTable = serde_json::from_str(json).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.routes[0].hostname, "localhost");
        assert_eq!(
            table.routes[0].targets[0],
            Target::Forward(ForwardTarget {
                url: "http://127.0.0.1:3000".into()
            })
        );
    }

    #[test]
    fn rejects_unknown_route_field() {
        let json = r#"[{"hostname":"localhost","paht":"/oops","targets":[{"type":"static","directory":"./www"}]}]"#;
        assert!(serde_json::from_str::<RoutingTable>(json).is_err());
    }

    #[test]
    fn rejects_unknown_target_tag() {
        let json = r#"[{"hostname":"localhost","targets":[{"type":"teleport","url":"http://x"}]}]"#;
        assert!(serde_json::from_str::<RoutingTable>(json).is_err());
    }

    #[test]
    fn rejects_unknown_target_field() {
        let json = r#"[{"hostname":"localhost","targets":[{"type":"forward","url":"http://x","retries":3}]}]"#;
        assert!(serde_json::from_str::<RoutingTable>(json).is_err());
    }

    #[test]
    fn unknown_load_balancing_tag_is_tolerated() {
        let json = r#"{"type":"least_conn"}"#;
        let lb: LoadBalancing = serde_json::from_str(json).unwrap();
        assert_eq!(lb, LoadBalancing::Unknown);
    }

    #[test]
    fn basic_auth_roundtrip() {
        let json = r#"{"type":"basic","username":"u","password":"p"}"#;
        let auth: Authentication = serde_json::from_str(json).unwrap();
        match &auth {
            Authentication::Basic(basic) => {
                assert_eq!(basic.username, "u");
                assert!(basic.realm.is_none());
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn static_index_defaults() {
        let target = StaticTarget {
            directory: "./www".into(),
            index: None,
        };
        assert_eq!(target.index_file(), "index.html");
    }
}
