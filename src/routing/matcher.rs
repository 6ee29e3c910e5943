//! Route matching logic.
//!
//! # Design Decisions
//! - Host matching is case-insensitive exact equality (per HTTP spec)
//! - Path matching is a case-sensitive, segment-aware prefix check
//! - First matching entry wins; ties broken by table position
//! - No wildcards, no regex

use crate::routing::schema::{Route, RoutingTable};

/// Return the first route matching `(host, path)`, or `None`.
pub fn match_route<'t>(host: &str, path: &str, table: &'t RoutingTable) -> Option<&'t Route> {
    table
        .routes
        .iter()
        .find(|route| route.hostname.eq_ignore_ascii_case(host) && path_matches(&route.path, path))
}

/// Segment-aware prefix check: `/api` matches `/api`, `/api/` and `/api/v1`
/// but not `/apix`. An empty prefix matches every path.
fn path_matches(prefix: &str, path: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => prefix.ends_with('/') || rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::schema::{ForwardTarget, Target};

    fn route(hostname: &str, path: &str, url: &str) -> Route {
        Route {
            hostname: hostname.into(),
            path: path.into(),
            timeout_ms: None,
            middlewares: None,
            load_balancing: None,
            authentication: None,
            cache: None,
            targets: vec![Target::Forward(ForwardTarget { url: url.into() })],
        }
    }

    #[test]
    fn first_match_wins() {
        let table = RoutingTable::new(vec![
            route("localhost", "/api", "http://a"),
            route("localhost", "", "http://b"),
        ]);
        let hit = match_route("localhost", "/api/v1", &table).unwrap();
        assert_eq!(
            hit.targets[0],
            Target::Forward(ForwardTarget {
                url: "http://a".into()
            })
        );
    }

    #[test]
    fn host_match_is_case_insensitive() {
        let table = RoutingTable::new(vec![route("example.com", "", "http://a")]);
        assert!(match_route("EXAMPLE.com", "/", &table).is_some());
    }

    #[test]
    fn host_mismatch_is_a_miss() {
        let table = RoutingTable::new(vec![route("example.com", "", "http://a")]);
        assert!(match_route("other.com", "/", &table).is_none());
    }

    #[test]
    fn prefix_is_segment_aware() {
        assert!(path_matches("/api", "/api"));
        assert!(path_matches("/api", "/api/"));
        assert!(path_matches("/api", "/api/v1"));
        assert!(!path_matches("/api", "/apix"));
    }

    #[test]
    fn empty_prefix_matches_everything() {
        assert!(path_matches("", "/"));
        assert!(path_matches("", "/deep/path"));
    }

    #[test]
    fn trailing_slash_prefix() {
        assert!(path_matches("/api/", "/api/v1"));
        assert!(!path_matches("/api/", "/api"));
    }

    #[test]
    fn empty_table_never_matches() {
        let table = RoutingTable::default();
        assert!(match_route("localhost", "/", &table).is_none());
    }
}
