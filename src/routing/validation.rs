//! Routing-table validation logic.
//!
//! Serde already rejects unknown tags and unknown fields at parse time; this
//! module covers the semantic checks on top of a structurally well-formed
//! table. Errors are structured so the management API can return the full
//! list as JSON.

use serde::Serialize;
use url::Url;

use crate::routing::schema::{RoutingTable, Target};

/// A single validation failure, addressed by route index and field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    /// Index of the offending route in the candidate table.
    pub route: usize,
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "route[{}].{}: {}", self.route, self.field, self.message)
    }
}

/// Validate a candidate table. An empty result means the table is valid.
pub fn validate_table(table: &RoutingTable) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    for (idx, route) in table.routes.iter().enumerate() {
        if route.hostname.is_empty() {
            errors.push(ValidationError {
                route: idx,
                field: "hostname".into(),
                message: "hostname must not be empty".into(),
            });
        } else if !is_valid_hostname(&route.hostname) {
            errors.push(ValidationError {
                route: idx,
                field: "hostname".into(),
                message: format!("'{}' is not a lowercase DNS hostname", route.hostname),
            });
        }

        if route.targets.is_empty() {
            errors.push(ValidationError {
                route: idx,
                field: "targets".into(),
                message: "at least one target is required".into(),
            });
        }

        for (t_idx, target) in route.targets.iter().enumerate() {
            match target {
                Target::Forward(forward) => {
                    if let Err(reason) = check_absolute_url(&forward.url) {
                        errors.push(ValidationError {
                            route: idx,
                            field: format!("targets[{t_idx}].url"),
                            message: reason,
                        });
                    }
                }
                Target::Static(fileserver) => {
                    if fileserver.directory.is_empty() {
                        errors.push(ValidationError {
                            route: idx,
                            field: format!("targets[{t_idx}].directory"),
                            message: "directory must not be empty".into(),
                        });
                    }
                }
                Target::Redirect(redirect) => {
                    if let Err(reason) = check_absolute_url(&redirect.url) {
                        errors.push(ValidationError {
                            route: idx,
                            field: format!("targets[{t_idx}].url"),
                            message: reason,
                        });
                    }
                }
            }
        }
    }

    errors
}

fn check_absolute_url(raw: &str) -> std::result::Result<(), String> {
    match Url::parse(raw) {
        Ok(url) if url.host_str().is_some() => Ok(()),
        Ok(_) => Err(format!("'{raw}' has no host")),
        Err(e) => Err(format!("'{raw}' is not an absolute URL: {e}")),
    }
}

fn is_valid_hostname(host: &str) -> bool {
    host.len() <= 253
        && host.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label
                    .bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::schema::{ForwardTarget, Route, StaticTarget};

    fn route(hostname: &str, targets: Vec<Target>) -> Route {
        Route {
            hostname: hostname.into(),
            path: String::new(),
            timeout_ms: None,
            middlewares: None,
            load_balancing: None,
            authentication: None,
            cache: None,
            targets,
        }
    }

    #[test]
    fn accepts_valid_table() {
        let table = RoutingTable::new(vec![route(
            "example.com",
            vec![Target::Forward(ForwardTarget {
                url: "https://origin.example.com".into(),
            })],
        )]);
        assert!(validate_table(&table).is_empty());
    }

    #[test]
    fn rejects_empty_targets() {
        let table = RoutingTable::new(vec![route("example.com", vec![])]);
        let errors = validate_table(&table);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "targets");
    }

    #[test]
    fn rejects_relative_forward_url() {
        let table = RoutingTable::new(vec![route(
            "example.com",
            vec![Target::Forward(ForwardTarget {
                url: "/not-absolute".into(),
            })],
        )]);
        let errors = validate_table(&table);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].field.contains("url"));
    }

    #[test]
    fn rejects_empty_static_directory() {
        let table = RoutingTable::new(vec![route(
            "example.com",
            vec![Target::Static(StaticTarget {
                directory: String::new(),
                index: None,
            })],
        )]);
        let errors = validate_table(&table);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn rejects_uppercase_hostname() {
        let table = RoutingTable::new(vec![route(
            "Example.COM",
            vec![Target::Static(StaticTarget {
                directory: "./www".into(),
                index: None,
            })],
        )]);
        assert_eq!(validate_table(&table).len(), 1);
    }

    #[test]
    fn collects_multiple_errors() {
        let table = RoutingTable::new(vec![
            route("", vec![]),
            route(
                "ok.example.com",
                vec![Target::Forward(ForwardTarget {
                    url: "nope".into(),
                })],
            ),
        ]);
        let errors = validate_table(&table);
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[2].route, 1);
    }
}
