//! Routing-table loading from disk.

use std::path::Path;

use crate::error::{ProxyError, Result};
use crate::routing::schema::RoutingTable;
use crate::routing::validation::validate_table;

/// Load and validate a routing-table file (a JSON array of routes).
pub fn load_routing_table(path: &Path) -> Result<RoutingTable> {
    let content = std::fs::read_to_string(path)?;
    let table: RoutingTable = serde_json::from_str(&content).map_err(|e| {
        ProxyError::InvalidRoutingTable(vec![crate::routing::validation::ValidationError {
            route: 0,
            field: "<file>".into(),
            message: format!("{path:?}: {e}"),
        }])
    })?;

    let errors = validate_table(&table);
    if !errors.is_empty() {
        return Err(ProxyError::InvalidRoutingTable(errors));
    }
    Ok(table)
}
