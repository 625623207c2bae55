//! Table pattern and role policy types (spec §3, §4.7).

use crate::error::RbacError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A namespaced table-access pattern (spec §4.7: "Tables MUST be namespaced
/// (`datasource.table`, or `datasource.*`, or `*`)").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TablePattern {
    /// `*` — every table in every datasource.
    Any,
    /// `ds.*` — every table within one datasource.
    AllTablesIn(String),
    /// `ds.table` — exactly one table.
    Exact { datasource_id: String, table: String },
}

impl TablePattern {
    /// Parses and validates a raw pattern string, rejecting anything not
    /// namespaced (spec §3 RBAC namespacing rule).
    pub fn parse(raw: &str) -> Result<Self, RbacError> {
        if raw == "*" {
            return Ok(TablePattern::Any);
        }
        if let Some(ds) = raw.strip_suffix(".*") {
            if ds.is_empty() || ds.contains('.') {
                return Err(RbacError::InvalidTablePattern(raw.to_string()));
            }
            return Ok(TablePattern::AllTablesIn(ds.to_string()));
        }
        match raw.split_once('.') {
            Some((ds, table)) if !ds.is_empty() && !table.is_empty() => Ok(TablePattern::Exact {
                datasource_id: ds.to_string(),
                table: table.to_string(),
            }),
            _ => Err(RbacError::InvalidTablePattern(raw.to_string())),
        }
    }

    /// Whether this pattern covers `(datasource_id, table_full_name)`.
    pub fn covers(&self, datasource_id: &str, table_full_name: &str) -> bool {
        match self {
            TablePattern::Any => true,
            TablePattern::AllTablesIn(ds) => ds == datasource_id,
            TablePattern::Exact { datasource_id: ds, table } => {
                ds == datasource_id && table == table_full_name
            }
        }
    }
}

/// Access control rules for a single role (spec §4.7).
#[derive(Debug, Clone)]
pub struct RolePolicy {
    pub description: String,
    pub role: String,
    pub allowed_datasources: Vec<String>,
    pub allowed_tables: Vec<TablePattern>,
}

impl RolePolicy {
    /// Builds a policy, validating every `allowed_tables` entry's
    /// namespacing at construction time (spec §4.7 "fail policy
    /// validation").
    pub fn new(
        description: impl Into<String>,
        role: impl Into<String>,
        allowed_datasources: Vec<String>,
        allowed_table_patterns: Vec<String>,
    ) -> Result<Self, RbacError> {
        let allowed_tables = allowed_table_patterns
            .iter()
            .map(|p| TablePattern::parse(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            description: description.into(),
            role: role.into(),
            allowed_datasources,
            allowed_tables,
        })
    }
}

/// Declarative policy configuration: role id to [`RolePolicy`] (spec §6
/// "Policy configuration").
#[derive(Debug, Clone, Default)]
pub struct PolicyConfig {
    pub roles: HashMap<String, RolePolicy>,
}

impl PolicyConfig {
    /// Looks up a role's policy by id.
    pub fn get_role(&self, role_id: &str) -> Option<&RolePolicy> {
        self.roles.get(role_id)
    }
}

/// Raw, serde-deserializable shape of one role entry, mirroring spec §6's
/// declarative policy configuration map. An external config loader (out of
/// scope) produces these; [`RolePolicy::new`] validates and converts them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolePolicyConfig {
    pub description: String,
    pub role: String,
    #[serde(default)]
    pub allowed_datasources: Vec<String>,
    #[serde(default)]
    pub allowed_tables: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unnamespaced_table() {
        assert!(TablePattern::parse("orders").is_err());
    }

    #[test]
    fn accepts_wildcard_forms() {
        assert_eq!(TablePattern::parse("*").unwrap(), TablePattern::Any);
        assert_eq!(
            TablePattern::parse("sales_db.*").unwrap(),
            TablePattern::AllTablesIn("sales_db".to_string())
        );
        assert_eq!(
            TablePattern::parse("sales_db.orders").unwrap(),
            TablePattern::Exact { datasource_id: "sales_db".to_string(), table: "orders".to_string() }
        );
    }

    #[test]
    fn exact_pattern_only_covers_its_own_table() {
        let pattern = TablePattern::parse("sales_db.orders").unwrap();
        assert!(pattern.covers("sales_db", "orders"));
        assert!(!pattern.covers("sales_db", "customers"));
        assert!(!pattern.covers("other_db", "orders"));
    }
}
