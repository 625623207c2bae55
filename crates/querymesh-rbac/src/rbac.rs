//! RBAC resolution: unions allowed datasources/tables across every role a
//! caller holds (spec §4.7), grounded in the original implementation's
//! `RBAC.get_allowed_tables`/`get_allowed_datasources`.

use crate::types::{PolicyConfig, TablePattern};
use std::collections::HashSet;

/// Resolves access decisions against a [`PolicyConfig`].
pub struct Rbac {
    policy: PolicyConfig,
}

impl Rbac {
    /// Builds an RBAC resolver over `policy`.
    pub fn new(policy: PolicyConfig) -> Self {
        Self { policy }
    }

    /// The union of every held role's `allowed_datasources`. A caller with
    /// no recognized roles gets the empty set (spec §8 property 4, scenario
    /// c: `roles=[]` denies everything).
    pub fn get_allowed_datasources(&self, roles: &[String]) -> HashSet<String> {
        roles
            .iter()
            .filter_map(|r| self.policy.get_role(r))
            .flat_map(|p| p.allowed_datasources.iter().cloned())
            .collect()
    }

    /// The union of every held role's `allowed_tables` patterns.
    pub fn get_allowed_tables(&self, roles: &[String]) -> Vec<TablePattern> {
        let mut patterns: Vec<TablePattern> = roles
            .iter()
            .filter_map(|r| self.policy.get_role(r))
            .flat_map(|p| p.allowed_tables.iter().cloned())
            .collect();
        patterns.sort_by_key(|p| format!("{p:?}"));
        patterns.dedup();
        patterns
    }

    /// Whether `(datasource_id, table_full_name)` is covered by any pattern
    /// held by `roles`.
    pub fn is_allowed(&self, roles: &[String], datasource_id: &str, table_full_name: &str) -> bool {
        self.get_allowed_tables(roles)
            .iter()
            .any(|p| p.covers(datasource_id, table_full_name))
    }

    /// Whether every table in `tables` is covered by `roles`' patterns AND
    /// `datasource_id` is in `roles`' allowed-datasource set (spec §8
    /// property 4, the Logical Validator's RBAC check).
    pub fn covers_all(&self, roles: &[String], datasource_id: &str, tables: &[String]) -> bool {
        if !self.get_allowed_datasources(roles).contains(datasource_id) {
            return false;
        }
        tables.iter().all(|t| self.is_allowed(roles, datasource_id, t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RolePolicy;

    fn config_with(role: &str, datasources: Vec<&str>, tables: Vec<&str>) -> PolicyConfig {
        let mut roles = std::collections::HashMap::new();
        roles.insert(
            role.to_string(),
            RolePolicy::new(
                "test role",
                role,
                datasources.into_iter().map(str::to_string).collect(),
                tables.into_iter().map(str::to_string).collect(),
            )
            .unwrap(),
        );
        PolicyConfig { roles }
    }

    #[test]
    fn empty_roles_denies_everything() {
        let rbac = Rbac::new(config_with("admin", vec!["manufacturing"], vec!["manufacturing.*"]));
        assert!(rbac.get_allowed_datasources(&[]).is_empty());
        assert!(!rbac.covers_all(&[], "manufacturing", &["factories".to_string()]))
    }

    #[test]
    fn wildcard_table_covers_every_table_in_its_datasource() {
        let rbac = Rbac::new(config_with("admin", vec!["manufacturing"], vec!["manufacturing.*"]));
        let roles = vec!["admin".to_string()];
        assert!(rbac.covers_all(&roles, "manufacturing", &["factories".to_string(), "suppliers".to_string()]));
    }

    #[test]
    fn mismatched_datasource_is_denied_even_with_table_wildcard() {
        let rbac = Rbac::new(config_with("admin", vec!["manufacturing"], vec!["*"]));
        let roles = vec!["admin".to_string()];
        assert!(!rbac.covers_all(&roles, "suppliers", &["factories".to_string()]));
    }
}
