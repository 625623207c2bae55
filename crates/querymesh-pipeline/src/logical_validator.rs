//! Logical Validator node (spec §4.8 step 3): RBAC, table/column existence
//! against the retrieved schema, and join-alias declaration checks.

use crate::types::{SubPipelineStage, SubPipelineState};
use async_trait::async_trait;
use querymesh_core::{Expr, ErrorCode, Node, PipelineError, Plan, Result, Severity};
use querymesh_rbac::Rbac;
use std::collections::HashSet;
use std::sync::Arc;

/// Checks a drafted [`Plan`] against RBAC and the retrieved schema context.
pub struct LogicalValidator {
    rbac: Arc<Rbac>,
}

impl LogicalValidator {
    pub fn new(rbac: Arc<Rbac>) -> Self {
        Self { rbac }
    }

    /// Collects every `(alias, column_name)` pair the plan's expressions
    /// reference, for the "column exists on its alias's table" check.
    fn collect_column_refs(expr: &Expr, out: &mut Vec<(String, String)>) {
        match expr {
            Expr::Column { alias, name } => out.push((alias.clone(), name.clone())),
            Expr::Literal { .. } => {}
            Expr::Func { args, .. } => args.iter().for_each(|a| Self::collect_column_refs(a, out)),
            Expr::Binary { left, right, .. } => {
                Self::collect_column_refs(left, out);
                Self::collect_column_refs(right, out);
            }
            Expr::Unary { expr, .. } => Self::collect_column_refs(expr, out),
            Expr::Case { whens, r#else } => {
                for when in whens {
                    Self::collect_column_refs(&when.cond, out);
                    Self::collect_column_refs(&when.result, out);
                }
                if let Some(else_expr) = r#else {
                    Self::collect_column_refs(else_expr, out);
                }
            }
        }
    }

    fn check_semantics(plan: &Plan, state: &SubPipelineState) -> Result<(), String> {
        let schema_tables: std::collections::HashMap<String, HashSet<String>> = state
            .schema_tables
            .iter()
            .map(|t| (t.name.clone(), t.columns.iter().map(|c| c.to_lowercase()).collect()))
            .collect();

        let mut alias_to_table = std::collections::HashMap::new();
        for table in &plan.tables {
            if !schema_tables.contains_key(&table.name) {
                return Err(format!("table '{}' is not in the retrieved schema", table.name));
            }
            alias_to_table.insert(table.alias.clone(), table.name.clone());
        }

        for join in &plan.joins {
            if !alias_to_table.contains_key(&join.left_alias) {
                return Err(format!("join references undeclared alias '{}'", join.left_alias));
            }
            if !alias_to_table.contains_key(&join.right_alias) {
                return Err(format!("join references undeclared alias '{}'", join.right_alias));
            }
        }

        let mut refs = Vec::new();
        for item in &plan.select_items {
            Self::collect_column_refs(&item.expr, &mut refs);
        }
        if let Some(where_expr) = &plan.r#where {
            Self::collect_column_refs(where_expr, &mut refs);
        }

        for (alias, column) in refs {
            let Some(table_name) = alias_to_table.get(&alias) else {
                return Err(format!("column reference uses undeclared alias '{alias}'"));
            };
            let columns = &schema_tables[table_name];
            if !columns.contains(&column.to_lowercase()) {
                return Err(format!("column '{column}' does not exist on table '{table_name}'"));
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Node<SubPipelineState> for LogicalValidator {
    async fn execute(&self, state: &SubPipelineState) -> Result<SubPipelineState> {
        let mut delta = SubPipelineState::default();

        let (Some(sub_query), Some(plan)) = (state.sub_query.as_ref(), state.plan.as_ref()) else {
            let error = PipelineError::new(self.name(), "plan missing at logical validation", Severity::Error, ErrorCode::InvalidState, false);
            delta.last_error = Some(error.clone());
            delta.errors.push(error);
            return Ok(delta);
        };

        let table_names: Vec<String> = plan.tables.iter().map(|t| t.name.clone()).collect();
        if !self.rbac.covers_all(&state.user_roles, &sub_query.datasource_id, &table_names) {
            let error = PipelineError::new(
                self.name(),
                "the caller's roles do not authorize every table this plan touches",
                Severity::Error,
                ErrorCode::SecurityViolation,
                false,
            )
            .with_datasource(sub_query.datasource_id.clone());
            delta.last_error = Some(error.clone());
            delta.errors.push(error);
            return Ok(delta);
        }

        if let Err(message) = Self::check_semantics(plan, state) {
            let error = PipelineError::new(self.name(), message, Severity::Error, ErrorCode::PlanningFailure, true);
            delta.last_error = Some(error.clone());
            delta.errors.push(error);
            return Ok(delta);
        }

        delta.stage = SubPipelineStage::LogicallyValid;
        delta.reasoning.push("plan passed RBAC and schema-semantic checks".to_string());
        delta.last_error = None;
        Ok(delta)
    }

    fn name(&self) -> &str {
        "logical_validator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RetrievedTable, SubQuery};
    use querymesh_core::{JoinSpec, JoinType, QueryType, SelectItem, TableRef};
    use querymesh_rbac::{PolicyConfig, RolePolicy};

    fn sub_query() -> SubQuery {
        SubQuery {
            id: "sq1".to_string(),
            datasource_id: "manufacturing".to_string(),
            intent: "list factories".to_string(),
            metrics: vec![],
            filters: vec![],
            group_by: vec![],
            expected_columns: vec!["name".to_string()],
        }
    }

    fn plan_with_column(alias: &str, column: &str) -> Plan {
        Plan {
            query_type: QueryType::Read,
            tables: vec![TableRef { name: "public.factories".to_string(), alias: alias.to_string(), ordinal: 0 }],
            joins: vec![],
            select_items: vec![SelectItem {
                expr: Expr::Column { alias: alias.to_string(), name: column.to_string() },
                alias: None,
                ordinal: 0,
            }],
            r#where: None,
            group_by: vec![],
            having: vec![],
            order_by: vec![],
            limit: None,
        }
    }

    fn rbac_allowing(datasource: &str, table_pattern: &str) -> Arc<Rbac> {
        let mut roles = std::collections::HashMap::new();
        roles.insert(
            "admin".to_string(),
            RolePolicy::new("admin", "admin", vec![datasource.to_string()], vec![table_pattern.to_string()]).unwrap(),
        );
        Arc::new(Rbac::new(PolicyConfig { roles }))
    }

    fn state_with_plan(plan: Plan, roles: Vec<String>) -> SubPipelineState {
        let mut state = SubPipelineState::new(sub_query(), roles, "t", "ten", "r", "sg1");
        state.schema_tables = vec![RetrievedTable { name: "public.factories".to_string(), columns: vec!["name".to_string()] }];
        state.plan = Some(plan);
        state
    }

    #[tokio::test]
    async fn accepts_a_plan_authorized_and_matching_retrieved_schema() {
        let node = LogicalValidator::new(rbac_allowing("manufacturing", "manufacturing.*"));
        let state = state_with_plan(plan_with_column("f", "name"), vec!["admin".to_string()]);
        let delta = node.execute(&state).await.unwrap();
        assert!(delta.last_error.is_none());
    }

    #[tokio::test]
    async fn unauthorized_roles_yield_a_non_retryable_security_violation() {
        let node = LogicalValidator::new(rbac_allowing("other_datasource", "*"));
        let state = state_with_plan(plan_with_column("f", "name"), vec!["admin".to_string()]);
        let delta = node.execute(&state).await.unwrap();
        let error = delta.last_error.unwrap();
        assert_eq!(error.error_code, ErrorCode::SecurityViolation);
        assert!(!error.retryable);
    }

    #[tokio::test]
    async fn unknown_column_is_a_retryable_planning_failure() {
        let node = LogicalValidator::new(rbac_allowing("manufacturing", "manufacturing.*"));
        let state = state_with_plan(plan_with_column("f", "nonexistent"), vec!["admin".to_string()]);
        let delta = node.execute(&state).await.unwrap();
        let error = delta.last_error.unwrap();
        assert_eq!(error.error_code, ErrorCode::PlanningFailure);
        assert!(error.retryable);
    }

    #[tokio::test]
    async fn join_referencing_undeclared_alias_is_rejected() {
        let node = LogicalValidator::new(rbac_allowing("manufacturing", "manufacturing.*"));
        let mut plan = plan_with_column("f", "name");
        plan.joins.push(JoinSpec {
            left_alias: "f".to_string(),
            right_alias: "missing".to_string(),
            join_type: JoinType::Inner,
            condition: Expr::Literal { value: None, is_null: true },
            ordinal: 0,
        });
        let state = state_with_plan(plan, vec!["admin".to_string()]);
        let delta = node.execute(&state).await.unwrap();
        assert!(delta.last_error.is_some());
    }
}
