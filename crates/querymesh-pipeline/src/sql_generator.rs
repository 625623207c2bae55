//! SQL Generator node (spec §4.8 step 4): deterministically serializes the
//! typed `Plan` into the adapter's SQL dialect.
//!
//! Ordering rules: `tables` by ordinal, `select_items` by ordinal, `joins`
//! by ordinal; clauses emitted WHERE, GROUP BY, HAVING, ORDER BY, LIMIT.
//! `LIMIT` is clamped to the adapter's row limit; a smaller explicit limit
//! is preserved.

use crate::types::{SubPipelineStage, SubPipelineState};
use async_trait::async_trait;
use querymesh_core::{Expr, ErrorCode, JoinType, Node, OrderByItem, PipelineError, Plan, Result, Severity};

/// Serializes a validated [`Plan`] into SQL text for one adapter.
pub struct SqlGenerator {
    row_limit: Option<u64>,
}

impl SqlGenerator {
    pub fn new(row_limit: Option<u64>) -> Self {
        Self { row_limit }
    }

    fn render_expr(expr: &Expr) -> String {
        match expr {
            Expr::Column { alias, name } => format!("{alias}.{name}"),
            Expr::Literal { value, is_null } => {
                if *is_null {
                    "NULL".to_string()
                } else {
                    match value {
                        Some(serde_json::Value::String(s)) => format!("'{}'", s.replace('\'', "''")),
                        Some(other) => other.to_string(),
                        None => "NULL".to_string(),
                    }
                }
            }
            Expr::Func { name, args } => {
                format!("{name}({})", args.iter().map(Self::render_expr).collect::<Vec<_>>().join(", "))
            }
            Expr::Binary { op, left, right } => {
                format!("({} {op} {})", Self::render_expr(left), Self::render_expr(right))
            }
            Expr::Unary { op, expr } => format!("({op} {})", Self::render_expr(expr)),
            Expr::Case { whens, r#else } => {
                let mut out = String::from("CASE");
                for when in whens {
                    out.push_str(&format!(" WHEN {} THEN {}", Self::render_expr(&when.cond), Self::render_expr(&when.result)));
                }
                if let Some(else_expr) = r#else {
                    out.push_str(&format!(" ELSE {}", Self::render_expr(else_expr)));
                }
                out.push_str(" END");
                out
            }
        }
    }

    fn render_join_type(join_type: JoinType) -> &'static str {
        match join_type {
            JoinType::Inner => "JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Full => "FULL JOIN",
            JoinType::Cross => "CROSS JOIN",
        }
    }

    fn render_order_by(item: &OrderByItem) -> String {
        format!("{} {}", Self::render_expr(&item.expr), if item.descending { "DESC" } else { "ASC" })
    }

    /// Renders `plan` to SQL text, clamping `LIMIT` to `self.row_limit`.
    pub fn generate(&self, plan: &Plan) -> String {
        let mut tables: Vec<_> = plan.tables.iter().collect();
        tables.sort_by_key(|t| t.ordinal);
        let mut select_items: Vec<_> = plan.select_items.iter().collect();
        select_items.sort_by_key(|s| s.ordinal);
        let mut joins: Vec<_> = plan.joins.iter().collect();
        joins.sort_by_key(|j| j.ordinal);

        let select_clause = select_items
            .iter()
            .map(|item| match &item.alias {
                Some(alias) => format!("{} AS {alias}", Self::render_expr(&item.expr)),
                None => Self::render_expr(&item.expr),
            })
            .collect::<Vec<_>>()
            .join(", ");

        let from_clause = tables
            .iter()
            .map(|t| format!("{} {}", t.name, t.alias))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!("SELECT {select_clause} FROM {from_clause}");

        let alias_to_table: std::collections::HashMap<&str, &str> =
            tables.iter().map(|t| (t.alias.as_str(), t.name.as_str())).collect();
        for join in &joins {
            sql.push(' ');
            sql.push_str(Self::render_join_type(join.join_type));
            sql.push(' ');
            sql.push_str(alias_to_table.get(join.right_alias.as_str()).copied().unwrap_or(&join.right_alias));
            sql.push(' ');
            sql.push_str(&join.right_alias);
            sql.push_str(" ON ");
            sql.push_str(&Self::render_expr(&join.condition));
        }

        if let Some(where_expr) = &plan.r#where {
            sql.push_str(" WHERE ");
            sql.push_str(&Self::render_expr(where_expr));
        }

        if !plan.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&plan.group_by.iter().map(Self::render_expr).collect::<Vec<_>>().join(", "));
        }

        if !plan.having.is_empty() {
            sql.push_str(" HAVING ");
            sql.push_str(&plan.having.iter().map(Self::render_expr).collect::<Vec<_>>().join(" AND "));
        }

        if !plan.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&plan.order_by.iter().map(Self::render_order_by).collect::<Vec<_>>().join(", "));
        }

        let clamped_limit = match (plan.limit, self.row_limit) {
            (Some(explicit), Some(ceiling)) => Some(explicit.min(ceiling)),
            (Some(explicit), None) => Some(explicit),
            (None, Some(ceiling)) => Some(ceiling),
            (None, None) => None,
        };
        if let Some(limit) = clamped_limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        sql
    }
}

#[async_trait]
impl Node<SubPipelineState> for SqlGenerator {
    async fn execute(&self, state: &SubPipelineState) -> Result<SubPipelineState> {
        let mut delta = SubPipelineState::default();

        let Some(plan) = state.plan.as_ref() else {
            let error = PipelineError::new(self.name(), "plan missing at SQL generation", Severity::Error, ErrorCode::InvalidState, false);
            delta.last_error = Some(error.clone());
            delta.errors.push(error);
            return Ok(delta);
        };

        let sql = self.generate(plan);
        delta.sql = Some(sql);
        delta.stage = SubPipelineStage::SqlGenerated;
        delta.reasoning.push("SQL generated from validated plan".to_string());
        delta.last_error = None;
        Ok(delta)
    }

    fn name(&self) -> &str {
        "sql_generator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SubQuery;
    use querymesh_core::{QueryType, SelectItem, TableRef};

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

    fn base_plan() -> Plan {
        Plan {
            query_type: QueryType::Read,
            tables: vec![TableRef { name: "public.factories".to_string(), alias: "f".to_string(), ordinal: 0 }],
            joins: vec![],
            select_items: vec![SelectItem {
                expr: Expr::Column { alias: "f".to_string(), name: "name".to_string() },
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

    #[test]
    fn renders_a_simple_select() {
        let generator = SqlGenerator::new(None);
        let sql = generator.generate(&base_plan());
        assert_eq!(sql, "SELECT f.name FROM public.factories f");
    }

    #[test]
    fn clamps_explicit_limit_to_the_adapter_ceiling() {
        let generator = SqlGenerator::new(Some(100));
        let mut plan = base_plan();
        plan.limit = Some(10_000);
        let sql = generator.generate(&plan);
        assert!(sql.ends_with("LIMIT 100"));
    }

    #[test]
    fn preserves_a_smaller_explicit_limit() {
        let generator = SqlGenerator::new(Some(1000));
        let mut plan = base_plan();
        plan.limit = Some(10);
        let sql = generator.generate(&plan);
        assert!(sql.ends_with("LIMIT 10"));
    }

    #[test]
    fn applies_ceiling_even_with_no_explicit_limit() {
        let generator = SqlGenerator::new(Some(500));
        let sql = generator.generate(&base_plan());
        assert!(sql.ends_with("LIMIT 500"));
    }

    #[tokio::test]
    async fn node_populates_sql_and_advances_stage() {
        let generator = SqlGenerator::new(Some(500));
        let mut state = SubPipelineState::new(sub_query(), vec![], "t", "ten", "r", "sg1");
        state.plan = Some(base_plan());
        let delta = generator.execute(&state).await.unwrap();
        assert!(delta.sql.is_some());
        assert_eq!(delta.stage, SubPipelineStage::SqlGenerated);
    }
}
