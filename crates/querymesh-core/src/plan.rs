//! The typed per-sub-query `Plan` expression tree (spec §3 "Plan (per
//! sub-query)"). Produced by the AST Planner, checked by the Logical
//! Validator, and serialized by the SQL Generator — all downstream
//! consumers share this one representation rather than each re-parsing SQL.

use serde::{Deserialize, Serialize};

/// A scalar expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Expr {
    Column { alias: String, name: String },
    Literal { value: Option<serde_json::Value>, is_null: bool },
    Func { name: String, args: Vec<Expr> },
    Binary { op: String, left: Box<Expr>, right: Box<Expr> },
    Unary { op: String, expr: Box<Expr> },
    Case { whens: Vec<WhenClause>, r#else: Option<Box<Expr>> },
}

/// One `WHEN cond THEN result` arm of a [`Expr::Case`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhenClause {
    pub cond: Expr,
    pub result: Expr,
}

/// One projected output column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: Option<String>,
    pub ordinal: usize,
}

/// One table reference in the `FROM`/`JOIN` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRef {
    pub name: String,
    pub alias: String,
    pub ordinal: usize,
}

/// The kind of join a [`JoinSpec`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

/// One join between two already-declared table aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinSpec {
    pub left_alias: String,
    pub right_alias: String,
    pub join_type: JoinType,
    pub condition: Expr,
    pub ordinal: usize,
}

/// One `ORDER BY` term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderByItem {
    pub expr: Expr,
    pub descending: bool,
}

/// The query kind a [`Plan`] may express. Only `Read` is permitted to reach
/// execution (spec §8 property 3: "read-only enforcement").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Read,
    Write,
    Ddl,
}

/// A typed, engine-agnostic plan for one sub-query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub query_type: QueryType,
    pub tables: Vec<TableRef>,
    pub joins: Vec<JoinSpec>,
    pub select_items: Vec<SelectItem>,
    #[serde(default)]
    pub r#where: Option<Expr>,
    #[serde(default)]
    pub group_by: Vec<Expr>,
    #[serde(default)]
    pub having: Vec<Expr>,
    #[serde(default)]
    pub order_by: Vec<OrderByItem>,
    #[serde(default)]
    pub limit: Option<u64>,
}

/// Why a [`Plan`] failed structural validation (spec §3 invariants).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanValidationError {
    NotReadOnly,
    UnknownTableAlias(String),
    UnknownJoinAlias(String),
    NonPermutationOrdinals(&'static str),
}

impl std::fmt::Display for PlanValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotReadOnly => write!(f, "plan is not read-only"),
            Self::UnknownTableAlias(a) => write!(f, "column references unknown table alias '{a}'"),
            Self::UnknownJoinAlias(a) => write!(f, "join references undeclared table alias '{a}'"),
            Self::NonPermutationOrdinals(field) => {
                write!(f, "{field} ordinals are not a permutation of 0..n-1")
            }
        }
    }
}

impl std::error::Error for PlanValidationError {}

impl Plan {
    /// Structural checks every planner output must pass before it reaches
    /// the logical validator's semantic (RBAC/column-existence) checks.
    pub fn validate_structure(&self) -> Result<(), PlanValidationError> {
        if self.query_type != QueryType::Read {
            return Err(PlanValidationError::NotReadOnly);
        }

        let declared_aliases: std::collections::HashSet<&str> =
            self.tables.iter().map(|t| t.alias.as_str()).collect();

        for join in &self.joins {
            if !declared_aliases.contains(join.left_alias.as_str()) {
                return Err(PlanValidationError::UnknownJoinAlias(join.left_alias.clone()));
            }
            if !declared_aliases.contains(join.right_alias.as_str()) {
                return Err(PlanValidationError::UnknownJoinAlias(join.right_alias.clone()));
            }
        }

        for item in &self.select_items {
            Self::check_column_aliases(&item.expr, &declared_aliases)?;
        }

        is_permutation(self.tables.iter().map(|t| t.ordinal), self.tables.len())
            .then_some(())
            .ok_or(PlanValidationError::NonPermutationOrdinals("tables"))?;
        is_permutation(self.select_items.iter().map(|s| s.ordinal), self.select_items.len())
            .then_some(())
            .ok_or(PlanValidationError::NonPermutationOrdinals("select_items"))?;
        is_permutation(self.joins.iter().map(|j| j.ordinal), self.joins.len())
            .then_some(())
            .ok_or(PlanValidationError::NonPermutationOrdinals("joins"))?;

        Ok(())
    }

    fn check_column_aliases(
        expr: &Expr,
        declared: &std::collections::HashSet<&str>,
    ) -> Result<(), PlanValidationError> {
        match expr {
            Expr::Column { alias, .. } => {
                if !declared.contains(alias.as_str()) {
                    return Err(PlanValidationError::UnknownTableAlias(alias.clone()));
                }
                Ok(())
            }
            Expr::Literal { .. } => Ok(()),
            Expr::Func { args, .. } => {
                for arg in args {
                    Self::check_column_aliases(arg, declared)?;
                }
                Ok(())
            }
            Expr::Binary { left, right, .. } => {
                Self::check_column_aliases(left, declared)?;
                Self::check_column_aliases(right, declared)
            }
            Expr::Unary { expr, .. } => Self::check_column_aliases(expr, declared),
            Expr::Case { whens, r#else } => {
                for when in whens {
                    Self::check_column_aliases(&when.cond, declared)?;
                    Self::check_column_aliases(&when.result, declared)?;
                }
                if let Some(else_expr) = r#else {
                    Self::check_column_aliases(else_expr, declared)?;
                }
                Ok(())
            }
        }
    }
}

fn is_permutation(ordinals: impl Iterator<Item = usize>, len: usize) -> bool {
    let mut seen = vec![false; len];
    for ordinal in ordinals {
        match seen.get_mut(ordinal) {
            Some(slot) if !*slot => *slot = true,
            _ => return false,
        }
    }
    seen.into_iter().all(|seen| seen)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_plan() -> Plan {
        Plan {
            query_type: QueryType::Read,
            tables: vec![TableRef { name: "public.orders".to_string(), alias: "o".to_string(), ordinal: 0 }],
            joins: vec![],
            select_items: vec![SelectItem {
                expr: Expr::Column { alias: "o".to_string(), name: "id".to_string() },
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
    fn accepts_a_well_formed_read_only_plan() {
        assert!(sample_plan().validate_structure().is_ok());
    }

    #[test]
    fn rejects_non_read_query_types() {
        let mut plan = sample_plan();
        plan.query_type = QueryType::Write;
        assert_eq!(plan.validate_structure(), Err(PlanValidationError::NotReadOnly));
    }

    #[test]
    fn rejects_column_reference_to_undeclared_alias() {
        let mut plan = sample_plan();
        plan.select_items[0].expr = Expr::Column { alias: "missing".to_string(), name: "id".to_string() };
        assert!(matches!(
            plan.validate_structure(),
            Err(PlanValidationError::UnknownTableAlias(_))
        ));
    }

    #[test]
    fn rejects_join_referencing_undeclared_alias() {
        let mut plan = sample_plan();
        plan.joins.push(JoinSpec {
            left_alias: "o".to_string(),
            right_alias: "missing".to_string(),
            join_type: JoinType::Inner,
            condition: Expr::Literal { value: Some(serde_json::json!(true)), is_null: false },
            ordinal: 0,
        });
        assert!(matches!(
            plan.validate_structure(),
            Err(PlanValidationError::UnknownJoinAlias(_))
        ));
    }

    #[test]
    fn rejects_non_permutation_ordinals() {
        let mut plan = sample_plan();
        plan.select_items.push(SelectItem {
            expr: Expr::Column { alias: "o".to_string(), name: "name".to_string() },
            alias: None,
            ordinal: 0,
        });
        assert_eq!(
            plan.validate_structure(),
            Err(PlanValidationError::NonPermutationOrdinals("select_items"))
        );
    }
}
