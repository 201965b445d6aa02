//! Full-text predicates and the full-text scan.

use joinplan_proto::{ColumnRef, Comparison, ConditionId, Expr, LogicalOp};

use super::goal::GroupGoal;
use crate::catalog::{FullTextIndexDef, TableColumn};
use crate::cost::PlanCostEstimator;
use crate::error::{Error, Result};
use crate::plan::{AccessKind, AccessPlan};
use super::ordering::OrderEffectiveness;

/// Name of the predicate function routed to full-text indexes.
pub const FULL_TEXT_FUNCTION: &str = "full_text_search";

/// How the search key of a field is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullTextFieldKind {
    /// The key is one term or phrase.
    Match,
    /// The key is a query string in the index's own syntax.
    Parse,
}

/// One column searched for a key.
#[derive(Debug, Clone, PartialEq)]
pub struct FullTextField {
    pub column: ColumnRef,
    pub kind: FullTextFieldKind,
    pub key: Expr,
}

/// Occurrence of a clause within a boolean query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullTextBoolean {
    Must,
    Should,
    Not,
}

/// A full-text query tree.
#[derive(Debug, Clone, PartialEq)]
pub enum FullTextQuery {
    Field(FullTextField),
    Boolean(Vec<(FullTextBoolean, FullTextQuery)>),
}

impl FullTextQuery {
    fn boolean(clauses: Vec<(FullTextBoolean, FullTextQuery)>) -> Self {
        FullTextQuery::Boolean(clauses)
    }

    /// Fold nested boolean clauses into their parent where the meaning is
    /// unchanged: `MUST` of all-`MUST`/`NOT` clauses and `SHOULD` of
    /// all-`SHOULD` clauses.
    pub fn normalize(self) -> Self {
        let FullTextQuery::Boolean(clauses) = self else {
            return self;
        };
        let mut out = Vec::with_capacity(clauses.len());
        for (occur, clause) in clauses {
            match clause.normalize() {
                FullTextQuery::Boolean(inner) if can_fold(occur, &inner) => out.extend(inner),
                clause => out.push((occur, clause)),
            }
        }
        FullTextQuery::Boolean(out)
    }

    /// Searched columns, depth first.
    pub fn fields(&self) -> Vec<&FullTextField> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a FullTextField>) {
        match self {
            FullTextQuery::Field(f) => out.push(f),
            FullTextQuery::Boolean(clauses) => {
                for (_, clause) in clauses {
                    clause.collect_fields(out);
                }
            }
        }
    }
}

fn can_fold(occur: FullTextBoolean, inner: &[(FullTextBoolean, FullTextQuery)]) -> bool {
    match occur {
        FullTextBoolean::Must => inner
            .iter()
            .all(|(o, _)| matches!(o, FullTextBoolean::Must | FullTextBoolean::Not)),
        FullTextBoolean::Should => inner.iter().all(|(o, _)| *o == FullTextBoolean::Should),
        FullTextBoolean::Not => false,
    }
}

pub(super) fn is_full_text(expr: &Expr) -> bool {
    matches!(expr, Expr::Function { name, .. } if name.eq_ignore_ascii_case(FULL_TEXT_FUNCTION))
}

impl GroupGoal<'_> {
    /// Full-text scan over the group's full-text predicates, if it has any.
    pub(super) fn pick_full_text(&self) -> Result<Option<AccessPlan>> {
        let text_conditions: Vec<ConditionId> = self
            .conditions
            .iter()
            .copied()
            .filter(|id| is_full_text(self.ctx.condition(*id)))
            .collect();
        if text_conditions.is_empty() {
            return Ok(None);
        }

        let mut query: Option<FullTextQuery> = None;
        for id in &text_conditions {
            let Some(clause) = self.full_text_clause(self.ctx.condition(*id))? else {
                continue;
            };
            query = Some(match query {
                None => clause,
                Some(prev) => FullTextQuery::boolean(vec![
                    (FullTextBoolean::Must, prev),
                    (FullTextBoolean::Must, clause),
                ]),
            });
        }
        let Some(query) = query else {
            return Ok(None);
        };
        let query = query.normalize();

        let index = self.find_full_text_index(&query)?;
        let table = self
            .group
            .nodes
            .iter()
            .find(|n| n.source.table == index.table)
            .map(|n| n.source.alias.clone())
            .unwrap_or_else(|| self.alias(0).to_string());

        let required = self.required_after(&text_conditions);
        let limit = match self.limit {
            Some(limit) => limit,
            None => self.estimator.table_row_count(&index.table)?,
        };
        let mut estimator =
            PlanCostEstimator::new(self.estimator, self.config.insertion_sort_max_limit);
        estimator.full_text(limit);
        let cost = self.finish_cost(&mut estimator, &text_conditions, false)?;

        Ok(Some(self.access_plan(
            AccessKind::FullText {
                index: index.name.clone(),
                table,
                query,
            },
            OrderEffectiveness::None,
            false,
            &required,
            cost,
        )))
    }

    /// Query for one `full_text_search(...)` call, `None` when it searches
    /// columns of another group.
    fn full_text_clause(&self, expr: &Expr) -> Result<Option<FullTextQuery>> {
        let unsupported = || Error::UnsupportedPredicateShape(format!("unrecognized {}", expr));
        let Expr::Function { args, .. } = expr else {
            return Err(unsupported());
        };
        match args.as_slice() {
            [condition] => self.full_text_boolean(condition),
            [Expr::Column(column), key] if self.is_bound_expr(key) => {
                if !self.contains(&column.table) {
                    return Ok(None);
                }
                Ok(Some(FullTextQuery::Field(FullTextField {
                    column: column.clone(),
                    kind: FullTextFieldKind::Parse,
                    key: key.clone(),
                })))
            }
            _ => Err(unsupported()),
        }
    }

    fn full_text_boolean(&self, expr: &Expr) -> Result<Option<FullTextQuery>> {
        let unsupported =
            || Error::UnsupportedPredicateShape(format!("cannot convert to full text query: {}", expr));
        match expr {
            Expr::Compare { op, left, right } => {
                let (Expr::Column(column), key) = (left.as_ref(), right.as_ref()) else {
                    return Err(unsupported());
                };
                if !self.is_bound_expr(key) {
                    return Err(unsupported());
                }
                if !self.contains(&column.table) {
                    return Ok(None);
                }
                let field = FullTextQuery::Field(FullTextField {
                    column: column.clone(),
                    kind: FullTextFieldKind::Match,
                    key: key.clone(),
                });
                match op {
                    Comparison::Eq => Ok(Some(field)),
                    Comparison::Ne => Ok(Some(FullTextQuery::boolean(vec![(
                        FullTextBoolean::Not,
                        field,
                    )]))),
                    _ => Err(unsupported()),
                }
            }
            Expr::Logical { op, operands } => {
                let occur = match op {
                    LogicalOp::And => FullTextBoolean::Must,
                    LogicalOp::Or => FullTextBoolean::Should,
                    LogicalOp::Not => FullTextBoolean::Not,
                };
                let mut clauses = Vec::with_capacity(operands.len());
                for operand in operands {
                    clauses.push(self.full_text_boolean(operand)?);
                }
                if clauses.iter().all(Option::is_none) {
                    return Ok(None);
                }
                // Part of the tree searches another group.
                if clauses.iter().any(Option::is_none) {
                    return Err(unsupported());
                }
                Ok(Some(FullTextQuery::boolean(
                    clauses.into_iter().flatten().map(|c| (occur, c)).collect(),
                )))
            }
            _ => Err(unsupported()),
        }
    }

    /// The single full-text index covering every searched column.
    fn find_full_text_index(&self, query: &FullTextQuery) -> Result<&FullTextIndexDef> {
        let columns: Vec<TableColumn> = query
            .fields()
            .into_iter()
            .filter_map(|f| {
                let info = self.ctx.table_info(&f.column.table)?;
                Some(TableColumn::new(info.table.clone(), f.column.column.clone()))
            })
            .collect();

        let mut found: Option<&FullTextIndexDef> = None;
        for index in self.ctx.catalog().full_text_indexes() {
            if !columns.iter().all(|c| index.indexes(c)) {
                continue;
            }
            if let Some(first) = found {
                return Err(Error::AmbiguousFullTextIndex {
                    first: first.name.clone(),
                    second: index.name.clone(),
                });
            }
            found = Some(index);
        }
        found.ok_or_else(|| Error::NoFullTextIndexFound {
            columns: query.fields().iter().map(|f| f.column.to_string()).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::catalog::{Catalog, TableDef};
    use crate::config::OptimizerConfig;
    use crate::cost::{StatisticsCostModel, TableStatistics};
    use crate::query::QueryContext;
    use joinplan_proto::{JoinTree, Query};
    use pretty_assertions::assert_eq;

    fn field(column: &str) -> FullTextQuery {
        FullTextQuery::Field(FullTextField {
            column: ColumnRef::new("d", column),
            kind: FullTextFieldKind::Match,
            key: Expr::literal("x"),
        })
    }

    #[test]
    fn test_normalize_folds_must_and_should() {
        use FullTextBoolean::*;
        let q = FullTextQuery::Boolean(vec![
            (Must, field("a")),
            (
                Must,
                FullTextQuery::Boolean(vec![(Must, field("b")), (Not, field("c"))]),
            ),
            (
                Must,
                FullTextQuery::Boolean(vec![(Should, field("d")), (Should, field("e"))]),
            ),
        ]);
        let expected = FullTextQuery::Boolean(vec![
            (Must, field("a")),
            (Must, field("b")),
            (Not, field("c")),
            (
                Must,
                FullTextQuery::Boolean(vec![(Should, field("d")), (Should, field("e"))]),
            ),
        ]);
        assert_eq!(q.normalize(), expected);

        let q = FullTextQuery::Boolean(vec![
            (Should, field("a")),
            (
                Should,
                FullTextQuery::Boolean(vec![(Should, field("b")), (Should, field("c"))]),
            ),
        ]);
        assert_eq!(q.normalize().fields().len(), 3);
    }

    fn catalog() -> Catalog {
        Catalog::new()
            .with_table(TableDef::new("docs", &["id"]).with_columns(&["title", "body"]))
            .with_full_text_index(FullTextIndexDef::new(
                "docs_text",
                "docs",
                &[("docs", "title"), ("docs", "body")],
            ))
    }

    fn plan(catalog: &Catalog, condition: Expr) -> Result<Option<AccessPlan>> {
        let stats = TableStatistics::new().with_count("docs", 500);
        let model = StatisticsCostModel::new(&stats, catalog);
        let config = OptimizerConfig::default();
        let mut q = Query::new(JoinTree::table("d", "docs"));
        let id = q.add_condition(condition);
        q.where_conditions = vec![id];
        let ctx = QueryContext::new(&q, catalog)?;
        let goal = GroupGoal::new(
            &ctx,
            &config,
            &model,
            ctx.group(0).expect("group"),
            BTreeSet::new(),
            vec![id],
            true,
        );
        goal.pick_full_text()
    }

    #[test]
    fn test_full_text_scan() {
        let catalog = catalog();
        let search = Expr::function(
            FULL_TEXT_FUNCTION,
            vec![Expr::and(vec![
                Expr::eq(Expr::column("d", "title"), Expr::literal("rust")),
                Expr::compare(Comparison::Ne, Expr::column("d", "body"), Expr::literal("java")),
            ])],
        );
        let plan = plan(&catalog, search).unwrap().unwrap();
        let AccessKind::FullText { index, table, query } = &plan.kind else {
            panic!("expected full text scan, got {:?}", plan.kind);
        };
        assert_eq!(index, "docs_text");
        assert_eq!(table, "d");
        assert_eq!(query.fields().len(), 2);
        assert_eq!(plan.cost.estimated_rows, 500);
    }

    #[test]
    fn test_parse_form() {
        let catalog = catalog();
        let search = Expr::function(
            FULL_TEXT_FUNCTION,
            vec![Expr::column("d", "body"), Expr::literal("rust AND fast")],
        );
        let plan = plan(&catalog, search).unwrap().unwrap();
        let AccessKind::FullText { query, .. } = &plan.kind else {
            panic!("expected full text scan");
        };
        assert_eq!(query.fields()[0].kind, FullTextFieldKind::Parse);
    }

    #[test]
    fn test_index_errors() {
        let catalog = Catalog::new()
            .with_table(TableDef::new("docs", &["id"]).with_columns(&["title", "body"]))
            .with_full_text_index(FullTextIndexDef::new("a", "docs", &[("docs", "title")]))
            .with_full_text_index(FullTextIndexDef::new(
                "b",
                "docs",
                &[("docs", "title"), ("docs", "body")],
            ));
        let title = Expr::function(
            FULL_TEXT_FUNCTION,
            vec![Expr::column("d", "title"), Expr::literal("x")],
        );
        assert!(matches!(
            plan(&catalog, title),
            Err(Error::AmbiguousFullTextIndex { first, second }) if first == "a" && second == "b"
        ));

        let catalog = Catalog::new()
            .with_table(TableDef::new("docs", &["id"]).with_columns(&["title", "body"]));
        let body = Expr::function(
            FULL_TEXT_FUNCTION,
            vec![Expr::column("d", "body"), Expr::literal("x")],
        );
        assert!(matches!(
            plan(&catalog, body),
            Err(Error::NoFullTextIndexFound { columns }) if columns == vec!["d.body".to_string()]
        ));
    }

    #[test]
    fn test_unrecognized_call() {
        let catalog = catalog();
        let bad = Expr::function(FULL_TEXT_FUNCTION, vec![]);
        assert!(matches!(
            plan(&catalog, bad),
            Err(Error::UnsupportedPredicateShape(_))
        ));
    }
}
