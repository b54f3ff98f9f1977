mod params;
mod planner;

use quarry_common::spec::ScalarValue;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::error::{QueryError, QueryResult};
use crate::expression::Expression;

/// The relation named in the `FROM` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReference {
    pub name: String,
    pub alias: Option<String>,
    /// Set by the `WITH (NO_CACHE)` table hint.
    pub no_cache: bool,
}

impl TableReference {
    /// Whether a column qualifier refers to this relation.
    pub fn matches_qualifier(&self, qualifier: &str) -> bool {
        match &self.alias {
            Some(alias) => alias.eq_ignore_ascii_case(qualifier),
            None => {
                self.name.eq_ignore_ascii_case(qualifier)
                    || self
                        .name
                        .rsplit('.')
                        .next()
                        .is_some_and(|x| x.eq_ignore_ascii_case(qualifier))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum ProjectionItem {
    Wildcard,
    Expression { expr: Expression, name: String },
}

/// A single-relation `SELECT` statement ready for execution.
#[derive(Debug, Clone)]
pub struct SelectPlan {
    /// `None` for statements without `FROM`.
    pub relation: Option<TableReference>,
    pub projection: Vec<ProjectionItem>,
    pub filter: Option<Expression>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl SelectPlan {
    /// The number of source rows the connector may stop after.
    /// There is no bound when rows are filtered.
    pub fn limit_hint(&self) -> Option<usize> {
        match (&self.filter, self.limit) {
            (None, Some(limit)) => Some(limit.saturating_add(self.offset)),
            _ => None,
        }
    }

    pub fn no_cache(&self) -> bool {
        self.relation.as_ref().is_some_and(|x| x.no_cache)
    }
}

/// Parses one statement, binding positional parameters.
pub fn parse_statement(sql: &str, parameters: &[ScalarValue]) -> QueryResult<SelectPlan> {
    let dialect = GenericDialect {};
    let tokens = params::bind_parameters(&dialect, sql, parameters)?;
    let mut statements = Parser::new(&dialect)
        .with_tokens(tokens)
        .parse_statements()?;
    let statement = match statements.len() {
        0 => return Err(QueryError::sql("empty statement")),
        1 => statements.remove(0),
        n => {
            return Err(QueryError::sql(format!(
                "expected one statement, found {n}"
            )))
        }
    };
    planner::plan_statement(statement)
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_hint() {
        let plan = parse_statement("SELECT * FROM $planets LIMIT 3 OFFSET 2", &[]).unwrap();
        assert_eq!(plan.limit, Some(3));
        assert_eq!(plan.offset, 2);
        assert_eq!(plan.limit_hint(), Some(5));

        let plan = parse_statement("SELECT * FROM $planets WHERE id > 1 LIMIT 3", &[]).unwrap();
        assert_eq!(plan.limit_hint(), None);
    }

    #[test]
    fn test_table_reference() {
        let plan = parse_statement("SELECT p.name FROM $planets AS p WITH (NO_CACHE)", &[])
            .unwrap();
        let relation = plan.relation.unwrap();
        assert_eq!(relation.name, "$planets");
        assert_eq!(relation.alias.as_deref(), Some("p"));
        assert!(relation.no_cache);
        assert!(relation.matches_qualifier("P"));
        assert!(!relation.matches_qualifier("planets"));
    }

    #[test]
    fn test_multiple_statements() {
        assert!(matches!(
            parse_statement("SELECT 1; SELECT 2", &[]),
            Err(QueryError::Sql(_))
        ));
        assert!(matches!(parse_statement("", &[]), Err(QueryError::Sql(_))));
    }
}
