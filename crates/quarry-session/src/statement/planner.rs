use quarry_common::spec::ScalarValue;
use sqlparser::ast::{
    BinaryOperator as SqlBinaryOperator, Expr, GroupByExpr, LimitClause, ObjectName,
    ObjectNamePart, Query, SelectItem, SelectItemQualifiedWildcardKind, SetExpr, Statement,
    TableFactor, TableWithJoins, UnaryOperator as SqlUnaryOperator, Value, ValueWithSpan,
};

use crate::error::{QueryError, QueryResult};
use crate::expression::{BinaryOperator, Expression, UnaryOperator};
use crate::statement::{ProjectionItem, SelectPlan, TableReference};

const NO_CACHE_HINT: &str = "NO_CACHE";

pub(super) fn plan_statement(statement: Statement) -> QueryResult<SelectPlan> {
    match statement {
        Statement::Query(query) => plan_query(*query),
        _ => Err(QueryError::unsupported("statements other than SELECT")),
    }
}

fn plan_query(query: Query) -> QueryResult<SelectPlan> {
    if query.with.is_some() {
        return Err(QueryError::unsupported("WITH clause"));
    }
    if query.order_by.is_some() {
        return Err(QueryError::unsupported("ORDER BY"));
    }
    if query.fetch.is_some() {
        return Err(QueryError::unsupported("FETCH"));
    }
    if !query.locks.is_empty() {
        return Err(QueryError::unsupported("locking clause"));
    }
    let (limit, offset) = plan_limit(query.limit_clause)?;
    let mut select = match *query.body {
        SetExpr::Select(select) => *select,
        other => return Err(QueryError::unsupported(format!("query `{other}`"))),
    };
    if select.distinct.is_some() {
        return Err(QueryError::unsupported("DISTINCT"));
    }
    if select.top.is_some() {
        return Err(QueryError::unsupported("TOP"));
    }
    if select.into.is_some() {
        return Err(QueryError::unsupported("SELECT INTO"));
    }
    let grouped = match &select.group_by {
        GroupByExpr::All(_) => true,
        GroupByExpr::Expressions(exprs, _) => !exprs.is_empty(),
    };
    if grouped {
        return Err(QueryError::unsupported("GROUP BY"));
    }
    if select.having.is_some() {
        return Err(QueryError::unsupported("HAVING"));
    }
    if select.qualify.is_some() || !select.named_window.is_empty() {
        return Err(QueryError::unsupported("window clause"));
    }

    let relation = match select.from.len() {
        0 => None,
        1 => Some(plan_table(select.from.remove(0))?),
        _ => return Err(QueryError::unsupported("more than one relation in FROM")),
    };
    let planner = ExpressionPlanner {
        relation: relation.as_ref(),
    };
    let projection = select
        .projection
        .into_iter()
        .map(|item| planner.plan_projection_item(item))
        .collect::<QueryResult<Vec<_>>>()?;
    let filter = select
        .selection
        .map(|expr| planner.plan_expression(expr))
        .transpose()?;
    Ok(SelectPlan {
        relation,
        projection,
        filter,
        limit,
        offset,
    })
}

fn plan_table(table: TableWithJoins) -> QueryResult<TableReference> {
    if !table.joins.is_empty() {
        return Err(QueryError::unsupported("JOIN"));
    }
    match table.relation {
        TableFactor::Table {
            name,
            alias,
            args,
            with_hints,
            ..
        } => {
            if args.is_some() {
                return Err(QueryError::unsupported("table function"));
            }
            let alias = match alias {
                Some(alias) if !alias.columns.is_empty() => {
                    return Err(QueryError::unsupported("column aliases for a relation"))
                }
                Some(alias) => Some(alias.name.value),
                None => None,
            };
            let mut no_cache = false;
            for hint in with_hints {
                match hint {
                    Expr::Identifier(ident) if ident.value.eq_ignore_ascii_case(NO_CACHE_HINT) => {
                        no_cache = true;
                    }
                    other => {
                        return Err(QueryError::unsupported(format!("table hint `{other}`")))
                    }
                }
            }
            Ok(TableReference {
                name: object_name(name)?,
                alias,
                no_cache,
            })
        }
        other => Err(QueryError::unsupported(format!("relation `{other}`"))),
    }
}

fn object_name(name: ObjectName) -> QueryResult<String> {
    let parts = name
        .0
        .into_iter()
        .map(|part| match part {
            ObjectNamePart::Identifier(ident) => Ok(ident.value),
            #[allow(unreachable_patterns)]
            other => Err(QueryError::unsupported(format!("name part `{other}`"))),
        })
        .collect::<QueryResult<Vec<_>>>()?;
    Ok(parts.join("."))
}

fn plan_limit(clause: Option<LimitClause>) -> QueryResult<(Option<usize>, usize)> {
    match clause {
        None => Ok((None, 0)),
        Some(LimitClause::LimitOffset {
            limit,
            offset,
            limit_by,
        }) => {
            if !limit_by.is_empty() {
                return Err(QueryError::unsupported("LIMIT BY"));
            }
            let limit = limit.map(|x| row_count(x, "LIMIT")).transpose()?;
            let offset = offset
                .map(|x| row_count(x.value, "OFFSET"))
                .transpose()?
                .unwrap_or(0);
            Ok((limit, offset))
        }
        Some(LimitClause::OffsetCommaLimit { offset, limit }) => {
            Ok((Some(row_count(limit, "LIMIT")?), row_count(offset, "OFFSET")?))
        }
    }
}

fn row_count(expr: Expr, clause: &str) -> QueryResult<usize> {
    match &expr {
        Expr::Value(ValueWithSpan {
            value: Value::Number(n, _),
            ..
        }) => n.parse::<usize>().map_err(|_| {
            QueryError::sql(format!("{clause} must be a non-negative integer, not {n}"))
        }),
        _ => Err(QueryError::sql(format!(
            "{clause} must be a non-negative integer, not `{expr}`"
        ))),
    }
}

fn literal(value: Value) -> QueryResult<ScalarValue> {
    match value {
        Value::Null => Ok(ScalarValue::Null),
        Value::Boolean(v) => Ok(ScalarValue::Boolean(v)),
        Value::SingleQuotedString(v) => Ok(ScalarValue::String(v)),
        Value::Number(n, _) => {
            if let Ok(v) = n.parse::<i64>() {
                Ok(ScalarValue::Integer(v))
            } else {
                n.parse::<f64>()
                    .map(ScalarValue::Float)
                    .map_err(|_| QueryError::sql(format!("invalid number: {n}")))
            }
        }
        other => Err(QueryError::unsupported(format!("literal `{other}`"))),
    }
}

/// The output name of an unaliased projection.
fn default_name(expr: &Expr) -> String {
    match expr {
        Expr::Identifier(ident) => ident.value.clone(),
        Expr::CompoundIdentifier(idents) => idents
            .last()
            .map(|x| x.value.clone())
            .unwrap_or_else(|| expr.to_string()),
        _ => expr.to_string(),
    }
}

struct ExpressionPlanner<'a> {
    relation: Option<&'a TableReference>,
}

impl ExpressionPlanner<'_> {
    fn check_qualifier(&self, qualifier: &str) -> QueryResult<()> {
        match self.relation {
            Some(relation) if relation.matches_qualifier(qualifier) => Ok(()),
            _ => Err(QueryError::sql(format!("unknown relation qualifier: {qualifier}"))),
        }
    }

    fn plan_projection_item(&self, item: SelectItem) -> QueryResult<ProjectionItem> {
        match item {
            SelectItem::Wildcard(_) => Ok(ProjectionItem::Wildcard),
            SelectItem::QualifiedWildcard(SelectItemQualifiedWildcardKind::ObjectName(name), _) => {
                self.check_qualifier(&object_name(name)?)?;
                Ok(ProjectionItem::Wildcard)
            }
            SelectItem::QualifiedWildcard(kind, _) => Err(QueryError::unsupported(format!(
                "wildcard `{kind}`"
            ))),
            SelectItem::UnnamedExpr(expr) => {
                let name = default_name(&expr);
                Ok(ProjectionItem::Expression {
                    expr: self.plan_expression(expr)?,
                    name,
                })
            }
            SelectItem::ExprWithAlias { expr, alias } => Ok(ProjectionItem::Expression {
                expr: self.plan_expression(expr)?,
                name: alias.value,
            }),
        }
    }

    fn plan_boxed(&self, expr: Box<Expr>) -> QueryResult<Box<Expression>> {
        Ok(Box::new(self.plan_expression(*expr)?))
    }

    fn plan_expression(&self, expr: Expr) -> QueryResult<Expression> {
        match expr {
            Expr::Identifier(ident) => Ok(Expression::Column(ident.value)),
            Expr::CompoundIdentifier(mut idents) => {
                let Some(column) = idents.pop() else {
                    return Err(QueryError::sql("empty identifier"));
                };
                let qualifier = idents
                    .into_iter()
                    .map(|x| x.value)
                    .collect::<Vec<_>>()
                    .join(".");
                self.check_qualifier(&qualifier)?;
                Ok(Expression::Column(column.value))
            }
            Expr::Value(ValueWithSpan { value, .. }) => Ok(Expression::Literal(literal(value)?)),
            Expr::Nested(expr) => self.plan_expression(*expr),
            Expr::UnaryOp { op, expr } => {
                let expr = self.plan_expression(*expr)?;
                match (op, expr) {
                    (SqlUnaryOperator::Plus, expr) => Ok(expr),
                    (SqlUnaryOperator::Minus, Expression::Literal(ScalarValue::Integer(v))) => {
                        v.checked_neg()
                            .map(|v| Expression::Literal(ScalarValue::Integer(v)))
                            .ok_or_else(|| QueryError::sql("integer overflow"))
                    }
                    (SqlUnaryOperator::Minus, Expression::Literal(ScalarValue::Float(v))) => {
                        Ok(Expression::Literal(ScalarValue::Float(-v)))
                    }
                    (SqlUnaryOperator::Minus, expr) => Ok(Expression::Unary {
                        op: UnaryOperator::Negative,
                        expr: Box::new(expr),
                    }),
                    (SqlUnaryOperator::Not, expr) => Ok(Expression::Unary {
                        op: UnaryOperator::Not,
                        expr: Box::new(expr),
                    }),
                    (op, _) => Err(QueryError::unsupported(format!("operator `{op}`"))),
                }
            }
            Expr::BinaryOp { left, op, right } => {
                let op = match op {
                    SqlBinaryOperator::And => BinaryOperator::And,
                    SqlBinaryOperator::Or => BinaryOperator::Or,
                    SqlBinaryOperator::Eq => BinaryOperator::Eq,
                    SqlBinaryOperator::NotEq => BinaryOperator::NotEq,
                    SqlBinaryOperator::Lt => BinaryOperator::Lt,
                    SqlBinaryOperator::LtEq => BinaryOperator::LtEq,
                    SqlBinaryOperator::Gt => BinaryOperator::Gt,
                    SqlBinaryOperator::GtEq => BinaryOperator::GtEq,
                    SqlBinaryOperator::Plus => BinaryOperator::Plus,
                    SqlBinaryOperator::Minus => BinaryOperator::Minus,
                    SqlBinaryOperator::Multiply => BinaryOperator::Multiply,
                    SqlBinaryOperator::Divide => BinaryOperator::Divide,
                    SqlBinaryOperator::Modulo => BinaryOperator::Modulo,
                    SqlBinaryOperator::StringConcat => BinaryOperator::Concat,
                    other => return Err(QueryError::unsupported(format!("operator `{other}`"))),
                };
                Ok(Expression::Binary {
                    left: self.plan_boxed(left)?,
                    op,
                    right: self.plan_boxed(right)?,
                })
            }
            Expr::IsNull(expr) => Ok(Expression::IsNull {
                expr: self.plan_boxed(expr)?,
                negated: false,
            }),
            Expr::IsNotNull(expr) => Ok(Expression::IsNull {
                expr: self.plan_boxed(expr)?,
                negated: true,
            }),
            Expr::IsTrue(expr) => self.plan_is_boolean(expr, true, false),
            Expr::IsNotTrue(expr) => self.plan_is_boolean(expr, true, true),
            Expr::IsFalse(expr) => self.plan_is_boolean(expr, false, false),
            Expr::IsNotFalse(expr) => self.plan_is_boolean(expr, false, true),
            Expr::InList {
                expr,
                list,
                negated,
            } => Ok(Expression::InList {
                expr: self.plan_boxed(expr)?,
                list: list
                    .into_iter()
                    .map(|x| self.plan_expression(x))
                    .collect::<QueryResult<Vec<_>>>()?,
                negated,
            }),
            Expr::Between {
                expr,
                negated,
                low,
                high,
            } => Ok(Expression::Between {
                expr: self.plan_boxed(expr)?,
                low: self.plan_boxed(low)?,
                high: self.plan_boxed(high)?,
                negated,
            }),
            Expr::Like {
                negated,
                any,
                expr,
                pattern,
                escape_char,
            } => self.plan_like(expr, pattern, negated, any, escape_char.is_some(), false),
            Expr::ILike {
                negated,
                any,
                expr,
                pattern,
                escape_char,
            } => self.plan_like(expr, pattern, negated, any, escape_char.is_some(), true),
            other => Err(QueryError::unsupported(format!("expression `{other}`"))),
        }
    }

    fn plan_is_boolean(
        &self,
        expr: Box<Expr>,
        value: bool,
        negated: bool,
    ) -> QueryResult<Expression> {
        Ok(Expression::IsBoolean {
            expr: self.plan_boxed(expr)?,
            value,
            negated,
        })
    }

    fn plan_like(
        &self,
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
        any: bool,
        escape: bool,
        case_insensitive: bool,
    ) -> QueryResult<Expression> {
        if any {
            return Err(QueryError::unsupported("LIKE ANY"));
        }
        if escape {
            return Err(QueryError::unsupported("LIKE ... ESCAPE"));
        }
        Expression::like(
            self.plan_expression(*expr)?,
            self.plan_expression(*pattern)?,
            negated,
            case_insensitive,
        )
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::parse_statement;

    fn projection_names(plan: &SelectPlan) -> Vec<String> {
        plan.projection
            .iter()
            .map(|x| match x {
                ProjectionItem::Wildcard => "*".to_string(),
                ProjectionItem::Expression { name, .. } => name.clone(),
            })
            .collect()
    }

    #[test]
    fn test_projection_names() {
        let plan = parse_statement(
            "SELECT p.*, name, p.id AS planet_id, id + 1, 'x' FROM $planets p",
            &[],
        )
        .unwrap();
        assert_eq!(
            projection_names(&plan),
            vec!["*", "name", "planet_id", "id + 1", "'x'"]
        );
    }

    #[test]
    fn test_select_without_from() {
        let plan = parse_statement("SELECT 1 + 2 AS three", &[]).unwrap();
        assert!(plan.relation.is_none());
        assert_eq!(projection_names(&plan), vec!["three"]);
    }

    #[test]
    fn test_filter_with_parameters() {
        let plan = parse_statement(
            "SELECT * FROM $planets WHERE id > ? AND name LIKE ?",
            &[4.into(), "%t%".into()],
        )
        .unwrap();
        assert!(matches!(
            plan.filter,
            Some(Expression::Binary {
                op: BinaryOperator::And,
                ..
            })
        ));
    }

    #[test]
    fn test_negative_literal_is_folded() {
        let plan = parse_statement("SELECT * FROM $planets WHERE id = ?", &[(-1).into()]).unwrap();
        let Some(Expression::Binary { right, .. }) = plan.filter else {
            panic!("expected a comparison");
        };
        assert!(matches!(
            *right,
            Expression::Literal(ScalarValue::Integer(-1))
        ));
    }

    #[test]
    fn test_unknown_qualifier() {
        assert!(matches!(
            parse_statement("SELECT q.name FROM $planets AS p", &[]),
            Err(QueryError::Sql(_))
        ));
    }

    #[test]
    fn test_unsupported_syntax() {
        for sql in [
            "SELECT * FROM $planets ORDER BY id",
            "SELECT DISTINCT name FROM $planets",
            "SELECT name FROM $planets GROUP BY name",
            "SELECT * FROM $planets a JOIN $planets b ON a.id = b.id",
            "SELECT * FROM $planets, $no_table",
            "SELECT * FROM (SELECT * FROM $planets) AS t",
            "WITH t AS (SELECT 1) SELECT * FROM t",
            "SELECT COUNT(*) FROM $planets",
            "SELECT * FROM $planets LIMIT -1",
            "INSERT INTO t VALUES (1)",
            "SELECT * FROM $planets WITH (NOLOCK)",
        ] {
            assert!(
                matches!(parse_statement(sql, &[]), Err(QueryError::Sql(_))),
                "{sql}"
            );
        }
    }
}
