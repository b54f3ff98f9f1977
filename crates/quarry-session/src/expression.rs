use std::cmp::Ordering;
use std::fmt;

use quarry_common::spec::{DataType, Row, ScalarValue, Schema};
use regex::{Regex, RegexBuilder};

use crate::error::{QueryError, QueryResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Negative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    And,
    Or,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Concat,
}

impl BinaryOperator {
    fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq
                | BinaryOperator::NotEq
                | BinaryOperator::Lt
                | BinaryOperator::LtEq
                | BinaryOperator::Gt
                | BinaryOperator::GtEq
        )
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
            BinaryOperator::Eq => "=",
            BinaryOperator::NotEq => "<>",
            BinaryOperator::Lt => "<",
            BinaryOperator::LtEq => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::GtEq => ">=",
            BinaryOperator::Plus => "+",
            BinaryOperator::Minus => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Concat => "||",
        };
        write!(f, "{symbol}")
    }
}

/// A scalar expression evaluated against one row at a time.
///
/// Logical operators follow SQL three-valued logic, where a null operand
/// yields an unknown (null) result unless the other operand decides it.
#[derive(Debug, Clone)]
pub enum Expression {
    Column(String),
    Literal(ScalarValue),
    Unary {
        op: UnaryOperator,
        expr: Box<Expression>,
    },
    Binary {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },
    IsNull {
        expr: Box<Expression>,
        negated: bool,
    },
    IsBoolean {
        expr: Box<Expression>,
        value: bool,
        negated: bool,
    },
    InList {
        expr: Box<Expression>,
        list: Vec<Expression>,
        negated: bool,
    },
    Between {
        expr: Box<Expression>,
        low: Box<Expression>,
        high: Box<Expression>,
        negated: bool,
    },
    Like {
        expr: Box<Expression>,
        pattern: Box<Expression>,
        negated: bool,
        case_insensitive: bool,
        /// The compiled pattern when it is a literal.
        compiled: Option<Regex>,
    },
}

impl Expression {
    pub fn like(
        expr: Expression,
        pattern: Expression,
        negated: bool,
        case_insensitive: bool,
    ) -> QueryResult<Self> {
        let compiled = match &pattern {
            Expression::Literal(ScalarValue::String(p)) => {
                Some(like_to_regex(p, case_insensitive)?)
            }
            _ => None,
        };
        Ok(Expression::Like {
            expr: Box::new(expr),
            pattern: Box::new(pattern),
            negated,
            case_insensitive,
            compiled,
        })
    }

    /// Visits every column name referenced by the expression.
    pub fn columns(&self) -> Vec<&str> {
        let mut output = vec![];
        self.collect_columns(&mut output);
        output
    }

    fn collect_columns<'a>(&'a self, output: &mut Vec<&'a str>) {
        match self {
            Expression::Column(name) => output.push(name),
            Expression::Literal(_) => {}
            Expression::Unary { expr, .. }
            | Expression::IsNull { expr, .. }
            | Expression::IsBoolean { expr, .. } => expr.collect_columns(output),
            Expression::Binary { left, right, .. } => {
                left.collect_columns(output);
                right.collect_columns(output);
            }
            Expression::InList { expr, list, .. } => {
                expr.collect_columns(output);
                list.iter().for_each(|x| x.collect_columns(output));
            }
            Expression::Between {
                expr, low, high, ..
            } => {
                expr.collect_columns(output);
                low.collect_columns(output);
                high.collect_columns(output);
            }
            Expression::Like { expr, pattern, .. } => {
                expr.collect_columns(output);
                pattern.collect_columns(output);
            }
        }
    }

    /// The type of the values the expression produces for rows of the schema.
    pub fn data_type(&self, schema: &Schema) -> DataType {
        match self {
            Expression::Column(name) => schema
                .index_of(name)
                .map(|i| schema.fields()[i].data_type)
                .unwrap_or(DataType::Null),
            Expression::Literal(v) => v.data_type(),
            Expression::Unary {
                op: UnaryOperator::Negative,
                expr,
            } => expr.data_type(schema),
            Expression::Binary { left, op, right } => match op {
                BinaryOperator::Plus
                | BinaryOperator::Minus
                | BinaryOperator::Multiply
                | BinaryOperator::Modulo => {
                    match (left.data_type(schema), right.data_type(schema)) {
                        (
                            DataType::Integer | DataType::Null,
                            DataType::Integer | DataType::Null,
                        ) => DataType::Integer,
                        _ => DataType::Float,
                    }
                }
                BinaryOperator::Divide => DataType::Float,
                BinaryOperator::Concat => DataType::String,
                _ => DataType::Boolean,
            },
            _ => DataType::Boolean,
        }
    }

    pub fn evaluate(&self, row: &Row) -> QueryResult<ScalarValue> {
        match self {
            Expression::Column(name) => row
                .get(name)
                .cloned()
                .ok_or_else(|| QueryError::sql(format!("column not found: {name}"))),
            Expression::Literal(v) => Ok(v.clone()),
            Expression::Unary { op, expr } => {
                let value = expr.evaluate(row)?;
                match (op, value) {
                    (_, ScalarValue::Null) => Ok(ScalarValue::Null),
                    (UnaryOperator::Not, ScalarValue::Boolean(v)) => Ok(ScalarValue::Boolean(!v)),
                    (UnaryOperator::Negative, ScalarValue::Integer(v)) => v
                        .checked_neg()
                        .map(ScalarValue::Integer)
                        .ok_or_else(|| QueryError::sql("integer overflow")),
                    (UnaryOperator::Negative, ScalarValue::Float(v)) => Ok(ScalarValue::Float(-v)),
                    (op, v) => Err(QueryError::sql(format!(
                        "cannot apply {op:?} to {}",
                        v.data_type()
                    ))),
                }
            }
            Expression::Binary { left, op, right } => match op {
                BinaryOperator::And => {
                    let left = as_boolean(left.evaluate(row)?)?;
                    if left == Some(false) {
                        return Ok(ScalarValue::Boolean(false));
                    }
                    let right = as_boolean(right.evaluate(row)?)?;
                    Ok(match (left, right) {
                        (_, Some(false)) => ScalarValue::Boolean(false),
                        (Some(true), Some(true)) => ScalarValue::Boolean(true),
                        _ => ScalarValue::Null,
                    })
                }
                BinaryOperator::Or => {
                    let left = as_boolean(left.evaluate(row)?)?;
                    if left == Some(true) {
                        return Ok(ScalarValue::Boolean(true));
                    }
                    let right = as_boolean(right.evaluate(row)?)?;
                    Ok(match (left, right) {
                        (_, Some(true)) => ScalarValue::Boolean(true),
                        (Some(false), Some(false)) => ScalarValue::Boolean(false),
                        _ => ScalarValue::Null,
                    })
                }
                op if op.is_comparison() => {
                    let left = left.evaluate(row)?;
                    let right = right.evaluate(row)?;
                    Ok(compare(&left, &right)?
                        .map(|ordering| ScalarValue::Boolean(matches_ordering(*op, ordering)))
                        .unwrap_or(ScalarValue::Null))
                }
                op => arithmetic(*op, left.evaluate(row)?, right.evaluate(row)?),
            },
            Expression::IsNull { expr, negated } => {
                let is_null = expr.evaluate(row)?.is_null();
                Ok(ScalarValue::Boolean(is_null != *negated))
            }
            Expression::IsBoolean {
                expr,
                value,
                negated,
            } => {
                let actual = as_boolean(expr.evaluate(row)?)?;
                Ok(ScalarValue::Boolean((actual == Some(*value)) != *negated))
            }
            Expression::InList {
                expr,
                list,
                negated,
            } => {
                let value = expr.evaluate(row)?;
                if value.is_null() {
                    return Ok(ScalarValue::Null);
                }
                let mut saw_null = false;
                for item in list {
                    match compare(&value, &item.evaluate(row)?)? {
                        Some(Ordering::Equal) => return Ok(ScalarValue::Boolean(!negated)),
                        Some(_) => {}
                        None => saw_null = true,
                    }
                }
                if saw_null {
                    Ok(ScalarValue::Null)
                } else {
                    Ok(ScalarValue::Boolean(*negated))
                }
            }
            Expression::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let value = expr.evaluate(row)?;
                let above = compare(&value, &low.evaluate(row)?)?.map(|x| x != Ordering::Less);
                let below = compare(&value, &high.evaluate(row)?)?.map(|x| x != Ordering::Greater);
                Ok(match (above, below) {
                    (Some(false), _) | (_, Some(false)) => ScalarValue::Boolean(*negated),
                    (Some(true), Some(true)) => ScalarValue::Boolean(!negated),
                    _ => ScalarValue::Null,
                })
            }
            Expression::Like {
                expr,
                pattern,
                negated,
                case_insensitive,
                compiled,
            } => {
                let value = expr.evaluate(row)?;
                let pattern_value = match compiled {
                    Some(_) => ScalarValue::Null,
                    None => pattern.evaluate(row)?,
                };
                let dynamic;
                let regex = match compiled {
                    Some(regex) => regex,
                    None => match &pattern_value {
                        ScalarValue::Null => return Ok(ScalarValue::Null),
                        ScalarValue::String(p) => {
                            dynamic = like_to_regex(p, *case_insensitive)?;
                            &dynamic
                        }
                        other => {
                            return Err(QueryError::sql(format!(
                                "LIKE pattern must be a string, not {}",
                                other.data_type()
                            )))
                        }
                    },
                };
                match value {
                    ScalarValue::Null => Ok(ScalarValue::Null),
                    ScalarValue::String(v) => Ok(ScalarValue::Boolean(regex.is_match(&v) != *negated)),
                    other => Err(QueryError::sql(format!(
                        "LIKE requires a string operand, not {}",
                        other.data_type()
                    ))),
                }
            }
        }
    }
}

fn as_boolean(value: ScalarValue) -> QueryResult<Option<bool>> {
    match value {
        ScalarValue::Null => Ok(None),
        ScalarValue::Boolean(v) => Ok(Some(v)),
        other => Err(QueryError::sql(format!(
            "expected a boolean value, not {}",
            other.data_type()
        ))),
    }
}

fn matches_ordering(op: BinaryOperator, ordering: Ordering) -> bool {
    match op {
        BinaryOperator::Eq => ordering == Ordering::Equal,
        BinaryOperator::NotEq => ordering != Ordering::Equal,
        BinaryOperator::Lt => ordering == Ordering::Less,
        BinaryOperator::LtEq => ordering != Ordering::Greater,
        BinaryOperator::Gt => ordering == Ordering::Greater,
        BinaryOperator::GtEq => ordering != Ordering::Less,
        _ => false,
    }
}

/// Compares two values, returning `None` if either is null.
/// Strings are parsed when compared with timestamps.
pub(crate) fn compare(left: &ScalarValue, right: &ScalarValue) -> QueryResult<Option<Ordering>> {
    let ordering = match (left, right) {
        (ScalarValue::Null, _) | (_, ScalarValue::Null) => return Ok(None),
        (ScalarValue::Integer(l), ScalarValue::Integer(r)) => l.cmp(r),
        (ScalarValue::Boolean(l), ScalarValue::Boolean(r)) => l.cmp(r),
        (ScalarValue::String(l), ScalarValue::String(r)) => l.cmp(r),
        (l, r) if l.data_type().is_numeric() && r.data_type().is_numeric() => {
            match (l.as_f64(), r.as_f64()) {
                (Some(l), Some(r)) => l.total_cmp(&r),
                _ => return Ok(None),
            }
        }
        (ScalarValue::Timestamp(_), _) | (_, ScalarValue::Timestamp(_)) => {
            match (left.as_timestamp(), right.as_timestamp()) {
                (Some(l), Some(r)) => l.cmp(&r),
                _ => {
                    return Err(QueryError::sql(format!(
                        "cannot compare {left} with {right} as timestamps"
                    )))
                }
            }
        }
        (ScalarValue::Json(l), ScalarValue::Json(r)) if l == r => Ordering::Equal,
        (l, r) => {
            return Err(QueryError::sql(format!(
                "cannot compare {} with {}",
                l.data_type(),
                r.data_type()
            )))
        }
    };
    Ok(Some(ordering))
}

fn arithmetic(op: BinaryOperator, left: ScalarValue, right: ScalarValue) -> QueryResult<ScalarValue> {
    use ScalarValue::{Float, Integer, Null};

    if left.is_null() || right.is_null() {
        return Ok(Null);
    }
    if op == BinaryOperator::Concat {
        return Ok(ScalarValue::String(format!("{left}{right}")));
    }
    let overflow = || QueryError::sql(format!("integer overflow in {left} {op} {right}"));
    match (&left, &right) {
        (Integer(l), Integer(r)) => match op {
            BinaryOperator::Plus => l.checked_add(*r).map(Integer).ok_or_else(overflow),
            BinaryOperator::Minus => l.checked_sub(*r).map(Integer).ok_or_else(overflow),
            BinaryOperator::Multiply => l.checked_mul(*r).map(Integer).ok_or_else(overflow),
            BinaryOperator::Divide if *r == 0 => Ok(Null),
            BinaryOperator::Divide => Ok(Float(*l as f64 / *r as f64)),
            BinaryOperator::Modulo if *r == 0 => Ok(Null),
            BinaryOperator::Modulo => l.checked_rem(*r).map(Integer).ok_or_else(overflow),
            _ => Err(QueryError::internal(format!("{op} is not arithmetic"))),
        },
        (l, r) => match (l.as_f64(), r.as_f64()) {
            (Some(l), Some(r)) => match op {
                BinaryOperator::Plus => Ok(Float(l + r)),
                BinaryOperator::Minus => Ok(Float(l - r)),
                BinaryOperator::Multiply => Ok(Float(l * r)),
                BinaryOperator::Divide | BinaryOperator::Modulo if r == 0.0 => Ok(Null),
                BinaryOperator::Divide => Ok(Float(l / r)),
                BinaryOperator::Modulo => Ok(Float(l % r)),
                _ => Err(QueryError::internal(format!("{op} is not arithmetic"))),
            },
            _ => Err(QueryError::sql(format!(
                "cannot apply {op} to {} and {}",
                left.data_type(),
                right.data_type()
            ))),
        },
    }
}

/// Translates a SQL `LIKE` pattern, where `%` matches any run of characters and
/// `_` matches one character, into an anchored regular expression.
fn like_to_regex(pattern: &str, case_insensitive: bool) -> QueryResult<Regex> {
    let mut expression = String::with_capacity(pattern.len() + 8);
    expression.push('^');
    let mut buffer = [0u8; 4];
    for c in pattern.chars() {
        match c {
            '%' => expression.push_str(".*"),
            '_' => expression.push('.'),
            c => expression.push_str(&regex::escape(c.encode_utf8(&mut buffer))),
        }
    }
    expression.push('$');
    RegexBuilder::new(&expression)
        .case_insensitive(case_insensitive)
        .dot_matches_new_line(true)
        .build()
        .map_err(|e| QueryError::sql(format!("invalid LIKE pattern `{pattern}`: {e}")))
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use quarry_common::spec::Field;

    use super::*;

    fn row() -> Row {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Integer),
            Field::new("name", DataType::String),
            Field::new("pressure", DataType::Float),
        ]));
        Row::try_new(schema, vec![4.into(), "Mars".into(), ScalarValue::Null]).unwrap()
    }

    fn column(name: &str) -> Box<Expression> {
        Box::new(Expression::Column(name.to_string()))
    }

    fn literal(value: impl Into<ScalarValue>) -> Box<Expression> {
        Box::new(Expression::Literal(value.into()))
    }

    fn binary(left: Box<Expression>, op: BinaryOperator, right: Box<Expression>) -> Expression {
        Expression::Binary { left, op, right }
    }

    #[test]
    fn test_three_valued_logic() {
        let row = row();
        let unknown = binary(column("pressure"), BinaryOperator::Gt, literal(1));
        assert_eq!(unknown.evaluate(&row).unwrap(), ScalarValue::Null);

        let and_false = binary(
            Box::new(unknown.clone()),
            BinaryOperator::And,
            Box::new(binary(column("id"), BinaryOperator::Lt, literal(0))),
        );
        assert_eq!(and_false.evaluate(&row).unwrap(), ScalarValue::Boolean(false));

        let or_true = binary(
            Box::new(unknown.clone()),
            BinaryOperator::Or,
            Box::new(binary(column("id"), BinaryOperator::Eq, literal(4))),
        );
        assert_eq!(or_true.evaluate(&row).unwrap(), ScalarValue::Boolean(true));

        let not_unknown = Expression::Unary {
            op: UnaryOperator::Not,
            expr: Box::new(unknown),
        };
        assert_eq!(not_unknown.evaluate(&row).unwrap(), ScalarValue::Null);
    }

    #[test]
    fn test_like() {
        let row = row();
        let like = Expression::like(*column("name"), *literal("%a_s"), false, false).unwrap();
        assert_eq!(like.evaluate(&row).unwrap(), ScalarValue::Boolean(true));
        let like = Expression::like(*column("name"), *literal("m%"), false, false).unwrap();
        assert_eq!(like.evaluate(&row).unwrap(), ScalarValue::Boolean(false));
        let ilike = Expression::like(*column("name"), *literal("m%"), false, true).unwrap();
        assert_eq!(ilike.evaluate(&row).unwrap(), ScalarValue::Boolean(true));
        let dots = Expression::like(*column("name"), *literal("M.rs"), false, false).unwrap();
        assert_eq!(dots.evaluate(&row).unwrap(), ScalarValue::Boolean(false));
    }

    #[test]
    fn test_in_list_and_between() {
        let row = row();
        let in_list = Expression::InList {
            expr: column("id"),
            list: vec![*literal(1), *literal(4)],
            negated: false,
        };
        assert_eq!(in_list.evaluate(&row).unwrap(), ScalarValue::Boolean(true));
        let not_in_with_null = Expression::InList {
            expr: column("id"),
            list: vec![*literal(1), Expression::Literal(ScalarValue::Null)],
            negated: true,
        };
        assert_eq!(not_in_with_null.evaluate(&row).unwrap(), ScalarValue::Null);
        let between = Expression::Between {
            expr: column("id"),
            low: literal(4),
            high: literal(4.5),
            negated: false,
        };
        assert_eq!(between.evaluate(&row).unwrap(), ScalarValue::Boolean(true));
    }

    #[test]
    fn test_arithmetic() {
        let row = row();
        let sum = binary(column("id"), BinaryOperator::Plus, literal(1));
        assert_eq!(sum.evaluate(&row).unwrap(), ScalarValue::Integer(5));
        let ratio = binary(column("id"), BinaryOperator::Divide, literal(8));
        assert_eq!(ratio.evaluate(&row).unwrap(), ScalarValue::Float(0.5));
        let by_zero = binary(column("id"), BinaryOperator::Divide, literal(0));
        assert_eq!(by_zero.evaluate(&row).unwrap(), ScalarValue::Null);
        let concat = binary(column("name"), BinaryOperator::Concat, literal("!"));
        assert_eq!(concat.evaluate(&row).unwrap(), ScalarValue::from("Mars!"));
        let overflow = binary(literal(i64::MAX), BinaryOperator::Plus, literal(1));
        assert!(overflow.evaluate(&row).is_err());
    }

    #[test]
    fn test_incomparable_types() {
        let row = row();
        let invalid = binary(column("name"), BinaryOperator::Eq, literal(1));
        assert!(matches!(invalid.evaluate(&row), Err(QueryError::Sql(_))));
    }

    #[test]
    fn test_timestamp_comparison_with_string() {
        let value = ScalarValue::Timestamp(
            quarry_common::spec::parse_timestamp("2022-02-01").unwrap(),
        );
        let ordering = compare(&value, &ScalarValue::from("2022-01-01T00:00:00Z")).unwrap();
        assert_eq!(ordering, Some(Ordering::Greater));
    }
}
