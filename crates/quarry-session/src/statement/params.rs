use quarry_common::spec::ScalarValue;
use serde_json::Value;
use sqlparser::dialect::Dialect;
use sqlparser::tokenizer::{Token, Tokenizer};

use crate::error::{QueryError, QueryResult};

/// Tokenizes the statement and substitutes positional `?` placeholders with literals.
///
/// A JSON array parameter expands to a parenthesised list, so that `id IN ?`
/// can be bound to several values at once. Names such as `$planets` are turned
/// back into plain identifiers, since the tokenizer reads them as placeholders.
pub(super) fn bind_parameters(
    dialect: &dyn Dialect,
    sql: &str,
    parameters: &[ScalarValue],
) -> QueryResult<Vec<Token>> {
    let tokens = Tokenizer::new(dialect, sql).tokenize()?;
    let mut output = Vec::with_capacity(tokens.len());
    let provided = parameters.len();
    let mut parameters = parameters.iter();
    let mut expected = 0;
    for token in tokens {
        match token {
            Token::Placeholder(p) if p == "?" => {
                expected += 1;
                let Some(value) = parameters.next() else {
                    continue;
                };
                output.extend(parameter_tokens(value)?);
            }
            Token::Placeholder(p) if is_dollar_identifier(&p) => {
                output.push(Token::make_word(&p, None));
            }
            Token::Placeholder(p) => {
                return Err(QueryError::unsupported(format!("placeholder `{p}`")));
            }
            other => output.push(other),
        }
    }
    if provided != expected {
        return Err(QueryError::sql(format!(
            "statement has {expected} parameter placeholder(s) but {provided} value(s) were provided"
        )));
    }
    Ok(output)
}

fn is_dollar_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    chars.next() == Some('$') && chars.next().is_some_and(|c| c.is_alphabetic() || c == '_')
}

fn parameter_tokens(value: &ScalarValue) -> QueryResult<Vec<Token>> {
    match value {
        ScalarValue::Json(Value::Array(items)) => {
            if items.is_empty() {
                return Err(QueryError::sql("a list parameter must not be empty"));
            }
            let mut tokens = vec![Token::LParen];
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    tokens.push(Token::Comma);
                }
                let item = quarry_connector::scalar_from_json(item.clone());
                if matches!(item, ScalarValue::Json(_)) {
                    return Err(QueryError::sql("a list parameter must contain scalar values"));
                }
                tokens.extend(parameter_tokens(&item)?);
            }
            tokens.push(Token::RParen);
            Ok(tokens)
        }
        other => scalar_tokens(other),
    }
}

fn scalar_tokens(value: &ScalarValue) -> QueryResult<Vec<Token>> {
    let tokens = match value {
        ScalarValue::Null => vec![Token::make_keyword("NULL")],
        ScalarValue::Boolean(true) => vec![Token::make_keyword("TRUE")],
        ScalarValue::Boolean(false) => vec![Token::make_keyword("FALSE")],
        ScalarValue::Integer(v) => number_tokens(v.unsigned_abs().to_string(), *v < 0),
        ScalarValue::Float(v) => {
            if !v.is_finite() {
                return Err(QueryError::sql(format!("cannot bind non-finite number {v}")));
            }
            number_tokens(format!("{:?}", v.abs()), v.is_sign_negative() && *v != 0.0)
        }
        ScalarValue::String(v) => vec![Token::SingleQuotedString(v.clone())],
        ScalarValue::Timestamp(_) | ScalarValue::Json(_) => {
            vec![Token::SingleQuotedString(value.to_string())]
        }
    };
    Ok(tokens)
}

fn number_tokens(digits: String, negative: bool) -> Vec<Token> {
    let number = Token::Number(digits, false);
    if negative {
        vec![Token::LParen, Token::Minus, number, Token::RParen]
    } else {
        vec![number]
    }
}
