//! Integration tests for queries over the built-in datasets.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use common::{column, strings};
use quarry_common::config::AppConfig;
use quarry_common::spec::{DataType, ScalarValue};
use quarry_session::{connect, QueryError};

const PLANETS: [&str; 9] = [
    "Mercury", "Venus", "Earth", "Mars", "Jupiter", "Saturn", "Uranus", "Neptune", "Pluto",
];

/// Reads every planet in canonical order without any backend configured.
#[test]
fn test_planets_canonical_order() {
    let connection = connect(AppConfig::default()).unwrap();
    let mut cursor = connection.cursor().unwrap();
    cursor.execute("SELECT * FROM $planets").unwrap();
    let rows = cursor.fetchmany(10).unwrap();

    assert_eq!(rows.len(), 9);
    assert_eq!(column(&rows, "name"), strings(&PLANETS));
    assert_eq!(
        column(&rows, "id"),
        (1..=9).map(ScalarValue::Integer).collect::<Vec<_>>()
    );
    let schema = cursor.schema().unwrap();
    assert_eq!(schema.len(), 20);
    assert_eq!(schema.fields()[0].name, "id");
    assert_eq!(schema.fields()[1].data_type, DataType::String);

    let statistics = cursor.statistics();
    assert_eq!(statistics.external_calls, 0);
    assert_eq!(statistics.cache_hits + statistics.cache_misses, 0);
    assert_eq!(statistics.relations_read, vec!["$planets".to_string()]);
}

/// Binds parameters positionally, including a list for `IN`.
///
/// - `id > 4` keeps the five outer planets
/// - `LIKE '%t%'` is case sensitive
/// - a filter that matches nothing keeps the full schema
#[test]
fn test_parameterized_filters() {
    let connection = connect(AppConfig::default()).unwrap();
    let mut cursor = connection.cursor().unwrap();
    let mut query = |sql: &str, parameters: Vec<ScalarValue>| {
        cursor.execute_with(sql, parameters).unwrap();
        column(&cursor.fetchall().unwrap(), "name")
    };

    let names = query("SELECT * FROM $planets WHERE id > ?", vec![4.into()]);
    assert_eq!(names, strings(&PLANETS[4..]));

    let names = query("SELECT * FROM $planets WHERE name LIKE ?", vec!["%t%".into()]);
    assert_eq!(
        names,
        strings(&["Earth", "Jupiter", "Saturn", "Neptune", "Pluto"])
    );

    let names = query(
        "SELECT * FROM $planets WHERE id > ? AND name LIKE ?",
        vec![4.into(), "%t%".into()],
    );
    assert_eq!(names, strings(&["Jupiter", "Saturn", "Neptune", "Pluto"]));

    let names = query(
        "SELECT name FROM $planets WHERE id IN ?",
        vec![ScalarValue::Json(serde_json::json!([1, 2, 3]))],
    );
    assert_eq!(names, strings(&["Mercury", "Venus", "Earth"]));

    let names = query("SELECT * FROM $planets WHERE id = ?", vec![(-1).into()]);
    assert!(names.is_empty());
    assert_eq!(cursor.schema().unwrap().len(), 20);
}

/// Each statement returns the expected number of rows and columns.
#[test]
fn test_statement_battery() {
    let statements: Vec<(&str, Vec<ScalarValue>, usize, usize)> = vec![
        ("SELECT * FROM $planets WHERE name = ?", vec!["Earth".into()], 1, 20),
        ("SELECT * FROM $planets WHERE id = ?", vec![4.into()], 1, 20),
        ("SELECT * FROM $planets WHERE name ILIKE ?", vec!["%T%".into()], 5, 20),
        ("SELECT * FROM $planets WHERE id BETWEEN ? AND ?", vec![2.into(), 4.into()], 3, 20),
        ("SELECT * FROM $planets WHERE id NOT IN (1, 2)", vec![], 7, 20),
        ("SELECT * FROM $planets WHERE surfacePressure IS NULL", vec![], 4, 20),
        ("SELECT * FROM $planets WHERE (id > ?) IS TRUE", vec![8.into()], 1, 20),
        ("SELECT * FROM $planets WHERE NOT id < 9", vec![], 1, 20),
        ("SELECT id, name FROM $planets WHERE gravity > 9.5 OR id = 1", vec![], 4, 2),
        ("SELECT * FROM $planets LIMIT 0", vec![], 0, 20),
        ("SELECT * FROM $planets OFFSET 7", vec![], 2, 20),
    ];
    let connection = connect(AppConfig::default()).unwrap();
    let mut cursor = connection.cursor().unwrap();
    for (sql, parameters, rows, columns) in statements {
        cursor.execute_with(sql, parameters).unwrap();
        assert_eq!(cursor.fetchall().unwrap().len(), rows, "{sql}");
        assert_eq!(cursor.schema().unwrap().len(), columns, "{sql}");
    }
}

#[test]
fn test_parameter_count_mismatch() {
    let connection = connect(AppConfig::default()).unwrap();
    let mut cursor = connection.cursor().unwrap();
    assert!(matches!(
        cursor.execute_with("SELECT * FROM $planets WHERE id = ?", vec![]),
        Err(QueryError::Sql(_))
    ));
    assert!(matches!(
        cursor.execute_with("SELECT * FROM $planets", vec![1.into()]),
        Err(QueryError::Sql(_))
    ));
}

/// Repeated `fetchmany` calls return the same rows as one `fetchall`.
#[test]
fn test_fetchmany_matches_fetchall() {
    let connection = connect(AppConfig::default()).unwrap();
    let mut cursor = connection.cursor().unwrap();
    for size in [1, 2, 4, 9, 20] {
        cursor.execute("SELECT id, name FROM $planets").unwrap();
        let mut batched = vec![];
        loop {
            let rows = cursor.fetchmany(size).unwrap();
            let done = rows.len() < size;
            batched.extend(rows);
            if done {
                break;
            }
        }
        cursor.execute("SELECT id, name FROM $planets").unwrap();
        assert_eq!(batched, cursor.fetchall().unwrap(), "size {size}");
    }
}

#[test]
fn test_projection_and_paging() {
    let connection = connect(AppConfig::default()).unwrap();
    let mut cursor = connection.cursor().unwrap();
    cursor
        .execute("SELECT p.name AS planet, numberOfMoons + 1 AS bodies FROM $planets AS p LIMIT 2 OFFSET 2")
        .unwrap();
    let schema = cursor.schema().unwrap().clone();
    assert_eq!(schema.field_names(), vec!["planet", "bodies"]);
    assert_eq!(schema.fields()[1].data_type, DataType::Integer);
    let rows = cursor.fetchall().unwrap();
    assert_eq!(column(&rows, "planet"), strings(&["Earth", "Mars"]));
    assert_eq!(
        column(&rows, "bodies"),
        vec![ScalarValue::Integer(2), ScalarValue::Integer(3)]
    );
    assert_eq!(cursor.rowcount(), 2);
}

/// A statement without `FROM` reads the single-row `$no_table` dataset.
#[test]
fn test_select_without_from() {
    let connection = connect(AppConfig::default()).unwrap();
    let mut cursor = connection.cursor().unwrap();
    cursor.execute("SELECT 1 + 1 AS two, 'x' || 'y' AS xy").unwrap();
    let rows = cursor.fetchall().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("two"), Some(&ScalarValue::Integer(2)));
    assert_eq!(rows[0].get("xy"), Some(&ScalarValue::from("xy")));

    cursor.execute("SELECT * FROM $no_table").unwrap();
    assert_eq!(cursor.fetchall().unwrap().len(), 1);
}

#[test]
fn test_unresolved_relations() {
    let connection = connect(AppConfig::default()).unwrap();
    let mut cursor = connection.cursor().unwrap();
    for sql in [
        "SELECT * FROM $satellites",
        "SELECT * FROM planets",
        "SELECT * FROM warehouse.events",
    ] {
        assert!(
            matches!(cursor.execute(sql), Err(QueryError::UnresolvedRelation(_))),
            "{sql}"
        );
    }
}

#[test]
fn test_unknown_column() {
    let connection = connect(AppConfig::default()).unwrap();
    let mut cursor = connection.cursor().unwrap();
    assert!(matches!(
        cursor.execute("SELECT moons FROM $planets"),
        Err(QueryError::Sql(_))
    ));
}
