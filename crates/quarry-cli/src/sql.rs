use log::info;
use quarry_common::config::AppConfig;
use quarry_common::spec::ScalarValue;
use quarry_connector::scalar_from_json;
use quarry_session::connect;
use quarry_telemetry::telemetry::init_telemetry;

use crate::display::format_rows;

pub struct SqlArgs {
    pub statement: String,
    pub params: Vec<String>,
    pub batch_size: usize,
    pub stats: bool,
}

/// Interprets a command-line parameter as a JSON value, falling back to a plain string.
///
/// `42` binds an integer and `[1, 2]` binds a list, while `Earth` binds the string itself.
/// A quoted JSON string such as `"42"` binds the string `42`.
pub fn parse_parameter(value: &str) -> ScalarValue {
    match serde_json::from_str(value) {
        Ok(value) => scalar_from_json(value),
        Err(_) => ScalarValue::String(value.to_string()),
    }
}

pub fn run_sql(args: SqlArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_telemetry()?;
    if args.batch_size == 0 {
        return Err("batch size must be positive".into());
    }
    let config = AppConfig::load()?;
    let parameters = args.params.iter().map(|p| parse_parameter(p)).collect();

    let connection = connect(config)?;
    let mut cursor = connection.cursor()?;
    cursor.execute_with(&args.statement, parameters)?;
    let mut rows = vec![];
    loop {
        let batch = cursor.fetchmany(args.batch_size)?;
        let done = batch.len() < args.batch_size;
        rows.extend(batch);
        if done {
            break;
        }
    }
    let statistics = cursor.statistics();
    if let Some(schema) = cursor.schema() {
        println!("{}", format_rows(schema, &rows));
    }
    println!("({} row{})", rows.len(), if rows.len() == 1 { "" } else { "s" });
    if args.stats {
        eprintln!("{statistics}");
    }
    info!("{statistics}");
    connection.close()?;
    Ok(())
}
