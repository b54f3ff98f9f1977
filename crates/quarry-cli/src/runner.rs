use clap::{Parser, Subcommand};

use crate::sql::{run_sql, SqlArgs};

#[derive(Parser)]
#[command(version, name = "quarry")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Execute a SQL statement and print its rows")]
    Sql {
        #[arg(help = "The statement to execute")]
        statement: String,
        #[arg(
            long = "param",
            allow_hyphen_values = true,
            help = "A value bound to the next `?` placeholder, parsed as JSON when possible"
        )]
        params: Vec<String>,
        #[arg(
            long,
            default_value_t = 100,
            help = "The number of rows fetched from the cursor at a time"
        )]
        batch_size: usize,
        #[arg(long, help = "Print execution statistics to standard error")]
        stats: bool,
    },
}

pub fn main(args: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse_from(args);

    match cli.command {
        Command::Sql {
            statement,
            params,
            batch_size,
            stats,
        } => run_sql(SqlArgs {
            statement,
            params,
            batch_size,
            stats,
        }),
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sql_command() {
        let cli = Cli::try_parse_from([
            "quarry",
            "sql",
            "SELECT * FROM $planets WHERE id > ?",
            "--param",
            "-1",
            "--param",
            "Earth",
            "--batch-size",
            "4",
        ])
        .unwrap();
        let Command::Sql {
            statement,
            params,
            batch_size,
            stats,
        } = cli.command;
        assert_eq!(statement, "SELECT * FROM $planets WHERE id > ?");
        assert_eq!(params, vec!["-1", "Earth"]);
        assert_eq!(batch_size, 4);
        assert!(!stats);
    }
}
