mod connection;
mod cursor;
pub mod error;
mod expression;
mod resolver;
mod result_set;
mod statement;
mod statistics;

pub use connection::{connect, Connection};
pub use cursor::{Cursor, CursorState};
pub use error::{QueryError, QueryResult};
pub use resolver::RelationResolver;
pub use statistics::QueryStatistics;
