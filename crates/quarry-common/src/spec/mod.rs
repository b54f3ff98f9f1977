mod data_type;
mod row;
mod scalar;
mod schema;

pub use data_type::*;
pub use row::*;
pub use scalar::*;
pub use schema::*;
