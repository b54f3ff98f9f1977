mod connector;
mod decode;
mod document;
pub mod error;
mod internal;
mod key_value;
pub mod layers;
mod registry;
mod relation;
mod storage;

pub use connector::{Connector, RowStream, ScanMetrics, ScanRequest};
pub use decode::{scalar_from_json, RecordDecoder};
pub use document::DocumentStoreConnector;
pub use internal::{InternalConnector, NO_TABLE, PLANETS};
pub use key_value::KeyValueConnector;
pub use registry::{open_connector, ConnectorRegistry};
pub use relation::{RelationKind, RelationReference};
pub use storage::ObjectStoreConnector;
