use std::collections::BTreeMap;

use quarry_common::config::SourceKind;
use quarry_connector::{InternalConnector, RelationKind, RelationReference};

use crate::error::{QueryError, QueryResult};

/// Maps relation names to the backend that serves them.
#[derive(Debug, Clone)]
pub struct RelationResolver {
    /// Lower-cased dotted prefixes.
    relations: BTreeMap<String, SourceKind>,
}

impl RelationResolver {
    pub fn new(relations: &BTreeMap<String, SourceKind>) -> Self {
        let relations = relations
            .iter()
            .map(|(k, v)| (k.to_lowercase(), *v))
            .collect();
        Self { relations }
    }

    /// Resolves a dotted relation name.
    ///
    /// Built-in datasets are matched case-insensitively. Other names select the
    /// backend of the longest configured prefix, and the remaining segments name
    /// the object prefix, collection, or key inside that backend.
    pub fn resolve(&self, name: &str) -> QueryResult<RelationReference> {
        if RelationReference::is_internal_name(name) {
            if InternalConnector::exists(name) {
                return Ok(RelationReference::internal(name));
            }
            return Err(QueryError::UnresolvedRelation(name.to_string()));
        }
        let segments = name.split('.').collect::<Vec<_>>();
        if segments.iter().any(|x| x.is_empty()) {
            return Err(QueryError::UnresolvedRelation(name.to_string()));
        }
        let (matched, source) = (1..=segments.len())
            .rev()
            .find_map(|n| {
                let prefix = segments[..n].join(".").to_lowercase();
                self.relations.get(&prefix).map(|kind| (n, *kind))
            })
            .ok_or_else(|| QueryError::UnresolvedRelation(name.to_string()))?;

        let reference = match RelationKind::from(source) {
            RelationKind::ObjectStore | RelationKind::BlobStore => RelationReference::external(
                name,
                source,
                Some(segments[0].to_string()),
                segments[1..].join("/"),
            ),
            RelationKind::DocumentStore | RelationKind::CacheBacked => {
                let remainder = segments[matched..].join(".");
                if remainder.is_empty() {
                    return Err(QueryError::UnresolvedRelation(name.to_string()));
                }
                RelationReference::external(name, source, None, remainder)
            }
            RelationKind::Internal => {
                return Err(QueryError::internal(format!(
                    "{source} cannot serve an internal relation"
                )))
            }
        };
        Ok(reference)
    }
}
