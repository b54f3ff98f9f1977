use std::fmt;

use quarry_common::config::{SourceKind, INTERNAL_RELATION_PREFIX};

/// The family of connector that serves a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    Internal,
    ObjectStore,
    BlobStore,
    DocumentStore,
    CacheBacked,
}

impl From<SourceKind> for RelationKind {
    fn from(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Disk | SourceKind::S3 | SourceKind::Gcs => RelationKind::ObjectStore,
            SourceKind::Azure => RelationKind::BlobStore,
            SourceKind::MongoDb => RelationKind::DocumentStore,
            SourceKind::Redis => RelationKind::CacheBacked,
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelationKind::Internal => "internal",
            RelationKind::ObjectStore => "object store",
            RelationKind::BlobStore => "blob store",
            RelationKind::DocumentStore => "document store",
            RelationKind::CacheBacked => "cache",
        };
        write!(f, "{name}")
    }
}

/// A resolved relation name.
///
/// For object and blob stores `namespace` is the bucket or container and `path`
/// is the object prefix inside it. For document stores `path` is the collection,
/// and for cache-backed relations it is the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationReference {
    pub name: String,
    pub kind: RelationKind,
    pub source: Option<SourceKind>,
    pub namespace: Option<String>,
    pub path: String,
}

impl RelationReference {
    pub fn internal(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_lowercase(),
            kind: RelationKind::Internal,
            source: None,
            namespace: None,
            path: String::new(),
        }
    }

    pub fn external(
        name: impl Into<String>,
        source: SourceKind,
        namespace: Option<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: source.into(),
            source: Some(source),
            namespace,
            path: path.into(),
        }
    }

    pub fn is_internal(&self) -> bool {
        self.kind == RelationKind::Internal
    }

    pub fn is_internal_name(name: &str) -> bool {
        name.starts_with(INTERNAL_RELATION_PREFIX)
    }
}

impl fmt::Display for RelationReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source {
            Some(source) => write!(f, "{} ({source})", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}
