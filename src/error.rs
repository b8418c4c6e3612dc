//! Error taxonomy surfaced across the host-facing operations (spec.md §7).
//!
//! Internal plumbing (SPARQL building, planning, projection, registry
//! lookups) keeps using `color_eyre::Result` the way the teacher's
//! `system`/`scan`/`playlist` modules do; `SourceError` is the typed
//! boundary a host callback can match on.

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::objectid::ObjectId;
use crate::registry::HostKey;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("object id is malformed: {0:?}")]
    InvalidObjectId(ObjectId),

    #[error("no pending browse with id {0}")]
    UnknownBrowseId(u32),

    /// One or more requested keys were rejected (not writable, or not
    /// mapped for the leaf's service). `updated` reports whether the
    /// surviving writable keys were still applied.
    #[error("metadata keys not supported: {keys:?} (updated = {updated})")]
    UnsupportedMetadataKey { keys: Vec<HostKey>, updated: bool },

    #[error("filter could not be compiled: {0}")]
    FilterRejected(#[from] crate::filter::FilterError),

    #[error("failed to parse playlist {path}: {source}")]
    PlaylistParseFailed {
        path: Utf8PathBuf,
        #[source]
        source: color_eyre::Report,
    },

    #[error("query failed for {object_id:?}: {source}")]
    QueryFailed {
        object_id: ObjectId,
        #[source]
        source: color_eyre::Report,
    },

    #[error("destroy failed for {object_id:?}: {source}")]
    DestroyFailed {
        object_id: ObjectId,
        #[source]
        source: color_eyre::Report,
    },

    #[error("destroy is not allowed for {0:?}")]
    DestroyNotAllowed(ObjectId),
}

pub type Result<T> = std::result::Result<T, SourceError>;
