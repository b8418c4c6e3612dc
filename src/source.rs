//! Top-level adapter (spec.md §1/§4): wires the registry, planner, cache,
//! browse orchestrator and metadata/destroy operations together behind the
//! collaborator traits a host implementation supplies.

use std::collections::HashMap;

use camino::Utf8Path;
use tracing::instrument;

use crate::browse::BrowseOrchestrator;
use crate::cache::{ExternalArtProbe, Metadata};
use crate::collaborators::{IndexerSession, PlaylistParser};
use crate::error::Result;
use crate::filter::FilterNode;
use crate::metadata;
use crate::objectid::ObjectId;
use crate::registry::{HostKey, KeyRegistry};
use crate::signals::{Signal, SignalHub};

/// The media-library source adapter. Generic over the three out-of-scope
/// collaborators (spec.md §1) so a host can plug in its own indexer
/// connection, thumbnail prober and playlist parser without this crate
/// depending on their concrete types.
pub struct TrackerSource<I, P, L>
where
    I: IndexerSession,
    P: ExternalArtProbe,
    L: PlaylistParser,
{
    indexer: I,
    probe: P,
    playlist_parser: L,
    browses: BrowseOrchestrator,
    signals: SignalHub,
}

impl<I, P, L> TrackerSource<I, P, L>
where
    I: IndexerSession,
    P: ExternalArtProbe,
    L: PlaylistParser,
{
    pub fn new(indexer: I, probe: P, playlist_parser: L) -> Self {
        Self { indexer, probe, playlist_parser, browses: BrowseOrchestrator::new(), signals: SignalHub::new() }
    }

    /// Subscribe to container-changed/metadata-changed notifications.
    pub fn subscribe(&self) -> tokio::sync::mpsc::Receiver<Signal> {
        self.signals.subscribe()
    }

    /// The full set of host-facing keys this source understands (spec.md
    /// §4.7 step 3, "all known keys" sentinel).
    pub fn all_keys(&self) -> Vec<HostKey> {
        KeyRegistry::all_keys()
    }

    #[instrument(skip(self))]
    pub fn browse(
        &mut self,
        object_id: &ObjectId,
        requested_keys: &[HostKey],
        filter: Option<FilterNode>,
        sort: &[HostKey],
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<u32> {
        self.browses.browse(object_id, requested_keys, filter, sort, limit, offset, &mut self.indexer)
    }

    pub fn cancel_browse(&mut self, browse_id: u32) -> Result<()> {
        self.browses.cancel_browse(browse_id)
    }

    pub async fn next_result(&mut self, browse_id: u32) -> Result<Option<Metadata>> {
        self.browses.next_result(browse_id, &self.probe).await
    }

    pub fn browse_aggregate(&self, browse_id: u32) -> Result<Metadata> {
        self.browses.aggregate(browse_id, &self.probe)
    }

    pub async fn get_metadata(&mut self, object_id: &ObjectId, requested_keys: &[HostKey]) -> Result<Metadata> {
        metadata::get_metadata(object_id, requested_keys, &mut self.indexer, &self.probe, &self.playlist_parser).await
    }

    pub async fn get_metadatas(
        &mut self,
        object_ids: &[ObjectId],
        requested_keys: &[HostKey],
    ) -> Result<HashMap<ObjectId, Metadata>> {
        metadata::get_metadatas(object_ids, requested_keys, &mut self.indexer, &self.probe, &self.playlist_parser)
            .await
    }

    /// Write back `values`, signalling `metadata_changed` only when a write
    /// actually executed — a set containing only unsupported/read-only keys
    /// must not fire the signal (spec.md §4.8).
    pub fn set_metadata(&mut self, object_id: &ObjectId, values: &Metadata) -> Result<()> {
        use crate::error::SourceError;

        match metadata::set_metadata(object_id, values, &mut self.indexer) {
            Ok(updated) => {
                if updated {
                    self.signals.metadata_changed(object_id.clone());
                }
                Ok(())
            }
            Err(SourceError::UnsupportedMetadataKey { keys, updated }) => {
                if updated {
                    self.signals.metadata_changed(object_id.clone());
                }
                Err(SourceError::UnsupportedMetadataKey { keys, updated })
            }
            Err(other) => Err(other),
        }
    }

    pub fn destroy(&mut self, object_id: &ObjectId) -> Result<()> {
        metadata::destroy(object_id, &mut self.indexer)?;
        self.signals.container_changed(object_id.clone());
        Ok(())
    }

    /// Recompute and memoise a playlist's DURATION (spec.md §4.7).
    pub async fn recompute_playlist_duration(
        &mut self,
        object_id: &ObjectId,
        path: &Utf8Path,
        uri: &str,
    ) -> Result<i64> {
        crate::browse::recompute_playlist_duration(object_id, path, uri, &self.playlist_parser, &mut self.indexer)
            .await
    }
}
