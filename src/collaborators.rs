//! Collaborator traits (spec.md §1 "out of scope"): the indexer session,
//! the thumbnail/album-art probe and the playlist-file parser are all
//! treated as opaque external systems this crate only calls through a
//! trait boundary, the way the teacher treats `mpd_client::MpdClient` as a
//! collaborator the player/scanner drive without knowing its wire format.

use camino::Utf8Path;

pub use crate::cache::ExternalArtProbe;
use crate::sparql::Statement;

/// A single connection/session against the semantic indexer. `run_select`
/// returns rows in column order (the builder already fixed that order);
/// `run_update` is fire-and-forget.
pub trait IndexerSession {
    fn run_select(&mut self, statement: &Statement) -> color_eyre::Result<Vec<Vec<String>>>;
    fn run_update(&mut self, statement: &Statement) -> color_eyre::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    pub uri: String,
    /// True when the entry is not a `file://` path this source can browse
    /// into directly (e.g. an `http://` stream).
    pub is_remote: bool,
}

/// Parses a playlist file into its entries one at a time, so the browse
/// orchestrator can emit results as they're read rather than waiting for
/// the whole file (spec.md §4.7 "playlist streaming-parse").
pub trait PlaylistParser {
    fn parse<'a>(
        &'a self,
        path: &Utf8Path,
    ) -> color_eyre::Result<Box<dyn Iterator<Item = color_eyre::Result<PlaylistEntry>> + 'a>>;
}
