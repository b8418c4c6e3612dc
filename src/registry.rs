//! Key-mapping registry (spec.md §4.2): a static, read-only-after-init
//! dictionary relating host metadata keys to indexer predicates, value
//! types, writability, dependencies and special-case tags.
//!
//! Modeled as a lazily-initialised static the way the teacher's
//! `mpd_protocol::Tag`/`Command` tables are const/strum-driven, but built
//! once behind a [`std::sync::OnceLock`] since the mapping here also needs
//! `HashMap` lookups keyed by [`HostKey`] and by [`ServiceKind`].

use std::collections::HashMap;
use std::sync::OnceLock;

use strum::{EnumIter, IntoEnumIterator};

use crate::objectid::ServiceKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum HostKey {
    Uri,
    Title,
    Artist,
    AlbumArtist,
    Album,
    Genre,
    TrackNumber,
    Mime,
    Duration,
    Childcount,
    LastPlayed,
    PlayCount,
    PausedThumbnailUri,
    PausedPosition,
    AlbumArtUri,
    AlbumArtSmallUri,
    AlbumArtMediumUri,
    AlbumArtLargeUri,
    ThumbnailSmallUri,
    ThumbnailMediumUri,
    ThumbnailLargeUri,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    Int,
    Long,
    Float,
    Double,
    Boolean,
    Date,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Special {
    None,
    Title,
    Mime,
    Duration,
    Uri,
    Childcount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Normal,
    AlbumArt,
    Thumbnail,
}

/// A universal attribute record, one per [`HostKey`] regardless of service.
#[derive(Debug, Clone, Copy)]
pub struct MetadataKey {
    pub value_type: ValueType,
    pub writable: bool,
    pub allowed_empty: bool,
    pub special: Special,
    pub kind: Kind,
    pub depends_on: Option<HostKey>,
}

/// A per-service SPARQL predicate mapping.
#[derive(Debug, Clone)]
pub struct TrackerKey {
    pub predicate_text: &'static str,
    pub value_type: ValueType,
}

struct Tables {
    meta: HashMap<HostKey, MetadataKey>,
    music: HashMap<HostKey, TrackerKey>,
    videos: HashMap<HostKey, TrackerKey>,
    playlists: HashMap<HostKey, TrackerKey>,
    common: HashMap<HostKey, TrackerKey>,
}

fn meta(
    value_type: ValueType,
    writable: bool,
    allowed_empty: bool,
    special: Special,
    kind: Kind,
    depends_on: Option<HostKey>,
) -> MetadataKey {
    MetadataKey { value_type, writable, allowed_empty, special, kind, depends_on }
}

fn build_meta_table() -> HashMap<HostKey, MetadataKey> {
    use HostKey::*;
    use Kind::*;
    use ValueType::*;

    let mut m = HashMap::new();
    m.insert(Uri, meta(String, false, false, Special::Uri, Normal, None));
    m.insert(Title, meta(String, false, false, Special::Title, Normal, None));
    m.insert(Artist, meta(String, false, false, Special::None, Normal, None));
    m.insert(AlbumArtist, meta(String, false, false, Special::None, Normal, None));
    m.insert(Album, meta(String, false, false, Special::None, Normal, None));
    m.insert(Genre, meta(String, false, false, Special::None, Normal, None));
    m.insert(TrackNumber, meta(Int, false, false, Special::None, Normal, None));
    m.insert(Mime, meta(String, false, true, Special::Mime, Normal, None));
    m.insert(Duration, meta(Long, false, true, Special::Duration, Normal, None));
    m.insert(Childcount, meta(Int, false, true, Special::Childcount, Normal, None));
    m.insert(LastPlayed, meta(Date, true, true, Special::None, Normal, None));
    m.insert(PlayCount, meta(Int, true, true, Special::None, Normal, None));
    m.insert(PausedThumbnailUri, meta(String, true, true, Special::None, Normal, None));
    m.insert(PausedPosition, meta(Long, true, true, Special::None, Normal, None));
    m.insert(AlbumArtUri, meta(String, false, false, Special::None, Normal, Some(Album)));
    m.insert(AlbumArtSmallUri, meta(String, false, false, Special::None, Kind::AlbumArt, Some(AlbumArtUri)));
    m.insert(AlbumArtMediumUri, meta(String, false, false, Special::None, Kind::AlbumArt, Some(AlbumArtUri)));
    m.insert(AlbumArtLargeUri, meta(String, false, false, Special::None, Kind::AlbumArt, Some(AlbumArtUri)));
    m.insert(ThumbnailSmallUri, meta(String, false, false, Special::None, Kind::Thumbnail, Some(Uri)));
    m.insert(ThumbnailMediumUri, meta(String, false, false, Special::None, Kind::Thumbnail, Some(Uri)));
    m.insert(ThumbnailLargeUri, meta(String, false, false, Special::None, Kind::Thumbnail, Some(Uri)));
    m
}

fn build_music_table() -> HashMap<HostKey, TrackerKey> {
    use HostKey::*;
    use ValueType::*;
    let mut m = HashMap::new();
    m.insert(Uri, TrackerKey { predicate_text: "?o nie:url", value_type: String });
    m.insert(Title, TrackerKey { predicate_text: "?o nie:title", value_type: String });
    m.insert(Artist, TrackerKey { predicate_text: "?o nmm:performer/nmm:artistName", value_type: String });
    m.insert(AlbumArtist, TrackerKey {
        predicate_text: "?o nmm:musicAlbum/nmm:albumArtist/nmm:artistName",
        value_type: String,
    });
    m.insert(Album, TrackerKey { predicate_text: "?o nmm:musicAlbum/nie:title", value_type: String });
    m.insert(Genre, TrackerKey { predicate_text: "?o nfo:genre", value_type: String });
    m.insert(TrackNumber, TrackerKey { predicate_text: "?o nmm:trackNumber", value_type: Int });
    m.insert(Duration, TrackerKey { predicate_text: "?o nfo:duration", value_type: Long });
    m.insert(LastPlayed, TrackerKey { predicate_text: "?o nie:contentAccessed", value_type: Date });
    m.insert(PlayCount, TrackerKey { predicate_text: "?o nie:usageCounter", value_type: Int });
    m
}

fn build_videos_table() -> HashMap<HostKey, TrackerKey> {
    use HostKey::*;
    use ValueType::*;
    let mut m = HashMap::new();
    m.insert(Uri, TrackerKey { predicate_text: "?o nie:url", value_type: String });
    m.insert(Title, TrackerKey { predicate_text: "?o nie:title", value_type: String });
    m.insert(Duration, TrackerKey { predicate_text: "?o nfo:duration", value_type: Long });
    m.insert(LastPlayed, TrackerKey { predicate_text: "?o nie:contentAccessed", value_type: Date });
    m.insert(PlayCount, TrackerKey { predicate_text: "?o nie:usageCounter", value_type: Int });
    m
}

fn build_playlists_table() -> HashMap<HostKey, TrackerKey> {
    use HostKey::*;
    use ValueType::*;
    let mut m = HashMap::new();
    m.insert(Uri, TrackerKey { predicate_text: "?o nie:url", value_type: String });
    m.insert(Title, TrackerKey { predicate_text: "?o nie:title", value_type: String });
    // A playlist's duration is not a per-entry scalar: it is recomputed by
    // the browse orchestrator (spec.md §4.7) and memoised under the
    // list-duration predicate, distinct from a song's own nfo:duration.
    m.insert(Duration, TrackerKey { predicate_text: "?o nfo:listDuration", value_type: Long });
    m
}

/// The private "is the memoised playlist duration still current" flag
/// (spec.md §4.7 "valid-duration"). Not a [`HostKey`] — hosts never
/// request or set it directly, so it lives outside the per-key tables.
pub fn valid_duration_tracker() -> TrackerKey {
    TrackerKey { predicate_text: "?o nfo:validDuration", value_type: ValueType::Boolean }
}

fn build_common_table() -> HashMap<HostKey, TrackerKey> {
    use HostKey::*;
    use ValueType::*;
    let mut m = HashMap::new();
    m.insert(Uri, TrackerKey { predicate_text: "?o nie:url", value_type: String });
    m.insert(Title, TrackerKey { predicate_text: "?o nie:title", value_type: String });
    m
}

fn tables() -> &'static Tables {
    static TABLES: OnceLock<Tables> = OnceLock::new();
    TABLES.get_or_init(|| Tables {
        meta: build_meta_table(),
        music: build_music_table(),
        videos: build_videos_table(),
        playlists: build_playlists_table(),
        common: build_common_table(),
    })
}

pub struct KeyRegistry;

impl KeyRegistry {
    /// Search the given service's table, falling back to [`ServiceKind::Common`].
    pub fn lookup_tracker(host_key: HostKey, service: ServiceKind) -> Option<&'static TrackerKey> {
        let t = tables();
        let primary = match service {
            ServiceKind::Music => &t.music,
            ServiceKind::Videos => &t.videos,
            ServiceKind::Playlists => &t.playlists,
            ServiceKind::Common => &t.common,
        };
        primary.get(&host_key).or_else(|| t.common.get(&host_key))
    }

    pub fn lookup_meta(host_key: HostKey) -> Option<&'static MetadataKey> {
        tables().meta.get(&host_key)
    }

    pub fn is_supported(host_key: HostKey) -> bool {
        Self::lookup_meta(host_key).is_some()
    }

    pub fn is_writable(host_key: HostKey) -> bool {
        Self::lookup_meta(host_key).is_some_and(|m| m.writable)
    }

    /// The full set of keys a caller can ask for with the host's "all known
    /// keys" sentinel (spec.md §4.7 step 3).
    pub fn all_keys() -> Vec<HostKey> {
        HostKey::iter().filter(|k| Self::is_supported(*k)).collect()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn album_art_dependency_chain() {
        let small = KeyRegistry::lookup_meta(HostKey::AlbumArtSmallUri).unwrap();
        assert_eq!(small.depends_on, Some(HostKey::AlbumArtUri));
        assert_eq!(small.kind, Kind::AlbumArt);
        let base = KeyRegistry::lookup_meta(HostKey::AlbumArtUri).unwrap();
        assert_eq!(base.depends_on, Some(HostKey::Album));
    }

    #[test]
    fn thumbnail_depends_on_uri() {
        let t = KeyRegistry::lookup_meta(HostKey::ThumbnailMediumUri).unwrap();
        assert_eq!(t.depends_on, Some(HostKey::Uri));
        assert_eq!(t.kind, Kind::Thumbnail);
    }

    #[test]
    fn writable_keys_match_spec() {
        assert!(KeyRegistry::is_writable(HostKey::LastPlayed));
        assert!(KeyRegistry::is_writable(HostKey::PlayCount));
        assert!(KeyRegistry::is_writable(HostKey::PausedThumbnailUri));
        assert!(KeyRegistry::is_writable(HostKey::PausedPosition));
        assert!(!KeyRegistry::is_writable(HostKey::Artist));
        assert!(!KeyRegistry::is_writable(HostKey::Title));
    }

    #[test]
    fn special_flags() {
        assert_eq!(KeyRegistry::lookup_meta(HostKey::Childcount).unwrap().special, Special::Childcount);
        assert_eq!(KeyRegistry::lookup_meta(HostKey::Title).unwrap().special, Special::Title);
        assert_eq!(KeyRegistry::lookup_meta(HostKey::Mime).unwrap().special, Special::Mime);
    }

    #[test]
    fn tracker_lookup_falls_back_to_common() {
        // Title is in Common and not overridden for playlists, but present
        // in the playlists table too - check a key that's only Common:
        // Uri is present everywhere; exercise fallback with a key only
        // defined on Common by removing music's override conceptually:
        // here we just check Common itself resolves.
        let key = KeyRegistry::lookup_tracker(HostKey::Uri, ServiceKind::Playlists).unwrap();
        assert_eq!(key.predicate_text, "?o nie:url");
    }

    #[test]
    fn unknown_key_in_registry_returns_none() {
        // every HostKey variant is registered; is_supported should be true
        // for all of them by construction.
        for k in HostKey::iter() {
            assert!(KeyRegistry::is_supported(k), "{k} missing from meta table");
        }
    }
}
