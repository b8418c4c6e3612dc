//! Query planner (spec.md §4.6): maps a [`Category`] plus the keys a
//! caller asked for into a concrete query shape — the service class to
//! query, whether results group into a unique list, which aggregates to
//! fold in, and the sort/filter defaults each branch of the tree implies.
//!
//! Modeled on the teacher's category-to-command dispatch in
//! `mpd_protocol::command_parser` (one match arm per command, each
//! producing a fully-formed request) rather than a generic rules engine.

use crate::filter::{FilterLeaf, FilterNode};
use crate::objectid::{Category, ServiceKind};
use crate::registry::HostKey;
use crate::sparql::CountTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PlannerError {
    #[error("category is a leaf node and cannot be browsed")]
    NotBrowsable,
}

pub const MUSIC_CLASS: &str = "nmm:MusicPiece";
pub const VIDEO_CLASS: &str = "nmm:Video";
pub const PLAYLIST_CLASS: &str = "nmm:Playlist";

/// Everything [`crate::browse`] needs to build and run one `create`-shaped
/// SPARQL query and populate a [`crate::cache::Cache`] from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowsePlan {
    pub service: ServiceKind,
    pub service_class: &'static str,
    pub unique: bool,
    /// The key rows are grouped by, when `unique` is set.
    pub group_by: Option<HostKey>,
    /// An additional multi-valued label folded in via `GROUP_CONCAT`
    /// alongside the group-by key (e.g. concatenated album names under an
    /// artist grouping).
    pub concat_key: Option<HostKey>,
    /// The key a `CountTarget::Distinct` count is taken over (e.g. albums
    /// when counting under an artist grouping, artists when counting under
    /// a genre grouping), rather than the base row itself.
    pub count_distinct_key: Option<HostKey>,
    pub count_target: Option<CountTarget>,
    pub sum_duration: bool,
    /// Sort keys in priority order; callers fall back to these when the
    /// host didn't request an explicit sort.
    pub default_sort: Vec<HostKey>,
    /// A filter implied purely by the category path (e.g. `artist = X`
    /// when browsing `music/artists/X/albums`), ANDed with whatever
    /// filter the host supplied.
    pub path_filter: Option<FilterNode>,
}

fn eq(key: HostKey, value: &str) -> FilterNode {
    FilterNode::Leaf(FilterLeaf::Eq { key, value: value.to_string() })
}

fn and(filters: Vec<FilterNode>) -> Option<FilterNode> {
    match filters.len() {
        0 => None,
        1 => filters.into_iter().next(),
        _ => Some(FilterNode::And(filters)),
    }
}

/// Plan a query for a browsable (non-leaf) category. Leaf categories are
/// resolved by [`crate::metadata`] instead, not browsed.
pub fn plan_browse(category: &Category) -> Result<BrowsePlan, PlannerError> {
    use Category::*;
    match category {
        Root | Music => Err(PlannerError::NotBrowsable),

        Videos { clip: None } => Ok(BrowsePlan {
            service: ServiceKind::Videos,
            service_class: VIDEO_CLASS,
            unique: false,
            group_by: None,
            concat_key: None,
            count_distinct_key: None,
            count_target: None,
            sum_duration: false,
            default_sort: vec![HostKey::Title, HostKey::Uri],
            path_filter: None,
        }),
        Videos { clip: Some(_) } => Err(PlannerError::NotBrowsable),

        MusicSongs { clip: None } => Ok(songs_plan(None)),
        MusicSongs { clip: Some(_) } => Err(PlannerError::NotBrowsable),

        MusicAlbums { album: None, clip: None } => Ok(BrowsePlan {
            service: ServiceKind::Music,
            service_class: MUSIC_CLASS,
            unique: true,
            group_by: Some(HostKey::Album),
            concat_key: Some(HostKey::AlbumArtist),
            count_distinct_key: None,
            count_target: Some(CountTarget::Star),
            sum_duration: true,
            default_sort: vec![HostKey::Album],
            path_filter: None,
        }),
        MusicAlbums { album: Some(album), clip: None } => Ok(songs_plan(Some(eq(HostKey::Album, album)))),
        MusicAlbums { clip: Some(_), .. } => Err(PlannerError::NotBrowsable),

        MusicArtists { artist: None, .. } => Ok(BrowsePlan {
            service: ServiceKind::Music,
            service_class: MUSIC_CLASS,
            unique: true,
            group_by: Some(HostKey::Artist),
            concat_key: Some(HostKey::Album),
            count_distinct_key: Some(HostKey::Album),
            count_target: Some(CountTarget::Distinct),
            sum_duration: false,
            default_sort: vec![HostKey::Artist],
            path_filter: None,
        }),
        MusicArtists { artist: Some(artist), album: None, clip: None } => Ok(BrowsePlan {
            service: ServiceKind::Music,
            service_class: MUSIC_CLASS,
            unique: true,
            group_by: Some(HostKey::Album),
            concat_key: None,
            count_distinct_key: None,
            count_target: Some(CountTarget::Star),
            sum_duration: true,
            default_sort: vec![HostKey::Album],
            path_filter: Some(eq(HostKey::Artist, artist)),
        }),
        MusicArtists { artist: Some(artist), album: Some(album), clip: None } => {
            Ok(songs_plan(and(vec![eq(HostKey::Artist, artist), eq(HostKey::Album, album)])))
        }
        MusicArtists { clip: Some(_), .. } => Err(PlannerError::NotBrowsable),

        MusicGenres { genre: None, .. } => Ok(BrowsePlan {
            service: ServiceKind::Music,
            service_class: MUSIC_CLASS,
            unique: true,
            group_by: Some(HostKey::Genre),
            concat_key: Some(HostKey::Artist),
            count_distinct_key: Some(HostKey::Artist),
            count_target: Some(CountTarget::Distinct),
            sum_duration: false,
            default_sort: vec![HostKey::Genre],
            path_filter: None,
        }),
        MusicGenres { genre: Some(genre), artist: None, album: None, clip: None } => Ok(BrowsePlan {
            service: ServiceKind::Music,
            service_class: MUSIC_CLASS,
            unique: true,
            group_by: Some(HostKey::Artist),
            concat_key: Some(HostKey::Album),
            count_distinct_key: Some(HostKey::Album),
            count_target: Some(CountTarget::Distinct),
            sum_duration: false,
            default_sort: vec![HostKey::Artist],
            path_filter: Some(eq(HostKey::Genre, genre)),
        }),
        MusicGenres { genre: Some(genre), artist: Some(artist), album: None, clip: None } => Ok(BrowsePlan {
            service: ServiceKind::Music,
            service_class: MUSIC_CLASS,
            unique: true,
            group_by: Some(HostKey::Album),
            concat_key: None,
            count_distinct_key: None,
            count_target: Some(CountTarget::Star),
            sum_duration: true,
            default_sort: vec![HostKey::Album],
            path_filter: and(vec![eq(HostKey::Genre, genre), eq(HostKey::Artist, artist)]),
        }),
        MusicGenres { genre: Some(genre), artist: Some(artist), album: Some(album), clip: None } => {
            Ok(songs_plan(and(vec![
                eq(HostKey::Genre, genre),
                eq(HostKey::Artist, artist),
                eq(HostKey::Album, album),
            ])))
        }
        MusicGenres { clip: Some(_), .. } => Err(PlannerError::NotBrowsable),
        // Violates the objectid invariant that a deeper MusicGenres field
        // requires every shallower one (spec.md §40); unreachable via the
        // codec but matched here for exhaustiveness.
        MusicGenres { artist: None, album: Some(_), .. } => Err(PlannerError::NotBrowsable),

        MusicPlaylists { playlist: None } => Ok(BrowsePlan {
            service: ServiceKind::Playlists,
            service_class: PLAYLIST_CLASS,
            unique: false,
            group_by: None,
            concat_key: None,
            count_distinct_key: None,
            count_target: None,
            sum_duration: false,
            default_sort: vec![HostKey::Title],
            path_filter: None,
        }),
        MusicPlaylists { playlist: Some(_) } => Err(PlannerError::NotBrowsable),
    }
}

fn songs_plan(path_filter: Option<FilterNode>) -> BrowsePlan {
    BrowsePlan {
        service: ServiceKind::Music,
        service_class: MUSIC_CLASS,
        unique: false,
        group_by: None,
        concat_key: None,
        count_distinct_key: None,
        count_target: None,
        sum_duration: false,
        default_sort: vec![HostKey::TrackNumber, HostKey::Title],
        path_filter,
    }
}

/// The static children a Root browse fans out over (spec.md §4.6 "root
/// browse's two-parallel-then-merge" case): one aggregate lookup per
/// top-level container, merged into a single result list.
pub fn root_children() -> Vec<Category> {
    vec![Category::Videos { clip: None }, Category::Music]
}

/// The static children a `music` browse fans out over (spec.md §4.6
/// "two-sequential-then-concat" case): songs/playlists are queried against
/// one service class, albums/artists/genres against another, and the two
/// result sets are concatenated rather than merged key-by-key.
pub fn music_children() -> Vec<Category> {
    vec![
        Category::MusicSongs { clip: None },
        Category::MusicAlbums { album: None, clip: None },
        Category::MusicArtists { artist: None, album: None, clip: None },
        Category::MusicGenres { genre: None, artist: None, album: None, clip: None },
        Category::MusicPlaylists { playlist: None },
    ]
}
