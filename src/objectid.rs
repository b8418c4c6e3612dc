//! ObjectID codec and category router (spec.md §4.1).
//!
//! An [`ObjectId`] is the host's flat, printable handle for a node in the
//! synthetic tree. [`classify`] turns the decoded segments into the logical
//! [`Category`] tuple the rest of the crate dispatches on.

use std::fmt;

const SCHEME: &str = "localtagfs::";

/// One path segment of an [`ObjectId`], already percent-decoded.
pub type Segment = String;

/// A printable, round-trippable handle for a node in the synthetic tree.
///
/// `encode(decode(id)) == id` for every well-formed `id` (spec.md §8).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectId(String);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MalformedId {
    #[error("object id is missing the `{SCHEME}` scheme prefix")]
    MissingScheme,
    #[error("segment contains an incomplete percent-escape")]
    IncompleteEscape,
    #[error("segment contains a percent-escape that is not valid UTF-8")]
    InvalidUtf8,
}

fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphabetic()
}

/// Percent-escape a single segment using the fixed unreserved alphabet:
/// ASCII letters only. Digits and `-._~` are deliberately escaped too, so
/// that clip pathnames (which are all digits/dots/slashes once escaped)
/// round-trip unambiguously against category-name segments.
fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.as_bytes() {
        if is_unreserved(*byte) {
            out.push(*byte as char);
        } else {
            out.push('%');
            out.push_str(&format!("{byte:02X}"));
        }
    }
    out
}

fn decode_segment(segment: &str) -> Result<Segment, MalformedId> {
    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = segment
                .get(i + 1..i + 3)
                .ok_or(MalformedId::IncompleteEscape)?;
            let byte = u8::from_str_radix(hex, 16).map_err(|_| MalformedId::IncompleteEscape)?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| MalformedId::InvalidUtf8)
}

/// Join `uuid::`-style segments into an [`ObjectId`] (spec.md §3/§6).
pub fn encode(segments: &[Segment]) -> ObjectId {
    let mut out = String::from(SCHEME);
    out.push_str(&segments.iter().map(|s| encode_segment(s)).collect::<Vec<_>>().join("/"));
    ObjectId(out)
}

/// Split an [`ObjectId`] back into its decoded segments.
pub fn decode(id: &ObjectId) -> Result<Vec<Segment>, MalformedId> {
    let rest = id.0.strip_prefix(SCHEME).ok_or(MalformedId::MissingScheme)?;
    if rest.is_empty() {
        return Ok(Vec::new());
    }
    rest.split('/').map(decode_segment).collect()
}

/// Parse a raw string the host handed us straight into an [`ObjectId`] +
/// decoded segments, for the common "decode on entry" case.
pub fn parse(raw: &str) -> Result<(ObjectId, Vec<Segment>), MalformedId> {
    let id = ObjectId(raw.to_owned());
    let segments = decode(&id)?;
    Ok((id, segments))
}

/// A percent-decoded absolute pathname carried as the final, clip-bearing
/// segment of a leaf object id.
pub type ClipUri = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum ServiceKind {
    Music,
    Videos,
    Playlists,
    Common,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Category {
    Root,
    Videos {
        clip: Option<ClipUri>,
    },
    Music,
    MusicSongs {
        clip: Option<ClipUri>,
    },
    MusicAlbums {
        album: Option<String>,
        clip: Option<ClipUri>,
    },
    MusicArtists {
        artist: Option<String>,
        album: Option<String>,
        clip: Option<ClipUri>,
    },
    MusicGenres {
        genre: Option<String>,
        artist: Option<String>,
        album: Option<String>,
        clip: Option<ClipUri>,
    },
    MusicPlaylists {
        playlist: Option<ClipUri>,
    },
}

impl Category {
    pub fn service_kind(&self) -> ServiceKind {
        match self {
            Category::Root | Category::Music => ServiceKind::Common,
            Category::Videos { .. } => ServiceKind::Videos,
            Category::MusicSongs { .. }
            | Category::MusicAlbums { .. }
            | Category::MusicArtists { .. }
            | Category::MusicGenres { .. } => ServiceKind::Music,
            Category::MusicPlaylists { .. } => ServiceKind::Playlists,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CategoryError {
    #[error("object id path is unknown or has no matching branch")]
    UnknownBranch,
    #[error("object id path is deeper than this branch allows")]
    TooDeep,
}

/// Classify decoded segments into a [`Category`] (spec.md §4.1).
///
/// Category-name path tokens (`music`, `songs`, `videos`, ...) are matched
/// ASCII case-insensitively; user-supplied values (artist/album/genre names)
/// are matched byte-for-byte further down the pipeline, never here.
pub fn classify(segments: &[Segment]) -> Result<Category, CategoryError> {
    match segments {
        [] => Ok(Category::Root),
        [head] if head.eq_ignore_ascii_case("music") => Ok(Category::Music),
        [head, rest @ ..] if head.eq_ignore_ascii_case("videos") => classify_videos(rest),
        [head, second, rest @ ..] if head.eq_ignore_ascii_case("music") => {
            match second.to_ascii_lowercase().as_str() {
                "songs" => classify_songs(rest),
                "albums" => classify_albums(rest),
                "artists" => classify_artists(rest),
                "genres" => classify_genres(rest),
                "playlists" => classify_playlists(rest),
                _ => Err(CategoryError::UnknownBranch),
            }
        }
        _ => Err(CategoryError::UnknownBranch),
    }
}

fn classify_videos(rest: &[Segment]) -> Result<Category, CategoryError> {
    match rest {
        [] => Ok(Category::Videos { clip: None }),
        [clip] => Ok(Category::Videos { clip: Some(clip.clone()) }),
        _ => Err(CategoryError::TooDeep),
    }
}

fn classify_songs(rest: &[Segment]) -> Result<Category, CategoryError> {
    match rest {
        [] => Ok(Category::MusicSongs { clip: None }),
        [clip] => Ok(Category::MusicSongs { clip: Some(clip.clone()) }),
        _ => Err(CategoryError::TooDeep),
    }
}

fn classify_albums(rest: &[Segment]) -> Result<Category, CategoryError> {
    match rest {
        [] => Ok(Category::MusicAlbums { album: None, clip: None }),
        [album] => Ok(Category::MusicAlbums { album: Some(album.clone()), clip: None }),
        [album, clip] => Ok(Category::MusicAlbums {
            album: Some(album.clone()),
            clip: Some(clip.clone()),
        }),
        _ => Err(CategoryError::TooDeep),
    }
}

fn classify_artists(rest: &[Segment]) -> Result<Category, CategoryError> {
    match rest {
        [] => Ok(Category::MusicArtists { artist: None, album: None, clip: None }),
        [artist] => Ok(Category::MusicArtists {
            artist: Some(artist.clone()),
            album: None,
            clip: None,
        }),
        [artist, album] => Ok(Category::MusicArtists {
            artist: Some(artist.clone()),
            album: Some(album.clone()),
            clip: None,
        }),
        [artist, album, clip] => Ok(Category::MusicArtists {
            artist: Some(artist.clone()),
            album: Some(album.clone()),
            clip: Some(clip.clone()),
        }),
        _ => Err(CategoryError::TooDeep),
    }
}

fn classify_genres(rest: &[Segment]) -> Result<Category, CategoryError> {
    match rest {
        [] => Ok(Category::MusicGenres { genre: None, artist: None, album: None, clip: None }),
        [genre] => Ok(Category::MusicGenres {
            genre: Some(genre.clone()),
            artist: None,
            album: None,
            clip: None,
        }),
        [genre, artist] => Ok(Category::MusicGenres {
            genre: Some(genre.clone()),
            artist: Some(artist.clone()),
            album: None,
            clip: None,
        }),
        [genre, artist, album] => Ok(Category::MusicGenres {
            genre: Some(genre.clone()),
            artist: Some(artist.clone()),
            album: Some(album.clone()),
            clip: None,
        }),
        [genre, artist, album, clip] => Ok(Category::MusicGenres {
            genre: Some(genre.clone()),
            artist: Some(artist.clone()),
            album: Some(album.clone()),
            clip: Some(clip.clone()),
        }),
        _ => Err(CategoryError::TooDeep),
    }
}

fn classify_playlists(rest: &[Segment]) -> Result<Category, CategoryError> {
    match rest {
        [] => Ok(Category::MusicPlaylists { playlist: None }),
        [playlist] => Ok(Category::MusicPlaylists { playlist: Some(playlist.clone()) }),
        _ => Err(CategoryError::TooDeep),
    }
}

/// True iff the category's last segment is itself a clip/playlist URI,
/// i.e. it names a single playable/deletable leaf rather than a container.
pub fn is_leaf(category: &Category) -> bool {
    match category {
        Category::Root | Category::Music => false,
        Category::Videos { clip } | Category::MusicSongs { clip } => clip.is_some(),
        Category::MusicAlbums { clip, .. } => clip.is_some(),
        Category::MusicArtists { clip, .. } => clip.is_some(),
        Category::MusicGenres { clip, .. } => clip.is_some(),
        Category::MusicPlaylists { playlist } => playlist.is_some(),
    }
}
