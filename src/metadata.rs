//! Metadata and destroy orchestrators (spec.md §4.8): resolving one or
//! many leaf object ids to host metadata, writing back the writable
//! subset of a metadata update, and deleting clips or whole containers.

use std::collections::HashMap;

use camino::Utf8PathBuf;

use crate::cache::{Cache, ExternalArtProbe, Metadata, ResultShape, Value};
use crate::collaborators::{IndexerSession, PlaylistParser};
use crate::error::{Result, SourceError};
use crate::filter::{FilterLeaf, FilterNode};
use crate::objectid::{classify, decode, is_leaf, Category, ObjectId, ServiceKind};
use crate::planner::{MUSIC_CLASS, PLAYLIST_CLASS, VIDEO_CLASS};
use crate::registry::{HostKey, KeyRegistry};
use crate::sparql::{self, Aggregates, SelectColumn, SparqlBuilderState};

/// The filesystem path backing a `file://`-prefixed URI, for feeding a
/// playlist to [`PlaylistParser::parse`].
fn uri_to_path(uri: &str) -> Utf8PathBuf {
    Utf8PathBuf::from(uri.strip_prefix("file://").unwrap_or(uri))
}

fn service_class_for(service: ServiceKind) -> &'static str {
    match service {
        ServiceKind::Music => MUSIC_CLASS,
        ServiceKind::Videos => VIDEO_CLASS,
        ServiceKind::Playlists => PLAYLIST_CLASS,
        ServiceKind::Common => "nie:InformationElement",
    }
}

fn leaf_uri(category: &Category) -> Option<String> {
    match category {
        Category::Videos { clip } | Category::MusicSongs { clip } => clip.clone(),
        Category::MusicAlbums { clip, .. } => clip.clone(),
        Category::MusicArtists { clip, .. } => clip.clone(),
        Category::MusicGenres { clip, .. } => clip.clone(),
        Category::MusicPlaylists { playlist } => playlist.clone(),
        Category::Root | Category::Music => None,
    }
}

fn decode_category(object_id: &ObjectId) -> Result<Category> {
    let segments = decode(object_id).map_err(|_| SourceError::InvalidObjectId(object_id.clone()))?;
    classify(&segments).map_err(|_| SourceError::InvalidObjectId(object_id.clone()))
}

fn plain_columns(cache: &Cache, service: ServiceKind) -> Vec<SelectColumn> {
    let mut positioned: Vec<(HostKey, usize)> = cache.columns();
    positioned.sort_by_key(|(_, idx)| *idx);
    positioned
        .into_iter()
        .filter_map(|(key, _)| KeyRegistry::lookup_tracker(key, service).map(|t| SelectColumn { key, tracker: t.clone() }))
        .collect()
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Int(n) | Value::Long(n) => n.to_string(),
        Value::Float(f) | Value::Double(f) => f.to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Date(ts) => ts.to_string(),
    }
}

/// Resolve a single leaf object id's metadata.
pub async fn get_metadata<P: ExternalArtProbe>(
    object_id: &ObjectId,
    requested_keys: &[HostKey],
    indexer: &mut impl IndexerSession,
    probe: &P,
    playlist_parser: &impl PlaylistParser,
) -> Result<Metadata> {
    let mut results =
        get_metadatas(std::slice::from_ref(object_id), requested_keys, indexer, probe, playlist_parser).await?;
    Ok(results.remove(object_id).unwrap_or_default())
}

/// Resolve many leaf object ids at once, grouped by service so each group
/// runs a single batched `meta` query (spec.md §4.8 "per-service grouping,
/// batch meta queries, merge"). When DURATION is requested for a playlist
/// whose memoised duration is stale (zero/missing and not flagged valid),
/// recomputes and substitutes it before returning (spec.md §4.7).
pub async fn get_metadatas<P: ExternalArtProbe>(
    object_ids: &[ObjectId],
    requested_keys: &[HostKey],
    indexer: &mut impl IndexerSession,
    probe: &P,
    playlist_parser: &impl PlaylistParser,
) -> Result<HashMap<ObjectId, Metadata>> {
    struct Entry {
        id: ObjectId,
        uri: String,
        service: ServiceKind,
    }

    let mut entries = Vec::with_capacity(object_ids.len());
    for id in object_ids {
        let category = decode_category(id)?;
        if !is_leaf(&category) {
            return Err(SourceError::InvalidObjectId(id.clone()));
        }
        let uri = leaf_uri(&category).ok_or_else(|| SourceError::InvalidObjectId(id.clone()))?;
        entries.push(Entry { id: id.clone(), uri, service: category.service_kind() });
    }

    let mut by_service: HashMap<ServiceKind, Vec<&Entry>> = HashMap::new();
    for entry in &entries {
        by_service.entry(entry.service).or_default().push(entry);
    }

    let mut out = HashMap::new();
    for (service, group) in by_service {
        let mut cache = Cache::new(service, ResultShape::GetMetadata);
        for key in requested_keys {
            cache.add_key(*key, true);
        }
        let columns = plain_columns(&cache, service);

        let uris: Vec<String> = group.iter().map(|e| e.uri.clone()).collect();
        let mut state = SparqlBuilderState::new();
        let statement = sparql::build_meta(service_class_for(service), &columns, &uris, &mut state);
        let rows = indexer
            .run_select(&statement)
            .map_err(|source| SourceError::QueryFailed { object_id: group[0].id.clone(), source })?;

        let mut by_uri: HashMap<String, Vec<String>> = HashMap::new();
        for row in rows {
            if let Some((uri, rest)) = row.split_first() {
                by_uri.insert(uri.clone(), rest.to_vec());
            }
        }

        let ordered_rows: Vec<Vec<String>> = group
            .iter()
            .map(|e| by_uri.remove(&e.uri).unwrap_or_else(|| vec![String::new(); columns.len()]))
            .collect();
        cache.set_rows(ordered_rows);

        for (i, entry) in group.iter().enumerate() {
            out.insert(entry.id.clone(), cache.project_row(i, probe));
        }
    }

    if requested_keys.contains(&HostKey::Duration) {
        for entry in entries.iter().filter(|e| e.service == ServiceKind::Playlists) {
            let (stored, valid) = crate::browse::lookup_valid_duration(indexer, &entry.uri, &entry.id)?;
            if stored != 0 || valid {
                continue;
            }
            let path = uri_to_path(&entry.uri);
            let recomputed =
                crate::browse::recompute_playlist_duration(&entry.id, &path, &entry.uri, playlist_parser, indexer)
                    .await?;
            if let Some(metadata) = out.get_mut(&entry.id) {
                metadata.insert(HostKey::Duration, Value::Long(recomputed));
            }
        }
    }

    Ok(out)
}

/// Write back the writable subset of `values`, rejecting any read-only or
/// unsupported keys (spec.md §4.8 "writability/leaf filtering"). Returns
/// `Ok(true)` when the surviving writable keys were applied, `Ok(false)`
/// when `values` was empty to begin with, and `Err(UnsupportedMetadataKey)`
/// when any key was rejected — the `updated` field on that error still
/// reports whether the rest of the set was applied, since a set mixing
/// writable and unsupported keys still writes the writable ones.
pub fn set_metadata(object_id: &ObjectId, values: &Metadata, indexer: &mut impl IndexerSession) -> Result<bool> {
    let category = decode_category(object_id)?;
    if !is_leaf(&category) {
        return Err(SourceError::InvalidObjectId(object_id.clone()));
    }
    let uri = leaf_uri(&category).ok_or_else(|| SourceError::InvalidObjectId(object_id.clone()))?;
    let service = category.service_kind();

    let mut sets = Vec::new();
    let mut failed_keys = Vec::new();
    for (key, value) in values.iter() {
        if !KeyRegistry::is_writable(*key) {
            failed_keys.push(*key);
            continue;
        }
        match KeyRegistry::lookup_tracker(*key, service) {
            Some(tracker) => sets.push((tracker.clone(), stringify(value))),
            None => failed_keys.push(*key),
        }
    }

    let updated = if sets.is_empty() {
        false
    } else {
        let statement = sparql::build_update(service_class_for(service), &uri, &sets);
        indexer
            .run_update(&statement)
            .map_err(|source| SourceError::QueryFailed { object_id: object_id.clone(), source })?;
        true
    };

    if !failed_keys.is_empty() {
        return Err(SourceError::UnsupportedMetadataKey { keys: failed_keys, updated });
    }
    Ok(updated)
}

enum DestroyTarget {
    NotAllowed,
    Leaf(String),
    Cascade(FilterNode),
}

fn eq(key: HostKey, value: &str) -> FilterNode {
    FilterNode::Leaf(FilterLeaf::Eq { key, value: value.to_string() })
}

fn destroy_target(category: &Category) -> DestroyTarget {
    use Category::*;
    match category {
        Root | Music => DestroyTarget::NotAllowed,
        Videos { clip: Some(uri) } => DestroyTarget::Leaf(uri.clone()),
        Videos { clip: None } => DestroyTarget::NotAllowed,
        MusicSongs { clip: Some(uri) } => DestroyTarget::Leaf(uri.clone()),
        MusicSongs { clip: None } => DestroyTarget::NotAllowed,
        MusicAlbums { album: Some(_), clip: Some(uri) } => DestroyTarget::Leaf(uri.clone()),
        MusicAlbums { album: Some(album), clip: None } => {
            DestroyTarget::Cascade(eq(HostKey::Album, album))
        }
        MusicAlbums { album: None, .. } => DestroyTarget::NotAllowed,
        MusicArtists { artist: Some(artist), album: Some(album), clip: Some(uri) } => {
            let _ = (artist, album);
            DestroyTarget::Leaf(uri.clone())
        }
        MusicArtists { artist: Some(artist), album: Some(album), clip: None } => {
            DestroyTarget::Cascade(FilterNode::And(vec![eq(HostKey::Artist, artist), eq(HostKey::Album, album)]))
        }
        MusicArtists { artist: Some(artist), album: None, clip: None } => {
            DestroyTarget::Cascade(eq(HostKey::Artist, artist))
        }
        MusicArtists { artist: None, .. } => DestroyTarget::NotAllowed,
        MusicArtists { clip: Some(_), .. } => DestroyTarget::NotAllowed,
        MusicGenres { genre: Some(genre), artist: Some(artist), album: Some(album), clip: Some(uri) } => {
            let _ = (genre, artist, album);
            DestroyTarget::Leaf(uri.clone())
        }
        MusicGenres { genre: Some(genre), artist: Some(artist), album: Some(album), clip: None } => {
            DestroyTarget::Cascade(FilterNode::And(vec![
                eq(HostKey::Genre, genre),
                eq(HostKey::Artist, artist),
                eq(HostKey::Album, album),
            ]))
        }
        MusicGenres { genre: Some(genre), artist: Some(artist), album: None, clip: None } => {
            DestroyTarget::Cascade(FilterNode::And(vec![eq(HostKey::Genre, genre), eq(HostKey::Artist, artist)]))
        }
        MusicGenres { genre: Some(genre), artist: None, album: None, clip: None } => {
            DestroyTarget::Cascade(eq(HostKey::Genre, genre))
        }
        MusicGenres { genre: None, .. } => DestroyTarget::NotAllowed,
        MusicGenres { clip: Some(_), .. } => DestroyTarget::NotAllowed,
        MusicPlaylists { playlist: Some(uri) } => DestroyTarget::Leaf(uri.clone()),
        MusicPlaylists { playlist: None } => DestroyTarget::NotAllowed,
        // Every remaining field combination is structurally unreachable
        // through `classify` (e.g. an album set without its artist), but
        // the type doesn't encode that; treat it as not destroyable.
        _ => DestroyTarget::NotAllowed,
    }
}

/// Delete a clip/playlist leaf, or cascade-delete every song matching a
/// named container (album/artist/genre path). Anything else — root nodes,
/// unnamed "list all X" containers — is rejected (spec.md §4.8 "reject
/// others with DestroyNotAllowed").
pub fn destroy(object_id: &ObjectId, indexer: &mut impl IndexerSession) -> Result<()> {
    let category = decode_category(object_id)?;
    let service = category.service_kind();

    match destroy_target(&category) {
        DestroyTarget::NotAllowed => Err(SourceError::DestroyNotAllowed(object_id.clone())),
        DestroyTarget::Leaf(uri) => {
            let statement = sparql::build_destroy(service_class_for(service), &uri);
            indexer
                .run_update(&statement)
                .map_err(|source| SourceError::DestroyFailed { object_id: object_id.clone(), source })
        }
        DestroyTarget::Cascade(filter) => {
            let mut state = SparqlBuilderState::new();
            let condition = crate::filter::compile(&filter, service, &mut state)
                .map_err(|_| SourceError::DestroyNotAllowed(object_id.clone()))?;
            let uri_tracker = KeyRegistry::lookup_tracker(HostKey::Uri, service)
                .expect("uri is mapped for every service");
            let columns = vec![SelectColumn { key: HostKey::Uri, tracker: uri_tracker.clone() }];
            let var_names = vec![state.fresh_var()];
            let statement = sparql::build_create(
                service_class_for(service),
                &columns,
                &var_names,
                Some(&condition),
                &[],
                None,
                None,
                false,
                &Aggregates::default(),
                &mut state,
            );
            let rows = indexer
                .run_select(&statement)
                .map_err(|source| SourceError::QueryFailed { object_id: object_id.clone(), source })?;

            for row in rows {
                if let Some(uri) = row.first() {
                    let leaf_statement = sparql::build_destroy(service_class_for(service), uri);
                    indexer
                        .run_update(&leaf_statement)
                        .map_err(|source| SourceError::DestroyFailed { object_id: object_id.clone(), source })?;
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use camino::Utf8Path;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::cache::ExternalKind;
    use crate::collaborators::PlaylistEntry;
    use crate::objectid::encode;
    use crate::sparql::Statement;

    struct NoProbe;
    impl ExternalArtProbe for NoProbe {
        fn probe(&self, _kind: ExternalKind, _size: crate::cache::ThumbnailSize, _input: &str) -> Option<String> {
            None
        }
    }

    struct NoPlaylists;
    impl PlaylistParser for NoPlaylists {
        fn parse<'a>(
            &'a self,
            _path: &Utf8Path,
        ) -> color_eyre::Result<Box<dyn Iterator<Item = color_eyre::Result<PlaylistEntry>> + 'a>> {
            Ok(Box::new(std::iter::empty()))
        }
    }

    struct FakeIndexer {
        select_rows: Vec<Vec<String>>,
        updates: Vec<String>,
    }
    impl IndexerSession for FakeIndexer {
        fn run_select(&mut self, _statement: &Statement) -> color_eyre::Result<Vec<Vec<String>>> {
            Ok(self.select_rows.clone())
        }
        fn run_update(&mut self, statement: &Statement) -> color_eyre::Result<()> {
            self.updates.push(statement.text.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn get_metadata_on_non_leaf_is_rejected() {
        let mut indexer = FakeIndexer { select_rows: vec![], updates: vec![] };
        let id = encode(&["music".to_string(), "songs".to_string()]);
        assert!(get_metadata(&id, &[HostKey::Title], &mut indexer, &NoProbe, &NoPlaylists).await.is_err());
    }

    #[tokio::test]
    async fn get_metadata_projects_the_single_matching_row() {
        let mut indexer = FakeIndexer {
            select_rows: vec![vec!["/music/song.mp3".to_string(), "My Song".to_string()]],
            updates: vec![],
        };
        let id = encode(&["music".to_string(), "songs".to_string(), "/music/song.mp3".to_string()]);
        let metadata = get_metadata(&id, &[HostKey::Title], &mut indexer, &NoProbe, &NoPlaylists).await.unwrap();
        assert_eq!(metadata.get(&HostKey::Title), Some(&Value::String("My Song".to_string())));
    }

    #[tokio::test]
    async fn get_metadata_recomputes_a_stale_playlist_duration() {
        // No stored duration/valid-duration columns come back for either
        // lookup, and the playlist itself has no entries, so the recompute
        // sums to 0 and substitutes it for the missing stored value.
        let mut indexer = FakeIndexer {
            select_rows: vec![vec!["file:///music/mix.m3u".to_string(), String::new()]],
            updates: vec![],
        };
        let id = encode(&["music".to_string(), "playlists".to_string(), "file:///music/mix.m3u".to_string()]);
        let metadata =
            get_metadata(&id, &[HostKey::Duration], &mut indexer, &NoProbe, &NoPlaylists).await.unwrap();
        assert_eq!(metadata.get(&HostKey::Duration), Some(&Value::Long(0)));
    }

    #[test]
    fn set_metadata_rejects_non_writable_keys_without_writing() {
        let mut indexer = FakeIndexer { select_rows: vec![], updates: vec![] };
        let id = encode(&["music".to_string(), "songs".to_string(), "/music/song.mp3".to_string()]);
        let mut values = Metadata::new();
        values.insert(HostKey::Title, Value::String("New Title".to_string()));
        let err = set_metadata(&id, &values, &mut indexer).unwrap_err();
        assert!(indexer.updates.is_empty());
        assert!(matches!(
            err,
            SourceError::UnsupportedMetadataKey { keys, updated: false } if keys == vec![HostKey::Title]
        ));
    }

    #[test]
    fn set_metadata_writes_writable_keys() {
        let mut indexer = FakeIndexer { select_rows: vec![], updates: vec![] };
        let id = encode(&["music".to_string(), "songs".to_string(), "/music/song.mp3".to_string()]);
        let mut values = Metadata::new();
        values.insert(HostKey::PlayCount, Value::Int(5));
        let updated = set_metadata(&id, &values, &mut indexer).unwrap();
        assert!(updated);
        assert_eq!(indexer.updates.len(), 1);
    }

    #[test]
    fn set_metadata_writes_writable_keys_and_still_reports_unsupported_ones() {
        let mut indexer = FakeIndexer { select_rows: vec![], updates: vec![] };
        let id = encode(&["music".to_string(), "songs".to_string(), "/music/song.mp3".to_string()]);
        let mut values = Metadata::new();
        values.insert(HostKey::PlayCount, Value::Int(5));
        values.insert(HostKey::Title, Value::String("New Title".to_string()));
        let err = set_metadata(&id, &values, &mut indexer).unwrap_err();
        assert_eq!(indexer.updates.len(), 1);
        assert!(matches!(
            err,
            SourceError::UnsupportedMetadataKey { keys, updated: true } if keys == vec![HostKey::Title]
        ));
    }

    #[test]
    fn destroy_leaf_clip_deletes_it() {
        let mut indexer = FakeIndexer { select_rows: vec![], updates: vec![] };
        let id = encode(&["music".to_string(), "songs".to_string(), "/music/song.mp3".to_string()]);
        destroy(&id, &mut indexer).unwrap();
        assert_eq!(indexer.updates.len(), 1);
    }

    #[test]
    fn destroy_named_album_cascades_to_its_songs() {
        let mut indexer = FakeIndexer {
            select_rows: vec![vec!["/music/a.mp3".to_string()], vec!["/music/b.mp3".to_string()]],
            updates: vec![],
        };
        let id = encode(&["music".to_string(), "albums".to_string(), "Discovery".to_string()]);
        destroy(&id, &mut indexer).unwrap();
        assert_eq!(indexer.updates.len(), 2);
    }

    #[test]
    fn destroy_unnamed_container_is_rejected() {
        let mut indexer = FakeIndexer { select_rows: vec![], updates: vec![] };
        let id = encode(&["music".to_string(), "albums".to_string()]);
        assert!(matches!(destroy(&id, &mut indexer), Err(SourceError::DestroyNotAllowed(_))));
    }

    #[test]
    fn destroy_root_is_rejected() {
        let mut indexer = FakeIndexer { select_rows: vec![], updates: vec![] };
        let id = encode(&[]);
        assert!(matches!(destroy(&id, &mut indexer), Err(SourceError::DestroyNotAllowed(_))));
    }
}
