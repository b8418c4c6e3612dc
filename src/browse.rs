//! Browse orchestrator (spec.md §4.7): plans, runs and incrementally
//! drains one query per open browse, cooperating with cancellation the way
//! the teacher's `mpd_client::handle_idle` races the next input line
//! against the next subsystem event instead of blocking on either alone.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use camino::Utf8Path;
use futures_concurrency::prelude::*;
use tokio::sync::watch;
use tracing::{debug, instrument};

use crate::cache::{Cache, ExternalArtProbe, Metadata, ResultShape};
use crate::collaborators::{IndexerSession, PlaylistParser};
use crate::error::{Result, SourceError};
use crate::filter::FilterNode;
use crate::objectid::{classify, decode, is_leaf, ObjectId, ServiceKind};
use crate::planner::{self, BrowsePlan};
use crate::registry::{self, HostKey, KeyRegistry};
use crate::sparql::{self, Aggregates, SelectColumn, SortDirection, SortField, SparqlBuilderState};
use crate::util::WhatItertoolsIsMissing;

/// One outstanding browse: its query result cache plus how far a caller
/// has drained it.
pub struct BrowseRequest {
    plan: BrowsePlan,
    cache: Cache,
    cursor: usize,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
}

impl BrowseRequest {
    fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }
}

pub struct BrowseOrchestrator {
    next_id: AtomicU32,
    pending: HashMap<u32, BrowseRequest>,
}

impl Default for BrowseOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

fn and(a: Option<FilterNode>, b: Option<FilterNode>) -> Option<FilterNode> {
    match (a, b) {
        (Some(a), Some(b)) => Some(FilterNode::And(vec![a, b])),
        (Some(a), None) => Some(a),
        (None, b) => b,
    }
}

fn reserved_prefix(service: ServiceKind) -> Vec<SelectColumn> {
    let uri = KeyRegistry::lookup_tracker(HostKey::Uri, service)
        .expect("uri is mapped for every service")
        .clone();
    vec![
        SelectColumn { key: HostKey::Uri, tracker: uri.clone() },
        SelectColumn { key: HostKey::Uri, tracker: uri },
    ]
}

/// Build the ordered select-column list matching the cache's physical
/// column layout, excluding the CHILDCOUNT/DURATION aggregate slots (those
/// are produced by `Aggregates`, not by an OPTIONAL-joined predicate).
fn select_columns(cache: &Cache, plan: &BrowsePlan) -> Vec<SelectColumn> {
    let mut positioned: Vec<(HostKey, usize)> = cache
        .columns()
        .into_iter()
        .filter(|(key, _)| !matches!(key, HostKey::Childcount | HostKey::Duration))
        .collect();
    positioned.sort_by_key(|(_, idx)| *idx);

    let mut columns = if cache.shape() == ResultShape::Query { reserved_prefix(plan.service) } else { Vec::new() };
    for (key, _) in positioned {
        if let Some(tracker) = KeyRegistry::lookup_tracker(key, plan.service) {
            columns.push(SelectColumn { key, tracker: tracker.clone() });
        }
    }
    columns
}

fn sort_fields(cache: &Cache, plan: &BrowsePlan, requested: &[HostKey], var_names: &[String]) -> Vec<SortField> {
    let keys = if requested.is_empty() { plan.default_sort.as_slice() } else { requested };
    let column_index = |key: HostKey| cache.columns().into_iter().find(|(k, _)| *k == key).map(|(_, i)| i);
    keys.iter()
        .filter_map(|key| column_index(*key))
        .filter_map(|idx| var_names.get(idx).cloned())
        .map(|var| SortField { var, direction: SortDirection::Ascending })
        .collect()
}

impl BrowseOrchestrator {
    pub fn new() -> Self {
        Self { next_id: AtomicU32::new(1), pending: HashMap::new() }
    }

    /// Start a browse. Builds the cache, compiles and runs the query, and
    /// registers the result set for incremental draining.
    #[instrument(skip(self, indexer))]
    pub fn browse(
        &mut self,
        object_id: &ObjectId,
        requested_keys: &[HostKey],
        filter: Option<FilterNode>,
        sort: &[HostKey],
        limit: Option<u32>,
        offset: Option<u32>,
        indexer: &mut impl IndexerSession,
    ) -> Result<u32> {
        let segments =
            decode(object_id).map_err(|_| SourceError::InvalidObjectId(object_id.clone()))?;
        let category =
            classify(&segments).map_err(|_| SourceError::InvalidObjectId(object_id.clone()))?;
        if is_leaf(&category) {
            return Err(SourceError::InvalidObjectId(object_id.clone()));
        }
        let plan = planner::plan_browse(&category).map_err(|_| SourceError::InvalidObjectId(object_id.clone()))?;

        let mut cache = Cache::new(plan.service, if plan.unique { ResultShape::Unique } else { ResultShape::Query });
        cache.add_key(HostKey::Uri, false);
        for key in requested_keys {
            cache.add_key(*key, true);
        }
        if let Some(group_by) = plan.group_by {
            cache.add_group_by_key(group_by);
        }
        if let Some(concat_key) = plan.concat_key {
            cache.add_concat_key();
            cache.add_concat_value_key(concat_key);
        }
        if let Some(count_distinct_key) = plan.count_distinct_key {
            cache.add_group_by_key(count_distinct_key);
        }

        let columns = select_columns(&cache, &plan);
        let mut state = SparqlBuilderState::new();
        let var_names: Vec<String> = columns.iter().map(|_| state.fresh_var()).collect();

        let combined_filter = and(plan.path_filter.clone(), filter);
        let condition = combined_filter
            .map(|f| crate::filter::compile(&f, plan.service, &mut state))
            .transpose()?;

        let sort = sort_fields(&cache, &plan, sort, &var_names);

        let concat_var = plan
            .concat_key
            .and(cache.concat_column())
            .and_then(|idx| var_names.get(idx).cloned());
        let count_var = plan.count_distinct_key.and_then(|key| {
            cache.columns().into_iter().find(|(k, _)| *k == key).and_then(|(_, idx)| var_names.get(idx).cloned())
        });
        let aggregates = Aggregates {
            concat_var,
            count_target: plan.count_target,
            count_var,
            sum_duration_predicate: if plan.sum_duration {
                KeyRegistry::lookup_tracker(HostKey::Duration, plan.service).map(|t| {
                    // leak is unnecessary: predicate text is already 'static
                    t.predicate_text
                })
            } else {
                None
            },
        };

        let statement = sparql::build_create(
            plan.service_class,
            &columns,
            &var_names,
            condition.as_deref(),
            &sort,
            limit,
            offset,
            plan.unique,
            &aggregates,
            &mut state,
        );

        let rows = indexer.run_select(&statement).map_err(|e| SourceError::QueryFailed {
            object_id: object_id.clone(),
            source: e,
        })?;
        cache.set_rows(rows);

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.pending.insert(id, BrowseRequest { plan, cache, cursor: 0, cancel_tx, cancel_rx });
        debug!(browse_id = id, "browse started");
        Ok(id)
    }

    /// Soft-cancel a browse: the next `next_result` call observes it and
    /// stops, but any in-flight emission already raced past the check
    /// still completes.
    pub fn cancel_browse(&mut self, browse_id: u32) -> Result<()> {
        let request = self.pending.get(&browse_id).ok_or(SourceError::UnknownBrowseId(browse_id))?;
        let _ = request.cancel_tx.send(true);
        Ok(())
    }

    /// Emit the next result, one per call, racing it against cancellation
    /// (spec.md §4.7 "per-tick cooperative emission").
    pub async fn next_result<P: ExternalArtProbe>(
        &mut self,
        browse_id: u32,
        probe: &P,
    ) -> Result<Option<Metadata>> {
        enum Outcome {
            Cancelled,
            Ready,
        }

        let request = self.pending.get_mut(&browse_id).ok_or(SourceError::UnknownBrowseId(browse_id))?;
        if request.is_cancelled() || request.cursor >= request.cache.row_count() {
            self.pending.remove(&browse_id);
            return Ok(None);
        }

        let mut cancel_rx = request.cancel_rx.clone();
        let wait_cancel = async {
            let _ = cancel_rx.changed().await;
            Outcome::Cancelled
        };
        let yield_tick = async {
            tokio::task::yield_now().await;
            Outcome::Ready
        };

        match (wait_cancel, yield_tick).race().await {
            Outcome::Cancelled => {
                self.pending.remove(&browse_id);
                Ok(None)
            }
            Outcome::Ready => {
                let request = self.pending.get_mut(&browse_id).expect("checked above");
                let row = request.cache.project_row(request.cursor, probe);
                request.cursor += 1;
                Ok(Some(row))
            }
        }
    }

    /// Aggregated metadata for a whole container (root/category nodes),
    /// summing CHILDCOUNT/DURATION across rows instead of emitting them.
    pub fn aggregate<P: ExternalArtProbe>(&self, browse_id: u32, probe: &P) -> Result<Metadata> {
        let request = self.pending.get(&browse_id).ok_or(SourceError::UnknownBrowseId(browse_id))?;
        let count_childcount = request.plan.count_target.is_some();
        Ok(request.cache.project_aggregate(count_childcount, probe))
    }
}

/// Look up a music entry's stored duration by URI, for summing into a
/// playlist's recomputed total.
pub(crate) fn lookup_duration(
    indexer: &mut impl IndexerSession,
    entry_uri: &str,
    object_id: &ObjectId,
) -> Result<Option<i64>> {
    let tracker = KeyRegistry::lookup_tracker(HostKey::Duration, ServiceKind::Music)
        .expect("duration is mapped for music")
        .clone();
    let columns = vec![SelectColumn { key: HostKey::Duration, tracker }];
    let mut state = SparqlBuilderState::new();
    let statement = sparql::build_meta(planner::MUSIC_CLASS, &columns, &[entry_uri.to_string()], &mut state);
    let rows = indexer
        .run_select(&statement)
        .map_err(|source| SourceError::QueryFailed { object_id: object_id.clone(), source })?;
    Ok(rows.into_iter().next().and_then(|row| row.first().and_then(|v| v.parse::<i64>().ok())))
}

/// Look up a playlist's memoised `(duration, valid-duration)` pair (spec.md
/// §4.7 "valid-duration"). Missing/unset fields read as `(0, false)`, the
/// same "needs recompute" state as a playlist that has never been summed.
pub(crate) fn lookup_valid_duration(
    indexer: &mut impl IndexerSession,
    uri: &str,
    object_id: &ObjectId,
) -> Result<(i64, bool)> {
    let duration_tracker = KeyRegistry::lookup_tracker(HostKey::Duration, ServiceKind::Playlists)
        .expect("duration is mapped for playlists")
        .clone();
    let valid_tracker = registry::valid_duration_tracker();
    let columns = vec![
        SelectColumn { key: HostKey::Duration, tracker: duration_tracker },
        SelectColumn { key: HostKey::Duration, tracker: valid_tracker },
    ];
    let mut state = SparqlBuilderState::new();
    let statement = sparql::build_meta(planner::PLAYLIST_CLASS, &columns, &[uri.to_string()], &mut state);
    let rows = indexer
        .run_select(&statement)
        .map_err(|source| SourceError::QueryFailed { object_id: object_id.clone(), source })?;
    let row = rows.into_iter().next().unwrap_or_default();
    let duration = row.first().and_then(|v| v.parse::<i64>().ok()).unwrap_or(0);
    let valid = row.get(1).map(|v| v == "true" || v == "1").unwrap_or(false);
    Ok((duration, valid))
}

fn write_playlist_duration(
    indexer: &mut impl IndexerSession,
    uri: &str,
    duration: i64,
    object_id: &ObjectId,
) -> Result<()> {
    let duration_tracker = KeyRegistry::lookup_tracker(HostKey::Duration, ServiceKind::Playlists)
        .expect("duration is mapped for playlists")
        .clone();
    let valid_tracker = registry::valid_duration_tracker();
    let sets = vec![(duration_tracker, duration.to_string()), (valid_tracker, "true".to_string())];
    let statement = sparql::build_update(planner::PLAYLIST_CLASS, uri, &sets);
    indexer
        .run_update(&statement)
        .map_err(|source| SourceError::QueryFailed { object_id: object_id.clone(), source })
}

/// Recompute and memoise a playlist's DURATION by summing the duration of
/// every local entry it references (spec.md §4.7 "playlist duration
/// recomputation"). Remote entries cannot be browsed into and are skipped.
/// `uri` is the playlist's own `nie:url`, used to memoise the result;
/// `path` is the filesystem path `parser` reads to enumerate entries.
pub async fn recompute_playlist_duration(
    object_id: &ObjectId,
    path: &Utf8Path,
    uri: &str,
    parser: &impl PlaylistParser,
    indexer: &mut impl IndexerSession,
) -> Result<i64> {
    let entries = parser.parse(path).map_err(|source| SourceError::PlaylistParseFailed {
        path: path.to_owned(),
        source,
    })?;
    let mut total = 0i64;
    for entry in entries.enumerate_ok() {
        let (index, entry) = entry.map_err(|source| SourceError::PlaylistParseFailed {
            path: path.to_owned(),
            source,
        })?;
        if !entry.is_remote
            && let Some(duration) = lookup_duration(indexer, &entry.uri, object_id)?
        {
            debug!(entry_index = index, duration, "playlist entry duration");
            total += duration;
        }
        tokio::task::yield_now().await;
    }
    write_playlist_duration(indexer, uri, total, object_id)?;
    Ok(total)
}
