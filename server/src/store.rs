//! The document store: one consistency domain over SQLite and memory.
//!
//! SQLite is the source of truth for documents, the change log, sync
//! cursors, peer acknowledgements and conflict records. Live documents and
//! the search index are mirrored in memory behind one lock so reads never
//! touch the database.
//!
//! A mutation runs in three steps:
//!
//! 1. Take the per-document lock and plan the mutation against the current
//!    in-memory document
//! 2. Write the change-log entry, the document row and (for replicated
//!    writes) the cursor and conflict record in one SQLite transaction
//! 3. After commit, swap the document and its index entries in memory under
//!    a single write lock

use crate::clock::{Clock, SystemClock};
use crate::db::{self, Pool};
use crate::error::StoreError;
use crate::locks::KeyedLocks;
use futures::{Stream, TryStreamExt};
use pakhuis_engine::{
    mutation, Change, ChangeEntry, ConflictRecord, Document, DocumentId, Error as EngineError,
    IndexedField, JsonPointer, Mutation, NodeId, Outcome, Patch, Query, Reconciler, Revision,
    SearchIndex, Sequence, SyncCursor, Timestamp,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// What a store needs to open.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// This node's id
    pub node_id: NodeId,
    /// SQLite database file
    pub storage_path: PathBuf,
    /// Paths kept in the search index
    pub indexed_fields: Vec<IndexedField>,
    /// Peers whose acknowledgements bound compaction
    pub peers: Vec<NodeId>,
}

/// A page of the change log as served to a peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeBatch {
    /// The serving node
    pub node_id: NodeId,
    /// Entries in sequence order
    pub entries: Vec<ChangeEntry>,
    /// Whether entries beyond this page exist
    pub has_more: bool,
    /// Highest sequence ever assigned by the serving node
    pub last_sequence: Sequence,
}

/// What a compaction removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompactionReport {
    /// Sequence every peer has pulled through
    pub acked_through: Sequence,
    pub changes_removed: u64,
    pub tombstones_purged: u64,
}

#[derive(Debug)]
struct State {
    documents: HashMap<DocumentId, Document>,
    /// Sequence of the change that last touched each document
    sequences: HashMap<DocumentId, Sequence>,
    index: SearchIndex,
}

impl State {
    fn load(rows: Vec<(Document, Sequence)>, index: SearchIndex) -> Self {
        let mut state = State {
            documents: HashMap::with_capacity(rows.len()),
            sequences: HashMap::with_capacity(rows.len()),
            index,
        };
        for (doc, sequence) in rows {
            state.sequences.insert(doc.id.clone(), sequence);
            state.documents.insert(doc.id.clone(), doc);
        }
        state.rebuild();
        state
    }

    fn apply(&mut self, doc: Document, sequence: Sequence) {
        self.index.update(&doc);
        self.sequences.insert(doc.id.clone(), sequence);
        self.documents.insert(doc.id.clone(), doc);
    }

    /// Replace a document whose indexed content did not change.
    fn resync(&mut self, doc: Document) {
        self.documents.insert(doc.id.clone(), doc);
    }

    fn remove(&mut self, id: &str) {
        self.index.remove(id);
        self.documents.remove(id);
        self.sequences.remove(id);
    }

    /// Re-index every document in the order of its last change, which is
    /// the order incremental updates leave the buckets in.
    fn rebuild(&mut self) {
        let State {
            documents,
            sequences,
            index,
        } = self;
        let mut ordered: Vec<&Document> = documents.values().collect();
        ordered.sort_by_key(|d| (sequences.get(&d.id).copied().unwrap_or(0), d.id.as_str()));
        index.rebuild(ordered);
    }
}

struct Inner {
    node_id: NodeId,
    peers: Vec<NodeId>,
    pool: Pool,
    state: RwLock<State>,
    locks: KeyedLocks,
    /// Serializes sequence assignment across the whole store
    log: Mutex<()>,
    clock: Arc<dyn Clock>,
}

/// Handle to the store. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("node_id", &self.inner.node_id)
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Open the store with the system clock.
    pub async fn open(options: StoreOptions) -> Result<Self> {
        Self::open_with_clock(options, Arc::new(SystemClock)).await
    }

    /// Open the store: run migrations, load documents and build the index.
    pub async fn open_with_clock(options: StoreOptions, clock: Arc<dyn Clock>) -> Result<Self> {
        let pool = db::create_pool(&options.storage_path).await?;
        db::run_migrations(&pool).await?;

        let rows = db::load_documents(&pool).await?;
        let state = State::load(rows, SearchIndex::new(options.indexed_fields));

        tracing::info!(
            node_id = %options.node_id,
            documents = state.documents.len(),
            indexed = state.index.len(),
            path = %options.storage_path.display(),
            "Store opened"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                node_id: options.node_id,
                peers: options.peers,
                pool,
                state: RwLock::new(state),
                locks: KeyedLocks::new(),
                log: Mutex::new(()),
                clock,
            }),
        })
    }

    /// Flush and close the connection pool.
    pub async fn close(&self) {
        self.inner.pool.close().await;
    }

    /// This node's id.
    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    /// Current time according to the store's clock.
    pub fn now(&self) -> Timestamp {
        self.inner.clock.now()
    }

    // ------------------------------------------------------------------
    // Documents
    // ------------------------------------------------------------------

    /// Create `id`. Fails if a live document with that id exists.
    pub async fn create(&self, id: &str, body: Value) -> Result<Revision> {
        let doc_id = id.to_string();
        let m = self
            .mutate(id, move |current, now| {
                mutation::plan_create(current, doc_id, body, now)
            })
            .await?;
        Ok(m.revision())
    }

    /// Create or fully replace `id`. Returns the new revision and whether
    /// the document was created.
    pub async fn put(
        &self,
        id: &str,
        body: Value,
        expected: Option<Revision>,
    ) -> Result<(Revision, bool)> {
        let doc_id = id.to_string();
        let m = self
            .mutate(id, move |current, now| {
                mutation::plan_put(current, doc_id, body, expected, now)
            })
            .await?;
        let created = matches!(m.change.change, Change::Create { .. });
        Ok((m.revision(), created))
    }

    /// The live document `id`.
    pub fn get(&self, id: &str) -> Result<Document> {
        self.inner
            .state
            .read()
            .documents
            .get(id)
            .filter(|d| d.is_active())
            .cloned()
            .ok_or_else(|| EngineError::NotFound(id.to_string()).into())
    }

    /// Apply `patch` to `id`.
    pub async fn patch(&self, id: &str, patch: Patch, expected: Option<Revision>) -> Result<Revision> {
        let doc_id = id.to_string();
        let m = self
            .mutate(id, move |current, now| {
                mutation::plan_patch(current, &doc_id, patch, expected, now)
            })
            .await?;
        Ok(m.revision())
    }

    /// Tombstone `id`.
    pub async fn delete(&self, id: &str, expected: Option<Revision>) -> Result<Revision> {
        let doc_id = id.to_string();
        let m = self
            .mutate(id, move |current, now| {
                mutation::plan_delete(current, &doc_id, expected, now)
            })
            .await?;
        Ok(m.revision())
    }

    /// Ids of all live documents, sorted.
    pub fn list(&self) -> Vec<DocumentId> {
        let state = self.inner.state.read();
        let mut ids: Vec<DocumentId> = state
            .documents
            .values()
            .filter(|d| d.is_active())
            .map(|d| d.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Retained change-log entries for `id`, oldest first.
    pub async fn history(&self, id: &str) -> Result<Vec<ChangeEntry>> {
        let entries = db::history(&self.inner.pool, id).await?;
        if entries.is_empty() && !self.inner.state.read().documents.contains_key(id) {
            return Err(EngineError::NotFound(id.to_string()).into());
        }
        Ok(entries)
    }

    /// Plan and commit a local mutation of `id`.
    ///
    /// Runs on its own task so a caller that goes away mid-write cannot
    /// leave the database ahead of memory.
    async fn mutate<F>(&self, id: &str, plan: F) -> Result<Mutation>
    where
        F: FnOnce(Option<&Document>, Timestamp) -> pakhuis_engine::error::Result<Mutation>
            + Send
            + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let id = id.to_string();
        tokio::spawn(async move {
            let _guard = inner.locks.lock(&id).await;
            let current = inner.state.read().documents.get(&id).cloned();
            let mutation = plan(current.as_ref(), inner.clock.now())?;
            let sequence = inner.commit(&mutation).await?;
            tracing::debug!(
                document_id = %id,
                revision = mutation.revision(),
                sequence,
                op = mutation.change.change.kind().as_str(),
                "Document mutated"
            );
            Ok::<_, StoreError>(mutation)
        })
        .await?
    }

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    /// Ids of live documents matching every constraint of `query`.
    ///
    /// Hits are checked against the documents; if the index turns out to be
    /// stale it is rebuilt and the search retried.
    pub fn search(&self, query: &Query) -> Result<Vec<DocumentId>> {
        {
            let state = self.inner.state.read();
            match state
                .index
                .search_verified(query, |id| state.documents.get(id))
            {
                Err(EngineError::IndexCorruption(reason)) => {
                    tracing::warn!(%reason, "Search index corrupted, rebuilding");
                }
                other => return other.map_err(StoreError::from),
            }
        }

        let mut state = self.inner.state.write();
        state.rebuild();
        let state = &*state;
        Ok(state
            .index
            .search_verified(query, |id| state.documents.get(id))?)
    }

    /// Like [`Store::search`], returning the documents.
    pub fn search_documents(&self, query: &Query) -> Result<Vec<Document>> {
        let ids = self.search(query)?;
        let state = self.inner.state.read();
        Ok(ids
            .iter()
            .filter_map(|id| state.documents.get(id))
            .filter(|d| d.is_active())
            .cloned()
            .collect())
    }

    /// Distinct values indexed at `path`.
    pub fn values(&self, path: &JsonPointer) -> Result<Vec<Value>> {
        Ok(self.inner.state.read().index.values(path)?)
    }

    /// Rebuild the search index from the documents.
    pub fn rebuild(&self) -> usize {
        let mut state = self.inner.state.write();
        state.rebuild();
        let indexed = state.index.len();
        tracing::info!(indexed, "Search index rebuilt");
        indexed
    }

    // ------------------------------------------------------------------
    // Change log
    // ------------------------------------------------------------------

    /// Stream change-log entries after `after`, at most `limit` of them.
    pub fn read_from(
        &self,
        after: Sequence,
        limit: u32,
    ) -> impl Stream<Item = Result<ChangeEntry>> + Send + '_ {
        db::read_from(&self.inner.pool, after, limit)
    }

    /// Serve one page of the change log. When `peer` is given, the pull
    /// also acknowledges everything up to `since` on that peer's behalf.
    pub async fn changes(
        &self,
        since: Sequence,
        limit: u32,
        peer: Option<&str>,
    ) -> Result<ChangeBatch> {
        if let Some(peer) = peer {
            db::record_ack(&self.inner.pool, peer, since, self.now()).await?;
        }

        let last_sequence = db::last_sequence(&self.inner.pool).await?;
        let limit = limit.max(1);
        let mut entries: Vec<ChangeEntry> = self
            .read_from(since, limit.saturating_add(1))
            .try_collect()
            .await?;
        let has_more = entries.len() > limit as usize;
        entries.truncate(limit as usize);

        Ok(ChangeBatch {
            node_id: self.inner.node_id.clone(),
            entries,
            has_more,
            last_sequence,
        })
    }

    /// Drop change-log entries and tombstones that every configured peer
    /// has pulled and that are older than `older_than`.
    pub async fn compact(&self, older_than: Timestamp) -> Result<CompactionReport> {
        if self.inner.peers.is_empty() {
            tracing::info!("No peers configured, nothing to compact");
            return Ok(CompactionReport::default());
        }

        let _log = self.inner.log.lock().await;
        let acked_through = db::min_ack(&self.inner.pool, &self.inner.peers).await?;

        let mut tx = self.inner.pool.begin().await?;
        let changes_removed = db::compact_changes(&mut *tx, acked_through, older_than).await?;
        let purged = db::purge_tombstones(&mut *tx, acked_through, older_than).await?;
        tx.commit().await?;

        {
            let mut state = self.inner.state.write();
            for id in &purged {
                if state.documents.get(id).is_some_and(|d| !d.is_active()) {
                    state.remove(id);
                }
            }
        }

        let report = CompactionReport {
            acked_through,
            changes_removed,
            tombstones_purged: purged.len() as u64,
        };
        tracing::info!(
            acked_through,
            changes_removed,
            tombstones_purged = report.tombstones_purged,
            "Compaction finished"
        );
        Ok(report)
    }

    // ------------------------------------------------------------------
    // Replication
    // ------------------------------------------------------------------

    /// Reconcile one remote entry and persist the outcome together with the
    /// cursor advance.
    pub async fn apply_remote(&self, reconciler: &Reconciler, entry: &ChangeEntry) -> Result<Outcome> {
        let inner = Arc::clone(&self.inner);
        let reconciler = reconciler.clone();
        let entry = entry.clone();
        tokio::spawn(async move {
            let _guard = inner.locks.lock(&entry.document_id).await;

            let cursor = db::get_cursor(&inner.pool, reconciler.peer()).await?;
            if entry.sequence <= cursor.last_applied_remote_sequence {
                tracing::debug!(
                    peer = reconciler.peer(),
                    sequence = entry.sequence,
                    cursor = cursor.last_applied_remote_sequence,
                    "Replayed entry ignored"
                );
                return Ok(Outcome::AlreadyApplied);
            }

            let current = inner.state.read().documents.get(&entry.document_id).cloned();
            let outcome = reconciler.reconcile(current.as_ref(), &entry, inner.clock.now());

            inner
                .commit_remote(&outcome, reconciler.peer(), entry.sequence)
                .await?;

            match &outcome {
                Outcome::Conflict { record, .. } => tracing::warn!(
                    peer = %record.peer,
                    document_id = %record.document_id,
                    sequence = record.remote_sequence,
                    local_revision = record.local_revision,
                    remote_revision = record.remote_revision,
                    resolution = record.resolution.as_str(),
                    "Conflict resolved"
                ),
                Outcome::Apply(m) => tracing::debug!(
                    peer = reconciler.peer(),
                    document_id = %entry.document_id,
                    sequence = entry.sequence,
                    revision = m.revision(),
                    "Remote change applied"
                ),
                Outcome::InSync(doc) => tracing::debug!(
                    peer = reconciler.peer(),
                    document_id = %doc.id,
                    sequence = entry.sequence,
                    revision = doc.revision,
                    "Document in sync with peer"
                ),
                Outcome::RoundTrip | Outcome::AlreadyApplied => tracing::debug!(
                    peer = reconciler.peer(),
                    document_id = %entry.document_id,
                    sequence = entry.sequence,
                    "Remote change skipped"
                ),
            }
            Ok::<_, StoreError>(outcome)
        })
        .await?
    }

    /// The sync cursor for `peer`.
    pub async fn cursor(&self, peer: &str) -> Result<SyncCursor> {
        Ok(db::get_cursor(&self.inner.pool, peer).await?)
    }

    /// Record the end of a sync attempt against `peer`.
    pub async fn record_attempt(
        &self,
        peer: &str,
        started_at: Timestamp,
        error: Option<&str>,
    ) -> Result<()> {
        Ok(db::record_attempt(&self.inner.pool, peer, started_at, error).await?)
    }

    /// Recent conflicts, newest first.
    pub async fn conflicts(&self, document_id: Option<&str>, limit: u32) -> Result<Vec<ConflictRecord>> {
        db::list_conflicts(&self.inner.pool, document_id, limit).await
    }
}

impl Inner {
    /// Persist a local mutation, then publish it to memory. Returns the
    /// assigned sequence.
    async fn commit(&self, mutation: &Mutation) -> Result<Sequence> {
        let _log = self.log.lock().await;
        let mut tx = self.pool.begin().await?;
        let sequence = db::append_change(&mut *tx, &mutation.change).await?;
        db::upsert_document(&mut *tx, &mutation.document, sequence).await?;
        finish(tx).await?;

        self.state.write().apply(mutation.document.clone(), sequence);
        Ok(sequence)
    }

    /// Persist what reconciling one remote entry produced together with the
    /// cursor advance, then publish it to memory.
    async fn commit_remote(&self, outcome: &Outcome, peer: &str, remote_sequence: Sequence) -> Result<()> {
        let _log = self.log.lock().await;
        let mut tx = self.pool.begin().await?;

        let sequence = match outcome.mutation() {
            Some(m) => {
                let sequence = db::append_change(&mut *tx, &m.change).await?;
                db::upsert_document(&mut *tx, &m.document, sequence).await?;
                Some(sequence)
            }
            None => None,
        };
        if let Some(doc) = outcome.in_sync() {
            db::update_sync_point(&mut *tx, doc).await?;
        }
        if let Some(record) = outcome.conflict() {
            db::insert_conflict(&mut *tx, record).await?;
        }
        db::advance_cursor(&mut *tx, peer, remote_sequence).await?;
        finish(tx).await?;

        let mut state = self.state.write();
        if let (Some(m), Some(sequence)) = (outcome.mutation(), sequence) {
            state.apply(m.document.clone(), sequence);
        }
        if let Some(doc) = outcome.in_sync() {
            state.resync(doc.clone());
        }
        Ok(())
    }
}

async fn finish(tx: sqlx::Transaction<'_, sqlx::Sqlite>) -> Result<()> {
    tx.commit().await.map_err(|e| {
        tracing::error!(error = %e, "Commit failed");
        StoreError::from(e)
    })
}
