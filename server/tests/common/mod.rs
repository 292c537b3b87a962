//! Shared helpers for the integration tests.

#![allow(dead_code)]

use pakhuis_engine::{IndexedField, JsonPointer};
use pakhuis_server::clock::ManualClock;
use pakhuis_server::store::{Store, StoreOptions};
use std::sync::Arc;
use tempfile::TempDir;

/// A store on a throwaway database with a hand-driven clock.
pub struct Node {
    pub store: Store,
    pub clock: Arc<ManualClock>,
    pub dir: TempDir,
}

impl Node {
    pub async fn open(node_id: &str, fields: Vec<IndexedField>, peers: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(1_000));
        let store = Store::open_with_clock(options(&dir, node_id, fields, peers), clock.clone())
            .await
            .unwrap();
        Self { store, clock, dir }
    }

    /// Close and reopen the same database file.
    pub async fn reopen(self, fields: Vec<IndexedField>, peers: &[&str]) -> Self {
        let node_id = self.store.node_id().to_string();
        self.store.close().await;
        let store = Store::open_with_clock(
            options(&self.dir, &node_id, fields, peers),
            self.clock.clone(),
        )
        .await
        .unwrap();
        Self { store, ..self }
    }
}

fn options(dir: &TempDir, node_id: &str, fields: Vec<IndexedField>, peers: &[&str]) -> StoreOptions {
    StoreOptions {
        node_id: node_id.to_string(),
        storage_path: dir.path().join(format!("{}.db", node_id)),
        indexed_fields: fields,
        peers: peers.iter().map(|p| p.to_string()).collect(),
    }
}

pub fn ptr(s: &str) -> JsonPointer {
    JsonPointer::parse(s).unwrap()
}

pub fn eq(path: &str) -> IndexedField {
    IndexedField::eq(ptr(path))
}

pub fn in_list(path: &str) -> IndexedField {
    IndexedField::in_list(ptr(path))
}
