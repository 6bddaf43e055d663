//
// state.rs
//
// Global LSP state: one value per workspace session, passed to every
// component that needs it. Mutated only by the scan pipeline; query
// handlers take it by shared reference.
//

use std::collections::HashMap;

use tower_lsp::lsp_types::Url;

use crate::config::Config;
use crate::document_store::DocumentStore;
use crate::index::{DocInfo, GlobalIndex};

pub struct WorldState {
    pub document_store: DocumentStore,
    pub index: GlobalIndex,
    /// Per-document scan results for every known uri.
    pub docs: HashMap<Url, DocInfo>,
    pub workspace_folders: Vec<Url>,
    pub config: Config,
}

impl WorldState {
    pub fn new() -> Self {
        Self {
            document_store: DocumentStore::new(),
            index: GlobalIndex::new(),
            docs: HashMap::new(),
            workspace_folders: Vec::new(),
            config: Config::default(),
        }
    }

    /// Every uri the cascade sweep visits, sorted for a stable sweep order.
    pub fn known_uris(&self) -> Vec<Url> {
        let mut uris: Vec<Url> = self.docs.keys().cloned().collect();
        uris.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        uris
    }

    /// Drop every trace of a document: text, scan results, and its index
    /// contributions.
    pub fn remove_document(&mut self, uri: &Url) {
        self.document_store.close(uri);
        self.docs.remove(uri);
        self.index.purge(uri);
    }
}

impl Default for WorldState {
    fn default() -> Self {
        Self::new()
    }
}
