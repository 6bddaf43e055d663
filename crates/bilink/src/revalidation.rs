//
// revalidation.rs
//
// Cascade revalidation: when a scan changes a document's definition set,
// every other known document is re-scanned so its resolutions stay
// consistent, looping to a bounded fixpoint.
//
// Also holds the per-document debounce state for edit-triggered scans.
//

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::{Diagnostic, Url};

use crate::diagnostics;
use crate::index::ScanError;
use crate::scan;
use crate::state::WorldState;

/// Fragment contents of the definitions published for `uri`, the cascade
/// comparison key: count plus pairwise content, order-sensitive. Taken from
/// the index rather than DocInfo so a failed definition pass (purged, at
/// most a prefix republished) registers as a change.
fn snapshot_defs(state: &WorldState, uri: &Url) -> Vec<String> {
    state.index.def_contents_for(uri)
}

fn diags_for(result: &Result<(), ScanError>, state: &WorldState) -> Vec<Diagnostic> {
    match result {
        Ok(()) => Vec::new(),
        Err(e) => vec![diagnostics::scan_error_to_diagnostic(
            e,
            &state.workspace_folders,
        )],
    }
}

/// Scan `uri` and cascade the effect of any definition-set change to the
/// rest of the workspace.
///
/// Returns the diagnostics to publish, one entry per scanned uri (the last
/// scan of a uri within the cascade wins). Diagnostics are re-emitted for
/// cascade-triggered scans too, so a downstream document's stale error
/// clears itself once the upstream fix lands.
pub fn scan_with_cascade(state: &mut WorldState, uri: &Url) -> Vec<(Url, Vec<Diagnostic>)> {
    let mut published: IndexMap<Url, Vec<Diagnostic>> = IndexMap::new();
    let max_iterations = state.config.max_cascade_iterations;
    let mut iterations = 0;

    loop {
        let before = snapshot_defs(state, uri);
        let result = scan::scan(state, uri);
        published.insert(uri.clone(), diags_for(&result, state));

        if snapshot_defs(state, uri) == before {
            break;
        }

        // This document's definitions changed: re-resolve everyone else,
        // without cascading from those scans.
        log::trace!("definition set changed for {}, sweeping workspace", uri);
        let mut any_other_changed = false;
        for other in state.known_uris() {
            if other == *uri {
                continue;
            }
            let other_before = snapshot_defs(state, &other);
            let other_result = scan::scan(state, &other);
            published.insert(other.clone(), diags_for(&other_result, state));
            if snapshot_defs(state, &other) != other_before {
                any_other_changed = true;
            }
        }

        if !any_other_changed {
            break;
        }

        // Some other document's definitions moved under us; this document's
        // references may be stale again.
        iterations += 1;
        if iterations >= max_iterations {
            log::warn!(
                "cascade revalidation for {} did not settle after {} rounds; \
                 keeping last computed diagnostics",
                uri,
                max_iterations
            );
            break;
        }
    }

    published.into_iter().collect()
}

/// Sweep every known document once (non-cascading) and collect their
/// diagnostics. Used after a document close, when the closed document's
/// definitions vanish without a scan of their own.
pub fn sweep_all(state: &mut WorldState) -> Vec<(Url, Vec<Diagnostic>)> {
    let mut published = Vec::new();
    for uri in state.known_uris() {
        let result = scan::scan(state, &uri);
        let diags = diags_for(&result, state);
        published.push((uri, diags));
    }
    published
}

/// Per-document single-flight debounce timers. Scheduling a scan cancels
/// any pending one for the same uri; each document has an independent
/// timer.
#[derive(Debug, Default)]
pub struct DebounceState {
    next_generation: AtomicU64,
    pending: RwLock<HashMap<Url, (u64, CancellationToken)>>,
}

impl DebounceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the timer for a uri, cancelling any pending one.
    /// Returns the cancellation token the new task should watch and the
    /// generation it must pass back to `complete`.
    pub fn schedule(&self, uri: Url) -> (u64, CancellationToken) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let mut pending = self.pending.write().unwrap();
        if let Some((_, old_token)) = pending.insert(uri, (generation, token.clone())) {
            old_token.cancel();
        }
        (generation, token)
    }

    /// Mark the pending scan as done. A rapid successor edit replaces the
    /// entry before the superseded task reports back; only the generation
    /// that armed the current entry may remove it.
    pub fn complete(&self, uri: &Url, generation: u64) {
        let mut pending = self.pending.write().unwrap();
        if pending.get(uri).is_some_and(|(g, _)| *g == generation) {
            pending.remove(uri);
        }
    }

    /// Cancel the pending scan for a uri, if any.
    pub fn cancel(&self, uri: &Url) {
        let mut pending = self.pending.write().unwrap();
        if let Some((_, token)) = pending.remove(uri) {
            token.cancel();
        }
    }
}
