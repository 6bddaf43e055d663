//
// scan.rs
//
// Scan orchestrator: purge a document's prior contributions, re-derive its
// definitions, then its references against the current index. Definitions
// are collected before references within one call because references may
// target definitions anywhere in the workspace, including ones just
// re-added.
//

use tower_lsp::lsp_types::{Diagnostic, Url};

use crate::diagnostics;
use crate::index::{Definition, ScanError};
use crate::scanner;
use crate::state::WorldState;

/// Full scan of one document. Best-effort: a failure aborts the half it
/// occurred in, and whatever was already published to the index stays
/// published. The next correcting edit self-heals.
pub fn scan(state: &mut WorldState, uri: &Url) -> Result<(), ScanError> {
    let Some(text) = state.document_store.text(uri) else {
        return Ok(());
    };
    state.index.purge(uri);
    state.docs.entry(uri.clone()).or_default();

    collect_definitions(state, uri, &text)?;
    collect_references(state, uri, &text)?;
    Ok(())
}

/// Definitions half. The caller must have purged `uri` already. The
/// DocInfo definition list is only overwritten on success.
pub fn collect_definitions(state: &mut WorldState, uri: &Url, text: &str) -> Result<(), ScanError> {
    let mut defs = Vec::new();
    for candidate in scanner::scan_definitions(text) {
        let def = Definition {
            id: candidate.id,
            name: candidate.name,
            alias: candidate.alias,
            uri: uri.clone(),
            fragment: candidate.fragment,
            refs: Vec::new(),
        };
        state.index.insert(def.clone())?;
        defs.push(def);
    }
    log::trace!("collected {} defs from {}", defs.len(), uri);

    let info = state.docs.entry(uri.clone()).or_default();
    info.defs = defs;
    Ok(())
}

/// References half. The DocInfo reference lists are only overwritten on
/// success; back-set entries recorded before a failure remain published.
pub fn collect_references(state: &mut WorldState, uri: &Url, text: &str) -> Result<(), ScanError> {
    let collected = scanner::collect_references(uri, text, &mut state.index)?;
    log::trace!(
        "collected {} refs and {} escaped refs from {}",
        collected.refs.len(),
        collected.escaped.len(),
        uri
    );

    let info = state.docs.entry(uri.clone()).or_default();
    info.refs = collected.refs;
    info.escaped = collected.escaped;
    Ok(())
}

/// Workspace bootstrap over pre-loaded file contents, in two full passes:
/// pass one populates every document's definitions, pass two resolves
/// references. A single combined pass would spuriously fail on references
/// to definitions that live in a file scanned later.
///
/// Returns the diagnostics to publish, one entry per file.
pub fn bootstrap(
    state: &mut WorldState,
    files: &[(Url, String)],
) -> Vec<(Url, Vec<Diagnostic>)> {
    for (uri, text) in files {
        state.document_store.open(uri.clone(), text, None);
    }

    let mut errors: Vec<(Url, Option<ScanError>)> = Vec::with_capacity(files.len());

    for (uri, text) in files {
        state.index.purge(uri);
        state.docs.entry(uri.clone()).or_default();
        let result = collect_definitions(state, uri, text);
        errors.push((uri.clone(), result.err()));
    }

    for (i, (uri, text)) in files.iter().enumerate() {
        let result = collect_references(state, uri, text);
        // A definition error from pass one is the one that aborted first;
        // it wins over a reference error.
        if errors[i].1.is_none() {
            errors[i].1 = result.err();
        }
    }

    log::info!(
        "bootstrap scanned {} files, {} definitions indexed",
        files.len(),
        state.index.len()
    );

    errors
        .into_iter()
        .map(|(uri, err)| {
            let diags = match err {
                Some(e) => vec![diagnostics::scan_error_to_diagnostic(
                    &e,
                    &state.workspace_folders,
                )],
                None => Vec::new(),
            };
            (uri, diags)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Position, RefKind};

    fn test_uri(name: &str) -> Url {
        Url::parse(&format!("file:///ws/{}", name)).unwrap()
    }

    fn open(state: &mut WorldState, name: &str, text: &str) -> Url {
        let uri = test_uri(name);
        state.document_store.open(uri.clone(), text, None);
        uri
    }

    #[test]
    fn test_end_to_end_two_documents() {
        let mut state = WorldState::new();
        let a = open(&mut state, "a.md", "^[[foo|f1]] text");
        let b = open(&mut state, "b.md", "see [[@foo]]");

        scan(&mut state, &a).unwrap();
        scan(&mut state, &b).unwrap();

        let b_info = &state.docs[&b];
        assert_eq!(b_info.refs.len(), 1);
        assert_eq!(b_info.refs[0].kind, RefKind::Explicit);
        assert_eq!(b_info.refs[0].def_id, "f1");

        let def = state.index.def_by_id("f1").unwrap();
        assert_eq!(def.uri, a);
        assert_eq!(def.refs.len(), 1);
        assert_eq!(def.refs[0].uri, b);
    }

    #[test]
    fn test_scan_is_idempotent() {
        let mut state = WorldState::new();
        let uri = open(&mut state, "a.md", "[[foo|f1]] and foo again");

        scan(&mut state, &uri).unwrap();
        let defs_first = state.index.def_contents_for(&uri);
        let refs_first = state.docs[&uri].refs.clone();

        scan(&mut state, &uri).unwrap();
        assert_eq!(state.index.def_contents_for(&uri), defs_first);
        assert_eq!(state.docs[&uri].refs, refs_first);
        assert_eq!(state.index.len(), 1);
    }

    #[test]
    fn test_rescan_purges_prior_contributions() {
        let mut state = WorldState::new();
        let uri = open(&mut state, "a.md", "[[foo|f1]]");
        scan(&mut state, &uri).unwrap();
        assert!(state.index.def_by_id("f1").is_some());

        state.document_store.open(uri.clone(), "[[bar|b1]]", None);
        scan(&mut state, &uri).unwrap();

        assert!(state.index.def_by_id("f1").is_none());
        assert!(state.index.def_by_name("foo").is_none());
        assert_eq!(state.index.def_by_id("b1").unwrap().name, "bar");
    }

    #[test]
    fn test_duplicate_definition_aborts_with_partial_publish() {
        let mut state = WorldState::new();
        let uri = open(&mut state, "a.md", "[[foo|f1]] [[bar|f1]] [[baz|z1]]");

        let err = scan(&mut state, &uri).unwrap_err();
        assert!(matches!(err, ScanError::DuplicateId { ref id, .. } if id == "f1"));

        // The first claimant was published before the failure; collection
        // stopped there, so baz never landed.
        assert!(state.index.def_by_id("f1").is_some());
        assert!(state.index.def_by_id("z1").is_none());
        // DocInfo defs were not overwritten.
        assert!(state.docs[&uri].defs.is_empty());
    }

    #[test]
    fn test_failed_ref_collection_leaves_doc_refs_unchanged() {
        let mut state = WorldState::new();
        let a = open(&mut state, "a.md", "[[foo|f1]]");
        let b = open(&mut state, "b.md", "see [[@foo]]");
        scan(&mut state, &a).unwrap();
        scan(&mut state, &b).unwrap();
        let refs_before = state.docs[&b].refs.clone();

        state
            .document_store
            .open(b.clone(), "see [[@foo]] and [[@gone]]", None);
        let err = scan(&mut state, &b).unwrap_err();
        assert!(matches!(err, ScanError::DefNotFound { .. }));
        assert_eq!(state.docs[&b].refs, refs_before);
    }

    #[test]
    fn test_scan_unknown_uri_is_noop() {
        let mut state = WorldState::new();
        let uri = test_uri("ghost.md");
        assert!(scan(&mut state, &uri).is_ok());
        assert!(state.docs.is_empty());
    }

    #[test]
    fn test_bootstrap_resolves_forward_references() {
        // b.md references a definition that lives in a file listed after
        // it; a single pass would spuriously fail.
        let mut state = WorldState::new();
        let files = vec![
            (test_uri("b.md"), "see [[@foo]]".to_string()),
            (test_uri("a.md"), "[[foo|f1]]".to_string()),
        ];

        let published = bootstrap(&mut state, &files);

        assert!(published.iter().all(|(_, diags)| diags.is_empty()));
        assert_eq!(state.docs[&test_uri("b.md")].refs[0].def_id, "f1");
    }

    #[test]
    fn test_bootstrap_reports_dangling_reference() {
        let mut state = WorldState::new();
        let files = vec![(test_uri("b.md"), "see [[@ghost]]".to_string())];

        let published = bootstrap(&mut state, &files);

        assert_eq!(published.len(), 1);
        assert_eq!(published[0].1.len(), 1);
        assert!(published[0].1[0]
            .message
            .contains("Definition not found: name=`ghost`"));
    }

    #[test]
    fn test_bootstrap_definition_error_wins() {
        let mut state = WorldState::new();
        let files = vec![
            (test_uri("a.md"), "[[foo|f1]]".to_string()),
            (
                test_uri("b.md"),
                "[[foo|f2]] and [[@ghost]]".to_string(),
            ),
        ];

        let published = bootstrap(&mut state, &files);
        let b_diags = &published
            .iter()
            .find(|(uri, _)| *uri == test_uri("b.md"))
            .unwrap()
            .1;
        assert_eq!(b_diags.len(), 1);
        assert!(b_diags[0].message.contains("Duplicate definition name"));
    }

    #[test]
    fn test_def_not_found_position() {
        let mut state = WorldState::new();
        let uri = open(&mut state, "a.md", "see [[@ghost]]");
        let err = scan(&mut state, &uri).unwrap_err();
        assert_eq!(err.position(), Position { line: 1, column: 5 });
    }
}
