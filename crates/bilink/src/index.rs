//
// index.rs
//
// Workspace-wide link index: definitions keyed by id and by name/alias.
// The index is the single source of truth for resolution; per-document
// views (DocInfo) hold ordered copies for positional queries.
//

use indexmap::IndexMap;
use tower_lsp::lsp_types::Url;

/// 1-based line/column position. Columns count UTF-16 code units so ranges
/// convert to LSP positions without re-measuring the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentRange {
    pub start: Position,
    /// End position, column-exclusive.
    pub end: Position,
}

/// A span of source text plus its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub content: String,
    pub range: FragmentRange,
}

impl Fragment {
    /// Point containment: same line, start-inclusive, end-exclusive on
    /// column. Multi-line fragments are never matched by point queries.
    pub fn contains(&self, pos: Position) -> bool {
        self.range.start.line == self.range.end.line
            && pos.line == self.range.start.line
            && self.range.start.column <= pos.column
            && pos.column < self.range.end.column
    }
}

/// A named anchor declared in exactly one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    pub id: String,
    pub name: String,
    pub alias: Vec<String>,
    pub uri: Url,
    pub fragment: Fragment,
    /// Back-set of mentions across the workspace. Rebuilt per referencing
    /// document on every scan, never maintained incrementally.
    pub refs: Vec<BackRef>,
}

/// One entry in a definition's back-set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackRef {
    pub uri: Url,
    pub fragment: Fragment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    /// A bare occurrence of a defined name or alias.
    Implicit,
    /// `[[@name]]` or `[[#id]]`.
    Explicit,
}

/// A mention that resolved to a definition. Stores the definition id, not
/// the definition itself; resolution goes through the index on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub kind: RefKind,
    pub fragment: Fragment,
    pub uri: Url,
    pub def_id: String,
}

/// `[[!name]]` — reference-like text opted out of resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscapedReference {
    pub fragment: Fragment,
}

/// Per-document partition of scan results.
///
/// Each half is only overwritten when its collection pass succeeds, so a
/// failed scan leaves the previous (now possibly stale) view in place until
/// a correcting edit lands.
#[derive(Debug, Clone, Default)]
pub struct DocInfo {
    pub defs: Vec<Definition>,
    pub refs: Vec<Reference>,
    pub escaped: Vec<EscapedReference>,
}

/// Errors raised while scanning one document. Recoverable and
/// document-scoped: converted to a diagnostic, never propagated further.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    DefNotFound {
        position: Position,
        name: Option<String>,
        id: Option<String>,
    },
    DuplicateId {
        position: Position,
        id: String,
        first_uri: Url,
        first_position: Position,
    },
    DuplicateName {
        position: Position,
        name: String,
        first_uri: Url,
        first_position: Position,
    },
}

impl ScanError {
    pub fn position(&self) -> Position {
        match self {
            ScanError::DefNotFound { position, .. }
            | ScanError::DuplicateId { position, .. }
            | ScanError::DuplicateName { position, .. } => *position,
        }
    }
}

/// The two workspace-wide maps: id -> definition and name-or-alias -> id.
///
/// One instance per workspace session, owned by `WorldState` and mutated
/// only by the scan orchestrator.
#[derive(Debug, Default)]
pub struct GlobalIndex {
    id_to_def: IndexMap<String, Definition>,
    name_to_id: IndexMap<String, String>,
}

impl GlobalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish one definition. Every id and every name/alias string maps to
    /// at most one definition workspace-wide; a second claimant is an error
    /// and nothing is inserted for it (per-definition atomicity).
    pub fn insert(&mut self, def: Definition) -> Result<(), ScanError> {
        if let Some(existing) = self.id_to_def.get(&def.id) {
            return Err(ScanError::DuplicateId {
                position: def.fragment.range.start,
                id: def.id.clone(),
                first_uri: existing.uri.clone(),
                first_position: existing.fragment.range.start,
            });
        }
        let mut keys: Vec<&str> = Vec::with_capacity(1 + def.alias.len());
        keys.push(&def.name);
        keys.extend(def.alias.iter().map(String::as_str));
        for (i, key) in keys.iter().enumerate() {
            let taken_earlier_in_def = keys[..i].contains(key);
            if taken_earlier_in_def || self.name_to_id.contains_key(*key) {
                let (first_uri, first_position) = match self.def_by_name(key) {
                    Some(first) => (first.uri.clone(), first.fragment.range.start),
                    // Collision within the definition being inserted.
                    None => (def.uri.clone(), def.fragment.range.start),
                };
                return Err(ScanError::DuplicateName {
                    position: def.fragment.range.start,
                    name: (*key).to_string(),
                    first_uri,
                    first_position,
                });
            }
        }
        for key in keys {
            self.name_to_id.insert(key.to_string(), def.id.clone());
        }
        self.id_to_def.insert(def.id.clone(), def);
        Ok(())
    }

    /// Remove every contribution attributed to `uri`: its definitions, their
    /// name/alias entries, and its mentions in other definitions' back-sets.
    pub fn purge(&mut self, uri: &Url) {
        self.id_to_def.retain(|_, def| def.uri != *uri);
        let live = &self.id_to_def;
        self.name_to_id.retain(|_, id| live.contains_key(id));
        for def in self.id_to_def.values_mut() {
            def.refs.retain(|r| r.uri != *uri);
        }
    }

    pub fn def_by_id(&self, id: &str) -> Option<&Definition> {
        self.id_to_def.get(id)
    }

    pub fn def_by_name(&self, name: &str) -> Option<&Definition> {
        self.name_to_id
            .get(name)
            .and_then(|id| self.id_to_def.get(id))
    }

    /// Append one mention to a definition's back-set.
    pub fn record_ref(&mut self, def_id: &str, uri: &Url, fragment: Fragment) {
        if let Some(def) = self.id_to_def.get_mut(def_id) {
            def.refs.push(BackRef {
                uri: uri.clone(),
                fragment,
            });
        }
    }

    /// The flat name-or-alias namespace, in insertion order. Alias entries
    /// yield the same definition as their primary name.
    pub fn names(&self) -> impl Iterator<Item = (&str, &Definition)> {
        self.name_to_id
            .iter()
            .filter_map(|(name, id)| self.id_to_def.get(id).map(|d| (name.as_str(), d)))
    }

    /// Owned (name, id) pairs for implicit-reference matching, longest name
    /// first so overlapping names cannot double-match.
    pub fn name_entries_longest_first(&self) -> Vec<(String, String)> {
        let mut entries: Vec<(String, String)> = self
            .name_to_id
            .iter()
            .map(|(name, id)| (name.clone(), id.clone()))
            .collect();
        entries.sort_by(|a, b| b.0.chars().count().cmp(&a.0.chars().count()).then(a.0.cmp(&b.0)));
        entries
    }

    /// Fragment contents of the definitions currently published for `uri`,
    /// in publish order. This is the cascade comparison key.
    pub fn def_contents_for(&self, uri: &Url) -> Vec<String> {
        self.id_to_def
            .values()
            .filter(|d| d.uri == *uri)
            .map(|d| d.fragment.content.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.id_to_def.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_def.is_empty()
    }
}
