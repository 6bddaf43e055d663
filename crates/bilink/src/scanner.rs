//
// scanner.rs
//
// Text grammar: turns raw document text into definition candidates and
// resolved references. All constructs are single-line; columns are 1-based
// UTF-16 code units.
//
// Bracket spans `[[...]]` classify on their first inner character:
//   `@` explicit reference by name, `#` explicit reference by id,
//   `!` escaped reference, anything else a definition.
// Outside bracket spans, occurrences of known names/aliases are implicit
// references.
//

use std::sync::OnceLock;

use regex::Regex;
use tower_lsp::lsp_types::Url;

use crate::convert::{utf16_col, utf16_len};
use crate::index::{
    EscapedReference, Fragment, FragmentRange, GlobalIndex, Position, RefKind, Reference,
    ScanError,
};

fn bracket_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[\[([^\[\]\n]+)\]\]").unwrap())
}

/// A syntactic definition candidate. Uniqueness is not checked here; the
/// global index enforces it at publish time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefCandidate {
    pub name: String,
    pub alias: Vec<String>,
    pub id: String,
    pub fragment: Fragment,
}

#[derive(Debug, Default)]
pub struct CollectedRefs {
    pub refs: Vec<Reference>,
    pub escaped: Vec<EscapedReference>,
}

/// Default id for a definition without an explicit one.
fn slug(name: &str) -> String {
    name.to_lowercase().replace(' ', "-")
}

fn fragment_at(line_text: &str, line: u32, byte_start: usize, content: &str) -> Fragment {
    let start_col = utf16_col(line_text, byte_start);
    Fragment {
        content: content.to_string(),
        range: FragmentRange {
            start: Position {
                line,
                column: start_col,
            },
            end: Position {
                line,
                column: start_col + utf16_len(content),
            },
        },
    }
}

/// Collect definition candidates in document order.
///
/// Inner text splits on `|`: the first segment is the name; with two or
/// more segments the last is the id and any middle segments are aliases;
/// with a single segment the id is the slug of the name.
pub fn scan_definitions(text: &str) -> Vec<DefCandidate> {
    let mut candidates = Vec::new();
    for (line_idx, line_text) in text.lines().enumerate() {
        let line = line_idx as u32 + 1;
        for m in bracket_pattern().find_iter(line_text) {
            let inner = &line_text[m.start() + 2..m.end() - 2];
            if inner.starts_with(['@', '#', '!']) {
                continue;
            }
            let segments: Vec<&str> = inner.split('|').collect();
            let name = segments[0];
            if name.is_empty() {
                continue;
            }
            let (id, alias) = if segments.len() >= 2 {
                let id = segments[segments.len() - 1];
                if id.is_empty() {
                    continue;
                }
                let alias = segments[1..segments.len() - 1]
                    .iter()
                    .filter(|a| !a.is_empty())
                    .map(|a| a.to_string())
                    .collect();
                (id.to_string(), alias)
            } else {
                (slug(name), Vec::new())
            };
            candidates.push(DefCandidate {
                name: name.to_string(),
                alias,
                id,
                fragment: fragment_at(line_text, line, m.start(), m.as_str()),
            });
        }
    }
    candidates
}

enum MentionKind {
    ExplicitName(String),
    ExplicitId(String),
    Escaped,
    Implicit { def_id: String },
}

struct Mention {
    byte_start: usize,
    content_len: usize,
    kind: MentionKind,
}

/// Collect references and escaped references for one document against the
/// current index. Back-references are recorded as each mention resolves, so
/// a `DEF_NOT_FOUND` failure leaves earlier mentions published (no
/// rollback); the caller decides what to do with its stale DocInfo.
pub fn collect_references(
    uri: &Url,
    text: &str,
    index: &mut GlobalIndex,
) -> Result<CollectedRefs, ScanError> {
    let names = index.name_entries_longest_first();
    let mut collected = CollectedRefs::default();

    for (line_idx, line_text) in text.lines().enumerate() {
        let line = line_idx as u32 + 1;
        let mut mentions: Vec<Mention> = Vec::new();
        let mut occupied: Vec<(usize, usize)> = Vec::new();

        for m in bracket_pattern().find_iter(line_text) {
            occupied.push((m.start(), m.end()));
            let inner = &line_text[m.start() + 2..m.end() - 2];
            let kind = match inner.as_bytes()[0] {
                b'@' => MentionKind::ExplicitName(inner[1..].to_string()),
                b'#' => MentionKind::ExplicitId(inner[1..].to_string()),
                b'!' => MentionKind::Escaped,
                _ => continue, // definition span, consumed but not a mention
            };
            mentions.push(Mention {
                byte_start: m.start(),
                content_len: m.end() - m.start(),
                kind,
            });
        }

        for (name, def_id) in &names {
            for (start, _) in line_text.match_indices(name.as_str()) {
                let end = start + name.len();
                if occupied.iter().any(|&(s, e)| start < e && end > s) {
                    continue;
                }
                let prev = line_text[..start].chars().next_back();
                let next = line_text[end..].chars().next();
                if prev.is_some_and(|c| c.is_alphanumeric()) {
                    continue;
                }
                if next.is_some_and(|c| c.is_alphanumeric()) {
                    continue;
                }
                occupied.push((start, end));
                mentions.push(Mention {
                    byte_start: start,
                    content_len: name.len(),
                    kind: MentionKind::Implicit {
                        def_id: def_id.clone(),
                    },
                });
            }
        }

        mentions.sort_by_key(|m| m.byte_start);

        for mention in mentions {
            let content = &line_text[mention.byte_start..mention.byte_start + mention.content_len];
            let fragment = fragment_at(line_text, line, mention.byte_start, content);
            match mention.kind {
                MentionKind::ExplicitName(name) => {
                    let def_id = match index.def_by_name(&name) {
                        Some(def) => def.id.clone(),
                        None => {
                            return Err(ScanError::DefNotFound {
                                position: fragment.range.start,
                                name: Some(name),
                                id: None,
                            })
                        }
                    };
                    index.record_ref(&def_id, uri, fragment.clone());
                    collected.refs.push(Reference {
                        kind: RefKind::Explicit,
                        fragment,
                        uri: uri.clone(),
                        def_id,
                    });
                }
                MentionKind::ExplicitId(id) => {
                    if index.def_by_id(&id).is_none() {
                        return Err(ScanError::DefNotFound {
                            position: fragment.range.start,
                            name: None,
                            id: Some(id),
                        });
                    }
                    index.record_ref(&id, uri, fragment.clone());
                    collected.refs.push(Reference {
                        kind: RefKind::Explicit,
                        fragment,
                        uri: uri.clone(),
                        def_id: id,
                    });
                }
                MentionKind::Escaped => {
                    collected.escaped.push(EscapedReference { fragment });
                }
                MentionKind::Implicit { def_id } => {
                    index.record_ref(&def_id, uri, fragment.clone());
                    collected.refs.push(Reference {
                        kind: RefKind::Implicit,
                        fragment,
                        uri: uri.clone(),
                        def_id,
                    });
                }
            }
        }
    }

    Ok(collected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Definition;

    fn test_uri(name: &str) -> Url {
        Url::parse(&format!("file:///{}", name)).unwrap()
    }

    fn index_with(defs: &[(&str, &str, &[&str])]) -> GlobalIndex {
        let uri = test_uri("defs.md");
        let mut index = GlobalIndex::new();
        for (line, (id, name, alias)) in defs.iter().enumerate() {
            index
                .insert(Definition {
                    id: id.to_string(),
                    name: name.to_string(),
                    alias: alias.iter().map(|s| s.to_string()).collect(),
                    uri: uri.clone(),
                    fragment: Fragment {
                        content: format!("[[{}]]", name),
                        range: FragmentRange {
                            start: Position {
                                line: line as u32 + 1,
                                column: 1,
                            },
                            end: Position {
                                line: line as u32 + 1,
                                column: 5,
                            },
                        },
                    },
                    refs: Vec::new(),
                })
                .unwrap();
        }
        index
    }

    #[test]
    fn test_scan_definitions_single_segment_slugs_id() {
        let defs = scan_definitions("intro [[Big Idea]] outro");
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "Big Idea");
        assert_eq!(defs[0].id, "big-idea");
        assert!(defs[0].alias.is_empty());
        assert_eq!(defs[0].fragment.content, "[[Big Idea]]");
        assert_eq!(defs[0].fragment.range.start, Position { line: 1, column: 7 });
        assert_eq!(defs[0].fragment.range.end, Position { line: 1, column: 19 });
    }

    #[test]
    fn test_scan_definitions_last_segment_is_id() {
        let defs = scan_definitions("^[[foo|f1]] text");
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "foo");
        assert_eq!(defs[0].id, "f1");
        assert!(defs[0].alias.is_empty());
    }

    #[test]
    fn test_scan_definitions_middle_segments_are_aliases() {
        let defs = scan_definitions("[[BiLink|bl|bilink|bl1]]");
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "BiLink");
        assert_eq!(defs[0].alias, vec!["bl", "bilink"]);
        assert_eq!(defs[0].id, "bl1");
    }

    #[test]
    fn test_scan_definitions_skips_reference_spans() {
        let defs = scan_definitions("[[@foo]] [[#f1]] [[!foo]]");
        assert!(defs.is_empty());
    }

    #[test]
    fn test_scan_definitions_multiline_positions() {
        let defs = scan_definitions("first\nsecond [[a]]\n");
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].fragment.range.start, Position { line: 2, column: 8 });
    }

    #[test]
    fn test_collect_explicit_name_reference() {
        let mut index = index_with(&[("f1", "foo", &[])]);
        let uri = test_uri("b.md");
        let collected = collect_references(&uri, "see [[@foo]]", &mut index).unwrap();

        assert_eq!(collected.refs.len(), 1);
        let r = &collected.refs[0];
        assert_eq!(r.kind, RefKind::Explicit);
        assert_eq!(r.def_id, "f1");
        assert_eq!(r.fragment.content, "[[@foo]]");
        // Back-set was recorded on the definition.
        assert_eq!(index.def_by_id("f1").unwrap().refs.len(), 1);
    }

    #[test]
    fn test_collect_explicit_id_reference() {
        let mut index = index_with(&[("f1", "foo", &[])]);
        let uri = test_uri("b.md");
        let collected = collect_references(&uri, "see [[#f1]]", &mut index).unwrap();
        assert_eq!(collected.refs[0].def_id, "f1");
    }

    #[test]
    fn test_collect_unknown_name_fails_with_position() {
        let mut index = index_with(&[("f1", "foo", &[])]);
        let uri = test_uri("b.md");
        let err = collect_references(&uri, "see [[@bar]]", &mut index).unwrap_err();
        assert_eq!(
            err,
            ScanError::DefNotFound {
                position: Position { line: 1, column: 5 },
                name: Some("bar".to_string()),
                id: None,
            }
        );
    }

    #[test]
    fn test_collect_unknown_id_fails() {
        let mut index = index_with(&[("f1", "foo", &[])]);
        let uri = test_uri("b.md");
        let err = collect_references(&uri, "[[#zzz]]", &mut index).unwrap_err();
        assert!(matches!(err, ScanError::DefNotFound { id: Some(ref id), .. } if id == "zzz"));
    }

    #[test]
    fn test_collect_escaped_never_resolves() {
        // "bar" is not defined anywhere; escaping it is still fine.
        let mut index = index_with(&[("f1", "foo", &[])]);
        let uri = test_uri("b.md");
        let collected = collect_references(&uri, "[[!bar]]", &mut index).unwrap();
        assert!(collected.refs.is_empty());
        assert_eq!(collected.escaped.len(), 1);
        assert_eq!(collected.escaped[0].fragment.content, "[[!bar]]");
    }

    #[test]
    fn test_collect_implicit_word_boundaries() {
        let mut index = index_with(&[("f1", "foo", &[])]);
        let uri = test_uri("b.md");
        let collected =
            collect_references(&uri, "foo food foo-bar (foo)", &mut index).unwrap();
        // "food" must not match; "foo-bar" and "(foo)" delimit on punctuation.
        let contents: Vec<&str> = collected.refs.iter().map(|r| r.fragment.content.as_str()).collect();
        assert_eq!(contents, vec!["foo", "foo", "foo"]);
        assert!(collected.refs.iter().all(|r| r.kind == RefKind::Implicit));
    }

    #[test]
    fn test_collect_implicit_prefers_longest_name() {
        let mut index = index_with(&[("f1", "foo", &[]), ("f2", "foo bar", &[])]);
        let uri = test_uri("b.md");
        let collected = collect_references(&uri, "foo bar", &mut index).unwrap();
        assert_eq!(collected.refs.len(), 1);
        assert_eq!(collected.refs[0].def_id, "f2");
    }

    #[test]
    fn test_collect_implicit_matches_alias() {
        let mut index = index_with(&[("f1", "foo", &["f"])]);
        let uri = test_uri("b.md");
        let collected = collect_references(&uri, "an f here", &mut index).unwrap();
        assert_eq!(collected.refs.len(), 1);
        assert_eq!(collected.refs[0].def_id, "f1");
    }

    #[test]
    fn test_collect_implicit_skips_bracket_spans() {
        let mut index = index_with(&[("f1", "foo", &[])]);
        let uri = test_uri("b.md");
        // The "foo" inside the definition span and the escaped span must not
        // double as implicit references.
        let collected = collect_references(&uri, "[[!foo]] and foo", &mut index).unwrap();
        assert_eq!(collected.refs.len(), 1);
        assert_eq!(collected.refs[0].fragment.range.start.column, 14);
    }

    #[test]
    fn test_collect_orders_mentions_by_position() {
        let mut index = index_with(&[("f1", "foo", &[])]);
        let uri = test_uri("b.md");
        let collected = collect_references(&uri, "foo then [[#f1]]\nfoo", &mut index).unwrap();
        let starts: Vec<(u32, u32)> = collected
            .refs
            .iter()
            .map(|r| (r.fragment.range.start.line, r.fragment.range.start.column))
            .collect();
        assert_eq!(starts, vec![(1, 1), (1, 10), (2, 1)]);
    }

    #[test]
    fn test_collect_partial_publish_before_failure() {
        let mut index = index_with(&[("f1", "foo", &[])]);
        let uri = test_uri("b.md");
        let err = collect_references(&uri, "foo then [[@missing]]", &mut index);
        assert!(err.is_err());
        // The implicit mention before the failure stays in the back-set.
        assert_eq!(index.def_by_id("f1").unwrap().refs.len(), 1);
    }

    #[test]
    fn test_collect_utf16_columns() {
        let mut index = index_with(&[("f1", "foo", &[])]);
        let uri = test_uri("b.md");
        let collected = collect_references(&uri, "🎉 [[@foo]]", &mut index).unwrap();
        // Emoji is two UTF-16 units, so the bracket starts at column 4.
        assert_eq!(collected.refs[0].fragment.range.start.column, 4);
        assert_eq!(collected.refs[0].fragment.range.end.column, 12);
    }
}
