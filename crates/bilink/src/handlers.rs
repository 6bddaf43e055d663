//
// handlers.rs
//
// Query engine: read-only handlers answering editor queries from the
// settled index and per-document views.
//

use tower_lsp::lsp_types::*;

use crate::convert::{fragment_to_range, lsp_to_position, uri_to_relative};
use crate::index::{Definition, Fragment, RefKind};
use crate::state::WorldState;

// ============================================================================
// Markup
// ============================================================================

fn def_info(def: &Definition, workspace_folders: &[Url]) -> String {
    let aliases = def
        .alias
        .iter()
        .map(|a| format!("'{}'", a))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "name = '{}'\nalias = [{}]\nid = '{}'\npath = '{}'\n",
        def.name,
        aliases,
        def.id,
        uri_to_relative(&def.uri, workspace_folders)
    )
}

fn def_card(def: &Definition, workspace_folders: &[Url]) -> String {
    format!("```\n{}```", def_info(def, workspace_folders))
}

fn markdown(value: String) -> HoverContents {
    HoverContents::Markup(MarkupContent {
        kind: MarkupKind::Markdown,
        value,
    })
}

// ============================================================================
// Hover
// ============================================================================

/// First fragment containing the position wins: definitions, then
/// references, then escaped references.
pub fn hover(state: &WorldState, uri: &Url, position: Position) -> Option<Hover> {
    let doc = state.docs.get(uri)?;
    let pos = lsp_to_position(position);

    for def in &doc.defs {
        if def.fragment.contains(pos) {
            return Some(Hover {
                contents: markdown(format!(
                    "{}\n\nBidirectional link definition.",
                    def_card(def, &state.workspace_folders)
                )),
                range: Some(fragment_to_range(&def.fragment)),
            });
        }
    }

    for r in &doc.refs {
        if r.fragment.contains(pos) {
            let def = state.index.def_by_id(&r.def_id)?;
            let kind = match r.kind {
                RefKind::Implicit => "_implicit_",
                RefKind::Explicit => "**explicit**",
            };
            return Some(Hover {
                contents: markdown(format!(
                    "{}\n\nBidirectional link {} reference.\n\n_[ctrl+click]_ to jump to definition.",
                    def_card(def, &state.workspace_folders),
                    kind
                )),
                range: Some(fragment_to_range(&r.fragment)),
            });
        }
    }

    for e in &doc.escaped {
        if e.fragment.contains(pos) {
            return Some(Hover {
                contents: markdown("Escaped bidirectional link reference.".to_string()),
                range: Some(fragment_to_range(&e.fragment)),
            });
        }
    }

    None
}

// ============================================================================
// Completion
// ============================================================================

/// Not prefix-filtered: one item group per entry in the flat name/alias
/// namespace. Sort keys group by name with implicit < explicit < escaped
/// within a group; the explicit item is emitted once per definition, keyed
/// to its primary name, to avoid duplicate alias variants.
pub fn completion(state: &WorldState) -> Option<CompletionResponse> {
    let mut items = Vec::new();

    for (name, def) in state.index.names() {
        let documentation = Some(Documentation::MarkupContent(MarkupContent {
            kind: MarkupKind::Markdown,
            value: def_card(def, &state.workspace_folders),
        }));
        let is_alias = name != def.name;

        items.push(CompletionItem {
            label: name.to_string(),
            kind: Some(CompletionItemKind::CLASS),
            detail: Some("implicit reference".to_string()),
            documentation: documentation.clone(),
            label_details: is_alias.then(|| CompletionItemLabelDetails {
                detail: None,
                description: Some(def.name.clone()),
            }),
            sort_text: Some(format!("{}-0", name)),
            filter_text: Some(name.to_string()),
            ..Default::default()
        });

        if !is_alias {
            items.push(CompletionItem {
                label: format!("[[#{}]]", def.id),
                kind: Some(CompletionItemKind::REFERENCE),
                detail: Some("explicit reference".to_string()),
                documentation: documentation.clone(),
                label_details: Some(CompletionItemLabelDetails {
                    detail: None,
                    description: Some(def.name.clone()),
                }),
                sort_text: Some(format!("{}-1", name)),
                filter_text: Some(name.to_string()),
                ..Default::default()
            });
        }

        items.push(CompletionItem {
            label: format!("[[!{}]]", name),
            kind: Some(CompletionItemKind::CONSTANT),
            detail: Some("escaped reference".to_string()),
            documentation,
            label_details: Some(CompletionItemLabelDetails {
                detail: None,
                description: Some(def.name.clone()),
            }),
            sort_text: Some(format!("{}-2", name)),
            filter_text: Some(name.to_string()),
            ..Default::default()
        });
    }

    Some(CompletionResponse::Array(items))
}

// ============================================================================
// Go to Definition
// ============================================================================

pub fn goto_definition(
    state: &WorldState,
    uri: &Url,
    position: Position,
) -> Option<GotoDefinitionResponse> {
    let doc = state.docs.get(uri)?;
    let pos = lsp_to_position(position);

    for r in &doc.refs {
        if r.fragment.contains(pos) {
            let def = state.index.def_by_id(&r.def_id)?;
            return Some(GotoDefinitionResponse::Scalar(Location {
                uri: def.uri.clone(),
                range: fragment_to_range(&def.fragment),
            }));
        }
    }
    None
}

// ============================================================================
// Find References
// ============================================================================

/// All back-set mentions of the definition under the cursor, across all
/// documents.
pub fn references(state: &WorldState, uri: &Url, position: Position) -> Option<Vec<Location>> {
    let doc = state.docs.get(uri)?;
    let pos = lsp_to_position(position);

    for def in &doc.defs {
        if def.fragment.contains(pos) {
            let canonical = state.index.def_by_id(&def.id)?;
            return Some(
                canonical
                    .refs
                    .iter()
                    .map(|r| Location {
                        uri: r.uri.clone(),
                        range: fragment_to_range(&r.fragment),
                    })
                    .collect(),
            );
        }
    }
    None
}

// ============================================================================
// Semantic Tokens
// ============================================================================

/// Convert absolute quintuples (line, start, length, type, modifiers) into
/// the protocol's relative-delta form, in place, scanning from the tail
/// backward: delta line, then delta start only when the line did not
/// change. The first quintuple stays absolute.
pub fn encode_semantic_tokens(mut data: Vec<u32>) -> Vec<u32> {
    let mut i = data.len();
    while i >= 10 {
        i -= 5;
        data[i] -= data[i - 5];
        if data[i] == 0 {
            data[i + 1] -= data[i - 4];
        }
    }
    data
}

/// Union of references and escaped references for the document, sorted
/// ascending by (line, column), each emitted with the single legend token
/// type and modifier.
pub fn semantic_tokens(state: &WorldState, uri: &Url) -> Option<SemanticTokens> {
    let doc = state.docs.get(uri)?;

    let mut fragments: Vec<&Fragment> = doc
        .refs
        .iter()
        .map(|r| &r.fragment)
        .chain(doc.escaped.iter().map(|e| &e.fragment))
        .collect();
    fragments.sort_by_key(|f| (f.range.start.line, f.range.start.column));

    let mut data = Vec::with_capacity(fragments.len() * 5);
    for f in fragments {
        data.push(f.range.start.line - 1);
        data.push(f.range.start.column - 1);
        data.push(f.range.end.column - f.range.start.column);
        data.push(0); // token type: index into the legend
        data.push(1); // token modifiers: bitmap of the legend
    }
    let data = encode_semantic_tokens(data);

    Some(SemanticTokens {
        result_id: None,
        data: data
            .chunks_exact(5)
            .map(|c| SemanticToken {
                delta_line: c[0],
                delta_start: c[1],
                length: c[2],
                token_type: c[3],
                token_modifiers_bitset: c[4],
            })
            .collect(),
    })
}
