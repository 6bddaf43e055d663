//
// convert.rs
//
// Conversions between the 1-based index positions and the 0-based LSP wire
// types, plus workspace-relative path rendering.
//

use tower_lsp::lsp_types::{Position as LspPosition, Range, Url};

use crate::index::{Fragment, Position};

/// LSP positions are 0-based; fragment positions are 1-based.
pub fn lsp_to_position(pos: LspPosition) -> Position {
    Position {
        line: pos.line + 1,
        column: pos.character + 1,
    }
}

/// Fragment end columns are exclusive, as are LSP range ends.
pub fn fragment_to_range(fragment: &Fragment) -> Range {
    Range {
        start: LspPosition {
            line: fragment.range.start.line - 1,
            character: fragment.range.start.column - 1,
        },
        end: LspPosition {
            line: fragment.range.end.line - 1,
            character: fragment.range.end.column - 1,
        },
    }
}

/// One-column-wide range at a scan error position.
pub fn position_to_range(pos: Position) -> Range {
    Range {
        start: LspPosition {
            line: pos.line - 1,
            character: pos.column - 1,
        },
        end: LspPosition {
            line: pos.line - 1,
            character: pos.column,
        },
    }
}

/// Render a file uri relative to the first workspace folder that contains
/// it, falling back to the full uri.
pub fn uri_to_relative(uri: &Url, folders: &[Url]) -> String {
    for folder in folders {
        let folder_str = folder.as_str().trim_end_matches('/');
        if let Some(rest) = uri.as_str().strip_prefix(folder_str) {
            if let Some(rel) = rest.strip_prefix('/') {
                return rel.to_string();
            }
        }
    }
    uri.to_string()
}

/// UTF-16 column (1-based) of a byte offset within a line.
pub fn utf16_col(line: &str, byte_offset: usize) -> u32 {
    line[..byte_offset]
        .chars()
        .map(|c| c.len_utf16() as u32)
        .sum::<u32>()
        + 1
}

/// UTF-16 length of a string slice.
pub fn utf16_len(text: &str) -> u32 {
    text.chars().map(|c| c.len_utf16() as u32).sum()
}
