//
// document_store.rs
//
// uri -> current text. Written synchronously on open/change before any
// debounce timer is armed, so whichever scan eventually fires observes the
// latest text.
//

use std::collections::HashMap;

use ropey::Rope;
use tower_lsp::lsp_types::{TextDocumentContentChangeEvent, Url};

/// One tracked document.
pub struct Document {
    pub contents: Rope,
    pub version: Option<i32>,
}

impl Document {
    pub fn new(text: &str, version: Option<i32>) -> Self {
        Self {
            contents: Rope::from_str(text),
            version,
        }
    }

    /// Apply an incremental or full-sync change. Range offsets arrive as
    /// UTF-16 code units per the LSP spec.
    pub fn apply_change(&mut self, change: TextDocumentContentChangeEvent) {
        if let Some(range) = change.range {
            let start_line = range.start.line as usize;
            let end_line = range.end.line as usize;

            let start_line_text = self.contents.line(start_line).to_string();
            let end_line_text = self.contents.line(end_line).to_string();

            let start_char =
                utf16_offset_to_char_offset(&start_line_text, range.start.character as usize);
            let end_char =
                utf16_offset_to_char_offset(&end_line_text, range.end.character as usize);

            let start_idx = self.contents.line_to_char(start_line) + start_char;
            let end_idx = self.contents.line_to_char(end_line) + end_char;

            self.contents.remove(start_idx..end_idx);
            self.contents.insert(start_idx, &change.text);
        } else {
            self.contents = Rope::from_str(&change.text);
        }
    }

    pub fn text(&self) -> String {
        self.contents.to_string()
    }
}

fn utf16_offset_to_char_offset(line_text: &str, utf16_offset: usize) -> usize {
    let mut utf16_count = 0;
    let mut char_count = 0;

    for ch in line_text.chars() {
        if utf16_count >= utf16_offset {
            return char_count;
        }
        utf16_count += ch.len_utf16();
        char_count += 1;
    }
    char_count
}

/// All documents the server currently knows: editor-opened ones and files
/// loaded at workspace bootstrap.
#[derive(Default)]
pub struct DocumentStore {
    docs: HashMap<Url, Document>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, uri: Url, text: &str, version: Option<i32>) {
        self.docs.insert(uri, Document::new(text, version));
    }

    pub fn close(&mut self, uri: &Url) {
        self.docs.remove(uri);
    }

    pub fn apply_change(&mut self, uri: &Url, version: i32, change: TextDocumentContentChangeEvent) {
        if let Some(doc) = self.docs.get_mut(uri) {
            doc.apply_change(change);
            doc.version = Some(version);
        }
    }

    pub fn text(&self, uri: &Url) -> Option<String> {
        self.docs.get(uri).map(|d| d.text())
    }

    pub fn version(&self, uri: &Url) -> Option<i32> {
        self.docs.get(uri).and_then(|d| d.version)
    }

    pub fn contains(&self, uri: &Url) -> bool {
        self.docs.contains_key(uri)
    }

    pub fn uris(&self) -> impl Iterator<Item = &Url> {
        self.docs.keys()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}
