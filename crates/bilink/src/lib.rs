//
// lib.rs
//
// bilink: a bidirectional-link language server for markdown workspaces.
//

pub mod backend;
pub mod config;
pub mod convert;
pub mod diagnostics;
pub mod document_store;
pub mod handlers;
pub mod index;
pub mod revalidation;
pub mod scan;
pub mod scanner;
pub mod state;
