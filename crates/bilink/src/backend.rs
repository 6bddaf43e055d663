//
// backend.rs
//
// tower-lsp glue: owns the client handle and the shared world state, maps
// protocol notifications and requests onto the scan pipeline and the query
// engine.
//

use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::RwLock;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::Client;
use tower_lsp::LanguageServer;
use tower_lsp::LspService;
use tower_lsp::Server;

use crate::config;
use crate::handlers;
use crate::revalidation::{self, DebounceState};
use crate::scan;
use crate::state::WorldState;

/// Parameters for the bilink/init request: workspace file and folder uris
/// discovered by the client.
#[derive(Debug, Deserialize)]
struct InitParams {
    files: Vec<String>,
    folders: Vec<String>,
}

pub struct Backend {
    client: Client,
    state: Arc<RwLock<WorldState>>,
    debounce: Arc<DebounceState>,
}

impl Backend {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            state: Arc::new(RwLock::new(WorldState::new())),
            debounce: Arc::new(DebounceState::new()),
        }
    }

    async fn publish_all(&self, published: Vec<(Url, Vec<Diagnostic>)>) {
        for (uri, diagnostics) in published {
            self.client
                .publish_diagnostics(uri, diagnostics, None)
                .await;
        }
    }

    /// Handle the bilink/init request: load the workspace's link documents
    /// and bring the index to its settled two-pass state.
    async fn handle_init(&self, params: InitParams) -> Result<()> {
        log::info!(
            "bilink/init: {} files, {} folders",
            params.files.len(),
            params.folders.len()
        );

        {
            let mut state = self.state.write().await;
            for folder in &params.folders {
                match Url::parse(folder) {
                    Ok(uri) => state.workspace_folders.push(uri),
                    Err(e) => log::warn!("Ignoring malformed folder uri {}: {}", folder, e),
                }
            }
        }

        // Read file contents off the lock, concurrently. A file that fails
        // to load is skipped with a warning; the rest of the workspace
        // still initializes.
        let mut reads = tokio::task::JoinSet::new();
        for file in params.files {
            reads.spawn(async move {
                let uri = match Url::parse(&file) {
                    Ok(uri) => uri,
                    Err(e) => {
                        log::warn!("Ignoring malformed file uri {}: {}", file, e);
                        return None;
                    }
                };
                let path = match uri.to_file_path() {
                    Ok(path) => path,
                    Err(()) => {
                        log::warn!("Ignoring non-file uri {}", uri);
                        return None;
                    }
                };
                match tokio::fs::read_to_string(&path).await {
                    Ok(text) => Some((uri, text)),
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", uri, e);
                        None
                    }
                }
            });
        }

        let mut files: Vec<(Url, String)> = Vec::new();
        while let Some(joined) = reads.join_next().await {
            match joined {
                Ok(Some(loaded)) => files.push(loaded),
                Ok(None) => {}
                Err(e) => log::warn!("File load task failed: {}", e),
            }
        }
        // JoinSet completion order is arbitrary; keep the bootstrap
        // deterministic.
        files.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));

        let published = {
            let mut state = self.state.write().await;
            scan::bootstrap(&mut state, &files)
        };
        self.publish_all(published).await;

        Ok(())
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        log::info!("Initializing bilink");

        let mut state = self.state.write().await;

        if let Some(folders) = params.workspace_folders {
            for folder in folders {
                log::info!("Adding workspace folder: {}", folder.uri);
                state.workspace_folders.push(folder.uri);
            }
        } else if let Some(root_uri) = params.root_uri {
            log::info!("Adding root URI as workspace folder: {}", root_uri);
            state.workspace_folders.push(root_uri);
        }

        if let Some(options) = params.initialization_options {
            if let Some(config) = config::parse_config(&options) {
                state.config = config;
            }
        }

        drop(state);

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::INCREMENTAL,
                )),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(vec![
                        String::from("["),
                        String::from(" "),
                        String::from("!"),
                        String::from("#"),
                    ]),
                    ..Default::default()
                }),
                definition_provider: Some(OneOf::Left(true)),
                references_provider: Some(OneOf::Left(true)),
                semantic_tokens_provider: Some(
                    SemanticTokensServerCapabilities::SemanticTokensOptions(
                        SemanticTokensOptions {
                            legend: SemanticTokensLegend {
                                token_types: vec![SemanticTokenType::TYPE],
                                token_modifiers: vec![SemanticTokenModifier::DEFAULT_LIBRARY],
                            },
                            full: Some(SemanticTokensFullOptions::Delta { delta: Some(false) }),
                            ..Default::default()
                        },
                    ),
                ),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: String::from("bilink"),
                version: Some(String::from(env!("CARGO_PKG_VERSION"))),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        log::info!("bilink initialized");
    }

    async fn shutdown(&self) -> Result<()> {
        log::info!("bilink shutting down");
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri;

        // An open needs no debounce: scan immediately so the first view of
        // the document already carries diagnostics.
        let published = {
            let mut state = self.state.write().await;
            state.document_store.open(
                uri.clone(),
                &params.text_document.text,
                Some(params.text_document.version),
            );
            revalidation::scan_with_cascade(&mut state, &uri)
        };
        self.publish_all(published).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let version = params.text_document.version;

        // Text lands synchronously; only the scan is debounced.
        let debounce_ms = {
            let mut state = self.state.write().await;
            for change in params.content_changes {
                state.document_store.apply_change(&uri, version, change);
            }
            state.config.debounce_ms
        };

        let (generation, token) = self.debounce.schedule(uri.clone());
        let state_arc = self.state.clone();
        let debounce = self.debounce.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => { return; }
                _ = tokio::time::sleep(std::time::Duration::from_millis(debounce_ms)) => {}
            }

            let published = {
                let mut state = state_arc.write().await;
                // Freshness guard: a newer change has its own timer.
                if state.document_store.version(&uri) != Some(version) {
                    log::trace!("Skipping stale scan for {}: version changed", uri);
                    return;
                }
                revalidation::scan_with_cascade(&mut state, &uri)
            };
            debounce.complete(&uri, generation);

            for (diag_uri, diagnostics) in published {
                client.publish_diagnostics(diag_uri, diagnostics, None).await;
            }
        });
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        self.debounce.cancel(&uri);

        let published = {
            let mut state = self.state.write().await;
            state.remove_document(&uri);
            // Its definitions are gone; everyone else re-resolves.
            revalidation::sweep_all(&mut state)
        };

        // Clear the closed document's own diagnostics.
        self.client
            .publish_diagnostics(uri, Vec::new(), None)
            .await;
        self.publish_all(published).await;
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        if let Some(config) = config::parse_config(&params.settings) {
            let mut state = self.state.write().await;
            state.config = config;
        }
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let state = self.state.read().await;
        Ok(handlers::hover(
            &state,
            &params.text_document_position_params.text_document.uri,
            params.text_document_position_params.position,
        ))
    }

    async fn completion(&self, _: CompletionParams) -> Result<Option<CompletionResponse>> {
        let state = self.state.read().await;
        Ok(handlers::completion(&state))
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let state = self.state.read().await;
        Ok(handlers::goto_definition(
            &state,
            &params.text_document_position_params.text_document.uri,
            params.text_document_position_params.position,
        ))
    }

    async fn references(&self, params: ReferenceParams) -> Result<Option<Vec<Location>>> {
        let state = self.state.read().await;
        Ok(handlers::references(
            &state,
            &params.text_document_position.text_document.uri,
            params.text_document_position.position,
        ))
    }

    async fn semantic_tokens_full(
        &self,
        params: SemanticTokensParams,
    ) -> Result<Option<SemanticTokensResult>> {
        let state = self.state.read().await;
        Ok(handlers::semantic_tokens(&state, &params.text_document.uri)
            .map(SemanticTokensResult::Tokens))
    }
}

pub async fn start_lsp() -> anyhow::Result<()> {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::build(Backend::new)
        .custom_method("bilink/init", Backend::handle_init)
        .finish();
    Server::new(stdin, stdout, socket).serve(service).await;

    Ok(())
}
