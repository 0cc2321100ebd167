//! Language server that answers `textDocument/documentLink` and
//! `textDocument/hover` over stdio.
//!
//! Requests are processed one at a time in arrival order. The server mirrors
//! the text of open documents so it can run the scanners on demand; each
//! request runs the providers from scratch. Revision lookups block, so hovers
//! run on tokio's blocking pool while the request loop awaits them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use lsp_types::{
    DidChangeTextDocumentParams, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    DocumentLink, DocumentLinkOptions, DocumentLinkParams, Hover, HoverContents, HoverParams,
    HoverProviderCapability, InitializeParams, InitializeResult, MarkupContent, MarkupKind,
    ServerCapabilities, ServerInfo, TextDocumentSyncCapability, TextDocumentSyncKind,
    WorkDoneProgressOptions,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::{language_enabled, load_config, ReflensConfig};
use crate::errors::Result;
use crate::hover::{resolve_hover, HoverOptions};
use crate::revision::{lookup_for, RevisionLookup};
use crate::scanner::{scan_references, OsFileSystem, PathProbe};
use crate::text::LineIndex;

use super::transport::{ErrorCode, JsonRpcRequest, JsonRpcResponse, MessageReader, MessageWriter};
use super::uri::{path_to_uri, uri_to_path};

/// Text and metadata for a document the editor has opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenDocument {
    pub language_id: String,
    pub version: i32,
    pub text: String,
}

/// Runtime counters, logged when the server exits.
struct ServerStats {
    started_at: Instant,
    total_requests: u64,
    errors: u64,
}

impl ServerStats {
    fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total_requests: 0,
            errors: 0,
        }
    }
}

/// Lifecycle of the LSP session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Uninitialized,
    Running,
    ShuttingDown,
    Exited,
}

/// The reflens language server.
pub struct LspServer {
    root_override: Option<PathBuf>,
    workspace_root: Option<PathBuf>,
    config: ReflensConfig,
    hover_options: HoverOptions,
    lookup: Option<Arc<dyn RevisionLookup>>,
    fs: Box<dyn PathProbe + Send + Sync>,
    documents: HashMap<String, OpenDocument>,
    phase: Phase,
    shutdown_requested: bool,
    stats: ServerStats,
}

impl LspServer {
    /// Creates a server. If `root` is given it wins over whatever workspace
    /// the editor reports in `initialize`.
    pub fn new(root: Option<PathBuf>) -> Self {
        let config = ReflensConfig::default();
        Self {
            root_override: root,
            workspace_root: None,
            hover_options: HoverOptions::from(&config),
            config,
            lookup: None,
            fs: Box::new(OsFileSystem),
            documents: HashMap::new(),
            phase: Phase::Uninitialized,
            shutdown_requested: false,
            stats: ServerStats::new(),
        }
    }

    /// Uses `lookup` for revision queries instead of the configured backend.
    pub fn with_lookup(mut self, lookup: Box<dyn RevisionLookup>) -> Self {
        self.lookup = Some(Arc::from(lookup));
        self
    }

    /// Workspace root in effect after `initialize`.
    pub fn workspace_root(&self) -> Option<&Path> {
        self.workspace_root.as_deref()
    }

    /// Whether the editor sent `shutdown` before `exit`; decides the exit code.
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }

    pub fn document(&self, uri: &str) -> Option<&OpenDocument> {
        self.documents.get(uri)
    }

    /// Serves on stdin/stdout until the editor sends `exit` or closes stdin.
    pub async fn run_stdio(&mut self) -> Result<()> {
        self.run(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serves framed JSON-RPC from `input`, writing responses to `output`.
    pub async fn run<R, W>(&mut self, input: R, output: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut reader = MessageReader::new(input);
        let mut writer = MessageWriter::new(output);

        while self.phase != Phase::Exited {
            let frame = match reader.read_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    tracing::info!("input closed");
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "unreadable message, stopping");
                    self.log_stats();
                    return Err(e);
                }
            };

            let response = match serde_json::from_slice::<JsonRpcRequest>(&frame) {
                Ok(request) => self.handle_request(&request).await,
                Err(e) => Some(JsonRpcResponse::error(
                    Value::Null,
                    ErrorCode::ParseError,
                    format!("failed to parse JSON-RPC message: {}", e),
                )),
            };

            if let Some(resp) = response {
                if resp.error.is_some() {
                    self.stats.errors += 1;
                }
                writer.write_response(&resp).await?;
            }
        }

        self.log_stats();
        Ok(())
    }

    fn log_stats(&self) {
        tracing::info!(
            uptime_secs = self.stats.started_at.elapsed().as_secs(),
            total_requests = self.stats.total_requests,
            errors = self.stats.errors,
            "server stopped"
        );
    }

    /// Dispatches a single message. Returns `None` for notifications.
    pub async fn handle_request(&mut self, request: &JsonRpcRequest) -> Option<JsonRpcResponse> {
        self.stats.total_requests += 1;
        let id = request.id.clone();
        let params = request.params.as_ref();
        tracing::trace!(method = %request.method, "received message");

        if request.method == "exit" {
            self.phase = Phase::Exited;
            return None;
        }

        match self.phase {
            Phase::Uninitialized if request.method != "initialize" => {
                if request.is_notification() {
                    return None;
                }
                return Some(JsonRpcResponse::error(
                    id,
                    ErrorCode::ServerNotInitialized,
                    format!("received {} before initialize", request.method),
                ));
            }
            Phase::ShuttingDown => {
                if request.is_notification() {
                    return None;
                }
                return Some(JsonRpcResponse::error(
                    id,
                    ErrorCode::InvalidRequest,
                    format!("received {} after shutdown", request.method),
                ));
            }
            _ => {}
        }

        match request.method.as_str() {
            "initialize" => Some(match parse_params::<InitializeParams>(params) {
                Ok(p) => self.handle_initialize(id, p),
                Err(e) => invalid_params(id, e),
            }),
            "initialized" => None,
            "shutdown" => {
                self.phase = Phase::ShuttingDown;
                self.shutdown_requested = true;
                Some(JsonRpcResponse::success(id, Value::Null))
            }
            "textDocument/didOpen" => {
                match parse_params::<DidOpenTextDocumentParams>(params) {
                    Ok(p) => self.handle_did_open(p),
                    Err(e) => tracing::warn!(error = %e, "ignoring malformed didOpen"),
                }
                None
            }
            "textDocument/didChange" => {
                match parse_params::<DidChangeTextDocumentParams>(params) {
                    Ok(p) => self.handle_did_change(p),
                    Err(e) => tracing::warn!(error = %e, "ignoring malformed didChange"),
                }
                None
            }
            "textDocument/didClose" => {
                match parse_params::<DidCloseTextDocumentParams>(params) {
                    Ok(p) => {
                        self.documents.remove(p.text_document.uri.as_str());
                    }
                    Err(e) => tracing::warn!(error = %e, "ignoring malformed didClose"),
                }
                None
            }
            "textDocument/documentLink" => Some(match parse_params::<DocumentLinkParams>(params) {
                Ok(p) => self.handle_document_link(id, p),
                Err(e) => invalid_params(id, e),
            }),
            "textDocument/hover" => Some(match parse_params::<HoverParams>(params) {
                Ok(p) => self.handle_hover(id, p).await,
                Err(e) => invalid_params(id, e),
            }),
            _ if request.is_notification() => None,
            _ => Some(JsonRpcResponse::error(
                id,
                ErrorCode::MethodNotFound,
                format!("method not found: {}", request.method),
            )),
        }
    }

    fn handle_initialize(&mut self, id: Value, params: InitializeParams) -> JsonRpcResponse {
        if self.phase != Phase::Uninitialized {
            return JsonRpcResponse::error(
                id,
                ErrorCode::InvalidRequest,
                "initialize sent twice".to_string(),
            );
        }

        self.workspace_root = self
            .root_override
            .clone()
            .or_else(|| workspace_root_from_params(&params));

        if let Some(root) = &self.workspace_root {
            match load_config(root) {
                Ok(config) => self.config = config,
                Err(e) => tracing::warn!(error = %e, "ignoring invalid config, using defaults"),
            }
        }
        self.hover_options = HoverOptions::from(&self.config);
        if self.lookup.is_none() {
            self.lookup = Some(Arc::from(lookup_for(&self.config)));
        }
        self.phase = Phase::Running;

        tracing::info!(
            root = ?self.workspace_root,
            backend = ?self.config.backend,
            "initialized"
        );

        let result = InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                document_link_provider: Some(DocumentLinkOptions {
                    resolve_provider: Some(false),
                    work_done_progress_options: WorkDoneProgressOptions::default(),
                }),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                ..ServerCapabilities::default()
            },
            server_info: Some(ServerInfo {
                name: "reflens".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        };
        success(id, &result)
    }

    fn handle_did_open(&mut self, params: DidOpenTextDocumentParams) {
        let doc = params.text_document;
        tracing::debug!(uri = doc.uri.as_str(), language_id = %doc.language_id, "opened document");
        self.documents.insert(
            doc.uri.as_str().to_string(),
            OpenDocument {
                language_id: doc.language_id,
                version: doc.version,
                text: doc.text,
            },
        );
    }

    fn handle_did_change(&mut self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri.as_str();
        let Some(doc) = self.documents.get_mut(uri) else {
            tracing::debug!(uri, "change for unknown document");
            return;
        };
        // Full sync: the last change carries the whole new text.
        if let Some(change) = params.content_changes.into_iter().last() {
            doc.text = change.text;
        }
        doc.version = params.text_document.version;
    }

    fn handle_document_link(&self, id: Value, params: DocumentLinkParams) -> JsonRpcResponse {
        let uri = params.text_document.uri.as_str();
        let Some(doc) = self.documents.get(uri) else {
            return JsonRpcResponse::success(id, Value::Array(Vec::new()));
        };
        if !language_enabled(&self.config.link_languages, &doc.language_id) {
            return JsonRpcResponse::success(id, Value::Array(Vec::new()));
        }

        let annotations =
            scan_references(&doc.text, self.workspace_root.as_deref(), self.fs.as_ref());
        let index = LineIndex::new(&doc.text);
        let links: Vec<DocumentLink> = annotations
            .into_iter()
            .filter_map(|link| {
                Some(DocumentLink {
                    range: index.span_to_range(link.span),
                    target: Some(path_to_uri(&link.target)?),
                    tooltip: Some(link.tooltip),
                    data: None,
                })
            })
            .collect();

        tracing::debug!(uri, count = links.len(), "document links");
        success(id, &links)
    }

    async fn handle_hover(&mut self, id: Value, params: HoverParams) -> JsonRpcResponse {
        let position_params = params.text_document_position_params;
        let uri = position_params.text_document.uri.as_str();
        let Some(doc) = self.documents.get(uri) else {
            return JsonRpcResponse::success(id, Value::Null);
        };
        if !language_enabled(&self.config.hover_languages, &doc.language_id) {
            return JsonRpcResponse::success(id, Value::Null);
        }

        let Some(offset) = LineIndex::new(&doc.text).position_to_offset(position_params.position)
        else {
            return JsonRpcResponse::success(id, Value::Null);
        };

        let text = doc.text.clone();
        let lookup = Arc::clone(
            self.lookup
                .get_or_insert_with(|| Arc::from(lookup_for(&self.config))),
        );
        let workspace = self.workspace_root.clone();
        let options = self.hover_options.clone();

        let task = tokio::task::spawn_blocking(move || {
            let hover = resolve_hover(&text, offset, workspace.as_deref(), lookup.as_ref(), &options);
            hover.map(|content| {
                let range = LineIndex::new(&text).span_to_range(content.span);
                (content, range)
            })
        });
        let hover = match task.await {
            Ok(hover) => hover,
            Err(e) => {
                tracing::warn!(uri, error = %e, "hover task failed");
                None
            }
        };

        match hover {
            Some((content, range)) => {
                tracing::debug!(uri, kind = content.kind.as_str(), hash = %content.hash, "hover");
                let hover = Hover {
                    contents: HoverContents::Markup(MarkupContent {
                        kind: MarkupKind::Markdown,
                        value: content.to_markdown(),
                    }),
                    range: Some(range),
                };
                success(id, &hover)
            }
            None => JsonRpcResponse::success(id, Value::Null),
        }
    }
}

/// Picks the workspace root from `initialize` params: the first workspace
/// folder, then `rootUri`, then the deprecated `rootPath`.
#[allow(deprecated)]
fn workspace_root_from_params(params: &InitializeParams) -> Option<PathBuf> {
    let from_folders = params
        .workspace_folders
        .as_ref()
        .and_then(|folders| folders.first())
        .and_then(|folder| uri_to_path(folder.uri.as_str()));
    if from_folders.is_some() {
        return from_folders;
    }

    let from_root_uri = params
        .root_uri
        .as_ref()
        .and_then(|uri| uri_to_path(uri.as_str()));
    if from_root_uri.is_some() {
        return from_root_uri;
    }

    params.root_path.as_ref().map(PathBuf::from)
}

fn parse_params<P: DeserializeOwned>(params: Option<&Value>) -> serde_json::Result<P> {
    serde_json::from_value(params.cloned().unwrap_or(Value::Null))
}

fn success<T: Serialize>(id: Value, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(
            id,
            ErrorCode::InternalError,
            format!("failed to serialize result: {}", e),
        ),
    }
}

fn invalid_params(id: Value, error: serde_json::Error) -> JsonRpcResponse {
    JsonRpcResponse::error(id, ErrorCode::InvalidParams, format!("invalid params: {}", error))
}
